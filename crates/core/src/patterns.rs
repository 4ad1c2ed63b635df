use crate::error::IngestError;
use crate::models::ChunkMetadata;
use regex::Regex;

const MAX_ALARM_CODES: usize = 50;
const MAX_PART_NUMBERS: usize = 10;

/// Pattern-matching extractor for the structured hints hidden in manual text:
/// brand names, model designators, alarm codes, and part numbers.
///
/// All extraction is de-duplicated and order-preserving by first occurrence,
/// so downstream answer assembly stays deterministic.
pub struct PatternExtractor {
    brands: Vec<Regex>,
    models: Vec<Regex>,
    alarms: Vec<Regex>,
    parts: Vec<Regex>,
}

impl PatternExtractor {
    pub fn new() -> Result<Self, IngestError> {
        let brands = compile(&[
            r"(?i)Thermo King",
            r"(?i)Carrier Transicold",
            r"(?i)Carrier",
            r"(?i)Daikin",
            r"(?i)Starcool",
        ])?;
        let models = compile(&[
            r"(?i)SL-?\d+",
            r"(?i)MD-?\d+",
            r"(?i)Spectrum",
            r"(?i)Vector",
        ])?;
        let alarms = compile(&[
            r"(?i)Alarm\s+(\d+)",
            r"(?i)Code\s+(\d+)",
            r"(?i)Error\s+(\d+)",
            r"(?i)Fault\s+(\d+)",
        ])?;
        let parts = compile(&[
            // XX-XXXX-XXX part number format used by reefer OEMs.
            r"\b\d{2}-\d{4}-\d{3}\b",
            r"\b[A-Z]{2,}\d{3,}\b",
            r"\b\d{6,}\b",
        ])?;

        Ok(Self {
            brands,
            models,
            alarms,
            parts,
        })
    }

    /// Scans `text` and returns the metadata found in it. Brand and model
    /// take the first match only; alarm codes and part numbers accumulate
    /// up to a fixed cap.
    pub fn extract(&self, text: &str) -> ChunkMetadata {
        ChunkMetadata {
            brand: first_match(&self.brands, text),
            model: first_match(&self.models, text),
            alarm_codes: self.alarm_codes(text),
            part_numbers: self.part_numbers(text),
        }
    }

    pub fn alarm_codes(&self, text: &str) -> Vec<String> {
        let mut codes = Vec::new();
        for pattern in &self.alarms {
            for capture in pattern.captures_iter(text) {
                if let Some(digits) = capture.get(1) {
                    let code = digits.as_str().to_string();
                    if !codes.contains(&code) {
                        codes.push(code);
                    }
                    if codes.len() >= MAX_ALARM_CODES {
                        return codes;
                    }
                }
            }
        }
        codes
    }

    pub fn part_numbers(&self, text: &str) -> Vec<String> {
        let mut parts = Vec::new();
        for pattern in &self.parts {
            for found in pattern.find_iter(text) {
                let part = found.as_str().to_string();
                if !parts.contains(&part) {
                    parts.push(part);
                }
                if parts.len() >= MAX_PART_NUMBERS {
                    return parts;
                }
            }
        }
        parts
    }
}

fn compile(sources: &[&str]) -> Result<Vec<Regex>, IngestError> {
    sources
        .iter()
        .map(|source| Regex::new(source).map_err(IngestError::from))
        .collect()
}

fn first_match(patterns: &[Regex], text: &str) -> Option<String> {
    for pattern in patterns {
        if let Some(found) = pattern.find(text) {
            return Some(found.as_str().to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brand_and_model_take_first_match() {
        let extractor = PatternExtractor::new().unwrap();
        let meta = extractor.extract(
            "The Thermo King SL-400 unit differs from the Carrier Vector series.",
        );
        assert_eq!(meta.brand.as_deref(), Some("Thermo King"));
        assert_eq!(meta.model.as_deref(), Some("SL-400"));
    }

    #[test]
    fn alarm_codes_are_deduplicated_in_first_occurrence_order() {
        let extractor = PatternExtractor::new().unwrap();
        let codes = extractor.alarm_codes(
            "Alarm 17 indicates a sensor fault. If Alarm 17 persists, check \
             Code 128 and then Error 4.",
        );
        assert_eq!(codes, vec!["17", "128", "4"]);
    }

    #[test]
    fn part_numbers_match_known_formats() {
        let extractor = PatternExtractor::new().unwrap();
        let parts =
            extractor.part_numbers("Replace 12-3456-789 with compressor kit TK40455 (ref 9912345).");
        assert!(parts.contains(&"12-3456-789".to_string()));
        assert!(parts.contains(&"TK40455".to_string()));
        assert!(parts.contains(&"9912345".to_string()));
    }

    #[test]
    fn plain_prose_extracts_nothing() {
        let extractor = PatternExtractor::new().unwrap();
        let meta = extractor.extract("Close the door before starting the unit.");
        assert!(meta.brand.is_none());
        assert!(meta.model.is_none());
        assert!(meta.alarm_codes.is_empty());
        assert!(meta.part_numbers.is_empty());
    }
}
