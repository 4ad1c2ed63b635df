use crate::chunking::PageBoundary;
use crate::error::IngestError;
use lopdf::Document;
use std::path::Path;

/// Join sequence between pages in the assembled full text.
const PAGE_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// Full extracted text plus the page boundary offsets needed for chunk
/// page attribution. Offsets are character offsets into `text`.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub text: String,
    pub pages: Vec<PageBoundary>,
}

pub trait PdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Default)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| IngestError::PdfParse(error.to_string()))?;

            if !text.trim().is_empty() {
                pages.push(PageText {
                    number: page_no,
                    text,
                });
            }
        }

        if pages.is_empty() {
            return Err(IngestError::PdfParse(format!(
                "pdf had no readable page text: {}",
                path.display()
            )));
        }

        Ok(pages)
    }
}

/// Extracts a source file into full text plus page boundaries.
///
/// PDFs go through [`LopdfExtractor`] page by page. Anything else is read
/// as plain text with no page information, which surfaces downstream as
/// chunks with an unknown page.
pub fn extract_document(path: &Path) -> Result<ExtractedDocument, IngestError> {
    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

    if is_pdf {
        let pages = LopdfExtractor.extract_pages(path)?;
        Ok(assemble_pages(&pages))
    } else {
        let raw = std::fs::read_to_string(path)?;
        Ok(ExtractedDocument {
            text: sanitize(&raw),
            pages: Vec::new(),
        })
    }
}

/// Concatenates page texts into one document, recording each page's
/// character range so chunk midpoints can be mapped back to page numbers.
pub fn assemble_pages(pages: &[PageText]) -> ExtractedDocument {
    let mut text = String::new();
    let mut boundaries = Vec::with_capacity(pages.len());
    let mut offset = 0usize;

    for (position, page) in pages.iter().enumerate() {
        if position > 0 {
            text.push_str(PAGE_SEPARATOR);
            offset += PAGE_SEPARATOR.chars().count();
        }

        let cleaned = sanitize(&page.text);
        let length = cleaned.chars().count();
        boundaries.push(PageBoundary {
            number: page.number,
            start: offset,
            end: offset + length,
        });
        text.push_str(&cleaned);
        offset += length;
    }

    ExtractedDocument {
        text,
        pages: boundaries,
    }
}

/// Strips null bytes and control characters that corrupt JSON payloads.
fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembled_boundaries_cover_each_page() {
        let pages = vec![
            PageText {
                number: 1,
                text: "first page".to_string(),
            },
            PageText {
                number: 2,
                text: "second page".to_string(),
            },
        ];

        let document = assemble_pages(&pages);
        assert_eq!(document.pages.len(), 2);
        assert_eq!(document.pages[0].start, 0);
        assert_eq!(document.pages[0].end, 10);
        assert_eq!(document.pages[1].start, 12);
        assert_eq!(document.pages[1].end, 23);

        let chars: Vec<char> = document.text.chars().collect();
        let second: String = chars[document.pages[1].start..document.pages[1].end]
            .iter()
            .collect();
        assert_eq!(second, "second page");
    }

    #[test]
    fn sanitize_removes_control_characters() {
        let cleaned = sanitize("ab\u{0}c\u{7}d\nkeep\ttabs");
        assert_eq!(cleaned, "abcd\nkeep\ttabs");
    }

    #[test]
    fn non_pdf_files_extract_with_unknown_pages() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "plain text manual content")?;

        let document = extract_document(&path)?;
        assert_eq!(document.text, "plain text manual content");
        assert!(document.pages.is_empty());
        Ok(())
    }
}
