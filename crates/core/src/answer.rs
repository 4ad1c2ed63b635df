use crate::error::QueryError;
use crate::models::{Confidence, ScoredRecord};
use crate::query::Retrieval;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Returned verbatim when retrieval produced no hits.
pub const NO_INFORMATION_ANSWER: &str =
    "No relevant information was found in the indexed manuals for this query.";

/// Rough character budget for the context handed to a synthesizer.
const DEFAULT_CONTEXT_BUDGET: usize = 6000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub manual_name: String,
    pub page: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub confidence: Confidence,
    pub sources: Vec<SourceRef>,
    pub suggested_parts: Vec<String>,
    pub references: Vec<String>,
}

/// Turns a question plus retrieved manual excerpts into a prose answer.
/// Implementations may call an external model; the bundled fallback is
/// purely extractive.
#[async_trait]
pub trait AnswerSynthesizer: Send + Sync {
    async fn synthesize(&self, question: &str, context: &str) -> Result<String, QueryError>;
}

/// Answers with the retrieved excerpts themselves, labeled by source. Keeps
/// the pipeline usable without any model endpoint configured.
pub struct ExtractiveSynthesizer;

#[async_trait]
impl AnswerSynthesizer for ExtractiveSynthesizer {
    async fn synthesize(&self, _question: &str, context: &str) -> Result<String, QueryError> {
        if context.trim().is_empty() {
            return Err(QueryError::Synthesis("empty context".to_string()));
        }
        Ok(context.to_string())
    }
}

/// Assembles the final [`Answer`] from a [`Retrieval`]: builds the excerpt
/// context, invokes the synthesizer, and collects deduplicated sources,
/// suggested part numbers, and alarm-code references from hit payloads.
pub struct AnswerAssembler {
    synthesizer: Box<dyn AnswerSynthesizer>,
    context_budget: usize,
}

impl AnswerAssembler {
    pub fn new(synthesizer: Box<dyn AnswerSynthesizer>) -> Self {
        Self {
            synthesizer,
            context_budget: DEFAULT_CONTEXT_BUDGET,
        }
    }

    pub fn extractive() -> Self {
        Self::new(Box::new(ExtractiveSynthesizer))
    }

    pub async fn assemble(
        &self,
        question: &str,
        retrieval: &Retrieval,
    ) -> Result<Answer, QueryError> {
        if retrieval.hits.is_empty() {
            return Ok(Answer {
                answer: NO_INFORMATION_ANSWER.to_string(),
                confidence: Confidence::Low,
                sources: Vec::new(),
                suggested_parts: Vec::new(),
                references: Vec::new(),
            });
        }

        let context = self.build_context(&retrieval.hits);
        let answer = self.synthesizer.synthesize(question, &context).await?;

        debug!(
            hits = retrieval.hits.len(),
            context_chars = context.chars().count(),
            "answer assembled"
        );

        Ok(Answer {
            answer,
            confidence: retrieval.confidence,
            sources: collect_sources(&retrieval.hits),
            suggested_parts: collect_parts(&retrieval.hits),
            references: collect_references(&retrieval.hits),
        })
    }

    fn build_context(&self, hits: &[ScoredRecord]) -> String {
        let mut context = String::new();
        for hit in hits {
            let page = hit
                .payload
                .page
                .map(|p| format!(", page {p}"))
                .unwrap_or_default();
            let excerpt = format!(
                "[{name}{page}]\n{text}\n\n",
                name = hit.payload.manual_name,
                text = hit.payload.text.trim()
            );
            if context.chars().count() + excerpt.chars().count() > self.context_budget
                && !context.is_empty()
            {
                break;
            }
            context.push_str(&excerpt);
        }
        context.trim_end().to_string()
    }
}

/// One entry per (manual, page) pair, in hit order.
fn collect_sources(hits: &[ScoredRecord]) -> Vec<SourceRef> {
    let mut sources: Vec<SourceRef> = Vec::new();
    for hit in hits {
        let source = SourceRef {
            manual_name: hit.payload.manual_name.clone(),
            page: hit.payload.page,
        };
        if !sources.contains(&source) {
            sources.push(source);
        }
    }
    sources
}

fn collect_parts(hits: &[ScoredRecord]) -> Vec<String> {
    let mut parts: Vec<String> = Vec::new();
    for hit in hits {
        for part in &hit.payload.metadata.part_numbers {
            if !parts.contains(part) {
                parts.push(part.clone());
            }
        }
    }
    parts
}

fn collect_references(hits: &[ScoredRecord]) -> Vec<String> {
    let mut references: Vec<String> = Vec::new();
    for hit in hits {
        for code in &hit.payload.metadata.alarm_codes {
            let reference = format!(
                "Alarm {code} ({name})",
                name = hit.payload.manual_name
            );
            if !references.contains(&reference) {
                references.push(reference);
            }
        }
    }
    references
}
