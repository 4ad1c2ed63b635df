use crate::embeddings::EmbeddingProvider;
use crate::error::QueryError;
use crate::models::{Confidence, QueryContext, ScoredRecord, SearchFilter};
use crate::store::VectorStore;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_TOP_K: usize = 4;

/// Result of one retrieval pass: the ranked hits plus a confidence bucket
/// derived from the best score.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub hits: Vec<ScoredRecord>,
    pub confidence: Confidence,
}

/// Embeds a question and runs a filtered similarity search against the
/// store. Context fields narrow the search before it runs: a unit model
/// restricts hits to chunks tagged with that model, an alarm code restricts
/// to chunks mentioning that code.
pub struct QueryEngine {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    top_k: usize,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            store,
            embedder,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.clamp(1, 20);
        self
    }

    pub async fn retrieve(
        &self,
        query: &str,
        context: &QueryContext,
    ) -> Result<Retrieval, QueryError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(QueryError::InvalidQuery("empty query".to_string()));
        }

        let filter = Self::context_filter(context);
        let vector = self.embedder.embed(query).await?;
        let hits = self
            .store
            .search(&vector, self.top_k, filter.as_ref())
            .await?;

        let confidence = hits
            .first()
            .map(|top| Confidence::from_top_score(top.score))
            .unwrap_or(Confidence::Low);

        debug!(
            hits = hits.len(),
            top_score = hits.first().map(|h| h.score).unwrap_or(0.0),
            ?confidence,
            "retrieval complete"
        );

        Ok(Retrieval { hits, confidence })
    }

    fn context_filter(context: &QueryContext) -> Option<SearchFilter> {
        let filter = SearchFilter {
            manual_id: None,
            model: context.unit_model.clone(),
            alarm_code: context.alarm_code.clone(),
        };
        if filter.is_empty() {
            None
        } else {
            Some(filter)
        }
    }
}
