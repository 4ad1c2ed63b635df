use crate::error::StoreError;
use crate::models::{CollectionStats, DistanceMetric, ScoredRecord, SearchFilter, VectorRecord};
use async_trait::async_trait;

/// One page of a full-store read, used by migration.
#[derive(Debug, Clone)]
pub struct ScrollPage {
    pub records: Vec<VectorRecord>,
    /// Opaque cursor for the next page; `None` when the store is exhausted.
    pub next_cursor: Option<String>,
}

/// Backend-agnostic persistence contract for (vector, text, metadata) tuples.
///
/// Each store instance is bound to one collection at construction time;
/// the ingestion and query layers hold a `dyn VectorStore` and never branch
/// on which backend is active. All implementations must pass the shared
/// contract test suite in `tests/store_contract.rs`.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Idempotent create-if-missing. An existing collection with a different
    /// vector dimension is a fatal configuration error; silently truncating
    /// or padding vectors is never acceptable.
    async fn ensure_collection(
        &self,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<(), StoreError>;

    /// Idempotent by record id: re-upserting an id overwrites in place.
    async fn upsert(&self, records: &[VectorRecord]) -> Result<(), StoreError>;

    /// At most `k` records, descending similarity, ties broken by insertion
    /// recency (most recently upserted first) so results stay deterministic.
    /// A missing or empty collection yields zero hits, not an error, so a
    /// query before first ingest flows into the no-information answer.
    async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<ScoredRecord>, StoreError>;

    /// Removes every record owned by the given manual. Run before
    /// re-ingestion so a re-run replaces instead of accumulating.
    async fn delete_by_owner(&self, manual_id: &str) -> Result<(), StoreError>;

    /// Paged full read in stable insertion order.
    async fn scroll(
        &self,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<ScrollPage, StoreError>;

    async fn stats(&self) -> Result<CollectionStats, StoreError>;
}

/// Cosine similarity in f64 to keep ranking comparisons stable.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0f64;
    let mut norm_a = 0f64;
    let mut norm_b = 0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}
