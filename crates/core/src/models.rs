use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A source document registered with the ingestion subsystem.
///
/// Created on upload and never mutated except for metadata refresh;
/// deleting a manual cascades to its chunks via
/// [`crate::store::VectorStore::delete_by_owner`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manual {
    pub id: String,
    pub name: String,
    pub source_path: String,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub known_alarm_codes: Vec<String>,
    pub known_components: Vec<String>,
    pub version: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub uploaded_by: Option<String>,
}

impl Manual {
    pub fn new(id: impl Into<String>, name: impl Into<String>, source_path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            source_path: source_path.into(),
            brand: None,
            model: None,
            known_alarm_codes: Vec::new(),
            known_components: Vec::new(),
            version: None,
            uploaded_at: Utc::now(),
            uploaded_by: None,
        }
    }
}

/// Metadata extracted from a chunk's text at ingestion time, plus the
/// brand/model inherited from the owning manual.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub brand: Option<String>,
    pub model: Option<String>,
    #[serde(default)]
    pub alarm_codes: Vec<String>,
    #[serde(default)]
    pub part_numbers: Vec<String>,
}

/// Everything a search hit needs to be self-contained: no join back to a
/// relational store is required to answer a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorPayload {
    pub manual_id: String,
    pub manual_name: String,
    pub page: Option<u32>,
    pub start_offset: usize,
    pub end_offset: usize,
    pub text: String,
    #[serde(flatten)]
    pub metadata: ChunkMetadata,
}

/// The (id, vector, payload) triple persisted in whichever backend is active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: VectorPayload,
}

/// A search hit with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub id: Uuid,
    pub score: f64,
    pub payload: VectorPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub count: u64,
    pub distinct_owners: u64,
}

/// Distance function of the collection's vector space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMetric {
    Cosine,
    Dot,
    Euclid,
}

impl DistanceMetric {
    pub fn wire_name(self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "Cosine",
            DistanceMetric::Dot => "Dot",
            DistanceMetric::Euclid => "Euclid",
        }
    }
}

/// Metadata filter applied before ranking, so `k` returns the k most
/// relevant in-scope results rather than k global results filtered down.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    pub manual_id: Option<String>,
    pub model: Option<String>,
    pub alarm_code: Option<String>,
}

impl SearchFilter {
    pub fn is_empty(&self) -> bool {
        self.manual_id.is_none() && self.model.is_none() && self.alarm_code.is_none()
    }
}

/// Optional context supplied alongside a diagnostic query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryContext {
    pub unit_model: Option<String>,
    pub alarm_code: Option<String>,
    pub user: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Buckets a top similarity score. Monotonic: a strictly higher score
    /// never yields a strictly lower bucket.
    pub fn from_top_score(score: f64) -> Self {
        if score >= 0.75 {
            Confidence::High
        } else if score >= 0.5 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

/// Deterministic chunk id: a function of (manual id, chunk index), so
/// re-running ingestion produces the same ids and upsert overwrites in place.
pub fn chunk_point_id(manual_id: &str, chunk_index: usize) -> Uuid {
    let name = format!("{manual_id}:{chunk_index}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}
