use crate::error::StoreError;
use crate::models::{
    CollectionStats, DistanceMetric, ScoredRecord, SearchFilter, VectorPayload, VectorRecord,
};
use crate::store::{cosine_similarity, ScrollPage, VectorStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

#[derive(Debug, Serialize, Deserialize)]
struct SeqRecord {
    seq: u64,
    #[serde(flatten)]
    record: VectorRecord,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct FileState {
    dimension: Option<usize>,
    metric: Option<DistanceMetric>,
    next_seq: u64,
    records: Vec<SeqRecord>,
}

/// In-process file-backed store: one JSON document on disk, full linear scan
/// for search. Acceptable at the scale of a few hundred thousand chunks and
/// the safe default when no remote backend is configured.
///
/// Writes go to a temp file in the same directory followed by a rename, so a
/// crash mid-write never exposes a truncated store.
pub struct FileStore {
    path: PathBuf,
    state: RwLock<FileState>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw)?
        } else {
            FileState::default()
        };

        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    fn persist(path: &Path, state: &FileState) -> Result<(), StoreError> {
        let tmp = path.with_extension("json.tmp");
        let serialized = serde_json::to_vec(state)?;
        std::fs::write(&tmp, serialized)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    fn check_dimension(state: &FileState, actual: usize) -> Result<(), StoreError> {
        match state.dimension {
            Some(expected) if expected != actual => {
                Err(StoreError::BadVectorDimension { expected, actual })
            }
            Some(_) => Ok(()),
            None => Err(StoreError::NotReady(
                "ensure_collection must run before writes".to_string(),
            )),
        }
    }
}

fn filter_matches(payload: &VectorPayload, filter: &SearchFilter) -> bool {
    if let Some(manual_id) = &filter.manual_id {
        if &payload.manual_id != manual_id {
            return false;
        }
    }
    if let Some(model) = &filter.model {
        let matches = payload
            .metadata
            .model
            .as_deref()
            .is_some_and(|m| m.eq_ignore_ascii_case(model));
        if !matches {
            return false;
        }
    }
    if let Some(code) = &filter.alarm_code {
        if !payload.metadata.alarm_codes.iter().any(|c| c == code) {
            return false;
        }
    }
    true
}

#[async_trait]
impl VectorStore for FileStore {
    async fn ensure_collection(
        &self,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        match state.dimension {
            Some(existing) if existing != dimension => Err(StoreError::DimensionMismatch {
                collection: self.path.display().to_string(),
                expected: dimension,
                actual: existing,
            }),
            Some(_) => Ok(()),
            None => {
                state.dimension = Some(dimension);
                state.metric = Some(metric);
                Self::persist(&self.path, &state)?;
                Ok(())
            }
        }
    }

    async fn upsert(&self, records: &[VectorRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut state = self.state.write().await;
        for record in records {
            Self::check_dimension(&state, record.vector.len())?;
        }

        for record in records {
            let seq = state.next_seq;
            state.next_seq += 1;

            match state.records.iter_mut().find(|r| r.record.id == record.id) {
                Some(existing) => {
                    existing.record = record.clone();
                    existing.seq = seq;
                }
                None => state.records.push(SeqRecord {
                    seq,
                    record: record.clone(),
                }),
            }
        }

        Self::persist(&self.path, &state)
    }

    async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<ScoredRecord>, StoreError> {
        let state = self.state.read().await;
        if let Some(expected) = state.dimension {
            if query_vector.len() != expected {
                return Err(StoreError::BadVectorDimension {
                    expected,
                    actual: query_vector.len(),
                });
            }
        }

        let mut scored: Vec<(f64, u64, ScoredRecord)> = state
            .records
            .iter()
            .filter(|r| {
                filter
                    .map(|f| filter_matches(&r.record.payload, f))
                    .unwrap_or(true)
            })
            .map(|r| {
                let score = cosine_similarity(query_vector, &r.record.vector);
                (
                    score,
                    r.seq,
                    ScoredRecord {
                        id: r.record.id,
                        score,
                        payload: r.record.payload.clone(),
                    },
                )
            })
            .collect();

        // Descending score; most recently upserted wins ties.
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(b.1.cmp(&a.1)));

        Ok(scored.into_iter().take(k).map(|(_, _, hit)| hit).collect())
    }

    async fn delete_by_owner(&self, manual_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let before = state.records.len();
        state.records.retain(|r| r.record.payload.manual_id != manual_id);

        if state.records.len() != before {
            Self::persist(&self.path, &state)?;
        }
        Ok(())
    }

    async fn scroll(
        &self,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<ScrollPage, StoreError> {
        let state = self.state.read().await;
        let after: Option<u64> = match cursor {
            Some(raw) => Some(raw.parse().map_err(|_| {
                StoreError::Request(format!("malformed scroll cursor: {raw}"))
            })?),
            None => None,
        };

        let mut in_order: Vec<&SeqRecord> = state.records.iter().collect();
        in_order.sort_by_key(|r| r.seq);

        let remaining: Vec<&SeqRecord> = in_order
            .into_iter()
            .filter(|r| after.map(|a| r.seq > a).unwrap_or(true))
            .collect();

        let page: Vec<&SeqRecord> = remaining.iter().take(limit).copied().collect();
        let next_cursor = if remaining.len() > page.len() {
            page.last().map(|r| r.seq.to_string())
        } else {
            None
        };

        Ok(ScrollPage {
            records: page.into_iter().map(|r| r.record.clone()).collect(),
            next_cursor,
        })
    }

    async fn stats(&self) -> Result<CollectionStats, StoreError> {
        let state = self.state.read().await;
        let owners: HashSet<&str> = state
            .records
            .iter()
            .map(|r| r.record.payload.manual_id.as_str())
            .collect();

        Ok(CollectionStats {
            count: state.records.len() as u64,
            distinct_owners: owners.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;
    use uuid::Uuid;

    fn record(manual: &str, index: usize, vector: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: crate::models::chunk_point_id(manual, index),
            vector,
            payload: VectorPayload {
                manual_id: manual.to_string(),
                manual_name: format!("{manual} service manual"),
                page: Some(1),
                start_offset: index * 800,
                end_offset: index * 800 + 1_000,
                text: format!("chunk {index} of {manual}"),
                metadata: ChunkMetadata::default(),
            },
        }
    }

    async fn open_store(dir: &tempfile::TempDir) -> FileStore {
        let store = FileStore::open(dir.path().join("vectors.json")).unwrap();
        store
            .ensure_collection(3, DistanceMetric::Cosine)
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn writes_require_ensure_collection() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("vectors.json")).unwrap();
        let result = store.upsert(&[record("m1", 0, vec![1.0, 0.0, 0.0])]).await;
        assert!(matches!(result, Err(StoreError::NotReady(_))));
    }

    #[tokio::test]
    async fn dimension_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        let result = store.ensure_collection(5, DistanceMetric::Cosine).await;
        assert!(matches!(result, Err(StoreError::DimensionMismatch { .. })));

        let result = store.upsert(&[record("m1", 0, vec![1.0, 0.0])]).await;
        assert!(matches!(result, Err(StoreError::BadVectorDimension { .. })));
    }

    #[tokio::test]
    async fn self_search_returns_the_record_first_with_unit_score() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        store
            .upsert(&[
                record("m1", 0, vec![1.0, 0.0, 0.0]),
                record("m1", 1, vec![0.0, 1.0, 0.0]),
            ])
            .await
            .unwrap();

        let hits = store.search(&[0.0, 1.0, 0.0], 2, None).await.unwrap();
        assert_eq!(hits[0].id, crate::models::chunk_point_id("m1", 1));
        assert!((hits[0].score - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn ranking_is_monotonic_in_similarity() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        store
            .upsert(&[
                record("m1", 0, vec![1.0, 0.0, 0.0]),
                record("m1", 1, vec![0.8, 0.6, 0.0]),
                record("m1", 2, vec![0.0, 0.0, 1.0]),
            ])
            .await
            .unwrap();

        let hits = store.search(&[1.0, 0.0, 0.0], 3, None).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits[0].score >= hits[1].score);
        assert!(hits[1].score >= hits[2].score);
        assert_eq!(hits[0].id, crate::models::chunk_point_id("m1", 0));
    }

    #[tokio::test]
    async fn ties_break_toward_most_recent_upsert() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        store
            .upsert(&[record("older", 0, vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();
        store
            .upsert(&[record("newer", 0, vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();

        let hits = store.search(&[1.0, 0.0, 0.0], 2, None).await.unwrap();
        assert_eq!(hits[0].payload.manual_id, "newer");
        assert_eq!(hits[1].payload.manual_id, "older");
    }

    #[tokio::test]
    async fn upsert_overwrites_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        let mut r = record("m1", 0, vec![1.0, 0.0, 0.0]);
        store.upsert(std::slice::from_ref(&r)).await.unwrap();
        r.payload.text = "revised".to_string();
        store.upsert(std::slice::from_ref(&r)).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.count, 1);

        let hits = store.search(&[1.0, 0.0, 0.0], 1, None).await.unwrap();
        assert_eq!(hits[0].payload.text, "revised");
    }

    #[tokio::test]
    async fn delete_by_owner_removes_only_that_manual() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        store
            .upsert(&[
                record("m1", 0, vec![1.0, 0.0, 0.0]),
                record("m1", 1, vec![0.0, 1.0, 0.0]),
                record("m2", 0, vec![0.0, 0.0, 1.0]),
            ])
            .await
            .unwrap();

        store.delete_by_owner("m1").await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.distinct_owners, 1);
    }

    #[tokio::test]
    async fn metadata_filter_narrows_before_ranking() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        let mut filtered_out = record("m1", 0, vec![1.0, 0.0, 0.0]);
        filtered_out.payload.metadata.model = Some("SL-400".to_string());
        let mut kept = record("m2", 0, vec![0.9, 0.1, 0.0]);
        kept.payload.metadata.model = Some("MD-200".to_string());
        store.upsert(&[filtered_out, kept]).await.unwrap();

        let filter = SearchFilter {
            model: Some("md-200".to_string()),
            ..Default::default()
        };
        let hits = store.search(&[1.0, 0.0, 0.0], 5, Some(&filter)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].payload.manual_id, "m2");
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.json");
        {
            let store = FileStore::open(&path).unwrap();
            store
                .ensure_collection(3, DistanceMetric::Cosine)
                .await
                .unwrap();
            store
                .upsert(&[record("m1", 0, vec![1.0, 0.0, 0.0])])
                .await
                .unwrap();
        }

        let reopened = FileStore::open(&path).unwrap();
        let stats = reopened.stats().await.unwrap();
        assert_eq!(stats.count, 1);

        let mismatch = reopened.ensure_collection(7, DistanceMetric::Cosine).await;
        assert!(matches!(mismatch, Err(StoreError::DimensionMismatch { .. })));
    }

    #[tokio::test]
    async fn scroll_pages_through_everything_in_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        let records: Vec<VectorRecord> = (0..7)
            .map(|i| record("m1", i, vec![1.0, 0.0, 0.0]))
            .collect();
        store.upsert(&records).await.unwrap();

        let mut seen: Vec<Uuid> = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = store.scroll(cursor.as_deref(), 3).await.unwrap();
            seen.extend(page.records.iter().map(|r| r.id));
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        assert_eq!(seen.len(), 7);
        let expected: Vec<Uuid> = records.iter().map(|r| r.id).collect();
        assert_eq!(seen, expected);
    }
}
