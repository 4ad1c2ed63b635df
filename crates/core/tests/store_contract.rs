//! Behavioral contract every `VectorStore` backend must satisfy. The suite
//! is written against the trait object so a backend with a reachable
//! endpoint can be dropped in; CI runs it against the file backend.

use manual_retrieval_core::{
    chunk_point_id, ChunkMetadata, DistanceMetric, FileStore, SearchFilter, VectorPayload,
    VectorRecord, VectorStore,
};
use tempfile::TempDir;

const DIM: usize = 4;

fn unit(direction: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[direction % DIM] = 1.0;
    v
}

fn record(manual: &str, index: usize, direction: usize) -> VectorRecord {
    VectorRecord {
        id: chunk_point_id(manual, index),
        vector: unit(direction),
        payload: VectorPayload {
            manual_id: manual.to_string(),
            manual_name: format!("{manual} service manual"),
            page: Some(index as u32 + 1),
            start_offset: index * 100,
            end_offset: index * 100 + 100,
            text: format!("{manual} chunk {index}"),
            metadata: ChunkMetadata {
                model: Some(manual.to_uppercase()),
                ..ChunkMetadata::default()
            },
        },
    }
}

async fn open_store(dir: &TempDir) -> FileStore {
    let store = FileStore::open(dir.path().join("contract.json")).unwrap();
    store
        .ensure_collection(DIM, DistanceMetric::Cosine)
        .await
        .unwrap();
    store
}

async fn contract_upsert_is_idempotent(store: &dyn VectorStore) {
    let records = vec![record("m1", 0, 0), record("m1", 1, 1)];
    store.upsert(&records).await.unwrap();
    store.upsert(&records).await.unwrap();
    assert_eq!(store.stats().await.unwrap().count, 2);
}

async fn contract_search_ranks_by_similarity(store: &dyn VectorStore) {
    store
        .upsert(&[record("m1", 0, 0), record("m1", 1, 1), record("m1", 2, 2)])
        .await
        .unwrap();

    let hits = store.search(&unit(1), 3, None).await.unwrap();
    assert_eq!(hits[0].id, chunk_point_id("m1", 1));
    assert!(hits[0].score > hits[1].score);
}

async fn contract_filter_restricts_hits(store: &dyn VectorStore) {
    store
        .upsert(&[record("m1", 0, 0), record("m2", 0, 0)])
        .await
        .unwrap();

    let filter = SearchFilter {
        manual_id: Some("m2".to_string()),
        model: None,
        alarm_code: None,
    };
    let hits = store.search(&unit(0), 10, Some(&filter)).await.unwrap();
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.payload.manual_id == "m2"));
}

async fn contract_delete_by_owner_is_scoped(store: &dyn VectorStore) {
    store
        .upsert(&[record("m1", 0, 0), record("m1", 1, 1), record("m2", 0, 2)])
        .await
        .unwrap();

    store.delete_by_owner("m1").await.unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.count, 1);
    assert_eq!(stats.distinct_owners, 1);
}

async fn contract_scroll_visits_everything_once(store: &dyn VectorStore) {
    let records: Vec<VectorRecord> = (0..7).map(|i| record("m1", i, i)).collect();
    store.upsert(&records).await.unwrap();

    let mut seen = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = store.scroll(cursor.as_deref(), 3).await.unwrap();
        seen.extend(page.records.iter().map(|r| r.id));
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    let mut expected: Vec<_> = records.iter().map(|r| r.id).collect();
    expected.sort();
    seen.sort();
    seen.dedup();
    assert_eq!(seen, expected);
}

async fn contract_missing_collection_searches_empty(store: &dyn VectorStore) {
    // Nothing ensured, nothing written: a search must come back empty
    // rather than failing, so pre-ingest queries degrade gracefully.
    let hits = store.search(&unit(0), 5, None).await.unwrap();
    assert!(hits.is_empty());
}

async fn contract_scroll_preserves_vectors(store: &dyn VectorStore) {
    store.upsert(&[record("m1", 0, 2)]).await.unwrap();

    let page = store.scroll(None, 10).await.unwrap();
    assert_eq!(page.records.len(), 1);
    assert_eq!(page.records[0].vector, unit(2));
    assert_eq!(page.records[0].payload.manual_id, "m1");
}

#[tokio::test]
async fn file_backend_upsert_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    contract_upsert_is_idempotent(&store).await;
}

#[tokio::test]
async fn file_backend_search_ranks_by_similarity() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    contract_search_ranks_by_similarity(&store).await;
}

#[tokio::test]
async fn file_backend_filter_restricts_hits() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    contract_filter_restricts_hits(&store).await;
}

#[tokio::test]
async fn file_backend_delete_by_owner_is_scoped() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    contract_delete_by_owner_is_scoped(&store).await;
}

#[tokio::test]
async fn file_backend_scroll_visits_everything_once() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    contract_scroll_visits_everything_once(&store).await;
}

#[tokio::test]
async fn file_backend_scroll_preserves_vectors() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    contract_scroll_preserves_vectors(&store).await;
}

#[tokio::test]
async fn file_backend_missing_collection_searches_empty() {
    let dir = tempfile::tempdir().unwrap();
    // Deliberately skip ensure_collection.
    let store = FileStore::open(dir.path().join("contract.json")).unwrap();
    contract_missing_collection_searches_empty(&store).await;
}
