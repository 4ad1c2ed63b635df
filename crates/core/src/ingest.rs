use crate::chunking::{chunk, ChunkerConfig, PageBoundary};
use crate::embeddings::EmbeddingProvider;
use crate::error::{EmbeddingError, IngestError};
use crate::extractor::extract_document;
use crate::models::{chunk_point_id, DistanceMetric, Manual, VectorPayload, VectorRecord};
use crate::patterns::PatternExtractor;
use crate::store::VectorStore;
use futures::stream::{self, StreamExt};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct IngestorConfig {
    pub chunker: ChunkerConfig,
    /// Records per store write.
    pub upsert_batch: usize,
    /// Concurrent embed+upsert workers. Bounded, not fan-out: remote
    /// backends rate-limit.
    pub workers: usize,
    /// Courtesy pause between batches for remote backends. Not a
    /// correctness requirement.
    pub batch_delay: Duration,
    pub embed_retries: u32,
}

impl Default for IngestorConfig {
    fn default() -> Self {
        Self {
            chunker: ChunkerConfig::default(),
            upsert_batch: 500,
            workers: 4,
            batch_delay: Duration::from_millis(100),
            embed_retries: 3,
        }
    }
}

/// Structured partial-success result. A multi-thousand-chunk job is never
/// voided by one bad batch: earlier batches stay persisted and the report
/// carries `chunks_created < total_chunks` plus the first error. Because
/// ingestion deletes the manual's old chunks first and ids are
/// deterministic, re-running after a partial failure converges.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub chunks_created: usize,
    pub total_chunks: usize,
    pub text_length: usize,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl IngestReport {
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.chunks_created == self.total_chunks
    }

    fn failed(error: impl ToString, started: Instant) -> Self {
        Self {
            chunks_created: 0,
            total_chunks: 0,
            text_length: 0,
            duration_ms: started.elapsed().as_millis() as u64,
            error: Some(error.to_string()),
        }
    }
}

/// Orchestrates extract → chunk → embed → upsert for one manual at a time.
pub struct DocumentIngestor {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    patterns: PatternExtractor,
    config: IngestorConfig,
}

impl DocumentIngestor {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: IngestorConfig,
    ) -> Result<Self, IngestError> {
        config.chunker.validate()?;
        Ok(Self {
            store,
            embedder,
            patterns: PatternExtractor::new()?,
            config,
        })
    }

    pub async fn ingest_file(
        &self,
        manual: &Manual,
        path: &Path,
        abort: &AtomicBool,
    ) -> IngestReport {
        let started = Instant::now();
        match digest_file(path) {
            Ok(fingerprint) => {
                info!(manual = %manual.id, path = %path.display(), %fingerprint, "manual fingerprint");
            }
            Err(error) => return IngestReport::failed(error, started),
        }
        let document = match extract_document(path) {
            Ok(document) => document,
            Err(error) => return IngestReport::failed(error, started),
        };
        self.ingest_extracted(manual, &document.text, &document.pages, abort, started)
            .await
    }

    /// Plain-text ingestion path; page attribution is unknown unless the
    /// caller supplies boundaries.
    pub async fn ingest_text(
        &self,
        manual: &Manual,
        text: &str,
        pages: &[PageBoundary],
        abort: &AtomicBool,
    ) -> IngestReport {
        self.ingest_extracted(manual, text, pages, abort, Instant::now())
            .await
    }

    async fn ingest_extracted(
        &self,
        manual: &Manual,
        text: &str,
        pages: &[PageBoundary],
        abort: &AtomicBool,
        started: Instant,
    ) -> IngestReport {
        let slices = match chunk(text, pages, self.config.chunker) {
            Ok(slices) => slices,
            Err(error) => return IngestReport::failed(error, started),
        };

        let records_meta: Vec<(usize, VectorPayload)> = slices
            .iter()
            .map(|slice| {
                let mut metadata = self.patterns.extract(&slice.text);
                if metadata.brand.is_none() {
                    metadata.brand = manual.brand.clone();
                }
                if metadata.model.is_none() {
                    metadata.model = manual.model.clone();
                }
                (
                    slice.index,
                    VectorPayload {
                        manual_id: manual.id.clone(),
                        manual_name: manual.name.clone(),
                        page: slice.page,
                        start_offset: slice.start,
                        end_offset: slice.end,
                        text: slice.text.clone(),
                        metadata,
                    },
                )
            })
            .collect();
        let total_chunks = records_meta.len();
        let text_length = text.chars().count();

        if let Err(error) = self
            .store
            .ensure_collection(self.embedder.dimensions(), DistanceMetric::Cosine)
            .await
        {
            return IngestReport::failed(error, started);
        }

        // Clean replace: without this, a re-run would double-count the
        // manual in stats() even though chunk ids are deterministic for
        // unchanged text.
        if let Err(error) = self.store.delete_by_owner(&manual.id).await {
            return IngestReport::failed(error, started);
        }

        info!(
            manual = %manual.id,
            chunks = total_chunks,
            text_length,
            "ingesting manual"
        );

        let batches: Vec<Vec<(usize, VectorPayload)>> = records_meta
            .chunks(self.config.upsert_batch.max(1))
            .map(|batch| batch.to_vec())
            .collect();

        let outcomes: Vec<Result<usize, IngestError>> = stream::iter(batches)
            .map(|batch| async move {
                // Abort is honored at batch boundaries only; a batch in
                // flight completes so search never sees half a batch.
                if abort.load(Ordering::Relaxed) {
                    return Ok(0);
                }
                let written = self.write_batch(manual, &batch).await?;
                tokio::time::sleep(self.config.batch_delay).await;
                Ok(written)
            })
            .buffer_unordered(self.config.workers.max(1))
            .collect()
            .await;

        let mut chunks_created = 0usize;
        let mut first_error: Option<String> = None;
        for outcome in outcomes {
            match outcome {
                Ok(written) => chunks_created += written,
                Err(error) => {
                    warn!(manual = %manual.id, error = %error, "ingestion batch failed");
                    if first_error.is_none() {
                        first_error = Some(error.to_string());
                    }
                }
            }
        }

        IngestReport {
            chunks_created,
            total_chunks,
            text_length,
            duration_ms: started.elapsed().as_millis() as u64,
            error: first_error,
        }
    }

    async fn write_batch(
        &self,
        manual: &Manual,
        batch: &[(usize, VectorPayload)],
    ) -> Result<usize, IngestError> {
        let texts: Vec<String> = batch.iter().map(|(_, p)| p.text.clone()).collect();
        let vectors = self.embed_with_retry(&texts).await?;

        let records: Vec<VectorRecord> = batch
            .iter()
            .zip(vectors)
            .map(|((index, payload), vector)| VectorRecord {
                id: chunk_point_id(&manual.id, *index),
                vector,
                payload: payload.clone(),
            })
            .collect();

        self.store.upsert(&records).await?;
        Ok(records.len())
    }

    async fn embed_with_retry(
        &self,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut attempt = 0u32;
        loop {
            match self.embedder.embed_batch(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(error) => {
                    attempt += 1;
                    if attempt >= self.config.embed_retries.max(1) {
                        return Err(error);
                    }
                    let backoff = Duration::from_millis(200) * 2u32.pow(attempt - 1);
                    warn!(
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %error,
                        "embedding retry"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

/// Recursively finds ingestible manual files (pdf or txt) under a folder.
pub fn discover_manual_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let ingestible = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                ext.eq_ignore_ascii_case("pdf") || ext.eq_ignore_ascii_case("txt")
            });

        if ingestible {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

/// Content fingerprint of a manual file, logged at ingestion so uploads of
/// identical files can be spotted in the audit trail.
pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbedder;
    use crate::error::StoreError;
    use crate::models::{CollectionStats, ScoredRecord, SearchFilter};
    use crate::store::ScrollPage;
    use crate::stores::FileStore;
    use async_trait::async_trait;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    fn manual(id: &str) -> Manual {
        let mut manual = Manual::new(id, format!("{id} service manual"), "/tmp/manual.pdf");
        manual.brand = Some("Thermo King".to_string());
        manual.model = Some("SL-400".to_string());
        manual
    }

    fn small_config() -> IngestorConfig {
        IngestorConfig {
            chunker: ChunkerConfig {
                chunk_size: 1_000,
                overlap: 200,
            },
            upsert_batch: 2,
            workers: 2,
            batch_delay: Duration::from_millis(0),
            embed_retries: 2,
        }
    }

    fn three_pages() -> (String, Vec<PageBoundary>) {
        let text: String = ('a'..='z').cycle().take(3_000).collect();
        let pages = vec![
            PageBoundary { number: 1, start: 0, end: 1_000 },
            PageBoundary { number: 2, start: 1_000, end: 2_000 },
            PageBoundary { number: 3, start: 2_000, end: 3_000 },
        ];
        (text, pages)
    }

    async fn ingestor_over(dir: &tempfile::TempDir) -> (DocumentIngestor, Arc<dyn VectorStore>) {
        let store: Arc<dyn VectorStore> =
            Arc::new(FileStore::open(dir.path().join("vectors.json")).unwrap());
        let embedder = Arc::new(HashEmbedder { dimensions: 32 });
        let ingestor =
            DocumentIngestor::new(Arc::clone(&store), embedder, small_config()).unwrap();
        (ingestor, store)
    }

    #[tokio::test]
    async fn three_page_manual_creates_four_attributed_chunks() {
        let dir = tempdir().unwrap();
        let (ingestor, store) = ingestor_over(&dir).await;
        let (text, pages) = three_pages();

        let abort = AtomicBool::new(false);
        let report = ingestor
            .ingest_text(&manual("m1"), &text, &pages, &abort)
            .await;

        assert!(report.is_complete(), "error: {:?}", report.error);
        assert_eq!(report.chunks_created, 4);
        assert_eq!(report.text_length, 3_000);
        assert_eq!(store.stats().await.unwrap().count, 4);

        let page = store.scroll(None, 10).await.unwrap();
        for record in page.records {
            let page_no = record.payload.page.expect("page attribution");
            assert!((1..=3).contains(&page_no));
        }
    }

    #[tokio::test]
    async fn re_ingestion_is_idempotent() {
        let dir = tempdir().unwrap();
        let (ingestor, store) = ingestor_over(&dir).await;
        let (text, pages) = three_pages();
        let abort = AtomicBool::new(false);

        let first = ingestor
            .ingest_text(&manual("m1"), &text, &pages, &abort)
            .await;
        let ids_first: Vec<_> = {
            let mut ids: Vec<_> = store
                .scroll(None, 100)
                .await
                .unwrap()
                .records
                .iter()
                .map(|r| r.id)
                .collect();
            ids.sort();
            ids
        };

        let second = ingestor
            .ingest_text(&manual("m1"), &text, &pages, &abort)
            .await;
        let ids_second: Vec<_> = {
            let mut ids: Vec<_> = store
                .scroll(None, 100)
                .await
                .unwrap()
                .records
                .iter()
                .map(|r| r.id)
                .collect();
            ids.sort();
            ids
        };

        assert_eq!(first.chunks_created, second.chunks_created);
        assert_eq!(ids_first, ids_second);
        assert_eq!(store.stats().await.unwrap().count, 4);
    }

    #[tokio::test]
    async fn chunk_metadata_inherits_the_manual_brand_and_model() {
        let dir = tempdir().unwrap();
        let (ingestor, store) = ingestor_over(&dir).await;
        let abort = AtomicBool::new(false);

        let report = ingestor
            .ingest_text(
                &manual("m1"),
                "Check the suction valve before restarting the unit.",
                &[],
                &abort,
            )
            .await;
        assert!(report.is_complete());

        let records = store.scroll(None, 10).await.unwrap().records;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].payload.metadata.brand.as_deref(), Some("Thermo King"));
        assert_eq!(records[0].payload.metadata.model.as_deref(), Some("SL-400"));
        assert!(records[0].payload.page.is_none());
    }

    #[tokio::test]
    async fn empty_text_ingests_zero_chunks_without_error() {
        let dir = tempdir().unwrap();
        let (ingestor, _store) = ingestor_over(&dir).await;
        let abort = AtomicBool::new(false);

        let report = ingestor
            .ingest_text(&manual("m1"), "   \n ", &[], &abort)
            .await;
        assert!(report.is_complete());
        assert_eq!(report.total_chunks, 0);
    }

    #[tokio::test]
    async fn abort_before_start_writes_nothing() {
        let dir = tempdir().unwrap();
        let (ingestor, store) = ingestor_over(&dir).await;
        let (text, pages) = three_pages();

        let abort = AtomicBool::new(true);
        let report = ingestor
            .ingest_text(&manual("m1"), &text, &pages, &abort)
            .await;

        assert_eq!(report.chunks_created, 0);
        assert_eq!(report.total_chunks, 4);
        assert_eq!(store.stats().await.unwrap().count, 0);
    }

    /// Store whose upserts always fail; everything else delegates nowhere.
    struct BrokenStore;

    #[async_trait]
    impl VectorStore for BrokenStore {
        async fn ensure_collection(
            &self,
            _dimension: usize,
            _metric: DistanceMetric,
        ) -> Result<(), StoreError> {
            Ok(())
        }

        async fn upsert(&self, _records: &[VectorRecord]) -> Result<(), StoreError> {
            Err(StoreError::Request("backend down".to_string()))
        }

        async fn search(
            &self,
            _query_vector: &[f32],
            _k: usize,
            _filter: Option<&SearchFilter>,
        ) -> Result<Vec<ScoredRecord>, StoreError> {
            Ok(Vec::new())
        }

        async fn delete_by_owner(&self, _manual_id: &str) -> Result<(), StoreError> {
            Ok(())
        }

        async fn scroll(
            &self,
            _cursor: Option<&str>,
            _limit: usize,
        ) -> Result<ScrollPage, StoreError> {
            Ok(ScrollPage {
                records: Vec::new(),
                next_cursor: None,
            })
        }

        async fn stats(&self) -> Result<CollectionStats, StoreError> {
            Ok(CollectionStats {
                count: 0,
                distinct_owners: 0,
            })
        }
    }

    #[tokio::test]
    async fn failing_batches_surface_as_partial_success() {
        let embedder = Arc::new(HashEmbedder { dimensions: 32 });
        let ingestor =
            DocumentIngestor::new(Arc::new(BrokenStore), embedder, small_config()).unwrap();
        let (text, pages) = three_pages();
        let abort = AtomicBool::new(false);

        let report = ingestor
            .ingest_text(&manual("m1"), &text, &pages, &abort)
            .await;

        assert_eq!(report.chunks_created, 0);
        assert_eq!(report.total_chunks, 4);
        assert!(report.error.is_some());
        assert!(!report.is_complete());
    }

    #[test]
    fn discovery_finds_pdf_and_txt_recursively() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let nested = dir.path().join("nested");
        fs::create_dir(&nested)?;

        File::create(dir.path().join("a.pdf"))
            .and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(nested.join("b.txt")).and_then(|mut file| file.write_all(b"notes"))?;
        File::create(nested.join("c.csv")).and_then(|mut file| file.write_all(b"skip"))?;

        let files = discover_manual_files(dir.path());
        assert_eq!(files.len(), 2);
        Ok(())
    }

    #[test]
    fn digest_is_stable_and_content_sensitive() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, "defrost procedure")?;
        fs::write(&b, "defrost procedure!")?;

        assert_eq!(digest_file(&a)?, digest_file(&a)?);
        assert_ne!(digest_file(&a)?, digest_file(&b)?);
        Ok(())
    }
}
