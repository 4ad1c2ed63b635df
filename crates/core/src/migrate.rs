use crate::error::StoreError;
use crate::models::{DistanceMetric, VectorRecord};
use crate::store::VectorStore;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// Smallest sub-batch attempted before a migration batch is given up on.
const MIN_MIGRATION_BATCH: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub migrated: u64,
    pub skipped: u64,
}

/// Bulk-copies every record from `source` into `dest` without re-embedding,
/// used when changing backends.
///
/// Reads are paged via `scroll`; writes go in batches of `batch_size`. The
/// destination collection is created on first use, sized from the source
/// vectors, so migrating into a brand-new backend needs no prior setup. A
/// failing batch is retried at half size down to [`MIN_MIGRATION_BATCH`]
/// before its records are counted as skipped; one bad batch never aborts
/// the whole migration, but fatal configuration errors (wrong dimension,
/// collection not ready) abort immediately. Re-running is safe because
/// `upsert` overwrites by id. Note: copying vectors only makes sense
/// between collections pinned to the same embedding provider; switching
/// providers requires re-ingestion.
pub async fn migrate(
    source: &dyn VectorStore,
    dest: &dyn VectorStore,
    batch_size: usize,
    abort: &AtomicBool,
) -> Result<MigrationReport, StoreError> {
    let batch_size = batch_size.max(1);
    let mut report = MigrationReport::default();
    let mut cursor: Option<String> = None;
    let mut dest_ready = false;

    loop {
        if abort.load(Ordering::Relaxed) {
            info!(
                migrated = report.migrated,
                skipped = report.skipped,
                "migration aborted at batch boundary"
            );
            return Ok(report);
        }

        let page = source.scroll(cursor.as_deref(), batch_size).await?;
        if page.records.is_empty() {
            break;
        }

        if !dest_ready {
            let dimension = page.records[0].vector.len();
            dest.ensure_collection(dimension, DistanceMetric::Cosine)
                .await?;
            dest_ready = true;
        }

        let (migrated, skipped) = write_with_halving(dest, &page.records, batch_size).await?;
        report.migrated += migrated;
        report.skipped += skipped;

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    info!(
        migrated = report.migrated,
        skipped = report.skipped,
        "migration finished"
    );
    Ok(report)
}

async fn write_with_halving(
    dest: &dyn VectorStore,
    records: &[VectorRecord],
    batch_size: usize,
) -> Result<(u64, u64), StoreError> {
    let mut migrated = 0u64;
    let mut skipped = 0u64;
    // (start, len) work items; manual stack instead of async recursion.
    let mut pending: Vec<(usize, usize)> = vec![(0, records.len())];

    while let Some((start, len)) = pending.pop() {
        if len == 0 {
            continue;
        }
        let slice = &records[start..start + len];
        match dest.upsert(slice).await {
            Ok(()) => migrated += len as u64,
            // Halving only helps when a specific record poisons a batch;
            // a configuration error fails every batch identically.
            Err(error) if error.is_fatal() => return Err(error),
            Err(error) => {
                if len <= MIN_MIGRATION_BATCH.min(batch_size) {
                    warn!(start, len, error = %error, "migration batch skipped");
                    skipped += len as u64;
                } else {
                    let half = len / 2;
                    warn!(start, len, halved_to = half, error = %error, "migration batch halved");
                    pending.push((start + half, len - half));
                    pending.push((start, half));
                }
            }
        }
    }

    Ok((migrated, skipped))
}
