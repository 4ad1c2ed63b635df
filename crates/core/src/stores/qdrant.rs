use crate::error::StoreError;
use crate::models::{
    CollectionStats, DistanceMetric, ScoredRecord, SearchFilter, VectorPayload, VectorRecord,
};
use crate::store::{ScrollPage, VectorStore};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

/// Smallest batch the halving fallback will attempt. A batch at this size
/// that still fails is surfaced to the caller as the failed unit.
const MIN_BATCH: usize = 50;

/// Vector-database client speaking the JSON-over-HTTP points protocol.
///
/// Serves both remote deployments (endpoint + credential) and the local
/// development daemon (plain endpoint, no credential); the two differ only
/// in construction, never in behavior. Upserts are batched to stay under
/// request-size limits, retried with exponential backoff, and split into
/// halves down to [`MIN_BATCH`] when a batch keeps failing, so one bad
/// record voids a sub-batch instead of the whole write.
pub struct QdrantStore {
    client: Client,
    endpoint: String,
    collection: String,
    api_key: Option<String>,
    vector_size: usize,
    batch_size: usize,
    max_retries: u32,
    backoff_base: Duration,
}

impl QdrantStore {
    pub fn new(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
        vector_size: usize,
    ) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            api_key: None,
            vector_size,
            batch_size: 500,
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
        }
    }

    /// Local embedded daemon: same wire contract, no credential.
    pub fn local(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
        vector_size: usize,
    ) -> Self {
        Self::new(endpoint, collection, vector_size)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.endpoint, self.collection, suffix)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(api_key) => request.header("api-key", api_key),
            None => request,
        }
    }

    fn bad_status(status: StatusCode) -> StoreError {
        StoreError::BackendResponse {
            backend: "qdrant".to_string(),
            details: status.to_string(),
        }
    }

    fn record_to_point(&self, record: &VectorRecord) -> Result<Value, StoreError> {
        if record.vector.len() != self.vector_size {
            return Err(StoreError::BadVectorDimension {
                expected: self.vector_size,
                actual: record.vector.len(),
            });
        }
        Ok(json!({
            "id": record.id,
            "vector": record.vector,
            "payload": record.payload,
        }))
    }

    async fn upsert_once(&self, records: &[VectorRecord]) -> Result<(), StoreError> {
        let points = records
            .iter()
            .map(|record| self.record_to_point(record))
            .collect::<Result<Vec<_>, StoreError>>()?;

        let response = self
            .authorized(self.client.put(self.collection_url("/points?wait=true")))
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::bad_status(response.status()));
        }
        Ok(())
    }

    async fn upsert_with_retries(&self, records: &[VectorRecord]) -> Result<(), StoreError> {
        let mut attempt = 0u32;
        loop {
            match self.upsert_once(records).await {
                Ok(()) => return Ok(()),
                Err(error) if error.is_fatal() => return Err(error),
                Err(error) => {
                    attempt += 1;
                    if attempt >= self.max_retries {
                        return Err(error);
                    }
                    let backoff = self.backoff_base * 2u32.pow(attempt - 1);
                    warn!(
                        batch = records.len(),
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %error,
                        "qdrant upsert retry"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// Retries the batch; on persistent failure splits it in half down to
    /// [`MIN_BATCH`], isolating a malformed record to a sub-batch.
    fn upsert_resilient<'a>(
        &'a self,
        records: &'a [VectorRecord],
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        async move {
            match self.upsert_with_retries(records).await {
                Ok(()) => Ok(()),
                Err(error) if error.is_fatal() => Err(error),
                Err(error) => {
                    if records.len() <= MIN_BATCH {
                        return Err(error);
                    }
                    let mid = records.len() / 2;
                    warn!(
                        batch = records.len(),
                        halved_to = mid,
                        "qdrant batch failed, halving"
                    );
                    self.upsert_resilient(&records[..mid]).await?;
                    self.upsert_resilient(&records[mid..]).await
                }
            }
        }
        .boxed()
    }

    fn parse_hit(hit: &Value) -> Result<ScoredRecord, StoreError> {
        let id = hit
            .pointer("/id")
            .and_then(Value::as_str)
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .ok_or_else(|| StoreError::BackendResponse {
                backend: "qdrant".to_string(),
                details: "hit without a uuid id".to_string(),
            })?;
        let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0);
        let payload: VectorPayload = hit
            .pointer("/payload")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .ok_or_else(|| StoreError::BackendResponse {
                backend: "qdrant".to_string(),
                details: "hit without payload".to_string(),
            })?;

        Ok(ScoredRecord { id, score, payload })
    }

    async fn scroll_payloads(
        &self,
        with_vector: bool,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<(Vec<Value>, Option<String>), StoreError> {
        let mut body = json!({
            "limit": limit,
            "with_payload": true,
            "with_vector": with_vector,
        });
        if let Some(cursor) = cursor {
            // Cursors round-trip as either point uuids or numeric offsets.
            body["offset"] = match cursor.parse::<u64>() {
                Ok(numeric) => json!(numeric),
                Err(_) => Value::String(cursor.to_string()),
            };
        }

        let response = self
            .authorized(self.client.post(self.collection_url("/points/scroll")))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::bad_status(response.status()));
        }

        let parsed: Value = response.json().await?;
        let points = parsed
            .pointer("/result/points")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let next = match parsed.pointer("/result/next_page_offset") {
            Some(Value::String(raw)) => Some(raw.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        Ok((points, next))
    }
}

/// Builds the backend filter clauses for a metadata filter. Applied inside
/// the search request so `k` counts in-scope results only.
pub(crate) fn filter_clauses(filter: &SearchFilter) -> Option<Value> {
    let mut must = Vec::new();
    if let Some(manual_id) = &filter.manual_id {
        must.push(json!({ "key": "manual_id", "match": { "value": manual_id } }));
    }
    if let Some(model) = &filter.model {
        must.push(json!({ "key": "model", "match": { "value": model } }));
    }
    if let Some(code) = &filter.alarm_code {
        must.push(json!({ "key": "alarm_codes", "match": { "value": code } }));
    }

    if must.is_empty() {
        None
    } else {
        Some(json!({ "must": must }))
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(
        &self,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<(), StoreError> {
        if dimension != self.vector_size {
            return Err(StoreError::DimensionMismatch {
                collection: self.collection.clone(),
                expected: dimension,
                actual: self.vector_size,
            });
        }

        let response = self
            .authorized(self.client.get(self.collection_url("")))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                let parsed: Value = response.json().await?;
                let existing = parsed
                    .pointer("/result/config/params/vectors/size")
                    .and_then(Value::as_u64);
                match existing {
                    Some(size) if size as usize != dimension => {
                        Err(StoreError::DimensionMismatch {
                            collection: self.collection.clone(),
                            expected: dimension,
                            actual: size as usize,
                        })
                    }
                    _ => Ok(()),
                }
            }
            StatusCode::NOT_FOUND => {
                let response = self
                    .authorized(self.client.put(self.collection_url("")))
                    .json(&json!({
                        "vectors": {
                            "size": dimension,
                            "distance": metric.wire_name(),
                        }
                    }))
                    .send()
                    .await?;

                if !response.status().is_success() {
                    return Err(Self::bad_status(response.status()));
                }
                Ok(())
            }
            status => Err(Self::bad_status(status)),
        }
    }

    async fn upsert(&self, records: &[VectorRecord]) -> Result<(), StoreError> {
        for batch in records.chunks(self.batch_size) {
            self.upsert_resilient(batch).await?;
        }
        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<ScoredRecord>, StoreError> {
        if query_vector.len() != self.vector_size {
            return Err(StoreError::BadVectorDimension {
                expected: self.vector_size,
                actual: query_vector.len(),
            });
        }

        let mut body = json!({
            "vector": query_vector,
            "limit": k,
            "with_payload": true,
        });
        if let Some(clauses) = filter.and_then(filter_clauses) {
            body["filter"] = clauses;
        }

        let response = self
            .authorized(self.client.post(self.collection_url("/points/search")))
            .json(&body)
            .send()
            .await?;

        // A collection that was never created is an empty collection, not a
        // failure: querying before first ingest must produce zero hits.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(Self::bad_status(response.status()));
        }

        let parsed: Value = response.json().await?;
        let hits = parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        hits.iter().map(Self::parse_hit).collect()
    }

    async fn delete_by_owner(&self, manual_id: &str) -> Result<(), StoreError> {
        let response = self
            .authorized(
                self.client
                    .post(self.collection_url("/points/delete?wait=true")),
            )
            .json(&json!({
                "filter": {
                    "must": [{ "key": "manual_id", "match": { "value": manual_id } }]
                }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::bad_status(response.status()));
        }
        Ok(())
    }

    async fn scroll(
        &self,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<ScrollPage, StoreError> {
        let (points, next_cursor) = self.scroll_payloads(true, cursor, limit).await?;

        let mut records = Vec::with_capacity(points.len());
        for point in &points {
            let id = point
                .pointer("/id")
                .and_then(Value::as_str)
                .and_then(|raw| Uuid::parse_str(raw).ok())
                .ok_or_else(|| StoreError::BackendResponse {
                    backend: "qdrant".to_string(),
                    details: "scrolled point without a uuid id".to_string(),
                })?;
            let vector: Vec<f32> = point
                .pointer("/vector")
                .cloned()
                .map(serde_json::from_value)
                .transpose()?
                .unwrap_or_default();
            let payload: VectorPayload = point
                .pointer("/payload")
                .cloned()
                .map(serde_json::from_value)
                .transpose()?
                .ok_or_else(|| StoreError::BackendResponse {
                    backend: "qdrant".to_string(),
                    details: "scrolled point without payload".to_string(),
                })?;

            records.push(VectorRecord {
                id,
                vector,
                payload,
            });
        }

        Ok(ScrollPage {
            records,
            next_cursor,
        })
    }

    async fn stats(&self) -> Result<CollectionStats, StoreError> {
        let response = self
            .authorized(self.client.get(self.collection_url("")))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(CollectionStats {
                count: 0,
                distinct_owners: 0,
            });
        }
        if !response.status().is_success() {
            return Err(Self::bad_status(response.status()));
        }

        let parsed: Value = response.json().await?;
        let count = parsed
            .pointer("/result/points_count")
            .and_then(Value::as_u64)
            .unwrap_or(0);

        // The points protocol has no distinct-count; walk payloads.
        let mut owners: HashSet<String> = HashSet::new();
        let mut cursor: Option<String> = None;
        loop {
            let (points, next) = self.scroll_payloads(false, cursor.as_deref(), 1_000).await?;
            if points.is_empty() {
                break;
            }
            for point in &points {
                if let Some(owner) = point.pointer("/payload/manual_id").and_then(Value::as_str) {
                    owners.insert(owner.to_string());
                }
            }
            match next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(CollectionStats {
            count,
            distinct_owners: owners.len() as u64,
        })
    }
}
