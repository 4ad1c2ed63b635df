use crate::error::EmbeddingError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;

/// Inputs longer than this are truncated before embedding. Truncation is
/// deterministic (a fixed character prefix), never sampled; callers should
/// pre-chunk so this path is rarely hit.
pub const MAX_EMBED_CHARS: usize = 8_000;

/// Turns text into a fixed-dimension vector.
///
/// Implementations must unit-normalize their output so cosine similarity and
/// dot product coincide in cosine-configured collections. A provider failure
/// is an error; embedding a zero vector instead would rank arbitrarily in
/// later searches and silently corrupt retrieval quality.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

pub fn truncate_for_embedding(text: &str) -> &str {
    match text.char_indices().nth(MAX_EMBED_CHARS) {
        Some((byte_offset, _)) => &text[..byte_offset],
        None => text,
    }
}

pub fn normalize_in_place(vector: &mut [f32]) {
    let magnitude = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in vector.iter_mut() {
            *value /= magnitude;
        }
    }
}

/// In-process character-trigram hashing embedder.
///
/// Not a semantic model, but deterministic, dependency-free, and good enough
/// for tests and air-gapped development. Output is unit-normalized.
#[derive(Debug, Clone, Copy)]
pub struct HashEmbedder {
    pub dimensions: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn embed_sync(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let lowered = truncate_for_embedding(text).to_lowercase();
        if lowered.trim().is_empty() {
            // A zero vector would rank arbitrarily; refuse instead.
            return Err(EmbeddingError::EmptyInput);
        }

        let mut vector = vec![0f32; self.dimensions.max(1)];
        let chars: Vec<char> = lowered.chars().collect();

        if chars.len() < 3 {
            bump_bucket(&mut vector, &lowered);
        } else {
            for window in chars.windows(3) {
                let token = window.iter().collect::<String>();
                bump_bucket(&mut vector, &token);
            }
        }

        normalize_in_place(&mut vector);
        Ok(vector)
    }
}

fn bump_bucket(vector: &mut [f32], token: &str) {
    // FNV-1a
    let mut hash = 1469598103934665603u64;
    for byte in token.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    let bucket = (hash % vector.len() as u64) as usize;
    vector[bucket] += 1.0;
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_sync(text)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|text| self.embed_sync(text)).collect()
    }
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Remote embedding API client: JSON `{model, input}` in, `{embeddings}` out,
/// optional bearer credential. One pinned provider per collection is a hard
/// precondition for retrieval quality, so deployments configure exactly one
/// endpoint + model pair per collection.
pub struct HttpEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    dimensions: usize,
}

impl HttpEmbedder {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: None,
            dimensions,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    async fn request(&self, inputs: Vec<&str>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let expected = inputs.len();
        let mut request = self.client.post(&self.endpoint).json(&json!({
            "model": self.model,
            "input": inputs,
        }));
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EmbeddingError::Backend {
                status: status.as_u16(),
                details: response.text().await.unwrap_or_default(),
            });
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|error| EmbeddingError::MalformedResponse(error.to_string()))?;

        if parsed.embeddings.len() != expected {
            return Err(EmbeddingError::CountMismatch {
                expected,
                actual: parsed.embeddings.len(),
            });
        }

        let mut vectors = parsed.embeddings;
        for vector in &mut vectors {
            if vector.len() != self.dimensions {
                return Err(EmbeddingError::MalformedResponse(format!(
                    "provider returned {}-dim vector, expected {}",
                    vector.len(),
                    self.dimensions
                )));
            }
            normalize_in_place(vector);
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let vectors = self.request(vec![truncate_for_embedding(text)]).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::MalformedResponse("empty embeddings array".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let inputs: Vec<&str> = texts
            .iter()
            .map(|text| truncate_for_embedding(text))
            .collect();
        self.request(inputs).await
    }
}
