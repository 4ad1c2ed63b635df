use crate::chunking::ChunkerConfig;
use crate::embeddings::{
    EmbeddingProvider, HashEmbedder, HttpEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
use crate::ingest::IngestorConfig;
use crate::store::VectorStore;
use crate::stores::{FileStore, QdrantStore};
use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Which vector backend the engine talks to.
///
/// `Local` is a Qdrant daemon on this machine; it speaks the exact same
/// protocol as `Remote`, just without a credential, so both map onto
/// [`QdrantStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    File,
    Local,
    Remote,
}

impl Backend {
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "local" => Ok(Self::Local),
            "remote" | "qdrant" => Ok(Self::Remote),
            other => bail!("unknown vector backend {other:?} (expected file, local or remote)"),
        }
    }
}

/// Engine configuration, assembled from environment variables with
/// defaults that work out of the box (file backend, hashing embedder).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub backend: Backend,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub collection: String,
    pub dimension: usize,
    pub data_dir: PathBuf,
    pub chunker: ChunkerConfig,
    pub upsert_batch: usize,
    pub embedding_endpoint: Option<String>,
    pub embedding_model: String,
    pub embedding_api_key: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: Backend::File,
            endpoint: "http://localhost:6333".to_string(),
            api_key: None,
            collection: "manual_chunks".to_string(),
            dimension: DEFAULT_EMBEDDING_DIMENSIONS,
            data_dir: PathBuf::from("./data"),
            chunker: ChunkerConfig::default(),
            upsert_batch: 500,
            embedding_endpoint: None,
            embedding_model: "all-MiniLM-L6-v2".to_string(),
            embedding_api_key: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(backend) = env::var("VECTOR_BACKEND") {
            config.backend = Backend::parse(&backend)?;
        }
        if let Ok(endpoint) = env::var("VECTOR_ENDPOINT") {
            config.endpoint = endpoint;
        }
        config.api_key = env::var("VECTOR_API_KEY").ok().filter(|k| !k.is_empty());
        if let Ok(collection) = env::var("VECTOR_COLLECTION") {
            config.collection = collection;
        }
        if let Ok(dimension) = env::var("VECTOR_DIMENSION") {
            config.dimension = dimension
                .parse()
                .context("VECTOR_DIMENSION must be a positive integer")?;
        }
        if let Ok(dir) = env::var("DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(size) = env::var("CHUNK_SIZE") {
            config.chunker.chunk_size = size.parse().context("CHUNK_SIZE must be an integer")?;
        }
        if let Ok(overlap) = env::var("CHUNK_OVERLAP") {
            config.chunker.overlap = overlap
                .parse()
                .context("CHUNK_OVERLAP must be an integer")?;
        }
        if let Ok(batch) = env::var("UPSERT_BATCH") {
            config.upsert_batch = batch.parse().context("UPSERT_BATCH must be an integer")?;
        }
        config.embedding_endpoint = env::var("EMBEDDING_ENDPOINT")
            .ok()
            .filter(|e| !e.is_empty());
        if let Ok(model) = env::var("EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        config.embedding_api_key = env::var("EMBEDDING_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.collection.is_empty() {
            bail!("collection name must not be empty");
        }
        if self.dimension == 0 {
            bail!("vector dimension must be positive");
        }
        if self.chunker.overlap >= self.chunker.chunk_size {
            bail!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.chunker.overlap,
                self.chunker.chunk_size
            );
        }
        if self.upsert_batch == 0 {
            bail!("upsert batch size must be positive");
        }
        if self.backend == Backend::Remote && self.api_key.is_none() {
            bail!("remote backend requires VECTOR_API_KEY");
        }
        if self.backend != Backend::File {
            url::Url::parse(&self.endpoint)
                .with_context(|| format!("invalid vector endpoint {:?}", self.endpoint))?;
        }
        if let Some(endpoint) = &self.embedding_endpoint {
            url::Url::parse(endpoint)
                .with_context(|| format!("invalid embedding endpoint {endpoint:?}"))?;
        }
        Ok(())
    }

    pub fn build_store(&self) -> Result<Arc<dyn VectorStore>> {
        let store: Arc<dyn VectorStore> = match self.backend {
            Backend::File => {
                let path = self
                    .data_dir
                    .join(format!("{}.vectors.json", self.collection));
                info!(path = %path.display(), "using file-backed vector store");
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("creating {}", parent.display()))?;
                }
                Arc::new(FileStore::open(path)?)
            }
            Backend::Local => {
                info!(endpoint = %self.endpoint, collection = %self.collection, "using local vector daemon");
                Arc::new(
                    QdrantStore::local(&self.endpoint, &self.collection, self.dimension)
                        .with_batch_size(self.upsert_batch),
                )
            }
            Backend::Remote => {
                info!(endpoint = %self.endpoint, collection = %self.collection, "using remote vector store");
                let api_key = self
                    .api_key
                    .clone()
                    .context("remote backend requires VECTOR_API_KEY")?;
                Arc::new(
                    QdrantStore::new(&self.endpoint, &self.collection, self.dimension)
                        .with_api_key(api_key)
                        .with_batch_size(self.upsert_batch),
                )
            }
        };
        Ok(store)
    }

    pub fn build_embedder(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        let embedder: Arc<dyn EmbeddingProvider> = match &self.embedding_endpoint {
            Some(endpoint) => {
                info!(endpoint = %endpoint, model = %self.embedding_model, "using http embedding provider");
                let mut embedder =
                    HttpEmbedder::new(endpoint, &self.embedding_model, self.dimension);
                if let Some(key) = &self.embedding_api_key {
                    embedder = embedder.with_api_key(key.clone());
                }
                Arc::new(embedder)
            }
            None => {
                info!(dimensions = self.dimension, "using hashing embedding provider");
                Arc::new(HashEmbedder::new(self.dimension))
            }
        };
        Ok(embedder)
    }

    pub fn ingestor_config(&self) -> IngestorConfig {
        IngestorConfig {
            chunker: self.chunker,
            upsert_batch: self.upsert_batch,
            ..IngestorConfig::default()
        }
    }
}
