pub mod answer;
pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod patterns;
pub mod query;
pub mod query_log;
pub mod store;
pub mod stores;

pub use answer::{Answer, AnswerAssembler, AnswerSynthesizer, SourceRef, NO_INFORMATION_ANSWER};
pub use chunking::{chunk, ChunkSlice, ChunkerConfig, PageBoundary};
pub use config::{Backend, EngineConfig};
pub use embeddings::{
    EmbeddingProvider, HashEmbedder, HttpEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{EmbeddingError, IngestError, QueryError, StoreError};
pub use extractor::{extract_document, ExtractedDocument, LopdfExtractor, PdfExtractor};
pub use ingest::{
    digest_file, discover_manual_files, DocumentIngestor, IngestReport, IngestorConfig,
};
pub use migrate::{migrate, MigrationReport};
pub use models::{
    chunk_point_id, ChunkMetadata, CollectionStats, Confidence, DistanceMetric, Manual,
    QueryContext, ScoredRecord, SearchFilter, VectorPayload, VectorRecord,
};
pub use patterns::PatternExtractor;
pub use query::{QueryEngine, Retrieval, DEFAULT_TOP_K};
pub use query_log::{QueryLog, QueryLogEntry};
pub use store::{cosine_similarity, ScrollPage, VectorStore};
pub use stores::{FileStore, QdrantStore};
