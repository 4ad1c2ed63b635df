use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store failed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("cannot embed empty text")]
    EmptyInput,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding backend returned {status}: {details}")]
    Backend { status: u16, details: String },

    #[error("embedding response malformed: {0}")]
    MalformedResponse(String),

    #[error("provider returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Fatal configuration error. Retrying cannot fix a dimension mismatch,
    /// so callers must surface this immediately instead of backing off.
    #[error("collection {collection} holds {actual}-dim vectors, expected {expected}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },

    #[error("vector dimension {actual} does not match collection dimension {expected}")]
    BadVectorDimension { expected: usize, actual: usize },

    #[error("store request failed: {0}")]
    Request(String),

    #[error("store not available yet: {0}")]
    NotReady(String),
}

impl StoreError {
    /// Configuration errors that retrying or batch-splitting cannot fix.
    /// Callers must surface these immediately instead of backing off.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StoreError::DimensionMismatch { .. }
                | StoreError::BadVectorDimension { .. }
                | StoreError::Serialization(_)
                | StoreError::NotReady(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store failed: {0}")]
    Store(#[from] StoreError),

    #[error("answer synthesis failed: {0}")]
    Synthesis(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
