pub mod file;
pub mod qdrant;

pub use file::FileStore;
pub use qdrant::QdrantStore;
