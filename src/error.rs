//! Error types for ingestion, storage and the read proxy

use thiserror::Error;

use crate::id::FileId;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Failure of the persistence layer
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Sled(#[from] sled::Error),

    #[error("Chunk encoding error: {0}")]
    Encode(#[from] bincode::Error),

    #[error("Metadata encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Aggregate failure of one ingestion run
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Parse failure: {0}")]
    ParseFailure(String),

    #[error("Read error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A proxy accessor was used before its backing data was fetched.
///
/// This is a programming error on the caller side (missing `load_metadata`),
/// so it is a separate type and never wraps an environment failure.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{0} accessed before metadata was loaded")]
pub struct NotLoaded(pub &'static str);

/// Failure on the read path
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error(transparent)]
    NotLoaded(#[from] NotLoaded),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("File {0} has no completed ingestion")]
    NotIngested(FileId),

    #[error("Feature index {index} out of range (len {len})")]
    OutOfRange { index: usize, len: usize },
}
