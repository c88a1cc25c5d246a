//! Custom error types for archivist

use thiserror::Error;

/// Main error type for archivist operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Vector backend error: {0}")]
    VectorBackend(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Read error: {0}")]
    Read(String),

    #[error("Corrupt reference for document {doc_id}: {detail}")]
    CorruptReference { doc_id: String, detail: String },

    #[error("Persist failed: {0}")]
    Persist(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Not initialized: run 'archivist init' first")]
    NotInitialized,

    #[error("Already initialized at {0}")]
    AlreadyInitialized(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

/// Convert qdrant errors
impl From<qdrant_client::QdrantError> for Error {
    fn from(err: qdrant_client::QdrantError) -> Self {
        Error::VectorBackend(err.to_string())
    }
}

/// Result type alias for archivist
pub type Result<T> = std::result::Result<T, Error>;
