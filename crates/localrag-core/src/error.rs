use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// The external collaborator an operation was waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Embedder,
    VectorIndex,
    Generator,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Embedder => "embedder",
            Capability::VectorIndex => "vector index",
            Capability::Generator => "generator",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Prompt template is missing the `{{{0}}}` slot")]
    MissingSlot(&'static str),

    #[error("Dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Failed to ingest document '{document}': {source}")]
    Ingestion {
        document: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("{capability} did not respond within {timeout:?}")]
    CapabilityTimeout { capability: Capability, timeout: Duration },

    #[error("Index '{name}' already exists as {existing}, requested {requested}")]
    ConfigConflict { name: String, existing: String, requested: String },

    #[error("Index '{0}' is not provisioned")]
    NotFound(String),

    #[error("Pipeline is not ready; provision the index first")]
    NotReady,

    #[error("No context retrieved for question and empty context is rejected")]
    EmptyContext,

    #[error("Vector index backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap any failure on the ingest path, naming the document it happened on.
    pub fn ingestion<E>(document: impl Into<String>, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error::Ingestion { document: document.into(), source: source.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
