//! Ingest and question answering over the embedder, vector index and
//! generator capabilities.

pub mod pipeline;
pub mod retriever;

pub use pipeline::{Pipeline, PipelineState};
pub use retriever::Retriever;
