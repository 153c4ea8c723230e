//! Shared building blocks for the localrag workspace: domain types, the
//! capability traits (embedder, vector index, generator), the error taxonomy,
//! layered settings, the chunker and the prompt builder.

pub mod chunker;
pub mod config;
pub mod documents;
pub mod error;
pub mod prompt;
pub mod traits;
pub mod types;

pub use error::{Capability, Error, Result};
