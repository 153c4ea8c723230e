use crate::error::Result;
use crate::types::{ChunkId, IndexEntry, IndexSpec, QueryResult};

/// Maps text to a fixed-dimension vector. Identical input within a session
/// must produce identical output.
pub trait Embedder: Send + Sync {
    /// Stable identifier for the model behind this embedder.
    fn embedder_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// A nearest-neighbor store holding any number of named indexes.
pub trait VectorIndex: Send + Sync {
    /// Create the index, or do nothing when it already exists with the same
    /// dimension and metric. A different shape is a `ConfigConflict`.
    fn provision(&self, spec: &IndexSpec) -> Result<()>;

    /// Insert or replace entries by id. Every vector must match the index
    /// dimension; a mismatch rejects the whole call before anything is written.
    fn upsert(&self, index: &str, entries: &[IndexEntry]) -> Result<()>;

    /// The `k` entries most similar to `vector`, best first.
    fn query(&self, index: &str, vector: &[f32], k: usize) -> Result<QueryResult>;

    /// Delete the entries of `document_id` whose id is not in `keep`.
    /// Returns how many entries were removed.
    fn prune_document(&self, index: &str, document_id: &str, keep: &[ChunkId]) -> Result<usize>;

    /// Drop the index. Dropping a missing index is not an error.
    fn deprovision(&self, index: &str) -> Result<()>;

    /// Parameters of an existing index, `None` when it is not provisioned.
    fn describe(&self, index: &str) -> Result<Option<IndexSpec>>;

    fn count(&self, index: &str) -> Result<usize>;
}

/// Maps a prompt to generated text.
pub trait Generator: Send + Sync {
    /// Identifier of the model answering prompts.
    fn model(&self) -> &str;
    fn generate(&self, prompt: &str) -> Result<String>;
}
