use localrag_core::traits::{Embedder, VectorIndex};
use localrag_core::types::QueryResult;
use localrag_core::{Error, Result};
use tracing::debug;

/// Query side of the index: embed the question, then nearest-neighbor search.
pub struct Retriever<'a> {
    embedder: &'a dyn Embedder,
    index: &'a dyn VectorIndex,
    index_name: &'a str,
    dimension: usize,
}

impl<'a> Retriever<'a> {
    pub fn new(embedder: &'a dyn Embedder, index: &'a dyn VectorIndex, index_name: &'a str, dimension: usize) -> Self {
        Self { embedder, index, index_name, dimension }
    }

    /// At most `k` hits, best first. An empty index yields an empty result.
    pub fn retrieve(&self, query: &str, k: usize) -> Result<QueryResult> {
        let vector = self.embedder.embed(query)?;
        if vector.len() != self.dimension {
            return Err(Error::DimensionMismatch { expected: self.dimension, actual: vector.len() });
        }
        let hits = self.index.query(self.index_name, &vector, k).map_err(|e| match e {
            Error::Backend(_) | Error::NotFound(_) => Error::Retrieval(e.to_string()),
            other => other,
        })?;
        debug!(index = self.index_name, k, hits = hits.len(), top = hits.first().map(|h| h.score), "retrieved");
        Ok(hits)
    }
}
