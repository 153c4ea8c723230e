//! Embedding capability implementations: a candle-backed BERT sentence
//! embedder and a deterministic hash embedder for offline use and tests.

pub mod bert;
pub mod device;
pub mod hash;
pub mod pool;
pub mod tokenize;

use std::path::Path;

use localrag_core::config::{expand_path, EmbedderKind, EmbeddingSettings};
use localrag_core::traits::Embedder;
use localrag_core::{Error, Result};
use tracing::info;

pub use bert::BertEmbedder;
pub use hash::HashEmbedder;
pub use pool::masked_mean_l2;

impl Embedder for BertEmbedder {
    fn embedder_id(&self) -> &str { self.id() }

    fn dim(&self) -> usize { BertEmbedder::dim(self) }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_text(text).map_err(|e| Error::Embedding(format!("{e:#}")))
    }
}

/// `APP_USE_FAKE_EMBEDDINGS` is set to `1` or `true`.
pub fn fake_embeddings_requested() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Build the in-process embedder named by `settings`.
///
/// `APP_USE_FAKE_EMBEDDINGS=1` forces the hash embedder regardless of `kind`.
/// Remote embedders live in `localrag-llm`; asking for one here is an error.
pub fn local_embedder(settings: &EmbeddingSettings, dim: usize) -> Result<Box<dyn Embedder>> {
    if fake_embeddings_requested() || settings.kind == EmbedderKind::Hash {
        info!(dim, "using hash embedder");
        return Ok(Box::new(HashEmbedder::new(dim)));
    }
    match settings.kind {
        EmbedderKind::Bert => {
            let dir = bert::resolve_model_dir(Path::new(&expand_path(&settings.model_dir)))
                .map_err(|e| Error::InvalidConfiguration(format!("{e:#}")))?;
            let model = BertEmbedder::load(&dir).map_err(|e| Error::Embedding(format!("{e:#}")))?;
            Ok(Box::new(model))
        }
        other => Err(Error::InvalidConfiguration(format!("{other:?} is not a local embedder"))),
    }
}
