use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

use localrag_core::traits::Embedder;
use localrag_core::{Error, Result};

/// Deterministic bag-of-tokens embedding. Each lowercased token is hashed
/// into one of `dim` buckets; the result is L2-normalized. Texts sharing
/// words land close together, which is enough for offline runs and tests.
pub struct HashEmbedder {
    dim: usize,
    id: String,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim, id: format!("hash:xxh64:d{dim}") }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = 0.5 + (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v { *x /= norm; }
        }
        v
    }
}

impl Embedder for HashEmbedder {
    fn embedder_id(&self) -> &str { &self.id }

    fn dim(&self) -> usize { self.dim }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.dim == 0 {
            return Err(Error::Embedding("hash embedder dimension is zero".into()));
        }
        Ok(self.embed_text(text))
    }
}
