use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use localrag_core::config::{EmbeddingSettings, GeneratorSettings};
use localrag_core::traits::{Embedder, Generator};
use localrag_core::{Capability, Error, Result};

use crate::http::JsonClient;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

/// Non-streaming completion via `POST /api/generate`.
pub struct OllamaGenerator {
    http: JsonClient,
    model: String,
}

impl OllamaGenerator {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self { http: JsonClient::new(base_url, timeout, Capability::Generator)?, model: model.to_string() })
    }

    pub fn from_settings(settings: &GeneratorSettings) -> Result<Self> {
        Self::new(&settings.base_url, &settings.model, Duration::from_secs(settings.timeout_secs))
    }
}

impl Generator for OllamaGenerator {
    fn model(&self) -> &str { &self.model }

    fn generate(&self, prompt: &str) -> Result<String> {
        let start = Instant::now();
        let body = GenerateRequest { model: &self.model, prompt, stream: false };
        let out: GenerateResponse = self.http.post("/api/generate", &body)?;
        debug!(model = %self.model, ms = start.elapsed().as_millis() as u64, chars = out.response.len(), "generated");
        Ok(out.response)
    }
}

/// Remote embeddings via `POST /api/embeddings`. `dim` is what the model is
/// expected to produce; callers compare it against the index.
pub struct OllamaEmbedder {
    http: JsonClient,
    model: String,
    dim: usize,
    id: String,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: &str, dim: usize, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: JsonClient::new(base_url, timeout, Capability::Embedder)?,
            model: model.to_string(),
            dim,
            id: format!("ollama:{model}"),
        })
    }

    pub fn from_settings(settings: &EmbeddingSettings, dim: usize) -> Result<Self> {
        Self::new(&settings.base_url, &settings.model, dim, Duration::from_secs(settings.timeout_secs))
    }
}

impl Embedder for OllamaEmbedder {
    fn embedder_id(&self) -> &str { &self.id }

    fn dim(&self) -> usize { self.dim }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = EmbeddingsRequest { model: &self.model, prompt: text };
        let out: EmbeddingsResponse = self.http.post("/api/embeddings", &body)?;
        if out.embedding.is_empty() {
            return Err(Error::Embedding(format!("model '{}' returned an empty embedding", self.model)));
        }
        Ok(out.embedding)
    }
}
