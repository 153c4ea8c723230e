//! Sentence embeddings from a local BERT checkpoint (e.g. all-MiniLM-L6-v2).

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::tokenize_on_device;

const SLOW_EMBEDDING: Duration = Duration::from_millis(500);

pub struct BertEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    max_len: usize,
    dim: usize,
    id: String,
}

impl BertEmbedder {
    /// Load `tokenizer.json`, `config.json` and the weights
    /// (`model.safetensors`, falling back to `pytorch_model.bin`) from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let device = select_device();
        info!(dir = %model_dir.display(), "loading BERT embedding model");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;

        let config_path = model_dir.join("config.json");
        let config: BertConfig = serde_json::from_str(
            &std::fs::read_to_string(&config_path).with_context(|| format!("reading {}", config_path.display()))?,
        )
        .with_context(|| format!("parsing {}", config_path.display()))?;

        let weights = load_weights(model_dir, &device)?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = BertModel::load(vb, &config).context("building BERT model")?;

        let name = model_dir.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "bert".to_string());
        let id = format!("bert:{}:d{}", name, config.hidden_size);
        info!(embedder = %id, "embedding model loaded");
        Ok(Self { model, tokenizer, device, max_len: config.max_position_embeddings, dim: config.hidden_size, id })
    }

    pub fn id(&self) -> &str { &self.id }

    pub fn dim(&self) -> usize { self.dim }

    pub fn max_len(&self) -> usize { self.max_len }

    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_on_device(&self.tokenizer, text, self.max_len, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let emb = pooled.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1::<f32>()?;
        if emb.len() != self.dim {
            return Err(anyhow!("model produced {} values, expected {}", emb.len(), self.dim));
        }
        let elapsed = start.elapsed();
        if elapsed > SLOW_EMBEDDING {
            warn!(ms = elapsed.as_millis() as u64, "slow embedding");
        } else {
            debug!(ms = elapsed.as_millis() as u64, "embedded text");
        }
        Ok(emb)
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        debug!(path = %safetensors.display(), "loading safetensors weights");
        return candle_core::safetensors::load(&safetensors, device)
            .with_context(|| format!("loading {}", safetensors.display()));
    }
    let pickle = model_dir.join("pytorch_model.bin");
    debug!(path = %pickle.display(), "loading pytorch weights");
    let weights = candle_core::pickle::read_all(&pickle).with_context(|| format!("loading {}", pickle.display()))?;
    Ok(weights.into_iter().collect())
}

/// Find the model directory: `APP_MODEL_DIR`, then the configured path.
pub fn resolve_model_dir(configured: &Path) -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("APP_MODEL_DIR") {
        let p = PathBuf::from(&dir);
        if p.exists() { info!(dir = %p.display(), "using APP_MODEL_DIR"); return Ok(p); }
    }
    if configured.exists() { return Ok(configured.to_path_buf()); }
    Err(anyhow!("Could not locate embedding model directory at {}", configured.display()))
}
