//! Layered configuration and path helpers.
//!
//! Uses Figment to merge compiled defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (`__` separates nested keys, e.g. `APP_CHUNKING__SIZE`).
//! Provides helpers to expand `~` and `${VAR}` and to resolve relative paths
//! against a known base directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::chunker::ChunkingConfig;
use crate::error::{Error, Result};
use crate::prompt::{validate_template, PromptBuilder, DEFAULT_TEMPLATE};
use crate::types::{IndexSpec, SimilarityMetric};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub index: IndexSettings,
    pub chunking: ChunkingSettings,
    pub retrieval: RetrievalSettings,
    pub prompt: PromptSettings,
    pub embedding: EmbeddingSettings,
    pub generator: GeneratorSettings,
    pub data: DataSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexBackend {
    /// Process-local; nothing survives the process.
    Memory,
    /// LanceDB tables under `index.uri`.
    Lance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSettings {
    pub name: String,
    pub dimension: usize,
    pub metric: SimilarityMetric,
    pub backend: IndexBackend,
    /// Storage location for persistent backends.
    pub uri: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkingSettings {
    pub size: usize,
    pub overlap: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyContextPolicy {
    /// Hand the generator a prompt with an empty context block.
    PassThrough,
    /// Fail `ask` with `EmptyContext` before calling the generator.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalSettings {
    pub k: usize,
    pub empty_context: EmptyContextPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptSettings {
    pub template: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedderKind {
    Hash,
    Bert,
    Ollama,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    pub kind: EmbedderKind,
    /// Local model directory for `bert`.
    pub model_dir: String,
    /// Model name for `ollama`.
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorKind {
    Ollama,
    Echo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorSettings {
    pub kind: GeneratorKind,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSettings {
    pub dir: String,
    pub extension: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            index: IndexSettings {
                name: "rag-demo".to_string(),
                dimension: 384,
                metric: SimilarityMetric::Cosine,
                backend: IndexBackend::Lance,
                uri: "data/lancedb".to_string(),
                timeout_secs: 30,
            },
            chunking: ChunkingSettings { size: 2000, overlap: 50 },
            retrieval: RetrievalSettings { k: 1, empty_context: EmptyContextPolicy::PassThrough },
            prompt: PromptSettings { template: DEFAULT_TEMPLATE.to_string() },
            embedding: EmbeddingSettings {
                kind: EmbedderKind::Hash,
                model_dir: "models/all-MiniLM-L6-v2".to_string(),
                model: "all-minilm".to_string(),
                base_url: "http://localhost:11434".to_string(),
                timeout_secs: 30,
            },
            generator: GeneratorSettings {
                kind: GeneratorKind::Ollama,
                model: "llama3".to_string(),
                base_url: "http://localhost:11434".to_string(),
                timeout_secs: 120,
            },
            data: DataSettings { dir: "documents".to_string(), extension: "txt".to_string() },
        }
    }
}

impl Settings {
    /// Defaults, then `config.toml`, then `config.<RUST_ENV>.toml`, then `APP_*`.
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::from_figment(Self::figment(&env_name))
    }

    pub fn figment(env_name: &str) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file("config.toml"));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment.merge(Env::prefixed("APP_").split("__"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let settings: Settings = figment
            .extract()
            .map_err(|e| Error::InvalidConfiguration(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject parameters that would only fail later, before any I/O happens.
    pub fn validate(&self) -> Result<()> {
        if self.index.name.trim().is_empty() {
            return Err(Error::InvalidConfiguration("index name must not be empty".into()));
        }
        if self.index.dimension == 0 {
            return Err(Error::InvalidConfiguration("embedding dimension must be greater than zero".into()));
        }
        if self.retrieval.k == 0 {
            return Err(Error::InvalidConfiguration("retrieval k must be greater than zero".into()));
        }
        self.chunking_config().validate()?;
        validate_template(&self.prompt.template)
    }

    pub fn chunking_config(&self) -> ChunkingConfig {
        ChunkingConfig { max_size: self.chunking.size, overlap: self.chunking.overlap }
    }

    pub fn index_spec(&self) -> IndexSpec {
        IndexSpec::new(self.index.name.clone(), self.index.dimension, self.index.metric)
    }

    pub fn prompt_builder(&self) -> Result<PromptBuilder> {
        PromptBuilder::new(self.prompt.template.clone())
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
