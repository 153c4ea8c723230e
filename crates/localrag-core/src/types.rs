//! Domain types shared by the chunker, the capabilities and the pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

pub type ChunkId = String;
pub type Meta = BTreeMap<String, String>;

/// A source document read from disk. Consumed by the chunker.
///
/// - `id`: stable document identity (file stem plus a short path hash)
/// - `text`: full file contents
/// - `source_path`: path the document was read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub source_path: String,
}

/// A bounded window of a document's text.
///
/// `offset` is the position of the first character of `text` within the
/// parent document, counted in chars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub document_id: String,
    pub offset: usize,
}

/// Deterministic id of the `index`-th chunk of a document.
pub fn chunk_id(document_id: &str, index: usize) -> ChunkId {
    format!("{document_id}:{index}")
}

impl Chunk {
    /// Length of the chunk in chars.
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// A chunk together with its embedding, ready to be turned into an entry.
#[derive(Debug, Clone)]
pub struct EmbeddedRecord {
    pub vector: Vec<f32>,
    pub chunk: Chunk,
}

/// The unit persisted by a vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: ChunkId,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: Meta,
}

impl IndexEntry {
    pub fn from_record(id: ChunkId, record: EmbeddedRecord, source_path: &str) -> Self {
        let mut metadata = Meta::new();
        metadata.insert("document_id".to_string(), record.chunk.document_id);
        metadata.insert("offset".to_string(), record.chunk.offset.to_string());
        metadata.insert("source_path".to_string(), source_path.to_string());
        Self { id, vector: record.vector, text: record.chunk.text, metadata }
    }
}

/// One retrieval hit. Higher `score` is always more similar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredText {
    pub id: ChunkId,
    pub text: String,
    pub score: f32,
}

/// Hits ordered by descending score, at most `k` long.
pub type QueryResult = Vec<ScoredText>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    Cosine,
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimilarityMetric::Cosine => f.write_str("cosine"),
        }
    }
}

impl FromStr for SimilarityMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cosine" => Ok(SimilarityMetric::Cosine),
            other => Err(Error::InvalidConfiguration(format!("unsupported similarity metric '{other}'"))),
        }
    }
}

/// Parameters an index is provisioned with. Two specs for the same name
/// must agree on `dimension` and `metric`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: SimilarityMetric,
}

impl IndexSpec {
    pub fn new(name: impl Into<String>, dimension: usize, metric: SimilarityMetric) -> Self {
        Self { name: name.into(), dimension, metric }
    }

    /// `Ok` when `other` describes the same index shape.
    pub fn check_compatible(&self, other: &IndexSpec) -> crate::error::Result<()> {
        if self.dimension == other.dimension && self.metric == other.metric {
            return Ok(());
        }
        Err(Error::ConfigConflict {
            name: self.name.clone(),
            existing: format!("dimension={} metric={}", self.dimension, self.metric),
            requested: format!("dimension={} metric={}", other.dimension, other.metric),
        })
    }
}

/// Cosine similarity of two equal-length vectors. Zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0f32;
    let mut na = 0f32;
    let mut nb = 0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    let denom = na.sqrt() * nb.sqrt();
    if denom <= f32::EPSILON { 0.0 } else { dot / denom }
}

/// Sort hits by descending score.
pub fn sort_by_score(hits: &mut [ScoredText]) {
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
}
