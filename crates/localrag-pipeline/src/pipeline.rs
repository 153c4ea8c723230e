use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use localrag_core::chunker::{split_with, ChunkingConfig};
use localrag_core::config::{EmptyContextPolicy, Settings};
use localrag_core::documents::{discover, load_document};
use localrag_core::prompt::PromptBuilder;
use localrag_core::traits::{Embedder, Generator, VectorIndex};
use localrag_core::types::{chunk_id, Document, EmbeddedRecord, IndexEntry, IndexSpec, QueryResult};
use localrag_core::{Error, Result};

use crate::retriever::Retriever;

/// Entries are written in batches of this many chunks.
const UPSERT_BATCH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// The configured index is not known to exist.
    Uninitialized,
    /// The index exists with the configured shape and can be read and written.
    Ready,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Uninitialized => f.write_str("uninitialized"),
            PipelineState::Ready => f.write_str("ready"),
        }
    }
}

pub struct Pipeline {
    spec: IndexSpec,
    chunking: ChunkingConfig,
    prompt: PromptBuilder,
    empty_context: EmptyContextPolicy,
    data_extension: String,
    embedder: Box<dyn Embedder>,
    index: Box<dyn VectorIndex>,
    generator: Box<dyn Generator>,
    state: PipelineState,
}

impl Pipeline {
    /// Validates `settings` before anything touches the capabilities.
    pub fn new(
        settings: &Settings,
        embedder: Box<dyn Embedder>,
        index: Box<dyn VectorIndex>,
        generator: Box<dyn Generator>,
    ) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            spec: settings.index_spec(),
            chunking: settings.chunking_config(),
            prompt: settings.prompt_builder()?,
            empty_context: settings.retrieval.empty_context,
            data_extension: settings.data.extension.clone(),
            embedder,
            index,
            generator,
            state: PipelineState::Uninitialized,
        })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn index_spec(&self) -> &IndexSpec {
        &self.spec
    }

    /// Create the index (or accept an identical existing one) and become ready.
    pub fn provision(&mut self) -> Result<()> {
        if self.embedder.dim() != self.spec.dimension {
            return Err(Error::DimensionMismatch { expected: self.spec.dimension, actual: self.embedder.dim() });
        }
        self.index.provision(&self.spec)?;
        self.state = PipelineState::Ready;
        info!(index = %self.spec.name, embedder = self.embedder.embedder_id(), "pipeline ready");
        Ok(())
    }

    /// Become ready if the index already exists with the configured shape,
    /// without creating it. Returns the resulting state.
    pub fn attach(&mut self) -> Result<PipelineState> {
        if let Some(existing) = self.index.describe(&self.spec.name)? {
            existing.check_compatible(&self.spec)?;
            self.state = PipelineState::Ready;
        }
        Ok(self.state)
    }

    /// Drop the index and all its entries.
    pub fn teardown(&mut self) -> Result<()> {
        self.index.deprovision(&self.spec.name)?;
        self.state = PipelineState::Uninitialized;
        info!(index = %self.spec.name, "index torn down");
        Ok(())
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state {
            PipelineState::Ready => Ok(()),
            PipelineState::Uninitialized => Err(Error::NotReady),
        }
    }

    /// Read, chunk, embed and upsert every document. Returns the number of
    /// chunks written.
    pub fn ingest<P: AsRef<Path>>(&self, paths: &[P]) -> Result<usize> {
        self.ingest_with(paths, |_, _| {})
    }

    /// [`Pipeline::ingest`], calling `on_document` with each path and its
    /// chunk count after the document is written.
    ///
    /// Once a document is fully written, its chunks left over from an earlier,
    /// longer version are removed.
    pub fn ingest_with<P, F>(&self, paths: &[P], mut on_document: F) -> Result<usize>
    where
        P: AsRef<Path>,
        F: FnMut(&Path, usize),
    {
        self.ensure_ready()?;
        let mut written = 0usize;
        for path in paths {
            let path = path.as_ref();
            let document = load_document(path).map_err(|e| Error::ingestion(path.display().to_string(), e))?;
            let n = self.ingest_document(&document)?;
            on_document(path, n);
            written += n;
        }
        info!(documents = paths.len(), chunks = written, index = %self.spec.name, "ingest complete");
        Ok(written)
    }

    /// Ingest every file under `dir` with the configured extension.
    pub fn ingest_dir(&self, dir: &Path) -> Result<usize> {
        let files = self.discover(dir);
        self.ingest(&files)
    }

    pub fn discover(&self, dir: &Path) -> Vec<PathBuf> {
        let files = discover(dir, &self.data_extension);
        debug!(dir = %dir.display(), files = files.len(), "discovered documents");
        files
    }

    fn ingest_document(&self, document: &Document) -> Result<usize> {
        let chunks = split_with(document, &self.chunking);
        let mut pending: Vec<IndexEntry> = Vec::with_capacity(UPSERT_BATCH.min(chunks.len()));
        let mut written = 0usize;
        for (i, chunk) in chunks.into_iter().enumerate() {
            let vector = match self.embed_chunk(&chunk.text) {
                Ok(v) => v,
                Err(e) => {
                    // Chunks embedded before the failure stay committed.
                    if let Err(flush_err) = self.flush(document, &mut pending) {
                        warn!(document = %document.id, error = %flush_err, "could not write chunks embedded before the failure");
                    }
                    return Err(Error::ingestion(&document.id, e));
                }
            };
            let record = EmbeddedRecord { vector, chunk };
            pending.push(IndexEntry::from_record(chunk_id(&document.id, i), record, &document.source_path));
            if pending.len() >= UPSERT_BATCH {
                written += self.flush(document, &mut pending)?;
            }
        }
        written += self.flush(document, &mut pending)?;
        let keep: Vec<_> = (0..written).map(|i| chunk_id(&document.id, i)).collect();
        self.index
            .prune_document(&self.spec.name, &document.id, &keep)
            .map_err(|e| Error::ingestion(&document.id, e))?;
        debug!(document = %document.id, chunks = written, "document ingested");
        Ok(written)
    }

    fn embed_chunk(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self.embedder.embed(text)?;
        if vector.len() != self.spec.dimension {
            return Err(Error::DimensionMismatch { expected: self.spec.dimension, actual: vector.len() });
        }
        Ok(vector)
    }

    fn flush(&self, document: &Document, pending: &mut Vec<IndexEntry>) -> Result<usize> {
        if pending.is_empty() {
            return Ok(0);
        }
        self.index
            .upsert(&self.spec.name, pending)
            .map_err(|e| Error::ingestion(&document.id, e))?;
        let n = pending.len();
        pending.clear();
        Ok(n)
    }

    pub fn retriever(&self) -> Retriever<'_> {
        Retriever::new(self.embedder.as_ref(), self.index.as_ref(), &self.spec.name, self.spec.dimension)
    }

    pub fn retrieve(&self, question: &str, k: usize) -> Result<QueryResult> {
        self.ensure_ready()?;
        self.retriever().retrieve(question, k)
    }

    /// Retrieve, render the prompt, and return the generator's output verbatim.
    pub fn ask(&self, question: &str, k: usize) -> Result<String> {
        let hits = self.retrieve(question, k)?;
        if hits.is_empty() {
            match self.empty_context {
                EmptyContextPolicy::Reject => return Err(Error::EmptyContext),
                EmptyContextPolicy::PassThrough => warn!(index = %self.spec.name, "no context retrieved; prompting without it"),
            }
        }
        let texts: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
        let prompt = self.prompt.build(&texts, question);
        debug!(context_chunks = texts.len(), prompt_chars = prompt.len(), model = self.generator.model(), "prompt built");
        self.generator.generate(&prompt).map_err(|e| match e {
            Error::Generation(_) | Error::CapabilityTimeout { .. } => e,
            other => Error::Generation(other.to_string()),
        })
    }

    /// Number of entries in the configured index.
    pub fn entry_count(&self) -> Result<usize> {
        self.ensure_ready()?;
        self.index.count(&self.spec.name)
    }
}
