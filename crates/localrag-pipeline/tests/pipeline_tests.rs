use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use localrag_core::config::{EmptyContextPolicy, Settings};
use localrag_core::traits::{Embedder, Generator, VectorIndex};
use localrag_core::types::{IndexSpec, SimilarityMetric};
use localrag_core::{Error, Result};
use localrag_embed::HashEmbedder;
use localrag_llm::EchoGenerator;
use localrag_pipeline::{Pipeline, PipelineState, Retriever};
use localrag_vector::{open_index, MemoryIndex};

const BAY_WHEELS: &str = "Bay Wheels has 262 docking stations.";
const QUESTION: &str = "How many docking stations does Bay Wheels have?";

/// Records every prompt it is asked to complete.
#[derive(Clone, Default)]
struct RecordingGenerator {
    prompts: Arc<Mutex<Vec<String>>>,
}

impl Generator for RecordingGenerator {
    fn model(&self) -> &str { "recording" }

    fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok("262".to_string())
    }
}

struct DownGenerator;

impl Generator for DownGenerator {
    fn model(&self) -> &str { "down" }

    fn generate(&self, _prompt: &str) -> Result<String> {
        Err(Error::Generation("connection refused".into()))
    }
}

/// Hash embeddings, except any text containing `POISON` fails.
struct PoisonedEmbedder(HashEmbedder);

impl Embedder for PoisonedEmbedder {
    fn embedder_id(&self) -> &str { "poisoned" }
    fn dim(&self) -> usize { self.0.dim() }
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.contains("POISON") {
            return Err(Error::Embedding("refused".into()));
        }
        self.0.embed(text)
    }
}

/// Shares one MemoryIndex between the pipeline and the test body.
#[derive(Clone, Default)]
struct SharedIndex(Arc<MemoryIndex>);

impl VectorIndex for SharedIndex {
    fn provision(&self, spec: &IndexSpec) -> Result<()> { self.0.provision(spec) }
    fn upsert(&self, index: &str, entries: &[localrag_core::types::IndexEntry]) -> Result<()> { self.0.upsert(index, entries) }
    fn query(&self, index: &str, vector: &[f32], k: usize) -> Result<localrag_core::types::QueryResult> { self.0.query(index, vector, k) }
    fn prune_document(&self, index: &str, document_id: &str, keep: &[String]) -> Result<usize> {
        self.0.prune_document(index, document_id, keep)
    }
    fn deprovision(&self, index: &str) -> Result<()> { self.0.deprovision(index) }
    fn describe(&self, index: &str) -> Result<Option<IndexSpec>> { self.0.describe(index) }
    fn count(&self, index: &str) -> Result<usize> { self.0.count(index) }
}

/// Reads succeed, every write fails.
struct ReadOnlyIndex(MemoryIndex);

impl VectorIndex for ReadOnlyIndex {
    fn provision(&self, spec: &IndexSpec) -> Result<()> { self.0.provision(spec) }
    fn upsert(&self, _index: &str, _entries: &[localrag_core::types::IndexEntry]) -> Result<()> {
        Err(Error::Backend("read-only".into()))
    }
    fn query(&self, index: &str, vector: &[f32], k: usize) -> Result<localrag_core::types::QueryResult> { self.0.query(index, vector, k) }
    fn prune_document(&self, index: &str, document_id: &str, keep: &[String]) -> Result<usize> {
        self.0.prune_document(index, document_id, keep)
    }
    fn deprovision(&self, index: &str) -> Result<()> { self.0.deprovision(index) }
    fn describe(&self, index: &str) -> Result<Option<IndexSpec>> { self.0.describe(index) }
    fn count(&self, index: &str) -> Result<usize> { self.0.count(index) }
}

fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
    let p = dir.join(name);
    fs::write(&p, text).unwrap();
    p
}

fn pipeline_with(settings: &Settings, generator: Box<dyn Generator>) -> Pipeline {
    let embedder = Box::new(HashEmbedder::new(settings.index.dimension));
    Pipeline::new(settings, embedder, Box::new(MemoryIndex::new()), generator).unwrap()
}

#[test]
fn bay_wheels_end_to_end() {
    let tmp = tempfile::tempdir().unwrap();
    let doc = write(tmp.path(), "bikes.txt", &format!("Bike share in San Francisco. {BAY_WHEELS} Rides are billed per minute."));

    let settings = Settings::default();
    assert_eq!((settings.chunking.size, settings.chunking.overlap), (2000, 50));
    let generator = RecordingGenerator::default();
    let mut pipeline = pipeline_with(&settings, Box::new(generator.clone()));
    pipeline.provision().unwrap();

    assert_eq!(pipeline.ingest(&[&doc]).unwrap(), 1);
    let hits = pipeline.retrieve(QUESTION, 1).unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].text.contains(BAY_WHEELS));

    let answer = pipeline.ask(QUESTION, 1).unwrap();
    assert_eq!(answer, "262");
    let prompts = generator.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains(QUESTION));
    assert!(prompts[0].contains(BAY_WHEELS));
}

#[test]
fn reingesting_does_not_duplicate_entries() {
    let tmp = tempfile::tempdir().unwrap();
    let text = "abcdefghij".repeat(50);
    let doc = write(tmp.path(), "letters.txt", &text);

    let mut settings = Settings::default();
    settings.chunking.size = 100;
    settings.chunking.overlap = 10;
    let mut pipeline = pipeline_with(&settings, Box::new(EchoGenerator));
    pipeline.provision().unwrap();

    let first = pipeline.ingest(&[&doc]).unwrap();
    let count = pipeline.entry_count().unwrap();
    assert_eq!(first, count);
    assert!(count > 1);

    pipeline.ingest(&[&doc]).unwrap();
    assert_eq!(pipeline.entry_count().unwrap(), count);
}

#[test]
fn operations_require_ready_state() {
    let settings = Settings::default();
    let mut pipeline = pipeline_with(&settings, Box::new(EchoGenerator));
    assert_eq!(pipeline.state(), PipelineState::Uninitialized);
    assert!(matches!(pipeline.ask(QUESTION, 1), Err(Error::NotReady)));
    assert!(matches!(pipeline.ingest::<&str>(&[]), Err(Error::NotReady)));
    assert_eq!(pipeline.attach().unwrap(), PipelineState::Uninitialized);

    pipeline.provision().unwrap();
    assert_eq!(pipeline.state(), PipelineState::Ready);
    pipeline.provision().unwrap();

    pipeline.teardown().unwrap();
    assert_eq!(pipeline.state(), PipelineState::Uninitialized);
    assert!(matches!(pipeline.entry_count(), Err(Error::NotReady)));
}

#[test]
fn attach_picks_up_an_existing_index() {
    let settings = Settings::default();
    let shared = SharedIndex::default();
    shared.provision(&settings.index_spec()).unwrap();

    let mut pipeline = Pipeline::new(
        &settings,
        Box::new(HashEmbedder::new(settings.index.dimension)),
        Box::new(shared.clone()),
        Box::new(EchoGenerator),
    )
    .unwrap();
    assert_eq!(pipeline.attach().unwrap(), PipelineState::Ready);
    assert_eq!(pipeline.entry_count().unwrap(), 0);
}

#[test]
fn empty_index_passes_empty_context_through() {
    let settings = Settings::default();
    let generator = RecordingGenerator::default();
    let mut pipeline = pipeline_with(&settings, Box::new(generator.clone()));
    pipeline.provision().unwrap();

    assert!(pipeline.retrieve(QUESTION, 3).unwrap().is_empty());
    pipeline.ask(QUESTION, 3).unwrap();
    let prompts = generator.prompts.lock().unwrap();
    assert!(prompts[0].contains(QUESTION));
}

#[test]
fn reject_policy_fails_before_generation() {
    let mut settings = Settings::default();
    settings.retrieval.empty_context = EmptyContextPolicy::Reject;
    let generator = RecordingGenerator::default();
    let mut pipeline = pipeline_with(&settings, Box::new(generator.clone()));
    pipeline.provision().unwrap();

    assert!(matches!(pipeline.ask(QUESTION, 1), Err(Error::EmptyContext)));
    assert!(generator.prompts.lock().unwrap().is_empty());
}

#[test]
fn k_above_entry_count_returns_everything_in_order() {
    let tmp = tempfile::tempdir().unwrap();
    let a = write(tmp.path(), "a.txt", "docking stations in the city");
    let b = write(tmp.path(), "b.txt", "bay wheels docking stations");
    let c = write(tmp.path(), "c.txt", "granite countertops");

    let settings = Settings::default();
    let mut pipeline = pipeline_with(&settings, Box::new(EchoGenerator));
    pipeline.provision().unwrap();
    assert_eq!(pipeline.ingest(&[a, b, c]).unwrap(), 3);

    let hits = pipeline.retrieve(QUESTION, 10).unwrap();
    assert_eq!(hits.len(), 3);
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    assert!(hits[0].text.contains("bay wheels"));
}

#[test]
fn generator_failure_is_a_generation_error() {
    let tmp = tempfile::tempdir().unwrap();
    let doc = write(tmp.path(), "bikes.txt", BAY_WHEELS);
    let settings = Settings::default();
    let mut pipeline = pipeline_with(&settings, Box::new(DownGenerator));
    pipeline.provision().unwrap();
    pipeline.ingest(&[doc]).unwrap();
    assert!(matches!(pipeline.ask(QUESTION, 1), Err(Error::Generation(_))));
}

#[test]
fn failed_ingest_names_the_document_and_keeps_prior_writes() {
    let tmp = tempfile::tempdir().unwrap();
    let good = write(tmp.path(), "good.txt", &"x".repeat(25));
    // Chunks of 10: "aaaaaaaaaa", "aaaaaaaaaa", "POISON...".
    let bad = write(tmp.path(), "bad.txt", &format!("{}POISONPOISON", "a".repeat(20)));

    let mut settings = Settings::default();
    settings.chunking.size = 10;
    settings.chunking.overlap = 0;
    let mut pipeline = Pipeline::new(
        &settings,
        Box::new(PoisonedEmbedder(HashEmbedder::new(settings.index.dimension))),
        Box::new(MemoryIndex::new()),
        Box::new(EchoGenerator),
    )
    .unwrap();
    pipeline.provision().unwrap();

    match pipeline.ingest(&[&good, &bad]) {
        Err(Error::Ingestion { document, source }) => {
            assert!(document.starts_with("bad-"), "{document}");
            assert!(source.to_string().contains("refused"));
        }
        other => panic!("expected Ingestion error, got {other:?}"),
    }
    // good.txt: 3 chunks, bad.txt: 2 chunks before the failure.
    assert_eq!(pipeline.entry_count().unwrap(), 5);
}

#[test]
fn unreadable_document_is_an_ingestion_error() {
    let tmp = tempfile::tempdir().unwrap();
    let settings = Settings::default();
    let mut pipeline = pipeline_with(&settings, Box::new(EchoGenerator));
    pipeline.provision().unwrap();
    let missing = tmp.path().join("missing.txt");
    match pipeline.ingest(&[&missing]) {
        Err(Error::Ingestion { document, .. }) => assert!(document.ends_with("missing.txt")),
        other => panic!("expected Ingestion error, got {other:?}"),
    }
}

#[test]
fn ingest_dir_filters_by_extension() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "one.txt", "first document");
    write(tmp.path(), "two.txt", "second document");
    write(tmp.path(), "notes.md", "ignored");

    let settings = Settings::default();
    let mut pipeline = pipeline_with(&settings, Box::new(EchoGenerator));
    pipeline.provision().unwrap();
    assert_eq!(pipeline.ingest_dir(tmp.path()).unwrap(), 2);
}

#[test]
fn query_with_wrong_dimension_is_rejected() {
    let index = MemoryIndex::new();
    index.provision(&IndexSpec::new("x", 384, SimilarityMetric::Cosine)).unwrap();
    let embedder = HashEmbedder::new(768);
    let retriever = Retriever::new(&embedder, &index, "x", 384);
    assert!(matches!(retriever.retrieve(QUESTION, 1), Err(Error::DimensionMismatch { expected: 384, actual: 768 })));
    assert_eq!(index.count("x").unwrap(), 0);
}

#[test]
fn provisioning_with_mismatched_embedder_fails() {
    let settings = Settings::default();
    let mut pipeline =
        Pipeline::new(&settings, Box::new(HashEmbedder::new(768)), Box::new(MemoryIndex::new()), Box::new(EchoGenerator)).unwrap();
    assert!(matches!(pipeline.provision(), Err(Error::DimensionMismatch { .. })));
    assert_eq!(pipeline.state(), PipelineState::Uninitialized);
}

#[test]
fn conflicting_existing_index_blocks_attach() {
    let settings = Settings::default();
    let shared = SharedIndex::default();
    shared.provision(&IndexSpec::new(settings.index.name.clone(), 768, SimilarityMetric::Cosine)).unwrap();
    let mut pipeline = Pipeline::new(
        &settings,
        Box::new(HashEmbedder::new(settings.index.dimension)),
        Box::new(shared.clone()),
        Box::new(EchoGenerator),
    )
    .unwrap();
    assert!(matches!(pipeline.attach(), Err(Error::ConfigConflict { .. })));
    assert!(matches!(pipeline.provision(), Err(Error::ConfigConflict { .. })));
    assert_eq!(shared.describe(&settings.index.name).unwrap().map(|s| s.dimension), Some(768));
}

#[test]
fn index_survives_between_pipeline_instances() {
    let tmp = tempfile::tempdir().unwrap();
    let doc = write(tmp.path(), "bikes.txt", BAY_WHEELS);
    let settings = Settings::default();
    let open = || {
        Pipeline::new(
            &settings,
            Box::new(HashEmbedder::new(settings.index.dimension)),
            open_index(&settings.index, tmp.path()).unwrap(),
            Box::new(EchoGenerator),
        )
        .unwrap()
    };

    {
        let mut first = open();
        first.provision().unwrap();
    }

    let mut second = open();
    assert_eq!(second.attach().unwrap(), PipelineState::Ready);
    assert_eq!(second.ingest(&[&doc]).unwrap(), 1);
    drop(second);

    let mut third = open();
    assert_eq!(third.attach().unwrap(), PipelineState::Ready);
    assert_eq!(third.entry_count().unwrap(), 1);
    let prompt = third.ask(QUESTION, 1).unwrap();
    assert!(prompt.contains(BAY_WHEELS));
    third.teardown().unwrap();
}

#[test]
fn dropped_index_is_a_retrieval_error() {
    let settings = Settings::default();
    let shared = SharedIndex::default();
    let mut pipeline = Pipeline::new(
        &settings,
        Box::new(HashEmbedder::new(settings.index.dimension)),
        Box::new(shared.clone()),
        Box::new(EchoGenerator),
    )
    .unwrap();
    pipeline.provision().unwrap();

    shared.deprovision(&settings.index.name).unwrap();
    assert!(matches!(pipeline.ask(QUESTION, 1), Err(Error::Retrieval(_))));
    assert!(matches!(pipeline.retrieve(QUESTION, 1), Err(Error::Retrieval(_))));
}

#[test]
fn shorter_reingest_removes_stale_chunks() {
    let tmp = tempfile::tempdir().unwrap();
    let mut settings = Settings::default();
    settings.chunking.size = 10;
    settings.chunking.overlap = 0;
    let mut pipeline = pipeline_with(&settings, Box::new(EchoGenerator));
    pipeline.provision().unwrap();
    let other = write(tmp.path(), "other.txt", "unrelated text here");
    pipeline.ingest(&[&other]).unwrap();
    let others = pipeline.entry_count().unwrap();

    let doc = write(tmp.path(), "notes.txt", &format!("{}zebra tail", "a".repeat(30)));
    assert_eq!(pipeline.ingest(&[&doc]).unwrap(), 4);
    assert_eq!(pipeline.entry_count().unwrap(), others + 4);

    fs::write(&doc, "a".repeat(10)).unwrap();
    assert_eq!(pipeline.ingest(&[&doc]).unwrap(), 1);
    assert_eq!(pipeline.entry_count().unwrap(), others + 1);
    let hits = pipeline.retrieve("zebra tail", 10).unwrap();
    assert!(hits.iter().all(|h| !h.text.contains("zebra")));
}

#[test]
fn failed_write_after_embedding_failure_keeps_the_embedding_error() {
    let tmp = tempfile::tempdir().unwrap();
    let doc = write(tmp.path(), "bad.txt", &format!("{}POISON", "a".repeat(10)));
    let mut settings = Settings::default();
    settings.chunking.size = 10;
    settings.chunking.overlap = 0;
    let mut pipeline = Pipeline::new(
        &settings,
        Box::new(PoisonedEmbedder(HashEmbedder::new(settings.index.dimension))),
        Box::new(ReadOnlyIndex(MemoryIndex::new())),
        Box::new(EchoGenerator),
    )
    .unwrap();
    pipeline.provision().unwrap();

    match pipeline.ingest(&[&doc]) {
        Err(Error::Ingestion { source, .. }) => {
            assert!(source.to_string().contains("refused"), "{source}");
        }
        other => panic!("expected Ingestion error, got {other:?}"),
    }
}
