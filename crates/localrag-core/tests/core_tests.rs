use std::fs;
use std::io::Write;
use tempfile::TempDir;

use localrag_core::chunker::{reassemble, split, split_with, ChunkingConfig};
use localrag_core::documents::{discover, document_id, load_document};
use localrag_core::prompt::{PromptBuilder, DEFAULT_TEMPLATE};
use localrag_core::types::{cosine_similarity, Document, IndexSpec, SimilarityMetric};
use localrag_core::Error;
use proptest::prelude::*;

fn doc(text: &str) -> Document {
    Document { id: "doc".to_string(), text: text.to_string(), source_path: "doc.txt".to_string() }
}

#[test]
fn split_rejects_invalid_parameters() {
    assert!(matches!(split(&doc("abc"), 0, 0), Err(Error::InvalidConfiguration(_))));
    assert!(matches!(split(&doc("abc"), 10, 10), Err(Error::InvalidConfiguration(_))));
    assert!(matches!(split(&doc("abc"), 10, 11), Err(Error::InvalidConfiguration(_))));
}

#[test]
fn short_document_is_a_single_chunk() {
    let chunks = split(&doc("Bay Wheels has 262 docking stations."), 2000, 50).expect("split");
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, "Bay Wheels has 262 docking stations.");
    assert_eq!(chunks[0].offset, 0);
    assert_eq!(chunks[0].document_id, "doc");
}

#[test]
fn empty_document_has_no_chunks() {
    let chunks = split(&doc(""), 100, 10).expect("split");
    assert!(chunks.is_empty());
}

#[test]
fn zero_overlap_tiles_the_text() {
    let chunks = split(&doc("aaaabbbbcc"), 4, 0).expect("split");
    let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, vec!["aaaa", "bbbb", "cc"]);
}

proptest! {
    #[test]
    fn chunks_reassemble_to_source(
        text in "[a-zA-Z0-9 .,äöü\n]{0,400}",
        max_size in 1usize..64,
        overlap_seed in 0usize..64,
    ) {
        let overlap = overlap_seed % max_size;
        let document = doc(&text);
        let config = ChunkingConfig::new(max_size, overlap).expect("valid config");
        let chunks = split_with(&document, &config);

        prop_assert_eq!(reassemble(&chunks), text.clone());
        for c in &chunks {
            prop_assert!(c.len() <= max_size);
        }
        for pair in chunks.windows(2) {
            let prev_end = pair[0].offset + pair[0].len();
            prop_assert!(prev_end - pair[1].offset >= overlap);
            prop_assert_eq!(pair[1].offset - pair[0].offset, max_size - overlap);
        }
    }
}

#[test]
fn prompt_contains_context_and_question() {
    let builder = PromptBuilder::default();
    let prompt = builder.build(&["first", "second"], "How many?");
    assert!(prompt.contains("first\n\nsecond"));
    assert!(prompt.contains("Question: How many?"));
}

#[test]
fn empty_context_still_renders_a_prompt() {
    let builder = PromptBuilder::new(DEFAULT_TEMPLATE).expect("template");
    let empty: [&str; 0] = [];
    let prompt = builder.build(&empty, "Anything?");
    assert!(prompt.starts_with("Answer the question based only on the following context:\n\n"));
    assert!(prompt.contains("Anything?"));
}

#[test]
fn template_without_both_slots_is_rejected() {
    assert!(matches!(PromptBuilder::new("{question} only"), Err(Error::MissingSlot("context"))));
    assert!(matches!(PromptBuilder::new("{context} only"), Err(Error::MissingSlot("question"))));
}

#[test]
fn load_document_reads_text_and_assigns_stable_id() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("bikes.txt");
    let mut f = fs::File::create(&path).unwrap();
    writeln!(f, "Bay Wheels has 262 docking stations.").unwrap();

    let first = load_document(&path).expect("load");
    let second = load_document(&path).expect("load again");
    assert_eq!(first.text.trim(), "Bay Wheels has 262 docking stations.");
    assert_eq!(first.id, second.id);
    assert!(first.id.starts_with("bikes-"));
    assert_eq!(first.source_path, path.to_string_lossy());
}

#[test]
fn same_stem_in_different_directories_gets_different_ids() {
    let tmp = TempDir::new().unwrap();
    let a = tmp.path().join("a").join("notes.txt");
    let b = tmp.path().join("b").join("notes.txt");
    assert_ne!(document_id(&a), document_id(&b));
}

#[test]
fn load_document_replaces_invalid_utf8() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("latin1.txt");
    fs::write(&path, [b'c', b'a', b'f', 0xE9]).unwrap();
    let document = load_document(&path).expect("lossy load");
    assert!(document.text.starts_with("caf"));
}

#[test]
fn load_document_missing_file_is_io_error() {
    let tmp = TempDir::new().unwrap();
    let err = load_document(&tmp.path().join("nope.txt")).unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn discover_filters_by_extension_and_sorts() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::create_dir_all(dir.join("nested")).unwrap();
    fs::write(dir.join("b.txt"), "bravo").unwrap();
    fs::write(dir.join("a.txt"), "alpha").unwrap();
    fs::write(dir.join("nested").join("c.txt"), "charlie").unwrap();
    fs::write(dir.join("skip.md"), "markdown").unwrap();

    let files = discover(dir, ".txt");
    let names: Vec<String> = files
        .iter()
        .map(|p| p.strip_prefix(dir).unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a.txt", "b.txt", "nested/c.txt"]);
}

#[test]
fn index_spec_conflicts_on_dimension() {
    let existing = IndexSpec::new("x", 384, SimilarityMetric::Cosine);
    assert!(existing.check_compatible(&IndexSpec::new("x", 384, SimilarityMetric::Cosine)).is_ok());
    let err = existing.check_compatible(&IndexSpec::new("x", 768, SimilarityMetric::Cosine)).unwrap_err();
    assert!(matches!(err, Error::ConfigConflict { .. }));
}

#[test]
fn cosine_similarity_bounds() {
    assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
}
