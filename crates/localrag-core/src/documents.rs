//! Reading plain-text documents from disk.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;
use crate::types::Document;

/// Read one file as a document. Invalid UTF-8 is replaced rather than rejected.
pub fn load_document(path: &Path) -> Result<Document> {
    let text = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
            String::from_utf8_lossy(&fs::read(path)?).into_owned()
        }
        Err(e) => return Err(e.into()),
    };
    let source_path = path.to_string_lossy().into_owned();
    debug!(path = %source_path, chars = text.chars().count(), "loaded document");
    Ok(Document { id: document_id(path), text, source_path })
}

/// File stem plus a short hash of the full path, so equal stems in different
/// directories stay distinct while the id remains stable across runs.
pub fn document_id(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let hash = blake3::hash(path.to_string_lossy().as_bytes());
    format!("{}-{}", stem, &hash.to_hex()[..8])
}

/// All files under `root` with the given extension, sorted by path.
pub fn discover(root: &Path, extension: &str) -> Vec<PathBuf> {
    let extension = extension.trim_start_matches('.');
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some(extension))
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    files
}
