use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use localrag_core::traits::VectorIndex;
use localrag_core::types::{cosine_similarity, sort_by_score, ChunkId, IndexEntry, IndexSpec, QueryResult, ScoredText};
use localrag_core::{Error, Result};
use tracing::{debug, info};

struct Collection {
    spec: IndexSpec,
    entries: BTreeMap<ChunkId, IndexEntry>,
}

/// Process-local index with exact (brute-force) cosine search.
#[derive(Default)]
pub struct MemoryIndex {
    collections: Mutex<HashMap<String, Collection>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Collection>>> {
        self.collections.lock().map_err(|_| Error::Backend("memory index lock poisoned".into()))
    }
}

impl VectorIndex for MemoryIndex {
    fn provision(&self, spec: &IndexSpec) -> Result<()> {
        let mut collections = self.lock()?;
        if let Some(existing) = collections.get(&spec.name) {
            return existing.spec.check_compatible(spec);
        }
        info!(index = %spec.name, dimension = spec.dimension, metric = %spec.metric, "provisioned in-memory index");
        collections.insert(spec.name.clone(), Collection { spec: spec.clone(), entries: BTreeMap::new() });
        Ok(())
    }

    fn upsert(&self, index: &str, entries: &[IndexEntry]) -> Result<()> {
        let mut collections = self.lock()?;
        let collection = collections.get_mut(index).ok_or_else(|| Error::NotFound(index.to_string()))?;
        let expected = collection.spec.dimension;
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != expected) {
            return Err(Error::DimensionMismatch { expected, actual: bad.vector.len() });
        }
        for entry in entries {
            collection.entries.insert(entry.id.clone(), entry.clone());
        }
        debug!(index, upserted = entries.len(), total = collection.entries.len(), "upsert");
        Ok(())
    }

    fn query(&self, index: &str, vector: &[f32], k: usize) -> Result<QueryResult> {
        let collections = self.lock()?;
        let collection = collections.get(index).ok_or_else(|| Error::NotFound(index.to_string()))?;
        if vector.len() != collection.spec.dimension {
            return Err(Error::DimensionMismatch { expected: collection.spec.dimension, actual: vector.len() });
        }
        if k == 0 {
            return Ok(Vec::new());
        }
        let mut hits: Vec<ScoredText> = collection
            .entries
            .values()
            .map(|e| ScoredText { id: e.id.clone(), text: e.text.clone(), score: cosine_similarity(vector, &e.vector) })
            .collect();
        sort_by_score(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }

    fn prune_document(&self, index: &str, document_id: &str, keep: &[ChunkId]) -> Result<usize> {
        let mut collections = self.lock()?;
        let collection = collections.get_mut(index).ok_or_else(|| Error::NotFound(index.to_string()))?;
        let before = collection.entries.len();
        collection.entries.retain(|id, e| {
            e.metadata.get("document_id").map(String::as_str) != Some(document_id) || keep.contains(id)
        });
        let removed = before - collection.entries.len();
        if removed > 0 {
            debug!(index, document = document_id, removed, "pruned stale chunks");
        }
        Ok(removed)
    }

    fn deprovision(&self, index: &str) -> Result<()> {
        if self.lock()?.remove(index).is_some() {
            info!(index, "dropped in-memory index");
        }
        Ok(())
    }

    fn describe(&self, index: &str) -> Result<Option<IndexSpec>> {
        Ok(self.lock()?.get(index).map(|c| c.spec.clone()))
    }

    fn count(&self, index: &str) -> Result<usize> {
        self.lock()?
            .get(index)
            .map(|c| c.entries.len())
            .ok_or_else(|| Error::NotFound(index.to_string()))
    }
}
