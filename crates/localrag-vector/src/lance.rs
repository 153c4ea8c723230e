//! LanceDB-backed index. Each provisioned index is one table; index specs are
//! recorded in a key/value meta table so a reopened database knows the shape
//! every index was provisioned with.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use arrow_array::{Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, DistanceType};
use tokio::runtime::Runtime;
use tracing::{debug, info};

use localrag_core::traits::VectorIndex;
use localrag_core::types::{sort_by_score, ChunkId, IndexEntry, IndexSpec, QueryResult, ScoredText};
use localrag_core::{Capability, Error, Result};

use crate::schema::{entries_schema, meta_schema};

const META_TABLE: &str = "_localrag_meta";

fn backend<E: std::fmt::Display>(e: E) -> Error {
    Error::Backend(e.to_string())
}

fn spec_key(index: &str) -> String {
    format!("index:{index}")
}

fn quote(s: &str) -> String {
    s.replace('\'', "''")
}

pub struct LanceIndex {
    rt: Runtime,
    db: Connection,
    timeout: Duration,
}

impl LanceIndex {
    pub fn open(uri: &str, timeout: Duration) -> Result<Self> {
        let rt = Runtime::new()?;
        let db = rt.block_on(async { connect(uri).execute().await }).map_err(backend)?;
        info!(uri, "opened LanceDB");
        Ok(Self { rt, db, timeout })
    }

    /// Run a backend call to completion, bounded by the configured timeout.
    fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.rt.block_on(tokio::time::timeout(self.timeout, fut)) {
            Ok(res) => res,
            Err(_) => Err(Error::CapabilityTimeout { capability: Capability::VectorIndex, timeout: self.timeout }),
        }
    }

    async fn has_table(&self, name: &str) -> Result<bool> {
        let names = self.db.table_names().execute().await.map_err(backend)?;
        Ok(names.iter().any(|n| n == name))
    }

    async fn ensure_meta_table(&self) -> Result<()> {
        if self.has_table(META_TABLE).await? {
            return Ok(());
        }
        let iter = RecordBatchIterator::new(vec![].into_iter(), meta_schema());
        self.db.create_table(META_TABLE, Box::new(iter)).execute().await.map_err(backend)?;
        Ok(())
    }

    async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_meta_table().await?;
        let t = self.db.open_table(META_TABLE).execute().await.map_err(backend)?;
        let now = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0);
        let rb = RecordBatch::try_new(
            meta_schema(),
            vec![
                Arc::new(StringArray::from(vec![key.to_string()])),
                Arc::new(StringArray::from(vec![value.to_string()])),
                Arc::new(TimestampMillisecondArray::from(vec![now])),
            ],
        )
        .map_err(backend)?;
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(rb)].into_iter(), meta_schema()));
        let mut mi = t.merge_insert(&["key"]);
        mi.when_matched_update_all(None).when_not_matched_insert_all();
        mi.execute(reader).await.map_err(backend)?;
        Ok(())
    }

    async fn get_meta(&self, key: &str) -> Result<Option<String>> {
        if !self.has_table(META_TABLE).await? {
            return Ok(None);
        }
        let t = self.db.open_table(META_TABLE).execute().await.map_err(backend)?;
        let mut stream = t
            .query()
            .only_if(format!("key = '{}'", quote(key)))
            .execute()
            .await
            .map_err(backend)?;
        while let Some(batch) = stream.try_next().await.map_err(backend)? {
            if batch.num_rows() == 0 {
                continue;
            }
            let values = string_column(&batch, "value")?;
            return Ok(Some(values.value(0).to_string()));
        }
        Ok(None)
    }

    async fn delete_meta(&self, key: &str) -> Result<()> {
        if !self.has_table(META_TABLE).await? {
            return Ok(());
        }
        let t = self.db.open_table(META_TABLE).execute().await.map_err(backend)?;
        t.delete(&format!("key = '{}'", quote(key))).await.map_err(backend)?;
        Ok(())
    }

    async fn spec_of(&self, index: &str) -> Result<Option<IndexSpec>> {
        match self.get_meta(&spec_key(index)).await? {
            Some(raw) => serde_json::from_str(&raw).map(Some).map_err(backend),
            None => Ok(None),
        }
    }

    async fn require_spec(&self, index: &str) -> Result<IndexSpec> {
        self.spec_of(index).await?.ok_or_else(|| Error::NotFound(index.to_string()))
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| Error::Backend(format!("{name} column missing")))
}

fn entries_to_batch(entries: &[IndexEntry], dimension: usize) -> Result<RecordBatch> {
    let ids: Vec<String> = entries.iter().map(|e| e.id.clone()).collect();
    let document_ids: Vec<String> =
        entries.iter().map(|e| e.metadata.get("document_id").cloned().unwrap_or_default()).collect();
    let texts: Vec<String> = entries.iter().map(|e| e.text.clone()).collect();
    let metadata = entries
        .iter()
        .map(|e| serde_json::to_string(&e.metadata))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(backend)?;
    let vectors = entries.iter().map(|e| Some(e.vector.iter().map(|&x| Some(x)).collect::<Vec<_>>()));
    RecordBatch::try_new(
        entries_schema(dimension),
        vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(document_ids)),
            Arc::new(StringArray::from(texts)),
            Arc::new(StringArray::from(metadata)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors, dimension as i32)),
        ],
    )
    .map_err(backend)
}

impl VectorIndex for LanceIndex {
    fn provision(&self, spec: &IndexSpec) -> Result<()> {
        self.run(async {
            if let Some(existing) = self.spec_of(&spec.name).await? {
                return existing.check_compatible(spec);
            }
            if !self.has_table(&spec.name).await? {
                let iter = RecordBatchIterator::new(vec![].into_iter(), entries_schema(spec.dimension));
                self.db.create_table(&spec.name, Box::new(iter)).execute().await.map_err(backend)?;
            }
            let raw = serde_json::to_string(spec).map_err(backend)?;
            self.set_meta(&spec_key(&spec.name), &raw).await?;
            info!(index = %spec.name, dimension = spec.dimension, metric = %spec.metric, "provisioned LanceDB table");
            Ok(())
        })
    }

    fn upsert(&self, index: &str, entries: &[IndexEntry]) -> Result<()> {
        self.run(async {
            let spec = self.require_spec(index).await?;
            if let Some(bad) = entries.iter().find(|e| e.vector.len() != spec.dimension) {
                return Err(Error::DimensionMismatch { expected: spec.dimension, actual: bad.vector.len() });
            }
            if entries.is_empty() {
                return Ok(());
            }
            let batch = entries_to_batch(entries, spec.dimension)?;
            let schema = batch.schema();
            let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
            let table = self.db.open_table(index).execute().await.map_err(backend)?;
            let mut mi = table.merge_insert(&["id"]);
            mi.when_matched_update_all(None).when_not_matched_insert_all();
            mi.execute(reader).await.map_err(backend)?;
            debug!(index, upserted = entries.len(), "merge insert");
            Ok(())
        })
    }

    fn query(&self, index: &str, vector: &[f32], k: usize) -> Result<QueryResult> {
        self.run(async {
            let spec = self.require_spec(index).await?;
            if vector.len() != spec.dimension {
                return Err(Error::DimensionMismatch { expected: spec.dimension, actual: vector.len() });
            }
            if k == 0 {
                return Ok(Vec::new());
            }
            let table = self.db.open_table(index).execute().await.map_err(backend)?;
            if table.count_rows(None).await.map_err(backend)? == 0 {
                return Ok(Vec::new());
            }
            let mut stream = table
                .vector_search(vector.to_vec())
                .map_err(backend)?
                .distance_type(DistanceType::Cosine)
                .limit(k)
                .execute()
                .await
                .map_err(backend)?;
            let mut hits = Vec::new();
            while let Some(batch) = stream.try_next().await.map_err(backend)? {
                let ids = string_column(&batch, "id")?;
                let texts = string_column(&batch, "text")?;
                let distances = batch
                    .column_by_name("_distance")
                    .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                    .ok_or_else(|| Error::Backend("_distance column missing".into()))?;
                for i in 0..batch.num_rows() {
                    hits.push(ScoredText {
                        id: ids.value(i).to_string(),
                        text: texts.value(i).to_string(),
                        score: 1.0 - distances.value(i),
                    });
                }
            }
            sort_by_score(&mut hits);
            hits.truncate(k);
            Ok(hits)
        })
    }

    fn prune_document(&self, index: &str, document_id: &str, keep: &[ChunkId]) -> Result<usize> {
        let mut filter = format!("document_id = '{}'", quote(document_id));
        if !keep.is_empty() {
            let ids: Vec<String> = keep.iter().map(|id| format!("'{}'", quote(id))).collect();
            filter.push_str(&format!(" AND id NOT IN ({})", ids.join(", ")));
        }
        self.run(async {
            self.require_spec(index).await?;
            let table = self.db.open_table(index).execute().await.map_err(backend)?;
            let stale = table.count_rows(Some(filter.clone())).await.map_err(backend)?;
            if stale > 0 {
                table.delete(&filter).await.map_err(backend)?;
                debug!(index, document = document_id, removed = stale, "pruned stale chunks");
            }
            Ok(stale)
        })
    }

    fn deprovision(&self, index: &str) -> Result<()> {
        self.run(async {
            if self.has_table(index).await? {
                self.db.drop_table(index, &[]).await.map_err(backend)?;
                info!(index, "dropped LanceDB table");
            }
            self.delete_meta(&spec_key(index)).await
        })
    }

    fn describe(&self, index: &str) -> Result<Option<IndexSpec>> {
        self.run(self.spec_of(index))
    }

    fn count(&self, index: &str) -> Result<usize> {
        self.run(async {
            self.require_spec(index).await?;
            let table = self.db.open_table(index).execute().await.map_err(backend)?;
            table.count_rows(None).await.map_err(backend)
        })
    }
}
