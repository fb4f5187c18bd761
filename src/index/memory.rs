//! In-memory index for testing and standalone runs.
//!
//! Documents carry a monotonically increasing sequence number so conditional
//! writes behave like the Elasticsearch `if_seq_no` checks.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::{merge_document, DocVersion, Document, IndexClient, IndexError, MergeOptions, Result};

const PRIMARY_TERM: i64 = 1;

struct StoredDoc {
    source: Map<String, Value>,
    seq_no: i64,
}

#[derive(Default)]
struct State {
    indices: HashMap<String, HashMap<String, StoredDoc>>,
    next_seq_no: i64,
}

impl State {
    fn bump(&mut self) -> i64 {
        let seq = self.next_seq_no;
        self.next_seq_no += 1;
        seq
    }
}

/// Index that keeps every document in memory.
///
/// Writing to an index that does not exist creates it, as Elasticsearch does
/// with automatic index creation enabled.
#[derive(Default)]
pub struct MemoryIndex {
    state: RwLock<State>,
    fail_on_read: RwLock<bool>,
    fail_on_write: RwLock<bool>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every read fail with a transport error.
    pub async fn set_fail_on_read(&self, fail: bool) {
        *self.fail_on_read.write().await = fail;
    }

    /// Make every write fail with a transport error.
    pub async fn set_fail_on_write(&self, fail: bool) {
        *self.fail_on_write.write().await = fail;
    }

    /// Number of documents stored in an index.
    pub async fn document_count(&self, index: &str) -> usize {
        self.state
            .read()
            .await
            .indices
            .get(index)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    /// Names of existing indices, sorted.
    pub async fn index_names(&self) -> Vec<String> {
        let names: BTreeSet<String> = self.state.read().await.indices.keys().cloned().collect();
        names.into_iter().collect()
    }

    async fn check_read(&self) -> Result<()> {
        if *self.fail_on_read.read().await {
            return Err(IndexError::Transport("simulated read failure".to_string()));
        }
        Ok(())
    }

    async fn check_write(&self) -> Result<()> {
        if *self.fail_on_write.read().await {
            return Err(IndexError::Transport("simulated write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl IndexClient for MemoryIndex {
    async fn get_by_id(&self, index: &str, id: &str) -> Result<Document> {
        self.check_read().await?;
        let state = self.state.read().await;
        state
            .indices
            .get(index)
            .and_then(|docs| docs.get(id))
            .map(|doc| Document {
                id: id.to_string(),
                source: doc.source.clone(),
                version: Some(DocVersion {
                    seq_no: doc.seq_no,
                    primary_term: PRIMARY_TERM,
                }),
            })
            .ok_or_else(|| IndexError::not_found(index, id))
    }

    async fn create_by_id(&self, index: &str, id: &str, body: &Map<String, Value>) -> Result<()> {
        self.check_write().await?;
        let mut state = self.state.write().await;
        let seq_no = state.bump();
        let docs = state.indices.entry(index.to_string()).or_default();
        if docs.contains_key(id) {
            return Err(IndexError::conflict(index, id));
        }
        docs.insert(
            id.to_string(),
            StoredDoc {
                source: body.clone(),
                seq_no,
            },
        );
        Ok(())
    }

    async fn upsert_merge(
        &self,
        index: &str,
        id: &str,
        partial: &Map<String, Value>,
        options: MergeOptions,
    ) -> Result<()> {
        self.check_write().await?;
        let mut state = self.state.write().await;
        let seq_no = state.bump();
        let docs = state.indices.entry(index.to_string()).or_default();
        match docs.get_mut(id) {
            Some(doc) => {
                if let Some(expected) = options.if_version {
                    if expected.seq_no != doc.seq_no || expected.primary_term != PRIMARY_TERM {
                        return Err(IndexError::version_conflict(index, id));
                    }
                }
                merge_document(&mut doc.source, partial);
                doc.seq_no = seq_no;
                Ok(())
            }
            None if options.create_if_missing => {
                docs.insert(
                    id.to_string(),
                    StoredDoc {
                        source: partial.clone(),
                        seq_no,
                    },
                );
                Ok(())
            }
            None => Err(IndexError::not_found(index, id)),
        }
    }

    async fn delete_by_id(&self, index: &str, id: &str) -> Result<()> {
        self.check_write().await?;
        let mut state = self.state.write().await;
        state
            .indices
            .get_mut(index)
            .and_then(|docs| docs.remove(id))
            .map(|_| ())
            .ok_or_else(|| IndexError::not_found(index, id))
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        self.check_read().await?;
        Ok(self.state.read().await.indices.contains_key(index))
    }

    async fn create_index(&self, index: &str) -> Result<()> {
        self.check_write().await?;
        let mut state = self.state.write().await;
        if state.indices.contains_key(index) {
            return Err(IndexError::Backend {
                status: 400,
                body: format!("index [{}] already exists", index),
            });
        }
        state.indices.insert(index.to_string(), HashMap::new());
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        self.check_write().await?;
        let mut state = self.state.write().await;
        state
            .indices
            .remove(index)
            .map(|_| ())
            .ok_or_else(|| IndexError::not_found(index, "_index"))
    }
}
