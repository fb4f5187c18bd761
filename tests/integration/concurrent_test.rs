//! Lost-update protection on parent list rewrites.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::Barrier;

use submission_indexer::config::CreatePolicy;
use submission_indexer::error::ProcessorError;
use submission_indexer::index::{Document, IndexClient, IndexError, MemoryIndex, MergeOptions, Result};

use crate::common::{dispatcher, entry_ids, envelope, CREATE, INDEX};

/// Index whose first `armed` reads of one document wait for each other, so
/// concurrent writers all observe the same version.
struct LockstepIndex {
    inner: MemoryIndex,
    document: String,
    armed: AtomicUsize,
    barrier: Barrier,
}

impl LockstepIndex {
    fn new(document: &str, readers: usize) -> Self {
        Self {
            inner: MemoryIndex::new(),
            document: document.to_string(),
            armed: AtomicUsize::new(readers),
            barrier: Barrier::new(readers),
        }
    }
}

#[async_trait]
impl IndexClient for LockstepIndex {
    async fn get_by_id(&self, index: &str, id: &str) -> Result<Document> {
        let doc = self.inner.get_by_id(index, id).await;
        if id == self.document
            && self
                .armed
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            self.barrier.wait().await;
        }
        doc
    }

    async fn create_by_id(&self, index: &str, id: &str, body: &Map<String, Value>) -> Result<()> {
        self.inner.create_by_id(index, id, body).await
    }

    async fn upsert_merge(
        &self,
        index: &str,
        id: &str,
        partial: &Map<String, Value>,
        options: MergeOptions,
    ) -> Result<()> {
        self.inner.upsert_merge(index, id, partial, options).await
    }

    async fn delete_by_id(&self, index: &str, id: &str) -> Result<()> {
        self.inner.delete_by_id(index, id).await
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        self.inner.index_exists(index).await
    }

    async fn create_index(&self, index: &str) -> Result<()> {
        self.inner.create_index(index).await
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        self.inner.delete_index(index).await
    }
}

/// Index rejecting every conditional write as stale.
struct AlwaysStaleIndex {
    inner: MemoryIndex,
    conditional_writes: AtomicUsize,
}

#[async_trait]
impl IndexClient for AlwaysStaleIndex {
    async fn get_by_id(&self, index: &str, id: &str) -> Result<Document> {
        self.inner.get_by_id(index, id).await
    }

    async fn create_by_id(&self, index: &str, id: &str, body: &Map<String, Value>) -> Result<()> {
        self.inner.create_by_id(index, id, body).await
    }

    async fn upsert_merge(
        &self,
        index: &str,
        id: &str,
        partial: &Map<String, Value>,
        options: MergeOptions,
    ) -> Result<()> {
        if options.if_version.is_some() {
            self.conditional_writes.fetch_add(1, Ordering::SeqCst);
            return Err(IndexError::version_conflict(index, id));
        }
        self.inner.upsert_merge(index, id, partial, options).await
    }

    async fn delete_by_id(&self, index: &str, id: &str) -> Result<()> {
        self.inner.delete_by_id(index, id).await
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        self.inner.index_exists(index).await
    }

    async fn create_index(&self, index: &str) -> Result<()> {
        self.inner.create_index(index).await
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        self.inner.delete_index(index).await
    }
}

fn review(id: &str) -> Value {
    envelope(
        CREATE,
        json!({"resource": "review", "id": id, "submissionId": "S1", "score": 90}),
    )
}

#[tokio::test]
async fn test_concurrent_reviews_both_survive() {
    let index = Arc::new(LockstepIndex::new("S1", 2));
    let d = dispatcher(index.clone(), CreatePolicy::Strict);
    d.handle(CREATE, &envelope(CREATE, json!({"resource": "submission", "id": "S1"})))
        .await
        .unwrap();

    let first = review("R1");
    let second = review("R2");
    let (a, b) = tokio::join!(d.handle(CREATE, &first), d.handle(CREATE, &second));
    a.unwrap();
    b.unwrap();

    let parent = index.get_by_id(INDEX, "S1").await.unwrap();
    let mut ids = entry_ids(&parent.source["review"]);
    ids.sort();
    assert_eq!(ids, vec!["R1", "R2"]);
}

#[tokio::test]
async fn test_exhausted_conflict_retries_surface_as_transient() {
    let index = Arc::new(AlwaysStaleIndex {
        inner: MemoryIndex::new(),
        conditional_writes: AtomicUsize::new(0),
    });
    let d = dispatcher(index.clone(), CreatePolicy::Strict);
    d.handle(CREATE, &envelope(CREATE, json!({"resource": "submission", "id": "S1"})))
        .await
        .unwrap();

    let err = d.handle(CREATE, &review("R1")).await.unwrap_err();
    assert!(err.is_transient());
    assert!(matches!(
        err,
        ProcessorError::Index(IndexError::VersionConflict { .. })
    ));
    // One initial attempt plus max_times retries.
    assert_eq!(index.conditional_writes.load(Ordering::SeqCst), 6);
}
