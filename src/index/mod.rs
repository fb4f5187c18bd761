//! Search index client adapter.
//!
//! This module contains:
//! - `IndexClient` trait: point operations plus index administration
//! - `MemoryIndex`: in-process versioned index (tests, standalone)
//! - `HttpIndex`: Elasticsearch/OpenSearch REST adapter
//! - `initialize`: one-shot index creation used by the `init-index` binary

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::info;

use crate::config::{IndexBackend, IndexConfig};

pub mod http;
pub mod init;
pub mod memory;

pub use http::HttpIndex;
pub use init::initialize;
pub use memory::MemoryIndex;

/// Result type for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Document not found: index={index}, id={id}")]
    NotFound { index: String, id: String },

    #[error("Document already exists: index={index}, id={id}")]
    Conflict { index: String, id: String },

    #[error("Version conflict: index={index}, id={id}")]
    VersionConflict { index: String, id: String },

    #[error("Index request failed: {0}")]
    Transport(String),

    #[error("Unexpected index response ({status}): {body}")]
    Backend { status: u16, body: String },

    #[error("Malformed index response: {0}")]
    Malformed(String),
}

impl IndexError {
    pub fn not_found(index: &str, id: &str) -> Self {
        IndexError::NotFound {
            index: index.to_string(),
            id: id.to_string(),
        }
    }

    pub fn conflict(index: &str, id: &str) -> Self {
        IndexError::Conflict {
            index: index.to_string(),
            id: id.to_string(),
        }
    }

    pub fn version_conflict(index: &str, id: &str) -> Self {
        IndexError::VersionConflict {
            index: index.to_string(),
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, IndexError::NotFound { .. })
    }

    pub fn is_version_conflict(&self) -> bool {
        matches!(self, IndexError::VersionConflict { .. })
    }
}

impl From<reqwest::Error> for IndexError {
    fn from(err: reqwest::Error) -> Self {
        IndexError::Transport(err.to_string())
    }
}

/// Optimistic concurrency token returned with every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocVersion {
    pub seq_no: i64,
    pub primary_term: i64,
}

/// A document as read from the index.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub source: Map<String, Value>,
    pub version: Option<DocVersion>,
}

/// Options for [`IndexClient::upsert_merge`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeOptions {
    /// Insert the partial body as a new document when the id is absent.
    pub create_if_missing: bool,
    /// Only apply when the stored document still has this version.
    pub if_version: Option<DocVersion>,
}

impl MergeOptions {
    /// Merge into an existing document, failing with `NotFound` otherwise.
    pub fn existing() -> Self {
        Self::default()
    }

    /// Merge, creating the document when absent.
    pub fn upsert() -> Self {
        Self {
            create_if_missing: true,
            if_version: None,
        }
    }

    /// Merge into an existing document read at `version`.
    pub fn conditional(version: Option<DocVersion>) -> Self {
        Self {
            create_if_missing: false,
            if_version: version,
        }
    }
}

/// Interface to the document index.
///
/// Implementations:
/// - `HttpIndex`: Elasticsearch/OpenSearch over REST
/// - `MemoryIndex`: in-memory index for testing and standalone runs
#[async_trait]
pub trait IndexClient: Send + Sync {
    /// Fetch a document by id.
    async fn get_by_id(&self, index: &str, id: &str) -> Result<Document>;

    /// Create a document, failing with `Conflict` when the id exists.
    async fn create_by_id(&self, index: &str, id: &str, body: &Map<String, Value>) -> Result<()>;

    /// Partial update with Elasticsearch merge semantics.
    ///
    /// Objects merge recursively; arrays and scalars replace the stored value.
    async fn upsert_merge(
        &self,
        index: &str,
        id: &str,
        partial: &Map<String, Value>,
        options: MergeOptions,
    ) -> Result<()>;

    /// Delete a document, failing with `NotFound` when absent.
    async fn delete_by_id(&self, index: &str, id: &str) -> Result<()>;

    async fn index_exists(&self, index: &str) -> Result<bool>;

    async fn create_index(&self, index: &str) -> Result<()>;

    async fn delete_index(&self, index: &str) -> Result<()>;
}

/// Apply a partial body onto a stored document.
///
/// Mirrors Elasticsearch partial-update semantics: nested objects are merged
/// key by key, everything else (arrays included) is replaced.
pub fn merge_document(target: &mut Map<String, Value>, partial: &Map<String, Value>) {
    for (key, value) in partial {
        if let (Some(Value::Object(existing)), Value::Object(incoming)) =
            (target.get_mut(key), value)
        {
            merge_document(existing, incoming);
            continue;
        }
        target.insert(key.clone(), value.clone());
    }
}

/// Initialize the index client based on configuration.
pub fn init_index_client(
    config: &IndexConfig,
) -> std::result::Result<Arc<dyn IndexClient>, Box<dyn std::error::Error + Send + Sync>> {
    match config.backend {
        IndexBackend::Http => {
            let client = HttpIndex::new(config)?;
            info!(url = %config.url, "Index client initialized");
            Ok(Arc::new(client))
        }
        IndexBackend::Memory => {
            info!("Using in-memory index");
            Ok(Arc::new(MemoryIndex::new()))
        }
    }
}
