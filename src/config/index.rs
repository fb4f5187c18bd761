//! Search index configuration types.

use serde::Deserialize;

use crate::event::ResourceKind;

/// Index client implementation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    /// Elasticsearch/OpenSearch REST API.
    #[default]
    Http,
    /// In-process index (local runs and tests).
    Memory,
}

/// Behaviour of Create events for a document id that already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreatePolicy {
    /// Fail with a conflict when the id exists.
    Strict,
    /// Merge into the existing document, creating it when absent.
    #[default]
    Upsert,
}

/// Mapping from resource kinds to physical indices.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndexLayout {
    /// One index for every kind; the `resource` field discriminates.
    Shared { index: String },
    /// One index per kind.
    PerResource {
        submission: String,
        review: String,
        review_type: String,
        review_summation: String,
    },
}

impl Default for IndexLayout {
    fn default() -> Self {
        IndexLayout::Shared {
            index: "submission-index".to_string(),
        }
    }
}

impl IndexLayout {
    /// Physical index holding documents of `kind`.
    pub fn index_for(&self, kind: ResourceKind) -> &str {
        match self {
            IndexLayout::Shared { index } => index,
            IndexLayout::PerResource {
                submission,
                review,
                review_type,
                review_summation,
            } => match kind {
                ResourceKind::Submission => submission,
                ResourceKind::Review => review,
                ResourceKind::ReviewType => review_type,
                ResourceKind::ReviewSummation => review_summation,
            },
        }
    }

    /// Distinct physical indices, in registry order.
    pub fn indices(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for spec in crate::event::RESOURCES.iter() {
            let name = self.index_for(spec.kind);
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        names
    }
}

/// Backoff for version-conflict retries on parent list writes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConflictRetryConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_times: usize,
}

impl Default for ConflictRetryConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 10,
            max_delay_ms: 1000,
            max_times: 8,
        }
    }
}

/// Search index configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Client implementation.
    pub backend: IndexBackend,
    /// Base URL of the cluster.
    pub url: String,
    /// Basic auth user (optional).
    pub username: Option<String>,
    /// Basic auth password (optional).
    pub password: Option<String>,
    /// Resource-to-index mapping.
    pub layout: IndexLayout,
    /// Create event semantics for existing ids.
    pub create_policy: CreatePolicy,
    /// Value of the `refresh` query parameter on writes (e.g. "wait_for").
    pub refresh: Option<String>,
    /// Per-request timeout.
    pub request_timeout_ms: u64,
    /// Retry policy for conditional parent writes.
    pub conflict_retry: ConflictRetryConfig,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: IndexBackend::Http,
            url: "http://localhost:9200".to_string(),
            username: None,
            password: None,
            layout: IndexLayout::default(),
            create_policy: CreatePolicy::Upsert,
            refresh: None,
            request_timeout_ms: 30_000,
            conflict_retry: ConflictRetryConfig::default(),
        }
    }
}
