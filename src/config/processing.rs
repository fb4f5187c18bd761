//! Per-message failure handling configuration.

use serde::Deserialize;

/// What to do with a message whose handler hit a transport/backend error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportErrorPolicy {
    /// Leave the offset uncommitted and deliver the message again.
    #[default]
    Redeliver,
    /// Log the failure and commit the offset anyway.
    Commit,
}

/// Processing configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Disposition for transport/backend failures.
    pub on_transport_error: TransportErrorPolicy,
    /// Pause before a message is delivered again.
    pub redelivery_delay_ms: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            on_transport_error: TransportErrorPolicy::Redeliver,
            redelivery_delay_ms: 1000,
        }
    }
}
