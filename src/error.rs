//! Per-message processing errors.

use crate::index::IndexError;
use crate::validation::ValidationError;

/// Result type for dispatch and projection.
pub type Result<T> = std::result::Result<T, ProcessorError>;

/// Everything that can go wrong while handling one message.
///
/// Only `Index` failures are transient; every other variant describes a
/// message that will fail the same way on redelivery.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("Invalid message JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Document already exists: index={index}, id={id}")]
    Conflict { index: String, id: String },

    #[error("Document not found: index={index}, id={id}")]
    NotFound { index: String, id: String },

    #[error("The message topic {actual} doesn't match the channel {channel}")]
    ChannelMismatch { channel: String, actual: String },

    #[error("Invalid topic: {0}")]
    UnknownChannel(String),

    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    #[error("Index operation failed: {0}")]
    Index(IndexError),
}

impl From<IndexError> for ProcessorError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::NotFound { index, id } => ProcessorError::NotFound { index, id },
            IndexError::Conflict { index, id } => ProcessorError::Conflict { index, id },
            other => ProcessorError::Index(other),
        }
    }
}

impl ProcessorError {
    /// Whether a redelivery could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProcessorError::Index(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ProcessorError::NotFound { .. })
    }

    /// Short label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ProcessorError::Decode(_) => "decode",
            ProcessorError::Validation(_) => "validation",
            ProcessorError::Conflict { .. } => "conflict",
            ProcessorError::NotFound { .. } => "not_found",
            ProcessorError::ChannelMismatch { .. } => "channel_mismatch",
            ProcessorError::UnknownChannel(_) => "unknown_channel",
            ProcessorError::UnknownResource(_) => "unknown_resource",
            ProcessorError::Index(_) => "index",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_errors_map_to_taxonomy() {
        let err: ProcessorError = IndexError::not_found("subs", "s1").into();
        assert!(err.is_not_found());
        assert!(!err.is_transient());

        let err: ProcessorError = IndexError::conflict("subs", "s1").into();
        assert!(matches!(err, ProcessorError::Conflict { .. }));

        let err: ProcessorError = IndexError::Transport("refused".into()).into();
        assert!(err.is_transient());
        assert_eq!(err.kind(), "index");

        let err: ProcessorError = IndexError::version_conflict("subs", "s1").into();
        assert!(err.is_transient());
    }

    #[test]
    fn test_messages() {
        let err = ProcessorError::ChannelMismatch {
            channel: "a.create".into(),
            actual: "a.update".into(),
        };
        assert_eq!(
            err.to_string(),
            "The message topic a.update doesn't match the channel a.create"
        );
    }
}
