//! Event dispatch.
//!
//! Routes a decoded message by the channel it arrived on and its
//! `payload.resource` tag. Structural rejections happen here, before the
//! projector sees the event.

use serde_json::Value;
use tracing::debug;

use crate::bus::TopicsConfig;
use crate::error::{ProcessorError, Result};
use crate::event::{OperationKind, ResourceKind, RESOURCE_FIELD};
use crate::projection::Projector;
use crate::validation;

/// Channel-aware front door of the projection engine.
pub struct Dispatcher {
    topics: TopicsConfig,
    projector: Projector,
}

impl Dispatcher {
    pub fn new(topics: TopicsConfig, projector: Projector) -> Self {
        Self { topics, projector }
    }

    /// Channels to subscribe to, one per operation.
    pub fn channels(&self) -> Vec<String> {
        self.topics.all()
    }

    /// Operation associated with a channel name.
    pub fn operation_for(&self, channel: &str) -> Option<OperationKind> {
        if channel == self.topics.create {
            Some(OperationKind::Create)
        } else if channel == self.topics.update {
            Some(OperationKind::Update)
        } else if channel == self.topics.delete {
            Some(OperationKind::Delete)
        } else {
            None
        }
    }

    /// Validate and apply one message received on `channel`.
    pub async fn handle(&self, channel: &str, message: &Value) -> Result<OperationKind> {
        if let Some(actual) = message.get("topic").and_then(Value::as_str) {
            if actual != channel {
                return Err(ProcessorError::ChannelMismatch {
                    channel: channel.to_string(),
                    actual: actual.to_string(),
                });
            }
        }

        let operation = self
            .operation_for(channel)
            .ok_or_else(|| ProcessorError::UnknownChannel(channel.to_string()))?;

        if let Some(tag) = message
            .get("payload")
            .and_then(|p| p.get(RESOURCE_FIELD))
            .and_then(Value::as_str)
        {
            if ResourceKind::from_tag(tag).is_none() {
                return Err(ProcessorError::UnknownResource(tag.to_string()));
            }
        }

        let event = validation::validate(message)?;
        debug!(%operation, resource = %event.resource, id = %event.id, "Dispatching event");

        match operation {
            OperationKind::Create => self.projector.create(&event).await?,
            OperationKind::Update => self.projector.update(&event).await?,
            OperationKind::Delete => self.projector.delete(&event).await?,
        }
        Ok(operation)
    }
}
