//! Submission change-event handler.
//!
//! Decodes each delivery, hands it to the [`Dispatcher`] and turns the
//! outcome into a [`Disposition`]. Every failure is caught and logged here;
//! none propagates into the consumer loop.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::bus::{Delivery, Disposition, MessageHandler};
use crate::config::{ProcessingConfig, TransportErrorPolicy};
use crate::dispatch::Dispatcher;
use crate::error::{ProcessorError, Result};
use crate::event::OperationKind;

/// Handler applying submission change events to the index.
pub struct SubmissionEventHandler {
    dispatcher: Arc<Dispatcher>,
    on_transport_error: TransportErrorPolicy,
    redelivery_delay: Duration,
}

impl SubmissionEventHandler {
    pub fn new(dispatcher: Arc<Dispatcher>, processing: &ProcessingConfig) -> Self {
        Self {
            dispatcher,
            on_transport_error: processing.on_transport_error,
            redelivery_delay: Duration::from_millis(processing.redelivery_delay_ms),
        }
    }
}

/// Decode and dispatch one delivery.
async fn process(dispatcher: &Dispatcher, delivery: &Delivery) -> Result<OperationKind> {
    let body = delivery.payload.as_deref().unwrap_or_default();
    let message: Value = serde_json::from_slice(body)?;
    dispatcher.handle(&delivery.topic, &message).await
}

impl MessageHandler for SubmissionEventHandler {
    fn handle(&self, delivery: Arc<Delivery>) -> BoxFuture<'static, Disposition> {
        let dispatcher = self.dispatcher.clone();
        let policy = self.on_transport_error;
        let redelivery_delay = self.redelivery_delay;

        Box::pin(async move {
            info!(
                topic = %delivery.topic,
                partition = delivery.partition,
                offset = delivery.offset,
                "Handle event message"
            );

            match process(&dispatcher, &delivery).await {
                Ok(operation) => {
                    debug!(%operation, offset = delivery.offset, "Successfully processed message");
                    Disposition::Commit
                }
                Err(err) => disposition_for(&err, &delivery, policy, redelivery_delay).await,
            }
        })
    }
}

async fn disposition_for(
    err: &ProcessorError,
    delivery: &Delivery,
    policy: TransportErrorPolicy,
    redelivery_delay: Duration,
) -> Disposition {
    if err.is_transient() && policy == TransportErrorPolicy::Redeliver {
        error!(
            topic = %delivery.topic,
            partition = delivery.partition,
            offset = delivery.offset,
            kind = err.kind(),
            error = %err,
            delay = ?redelivery_delay,
            "Index unavailable, message will be redelivered"
        );
        tokio::time::sleep(redelivery_delay).await;
        return Disposition::Redeliver;
    }

    error!(
        topic = %delivery.topic,
        partition = delivery.partition,
        offset = delivery.offset,
        kind = err.kind(),
        error = %err,
        "Failed to process message"
    );
    Disposition::Commit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::TopicsConfig;
    use crate::config::{CreatePolicy, IndexConfig};
    use crate::index::{IndexClient, MemoryIndex};
    use crate::projection::Projector;
    use serde_json::json;

    const CREATE: &str = "submission.notification.create";

    fn handler(policy: TransportErrorPolicy) -> (Arc<MemoryIndex>, SubmissionEventHandler) {
        let index = Arc::new(MemoryIndex::new());
        let projector = Projector::new(
            index.clone(),
            &IndexConfig {
                create_policy: CreatePolicy::Strict,
                ..IndexConfig::default()
            },
        );
        let dispatcher = Arc::new(Dispatcher::new(TopicsConfig::default(), projector));
        let processing = ProcessingConfig {
            on_transport_error: policy,
            redelivery_delay_ms: 1,
        };
        (index, SubmissionEventHandler::new(dispatcher, &processing))
    }

    fn delivery(topic: &str, body: &[u8]) -> Arc<Delivery> {
        Arc::new(Delivery {
            topic: topic.to_string(),
            partition: 0,
            offset: 42,
            payload: Some(body.to_vec()),
        })
    }

    fn submission_create() -> Vec<u8> {
        json!({
            "topic": CREATE,
            "originator": "submission-api",
            "timestamp": "2018-02-16T00:00:00Z",
            "mime-type": "application/json",
            "payload": {"resource": "submission", "id": "s1"}
        })
        .to_string()
        .into_bytes()
    }

    #[tokio::test]
    async fn test_success_commits() {
        let (index, h) = handler(TransportErrorPolicy::Redeliver);
        let disposition = h.handle(delivery(CREATE, &submission_create())).await;
        assert_eq!(disposition, Disposition::Commit);
        assert!(index.get_by_id("submission-index", "s1").await.is_ok());
    }

    #[tokio::test]
    async fn test_decode_failure_commits() {
        let (_, h) = handler(TransportErrorPolicy::Redeliver);
        assert_eq!(
            h.handle(delivery(CREATE, b"not json")).await,
            Disposition::Commit
        );
        assert_eq!(
            h.handle(delivery(CREATE, &[0xff, 0xfe, 0x00])).await,
            Disposition::Commit
        );
    }

    #[tokio::test]
    async fn test_empty_payload_commits() {
        let (_, h) = handler(TransportErrorPolicy::Redeliver);
        let tombstone = Arc::new(Delivery {
            topic: CREATE.to_string(),
            partition: 0,
            offset: 1,
            payload: None,
        });
        assert_eq!(h.handle(tombstone).await, Disposition::Commit);
    }

    #[tokio::test]
    async fn test_channel_mismatch_commits() {
        let (index, h) = handler(TransportErrorPolicy::Redeliver);
        let disposition = h
            .handle(delivery(
                "submission.notification.update",
                &submission_create(),
            ))
            .await;
        assert_eq!(disposition, Disposition::Commit);
        assert_eq!(index.document_count("submission-index").await, 0);
    }

    #[tokio::test]
    async fn test_duplicate_create_commits() {
        let (_, h) = handler(TransportErrorPolicy::Redeliver);
        h.handle(delivery(CREATE, &submission_create())).await;
        assert_eq!(
            h.handle(delivery(CREATE, &submission_create())).await,
            Disposition::Commit
        );
    }

    #[tokio::test]
    async fn test_transport_error_redelivers() {
        let (index, h) = handler(TransportErrorPolicy::Redeliver);
        index.set_fail_on_write(true).await;
        assert_eq!(
            h.handle(delivery(CREATE, &submission_create())).await,
            Disposition::Redeliver
        );
    }

    #[tokio::test]
    async fn test_transport_error_commits_under_commit_policy() {
        let (index, h) = handler(TransportErrorPolicy::Commit);
        index.set_fail_on_write(true).await;
        assert_eq!(
            h.handle(delivery(CREATE, &submission_create())).await,
            Disposition::Commit
        );
    }
}
