//! End-to-end message flow: channel consumer -> handler -> dispatcher -> index.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio_test::assert_ok;

use submission_indexer::bus::{ChannelConsumer, MessageConsumer, TopicsConfig};
use submission_indexer::config::{CreatePolicy, ProcessingConfig, TransportErrorPolicy};
use submission_indexer::handlers::SubmissionEventHandler;
use submission_indexer::index::{IndexClient, MemoryIndex};

use crate::common::{dispatcher, entry_ids, envelope, CREATE, DELETE, INDEX, UPDATE};

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    index: Arc<MemoryIndex>,
    consumer: ChannelConsumer,
}

impl Harness {
    async fn start(policy: TransportErrorPolicy) -> Self {
        let index = Arc::new(MemoryIndex::new());
        let dispatcher = Arc::new(dispatcher(index.clone(), CreatePolicy::Strict));
        let processing = ProcessingConfig {
            on_transport_error: policy,
            redelivery_delay_ms: 5,
        };

        let consumer = ChannelConsumer::new(TopicsConfig::default().all());
        consumer
            .subscribe(Box::new(SubmissionEventHandler::new(dispatcher, &processing)))
            .await
            .unwrap();
        consumer.start_consuming().await.unwrap();

        Self { index, consumer }
    }

    /// Publish and wait until the message is committed.
    async fn send(&self, topic: &str, payload: Value) -> i64 {
        let offset = self.publish(topic, envelope(topic, payload));
        assert!(
            self.consumer.wait_for_commit(topic, offset, WAIT).await,
            "message at offset {offset} was not committed"
        );
        offset
    }

    fn publish(&self, topic: &str, message: Value) -> i64 {
        self.consumer
            .publisher()
            .publish(topic, message.to_string())
            .unwrap()
    }

    async fn source(&self, id: &str) -> Value {
        Value::Object(self.index.get_by_id(INDEX, id).await.unwrap().source)
    }
}

#[tokio::test]
async fn test_review_lifecycle_denormalizes_into_submission() {
    let h = Harness::start(TransportErrorPolicy::Redeliver).await;

    h.send(
        CREATE,
        json!({"resource": "submission", "id": "S1", "memberId": "m1", "type": "Contest Submission"}),
    )
    .await;
    assert_eq!(h.source("S1").await["memberId"], json!("m1"));

    h.send(
        CREATE,
        json!({"resource": "review", "id": "R1", "submissionId": "S1", "score": 98, "reviewerId": "u1"}),
    )
    .await;
    let review = &h.source("S1").await["review"];
    assert_eq!(
        *review,
        json!([{"id": "R1", "submissionId": "S1", "score": 98, "reviewerId": "u1"}])
    );

    h.send(UPDATE, json!({"resource": "review", "id": "R1", "score": 80}))
        .await;
    let review = &h.source("S1").await["review"];
    assert_eq!(entry_ids(review), vec!["R1"]);
    assert_eq!(review[0]["score"], json!(80));
    assert_eq!(review[0]["reviewerId"], json!("u1"));

    h.send(DELETE, json!({"resource": "review", "id": "R1"})).await;
    assert_eq!(h.source("S1").await["review"], json!([]));
    assert!(h.index.get_by_id(INDEX, "R1").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_review_summation_and_review_type() {
    let h = Harness::start(TransportErrorPolicy::Redeliver).await;

    h.send(CREATE, json!({"resource": "submission", "id": "S1"})).await;
    h.send(
        CREATE,
        json!({"resource": "reviewType", "id": "RT1", "name": "Screening", "isActive": true}),
    )
    .await;
    h.send(
        CREATE,
        json!({"resource": "reviewSummation", "id": "RS1", "submissionId": "S1", "aggregateScore": 99.5, "isPassing": true}),
    )
    .await;

    let submission = h.source("S1").await;
    assert_eq!(entry_ids(&submission["reviewSummation"]), vec!["RS1"]);
    assert!(submission.get("reviewType").is_none());
    assert_eq!(h.source("RT1").await["name"], json!("Screening"));

    h.send(UPDATE, json!({"resource": "reviewType", "id": "RT1", "isActive": false}))
        .await;
    let review_type = h.source("RT1").await;
    assert_eq!(review_type["isActive"], json!(false));
    assert_eq!(review_type["name"], json!("Screening"));
}

#[tokio::test]
async fn test_rejected_messages_are_committed_without_writes() {
    let h = Harness::start(TransportErrorPolicy::Redeliver).await;

    // Topic field disagrees with the arrival channel.
    let offset = h.publish(
        CREATE,
        envelope(UPDATE, json!({"resource": "submission", "id": "S1"})),
    );
    assert!(h.consumer.wait_for_commit(CREATE, offset, WAIT).await);

    // Not JSON at all.
    let offset = assert_ok!(h.consumer.publisher().publish(CREATE, "{{{"));
    assert!(h.consumer.wait_for_commit(CREATE, offset, WAIT).await);

    // Missing originator.
    let mut message = envelope(CREATE, json!({"resource": "submission", "id": "S2"}));
    message.as_object_mut().unwrap().remove("originator");
    let offset = h.publish(CREATE, message);
    assert!(h.consumer.wait_for_commit(CREATE, offset, WAIT).await);

    // Update of a document that does not exist.
    h.send(UPDATE, json!({"resource": "submission", "id": "S3", "url": "x"}))
        .await;

    assert_eq!(h.index.document_count(INDEX).await, 0);
}

#[tokio::test]
async fn test_transport_failure_redelivers_until_index_recovers() {
    let h = Harness::start(TransportErrorPolicy::Redeliver).await;
    h.index.set_fail_on_write(true).await;

    let offset = h.publish(
        CREATE,
        envelope(CREATE, json!({"resource": "submission", "id": "S1"})),
    );
    assert!(
        !h.consumer
            .wait_for_commit(CREATE, offset, Duration::from_millis(50))
            .await
    );

    h.index.set_fail_on_write(false).await;
    assert!(h.consumer.wait_for_commit(CREATE, offset, WAIT).await);
    assert!(h.index.get_by_id(INDEX, "S1").await.is_ok());
}

#[tokio::test]
async fn test_transport_failure_committed_under_commit_policy() {
    let h = Harness::start(TransportErrorPolicy::Commit).await;
    h.index.set_fail_on_write(true).await;

    h.send(CREATE, json!({"resource": "submission", "id": "S1"})).await;

    h.index.set_fail_on_write(false).await;
    assert!(h.index.get_by_id(INDEX, "S1").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_legacy_challenge_id_normalized_through_pipeline() {
    let h = Harness::start(TransportErrorPolicy::Redeliver).await;

    h.send(
        CREATE,
        json!({"resource": "submission", "id": "S1", "challenge_id": 30054321}),
    )
    .await;
    h.send(
        UPDATE,
        json!({"resource": "submission", "id": "S1", "challengeId": 30054321, "v5ChallengeId": "a1b2-c3d4"}),
    )
    .await;

    let submission = h.source("S1").await;
    assert_eq!(submission["challengeId"], json!("a1b2-c3d4"));
    assert_eq!(submission["legacyChallengeId"], json!(30054321));
    assert!(submission.get("challenge_id").is_none());
    assert!(submission.get("v5ChallengeId").is_none());
}
