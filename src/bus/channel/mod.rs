//! In-process channel consumer for local runs and tests.
//!
//! Messages enter through a [`ChannelPublisher`] and are delivered one at a
//! time to the subscribed handlers, mirroring the Kafka consumer: a
//! `Redeliver` disposition delivers the same message again, a `Commit`
//! records its offset.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tracing::{debug, info};

use super::{dispatch_to_handlers, BusError, Delivery, Disposition, MessageConsumer, MessageHandler, Result};

/// Partition reported for every channel delivery.
const PARTITION: i32 = 0;

/// Sending side of a channel consumer.
#[derive(Clone)]
pub struct ChannelPublisher {
    sender: mpsc::UnboundedSender<Delivery>,
    next_offset: Arc<AtomicI64>,
}

impl ChannelPublisher {
    /// Enqueue a message on `topic`. Returns the assigned offset.
    pub fn publish(&self, topic: &str, payload: impl Into<Vec<u8>>) -> Result<i64> {
        let offset = self.next_offset.fetch_add(1, Ordering::SeqCst);
        self.sender
            .send(Delivery {
                topic: topic.to_string(),
                partition: PARTITION,
                offset,
                payload: Some(payload.into()),
            })
            .map_err(|_| BusError::Closed)?;
        debug!(topic, offset, "Published message to channel");
        Ok(offset)
    }
}

/// Consumer reading from an in-process queue.
pub struct ChannelConsumer {
    topics: Vec<String>,
    publisher: ChannelPublisher,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Delivery>>>,
    handlers: Arc<RwLock<Vec<Box<dyn MessageHandler>>>>,
    committed: Arc<RwLock<HashMap<String, i64>>>,
    commits: watch::Sender<u64>,
    consuming: Arc<AtomicBool>,
}

impl ChannelConsumer {
    /// Create a consumer subscribed to `topics`.
    pub fn new(topics: Vec<String>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (commits, _) = watch::channel(0);
        Self {
            topics,
            publisher: ChannelPublisher {
                sender,
                next_offset: Arc::new(AtomicI64::new(0)),
            },
            receiver: Mutex::new(Some(receiver)),
            handlers: Arc::new(RwLock::new(Vec::new())),
            committed: Arc::new(RwLock::new(HashMap::new())),
            commits,
            consuming: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for enqueueing messages.
    pub fn publisher(&self) -> ChannelPublisher {
        self.publisher.clone()
    }

    /// Highest committed offset on `topic`.
    pub async fn committed_offset(&self, topic: &str) -> Option<i64> {
        self.committed.read().await.get(topic).copied()
    }

    /// Wait until `offset` on `topic` is committed, up to `timeout`.
    pub async fn wait_for_commit(&self, topic: &str, offset: i64, timeout: Duration) -> bool {
        let mut commits = self.commits.subscribe();
        let wait = async {
            loop {
                if self
                    .committed_offset(topic)
                    .await
                    .is_some_and(|committed| committed >= offset)
                {
                    return;
                }
                if commits.changed().await.is_err() {
                    return;
                }
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
            && self
                .committed_offset(topic)
                .await
                .is_some_and(|committed| committed >= offset)
    }
}

#[async_trait]
impl MessageConsumer for ChannelConsumer {
    async fn subscribe(&self, handler: Box<dyn MessageHandler>) -> Result<()> {
        let count = {
            let mut handlers = self.handlers.write().await;
            handlers.push(handler);
            handlers.len()
        };

        info!(handler_count = count, "Handler subscribed to channel consumer");

        Ok(())
    }

    async fn start_consuming(&self) -> Result<()> {
        let Some(mut receiver) = self.receiver.lock().await.take() else {
            return Ok(());
        };
        self.consuming.store(true, Ordering::SeqCst);

        let topics = self.topics.clone();
        let handlers = self.handlers.clone();
        let committed = self.committed.clone();
        let commits = self.commits.clone();
        let consuming = self.consuming.clone();

        tokio::spawn(async move {
            while let Some(delivery) = receiver.recv().await {
                if !topics.contains(&delivery.topic) {
                    debug!(topic = %delivery.topic, "Skipping message on unsubscribed topic");
                    continue;
                }

                let delivery = Arc::new(delivery);
                loop {
                    let disposition = {
                        let handlers = handlers.read().await;
                        dispatch_to_handlers(&handlers, &delivery).await
                    };
                    if disposition == Disposition::Commit {
                        break;
                    }
                    debug!(
                        topic = %delivery.topic,
                        offset = delivery.offset,
                        "Redelivering message"
                    );
                }

                committed
                    .write()
                    .await
                    .insert(delivery.topic.clone(), delivery.offset);
                commits.send_modify(|n| *n += 1);
            }
            consuming.store(false, Ordering::SeqCst);
            info!("Channel closed, stopping consumer");
        });

        info!(topics = ?self.topics, "Channel consumer started");

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.consuming.load(Ordering::SeqCst)
    }
}
