//! Message bus for inbound change events.
//!
//! This module contains:
//! - `MessageConsumer` trait: subscription and delivery of raw messages
//! - `MessageHandler` trait: per-message processing returning a disposition
//! - Bus configuration types
//! - Implementations: Kafka, in-process channel

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::info;

// Implementation modules
pub mod channel;
#[cfg(feature = "kafka")]
pub mod kafka;

// Re-exports
pub use channel::{ChannelConsumer, ChannelPublisher};
#[cfg(feature = "kafka")]
pub use kafka::KafkaConsumer;

// ============================================================================
// Traits
// ============================================================================

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Channel closed")]
    Closed,
}

/// A message as received from a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    /// Raw body; `None` for tombstones.
    pub payload: Option<Vec<u8>>,
}

/// What the consumer does with a message once its handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Commit the offset; the message is done.
    Commit,
    /// Leave the offset uncommitted and deliver the message again.
    Redeliver,
}

impl Disposition {
    /// Combined disposition of several handlers: any redelivery wins.
    pub fn combine(self, other: Disposition) -> Disposition {
        match (self, other) {
            (Disposition::Commit, Disposition::Commit) => Disposition::Commit,
            _ => Disposition::Redeliver,
        }
    }
}

/// Handler for processing messages from the bus.
pub trait MessageHandler: Send + Sync {
    /// Process one delivery. Errors are the handler's to log; the returned
    /// disposition tells the consumer whether to commit.
    fn handle(&self, delivery: Arc<Delivery>) -> BoxFuture<'static, Disposition>;
}

/// Run every handler on a delivery and combine their dispositions.
pub(crate) async fn dispatch_to_handlers(
    handlers: &[Box<dyn MessageHandler>],
    delivery: &Arc<Delivery>,
) -> Disposition {
    let mut disposition = Disposition::Commit;
    for handler in handlers {
        disposition = disposition.combine(handler.handle(Arc::clone(delivery)).await);
    }
    disposition
}

/// Source of inbound messages.
///
/// Implementations:
/// - `KafkaConsumer`: Kafka consumer group via rdkafka
/// - `ChannelConsumer`: in-process channel for tests and local runs
#[async_trait]
pub trait MessageConsumer: Send + Sync {
    /// Register a handler. Call before `start_consuming`.
    async fn subscribe(&self, handler: Box<dyn MessageHandler>) -> Result<()>;

    /// Subscribe to the configured topics and spawn the delivery loop.
    async fn start_consuming(&self) -> Result<()>;

    /// Whether the consumer currently has a live broker connection.
    fn is_connected(&self) -> bool;
}

// ============================================================================
// Configuration
// ============================================================================

/// Messaging type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagingType {
    /// Kafka messaging.
    #[default]
    Kafka,
    /// In-process channel (local runs and tests).
    Channel,
}

/// Messaging configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Messaging type discriminator.
    #[serde(rename = "type")]
    pub messaging_type: MessagingType,
    /// Kafka-specific configuration.
    pub kafka: KafkaConfig,
    /// Channel names, one per operation.
    pub topics: TopicsConfig,
}

/// Kafka-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    /// Kafka bootstrap servers (comma-separated).
    pub bootstrap_servers: String,
    /// Consumer group ID.
    pub group_id: String,
    /// Where a new group starts reading ("latest" or "earliest").
    pub auto_offset_reset: String,
    /// Interval of librdkafka statistics, which drive the health check.
    pub statistics_interval_ms: u64,
    /// SASL username (optional, for authenticated clusters).
    pub sasl_username: Option<String>,
    /// SASL password (optional, for authenticated clusters).
    pub sasl_password: Option<String>,
    /// SASL mechanism (PLAIN, SCRAM-SHA-256, SCRAM-SHA-512).
    pub sasl_mechanism: Option<String>,
    /// Security protocol (PLAINTEXT, SSL, SASL_PLAINTEXT, SASL_SSL).
    pub security_protocol: Option<String>,
    /// SSL CA certificate path (for SSL connections).
    pub ssl_ca_location: Option<String>,
    /// PEM client certificate (mutual TLS).
    pub ssl_certificate_pem: Option<String>,
    /// PEM client key (mutual TLS).
    pub ssl_key_pem: Option<String>,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            group_id: "submission-processor".to_string(),
            auto_offset_reset: "latest".to_string(),
            statistics_interval_ms: 5000,
            sasl_username: None,
            sasl_password: None,
            sasl_mechanism: None,
            security_protocol: None,
            ssl_ca_location: None,
            ssl_certificate_pem: None,
            ssl_key_pem: None,
        }
    }
}

/// Channel names for each operation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TopicsConfig {
    pub create: String,
    pub update: String,
    pub delete: String,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            create: "submission.notification.create".to_string(),
            update: "submission.notification.update".to_string(),
            delete: "submission.notification.delete".to_string(),
        }
    }
}

impl TopicsConfig {
    /// All channel names, in create/update/delete order.
    pub fn all(&self) -> Vec<String> {
        vec![self.create.clone(), self.update.clone(), self.delete.clone()]
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Initialize the message consumer based on configuration.
///
/// Kafka requires the `kafka` feature.
pub fn init_consumer(
    config: &MessagingConfig,
) -> std::result::Result<Arc<dyn MessageConsumer>, Box<dyn std::error::Error + Send + Sync>> {
    match config.messaging_type {
        MessagingType::Kafka => {
            #[cfg(feature = "kafka")]
            {
                let consumer = KafkaConsumer::new(&config.kafka, config.topics.all())?;
                info!(messaging_type = "kafka", "Message consumer initialized");
                Ok(Arc::new(consumer))
            }

            #[cfg(not(feature = "kafka"))]
            {
                Err("Kafka support requires the 'kafka' feature. Rebuild with --features kafka".into())
            }
        }
        MessagingType::Channel => {
            let consumer = ChannelConsumer::new(config.topics.all());
            info!(messaging_type = "channel", "Message consumer initialized");
            Ok(Arc::new(consumer))
        }
    }
}
