//! Kafka consumer implementation.
//!
//! One consumer group subscription covering the create/update/delete topics.
//! Messages are handled strictly one at a time. Offsets are committed
//! manually after the handlers return `Commit`; on `Redeliver` the consumer
//! seeks the partition back to the message so it is fetched again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::RDKafkaLogLevel;
use rdkafka::consumer::{CommitMode, Consumer, ConsumerContext, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::statistics::Statistics;
use rdkafka::{ClientConfig, ClientContext, Offset};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::{dispatch_to_handlers, BusError, Delivery, Disposition, KafkaConfig, MessageConsumer, MessageHandler, Result};

/// Timeout for partition seeks on redelivery.
const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

/// Client context tracking broker connectivity from librdkafka callbacks.
pub struct ConnectivityContext {
    connected: Arc<AtomicBool>,
}

impl ConnectivityContext {
    fn new(connected: Arc<AtomicBool>) -> Self {
        Self { connected }
    }
}

/// Whether any real broker reports state `UP`.
///
/// Bootstrap and coordinator pseudo-brokers carry node id -1 and are ignored.
pub(crate) fn brokers_up(statistics: &Statistics) -> bool {
    statistics
        .brokers
        .values()
        .any(|broker| broker.nodeid >= 0 && broker.state == "UP")
}

impl ClientContext for ConnectivityContext {
    fn stats(&self, statistics: Statistics) {
        let up = brokers_up(&statistics);
        if self.connected.swap(up, Ordering::SeqCst) != up {
            info!(connected = up, "Kafka connectivity changed");
        }
    }

    fn error(&self, error: KafkaError, reason: &str) {
        if let KafkaError::Global(RDKafkaErrorCode::AllBrokersDown) = error {
            self.connected.store(false, Ordering::SeqCst);
        }
        error!(error = %error, reason, "Kafka client error");
    }
}

impl ConsumerContext for ConnectivityContext {}

type SubmissionStreamConsumer = StreamConsumer<ConnectivityContext>;

/// Build the librdkafka configuration for the consumer group.
pub(crate) fn build_consumer_config(config: &KafkaConfig) -> ClientConfig {
    let mut client = ClientConfig::new();
    client.set("bootstrap.servers", &config.bootstrap_servers);
    client.set("group.id", &config.group_id);
    client.set("enable.auto.commit", "false");
    client.set("auto.offset.reset", &config.auto_offset_reset);
    client.set(
        "statistics.interval.ms",
        config.statistics_interval_ms.to_string(),
    );
    client.set_log_level(RDKafkaLogLevel::Warning);

    apply_security_config(&mut client, config);
    client
}

/// Apply security settings to a ClientConfig.
fn apply_security_config(client: &mut ClientConfig, config: &KafkaConfig) {
    if let Some(ref protocol) = config.security_protocol {
        client.set("security.protocol", protocol);
    }

    if let Some(ref mechanism) = config.sasl_mechanism {
        client.set("sasl.mechanism", mechanism);
    }

    if let Some(ref username) = config.sasl_username {
        client.set("sasl.username", username);
    }

    if let Some(ref password) = config.sasl_password {
        client.set("sasl.password", password);
    }

    if let Some(ref ca_location) = config.ssl_ca_location {
        client.set("ssl.ca.location", ca_location);
    }

    if let (Some(ref cert), Some(ref key)) = (&config.ssl_certificate_pem, &config.ssl_key_pem) {
        client.set("ssl.certificate.pem", cert);
        client.set("ssl.key.pem", key);
        if config.security_protocol.is_none() {
            client.set("security.protocol", "SSL");
        }
    }
}

/// Kafka consumer group member.
pub struct KafkaConsumer {
    consumer: Arc<SubmissionStreamConsumer>,
    topics: Vec<String>,
    handlers: Arc<RwLock<Vec<Box<dyn MessageHandler>>>>,
    connected: Arc<AtomicBool>,
    started: Mutex<bool>,
}

impl KafkaConsumer {
    /// Create a consumer for `topics`. Does not subscribe yet.
    pub fn new(config: &KafkaConfig, topics: Vec<String>) -> Result<Self> {
        let connected = Arc::new(AtomicBool::new(false));
        let consumer: SubmissionStreamConsumer = build_consumer_config(config)
            .create_with_context(ConnectivityContext::new(connected.clone()))
            .map_err(|e| BusError::Connection(format!("Failed to create Kafka consumer: {}", e)))?;

        info!(
            bootstrap_servers = %config.bootstrap_servers,
            group_id = %config.group_id,
            "Created Kafka consumer"
        );

        Ok(Self {
            consumer: Arc::new(consumer),
            topics,
            handlers: Arc::new(RwLock::new(Vec::new())),
            connected,
            started: Mutex::new(false),
        })
    }
}

#[async_trait]
impl MessageConsumer for KafkaConsumer {
    async fn subscribe(&self, handler: Box<dyn MessageHandler>) -> Result<()> {
        let mut handlers = self.handlers.write().await;
        handlers.push(handler);
        Ok(())
    }

    async fn start_consuming(&self) -> Result<()> {
        {
            let mut started = self.started.lock().await;
            if *started {
                return Ok(());
            }
            *started = true;
        }

        let topic_refs: Vec<&str> = self.topics.iter().map(|s| s.as_str()).collect();
        self.consumer
            .subscribe(&topic_refs)
            .map_err(|e| BusError::Subscribe(format!("Failed to subscribe to topics: {}", e)))?;

        info!(topics = ?self.topics, "Subscribed to Kafka topics");

        let consumer = self.consumer.clone();
        let handlers = self.handlers.clone();

        // Spawn consumer task
        tokio::spawn(async move {
            use futures::StreamExt;
            use rdkafka::message::Message as KafkaMessage;

            let mut stream = consumer.stream();

            while let Some(result) = stream.next().await {
                let message = match result {
                    Ok(message) => message,
                    Err(e) => {
                        error!(error = %e, "Kafka consumer error");
                        continue;
                    }
                };

                let delivery = Arc::new(Delivery {
                    topic: message.topic().to_string(),
                    partition: message.partition(),
                    offset: message.offset(),
                    payload: message.payload().map(<[u8]>::to_vec),
                });

                let disposition = {
                    let handlers_guard = handlers.read().await;
                    dispatch_to_handlers(&handlers_guard, &delivery).await
                };

                match disposition {
                    Disposition::Commit => {
                        if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                            error!(error = %e, "Failed to commit offset");
                        }
                    }
                    Disposition::Redeliver => {
                        debug!(
                            topic = %delivery.topic,
                            partition = delivery.partition,
                            offset = delivery.offset,
                            "Seeking back for redelivery"
                        );
                        if let Err(e) = consumer.seek(
                            &delivery.topic,
                            delivery.partition,
                            Offset::Offset(delivery.offset),
                            SEEK_TIMEOUT,
                        ) {
                            warn!(error = %e, "Failed to seek for redelivery");
                        }
                    }
                }
            }

            warn!("Kafka message stream ended");
        });

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
