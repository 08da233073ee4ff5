use async_trait::async_trait;
use common::config::KafkaConsumerConfig;
use parking_lot::Mutex;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, CommitMode, Consumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum BrokerError {
    /// No message arrived within the read timeout. Not a failure.
    #[error("timed out waiting for a message")]
    Timeout,

    #[error("broker client is closed")]
    Closed,

    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),

    #[error("poll worker failed: {0}")]
    Worker(String),
}

/// A message as read from the broker, detached from the client's buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    /// `None` for tombstones.
    pub payload: Option<Vec<u8>>,
}

impl BrokerMessage {
    /// Convenience constructor for a keyless message.
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            key: None,
            payload: Some(payload),
        }
    }
}

/// The operations the ingestion consumer needs from a broker.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Subscribe to a topic under the client's consumer group
    fn subscribe(&self, topic: &str) -> Result<(), BrokerError>;

    /// Read one message, failing with [`BrokerError::Timeout`] if none arrives in time
    async fn read_message(&self, timeout: Duration) -> Result<BrokerMessage, BrokerError>;

    /// Commit the offsets of everything read so far
    async fn commit(&self) -> Result<(), BrokerError>;

    /// Release the connection. Safe to call more than once.
    fn close(&self);
}

/// Kafka implementation of [`BrokerClient`] with manual offset commits.
pub struct KafkaClient {
    consumer: Mutex<Option<Arc<BaseConsumer>>>,
}

impl KafkaClient {
    /// Create a new Kafka client; no connection is made until subscribe/poll
    pub fn new(config: &KafkaConsumerConfig) -> Result<Self, BrokerError> {
        info!(
            "Creating Kafka consumer with group_id: {}, servers: {}",
            config.group_id, config.servers
        );

        let consumer: BaseConsumer = ClientConfig::new()
            .set("group.id", &config.group_id)
            .set("bootstrap.servers", &config.servers)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "30000")
            .set("heartbeat.interval.ms", "10000")
            .create()?;

        Ok(Self {
            consumer: Mutex::new(Some(Arc::new(consumer))),
        })
    }

    fn handle(&self) -> Result<Arc<BaseConsumer>, BrokerError> {
        self.consumer.lock().clone().ok_or(BrokerError::Closed)
    }
}

#[async_trait]
impl BrokerClient for KafkaClient {
    fn subscribe(&self, topic: &str) -> Result<(), BrokerError> {
        self.handle()?.subscribe(&[topic])?;
        info!("Subscribed to topic: {}", topic);
        Ok(())
    }

    async fn read_message(&self, timeout: Duration) -> Result<BrokerMessage, BrokerError> {
        let consumer = self.handle()?;

        // rdkafka polls block the calling thread.
        tokio::task::spawn_blocking(move || match consumer.poll(timeout) {
            None => Err(BrokerError::Timeout),
            Some(Err(e)) => Err(BrokerError::Kafka(e)),
            Some(Ok(message)) => {
                debug!(
                    "Received message from topic: {}, partition: {}, offset: {}",
                    message.topic(),
                    message.partition(),
                    message.offset()
                );

                Ok(BrokerMessage {
                    topic: message.topic().to_string(),
                    partition: message.partition(),
                    offset: message.offset(),
                    key: message.key().map(<[u8]>::to_vec),
                    payload: message.payload().map(<[u8]>::to_vec),
                })
            }
        })
        .await
        .map_err(|e| BrokerError::Worker(e.to_string()))?
    }

    async fn commit(&self) -> Result<(), BrokerError> {
        let consumer = self.handle()?;

        tokio::task::spawn_blocking(move || consumer.commit_consumer_state(CommitMode::Sync))
            .await
            .map_err(|e| BrokerError::Worker(e.to_string()))??;

        Ok(())
    }

    fn close(&self) {
        if let Some(consumer) = self.consumer.lock().take() {
            consumer.unsubscribe();
            info!("Kafka consumer closed");
        }
    }
}
