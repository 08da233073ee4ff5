use domain::Order;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum PublisherError {
    #[error("Failed to create Kafka producer: {0}")]
    ProducerCreation(String),

    #[error("Failed to serialize order: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to publish order: {0}")]
    PublishFailed(String),
}

/// Kafka publisher writing JSON-encoded orders keyed by order id
pub struct OrderPublisher {
    producer: FutureProducer,
    topic: String,
}

impl OrderPublisher {
    /// Create a new OrderPublisher
    ///
    /// # Arguments
    /// * `brokers` - Comma-separated list of Kafka brokers (e.g., "localhost:9092")
    /// * `topic` - The topic to publish orders to
    ///
    /// # Example
    /// ```no_run
    /// use messaging::OrderPublisher;
    ///
    /// let publisher = OrderPublisher::new("localhost:9092", "orders".to_string())
    ///     .expect("Failed to create publisher");
    /// ```
    pub fn new(brokers: &str, topic: String) -> Result<Self, PublisherError> {
        debug!("Creating Kafka producer for brokers: {}", brokers);

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", "all") // Wait for all replicas to acknowledge
            .set("retries", "3")
            .create()
            .map_err(|e| PublisherError::ProducerCreation(e.to_string()))?;

        Ok(Self { producer, topic })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish one order; the partition key is the order id so every
    /// message for the same order lands on the same partition.
    pub async fn publish(&self, order: &Order) -> Result<(i32, i64), PublisherError> {
        let payload = order.to_json()?;

        let record = FutureRecord::to(&self.topic)
            .key(order.id.as_bytes())
            .payload(&payload);

        match self
            .producer
            .send(record, Timeout::After(Duration::from_secs(5)))
            .await
        {
            Ok((partition, offset)) => {
                debug!(
                    "Order {} published to topic '{}', partition {}, offset {}",
                    order.id, self.topic, partition, offset
                );
                Ok((partition, offset))
            }
            Err((err, _)) => {
                warn!("Failed to publish order {}: {}", order.id, err);
                Err(PublisherError::PublishFailed(err.to_string()))
            }
        }
    }
}
