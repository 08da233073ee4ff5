pub mod client;
pub mod consumer;
pub mod producer;

pub use client::{BrokerClient, BrokerError, BrokerMessage, KafkaClient};
pub use consumer::{ConsumerError, ConsumerState, MalformedMessage, OrdersConsumer};
pub use producer::{OrderPublisher, PublisherError};
