use common::config::{KafkaConsumerConfig, StoreRejectionPolicy};
use common::metrics::{self, MessageOutcome};
use domain::{Order, OrderRepository, RepositoryError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use validator::Validate;

use crate::client::{BrokerClient, BrokerError, BrokerMessage, KafkaClient};

/// Why a message can never be persisted. Such messages are committed and skipped.
#[derive(Debug, Error)]
pub enum MalformedMessage {
    #[error("message has no payload")]
    EmptyPayload,

    #[error("bad JSON order: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("order failed validation: {0}")]
    Invalid(#[source] validator::ValidationErrors),

    #[error("store rejected order: {0}")]
    Rejected(#[source] RepositoryError),
}

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("Failed to create Kafka consumer: {0}")]
    ClientCreation(#[source] BrokerError),

    #[error("could not subscribe to topic {topic}: {source}")]
    Subscribe {
        topic: String,
        #[source]
        source: BrokerError,
    },

    #[error("could not commit message: {0}")]
    Commit(#[source] BrokerError),

    #[error("message was malformed: {0}")]
    MalformedMessage(#[from] MalformedMessage),

    #[error("failed creating new order: {0}")]
    Persistence(#[source] RepositoryError),

    #[error("processing timed out after {0:?}")]
    ProcessTimeout(Duration),

    #[error("consumer was cancelled")]
    Cancelled,
}

impl ConsumerError {
    /// Permanently bad input: commit and move on.
    pub fn is_malformed(&self) -> bool {
        matches!(self, ConsumerError::MalformedMessage(_))
    }

    /// Failures that may go away on a later run: do not commit.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConsumerError::Persistence(_) | ConsumerError::ProcessTimeout(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ConsumerError::Cancelled)
    }

    fn outcome(&self) -> MessageOutcome {
        match self {
            ConsumerError::MalformedMessage(_) => MessageOutcome::Malformed,
            ConsumerError::Cancelled => MessageOutcome::Cancelled,
            ConsumerError::ProcessTimeout(_) => MessageOutcome::Timeout,
            _ => MessageOutcome::Transient,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Created,
    Subscribed,
    Polling,
    Committing,
    BackingOff,
    Stopped,
}

impl ConsumerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsumerState::Created => "created",
            ConsumerState::Subscribed => "subscribed",
            ConsumerState::Polling => "polling",
            ConsumerState::Committing => "committing",
            ConsumerState::BackingOff => "backing_off",
            ConsumerState::Stopped => "stopped",
        }
    }
}

/// Reads orders from the broker and persists them through a repository,
/// committing offsets only once a message is stored or known to be bad.
///
/// Messages are handled strictly one at a time, so a commit implies every
/// earlier message on the partition is either persisted or permanently
/// skipped. A transient failure stops the loop without committing; the next
/// run re-reads the same message.
pub struct OrdersConsumer {
    client: Arc<dyn BrokerClient>,
    config: KafkaConsumerConfig,
    repository: Arc<dyn OrderRepository>,
    shutdown: CancellationToken,
    close_once: Once,
    running: AtomicBool,
    state: Mutex<ConsumerState>,
}

impl OrdersConsumer {
    /// Create a consumer backed by Kafka. Nothing is subscribed until [`Self::run`].
    pub fn new(
        config: KafkaConsumerConfig,
        repository: Arc<dyn OrderRepository>,
        shutdown: CancellationToken,
    ) -> Result<Self, ConsumerError> {
        let client = KafkaClient::new(&config).map_err(ConsumerError::ClientCreation)?;
        Ok(Self::with_client(Arc::new(client), config, repository, shutdown))
    }

    pub fn with_client(
        client: Arc<dyn BrokerClient>,
        config: KafkaConsumerConfig,
        repository: Arc<dyn OrderRepository>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            client,
            config,
            repository,
            shutdown,
            close_once: Once::new(),
            running: AtomicBool::new(false),
            state: Mutex::new(ConsumerState::Created),
        }
    }

    pub fn state(&self) -> ConsumerState {
        *self.state.lock()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Subscribe and process messages until cancelled or a non-skippable
    /// failure occurs. The broker client is closed on every exit path.
    pub async fn run(&self) -> Result<(), ConsumerError> {
        info!(
            topic = %self.config.topic,
            group_id = %self.config.group_id,
            servers = %self.config.servers,
            "Starting orders consumer"
        );

        self.running.store(true, Ordering::SeqCst);
        let result = match self.consume().await {
            Err(e) if !e.is_cancelled() && self.shutdown.is_cancelled() => {
                debug!(error = %e, "Consumer error after cancellation");
                Err(ConsumerError::Cancelled)
            }
            result => result,
        };

        self.close();
        self.running.store(false, Ordering::SeqCst);
        self.set_state(ConsumerState::Stopped);

        match &result {
            Err(ConsumerError::Cancelled) => info!("Orders consumer cancelled"),
            Err(e) => error!(error = %e, "Orders consumer stopped"),
            Ok(()) => info!("Orders consumer stopped"),
        }

        result
    }

    /// Cancel the shared token and release the broker client.
    ///
    /// While [`Self::run`] is in progress the client is released by the loop
    /// itself once it observes the cancellation.
    pub fn stop(&self) {
        info!("Stopping orders consumer");
        self.shutdown.cancel();
        if !self.running.load(Ordering::SeqCst) {
            self.close();
            self.set_state(ConsumerState::Stopped);
        }
    }

    async fn consume(&self) -> Result<(), ConsumerError> {
        if self.shutdown.is_cancelled() {
            return Err(ConsumerError::Cancelled);
        }

        self.client
            .subscribe(&self.config.topic)
            .map_err(|source| ConsumerError::Subscribe {
                topic: self.config.topic.clone(),
                source,
            })?;
        self.set_state(ConsumerState::Subscribed);
        info!("Subscribed successfully");

        loop {
            if self.shutdown.is_cancelled() {
                return Err(ConsumerError::Cancelled);
            }

            self.set_state(ConsumerState::Polling);

            let read = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Err(ConsumerError::Cancelled),
                read = self.client.read_message(self.config.read_timeout()) => read,
            };

            let message = match read {
                Ok(message) => message,
                Err(BrokerError::Timeout) => continue,
                Err(e) => {
                    error!(
                        error = %e,
                        backoff_ms = self.config.read_failure_backoff_ms,
                        "Error reading messages from Kafka, retrying after backoff"
                    );
                    self.set_state(ConsumerState::BackingOff);

                    tokio::select! {
                        biased;
                        _ = self.shutdown.cancelled() => return Err(ConsumerError::Cancelled),
                        _ = tokio::time::sleep(self.config.read_failure_backoff()) => continue,
                    }
                }
            };

            debug!(
                partition = message.partition,
                offset = message.offset,
                "Consumed order message"
            );

            let start = Instant::now();
            let processed = self.process(&message).await;
            let elapsed = start.elapsed().as_secs_f64();

            match processed {
                Ok(()) => metrics::record_message(MessageOutcome::Persisted, elapsed),
                Err(e) if e.is_malformed() => {
                    metrics::record_message(MessageOutcome::Malformed, elapsed);
                    warn!(
                        partition = message.partition,
                        offset = message.offset,
                        "Skipping malformed order message"
                    );
                }
                Err(e) => {
                    metrics::record_message(e.outcome(), elapsed);
                    if !e.is_cancelled() {
                        error!(
                            error = %e,
                            partition = message.partition,
                            offset = message.offset,
                            "Failure processing order from Kafka"
                        );
                    }
                    return Err(e);
                }
            }

            self.set_state(ConsumerState::Committing);
            self.client.commit().await.map_err(ConsumerError::Commit)?;
            metrics::record_commit();
        }
    }

    async fn process(&self, message: &BrokerMessage) -> Result<(), ConsumerError> {
        let Some(payload) = message.payload.as_deref() else {
            error!(
                partition = message.partition,
                offset = message.offset,
                "Order message has no payload"
            );
            return Err(MalformedMessage::EmptyPayload.into());
        };

        let limit = self.config.process_timeout();
        match tokio::time::timeout(limit, self.handle_message(payload, &self.shutdown)).await {
            Ok(result) => result.map(|_| ()),
            Err(_) if self.shutdown.is_cancelled() => Err(ConsumerError::Cancelled),
            Err(_) => Err(ConsumerError::ProcessTimeout(limit)),
        }
    }

    /// Decode, validate and persist one JSON-encoded order.
    ///
    /// Cancellation of `cancel` takes precedence over any other outcome.
    pub async fn handle_message(
        &self,
        body: &[u8],
        cancel: &CancellationToken,
    ) -> Result<Order, ConsumerError> {
        let order = match Order::from_json(body) {
            Ok(order) => order,
            Err(_) if cancel.is_cancelled() => return Err(ConsumerError::Cancelled),
            Err(e) => {
                error!(
                    error = %e,
                    message = %String::from_utf8_lossy(body),
                    "Bad JSON order from Kafka"
                );
                return Err(MalformedMessage::Decode(e).into());
            }
        };

        if let Err(e) = order.validate() {
            if cancel.is_cancelled() {
                return Err(ConsumerError::Cancelled);
            }
            error!(
                error = %e,
                message = %String::from_utf8_lossy(body),
                "Consumed malformed order from Kafka"
            );
            return Err(MalformedMessage::Invalid(e).into());
        }

        let created = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ConsumerError::Cancelled),
            created = self.repository.create(&order) => created,
        };

        match created {
            Ok(stored) => {
                debug!(order_id = %stored.id, "Order persisted from Kafka");
                Ok(stored)
            }
            Err(_) if cancel.is_cancelled() => Err(ConsumerError::Cancelled),
            Err(e) if e.is_internal() => Err(ConsumerError::Persistence(e)),
            Err(e) => {
                error!(
                    error = %e,
                    order_id = %order.id,
                    message = %String::from_utf8_lossy(body),
                    "Failed creating new order"
                );
                match self.config.store_rejection_policy {
                    StoreRejectionPolicy::Skip => Err(MalformedMessage::Rejected(e).into()),
                    StoreRejectionPolicy::Halt => Err(ConsumerError::Persistence(e)),
                }
            }
        }
    }

    fn close(&self) {
        self.close_once.call_once(|| {
            self.client.close();
            debug!("Broker client released");
        });
    }

    fn set_state(&self, state: ConsumerState) {
        *self.state.lock() = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockBrokerClient;
    use async_trait::async_trait;
    use domain::testing::sample_order;
    use domain::MockOrderRepository;
    use mockall::Sequence;
    use rdkafka::error::{KafkaError, RDKafkaErrorCode};

    fn config() -> KafkaConsumerConfig {
        KafkaConsumerConfig {
            topic: "orders".to_string(),
            read_timeout_ms: 100,
            process_timeout_ms: 1_000,
            read_failure_backoff_ms: 5_000,
            ..KafkaConsumerConfig::default()
        }
    }

    fn consumer(
        client: MockBrokerClient,
        repository: impl OrderRepository + 'static,
        config: KafkaConsumerConfig,
    ) -> OrdersConsumer {
        OrdersConsumer::with_client(
            Arc::new(client),
            config,
            Arc::new(repository),
            CancellationToken::new(),
        )
    }

    fn valid_body(id: &str) -> Vec<u8> {
        sample_order(id).to_json().unwrap()
    }

    fn message(offset: i64, payload: Vec<u8>) -> BrokerMessage {
        BrokerMessage::new("orders", 0, offset, payload)
    }

    #[tokio::test]
    async fn test_bad_json_is_malformed_without_create() {
        let mut repo = MockOrderRepository::new();
        repo.expect_create().never();

        let consumer = consumer(MockBrokerClient::new(), repo, config());
        let result = consumer
            .handle_message(b"{not json", &CancellationToken::new())
            .await;

        assert!(matches!(
            result,
            Err(ConsumerError::MalformedMessage(MalformedMessage::Decode(_)))
        ));
    }

    #[tokio::test]
    async fn test_invalid_order_is_malformed_without_create() {
        let mut repo = MockOrderRepository::new();
        repo.expect_create().never();

        let mut order = sample_order("order-0001");
        order.oof_shard = "shard".to_string();
        let body = order.to_json().unwrap();

        let consumer = consumer(MockBrokerClient::new(), repo, config());
        let result = consumer.handle_message(&body, &CancellationToken::new()).await;

        assert!(matches!(
            result,
            Err(ConsumerError::MalformedMessage(MalformedMessage::Invalid(_)))
        ));
    }

    #[tokio::test]
    async fn test_internal_failure_is_transient() {
        let mut repo = MockOrderRepository::new();
        repo.expect_create()
            .times(1)
            .returning(|_| Err(RepositoryError::InternalFailure("connection refused".into())));

        let consumer = consumer(MockBrokerClient::new(), repo, config());
        let err = consumer
            .handle_message(&valid_body("order-0001"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert!(!err.is_malformed());
    }

    #[tokio::test]
    async fn test_store_rejection_follows_policy() {
        let rejecting = || {
            let mut repo = MockOrderRepository::new();
            repo.expect_create()
                .times(1)
                .returning(|order| Err(RepositoryError::AlreadyExists(order.id.clone())));
            repo
        };

        let skip = consumer(MockBrokerClient::new(), rejecting(), config());
        let err = skip
            .handle_message(&valid_body("order-0001"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConsumerError::MalformedMessage(MalformedMessage::Rejected(RepositoryError::AlreadyExists(_)))
        ));

        let halt_config = KafkaConsumerConfig {
            store_rejection_policy: StoreRejectionPolicy::Halt,
            ..config()
        };
        let halt = consumer(MockBrokerClient::new(), rejecting(), halt_config);
        let err = halt
            .handle_message(&valid_body("order-0001"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_successful_create_returns_stored_order() {
        let mut repo = MockOrderRepository::new();
        repo.expect_create()
            .times(1)
            .returning(|order| Ok(order.clone()));

        let consumer = consumer(MockBrokerClient::new(), repo, config());
        let stored = consumer
            .handle_message(&valid_body("order-0001"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stored.id, "order-0001");
        assert_eq!(stored.items.len(), 2);
    }

    /// Cancels the token as soon as the store is called, then never returns.
    struct CancellingRepository {
        token: CancellationToken,
    }

    #[async_trait]
    impl OrderRepository for CancellingRepository {
        async fn create(&self, _order: &Order) -> Result<Order, RepositoryError> {
            self.token.cancel();
            std::future::pending().await
        }

        async fn get_by_id(&self, id: &str) -> Result<Order, RepositoryError> {
            Err(RepositoryError::NotFound(id.to_string()))
        }

        async fn list_recent(&self, _limit: usize) -> Result<Vec<Order>, RepositoryError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_cancel_during_create_returns_cancelled() {
        let token = CancellationToken::new();
        let consumer = OrdersConsumer::with_client(
            Arc::new(MockBrokerClient::new()),
            config(),
            Arc::new(CancellingRepository {
                token: token.clone(),
            }),
            token.clone(),
        );

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            consumer.handle_message(&valid_body("order-0001"), &token),
        )
        .await
        .expect("handle_message should return promptly");

        let err = result.unwrap_err();
        assert!(err.is_cancelled());
        assert!(!err.is_malformed());
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_malformed_message_is_committed_and_skipped() {
        let token = CancellationToken::new();
        let mut seq = Sequence::new();
        let mut client = MockBrokerClient::new();

        client.expect_subscribe().times(1).returning(|_| Ok(()));
        client
            .expect_read_message()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(message(0, b"{\"track_number\": \"T1\"}".to_vec())));
        client
            .expect_commit()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        let stop = token.clone();
        client
            .expect_read_message()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| {
                stop.cancel();
                Err(BrokerError::Timeout)
            });
        client.expect_close().times(1).return_const(());

        let mut repo = MockOrderRepository::new();
        repo.expect_create().never();

        let consumer =
            OrdersConsumer::with_client(Arc::new(client), config(), Arc::new(repo), token);
        let result = consumer.run().await;

        assert!(matches!(result, Err(ConsumerError::Cancelled)));
        assert_eq!(consumer.state(), ConsumerState::Stopped);
    }

    #[tokio::test]
    async fn test_tombstone_is_committed_and_skipped() {
        let token = CancellationToken::new();
        let mut seq = Sequence::new();
        let mut client = MockBrokerClient::new();

        client.expect_subscribe().returning(|_| Ok(()));
        client
            .expect_read_message()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(BrokerMessage {
                    payload: None,
                    ..message(7, Vec::new())
                })
            });
        client
            .expect_commit()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        let stop = token.clone();
        client
            .expect_read_message()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| {
                stop.cancel();
                Err(BrokerError::Timeout)
            });
        client.expect_close().times(1).return_const(());

        let consumer = OrdersConsumer::with_client(
            Arc::new(client),
            config(),
            Arc::new(MockOrderRepository::new()),
            token,
        );

        assert!(consumer.run().await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_transient_failure_halts_without_commit() {
        let mut client = MockBrokerClient::new();
        client.expect_subscribe().times(1).returning(|_| Ok(()));
        client
            .expect_read_message()
            .times(1)
            .returning(|_| Ok(message(3, valid_body("order-0001"))));
        client.expect_commit().never();
        client.expect_close().times(1).return_const(());

        let mut repo = MockOrderRepository::new();
        repo.expect_create()
            .times(1)
            .returning(|_| Err(RepositoryError::InternalFailure("deadlock detected".into())));

        let consumer = consumer(client, repo, config());
        let result = consumer.run().await;

        assert!(matches!(result, Err(ConsumerError::Persistence(_))));
        assert_eq!(consumer.state(), ConsumerState::Stopped);
    }

    #[tokio::test]
    async fn test_subscribe_failure_is_returned() {
        let mut client = MockBrokerClient::new();
        client
            .expect_subscribe()
            .times(1)
            .returning(|_| Err(BrokerError::Closed));
        client.expect_read_message().never();
        client.expect_close().times(1).return_const(());

        let consumer = consumer(client, MockOrderRepository::new(), config());
        let result = consumer.run().await;

        assert!(matches!(result, Err(ConsumerError::Subscribe { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_error_backs_off_then_retries() {
        let token = CancellationToken::new();
        let mut seq = Sequence::new();
        let mut client = MockBrokerClient::new();

        client.expect_subscribe().returning(|_| Ok(()));
        client
            .expect_read_message()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Err(BrokerError::Kafka(KafkaError::MessageConsumption(
                    RDKafkaErrorCode::AllBrokersDown,
                )))
            });
        client
            .expect_read_message()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(message(0, valid_body("order-0001"))));
        client
            .expect_commit()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        let stop = token.clone();
        client
            .expect_read_message()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| {
                stop.cancel();
                Err(BrokerError::Timeout)
            });
        client.expect_close().times(1).return_const(());

        let mut repo = MockOrderRepository::new();
        repo.expect_create()
            .times(1)
            .returning(|order| Ok(order.clone()));

        let consumer =
            OrdersConsumer::with_client(Arc::new(client), config(), Arc::new(repo), token);
        let started = tokio::time::Instant::now();
        let result = consumer.run().await;

        assert!(result.unwrap_err().is_cancelled());
        assert!(started.elapsed() >= Duration::from_millis(5_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_backoff() {
        let token = CancellationToken::new();
        let mut client = MockBrokerClient::new();

        client.expect_subscribe().returning(|_| Ok(()));
        client
            .expect_read_message()
            .times(1)
            .returning(|_| Err(BrokerError::Worker("poll thread panicked".into())));
        client.expect_close().times(1).return_const(());

        let consumer = Arc::new(OrdersConsumer::with_client(
            Arc::new(client),
            KafkaConsumerConfig {
                read_failure_backoff_ms: 3_600_000,
                ..config()
            },
            Arc::new(MockOrderRepository::new()),
            token.clone(),
        ));

        let running = tokio::spawn({
            let consumer = consumer.clone();
            async move { consumer.run().await }
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(consumer.state(), ConsumerState::BackingOff);

        token.cancel();
        let result = running.await.unwrap();

        assert!(result.unwrap_err().is_cancelled());
    }

    struct SlowRepository;

    #[async_trait]
    impl OrderRepository for SlowRepository {
        async fn create(&self, order: &Order) -> Result<Order, RepositoryError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(order.clone())
        }

        async fn get_by_id(&self, id: &str) -> Result<Order, RepositoryError> {
            Err(RepositoryError::NotFound(id.to_string()))
        }

        async fn list_recent(&self, _limit: usize) -> Result<Vec<Order>, RepositoryError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_timeout_halts_without_commit() {
        let mut client = MockBrokerClient::new();
        client.expect_subscribe().returning(|_| Ok(()));
        client
            .expect_read_message()
            .times(1)
            .returning(|_| Ok(message(0, valid_body("order-0001"))));
        client.expect_commit().never();
        client.expect_close().times(1).return_const(());

        let consumer = consumer(client, SlowRepository, config());
        let result = consumer.run().await;

        assert!(matches!(result, Err(ConsumerError::ProcessTimeout(_))));
    }

    #[tokio::test]
    async fn test_stop_closes_client_once() {
        let mut client = MockBrokerClient::new();
        client.expect_subscribe().never();
        client.expect_read_message().never();
        client.expect_close().times(1).return_const(());

        let consumer = consumer(client, MockOrderRepository::new(), config());

        consumer.stop();
        consumer.stop();
        let result = consumer.run().await;

        assert!(result.unwrap_err().is_cancelled());
        assert!(consumer.shutdown_token().is_cancelled());
        assert_eq!(consumer.state().as_str(), "stopped");
    }

    #[tokio::test]
    async fn test_bad_json_after_cancel_is_not_skipped() {
        let mut repo = MockOrderRepository::new();
        repo.expect_create().never();

        let token = CancellationToken::new();
        token.cancel();

        let consumer = consumer(MockBrokerClient::new(), repo, config());
        let result = consumer.handle_message(b"{not json", &token).await;

        assert!(matches!(result, Err(ConsumerError::Cancelled)));
    }

    #[tokio::test]
    async fn test_subscribe_error_after_cancel_is_cancelled() {
        let token = CancellationToken::new();
        let mut client = MockBrokerClient::new();

        let stop = token.clone();
        client.expect_subscribe().times(1).returning(move |_| {
            stop.cancel();
            Err(BrokerError::Closed)
        });
        client.expect_read_message().never();
        client.expect_close().times(1).return_const(());

        let consumer = OrdersConsumer::with_client(
            Arc::new(client),
            config(),
            Arc::new(MockOrderRepository::new()),
            token,
        );

        assert!(matches!(consumer.run().await, Err(ConsumerError::Cancelled)));
    }

    #[tokio::test]
    async fn test_commit_error_after_cancel_is_cancelled() {
        let token = CancellationToken::new();
        let mut client = MockBrokerClient::new();

        client.expect_subscribe().returning(|_| Ok(()));
        client
            .expect_read_message()
            .times(1)
            .returning(|_| Ok(message(0, valid_body("order-0001"))));
        let stop = token.clone();
        client.expect_commit().times(1).returning(move || {
            stop.cancel();
            Err(BrokerError::Closed)
        });
        client.expect_close().times(1).return_const(());

        let mut repo = MockOrderRepository::new();
        repo.expect_create()
            .times(1)
            .returning(|order| Ok(order.clone()));

        let consumer =
            OrdersConsumer::with_client(Arc::new(client), config(), Arc::new(repo), token);

        assert!(matches!(consumer.run().await, Err(ConsumerError::Cancelled)));
    }

    /// Broker whose reads never complete.
    #[derive(Default)]
    struct StalledBroker {
        closes: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl BrokerClient for StalledBroker {
        fn subscribe(&self, _topic: &str) -> Result<(), BrokerError> {
            Ok(())
        }

        async fn read_message(&self, _timeout: Duration) -> Result<BrokerMessage, BrokerError> {
            std::future::pending().await
        }

        async fn commit(&self) -> Result<(), BrokerError> {
            Ok(())
        }

        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn wait_for_state(consumer: &OrdersConsumer, state: ConsumerState) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while consumer.state() != state {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("consumer never reached expected state");
    }

    #[tokio::test]
    async fn test_cancel_unblocks_pending_read() {
        let token = CancellationToken::new();
        let broker = Arc::new(StalledBroker::default());
        let consumer = Arc::new(OrdersConsumer::with_client(
            broker.clone(),
            config(),
            Arc::new(MockOrderRepository::new()),
            token.clone(),
        ));

        let running = tokio::spawn({
            let consumer = consumer.clone();
            async move { consumer.run().await }
        });
        wait_for_state(&consumer, ConsumerState::Polling).await;

        tokio::spawn(async move { token.cancel() });

        let result = tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .expect("run should return promptly after cancellation")
            .unwrap();

        assert!(matches!(result, Err(ConsumerError::Cancelled)));
        assert_eq!(broker.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_while_running_leaves_close_to_loop() {
        let broker = Arc::new(StalledBroker::default());
        let consumer = Arc::new(OrdersConsumer::with_client(
            broker.clone(),
            config(),
            Arc::new(MockOrderRepository::new()),
            CancellationToken::new(),
        ));

        let running = tokio::spawn({
            let consumer = consumer.clone();
            async move { consumer.run().await }
        });
        wait_for_state(&consumer, ConsumerState::Polling).await;

        consumer.stop();
        consumer.stop();

        let result = tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .expect("run should return promptly after stop")
            .unwrap();

        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(broker.closes.load(Ordering::SeqCst), 1);
        assert_eq!(consumer.state(), ConsumerState::Stopped);
    }
}
