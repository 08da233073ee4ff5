use domain::OrderRepository;
use messaging::OrdersConsumer;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<dyn OrderRepository>,
    /// Ingestion loop whose progress is reported by `/health`.
    pub consumer: Option<Arc<OrdersConsumer>>,
}

impl AppState {
    pub fn new(orders: Arc<dyn OrderRepository>) -> Self {
        Self {
            orders,
            consumer: None,
        }
    }

    pub fn with_consumer(mut self, consumer: Arc<OrdersConsumer>) -> Self {
        self.consumer = Some(consumer);
        self
    }
}
