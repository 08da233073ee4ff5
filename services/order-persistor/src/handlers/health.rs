use axum::{extract::State, http::StatusCode, Json};
use messaging::ConsumerState;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumer: Option<&'static str>,
}

/// Liveness of the API plus the ingestion loop's current state.
///
/// Once the loop has stopped the endpoint answers 503 so the instance drops
/// out of rotation while the server drains.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let consumer = state.consumer.as_ref().map(|c| c.state());

    let (code, status) = match consumer {
        Some(ConsumerState::Stopped) => (StatusCode::SERVICE_UNAVAILABLE, "stopping"),
        _ => (StatusCode::OK, "healthy"),
    };

    (
        code,
        Json(HealthResponse {
            status,
            service: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            consumer: consumer.map(|s| s.as_str()),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::config::KafkaConsumerConfig;
    use domain::MockOrderRepository;
    use messaging::OrdersConsumer;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_health_without_consumer() {
        let state = AppState::new(Arc::new(MockOrderRepository::new()));

        let (status, Json(response)) = health_check(State(state)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.status, "healthy");
        assert_eq!(response.service, "order-persistor");
        assert!(response.consumer.is_none());
    }

    #[tokio::test]
    async fn test_health_reports_stopped_consumer() {
        let repo = Arc::new(MockOrderRepository::new());
        let consumer = OrdersConsumer::new(
            KafkaConsumerConfig::default(),
            repo.clone(),
            CancellationToken::new(),
        )
        .unwrap();
        let consumer = Arc::new(consumer);
        let state = AppState::new(repo).with_consumer(consumer.clone());

        let (status, Json(response)) = health_check(State(state.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.consumer, Some("created"));

        consumer.stop();

        let (status, Json(response)) = health_check(State(state)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.status, "stopping");
        assert_eq!(response.consumer, Some("stopped"));
    }
}
