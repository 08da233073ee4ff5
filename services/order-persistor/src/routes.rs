use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use common::metrics;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Prometheus metrics endpoint handler
async fn metrics_handler() -> impl IntoResponse {
    match metrics::gather_metrics() {
        Ok(metrics) => (StatusCode::OK, metrics),
        Err(e) => {
            tracing::error!("Failed to gather metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, String::from("Failed to gather metrics"))
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(metrics_handler))

        // Order queries
        .route("/order/:id", get(handlers::get_order::get_order_handler))

        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use domain::testing::sample_order;
    use domain::{MockOrderRepository, RepositoryError};
    use mockall::predicate::eq;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn router(mock: MockOrderRepository) -> Router {
        create_router(AppState::new(Arc::new(mock)))
    }

    async fn fetch(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_get_order_ok() {
        let mut mock = MockOrderRepository::new();
        mock.expect_get_by_id()
            .with(eq("order-0001"))
            .times(1)
            .returning(|id| Ok(sample_order(id)));

        let (status, body) = fetch(router(mock), "/order/order-0001").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["order_uid"], "order-0001");
        assert_eq!(body["items"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_get_order_not_found() {
        let mut mock = MockOrderRepository::new();
        mock.expect_get_by_id()
            .returning(|id| Err(RepositoryError::NotFound(id.to_string())));

        let (status, body) = fetch(router(mock), "/order/missing").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            body,
            serde_json::json!({ "message": "order with that id was not found" })
        );
    }

    #[tokio::test]
    async fn test_get_order_internal_error() {
        let mut mock = MockOrderRepository::new();
        mock.expect_get_by_id()
            .returning(|_| Err(RepositoryError::InternalFailure("pool timed out".into())));

        let (status, body) = fetch(router(mock), "/order/order-0001").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Internal server error");
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (status, body) = fetch(router(MockOrderRepository::new()), "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "order-persistor");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let response = router(MockOrderRepository::new())
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
