use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use domain::Order;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, error};

use crate::state::AppState;

/// JSON error envelope returned by every failing endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<HashMap<String, String>>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fields: None,
        }
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Get a single order by ID
pub async fn get_order_handler(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    debug!("Fetching order: {}", order_id);

    match state.orders.get_by_id(&order_id).await {
        Ok(order) => Ok(Json(order)),
        Err(e) if e.is_not_found() => {
            debug!("Order not found: {}", order_id);
            Err((
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new("order with that id was not found")),
            ))
        }
        Err(e) => {
            error!(order_id = %order_id, error = %e, "Retrieving order from repository");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Internal server error")),
            ))
        }
    }
}
