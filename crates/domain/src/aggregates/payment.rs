use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::validate_non_negative;

/// Payment owned by an order.
///
/// `goods_total` is kept in integer minor units; every other monetary field
/// is an arbitrary-precision decimal so sums never drift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Payment {
    #[validate(length(min = 1, message = "transaction is required"))]
    pub transaction: String,

    #[serde(default)]
    pub request_id: String,

    #[validate(length(min = 1, message = "currency is required"))]
    pub currency: String,

    #[validate(length(min = 1, message = "provider is required"))]
    pub provider: String,

    #[validate(custom(function = "validate_non_negative", message = "amount must not be negative"))]
    pub amount: Decimal,

    /// Unix timestamp, seconds.
    #[validate(range(min = 1, message = "payment_dt is required"))]
    pub payment_dt: i64,

    #[validate(length(min = 1, message = "bank is required"))]
    pub bank: String,

    #[validate(custom(function = "validate_non_negative", message = "delivery_cost must not be negative"))]
    pub delivery_cost: Decimal,

    #[validate(range(min = 0, message = "goods_total must not be negative"))]
    pub goods_total: i32,

    #[validate(custom(function = "validate_non_negative", message = "custom_fee must not be negative"))]
    pub custom_fee: Decimal,
}
