use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::validate_non_negative;

/// A line of an order. Prices are exact decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Item {
    pub chrt_id: i32,
    pub track_number: String,

    #[validate(custom(function = "validate_non_negative", message = "price must not be negative"))]
    pub price: Decimal,

    pub rid: String,

    pub name: String,

    #[validate(custom(function = "validate_non_negative", message = "sale must not be negative"))]
    pub sale: Decimal,

    pub size: String,

    #[validate(custom(function = "validate_non_negative", message = "total_price must not be negative"))]
    pub total_price: Decimal,

    pub nm_id: i32,
    pub brand: String,
    pub status: i32,
}
