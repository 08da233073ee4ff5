use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{validate_non_zero, validate_numeric, Item, Payment};

/// Order aggregate root, exactly as it travels on the wire.
///
/// Header fields are flat, `delivery` and `payment` are nested objects and
/// `items` is an array. The identifier doubles as the primary key and the
/// cache key, so it is never rewritten after ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Order {
    #[serde(rename = "order_uid")]
    #[validate(length(min = 1, message = "order_uid is required"))]
    pub id: String,

    #[validate(length(min = 1, message = "track_number is required"))]
    pub track_number: String,

    #[validate(length(min = 1, message = "entry is required"))]
    pub entry: String,

    #[validate(nested)]
    pub delivery: Delivery,

    #[validate(nested)]
    pub payment: Option<Payment>,

    #[serde(default)]
    #[validate(nested)]
    pub items: Vec<Item>,

    #[validate(length(min = 1, message = "locale is required"))]
    pub locale: String,

    #[serde(rename = "internal_signature", default)]
    pub signature: String,

    #[validate(length(min = 1, message = "customer_id is required"))]
    pub customer_id: String,

    #[validate(length(min = 1, message = "delivery_service is required"))]
    pub delivery_service: String,

    #[serde(rename = "shardkey")]
    #[validate(length(min = 1, message = "shardkey is required"))]
    pub shard_key: String,

    #[validate(custom(function = "validate_non_zero", message = "sm_id is required"))]
    pub sm_id: i32,

    #[serde(rename = "date_created")]
    pub created_at: DateTime<Utc>,

    #[validate(custom(function = "validate_numeric", message = "oof_shard must be numeric"))]
    pub oof_shard: String,
}

/// Delivery details embedded in the order header; it has no identity of its own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct Delivery {
    #[validate(length(min = 1, message = "delivery name is required"))]
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    pub email: String,
}

impl Order {
    /// Parse a broker payload into an order. Structural validation is a
    /// separate step, see [`Validate::validate`].
    pub fn from_json(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Items compared as a multiset, ignoring the order they were stored in.
    pub fn same_items(&self, other: &Order) -> bool {
        if self.items.len() != other.items.len() {
            return false;
        }
        let mut remaining: Vec<&Item> = other.items.iter().collect();
        for item in &self.items {
            match remaining.iter().position(|candidate| *candidate == item) {
                Some(idx) => {
                    remaining.swap_remove(idx);
                }
                None => return false,
            }
        }
        true
    }
}
