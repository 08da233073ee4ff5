pub mod item;
pub mod order;
pub mod payment;

pub use item::Item;
pub use order::{Delivery, Order};
pub use payment::Payment;

use rust_decimal::Decimal;
use validator::ValidationError;

/// Rejects strings that are empty or contain anything but ASCII digits.
pub(crate) fn validate_numeric(value: &str) -> Result<(), ValidationError> {
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::new("numeric"))
    }
}

pub(crate) fn validate_non_zero(value: i32) -> Result<(), ValidationError> {
    if value == 0 {
        return Err(ValidationError::new("required"));
    }
    Ok(())
}

pub(crate) fn validate_non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::new("non_negative"));
    }
    Ok(())
}
