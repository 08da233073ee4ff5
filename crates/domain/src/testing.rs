//! Fixtures shared by tests across the workspace.

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;

use crate::{Delivery, Item, Order, Payment};

/// A valid order with two items and a payment whose amount is the items'
/// total plus delivery cost.
pub fn sample_order(id: &str) -> Order {
    let items = vec![
        Item {
            chrt_id: 1001,
            track_number: "ITM-TRK-1".to_string(),
            price: Decimal::new(19999, 2),
            rid: format!("{}-rid-1", id),
            name: "Comfort Sneakers".to_string(),
            sale: Decimal::ZERO,
            size: "42".to_string(),
            total_price: Decimal::new(19999, 2),
            nm_id: 5001,
            brand: "SneakerCo".to_string(),
            status: 1,
        },
        Item {
            chrt_id: 1002,
            track_number: "ITM-TRK-2".to_string(),
            price: Decimal::new(4950, 2),
            rid: format!("{}-rid-2", id),
            name: "Everyday Socks (3-pack)".to_string(),
            sale: Decimal::ZERO,
            size: "L".to_string(),
            total_price: Decimal::new(4950, 2),
            nm_id: 5002,
            brand: "SockMakers".to_string(),
            status: 1,
        },
    ];

    let delivery_cost = Decimal::new(999, 2);
    let items_total: Decimal = items.iter().map(|i| i.total_price).sum();

    Order {
        id: id.to_string(),
        track_number: "TRK123456789".to_string(),
        entry: "ENTRY-ABC-1".to_string(),
        delivery: Delivery {
            name: "Jane Doe".to_string(),
            phone: "+358401234567".to_string(),
            zip: "00100".to_string(),
            city: "Helsinki".to_string(),
            address: "Testintie 1 A 2".to_string(),
            region: "Uusimaa".to_string(),
            email: "jane.doe@example.com".to_string(),
        },
        payment: Some(Payment {
            transaction: format!("txn-{}", id),
            request_id: "req-2025-08-09-01".to_string(),
            currency: "EUR".to_string(),
            provider: "stripe".to_string(),
            amount: items_total + delivery_cost,
            payment_dt: 1_754_726_400,
            bank: "Test Bank Oy".to_string(),
            delivery_cost,
            goods_total: 249,
            custom_fee: Decimal::ZERO,
        }),
        items,
        locale: "en-US".to_string(),
        signature: "sig-example-base64==".to_string(),
        customer_id: "cust-007".to_string(),
        delivery_service: "DHL".to_string(),
        shard_key: "shard-1".to_string(),
        sm_id: 42,
        created_at: Utc.with_ymd_and_hms(2021, 11, 14, 8, 27, 53).unwrap(),
        oof_shard: "1".to_string(),
    }
}
