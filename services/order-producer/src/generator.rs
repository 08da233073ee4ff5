use chrono::Utc;
use domain::{Delivery, Item, Order, Payment};
use rand::seq::SliceRandom;
use rand::Rng;
use rust_decimal::Decimal;
use uuid::Uuid;

const WORDS: &[&str] = &[
    "amber", "birch", "cobalt", "delta", "ember", "fjord", "granite", "harbor", "indigo",
    "juniper", "kestrel", "lumen", "meadow", "nimbus", "onyx", "prairie", "quartz", "river",
];
const NAMES: &[&str] = &["Alex Morgan", "Sam Rivera", "Kai Lindqvist", "Noor Haddad", "Ivy Chen"];
const CITIES: &[&str] = &["Helsinki", "Tampere", "Oulu", "Turku", "Espoo"];

fn word<R: Rng>(rng: &mut R, pool: &[&str]) -> String {
    pool.choose(rng).copied().unwrap_or("order").to_string()
}

/// Money amount with two decimal places in `[0, max_units)`.
fn money<R: Rng>(rng: &mut R, max_units: i64) -> Decimal {
    Decimal::new(rng.gen_range(0..max_units * 100), 2)
}

fn random_item<R: Rng>(rng: &mut R) -> Item {
    let price = money(rng, 1_000);
    let sale = Decimal::from(rng.gen_range(0..50i64));
    let total_price = (price * (Decimal::ONE_HUNDRED - sale) / Decimal::ONE_HUNDRED).round_dp(2);

    Item {
        chrt_id: rng.gen_range(1..9_999_999),
        track_number: word(rng, WORDS).to_uppercase(),
        price,
        rid: Uuid::new_v4().to_string(),
        name: word(rng, WORDS),
        sale,
        size: rng.gen_range(0..5).to_string(),
        total_price,
        nm_id: rng.gen_range(1..9_999_999),
        brand: word(rng, WORDS),
        status: 202,
    }
}

/// A random order that passes message validation, with one item and a
/// payment whose amount equals item totals plus delivery cost.
pub fn random_order<R: Rng>(rng: &mut R) -> Order {
    let items = vec![random_item(rng)];
    let goods: Decimal = items.iter().map(|i| i.total_price).sum();
    let delivery_cost = money(rng, 20);
    let now = Utc::now();

    Order {
        id: Uuid::new_v4().to_string(),
        track_number: word(rng, WORDS).to_uppercase(),
        entry: word(rng, WORDS),
        delivery: Delivery {
            name: word(rng, NAMES),
            phone: format!("+358{}", rng.gen_range(400_000_000..499_999_999)),
            zip: format!("{:05}", rng.gen_range(0..99_999)),
            city: word(rng, CITIES),
            address: format!("{} {}", word(rng, WORDS), rng.gen_range(1..200)),
            region: word(rng, WORDS),
            email: format!("{}@example.com", word(rng, WORDS)),
        },
        payment: Some(Payment {
            transaction: Uuid::new_v4().to_string(),
            request_id: Uuid::new_v4().to_string(),
            currency: "USD".to_string(),
            provider: word(rng, WORDS),
            amount: goods + delivery_cost,
            payment_dt: now.timestamp(),
            bank: word(rng, WORDS),
            delivery_cost,
            goods_total: goods.trunc().try_into().unwrap_or(0),
            custom_fee: Decimal::ZERO,
        }),
        items,
        locale: "en".to_string(),
        signature: String::new(),
        customer_id: word(rng, WORDS),
        delivery_service: word(rng, WORDS),
        shard_key: rng.gen_range(0..10).to_string(),
        sm_id: rng.gen_range(1..999),
        created_at: now,
        oof_shard: rng.gen_range(1..10).to_string(),
    }
}
