use chrono::{DateTime, Utc};
use domain::{Delivery, Item, Order, Payment};
use sqlx::{FromRow, PgConnection};

/// Order header row with the delivery columns flattened in.
#[derive(Debug, Clone, FromRow)]
pub struct OrderRow {
    pub order_uid: String,
    pub track_number: String,
    pub entry: String,
    pub locale: String,
    pub internal_signature: String,
    pub customer_id: String,
    pub delivery_service: String,
    pub shardkey: String,
    pub sm_id: i32,
    pub date_created: DateTime<Utc>,
    pub oof_shard: String,
    pub delivery_name: String,
    pub delivery_phone: String,
    pub delivery_zip: String,
    pub delivery_city: String,
    pub delivery_address: String,
    pub delivery_region: String,
    pub delivery_email: String,
}

impl OrderRow {
    pub fn into_order(self, items: Vec<Item>, payment: Option<Payment>) -> Order {
        Order {
            id: self.order_uid,
            track_number: self.track_number,
            entry: self.entry,
            delivery: Delivery {
                name: self.delivery_name,
                phone: self.delivery_phone,
                zip: self.delivery_zip,
                city: self.delivery_city,
                address: self.delivery_address,
                region: self.delivery_region,
                email: self.delivery_email,
            },
            payment,
            items,
            locale: self.locale,
            signature: self.internal_signature,
            customer_id: self.customer_id,
            delivery_service: self.delivery_service,
            shard_key: self.shardkey,
            sm_id: self.sm_id,
            created_at: self.date_created,
            oof_shard: self.oof_shard,
        }
    }
}

const ORDER_COLUMNS: &str = r#"
    order_uid, track_number, entry, locale, internal_signature, customer_id,
    delivery_service, shardkey, sm_id, date_created, oof_shard,
    delivery_name, delivery_phone, delivery_zip, delivery_city,
    delivery_address, delivery_region, delivery_email
"#;

/// Single-table operations on `orders`.
pub struct OrdersDao;

impl OrdersDao {
    pub async fn insert(conn: &mut PgConnection, order: &Order) -> sqlx::Result<OrderRow> {
        let sql = format!(
            r#"
            INSERT INTO orders ({ORDER_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            RETURNING {ORDER_COLUMNS}
            "#
        );

        sqlx::query_as::<_, OrderRow>(&sql)
            .bind(&order.id)
            .bind(&order.track_number)
            .bind(&order.entry)
            .bind(&order.locale)
            .bind(&order.signature)
            .bind(&order.customer_id)
            .bind(&order.delivery_service)
            .bind(&order.shard_key)
            .bind(order.sm_id)
            .bind(order.created_at)
            .bind(&order.oof_shard)
            .bind(&order.delivery.name)
            .bind(&order.delivery.phone)
            .bind(&order.delivery.zip)
            .bind(&order.delivery.city)
            .bind(&order.delivery.address)
            .bind(&order.delivery.region)
            .bind(&order.delivery.email)
            .fetch_one(&mut *conn)
            .await
    }

    pub async fn find(conn: &mut PgConnection, order_uid: &str) -> sqlx::Result<Option<OrderRow>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_uid = $1");

        sqlx::query_as::<_, OrderRow>(&sql)
            .bind(order_uid)
            .fetch_optional(&mut *conn)
            .await
    }

    /// Most recently created headers first.
    pub async fn list_recent(conn: &mut PgConnection, limit: i64) -> sqlx::Result<Vec<OrderRow>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY date_created DESC, order_uid LIMIT $1"
        );

        sqlx::query_as::<_, OrderRow>(&sql)
            .bind(limit)
            .fetch_all(&mut *conn)
            .await
    }
}
