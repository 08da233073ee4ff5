use domain::Payment;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection};

#[derive(Debug, Clone, FromRow)]
pub struct PaymentRow {
    pub transaction: String,
    pub order_uid: String,
    pub request_id: String,
    pub currency: String,
    pub provider: String,
    pub amount: Decimal,
    pub payment_dt: i64,
    pub bank: String,
    pub delivery_cost: Decimal,
    pub goods_total: i32,
    pub custom_fee: Decimal,
}

impl From<PaymentRow> for Payment {
    fn from(row: PaymentRow) -> Self {
        Payment {
            transaction: row.transaction,
            request_id: row.request_id,
            currency: row.currency,
            provider: row.provider,
            amount: row.amount,
            payment_dt: row.payment_dt,
            bank: row.bank,
            delivery_cost: row.delivery_cost,
            goods_total: row.goods_total,
            custom_fee: row.custom_fee,
        }
    }
}

const PAYMENT_COLUMNS: &str = r#"
    "transaction", order_uid, request_id, currency, provider, amount,
    payment_dt, bank, delivery_cost, goods_total, custom_fee
"#;

/// Single-table operations on `payments`; at most one row per order.
pub struct PaymentsDao;

impl PaymentsDao {
    pub async fn insert(
        conn: &mut PgConnection,
        order_uid: &str,
        payment: &Payment,
    ) -> sqlx::Result<Payment> {
        let sql = format!(
            r#"
            INSERT INTO payments ({PAYMENT_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {PAYMENT_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(&payment.transaction)
            .bind(order_uid)
            .bind(&payment.request_id)
            .bind(&payment.currency)
            .bind(&payment.provider)
            .bind(payment.amount)
            .bind(payment.payment_dt)
            .bind(&payment.bank)
            .bind(payment.delivery_cost)
            .bind(payment.goods_total)
            .bind(payment.custom_fee)
            .fetch_one(&mut *conn)
            .await?;

        Ok(row.into())
    }

    pub async fn find_by_order(
        conn: &mut PgConnection,
        order_uid: &str,
    ) -> sqlx::Result<Option<Payment>> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_uid = $1");

        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(order_uid)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(row.map(Payment::from))
    }

    pub async fn find_by_orders(
        conn: &mut PgConnection,
        order_uids: &[String],
    ) -> sqlx::Result<Vec<PaymentRow>> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_uid = ANY($1)");

        sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(order_uids)
            .fetch_all(&mut *conn)
            .await
    }
}
