use domain::Item;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection};

#[derive(Debug, Clone, FromRow)]
pub struct ItemRow {
    pub order_uid: String,
    pub chrt_id: i32,
    pub track_number: String,
    pub price: Decimal,
    pub rid: String,
    pub name: String,
    pub sale: Decimal,
    pub size: String,
    pub total_price: Decimal,
    pub nm_id: i32,
    pub brand: String,
    pub status: i32,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Item {
            chrt_id: row.chrt_id,
            track_number: row.track_number,
            price: row.price,
            rid: row.rid,
            name: row.name,
            sale: row.sale,
            size: row.size,
            total_price: row.total_price,
            nm_id: row.nm_id,
            brand: row.brand,
            status: row.status,
        }
    }
}

const ITEM_COLUMNS: &str = r#"
    order_uid, chrt_id, track_number, price, rid, name, sale, size,
    total_price, nm_id, brand, status
"#;

/// Single-table operations on `items`. Rows come back in insertion order.
pub struct ItemsDao;

impl ItemsDao {
    pub async fn insert(conn: &mut PgConnection, order_uid: &str, item: &Item) -> sqlx::Result<Item> {
        let sql = format!(
            r#"
            INSERT INTO items ({ITEM_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {ITEM_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(order_uid)
            .bind(item.chrt_id)
            .bind(&item.track_number)
            .bind(item.price)
            .bind(&item.rid)
            .bind(&item.name)
            .bind(item.sale)
            .bind(&item.size)
            .bind(item.total_price)
            .bind(item.nm_id)
            .bind(&item.brand)
            .bind(item.status)
            .fetch_one(&mut *conn)
            .await?;

        Ok(row.into())
    }

    pub async fn find_by_order(conn: &mut PgConnection, order_uid: &str) -> sqlx::Result<Vec<Item>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE order_uid = $1 ORDER BY id");

        let rows = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(order_uid)
            .fetch_all(&mut *conn)
            .await?;

        Ok(rows.into_iter().map(Item::from).collect())
    }

    pub async fn find_by_orders(
        conn: &mut PgConnection,
        order_uids: &[String],
    ) -> sqlx::Result<Vec<ItemRow>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE order_uid = ANY($1) ORDER BY id");

        sqlx::query_as::<_, ItemRow>(&sql)
            .bind(order_uids)
            .fetch_all(&mut *conn)
            .await
    }
}
