use async_trait::async_trait;
use common::metrics;
use domain::{Item, Order, OrderRepository, Payment, RepositoryError};
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info};

use crate::errors::classify;
use crate::items_dao::ItemsDao;
use crate::orders_dao::OrdersDao;
use crate::payments_dao::PaymentsDao;
use crate::tx;

/// PostgreSQL implementation of the order repository.
///
/// Every trait method is the outermost call: it opens a transaction, composes
/// the single-table operations inside it and commits or rolls back at exit.
/// Callers that already hold a transaction use [`Self::create_in`] and
/// [`Self::get_in`] to fold the aggregate into their own unit of work.
pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    /// Create a new PostgreSQL order repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the database pool (useful for testing)
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Write header, items and payment on an existing connection or transaction.
    pub async fn create_in(conn: &mut PgConnection, order: &Order) -> Result<Order, RepositoryError> {
        insert_aggregate(conn, order).await.map_err(classify)
    }

    /// Read the whole aggregate on an existing connection or transaction.
    pub async fn get_in(conn: &mut PgConnection, id: &str) -> Result<Order, RepositoryError> {
        load_aggregate(conn, id)
            .await
            .map_err(classify)?
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }
}

async fn insert_aggregate(conn: &mut PgConnection, order: &Order) -> sqlx::Result<Order> {
    let header = OrdersDao::insert(conn, order).await?;

    let mut items = Vec::with_capacity(order.items.len());
    for item in &order.items {
        items.push(ItemsDao::insert(conn, &header.order_uid, item).await?);
    }

    let payment = match &order.payment {
        Some(payment) => Some(PaymentsDao::insert(conn, &header.order_uid, payment).await?),
        None => None,
    };

    Ok(header.into_order(items, payment))
}

async fn load_aggregate(conn: &mut PgConnection, id: &str) -> sqlx::Result<Option<Order>> {
    let Some(header) = OrdersDao::find(conn, id).await? else {
        return Ok(None);
    };

    let items = ItemsDao::find_by_order(conn, id).await?;
    let payment = PaymentsDao::find_by_order(conn, id).await?;

    Ok(Some(header.into_order(items, payment)))
}

async fn load_recent(conn: &mut PgConnection, limit: i64) -> sqlx::Result<Vec<Order>> {
    let headers = OrdersDao::list_recent(conn, limit).await?;
    if headers.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<String> = headers.iter().map(|h| h.order_uid.clone()).collect();

    let mut items: HashMap<String, Vec<Item>> = HashMap::new();
    for row in ItemsDao::find_by_orders(conn, &ids).await? {
        items.entry(row.order_uid.clone()).or_default().push(row.into());
    }

    let mut payments: HashMap<String, Payment> = PaymentsDao::find_by_orders(conn, &ids)
        .await?
        .into_iter()
        .map(|row| (row.order_uid.clone(), row.into()))
        .collect();

    Ok(headers
        .into_iter()
        .map(|header| {
            let order_items = items.remove(&header.order_uid).unwrap_or_default();
            let payment = payments.remove(&header.order_uid);
            header.into_order(order_items, payment)
        })
        .collect())
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    async fn create(&self, order: &Order) -> Result<Order, RepositoryError> {
        let start = Instant::now();

        let result = async {
            let mut tx = tx::begin(&self.pool).await?;
            let written = insert_aggregate(&mut *tx, order).await;
            tx::finish(tx, written).await
        }
        .await;

        metrics::record_repository_operation("create", result.is_ok(), start.elapsed().as_secs_f64());

        if result.is_ok() {
            info!(
                order_id = %order.id,
                items = order.items.len(),
                "Order persisted"
            );
        }

        result
    }

    async fn get_by_id(&self, id: &str) -> Result<Order, RepositoryError> {
        let start = Instant::now();

        let result = async {
            let mut tx = tx::begin(&self.pool).await?;
            let loaded = load_aggregate(&mut *tx, id).await;
            tx::finish(tx, loaded)
                .await?
                .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
        }
        .await;

        metrics::record_repository_operation(
            "get_by_id",
            result.is_ok(),
            start.elapsed().as_secs_f64(),
        );
        debug!("Loaded order {}: found={}", id, result.is_ok());

        result
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Order>, RepositoryError> {
        let start = Instant::now();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let result = async {
            let mut tx = tx::begin(&self.pool).await?;
            let loaded = load_recent(&mut *tx, limit).await;
            tx::finish(tx, loaded).await
        }
        .await;

        metrics::record_repository_operation(
            "list_recent",
            result.is_ok(),
            start.elapsed().as_secs_f64(),
        );

        if let Ok(orders) = &result {
            debug!("Loaded {} recent orders (limit {})", orders.len(), limit);
        }

        result
    }
}
