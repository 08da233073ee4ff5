use async_trait::async_trait;

use crate::aggregates::Order;
use crate::errors::RepositoryError;

/// Read/write contract shared by the Postgres repository and the cache
/// decorator, so either can stand in for the other.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persist the whole aggregate atomically and return it as stored.
    async fn create(&self, order: &Order) -> Result<Order, RepositoryError>;

    /// Load one aggregate by its identifier.
    async fn get_by_id(&self, id: &str) -> Result<Order, RepositoryError>;

    /// The `limit` most recently created orders, newest first.
    async fn list_recent(&self, limit: usize) -> Result<Vec<Order>, RepositoryError>;
}
