//! PostgreSQL storage for the order aggregate.
//!
//! The aggregate spans three tables (`orders` with embedded delivery columns,
//! `items`, `payments`). Each table has its own DAO whose operations take an
//! explicit connection, so they can be composed into one transaction by
//! [`PostgresOrderRepository`] or by any caller that already holds one.

pub mod errors;
pub mod items_dao;
pub mod orders_dao;
pub mod payments_dao;
pub mod postgres_order_repository;
pub mod tx;

pub use errors::classify;
pub use items_dao::ItemsDao;
pub use orders_dao::OrdersDao;
pub use payments_dao::PaymentsDao;
pub use postgres_order_repository::PostgresOrderRepository;

/// DDL for the order tables, idempotent (`IF NOT EXISTS`).
pub const SCHEMA: &str = include_str!("../sql/schema.sql");
