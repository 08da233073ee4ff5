pub mod orders_cache;

pub use orders_cache::{CacheError, CacheStats, OrdersCache};
