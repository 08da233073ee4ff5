use async_trait::async_trait;
use common::config::CacheConfig;
use common::metrics;
use domain::{Order, OrderRepository, RepositoryError};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache capacity must be a positive integer, got {0}")]
    InvalidCapacity(usize),

    #[error("prefill failed: {0}")]
    Prefill(#[from] RepositoryError),

    #[error("prefill timed out after {0:?}")]
    PrefillTimedOut(Duration),
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Cache-aside decorator over any [`OrderRepository`].
///
/// Writes go to the wrapped repository first and are cached only once they
/// succeed; reads are served from the LRU when warm and fall through to the
/// repository on a miss. The LRU lock is held for a single get or put and
/// never across an await.
pub struct OrdersCache {
    decoratee: Arc<dyn OrderRepository>,
    lru: Mutex<LruCache<String, Order>>,
    capacity: NonZeroUsize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl OrdersCache {
    /// Create an empty cache. Prefill is a separate, explicit step.
    pub fn new(
        config: &CacheConfig,
        decoratee: Arc<dyn OrderRepository>,
    ) -> Result<Self, CacheError> {
        let capacity =
            NonZeroUsize::new(config.size).ok_or(CacheError::InvalidCapacity(config.size))?;

        Ok(Self {
            decoratee,
            lru: Mutex::new(LruCache::new(capacity)),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Load the most recent orders, up to capacity, into the cache.
    ///
    /// Returns the number of orders loaded. A timeout aborts the underlying
    /// read, which is a single batched call, so the cache is never left
    /// half-filled by it.
    pub async fn prefill(&self, timeout: Option<Duration>) -> Result<usize, CacheError> {
        let start = Instant::now();

        let orders = match timeout {
            Some(limit) => tokio::time::timeout(limit, self.decoratee.list_recent(self.capacity.get()))
                .await
                .map_err(|_| CacheError::PrefillTimedOut(limit))??,
            None => self.decoratee.list_recent(self.capacity.get()).await?,
        };

        let loaded = orders.len();
        {
            let mut lru = self.lru.lock();
            // Oldest first so the newest orders end up most recently used.
            for order in orders.into_iter().rev() {
                lru.put(order.id.clone(), order);
            }
        }

        info!(
            orders_loaded = loaded,
            took_ms = start.elapsed().as_millis() as u64,
            "Cache prefilled"
        );

        Ok(loaded)
    }

    pub fn len(&self) -> usize {
        self.lru.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lru.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Whether `id` is cached, without touching its recency.
    pub fn contains(&self, id: &str) -> bool {
        self.lru.lock().contains(id)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.len(),
            capacity: self.capacity.get(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn lookup(&self, id: &str) -> Option<Order> {
        let mut lru = self.lru.lock();
        match lru.get(id) {
            Some(order) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_request(true);
                Some(order.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_request(false);
                None
            }
        }
    }

    fn insert(&self, order: &Order) {
        self.lru.lock().put(order.id.clone(), order.clone());
    }
}

#[async_trait]
impl OrderRepository for OrdersCache {
    async fn create(&self, order: &Order) -> Result<Order, RepositoryError> {
        let stored = self.decoratee.create(order).await?;
        self.insert(&stored);
        Ok(stored)
    }

    async fn get_by_id(&self, id: &str) -> Result<Order, RepositoryError> {
        if let Some(order) = self.lookup(id) {
            return Ok(order);
        }

        debug!(order_id = %id, op = "get_by_id", "Order cache miss");

        let order = self.decoratee.get_by_id(id).await?;
        self.insert(&order);
        Ok(order)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Order>, RepositoryError> {
        self.decoratee.list_recent(limit).await
    }
}
