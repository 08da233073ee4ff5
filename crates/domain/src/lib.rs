pub mod aggregates;
pub mod errors;
pub mod repository;

#[cfg(feature = "testing")]
pub mod testing;

pub use aggregates::{Delivery, Item, Order, Payment};
pub use errors::RepositoryError;
pub use repository::OrderRepository;

#[cfg(feature = "testing")]
pub use repository::MockOrderRepository;
