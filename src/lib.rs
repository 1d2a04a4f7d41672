//! Storefront Cache - client-side data layer for a business-management app
//!
//! Provides a TTL-bounded, persistence-backed cache, a cache-aside accessor per
//! remote resource, and optimistic list mutations with rollback.

pub mod accessor;
pub mod cache;
pub mod config;
pub mod error;
pub mod optimistic;

pub use accessor::{HttpApi, ListParams, Resource, ResourceAccessor, ResourceApi};
pub use cache::{Cache, SharedCache};
pub use config::Config;
pub use error::{ApiError, Error, Result, StorageError};
pub use optimistic::{Identified, OptimisticList};
