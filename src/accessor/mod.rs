//! Cache-Aside Accessor Module
//!
//! Per-resource wrappers that derive cache keys from request parameters,
//! read through the cache, and invalidate it after writes.

mod api;
mod inflight;
mod keys;
mod resource;

pub use api::{ApiRequest, HttpApi, Method, ResourceApi};
pub use keys::{escape_segment, KeyBuilder, ListParams, Resource, SortOrder, DELIMITER};
pub use resource::ResourceAccessor;
