//! Response cache: key layout, storage backends and the request wrappers.

pub mod keys;
pub mod middleware;
pub mod redis_store;
pub mod store;
