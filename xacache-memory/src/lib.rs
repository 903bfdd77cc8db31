//! In-memory collaborators for `xacache`
//!
//! This crate provides in-memory implementations of the systems the adapter
//! bridges: a resource registrar, a thread-bound transaction manager with
//! two-phase commit and recovery, and a cache manager running transactional
//! key/value caches. They are useful for testing and development scenarios
//! where a real transaction manager or cache product is not available.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::significant_drop_tightening)]

mod cache;
mod manager;
mod registrar;
mod store;
mod transaction;

#[cfg(test)]
mod testing;

pub use cache::{CacheError, CacheHandle, InMemoryCache, InMemoryComponentRegistry};
pub use manager::{InMemoryCacheManager, DEFAULT_START_TIMEOUT};
pub use registrar::InMemoryResourceRegistrar;
pub use store::CacheXaResource;
pub use transaction::{InMemoryTransaction, InMemoryTransactionManager, RecoveryReport, FORMAT_ID};
