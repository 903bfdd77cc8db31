//! `xacache` - transactional caches as first-class XA resources
//!
//! This library bridges an embeddable transaction manager and a transactional
//! cache's lifecycle. When a cache starts and is eligible, a
//! [`CacheXaResourceProducer`] is registered for it so the transaction
//! manager can recognize its XA branches and drive recovery; when the cache
//! stops, the producer is unregistered again.
//!
//! # Wiring
//!
//! ```rust,ignore
//! let registrator = Arc::new(CacheResourceRegistrator::new(transaction_manager.clone(), registrar));
//! cache_manager.add_listener(registrator.clone());
//!
//! let lookup = Arc::new(BridgeTransactionManagerLookup::new(transaction_manager));
//! let configuration = TransactionConfiguration::transactional(lookup).with_recovery(true);
//! cache_manager.define_configuration("orders", configuration);
//! let orders = cache_manager.get_cache("orders")?; // registered as "resource-orders"
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod eligibility;
mod holder;
mod interrupt;
mod lookup;
mod producer;
mod registrator;

#[cfg(test)]
mod testing;

pub use config::{BridgeConfig, ConfigError, UniqueNamePrefix};
pub use eligibility::Eligibility;
pub use holder::CacheXaResourceHolder;
pub use interrupt::InterruptScope;
pub use lookup::{BridgeTransactionManagerLookup, ProducerComponent, PRODUCER_COMPONENT};
pub use producer::CacheXaResourceProducer;
pub use registrator::CacheResourceRegistrator;

pub use xacache_types as types;
