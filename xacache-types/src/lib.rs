#![forbid(invalid_value, overflowing_literals, unconditional_recursion, unsafe_code)]
#![deny(
    bad_style,
    non_ascii_idents,
    non_camel_case_types,
    non_snake_case,
    non_upper_case_globals,
    rust_2018_idioms,
    trivial_casts,
    trivial_numeric_casts,
    unused_must_use
)]

//! Shared vocabulary types and traits for the xacache XA adapter.
//!
//! This crate holds the contracts at the boundary between three parties:
//! the adapter itself (`xacache`), the transaction manager that drives
//! two-phase commit and recovery, and the cache whose lifecycle the adapter
//! observes. Keeping them in one dependency-light crate lets host
//! implementations (such as `xacache-memory`) and the adapter evolve
//! independently.
//!
//! # Overview
//!
//! - XA: `Xid`, `XaResource`, `XaError`, flags and votes
//! - Transaction manager side: `XaResourceProducer`, `XaResourceHolder`,
//!   `ResourceRegistrar`, `TransactionManager`, `Transaction`
//! - Cache side: `Cache`, `CacheManager`, `TransactionConfiguration`,
//!   `TransactionManagerLookup`, lifecycle events and components
//! - Errors: `ResourceError`, `TransactionError`
//! - Host runtime: the per-thread interruption flag in [`interruption`]

mod cache;
mod errors;
pub mod interruption;
mod names;
mod producer;
pub mod services;
mod transaction;
mod xa;

pub use cache::{
    Cache, CacheLifecycleListener, CacheManager, CacheStartedEvent, CacheStoppedEvent, Component,
    ComponentRegistry, TransactionConfiguration, TransactionManagerLookup, TransactionMode,
};
pub use errors::ResourceError;
pub use names::UniqueName;
pub use producer::{
    ConnectionHandle, ConnectionOperation, ResourceReference, ResourceRegistrar, XaResourceHolder,
    XaResourceProducer,
};
pub use transaction::{
    Synchronization, Transaction, TransactionError, TransactionManager, TransactionManagerId,
    TransactionStatus,
};
pub use xa::{
    EndFlag, RecoverFlag, ResourceManagerId, StartFlag, Vote, XaError, XaErrorCode, XaResource,
    Xid,
};
