//! Error types shared by the adapter and its hosts.
//!
//! Failures fall into four classes:
//!
//! - **Configuration**: a cache that is not XA-capable, a failing
//!   transaction-manager lookup, a missing component, a name collision.
//! - **Protocol misuse**: a second concurrent recovery session, any
//!   connection-oriented call on a resource that has no connections.
//! - **Transaction**: failures reported by the transaction manager or by an
//!   XA branch.
//! - **Internal invariant violations** are not represented here: they panic.
//!
//! Ineligibility of a cache is not an error at all; the adapter logs it and
//! moves on.

use crate::names::UniqueName;
use crate::producer::ConnectionOperation;
use crate::transaction::TransactionError;
use crate::xa::XaError;
use thiserror::Error;

/// Error type returned by producers, registrars, lifecycle listeners and
/// lookups.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The resource could not supply an XA-capable handle.
    #[error("resource {resource} is not XA-capable")]
    NotXaCapable { resource: String },

    /// A connection-oriented operation was invoked on a resource without
    /// connections.
    #[error("{resource} is not connection-oriented: {operation} is unsupported")]
    NotConnectionOriented {
        resource: UniqueName,
        operation: ConnectionOperation,
    },

    /// `start_recovery` was called while a recovery session was active.
    #[error("recovery already in progress on {0}")]
    RecoveryInProgress(UniqueName),

    /// The producer has not obtained its resource-manager handle yet.
    #[error("{0} has not been initialized")]
    NotInitialized(UniqueName),

    /// The producer already obtained its resource-manager handle.
    #[error("{0} has already been initialized")]
    AlreadyInitialized(UniqueName),

    /// A configuration fact about `resource` made progress impossible.
    #[error("illegal state for {resource}: {detail}")]
    IllegalState { resource: String, detail: String },

    /// Another producer is already registered under this name.
    #[error("a resource named {0} is already registered")]
    DuplicateName(UniqueName),

    /// No producer is registered under this name.
    #[error("no resource named {0} is registered")]
    NotRegistered(UniqueName),

    /// A unique name could not be derived for `resource`.
    #[error("cannot derive a unique name for {resource}: {detail}")]
    InvalidName { resource: String, detail: String },

    /// The registration-time recovery precheck failed.
    #[error("error recovering {resource}: {detail}")]
    RecoveryFailed { resource: UniqueName, detail: String },

    /// A transaction-manager lookup could not produce a transaction manager.
    #[error("transaction manager lookup failed: {0}")]
    LookupFailed(String),

    /// A required component could not be obtained from a cache's registry.
    #[error("component {component} unavailable for cache {cache}")]
    ComponentUnavailable { cache: String, component: String },

    #[error(transparent)]
    Xa(#[from] XaError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

impl ResourceError {
    /// Shorthand for [`ResourceError::IllegalState`].
    pub fn illegal_state(resource: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::IllegalState {
            resource: resource.into(),
            detail: detail.into(),
        }
    }

    /// True for the "not connection-oriented" protocol misuse class.
    pub const fn is_not_connection_oriented(&self) -> bool {
        matches!(self, Self::NotConnectionOriented { .. })
    }
}
