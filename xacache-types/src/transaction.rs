//! Transaction-manager side of the boundary.
//!
//! The adapter only ever needs [`TransactionManager::instance_id`] to decide
//! whether a cache is bound to the bridged transaction manager. The rest of
//! the contract is what a cache needs to take part in a transaction.

use crate::xa::{XaError, Xid};
use chrono::{DateTime, Utc};
use nutype::nutype;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Identity of a transaction-manager instance.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    AsRef,
    Display,
    Serialize,
    Deserialize
))]
pub struct TransactionManagerId(Uuid);

impl TransactionManagerId {
    pub fn generate() -> Self {
        Self::new(Uuid::now_v7())
    }
}

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Active,
    MarkedRollback,
    Preparing,
    Committing,
    Committed,
    RollingBack,
    RolledBack,
}

/// Error type returned by transaction-manager operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    /// The calling thread has no transaction.
    #[error("no transaction is associated with the current thread")]
    NoTransaction,

    /// The calling thread already has a transaction.
    #[error("a transaction is already associated with the current thread")]
    AlreadyActive,

    /// The transaction could not commit and was rolled back.
    #[error("transaction {xid} rolled back: {reason}")]
    RolledBack { xid: Xid, reason: String },

    /// Some branches committed while others rolled back.
    #[error("transaction {xid} ended with mixed heuristic outcome: {reason}")]
    HeuristicMixed { xid: Xid, reason: String },

    /// The enlisted XA handle is not known to any registered producer.
    #[error("cannot enlist unknown XA resource {0}")]
    UnknownResource(String),

    /// The transaction is not in a state that permits the call.
    #[error("illegal transaction state: {0}")]
    IllegalState(String),

    #[error(transparent)]
    Xa(#[from] XaError),
}

/// Callback notified around transaction completion.
pub trait Synchronization: Send + Sync {
    fn before_completion(&self) {}

    fn after_completion(&self, committed: bool);
}

/// A transaction associated with a thread.
pub trait Transaction: Send + Sync + fmt::Debug {
    fn xid(&self) -> &Xid;

    fn status(&self) -> TransactionStatus;

    fn started_at(&self) -> DateTime<Utc>;

    /// Adds `xa_resource` as a branch of this transaction.
    fn enlist_resource(
        &self,
        xa_resource: Arc<dyn crate::xa::XaResource>,
    ) -> Result<(), TransactionError>;

    fn register_synchronization(
        &self,
        synchronization: Arc<dyn Synchronization>,
    ) -> Result<(), TransactionError>;
}

/// A transaction manager handle.
pub trait TransactionManager: Send + Sync + fmt::Debug {
    /// Identity used to decide whether two handles are the same manager.
    fn instance_id(&self) -> TransactionManagerId;

    fn begin(&self) -> Result<(), TransactionError>;

    fn commit(&self) -> Result<(), TransactionError>;

    fn rollback(&self) -> Result<(), TransactionError>;

    /// The transaction associated with the calling thread.
    fn transaction(&self) -> Option<Arc<dyn Transaction>>;
}
