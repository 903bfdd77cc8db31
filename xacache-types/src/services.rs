//! Process-wide transaction-manager services.
//!
//! Hosts that cannot pass the transaction manager around explicitly install
//! it here once; lookups without a direct binding resolve it from this slot.

use crate::transaction::TransactionManager;
use parking_lot::RwLock;
use std::sync::{Arc, OnceLock};

static TRANSACTION_MANAGER: OnceLock<RwLock<Option<Arc<dyn TransactionManager>>>> =
    OnceLock::new();

fn slot() -> &'static RwLock<Option<Arc<dyn TransactionManager>>> {
    TRANSACTION_MANAGER.get_or_init(|| RwLock::new(None))
}

/// Installs the process-wide transaction manager, returning the one it
/// replaced.
pub fn install_transaction_manager(
    transaction_manager: Arc<dyn TransactionManager>,
) -> Option<Arc<dyn TransactionManager>> {
    tracing::debug!(
        transaction_manager = %transaction_manager.instance_id(),
        "installing process-wide transaction manager"
    );
    slot().write().replace(transaction_manager)
}

/// The process-wide transaction manager, if one was installed.
pub fn transaction_manager() -> Option<Arc<dyn TransactionManager>> {
    slot().read().clone()
}

/// Removes the process-wide transaction manager.
pub fn reset() -> Option<Arc<dyn TransactionManager>> {
    slot().write().take()
}
