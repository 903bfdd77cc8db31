use crate::lookup::BridgeTransactionManagerLookup;
use xacache_types::{Cache, ResourceError, TransactionManager};

/// Whether a started cache may take part in transactions as an XA resource.
///
/// Computed from the cache's transaction configuration when it starts; never
/// stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    /// The cache does not run in transactional mode.
    NotTransactional,
    /// The cache only registers a synchronization with transactions.
    SynchronizationOnly,
    /// The cache is bound to some other transaction manager, or to none.
    ForeignTransactionManager,
}

impl Eligibility {
    /// Evaluates the rules in order, stopping at the first that fails.
    ///
    /// A lookup of the bridge's own type is accepted without being invoked.
    /// Any other lookup is invoked and must return the bridged transaction
    /// manager; a lookup that fails is a configuration error naming the cache.
    pub fn evaluate(
        cache: &dyn Cache,
        transaction_manager: &dyn TransactionManager,
    ) -> Result<Self, ResourceError> {
        let configuration = cache.transaction_configuration();

        if !configuration.is_transactional() {
            return Ok(Self::NotTransactional);
        }

        if configuration.use_synchronization() {
            return Ok(Self::SynchronizationOnly);
        }

        let Some(lookup) = configuration.lookup() else {
            return Ok(Self::ForeignTransactionManager);
        };

        if lookup.as_any().is::<BridgeTransactionManagerLookup>() {
            return Ok(Self::Eligible);
        }

        let bound = lookup.transaction_manager().map_err(|error| {
            ResourceError::illegal_state(
                cache.name(),
                format!("failed to determine if the bridged transaction manager is used: {error}"),
            )
        })?;

        if bound.instance_id() == transaction_manager.instance_id() {
            Ok(Self::Eligible)
        } else {
            Ok(Self::ForeignTransactionManager)
        }
    }

    pub const fn is_eligible(self) -> bool {
        matches!(self, Self::Eligible)
    }

    pub(crate) fn log_skipped(self, cache_name: &str) {
        match self {
            Self::Eligible => {}
            Self::NotTransactional => tracing::debug!(
                cache = cache_name,
                "will not register cache: the cache is not transactional"
            ),
            Self::SynchronizationOnly => tracing::debug!(
                cache = cache_name,
                "will not register cache: the cache merely synchronizes with the transaction"
            ),
            Self::ForeignTransactionManager => tracing::warn!(
                cache = cache_name,
                "will not register cache: the bridged transaction manager is not the one used by the cache"
            ),
        }
    }
}
