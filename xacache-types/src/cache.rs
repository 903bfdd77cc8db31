//! Cache side of the boundary: configuration, instances, lifecycle events
//! and the per-cache component registry.

use crate::errors::ResourceError;
use crate::transaction::TransactionManager;
use crate::xa::XaResource;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Whether a cache takes part in transactions at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionMode {
    Transactional,
    #[default]
    NonTransactional,
}

/// Resolves the transaction manager a cache should use.
pub trait TransactionManagerLookup: Send + Sync + fmt::Debug {
    fn transaction_manager(&self) -> Result<Arc<dyn TransactionManager>, ResourceError>;

    /// Concrete lookup type, for callers that recognize their own lookups.
    fn as_any(&self) -> &dyn Any;

    /// Runs once when a cache configured with this lookup starts, before
    /// lifecycle listeners are notified.
    fn install(&self, cache: &Arc<dyn Cache>) -> Result<(), ResourceError> {
        let _ = cache;
        Ok(())
    }
}

/// Transaction settings of a cache, read once when the cache starts.
#[derive(Debug, Clone, Default)]
pub struct TransactionConfiguration {
    mode: TransactionMode,
    use_synchronization: bool,
    lookup: Option<Arc<dyn TransactionManagerLookup>>,
    recovery_enabled: bool,
}

impl TransactionConfiguration {
    /// A cache that ignores transactions.
    pub fn non_transactional() -> Self {
        Self::default()
    }

    /// A transactional cache that takes part as a full XA resource.
    pub fn transactional(lookup: Arc<dyn TransactionManagerLookup>) -> Self {
        Self {
            mode: TransactionMode::Transactional,
            use_synchronization: false,
            lookup: Some(lookup),
            recovery_enabled: false,
        }
    }

    /// Participate through a synchronization instead of an XA branch.
    #[must_use]
    pub fn with_synchronization(mut self, use_synchronization: bool) -> Self {
        self.use_synchronization = use_synchronization;
        self
    }

    #[must_use]
    pub fn with_recovery(mut self, recovery_enabled: bool) -> Self {
        self.recovery_enabled = recovery_enabled;
        self
    }

    #[must_use]
    pub fn with_lookup(mut self, lookup: Arc<dyn TransactionManagerLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub const fn mode(&self) -> TransactionMode {
        self.mode
    }

    pub const fn is_transactional(&self) -> bool {
        matches!(self.mode, TransactionMode::Transactional)
    }

    pub const fn use_synchronization(&self) -> bool {
        self.use_synchronization
    }

    pub fn lookup(&self) -> Option<&Arc<dyn TransactionManagerLookup>> {
        self.lookup.as_ref()
    }

    pub const fn recovery_enabled(&self) -> bool {
        self.recovery_enabled
    }
}

/// A lifecycle-managed object living in a cache's component registry.
pub trait Component: Send + Sync {
    fn start(&self) -> Result<(), ResourceError>;

    fn stop(&self);

    fn as_any(&self) -> &dyn Any;
}

/// Named components wired into one cache's lifecycle.
///
/// Components registered while the cache runs are started immediately;
/// all components stop when the cache stops.
pub trait ComponentRegistry: Send + Sync {
    fn component(&self, name: &str) -> Option<Arc<dyn Component>>;

    fn register_component(
        &self,
        name: &str,
        component: Arc<dyn Component>,
    ) -> Result<(), ResourceError>;
}

/// A running cache instance.
pub trait Cache: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn transaction_configuration(&self) -> &TransactionConfiguration;

    /// The wrapped cache, when this instance is a transparent delegation
    /// layer.
    fn delegate(&self) -> Option<Arc<dyn Cache>> {
        None
    }

    /// The cache's XA handle, or `None` when it cannot act as an XA resource.
    fn xa_resource(&self) -> Option<Arc<dyn XaResource>>;

    fn component_registry(&self) -> &dyn ComponentRegistry;
}

/// The cache's management layer.
pub trait CacheManager: Send + Sync {
    /// Returns the named cache.
    ///
    /// May block until the start event for that cache has been delivered
    /// unless the calling thread is interrupted.
    fn cache(&self, name: &str) -> Result<Arc<dyn Cache>, ResourceError>;
}

/// Delivered after a cache has started.
#[derive(Clone)]
pub struct CacheStartedEvent {
    cache_name: String,
    cache_manager: Arc<dyn CacheManager>,
}

impl CacheStartedEvent {
    pub fn new(cache_name: impl Into<String>, cache_manager: Arc<dyn CacheManager>) -> Self {
        Self {
            cache_name: cache_name.into(),
            cache_manager,
        }
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn cache_manager(&self) -> &Arc<dyn CacheManager> {
        &self.cache_manager
    }
}

impl fmt::Debug for CacheStartedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStartedEvent")
            .field("cache_name", &self.cache_name)
            .finish_non_exhaustive()
    }
}

/// Delivered after a cache has stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStoppedEvent {
    cache_name: String,
}

impl CacheStoppedEvent {
    pub fn new(cache_name: impl Into<String>) -> Self {
        Self {
            cache_name: cache_name.into(),
        }
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }
}

/// Subscriber to cache start/stop notifications.
///
/// Errors returned from a handler are configuration failures and propagate
/// to whoever triggered the lifecycle transition.
pub trait CacheLifecycleListener: Send + Sync {
    fn on_cache_started(&self, event: &CacheStartedEvent) -> Result<(), ResourceError>;

    fn on_cache_stopped(&self, event: &CacheStoppedEvent) -> Result<(), ResourceError>;
}
