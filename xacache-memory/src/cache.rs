//! Transactional in-memory cache.

use crate::store::{CacheStore, CacheXaResource, StoreSynchronization, Write};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use xacache_types::{
    Cache, Component, ComponentRegistry, ResourceError, Transaction, TransactionConfiguration,
    TransactionError, XaResource,
};

/// Errors returned by cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The operation is not allowed in the cache's current state.
    #[error("illegal state on cache {cache}: {detail}")]
    IllegalState {
        /// The cache that rejected the operation
        cache: String,
        /// What was wrong
        detail: String,
    },

    /// The cache is not running.
    #[error("cache {0} is not running")]
    NotRunning(String),

    /// The transaction manager rejected the operation.
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// Starting or wiring the cache failed.
    #[error(transparent)]
    Resource(#[from] ResourceError),
}

impl CacheError {
    fn illegal_state(cache: &str, detail: impl Into<String>) -> Self {
        Self::IllegalState {
            cache: cache.to_owned(),
            detail: detail.into(),
        }
    }
}

/// Components of one cache, started on registration and stopped in
/// reverse order when the cache stops.
#[derive(Default)]
pub struct InMemoryComponentRegistry {
    components: Mutex<Vec<(String, Arc<dyn Component>)>>,
}

impl InMemoryComponentRegistry {
    /// Names of the registered components, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.components
            .lock()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Stops and removes every component.
    pub fn stop_all(&self) {
        let drained: Vec<_> = self.components.lock().drain(..).collect();
        for (name, component) in drained.into_iter().rev() {
            tracing::trace!(component = %name, "stopping component");
            component.stop();
        }
    }
}

impl ComponentRegistry for InMemoryComponentRegistry {
    fn component(&self, name: &str) -> Option<Arc<dyn Component>> {
        self.components
            .lock()
            .iter()
            .find(|(registered, _)| registered == name)
            .map(|(_, component)| Arc::clone(component))
    }

    fn register_component(
        &self,
        name: &str,
        component: Arc<dyn Component>,
    ) -> Result<(), ResourceError> {
        {
            let mut components = self.components.lock();
            if components.iter().any(|(registered, _)| registered == name) {
                return Err(ResourceError::illegal_state(
                    name,
                    "a component is already registered under this name",
                ));
            }
            components.push((name.to_owned(), Arc::clone(&component)));
        }

        if let Err(error) = component.start() {
            self.components
                .lock()
                .retain(|(registered, _)| registered != name);
            return Err(error);
        }
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryComponentRegistry")
            .field("components", &self.names())
            .finish()
    }
}

/// A named key/value cache.
///
/// Non-transactional caches write through. Transactional caches require an
/// active transaction from the configured lookup: in XA mode the cache
/// enlists its XA adapter, in synchronization mode it registers a
/// synchronization, and either way writes become visible on commit only.
#[derive(Debug)]
pub struct InMemoryCache {
    name: String,
    configuration: TransactionConfiguration,
    store: Arc<CacheStore>,
    components: InMemoryComponentRegistry,
}

impl InMemoryCache {
    /// Create an empty cache
    pub fn new(name: impl Into<String>, configuration: TransactionConfiguration) -> Self {
        Self {
            name: name.into(),
            configuration,
            store: Arc::new(CacheStore::new()),
            components: InMemoryComponentRegistry::default(),
        }
    }

    pub const fn components(&self) -> &InMemoryComponentRegistry {
        &self.components
    }

    /// Number of prepared branches awaiting a commit decision.
    pub fn in_doubt(&self) -> usize {
        self.store.prepared_count()
    }

    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) -> Result<(), CacheError> {
        self.write(Write::Put(key.into(), value.into()))
    }

    pub fn remove(&self, key: impl Into<String>) -> Result<(), CacheError> {
        self.write(Write::Remove(key.into()))
    }

    /// Reads `key`, seeing the current transaction's own uncommitted writes.
    pub fn get(&self, key: &str) -> Option<String> {
        let pending = self
            .current_transaction()
            .ok()
            .and_then(|transaction| {
                self.store
                    .pending(transaction.xid().global_transaction_id(), key)
            });

        match pending {
            Some(value) => value,
            None => self.store.committed(key),
        }
    }

    fn current_transaction(&self) -> Result<Arc<dyn Transaction>, CacheError> {
        if !self.configuration.is_transactional() {
            return Err(CacheError::illegal_state(&self.name, "cache is not transactional"));
        }

        let lookup = self.configuration.lookup().ok_or_else(|| {
            CacheError::illegal_state(&self.name, "no transaction manager lookup is configured")
        })?;

        lookup.transaction_manager()?.transaction().ok_or_else(|| {
            CacheError::illegal_state(
                &self.name,
                "transactional cache written outside of a transaction",
            )
        })
    }

    fn write(&self, write: Write) -> Result<(), CacheError> {
        if !self.configuration.is_transactional() {
            self.store.apply(vec![write]);
            return Ok(());
        }

        let transaction = self.current_transaction()?;
        let global_transaction_id = transaction.xid().global_transaction_id().to_vec();

        if self.configuration.use_synchronization() {
            if self.store.record_synchronized(&global_transaction_id, write) {
                transaction.register_synchronization(Arc::new(StoreSynchronization::new(
                    Arc::clone(&self.store),
                    global_transaction_id,
                )))?;
            }
            return Ok(());
        }

        if !self.store.has_active_branch(&global_transaction_id) {
            transaction.enlist_resource(Arc::new(CacheXaResource::new(Arc::clone(&self.store))))?;
        }

        if self.store.record_in_branch(&global_transaction_id, write) {
            Ok(())
        } else {
            Err(CacheError::illegal_state(
                &self.name,
                format!("no active branch for transaction {}", transaction.xid()),
            ))
        }
    }
}

impl Cache for InMemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    fn transaction_configuration(&self) -> &TransactionConfiguration {
        &self.configuration
    }

    fn xa_resource(&self) -> Option<Arc<dyn XaResource>> {
        self.configuration
            .is_transactional()
            .then(|| Arc::new(CacheXaResource::new(Arc::clone(&self.store))) as Arc<dyn XaResource>)
    }

    fn component_registry(&self) -> &dyn ComponentRegistry {
        &self.components
    }
}

/// Transparent delegation layer the manager hands out instead of the cache.
#[derive(Debug, Clone)]
pub struct CacheHandle {
    inner: Arc<InMemoryCache>,
}

impl CacheHandle {
    pub(crate) const fn new(inner: Arc<InMemoryCache>) -> Self {
        Self { inner }
    }

    /// The wrapped cache.
    pub const fn inner(&self) -> &Arc<InMemoryCache> {
        &self.inner
    }

    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) -> Result<(), CacheError> {
        self.inner.put(key, value)
    }

    pub fn remove(&self, key: impl Into<String>) -> Result<(), CacheError> {
        self.inner.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key)
    }
}

impl Cache for CacheHandle {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn transaction_configuration(&self) -> &TransactionConfiguration {
        self.inner.transaction_configuration()
    }

    fn delegate(&self) -> Option<Arc<dyn Cache>> {
        Some(Arc::clone(&self.inner) as Arc<dyn Cache>)
    }

    fn xa_resource(&self) -> Option<Arc<dyn XaResource>> {
        self.inner.xa_resource()
    }

    fn component_registry(&self) -> &dyn ComponentRegistry {
        self.inner.component_registry()
    }
}
