//! In-memory host shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use xacache::types::{
    ResourceError, ResourceRegistrar, TransactionConfiguration, UniqueName, XaResourceProducer,
};
use xacache::{BridgeTransactionManagerLookup, CacheResourceRegistrator};
use xacache_memory::{InMemoryCacheManager, InMemoryResourceRegistrar, InMemoryTransactionManager};

/// Registrar that counts directory traffic before delegating.
#[derive(Default)]
pub struct CountingRegistrar {
    inner: InMemoryResourceRegistrar,
    registrations: AtomicUsize,
    unregistrations: AtomicUsize,
}

impl CountingRegistrar {
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    pub fn unregistrations(&self) -> usize {
        self.unregistrations.load(Ordering::SeqCst)
    }

    pub fn is_registered(&self, unique_name: &str) -> bool {
        self.inner.is_registered(unique_name)
    }
}

impl ResourceRegistrar for CountingRegistrar {
    fn register(&self, producer: Arc<dyn XaResourceProducer>) -> Result<(), ResourceError> {
        let _ = self.registrations.fetch_add(1, Ordering::SeqCst);
        self.inner.register(producer)
    }

    fn unregister(&self, unique_name: &UniqueName) {
        let _ = self.unregistrations.fetch_add(1, Ordering::SeqCst);
        self.inner.unregister(unique_name);
    }

    fn get(&self, unique_name: &UniqueName) -> Option<Arc<dyn XaResourceProducer>> {
        self.inner.get(unique_name)
    }

    fn producers(&self) -> Vec<Arc<dyn XaResourceProducer>> {
        self.inner.producers()
    }
}

/// Transaction manager, registrar and cache manager wired together with a
/// registrator listening to cache lifecycle events.
pub struct Host {
    pub registrar: Arc<CountingRegistrar>,
    pub transaction_manager: Arc<InMemoryTransactionManager>,
    pub cache_manager: Arc<InMemoryCacheManager>,
    pub registrator: Arc<CacheResourceRegistrator>,
}

impl Host {
    pub fn new() -> Self {
        let registrar = Arc::new(CountingRegistrar::default());
        let transaction_manager = Arc::new(InMemoryTransactionManager::new(registrar.clone()));
        let cache_manager = InMemoryCacheManager::new();
        let registrator = Arc::new(CacheResourceRegistrator::new(
            transaction_manager.clone(),
            registrar.clone(),
        ));
        cache_manager.add_listener(registrator.clone());

        Self {
            registrar,
            transaction_manager,
            cache_manager,
            registrator,
        }
    }

    /// XA-mode configuration whose lookup is bound to this host's
    /// transaction manager.
    pub fn bridged(&self) -> TransactionConfiguration {
        TransactionConfiguration::transactional(Arc::new(BridgeTransactionManagerLookup::new(
            self.transaction_manager.clone(),
        )))
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
