//! Hand-rolled collaborators for unit tests.

use crate::config::BridgeConfig;
use crate::producer::CacheXaResourceProducer;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use xacache_types::{
    Cache, CacheManager, Component, ComponentRegistry, EndFlag, RecoverFlag, ResourceError,
    ResourceManagerId, ResourceRegistrar, StartFlag, Transaction, TransactionConfiguration,
    TransactionError, TransactionManager, TransactionManagerId, TransactionManagerLookup, Vote,
    XaError, XaErrorCode, XaResource, XaResourceProducer, Xid,
};

#[derive(Debug)]
pub(crate) struct StubXaResource {
    rm_id: ResourceManagerId,
    fail_identity: bool,
}

impl StubXaResource {
    pub(crate) fn new() -> Self {
        Self {
            rm_id: ResourceManagerId::generate(),
            fail_identity: false,
        }
    }

    /// A distinct handle object for the same resource manager.
    pub(crate) fn sibling_of(other: &Self) -> Self {
        Self {
            rm_id: other.rm_id,
            fail_identity: other.fail_identity,
        }
    }
}

impl XaResource for StubXaResource {
    fn resource_manager_id(&self) -> ResourceManagerId {
        self.rm_id
    }

    fn is_same_rm(&self, other: &dyn XaResource) -> Result<bool, XaError> {
        if self.fail_identity {
            return Err(XaError::new(XaErrorCode::RmFailure, "identity unavailable"));
        }
        Ok(self.rm_id == other.resource_manager_id())
    }

    fn start(&self, _xid: &Xid, _flag: StartFlag) -> Result<(), XaError> {
        Ok(())
    }

    fn end(&self, _xid: &Xid, _flag: EndFlag) -> Result<(), XaError> {
        Ok(())
    }

    fn prepare(&self, _xid: &Xid) -> Result<Vote, XaError> {
        Ok(Vote::Ok)
    }

    fn commit(&self, _xid: &Xid, _one_phase: bool) -> Result<(), XaError> {
        Ok(())
    }

    fn rollback(&self, _xid: &Xid) -> Result<(), XaError> {
        Ok(())
    }

    fn recover(&self, _flag: RecoverFlag) -> Result<Vec<Xid>, XaError> {
        Ok(Vec::new())
    }

    fn forget(&self, _xid: &Xid) -> Result<(), XaError> {
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct StubComponentRegistry {
    components: DashMap<String, Arc<dyn Component>>,
}

impl ComponentRegistry for StubComponentRegistry {
    fn component(&self, name: &str) -> Option<Arc<dyn Component>> {
        self.components.get(name).map(|entry| Arc::clone(entry.value()))
    }

    fn register_component(
        &self,
        name: &str,
        component: Arc<dyn Component>,
    ) -> Result<(), ResourceError> {
        component.start()?;
        let _ = self.components.insert(name.to_owned(), component);
        Ok(())
    }
}

pub(crate) struct StubCache {
    name: String,
    configuration: TransactionConfiguration,
    handle: Option<Arc<StubXaResource>>,
    delegate: Option<Arc<dyn Cache>>,
    registry: StubComponentRegistry,
}

impl std::fmt::Debug for StubCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StubCache({})", self.name)
    }
}

impl StubCache {
    pub(crate) fn new(name: &str, configuration: TransactionConfiguration) -> Self {
        Self {
            name: name.to_owned(),
            configuration,
            handle: Some(Arc::new(StubXaResource::new())),
            delegate: None,
            registry: StubComponentRegistry::default(),
        }
    }

    /// XA-mode cache bound to a lookup that never resolves.
    pub(crate) fn transactional(name: &str) -> Self {
        Self::new(
            name,
            TransactionConfiguration::transactional(Arc::new(FailingLookup)),
        )
    }

    pub(crate) fn without_xa_resource(mut self) -> Self {
        self.handle = None;
        self
    }

    pub(crate) fn with_failing_identity(mut self) -> Self {
        self.handle = Some(Arc::new(StubXaResource {
            rm_id: ResourceManagerId::generate(),
            fail_identity: true,
        }));
        self
    }

    /// A transparent wrapper around `inner`.
    pub(crate) fn wrapping(inner: Arc<dyn Cache>) -> Self {
        Self {
            name: inner.name().to_owned(),
            configuration: TransactionConfiguration::non_transactional(),
            handle: None,
            delegate: Some(inner),
            registry: StubComponentRegistry::default(),
        }
    }

    pub(crate) fn handle(&self) -> Arc<StubXaResource> {
        Arc::clone(self.handle.as_ref().expect("stub cache has a handle"))
    }
}

impl Cache for StubCache {
    fn name(&self) -> &str {
        &self.name
    }

    fn transaction_configuration(&self) -> &TransactionConfiguration {
        &self.configuration
    }

    fn delegate(&self) -> Option<Arc<dyn Cache>> {
        self.delegate.clone()
    }

    fn xa_resource(&self) -> Option<Arc<dyn XaResource>> {
        self.handle
            .as_ref()
            .map(|handle| Arc::clone(handle) as Arc<dyn XaResource>)
    }

    fn component_registry(&self) -> &dyn ComponentRegistry {
        &self.registry
    }
}

/// Serves caches from a map; records the interruption flag seen by `cache`.
#[derive(Default)]
pub(crate) struct StubCacheManager {
    caches: DashMap<String, Arc<dyn Cache>>,
    saw_interrupted: AtomicBool,
    fail: AtomicBool,
}

impl StubCacheManager {
    pub(crate) fn with_cache(self, cache: Arc<dyn Cache>) -> Self {
        let _ = self.caches.insert(cache.name().to_owned(), cache);
        self
    }

    pub(crate) fn failing(self) -> Self {
        self.fail.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn saw_interrupted(&self) -> bool {
        self.saw_interrupted.load(Ordering::SeqCst)
    }
}

impl CacheManager for StubCacheManager {
    fn cache(&self, name: &str) -> Result<Arc<dyn Cache>, ResourceError> {
        self.saw_interrupted.store(
            xacache_types::interruption::is_interrupted(),
            Ordering::SeqCst,
        );
        if self.fail.load(Ordering::SeqCst) {
            return Err(ResourceError::illegal_state(name, "cache manager is stopping"));
        }
        self.caches
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ResourceError::illegal_state(name, "no such cache"))
    }
}

#[derive(Default)]
pub(crate) struct RecordingRegistrar {
    producers: DashMap<String, Arc<dyn XaResourceProducer>>,
    register_calls: AtomicUsize,
    unregister_calls: AtomicUsize,
    fail: bool,
}

impl RecordingRegistrar {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn unregister_calls(&self) -> usize {
        self.unregister_calls.load(Ordering::SeqCst)
    }
}

impl ResourceRegistrar for RecordingRegistrar {
    fn register(&self, producer: Arc<dyn XaResourceProducer>) -> Result<(), ResourceError> {
        let _ = self.register_calls.fetch_add(1, Ordering::SeqCst);
        let name = producer.unique_name().clone();
        if self.fail {
            return Err(ResourceError::RecoveryFailed {
                resource: name,
                detail: "recovery precheck failed".to_owned(),
            });
        }
        if self.producers.contains_key(name.as_ref()) {
            return Err(ResourceError::DuplicateName(name));
        }
        let _ = self.producers.insert(name.to_string(), producer);
        Ok(())
    }

    fn unregister(&self, unique_name: &xacache_types::UniqueName) {
        let _ = self.unregister_calls.fetch_add(1, Ordering::SeqCst);
        let _ = self.producers.remove(unique_name.as_ref());
    }

    fn get(&self, unique_name: &xacache_types::UniqueName) -> Option<Arc<dyn XaResourceProducer>> {
        self.producers
            .get(unique_name.as_ref())
            .map(|entry| Arc::clone(entry.value()))
    }

    fn producers(&self) -> Vec<Arc<dyn XaResourceProducer>> {
        self.producers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

/// Registrar that parks the first registration after recording it, until
/// the test opens the gate.
pub(crate) struct GatedRegistrar {
    inner: RecordingRegistrar,
    entered: Mutex<Option<mpsc::Sender<()>>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl GatedRegistrar {
    /// The registrar, a receiver signalled once registration is parked, and
    /// the sender that lets it continue.
    pub(crate) fn new() -> (Arc<Self>, mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let registrar = Arc::new(Self {
            inner: RecordingRegistrar::default(),
            entered: Mutex::new(Some(entered_tx)),
            release: Mutex::new(release_rx),
        });
        (registrar, entered_rx, release_tx)
    }

    pub(crate) fn unregister_calls(&self) -> usize {
        self.inner.unregister_calls()
    }
}

impl ResourceRegistrar for GatedRegistrar {
    fn register(&self, producer: Arc<dyn XaResourceProducer>) -> Result<(), ResourceError> {
        self.inner.register(producer)?;
        let entered = self.entered.lock().take();
        if let Some(entered) = entered {
            let _ = entered.send(());
            let _ = self.release.lock().recv();
        }
        Ok(())
    }

    fn unregister(&self, unique_name: &xacache_types::UniqueName) {
        self.inner.unregister(unique_name);
    }

    fn get(&self, unique_name: &xacache_types::UniqueName) -> Option<Arc<dyn XaResourceProducer>> {
        self.inner.get(unique_name)
    }

    fn producers(&self) -> Vec<Arc<dyn XaResourceProducer>> {
        self.inner.producers()
    }
}

#[derive(Debug)]
pub(crate) struct StubTransactionManager {
    id: TransactionManagerId,
}

impl StubTransactionManager {
    pub(crate) fn new() -> Self {
        Self {
            id: TransactionManagerId::generate(),
        }
    }
}

impl TransactionManager for StubTransactionManager {
    fn instance_id(&self) -> TransactionManagerId {
        self.id
    }

    fn begin(&self) -> Result<(), TransactionError> {
        Ok(())
    }

    fn commit(&self) -> Result<(), TransactionError> {
        Ok(())
    }

    fn rollback(&self) -> Result<(), TransactionError> {
        Ok(())
    }

    fn transaction(&self) -> Option<Arc<dyn Transaction>> {
        None
    }
}

/// A foreign lookup returning a fixed transaction manager.
#[derive(Debug)]
pub(crate) struct FixedLookup {
    transaction_manager: Arc<dyn TransactionManager>,
    calls: Mutex<usize>,
}

impl FixedLookup {
    pub(crate) fn new(transaction_manager: Arc<dyn TransactionManager>) -> Self {
        Self {
            transaction_manager,
            calls: Mutex::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

impl TransactionManagerLookup for FixedLookup {
    fn transaction_manager(&self) -> Result<Arc<dyn TransactionManager>, ResourceError> {
        *self.calls.lock() += 1;
        Ok(Arc::clone(&self.transaction_manager))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub(crate) struct FailingLookup;

impl TransactionManagerLookup for FailingLookup {
    fn transaction_manager(&self) -> Result<Arc<dyn TransactionManager>, ResourceError> {
        Err(ResourceError::LookupFailed("naming service unavailable".to_owned()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) fn producer_for(
    cache: Arc<StubCache>,
    registrar: Arc<RecordingRegistrar>,
) -> CacheXaResourceProducer {
    let unique_name = BridgeConfig::default()
        .unique_name(cache.name())
        .expect("valid name");
    CacheXaResourceProducer::new(unique_name, cache, registrar)
}

/// A registered producer, its canonical handle and its registrar.
pub(crate) fn initialized_producer(
    cache_name: &str,
) -> (
    CacheXaResourceProducer,
    Arc<StubXaResource>,
    Arc<RecordingRegistrar>,
) {
    let cache = Arc::new(StubCache::transactional(cache_name));
    let handle = cache.handle();
    let registrar = Arc::new(RecordingRegistrar::default());
    let producer = producer_for(cache, Arc::clone(&registrar));
    producer.initialize().expect("producer initializes");
    (producer, handle, registrar)
}
