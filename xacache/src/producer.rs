//! The single-cache XA adapter registered with the transaction manager.

use crate::holder::CacheXaResourceHolder;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::any::{type_name, Any};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use xacache_types::{
    Cache, ConnectionOperation, ResourceError, ResourceReference, ResourceRegistrar, UniqueName,
    XaResource, XaResourceHolder, XaResourceProducer,
};

/// Provides the transaction manager with holders for one cache.
///
/// The producer is a cheap handle: clones share the same state. It captures
/// the cache's XA handle once during [`initialize`](Self::initialize),
/// registers itself with the [`ResourceRegistrar`] under its unique name and
/// guards the single recovery session the transaction manager may open on it.
#[derive(Clone)]
pub struct CacheXaResourceProducer {
    inner: Arc<ProducerState>,
}

struct ProducerState {
    unique_name: UniqueName,
    cache: Arc<dyn Cache>,
    registrar: Arc<dyn ResourceRegistrar>,
    xa_resource: OnceLock<Arc<dyn XaResource>>,
    registered: AtomicBool,
    registration: Mutex<()>,
    recovery: Mutex<Option<RecoverySession>>,
}

struct RecoverySession {
    holder: Arc<CacheXaResourceHolder>,
    opened_at: DateTime<Utc>,
}

impl CacheXaResourceProducer {
    /// Binds a producer to `cache`. Nothing is registered until
    /// [`initialize`](Self::initialize) runs.
    pub fn new(
        unique_name: UniqueName,
        cache: Arc<dyn Cache>,
        registrar: Arc<dyn ResourceRegistrar>,
    ) -> Self {
        Self {
            inner: Arc::new(ProducerState {
                unique_name,
                cache,
                registrar,
                xa_resource: OnceLock::new(),
                registered: AtomicBool::new(false),
                registration: Mutex::new(()),
                recovery: Mutex::new(None),
            }),
        }
    }

    /// Name this producer registers under.
    pub fn unique_name(&self) -> &UniqueName {
        &self.inner.unique_name
    }

    /// The concrete cache this producer is bound to.
    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.inner.cache
    }

    /// Whether the producer is currently registered with the registrar.
    pub fn is_registered(&self) -> bool {
        self.inner.registered.load(Ordering::SeqCst)
    }

    /// Whether a recovery session is open.
    pub fn is_recovering(&self) -> bool {
        self.inner.recovery.lock().is_some()
    }

    /// Captures the cache's XA handle and registers with the registrar.
    ///
    /// Runs at most once per producer. A cache without an XA handle is a
    /// configuration error, and so is any registration failure. A concurrent
    /// [`shutdown`](Self::shutdown) waits until registration has finished.
    pub fn initialize(&self) -> Result<(), ResourceError> {
        let _registration = self.inner.registration.lock();

        if self.inner.xa_resource.get().is_some() {
            return Err(ResourceError::AlreadyInitialized(self.unique_name().clone()));
        }

        let xa_resource =
            self.inner
                .cache
                .xa_resource()
                .ok_or_else(|| ResourceError::NotXaCapable {
                    resource: self.inner.cache.name().to_owned(),
                })?;

        self.inner
            .xa_resource
            .set(xa_resource)
            .map_err(|_| ResourceError::AlreadyInitialized(self.unique_name().clone()))?;

        self.inner.registrar.register(Arc::new(self.clone()))?;
        self.inner.registered.store(true, Ordering::SeqCst);

        tracing::info!(
            unique_name = %self.unique_name(),
            cache = self.inner.cache.name(),
            "registered XA resource producer"
        );
        Ok(())
    }

    /// Unregisters from the registrar if registration happened. Idempotent.
    pub fn shutdown(&self) {
        let _registration = self.inner.registration.lock();
        if self.inner.registered.swap(false, Ordering::SeqCst) {
            self.inner.registrar.unregister(self.unique_name());
            tracing::info!(unique_name = %self.unique_name(), "unregistered XA resource producer");
        }
    }

    /// Returns a holder over this producer's own handle when `candidate`
    /// belongs to the same resource manager.
    ///
    /// The comparison is by resource-manager identity, so a distinct handle
    /// object for the same cache matches. A failing comparison is an
    /// invariant violation and panics.
    pub fn recognize(&self, candidate: &dyn XaResource) -> Option<CacheXaResourceHolder> {
        let own = self.inner.xa_resource.get()?;

        match own.is_same_rm(candidate) {
            Ok(true) => Some(CacheXaResourceHolder::new(self.clone(), Arc::clone(own))),
            Ok(false) => None,
            Err(error) => panic!(
                "assertion failure: resource-manager identity comparison failed on {}: {error}",
                self.unique_name()
            ),
        }
    }

    /// Opens the recovery session, failing if one is already active.
    pub fn start_recovery(&self) -> Result<Arc<CacheXaResourceHolder>, ResourceError> {
        let mut session = self.inner.recovery.lock();

        if session.is_some() {
            return Err(ResourceError::RecoveryInProgress(self.unique_name().clone()));
        }

        let xa_resource = self
            .inner
            .xa_resource
            .get()
            .ok_or_else(|| ResourceError::NotInitialized(self.unique_name().clone()))?;

        let holder = Arc::new(CacheXaResourceHolder::new(
            self.clone(),
            Arc::clone(xa_resource),
        ));
        *session = Some(RecoverySession {
            holder: Arc::clone(&holder),
            opened_at: Utc::now(),
        });

        tracing::debug!(unique_name = %self.unique_name(), "recovery session opened");
        Ok(holder)
    }

    /// Clears the recovery session, if any.
    pub fn end_recovery(&self) {
        if let Some(session) = self.inner.recovery.lock().take() {
            tracing::debug!(
                unique_name = %session.holder.unique_name(),
                elapsed_ms = (Utc::now() - session.opened_at).num_milliseconds(),
                "recovery session closed"
            );
        }
    }

    pub(crate) fn not_connection_oriented(&self, operation: ConnectionOperation) -> ResourceError {
        ResourceError::NotConnectionOriented {
            resource: self.unique_name().clone(),
            operation,
        }
    }

    pub(crate) fn same_producer(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for CacheXaResourceProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheXaResourceProducer")
            .field("unique_name", &self.inner.unique_name)
            .field("cache", &self.inner.cache.name())
            .field("registered", &self.is_registered())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for CacheXaResourceProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a CacheXaResourceProducer with uniqueName {}", self.inner.unique_name)
    }
}

impl XaResourceProducer for CacheXaResourceProducer {
    fn unique_name(&self) -> &UniqueName {
        Self::unique_name(self)
    }

    fn find_xa_resource_holder(
        &self,
        xa_resource: &dyn XaResource,
    ) -> Option<Arc<dyn XaResourceHolder>> {
        self.recognize(xa_resource)
            .map(|holder| Arc::new(holder) as Arc<dyn XaResourceHolder>)
    }

    fn start_recovery(&self) -> Result<Arc<dyn XaResourceHolder>, ResourceError> {
        Self::start_recovery(self).map(|holder| holder as Arc<dyn XaResourceHolder>)
    }

    fn end_recovery(&self) -> Result<(), ResourceError> {
        Self::end_recovery(self);
        Ok(())
    }

    fn set_failed(&self, failed: bool) {
        // a cache has no connection that could fail; its handle stays valid
        tracing::trace!(unique_name = %self.unique_name(), failed, "ignoring set_failed");
    }

    fn create_pooled_connection(
        &self,
        _xa_factory: &dyn Any,
    ) -> Result<Arc<dyn XaResourceHolder>, ResourceError> {
        Err(self.not_connection_oriented(ConnectionOperation::CreatePooledConnection))
    }

    fn init(&self) -> Result<(), ResourceError> {
        self.initialize()
    }

    fn close(&self) {
        self.shutdown();
    }

    fn reference(&self) -> ResourceReference {
        ResourceReference::new(
            type_name::<Self>(),
            self.unique_name().clone(),
            type_name::<ResourceReference>(),
        )
    }
}
