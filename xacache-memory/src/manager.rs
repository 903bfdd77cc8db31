//! Cache manager owning cache lifecycles and delivering lifecycle events.

use crate::cache::{CacheError, CacheHandle, InMemoryCache};
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex, MutexGuard, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use xacache_types::{
    interruption, Cache, CacheLifecycleListener, CacheManager, CacheStartedEvent,
    CacheStoppedEvent, ResourceError, TransactionConfiguration,
};

/// How long a caller waits for a cache another thread is starting.
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(5);

enum Slot {
    Starting(Arc<CacheHandle>),
    Running(Arc<CacheHandle>),
}

/// In-memory cache manager for testing
///
/// Caches start lazily on first [`get_cache`](Self::get_cache). Starting a
/// cache runs the configured lookup's install hook, then delivers the
/// started event to every listener; the cache is running once delivery
/// completes. Until then [`CacheManager::cache`] blocks other callers, and
/// the starting thread itself, unless the calling thread is interrupted.
pub struct InMemoryCacheManager {
    this: Weak<Self>,
    configurations: DashMap<String, TransactionConfiguration>,
    slots: Mutex<HashMap<String, Slot>>,
    started: Condvar,
    listeners: RwLock<Vec<Arc<dyn CacheLifecycleListener>>>,
    start_timeout: Duration,
}

impl InMemoryCacheManager {
    /// Create a manager with the default start timeout
    pub fn new() -> Arc<Self> {
        Self::with_start_timeout(DEFAULT_START_TIMEOUT)
    }

    /// Create a manager whose blocking accessor gives up after `start_timeout`
    pub fn with_start_timeout(start_timeout: Duration) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            configurations: DashMap::new(),
            slots: Mutex::new(HashMap::new()),
            started: Condvar::new(),
            listeners: RwLock::new(Vec::new()),
            start_timeout,
        })
    }

    pub fn add_listener(&self, listener: Arc<dyn CacheLifecycleListener>) {
        self.listeners.write().push(listener);
    }

    /// Configuration used for `name` the next time it starts. Undefined
    /// caches start non-transactional.
    pub fn define_configuration(
        &self,
        name: impl Into<String>,
        configuration: TransactionConfiguration,
    ) {
        let _ = self.configurations.insert(name.into(), configuration);
    }

    pub fn is_running(&self, name: &str) -> bool {
        matches!(self.slots.lock().get(name), Some(Slot::Running(_)))
    }

    /// Names of the running caches, sorted.
    pub fn cache_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .slots
            .lock()
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Running(_)))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Returns the named cache, starting it if needed.
    pub fn get_cache(&self, name: &str) -> Result<Arc<CacheHandle>, CacheError> {
        let handle = {
            let mut slots = self.slots.lock();
            if slots.contains_key(name) {
                return self
                    .await_running(&mut slots, name)
                    .map_err(CacheError::from);
            }

            let configuration = self
                .configurations
                .get(name)
                .map(|entry| entry.value().clone())
                .unwrap_or_default();
            let handle = Arc::new(CacheHandle::new(Arc::new(InMemoryCache::new(
                name,
                configuration,
            ))));
            let _ = slots.insert(name.to_owned(), Slot::Starting(Arc::clone(&handle)));
            handle
        };

        if let Err(error) = self.start(name, &handle) {
            tracing::warn!(cache = name, %error, "cache failed to start");
            self.abort_start(name, &handle);
            return Err(error);
        }

        let _ = self
            .slots
            .lock()
            .insert(name.to_owned(), Slot::Running(Arc::clone(&handle)));
        self.started.notify_all();
        tracing::info!(cache = name, "cache started");
        Ok(handle)
    }

    /// Stops a running cache. Returns `false` if it was not running.
    pub fn stop(&self, name: &str) -> bool {
        let handle = {
            let mut slots = self.slots.lock();
            if !matches!(slots.get(name), Some(Slot::Running(_))) {
                return false;
            }
            match slots.remove(name) {
                Some(Slot::Running(handle) | Slot::Starting(handle)) => handle,
                None => return false,
            }
        };

        handle.inner().components().stop_all();
        self.deliver_stopped(name);
        tracing::info!(cache = name, "cache stopped");
        true
    }

    /// Stops every running cache.
    pub fn stop_all(&self) {
        for name in self.cache_names() {
            let _ = self.stop(&name);
        }
    }

    fn listeners(&self) -> Vec<Arc<dyn CacheLifecycleListener>> {
        self.listeners.read().clone()
    }

    fn start(&self, name: &str, handle: &Arc<CacheHandle>) -> Result<(), CacheError> {
        let cache: Arc<dyn Cache> = Arc::clone(handle) as Arc<dyn Cache>;
        if let Some(lookup) = handle.transaction_configuration().lookup() {
            lookup.install(&cache)?;
        }

        let manager = self
            .this
            .upgrade()
            .ok_or_else(|| CacheError::NotRunning(name.to_owned()))?;
        let event = CacheStartedEvent::new(name, manager as Arc<dyn CacheManager>);
        for listener in self.listeners() {
            listener.on_cache_started(&event)?;
        }
        Ok(())
    }

    fn abort_start(&self, name: &str, handle: &CacheHandle) {
        handle.inner().components().stop_all();
        self.deliver_stopped(name);
        let _ = self.slots.lock().remove(name);
        self.started.notify_all();
    }

    fn deliver_stopped(&self, name: &str) {
        let event = CacheStoppedEvent::new(name);
        for listener in self.listeners() {
            if let Err(error) = listener.on_cache_stopped(&event) {
                tracing::warn!(cache = name, %error, "listener failed on cache stop");
            }
        }
    }

    fn await_running(
        &self,
        slots: &mut MutexGuard<'_, HashMap<String, Slot>>,
        name: &str,
    ) -> Result<Arc<CacheHandle>, ResourceError> {
        let deadline = Instant::now() + self.start_timeout;
        loop {
            match slots.get(name) {
                Some(Slot::Running(handle)) => return Ok(Arc::clone(handle)),
                Some(Slot::Starting(handle)) => {
                    if interruption::is_interrupted() {
                        return Ok(Arc::clone(handle));
                    }
                    if Instant::now() >= deadline {
                        return Err(ResourceError::illegal_state(
                            name,
                            format!(
                                "cache did not finish starting within {} ms",
                                self.start_timeout.as_millis()
                            ),
                        ));
                    }
                    let _ = self.started.wait_until(slots, deadline);
                }
                None => return Err(ResourceError::illegal_state(name, "cache failed to start")),
            }
        }
    }
}

impl CacheManager for InMemoryCacheManager {
    fn cache(&self, name: &str) -> Result<Arc<dyn Cache>, ResourceError> {
        {
            let mut slots = self.slots.lock();
            if slots.contains_key(name) {
                return self
                    .await_running(&mut slots, name)
                    .map(|handle| handle as Arc<dyn Cache>);
            }
        }

        match self.get_cache(name) {
            Ok(handle) => Ok(handle as Arc<dyn Cache>),
            Err(CacheError::Resource(error)) => Err(error),
            Err(other) => Err(ResourceError::illegal_state(name, other.to_string())),
        }
    }
}

impl std::fmt::Debug for InMemoryCacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCacheManager")
            .field("running", &self.cache_names())
            .field("start_timeout", &self.start_timeout)
            .finish_non_exhaustive()
    }
}
