//! Cache lifecycle listener maintaining one producer per eligible cache.

use crate::config::BridgeConfig;
use crate::eligibility::Eligibility;
use crate::interrupt::InterruptScope;
use crate::producer::CacheXaResourceProducer;
use dashmap::DashMap;
use std::sync::Arc;
use xacache_types::{
    Cache, CacheLifecycleListener, CacheStartedEvent, CacheStoppedEvent, ResourceError,
    ResourceRegistrar, TransactionManager,
};

/// Registers a producer for every eligible cache that starts and
/// unregisters it when the cache stops.
///
/// Start and stop events for different caches may arrive concurrently on
/// independent host threads; the name to producer map is sharded so that
/// unrelated caches never contend on one lock.
pub struct CacheResourceRegistrator {
    transaction_manager: Arc<dyn TransactionManager>,
    registrar: Arc<dyn ResourceRegistrar>,
    config: BridgeConfig,
    producers: DashMap<String, CacheXaResourceProducer>,
}

impl CacheResourceRegistrator {
    /// A registrator using the default `resource-` name prefix.
    pub fn new(
        transaction_manager: Arc<dyn TransactionManager>,
        registrar: Arc<dyn ResourceRegistrar>,
    ) -> Self {
        Self::with_config(transaction_manager, registrar, BridgeConfig::default())
    }

    /// A registrator that derives producer names from `config`.
    pub fn with_config(
        transaction_manager: Arc<dyn TransactionManager>,
        registrar: Arc<dyn ResourceRegistrar>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            transaction_manager,
            registrar,
            config,
            producers: DashMap::new(),
        }
    }

    /// The producer currently held for `cache_name`, if the cache was
    /// eligible and has not stopped.
    pub fn producer(&self, cache_name: &str) -> Option<CacheXaResourceProducer> {
        self.producers
            .get(cache_name)
            .map(|entry| entry.value().clone())
    }

    /// Names of the caches that currently have a producer, sorted.
    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .producers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Fetches the started cache and strips delegation wrappers.
    ///
    /// The host's accessor may wait for start delivery to finish, which is
    /// the delivery we are running inside. Marking the thread interrupted
    /// makes the accessor return without waiting.
    fn resolve_cache(event: &CacheStartedEvent) -> Result<Arc<dyn Cache>, ResourceError> {
        let resolved = {
            let _scope = InterruptScope::enter();
            event.cache_manager().cache(event.cache_name())
        }?;

        let mut cache = resolved;
        while let Some(inner) = cache.delegate() {
            cache = inner;
        }
        Ok(cache)
    }
}

impl CacheLifecycleListener for CacheResourceRegistrator {
    #[tracing::instrument(skip_all, fields(cache = %event.cache_name()))]
    fn on_cache_started(&self, event: &CacheStartedEvent) -> Result<(), ResourceError> {
        let cache = Self::resolve_cache(event)?;

        let eligibility = Eligibility::evaluate(cache.as_ref(), self.transaction_manager.as_ref())?;
        if !eligibility.is_eligible() {
            eligibility.log_skipped(event.cache_name());
            return Ok(());
        }

        let unique_name = self.config.unique_name(event.cache_name())?;
        let producer =
            CacheXaResourceProducer::new(unique_name, cache, Arc::clone(&self.registrar));

        if let Some(previous) = self
            .producers
            .insert(event.cache_name().to_owned(), producer.clone())
        {
            tracing::warn!(
                unique_name = %previous.unique_name(),
                "cache started again without a stop, discarding the previous producer"
            );
            previous.shutdown();
        }

        if let Err(error) = producer.initialize() {
            let _ = self
                .producers
                .remove_if(event.cache_name(), |_, stored| stored.same_producer(&producer));
            return Err(error);
        }

        tracing::debug!(unique_name = %producer.unique_name(), "cache registered as XA resource");
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(cache = %event.cache_name()))]
    fn on_cache_stopped(&self, event: &CacheStoppedEvent) -> Result<(), ResourceError> {
        match self.producers.remove(event.cache_name()) {
            Some((_, producer)) => {
                producer.shutdown();
                tracing::debug!(unique_name = %producer.unique_name(), "cache unregistered");
            }
            None => tracing::trace!("stopped cache was never registered"),
        }
        Ok(())
    }
}

impl std::fmt::Debug for CacheResourceRegistrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheResourceRegistrator")
            .field("transaction_manager", &self.transaction_manager.instance_id())
            .field("config", &self.config)
            .field("producers", &self.registered_names())
            .finish_non_exhaustive()
    }
}
