//! Transaction-manager lookup handed to caches.
//!
//! Configuring a cache with [`BridgeTransactionManagerLookup`] makes the
//! cache's own XA code path use the bridged transaction manager. The lookup
//! can additionally wire a producer into the cache's component registry, so
//! that registration follows the cache's own start/stop without a lifecycle
//! listener.

use crate::config::BridgeConfig;
use crate::eligibility::Eligibility;
use crate::producer::CacheXaResourceProducer;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use xacache_types::{
    services, Cache, Component, ResourceError, ResourceRegistrar, TransactionManager,
    TransactionManagerLookup,
};

/// Component-registry key the producer is wired under.
pub const PRODUCER_COMPONENT: &str = "xa-resource-producer";

/// Resolves the bridged transaction manager for a cache.
///
/// Two modes:
/// - a direct binding supplied with [`new`](Self::new), preferred
/// - a fallback to the process-wide [`services`] slot when built with
///   [`from_services`](Self::from_services)
#[derive(Clone, Default)]
pub struct BridgeTransactionManagerLookup {
    binding: Option<Arc<dyn TransactionManager>>,
    producer_wiring: Option<ProducerWiring>,
}

#[derive(Clone)]
struct ProducerWiring {
    registrar: Arc<dyn ResourceRegistrar>,
    config: BridgeConfig,
}

impl BridgeTransactionManagerLookup {
    /// Binds the lookup directly to `transaction_manager`.
    pub fn new(transaction_manager: Arc<dyn TransactionManager>) -> Self {
        Self {
            binding: Some(transaction_manager),
            producer_wiring: None,
        }
    }

    /// Resolves the transaction manager from process-wide services on every
    /// call.
    pub fn from_services() -> Self {
        Self::default()
    }

    /// Ensures a producer component exists for every cache started with this
    /// lookup.
    #[must_use]
    pub fn with_producer_component(
        mut self,
        registrar: Arc<dyn ResourceRegistrar>,
        config: BridgeConfig,
    ) -> Self {
        self.producer_wiring = Some(ProducerWiring { registrar, config });
        self
    }

    /// Returns the producer wired into `cache`'s component registry, creating
    /// and registering it if absent.
    ///
    /// A component under [`PRODUCER_COMPONENT`] that is not a producer, or a
    /// lookup without producer wiring, is a configuration error.
    pub fn ensure_producer_component(
        &self,
        cache: &Arc<dyn Cache>,
    ) -> Result<CacheXaResourceProducer, ResourceError> {
        let unavailable = || ResourceError::ComponentUnavailable {
            cache: cache.name().to_owned(),
            component: PRODUCER_COMPONENT.to_owned(),
        };

        let wiring = self.producer_wiring.as_ref().ok_or_else(unavailable)?;
        let registry = cache.component_registry();

        if let Some(existing) = registry.component(PRODUCER_COMPONENT) {
            return existing
                .as_any()
                .downcast_ref::<ProducerComponent>()
                .map(|component| component.producer.clone())
                .ok_or_else(unavailable);
        }

        let mut concrete = Arc::clone(cache);
        while let Some(inner) = concrete.delegate() {
            concrete = inner;
        }

        let component = Arc::new(ProducerComponent {
            producer: CacheXaResourceProducer::new(
                wiring.config.unique_name(cache.name())?,
                concrete,
                Arc::clone(&wiring.registrar),
            ),
            transaction_manager: self.transaction_manager()?,
        });

        registry.register_component(PRODUCER_COMPONENT, component.clone())?;
        tracing::debug!(cache = cache.name(), "wired XA resource producer component");
        Ok(component.producer.clone())
    }
}

impl TransactionManagerLookup for BridgeTransactionManagerLookup {
    fn transaction_manager(&self) -> Result<Arc<dyn TransactionManager>, ResourceError> {
        if let Some(transaction_manager) = &self.binding {
            return Ok(Arc::clone(transaction_manager));
        }

        services::transaction_manager().ok_or_else(|| {
            ResourceError::LookupFailed(
                "no transaction manager is installed in process-wide services".to_owned(),
            )
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn install(&self, cache: &Arc<dyn Cache>) -> Result<(), ResourceError> {
        if self.producer_wiring.is_none() {
            return Ok(());
        }
        self.ensure_producer_component(cache).map(|_| ())
    }
}

impl fmt::Debug for BridgeTransactionManagerLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeTransactionManagerLookup")
            .field(
                "binding",
                &self.binding.as_ref().map(|tm| tm.instance_id()),
            )
            .field("wires_producer", &self.producer_wiring.is_some())
            .finish()
    }
}

/// A producer living in a cache's component registry.
///
/// Starting the component checks eligibility and initializes the producer
/// only when the cache qualifies; stopping it shuts the producer down.
pub struct ProducerComponent {
    producer: CacheXaResourceProducer,
    transaction_manager: Arc<dyn TransactionManager>,
}

impl ProducerComponent {
    /// The producer this component starts and stops.
    pub const fn producer(&self) -> &CacheXaResourceProducer {
        &self.producer
    }
}

impl Component for ProducerComponent {
    fn start(&self) -> Result<(), ResourceError> {
        let cache = self.producer.cache();
        let eligibility = Eligibility::evaluate(cache.as_ref(), self.transaction_manager.as_ref())?;

        if !eligibility.is_eligible() {
            eligibility.log_skipped(cache.name());
            return Ok(());
        }

        self.producer.initialize()
    }

    fn stop(&self) {
        self.producer.shutdown();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
