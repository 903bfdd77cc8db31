use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use xacache_types::{
    RecoverFlag, ResourceError, ResourceRegistrar, UniqueName, XaResourceProducer,
};

/// Thread-safe in-memory resource directory.
///
/// Every registration runs a recovery precheck: the producer must open a
/// recovery session, answer a full recover scan and close the session again.
/// Producers that fail the precheck are not registered.
#[derive(Default)]
pub struct InMemoryResourceRegistrar {
    producers: DashMap<UniqueName, Arc<dyn XaResourceProducer>>,
}

impl InMemoryResourceRegistrar {
    /// Create a new empty registrar
    pub fn new() -> Self {
        Self::default()
    }

    /// Unique names of all registered producers, sorted.
    pub fn unique_names(&self) -> Vec<UniqueName> {
        let mut names: Vec<UniqueName> = self
            .producers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn is_registered(&self, unique_name: &str) -> bool {
        UniqueName::try_new(unique_name)
            .map(|name| self.producers.contains_key(&name))
            .unwrap_or(false)
    }

    /// Returns the number of in-doubt branches the producer reported.
    fn recovery_precheck(producer: &dyn XaResourceProducer) -> Result<usize, ResourceError> {
        let holder = producer.start_recovery()?;
        let scanned = holder.xa_resource().recover(RecoverFlag::StartEndScan);
        let ended = producer.end_recovery();

        let in_doubt = scanned?;
        ended?;
        Ok(in_doubt.len())
    }
}

impl ResourceRegistrar for InMemoryResourceRegistrar {
    fn register(&self, producer: Arc<dyn XaResourceProducer>) -> Result<(), ResourceError> {
        let unique_name = producer.unique_name().clone();

        if self.producers.contains_key(&unique_name) {
            return Err(ResourceError::DuplicateName(unique_name));
        }

        let in_doubt = Self::recovery_precheck(producer.as_ref()).map_err(|error| {
            ResourceError::RecoveryFailed {
                resource: unique_name.clone(),
                detail: error.to_string(),
            }
        })?;

        match self.producers.entry(unique_name.clone()) {
            Entry::Occupied(_) => Err(ResourceError::DuplicateName(unique_name)),
            Entry::Vacant(slot) => {
                let _ = slot.insert(producer);
                tracing::debug!(unique_name = %unique_name, in_doubt, "resource registered");
                Ok(())
            }
        }
    }

    fn unregister(&self, unique_name: &UniqueName) {
        if self.producers.remove(unique_name).is_some() {
            tracing::debug!(unique_name = %unique_name, "resource unregistered");
        } else {
            tracing::trace!(unique_name = %unique_name, "unregister of unknown resource ignored");
        }
    }

    fn get(&self, unique_name: &UniqueName) -> Option<Arc<dyn XaResourceProducer>> {
        self.producers
            .get(unique_name)
            .map(|entry| Arc::clone(entry.value()))
    }

    fn producers(&self) -> Vec<Arc<dyn XaResourceProducer>> {
        self.producers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

impl std::fmt::Debug for InMemoryResourceRegistrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryResourceRegistrar")
            .field("producers", &self.unique_names())
            .finish()
    }
}
