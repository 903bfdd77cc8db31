use crate::producer::CacheXaResourceProducer;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use xacache_types::{
    ConnectionHandle, ConnectionOperation, ResourceError, UniqueName, XaResource,
    XaResourceHolder, XaResourceProducer,
};

/// Transient view over a producer's XA handle.
///
/// A fresh holder is built for every recognition call and every recovery
/// session. It carries nothing beyond the producer and the handle, and
/// rejects every connection-lifecycle call because a cache has no
/// connections to lease, close or pool.
#[derive(Debug, Clone)]
pub struct CacheXaResourceHolder {
    producer: CacheXaResourceProducer,
    xa_resource: Arc<dyn XaResource>,
}

impl CacheXaResourceHolder {
    pub(crate) fn new(producer: CacheXaResourceProducer, xa_resource: Arc<dyn XaResource>) -> Self {
        Self {
            producer,
            xa_resource,
        }
    }

    /// Name of the producer that built this holder.
    pub fn unique_name(&self) -> &UniqueName {
        self.producer.unique_name()
    }

    /// The producer this holder belongs to.
    pub const fn cache_producer(&self) -> &CacheXaResourceProducer {
        &self.producer
    }

    fn reject<T>(&self, operation: ConnectionOperation) -> Result<T, ResourceError> {
        Err(self.producer.not_connection_oriented(operation))
    }
}

impl XaResourceHolder for CacheXaResourceHolder {
    fn xa_resource(&self) -> Arc<dyn XaResource> {
        Arc::clone(&self.xa_resource)
    }

    fn producer(&self) -> Arc<dyn XaResourceProducer> {
        Arc::new(self.producer.clone())
    }

    fn xa_resource_holders(&self) -> Result<Vec<Arc<dyn XaResourceHolder>>, ResourceError> {
        self.reject(ConnectionOperation::XaResourceHolders)
    }

    fn connection_handle(&self) -> Result<ConnectionHandle, ResourceError> {
        self.reject(ConnectionOperation::ConnectionHandle)
    }

    fn close(&self) -> Result<(), ResourceError> {
        self.reject(ConnectionOperation::Close)
    }

    fn last_release_date(&self) -> Result<DateTime<Utc>, ResourceError> {
        self.reject(ConnectionOperation::LastReleaseDate)
    }
}
