//! Contracts the transaction manager consumes: producers, holders and the
//! process-wide registrar they are registered into.

use crate::errors::ResourceError;
use crate::names::UniqueName;
use crate::xa::XaResource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Opaque connection handle handed out by connection-oriented resources.
pub type ConnectionHandle = Box<dyn Any + Send>;

/// Identifies a connection-oriented operation.
///
/// Used by `ResourceError::NotConnectionOriented` to name exactly which call
/// was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionOperation {
    /// Creating a pooled connection for a connection pool.
    CreatePooledConnection,
    /// Leasing a connection handle from a holder.
    ConnectionHandle,
    /// Closing a holder's connection.
    Close,
    /// Listing the holders nested under a pooled connection.
    XaResourceHolders,
    /// Asking when a pooled connection was last released.
    LastReleaseDate,
}

impl ConnectionOperation {
    /// Every connection-oriented operation, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::CreatePooledConnection,
        Self::ConnectionHandle,
        Self::Close,
        Self::XaResourceHolders,
        Self::LastReleaseDate,
    ];
}

impl fmt::Display for ConnectionOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreatePooledConnection => write!(f, "create_pooled_connection"),
            Self::ConnectionHandle => write!(f, "connection_handle"),
            Self::Close => write!(f, "close"),
            Self::XaResourceHolders => write!(f, "xa_resource_holders"),
            Self::LastReleaseDate => write!(f, "last_release_date"),
        }
    }
}

/// A view over one XA handle, handed to the transaction manager.
///
/// The connection-lifecycle methods exist for connection-pooled resources;
/// implementations without connections must reject them with
/// `ResourceError::NotConnectionOriented`.
pub trait XaResourceHolder: Send + Sync + fmt::Debug {
    /// The XA handle operations for this holder must be issued against.
    fn xa_resource(&self) -> Arc<dyn XaResource>;

    /// The producer this holder was created by.
    fn producer(&self) -> Arc<dyn XaResourceProducer>;

    fn xa_resource_holders(&self) -> Result<Vec<Arc<dyn XaResourceHolder>>, ResourceError>;

    fn connection_handle(&self) -> Result<ConnectionHandle, ResourceError>;

    fn close(&self) -> Result<(), ResourceError>;

    fn last_release_date(&self) -> Result<DateTime<Utc>, ResourceError>;
}

/// The unit a transaction manager knows a resource by.
///
/// A producer is registered under its unique name, recognizes XA handles that
/// belong to its resource manager, and hands out holders for recovery scans.
pub trait XaResourceProducer: Send + Sync + fmt::Debug {
    fn unique_name(&self) -> &UniqueName;

    /// Returns a holder if `xa_resource` belongs to this producer's resource
    /// manager.
    fn find_xa_resource_holder(
        &self,
        xa_resource: &dyn XaResource,
    ) -> Option<Arc<dyn XaResourceHolder>>;

    /// Opens a recovery session. At most one session may be active.
    fn start_recovery(&self) -> Result<Arc<dyn XaResourceHolder>, ResourceError>;

    /// Closes the active recovery session, if any.
    fn end_recovery(&self) -> Result<(), ResourceError>;

    fn set_failed(&self, failed: bool);

    fn create_pooled_connection(
        &self,
        xa_factory: &dyn Any,
    ) -> Result<Arc<dyn XaResourceHolder>, ResourceError>;

    fn init(&self) -> Result<(), ResourceError>;

    fn close(&self);

    /// Naming descriptor from which this producer can be reconstructed.
    fn reference(&self) -> ResourceReference;
}

/// Process-wide directory of producers.
///
/// The registrar is the single source of truth for name uniqueness.
pub trait ResourceRegistrar: Send + Sync {
    /// Registers `producer` under its unique name.
    ///
    /// Fails with `ResourceError::DuplicateName` on a collision and with
    /// `ResourceError::RecoveryFailed` when the registration-time recovery
    /// precheck fails.
    fn register(&self, producer: Arc<dyn XaResourceProducer>) -> Result<(), ResourceError>;

    fn unregister(&self, unique_name: &UniqueName);

    fn get(&self, unique_name: &UniqueName) -> Option<Arc<dyn XaResourceProducer>>;

    fn producers(&self) -> Vec<Arc<dyn XaResourceProducer>>;

    /// Asks every registered producer to recognize `xa_resource`.
    fn find_xa_resource_holder(
        &self,
        xa_resource: &dyn XaResource,
    ) -> Option<Arc<dyn XaResourceHolder>> {
        self.producers()
            .iter()
            .find_map(|producer| producer.find_xa_resource_holder(xa_resource))
    }
}

/// Naming-service descriptor for a producer.
///
/// Carries the producer's type, its unique name as the single address, and
/// the factory that resolves it. Serializes to the shape naming services
/// persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceReference {
    class_name: String,
    unique_name: UniqueName,
    factory_class_name: String,
}

impl ResourceReference {
    pub fn new(
        class_name: impl Into<String>,
        unique_name: UniqueName,
        factory_class_name: impl Into<String>,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            unique_name,
            factory_class_name: factory_class_name.into(),
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub const fn unique_name(&self) -> &UniqueName {
        &self.unique_name
    }

    pub fn factory_class_name(&self) -> &str {
        &self.factory_class_name
    }

    /// Reconstructs the producer from its unique name alone.
    pub fn resolve(
        &self,
        registrar: &dyn ResourceRegistrar,
    ) -> Result<Arc<dyn XaResourceProducer>, ResourceError> {
        registrar
            .get(&self.unique_name)
            .ok_or_else(|| ResourceError::NotRegistered(self.unique_name.clone()))
    }
}
