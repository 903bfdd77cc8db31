//! Scripted producer used by the unit tests of this crate.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use xacache_types::{
    ConnectionHandle, ConnectionOperation, EndFlag, RecoverFlag, ResourceError, ResourceManagerId,
    ResourceReference, StartFlag, UniqueName, Vote, XaError, XaErrorCode, XaResource,
    XaResourceHolder, XaResourceProducer, Xid,
};

#[derive(Debug, Default)]
struct Script {
    log: Mutex<Vec<String>>,
    in_doubt: Mutex<Vec<Xid>>,
    fail_prepare: AtomicBool,
    fail_scan: AtomicBool,
}

#[derive(Debug, Clone)]
pub(crate) struct FakeXa {
    rm_id: ResourceManagerId,
    script: Arc<Script>,
}

impl FakeXa {
    fn record(&self, entry: &str) {
        self.script.log.lock().push(entry.to_owned());
    }
}

impl XaResource for FakeXa {
    fn resource_manager_id(&self) -> ResourceManagerId {
        self.rm_id
    }

    fn is_same_rm(&self, other: &dyn XaResource) -> Result<bool, XaError> {
        Ok(self.rm_id == other.resource_manager_id())
    }

    fn start(&self, _xid: &Xid, _flag: StartFlag) -> Result<(), XaError> {
        self.record("start");
        Ok(())
    }

    fn end(&self, _xid: &Xid, _flag: EndFlag) -> Result<(), XaError> {
        self.record("end");
        Ok(())
    }

    fn prepare(&self, _xid: &Xid) -> Result<Vote, XaError> {
        self.record("prepare");
        if self.script.fail_prepare.load(Ordering::SeqCst) {
            return Err(XaError::new(XaErrorCode::RmError, "prepare refused"));
        }
        Ok(Vote::Ok)
    }

    fn commit(&self, _xid: &Xid, one_phase: bool) -> Result<(), XaError> {
        self.record(if one_phase { "commit(one_phase)" } else { "commit" });
        Ok(())
    }

    fn rollback(&self, _xid: &Xid) -> Result<(), XaError> {
        self.record("rollback");
        Ok(())
    }

    fn recover(&self, _flag: RecoverFlag) -> Result<Vec<Xid>, XaError> {
        if self.script.fail_scan.load(Ordering::SeqCst) {
            return Err(XaError::new(XaErrorCode::RmFailure, "scan failed"));
        }
        Ok(self.script.in_doubt.lock().clone())
    }

    fn forget(&self, _xid: &Xid) -> Result<(), XaError> {
        Ok(())
    }
}

#[derive(Debug)]
struct FakeState {
    unique_name: UniqueName,
    xa: FakeXa,
    refuse_recovery: bool,
    recovering: AtomicBool,
    recovery_starts: AtomicUsize,
    recovery_ends: AtomicUsize,
}

#[derive(Debug, Clone)]
pub(crate) struct FakeProducer {
    state: Arc<FakeState>,
}

impl FakeProducer {
    pub(crate) fn new(unique_name: &str) -> Self {
        Self {
            state: Arc::new(FakeState {
                unique_name: UniqueName::try_new(unique_name).expect("valid unique name"),
                xa: FakeXa {
                    rm_id: ResourceManagerId::generate(),
                    script: Arc::new(Script::default()),
                },
                refuse_recovery: false,
                recovering: AtomicBool::new(false),
                recovery_starts: AtomicUsize::new(0),
                recovery_ends: AtomicUsize::new(0),
            }),
        }
    }

    fn rebuild(self, refuse_recovery: bool) -> Self {
        Self {
            state: Arc::new(FakeState {
                unique_name: self.state.unique_name.clone(),
                xa: self.state.xa.clone(),
                refuse_recovery,
                recovering: AtomicBool::new(false),
                recovery_starts: AtomicUsize::new(0),
                recovery_ends: AtomicUsize::new(0),
            }),
        }
    }

    pub(crate) fn refusing_recovery(self) -> Self {
        self.rebuild(true)
    }

    pub(crate) fn failing_scan(self) -> Self {
        self.fail_scans();
        self
    }

    pub(crate) fn failing_prepare(self) -> Self {
        self.state.xa.script.fail_prepare.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn fail_scans(&self) {
        self.state.xa.script.fail_scan.store(true, Ordering::SeqCst);
    }

    pub(crate) fn set_in_doubt(&self, xids: Vec<Xid>) {
        *self.state.xa.script.in_doubt.lock() = xids;
    }

    /// A distinct handle object for this producer's resource manager.
    pub(crate) fn xa_resource(&self) -> Arc<dyn XaResource> {
        Arc::new(self.state.xa.clone())
    }

    pub(crate) fn log(&self) -> Vec<String> {
        self.state.xa.script.log.lock().clone()
    }

    pub(crate) fn is_recovering(&self) -> bool {
        self.state.recovering.load(Ordering::SeqCst)
    }

    pub(crate) fn recovery_starts(&self) -> usize {
        self.state.recovery_starts.load(Ordering::SeqCst)
    }

    pub(crate) fn recovery_ends(&self) -> usize {
        self.state.recovery_ends.load(Ordering::SeqCst)
    }

    fn holder(&self) -> Arc<dyn XaResourceHolder> {
        Arc::new(FakeHolder {
            producer: self.clone(),
        })
    }

    fn rejected(&self, operation: ConnectionOperation) -> ResourceError {
        ResourceError::NotConnectionOriented {
            resource: self.state.unique_name.clone(),
            operation,
        }
    }
}

impl XaResourceProducer for FakeProducer {
    fn unique_name(&self) -> &UniqueName {
        &self.state.unique_name
    }

    fn find_xa_resource_holder(
        &self,
        xa_resource: &dyn XaResource,
    ) -> Option<Arc<dyn XaResourceHolder>> {
        (xa_resource.resource_manager_id() == self.state.xa.rm_id).then(|| self.holder())
    }

    fn start_recovery(&self) -> Result<Arc<dyn XaResourceHolder>, ResourceError> {
        let _ = self.state.recovery_starts.fetch_add(1, Ordering::SeqCst);
        if self.state.refuse_recovery || self.state.recovering.swap(true, Ordering::SeqCst) {
            return Err(ResourceError::RecoveryInProgress(
                self.state.unique_name.clone(),
            ));
        }
        Ok(self.holder())
    }

    fn end_recovery(&self) -> Result<(), ResourceError> {
        let _ = self.state.recovery_ends.fetch_add(1, Ordering::SeqCst);
        self.state.recovering.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn set_failed(&self, _failed: bool) {}

    fn create_pooled_connection(
        &self,
        _xa_factory: &dyn Any,
    ) -> Result<Arc<dyn XaResourceHolder>, ResourceError> {
        Err(self.rejected(ConnectionOperation::CreatePooledConnection))
    }

    fn init(&self) -> Result<(), ResourceError> {
        Ok(())
    }

    fn close(&self) {}

    fn reference(&self) -> ResourceReference {
        ResourceReference::new("FakeProducer", self.state.unique_name.clone(), "FakeFactory")
    }
}

#[derive(Debug)]
struct FakeHolder {
    producer: FakeProducer,
}

impl XaResourceHolder for FakeHolder {
    fn xa_resource(&self) -> Arc<dyn XaResource> {
        self.producer.xa_resource()
    }

    fn producer(&self) -> Arc<dyn XaResourceProducer> {
        Arc::new(self.producer.clone())
    }

    fn xa_resource_holders(&self) -> Result<Vec<Arc<dyn XaResourceHolder>>, ResourceError> {
        Err(self.producer.rejected(ConnectionOperation::XaResourceHolders))
    }

    fn connection_handle(&self) -> Result<ConnectionHandle, ResourceError> {
        Err(self.producer.rejected(ConnectionOperation::ConnectionHandle))
    }

    fn close(&self) -> Result<(), ResourceError> {
        Err(self.producer.rejected(ConnectionOperation::Close))
    }

    fn last_release_date(&self) -> Result<DateTime<Utc>, ResourceError> {
        Err(self.producer.rejected(ConnectionOperation::LastReleaseDate))
    }
}
