//! Shared state of one in-memory cache and its XA adapter.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use xacache_types::{
    EndFlag, RecoverFlag, ResourceManagerId, StartFlag, Synchronization, Vote, XaError,
    XaErrorCode, XaResource, Xid,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Write {
    Put(String, String),
    Remove(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BranchState {
    Active,
    Idle,
    Prepared,
}

#[derive(Debug)]
struct Branch {
    state: BranchState,
    writes: Vec<Write>,
}

/// Committed data plus every branch the resource manager knows about.
#[derive(Debug)]
pub(crate) struct CacheStore {
    resource_manager_id: ResourceManagerId,
    data: RwLock<HashMap<String, String>>,
    branches: Mutex<HashMap<Xid, Branch>>,
    synchronized: Mutex<HashMap<Vec<u8>, Vec<Write>>>,
}

impl CacheStore {
    pub(crate) fn new() -> Self {
        Self {
            resource_manager_id: ResourceManagerId::generate(),
            data: RwLock::new(HashMap::new()),
            branches: Mutex::new(HashMap::new()),
            synchronized: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) const fn resource_manager_id(&self) -> ResourceManagerId {
        self.resource_manager_id
    }

    pub(crate) fn committed(&self, key: &str) -> Option<String> {
        self.data.read().get(key).cloned()
    }

    pub(crate) fn apply(&self, writes: Vec<Write>) {
        let mut data = self.data.write();
        for write in writes {
            match write {
                Write::Put(key, value) => {
                    let _ = data.insert(key, value);
                }
                Write::Remove(key) => {
                    let _ = data.remove(&key);
                }
            }
        }
    }

    /// Whether an active branch exists for the global transaction.
    pub(crate) fn has_active_branch(&self, global_transaction_id: &[u8]) -> bool {
        self.branches.lock().iter().any(|(xid, branch)| {
            xid.global_transaction_id() == global_transaction_id
                && branch.state == BranchState::Active
        })
    }

    /// Appends to the active branch of the global transaction.
    pub(crate) fn record_in_branch(&self, global_transaction_id: &[u8], write: Write) -> bool {
        self.branches
            .lock()
            .iter_mut()
            .find(|(xid, branch)| {
                xid.global_transaction_id() == global_transaction_id
                    && branch.state == BranchState::Active
            })
            .map(|(_, branch)| branch.writes.push(write))
            .is_some()
    }

    /// Buffers a write for a synchronization-mode transaction. Returns `true`
    /// for the first write of that transaction.
    pub(crate) fn record_synchronized(&self, global_transaction_id: &[u8], write: Write) -> bool {
        let mut synchronized = self.synchronized.lock();
        let first = !synchronized.contains_key(global_transaction_id);
        synchronized
            .entry(global_transaction_id.to_vec())
            .or_default()
            .push(write);
        first
    }

    /// Latest uncommitted value of `key` in the global transaction, if the
    /// transaction touched it. `Some(None)` means removed.
    pub(crate) fn pending(&self, global_transaction_id: &[u8], key: &str) -> Option<Option<String>> {
        let branches = self.branches.lock();
        let synchronized = self.synchronized.lock();

        let branch_writes = branches
            .iter()
            .filter(|(xid, _)| xid.global_transaction_id() == global_transaction_id)
            .flat_map(|(_, branch)| branch.writes.iter());
        let buffered = synchronized
            .get(global_transaction_id)
            .into_iter()
            .flatten();

        branch_writes
            .chain(buffered)
            .filter_map(|write| match write {
                Write::Put(written, value) if written == key => Some(Some(value.clone())),
                Write::Remove(written) if written == key => Some(None),
                _ => None,
            })
            .last()
    }

    fn take_synchronized(&self, global_transaction_id: &[u8]) -> Vec<Write> {
        self.synchronized
            .lock()
            .remove(global_transaction_id)
            .unwrap_or_default()
    }

    pub(crate) fn prepared_count(&self) -> usize {
        self.branches
            .lock()
            .values()
            .filter(|branch| branch.state == BranchState::Prepared)
            .count()
    }
}

fn unknown(xid: &Xid) -> XaError {
    XaError::new(XaErrorCode::NoTransaction, format!("unknown branch {xid}"))
}

/// XA adapter over a cache store.
///
/// The cache hands out a fresh adapter on every request; all adapters of one
/// cache report the same resource-manager identity and act on the same
/// branches.
#[derive(Debug, Clone)]
pub struct CacheXaResource {
    store: Arc<CacheStore>,
}

impl CacheXaResource {
    pub(crate) const fn new(store: Arc<CacheStore>) -> Self {
        Self { store }
    }
}

impl XaResource for CacheXaResource {
    fn resource_manager_id(&self) -> ResourceManagerId {
        self.store.resource_manager_id()
    }

    fn is_same_rm(&self, other: &dyn XaResource) -> Result<bool, XaError> {
        Ok(self.store.resource_manager_id() == other.resource_manager_id())
    }

    fn start(&self, xid: &Xid, flag: StartFlag) -> Result<(), XaError> {
        let mut branches = self.store.branches.lock();
        match flag {
            StartFlag::NoFlags => {
                if branches.contains_key(xid) {
                    return Err(XaError::new(
                        XaErrorCode::DuplicateId,
                        format!("branch {xid} already started"),
                    ));
                }
                let _ = branches.insert(
                    xid.clone(),
                    Branch {
                        state: BranchState::Active,
                        writes: Vec::new(),
                    },
                );
            }
            StartFlag::Join | StartFlag::Resume => {
                let branch = branches.get_mut(xid).ok_or_else(|| unknown(xid))?;
                if branch.state == BranchState::Prepared {
                    return Err(XaError::new(
                        XaErrorCode::Protocol,
                        format!("branch {xid} is already prepared"),
                    ));
                }
                branch.state = BranchState::Active;
            }
        }
        Ok(())
    }

    fn end(&self, xid: &Xid, _flag: EndFlag) -> Result<(), XaError> {
        let mut branches = self.store.branches.lock();
        let branch = branches.get_mut(xid).ok_or_else(|| unknown(xid))?;
        if branch.state == BranchState::Active {
            branch.state = BranchState::Idle;
        }
        Ok(())
    }

    fn prepare(&self, xid: &Xid) -> Result<Vote, XaError> {
        let mut branches = self.store.branches.lock();
        let branch = branches.get_mut(xid).ok_or_else(|| unknown(xid))?;

        if branch.writes.is_empty() {
            let _ = branches.remove(xid);
            return Ok(Vote::ReadOnly);
        }

        branch.state = BranchState::Prepared;
        Ok(Vote::Ok)
    }

    fn commit(&self, xid: &Xid, one_phase: bool) -> Result<(), XaError> {
        let writes = {
            let mut branches = self.store.branches.lock();
            let branch = branches.get(xid).ok_or_else(|| unknown(xid))?;
            if !one_phase && branch.state != BranchState::Prepared {
                return Err(XaError::new(
                    XaErrorCode::Protocol,
                    format!("two-phase commit of unprepared branch {xid}"),
                ));
            }
            branches.remove(xid).map(|branch| branch.writes).unwrap_or_default()
        };

        self.store.apply(writes);
        Ok(())
    }

    fn rollback(&self, xid: &Xid) -> Result<(), XaError> {
        self.store
            .branches
            .lock()
            .remove(xid)
            .map(|_| ())
            .ok_or_else(|| unknown(xid))
    }

    fn recover(&self, flag: RecoverFlag) -> Result<Vec<Xid>, XaError> {
        if matches!(flag, RecoverFlag::EndScan | RecoverFlag::NoFlags) {
            return Ok(Vec::new());
        }

        let mut prepared: Vec<Xid> = self
            .store
            .branches
            .lock()
            .iter()
            .filter(|(_, branch)| branch.state == BranchState::Prepared)
            .map(|(xid, _)| xid.clone())
            .collect();
        prepared.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
        Ok(prepared)
    }

    fn forget(&self, xid: &Xid) -> Result<(), XaError> {
        self.rollback(xid)
    }
}

/// Applies or discards a synchronization-mode transaction's writes.
pub(crate) struct StoreSynchronization {
    store: Arc<CacheStore>,
    global_transaction_id: Vec<u8>,
}

impl StoreSynchronization {
    pub(crate) const fn new(store: Arc<CacheStore>, global_transaction_id: Vec<u8>) -> Self {
        Self {
            store,
            global_transaction_id,
        }
    }
}

impl Synchronization for StoreSynchronization {
    fn after_completion(&self, committed: bool) {
        let writes = self.store.take_synchronized(&self.global_transaction_id);
        if committed {
            self.store.apply(writes);
        }
    }
}
