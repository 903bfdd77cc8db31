//! Thread-bound transaction manager with two-phase commit and recovery.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use uuid::Uuid;
use xacache_types::{
    EndFlag, RecoverFlag, ResourceError, ResourceRegistrar, StartFlag, Synchronization,
    Transaction, TransactionError, TransactionManager, TransactionManagerId, TransactionStatus,
    UniqueName, Vote, XaError, XaResource, XaResourceHolder, XaResourceProducer, Xid,
};

/// Format id stamped on every branch this transaction manager creates.
///
/// Recovery only resolves in-doubt branches carrying this format id.
pub const FORMAT_ID: i32 = 0x5841_4341;

type CommitLog = Mutex<HashSet<Vec<u8>>>;

#[derive(Clone)]
struct Branch {
    unique_name: UniqueName,
    xid: Xid,
    xa_resource: Arc<dyn XaResource>,
}

/// One global transaction bound to the thread that began it.
pub struct InMemoryTransaction {
    xid: Xid,
    started_at: DateTime<Utc>,
    status: Mutex<TransactionStatus>,
    branches: Mutex<Vec<Branch>>,
    synchronizations: Mutex<Vec<Arc<dyn Synchronization>>>,
    registrar: Arc<dyn ResourceRegistrar>,
}

impl InMemoryTransaction {
    fn begin(registrar: Arc<dyn ResourceRegistrar>) -> Result<Self, TransactionError> {
        Ok(Self {
            xid: Xid::new(FORMAT_ID, Uuid::now_v7().as_bytes().to_vec(), Vec::new())?,
            started_at: Utc::now(),
            status: Mutex::new(TransactionStatus::Active),
            branches: Mutex::new(Vec::new()),
            synchronizations: Mutex::new(Vec::new()),
            registrar,
        })
    }

    /// Unique names of the enlisted resources, in enlistment order.
    pub fn enlisted(&self) -> Vec<UniqueName> {
        self.branches
            .lock()
            .iter()
            .map(|branch| branch.unique_name.clone())
            .collect()
    }

    fn set_status(&self, status: TransactionStatus) {
        *self.status.lock() = status;
    }

    fn branches(&self) -> Vec<Branch> {
        self.branches.lock().clone()
    }

    fn synchronizations(&self) -> Vec<Arc<dyn Synchronization>> {
        self.synchronizations.lock().clone()
    }

    fn end_all(&self, branches: &[Branch], flag: EndFlag) -> Result<(), XaError> {
        branches
            .iter()
            .try_for_each(|branch| branch.xa_resource.end(&branch.xid, flag))
    }

    fn rolled_back(&self, reason: impl ToString) -> TransactionError {
        TransactionError::RolledBack {
            xid: self.xid.clone(),
            reason: reason.to_string(),
        }
    }

    fn commit(&self, commit_log: &CommitLog) -> Result<(), TransactionError> {
        if self.status() != TransactionStatus::Active {
            return Err(TransactionError::IllegalState(format!(
                "cannot commit transaction {} in status {:?}",
                self.xid,
                self.status()
            )));
        }

        for synchronization in self.synchronizations() {
            synchronization.before_completion();
        }

        let branches = self.branches();
        let outcome = match self.end_all(&branches, EndFlag::Success) {
            Err(error) => {
                self.rollback_branches(&branches);
                Err(self.rolled_back(error))
            }
            Ok(()) if branches.len() <= 1 => self.commit_one_phase(&branches),
            Ok(()) => self.commit_two_phase(&branches, commit_log),
        };

        let committed = matches!(outcome, Ok(()) | Err(TransactionError::HeuristicMixed { .. }));
        for synchronization in self.synchronizations() {
            synchronization.after_completion(committed);
        }
        outcome
    }

    fn commit_one_phase(&self, branches: &[Branch]) -> Result<(), TransactionError> {
        self.set_status(TransactionStatus::Committing);
        for branch in branches {
            if let Err(error) = branch.xa_resource.commit(&branch.xid, true) {
                self.set_status(TransactionStatus::RolledBack);
                return Err(self.rolled_back(error));
            }
        }
        self.set_status(TransactionStatus::Committed);
        tracing::debug!(xid = %self.xid, "transaction committed in one phase");
        Ok(())
    }

    fn commit_two_phase(
        &self,
        branches: &[Branch],
        commit_log: &CommitLog,
    ) -> Result<(), TransactionError> {
        self.set_status(TransactionStatus::Preparing);

        let mut prepared = Vec::with_capacity(branches.len());
        for branch in branches {
            match branch.xa_resource.prepare(&branch.xid) {
                Ok(Vote::Ok) => prepared.push(branch.clone()),
                Ok(Vote::ReadOnly) => {}
                Err(error) => {
                    tracing::warn!(xid = %self.xid, unique_name = %branch.unique_name, %error, "prepare failed");
                    self.rollback_branches(branches);
                    return Err(self.rolled_back(format!(
                        "{} failed to prepare: {error}",
                        branch.unique_name
                    )));
                }
            }
        }

        let _ = commit_log
            .lock()
            .insert(self.xid.global_transaction_id().to_vec());
        self.set_status(TransactionStatus::Committing);

        let failures: Vec<String> = prepared
            .iter()
            .filter_map(|branch| {
                branch
                    .xa_resource
                    .commit(&branch.xid, false)
                    .err()
                    .map(|error| format!("{}: {error}", branch.unique_name))
            })
            .collect();

        if !failures.is_empty() {
            // decision stays logged so recovery can finish the commit
            return Err(TransactionError::HeuristicMixed {
                xid: self.xid.clone(),
                reason: failures.join("; "),
            });
        }

        let _ = commit_log.lock().remove(self.xid.global_transaction_id());
        self.set_status(TransactionStatus::Committed);
        tracing::debug!(xid = %self.xid, branches = branches.len(), "transaction committed in two phases");
        Ok(())
    }

    fn rollback(&self) {
        let branches = self.branches();
        let _ = self.end_all(&branches, EndFlag::Fail);
        self.rollback_branches(&branches);
        for synchronization in self.synchronizations() {
            synchronization.after_completion(false);
        }
    }

    fn rollback_branches(&self, branches: &[Branch]) {
        self.set_status(TransactionStatus::RollingBack);
        for branch in branches {
            if let Err(error) = branch.xa_resource.rollback(&branch.xid) {
                tracing::debug!(xid = %branch.xid, %error, "branch rollback reported an error");
            }
        }
        self.set_status(TransactionStatus::RolledBack);
        tracing::debug!(xid = %self.xid, "transaction rolled back");
    }

    /// Prepares every branch and stops, as if the process died after phase one.
    fn prepare_only(&self) -> Result<(), TransactionError> {
        let branches = self.branches();
        self.end_all(&branches, EndFlag::Success)?;
        self.set_status(TransactionStatus::Preparing);
        for branch in &branches {
            let _ = branch.xa_resource.prepare(&branch.xid)?;
        }
        Ok(())
    }
}

impl Transaction for InMemoryTransaction {
    fn xid(&self) -> &Xid {
        &self.xid
    }

    fn status(&self) -> TransactionStatus {
        *self.status.lock()
    }

    fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    fn enlist_resource(&self, xa_resource: Arc<dyn XaResource>) -> Result<(), TransactionError> {
        if self.status() != TransactionStatus::Active {
            return Err(TransactionError::IllegalState(format!(
                "cannot enlist in transaction {} in status {:?}",
                self.xid,
                self.status()
            )));
        }

        let holder = self
            .registrar
            .find_xa_resource_holder(xa_resource.as_ref())
            .ok_or_else(|| {
                TransactionError::UnknownResource(xa_resource.resource_manager_id().to_string())
            })?;
        let unique_name = holder.producer().unique_name().clone();

        let mut branches = self.branches.lock();
        if branches.iter().any(|branch| branch.unique_name == unique_name) {
            return Ok(());
        }

        let qualifier = u32::try_from(branches.len() + 1)
            .map_err(|_| TransactionError::IllegalState("too many branches".to_owned()))?;
        let branch = Branch {
            xid: Xid::new(
                FORMAT_ID,
                self.xid.global_transaction_id().to_vec(),
                qualifier.to_be_bytes().to_vec(),
            )?,
            xa_resource: holder.xa_resource(),
            unique_name,
        };
        branch.xa_resource.start(&branch.xid, StartFlag::NoFlags)?;

        tracing::debug!(xid = %branch.xid, unique_name = %branch.unique_name, "resource enlisted");
        branches.push(branch);
        Ok(())
    }

    fn register_synchronization(
        &self,
        synchronization: Arc<dyn Synchronization>,
    ) -> Result<(), TransactionError> {
        if self.status() != TransactionStatus::Active {
            return Err(TransactionError::IllegalState(format!(
                "cannot register a synchronization with transaction {} in status {:?}",
                self.xid,
                self.status()
            )));
        }
        self.synchronizations.lock().push(synchronization);
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTransaction")
            .field("xid", &self.xid)
            .field("status", &self.status())
            .field("enlisted", &self.enlisted())
            .finish_non_exhaustive()
    }
}

/// Outcome of one recovery sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// In-doubt branches committed because their commit decision was logged.
    pub committed: Vec<Xid>,
    /// In-doubt branches rolled back under presumed abort.
    pub rolled_back: Vec<Xid>,
    /// Resources whose sweep failed, with the reason.
    pub failures: Vec<(UniqueName, String)>,
}

impl RecoveryReport {
    /// Whether the sweep found nothing to resolve and hit no failure.
    pub fn is_clean(&self) -> bool {
        self.committed.is_empty() && self.rolled_back.is_empty() && self.failures.is_empty()
    }
}

/// In-memory transaction manager for testing
///
/// Each thread has at most one transaction. XA resources are enlisted by
/// asking the registrar which producer recognizes them.
pub struct InMemoryTransactionManager {
    id: TransactionManagerId,
    registrar: Arc<dyn ResourceRegistrar>,
    transactions: DashMap<ThreadId, Arc<InMemoryTransaction>>,
    commit_log: CommitLog,
}

impl InMemoryTransactionManager {
    /// Create a transaction manager enlisting resources through `registrar`
    pub fn new(registrar: Arc<dyn ResourceRegistrar>) -> Self {
        Self {
            id: TransactionManagerId::generate(),
            registrar,
            transactions: DashMap::new(),
            commit_log: Mutex::new(HashSet::new()),
        }
    }

    pub fn registrar(&self) -> &Arc<dyn ResourceRegistrar> {
        &self.registrar
    }

    /// The current thread's transaction with its concrete type.
    pub fn current(&self) -> Option<Arc<InMemoryTransaction>> {
        self.transactions
            .get(&thread::current().id())
            .map(|entry| Arc::clone(entry.value()))
    }

    fn detach(&self) -> Result<Arc<InMemoryTransaction>, TransactionError> {
        self.transactions
            .remove(&thread::current().id())
            .map(|(_, transaction)| transaction)
            .ok_or(TransactionError::NoTransaction)
    }

    /// Prepares the current transaction and abandons it without a second
    /// phase, leaving its branches in doubt.
    ///
    /// With `log_decision` the commit decision is recorded first, so the
    /// next [`recover`](Self::recover) commits the branches; without it they
    /// are rolled back.
    pub fn abandon_after_prepare(&self, log_decision: bool) -> Result<Xid, TransactionError> {
        let transaction = self.detach()?;
        transaction.prepare_only()?;
        if log_decision {
            let _ = self
                .commit_log
                .lock()
                .insert(transaction.xid.global_transaction_id().to_vec());
        }
        tracing::warn!(xid = %transaction.xid, log_decision, "transaction abandoned in doubt");
        Ok(transaction.xid.clone())
    }

    /// Sweeps every registered producer and resolves in-doubt branches.
    ///
    /// Branches whose commit decision was logged are committed; all others
    /// are rolled back. A failing producer is reported and does not stop the
    /// sweep. Logged decisions are forgotten only after a sweep in which
    /// every producer was resolved.
    #[tracing::instrument(skip(self), fields(transaction_manager = %self.id))]
    pub fn recover(&self) -> RecoveryReport {
        let mut report = RecoveryReport::default();

        for producer in self.registrar.producers() {
            if let Err(error) = self.recover_producer(producer.as_ref(), &mut report) {
                tracing::warn!(unique_name = %producer.unique_name(), %error, "recovery failed");
                report
                    .failures
                    .push((producer.unique_name().clone(), error.to_string()));
            }
        }

        // decisions stay logged while any producer is unresolved
        if report.failures.is_empty() {
            let mut commit_log = self.commit_log.lock();
            for xid in &report.committed {
                let _ = commit_log.remove(xid.global_transaction_id());
            }
        }

        tracing::info!(
            committed = report.committed.len(),
            rolled_back = report.rolled_back.len(),
            failures = report.failures.len(),
            "recovery sweep finished"
        );
        report
    }

    fn recover_producer(
        &self,
        producer: &dyn XaResourceProducer,
        report: &mut RecoveryReport,
    ) -> Result<(), ResourceError> {
        let holder = producer.start_recovery()?;
        let resolved = self.resolve_in_doubt(holder.as_ref(), report);
        let ended = producer.end_recovery();
        resolved?;
        ended
    }

    fn resolve_in_doubt(
        &self,
        holder: &dyn XaResourceHolder,
        report: &mut RecoveryReport,
    ) -> Result<(), ResourceError> {
        let xa_resource = holder.xa_resource();

        for xid in xa_resource.recover(RecoverFlag::StartEndScan)? {
            if xid.format_id() != FORMAT_ID {
                continue;
            }

            let decided = self
                .commit_log
                .lock()
                .contains(xid.global_transaction_id());
            if decided {
                xa_resource.commit(&xid, false)?;
                report.committed.push(xid);
            } else {
                xa_resource.rollback(&xid)?;
                report.rolled_back.push(xid);
            }
        }
        Ok(())
    }
}

impl TransactionManager for InMemoryTransactionManager {
    fn instance_id(&self) -> TransactionManagerId {
        self.id
    }

    fn begin(&self) -> Result<(), TransactionError> {
        let thread = thread::current().id();
        if self.transactions.contains_key(&thread) {
            return Err(TransactionError::AlreadyActive);
        }

        let transaction = Arc::new(InMemoryTransaction::begin(Arc::clone(&self.registrar))?);
        tracing::debug!(xid = %transaction.xid, "transaction started");
        let _ = self.transactions.insert(thread, transaction);
        Ok(())
    }

    fn commit(&self) -> Result<(), TransactionError> {
        self.detach()?.commit(&self.commit_log)
    }

    fn rollback(&self) -> Result<(), TransactionError> {
        self.detach()?.rollback();
        Ok(())
    }

    fn transaction(&self) -> Option<Arc<dyn Transaction>> {
        self.current()
            .map(|transaction| transaction as Arc<dyn Transaction>)
    }
}

impl std::fmt::Debug for InMemoryTransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTransactionManager")
            .field("id", &self.id)
            .field("active", &self.transactions.len())
            .finish_non_exhaustive()
    }
}
