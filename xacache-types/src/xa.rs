//! XA vocabulary: transaction branch identifiers, flags and the resource contract.

use nutype::nutype;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Opaque identity of a resource manager.
///
/// Two `XaResource` handles that report the same `ResourceManagerId` talk to
/// the same resource manager even when they are distinct objects.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    AsRef,
    Display,
    Serialize,
    Deserialize
))]
pub struct ResourceManagerId(Uuid);

impl ResourceManagerId {
    /// Creates a fresh identity backed by a `UUIDv7`.
    pub fn generate() -> Self {
        Self::new(Uuid::now_v7())
    }
}

/// Identifier of one transaction branch.
///
/// Global transaction ids and branch qualifiers are limited to 64 bytes each,
/// matching the X/Open XA limits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawXid")]
pub struct Xid {
    format_id: i32,
    global_transaction_id: Vec<u8>,
    branch_qualifier: Vec<u8>,
}

/// Wire shape of [`Xid`] before its components are validated.
#[derive(Deserialize)]
struct RawXid {
    format_id: i32,
    global_transaction_id: Vec<u8>,
    branch_qualifier: Vec<u8>,
}

impl TryFrom<RawXid> for Xid {
    type Error = XaError;

    fn try_from(raw: RawXid) -> Result<Self, Self::Error> {
        Self::new(raw.format_id, raw.global_transaction_id, raw.branch_qualifier)
    }
}

impl Xid {
    /// Maximum length of the global transaction id in bytes.
    pub const MAX_GTRID_SIZE: usize = 64;
    /// Maximum length of the branch qualifier in bytes.
    pub const MAX_BQUAL_SIZE: usize = 64;

    /// Builds a branch identifier, rejecting oversized components.
    pub fn new(
        format_id: i32,
        global_transaction_id: Vec<u8>,
        branch_qualifier: Vec<u8>,
    ) -> Result<Self, XaError> {
        if global_transaction_id.is_empty() || global_transaction_id.len() > Self::MAX_GTRID_SIZE {
            return Err(XaError::new(
                XaErrorCode::InvalidArguments,
                format!(
                    "global transaction id must be 1..={} bytes, got {}",
                    Self::MAX_GTRID_SIZE,
                    global_transaction_id.len()
                ),
            ));
        }

        if branch_qualifier.len() > Self::MAX_BQUAL_SIZE {
            return Err(XaError::new(
                XaErrorCode::InvalidArguments,
                format!(
                    "branch qualifier must be at most {} bytes, got {}",
                    Self::MAX_BQUAL_SIZE,
                    branch_qualifier.len()
                ),
            ));
        }

        Ok(Self {
            format_id,
            global_transaction_id,
            branch_qualifier,
        })
    }

    /// Format identifier chosen by the transaction manager.
    pub const fn format_id(&self) -> i32 {
        self.format_id
    }

    /// Identifier shared by every branch of one global transaction.
    pub fn global_transaction_id(&self) -> &[u8] {
        &self.global_transaction_id
    }

    /// Qualifier telling this branch apart from its siblings.
    pub fn branch_qualifier(&self) -> &[u8] {
        &self.branch_qualifier
    }
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.format_id)?;
        for byte in &self.global_transaction_id {
            write!(f, "{byte:02x}")?;
        }
        f.write_str(":")?;
        for byte in &self.branch_qualifier {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// XA error classes, mirroring the `XA_*` / `XAER_*` return codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XaErrorCode {
    /// `XAER_RMERR`: the resource manager hit an error in the branch.
    RmError,
    /// `XAER_NOTA`: the XID is not known to the resource manager.
    NoTransaction,
    /// `XAER_INVAL`: invalid arguments.
    InvalidArguments,
    /// `XAER_PROTO`: routine invoked in an improper context.
    Protocol,
    /// `XA_RBROLLBACK`: the branch was rolled back.
    RolledBack,
    /// `XAER_RMFAIL`: the resource manager is unavailable.
    RmFailure,
    /// `XAER_DUPID`: the XID already exists.
    DuplicateId,
}

impl fmt::Display for XaErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RmError => write!(f, "XAER_RMERR"),
            Self::NoTransaction => write!(f, "XAER_NOTA"),
            Self::InvalidArguments => write!(f, "XAER_INVAL"),
            Self::Protocol => write!(f, "XAER_PROTO"),
            Self::RolledBack => write!(f, "XA_RBROLLBACK"),
            Self::RmFailure => write!(f, "XAER_RMFAIL"),
            Self::DuplicateId => write!(f, "XAER_DUPID"),
        }
    }
}

/// Error raised by an [`XaResource`] operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {detail}")]
pub struct XaError {
    pub code: XaErrorCode,
    pub detail: String,
}

impl XaError {
    pub fn new(code: XaErrorCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }
}

/// Flags accepted by [`XaResource::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartFlag {
    NoFlags,
    Join,
    Resume,
}

/// Flags accepted by [`XaResource::end`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndFlag {
    Success,
    Fail,
    Suspend,
}

/// Flags accepted by [`XaResource::recover`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverFlag {
    NoFlags,
    StartScan,
    EndScan,
    StartEndScan,
}

/// Outcome of a successful prepare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    /// The branch is prepared and must be committed or rolled back.
    Ok,
    /// The branch made no changes; it is already complete.
    ReadOnly,
}

/// An XA-capable resource-manager handle.
///
/// Handles are shared as `Arc<dyn XaResource>`. Identity between handles is a
/// resource-manager question answered by [`XaResource::is_same_rm`], never a
/// pointer comparison.
pub trait XaResource: Send + Sync + fmt::Debug {
    /// Identity of the resource manager behind this handle.
    fn resource_manager_id(&self) -> ResourceManagerId;

    /// Whether `other` talks to the same resource manager as `self`.
    fn is_same_rm(&self, other: &dyn XaResource) -> Result<bool, XaError>;

    fn start(&self, xid: &Xid, flag: StartFlag) -> Result<(), XaError>;

    fn end(&self, xid: &Xid, flag: EndFlag) -> Result<(), XaError>;

    fn prepare(&self, xid: &Xid) -> Result<Vote, XaError>;

    fn commit(&self, xid: &Xid, one_phase: bool) -> Result<(), XaError>;

    fn rollback(&self, xid: &Xid) -> Result<(), XaError>;

    /// Lists branches that are prepared but not yet resolved.
    fn recover(&self, flag: RecoverFlag) -> Result<Vec<Xid>, XaError>;

    fn forget(&self, xid: &Xid) -> Result<(), XaError>;
}
