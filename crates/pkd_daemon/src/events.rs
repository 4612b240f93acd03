//! Events flowing out of the backend, transactions and the engine.
//!
//! ```text
//! worker ──BackendEvent──► main loop ──TransactionSignal──► transaction subscribers
//!                                    └─DaemonSignal───────► daemon subscribers
//! ```

use pkd_core::{
    Category, Details, DistroUpgrade, ErrorCode, EulaRequest, Exit, FilesItem, LedgerRecord,
    MessageKind, NetworkState, PackageItem, RepoDetail, RepoSignatureRequest, RestartRequest,
    Status, UpdateDetail,
};
use serde::Serialize;

/// Percentage value meaning "unknown".
pub const PERCENTAGE_INVALID: u32 = 101;

/// Percentage value before anything was reported. Reported as
/// [`PERCENTAGE_INVALID`].
pub const PERCENTAGE_DEFAULT: u32 = 102;

/// A progress snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    /// Overall percentage, or [`PERCENTAGE_INVALID`].
    pub percentage: u32,
    /// Percentage of the current step, or [`PERCENTAGE_INVALID`].
    pub subpercentage: u32,
    /// Seconds since the run started.
    pub elapsed: u32,
    /// Estimated seconds left, zero if unknown.
    pub remaining: u32,
}

impl Progress {
    /// Progress before anything is known.
    pub const UNKNOWN: Progress = Progress {
        percentage: PERCENTAGE_INVALID,
        subpercentage: PERCENTAGE_INVALID,
        elapsed: 0,
        remaining: 0,
    };
}

impl Default for Progress {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

/// What a backend emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum BackendEventKind {
    /// Status changed.
    StatusChanged(Status),
    /// Progress changed.
    Progress(Progress),
    /// A package result.
    Package(PackageItem),
    /// Package details.
    Details(Details),
    /// Package file list.
    Files(FilesItem),
    /// Update description.
    UpdateDetail(UpdateDetail),
    /// Distribution upgrade.
    DistroUpgrade(DistroUpgrade),
    /// Repository.
    RepoDetail(RepoDetail),
    /// Category.
    Category(Category),
    /// Informational message.
    Message {
        /// Kind.
        kind: MessageKind,
        /// Text.
        details: String,
    },
    /// Restart requirement.
    RequireRestart(RestartRequest),
    /// A key must be trusted.
    RepoSignatureRequired(RepoSignatureRequest),
    /// A license must be accepted.
    EulaRequired(EulaRequest),
    /// Whether cancelling is currently safe.
    AllowCancel(bool),
    /// Operational error.
    ErrorCode {
        /// Code.
        code: ErrorCode,
        /// Text.
        details: String,
    },
    /// The run is over.
    Finished(Exit),
}

/// A backend event tagged with the transaction that owned the backend when
/// it was emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendEvent {
    /// Owning transaction, `None` outside of a run.
    pub tid: Option<String>,
    /// The event.
    pub kind: BackendEventKind,
}

/// Notifications published by one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum TransactionSignal {
    /// Status changed.
    StatusChanged(Status),
    /// Progress changed.
    ProgressChanged(Progress),
    /// A package result.
    Package(PackageItem),
    /// Package details.
    Details(Details),
    /// Package file list.
    Files(FilesItem),
    /// Update description.
    UpdateDetail(UpdateDetail),
    /// Distribution upgrade.
    DistroUpgrade(DistroUpgrade),
    /// Repository.
    RepoDetail(RepoDetail),
    /// Category.
    Category(Category),
    /// Informational message.
    Message {
        /// Kind.
        kind: MessageKind,
        /// Text.
        details: String,
    },
    /// Restart requirement.
    RequireRestart(RestartRequest),
    /// A key must be trusted.
    RepoSignatureRequired(RepoSignatureRequest),
    /// A license must be accepted.
    EulaRequired(EulaRequest),
    /// Whether cancelling is currently safe.
    AllowCancel(bool),
    /// Operational error. At most one per transaction.
    ErrorCode {
        /// Code.
        code: ErrorCode,
        /// Text.
        details: String,
    },
    /// A past transaction, answering `GetOldTransactions`.
    Transaction(LedgerRecord),
    /// The caller connected or disconnected.
    CallerActiveChanged(bool),
    /// The transaction is over.
    Finished {
        /// Exit kind.
        exit: Exit,
        /// Runtime in milliseconds.
        runtime_ms: u64,
    },
    /// The transaction was removed from the list.
    Destroy,
}

/// Daemon level notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum DaemonSignal {
    /// A system-modifying transaction started or all of them ended.
    Locked(bool),
    /// Membership or state of the transaction list changed.
    TransactionListChanged(Vec<String>),
    /// The repository list changed.
    RepoListChanged,
    /// Network connectivity changed.
    NetworkStateChanged(NetworkState),
    /// The list of available updates may have changed.
    UpdatesChanged,
    /// The daemon binary changed; clients should expect a restart.
    RestartSchedule,
    /// The daemon is quitting.
    Quit,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkd_core::Info;

    #[test]
    fn unknown_progress() {
        let progress = Progress::default();
        assert_eq!(progress.percentage, PERCENTAGE_INVALID);
        assert_eq!(progress.subpercentage, PERCENTAGE_INVALID);
    }

    #[test]
    fn signals_serialize_tagged() {
        let signal = TransactionSignal::Package(PackageItem::new(
            Info::Installed,
            "foo;1.0;x86_64;repo",
            "Foo app",
        ));
        let json = serde_json::to_value(&signal).unwrap();
        assert_eq!(json["type"], "package");
        assert_eq!(json["data"]["info"], "installed");

        let json = serde_json::to_value(DaemonSignal::Locked(true)).unwrap();
        assert_eq!(json["type"], "locked");
        assert_eq!(json["data"], true);
    }
}
