//! Error types for the pkd daemon.

use pkd_core::CoreError;
use thiserror::Error;

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Result type for transaction operations.
pub type TransactionResult<T> = Result<T, TransactionError>;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised while loading or driving a backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// No factory is registered under this name.
    #[error("unknown backend: {name}")]
    UnknownBackend {
        /// The requested backend name.
        name: String,
    },

    /// The implementation's initialize hook failed.
    #[error("backend failed to initialize: {message}")]
    InitializeFailed {
        /// Reason given by the implementation.
        message: String,
    },

    /// A role or reset was requested while the backend is not locked.
    #[error("backend is not locked")]
    NotLocked,

    /// A run is in progress.
    #[error("backend is busy with {tid}")]
    Busy {
        /// Transaction currently holding the backend.
        tid: String,
    },
}

impl BackendError {
    /// Creates an unknown backend error.
    pub fn unknown_backend(name: impl Into<String>) -> Self {
        Self::UnknownBackend { name: name.into() }
    }

    /// Creates an initialize failure.
    pub fn initialize_failed(message: impl Into<String>) -> Self {
        Self::InitializeFailed {
            message: message.into(),
        }
    }
}

/// Errors returned synchronously by transaction methods.
///
/// Execution errors never appear here; they arrive through the transaction's
/// `ErrorCode` and `Finished` signals.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    /// The transaction is not in a state that allows the call.
    #[error("invalid state: {detail}")]
    InvalidState {
        /// Description.
        detail: String,
    },

    /// The policy predicate refused the caller.
    #[error("refused by policy: {detail}")]
    RefusedByPolicy {
        /// Description.
        detail: String,
    },

    /// The backend or daemon does not support the request.
    #[error("not supported: {detail}")]
    NotSupported {
        /// Description.
        detail: String,
    },

    /// The transaction has no role yet.
    #[error("no role: {detail}")]
    NoRole {
        /// Description.
        detail: String,
    },

    /// The running transaction cannot be cancelled now.
    #[error("cannot cancel: {detail}")]
    CannotCancel {
        /// Description.
        detail: String,
    },

    /// The transaction could not be queued.
    #[error("commit failed: {detail}")]
    CommitFailed {
        /// Description.
        detail: String,
    },

    /// A package id does not match the package id grammar.
    #[error("package id invalid: {detail}")]
    PackageIdInvalid {
        /// Description.
        detail: String,
    },

    /// Search text was rejected.
    #[error("search invalid: {detail}")]
    SearchInvalid {
        /// Description.
        detail: String,
    },

    /// Free text or a filter was rejected.
    #[error("input invalid: {detail}")]
    InputInvalid {
        /// Description.
        detail: String,
    },

    /// A local file does not exist.
    #[error("no such file: {detail}")]
    NoSuchFile {
        /// Description.
        detail: String,
    },

    /// A service pack is not valid.
    #[error("pack invalid: {detail}")]
    PackInvalid {
        /// Description.
        detail: String,
    },

    /// A single-instance role is already present.
    #[error("transaction exists with role: {detail}")]
    TransactionExistsWithRole {
        /// Description.
        detail: String,
    },

    /// No transaction has this id.
    #[error("no such transaction: {detail}")]
    NoSuchTransaction {
        /// Description.
        detail: String,
    },

    /// The provides kind of a `WhatProvides` request is unknown.
    #[error("invalid provide: {detail}")]
    InvalidProvide {
        /// Description.
        detail: String,
    },
}

macro_rules! constructors {
    ($($fn_name:ident => $variant:ident),+ $(,)?) => {
        impl TransactionError {
            $(
                #[doc = concat!("Creates a `", stringify!($variant), "` error.")]
                pub fn $fn_name(detail: impl Into<String>) -> Self {
                    Self::$variant { detail: detail.into() }
                }
            )+
        }
    };
}

constructors! {
    invalid_state => InvalidState,
    refused_by_policy => RefusedByPolicy,
    not_supported => NotSupported,
    no_role => NoRole,
    cannot_cancel => CannotCancel,
    commit_failed => CommitFailed,
    package_id_invalid => PackageIdInvalid,
    search_invalid => SearchInvalid,
    input_invalid => InputInvalid,
    no_such_file => NoSuchFile,
    pack_invalid => PackInvalid,
    transaction_exists_with_role => TransactionExistsWithRole,
    no_such_transaction => NoSuchTransaction,
    invalid_provide => InvalidProvide,
}

impl TransactionError {
    /// Stable machine readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidState { .. } => "invalid-state",
            Self::RefusedByPolicy { .. } => "refused-by-policy",
            Self::NotSupported { .. } => "not-supported",
            Self::NoRole { .. } => "no-role",
            Self::CannotCancel { .. } => "cannot-cancel",
            Self::CommitFailed { .. } => "commit-failed",
            Self::PackageIdInvalid { .. } => "package-id-invalid",
            Self::SearchInvalid { .. } => "search-invalid",
            Self::InputInvalid { .. } => "input-invalid",
            Self::NoSuchFile { .. } => "no-such-file",
            Self::PackInvalid { .. } => "pack-invalid",
            Self::TransactionExistsWithRole { .. } => "transaction-exists-with-role",
            Self::NoSuchTransaction { .. } => "no-such-transaction",
            Self::InvalidProvide { .. } => "invalid-provide",
        }
    }

    /// The human readable detail.
    pub fn detail(&self) -> &str {
        match self {
            Self::InvalidState { detail }
            | Self::RefusedByPolicy { detail }
            | Self::NotSupported { detail }
            | Self::NoRole { detail }
            | Self::CannotCancel { detail }
            | Self::CommitFailed { detail }
            | Self::PackageIdInvalid { detail }
            | Self::SearchInvalid { detail }
            | Self::InputInvalid { detail }
            | Self::NoSuchFile { detail }
            | Self::PackInvalid { detail }
            | Self::TransactionExistsWithRole { detail }
            | Self::NoSuchTransaction { detail }
            | Self::InvalidProvide { detail } => detail,
        }
    }
}

/// Errors returned by daemon level methods.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The daemon is not in a state that allows the call.
    #[error("invalid state: {detail}")]
    InvalidState {
        /// Description.
        detail: String,
    },

    /// The policy predicate refused the caller.
    #[error("refused by policy: {detail}")]
    RefusedByPolicy {
        /// Description.
        detail: String,
    },

    /// The proxy settings were rejected.
    #[error("cannot set proxy: {detail}")]
    CannotSetProxy {
        /// Description.
        detail: String,
    },

    /// The backend does not support the call.
    #[error("not supported: {detail}")]
    NotSupported {
        /// Description.
        detail: String,
    },

    /// Backend startup failure.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// State directory or ledger failure.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// A transaction level failure surfaced through the engine.
    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

impl EngineError {
    /// Creates an invalid state error.
    pub fn invalid_state(detail: impl Into<String>) -> Self {
        Self::InvalidState {
            detail: detail.into(),
        }
    }

    /// Creates a policy refusal.
    pub fn refused_by_policy(detail: impl Into<String>) -> Self {
        Self::RefusedByPolicy {
            detail: detail.into(),
        }
    }

    /// Creates a proxy rejection.
    pub fn cannot_set_proxy(detail: impl Into<String>) -> Self {
        Self::CannotSetProxy {
            detail: detail.into(),
        }
    }

    /// Creates a not supported error.
    pub fn not_supported(detail: impl Into<String>) -> Self {
        Self::NotSupported {
            detail: detail.into(),
        }
    }
}
