//! # pkd daemon
//!
//! The scheduling core of the pkd package daemon.
//!
//! This crate provides:
//! - `Backend`: the single execution slot wrapping a package-manager
//!   implementation, with the validated emission API role methods report through
//! - `Transaction`: one client request, from id issuance to its Finished signal
//! - `TransactionList`: the queue that runs committed transactions one at a time
//! - `Engine`: id issuance, capability queries, environment reactivity and idle
//!   accounting
//! - `Daemon`: a tokio runner owning the engine, driven through a `DaemonHandle`
//!
//! ## Architecture
//!
//! ```text
//! DaemonHandle ──command──► Daemon ──► Engine ──► TransactionList ──► Transaction
//!                                        │                               │
//!                                        └──────────► Backend ◄──────────┘
//!                                                       │
//!                                   worker ──BackendEvent─┘ (drained on the main loop)
//! ```
//!
//! All transaction, list and engine state is mutated from one task. Role
//! methods may run on a worker thread; their results only come back as
//! `BackendEvent`s on a channel the main loop drains.
//!
//! ## Key Invariants
//!
//! - At most one transaction holds the backend at any time
//! - Committed transactions run in commit order
//! - Every transaction emits exactly one Finished signal and at most one error
//! - Results emitted after an error or after finished are refused
//! - A second instance of a single-instance role is refused, not queued

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod cache;
mod clock;
mod config;
mod context;
mod daemon;
mod engine;
mod error;
mod events;
mod feed;
mod inhibit;
mod monitor;
mod notify;
mod post_trans;
mod request;
mod security;
mod transaction;

pub use backend::{
    AllowCancel, Backend, BackendFactory, BackendJob, BackendRegistry, DummyBackend, DummyHandle,
    PackageBackend, DUMMY_EULA_ID, DUMMY_UNSIGNED_REPO,
};
pub use cache::UpdatesCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DaemonConfig, ExecutionMode, StateChangedTier, TimingConfig};
pub use context::DaemonContext;
pub use daemon::{Daemon, DaemonCommand, DaemonExit, DaemonHandle};
pub use engine::{Engine, EngineBuilder, IDLE_FOREVER};
pub use error::{
    BackendError, BackendResult, EngineError, EngineResult, TransactionError, TransactionResult,
};
pub use events::{
    BackendEvent, BackendEventKind, DaemonSignal, Progress, TransactionSignal,
    PERCENTAGE_DEFAULT, PERCENTAGE_INVALID,
};
pub use feed::EventFeed;
pub use inhibit::Inhibit;
pub use monitor::FileMonitor;
pub use notify::Notify;
pub use post_trans::{NoopPostTransaction, PostTransaction};
pub use request::RoleRequest;
pub use security::{AllowAll, RolePolicy, Security};
pub use transaction::{
    search_check, validate_request, CancelOutcome, Prepared, Transaction, TransactionList,
    TransactionState,
};
