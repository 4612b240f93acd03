//! # pkd core
//!
//! Data model and persisted state shared by the pkd package daemon.
//!
//! This crate provides:
//! - Text-coded enums for roles, statuses, exit kinds and result metadata
//! - Bitfields (`RoleSet`, `GroupSet`, `FilterSet`) with their `;`-joined text form
//! - The filter grammar and the `name;version;arch;data` package id grammar
//! - Input sanitation (`strvalidate`, `strsafe`)
//! - Result items emitted by backends (packages, details, update details, ...)
//! - The state directory, the transaction id generator and the transaction ledger
//!
//! ## Architecture
//!
//! Nothing in this crate knows about scheduling or backends. The daemon crate
//! builds its transaction machinery on top of these types:
//!
//! ```text
//! StateDir ──► TidGenerator (job_count.dat)
//!          └─► TransactionDb (transactions.log, append-only)
//! ```
//!
//! ## Key Invariants
//!
//! - Every enum round-trips through its wire text
//! - Filter text is valid iff every `;` segment is a known, optionally negated, token
//! - A package id is valid iff it has four `;` fields and a non-empty name
//! - Ledger entries are only ever appended; state is rebuilt by replay

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bitfield;
mod dir;
mod enums;
mod error;
mod filter;
mod items;
mod ledger;
mod package_id;
mod text;
mod tid;

pub use bitfield::{EnumSet, GroupSet, RoleSet, TextEnum};
pub use dir::StateDir;
pub use enums::{
    DistroUpgradeKind, ErrorCode, Exit, Group, Info, MessageKind, NetworkState, Provides, Restart,
    Role, SigType, Status, UpdateState,
};
pub use error::{CoreError, CoreResult};
pub use filter::{filter_check, filter_from_text, filter_to_text, Filter, FilterSet};
pub use items::{
    Category, Details, DistroUpgrade, EulaRequest, FilesItem, PackageItem, RepoDetail,
    RepoSignatureRequest, RestartRequest, UpdateDetail,
};
pub use ledger::{LedgerEntry, LedgerRecord, TransactionDb};
pub use package_id::{package_ids_check, PackageId};
pub use text::{strsafe, strvalidate, MAX_INPUT_LENGTH};
pub use tid::{TidGenerator, MAX_JOB_COUNT};
