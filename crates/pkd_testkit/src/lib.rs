//! # pkd Testkit
//!
//! Test utilities for the pkd package daemon.
//!
//! This crate provides:
//! - Engine fixtures on a manual clock with an inline dummy backend
//! - Property-based test generators using proptest
//! - A scheduler model for replaying random operation sequences
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pkd_testkit::prelude::*;
//!
//! #[test]
//! fn resolve_succeeds() {
//!     let mut t = TestEngine::immediate();
//!     let tid = t.submit(resolve_request("powertop")).unwrap();
//!     t.settle();
//!     assert_eq!(t.exit(&tid), Some(Exit::Success));
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod scheduler;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::scheduler::*;
    pub use pkd_core::Exit;
}

pub use fixtures::*;
pub use generators::*;
pub use scheduler::*;
