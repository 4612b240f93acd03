//! Transactions and the list that schedules them.
//!
//! A transaction is created empty when a client asks for an id, receives
//! exactly one role request, and is then committed to the
//! [`TransactionList`], which runs committed transactions one at a time
//! against the shared backend.
//!
//! ```text
//! Created ──submit──► Parameterized ──commit──► Committed ──run──► Running ──► Finished
//!    │                     │                                                    ▲
//!    └──────────── answered from daemon state ──────────────────────────────────┘
//! ```

mod list;
mod state;
mod validate;

pub use list::TransactionList;
pub use state::{CancelOutcome, Prepared, Transaction, TransactionState};
pub use validate::{search_check, validate_request};
