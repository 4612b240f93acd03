//! The ordered set of live transactions and the one-at-a-time scheduler.

use super::state::{CancelOutcome, Prepared, Transaction};
use crate::context::DaemonContext;
use crate::error::{TransactionError, TransactionResult};
use crate::events::{BackendEvent, DaemonSignal};
use crate::request::RoleRequest;
use pkd_core::Role;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

struct ListItem {
    transaction: Transaction,
    committed: bool,
    running: bool,
    finished: bool,
    seq: u64,
    created_at: Instant,
    finished_at: Option<Instant>,
}

impl ListItem {
    fn role(&self) -> Role {
        self.transaction.role().0
    }
}

/// Owns every transaction between id issuance and removal.
///
/// At most one item is running at any time. Committed items run in commit
/// order; finished items linger for `keep_finished` so late clients can still
/// read their results.
pub struct TransactionList {
    ctx: Arc<DaemonContext>,
    items: Vec<ListItem>,
    next_seq: u64,
}

impl TransactionList {
    /// Creates an empty list.
    pub fn new(ctx: Arc<DaemonContext>) -> Self {
        Self {
            ctx,
            items: Vec::new(),
            next_seq: 1,
        }
    }

    /// Registers a new, uncommitted transaction.
    pub fn create(&mut self, tid: &str, caller: &str) -> TransactionResult<()> {
        if self.contains(tid) {
            return Err(TransactionError::invalid_state(format!(
                "Transaction {tid} already exists"
            )));
        }
        debug!(tid, caller, "transaction created");
        let transaction =
            Transaction::new(tid.to_string(), caller.to_string(), Arc::clone(&self.ctx));
        self.items.push(ListItem {
            transaction,
            committed: false,
            running: false,
            finished: false,
            seq: 0,
            created_at: self.ctx.clock.now(),
            finished_at: None,
        });
        Ok(())
    }

    /// Caches a request on an uncommitted transaction and queues it.
    pub fn submit(&mut self, tid: &str, request: RoleRequest) -> TransactionResult<()> {
        let role = request.role();
        let index = self.index_of(tid).ok_or_else(|| {
            TransactionError::no_such_transaction(format!("No transaction {tid}"))
        })?;
        if self.items[index].committed || self.items[index].finished {
            return Err(TransactionError::invalid_state(format!(
                "Transaction {tid} already committed"
            )));
        }
        if role.is_single_instance() && self.role_present(role) {
            warn!(tid, role = %role, "single instance role already queued");
            return Err(TransactionError::transaction_exists_with_role(format!(
                "Already performing {role}"
            )));
        }

        let now = self.ctx.clock.now();
        match self.items[index].transaction.prepare(request) {
            Ok(Prepared::Commit) => self.commit(tid),
            Ok(Prepared::Completed) => {
                let item = &mut self.items[index];
                item.finished = true;
                item.finished_at = Some(now);
                Ok(())
            }
            Err(e) => {
                if matches!(e, TransactionError::NotSupported { .. }) {
                    debug!(tid, "removing transaction for unsupported role");
                    self.remove(tid);
                }
                Err(e)
            }
        }
    }

    /// Queues a parameterized transaction and starts it if the backend is
    /// free.
    pub fn commit(&mut self, tid: &str) -> TransactionResult<()> {
        let index = self.index_of(tid).ok_or_else(|| {
            TransactionError::no_such_transaction(format!("No transaction {tid}"))
        })?;
        if self.items[index].committed {
            return Err(TransactionError::invalid_state(format!(
                "Transaction {tid} already committed"
            )));
        }
        if let Err(e) = self.items[index].transaction.commit() {
            warn!(tid, "commit failed: {}", e);
            self.remove(tid);
            return Err(TransactionError::commit_failed(
                "Could not commit to a transaction object",
            ));
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        let item = &mut self.items[index];
        item.committed = true;
        item.seq = seq;
        info!(tid, seq, role = %item.role(), "transaction committed");

        self.emit_changed();
        self.try_run_next();
        Ok(())
    }

    /// Starts the oldest committed transaction unless one is running.
    pub fn try_run_next(&mut self) {
        loop {
            if self.items.iter().any(|item| item.running) {
                return;
            }
            let next = self
                .items
                .iter()
                .enumerate()
                .filter(|(_, item)| item.committed && !item.finished)
                .min_by_key(|(_, item)| item.seq)
                .map(|(index, _)| index);
            let Some(index) = next else {
                return;
            };

            let tid = self.items[index].transaction.tid().to_string();
            let role = self.items[index].role();
            if role.is_system_modifying() {
                self.ctx.inhibit.lock().add(&tid);
            }
            self.items[index].running = true;
            debug!(tid = %tid, "starting transaction");

            let result = self.items[index].transaction.run();
            let Err(e) = result else {
                self.emit_changed();
                return;
            };
            warn!(tid = %tid, "transaction failed to start: {}", e);
            self.items[index].transaction.fail_to_start(&e);
            self.transaction_finished(index);
        }
    }

    /// Routes a backend event to the transaction it is tagged with.
    pub fn handle_backend_event(&mut self, event: BackendEvent) {
        let Some(tid) = event.tid else {
            debug!("dropping untagged backend event");
            return;
        };
        let Some(index) = self.index_of(&tid) else {
            debug!(tid = %tid, "dropping event for a removed transaction");
            return;
        };
        if self.items[index].transaction.handle_backend_event(event.kind) {
            self.transaction_finished(index);
            self.try_run_next();
        }
    }

    fn transaction_finished(&mut self, index: usize) {
        let now = self.ctx.clock.now();
        let item = &mut self.items[index];
        item.running = false;
        item.finished = true;
        item.finished_at = Some(now);
        let tid = item.transaction.tid().to_string();
        self.ctx.inhibit.lock().remove(&tid);
        self.emit_changed();
    }

    /// Destroys a transaction and forgets it.
    pub fn remove(&mut self, tid: &str) -> bool {
        let Some(index) = self.index_of(tid) else {
            warn!(tid, "cannot remove unknown transaction");
            return false;
        };
        let mut item = self.items.remove(index);
        if item.running {
            warn!(tid, "removing a running transaction");
        }
        item.transaction.destroy();
        self.ctx.inhibit.lock().remove(tid);
        debug!(tid, "transaction removed");
        if item.committed {
            self.emit_changed();
        }
        true
    }

    /// Cancels a transaction on behalf of `caller`.
    pub fn cancel(&mut self, tid: &str, caller: Option<&str>) -> TransactionResult<CancelOutcome> {
        let index = self.index_of(tid).ok_or_else(|| {
            TransactionError::no_such_transaction(format!("No transaction {tid}"))
        })?;
        let outcome = self.items[index].transaction.cancel(caller)?;
        if outcome == CancelOutcome::Immediate {
            self.remove(tid);
        }
        Ok(outcome)
    }

    /// Marks every transaction owned by `caller` as abandoned.
    pub fn caller_disconnected(&mut self, caller: &str) {
        for item in self
            .items
            .iter_mut()
            .filter(|item| item.transaction.caller() == caller)
        {
            item.transaction.caller_disconnected();
        }
    }

    /// Removes finished items past `keep_finished` and uncommitted ones past
    /// `unused_timeout`. Returns true if anything was removed.
    pub fn poll_timers(&mut self, now: Instant) -> bool {
        let timing = &self.ctx.config.timing;
        let expired: Vec<String> = self
            .items
            .iter()
            .filter(|item| {
                if item.finished {
                    item.finished_at.is_some_and(|at| {
                        now.saturating_duration_since(at) >= timing.keep_finished
                    })
                } else if !item.committed {
                    let idle = now.saturating_duration_since(item.created_at);
                    if idle >= timing.unused_timeout {
                        warn!(
                            tid = item.transaction.tid(),
                            "transaction was never committed, removing"
                        );
                        true
                    } else {
                        false
                    }
                } else {
                    false
                }
            })
            .map(|item| item.transaction.tid().to_string())
            .collect();
        for tid in &expired {
            self.remove(tid);
        }
        !expired.is_empty()
    }

    /// The earliest removal deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        let timing = &self.ctx.config.timing;
        self.items
            .iter()
            .filter_map(|item| {
                if item.finished {
                    item.finished_at.map(|at| at + timing.keep_finished)
                } else if !item.committed {
                    Some(item.created_at + timing.unused_timeout)
                } else {
                    None
                }
            })
            .min()
    }

    /// Ids of committed, unfinished transactions, the running one first and
    /// the rest in commit order.
    pub fn get_array(&self) -> Vec<String> {
        let mut live: Vec<&ListItem> = self
            .items
            .iter()
            .filter(|item| item.committed && !item.finished)
            .collect();
        live.sort_by_key(|item| (!item.running, item.seq));
        live.iter()
            .map(|item| item.transaction.tid().to_string())
            .collect()
    }

    /// A human readable dump of every item.
    pub fn get_state(&self) -> String {
        let mut text = String::new();
        for (n, item) in self.items.iter().enumerate() {
            let _ = writeln!(
                text,
                "{}\t{}\t{}\t{}\tcommitted[{}] running[{}] finished[{}]",
                n,
                item.transaction.tid(),
                item.role(),
                item.transaction.status(),
                u8::from(item.committed),
                u8::from(item.running),
                u8::from(item.finished),
            );
        }
        text
    }

    /// Number of committed items that have not finished.
    pub fn size(&self) -> usize {
        self.items
            .iter()
            .filter(|item| item.committed && !item.finished)
            .count()
    }

    /// Returns true if an unfinished item has this role.
    pub fn role_present(&self, role: Role) -> bool {
        self.items
            .iter()
            .any(|item| !item.finished && item.role() == role)
    }

    /// Returns true if the id is known.
    pub fn contains(&self, tid: &str) -> bool {
        self.index_of(tid).is_some()
    }

    /// Borrows a transaction.
    pub fn get(&self, tid: &str) -> Option<&Transaction> {
        self.index_of(tid).map(|index| &self.items[index].transaction)
    }

    /// Mutably borrows a transaction.
    pub fn get_mut(&mut self, tid: &str) -> Option<&mut Transaction> {
        let index = self.index_of(tid)?;
        Some(&mut self.items[index].transaction)
    }

    /// Returns true if the transaction was committed and has not finished.
    pub fn is_queued(&self, tid: &str) -> bool {
        self.index_of(tid)
            .is_some_and(|index| self.items[index].committed && !self.items[index].finished)
    }

    fn index_of(&self, tid: &str) -> Option<usize> {
        self.items
            .iter()
            .position(|item| item.transaction.tid() == tid)
    }

    fn emit_changed(&self) {
        self.ctx
            .signals
            .emit(DaemonSignal::TransactionListChanged(self.get_array()));
    }
}

impl std::fmt::Debug for TransactionList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionList")
            .field("items", &self.items.len())
            .field("next_seq", &self.next_seq)
            .finish_non_exhaustive()
    }
}
