//! Scheduler model.
//!
//! Replays a sequence of client and backend operations against a manual
//! engine and checks the queue invariants after every step:
//!
//! - at most one transaction runs, and it heads `get_transaction_list`
//! - the backend sees runs in commit order
//! - a single-instance role is refused only while another one is live
//! - the engine never reports idle time while work is queued

use crate::fixtures::TestEngine;
use pkd_core::{Exit, Role};
use pkd_daemon::{CancelOutcome, EngineError, RoleRequest, TransactionState};
use proptest::prelude::*;
use std::collections::VecDeque;
use std::time::Duration;

/// One step of a scheduler scenario.
#[derive(Debug, Clone)]
pub enum SchedulerOp {
    /// Submit a request under a fresh id.
    Submit(RoleRequest),
    /// Let the backend finish the running transaction.
    FinishRunning,
    /// Cancel the queued transaction at this position modulo the queue length.
    CancelQueued(usize),
    /// Move time forward by this many milliseconds.
    Tick(u64),
}

/// Strategy for generating scheduler operations.
pub fn scheduler_op_strategy() -> impl Strategy<Value = SchedulerOp> {
    prop_oneof![
        4 => crate::generators::role_request_strategy().prop_map(SchedulerOp::Submit),
        3 => Just(SchedulerOp::FinishRunning),
        1 => any::<usize>().prop_map(SchedulerOp::CancelQueued),
        1 => (0u64..8_000).prop_map(SchedulerOp::Tick),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn scheduler_ops_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<SchedulerOp>> {
    prop::collection::vec(scheduler_op_strategy(), min_ops..max_ops)
}

/// What a replay observed.
#[derive(Debug, Default)]
pub struct SchedulerTrace {
    /// Transactions that reached the queue, in commit order.
    pub committed: Vec<String>,
    /// Transactions that finished with success.
    pub succeeded: Vec<String>,
    /// Submissions refused because the role was already live.
    pub refused: usize,
    /// Transactions cancelled before they ran.
    pub cancelled: usize,
}

/// Replays `ops` on a fresh manual engine.
///
/// Returns the first invariant violation as an error.
pub fn replay(ops: &[SchedulerOp]) -> Result<SchedulerTrace, String> {
    let mut t = TestEngine::manual();
    let mut trace = SchedulerTrace::default();
    let mut queue: VecDeque<(String, Role)> = VecDeque::new();
    let mut started: Vec<Role> = Vec::new();

    for (step, op) in ops.iter().enumerate() {
        match op {
            SchedulerOp::Submit(request) => {
                let role = request.role();
                let live = queue.iter().any(|(_, queued)| *queued == role);
                match t.submit(request.clone()) {
                    Ok(tid) => {
                        if role.is_single_instance() && live {
                            return Err(format!("step {step}: second {role} accepted"));
                        }
                        match t.state(&tid) {
                            Some(TransactionState::Committed | TransactionState::Running) => {
                                trace.committed.push(tid.clone());
                                queue.push_back((tid, role));
                            }
                            Some(TransactionState::Finished) => {}
                            other => {
                                return Err(format!("step {step}: {tid} left in {other:?}"));
                            }
                        }
                    }
                    Err(EngineError::Transaction(e))
                        if e.kind() == "transaction-exists-with-role" =>
                    {
                        if !live {
                            return Err(format!("step {step}: {role} refused with none live"));
                        }
                        trace.refused += 1;
                    }
                    Err(e) => return Err(format!("step {step}: unexpected error {e}")),
                }
            }
            SchedulerOp::FinishRunning => {
                if t.finish_running(&[]) {
                    let Some((tid, _)) = queue.pop_front() else {
                        return Err(format!("step {step}: finished with an empty queue"));
                    };
                    if t.exit(&tid) != Some(Exit::Success) {
                        return Err(format!("step {step}: {tid} did not succeed"));
                    }
                    trace.succeeded.push(tid);
                }
            }
            SchedulerOp::CancelQueued(position) => {
                if queue.len() > 1 {
                    let index = 1 + position % (queue.len() - 1);
                    let (tid, _) = queue[index].clone();
                    match t.cancel(&tid, None) {
                        Ok(CancelOutcome::Immediate) => {
                            queue.remove(index);
                            trace.cancelled += 1;
                        }
                        other => {
                            return Err(format!("step {step}: cancelling {tid} gave {other:?}"))
                        }
                    }
                }
            }
            SchedulerOp::Tick(ms) => t.advance(Duration::from_millis(*ms)),
        }

        let requests = t.handle.requests();
        while started.len() < requests.len() {
            started.push(requests[started.len()]);
        }
        check_invariants(&mut t, &queue, &started).map_err(|e| format!("step {step}: {e}"))?;
    }
    Ok(trace)
}

fn check_invariants(
    t: &mut TestEngine,
    queue: &VecDeque<(String, Role)>,
    started: &[Role],
) -> Result<(), String> {
    let listed = t.get_transaction_list();
    let expected: Vec<String> = queue.iter().map(|(tid, _)| tid.clone()).collect();
    if listed != expected {
        return Err(format!("list {listed:?}, expected {expected:?}"));
    }

    let running = listed
        .iter()
        .filter(|tid| t.state(tid) == Some(TransactionState::Running))
        .count();
    match (listed.first(), running) {
        (None, 0) => {}
        (Some(head), 1) if t.state(head) == Some(TransactionState::Running) => {}
        _ => return Err(format!("{running} running, list {listed:?}")),
    }

    if !listed.is_empty() && t.get_seconds_idle() != 0 {
        return Err("idle while work is queued".to_string());
    }

    if let Some((_, role)) = queue.front() {
        if started.last() != Some(role) {
            return Err(format!("running {role} but backend last saw {:?}", started.last()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::PropTestConfig;

    #[test]
    fn simple_queue_drains_in_order() {
        let ops = vec![
            SchedulerOp::Submit(RoleRequest::RefreshCache { force: false }),
            SchedulerOp::Submit(RoleRequest::UpdateSystem { only_trusted: true }),
            SchedulerOp::Submit(RoleRequest::UpdateSystem { only_trusted: false }),
            SchedulerOp::FinishRunning,
            SchedulerOp::FinishRunning,
            SchedulerOp::FinishRunning,
        ];
        let trace = replay(&ops).unwrap();
        assert_eq!(trace.committed.len(), 2);
        assert_eq!(trace.refused, 1);
        assert_eq!(trace.succeeded, trace.committed);
    }

    #[test]
    fn cancelled_items_never_run() {
        let ops = vec![
            SchedulerOp::Submit(RoleRequest::RefreshCache { force: false }),
            SchedulerOp::Submit(RoleRequest::GetCategories),
            SchedulerOp::CancelQueued(0),
            SchedulerOp::FinishRunning,
            SchedulerOp::FinishRunning,
        ];
        let trace = replay(&ops).unwrap();
        assert_eq!(trace.cancelled, 1);
        assert_eq!(trace.succeeded.len(), 1);
    }

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn scheduler_invariants_hold(ops in scheduler_ops_strategy(1, 40)) {
            let result = replay(&ops);
            prop_assert!(result.is_ok(), "{}", result.unwrap_err());
        }

        #[test]
        fn every_success_was_committed_in_order(ops in scheduler_ops_strategy(1, 40)) {
            let trace = replay(&ops).unwrap();
            let committed: Vec<&String> = trace
                .committed
                .iter()
                .filter(|tid| trace.succeeded.contains(tid))
                .collect();
            let succeeded: Vec<&String> = trace.succeeded.iter().collect();
            prop_assert_eq!(committed, succeeded);
        }
    }
}
