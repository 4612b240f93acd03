//! Engine fixtures.
//!
//! Every fixture runs the dummy backend inline on a [`ManualClock`], so
//! timers only fire when a test moves time forward.

use pkd_core::{Exit, Info};
use pkd_daemon::{
    Clock, DaemonConfig, DummyBackend, DummyHandle, Engine, EngineBuilder, EngineResult,
    ExecutionMode, ManualClock, RoleRequest, TransactionState,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Caller name used for every transaction a fixture creates.
pub const TEST_CALLER: &str = ":1.42";

/// An engine with automatic cleanup of its state directory.
pub struct TestEngine {
    /// The engine.
    pub engine: Engine,
    /// The clock every deadline is computed from.
    pub clock: Arc<ManualClock>,
    /// Observes the dummy backend.
    pub handle: DummyHandle,
    _temp_dir: Option<TempDir>,
}

impl TestEngine {
    /// An in-memory engine whose backend answers every role immediately.
    pub fn immediate() -> Self {
        let implementation = DummyBackend::new();
        let handle = implementation.handle();
        Self::build(DaemonConfig::new(), implementation, handle, None)
    }

    /// An in-memory engine whose backend only records requests. Tests
    /// finish runs with [`TestEngine::finish_running`].
    pub fn manual() -> Self {
        let (implementation, handle) = DummyBackend::manual();
        Self::build(DaemonConfig::new(), implementation, handle, None)
    }

    /// An immediate engine with its ledger in a temporary directory.
    pub fn persistent() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = DaemonConfig::new()
            .state_dir(temp_dir.path().join("state"))
            .cache_dir(temp_dir.path().join("cache"));
        let implementation = DummyBackend::new();
        let handle = implementation.handle();
        Self::build(config, implementation, handle, Some(temp_dir))
    }

    fn build(
        config: DaemonConfig,
        implementation: DummyBackend,
        handle: DummyHandle,
        temp_dir: Option<TempDir>,
    ) -> Self {
        let clock = Arc::new(ManualClock::new());
        let engine = EngineBuilder::new(config.execution(ExecutionMode::Inline))
            .clock(clock.clone())
            .backend(Box::new(implementation))
            .build()
            .expect("Failed to build engine");
        Self {
            engine,
            clock,
            handle,
            _temp_dir: temp_dir,
        }
    }

    /// Issues an id and submits `request` under it.
    pub fn submit(&mut self, request: RoleRequest) -> EngineResult<String> {
        let tid = self.engine.get_tid(TEST_CALLER)?;
        self.engine.submit(&tid, request)?;
        Ok(tid)
    }

    /// Applies backend events and fires every timer due within a second.
    ///
    /// Finished transactions stay readable because retention is longer.
    pub fn settle(&mut self) {
        self.engine.run_until_idle();
        while let Some(deadline) = self.engine.next_deadline() {
            if deadline > self.clock.now() + Duration::from_secs(1) {
                break;
            }
            self.clock.advance_to(deadline);
            self.engine.run_until_idle();
        }
    }

    /// Moves time forward and applies whatever became due.
    pub fn advance(&mut self, by: Duration) {
        self.clock.advance(by);
        self.engine.run_until_idle();
    }

    /// Ends the running transaction of a manual engine with `packages`
    /// reported first. Returns false if nothing was running.
    pub fn finish_running(&mut self, packages: &[&str]) -> bool {
        let running = self.engine.list().get_array().first().cloned();
        let Some(tid) = running else {
            return false;
        };
        if self.state(&tid) != Some(TransactionState::Running) {
            return false;
        }
        let backend = Arc::clone(self.engine.backend());
        for id in packages {
            backend.package(Info::Available, id, "test package");
        }
        backend.finished();
        self.settle();
        true
    }

    /// The exit of a transaction still in the list.
    pub fn exit(&self, tid: &str) -> Option<Exit> {
        self.engine.transaction(tid).map(|t| t.exit())
    }

    /// The state of a transaction still in the list.
    pub fn state(&self, tid: &str) -> Option<TransactionState> {
        self.engine.transaction(tid).map(|t| t.state())
    }
}

impl std::ops::Deref for TestEngine {
    type Target = Engine;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

impl std::ops::DerefMut for TestEngine {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.engine
    }
}

/// Runs a test with an immediate in-memory engine.
pub fn with_engine<F, R>(f: F) -> R
where
    F: FnOnce(&mut TestEngine) -> R,
{
    let mut engine = TestEngine::immediate();
    f(&mut engine)
}

/// A resolve request for one package name, unfiltered.
pub fn resolve_request(name: &str) -> RoleRequest {
    RoleRequest::Resolve {
        filter: "none".to_string(),
        packages: vec![name.to_string()],
    }
}

/// An install request for package ids.
pub fn install_request(package_ids: &[&str]) -> RoleRequest {
    RoleRequest::InstallPackages {
        only_trusted: true,
        package_ids: package_ids.iter().map(|id| (*id).to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkd_core::Role;

    #[test]
    fn immediate_resolve_succeeds() {
        with_engine(|t| {
            let tid = t.submit(resolve_request("powertop")).unwrap();
            t.settle();
            assert_eq!(t.exit(&tid), Some(Exit::Success));
            assert_eq!(t.handle.requests(), vec![Role::Resolve]);
        });
    }

    #[test]
    fn manual_runs_wait_for_finish() {
        let mut t = TestEngine::manual();
        let tid = t
            .submit(install_request(&["powertop;1.8-1.fc8;i386;fedora"]))
            .unwrap();
        assert_eq!(t.state(&tid), Some(TransactionState::Running));

        assert!(t.finish_running(&[]));
        assert_eq!(t.exit(&tid), Some(Exit::Success));
        assert!(!t.finish_running(&[]));
    }

    #[test]
    fn persistent_engine_records_history() {
        let mut t = TestEngine::persistent();
        t.submit(RoleRequest::UpdateSystem { only_trusted: true })
            .unwrap();
        t.settle();
        assert_eq!(t.history(0).len(), 1);
    }
}
