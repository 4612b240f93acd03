//! Async runner that owns the [`Engine`] on a single task.
//!
//! Clients talk to the runner through a cloneable [`DaemonHandle`]; every
//! call becomes a [`DaemonCommand`] carrying a oneshot reply. The runner
//! multiplexes commands, backend events, timer deadlines and the periodic
//! file-monitor check, so engine state is only ever touched from one place.

use crate::engine::{no_such_transaction, Engine};
use crate::error::{EngineError, EngineResult};
use crate::events::{BackendEvent, DaemonSignal, Progress, TransactionSignal};
use crate::request::RoleRequest;
use crate::transaction::{CancelOutcome, Transaction};
use pkd_core::{LedgerRecord, NetworkState, Role, Status};
use std::future::Future;
use std::time::Instant;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// A request to the runner.
#[derive(Debug)]
pub enum DaemonCommand {
    /// Issue a transaction id.
    GetTid {
        /// Client identity.
        caller: String,
        /// Reply.
        reply: oneshot::Sender<EngineResult<String>>,
    },
    /// Give a transaction its request and queue it.
    Submit {
        /// Transaction id.
        tid: String,
        /// The request.
        request: RoleRequest,
        /// Reply.
        reply: oneshot::Sender<EngineResult<()>>,
    },
    /// Cancel a transaction.
    Cancel {
        /// Transaction id.
        tid: String,
        /// Client identity, `None` for the owner.
        caller: Option<String>,
        /// Reply.
        reply: oneshot::Sender<EngineResult<CancelOutcome>>,
    },
    /// Set the locale of a transaction.
    SetLocale {
        /// Transaction id.
        tid: String,
        /// Locale code.
        code: String,
        /// Reply.
        reply: oneshot::Sender<EngineResult<()>>,
    },
    /// Hint that the system state changed.
    StateHasChanged {
        /// Reason text.
        reason: String,
        /// Reply.
        reply: oneshot::Sender<EngineResult<()>>,
    },
    /// Report a network transition.
    SetNetworkState {
        /// New state.
        state: NetworkState,
        /// Reply.
        reply: oneshot::Sender<()>,
    },
    /// Quit now or once idle.
    SuggestQuit {
        /// Reply.
        reply: oneshot::Sender<()>,
    },
    /// Ids of queued transactions.
    GetTransactionList {
        /// Reply.
        reply: oneshot::Sender<Vec<String>>,
    },
    /// Debug dump of the list.
    GetDaemonState {
        /// Reply.
        reply: oneshot::Sender<String>,
    },
    /// Progress of a transaction.
    GetProgress {
        /// Transaction id.
        tid: String,
        /// Reply.
        reply: oneshot::Sender<EngineResult<Progress>>,
    },
    /// Subscribe to a transaction's signals.
    SubscribeTransaction {
        /// Transaction id.
        tid: String,
        /// Reply.
        reply: oneshot::Sender<EngineResult<UnboundedReceiver<TransactionSignal>>>,
    },
    /// Ledger records, newest first.
    History {
        /// Maximum number of records, zero for all.
        limit: usize,
        /// Reply.
        reply: oneshot::Sender<Vec<LedgerRecord>>,
    },
    /// Set the proxies used by the backend.
    SetProxy {
        /// Client identity.
        caller: String,
        /// HTTP proxy.
        http: Option<String>,
        /// FTP proxy.
        ftp: Option<String>,
        /// Reply.
        reply: oneshot::Sender<EngineResult<()>>,
    },
    /// A client went away.
    CallerDisconnected {
        /// Client identity.
        caller: String,
        /// Reply.
        reply: oneshot::Sender<()>,
    },
    /// Roles the backend implements.
    GetActions {
        /// Reply.
        reply: oneshot::Sender<String>,
    },
    /// Groups the backend supports.
    GetGroups {
        /// Reply.
        reply: oneshot::Sender<String>,
    },
    /// Filters the backend supports.
    GetFilters {
        /// Reply.
        reply: oneshot::Sender<String>,
    },
    /// Mime types the backend can install.
    GetMimeTypes {
        /// Reply.
        reply: oneshot::Sender<EngineResult<String>>,
    },
    /// Backend name and author.
    GetBackendDetail {
        /// Reply.
        reply: oneshot::Sender<(String, String)>,
    },
    /// Seconds since a role last succeeded.
    GetTimeSinceAction {
        /// Role text.
        role: String,
        /// Reply.
        reply: oneshot::Sender<EngineResult<u64>>,
    },
    /// Current network state.
    GetNetworkState {
        /// Reply.
        reply: oneshot::Sender<NetworkState>,
    },
    /// Status of a transaction.
    GetStatus {
        /// Transaction id.
        tid: String,
        /// Reply.
        reply: oneshot::Sender<EngineResult<Status>>,
    },
    /// Role of a transaction and what it is about.
    GetRole {
        /// Transaction id.
        tid: String,
        /// Reply.
        reply: oneshot::Sender<EngineResult<(Role, String)>>,
    },
    /// Last package a transaction reported.
    GetPackageLast {
        /// Transaction id.
        tid: String,
        /// Reply.
        reply: oneshot::Sender<EngineResult<String>>,
    },
    /// Whether a transaction may be cancelled.
    GetAllowCancel {
        /// Transaction id.
        tid: String,
        /// Reply.
        reply: oneshot::Sender<EngineResult<bool>>,
    },
    /// Whether the client of a transaction is connected.
    IsCallerActive {
        /// Transaction id.
        tid: String,
        /// Reply.
        reply: oneshot::Sender<EngineResult<bool>>,
    },
}

/// Why the runner stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonExit {
    /// The shutdown future completed.
    Shutdown,
    /// The engine published Quit.
    Quit,
    /// Idle for longer than the configured limit.
    Idle,
}

/// Client side of the runner.
#[derive(Debug, Clone)]
pub struct DaemonHandle {
    commands: UnboundedSender<DaemonCommand>,
}

impl DaemonHandle {
    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> DaemonCommand,
    ) -> EngineResult<T> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(make(reply)).map_err(|_| stopped())?;
        rx.await.map_err(|_| stopped())
    }

    /// Issues a transaction id.
    pub async fn get_tid(&self, caller: &str) -> EngineResult<String> {
        let caller = caller.to_string();
        self.call(|reply| DaemonCommand::GetTid { caller, reply })
            .await?
    }

    /// Gives a transaction its request and queues it.
    pub async fn submit(&self, tid: &str, request: RoleRequest) -> EngineResult<()> {
        let tid = tid.to_string();
        self.call(|reply| DaemonCommand::Submit {
            tid,
            request,
            reply,
        })
        .await?
    }

    /// Cancels a transaction.
    pub async fn cancel(&self, tid: &str, caller: Option<&str>) -> EngineResult<CancelOutcome> {
        let tid = tid.to_string();
        let caller = caller.map(str::to_string);
        self.call(|reply| DaemonCommand::Cancel { tid, caller, reply })
            .await?
    }

    /// Sets the locale of a transaction.
    pub async fn set_locale(&self, tid: &str, code: &str) -> EngineResult<()> {
        let tid = tid.to_string();
        let code = code.to_string();
        self.call(|reply| DaemonCommand::SetLocale { tid, code, reply })
            .await?
    }

    /// Hints that the system state changed.
    pub async fn state_has_changed(&self, reason: &str) -> EngineResult<()> {
        let reason = reason.to_string();
        self.call(|reply| DaemonCommand::StateHasChanged { reason, reply })
            .await?
    }

    /// Reports a network transition.
    pub async fn set_network_state(&self, state: NetworkState) -> EngineResult<()> {
        self.call(|reply| DaemonCommand::SetNetworkState { state, reply })
            .await
    }

    /// Asks the daemon to quit.
    pub async fn suggest_quit(&self) -> EngineResult<()> {
        self.call(|reply| DaemonCommand::SuggestQuit { reply }).await
    }

    /// Ids of queued transactions.
    pub async fn get_transaction_list(&self) -> EngineResult<Vec<String>> {
        self.call(|reply| DaemonCommand::GetTransactionList { reply })
            .await
    }

    /// Debug dump of the list.
    pub async fn get_daemon_state(&self) -> EngineResult<String> {
        self.call(|reply| DaemonCommand::GetDaemonState { reply })
            .await
    }

    /// Progress of a transaction.
    pub async fn get_progress(&self, tid: &str) -> EngineResult<Progress> {
        let tid = tid.to_string();
        self.call(|reply| DaemonCommand::GetProgress { tid, reply })
            .await?
    }

    /// Subscribes to a transaction's signals.
    pub async fn subscribe(
        &self,
        tid: &str,
    ) -> EngineResult<UnboundedReceiver<TransactionSignal>> {
        let tid = tid.to_string();
        self.call(|reply| DaemonCommand::SubscribeTransaction { tid, reply })
            .await?
    }

    /// Ledger records, newest first.
    pub async fn history(&self, limit: usize) -> EngineResult<Vec<LedgerRecord>> {
        self.call(|reply| DaemonCommand::History { limit, reply })
            .await
    }

    /// Sets the proxies used by the backend.
    pub async fn set_proxy(
        &self,
        caller: &str,
        http: Option<&str>,
        ftp: Option<&str>,
    ) -> EngineResult<()> {
        let caller = caller.to_string();
        let http = http.map(str::to_string);
        let ftp = ftp.map(str::to_string);
        self.call(|reply| DaemonCommand::SetProxy {
            caller,
            http,
            ftp,
            reply,
        })
        .await?
    }

    /// Reports that a client went away. Its transactions keep running.
    pub async fn caller_disconnected(&self, caller: &str) -> EngineResult<()> {
        let caller = caller.to_string();
        self.call(|reply| DaemonCommand::CallerDisconnected { caller, reply })
            .await
    }

    /// Roles the backend implements, as text.
    pub async fn get_actions(&self) -> EngineResult<String> {
        self.call(|reply| DaemonCommand::GetActions { reply }).await
    }

    /// Groups the backend supports, as text.
    pub async fn get_groups(&self) -> EngineResult<String> {
        self.call(|reply| DaemonCommand::GetGroups { reply }).await
    }

    /// Filters the backend supports, as text.
    pub async fn get_filters(&self) -> EngineResult<String> {
        self.call(|reply| DaemonCommand::GetFilters { reply }).await
    }

    /// Mime types the backend can install.
    pub async fn get_mime_types(&self) -> EngineResult<String> {
        self.call(|reply| DaemonCommand::GetMimeTypes { reply })
            .await?
    }

    /// Backend name and author.
    pub async fn get_backend_detail(&self) -> EngineResult<(String, String)> {
        self.call(|reply| DaemonCommand::GetBackendDetail { reply })
            .await
    }

    /// Seconds since `role` last succeeded.
    pub async fn get_time_since_action(&self, role: &str) -> EngineResult<u64> {
        let role = role.to_string();
        self.call(|reply| DaemonCommand::GetTimeSinceAction { role, reply })
            .await?
    }

    /// Current network state.
    pub async fn get_network_state(&self) -> EngineResult<NetworkState> {
        self.call(|reply| DaemonCommand::GetNetworkState { reply })
            .await
    }

    /// Status of a transaction.
    pub async fn get_status(&self, tid: &str) -> EngineResult<Status> {
        let tid = tid.to_string();
        self.call(|reply| DaemonCommand::GetStatus { tid, reply })
            .await?
    }

    /// Role of a transaction and what it is about.
    pub async fn get_role(&self, tid: &str) -> EngineResult<(Role, String)> {
        let tid = tid.to_string();
        self.call(|reply| DaemonCommand::GetRole { tid, reply })
            .await?
    }

    /// Last package a transaction reported.
    pub async fn get_package_last(&self, tid: &str) -> EngineResult<String> {
        let tid = tid.to_string();
        self.call(|reply| DaemonCommand::GetPackageLast { tid, reply })
            .await?
    }

    /// Whether a transaction may be cancelled.
    pub async fn get_allow_cancel(&self, tid: &str) -> EngineResult<bool> {
        let tid = tid.to_string();
        self.call(|reply| DaemonCommand::GetAllowCancel { tid, reply })
            .await?
    }

    /// Whether the client of a transaction is connected.
    pub async fn is_caller_active(&self, tid: &str) -> EngineResult<bool> {
        let tid = tid.to_string();
        self.call(|reply| DaemonCommand::IsCallerActive { tid, reply })
            .await?
    }
}

fn stopped() -> EngineError {
    EngineError::invalid_state("daemon is not running")
}

/// Owns the engine and drives it from a tokio task.
pub struct Daemon {
    engine: Engine,
    commands: UnboundedReceiver<DaemonCommand>,
    signals: UnboundedReceiver<DaemonSignal>,
    quit_when_idle: bool,
}

impl Daemon {
    /// Wraps an engine and returns the handle that talks to it.
    pub fn new(engine: Engine) -> (Self, DaemonHandle) {
        let (tx, commands) = unbounded_channel();
        let signals = engine.subscribe_daemon_async();
        let daemon = Self {
            engine,
            commands,
            signals,
            quit_when_idle: false,
        };
        (daemon, DaemonHandle { commands: tx })
    }

    /// The wrapped engine.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Runs until Quit, idle exit or `shutdown` completes. The backend is
    /// unlocked before returning.
    ///
    /// A quit suggested while work is queued ends the run once the queue
    /// drains, whether or not `exit_on_idle` is set.
    pub async fn run<F>(mut self, shutdown: F) -> EngineResult<DaemonExit>
    where
        F: Future<Output = ()>,
    {
        let mut events = self.engine.take_backend_events();
        let mut monitor = tokio::time::interval(self.engine.config().monitor_interval);
        monitor.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let exit_on_idle = self.engine.config().exit_on_idle;
        tokio::pin!(shutdown);

        info!(backend = self.engine.backend().name(), "daemon running");
        let exit = loop {
            let deadline = self.engine.next_deadline();
            tokio::select! {
                () = &mut shutdown => break DaemonExit::Shutdown,
                Some(event) = next_event(&mut events) => {
                    self.engine.handle_backend_event(event);
                }
                () = sleep_until(deadline) => {
                    self.engine.poll_timers();
                }
                _ = monitor.tick() => {
                    self.engine.check_monitors();
                    if let Some(limit) = exit_on_idle {
                        let idle = u64::from(self.engine.get_seconds_idle());
                        if idle >= limit.as_secs() {
                            info!(idle, "idle for too long");
                            break DaemonExit::Idle;
                        }
                    }
                }
                Some(command) = self.commands.recv() => self.handle(command),
                Some(signal) = self.signals.recv() => {
                    if signal == DaemonSignal::Quit {
                        break DaemonExit::Quit;
                    }
                }
            }
            if self.quit_when_idle && self.engine.list().size() == 0 {
                info!("queue drained after a quit suggestion");
                break DaemonExit::Quit;
            }
        };

        info!(?exit, "daemon stopping");
        self.engine.shutdown();
        Ok(exit)
    }

    fn handle(&mut self, command: DaemonCommand) {
        let engine = &mut self.engine;
        // A dropped reply only means the client gave up waiting.
        match command {
            DaemonCommand::GetTid { caller, reply } => {
                let _ = reply.send(engine.get_tid(&caller));
            }
            DaemonCommand::Submit {
                tid,
                request,
                reply,
            } => {
                let _ = reply.send(engine.submit(&tid, request));
            }
            DaemonCommand::Cancel { tid, caller, reply } => {
                let _ = reply.send(engine.cancel(&tid, caller.as_deref()));
            }
            DaemonCommand::SetLocale { tid, code, reply } => {
                let _ = reply.send(engine.set_locale(&tid, &code));
            }
            DaemonCommand::StateHasChanged { reason, reply } => {
                let _ = reply.send(engine.state_has_changed(&reason));
            }
            DaemonCommand::SetNetworkState { state, reply } => {
                engine.set_network_state(state);
                let _ = reply.send(());
            }
            DaemonCommand::SuggestQuit { reply } => {
                engine.suggest_quit();
                self.quit_when_idle = engine.list().size() > 0;
                let _ = reply.send(());
            }
            DaemonCommand::GetTransactionList { reply } => {
                let _ = reply.send(engine.get_transaction_list());
            }
            DaemonCommand::GetDaemonState { reply } => {
                let _ = reply.send(engine.get_daemon_state());
            }
            DaemonCommand::GetProgress { tid, reply } => {
                let _ = reply.send(query(engine, &tid, Transaction::progress));
            }
            DaemonCommand::SubscribeTransaction { tid, reply } => {
                let _ = reply.send(engine.subscribe_async(&tid));
            }
            DaemonCommand::History { limit, reply } => {
                let _ = reply.send(engine.history(limit));
            }
            DaemonCommand::SetProxy {
                caller,
                http,
                ftp,
                reply,
            } => {
                let _ = reply.send(engine.set_proxy(&caller, http.as_deref(), ftp.as_deref()));
            }
            DaemonCommand::CallerDisconnected { caller, reply } => {
                engine.caller_disconnected(&caller);
                let _ = reply.send(());
            }
            DaemonCommand::GetActions { reply } => {
                let _ = reply.send(engine.get_actions());
            }
            DaemonCommand::GetGroups { reply } => {
                let _ = reply.send(engine.get_groups());
            }
            DaemonCommand::GetFilters { reply } => {
                let _ = reply.send(engine.get_filters());
            }
            DaemonCommand::GetMimeTypes { reply } => {
                let _ = reply.send(engine.get_mime_types());
            }
            DaemonCommand::GetBackendDetail { reply } => {
                let _ = reply.send(engine.get_backend_detail());
            }
            DaemonCommand::GetTimeSinceAction { role, reply } => {
                let _ = reply.send(engine.get_time_since_action(&role));
            }
            DaemonCommand::GetNetworkState { reply } => {
                let _ = reply.send(engine.get_network_state());
            }
            DaemonCommand::GetStatus { tid, reply } => {
                let _ = reply.send(query(engine, &tid, Transaction::status));
            }
            DaemonCommand::GetRole { tid, reply } => {
                let _ = reply.send(query(engine, &tid, Transaction::role));
            }
            DaemonCommand::GetPackageLast { tid, reply } => {
                let last = query(engine, &tid, Transaction::package_last)
                    .and_then(|last| last.map_err(EngineError::from));
                let _ = reply.send(last);
            }
            DaemonCommand::GetAllowCancel { tid, reply } => {
                let _ = reply.send(query(engine, &tid, Transaction::allow_cancel));
            }
            DaemonCommand::IsCallerActive { tid, reply } => {
                let _ = reply.send(query(engine, &tid, Transaction::is_caller_active));
            }
        }
        debug!("command handled");
    }
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

fn query<T>(
    engine: &Engine,
    tid: &str,
    f: impl FnOnce(&Transaction) -> T,
) -> EngineResult<T> {
    engine
        .transaction(tid)
        .map(f)
        .ok_or_else(|| no_such_transaction(tid))
}

async fn next_event(events: &mut Option<UnboundedReceiver<BackendEvent>>) -> Option<BackendEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::config::{DaemonConfig, ExecutionMode};
    use crate::engine::EngineBuilder;
    use pkd_core::{Exit, Info};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::time::timeout;

    const LIMIT: Duration = Duration::from_secs(10);

    fn daemon(config: DaemonConfig) -> (Daemon, DaemonHandle) {
        let engine = EngineBuilder::new(config)
            .backend(Box::new(DummyBackend::new()))
            .build()
            .unwrap();
        Daemon::new(engine)
    }

    fn manual_daemon() -> (Daemon, DaemonHandle) {
        let engine = EngineBuilder::new(DaemonConfig::new().execution(ExecutionMode::Inline))
            .backend(Box::new(DummyBackend::manual().0))
            .build()
            .unwrap();
        Daemon::new(engine)
    }

    fn resolve(package: &str) -> RoleRequest {
        RoleRequest::Resolve {
            filter: "none".into(),
            packages: vec![package.into()],
        }
    }

    #[tokio::test]
    async fn resolve_through_the_handle() {
        let temp = tempdir().unwrap();
        let (daemon, handle) = daemon(DaemonConfig::new().cache_dir(temp.path()));
        let (stop, stopped) = oneshot::channel::<()>();
        let runner = tokio::spawn(daemon.run(async {
            let _ = stopped.await;
        }));

        let tid = handle.get_tid(":1.7").await.unwrap();
        let mut signals = handle.subscribe(&tid).await.unwrap();
        handle
            .submit(
                &tid,
                RoleRequest::Resolve {
                    filter: "none".into(),
                    packages: vec!["glib2".into()],
                },
            )
            .await
            .unwrap();

        let exit = timeout(LIMIT, async {
            while let Some(signal) = signals.recv().await {
                if let TransactionSignal::Finished { exit, .. } = signal {
                    return Some(exit);
                }
            }
            None
        })
        .await
        .unwrap();
        assert_eq!(exit, Some(Exit::Success));
        assert!(handle.get_transaction_list().await.unwrap().is_empty());

        stop.send(()).unwrap();
        let exit = timeout(LIMIT, runner).await.unwrap().unwrap().unwrap();
        assert_eq!(exit, DaemonExit::Shutdown);
    }

    #[tokio::test]
    async fn suggest_quit_stops_an_empty_daemon() {
        let (daemon, handle) = daemon(DaemonConfig::new());
        let runner = tokio::spawn(daemon.run(std::future::pending()));
        handle.suggest_quit().await.unwrap();
        let exit = timeout(LIMIT, runner).await.unwrap().unwrap().unwrap();
        assert_eq!(exit, DaemonExit::Quit);
        assert!(handle.get_tid(":1.7").await.is_err());
    }

    #[tokio::test]
    async fn exits_when_idle() {
        let config = DaemonConfig::new()
            .monitor_interval(Duration::from_millis(20))
            .exit_on_idle(Some(Duration::ZERO));
        let (daemon, _handle) = daemon(config);
        let exit = timeout(LIMIT, daemon.run(std::future::pending()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit, DaemonExit::Idle);
    }

    #[tokio::test]
    async fn unknown_transaction_progress() {
        let (daemon, handle) = daemon(DaemonConfig::new());
        let runner = tokio::spawn(daemon.run(std::future::pending()));
        let err = handle.get_progress("/404_deadbeef_data").await.unwrap_err();
        assert!(matches!(err, EngineError::Transaction(_)));
        handle.suggest_quit().await.unwrap();
        timeout(LIMIT, runner).await.unwrap().unwrap().unwrap();
    }

    #[tokio::test]
    async fn backend_queries_through_the_handle() {
        let (daemon, handle) = daemon(DaemonConfig::new());
        let runner = tokio::spawn(daemon.run(std::future::pending()));

        assert!(handle.get_actions().await.unwrap().contains("resolve"));
        assert!(!handle.get_filters().await.unwrap().is_empty());
        assert!(!handle.get_groups().await.unwrap().is_empty());
        let (name, _author) = handle.get_backend_detail().await.unwrap();
        assert_eq!(name, "dummy");
        assert_eq!(
            handle.get_network_state().await.unwrap(),
            NetworkState::default()
        );
        handle.set_network_state(NetworkState::Offline).await.unwrap();
        assert_eq!(handle.get_network_state().await.unwrap(), NetworkState::Offline);

        handle
            .set_proxy(":1.7", Some("http://proxy:3128"), None)
            .await
            .unwrap();
        let err = handle.set_proxy(":1.7", Some("$proxy"), None).await.unwrap_err();
        assert!(matches!(err, EngineError::CannotSetProxy { .. }));

        assert_eq!(handle.get_time_since_action("install-packages").await.unwrap(), 0);
        assert!(handle.get_time_since_action("bogus-role").await.is_err());

        handle.suggest_quit().await.unwrap();
        timeout(LIMIT, runner).await.unwrap().unwrap().unwrap();
    }

    #[tokio::test]
    async fn transaction_queries_through_the_handle() {
        let (daemon, handle) = manual_daemon();
        let backend = Arc::clone(daemon.engine().backend());
        let runner = tokio::spawn(daemon.run(std::future::pending()));

        let tid = handle.get_tid(":1.7").await.unwrap();
        handle.submit(&tid, resolve("glib2")).await.unwrap();

        let (role, _) = handle.get_role(&tid).await.unwrap();
        assert_eq!(role, Role::Resolve);
        assert!(!handle.get_allow_cancel(&tid).await.unwrap());
        assert!(handle.get_package_last(&tid).await.is_err());
        assert!(handle.is_caller_active(&tid).await.unwrap());

        handle.caller_disconnected(":1.7").await.unwrap();
        assert!(!handle.is_caller_active(&tid).await.unwrap());
        assert_eq!(handle.get_transaction_list().await.unwrap(), vec![tid.clone()]);

        backend.set_status(Status::Query);
        backend.package(Info::Installed, "glib2;2.14.0;i386;fedora", "The GLib library");
        let last = timeout(LIMIT, async {
            loop {
                if let Ok(last) = handle.get_package_last(&tid).await {
                    return last;
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(last, "glib2;2.14.0;i386;fedora");
        assert_eq!(handle.get_status(&tid).await.unwrap(), Status::Query);

        assert!(handle.get_status("/404_deadbeef_data").await.is_err());
        assert!(handle.get_role("/404_deadbeef_data").await.is_err());

        backend.finished();
        handle.suggest_quit().await.unwrap();
        timeout(LIMIT, runner).await.unwrap().unwrap().unwrap();
    }

    #[tokio::test]
    async fn deferred_quit_ends_the_run_once_drained() {
        let (daemon, handle) = manual_daemon();
        let backend = Arc::clone(daemon.engine().backend());
        let runner = tokio::spawn(daemon.run(std::future::pending()));

        let tid = handle.get_tid(":1.7").await.unwrap();
        handle.submit(&tid, resolve("glib2")).await.unwrap();
        handle.suggest_quit().await.unwrap();
        assert_eq!(handle.get_transaction_list().await.unwrap(), vec![tid]);

        backend.set_status(Status::Query);
        backend.finished();
        let exit = timeout(LIMIT, runner).await.unwrap().unwrap().unwrap();
        assert_eq!(exit, DaemonExit::Quit);
    }
}
