//! The daemon facade: id issuance, capability queries, environment
//! reactivity and the main-loop primitives.

use crate::backend::{Backend, BackendRegistry, PackageBackend};
use crate::clock::{Clock, SystemClock};
use crate::config::{DaemonConfig, StateChangedTier};
use crate::context::DaemonContext;
use crate::error::{EngineError, EngineResult, TransactionError};
use crate::events::{BackendEvent, DaemonSignal, TransactionSignal};
use crate::feed::EventFeed;
use crate::monitor::FileMonitor;
use crate::post_trans::{NoopPostTransaction, PostTransaction};
use crate::request::RoleRequest;
use crate::security::{AllowAll, Security};
use crate::transaction::{CancelOutcome, Transaction, TransactionList};
use pkd_core::{CoreResult, LedgerRecord, NetworkState, Role, StateDir, TransactionDb};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

/// Idle time reported while a restart or shutdown is pending.
pub const IDLE_FOREVER: u32 = u32::MAX;

const RUN_UNTIL_IDLE_LIMIT: usize = 10_000;

/// Assembles an [`Engine`] from a configuration and optional collaborators.
///
/// Unset collaborators default to the real clock, [`AllowAll`],
/// [`NoopPostTransaction`] and the backend named in the configuration,
/// looked up in [`BackendRegistry::builtin`].
pub struct EngineBuilder {
    config: DaemonConfig,
    clock: Option<Arc<dyn Clock>>,
    security: Option<Box<dyn Security>>,
    post_transaction: Option<Box<dyn PostTransaction>>,
    implementation: Option<Box<dyn PackageBackend>>,
    registry: Option<BackendRegistry>,
}

impl EngineBuilder {
    /// Starts from a configuration.
    pub fn new(config: DaemonConfig) -> Self {
        Self {
            config,
            clock: None,
            security: None,
            post_transaction: None,
            implementation: None,
            registry: None,
        }
    }

    /// Uses a specific clock.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Uses a specific policy.
    #[must_use]
    pub fn security(mut self, security: Box<dyn Security>) -> Self {
        self.security = Some(security);
        self
    }

    /// Uses specific post-transaction hooks.
    #[must_use]
    pub fn post_transaction(mut self, hooks: Box<dyn PostTransaction>) -> Self {
        self.post_transaction = Some(hooks);
        self
    }

    /// Uses this implementation instead of looking one up by name.
    #[must_use]
    pub fn backend(mut self, implementation: Box<dyn PackageBackend>) -> Self {
        self.implementation = Some(implementation);
        self
    }

    /// Looks the configured backend name up in this registry.
    #[must_use]
    pub fn registry(mut self, registry: BackendRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Loads and locks the backend and opens the ledger.
    ///
    /// Any failure here is fatal for the daemon.
    pub fn build(self) -> EngineResult<Engine> {
        let config = self.config;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let implementation = match self.implementation {
            Some(implementation) => implementation,
            None => self.registry.unwrap_or_default().load(&config.backend)?,
        };

        let (backend, events) = Backend::new(implementation, &config, Arc::clone(&clock));
        backend.lock()?;
        backend.set_proxy(config.proxy_http.clone(), config.proxy_ftp.clone());

        let (db, state_dir) = match open_ledger(&config) {
            Ok(opened) => opened,
            Err(e) => {
                backend.unlock();
                return Err(e.into());
            }
        };

        info!(
            backend = backend.name(),
            roles = %backend.roles(),
            "engine started"
        );

        let config_monitor = config.config_file.as_ref().map(FileMonitor::new);
        let binary_monitor = config.binary_file.as_ref().map(FileMonitor::new);
        let security = self.security.unwrap_or_else(|| Box::new(AllowAll::new()));
        let post_transaction = self
            .post_transaction
            .unwrap_or_else(|| Box::new(NoopPostTransaction));
        let now = clock.now();
        let ctx = Arc::new(DaemonContext::new(
            config,
            clock,
            backend,
            security,
            post_transaction,
            db,
            state_dir,
        ));

        Ok(Engine {
            list: TransactionList::new(Arc::clone(&ctx)),
            ctx,
            events: Some(events),
            last_activity: now,
            shutdown_asap: false,
            notify_upgrade: false,
            state_changed_priority: None,
            state_changed_normal: None,
            config_monitor,
            binary_monitor,
        })
    }
}

impl std::fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn open_ledger(config: &DaemonConfig) -> CoreResult<(TransactionDb, Option<StateDir>)> {
    match &config.state_dir {
        Some(path) => {
            let dir = StateDir::open(path, true)?;
            let db = TransactionDb::open(&dir)?;
            Ok((db, Some(dir)))
        }
        None => Ok((TransactionDb::in_memory(), None)),
    }
}

/// The daemon core.
///
/// All methods are meant to be called from one task. Backend events are
/// queued by the worker and applied by [`Engine::process_events`] or
/// [`Engine::handle_backend_event`].
pub struct Engine {
    ctx: Arc<DaemonContext>,
    list: TransactionList,
    events: Option<UnboundedReceiver<BackendEvent>>,
    last_activity: Instant,
    shutdown_asap: bool,
    notify_upgrade: bool,
    state_changed_priority: Option<Instant>,
    state_changed_normal: Option<Instant>,
    config_monitor: Option<FileMonitor>,
    binary_monitor: Option<FileMonitor>,
}

impl Engine {
    /// Shorthand for `EngineBuilder::new(config).build()`.
    pub fn new(config: DaemonConfig) -> EngineResult<Self> {
        EngineBuilder::new(config).build()
    }

    // --- transactions ---

    /// Issues a transaction id and registers an empty transaction for it.
    pub fn get_tid(&mut self, caller: &str) -> EngineResult<String> {
        let tid = self.ctx.db.lock().generate_id();
        self.list.create(&tid, caller)?;
        self.reset_idle();
        debug!(tid = %tid, caller, "issued transaction id");
        Ok(tid)
    }

    /// Gives a transaction its role request and queues it.
    pub fn submit(&mut self, tid: &str, request: RoleRequest) -> EngineResult<()> {
        self.reset_idle();
        self.list.submit(tid, request)?;
        Ok(())
    }

    /// Sets the locale of an uncommitted transaction.
    pub fn set_locale(&mut self, tid: &str, code: &str) -> EngineResult<()> {
        self.reset_idle();
        let transaction = self.list.get_mut(tid).ok_or_else(|| no_such_transaction(tid))?;
        transaction.set_locale(code)?;
        Ok(())
    }

    /// Cancels a transaction. `caller` is checked against the policy when it
    /// is not the owner.
    pub fn cancel(&mut self, tid: &str, caller: Option<&str>) -> EngineResult<CancelOutcome> {
        self.reset_idle();
        Ok(self.list.cancel(tid, caller)?)
    }

    /// Borrows a transaction.
    pub fn transaction(&self, tid: &str) -> Option<&Transaction> {
        self.list.get(tid)
    }

    /// The transaction list.
    pub fn list(&self) -> &TransactionList {
        &self.list
    }

    /// Subscribes to one transaction with a blocking receiver.
    pub fn subscribe(&self, tid: &str) -> EngineResult<Receiver<TransactionSignal>> {
        self.list
            .get(tid)
            .map(Transaction::subscribe)
            .ok_or_else(|| no_such_transaction(tid))
    }

    /// Subscribes to one transaction with an async receiver.
    pub fn subscribe_async(&self, tid: &str) -> EngineResult<UnboundedReceiver<TransactionSignal>> {
        self.list
            .get(tid)
            .map(Transaction::subscribe_async)
            .ok_or_else(|| no_such_transaction(tid))
    }

    /// Subscribes to daemon signals with a blocking receiver.
    pub fn subscribe_daemon(&self) -> Receiver<DaemonSignal> {
        self.ctx.signals.subscribe()
    }

    /// Subscribes to daemon signals with an async receiver.
    pub fn subscribe_daemon_async(&self) -> UnboundedReceiver<DaemonSignal> {
        self.ctx.signals.subscribe_async()
    }

    /// The daemon signal feed.
    pub fn signals(&self) -> &Arc<EventFeed<DaemonSignal>> {
        &self.ctx.signals
    }

    /// Notes that a client went away.
    pub fn caller_disconnected(&mut self, caller: &str) {
        self.list.caller_disconnected(caller);
    }

    // --- queries ---

    /// Ids of committed, unfinished transactions, running first.
    pub fn get_transaction_list(&mut self) -> Vec<String> {
        self.reset_idle();
        self.list.get_array()
    }

    /// A debugging dump of the transaction list.
    pub fn get_daemon_state(&mut self) -> String {
        self.reset_idle();
        self.list.get_state()
    }

    /// Roles the backend supports, as `;`-joined text.
    pub fn get_actions(&mut self) -> String {
        self.reset_idle();
        self.ctx.backend.roles().to_text()
    }

    /// Groups the backend knows, as `;`-joined text.
    pub fn get_groups(&mut self) -> String {
        self.reset_idle();
        self.ctx.backend.groups().to_text()
    }

    /// Filters the backend honors, as `;`-joined text.
    pub fn get_filters(&mut self) -> String {
        self.reset_idle();
        self.ctx.backend.filters().to_text()
    }

    /// Mime types the backend can install, as `;`-joined text.
    pub fn get_mime_types(&mut self) -> EngineResult<String> {
        self.reset_idle();
        let mime_types = self.ctx.backend.mime_types();
        if mime_types.is_empty() {
            return Err(EngineError::not_supported("Backend does not support any mime types"));
        }
        Ok(mime_types.join(";"))
    }

    /// Backend name and author.
    pub fn get_backend_detail(&mut self) -> (String, String) {
        self.reset_idle();
        let backend = &self.ctx.backend;
        (backend.name().to_string(), backend.author().to_string())
    }

    /// Seconds since `role_text` last succeeded, zero if it never did.
    pub fn get_time_since_action(&mut self, role_text: &str) -> EngineResult<u64> {
        self.reset_idle();
        let role: Role = role_text.parse()?;
        let now = self.ctx.clock.unix_time();
        Ok(self.ctx.db.lock().action_time_since(role, now))
    }

    /// Up to `limit` ledger records, newest first.
    pub fn history(&self, limit: usize) -> Vec<LedgerRecord> {
        self.ctx.db.lock().get_list(limit)
    }

    /// Current network state.
    pub fn get_network_state(&mut self) -> NetworkState {
        self.reset_idle();
        self.ctx.backend.network_state()
    }

    /// Records a network transition and republishes it.
    pub fn set_network_state(&mut self, state: NetworkState) {
        info!(state = %state, "network state changed");
        self.ctx.backend.set_network_state(state);
        self.ctx.signals.emit(DaemonSignal::NetworkStateChanged(state));
    }

    /// Sets the proxies used by the backend.
    pub fn set_proxy(
        &mut self,
        caller: &str,
        http: Option<&str>,
        ftp: Option<&str>,
    ) -> EngineResult<()> {
        self.reset_idle();
        self.ctx
            .security
            .is_allowed(caller, Role::SetProxyPrivate, true)
            .map_err(EngineError::refused_by_policy)?;
        let invalid = [http, ftp]
            .into_iter()
            .flatten()
            .any(|proxy| !pkd_core::strvalidate(proxy));
        if invalid {
            return Err(EngineError::cannot_set_proxy("Invalid proxy text"));
        }
        info!(caller, ?http, ?ftp, "setting proxy");
        self.ctx
            .backend
            .set_proxy(http.map(str::to_string), ftp.map(str::to_string));
        Ok(())
    }

    // --- environment ---

    /// Schedules an updates refresh after an external hint.
    ///
    /// The reason picks the debounce tier. While a priority refresh is
    /// pending every hint is refused; a priority hint replaces a pending
    /// normal one.
    pub fn state_has_changed(&mut self, reason: &str) -> EngineResult<()> {
        self.reset_idle();
        let timing = &self.ctx.config.timing;
        if self.state_changed_priority.is_some() {
            return Err(EngineError::invalid_state(format!(
                "Already asked to refresh priority state less than {} seconds ago",
                timing.state_changed_priority.as_secs()
            )));
        }

        let now = self.ctx.clock.now();
        match self.ctx.config.tier_for(reason) {
            StateChangedTier::Normal => {
                if self.state_changed_normal.is_some() {
                    return Err(EngineError::invalid_state(format!(
                        "Already asked to refresh normal state less than {} seconds ago",
                        timing.state_changed_normal.as_secs()
                    )));
                }
                debug!(reason, "scheduling normal state refresh");
                self.state_changed_normal = Some(now + timing.state_changed_normal);
            }
            StateChangedTier::Priority => {
                if self.state_changed_normal.take().is_some() {
                    debug!("priority refresh replaces pending normal one");
                }
                debug!(reason, "scheduling priority state refresh");
                self.state_changed_priority = Some(now + timing.state_changed_priority);
            }
        }
        Ok(())
    }

    /// Seconds since the last activity.
    ///
    /// Zero while work is queued, [`IDLE_FOREVER`] when the daemon should be
    /// restarted. A pending upgrade also publishes RestartSchedule.
    pub fn get_seconds_idle(&mut self) -> u32 {
        if self.list.size() > 0 {
            debug!("transactions pending, not idle");
            self.reset_idle();
            return 0;
        }
        if self.notify_upgrade {
            debug!("binary changed, asking clients to reconnect");
            self.ctx.signals.emit(DaemonSignal::RestartSchedule);
            return IDLE_FOREVER;
        }
        if self.shutdown_asap {
            debug!("shutdown requested, reporting forever idle");
            return IDLE_FOREVER;
        }
        let idle = self
            .ctx
            .clock
            .now()
            .saturating_duration_since(self.last_activity);
        u32::try_from(idle.as_secs()).unwrap_or(IDLE_FOREVER)
    }

    /// Quits now if nothing is queued, otherwise once idle.
    pub fn suggest_quit(&mut self) {
        if self.list.size() == 0 {
            info!("nothing queued, quitting");
            self.ctx.signals.emit(DaemonSignal::Quit);
            return;
        }
        info!("work queued, will quit when idle");
        self.shutdown_asap = true;
    }

    /// Returns true once a quit was deferred or the configuration changed.
    pub fn is_shutdown_pending(&self) -> bool {
        self.shutdown_asap
    }

    /// Rehashes the watched files.
    pub fn check_monitors(&mut self) {
        if self.config_monitor.as_mut().is_some_and(FileMonitor::changed) {
            info!("configuration changed, will quit when idle");
            self.shutdown_asap = true;
        }
        if self.binary_monitor.as_mut().is_some_and(FileMonitor::changed) {
            info!("daemon binary changed, clients will be told to expect a restart");
            self.notify_upgrade = true;
        }
    }

    // --- main loop ---

    /// Hands the backend event receiver to an external loop.
    ///
    /// Afterwards [`Engine::process_events`] does nothing and the caller
    /// feeds events through [`Engine::handle_backend_event`].
    pub fn take_backend_events(&mut self) -> Option<UnboundedReceiver<BackendEvent>> {
        self.events.take()
    }

    /// Applies one backend event.
    pub fn handle_backend_event(&mut self, event: BackendEvent) {
        self.list.handle_backend_event(event);
    }

    /// Applies every queued backend event. Returns how many were applied.
    pub fn process_events(&mut self) -> usize {
        let mut count = 0;
        while let Some(event) = self.events.as_mut().and_then(|rx| rx.try_recv().ok()) {
            self.list.handle_backend_event(event);
            count += 1;
        }
        count
    }

    /// Fires every due timer. Returns true if anything fired.
    pub fn poll_timers(&mut self) -> bool {
        let now = self.ctx.clock.now();
        let mut fired = self.ctx.backend.poll_timers(now);
        self.process_events();
        fired |= self.list.poll_timers(now);
        fired |= self.ctx.notify.lock().poll(now);
        fired |= self.poll_state_changed(now);
        fired
    }

    fn poll_state_changed(&mut self, now: Instant) -> bool {
        let priority_due = self.state_changed_priority.is_some_and(|at| at <= now);
        let normal_due = self.state_changed_normal.is_some_and(|at| at <= now);
        if !priority_due && !normal_due {
            return false;
        }

        let timing = &self.ctx.config.timing;
        if !self.ctx.backend.is_online() {
            debug!("offline, postponing state refresh");
            if priority_due {
                self.state_changed_priority = Some(now + timing.state_changed_priority);
            }
            if normal_due {
                self.state_changed_normal = Some(now + timing.state_changed_normal);
            }
            return true;
        }

        info!("state changed, invalidating updates");
        self.ctx.cache.lock().invalidate();
        self.ctx.notify.lock().updates_changed_now();
        self.state_changed_priority = None;
        self.state_changed_normal = None;
        self.reset_idle();
        true
    }

    /// The earliest pending deadline of any timer.
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.ctx.backend.next_deadline(),
            self.list.next_deadline(),
            self.ctx.notify.lock().next_deadline(),
            self.state_changed_priority,
            self.state_changed_normal,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Applies queued events and fires due timers until neither has work.
    pub fn run_until_idle(&mut self) {
        for _ in 0..RUN_UNTIL_IDLE_LIMIT {
            let applied = self.process_events();
            let fired = self.poll_timers();
            if applied == 0 && !fired {
                return;
            }
        }
        warn!("still busy after {} iterations", RUN_UNTIL_IDLE_LIMIT);
    }

    /// Unlocks the backend.
    pub fn shutdown(&mut self) {
        info!("engine shutting down");
        self.ctx.backend.unlock();
    }

    // --- accessors ---

    /// The shared backend.
    pub fn backend(&self) -> &Arc<Backend> {
        &self.ctx.backend
    }

    /// The configuration.
    pub fn config(&self) -> &DaemonConfig {
        &self.ctx.config
    }

    /// The clock every deadline is computed from.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.ctx.clock
    }

    fn reset_idle(&mut self) {
        self.last_activity = self.ctx.clock.now();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("backend", &self.ctx.backend.name())
            .field("list", &self.list)
            .field("shutdown_asap", &self.shutdown_asap)
            .finish_non_exhaustive()
    }
}

pub(crate) fn no_such_transaction(tid: &str) -> EngineError {
    TransactionError::no_such_transaction(format!("No transaction {tid}")).into()
}
