//! One client request, from id issuance to its Finished signal.

use super::validate::validate_request;
use crate::backend::download_directory_for;
use crate::context::DaemonContext;
use crate::error::{TransactionError, TransactionResult};
use crate::events::{BackendEventKind, Progress, TransactionSignal};
use crate::feed::EventFeed;
use crate::request::RoleRequest;
use pkd_core::{
    ErrorCode, Exit, Filter, Info, MessageKind, PackageItem, Restart, RestartRequest, Role,
    Status,
};
use std::fs;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

/// Lifecycle of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// Id issued, nothing cached yet.
    Created,
    /// Request validated and cached.
    Parameterized,
    /// Queued for the backend.
    Committed,
    /// Holding the backend.
    Running,
    /// Finished signal emitted.
    Finished,
}

/// Outcome of caching a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prepared {
    /// The request needs the backend and should be committed.
    Commit,
    /// The request was answered without the backend and is finished.
    Completed,
}

/// Outcome of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The transaction never ran and finished as cancelled on the spot.
    Immediate,
    /// The backend was asked to abort; Finished follows asynchronously.
    Requested,
    /// The transaction had already finished.
    AlreadyFinished,
}

/// A single tracked request.
pub struct Transaction {
    tid: String,
    caller: String,
    ctx: Arc<DaemonContext>,
    state: TransactionState,
    request: Option<RoleRequest>,
    role: Role,
    status: Status,
    exit: Exit,
    progress: Progress,
    allow_cancel: bool,
    caller_active: bool,
    locale: Option<String>,
    packages: Vec<PackageItem>,
    last_package_id: Option<String>,
    error: Option<(ErrorCode, String)>,
    restart: Option<Restart>,
    signature_required: bool,
    eula_required: bool,
    created_at: Instant,
    started_at: Option<Instant>,
    runtime: Duration,
    signals: EventFeed<TransactionSignal>,
}

impl Transaction {
    pub(crate) fn new(tid: String, caller: String, ctx: Arc<DaemonContext>) -> Self {
        let created_at = ctx.clock.now();
        Self {
            tid,
            caller,
            ctx,
            state: TransactionState::Created,
            request: None,
            role: Role::Unknown,
            status: Status::Wait,
            exit: Exit::Unknown,
            progress: Progress::UNKNOWN,
            allow_cancel: false,
            caller_active: true,
            locale: None,
            packages: Vec::new(),
            last_package_id: None,
            error: None,
            restart: None,
            signature_required: false,
            eula_required: false,
            created_at,
            started_at: None,
            runtime: Duration::ZERO,
            signals: EventFeed::new(),
        }
    }

    // --- queries ---

    /// Transaction id.
    pub fn tid(&self) -> &str {
        &self.tid
    }

    /// Identity of the client that asked for the id.
    pub fn caller(&self) -> &str {
        &self.caller
    }

    /// Lifecycle state.
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// The cached request.
    pub fn request(&self) -> Option<&RoleRequest> {
        self.request.as_ref()
    }

    /// The role and a short text describing what it is about.
    pub fn role(&self) -> (Role, String) {
        let text = self
            .request
            .as_ref()
            .map(RoleRequest::summary_text)
            .unwrap_or_default();
        (self.role, text)
    }

    /// Last reported status.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Exit kind, `Unknown` until finished.
    pub fn exit(&self) -> Exit {
        self.exit
    }

    /// Last reported progress.
    pub fn progress(&self) -> Progress {
        self.progress
    }

    /// Whether cancelling is currently safe.
    pub fn allow_cancel(&self) -> bool {
        self.allow_cancel
    }

    /// Whether the client is still connected.
    pub fn is_caller_active(&self) -> bool {
        self.caller_active
    }

    /// Id of the last accepted package.
    pub fn package_last(&self) -> TransactionResult<String> {
        self.last_package_id
            .clone()
            .ok_or_else(|| TransactionError::invalid_state("No package data available"))
    }

    /// Every accepted package, in order.
    pub fn packages(&self) -> &[PackageItem] {
        &self.packages
    }

    /// The error reported by the backend, if any.
    pub fn error(&self) -> Option<(ErrorCode, &str)> {
        self.error
            .as_ref()
            .map(|(code, details)| (*code, details.as_str()))
    }

    /// Most severe restart requirement seen.
    pub fn restart(&self) -> Option<Restart> {
        self.restart
    }

    /// Runtime of the finished transaction.
    pub fn runtime(&self) -> Duration {
        self.runtime
    }

    /// When the id was issued.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Subscribes with a blocking receiver.
    pub fn subscribe(&self) -> Receiver<TransactionSignal> {
        self.signals.subscribe()
    }

    /// Subscribes with a receiver usable from async code.
    pub fn subscribe_async(&self) -> UnboundedReceiver<TransactionSignal> {
        self.signals.subscribe_async()
    }

    /// Every signal emitted so far.
    pub fn history(&self) -> Vec<TransactionSignal> {
        self.signals.history()
    }

    // --- client calls ---

    /// Sets the locale passed to the backend. Only once, before commit.
    pub fn set_locale(&mut self, code: &str) -> TransactionResult<()> {
        if let Some(locale) = &self.locale {
            return Err(TransactionError::not_supported(format!(
                "Already set locale to {locale}"
            )));
        }
        if !matches!(
            self.state,
            TransactionState::Created | TransactionState::Parameterized
        ) {
            return Err(TransactionError::invalid_state("Transaction already committed"));
        }
        if !pkd_core::strvalidate(code) {
            return Err(TransactionError::input_invalid("Invalid input passed to daemon"));
        }
        debug!(tid = %self.tid, code, "locale set");
        self.locale = Some(code.to_string());
        Ok(())
    }

    /// Validates and caches a request.
    ///
    /// Requests that can be answered from the daemon's own state finish
    /// here and return [`Prepared::Completed`].
    pub(crate) fn prepare(&mut self, request: RoleRequest) -> TransactionResult<Prepared> {
        if self.state != TransactionState::Created {
            return Err(TransactionError::invalid_state(format!(
                "Transaction {} already has a role",
                self.tid
            )));
        }

        let role = request.role();
        let served_locally = matches!(role, Role::AcceptEula | Role::GetOldTransactions);
        if !served_locally && !self.ctx.backend.supports_role(role) {
            return Err(TransactionError::not_supported(format!(
                "{role} not supported by backend"
            )));
        }

        validate_request(&request)?;

        if role.requires_authorization() {
            self.ctx
                .security
                .is_allowed(&self.caller, role, request.trusted())
                .map_err(TransactionError::refused_by_policy)?;
        }

        debug!(tid = %self.tid, role = %role, "request cached");
        self.role = role;
        self.state = TransactionState::Parameterized;
        self.request = Some(request);
        Ok(self.answer_locally())
    }

    fn answer_locally(&mut self) -> Prepared {
        let Some(request) = self.request.clone() else {
            return Prepared::Commit;
        };
        match request {
            RoleRequest::GetUpdates { .. } => {
                let cached = self.ctx.cache.lock().updates().map(<[PackageItem]>::to_vec);
                let Some(updates) = cached else {
                    return Prepared::Commit;
                };
                debug!(tid = %self.tid, count = updates.len(), "answering from updates cache");
                for item in updates {
                    self.packages.push(item.clone());
                    self.emit(TransactionSignal::Package(item));
                }
                self.finish_locally(Exit::Success);
                Prepared::Completed
            }
            RoleRequest::GetUpdateDetail { package_ids } => {
                let (cached, missing) = self.ctx.cache.lock().partition_details(&package_ids);
                for detail in cached {
                    self.emit(TransactionSignal::UpdateDetail(detail));
                }
                if missing.is_empty() {
                    self.finish_locally(Exit::Success);
                    return Prepared::Completed;
                }
                self.request = Some(RoleRequest::GetUpdateDetail {
                    package_ids: missing,
                });
                Prepared::Commit
            }
            RoleRequest::AcceptEula { eula_id } => {
                self.ctx.backend.accept_eula(&eula_id);
                self.finish_locally(Exit::Success);
                Prepared::Completed
            }
            RoleRequest::GetOldTransactions { number } => {
                let records = self.ctx.db.lock().get_list(number as usize);
                for record in records {
                    self.emit(TransactionSignal::Transaction(record));
                }
                self.finish_locally(Exit::Success);
                Prepared::Completed
            }
            _ => Prepared::Commit,
        }
    }

    /// Marks the transaction queued and creates its ledger row.
    pub(crate) fn commit(&mut self) -> TransactionResult<()> {
        if self.state != TransactionState::Parameterized {
            return Err(TransactionError::invalid_state(format!(
                "Transaction {} cannot be committed",
                self.tid
            )));
        }
        if self.role.is_recorded() {
            let timestamp = self.ctx.clock.unix_time();
            let mut db = self.ctx.db.lock();
            db.add(&self.tid, timestamp)
                .and_then(|()| db.set_role(&self.tid, self.role))
                .map_err(|e| {
                    warn!(tid = %self.tid, "failed to record transaction: {}", e);
                    TransactionError::commit_failed("Could not commit to a transaction object")
                })?;
        }
        self.state = TransactionState::Committed;
        Ok(())
    }

    /// Takes the backend and dispatches the cached request.
    pub(crate) fn run(&mut self) -> TransactionResult<()> {
        let Some(request) = self.request.clone() else {
            return Err(TransactionError::no_role("No role"));
        };
        let backend = Arc::clone(&self.ctx.backend);
        backend
            .reset()
            .map_err(|e| TransactionError::invalid_state(e.to_string()))?;

        info!(tid = %self.tid, role = %self.role, "running transaction");
        backend.set_current_tid(Some(self.tid.clone()));
        backend.set_locale(self.locale.clone().unwrap_or_else(|| "C".to_string()));
        backend.set_role(self.role);
        backend.set_status(Status::Setup);
        self.state = TransactionState::Running;
        self.started_at = Some(self.ctx.clock.now());

        if self.role == Role::DownloadPackages {
            let directory = download_directory_for(&self.ctx.config.cache_dir, &self.tid);
            if let Err(e) = fs::create_dir_all(&directory) {
                warn!(tid = %self.tid, "cannot create download directory: {}", e);
                backend.error_code(
                    ErrorCode::TransactionError,
                    &format!("Failed to create directory {}: {e}", directory.display()),
                );
                backend.finished();
                return Ok(());
            }
            backend.set_download_directory(directory);
        }

        backend
            .run(request)
            .map_err(|e| TransactionError::invalid_state(e.to_string()))
    }

    /// Finishes a transaction whose run could not start.
    pub(crate) fn fail_to_start(&mut self, error: &TransactionError) {
        self.error = Some((ErrorCode::InternalError, error.to_string()));
        self.emit(TransactionSignal::ErrorCode {
            code: ErrorCode::InternalError,
            details: error.to_string(),
        });
        self.finish_locally(Exit::Failed);
    }

    /// Cancels the transaction.
    ///
    /// `caller` is checked against the policy when it is not the owner.
    pub(crate) fn cancel(&mut self, caller: Option<&str>) -> TransactionResult<CancelOutcome> {
        if self.state == TransactionState::Finished {
            debug!(tid = %self.tid, "already finished, ignoring cancel");
            return Ok(CancelOutcome::AlreadyFinished);
        }
        if let Some(caller) = caller.filter(|caller| *caller != self.caller) {
            self.ctx
                .security
                .is_allowed(caller, Role::Cancel, true)
                .map_err(TransactionError::refused_by_policy)?;
        }

        if self.state != TransactionState::Running {
            debug!(tid = %self.tid, "cancelling a transaction that never ran");
            self.progress = Progress {
                percentage: 100,
                subpercentage: 100,
                elapsed: 0,
                remaining: 0,
            };
            self.emit(TransactionSignal::ProgressChanged(self.progress));
            self.allow_cancel = false;
            self.emit(TransactionSignal::AllowCancel(false));
            self.status = Status::Finished;
            self.emit(TransactionSignal::StatusChanged(Status::Finished));
            self.exit = Exit::Cancelled;
            self.state = TransactionState::Finished;
            self.emit(TransactionSignal::Finished {
                exit: Exit::Cancelled,
                runtime_ms: 0,
            });
            return Ok(CancelOutcome::Immediate);
        }

        if !self.ctx.backend.supports_cancel() {
            return Err(TransactionError::cannot_cancel(
                "Operation not yet supported by backend",
            ));
        }
        if self.role == Role::Unknown {
            return Err(TransactionError::no_role("No role"));
        }
        if !self.allow_cancel {
            return Err(TransactionError::cannot_cancel(
                "Tried to cancel a transaction that is not safe to kill",
            ));
        }

        info!(tid = %self.tid, "cancelling running transaction");
        self.ctx.backend.cancel();
        Ok(CancelOutcome::Requested)
    }

    /// Notes that the client went away. Does not cancel.
    pub(crate) fn caller_disconnected(&mut self) {
        if !self.caller_active {
            return;
        }
        debug!(tid = %self.tid, caller = %self.caller, "caller disconnected");
        self.caller_active = false;
        self.emit(TransactionSignal::CallerActiveChanged(false));
    }

    /// Announces removal and drops every subscriber.
    pub(crate) fn destroy(&mut self) {
        self.emit(TransactionSignal::Destroy);
        self.signals.close();
    }

    // --- backend events ---

    /// Republishes one backend event. Returns true when it was the event
    /// that finished the transaction.
    pub(crate) fn handle_backend_event(&mut self, kind: BackendEventKind) -> bool {
        let finished = self.state == TransactionState::Finished;
        match kind {
            BackendEventKind::StatusChanged(status) => {
                if finished {
                    debug!(tid = %self.tid, "ignoring status {} after finish", status);
                    return false;
                }
                self.status = status;
                self.emit(TransactionSignal::StatusChanged(status));
            }
            BackendEventKind::Progress(progress) => {
                self.progress = progress;
                self.emit(TransactionSignal::ProgressChanged(progress));
            }
            BackendEventKind::Package(item) => {
                if finished {
                    debug!(tid = %self.tid, "ignoring package {} after finish", item.package_id);
                    return false;
                }
                self.on_package(item);
            }
            BackendEventKind::Details(details) => self.emit(TransactionSignal::Details(details)),
            BackendEventKind::Files(files) => self.emit(TransactionSignal::Files(files)),
            BackendEventKind::UpdateDetail(detail) => {
                self.ctx.cache.lock().set_update_detail(detail.clone());
                self.emit(TransactionSignal::UpdateDetail(detail));
            }
            BackendEventKind::DistroUpgrade(upgrade) => {
                self.emit(TransactionSignal::DistroUpgrade(upgrade))
            }
            BackendEventKind::RepoDetail(repo) => self.emit(TransactionSignal::RepoDetail(repo)),
            BackendEventKind::Category(category) => {
                self.emit(TransactionSignal::Category(category))
            }
            BackendEventKind::Message { kind, details } => self.on_message(kind, details),
            BackendEventKind::RequireRestart(request) => self.on_require_restart(request),
            BackendEventKind::RepoSignatureRequired(request) => {
                self.signature_required = true;
                self.emit(TransactionSignal::RepoSignatureRequired(request));
            }
            BackendEventKind::EulaRequired(request) => {
                self.eula_required = true;
                self.emit(TransactionSignal::EulaRequired(request));
            }
            BackendEventKind::AllowCancel(allow) => {
                self.allow_cancel = allow;
                self.emit(TransactionSignal::AllowCancel(allow));
            }
            BackendEventKind::ErrorCode { code, details } => {
                if code == ErrorCode::Unknown {
                    let message = format!(
                        "{} emitted an unknown error code; the backend needs a proper code",
                        self.ctx.backend.name()
                    );
                    self.on_message(MessageKind::BackendError, message);
                }
                self.error = Some((code, details.clone()));
                self.emit(TransactionSignal::ErrorCode { code, details });
            }
            BackendEventKind::Finished(exit) => return self.on_finished(exit),
        }
        false
    }

    fn on_package(&mut self, item: PackageItem) {
        let backend = self.ctx.backend.name().to_string();
        if matches!(
            self.role,
            Role::UpdateSystem | Role::InstallPackages | Role::UpdatePackages
        ) && item.info == Info::Installed
        {
            let message = format!(
                "{backend} emitted 'installed' rather than 'installing' - \
                 you need to do the package *before* you do the action"
            );
            self.on_message(MessageKind::BackendError, message);
            return;
        }

        let filters = self
            .request
            .as_ref()
            .map(RoleRequest::filters)
            .unwrap_or_default();
        if filters.contains(Filter::NotInstalled) && item.info == Info::Installed {
            warn!(tid = %self.tid, "package {} violates ~installed", item.package_id);
            let message = format!(
                "{backend} emitted package that was installed when the ~installed filter is in place"
            );
            self.on_message(MessageKind::BackendError, message);
            return;
        }
        if filters.contains(Filter::Installed) && item.info == Info::Available {
            warn!(tid = %self.tid, "package {} violates installed", item.package_id);
            let message = format!(
                "{backend} emitted package that was ~installed when the installed filter is in place"
            );
            self.on_message(MessageKind::BackendError, message);
            return;
        }

        self.last_package_id = Some(item.package_id.clone());
        self.packages.push(item.clone());
        self.emit(TransactionSignal::Package(item));
    }

    fn on_message(&mut self, kind: MessageKind, details: String) {
        if kind.is_developer_only() && !self.ctx.config.developer_mode {
            warn!(tid = %self.tid, "{}: {}", kind, details);
            return;
        }
        self.emit(TransactionSignal::Message { kind, details });
    }

    fn on_require_restart(&mut self, request: RestartRequest) {
        let more_severe = self
            .restart
            .map_or(true, |current| request.restart.severity() > current.severity());
        if more_severe {
            debug!(tid = %self.tid, restart = %request.restart, "restart requirement raised");
            self.restart = Some(request.restart);
        }
        self.emit(TransactionSignal::RequireRestart(request));
    }

    fn on_finished(&mut self, backend_exit: Exit) -> bool {
        if self.state == TransactionState::Finished {
            warn!(tid = %self.tid, "already finished");
            return false;
        }

        let ctx = Arc::clone(&self.ctx);
        let role = self.role;
        let mut exit = backend_exit;
        let success = exit == Exit::Success;

        if success
            && matches!(role, Role::UpdateSystem | Role::UpdatePackages)
            && ctx.config.update_check_processes
        {
            let updated: Vec<String> = self
                .packages
                .iter()
                .filter(|item| item.info == Info::Updating)
                .map(|item| item.package_id.clone())
                .collect();
            for request in ctx.post_transaction.check_running_processes(&updated) {
                self.on_require_restart(request);
            }
        }

        if success && role == Role::RefreshCache {
            if ctx.config.refresh_cache_update_package_list {
                ctx.post_transaction.update_package_list();
            }
            if ctx.config.refresh_cache_scan_desktop_files {
                ctx.post_transaction.import_desktop_files();
            }
            ctx.post_transaction.clear_firmware_requests();
        }

        if self.allow_cancel {
            self.allow_cancel = false;
            self.emit(TransactionSignal::AllowCancel(false));
        }

        if exit != Exit::Cancelled {
            if self.signature_required {
                exit = Exit::KeyRequired;
            } else if self.eula_required {
                exit = Exit::EulaRequired;
            }
        }

        if success {
            let now = ctx.clock.now();
            {
                let mut cache = ctx.cache.lock();
                if role == Role::GetUpdates {
                    cache.set_updates(self.packages.clone());
                }
                if role.invalidates_updates() {
                    cache.invalidate();
                }
            }
            if role.invalidates_updates() || role == Role::RefreshCache {
                ctx.notify.lock().updates_changed(now);
            }
            if role.changes_repo_list() {
                ctx.notify.lock().repo_list_changed();
            }
        }

        self.runtime = self
            .started_at
            .map(|started| ctx.clock.now().saturating_duration_since(started))
            .unwrap_or_default();
        let runtime_ms = u64::try_from(self.runtime.as_millis()).unwrap_or(u64::MAX);

        {
            let mut db = ctx.db.lock();
            if success {
                if let Err(e) = db.action_time_reset(role, ctx.clock.unix_time()) {
                    warn!("failed to reset action time for {}: {}", role, e);
                }
            }
            if role.is_recorded() {
                let data = self
                    .packages
                    .iter()
                    .map(PackageItem::to_ledger_line)
                    .collect::<Vec<_>>()
                    .join("\n");
                let recorded = db
                    .set_data(&self.tid, &data)
                    .and_then(|()| db.set_finished(&self.tid, success, runtime_ms));
                if let Err(e) = recorded {
                    warn!(tid = %self.tid, "failed to record outcome: {}", e);
                }
            }
        }

        info!(tid = %self.tid, exit = %exit, runtime_ms, "transaction finished");
        self.exit = exit;
        self.status = Status::Finished;
        self.state = TransactionState::Finished;
        self.emit(TransactionSignal::Finished { exit, runtime_ms });
        true
    }

    fn finish_locally(&mut self, exit: Exit) {
        self.exit = exit;
        self.status = Status::Finished;
        self.state = TransactionState::Finished;
        self.emit(TransactionSignal::Finished {
            exit,
            runtime_ms: 0,
        });
    }

    fn emit(&self, signal: TransactionSignal) {
        self.signals.emit(signal);
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("tid", &self.tid)
            .field("role", &self.role)
            .field("state", &self.state)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, DummyBackend};
    use crate::clock::{Clock, ManualClock};
    use crate::config::{DaemonConfig, ExecutionMode};
    use crate::events::BackendEvent;
    use crate::post_trans::NoopPostTransaction;
    use crate::security::{AllowAll, RolePolicy, Security};
    use pkd_core::{RoleSet, TransactionDb};

    struct Harness {
        ctx: Arc<DaemonContext>,
        rx: UnboundedReceiver<BackendEvent>,
        clock: Arc<ManualClock>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with(DummyBackend::new(), Box::new(AllowAll::new()))
        }

        fn with(implementation: DummyBackend, security: Box<dyn Security>) -> Self {
            let clock = Arc::new(ManualClock::new());
            let config = DaemonConfig::new().execution(ExecutionMode::Inline);
            let (backend, rx) = Backend::new(Box::new(implementation), &config, clock.clone());
            backend.lock().unwrap();
            let ctx = DaemonContext::new(
                config,
                clock.clone(),
                backend,
                security,
                Box::new(NoopPostTransaction),
                TransactionDb::in_memory(),
                None,
            );
            Self {
                ctx: Arc::new(ctx),
                rx,
                clock,
            }
        }

        fn transaction(&self, tid: &str) -> Transaction {
            Transaction::new(tid.to_string(), ":1.42".to_string(), Arc::clone(&self.ctx))
        }

        /// Feeds backend events until the transaction finishes or nothing is pending.
        fn drive(&mut self, transaction: &mut Transaction) {
            loop {
                while let Ok(event) = self.rx.try_recv() {
                    assert_eq!(event.tid.as_deref(), Some(transaction.tid()));
                    if transaction.handle_backend_event(event.kind) {
                        return;
                    }
                }
                let Some(deadline) = self.ctx.backend.next_deadline() else {
                    return;
                };
                self.clock.advance_to(deadline);
                self.ctx.backend.poll_timers(self.clock.now());
            }
        }

        fn run(&mut self, request: RoleRequest) -> Transaction {
            let mut transaction = self.transaction("/1_abcdeabc_data");
            assert_eq!(transaction.prepare(request).unwrap(), Prepared::Commit);
            transaction.commit().unwrap();
            transaction.run().unwrap();
            self.drive(&mut transaction);
            transaction
        }
    }

    fn finished_exit(transaction: &Transaction) -> Option<Exit> {
        transaction.history().into_iter().find_map(|signal| match signal {
            TransactionSignal::Finished { exit, .. } => Some(exit),
            _ => None,
        })
    }

    #[test]
    fn locale_is_set_once() {
        let harness = Harness::new();
        let mut transaction = harness.transaction("/1_abcdeabc_data");
        transaction.set_locale("en_GB.utf8").unwrap();
        assert_eq!(
            transaction.set_locale("de_DE.utf8").unwrap_err().kind(),
            "not-supported"
        );
    }

    #[test]
    fn unsupported_role_is_refused() {
        let implementation = DummyBackend::new().with_roles(RoleSet::from_slice(&[Role::Resolve]));
        let harness = Harness::with(implementation, Box::new(AllowAll::new()));
        let mut transaction = harness.transaction("/1_abcdeabc_data");
        let err = transaction
            .prepare(RoleRequest::GetDetails {
                package_ids: vec!["glib2;2.14.0;i386;fedora".into()],
            })
            .unwrap_err();
        assert_eq!(
            err,
            TransactionError::not_supported("get-details not supported by backend")
        );
        assert_eq!(transaction.state(), TransactionState::Created);
    }

    #[test]
    fn policy_refusal_leaves_transaction_untouched() {
        let policy = RolePolicy::new().deny(Role::InstallPackages);
        let harness = Harness::with(DummyBackend::new(), Box::new(policy));
        let mut transaction = harness.transaction("/1_abcdeabc_data");
        let err = transaction
            .prepare(RoleRequest::InstallPackages {
                only_trusted: true,
                package_ids: vec!["gtkhtml2;2.19.1-4.fc8;i386;fedora".into()],
            })
            .unwrap_err();
        assert_eq!(err.kind(), "refused-by-policy");
        assert!(transaction.request().is_none());
    }

    #[test]
    fn resolve_runs_to_completion() {
        let mut harness = Harness::new();
        let transaction = harness.run(RoleRequest::Resolve {
            filter: "none".into(),
            packages: vec!["glib2".into()],
        });

        assert_eq!(transaction.state(), TransactionState::Finished);
        assert_eq!(transaction.exit(), Exit::Success);
        assert_eq!(transaction.package_last().unwrap(), "glib2;1.0-1;i386;installed");
        assert_eq!(finished_exit(&transaction), Some(Exit::Success));
        let (role, text) = transaction.role();
        assert_eq!(role, Role::Resolve);
        assert_eq!(text, "glib2");
    }

    #[test]
    fn package_last_without_packages() {
        let harness = Harness::new();
        let transaction = harness.transaction("/1_abcdeabc_data");
        assert_eq!(transaction.package_last().unwrap_err().kind(), "invalid-state");
    }

    #[test]
    fn cancel_before_run_finishes_immediately() {
        let harness = Harness::new();
        let mut transaction = harness.transaction("/1_abcdeabc_data");
        transaction
            .prepare(RoleRequest::RefreshCache { force: false })
            .unwrap();
        transaction.commit().unwrap();

        assert_eq!(transaction.cancel(None).unwrap(), CancelOutcome::Immediate);
        assert_eq!(transaction.exit(), Exit::Cancelled);
        let history = transaction.history();
        assert_eq!(
            history.last(),
            Some(&TransactionSignal::Finished {
                exit: Exit::Cancelled,
                runtime_ms: 0,
            })
        );
        assert!(history.contains(&TransactionSignal::StatusChanged(Status::Finished)));
        assert_eq!(
            transaction.cancel(None).unwrap(),
            CancelOutcome::AlreadyFinished
        );
    }

    #[test]
    fn cancel_by_stranger_is_checked() {
        let policy = RolePolicy::new().block_caller(":1.99");
        let harness = Harness::with(DummyBackend::new(), Box::new(policy));
        let mut transaction = harness.transaction("/1_abcdeabc_data");
        assert_eq!(
            transaction.cancel(Some(":1.99")).unwrap_err().kind(),
            "refused-by-policy"
        );
        assert_eq!(
            transaction.cancel(Some(":1.42")).unwrap(),
            CancelOutcome::Immediate
        );
    }

    #[test]
    fn running_cancel_requires_allow_cancel() {
        let (implementation, handle) = DummyBackend::manual();
        let mut harness = Harness::with(implementation, Box::new(AllowAll::new()));
        let mut transaction = harness.transaction("/1_abcdeabc_data");
        transaction
            .prepare(RoleRequest::RefreshCache { force: false })
            .unwrap();
        transaction.commit().unwrap();
        transaction.run().unwrap();
        harness.drive(&mut transaction);
        assert_eq!(handle.last_request(), Some(Role::RefreshCache));

        assert_eq!(
            transaction.cancel(None).unwrap_err(),
            TransactionError::cannot_cancel(
                "Tried to cancel a transaction that is not safe to kill"
            )
        );

        harness.ctx.backend.set_allow_cancel(true);
        harness.drive(&mut transaction);
        assert!(transaction.allow_cancel());
        assert_eq!(transaction.cancel(None).unwrap(), CancelOutcome::Requested);
        assert_eq!(handle.cancel_count(), 1);

        harness.ctx.backend.finished();
        harness.drive(&mut transaction);
        assert_eq!(transaction.exit(), Exit::Cancelled);
    }

    #[test]
    fn accept_eula_is_answered_locally() {
        let harness = Harness::new();
        let mut transaction = harness.transaction("/1_abcdeabc_data");
        let outcome = transaction
            .prepare(RoleRequest::AcceptEula {
                eula_id: "eula_dummy_vips".into(),
            })
            .unwrap();
        assert_eq!(outcome, Prepared::Completed);
        assert!(harness.ctx.backend.is_eula_valid("eula_dummy_vips"));
        assert_eq!(finished_exit(&transaction), Some(Exit::Success));
    }

    #[test]
    fn eula_request_changes_exit() {
        let mut harness = Harness::new();
        let transaction = harness.run(RoleRequest::InstallPackages {
            only_trusted: true,
            package_ids: vec!["vips-doc;7.12.4-2.fc8;noarch;linva".into()],
        });
        assert_eq!(transaction.exit(), Exit::EulaRequired);
        assert_eq!(
            transaction.error().map(|(code, _)| code),
            Some(ErrorCode::NoLicenseAgreement)
        );
    }

    #[test]
    fn filter_violations_are_dropped() {
        let (implementation, _handle) = DummyBackend::manual();
        let harness = Harness::with(implementation, Box::new(AllowAll::new()));
        let mut transaction = harness.transaction("/1_abcdeabc_data");
        transaction
            .prepare(RoleRequest::GetPackages {
                filter: "~installed".into(),
            })
            .unwrap();

        let installed = PackageItem::new(Info::Installed, "glib2;2.14.0;i386;installed", "GLib");
        let available = PackageItem::new(Info::Available, "gtkhtml2;2.19.1;i386;fedora", "HTML");
        transaction.handle_backend_event(BackendEventKind::Package(installed));
        transaction.handle_backend_event(BackendEventKind::Package(available.clone()));
        assert_eq!(transaction.packages(), &[available]);
    }

    #[test]
    fn installed_is_refused_for_installs() {
        let harness = Harness::new();
        let mut transaction = harness.transaction("/1_abcdeabc_data");
        transaction
            .prepare(RoleRequest::UpdateSystem { only_trusted: true })
            .unwrap();
        let item = PackageItem::new(Info::Installed, "kernel;2.6.23;i386;fedora", "kernel");
        transaction.handle_backend_event(BackendEventKind::Package(item));
        assert!(transaction.packages().is_empty());
        assert!(transaction.package_last().is_err());
    }

    #[test]
    fn restart_keeps_most_severe() {
        let harness = Harness::new();
        let mut transaction = harness.transaction("/1_abcdeabc_data");
        for restart in [Restart::Application, Restart::System, Restart::Session] {
            transaction.handle_backend_event(BackendEventKind::RequireRestart(RestartRequest {
                restart,
                package_id: "kernel;2.6.23;i386;fedora".into(),
            }));
        }
        assert_eq!(transaction.restart(), Some(Restart::System));
    }

    #[test]
    fn get_updates_fills_the_cache() {
        let mut harness = Harness::new();
        let first = harness.run(RoleRequest::GetUpdates {
            filter: "none".into(),
        });
        assert_eq!(first.packages().len(), 2);

        let mut second = harness.transaction("/2_abcdeabc_data");
        let outcome = second
            .prepare(RoleRequest::GetUpdates {
                filter: "none".into(),
            })
            .unwrap();
        assert_eq!(outcome, Prepared::Completed);
        assert_eq!(second.packages(), first.packages());
    }

    #[test]
    fn recorded_roles_reach_the_ledger() {
        let mut harness = Harness::new();
        let transaction = harness.run(RoleRequest::UpdateSystem { only_trusted: true });
        assert_eq!(transaction.exit(), Exit::Success);
        assert_eq!(transaction.restart(), Some(Restart::System));

        let db = harness.ctx.db.lock();
        let record = db.get(transaction.tid()).unwrap();
        assert!(record.succeeded);
        assert_eq!(record.role, Role::UpdateSystem);
        assert!(record.data.contains("updating\tkernel;2.6.23-0.116.fc8;i386;fedora"));
    }

    #[test]
    fn caller_disconnect_is_reported_once() {
        let harness = Harness::new();
        let mut transaction = harness.transaction("/1_abcdeabc_data");
        transaction.caller_disconnected();
        transaction.caller_disconnected();
        assert!(!transaction.is_caller_active());
        assert_eq!(
            transaction.history(),
            vec![TransactionSignal::CallerActiveChanged(false)]
        );
    }
}
