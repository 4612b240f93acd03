//! The backend execution slot.
//!
//! A [`Backend`] wraps exactly one [`PackageBackend`] implementation and is
//! shared between the main loop and at most one worker thread. Everything a
//! role method reports goes through the emission API on [`Backend`], which
//! enforces the per-run rules (no results after an error, monotonic
//! percentage, one signature/eula request, ...) and forwards accepted events
//! over a single-consumer channel in emission order.
//!
//! ## Run lifecycle
//!
//! ```text
//! reset ─► set_role (status Wait) ─► set_status(Setup) ─► run
//!   ─► emissions ─► finished() ─(finished_grace)─► Finished event
//! ```
//!
//! An `error_code` arms a watchdog: if `finished` does not follow within
//! `error_finish_timeout` the backend finishes itself and reports the
//! omission as a BackendError message. Both timers are deadlines evaluated by
//! [`Backend::poll_timers`] on the main loop.

mod dummy;
mod job;
mod registry;
mod remaining;
mod traits;

pub use dummy::{DummyBackend, DummyHandle, DUMMY_EULA_ID, DUMMY_UNSIGNED_REPO};
pub use job::BackendJob;
pub use registry::{BackendFactory, BackendRegistry};
pub use traits::PackageBackend;

use crate::clock::Clock;
use crate::config::{DaemonConfig, ExecutionMode};
use crate::error::{BackendError, BackendResult};
use crate::events::{
    BackendEvent, BackendEventKind, Progress, PERCENTAGE_DEFAULT, PERCENTAGE_INVALID,
};
use crate::request::RoleRequest;
use parking_lot::{Mutex, MutexGuard, RwLock};
use pkd_core::{
    strsafe, Category, Details, DistroUpgrade, ErrorCode, EulaRequest, Exit, FilesItem,
    FilterSet, GroupSet, Info, MessageKind, NetworkState, PackageId, PackageItem, Provides,
    RepoDetail, RepoSignatureRequest, Restart, RestartRequest, Role, RoleSet, Status,
    UpdateDetail,
};
use remaining::RemainingEstimator;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

/// Whether the running role may currently be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllowCancel {
    /// Nothing reported this run.
    #[default]
    Unset,
    /// Cancelling is safe.
    Allowed,
    /// Cancelling is not safe.
    Denied,
}

impl AllowCancel {
    /// Returns true only for [`AllowCancel::Allowed`].
    pub fn is_allowed(self) -> bool {
        self == AllowCancel::Allowed
    }
}

#[derive(Debug, Clone, Copy)]
struct BackendSettings {
    execution: ExecutionMode,
    error_finish_timeout: Duration,
    finished_grace: Duration,
    use_remaining_time: bool,
}

#[derive(Debug)]
struct BackendState {
    locked: bool,
    during_initialize: bool,
    active: bool,
    tid: Option<String>,
    role: Role,
    status: Status,
    exit: Exit,
    percentage: u32,
    subpercentage: u32,
    remaining: u32,
    allow_cancel: AllowCancel,
    cancel_requested: bool,
    set_error: bool,
    set_signature: bool,
    set_eula: bool,
    has_sent_package: bool,
    finished: bool,
    simultaneous: bool,
    download_files: u32,
    last_package: Option<PackageItem>,
    locale: Option<String>,
    transaction_data: Option<String>,
    request: Option<RoleRequest>,
    download_directory: Option<PathBuf>,
    started_at: Option<Instant>,
    watchdog_deadline: Option<Instant>,
    finished_deadline: Option<Instant>,
    estimator: RemainingEstimator,
}

impl BackendState {
    fn new() -> Self {
        Self {
            locked: false,
            during_initialize: false,
            active: false,
            tid: None,
            role: Role::Unknown,
            status: Status::Unknown,
            exit: Exit::Unknown,
            percentage: PERCENTAGE_DEFAULT,
            subpercentage: PERCENTAGE_INVALID,
            remaining: 0,
            allow_cancel: AllowCancel::Unset,
            cancel_requested: false,
            set_error: false,
            set_signature: false,
            set_eula: false,
            has_sent_package: false,
            finished: false,
            simultaneous: false,
            download_files: 0,
            last_package: None,
            locale: None,
            transaction_data: None,
            request: None,
            download_directory: None,
            started_at: None,
            watchdog_deadline: None,
            finished_deadline: None,
            estimator: RemainingEstimator::default(),
        }
    }

    /// Clears everything that belongs to one run.
    fn reset_run(&mut self) {
        let locked = self.locked;
        *self = Self::new();
        self.locked = locked;
    }
}

/// The shared execution slot for the loaded package-manager implementation.
pub struct Backend {
    implementation: Box<dyn PackageBackend>,
    name: String,
    description: String,
    author: String,
    roles: RoleSet,
    groups: GroupSet,
    filters: FilterSet,
    mime_types: Vec<String>,
    supports_cancel: bool,
    settings: BackendSettings,
    clock: Arc<dyn Clock>,
    events: UnboundedSender<BackendEvent>,
    state: Mutex<BackendState>,
    eulas: Mutex<HashSet<String>>,
    proxy: RwLock<(Option<String>, Option<String>)>,
    network: RwLock<NetworkState>,
}

impl Backend {
    /// Wraps an implementation, probing its capabilities once.
    ///
    /// Returns the backend and the receiving end of its event channel, which
    /// the main loop drains.
    pub fn new(
        implementation: Box<dyn PackageBackend>,
        config: &DaemonConfig,
        clock: Arc<dyn Clock>,
    ) -> (Arc<Self>, UnboundedReceiver<BackendEvent>) {
        let (events, rx) = unbounded_channel();
        let backend = Self {
            name: implementation.name().to_string(),
            description: implementation.description().to_string(),
            author: implementation.author().to_string(),
            roles: implementation.roles(),
            groups: implementation.groups(),
            filters: implementation.filters(),
            mime_types: implementation.mime_types(),
            supports_cancel: implementation.supports_cancel(),
            implementation,
            settings: BackendSettings {
                execution: config.execution,
                error_finish_timeout: config.timing.error_finish_timeout,
                finished_grace: config.timing.finished_grace,
                use_remaining_time: config.use_remaining_time,
            },
            clock,
            events,
            state: Mutex::new(BackendState::new()),
            eulas: Mutex::new(HashSet::new()),
            proxy: RwLock::new((None, None)),
            network: RwLock::new(NetworkState::default()),
        };
        debug!(backend = %backend.name, roles = %backend.roles, "backend loaded");
        (Arc::new(backend), rx)
    }

    // --- capabilities ---

    /// Backend name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backend description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Backend author.
    pub fn author(&self) -> &str {
        &self.author
    }

    /// Implemented roles.
    pub fn roles(&self) -> RoleSet {
        self.roles
    }

    /// Supported groups.
    pub fn groups(&self) -> GroupSet {
        self.groups
    }

    /// Supported filters.
    pub fn filters(&self) -> FilterSet {
        self.filters
    }

    /// Installable mime types.
    pub fn mime_types(&self) -> &[String] {
        &self.mime_types
    }

    /// Whether running roles can be aborted.
    pub fn supports_cancel(&self) -> bool {
        self.supports_cancel
    }

    /// Returns true if the role is implemented.
    pub fn supports_role(&self, role: Role) -> bool {
        self.roles.contains(role)
    }

    // --- lock / run ---

    /// Runs the implementation's initialize hook. Idempotent.
    pub fn lock(self: &Arc<Self>) -> BackendResult<()> {
        {
            let mut state = self.state.lock();
            if state.locked {
                debug!("already locked");
                return Ok(());
            }
            state.locked = true;
            state.during_initialize = true;
        }

        let result = self.implementation.initialize(&BackendJob::new(Arc::clone(self)));

        let mut state = self.state.lock();
        state.during_initialize = false;
        match result {
            Ok(()) => {
                info!(backend = %self.name, "backend locked");
                Ok(())
            }
            Err(message) => {
                state.locked = false;
                Err(BackendError::initialize_failed(message))
            }
        }
    }

    /// Runs the implementation's teardown hook. Idempotent.
    pub fn unlock(self: &Arc<Self>) {
        if !self.state.lock().locked {
            debug!("already unlocked");
            return;
        }
        self.implementation.destroy(&BackendJob::new(Arc::clone(self)));
        self.state.lock().locked = false;
        info!(backend = %self.name, "backend unlocked");
    }

    /// Returns true between `lock` and `unlock`.
    pub fn is_locked(&self) -> bool {
        self.state.lock().locked
    }

    /// Clears all per-run state.
    ///
    /// Fails without side effects while a run is in progress. A Finished
    /// event still waiting for its grace period is emitted first.
    pub fn reset(&self) -> BackendResult<()> {
        let mut state = self.state.lock();
        if !state.locked {
            return Err(BackendError::NotLocked);
        }
        if state.active && !state.finished {
            return Err(BackendError::Busy {
                tid: state.tid.clone().unwrap_or_default(),
            });
        }
        if state.finished_deadline.is_some() {
            self.flush_finished(&mut state);
        }
        state.reset_run();
        Ok(())
    }

    /// Binds the role for this run. Only allowed once per run.
    pub fn set_role(&self, role: Role) -> bool {
        let Some(mut state) = self.guard("set_role") else {
            return false;
        };
        if state.role != Role::Unknown {
            warn!(role = %role, current = %state.role, "cannot set role more than once");
            return false;
        }
        debug!(role = %role, "setting role");
        state.role = role;
        state.started_at = Some(self.clock.now());
        state.estimator.reset();
        state.status = Status::Wait;
        true
    }

    /// Dispatches the request to the implementation, inline or on a worker
    /// thread.
    pub fn run(self: &Arc<Self>, request: RoleRequest) -> BackendResult<()> {
        {
            let mut state = self.state.lock();
            if !state.locked {
                return Err(BackendError::NotLocked);
            }
            if state.active && !state.finished {
                return Err(BackendError::Busy {
                    tid: state.tid.clone().unwrap_or_default(),
                });
            }
            state.active = true;
            state.request = Some(request.clone());
        }

        let job = BackendJob::new(Arc::clone(self));
        match self.settings.execution {
            ExecutionMode::Inline => self.dispatch(&job, &request),
            ExecutionMode::Worker => {
                let name = format!("pkd-{}", request.role());
                let spawned = thread::Builder::new().name(name).spawn(move || {
                    let backend = Arc::clone(job.backend());
                    backend.dispatch(&job, &request);
                });
                if let Err(e) = spawned {
                    warn!("failed to spawn backend worker: {}", e);
                    self.error_code(ErrorCode::CreateThreadFailed, &format!("failed to run: {e}"));
                    self.finished();
                }
            }
        }
        Ok(())
    }

    fn dispatch(&self, job: &BackendJob, request: &RoleRequest) {
        let imp = &self.implementation;
        let filters = request.filters();
        debug!(role = %request.role(), "dispatching");
        match request {
            RoleRequest::GetDepends {
                package_ids,
                recursive,
                ..
            } => imp.get_depends(job, filters, package_ids, *recursive),
            RoleRequest::GetDetails { package_ids } => imp.get_details(job, package_ids),
            RoleRequest::GetDistroUpgrades => imp.get_distro_upgrades(job),
            RoleRequest::GetFiles { package_ids } => imp.get_files(job, package_ids),
            RoleRequest::GetRequires {
                package_ids,
                recursive,
                ..
            } => imp.get_requires(job, filters, package_ids, *recursive),
            RoleRequest::GetPackages { .. } => imp.get_packages(job, filters),
            RoleRequest::GetUpdateDetail { package_ids } => imp.get_update_detail(job, package_ids),
            RoleRequest::GetUpdates { .. } => imp.get_updates(job, filters),
            RoleRequest::InstallPackages {
                only_trusted,
                package_ids,
            } => imp.install_packages(job, *only_trusted, package_ids),
            RoleRequest::InstallFiles {
                only_trusted,
                full_paths,
            } => imp.install_files(job, *only_trusted, full_paths),
            RoleRequest::InstallSignature {
                sig_type,
                key_id,
                package_id,
            } => imp.install_signature(job, *sig_type, key_id, package_id),
            RoleRequest::RefreshCache { force } => imp.refresh_cache(job, *force),
            RoleRequest::RemovePackages {
                package_ids,
                allow_deps,
                autoremove,
            } => imp.remove_packages(job, package_ids, *allow_deps, *autoremove),
            RoleRequest::Resolve { packages, .. } => imp.resolve(job, filters, packages),
            RoleRequest::Rollback { transaction_id } => imp.rollback(job, transaction_id),
            RoleRequest::SearchDetails { search, .. } => imp.search_details(job, filters, search),
            RoleRequest::SearchFile { search, .. } => imp.search_file(job, filters, search),
            RoleRequest::SearchGroup { search, .. } => imp.search_group(job, filters, search),
            RoleRequest::SearchName { search, .. } => imp.search_name(job, filters, search),
            RoleRequest::UpdatePackages {
                only_trusted,
                package_ids,
            } => imp.update_packages(job, *only_trusted, package_ids),
            RoleRequest::UpdateSystem { only_trusted } => imp.update_system(job, *only_trusted),
            RoleRequest::GetRepoList { .. } => imp.get_repo_list(job, filters),
            RoleRequest::RepoEnable { repo_id, enabled } => imp.repo_enable(job, repo_id, *enabled),
            RoleRequest::RepoSetData {
                repo_id,
                parameter,
                value,
            } => imp.repo_set_data(job, repo_id, parameter, value),
            RoleRequest::WhatProvides {
                provides, search, ..
            } => {
                let provides = provides.parse().unwrap_or(Provides::Unknown);
                imp.what_provides(job, filters, provides, search)
            }
            RoleRequest::GetCategories => imp.get_categories(job),
            RoleRequest::DownloadPackages { package_ids } => {
                let directory = self
                    .download_directory()
                    .unwrap_or_else(std::env::temp_dir);
                imp.download_packages(job, package_ids, &directory)
            }
            RoleRequest::SimulateInstallFiles { full_paths } => {
                imp.simulate_install_files(job, full_paths)
            }
            RoleRequest::SimulateInstallPackages { package_ids } => {
                imp.simulate_install_packages(job, package_ids)
            }
            RoleRequest::SimulateRemovePackages {
                package_ids,
                autoremove,
            } => imp.simulate_remove_packages(job, package_ids, *autoremove),
            RoleRequest::SimulateUpdatePackages { package_ids } => {
                imp.simulate_update_packages(job, package_ids)
            }
            RoleRequest::AcceptEula { .. } | RoleRequest::GetOldTransactions { .. } => {
                job.not_implemented_yet(request.role().as_str())
            }
        }
    }

    /// Asks the running role to stop.
    ///
    /// Sets status Cancel, forbids further allow-cancel toggling, pre-sets the
    /// exit to Cancelled and calls the implementation's abort hook, which may
    /// ignore the request.
    pub fn cancel(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if !state.locked || !state.active || state.finished {
                debug!("nothing to cancel");
                return;
            }
            self.set_status_inner(&mut state, Status::Cancel);
            self.set_allow_cancel_inner(&mut state, false);
            state.cancel_requested = true;
            if state.exit == Exit::Unknown {
                state.exit = Exit::Cancelled;
            }
        }
        self.implementation.cancel(&BackendJob::new(Arc::clone(self)));
    }

    // --- timers ---

    /// Fires the error watchdog and the delayed Finished if they are due.
    ///
    /// Returns true if anything fired.
    pub fn poll_timers(&self, now: Instant) -> bool {
        let mut state = self.state.lock();
        let mut fired = false;
        if state.watchdog_deadline.is_some_and(|deadline| deadline <= now) {
            state.watchdog_deadline = None;
            warn!(tid = ?state.tid, "backend did not call finished after error code");
            self.message_inner(
                &mut state,
                MessageKind::BackendError,
                "ErrorCode() has to be followed with Finished()!",
            );
            self.finished_inner(&mut state);
            fired = true;
        }
        if state.finished_deadline.is_some_and(|deadline| deadline <= now) {
            self.flush_finished(&mut state);
            fired = true;
        }
        fired
    }

    /// The earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        let state = self.state.lock();
        match (state.watchdog_deadline, state.finished_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // --- emission API ---

    /// Sets the overall percentage.
    ///
    /// Duplicates, values above 101 and decreases between two known values
    /// are refused; 101 means unknown.
    pub fn set_percentage(&self, percentage: u32) -> bool {
        let Some(mut state) = self.guard("set_percentage") else {
            return false;
        };
        if state.set_error {
            warn!("already set error, cannot process: percentage {}", percentage);
            return false;
        }
        if state.percentage == percentage {
            debug!("duplicate set of {}", percentage);
            return false;
        }
        if percentage > PERCENTAGE_INVALID {
            self.message_inner(
                &mut state,
                MessageKind::BackendError,
                &format!("percentage value is invalid: {percentage}"),
            );
            return false;
        }
        if state.percentage <= 100 && percentage < state.percentage {
            let message = format!(
                "percentage value is going down to {} from {}",
                percentage, state.percentage
            );
            self.message_inner(&mut state, MessageKind::BackendError, &message);
            return false;
        }

        state.percentage = percentage;
        if percentage != PERCENTAGE_INVALID {
            let now = self.clock.now();
            state.estimator.add(now, percentage);
            let remaining = state.estimator.remaining();
            debug!("this will now take ~{} seconds", remaining);
            if self.settings.use_remaining_time {
                state.remaining = remaining;
            }
        }
        self.send_progress(&state);
        true
    }

    /// Sets the percentage of the current step.
    pub fn set_sub_percentage(&self, subpercentage: u32) -> bool {
        let Some(mut state) = self.guard("set_sub_percentage") else {
            return false;
        };
        if state.set_error {
            warn!("already set error, cannot process: sub-percentage {}", subpercentage);
            return false;
        }
        if state.subpercentage == subpercentage {
            debug!("duplicate set of {}", subpercentage);
            return false;
        }
        if subpercentage > 100 && subpercentage != PERCENTAGE_INVALID {
            self.message_inner(
                &mut state,
                MessageKind::BackendError,
                &format!("sub-percentage value is invalid: {subpercentage}"),
            );
            return false;
        }
        state.subpercentage = subpercentage;
        self.send_progress(&state);
        true
    }

    /// Sets the status.
    pub fn set_status(&self, status: Status) -> bool {
        let Some(mut state) = self.guard("set_status") else {
            return false;
        };
        self.set_status_inner(&mut state, status)
    }

    /// Reports a package.
    ///
    /// Simulate roles see `available` as `installing` and `installed` as
    /// `removing`. A new info for the package last reported closes the
    /// previous one with a `finished` package.
    pub fn package(&self, info: Info, package_id: &str, summary: &str) -> bool {
        let Some(mut state) = self.guard("package") else {
            return false;
        };
        if state.set_error {
            warn!("already set error, cannot process: package {}", package_id);
            return false;
        }
        if !PackageId::check(package_id) {
            warn!("package_id {} invalid and cannot be processed", package_id);
            return false;
        }

        let info = if state.role.is_simulate() {
            match info {
                Info::Available => Info::Installing,
                Info::Installed => Info::Removing,
                other => other,
            }
        } else {
            info
        };
        let item = PackageItem::new(info, package_id, strsafe(summary));

        if state.last_package.as_ref() == Some(&item) {
            debug!("skipping duplicate {}", package_id);
            return false;
        }

        if !state.simultaneous {
            if let Some(last) = state.last_package.take() {
                if last.package_id == item.package_id
                    && last.info != item.info
                    && last.info.is_in_progress()
                {
                    debug!("emulating finished for {}", last.package_id);
                    self.send(
                        &state,
                        BackendEventKind::Package(PackageItem::new(
                            Info::Finished,
                            last.package_id,
                            last.summary,
                        )),
                    );
                }
            }
        }
        state.last_package = Some(item.clone());

        if !state.simultaneous {
            if let Some(status) = info.implied_status() {
                self.set_status_inner(&mut state, status);
            }
        }

        state.has_sent_package = true;
        self.send(&state, BackendEventKind::Package(item));
        true
    }

    /// Reports package details.
    pub fn details(&self, details: Details) -> bool {
        self.result("details", |_| {
            BackendEventKind::Details(Details {
                description: strsafe(&details.description),
                ..details
            })
        })
    }

    /// Reports the files of a package.
    pub fn files(&self, item: FilesItem) -> bool {
        self.result("files", |state| {
            if state.role == Role::DownloadPackages {
                state.download_files += item.files.len() as u32;
            }
            BackendEventKind::Files(item)
        })
    }

    /// Reports an update description.
    pub fn update_detail(&self, detail: UpdateDetail) -> bool {
        self.result("update_detail", |_| {
            BackendEventKind::UpdateDetail(UpdateDetail {
                update_text: strsafe(&detail.update_text),
                changelog: strsafe(&detail.changelog),
                ..detail
            })
        })
    }

    /// Reports an available distribution upgrade.
    pub fn distro_upgrade(&self, upgrade: DistroUpgrade) -> bool {
        self.result("distro_upgrade", |_| BackendEventKind::DistroUpgrade(upgrade))
    }

    /// Reports a repository.
    pub fn repo_detail(&self, repo: RepoDetail) -> bool {
        self.result("repo_detail", |_| {
            BackendEventKind::RepoDetail(RepoDetail {
                description: strsafe(&repo.description),
                ..repo
            })
        })
    }

    /// Reports a category.
    pub fn category(&self, category: Category) -> bool {
        self.result("category", |_| BackendEventKind::Category(category))
    }

    /// Reports that a package needs a restart.
    pub fn require_restart(&self, restart: Restart, package_id: &str) -> bool {
        if !PackageId::check(package_id) {
            warn!("package_id {} invalid and cannot be processed", package_id);
            return false;
        }
        self.result("require_restart", |_| {
            BackendEventKind::RequireRestart(RestartRequest {
                restart,
                package_id: package_id.to_string(),
            })
        })
    }

    /// Reports that a repository key must be trusted. Once per run.
    pub fn repo_signature_required(&self, request: RepoSignatureRequest) -> bool {
        let Some(mut state) = self.guard("repo_signature_required") else {
            return false;
        };
        if state.set_error {
            warn!("already set error, cannot process: repo signature required");
            return false;
        }
        if state.set_signature {
            warn!("already asked for a signature, cannot process");
            return false;
        }
        state.set_signature = true;
        self.send(&state, BackendEventKind::RepoSignatureRequired(request));
        true
    }

    /// Reports that a license must be accepted. Once per run.
    pub fn eula_required(&self, request: EulaRequest) -> bool {
        let Some(mut state) = self.guard("eula_required") else {
            return false;
        };
        if state.set_error {
            warn!("already set error, cannot process: eula required");
            return false;
        }
        if state.set_eula {
            warn!("already asked for a eula, cannot process");
            return false;
        }
        state.set_eula = true;
        self.send(&state, BackendEventKind::EulaRequired(request));
        true
    }

    /// Reports a message. After an error only BackendError messages pass.
    pub fn message(&self, kind: MessageKind, details: &str) -> bool {
        let Some(mut state) = self.guard("message") else {
            return false;
        };
        self.message_inner(&mut state, kind, details)
    }

    /// Reports the run's error. Only one error is accepted per run.
    pub fn error_code(&self, code: ErrorCode, details: &str) -> bool {
        let Some(mut state) = self.guard("error_code") else {
            return false;
        };
        if state.during_initialize {
            warn!("cannot call error_code during initialize: {} {}", code, details);
            return false;
        }
        if state.set_error {
            warn!("already set error, cannot process: {} {}", code, details);
            return false;
        }
        state.set_error = true;
        if state.exit == Exit::Unknown {
            state.exit = Exit::Failed;
        }
        state.watchdog_deadline = Some(self.clock.now() + self.settings.error_finish_timeout);
        self.send(
            &state,
            BackendEventKind::ErrorCode {
                code,
                details: strsafe(details),
            },
        );
        true
    }

    /// Reports whether cancelling is currently safe.
    pub fn set_allow_cancel(&self, allow: bool) -> bool {
        let Some(mut state) = self.guard("set_allow_cancel") else {
            return false;
        };
        self.set_allow_cancel_inner(&mut state, allow)
    }

    /// Overrides the exit kind. Only allowed while it is still unknown.
    pub fn set_exit_code(&self, exit: Exit) -> bool {
        let Some(mut state) = self.guard("set_exit_code") else {
            return false;
        };
        if state.exit != Exit::Unknown {
            warn!(current = %state.exit, "already set exit status, cannot set {}", exit);
            return false;
        }
        state.exit = exit;
        true
    }

    /// Ends the run. The Finished event follows after the grace period.
    pub fn finished(&self) -> bool {
        let Some(mut state) = self.guard("finished") else {
            return false;
        };
        self.finished_inner(&mut state)
    }

    /// Reports that a role method has no implementation and finishes.
    pub fn not_implemented_yet(&self, method: &str) {
        self.error_code(
            ErrorCode::NotSupported,
            &format!("the method '{method}' is not implemented yet"),
        );
        self.finished();
    }

    /// In simultaneous mode packages are processed in parallel, so no
    /// status is derived from them and no finished packages are emulated.
    pub fn set_simultaneous_mode(&self, simultaneous: bool) {
        self.state.lock().simultaneous = simultaneous;
    }

    // --- run parameters ---

    /// Binds the transaction that owns this run.
    pub fn set_current_tid(&self, tid: Option<String>) {
        self.state.lock().tid = tid;
    }

    /// The transaction that owns this run.
    pub fn current_tid(&self) -> Option<String> {
        self.state.lock().tid.clone()
    }

    /// Sets the locale for this run.
    pub fn set_locale(&self, locale: impl Into<String>) {
        self.state.lock().locale = Some(locale.into());
    }

    /// The locale for this run.
    pub fn locale(&self) -> Option<String> {
        self.state.lock().locale.clone()
    }

    /// Attaches free form data to this run.
    pub fn set_transaction_data(&self, data: impl Into<String>) {
        self.state.lock().transaction_data = Some(data.into());
    }

    /// Data attached to this run.
    pub fn transaction_data(&self) -> Option<String> {
        self.state.lock().transaction_data.clone()
    }

    /// Sets the directory `download_packages` writes into.
    pub fn set_download_directory(&self, directory: impl Into<PathBuf>) {
        self.state.lock().download_directory = Some(directory.into());
    }

    /// The directory `download_packages` writes into.
    pub fn download_directory(&self) -> Option<PathBuf> {
        self.state.lock().download_directory.clone()
    }

    /// The request of this run.
    pub fn request(&self) -> Option<RoleRequest> {
        self.state.lock().request.clone()
    }

    /// The role of this run.
    pub fn role(&self) -> Role {
        self.state.lock().role
    }

    /// The current status.
    pub fn status(&self) -> Status {
        self.state.lock().status
    }

    /// The exit kind decided so far.
    pub fn exit(&self) -> Exit {
        self.state.lock().exit
    }

    /// The allow-cancel tri-state.
    pub fn allow_cancel(&self) -> AllowCancel {
        self.state.lock().allow_cancel
    }

    /// Returns true between `run` and the Finished event.
    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    /// Returns true once an error was reported this run.
    pub fn has_error(&self) -> bool {
        self.state.lock().set_error
    }

    /// A progress snapshot.
    pub fn progress(&self) -> Progress {
        self.progress_of(&self.state.lock())
    }

    /// Time since the role was set.
    pub fn runtime(&self) -> Duration {
        self.state
            .lock()
            .started_at
            .map(|started| self.clock.now().saturating_duration_since(started))
            .unwrap_or_default()
    }

    // --- daemon lifetime state ---

    /// Records an accepted license agreement. Returns false if it already
    /// was accepted.
    pub fn accept_eula(&self, eula_id: &str) -> bool {
        let inserted = self.eulas.lock().insert(eula_id.to_string());
        if inserted {
            debug!(eula_id, "eula accepted");
        } else {
            warn!(eula_id, "eula already accepted");
        }
        inserted
    }

    /// Returns true if the agreement was accepted during this daemon's life.
    pub fn is_eula_valid(&self, eula_id: &str) -> bool {
        self.eulas.lock().contains(eula_id)
    }

    /// Sets the proxies passed to the implementation.
    pub fn set_proxy(&self, http: Option<String>, ftp: Option<String>) {
        *self.proxy.write() = (http, ftp);
    }

    /// The HTTP proxy.
    pub fn proxy_http(&self) -> Option<String> {
        self.proxy.read().0.clone()
    }

    /// The FTP proxy.
    pub fn proxy_ftp(&self) -> Option<String> {
        self.proxy.read().1.clone()
    }

    /// Records the current network state.
    pub fn set_network_state(&self, state: NetworkState) {
        *self.network.write() = state;
    }

    /// The current network state.
    pub fn network_state(&self) -> NetworkState {
        *self.network.read()
    }

    /// Returns true if the network is usable.
    pub fn is_online(&self) -> bool {
        self.network_state().is_online()
    }

    // --- internals ---

    fn guard(&self, what: &str) -> Option<MutexGuard<'_, BackendState>> {
        let state = self.state.lock();
        if !state.locked {
            warn!("{} called while the backend is not locked", what);
            return None;
        }
        Some(state)
    }

    fn send(&self, state: &BackendState, kind: BackendEventKind) {
        let event = BackendEvent {
            tid: state.tid.clone(),
            kind,
        };
        if self.events.send(event).is_err() {
            debug!("backend event dropped, no consumer");
        }
    }

    fn result(
        &self,
        what: &str,
        make: impl FnOnce(&mut BackendState) -> BackendEventKind,
    ) -> bool {
        let Some(mut state) = self.guard(what) else {
            return false;
        };
        if state.set_error {
            warn!("already set error, cannot process: {}", what);
            return false;
        }
        let kind = make(&mut state);
        self.send(&state, kind);
        true
    }

    fn progress_of(&self, state: &BackendState) -> Progress {
        let elapsed = state
            .started_at
            .map(|started| self.clock.now().saturating_duration_since(started).as_secs())
            .unwrap_or(0);
        let percentage = if state.percentage == PERCENTAGE_DEFAULT {
            PERCENTAGE_INVALID
        } else {
            state.percentage
        };
        Progress {
            percentage,
            subpercentage: state.subpercentage,
            elapsed: u32::try_from(elapsed).unwrap_or(u32::MAX),
            remaining: state.remaining,
        }
    }

    fn send_progress(&self, state: &BackendState) {
        let progress = self.progress_of(state);
        self.send(state, BackendEventKind::Progress(progress));
    }

    fn message_inner(&self, state: &mut BackendState, kind: MessageKind, details: &str) -> bool {
        if state.set_error && kind != MessageKind::BackendError {
            warn!("already set error, cannot process: message {}", details);
            return false;
        }
        if kind == MessageKind::BackendError {
            warn!(tid = ?state.tid, "{}", details);
        }
        self.send(
            state,
            BackendEventKind::Message {
                kind,
                details: details.to_string(),
            },
        );
        true
    }

    fn set_status_inner(&self, state: &mut BackendState, status: Status) -> bool {
        if state.status == status {
            debug!("already set same status {}", status);
            return true;
        }
        if state.set_error && status != Status::Finished {
            warn!("already set error, cannot process: status {}", status);
            return false;
        }
        if status == Status::Wait {
            let message = format!("{} shouldn't use STATUS_WAIT", state.role);
            self.message_inner(state, MessageKind::BackendError, &message);
            return false;
        }
        if status == Status::Setup && state.status != Status::Wait {
            let message = format!("{} to SETUP when not in WAIT", state.role);
            self.message_inner(state, MessageKind::BackendError, &message);
            return false;
        }
        if status != Status::Running && state.status == Status::Setup {
            state.status = Status::Running;
            self.send(state, BackendEventKind::StatusChanged(Status::Running));
        }
        state.status = status;
        self.send(state, BackendEventKind::StatusChanged(status));
        true
    }

    fn set_allow_cancel_inner(&self, state: &mut BackendState, allow: bool) -> bool {
        if !self.supports_cancel {
            debug!("cancel not supported, ignoring allow-cancel {}", allow);
            return false;
        }
        if allow && (state.set_error || state.cancel_requested) {
            warn!("cannot allow cancel now");
            return false;
        }
        let value = if allow {
            AllowCancel::Allowed
        } else {
            AllowCancel::Denied
        };
        if state.allow_cancel == value {
            debug!("same allow-cancel state {}", allow);
            return false;
        }
        state.allow_cancel = value;
        self.send(state, BackendEventKind::AllowCancel(allow));
        true
    }

    fn finished_inner(&self, state: &mut BackendState) -> bool {
        if state.during_initialize {
            warn!("cannot call finished during initialize");
            return false;
        }
        if state.finished {
            warn!(tid = ?state.tid, "already finished");
            return false;
        }

        let role = state.role;
        if !state.set_error {
            if matches!(
                role,
                Role::InstallPackages | Role::RemovePackages | Role::UpdatePackages
            ) && !state.has_sent_package
            {
                let message = format!("Backends should send a Package() for {role}!");
                self.message_inner(state, MessageKind::BackendError, &message);
            }
            if role == Role::DownloadPackages && state.download_files == 0 {
                self.message_inner(
                    state,
                    MessageKind::BackendError,
                    "Backends should send multiple Files() for each package_id!",
                );
            }
            if state.status == Status::Setup {
                let message = format!("Backends should send status <value> signals for {role}!");
                self.message_inner(state, MessageKind::BackendError, &message);
            }
        }

        state.watchdog_deadline = None;

        // Result events stop at the error.
        if let Some(last) = state.last_package.take() {
            if !state.simultaneous && !state.set_error && last.info.is_in_progress() {
                self.send(
                    state,
                    BackendEventKind::Package(PackageItem::new(
                        Info::Finished,
                        last.package_id,
                        last.summary,
                    )),
                );
            }
        }

        self.set_allow_cancel_inner(state, false);
        self.set_status_inner(state, Status::Finished);
        state.finished = true;
        state.finished_deadline = Some(self.clock.now() + self.settings.finished_grace);
        debug!(tid = ?state.tid, "finished, waiting for grace period");
        true
    }

    fn flush_finished(&self, state: &mut BackendState) {
        state.finished_deadline = None;
        if state.exit == Exit::Unknown {
            state.exit = Exit::Success;
        }
        let exit = state.exit;
        debug!(tid = ?state.tid, exit = %exit, "emitting finished");
        self.send(state, BackendEventKind::Finished(exit));
        state.active = false;
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("name", &self.name)
            .field("roles", &self.roles)
            .field("supports_cancel", &self.supports_cancel)
            .finish_non_exhaustive()
    }
}

/// Returns the per-transaction download directory under `cache_dir`.
pub(crate) fn download_directory_for(cache_dir: &Path, tid: &str) -> PathBuf {
    cache_dir
        .join("downloads")
        .join(tid.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::TimingConfig;
    use tracing_test::traced_test;

    struct Fixture {
        backend: Arc<Backend>,
        rx: UnboundedReceiver<BackendEvent>,
        clock: Arc<ManualClock>,
    }

    impl Fixture {
        fn new(cancel: bool) -> Self {
            let clock = Arc::new(ManualClock::new());
            let config = DaemonConfig::new().execution(ExecutionMode::Inline);
            let implementation = DummyBackend::manual().0.with_cancel(cancel);
            let (backend, rx) = Backend::new(Box::new(implementation), &config, clock.clone());
            backend.lock().unwrap();
            Self { backend, rx, clock }
        }

        /// Prepares a run the way a transaction does.
        fn start(&self, role: Role) {
            self.backend.reset().unwrap();
            self.backend.set_current_tid(Some("/1_abcdeabc_data".into()));
            assert!(self.backend.set_role(role));
            assert!(self.backend.set_status(Status::Setup));
        }

        fn drain(&mut self) -> Vec<BackendEventKind> {
            let mut kinds = Vec::new();
            while let Ok(event) = self.rx.try_recv() {
                kinds.push(event.kind);
            }
            kinds
        }

        fn messages(&mut self) -> Vec<String> {
            self.drain()
                .into_iter()
                .filter_map(|kind| match kind {
                    BackendEventKind::Message { details, .. } => Some(details),
                    _ => None,
                })
                .collect()
        }
    }

    #[test]
    fn lock_is_idempotent() {
        let fixture = Fixture::new(false);
        assert!(fixture.backend.is_locked());
        fixture.backend.lock().unwrap();
        fixture.backend.unlock();
        fixture.backend.unlock();
        assert!(!fixture.backend.is_locked());
    }

    #[test]
    fn emissions_refused_when_unlocked() {
        let fixture = Fixture::new(false);
        fixture.backend.unlock();
        assert!(!fixture.backend.set_percentage(10));
        assert!(!fixture.backend.finished());
        assert_eq!(fixture.backend.reset(), Err(BackendError::NotLocked));
    }

    #[test]
    fn failing_initialize_unlocks() {
        let clock = Arc::new(ManualClock::new());
        let implementation = DummyBackend::new().failing_initialize("no database");
        let (backend, _rx) = Backend::new(Box::new(implementation), &DaemonConfig::new(), clock);
        let err = backend.lock().unwrap_err();
        assert_eq!(err, BackendError::initialize_failed("no database"));
        assert!(!backend.is_locked());
    }

    #[test]
    fn events_carry_current_tid() {
        let mut fixture = Fixture::new(false);
        fixture.start(Role::Resolve);
        let event = fixture.rx.try_recv().unwrap();
        assert_eq!(event.tid.as_deref(), Some("/1_abcdeabc_data"));
        assert_eq!(event.kind, BackendEventKind::StatusChanged(Status::Setup));
    }

    #[test]
    fn percentage_rules() {
        let mut fixture = Fixture::new(false);
        fixture.start(Role::Resolve);
        fixture.drain();

        assert!(fixture.backend.set_percentage(10));
        assert!(!fixture.backend.set_percentage(5));
        assert_eq!(fixture.backend.progress().percentage, 10);
        assert!(!fixture.backend.set_percentage(10));
        assert!(fixture.backend.set_percentage(PERCENTAGE_INVALID));
        assert!(fixture.backend.set_percentage(5));
        assert!(!fixture.backend.set_percentage(102));
        assert!(fixture.backend.set_percentage(100));
        assert!(!fixture.backend.set_percentage(50));
        assert_eq!(fixture.backend.progress().percentage, 100);

        let messages = fixture.messages();
        assert_eq!(
            messages,
            vec![
                "percentage value is going down to 5 from 10".to_string(),
                "percentage value is invalid: 102".to_string(),
                "percentage value is going down to 50 from 100".to_string(),
            ]
        );
    }

    #[test]
    fn unset_percentage_reports_unknown() {
        let fixture = Fixture::new(false);
        fixture.start(Role::Resolve);
        assert_eq!(fixture.backend.progress().percentage, PERCENTAGE_INVALID);
        assert_eq!(fixture.backend.progress().subpercentage, PERCENTAGE_INVALID);
    }

    #[test]
    fn sub_percentage_rules() {
        let fixture = Fixture::new(false);
        fixture.start(Role::Resolve);
        assert!(fixture.backend.set_sub_percentage(50));
        assert!(!fixture.backend.set_sub_percentage(50));
        assert!(!fixture.backend.set_sub_percentage(150));
        assert!(fixture.backend.set_sub_percentage(PERCENTAGE_INVALID));
        assert!(fixture.backend.set_sub_percentage(20));
    }

    #[test]
    fn status_rules() {
        let mut fixture = Fixture::new(false);
        fixture.start(Role::InstallPackages);
        fixture.drain();

        assert!(fixture.backend.set_status(Status::Download));
        assert_eq!(
            fixture.drain(),
            vec![
                BackendEventKind::StatusChanged(Status::Running),
                BackendEventKind::StatusChanged(Status::Download),
            ]
        );

        assert!(fixture.backend.set_status(Status::Download));
        assert!(fixture.drain().is_empty());

        assert!(!fixture.backend.set_status(Status::Wait));
        assert!(!fixture.backend.set_status(Status::Setup));
        assert_eq!(
            fixture.messages(),
            vec![
                "install-packages shouldn't use STATUS_WAIT".to_string(),
                "install-packages to SETUP when not in WAIT".to_string(),
            ]
        );
    }

    #[test]
    fn error_blocks_results() {
        let mut fixture = Fixture::new(false);
        fixture.start(Role::Resolve);
        assert!(fixture.backend.error_code(ErrorCode::PackageNotFound, "no foo"));
        assert!(!fixture.backend.error_code(ErrorCode::InternalError, "again"));
        assert!(!fixture.backend.package(Info::Available, "foo;1;i386;r", "Foo"));
        assert!(!fixture.backend.details(Details {
            package_id: "foo;1;i386;r".into(),
            license: "GPL".into(),
            group: pkd_core::Group::Other,
            description: String::new(),
            url: String::new(),
            size: 0,
        }));
        assert!(!fixture.backend.files(FilesItem {
            package_id: "foo;1;i386;r".into(),
            files: vec!["/usr/bin/foo".into()],
        }));
        assert!(!fixture.backend.set_status(Status::Query));
        assert!(!fixture.backend.message(MessageKind::Unknown, "hello"));
        assert!(fixture.backend.message(MessageKind::BackendError, "debug"));

        assert!(fixture.backend.finished());
        assert_eq!(fixture.backend.exit(), Exit::Failed);
        assert!(fixture.backend.poll_timers(fixture.clock.now() + Duration::from_millis(10)));
        let kinds = fixture.drain();
        assert_eq!(kinds.last(), Some(&BackendEventKind::Finished(Exit::Failed)));
        let errors = kinds
            .iter()
            .filter(|kind| matches!(kind, BackendEventKind::ErrorCode { .. }))
            .count();
        assert_eq!(errors, 1);
    }

    #[traced_test]
    #[test]
    fn watchdog_finishes_after_error() {
        let mut fixture = Fixture::new(false);
        fixture.start(Role::RefreshCache);
        fixture.drain();
        fixture.backend.error_code(ErrorCode::NoNetwork, "offline");

        let deadline = fixture.backend.next_deadline().unwrap();
        assert_eq!(deadline - fixture.clock.now(), TimingConfig::default().error_finish_timeout);
        assert!(!fixture.backend.poll_timers(fixture.clock.now()));

        fixture.clock.advance(Duration::from_millis(500));
        assert!(fixture.backend.poll_timers(fixture.clock.now()));
        fixture.clock.advance(Duration::from_millis(10));
        assert!(fixture.backend.poll_timers(fixture.clock.now()));

        let kinds = fixture.drain();
        assert!(kinds.contains(&BackendEventKind::Message {
            kind: MessageKind::BackendError,
            details: "ErrorCode() has to be followed with Finished()!".into(),
        }));
        assert_eq!(kinds.last(), Some(&BackendEventKind::Finished(Exit::Failed)));
        assert!(!fixture.backend.is_active());
        assert!(logs_contain("backend did not call finished after error code"));
    }

    #[test]
    fn finished_waits_for_grace_and_defaults_to_success() {
        let mut fixture = Fixture::new(false);
        fixture.start(Role::GetUpdates);
        fixture.backend.set_status(Status::Query);
        fixture.drain();

        assert!(fixture.backend.finished());
        assert!(!fixture.backend.finished());
        assert_eq!(
            fixture.drain(),
            vec![BackendEventKind::StatusChanged(Status::Finished)]
        );

        assert!(!fixture.backend.poll_timers(fixture.clock.now()));
        fixture.clock.advance(Duration::from_millis(10));
        assert!(fixture.backend.poll_timers(fixture.clock.now()));
        assert_eq!(
            fixture.drain(),
            vec![BackendEventKind::Finished(Exit::Success)]
        );
    }

    #[test]
    fn finished_advisory_checks_only_warn() {
        let mut fixture = Fixture::new(false);
        fixture.start(Role::InstallPackages);
        fixture.drain();
        fixture.backend.finished();
        let messages = fixture.messages();
        assert_eq!(
            messages,
            vec![
                "Backends should send a Package() for install-packages!".to_string(),
                "Backends should send status <value> signals for install-packages!".to_string(),
            ]
        );
        fixture.clock.advance(Duration::from_millis(10));
        fixture.backend.poll_timers(fixture.clock.now());
        assert_eq!(fixture.backend.exit(), Exit::Success);
    }

    #[test]
    fn package_emulates_finished_and_sets_status() {
        let mut fixture = Fixture::new(false);
        fixture.start(Role::InstallPackages);
        fixture.drain();

        let id = "foo;1.0;x86_64;repo";
        assert!(fixture.backend.package(Info::Downloading, id, "Foo"));
        assert!(!fixture.backend.package(Info::Downloading, id, "Foo"));
        assert!(fixture.backend.package(Info::Installing, id, "Foo"));
        assert!(!fixture.backend.package(Info::Installing, "broken", "Foo"));
        fixture.backend.finished();

        let packages: Vec<(Info, String)> = fixture
            .drain()
            .into_iter()
            .filter_map(|kind| match kind {
                BackendEventKind::Package(item) => Some((item.info, item.package_id)),
                _ => None,
            })
            .collect();
        assert_eq!(
            packages,
            vec![
                (Info::Downloading, id.to_string()),
                (Info::Finished, id.to_string()),
                (Info::Installing, id.to_string()),
                (Info::Finished, id.to_string()),
            ]
        );
        assert_eq!(fixture.backend.status(), Status::Finished);
    }

    #[test]
    fn no_package_follows_error() {
        let mut fixture = Fixture::new(false);
        fixture.start(Role::InstallPackages);
        fixture.drain();

        assert!(fixture.backend.package(Info::Downloading, "foo;1.0;x86_64;repo", "Foo"));
        assert!(fixture.backend.error_code(ErrorCode::NoNetwork, "offline"));
        assert!(fixture.backend.finished());
        assert!(fixture.backend.poll_timers(fixture.clock.now() + Duration::from_millis(10)));

        let kinds = fixture.drain();
        let error = kinds
            .iter()
            .position(|kind| matches!(kind, BackendEventKind::ErrorCode { .. }))
            .unwrap();
        assert!(!kinds[error..].iter().any(|kind| matches!(
            kind,
            BackendEventKind::Package(_)
                | BackendEventKind::Details(_)
                | BackendEventKind::Files(_)
        )));
        assert_eq!(kinds.last(), Some(&BackendEventKind::Finished(Exit::Failed)));
    }

    #[test]
    fn simulate_roles_remap_info() {
        let mut fixture = Fixture::new(false);
        fixture.start(Role::SimulateInstallPackages);
        fixture.drain();
        fixture.backend.package(Info::Available, "dep;2;noarch;r", "Dep");
        fixture.backend.package(Info::Installed, "old;1;noarch;r", "Old");
        let infos: Vec<Info> = fixture
            .drain()
            .into_iter()
            .filter_map(|kind| match kind {
                BackendEventKind::Package(item) => Some(item.info),
                _ => None,
            })
            .collect();
        assert_eq!(infos, vec![Info::Installing, Info::Removing]);
    }

    #[test]
    fn signature_and_eula_once_per_run() {
        let fixture = Fixture::new(false);
        fixture.start(Role::InstallPackages);
        let eula = EulaRequest {
            eula_id: "eula-1".into(),
            package_id: "foo;1;i386;r".into(),
            vendor_name: "Acme".into(),
            license_agreement: "terms".into(),
        };
        assert!(fixture.backend.eula_required(eula.clone()));
        assert!(!fixture.backend.eula_required(eula));
    }

    #[test]
    fn allow_cancel_needs_capability() {
        let mut fixture = Fixture::new(false);
        fixture.start(Role::RefreshCache);
        fixture.drain();
        assert!(!fixture.backend.set_allow_cancel(true));
        assert_eq!(fixture.backend.allow_cancel(), AllowCancel::Unset);

        let mut fixture = Fixture::new(true);
        fixture.start(Role::RefreshCache);
        fixture.drain();
        assert!(fixture.backend.set_allow_cancel(true));
        assert!(!fixture.backend.set_allow_cancel(true));
        assert!(fixture.backend.allow_cancel().is_allowed());
        assert_eq!(fixture.drain(), vec![BackendEventKind::AllowCancel(true)]);
    }

    #[test]
    fn cancel_presets_exit() {
        let mut fixture = Fixture::new(true);
        fixture.start(Role::RefreshCache);
        fixture.backend.run(RoleRequest::RefreshCache { force: false }).unwrap();
        fixture.backend.set_allow_cancel(true);
        fixture.drain();

        fixture.backend.cancel();
        assert_eq!(fixture.backend.status(), Status::Cancel);
        assert!(!fixture.backend.set_allow_cancel(true));
        fixture.backend.error_code(ErrorCode::TransactionCancelled, "cancelled");
        fixture.backend.finished();
        fixture.clock.advance(Duration::from_millis(10));
        fixture.backend.poll_timers(fixture.clock.now());
        assert_eq!(
            fixture.drain().last(),
            Some(&BackendEventKind::Finished(Exit::Cancelled))
        );
    }

    #[test]
    fn reset_refuses_while_running() {
        let fixture = Fixture::new(false);
        fixture.start(Role::RefreshCache);
        fixture.backend.run(RoleRequest::RefreshCache { force: false }).unwrap();
        assert!(matches!(fixture.backend.reset(), Err(BackendError::Busy { .. })));
        assert_eq!(fixture.backend.role(), Role::RefreshCache);

        fixture.backend.finished();
        fixture.backend.reset().unwrap();
        assert_eq!(fixture.backend.role(), Role::Unknown);
        assert_eq!(fixture.backend.status(), Status::Unknown);
        assert!(fixture.backend.request().is_none());
    }

    #[test]
    fn reset_flushes_pending_finished() {
        let mut fixture = Fixture::new(false);
        fixture.start(Role::GetUpdates);
        fixture.backend.set_status(Status::Query);
        fixture.backend.finished();
        fixture.drain();
        fixture.backend.reset().unwrap();
        assert_eq!(
            fixture.drain(),
            vec![BackendEventKind::Finished(Exit::Success)]
        );
    }

    #[test]
    fn role_set_once() {
        let fixture = Fixture::new(false);
        fixture.start(Role::Resolve);
        assert!(!fixture.backend.set_role(Role::SearchName));
        assert_eq!(fixture.backend.role(), Role::Resolve);
    }

    #[test]
    fn not_implemented_yet_fails_the_run() {
        let clock = Arc::new(ManualClock::new());
        let config = DaemonConfig::new().execution(ExecutionMode::Inline);
        let implementation = DummyBackend::new().with_roles(RoleSet::from_slice(&[Role::Resolve]));
        let (backend, mut rx) = Backend::new(Box::new(implementation), &config, clock.clone());
        backend.lock().unwrap();
        backend.reset().unwrap();
        backend.set_role(Role::GetCategories);
        backend.set_status(Status::Setup);
        backend.run(RoleRequest::GetCategories).unwrap();
        clock.advance(Duration::from_millis(10));
        backend.poll_timers(clock.now());

        let mut saw_error = false;
        while let Ok(event) = rx.try_recv() {
            if let BackendEventKind::ErrorCode { code, details } = event.kind {
                assert_eq!(code, ErrorCode::NotSupported);
                assert_eq!(details, "the method 'GetCategories' is not implemented yet");
                saw_error = true;
            }
        }
        assert!(saw_error);
        assert_eq!(backend.exit(), Exit::Failed);
    }

    #[test]
    fn eulas_are_daemon_lifetime() {
        let fixture = Fixture::new(false);
        assert!(!fixture.backend.is_eula_valid("eula-1"));
        assert!(fixture.backend.accept_eula("eula-1"));
        assert!(!fixture.backend.accept_eula("eula-1"));
        fixture.start(Role::Resolve);
        assert!(fixture.backend.is_eula_valid("eula-1"));
    }

    #[test]
    fn download_directory_strips_leading_slash() {
        let dir = download_directory_for(Path::new("/var/cache/pkd"), "/3_abcdeabc_data");
        assert_eq!(dir, PathBuf::from("/var/cache/pkd/downloads/3_abcdeabc_data"));
    }
}
