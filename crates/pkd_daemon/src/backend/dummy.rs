//! A self-contained backend with canned data.
//!
//! In immediate mode every role answers synchronously from a small fixed
//! catalog. In manual mode role methods only record that they were called
//! and leave the run open, so tests can drive the emission API themselves.

use super::{BackendJob, PackageBackend};
use parking_lot::Mutex;
use pkd_core::{
    Category, Details, DistroUpgrade, DistroUpgradeKind, ErrorCode, EulaRequest, Filter,
    FilesItem, FilterSet, Group, GroupSet, Info, PackageId, Provides, RepoDetail,
    RepoSignatureRequest, Restart, Role, RoleSet, SigType, Status, UpdateDetail,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const GLIB: &str = "glib2;2.14.0;i386;fedora";
const GTKHTML: &str = "gtkhtml2;2.19.1-4.fc8;i386;fedora";
const KERNEL: &str = "kernel;2.6.23-0.115.rc3.git1.fc8;i386;installed";
const KERNEL_UPDATE: &str = "kernel;2.6.23-0.116.fc8;i386;fedora";
const POWERTOP: &str = "powertop;1.8-1.fc8;i386;installed";
const POWERTOP_UPDATE: &str = "powertop;1.9-1.fc8;i386;fedora";
const VIPS_DOC: &str = "vips-doc;7.12.4-2.fc8;noarch;linva";

/// License that must be accepted before `vips-doc` installs.
pub const DUMMY_EULA_ID: &str = "eula_dummy_vips";

/// Repository data marking packages whose key is not yet trusted.
pub const DUMMY_UNSIGNED_REPO: &str = "unsigned";

const CATALOG: &[(Info, &str, &str)] = &[
    (Info::Installed, GLIB, "The GLib library"),
    (Info::Available, GTKHTML, "An HTML widget for GTK+ 2.0"),
    (Info::Installed, KERNEL, "The Linux kernel"),
    (Info::Installed, POWERTOP, "Power consumption monitor"),
    (Info::Available, VIPS_DOC, "Documentation for the VIPS image library"),
];

const REPOS: &[(&str, &str, bool)] = &[
    ("fedora", "Fedora - 9", true),
    ("development", "Fedora - Development", false),
    ("livna", "Livna for Fedora Core 8 - i386", true),
];

#[derive(Debug, Default)]
struct DummyLog {
    requests: Mutex<Vec<Role>>,
    cancels: AtomicUsize,
    initialized: AtomicUsize,
    destroyed: AtomicUsize,
}

/// Observes a [`DummyBackend`] after it was moved into a backend slot.
#[derive(Debug, Clone)]
pub struct DummyHandle(Arc<DummyLog>);

impl DummyHandle {
    /// Roles dispatched so far, in order.
    pub fn requests(&self) -> Vec<Role> {
        self.0.requests.lock().clone()
    }

    /// The most recently dispatched role.
    pub fn last_request(&self) -> Option<Role> {
        self.0.requests.lock().last().copied()
    }

    /// How often the abort hook ran.
    pub fn cancel_count(&self) -> usize {
        self.0.cancels.load(Ordering::SeqCst)
    }

    /// How often the initialize hook ran.
    pub fn initialize_count(&self) -> usize {
        self.0.initialized.load(Ordering::SeqCst)
    }

    /// How often the teardown hook ran.
    pub fn destroy_count(&self) -> usize {
        self.0.destroyed.load(Ordering::SeqCst)
    }
}

/// The built-in `dummy` backend.
#[derive(Debug)]
pub struct DummyBackend {
    roles: RoleSet,
    cancel: bool,
    manual: bool,
    mime_types: Vec<String>,
    initialize_error: Option<String>,
    log: Arc<DummyLog>,
}

impl DummyBackend {
    /// An immediate-mode backend implementing every role.
    pub fn new() -> Self {
        let roles = Role::ALL
            .iter()
            .copied()
            .filter(|role| {
                !matches!(
                    role,
                    Role::Unknown
                        | Role::Cancel
                        | Role::AcceptEula
                        | Role::GetOldTransactions
                        | Role::SetProxyPrivate
                )
            })
            .collect();
        Self {
            roles,
            cancel: true,
            manual: false,
            mime_types: vec!["application/x-rpm".to_string()],
            initialize_error: None,
            log: Arc::new(DummyLog::default()),
        }
    }

    /// A manual-mode backend and the handle observing it.
    pub fn manual() -> (Self, DummyHandle) {
        let backend = Self {
            manual: true,
            ..Self::new()
        };
        let handle = backend.handle();
        (backend, handle)
    }

    /// A handle observing this backend.
    pub fn handle(&self) -> DummyHandle {
        DummyHandle(Arc::clone(&self.log))
    }

    /// Restricts the implemented roles.
    #[must_use]
    pub fn with_roles(mut self, roles: RoleSet) -> Self {
        self.roles = roles;
        self
    }

    /// Sets whether running roles can be aborted.
    #[must_use]
    pub fn with_cancel(mut self, cancel: bool) -> Self {
        self.cancel = cancel;
        self
    }

    /// Sets the installable mime types.
    #[must_use]
    pub fn with_mime_types(mut self, mime_types: Vec<String>) -> Self {
        self.mime_types = mime_types;
        self
    }

    /// Makes the initialize hook fail with `message`.
    #[must_use]
    pub fn failing_initialize(mut self, message: impl Into<String>) -> Self {
        self.initialize_error = Some(message.into());
        self
    }

    /// Records the call and decides whether canned data should follow.
    fn begin(&self, job: &BackendJob, method: &str) -> bool {
        let role = job.role();
        self.log.requests.lock().push(role);
        if !self.roles.contains(role) {
            job.not_implemented_yet(method);
            return false;
        }
        !self.manual
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn name_of(package_id: &str) -> &str {
    package_id.split(';').next().unwrap_or(package_id)
}

fn filter_allows(filters: FilterSet, info: Info) -> bool {
    if filters.contains(Filter::Installed) && info != Info::Installed {
        return false;
    }
    if filters.contains(Filter::NotInstalled) && info == Info::Installed {
        return false;
    }
    true
}

fn emit_catalog(job: &BackendJob, filters: FilterSet, matches: impl Fn(&str, &str) -> bool) {
    job.set_status(Status::Query);
    for (info, id, summary) in CATALOG {
        if filter_allows(filters, *info) && matches(id, summary) {
            job.package(*info, id, summary);
        }
    }
    job.finished();
}

fn progress_steps(job: &BackendJob, steps: u32) {
    for step in 0..=steps {
        job.set_percentage(step * 100 / steps.max(1));
    }
}

impl PackageBackend for DummyBackend {
    fn name(&self) -> &str {
        "dummy"
    }

    fn description(&self) -> &str {
        "Dummy backend returning canned data"
    }

    fn author(&self) -> &str {
        "pkd developers"
    }

    fn roles(&self) -> RoleSet {
        let mut roles = self.roles;
        if self.cancel {
            roles.insert(Role::Cancel);
        }
        roles
    }

    fn groups(&self) -> GroupSet {
        GroupSet::from_slice(&[
            Group::Accessibility,
            Group::Games,
            Group::Programming,
            Group::System,
        ])
    }

    fn filters(&self) -> FilterSet {
        FilterSet::from_slice(&[Filter::Installed, Filter::NotInstalled, Filter::Development])
    }

    fn mime_types(&self) -> Vec<String> {
        self.mime_types.clone()
    }

    fn supports_cancel(&self) -> bool {
        self.cancel
    }

    fn initialize(&self, _job: &BackendJob) -> Result<(), String> {
        self.log.initialized.fetch_add(1, Ordering::SeqCst);
        match &self.initialize_error {
            Some(message) => Err(message.clone()),
            None => Ok(()),
        }
    }

    fn destroy(&self, _job: &BackendJob) {
        self.log.destroyed.fetch_add(1, Ordering::SeqCst);
    }

    fn cancel(&self, _job: &BackendJob) {
        self.log.cancels.fetch_add(1, Ordering::SeqCst);
    }

    fn get_depends(
        &self,
        job: &BackendJob,
        filters: FilterSet,
        _package_ids: &[String],
        _recursive: bool,
    ) {
        if self.begin(job, "GetDepends") {
            emit_catalog(job, filters, |id, _| id == GLIB);
        }
    }

    fn get_details(&self, job: &BackendJob, package_ids: &[String]) {
        if !self.begin(job, "GetDetails") {
            return;
        }
        job.set_status(Status::Query);
        for id in package_ids {
            job.details(Details {
                package_id: id.clone(),
                license: "GPL2+".to_string(),
                group: Group::Programming,
                description: format!("{} is a package provided by the dummy backend", name_of(id)),
                url: "http://example.org/".to_string(),
                size: 11_215_872,
            });
        }
        job.finished();
    }

    fn get_distro_upgrades(&self, job: &BackendJob) {
        if !self.begin(job, "GetDistroUpgrades") {
            return;
        }
        job.set_status(Status::Query);
        job.distro_upgrade(DistroUpgrade {
            kind: DistroUpgradeKind::Stable,
            name: "fedora-9".to_string(),
            summary: "Fedora 9".to_string(),
        });
        job.finished();
    }

    fn get_files(&self, job: &BackendJob, package_ids: &[String]) {
        if !self.begin(job, "GetFiles") {
            return;
        }
        job.set_status(Status::Query);
        for id in package_ids {
            let name = name_of(id);
            job.files(FilesItem {
                package_id: id.clone(),
                files: vec![format!("/usr/bin/{name}"), format!("/usr/share/doc/{name}/README")],
            });
        }
        job.finished();
    }

    fn get_requires(
        &self,
        job: &BackendJob,
        filters: FilterSet,
        _package_ids: &[String],
        _recursive: bool,
    ) {
        if self.begin(job, "GetRequires") {
            emit_catalog(job, filters, |id, _| id == GTKHTML || id == POWERTOP);
        }
    }

    fn get_packages(&self, job: &BackendJob, filters: FilterSet) {
        if self.begin(job, "GetPackages") {
            emit_catalog(job, filters, |_, _| true);
        }
    }

    fn get_update_detail(&self, job: &BackendJob, package_ids: &[String]) {
        if !self.begin(job, "GetUpdateDetail") {
            return;
        }
        job.set_status(Status::Query);
        for id in package_ids {
            let summary = format!("Update to the newest {}", name_of(id));
            let mut detail = UpdateDetail::new(id.clone(), summary);
            if name_of(id) == "kernel" {
                detail.restart = Some(Restart::System);
                detail.updates = KERNEL.to_string();
            }
            job.update_detail(detail);
        }
        job.finished();
    }

    fn get_updates(&self, job: &BackendJob, _filters: FilterSet) {
        if !self.begin(job, "GetUpdates") {
            return;
        }
        job.set_status(Status::Query);
        job.package(Info::Security, POWERTOP_UPDATE, "Power consumption monitor");
        job.package(Info::Bugfix, KERNEL_UPDATE, "The Linux kernel");
        job.finished();
    }

    fn install_packages(&self, job: &BackendJob, _only_trusted: bool, package_ids: &[String]) {
        if !self.begin(job, "InstallPackages") {
            return;
        }

        if package_ids.iter().any(|id| id == VIPS_DOC) && !job.is_eula_valid(DUMMY_EULA_ID) {
            job.eula_required(EulaRequest {
                eula_id: DUMMY_EULA_ID.to_string(),
                package_id: VIPS_DOC.to_string(),
                vendor_name: "Linva".to_string(),
                license_agreement: "Do not use this documentation for evil.".to_string(),
            });
            job.error_code(
                ErrorCode::NoLicenseAgreement,
                "licence not installed so cannot install",
            );
            job.finished();
            return;
        }

        let unsigned = package_ids.iter().find(|id| {
            PackageId::parse(id).is_ok_and(|parsed| parsed.data == DUMMY_UNSIGNED_REPO)
        });
        if let Some(id) = unsigned {
            job.repo_signature_required(RepoSignatureRequest {
                package_id: id.clone(),
                repository_name: DUMMY_UNSIGNED_REPO.to_string(),
                key_url: "http://example.org/key.asc".to_string(),
                key_userid: "Dummy Key <key@example.org>".to_string(),
                key_id: "BB7576AC".to_string(),
                key_fingerprint: "D8CC 06C2 77EC 9C53 372F C199 B1EE 1799 F24F 1B08".to_string(),
                key_timestamp: "2007-10-04".to_string(),
                sig_type: SigType::Gpg,
            });
            job.error_code(ErrorCode::GpgFailure, "GPG signed package could not be verified");
            job.finished();
            return;
        }

        job.set_allow_cancel(true);
        job.set_percentage(0);
        for id in package_ids {
            job.package(Info::Downloading, id, "Downloading");
        }
        job.set_percentage(50);
        job.set_allow_cancel(false);
        for id in package_ids {
            job.package(Info::Installing, id, "Installing");
        }
        job.set_percentage(100);
        job.finished();
    }

    fn install_files(&self, job: &BackendJob, _only_trusted: bool, full_paths: &[String]) {
        if !self.begin(job, "InstallFiles") {
            return;
        }
        job.set_status(Status::Install);
        for path in full_paths {
            let stem = Path::new(path)
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or("local");
            job.package(Info::Installing, &format!("{stem};1.0;noarch;local"), "Local package");
        }
        progress_steps(job, 4);
        job.finished();
    }

    fn install_signature(
        &self,
        job: &BackendJob,
        _sig_type: SigType,
        _key_id: &str,
        _package_id: &str,
    ) {
        if !self.begin(job, "InstallSignature") {
            return;
        }
        job.set_status(Status::SigCheck);
        job.finished();
    }

    fn refresh_cache(&self, job: &BackendJob, _force: bool) {
        if !self.begin(job, "RefreshCache") {
            return;
        }
        if !job.is_online() {
            job.error_code(ErrorCode::NoNetwork, "cannot refresh cache whilst offline");
            job.finished();
            return;
        }
        job.set_allow_cancel(true);
        job.set_status(Status::RefreshCache);
        progress_steps(job, 4);
        job.finished();
    }

    fn remove_packages(
        &self,
        job: &BackendJob,
        package_ids: &[String],
        allow_deps: bool,
        _autoremove: bool,
    ) {
        if !self.begin(job, "RemovePackages") {
            return;
        }
        if !allow_deps && package_ids.iter().any(|id| name_of(id) == "glib2") {
            job.error_code(
                ErrorCode::DepResolutionFailed,
                "glib2 is required by other packages",
            );
            job.finished();
            return;
        }
        job.set_status(Status::Remove);
        for id in package_ids {
            job.package(Info::Removing, id, "Removing");
        }
        job.set_percentage(100);
        job.finished();
    }

    fn resolve(&self, job: &BackendJob, filters: FilterSet, packages: &[String]) {
        if !self.begin(job, "Resolve") {
            return;
        }
        job.set_status(Status::Query);
        for name in packages {
            let (info, data) = if filters.contains(Filter::NotInstalled) {
                (Info::Available, "fedora")
            } else {
                (Info::Installed, "installed")
            };
            job.package(info, &format!("{name};1.0-1;i386;{data}"), "Resolved package");
        }
        job.finished();
    }

    fn rollback(&self, job: &BackendJob, _transaction_id: &str) {
        if !self.begin(job, "Rollback") {
            return;
        }
        job.set_status(Status::Rollback);
        job.finished();
    }

    fn search_details(&self, job: &BackendJob, filters: FilterSet, search: &str) {
        if self.begin(job, "SearchDetails") {
            let search = search.to_lowercase();
            emit_catalog(job, filters, |_, summary| {
                summary.to_lowercase().contains(&search)
            });
        }
    }

    fn search_file(&self, job: &BackendJob, filters: FilterSet, search: &str) {
        if self.begin(job, "SearchFile") {
            let file = Path::new(search)
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or(search);
            emit_catalog(job, filters, |id, _| name_of(id) == file);
        }
    }

    fn search_group(&self, job: &BackendJob, filters: FilterSet, search: &str) {
        if self.begin(job, "SearchGroup") {
            let system = search == Group::System.as_str();
            emit_catalog(job, filters, |id, _| {
                system == (name_of(id) == "kernel" || name_of(id) == "powertop")
            });
        }
    }

    fn search_name(&self, job: &BackendJob, filters: FilterSet, search: &str) {
        if self.begin(job, "SearchName") {
            emit_catalog(job, filters, |id, _| name_of(id).contains(search));
        }
    }

    fn update_packages(&self, job: &BackendJob, _only_trusted: bool, package_ids: &[String]) {
        if !self.begin(job, "UpdatePackages") {
            return;
        }
        job.set_status(Status::Update);
        for id in package_ids {
            job.package(Info::Updating, id, "Updating");
            if name_of(id) == "kernel" {
                job.require_restart(Restart::System, id);
            }
        }
        job.set_percentage(100);
        job.finished();
    }

    fn update_system(&self, job: &BackendJob, _only_trusted: bool) {
        if !self.begin(job, "UpdateSystem") {
            return;
        }
        job.set_allow_cancel(true);
        job.set_status(Status::Download);
        job.package(Info::Downloading, POWERTOP_UPDATE, "Power consumption monitor");
        job.package(Info::Downloading, KERNEL_UPDATE, "The Linux kernel");
        job.set_percentage(50);
        job.set_allow_cancel(false);
        job.package(Info::Updating, POWERTOP_UPDATE, "Power consumption monitor");
        job.package(Info::Updating, KERNEL_UPDATE, "The Linux kernel");
        job.require_restart(Restart::System, KERNEL_UPDATE);
        job.set_percentage(100);
        job.finished();
    }

    fn get_repo_list(&self, job: &BackendJob, _filters: FilterSet) {
        if !self.begin(job, "GetRepoList") {
            return;
        }
        job.set_status(Status::Query);
        for (repo_id, description, enabled) in REPOS {
            job.repo_detail(RepoDetail {
                repo_id: repo_id.to_string(),
                description: description.to_string(),
                enabled: *enabled,
            });
        }
        job.finished();
    }

    fn repo_enable(&self, job: &BackendJob, repo_id: &str, _enabled: bool) {
        if !self.begin(job, "RepoEnable") {
            return;
        }
        if !REPOS.iter().any(|(id, _, _)| *id == repo_id) {
            job.error_code(ErrorCode::RepoNotFound, &format!("unknown repository {repo_id}"));
        }
        job.finished();
    }

    fn repo_set_data(&self, job: &BackendJob, repo_id: &str, _parameter: &str, _value: &str) {
        if !self.begin(job, "RepoSetData") {
            return;
        }
        if !REPOS.iter().any(|(id, _, _)| *id == repo_id) {
            job.error_code(ErrorCode::RepoNotFound, &format!("unknown repository {repo_id}"));
        }
        job.finished();
    }

    fn what_provides(
        &self,
        job: &BackendJob,
        _filters: FilterSet,
        provides: Provides,
        _search: &str,
    ) {
        if !self.begin(job, "WhatProvides") {
            return;
        }
        job.set_status(Status::Query);
        if matches!(provides, Provides::Codec | Provides::Any) {
            job.package(
                Info::Available,
                "gstreamer-plugins-ugly;0.10.8-1.fc8;i386;livna",
                "GStreamer streaming media framework \"ugly\" plug-ins",
            );
        }
        job.finished();
    }

    fn get_categories(&self, job: &BackendJob) {
        if !self.begin(job, "GetCategories") {
            return;
        }
        job.set_status(Status::Query);
        let categories = [
            ("", "internet", "Internet", "Applications that use the network"),
            ("internet", "web", "Web browsers", "Browse the web"),
            ("", "system", "System", "System tools"),
        ];
        for (parent_id, cat_id, name, summary) in categories {
            job.category(Category {
                parent_id: parent_id.to_string(),
                cat_id: cat_id.to_string(),
                name: name.to_string(),
                summary: summary.to_string(),
                icon: format!("applications-{cat_id}"),
            });
        }
        job.finished();
    }

    fn download_packages(&self, job: &BackendJob, package_ids: &[String], directory: &Path) {
        if !self.begin(job, "DownloadPackages") {
            return;
        }
        job.set_status(Status::Download);
        for id in package_ids {
            let file = match PackageId::parse(id) {
                Ok(parsed) => format!("{}-{}.{}.rpm", parsed.name, parsed.version, parsed.arch),
                Err(_) => format!("{}.rpm", name_of(id)),
            };
            job.files(FilesItem {
                package_id: id.clone(),
                files: vec![directory.join(file).display().to_string()],
            });
        }
        job.finished();
    }

    fn simulate_install_files(&self, job: &BackendJob, _full_paths: &[String]) {
        if self.begin(job, "SimulateInstallFiles") {
            emit_catalog(job, FilterSet::empty(), |id, _| id == GTKHTML);
        }
    }

    fn simulate_install_packages(&self, job: &BackendJob, _package_ids: &[String]) {
        if self.begin(job, "SimulateInstallPackages") {
            emit_catalog(job, FilterSet::empty(), |id, _| id == GTKHTML);
        }
    }

    fn simulate_remove_packages(
        &self,
        job: &BackendJob,
        _package_ids: &[String],
        _autoremove: bool,
    ) {
        if self.begin(job, "SimulateRemovePackages") {
            emit_catalog(job, FilterSet::empty(), |id, _| id == POWERTOP);
        }
    }

    fn simulate_update_packages(&self, job: &BackendJob, package_ids: &[String]) {
        if !self.begin(job, "SimulateUpdatePackages") {
            return;
        }
        job.set_status(Status::DepResolve);
        for id in package_ids {
            job.package(Info::Updating, id, "Updating");
        }
        job.finished();
    }
}
