//! The capability interface every package-manager backend implements.

use super::BackendJob;
use pkd_core::{FilterSet, GroupSet, Provides, Role, RoleSet, SigType};
use std::path::Path;

/// A package-manager implementation.
///
/// Role methods run with the backend locked and a role set. They report
/// through the [`BackendJob`] and must eventually call
/// [`finished`](super::Backend::finished), on any thread. Every role method
/// has a default body reporting `not-supported`, so an implementation only
/// overrides what it lists in [`roles`](PackageBackend::roles).
#[allow(unused_variables)]
pub trait PackageBackend: Send + Sync {
    /// Short name.
    fn name(&self) -> &str;

    /// One line description.
    fn description(&self) -> &str;

    /// Author.
    fn author(&self) -> &str;

    /// Roles this backend implements.
    fn roles(&self) -> RoleSet;

    /// Groups this backend can classify packages into.
    fn groups(&self) -> GroupSet {
        GroupSet::empty()
    }

    /// Filters this backend honors.
    fn filters(&self) -> FilterSet {
        FilterSet::empty()
    }

    /// Mime types of local package files this backend can install.
    fn mime_types(&self) -> Vec<String> {
        Vec::new()
    }

    /// Whether a running role can be aborted.
    fn supports_cancel(&self) -> bool {
        self.roles().contains(Role::Cancel)
    }

    /// Called once when the backend is locked.
    fn initialize(&self, job: &BackendJob) -> Result<(), String> {
        Ok(())
    }

    /// Called once when the backend is unlocked.
    fn destroy(&self, job: &BackendJob) {}

    /// Best-effort abort of the running role.
    fn cancel(&self, job: &BackendJob) {}

    /// Dependencies of packages.
    fn get_depends(
        &self,
        job: &BackendJob,
        filters: FilterSet,
        package_ids: &[String],
        recursive: bool,
    ) {
        job.not_implemented_yet("GetDepends");
    }

    /// Long descriptions.
    fn get_details(&self, job: &BackendJob, package_ids: &[String]) {
        job.not_implemented_yet("GetDetails");
    }

    /// Available distribution upgrades.
    fn get_distro_upgrades(&self, job: &BackendJob) {
        job.not_implemented_yet("GetDistroUpgrades");
    }

    /// File lists.
    fn get_files(&self, job: &BackendJob, package_ids: &[String]) {
        job.not_implemented_yet("GetFiles");
    }

    /// Reverse dependencies.
    fn get_requires(
        &self,
        job: &BackendJob,
        filters: FilterSet,
        package_ids: &[String],
        recursive: bool,
    ) {
        job.not_implemented_yet("GetRequires");
    }

    /// Every package matching the filters.
    fn get_packages(&self, job: &BackendJob, filters: FilterSet) {
        job.not_implemented_yet("GetPackages");
    }

    /// Update descriptions.
    fn get_update_detail(&self, job: &BackendJob, package_ids: &[String]) {
        job.not_implemented_yet("GetUpdateDetail");
    }

    /// Available updates.
    fn get_updates(&self, job: &BackendJob, filters: FilterSet) {
        job.not_implemented_yet("GetUpdates");
    }

    /// Install packages from repositories.
    fn install_packages(&self, job: &BackendJob, only_trusted: bool, package_ids: &[String]) {
        job.not_implemented_yet("InstallPackages");
    }

    /// Install local files.
    fn install_files(&self, job: &BackendJob, only_trusted: bool, full_paths: &[String]) {
        job.not_implemented_yet("InstallFiles");
    }

    /// Import a repository key.
    fn install_signature(
        &self,
        job: &BackendJob,
        sig_type: SigType,
        key_id: &str,
        package_id: &str,
    ) {
        job.not_implemented_yet("InstallSignature");
    }

    /// Refresh repository metadata.
    fn refresh_cache(&self, job: &BackendJob, force: bool) {
        job.not_implemented_yet("RefreshCache");
    }

    /// Remove packages.
    fn remove_packages(
        &self,
        job: &BackendJob,
        package_ids: &[String],
        allow_deps: bool,
        autoremove: bool,
    ) {
        job.not_implemented_yet("RemovePackages");
    }

    /// Map package names to ids.
    fn resolve(&self, job: &BackendJob, filters: FilterSet, packages: &[String]) {
        job.not_implemented_yet("Resolve");
    }

    /// Undo an earlier transaction.
    fn rollback(&self, job: &BackendJob, transaction_id: &str) {
        job.not_implemented_yet("Rollback");
    }

    /// Search descriptions.
    fn search_details(&self, job: &BackendJob, filters: FilterSet, search: &str) {
        job.not_implemented_yet("SearchDetails");
    }

    /// Search owned files.
    fn search_file(&self, job: &BackendJob, filters: FilterSet, search: &str) {
        job.not_implemented_yet("SearchFile");
    }

    /// Search groups.
    fn search_group(&self, job: &BackendJob, filters: FilterSet, search: &str) {
        job.not_implemented_yet("SearchGroup");
    }

    /// Search names.
    fn search_name(&self, job: &BackendJob, filters: FilterSet, search: &str) {
        job.not_implemented_yet("SearchName");
    }

    /// Update named packages.
    fn update_packages(&self, job: &BackendJob, only_trusted: bool, package_ids: &[String]) {
        job.not_implemented_yet("UpdatePackages");
    }

    /// Update every package.
    fn update_system(&self, job: &BackendJob, only_trusted: bool) {
        job.not_implemented_yet("UpdateSystem");
    }

    /// Configured repositories.
    fn get_repo_list(&self, job: &BackendJob, filters: FilterSet) {
        job.not_implemented_yet("GetRepoList");
    }

    /// Enable or disable a repository.
    fn repo_enable(&self, job: &BackendJob, repo_id: &str, enabled: bool) {
        job.not_implemented_yet("RepoEnable");
    }

    /// Change a repository parameter.
    fn repo_set_data(&self, job: &BackendJob, repo_id: &str, parameter: &str, value: &str) {
        job.not_implemented_yet("RepoSetData");
    }

    /// Find packages providing a capability.
    fn what_provides(
        &self,
        job: &BackendJob,
        filters: FilterSet,
        provides: Provides,
        search: &str,
    ) {
        job.not_implemented_yet("WhatProvides");
    }

    /// Package categories.
    fn get_categories(&self, job: &BackendJob) {
        job.not_implemented_yet("GetCategories");
    }

    /// Download packages into `directory`.
    fn download_packages(&self, job: &BackendJob, package_ids: &[String], directory: &Path) {
        job.not_implemented_yet("DownloadPackages");
    }

    /// Dry run of `install_files`.
    fn simulate_install_files(&self, job: &BackendJob, full_paths: &[String]) {
        job.not_implemented_yet("SimulateInstallFiles");
    }

    /// Dry run of `install_packages`.
    fn simulate_install_packages(&self, job: &BackendJob, package_ids: &[String]) {
        job.not_implemented_yet("SimulateInstallPackages");
    }

    /// Dry run of `remove_packages`.
    fn simulate_remove_packages(&self, job: &BackendJob, package_ids: &[String], autoremove: bool) {
        job.not_implemented_yet("SimulateRemovePackages");
    }

    /// Dry run of `update_packages`.
    fn simulate_update_packages(&self, job: &BackendJob, package_ids: &[String]) {
        job.not_implemented_yet("SimulateUpdatePackages");
    }
}
