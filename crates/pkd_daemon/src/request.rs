//! Typed client requests, one variant per role.

use pkd_core::{filter_from_text, FilterSet, Role, SigType};
use serde::{Deserialize, Serialize};

/// The parameters of a transaction. The variant determines the role.
///
/// Filters are carried as text and validated when the request is cached on
/// its transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "kebab-case")]
pub enum RoleRequest {
    /// Dependencies of packages.
    GetDepends {
        /// Filter text.
        filter: String,
        /// Package ids.
        package_ids: Vec<String>,
        /// Follow dependencies recursively.
        recursive: bool,
    },
    /// Long descriptions.
    GetDetails {
        /// Package ids.
        package_ids: Vec<String>,
    },
    /// Available distribution upgrades.
    GetDistroUpgrades,
    /// File lists.
    GetFiles {
        /// Package ids.
        package_ids: Vec<String>,
    },
    /// Reverse dependencies.
    GetRequires {
        /// Filter text.
        filter: String,
        /// Package ids.
        package_ids: Vec<String>,
        /// Follow reverse dependencies recursively.
        recursive: bool,
    },
    /// Every package matching a filter.
    GetPackages {
        /// Filter text.
        filter: String,
    },
    /// Update descriptions.
    GetUpdateDetail {
        /// Package ids.
        package_ids: Vec<String>,
    },
    /// Available updates.
    GetUpdates {
        /// Filter text.
        filter: String,
    },
    /// Install packages from repositories.
    InstallPackages {
        /// Refuse untrusted packages.
        only_trusted: bool,
        /// Package ids.
        package_ids: Vec<String>,
    },
    /// Install local package files.
    InstallFiles {
        /// Refuse untrusted files.
        only_trusted: bool,
        /// Absolute paths.
        full_paths: Vec<String>,
    },
    /// Import a repository key.
    InstallSignature {
        /// Key type.
        sig_type: SigType,
        /// Key id.
        key_id: String,
        /// Package that needed the key.
        package_id: String,
    },
    /// Refresh repository metadata.
    RefreshCache {
        /// Refresh even if the metadata looks fresh.
        force: bool,
    },
    /// Remove packages.
    RemovePackages {
        /// Package ids.
        package_ids: Vec<String>,
        /// Also remove packages depending on these.
        allow_deps: bool,
        /// Also remove dependencies nothing else needs.
        autoremove: bool,
    },
    /// Map package names to ids.
    Resolve {
        /// Filter text.
        filter: String,
        /// Package names.
        packages: Vec<String>,
    },
    /// Undo an earlier transaction.
    Rollback {
        /// Transaction to undo.
        transaction_id: String,
    },
    /// Search descriptions.
    SearchDetails {
        /// Filter text.
        filter: String,
        /// Search text.
        search: String,
    },
    /// Search owned files.
    SearchFile {
        /// Filter text.
        filter: String,
        /// Search text.
        search: String,
    },
    /// Search groups.
    SearchGroup {
        /// Filter text.
        filter: String,
        /// Search text.
        search: String,
    },
    /// Search names.
    SearchName {
        /// Filter text.
        filter: String,
        /// Search text.
        search: String,
    },
    /// Update named packages.
    UpdatePackages {
        /// Refuse untrusted packages.
        only_trusted: bool,
        /// Package ids.
        package_ids: Vec<String>,
    },
    /// Update every package.
    UpdateSystem {
        /// Refuse untrusted packages.
        only_trusted: bool,
    },
    /// Configured repositories.
    GetRepoList {
        /// Filter text.
        filter: String,
    },
    /// Enable or disable a repository.
    RepoEnable {
        /// Repository id.
        repo_id: String,
        /// New state.
        enabled: bool,
    },
    /// Change a repository parameter.
    RepoSetData {
        /// Repository id.
        repo_id: String,
        /// Parameter name.
        parameter: String,
        /// New value.
        value: String,
    },
    /// Find packages providing a capability.
    WhatProvides {
        /// Filter text.
        filter: String,
        /// Capability kind text.
        provides: String,
        /// Search text.
        search: String,
    },
    /// Package categories.
    GetCategories,
    /// Download packages without installing.
    DownloadPackages {
        /// Package ids.
        package_ids: Vec<String>,
    },
    /// Dry run of `InstallFiles`.
    SimulateInstallFiles {
        /// Absolute paths.
        full_paths: Vec<String>,
    },
    /// Dry run of `InstallPackages`.
    SimulateInstallPackages {
        /// Package ids.
        package_ids: Vec<String>,
    },
    /// Dry run of `RemovePackages`.
    SimulateRemovePackages {
        /// Package ids.
        package_ids: Vec<String>,
        /// Also remove dependencies nothing else needs.
        autoremove: bool,
    },
    /// Dry run of `UpdatePackages`.
    SimulateUpdatePackages {
        /// Package ids.
        package_ids: Vec<String>,
    },
    /// Accept a license agreement.
    AcceptEula {
        /// Agreement id.
        eula_id: String,
    },
    /// History from the ledger.
    GetOldTransactions {
        /// Maximum number of records, zero for all.
        number: u32,
    },
}

impl RoleRequest {
    /// The role this request performs.
    pub fn role(&self) -> Role {
        match self {
            RoleRequest::GetDepends { .. } => Role::GetDepends,
            RoleRequest::GetDetails { .. } => Role::GetDetails,
            RoleRequest::GetDistroUpgrades => Role::GetDistroUpgrades,
            RoleRequest::GetFiles { .. } => Role::GetFiles,
            RoleRequest::GetRequires { .. } => Role::GetRequires,
            RoleRequest::GetPackages { .. } => Role::GetPackages,
            RoleRequest::GetUpdateDetail { .. } => Role::GetUpdateDetail,
            RoleRequest::GetUpdates { .. } => Role::GetUpdates,
            RoleRequest::InstallPackages { .. } => Role::InstallPackages,
            RoleRequest::InstallFiles { .. } => Role::InstallFiles,
            RoleRequest::InstallSignature { .. } => Role::InstallSignature,
            RoleRequest::RefreshCache { .. } => Role::RefreshCache,
            RoleRequest::RemovePackages { .. } => Role::RemovePackages,
            RoleRequest::Resolve { .. } => Role::Resolve,
            RoleRequest::Rollback { .. } => Role::Rollback,
            RoleRequest::SearchDetails { .. } => Role::SearchDetails,
            RoleRequest::SearchFile { .. } => Role::SearchFile,
            RoleRequest::SearchGroup { .. } => Role::SearchGroup,
            RoleRequest::SearchName { .. } => Role::SearchName,
            RoleRequest::UpdatePackages { .. } => Role::UpdatePackages,
            RoleRequest::UpdateSystem { .. } => Role::UpdateSystem,
            RoleRequest::GetRepoList { .. } => Role::GetRepoList,
            RoleRequest::RepoEnable { .. } => Role::RepoEnable,
            RoleRequest::RepoSetData { .. } => Role::RepoSetData,
            RoleRequest::WhatProvides { .. } => Role::WhatProvides,
            RoleRequest::GetCategories => Role::GetCategories,
            RoleRequest::DownloadPackages { .. } => Role::DownloadPackages,
            RoleRequest::SimulateInstallFiles { .. } => Role::SimulateInstallFiles,
            RoleRequest::SimulateInstallPackages { .. } => Role::SimulateInstallPackages,
            RoleRequest::SimulateRemovePackages { .. } => Role::SimulateRemovePackages,
            RoleRequest::SimulateUpdatePackages { .. } => Role::SimulateUpdatePackages,
            RoleRequest::AcceptEula { .. } => Role::AcceptEula,
            RoleRequest::GetOldTransactions { .. } => Role::GetOldTransactions,
        }
    }

    /// The filter text, if the role takes one.
    pub fn filter_text(&self) -> Option<&str> {
        match self {
            RoleRequest::GetDepends { filter, .. }
            | RoleRequest::GetRequires { filter, .. }
            | RoleRequest::GetPackages { filter }
            | RoleRequest::GetUpdates { filter }
            | RoleRequest::Resolve { filter, .. }
            | RoleRequest::SearchDetails { filter, .. }
            | RoleRequest::SearchFile { filter, .. }
            | RoleRequest::SearchGroup { filter, .. }
            | RoleRequest::SearchName { filter, .. }
            | RoleRequest::GetRepoList { filter }
            | RoleRequest::WhatProvides { filter, .. } => Some(filter),
            _ => None,
        }
    }

    /// The parsed filters; empty if the role takes none or the text is
    /// invalid.
    pub fn filters(&self) -> FilterSet {
        self.filter_text()
            .and_then(|text| filter_from_text(text).ok())
            .unwrap_or_default()
    }

    /// The package ids, if the role takes them.
    pub fn package_ids(&self) -> Option<&[String]> {
        match self {
            RoleRequest::GetDepends { package_ids, .. }
            | RoleRequest::GetDetails { package_ids }
            | RoleRequest::GetFiles { package_ids }
            | RoleRequest::GetRequires { package_ids, .. }
            | RoleRequest::GetUpdateDetail { package_ids }
            | RoleRequest::InstallPackages { package_ids, .. }
            | RoleRequest::RemovePackages { package_ids, .. }
            | RoleRequest::UpdatePackages { package_ids, .. }
            | RoleRequest::DownloadPackages { package_ids }
            | RoleRequest::SimulateInstallPackages { package_ids }
            | RoleRequest::SimulateRemovePackages { package_ids, .. }
            | RoleRequest::SimulateUpdatePackages { package_ids } => Some(package_ids),
            _ => None,
        }
    }

    /// The search text, if the role takes one.
    pub fn search(&self) -> Option<&str> {
        match self {
            RoleRequest::SearchDetails { search, .. }
            | RoleRequest::SearchFile { search, .. }
            | RoleRequest::SearchGroup { search, .. }
            | RoleRequest::SearchName { search, .. }
            | RoleRequest::WhatProvides { search, .. } => Some(search),
            _ => None,
        }
    }

    /// The trusted flag passed to the policy predicate.
    pub fn trusted(&self) -> bool {
        match self {
            RoleRequest::InstallPackages { only_trusted, .. }
            | RoleRequest::InstallFiles { only_trusted, .. }
            | RoleRequest::UpdatePackages { only_trusted, .. }
            | RoleRequest::UpdateSystem { only_trusted } => *only_trusted,
            _ => true,
        }
    }

    /// Short text describing what the request is about: the first package
    /// name, or the search text.
    pub fn summary_text(&self) -> String {
        if let Some(first) = self.package_ids().and_then(|ids| ids.first()) {
            return first.split(';').next().unwrap_or_default().to_string();
        }
        if let Some(search) = self.search() {
            return search.to_string();
        }
        match self {
            RoleRequest::Resolve { packages, .. } => packages.first().cloned().unwrap_or_default(),
            RoleRequest::InstallFiles { full_paths, .. }
            | RoleRequest::SimulateInstallFiles { full_paths } => {
                full_paths.first().cloned().unwrap_or_default()
            }
            RoleRequest::RepoEnable { repo_id, .. } | RoleRequest::RepoSetData { repo_id, .. } => {
                repo_id.clone()
            }
            RoleRequest::InstallSignature { key_id, .. } => key_id.clone(),
            RoleRequest::Rollback { transaction_id } => transaction_id.clone(),
            RoleRequest::AcceptEula { eula_id } => eula_id.clone(),
            _ => String::new(),
        }
    }
}
