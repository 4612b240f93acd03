//! Result items produced by backends.

use crate::enums::{DistroUpgradeKind, Group, Info, Restart, SigType, UpdateState};
use serde::{Deserialize, Serialize};

/// A package result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageItem {
    /// What the result says about the package.
    pub info: Info,
    /// Package id text.
    pub package_id: String,
    /// One line summary.
    pub summary: String,
}

impl PackageItem {
    /// Creates a package result.
    pub fn new(info: Info, package_id: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            info,
            package_id: package_id.into(),
            summary: summary.into(),
        }
    }

    /// Formats the item as one ledger data line.
    pub fn to_ledger_line(&self) -> String {
        format!("{}\t{}\t{}", self.info, self.package_id, self.summary)
    }
}

/// Long description of a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Details {
    /// Package id text.
    pub package_id: String,
    /// License expression.
    pub license: String,
    /// Group the package belongs to.
    pub group: Group,
    /// Multi-line description.
    pub description: String,
    /// Upstream URL.
    pub url: String,
    /// Download or installed size in bytes.
    pub size: u64,
}

/// Description of an available update.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UpdateDetail {
    /// Package id of the update.
    pub package_id: String,
    /// Package ids being updated.
    pub updates: String,
    /// Package ids being obsoleted.
    pub obsoletes: String,
    /// Vendor advisory URL.
    pub vendor_url: String,
    /// Bug tracker URL.
    pub bugzilla_url: String,
    /// CVE URL.
    pub cve_url: String,
    /// Restart needed after applying the update.
    pub restart: Option<Restart>,
    /// Update description.
    pub update_text: String,
    /// Changelog text.
    pub changelog: String,
    /// Release state.
    pub state: Option<UpdateState>,
    /// Issue date.
    pub issued: String,
    /// Last change date.
    pub updated: String,
}

impl UpdateDetail {
    /// Creates an update detail with only the package id and text set.
    pub fn new(package_id: impl Into<String>, update_text: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            update_text: update_text.into(),
            ..Self::default()
        }
    }
}

/// A configured repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoDetail {
    /// Repository id.
    pub repo_id: String,
    /// Human readable description.
    pub description: String,
    /// Whether the repository is enabled.
    pub enabled: bool,
}

/// A package category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Parent category id, empty for top level.
    pub parent_id: String,
    /// Category id.
    pub cat_id: String,
    /// Display name.
    pub name: String,
    /// One line summary.
    pub summary: String,
    /// Icon name.
    pub icon: String,
}

/// An available distribution upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistroUpgrade {
    /// Release kind.
    pub kind: DistroUpgradeKind,
    /// Release name.
    pub name: String,
    /// One line summary.
    pub summary: String,
}

/// A repository key that must be trusted before continuing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSignatureRequest {
    /// Package that needs the key.
    pub package_id: String,
    /// Repository name.
    pub repository_name: String,
    /// Where the key can be fetched.
    pub key_url: String,
    /// Key owner.
    pub key_userid: String,
    /// Key id.
    pub key_id: String,
    /// Key fingerprint.
    pub key_fingerprint: String,
    /// Key creation time.
    pub key_timestamp: String,
    /// Key type.
    pub sig_type: SigType,
}

/// A license agreement that must be accepted before continuing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EulaRequest {
    /// Agreement id.
    pub eula_id: String,
    /// Package that needs the agreement.
    pub package_id: String,
    /// Vendor name.
    pub vendor_name: String,
    /// Agreement text.
    pub license_agreement: String,
}

/// Files owned by a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesItem {
    /// Package id text.
    pub package_id: String,
    /// Absolute file paths.
    pub files: Vec<String>,
}

/// A restart requirement raised by a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartRequest {
    /// Kind of restart.
    pub restart: Restart,
    /// Package that needs it.
    pub package_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_line_is_tab_separated() {
        let item = PackageItem::new(Info::Installing, "foo;1.0;x86_64;repo", "Foo app");
        assert_eq!(item.to_ledger_line(), "installing\tfoo;1.0;x86_64;repo\tFoo app");
    }

    #[test]
    fn items_serialize_with_enum_text() {
        let item = PackageItem::new(Info::Available, "bar;2;noarch;", "Bar");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["info"], "available");
        let back: PackageItem = serde_json::from_value(json).unwrap();
        assert_eq!(back, item);
    }
}
