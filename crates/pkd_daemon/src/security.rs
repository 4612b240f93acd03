//! The policy seam.
//!
//! Every authorization-requiring role, and the proxy pseudo-role, is checked
//! against a [`Security`] implementation before a transaction is committed.

use pkd_core::{Role, RoleSet};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Decides whether a caller may perform a role.
pub trait Security: Send + Sync {
    /// Returns `Err` with a human readable reason when the caller is refused.
    ///
    /// `trusted` is false for installs and updates that were asked to allow
    /// packages from untrusted sources.
    fn is_allowed(&self, caller: &str, role: Role, trusted: bool) -> Result<(), String>;
}

/// Allows everything.
#[derive(Debug)]
pub struct AllowAll;

impl AllowAll {
    /// Creates the policy, warning that nothing is enforced.
    pub fn new() -> Self {
        warn!("*** THERE IS NO SECURITY MODEL BEING USED!!! ***");
        Self
    }
}

impl Default for AllowAll {
    fn default() -> Self {
        Self::new()
    }
}

impl Security for AllowAll {
    fn is_allowed(&self, _caller: &str, _role: Role, _trusted: bool) -> Result<(), String> {
        Ok(())
    }
}

/// A fixed deny list.
///
/// Roles in the denied set are refused for every caller, callers in the
/// blocked set are refused every authorization-requiring role, and untrusted
/// requests can be refused as a whole.
#[derive(Debug, Default, Clone)]
pub struct RolePolicy {
    denied: RoleSet,
    blocked_callers: HashSet<String>,
    refuse_untrusted: bool,
}

impl RolePolicy {
    /// A policy that allows everything until told otherwise.
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuses `role` for every caller.
    #[must_use]
    pub fn deny(mut self, role: Role) -> Self {
        self.denied.insert(role);
        self
    }

    /// Refuses every checked role for `caller`.
    #[must_use]
    pub fn block_caller(mut self, caller: impl Into<String>) -> Self {
        self.blocked_callers.insert(caller.into());
        self
    }

    /// Refuses requests that allow untrusted packages.
    #[must_use]
    pub fn refuse_untrusted(mut self, refuse: bool) -> Self {
        self.refuse_untrusted = refuse;
        self
    }
}

impl Security for RolePolicy {
    fn is_allowed(&self, caller: &str, role: Role, trusted: bool) -> Result<(), String> {
        if self.denied.contains(role) {
            debug!(caller, role = %role, "role denied");
            return Err(format!("{role} is not allowed"));
        }
        if self.blocked_callers.contains(caller) {
            debug!(caller, role = %role, "caller blocked");
            return Err(format!("{caller} is not allowed to perform {role}"));
        }
        if self.refuse_untrusted && !trusted {
            return Err(format!("untrusted {role} is not allowed"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_all_allows() {
        let policy = AllowAll::new();
        assert!(policy.is_allowed(":1.1", Role::UpdateSystem, false).is_ok());
    }

    #[test]
    fn role_policy_denies_configured_role() {
        let policy = RolePolicy::new().deny(Role::RemovePackages);
        let err = policy.is_allowed(":1.1", Role::RemovePackages, true).unwrap_err();
        assert_eq!(err, "remove-packages is not allowed");
        assert!(policy.is_allowed(":1.1", Role::InstallPackages, true).is_ok());
    }

    #[test]
    fn role_policy_blocks_caller_and_untrusted() {
        let policy = RolePolicy::new().block_caller(":1.9").refuse_untrusted(true);
        assert!(policy.is_allowed(":1.9", Role::RefreshCache, true).is_err());
        assert!(policy.is_allowed(":1.1", Role::InstallPackages, false).is_err());
        assert!(policy.is_allowed(":1.1", Role::InstallPackages, true).is_ok());
    }
}
