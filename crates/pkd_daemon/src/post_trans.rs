//! Work done after selected roles succeed.

use pkd_core::RestartRequest;
use tracing::debug;

/// Follow-up actions run on the main loop once a transaction succeeded.
pub trait PostTransaction: Send + Sync {
    /// Returns restart requirements for running processes that use files of
    /// the updated packages.
    fn check_running_processes(&self, package_ids: &[String]) -> Vec<RestartRequest>;

    /// Regenerates the on-disk package list after a cache refresh.
    fn update_package_list(&self) {}

    /// Rescans desktop files after a cache refresh.
    fn import_desktop_files(&self) {}

    /// Forgets firmware requests raised before the cache refresh.
    fn clear_firmware_requests(&self) {}
}

/// Does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPostTransaction;

impl PostTransaction for NoopPostTransaction {
    fn check_running_processes(&self, package_ids: &[String]) -> Vec<RestartRequest> {
        debug!(count = package_ids.len(), "not checking running processes");
        Vec::new()
    }
}
