//! Results shared across transactions.
//!
//! Written only from the main loop when a transaction finishes; read by any
//! later transaction that can be answered without the backend.

use pkd_core::{PackageItem, UpdateDetail};
use std::collections::HashMap;
use tracing::debug;

/// The last update list and every update description seen.
#[derive(Debug, Default)]
pub struct UpdatesCache {
    updates: Option<Vec<PackageItem>>,
    details: HashMap<String, UpdateDetail>,
}

impl UpdatesCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached update list, if a GetUpdates has completed since the last
    /// invalidation.
    pub fn updates(&self) -> Option<&[PackageItem]> {
        self.updates.as_deref()
    }

    /// Stores the update list.
    pub fn set_updates(&mut self, updates: Vec<PackageItem>) {
        debug!(count = updates.len(), "caching updates");
        self.updates = Some(updates);
    }

    /// Forgets the update list. Update descriptions are kept.
    pub fn invalidate(&mut self) {
        if self.updates.take().is_some() {
            debug!("invalidated updates cache");
        }
    }

    /// The cached description of an update.
    pub fn update_detail(&self, package_id: &str) -> Option<&UpdateDetail> {
        self.details.get(package_id)
    }

    /// Stores an update description.
    pub fn set_update_detail(&mut self, detail: UpdateDetail) {
        self.details.insert(detail.package_id.clone(), detail);
    }

    /// Splits ids into cached descriptions and ids still to be fetched.
    pub fn partition_details(&self, package_ids: &[String]) -> (Vec<UpdateDetail>, Vec<String>) {
        let mut cached = Vec::new();
        let mut missing = Vec::new();
        for id in package_ids {
            match self.details.get(id) {
                Some(detail) => cached.push(detail.clone()),
                None => missing.push(id.clone()),
            }
        }
        (cached, missing)
    }
}
