//! Debounced daemon notifications.

use crate::events::DaemonSignal;
use crate::feed::EventFeed;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Publishes UpdatesChanged after a short delay, merging requests that
/// arrive while one is pending, and RepoListChanged immediately.
#[derive(Debug)]
pub struct Notify {
    signals: Arc<EventFeed<DaemonSignal>>,
    delay: Duration,
    updates_changed: Option<Instant>,
}

impl Notify {
    /// Creates a notifier publishing on `signals`.
    pub fn new(signals: Arc<EventFeed<DaemonSignal>>, delay: Duration) -> Self {
        Self {
            signals,
            delay,
            updates_changed: None,
        }
    }

    /// Schedules UpdatesChanged unless one is already pending.
    pub fn updates_changed(&mut self, now: Instant) {
        if self.updates_changed.is_some() {
            debug!("updates changed already scheduled");
            return;
        }
        self.updates_changed = Some(now + self.delay);
    }

    /// Publishes UpdatesChanged now, dropping any pending one.
    pub fn updates_changed_now(&mut self) {
        self.updates_changed = None;
        debug!("emitting updates-changed");
        self.signals.emit(DaemonSignal::UpdatesChanged);
    }

    /// Publishes RepoListChanged.
    pub fn repo_list_changed(&self) {
        debug!("emitting repo-list-changed");
        self.signals.emit(DaemonSignal::RepoListChanged);
    }

    /// Fires the pending UpdatesChanged if it is due.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.updates_changed {
            Some(deadline) if deadline <= now => {
                self.updates_changed_now();
                true
            }
            _ => false,
        }
    }

    /// When the pending UpdatesChanged is due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.updates_changed
    }
}
