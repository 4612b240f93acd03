//! The daemon-wide "locked" flag raised while the system is being modified.

use crate::events::DaemonSignal;
use crate::feed::EventFeed;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

/// Tracks the transactions currently modifying the system and publishes
/// `Locked` whenever the set becomes non-empty or empty again.
#[derive(Debug)]
pub struct Inhibit {
    signals: Arc<EventFeed<DaemonSignal>>,
    holders: BTreeSet<String>,
}

impl Inhibit {
    /// Creates an unlocked inhibitor publishing on `signals`.
    pub fn new(signals: Arc<EventFeed<DaemonSignal>>) -> Self {
        Self {
            signals,
            holders: BTreeSet::new(),
        }
    }

    /// Adds a holder. Returns false if it already held the lock.
    pub fn add(&mut self, tid: &str) -> bool {
        let was_locked = self.is_locked();
        if !self.holders.insert(tid.to_string()) {
            return false;
        }
        if !was_locked {
            info!(tid, "system locked");
            self.signals.emit(DaemonSignal::Locked(true));
        }
        true
    }

    /// Removes a holder. Returns false if it did not hold the lock.
    pub fn remove(&mut self, tid: &str) -> bool {
        if !self.holders.remove(tid) {
            return false;
        }
        if !self.is_locked() {
            info!(tid, "system unlocked");
            self.signals.emit(DaemonSignal::Locked(false));
        }
        true
    }

    /// Returns true while any holder exists.
    pub fn is_locked(&self) -> bool {
        !self.holders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_only_on_transitions() {
        let signals = Arc::new(EventFeed::new());
        let mut inhibit = Inhibit::new(Arc::clone(&signals));

        assert!(inhibit.add("/1_a_data"));
        assert!(inhibit.add("/2_b_data"));
        assert!(!inhibit.add("/2_b_data"));
        assert!(inhibit.remove("/1_a_data"));
        assert!(inhibit.is_locked());
        assert!(inhibit.remove("/2_b_data"));
        assert!(!inhibit.remove("/2_b_data"));

        assert_eq!(
            signals.history(),
            vec![DaemonSignal::Locked(true), DaemonSignal::Locked(false)]
        );
    }
}
