//! Objects shared by every transaction, built once at startup.

use crate::backend::Backend;
use crate::cache::UpdatesCache;
use crate::clock::Clock;
use crate::config::DaemonConfig;
use crate::events::DaemonSignal;
use crate::feed::EventFeed;
use crate::inhibit::Inhibit;
use crate::notify::Notify;
use crate::post_trans::PostTransaction;
use crate::security::Security;
use parking_lot::Mutex;
use pkd_core::{StateDir, TransactionDb};
use std::sync::Arc;

/// Collaborators injected into transactions, the list and the engine.
///
/// Everything here is mutated from the main loop only; the locks exist so
/// the context can be shared by reference-counted handle.
pub struct DaemonContext {
    pub(crate) config: DaemonConfig,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) backend: Arc<Backend>,
    pub(crate) security: Box<dyn Security>,
    pub(crate) post_transaction: Box<dyn PostTransaction>,
    pub(crate) cache: Mutex<UpdatesCache>,
    pub(crate) db: Mutex<TransactionDb>,
    pub(crate) notify: Mutex<Notify>,
    pub(crate) inhibit: Mutex<Inhibit>,
    pub(crate) signals: Arc<EventFeed<DaemonSignal>>,
    _state_dir: Option<StateDir>,
}

impl DaemonContext {
    pub(crate) fn new(
        config: DaemonConfig,
        clock: Arc<dyn Clock>,
        backend: Arc<Backend>,
        security: Box<dyn Security>,
        post_transaction: Box<dyn PostTransaction>,
        db: TransactionDb,
        state_dir: Option<StateDir>,
    ) -> Self {
        let signals = Arc::new(EventFeed::new());
        let notify = Notify::new(Arc::clone(&signals), config.timing.updates_changed_delay);
        let inhibit = Inhibit::new(Arc::clone(&signals));
        Self {
            config,
            clock,
            backend,
            security,
            post_transaction,
            cache: Mutex::new(UpdatesCache::new()),
            db: Mutex::new(db),
            notify: Mutex::new(notify),
            inhibit: Mutex::new(inhibit),
            signals,
            _state_dir: state_dir,
        }
    }

    /// The daemon configuration.
    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// The shared backend.
    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }

    /// The clock every deadline is computed from.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// The daemon signal feed.
    pub fn signals(&self) -> &Arc<EventFeed<DaemonSignal>> {
        &self.signals
    }
}

impl std::fmt::Debug for DaemonContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonContext")
            .field("backend", &self.backend)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}
