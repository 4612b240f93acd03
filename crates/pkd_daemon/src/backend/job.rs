//! Handle passed to backend implementations.

use super::Backend;
use std::ops::Deref;
use std::sync::Arc;

/// A cloneable handle to the running backend.
///
/// Implementations report through it from whatever thread they run on; every
/// emission is forwarded to the main loop in order.
#[derive(Clone)]
pub struct BackendJob(Arc<Backend>);

impl BackendJob {
    pub(crate) fn new(backend: Arc<Backend>) -> Self {
        Self(backend)
    }

    /// The shared backend.
    pub fn backend(&self) -> &Arc<Backend> {
        &self.0
    }
}

impl Deref for BackendJob {
    type Target = Backend;

    fn deref(&self) -> &Backend {
        &self.0
    }
}

impl std::fmt::Debug for BackendJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BackendJob").field(&self.0.current_tid()).finish()
    }
}
