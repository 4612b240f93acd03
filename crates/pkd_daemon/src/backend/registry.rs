//! Name-to-constructor table for backends.

use super::{DummyBackend, PackageBackend};
use crate::error::{BackendError, BackendResult};
use std::collections::BTreeMap;
use tracing::debug;

/// Builds a fresh backend implementation.
pub type BackendFactory = Box<dyn Fn() -> Box<dyn PackageBackend> + Send + Sync>;

/// Known backends, looked up by the configured name.
pub struct BackendRegistry {
    factories: BTreeMap<String, BackendFactory>,
}

impl BackendRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// A registry holding the built-in backends.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("dummy", || Box::new(DummyBackend::new()));
        registry
    }

    /// Registers a backend, replacing any backend of the same name.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn PackageBackend> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(backend = %name, "registering backend");
        self.factories.insert(name, Box::new(factory));
    }

    /// Instantiates the backend called `name`.
    pub fn load(&self, name: &str) -> BackendResult<Box<dyn PackageBackend>> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| BackendError::unknown_backend(name))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_has_dummy() {
        let registry = BackendRegistry::builtin();
        assert_eq!(registry.names(), vec!["dummy"]);
        assert_eq!(registry.load("dummy").unwrap().name(), "dummy");
    }

    #[test]
    fn unknown_backend_fails() {
        let registry = BackendRegistry::builtin();
        let err = registry.load("yum").err().unwrap();
        assert_eq!(err, BackendError::unknown_backend("yum"));
    }

    #[test]
    fn register_replaces() {
        let mut registry = BackendRegistry::new();
        registry.register("custom", || Box::new(DummyBackend::new().with_cancel(false)));
        registry.register("custom", || Box::new(DummyBackend::new()));
        assert_eq!(registry.names().len(), 1);
        assert!(registry.load("custom").unwrap().supports_cancel());
    }
}
