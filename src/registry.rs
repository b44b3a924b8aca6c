//! Registry of compiled-in persistence backends.
//!
//! Backend plugins register an [`EntryManagerFactory`] under their
//! backend-type identifier before the resolution factory is constructed;
//! the registry is read-only afterwards. Lookups are exact and
//! case-sensitive, matching the identifiers stored in the persistence
//! configuration.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::ResolveError;

/// Opaque persistence client constructed by an [`EntryManagerFactory`].
pub trait EntryManager: Send + Sync {
    /// Backend-type identifier of the factory that produced this manager.
    fn backend_type(&self) -> &'static str;
}

/// Constructor for one persistence backend's entry managers.
pub trait EntryManagerFactory: Send + Sync {
    /// Backend-type identifier this factory is registered under.
    fn backend_type(&self) -> &'static str;

    /// Construct a connected entry manager from backend specific
    /// connection properties.
    ///
    /// # Errors
    /// Returns [`ResolveError::MalformedConfiguration`] for unusable
    /// properties, [`ResolveError::ConfigUnavailable`] when the backing
    /// store cannot be reached.
    fn create_entry_manager(
        &self,
        properties: &HashMap<String, String>,
    ) -> Result<Box<dyn EntryManager>, ResolveError>;
}

impl fmt::Debug for dyn EntryManagerFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryManagerFactory")
            .field("backend_type", &self.backend_type())
            .finish_non_exhaustive()
    }
}

/// Mapping from backend-type identifier to the factory constructing that
/// backend's entry managers.
#[derive(Default)]
pub struct BackendRegistry {
    factories: HashMap<String, Arc<dyn EntryManagerFactory>>,
}

impl BackendRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under its own backend-type identifier.
    /// Registering the same identifier again replaces the earlier factory.
    pub fn register(&mut self, factory: Arc<dyn EntryManagerFactory>) {
        self.factories
            .insert(factory.backend_type().to_string(), factory);
    }

    /// Exact, case-sensitive lookup.
    #[must_use]
    pub fn lookup(&self, backend_type: &str) -> Option<Arc<dyn EntryManagerFactory>> {
        self.factories.get(backend_type).cloned()
    }

    /// Registered identifiers, sorted for stable diagnostics.
    #[must_use]
    pub fn backend_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backend_types", &self.backend_types())
            .finish()
    }
}
