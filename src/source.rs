//! Read-only access to the persisted appliance record.

use crate::config::ApplianceConfig;
use crate::error::ResolveError;

/// External supplier of the appliance configuration record.
///
/// Implementations read the record from whatever store holds it (directory
/// server, database, file); the resolution factory only ever reads. Whether
/// an unreachable store is fatal depends on the subsystem being resolved,
/// not on the source: cache and mail resolution treat it as an absent
/// record, persistence-dependent startup treats it as fatal.
pub trait ConfigSource: Send + Sync {
    /// Fetch the current appliance record.
    ///
    /// # Errors
    /// Returns [`ResolveError::ConfigUnavailable`] when the backing store
    /// cannot be reached.
    fn appliance_config(&self) -> Result<ApplianceConfig, ResolveError>;
}

/// Config source serving a fixed in-memory snapshot.
///
/// For embedders that load the record themselves, and for tests.
#[derive(Debug, Clone)]
pub struct StaticConfigSource {
    appliance: ApplianceConfig,
}

impl StaticConfigSource {
    #[must_use]
    pub fn new(appliance: ApplianceConfig) -> Self {
        Self { appliance }
    }
}

impl ConfigSource for StaticConfigSource {
    fn appliance_config(&self) -> Result<ApplianceConfig, ResolveError> {
        Ok(self.appliance.clone())
    }
}
