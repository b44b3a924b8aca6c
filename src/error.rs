//! Resolution error taxonomy.

use thiserror::Error;

/// Errors raised while resolving backend services.
///
/// Subsystems with a safe default (cache, mail) never surface these to the
/// caller; they log and substitute the default. Persistence backend selection
/// has no safe default, so its errors propagate and dependent startup must
/// halt.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The configuration store could not be reached.
    #[error("configuration store unavailable: {0}")]
    ConfigUnavailable(String),

    /// No persistence backend is registered under the requested identifier.
    #[error("no persistence backend registered for type {requested:?}, available: {available:?}")]
    UnknownBackendType {
        requested: String,
        available: Vec<String>,
    },

    /// A stored secret could not be decrypted.
    #[error("failed to decrypt stored secret: {0}")]
    Decryption(String),

    /// A sub-configuration is structurally invalid.
    #[error("malformed configuration: {0}")]
    MalformedConfiguration(String),
}

impl ResolveError {
    /// Malformed-configuration error naming the offending field.
    pub(crate) fn malformed(field: &str, cause: impl std::fmt::Display) -> Self {
        Self::MalformedConfiguration(format!("{field}: {cause}"))
    }
}
