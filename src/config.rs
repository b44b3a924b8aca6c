//! Configuration records for backend resolution.
//!
//! The appliance record is the root persisted configuration for one server
//! instance. Its cache and SMTP sub-configurations are stored as JSON
//! attributes of the record, so they arrive here as raw documents and are
//! only parsed, validated and defaulted when the subsystem is resolved.

use std::collections::HashMap;

use secrecy::SecretString;
use serde::Deserialize;
use serde_json::Value;

/// Branch segment removed from the appliance base DN when scoping
/// native-persistence cache entries.
const UMA_BRANCH: &str = "ou=uma,";

/// Root persisted configuration record for one server instance.
///
/// Immutable snapshot per resolution call; the factory only ever reads it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplianceConfig {
    /// Unique identity of this record. Used only in diagnostics.
    pub dn: String,
    /// Directory-root path scoping persistence namespaces.
    pub base_dn: String,
    /// Cache sub-configuration as stored (raw JSON attribute).
    #[serde(default)]
    pub cache_config: Option<Value>,
    /// SMTP sub-configuration as stored (raw JSON attribute).
    #[serde(default)]
    pub smtp_config: Option<Value>,
}

/// Directory branch for native-persistence cache entries: the configured
/// base DN with the UMA branch segment removed and whitespace trimmed.
///
/// Applying this to an already scoped value is a no-op.
#[must_use]
pub fn native_cache_base_dn(base_dn: &str) -> String {
    base_dn.replace(UMA_BRANCH, "").trim().to_string()
}

/// Cache provider configuration, tagged by provider kind.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CacheConfig {
    InMemory(InMemoryCacheConfig),
    Memcached(MemcachedCacheConfig),
    Redis(RedisCacheConfig),
    NativePersistence(NativePersistenceCacheConfig),
    /// Provider kind not recognized by this build. Never handed to callers;
    /// resolution always substitutes the in-memory default for it.
    #[serde(other)]
    Unknown,
}

impl CacheConfig {
    /// Hardcoded safe default used when the stored configuration is absent
    /// or unusable.
    #[must_use]
    pub fn in_memory_default() -> Self {
        Self::InMemory(InMemoryCacheConfig::default())
    }

    /// Short provider label for diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InMemory(_) => "in-memory",
            Self::Memcached(_) => "memcached",
            Self::Redis(_) => "redis",
            Self::NativePersistence(_) => "native-persistence",
            Self::Unknown => "unknown",
        }
    }
}

/// In-process cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InMemoryCacheConfig {
    /// Entry lifetime in seconds for puts without an explicit expiration.
    pub default_put_expiration_secs: u32,
}

impl InMemoryCacheConfig {
    /// Default entry lifetime.
    pub const DEFAULT_PUT_EXPIRATION_SECS: u32 = 60;
}

impl Default for InMemoryCacheConfig {
    fn default() -> Self {
        Self {
            default_put_expiration_secs: Self::DEFAULT_PUT_EXPIRATION_SECS,
        }
    }
}

/// Memcached cluster settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MemcachedCacheConfig {
    /// Space-separated `host:port` server list.
    pub servers: String,
    pub default_put_expiration_secs: u32,
}

impl Default for MemcachedCacheConfig {
    fn default() -> Self {
        Self {
            servers: "localhost:11211".to_string(),
            default_put_expiration_secs: InMemoryCacheConfig::DEFAULT_PUT_EXPIRATION_SECS,
        }
    }
}

/// Redis cluster settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RedisCacheConfig {
    /// Comma-separated `host:port` server list.
    pub servers: String,
    pub default_put_expiration_secs: u32,
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            servers: "localhost:6379".to_string(),
            default_put_expiration_secs: InMemoryCacheConfig::DEFAULT_PUT_EXPIRATION_SECS,
        }
    }
}

/// Cache entries stored in the persistence backend itself.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NativePersistenceCacheConfig {
    pub default_put_expiration_secs: u32,
    /// Expired entries removed per cleanup round.
    pub default_cleanup_batch_size: u32,
    /// Directory branch holding cache entries. Set during resolution from
    /// the appliance base DN; any stored value is overwritten.
    pub base_dn: String,
}

impl NativePersistenceCacheConfig {
    /// Default cleanup batch size.
    pub const DEFAULT_CLEANUP_BATCH_SIZE: u32 = 25;
}

impl Default for NativePersistenceCacheConfig {
    fn default() -> Self {
        Self {
            default_put_expiration_secs: InMemoryCacheConfig::DEFAULT_PUT_EXPIRATION_SECS,
            default_cleanup_batch_size: Self::DEFAULT_CLEANUP_BATCH_SIZE,
            base_dn: String::new(),
        }
    }
}

/// Outbound mail (SMTP) settings.
///
/// The default value means mail is disabled: no host, no credentials.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SmtpConfig {
    pub host: Option<String>,
    pub port: u16,
    pub requires_ssl: bool,
    /// Trust the server certificate without verification.
    pub trust_host: bool,
    pub from_name: Option<String>,
    pub from_address: Option<String>,
    pub requires_authentication: bool,
    pub user_name: Option<String>,
    /// Password ciphertext as stored in the record. Never modified here;
    /// mail resolution decrypts it into [`SmtpConfig::password_decrypted`]
    /// on the returned copy.
    pub password: Option<String>,
    /// Decrypted password, populated only on the copy returned by mail
    /// resolution. Redacted by `Debug`, never serialized.
    #[serde(skip)]
    pub password_decrypted: Option<SecretString>,
}

impl SmtpConfig {
    /// Default SMTP port when the record does not specify one.
    pub const DEFAULT_PORT: u16 = 25;

    /// Whether outbound mail is configured at all.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.host.as_deref().is_some_and(|host| !host.is_empty())
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: Self::DEFAULT_PORT,
            requires_ssl: false,
            trust_host: false,
            from_name: None,
            from_address: None,
            requires_authentication: false,
            user_name: None,
            password: None,
            password_decrypted: None,
        }
    }
}

/// Selects the persistence backend and carries its connection properties.
///
/// Passed to the resolution factory explicitly at construction rather than
/// read from process-wide state, so resolution stays testable in isolation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PersistenceConfig {
    /// Backend-type identifier looked up in the registry. Exact,
    /// case-sensitive match.
    pub entry_manager_factory_type: String,
    /// Backend specific connection properties, passed through unchanged.
    pub properties: HashMap<String, String>,
}
