//! Backend service resolution for the auth server.
//!
//! Given the persisted appliance record, this crate decides which concrete
//! backend to construct for each pluggable subsystem and hands back a
//! ready-to-use instance:
//! - cache provider configuration, with a safe in-memory fallback
//! - outbound mail (SMTP) configuration, credentials decrypted on demand
//! - persistence entry-manager factory, selected from the backend registry
//! - signature verifier for SHA-256/ECDSA signatures
//!
//! Cache and mail resolution degrade gracefully and never fail; persistence
//! backend selection has no safe default and fails loudly. The surrounding
//! application wires the factory once at startup and decides result
//! lifetimes: cache and mail are per call, persistence and signature
//! verification are process-wide (see [`ProcessServices`]).
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use auth_backends::{
//!     AesGcmSecretCodec, BackendRegistry, PersistenceConfig, ProcessServices,
//!     ServiceResolutionFactory, StaticConfigSource,
//! };
//!
//! let mut registry = BackendRegistry::new();
//! registry.register(Arc::new(LdapEntryManagerFactory::new()));
//!
//! let factory = ServiceResolutionFactory::new(
//!     Arc::new(StaticConfigSource::new(appliance)),
//!     Arc::new(registry),
//!     Arc::new(AesGcmSecretCodec::new(&key)),
//!     PersistenceConfig {
//!         entry_manager_factory_type: "ldap".to_string(),
//!         ..PersistenceConfig::default()
//!     },
//! );
//!
//! let process = ProcessServices::initialize(&factory)?;
//! let cache = factory.resolve_cache_config();
//! let mail = factory.resolve_smtp_config();
//! ```

pub mod config;
pub mod error;
pub mod factory;
pub mod registry;
pub mod secret;
pub mod signature;
pub mod source;

pub use config::{
    ApplianceConfig, CacheConfig, InMemoryCacheConfig, MemcachedCacheConfig,
    NativePersistenceCacheConfig, PersistenceConfig, RedisCacheConfig, SmtpConfig,
};
pub use error::ResolveError;
pub use factory::{ProcessServices, ServiceResolutionFactory};
pub use registry::{BackendRegistry, EntryManager, EntryManagerFactory};
pub use secret::{AesGcmSecretCodec, SecretCodec};
pub use signature::EcdsaSha256Verifier;
pub use source::{ConfigSource, StaticConfigSource};
