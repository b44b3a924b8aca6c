//! Backend service resolution.
//!
//! One resolution operation per pluggable subsystem. Cache and mail carry a
//! hardcoded safe default and never fail; persistence backend selection has
//! no default and fails loudly, since silently substituting a store could
//! mean operating against the wrong data. Every call reads a fresh
//! configuration snapshot; nothing is cached here, result lifetimes are
//! the caller's contract (see [`ProcessServices`]).

use std::sync::Arc;

use tracing::{error, info};

use crate::config::{
    native_cache_base_dn, ApplianceConfig, CacheConfig, PersistenceConfig, SmtpConfig,
};
use crate::error::ResolveError;
use crate::registry::{BackendRegistry, EntryManagerFactory};
use crate::secret::SecretCodec;
use crate::signature::EcdsaSha256Verifier;
use crate::source::ConfigSource;

/// Resolves a concrete backend for each pluggable subsystem.
///
/// Wired once at startup with its collaborators; each resolution method is
/// a pure function of the current configuration snapshot plus registry
/// contents, safe to call concurrently.
pub struct ServiceResolutionFactory {
    source: Arc<dyn ConfigSource>,
    registry: Arc<BackendRegistry>,
    codec: Arc<dyn SecretCodec>,
    persistence: PersistenceConfig,
}

impl ServiceResolutionFactory {
    #[must_use]
    pub fn new(
        source: Arc<dyn ConfigSource>,
        registry: Arc<BackendRegistry>,
        codec: Arc<dyn SecretCodec>,
        persistence: PersistenceConfig,
    ) -> Self {
        Self {
            source,
            registry,
            codec,
            persistence,
        }
    }

    /// Resolve the cache provider configuration.
    ///
    /// Never fails: an unreadable record, a missing or malformed
    /// sub-document, or an unknown provider kind is logged and replaced by
    /// the in-memory default. For the native-persistence provider the cache
    /// branch is scoped from the appliance base DN on the returned copy;
    /// all other fields pass through unchanged.
    #[must_use]
    pub fn resolve_cache_config(&self) -> CacheConfig {
        let resolved = match self.source.appliance_config() {
            Ok(appliance) => match Self::parse_cache_config(&appliance) {
                Some(CacheConfig::NativePersistence(mut native)) => {
                    native.base_dn = native_cache_base_dn(&appliance.base_dn);
                    CacheConfig::NativePersistence(native)
                }
                Some(config) => config,
                None => Self::fallback_cache_config(),
            },
            Err(e) => {
                error!(error = %e, "Cannot read appliance record for cache resolution");
                Self::fallback_cache_config()
            }
        };

        info!(kind = resolved.kind(), config = ?resolved, "Cache configuration resolved");
        resolved
    }

    /// Parse the stored cache sub-document, logging why it is unusable.
    fn parse_cache_config(appliance: &ApplianceConfig) -> Option<CacheConfig> {
        let raw = match &appliance.cache_config {
            Some(raw) => raw,
            None => {
                error!(dn = %appliance.dn, "Appliance record has no cache configuration");
                return None;
            }
        };

        match serde_json::from_value::<CacheConfig>(raw.clone()) {
            Ok(CacheConfig::Unknown) => {
                error!(
                    dn = %appliance.dn,
                    "Appliance cache configuration selects an unrecognized provider kind"
                );
                None
            }
            Ok(config) => Some(config),
            Err(e) => {
                let e = ResolveError::malformed("cacheConfig", e);
                error!(dn = %appliance.dn, error = %e, "Appliance cache configuration is malformed");
                None
            }
        }
    }

    fn fallback_cache_config() -> CacheConfig {
        let config = CacheConfig::in_memory_default();
        info!("Applied fallback in-memory cache configuration");
        config
    }

    /// Resolve the outbound mail configuration.
    ///
    /// Never fails. A record without an SMTP sub-document means mail is
    /// simply not set up and yields the disabled default without an error.
    /// A stored password is decrypted onto the returned copy only; on
    /// decryption failure the configuration is returned without credentials
    /// and the failure is logged, leaving the stored ciphertext untouched.
    #[must_use]
    pub fn resolve_smtp_config(&self) -> SmtpConfig {
        let appliance = match self.source.appliance_config() {
            Ok(appliance) => appliance,
            Err(e) => {
                error!(error = %e, "Cannot read appliance record for mail resolution, mail stays disabled");
                return SmtpConfig::default();
            }
        };

        let raw = match appliance.smtp_config {
            Some(raw) => raw,
            None => return SmtpConfig::default(),
        };

        let mut smtp: SmtpConfig = match serde_json::from_value(raw) {
            Ok(smtp) => smtp,
            Err(e) => {
                let e = ResolveError::malformed("smtpConfig", e);
                error!(dn = %appliance.dn, error = %e, "Appliance SMTP configuration is malformed, mail stays disabled");
                return SmtpConfig::default();
            }
        };

        if let Some(ciphertext) = &smtp.password {
            match self.codec.decrypt(ciphertext) {
                Ok(plaintext) => smtp.password_decrypted = Some(plaintext),
                Err(e) => {
                    error!(
                        dn = %appliance.dn,
                        error = %e,
                        "Failed to decrypt SMTP password, returning mail configuration without credentials"
                    );
                    smtp.password_decrypted = None;
                }
            }
        }

        info!(
            host = smtp.host.as_deref().unwrap_or("<unset>"),
            port = smtp.port,
            requires_ssl = smtp.requires_ssl,
            requires_authentication = smtp.requires_authentication,
            "SMTP configuration resolved"
        );
        smtp
    }

    /// Resolve the persistence entry-manager factory.
    ///
    /// # Errors
    /// Returns [`ResolveError::UnknownBackendType`] when the configured
    /// identifier matches no registered backend. There is no default here;
    /// the caller must not serve requests without a real data store.
    pub fn resolve_entry_manager_factory(
        &self,
    ) -> Result<Arc<dyn EntryManagerFactory>, ResolveError> {
        let requested = &self.persistence.entry_manager_factory_type;
        self.registry.lookup(requested).ok_or_else(|| {
            let available = self.registry.backend_types();
            error!(
                requested = %requested,
                available = ?available,
                "No persistence backend registered under the configured type"
            );
            ResolveError::UnknownBackendType {
                requested: requested.clone(),
                available,
            }
        })
    }

    /// Connection properties for the resolved persistence backend.
    #[must_use]
    pub fn persistence_properties(&self) -> &std::collections::HashMap<String, String> {
        &self.persistence.properties
    }

    /// Resolve the signature verifier.
    ///
    /// Stateless and independent of configuration; callers hold one
    /// instance for the process lifetime (see [`ProcessServices`]).
    #[must_use]
    pub fn resolve_signature_verifier(&self) -> EcdsaSha256Verifier {
        EcdsaSha256Verifier::new()
    }
}

/// Process-scoped singletons resolved once at startup.
///
/// Cache and mail configurations are resolved per call; the persistence
/// backend and signature verifier are resolved here exactly once and
/// reused. A persistence resolution failure aborts startup.
pub struct ProcessServices {
    entry_manager_factory: Arc<dyn EntryManagerFactory>,
    signature_verifier: EcdsaSha256Verifier,
}

impl ProcessServices {
    /// Resolve the process-scoped services.
    ///
    /// # Errors
    /// Propagates [`ResolveError::UnknownBackendType`] from persistence
    /// resolution; the server must not start without a data store.
    pub fn initialize(factory: &ServiceResolutionFactory) -> Result<Self, ResolveError> {
        let entry_manager_factory = factory.resolve_entry_manager_factory()?;
        info!(
            backend_type = entry_manager_factory.backend_type(),
            "Persistence backend resolved"
        );

        Ok(Self {
            entry_manager_factory,
            signature_verifier: factory.resolve_signature_verifier(),
        })
    }

    /// Factory for the selected persistence backend.
    #[must_use]
    pub fn entry_manager_factory(&self) -> &Arc<dyn EntryManagerFactory> {
        &self.entry_manager_factory
    }

    /// Process-wide signature verifier.
    #[must_use]
    pub fn signature_verifier(&self) -> EcdsaSha256Verifier {
        self.signature_verifier
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fmt::Write as _;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use secrecy::ExposeSecret;
    use serde_json::json;
    use tracing::field::{Field, Visit};
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    use crate::config::InMemoryCacheConfig;
    use crate::registry::EntryManager;
    use crate::secret::AesGcmSecretCodec;
    use crate::source::StaticConfigSource;

    use super::*;

    const APPLIANCE_DN: &str = "ou=appliance,o=example";

    // ---- log capture -----------------------------------------------------

    /// Records every emitted event as `(level, "field=value ...")`.
    #[derive(Clone, Default)]
    struct LogCapture {
        events: Arc<Mutex<Vec<(Level, String)>>>,
        errors: Arc<AtomicUsize>,
    }

    impl LogCapture {
        fn error_count(&self) -> usize {
            self.errors.load(Ordering::Relaxed)
        }

        fn error_lines(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|(level, _)| *level == Level::ERROR)
                .map(|(_, line)| line.clone())
                .collect()
        }
    }

    impl<S: Subscriber> Layer<S> for LogCapture {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            struct Fields(String);

            impl Visit for Fields {
                fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
                    let _ = write!(self.0, "{}={:?} ", field.name(), value);
                }
            }

            let mut fields = Fields(String::new());
            event.record(&mut fields);
            if *event.metadata().level() == Level::ERROR {
                self.errors.fetch_add(1, Ordering::Relaxed);
            }
            self.events
                .lock()
                .unwrap()
                .push((*event.metadata().level(), fields.0));
        }
    }

    fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, LogCapture) {
        let capture = LogCapture::default();
        let subscriber = tracing_subscriber::registry().with(capture.clone());
        let value = tracing::subscriber::with_default(subscriber, f);
        (value, capture)
    }

    // ---- fixtures --------------------------------------------------------

    struct TestBackendFactory(&'static str);

    impl EntryManagerFactory for TestBackendFactory {
        fn backend_type(&self) -> &'static str {
            self.0
        }

        fn create_entry_manager(
            &self,
            _properties: &HashMap<String, String>,
        ) -> Result<Box<dyn EntryManager>, ResolveError> {
            Ok(Box::new(TestEntryManager(self.0)))
        }
    }

    struct TestEntryManager(&'static str);

    impl EntryManager for TestEntryManager {
        fn backend_type(&self) -> &'static str {
            self.0
        }
    }

    struct UnreachableSource;

    impl ConfigSource for UnreachableSource {
        fn appliance_config(&self) -> Result<ApplianceConfig, ResolveError> {
            Err(ResolveError::ConfigUnavailable(
                "directory server is down".to_string(),
            ))
        }
    }

    fn appliance(
        base_dn: &str,
        cache_config: Option<serde_json::Value>,
        smtp_config: Option<serde_json::Value>,
    ) -> ApplianceConfig {
        ApplianceConfig {
            dn: APPLIANCE_DN.to_string(),
            base_dn: base_dn.to_string(),
            cache_config,
            smtp_config,
        }
    }

    fn test_codec() -> Arc<AesGcmSecretCodec> {
        Arc::new(AesGcmSecretCodec::new(&[7u8; 32]))
    }

    fn factory_for(appliance: ApplianceConfig) -> ServiceResolutionFactory {
        ServiceResolutionFactory::new(
            Arc::new(StaticConfigSource::new(appliance)),
            Arc::new(BackendRegistry::new()),
            test_codec(),
            PersistenceConfig::default(),
        )
    }

    // ---- cache resolution ------------------------------------------------

    #[test]
    fn absent_cache_config_falls_back_to_in_memory() {
        let factory = factory_for(appliance("o=example", None, None));
        let (resolved, logs) = capture_logs(|| factory.resolve_cache_config());

        assert_eq!(resolved, CacheConfig::in_memory_default());
        assert_eq!(logs.error_count(), 1);
        assert!(logs.error_lines()[0].contains(APPLIANCE_DN));
    }

    #[test]
    fn unrecognized_cache_kind_falls_back_to_in_memory() {
        let factory = factory_for(appliance(
            "o=example",
            Some(json!({"kind": "infinispan", "servers": "a:1"})),
            None,
        ));
        let (resolved, logs) = capture_logs(|| factory.resolve_cache_config());

        assert_eq!(resolved, CacheConfig::in_memory_default());
        assert_eq!(logs.error_count(), 1);
        assert!(logs.error_lines()[0].contains(APPLIANCE_DN));
    }

    #[test]
    fn malformed_cache_config_falls_back_to_in_memory() {
        let factory = factory_for(appliance(
            "o=example",
            Some(json!(["not", "an", "object"])),
            None,
        ));
        let (resolved, logs) = capture_logs(|| factory.resolve_cache_config());

        assert_eq!(resolved, CacheConfig::in_memory_default());
        assert_eq!(logs.error_count(), 1);
    }

    #[test]
    fn unreachable_store_falls_back_to_in_memory() {
        let factory = ServiceResolutionFactory::new(
            Arc::new(UnreachableSource),
            Arc::new(BackendRegistry::new()),
            test_codec(),
            PersistenceConfig::default(),
        );
        let (resolved, logs) = capture_logs(|| factory.resolve_cache_config());

        assert_eq!(resolved, CacheConfig::in_memory_default());
        assert_eq!(logs.error_count(), 1);
    }

    #[test]
    fn native_persistence_cache_is_scoped_from_appliance_base_dn() {
        let factory = factory_for(appliance(
            "ou=uma,o=example",
            Some(json!({"kind": "native-persistence"})),
            None,
        ));
        let (resolved, logs) = capture_logs(|| factory.resolve_cache_config());

        let CacheConfig::NativePersistence(native) = resolved else {
            panic!("expected native-persistence config");
        };
        assert_eq!(native.base_dn, "o=example");
        assert_eq!(logs.error_count(), 0);
    }

    #[test]
    fn native_persistence_scoping_overrides_stored_branch() {
        let factory = factory_for(appliance(
            "ou=uma,o=gluu",
            Some(json!({
                "kind": "native-persistence",
                "baseDn": "ou=stale,o=old",
                "defaultPutExpirationSecs": 120,
            })),
            None,
        ));
        let resolved = factory.resolve_cache_config();

        let CacheConfig::NativePersistence(native) = resolved else {
            panic!("expected native-persistence config");
        };
        assert_eq!(native.base_dn, "o=gluu");
        assert_eq!(native.default_put_expiration_secs, 120);
    }

    #[test]
    fn recognized_cache_config_passes_through_unchanged() {
        let factory = factory_for(appliance(
            "ou=uma,o=example",
            Some(json!({"kind": "redis", "servers": "redis.internal:6379"})),
            None,
        ));
        let (resolved, logs) = capture_logs(|| factory.resolve_cache_config());

        let CacheConfig::Redis(redis) = resolved else {
            panic!("expected redis config");
        };
        assert_eq!(redis.servers, "redis.internal:6379");
        assert_eq!(logs.error_count(), 0);
    }

    #[test]
    fn in_memory_cache_skips_base_dn_scoping() {
        let factory = factory_for(appliance(
            "ou=uma,o=example",
            Some(json!({"kind": "in-memory", "defaultPutExpirationSecs": 90})),
            None,
        ));
        let resolved = factory.resolve_cache_config();

        assert_eq!(
            resolved,
            CacheConfig::InMemory(InMemoryCacheConfig {
                default_put_expiration_secs: 90,
            })
        );
    }

    // ---- mail resolution -------------------------------------------------

    #[test]
    fn absent_smtp_config_returns_disabled_default_without_error() {
        let factory = factory_for(appliance("o=example", None, None));
        let (resolved, logs) = capture_logs(|| factory.resolve_smtp_config());

        assert!(!resolved.is_enabled());
        assert!(resolved.user_name.is_none());
        assert!(resolved.password_decrypted.is_none());
        assert_eq!(logs.error_count(), 0);
    }

    #[test]
    fn smtp_password_is_decrypted_onto_returned_copy() {
        let codec = test_codec();
        let ciphertext = codec.encrypt("smtp-p4ssw0rd").unwrap();

        let factory = ServiceResolutionFactory::new(
            Arc::new(StaticConfigSource::new(appliance(
                "o=example",
                None,
                Some(json!({
                    "host": "mail.example.com",
                    "port": 587,
                    "requiresAuthentication": true,
                    "userName": "mailer",
                    "password": ciphertext.clone(),
                })),
            ))),
            Arc::new(BackendRegistry::new()),
            codec,
            PersistenceConfig::default(),
        );
        let (resolved, logs) = capture_logs(|| factory.resolve_smtp_config());

        assert!(resolved.is_enabled());
        assert_eq!(
            resolved.password_decrypted.unwrap().expose_secret(),
            "smtp-p4ssw0rd"
        );
        // The stored ciphertext stays on the returned copy untouched.
        assert_eq!(resolved.password.unwrap(), ciphertext);
        assert_eq!(logs.error_count(), 0);
    }

    #[test]
    fn smtp_decryption_failure_returns_config_without_credentials() {
        let factory = factory_for(appliance(
            "o=example",
            None,
            Some(json!({
                "host": "mail.example.com",
                "userName": "mailer",
                "password": "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
            })),
        ));
        let (resolved, logs) = capture_logs(|| factory.resolve_smtp_config());

        assert!(resolved.is_enabled());
        assert!(resolved.password_decrypted.is_none());
        assert_eq!(logs.error_count(), 1);
        assert!(logs.error_lines()[0].contains(APPLIANCE_DN));
    }

    #[test]
    fn malformed_smtp_config_returns_disabled_default() {
        let factory = factory_for(appliance(
            "o=example",
            None,
            Some(json!({"host": ["not", "a", "string"]})),
        ));
        let (resolved, logs) = capture_logs(|| factory.resolve_smtp_config());

        assert!(!resolved.is_enabled());
        assert_eq!(logs.error_count(), 1);
    }

    #[test]
    fn unreachable_store_disables_mail() {
        let factory = ServiceResolutionFactory::new(
            Arc::new(UnreachableSource),
            Arc::new(BackendRegistry::new()),
            test_codec(),
            PersistenceConfig::default(),
        );
        let (resolved, logs) = capture_logs(|| factory.resolve_smtp_config());

        assert!(!resolved.is_enabled());
        assert_eq!(logs.error_count(), 1);
    }

    // ---- persistence resolution -------------------------------------------

    #[test]
    fn registered_backend_resolves_to_exact_factory() {
        let registered: Arc<dyn EntryManagerFactory> = Arc::new(TestBackendFactory("ldap"));
        let mut registry = BackendRegistry::new();
        registry.register(registered.clone());

        let factory = ServiceResolutionFactory::new(
            Arc::new(StaticConfigSource::new(appliance("o=example", None, None))),
            Arc::new(registry),
            test_codec(),
            PersistenceConfig {
                entry_manager_factory_type: "ldap".to_string(),
                properties: HashMap::new(),
            },
        );

        let resolved = factory.resolve_entry_manager_factory().unwrap();
        assert!(Arc::ptr_eq(&resolved, &registered));
    }

    #[test]
    fn unregistered_backend_type_is_fatal() {
        let mut registry = BackendRegistry::new();
        registry.register(Arc::new(TestBackendFactory("ldap")));

        let factory = ServiceResolutionFactory::new(
            Arc::new(StaticConfigSource::new(appliance("o=example", None, None))),
            Arc::new(registry),
            test_codec(),
            PersistenceConfig {
                entry_manager_factory_type: "couchbase".to_string(),
                properties: HashMap::new(),
            },
        );

        let err = factory.resolve_entry_manager_factory().unwrap_err();
        let ResolveError::UnknownBackendType {
            requested,
            available,
        } = err
        else {
            panic!("expected UnknownBackendType");
        };
        assert_eq!(requested, "couchbase");
        assert_eq!(available, vec!["ldap".to_string()]);
    }

    // ---- process-scoped services -------------------------------------------

    #[test]
    fn process_services_hold_resolved_singletons() {
        let mut registry = BackendRegistry::new();
        registry.register(Arc::new(TestBackendFactory("ldap")));

        let factory = ServiceResolutionFactory::new(
            Arc::new(StaticConfigSource::new(appliance("o=example", None, None))),
            Arc::new(registry),
            test_codec(),
            PersistenceConfig {
                entry_manager_factory_type: "ldap".to_string(),
                properties: HashMap::new(),
            },
        );

        let services = ProcessServices::initialize(&factory).unwrap();
        assert_eq!(services.entry_manager_factory().backend_type(), "ldap");
        assert_eq!(
            services.signature_verifier(),
            factory.resolve_signature_verifier()
        );

        let manager = services
            .entry_manager_factory()
            .create_entry_manager(factory.persistence_properties())
            .unwrap();
        assert_eq!(manager.backend_type(), "ldap");
    }

    #[test]
    fn process_services_fail_without_persistence_backend() {
        let factory = ServiceResolutionFactory::new(
            Arc::new(StaticConfigSource::new(appliance("o=example", None, None))),
            Arc::new(BackendRegistry::new()),
            test_codec(),
            PersistenceConfig {
                entry_manager_factory_type: "ldap".to_string(),
                properties: HashMap::new(),
            },
        );

        assert!(matches!(
            ProcessServices::initialize(&factory),
            Err(ResolveError::UnknownBackendType { .. })
        ));
    }
}
