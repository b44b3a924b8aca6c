//! Signature verification primitives.

use ring::signature::{UnparsedPublicKey, ECDSA_P256_SHA256_ASN1};

/// SHA-256/ECDSA (P-256) signature verifier.
///
/// Stateless and independent of configuration; one instance is resolved at
/// process scope and reused for the process lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EcdsaSha256Verifier;

impl EcdsaSha256Verifier {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Verify an ASN.1 DER encoded signature over `message` with an
    /// uncompressed SEC1 P-256 public key.
    #[must_use]
    pub fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
        UnparsedPublicKey::new(&ECDSA_P256_SHA256_ASN1, public_key)
            .verify(message, signature)
            .is_ok()
    }
}
