//! ES256 key fixtures for testing
//!
//! Keys are generated per test with `ring` and identified by a random
//! UUID `kid`. The public key is exported the way the load balancer
//! publishes it: a PEM-encoded SubjectPublicKeyInfo.

use base64::engine::general_purpose;
use base64::Engine;
use jsonwebtoken::EncodingKey;
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
use std::fmt;

/// DER prefix of a P-256 SubjectPublicKeyInfo, up to the BIT STRING
/// holding the 65-byte uncompressed point.
const P256_SPKI_PREFIX: [u8; 26] = [
    0x30, 0x59, 0x30, 0x13, 0x06, 0x07, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01, 0x06, 0x08,
    0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07, 0x03, 0x42, 0x00,
];

/// An ES256 signing key with its `kid`.
pub struct TestSigningKey {
    kid: String,
    key_pair: EcdsaKeyPair,
    pkcs8: Vec<u8>,
    rng: SystemRandom,
}

impl fmt::Debug for TestSigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestSigningKey")
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

impl TestSigningKey {
    /// Generate a fresh key with a random UUID `kid`.
    pub fn generate() -> Self {
        Self::with_kid(&uuid::Uuid::new_v4().to_string())
    }

    /// Generate a fresh key with the given `kid`.
    pub fn with_kid(kid: &str) -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng)
            .expect("Failed to generate P-256 key");
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), &rng)
                .expect("Failed to load generated P-256 key");

        Self {
            kid: kid.to_string(),
            key_pair,
            pkcs8: pkcs8.as_ref().to_vec(),
            rng,
        }
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Private key as PKCS#8 DER.
    pub fn pkcs8(&self) -> &[u8] {
        &self.pkcs8
    }

    /// Public key as PEM, wrapped at 64 columns.
    pub fn public_key_pem(&self) -> String {
        let mut der = P256_SPKI_PREFIX.to_vec();
        der.extend_from_slice(self.key_pair.public_key().as_ref());

        let b64 = general_purpose::STANDARD.encode(&der);
        let body: Vec<&str> = b64
            .as_bytes()
            .chunks(64)
            .map(|line| std::str::from_utf8(line).expect("base64 is ASCII"))
            .collect();

        format!(
            "-----BEGIN PUBLIC KEY-----\n{}\n-----END PUBLIC KEY-----\n",
            body.join("\n")
        )
    }

    /// Sign `message` with ECDSA P-256 / SHA-256, fixed-size (r || s) output.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.key_pair
            .sign(&self.rng, message)
            .expect("Failed to sign test message")
            .as_ref()
            .to_vec()
    }

    /// The same key as a `jsonwebtoken` encoding key.
    pub fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_ec_der(&self.pkcs8)
    }
}
