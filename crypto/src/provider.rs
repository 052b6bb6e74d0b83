//! The primitive capability seam consumed by the tunnel.
//!
//! Callers never reach the algorithm crates directly: every KEM, KDF, AEAD and
//! hash call goes through [`PrimitiveProvider`], so tests can substitute a
//! provider that fails on demand and deployments can swap implementations.

use std::sync::Mutex;

use rand::rngs::OsRng;
use rand_chacha::ChaCha20Rng;
use rand_core::CryptoRngCore;

use crate::aead::{self, AeadAlgorithm, AEAD_NONCE_LEN, AEAD_TAG_LEN};
use crate::deterministic::seeded_rng;
use crate::error::CryptoError;
use crate::hashes::{self, HashAlgorithm, DIGEST_LEN};
use crate::kdf::{self, KdfAlgorithm};
use crate::kem::{self, Encapsulated, KemAlgorithm, KemKeyMaterial};
use crate::SecretBytes;

pub trait PrimitiveProvider: Send + Sync {
    fn generate_keypair(&self, algorithm: KemAlgorithm) -> Result<KemKeyMaterial, CryptoError>;

    fn encapsulate(
        &self,
        algorithm: KemAlgorithm,
        public_key: &[u8],
    ) -> Result<Encapsulated, CryptoError>;

    fn decapsulate(
        &self,
        algorithm: KemAlgorithm,
        secret_key: &[u8],
        ciphertext: &[u8],
    ) -> Result<SecretBytes, CryptoError> {
        kem::decapsulate(algorithm, secret_key, ciphertext)
    }

    fn derive(
        &self,
        algorithm: KdfAlgorithm,
        secret: &[u8],
        context: &[u8],
        output_len: usize,
    ) -> Result<SecretBytes, CryptoError> {
        kdf::derive(algorithm, secret, context, output_len)
    }

    fn seal(
        &self,
        algorithm: AeadAlgorithm,
        key: &[u8],
        nonce: &[u8; AEAD_NONCE_LEN],
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<(Vec<u8>, [u8; AEAD_TAG_LEN]), CryptoError> {
        aead::seal(algorithm, key, nonce, plaintext, aad)
    }

    fn open(
        &self,
        algorithm: AeadAlgorithm,
        key: &[u8],
        nonce: &[u8; AEAD_NONCE_LEN],
        ciphertext: &[u8],
        tag: &[u8; AEAD_TAG_LEN],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        aead::open(algorithm, key, nonce, ciphertext, tag, aad)
    }

    fn digest(&self, algorithm: HashAlgorithm, data: &[u8]) -> [u8; DIGEST_LEN] {
        hashes::digest(algorithm, data)
    }
}

/// RustCrypto-backed provider. Owns its RNG behind a mutex.
pub struct RustCryptoProvider<R = OsRng> {
    rng: Mutex<R>,
}

impl RustCryptoProvider<OsRng> {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(OsRng),
        }
    }
}

impl Default for RustCryptoProvider<OsRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl RustCryptoProvider<ChaCha20Rng> {
    /// Deterministic provider for reproducible tests.
    pub fn seeded(seed: &[u8]) -> Self {
        Self {
            rng: Mutex::new(seeded_rng(seed)),
        }
    }
}

impl<R: CryptoRngCore + Send> RustCryptoProvider<R> {
    fn with_rng<T>(&self, f: impl FnOnce(&mut R) -> T) -> T {
        // A poisoned RNG is still a valid RNG.
        let mut guard = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut *guard)
    }
}

impl<R: CryptoRngCore + Send> PrimitiveProvider for RustCryptoProvider<R> {
    fn generate_keypair(&self, algorithm: KemAlgorithm) -> Result<KemKeyMaterial, CryptoError> {
        self.with_rng(|rng| kem::generate_keypair(algorithm, rng))
    }

    fn encapsulate(
        &self,
        algorithm: KemAlgorithm,
        public_key: &[u8],
    ) -> Result<Encapsulated, CryptoError> {
        self.with_rng(|rng| kem::encapsulate(algorithm, public_key, rng))
    }
}

impl<P: PrimitiveProvider + ?Sized> PrimitiveProvider for std::sync::Arc<P> {
    fn generate_keypair(&self, algorithm: KemAlgorithm) -> Result<KemKeyMaterial, CryptoError> {
        (**self).generate_keypair(algorithm)
    }

    fn encapsulate(
        &self,
        algorithm: KemAlgorithm,
        public_key: &[u8],
    ) -> Result<Encapsulated, CryptoError> {
        (**self).encapsulate(algorithm, public_key)
    }

    fn decapsulate(
        &self,
        algorithm: KemAlgorithm,
        secret_key: &[u8],
        ciphertext: &[u8],
    ) -> Result<SecretBytes, CryptoError> {
        (**self).decapsulate(algorithm, secret_key, ciphertext)
    }

    fn derive(
        &self,
        algorithm: KdfAlgorithm,
        secret: &[u8],
        context: &[u8],
        output_len: usize,
    ) -> Result<SecretBytes, CryptoError> {
        (**self).derive(algorithm, secret, context, output_len)
    }

    fn seal(
        &self,
        algorithm: AeadAlgorithm,
        key: &[u8],
        nonce: &[u8; AEAD_NONCE_LEN],
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<(Vec<u8>, [u8; AEAD_TAG_LEN]), CryptoError> {
        (**self).seal(algorithm, key, nonce, plaintext, aad)
    }

    fn open(
        &self,
        algorithm: AeadAlgorithm,
        key: &[u8],
        nonce: &[u8; AEAD_NONCE_LEN],
        ciphertext: &[u8],
        tag: &[u8; AEAD_TAG_LEN],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        (**self).open(algorithm, key, nonce, ciphertext, tag, aad)
    }

    fn digest(&self, algorithm: HashAlgorithm, data: &[u8]) -> [u8; DIGEST_LEN] {
        (**self).digest(algorithm, data)
    }
}
