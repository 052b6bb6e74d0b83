//! Key-encapsulation dispatch over the supported KEM algorithms.
//!
//! Every entry point validates byte lengths against the fixed parameter table
//! before the underlying primitive sees the input.

use rand_core::CryptoRngCore;

use crate::error::CryptoError;
use crate::{ml_kem, x25519, SecretBytes};

/// Fixed byte sizes of one KEM parameter set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KemParams {
    pub public_key_len: usize,
    pub secret_key_len: usize,
    pub ciphertext_len: usize,
    pub shared_secret_len: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KemAlgorithm {
    /// ML-KEM-768 (FIPS 203, NIST category 3)
    MlKem768,
    /// ML-KEM-1024 (FIPS 203, NIST category 5)
    MlKem1024,
    /// X25519 Diffie-Hellman used as a KEM. Classical only.
    X25519,
}

impl KemAlgorithm {
    pub const fn params(self) -> KemParams {
        match self {
            KemAlgorithm::MlKem768 => KemParams {
                public_key_len: ml_kem::ML_KEM_768_PUBLIC_KEY_LEN,
                secret_key_len: ml_kem::ML_KEM_768_SECRET_KEY_LEN,
                ciphertext_len: ml_kem::ML_KEM_768_CIPHERTEXT_LEN,
                shared_secret_len: ml_kem::ML_KEM_SHARED_SECRET_LEN,
            },
            KemAlgorithm::MlKem1024 => KemParams {
                public_key_len: ml_kem::ML_KEM_1024_PUBLIC_KEY_LEN,
                secret_key_len: ml_kem::ML_KEM_1024_SECRET_KEY_LEN,
                ciphertext_len: ml_kem::ML_KEM_1024_CIPHERTEXT_LEN,
                shared_secret_len: ml_kem::ML_KEM_SHARED_SECRET_LEN,
            },
            KemAlgorithm::X25519 => KemParams {
                public_key_len: x25519::X25519_KEY_LEN,
                secret_key_len: x25519::X25519_KEY_LEN,
                ciphertext_len: x25519::X25519_KEY_LEN,
                shared_secret_len: x25519::X25519_KEY_LEN,
            },
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            KemAlgorithm::MlKem768 => "ML-KEM-768",
            KemAlgorithm::MlKem1024 => "ML-KEM-1024",
            KemAlgorithm::X25519 => "X25519",
        }
    }

    pub const fn is_post_quantum(self) -> bool {
        !matches!(self, KemAlgorithm::X25519)
    }
}

impl core::fmt::Display for KemAlgorithm {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Output of key generation. The secret half is erased on drop.
pub struct KemKeyMaterial {
    pub public_key: Vec<u8>,
    pub secret_key: SecretBytes,
}

/// Output of encapsulation: the ciphertext for the wire and the local secret.
pub struct Encapsulated {
    pub ciphertext: Vec<u8>,
    pub shared_secret: SecretBytes,
}

pub fn generate_keypair<R: CryptoRngCore>(
    algorithm: KemAlgorithm,
    rng: &mut R,
) -> Result<KemKeyMaterial, CryptoError> {
    let material = match algorithm {
        KemAlgorithm::MlKem768 => ml_kem::generate::<::ml_kem::MlKem768, R>(rng),
        KemAlgorithm::MlKem1024 => ml_kem::generate::<::ml_kem::MlKem1024, R>(rng),
        KemAlgorithm::X25519 => x25519::generate(rng),
    };

    let params = algorithm.params();
    CryptoError::check_len(params.public_key_len, &material.public_key)?;
    CryptoError::check_len(params.secret_key_len, &material.secret_key)?;
    Ok(material)
}

pub fn encapsulate<R: CryptoRngCore>(
    algorithm: KemAlgorithm,
    public_key: &[u8],
    rng: &mut R,
) -> Result<Encapsulated, CryptoError> {
    CryptoError::check_len(algorithm.params().public_key_len, public_key)?;
    match algorithm {
        KemAlgorithm::MlKem768 => ml_kem::encapsulate::<::ml_kem::MlKem768, R>(public_key, rng),
        KemAlgorithm::MlKem1024 => ml_kem::encapsulate::<::ml_kem::MlKem1024, R>(public_key, rng),
        KemAlgorithm::X25519 => x25519::encapsulate(public_key, rng),
    }
}

pub fn decapsulate(
    algorithm: KemAlgorithm,
    secret_key: &[u8],
    ciphertext: &[u8],
) -> Result<SecretBytes, CryptoError> {
    let params = algorithm.params();
    CryptoError::check_len(params.secret_key_len, secret_key)?;
    CryptoError::check_len(params.ciphertext_len, ciphertext)?;
    match algorithm {
        KemAlgorithm::MlKem768 => ml_kem::decapsulate::<::ml_kem::MlKem768>(secret_key, ciphertext),
        KemAlgorithm::MlKem1024 => {
            ml_kem::decapsulate::<::ml_kem::MlKem1024>(secret_key, ciphertext)
        }
        KemAlgorithm::X25519 => x25519::decapsulate(secret_key, ciphertext),
    }
}
