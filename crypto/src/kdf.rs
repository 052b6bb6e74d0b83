//! HKDF key derivation with an explicit context label.

use hkdf::Hkdf;
use sha2::Sha256;
use sha3::{Sha3_256, Sha3_512};
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::SecretBytes;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KdfAlgorithm {
    HkdfSha256,
    HkdfSha3_256,
    HkdfSha3_512,
}

impl KdfAlgorithm {
    pub const fn name(self) -> &'static str {
        match self {
            KdfAlgorithm::HkdfSha256 => "HKDF-SHA-256",
            KdfAlgorithm::HkdfSha3_256 => "HKDF-SHA3-256",
            KdfAlgorithm::HkdfSha3_512 => "HKDF-SHA3-512",
        }
    }

    /// Largest output HKDF can produce (255 blocks of the hash output).
    pub const fn max_output_len(self) -> usize {
        match self {
            KdfAlgorithm::HkdfSha256 | KdfAlgorithm::HkdfSha3_256 => 255 * 32,
            KdfAlgorithm::HkdfSha3_512 => 255 * 64,
        }
    }
}

impl core::fmt::Display for KdfAlgorithm {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Derive `output_len` bytes from `secret` under `context`.
///
/// Deterministic for identical inputs. The salt is empty; domain separation
/// comes entirely from `context`.
pub fn derive(
    algorithm: KdfAlgorithm,
    secret: &[u8],
    context: &[u8],
    output_len: usize,
) -> Result<SecretBytes, CryptoError> {
    if secret.is_empty() {
        return Err(CryptoError::DerivationFailed("empty input secret"));
    }
    if output_len == 0 || output_len > algorithm.max_output_len() {
        return Err(CryptoError::DerivationFailed("unsupported output length"));
    }

    let mut okm = Zeroizing::new(vec![0u8; output_len]);
    let expanded = match algorithm {
        KdfAlgorithm::HkdfSha256 => Hkdf::<Sha256>::new(None, secret).expand(context, &mut okm),
        KdfAlgorithm::HkdfSha3_256 => {
            Hkdf::<Sha3_256>::new(None, secret).expand(context, &mut okm)
        }
        KdfAlgorithm::HkdfSha3_512 => {
            Hkdf::<Sha3_512>::new(None, secret).expand(context, &mut okm)
        }
    };
    expanded.map_err(|_| CryptoError::DerivationFailed("hkdf expand rejected length"))?;
    Ok(okm)
}
