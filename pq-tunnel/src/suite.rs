//! Algorithm suites: which KEM, KDF, AEAD and hash a session runs under

use std::fmt;
use std::str::FromStr;

use crypto::aead::AeadAlgorithm;
use crypto::hashes::HashAlgorithm;
use crypto::kdf::KdfAlgorithm;
use crypto::kem::{KemAlgorithm, KemParams};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TunnelError};

/// Protocol identifier, prefix of every domain-separation string
pub const PROTOCOL_ID: &str = "icarus-tunnel-v1";

/// Envelope format version
pub const PROTOCOL_VERSION: u8 = 1;

/// Stable suite identifier
///
/// Serializes as its wire name so configuration files read naturally.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SuiteId {
    /// ML-KEM-768, the default post-quantum suite
    #[serde(rename = "ml-kem-768+aes-256-gcm")]
    MlKem768Primary,
    /// ML-KEM-1024 for degraded conditions
    #[serde(rename = "ml-kem-1024+aes-256-gcm")]
    MlKem1024Hardened,
    /// ML-KEM-768 paired with an ML-DSA-65 signature tag
    #[serde(rename = "ml-kem-768+ml-dsa-65+aes-256-gcm")]
    MlKem768MlDsa65,
    /// Classical X25519, no post-quantum protection
    #[serde(rename = "x25519+aes-256-gcm")]
    X25519Emergency,
}

impl SuiteId {
    pub const ALL: [SuiteId; 4] = [
        SuiteId::MlKem768Primary,
        SuiteId::MlKem1024Hardened,
        SuiteId::MlKem768MlDsa65,
        SuiteId::X25519Emergency,
    ];

    /// One-byte code carried in envelopes and key offers
    pub const fn wire_code(self) -> u8 {
        match self {
            SuiteId::MlKem768Primary => 0x01,
            SuiteId::MlKem1024Hardened => 0x02,
            SuiteId::MlKem768MlDsa65 => 0x03,
            SuiteId::X25519Emergency => 0x04,
        }
    }

    pub fn from_wire_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.wire_code() == code)
    }

    pub const fn name(self) -> &'static str {
        match self {
            SuiteId::MlKem768Primary => "ml-kem-768+aes-256-gcm",
            SuiteId::MlKem1024Hardened => "ml-kem-1024+aes-256-gcm",
            SuiteId::MlKem768MlDsa65 => "ml-kem-768+ml-dsa-65+aes-256-gcm",
            SuiteId::X25519Emergency => "x25519+aes-256-gcm",
        }
    }
}

impl fmt::Display for SuiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SuiteId {
    type Err = TunnelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|id| id.name() == s)
            .ok_or_else(|| TunnelError::Config(format!("unknown suite {s:?}")))
    }
}

/// Signature scheme a suite is paired with. Carried as a tag only; the tunnel
/// does not sign anything.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    MlDsa65,
}

impl SignatureAlgorithm {
    pub const fn name(self) -> &'static str {
        match self {
            SignatureAlgorithm::MlDsa65 => "ML-DSA-65",
        }
    }
}

/// A concrete algorithm combination. Immutable once registered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SuiteDescriptor {
    pub id: SuiteId,
    pub kem: KemAlgorithm,
    pub kdf: KdfAlgorithm,
    /// KDF context, unique per protocol version and suite
    pub domain_separation: String,
    pub aead: AeadAlgorithm,
    pub hash: HashAlgorithm,
    pub signature: Option<SignatureAlgorithm>,
    pub key_bits: u16,
    pub post_quantum: bool,
    pub nist_level: Option<u8>,
}

impl SuiteDescriptor {
    /// The built-in descriptor for `id`.
    pub fn standard(id: SuiteId) -> Self {
        let (kem, kdf, hash, signature, nist_level) = match id {
            SuiteId::MlKem768Primary => (
                KemAlgorithm::MlKem768,
                KdfAlgorithm::HkdfSha3_256,
                HashAlgorithm::Sha3_256,
                None,
                Some(3),
            ),
            SuiteId::MlKem1024Hardened => (
                KemAlgorithm::MlKem1024,
                KdfAlgorithm::HkdfSha3_512,
                HashAlgorithm::Sha3_256,
                None,
                Some(5),
            ),
            SuiteId::MlKem768MlDsa65 => (
                KemAlgorithm::MlKem768,
                KdfAlgorithm::HkdfSha3_256,
                HashAlgorithm::Sha3_256,
                Some(SignatureAlgorithm::MlDsa65),
                Some(3),
            ),
            SuiteId::X25519Emergency => (
                KemAlgorithm::X25519,
                KdfAlgorithm::HkdfSha256,
                HashAlgorithm::Sha256,
                None,
                None,
            ),
        };

        Self {
            id,
            kem,
            kdf,
            domain_separation: domain_separation(id),
            aead: AeadAlgorithm::Aes256Gcm,
            hash,
            signature,
            key_bits: 256,
            post_quantum: kem.is_post_quantum(),
            nist_level,
        }
    }

    /// Session key length in bytes
    pub fn key_len(&self) -> usize {
        usize::from(self.key_bits / 8)
    }

    pub fn kem_params(&self) -> KemParams {
        self.kem.params()
    }

    /// Reject descriptors whose parts cannot work together.
    pub fn validate(&self) -> Result<()> {
        if self.key_bits % 8 != 0 || self.key_len() != self.aead.key_len() {
            return Err(TunnelError::Config(format!(
                "suite {}: {}-bit key does not fit {}",
                self.id,
                self.key_bits,
                self.aead.name()
            )));
        }
        if self.key_len() > self.kdf.max_output_len() {
            return Err(TunnelError::Config(format!(
                "suite {}: {} cannot produce a {}-bit key",
                self.id,
                self.kdf.name(),
                self.key_bits
            )));
        }
        if self.post_quantum != self.kem.is_post_quantum() {
            return Err(TunnelError::Config(format!(
                "suite {}: post-quantum flag disagrees with {}",
                self.id,
                self.kem.name()
            )));
        }
        if self.domain_separation.is_empty() {
            return Err(TunnelError::Config(format!(
                "suite {}: empty domain separation string",
                self.id
            )));
        }
        Ok(())
    }
}

/// KDF context for `id`, e.g. `icarus-tunnel-v1/ml-kem-768+aes-256-gcm`.
pub fn domain_separation(id: SuiteId) -> String {
    format!("{PROTOCOL_ID}/{}", id.name())
}
