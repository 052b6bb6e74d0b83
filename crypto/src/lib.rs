//! Primitive provider for the Icarus tunnel.
//!
//! Thin, length-checked wrappers over RustCrypto implementations of ML-KEM,
//! X25519, HKDF, AES-GCM/ChaCha20-Poly1305 and SHA-2/SHA-3/BLAKE3. Nothing in
//! here knows about sessions or suites.

pub mod aead;
pub mod deterministic;
pub mod error;
pub mod hashes;
pub mod kdf;
pub mod kem;
pub mod ml_kem;
pub mod provider;
pub mod x25519;

pub use error::CryptoError;
pub use provider::{PrimitiveProvider, RustCryptoProvider};

/// Secret bytes that are erased when dropped.
pub type SecretBytes = zeroize::Zeroizing<Vec<u8>>;
