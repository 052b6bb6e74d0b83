//! Crypto-agile post-quantum tunnel
//!
//! This crate establishes a confidential channel from a KEM, a KDF and an
//! AEAD, and picks the algorithm suite from an external health signal:
//! - ML-KEM-768 / ML-KEM-1024 encapsulation (post-quantum)
//! - X25519 as the classical emergency fallback
//! - HKDF over SHA-2 / SHA-3 for the session key
//! - AES-256-GCM for messages
//!
//! # Protocol Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Tunnel Establishment                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  1. Select suite      │  health ─▶ registry threshold table │
//! │  2. Responder keygen  │  ephemeral KEM keypair              │
//! │  3. Initiator encaps  │  (kem_ct, shared secret)            │
//! │  4. Derive            │  HKDF(ss, "icarus-tunnel-v1/suite") │
//! │  5. Seal / open       │  AEAD, counter nonces, header AAD   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The KEM ciphertext rides on the initiator's first envelope; the responder
//! completes establishment when it opens that envelope.
//!
//! # Example
//!
//! ```rust,ignore
//! use pq_tunnel::{AgilityController, HealthSignal, Role, TunnelConfig, TunnelSession};
//! use crypto::RustCryptoProvider;
//!
//! let controller = AgilityController::from_config(&TunnelConfig::default())?;
//! let suite = controller.select_suite(HealthSignal::new(80.0)?)?;
//!
//! let mut responder = TunnelSession::new(RustCryptoProvider::new(), suite.clone(), Role::Responder);
//! let mut initiator = TunnelSession::new(RustCryptoProvider::new(), suite, Role::Initiator);
//!
//! let public_key = responder.generate_keypair()?.to_vec();
//! initiator.initiate(&public_key)?;
//!
//! let envelope = initiator.seal(b"icarus-telemetry-channel", b"G_local=0.927*G0")?;
//! let plaintext = responder.open(&envelope)?;
//! ```

pub mod agility;
pub mod config;
pub mod envelope;
pub mod error;
pub mod health;
pub mod registry;
pub mod session;
pub mod suite;
pub mod transport;

pub use agility::{AgilityController, HealthSignal, SuiteChange};
pub use config::{AgilityPolicy, FallbackPolicy, SuiteThreshold, TunnelConfig, TunnelConfigBuilder};
pub use envelope::{fingerprint, fingerprint_hex, MessageEnvelope};
pub use error::{Result, TunnelError};
pub use health::{drive, CoherenceSimulator, DriveReport, HealthSource};
pub use registry::{RegistryEntry, SuiteRegistry};
pub use session::{KemKeyPair, Role, SessionKey, SessionState, TunnelSession};
pub use suite::{SignatureAlgorithm, SuiteDescriptor, SuiteId, PROTOCOL_ID, PROTOCOL_VERSION};
pub use transport::{KeyOffer, TunnelStream};
