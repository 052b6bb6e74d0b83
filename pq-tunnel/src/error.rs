//! Error types for the tunnel protocol

use crypto::CryptoError;
use thiserror::Error;

use crate::session::SessionState;
use crate::suite::SuiteId;

/// Errors that can occur during tunnel establishment or message exchange
#[derive(Debug, Error)]
pub enum TunnelError {
    /// The KEM rejected the suite parameters during key generation
    #[error("key generation failed: {0}")]
    KeyGen(CryptoError),

    /// Malformed peer public key or encapsulation failure
    #[error("encapsulation failed: {0}")]
    Encapsulation(CryptoError),

    /// Malformed ciphertext (rejected before the primitive runs) or decapsulation failure
    #[error("decapsulation failed: {0}")]
    Decapsulation(CryptoError),

    /// The KDF rejected its parameters
    #[error("key derivation failed: {0}")]
    Derivation(CryptoError),

    /// The AEAD refused to seal (key of the wrong length)
    #[error("encryption failed: {0}")]
    Encryption(CryptoError),

    /// AEAD verification failed. Never says whether the key or the data was wrong.
    #[error("integrity check failed")]
    Integrity,

    /// The nonce counter would repeat
    #[error("nonce space exhausted; re-establish the session")]
    NonceExhausted,

    /// Peer claims a suite that is unknown or differs from the negotiated one
    #[error("suite mismatch: expected {expected}, received {received}")]
    SuiteMismatch { expected: String, received: String },

    /// Envelope produced by a different protocol version
    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u8),

    /// Inbound nonce counter did not advance
    #[error("replayed or reordered message (counter {counter})")]
    Replay { counter: u64 },

    /// Operation not permitted in the current session state
    #[error("cannot {operation} in state {state}")]
    InvalidState {
        state: SessionState,
        operation: &'static str,
    },

    /// Fallback policy forbids a suite without post-quantum protection
    #[error("policy refuses non post-quantum suite {0}")]
    PolicyRefused(SuiteId),

    /// Health signal outside 0..=100 or NaN
    #[error("invalid health signal: {0}")]
    InvalidHealth(f64),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Envelope or frame serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Configuration file parse error
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error in the framed adapter
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Establishment exceeded the configured timeout
    #[error("operation timed out")]
    Timeout,

    /// Peer closed the stream mid-establishment
    #[error("connection closed during establishment")]
    ConnectionClosed,
}

impl TunnelError {
    /// Whether this error moves the affected session to `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TunnelError::KeyGen(_)
                | TunnelError::Encapsulation(_)
                | TunnelError::Decapsulation(_)
                | TunnelError::Derivation(_)
                | TunnelError::Encryption(_)
                | TunnelError::Integrity
                | TunnelError::NonceExhausted
                | TunnelError::SuiteMismatch { .. }
                | TunnelError::UnsupportedVersion(_)
                | TunnelError::Replay { .. }
        )
    }
}

/// Result type for tunnel operations
pub type Result<T> = std::result::Result<T, TunnelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integrity_message_is_undifferentiated() {
        assert_eq!(TunnelError::Integrity.to_string(), "integrity check failed");
    }

    #[test]
    fn test_terminal_classification() {
        assert!(TunnelError::NonceExhausted.is_terminal());
        assert!(TunnelError::Decapsulation(CryptoError::InvalidLength {
            expected: 1088,
            actual: 12
        })
        .is_terminal());
        assert!(!TunnelError::InvalidState {
            state: SessionState::Uninitialized,
            operation: "seal",
        }
        .is_terminal());
        assert!(!TunnelError::Timeout.is_terminal());
    }
}
