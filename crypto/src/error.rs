use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("invalid length: expected {expected} bytes, found {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid key")]
    InvalidKey,

    #[error("encapsulation failed")]
    EncapsulationFailed,

    #[error("decapsulation failed")]
    DecapsulationFailed,

    #[error("key derivation failed: {0}")]
    DerivationFailed(&'static str),

    #[error("encryption failed")]
    EncryptionFailed,

    /// Carries no detail: a wrong key and a forged tag look the same.
    #[error("authentication failed")]
    AuthenticationFailed,
}

impl CryptoError {
    pub(crate) fn check_len(expected: usize, bytes: &[u8]) -> Result<(), CryptoError> {
        if bytes.len() != expected {
            return Err(CryptoError::InvalidLength {
                expected,
                actual: bytes.len(),
            });
        }
        Ok(())
    }
}
