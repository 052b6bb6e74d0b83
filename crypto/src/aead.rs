//! AEAD seal/open with detached tags.

use aes_gcm::Aes256Gcm;
use chacha20poly1305::ChaCha20Poly1305;

use ::aead::generic_array::GenericArray;
use ::aead::{AeadInPlace, KeyInit};

use crate::error::CryptoError;

pub const AEAD_KEY_LEN: usize = 32;
pub const AEAD_NONCE_LEN: usize = 12;
pub const AEAD_TAG_LEN: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AeadAlgorithm {
    Aes256Gcm,
    ChaCha20Poly1305,
}

impl AeadAlgorithm {
    pub const fn name(self) -> &'static str {
        match self {
            AeadAlgorithm::Aes256Gcm => "AES-256-GCM",
            AeadAlgorithm::ChaCha20Poly1305 => "ChaCha20-Poly1305",
        }
    }

    pub const fn key_len(self) -> usize {
        AEAD_KEY_LEN
    }
}

impl core::fmt::Display for AeadAlgorithm {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

fn seal_with<C: KeyInit + AeadInPlace>(
    key: &[u8],
    nonce: &[u8; AEAD_NONCE_LEN],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<(Vec<u8>, [u8; AEAD_TAG_LEN]), CryptoError> {
    let cipher = C::new_from_slice(key).map_err(|_| CryptoError::InvalidKey)?;
    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(nonce), aad, &mut buffer)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut tag_bytes = [0u8; AEAD_TAG_LEN];
    tag_bytes.copy_from_slice(tag.as_slice());
    Ok((buffer, tag_bytes))
}

fn open_with<C: KeyInit + AeadInPlace>(
    key: &[u8],
    nonce: &[u8; AEAD_NONCE_LEN],
    ciphertext: &[u8],
    tag: &[u8; AEAD_TAG_LEN],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = C::new_from_slice(key).map_err(|_| CryptoError::InvalidKey)?;
    let mut buffer = ciphertext.to_vec();
    match cipher.decrypt_in_place_detached(
        GenericArray::from_slice(nonce),
        aad,
        &mut buffer,
        GenericArray::from_slice(tag),
    ) {
        Ok(()) => Ok(buffer),
        Err(_) => {
            // Nothing of the buffer leaves this function on failure.
            zeroize::Zeroize::zeroize(&mut buffer);
            Err(CryptoError::AuthenticationFailed)
        }
    }
}

pub fn seal(
    algorithm: AeadAlgorithm,
    key: &[u8],
    nonce: &[u8; AEAD_NONCE_LEN],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<(Vec<u8>, [u8; AEAD_TAG_LEN]), CryptoError> {
    CryptoError::check_len(algorithm.key_len(), key)?;
    match algorithm {
        AeadAlgorithm::Aes256Gcm => seal_with::<Aes256Gcm>(key, nonce, plaintext, aad),
        AeadAlgorithm::ChaCha20Poly1305 => {
            seal_with::<ChaCha20Poly1305>(key, nonce, plaintext, aad)
        }
    }
}

pub fn open(
    algorithm: AeadAlgorithm,
    key: &[u8],
    nonce: &[u8; AEAD_NONCE_LEN],
    ciphertext: &[u8],
    tag: &[u8; AEAD_TAG_LEN],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    CryptoError::check_len(algorithm.key_len(), key)?;
    match algorithm {
        AeadAlgorithm::Aes256Gcm => open_with::<Aes256Gcm>(key, nonce, ciphertext, tag, aad),
        AeadAlgorithm::ChaCha20Poly1305 => {
            open_with::<ChaCha20Poly1305>(key, nonce, ciphertext, tag, aad)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const KEY: [u8; 32] = [0x42; 32];
    const NONCE: [u8; 12] = [0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 9];

    #[test]
    fn test_seal_open_both_algorithms() {
        for algorithm in [AeadAlgorithm::Aes256Gcm, AeadAlgorithm::ChaCha20Poly1305] {
            let (ct, tag) = seal(algorithm, &KEY, &NONCE, b"payload", b"aad").unwrap();
            assert_eq!(ct.len(), b"payload".len());
            let pt = open(algorithm, &KEY, &NONCE, &ct, &tag, b"aad").unwrap();
            assert_eq!(pt, b"payload");
        }
    }

    #[test]
    fn test_wrong_key_and_forged_tag_are_indistinguishable() {
        let (ct, tag) = seal(AeadAlgorithm::Aes256Gcm, &KEY, &NONCE, b"payload", b"aad").unwrap();

        let wrong_key = open(AeadAlgorithm::Aes256Gcm, &[0x43; 32], &NONCE, &ct, &tag, b"aad");
        let mut forged = tag;
        forged[0] ^= 1;
        let forged_tag = open(AeadAlgorithm::Aes256Gcm, &KEY, &NONCE, &ct, &forged, b"aad");

        assert_eq!(wrong_key.unwrap_err(), forged_tag.unwrap_err());
    }

    #[test]
    fn test_short_key_rejected() {
        let result = seal(AeadAlgorithm::Aes256Gcm, &[0u8; 16], &NONCE, b"x", b"");
        assert!(matches!(
            result,
            Err(CryptoError::InvalidLength { expected: 32, actual: 16 })
        ));
    }

    proptest! {
        #[test]
        fn prop_aad_bit_flip_fails(
            plaintext in proptest::collection::vec(any::<u8>(), 0..256),
            aad in proptest::collection::vec(any::<u8>(), 1..64),
            index in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let (ct, tag) = seal(AeadAlgorithm::ChaCha20Poly1305, &KEY, &NONCE, &plaintext, &aad).unwrap();
            let mut tampered = aad.clone();
            let i = index.index(tampered.len());
            tampered[i] ^= 1 << bit;
            let result = open(AeadAlgorithm::ChaCha20Poly1305, &KEY, &NONCE, &ct, &tag, &tampered);
            prop_assert_eq!(result, Err(CryptoError::AuthenticationFailed));
        }
    }
}
