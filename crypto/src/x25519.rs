//! X25519 exposed through the KEM contract (DHKEM without the labelled extract).
//!
//! The "ciphertext" is the sender's ephemeral public key. Non-contributory
//! exchanges (low-order peer points) are rejected.

use rand_core::CryptoRngCore;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::kem::{Encapsulated, KemKeyMaterial};
use crate::SecretBytes;

pub const X25519_KEY_LEN: usize = 32;

fn to_array(bytes: &[u8]) -> Result<[u8; X25519_KEY_LEN], CryptoError> {
    CryptoError::check_len(X25519_KEY_LEN, bytes)?;
    let mut arr = [0u8; X25519_KEY_LEN];
    arr.copy_from_slice(bytes);
    Ok(arr)
}

pub(crate) fn generate<R: CryptoRngCore>(rng: &mut R) -> KemKeyMaterial {
    let secret = StaticSecret::random_from_rng(rng);
    let public = PublicKey::from(&secret);
    KemKeyMaterial {
        public_key: public.as_bytes().to_vec(),
        secret_key: Zeroizing::new(secret.to_bytes().to_vec()),
    }
}

pub(crate) fn encapsulate<R: CryptoRngCore>(
    public_key: &[u8],
    rng: &mut R,
) -> Result<Encapsulated, CryptoError> {
    let peer = PublicKey::from(to_array(public_key)?);
    let ephemeral = EphemeralSecret::random_from_rng(rng);
    let ciphertext = PublicKey::from(&ephemeral).as_bytes().to_vec();

    let shared = ephemeral.diffie_hellman(&peer);
    if !shared.was_contributory() {
        return Err(CryptoError::EncapsulationFailed);
    }

    Ok(Encapsulated {
        ciphertext,
        shared_secret: Zeroizing::new(shared.as_bytes().to_vec()),
    })
}

pub(crate) fn decapsulate(secret_key: &[u8], ciphertext: &[u8]) -> Result<SecretBytes, CryptoError> {
    let secret = StaticSecret::from(to_array(secret_key)?);
    let peer = PublicKey::from(to_array(ciphertext)?);

    let shared = secret.diffie_hellman(&peer);
    if !shared.was_contributory() {
        return Err(CryptoError::DecapsulationFailed);
    }
    Ok(Zeroizing::new(shared.as_bytes().to_vec()))
}
