//! ML-KEM (FIPS 203) wrapper around the RustCrypto `ml-kem` crate.

use ::ml_kem::kem::{Decapsulate, Encapsulate};
use ::ml_kem::{Ciphertext, Encoded, EncodedSizeUser, KemCore};
use rand_core::CryptoRngCore;
use zeroize::{Zeroize, Zeroizing};

use crate::error::CryptoError;
use crate::kem::{Encapsulated, KemKeyMaterial};
use crate::SecretBytes;

pub const ML_KEM_768_PUBLIC_KEY_LEN: usize = 1184;
pub const ML_KEM_768_SECRET_KEY_LEN: usize = 2400;
pub const ML_KEM_768_CIPHERTEXT_LEN: usize = 1088;

pub const ML_KEM_1024_PUBLIC_KEY_LEN: usize = 1568;
pub const ML_KEM_1024_SECRET_KEY_LEN: usize = 3168;
pub const ML_KEM_1024_CIPHERTEXT_LEN: usize = 1568;

pub const ML_KEM_SHARED_SECRET_LEN: usize = 32;

type EncapsulationKey<K> = <K as KemCore>::EncapsulationKey;
type DecapsulationKey<K> = <K as KemCore>::DecapsulationKey;

pub(crate) fn generate<K: KemCore, R: CryptoRngCore>(rng: &mut R) -> KemKeyMaterial {
    let (dk, ek) = K::generate(rng);
    let secret_key = Zeroizing::new(dk.as_bytes().to_vec());
    KemKeyMaterial {
        public_key: ek.as_bytes().to_vec(),
        secret_key,
    }
}

pub(crate) fn encapsulate<K: KemCore, R: CryptoRngCore>(
    public_key: &[u8],
    rng: &mut R,
) -> Result<Encapsulated, CryptoError> {
    let encoded: Encoded<EncapsulationKey<K>> =
        public_key.try_into().map_err(|_| CryptoError::InvalidKey)?;
    let ek = EncapsulationKey::<K>::from_bytes(&encoded);

    let (ct, ss) = ek
        .encapsulate(rng)
        .map_err(|_| CryptoError::EncapsulationFailed)?;

    Ok(Encapsulated {
        ciphertext: ct.to_vec(),
        shared_secret: Zeroizing::new(ss.to_vec()),
    })
}

pub(crate) fn decapsulate<K: KemCore>(
    secret_key: &[u8],
    ciphertext: &[u8],
) -> Result<SecretBytes, CryptoError> {
    let mut encoded: Encoded<DecapsulationKey<K>> =
        secret_key.try_into().map_err(|_| CryptoError::InvalidKey)?;
    let dk = DecapsulationKey::<K>::from_bytes(&encoded);
    encoded[..].zeroize();

    let ct: Ciphertext<K> = ciphertext
        .try_into()
        .map_err(|_| CryptoError::DecapsulationFailed)?;

    let ss = dk
        .decapsulate(&ct)
        .map_err(|_| CryptoError::DecapsulationFailed)?;
    Ok(Zeroizing::new(ss.to_vec()))
}
