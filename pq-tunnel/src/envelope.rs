//! Wire envelope for sealed messages
//!
//! ```text
//! ┌──────────┬──────────┬────────────────┬───────┬────────────┬─────┬─────────┐
//! │ version  │ suite id │ kem ciphertext │ nonce │ ciphertext │ tag │   aad   │
//! │   u8     │   u8     │ first msg only │  12B  │            │ 16B │ clear   │
//! └──────────┴──────────┴────────────────┴───────┴────────────┴─────┴─────────┘
//! ```
//!
//! The AEAD never sees the caller's associated data alone. It authenticates a
//! canonical header binding the version, the suite, the KEM ciphertext and
//! the caller's data, so changing any of them fails the tag check.

use bincode::Options;
use crypto::aead::{AEAD_NONCE_LEN, AEAD_TAG_LEN};
use crypto::hashes::DIGEST_LEN;
use crypto::PrimitiveProvider;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::session::TunnelSession;
use crate::suite::{SuiteDescriptor, PROTOCOL_ID};

fn envelope_bincode(limit: u64) -> impl Options {
    bincode::DefaultOptions::new().with_limit(limit)
}

/// Deserialize a frame no larger than `limit` bytes.
///
/// bincode only counts bytes against the limit while reading from a stream,
/// so a slice has to be measured up front.
pub(crate) fn decode_bounded<T: DeserializeOwned>(bytes: &[u8], limit: u64) -> Result<T> {
    if bytes.len() as u64 > limit {
        return Err(Box::new(bincode::ErrorKind::SizeLimit).into());
    }
    Ok(envelope_bincode(limit).deserialize(bytes)?)
}

/// One sealed message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub version: u8,
    /// Wire code of the suite; kept raw so unknown codes surface as a
    /// suite mismatch rather than a decode error
    pub suite_id: u8,
    /// Present only on the initiator's first envelope
    pub kem_ciphertext: Option<Vec<u8>>,
    pub nonce: [u8; AEAD_NONCE_LEN],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; AEAD_TAG_LEN],
    /// Authenticated, never encrypted
    pub associated_data: Vec<u8>,
}

impl MessageEnvelope {
    /// Serialize, refusing envelopes larger than `limit` bytes.
    pub fn encode(&self, limit: u64) -> Result<Vec<u8>> {
        Ok(envelope_bincode(limit).serialize(self)?)
    }

    /// Deserialize, refusing input larger than `limit` bytes.
    pub fn decode(bytes: &[u8], limit: u64) -> Result<Self> {
        decode_bounded(bytes, limit)
    }

    /// Split the nonce into its direction prefix and counter.
    pub fn nonce_parts(&self) -> ([u8; 4], u64) {
        split_nonce(&self.nonce)
    }

    /// AEAD associated data this envelope must verify under
    pub(crate) fn header(&self) -> Vec<u8> {
        authenticated_header(
            self.version,
            self.suite_id,
            self.kem_ciphertext.as_deref(),
            &self.associated_data,
        )
    }
}

pub(crate) fn split_nonce(nonce: &[u8; AEAD_NONCE_LEN]) -> ([u8; 4], u64) {
    let mut prefix = [0u8; 4];
    let mut counter = [0u8; 8];
    prefix.copy_from_slice(&nonce[..4]);
    counter.copy_from_slice(&nonce[4..]);
    (prefix, u64::from_be_bytes(counter))
}

pub(crate) fn build_nonce(prefix: [u8; 4], counter: u64) -> [u8; AEAD_NONCE_LEN] {
    let mut nonce = [0u8; AEAD_NONCE_LEN];
    nonce[..4].copy_from_slice(&prefix);
    nonce[4..].copy_from_slice(&counter.to_be_bytes());
    nonce
}

/// Canonical AEAD associated data for an envelope.
///
/// `protocol id ‖ version ‖ suite ‖ flag ‖ [len ‖ kem ciphertext] ‖ len ‖ aad`,
/// lengths as big-endian u64.
pub(crate) fn authenticated_header(
    version: u8,
    suite_code: u8,
    kem_ciphertext: Option<&[u8]>,
    associated_data: &[u8],
) -> Vec<u8> {
    let kem_len = kem_ciphertext.map_or(0, |ct| 8 + ct.len());
    let mut header =
        Vec::with_capacity(PROTOCOL_ID.len() + 3 + kem_len + 8 + associated_data.len());
    header.extend_from_slice(PROTOCOL_ID.as_bytes());
    header.push(version);
    header.push(suite_code);
    match kem_ciphertext {
        Some(ct) => {
            header.push(1);
            push_length_prefixed(&mut header, ct);
        }
        None => header.push(0),
    }
    push_length_prefixed(&mut header, associated_data);
    header
}

fn push_length_prefixed(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
    buf.extend_from_slice(bytes);
}

/// Seal `plaintext` under the session key.
pub fn seal<P: PrimitiveProvider>(
    session: &mut TunnelSession<P>,
    associated_data: &[u8],
    plaintext: &[u8],
) -> Result<MessageEnvelope> {
    session.seal(associated_data, plaintext)
}

/// Verify and decrypt, completing establishment first if the envelope
/// carries the KEM ciphertext.
pub fn open<P: PrimitiveProvider>(
    session: &mut TunnelSession<P>,
    envelope: &MessageEnvelope,
) -> Result<Vec<u8>> {
    session.open(envelope)
}

/// Integrity fingerprint of an external payload under the suite hash.
pub fn fingerprint<P: PrimitiveProvider + ?Sized>(
    provider: &P,
    suite: &SuiteDescriptor,
    payload: &[u8],
) -> [u8; DIGEST_LEN] {
    provider.digest(suite.hash, payload)
}

pub fn fingerprint_hex<P: PrimitiveProvider + ?Sized>(
    provider: &P,
    suite: &SuiteDescriptor,
    payload: &[u8],
) -> String {
    hex::encode(fingerprint(provider, suite, payload))
}
