//! Property tests over sealed envelopes

use std::collections::HashSet;

use crypto::RustCryptoProvider;
use proptest::prelude::*;
use pq_tunnel::{
    MessageEnvelope, Role, SuiteDescriptor, SuiteId, TunnelError, TunnelSession,
};

type Session = TunnelSession<RustCryptoProvider>;

fn established(id: SuiteId) -> (Session, Session) {
    let suite = SuiteDescriptor::standard(id);
    let mut responder = TunnelSession::new(RustCryptoProvider::new(), suite.clone(), Role::Responder);
    let mut initiator = TunnelSession::new(RustCryptoProvider::new(), suite, Role::Initiator);
    let public_key = responder.generate_keypair().unwrap().to_vec();
    let ciphertext = initiator.initiate(&public_key).unwrap();
    responder.respond(&ciphertext).unwrap();
    (initiator, responder)
}

fn suite_strategy() -> impl Strategy<Value = SuiteId> {
    prop::sample::select(SuiteId::ALL.to_vec())
}

fn assert_integrity_failure(responder: &mut Session, envelope: &MessageEnvelope) {
    match responder.open(envelope) {
        Err(TunnelError::Integrity) => {}
        other => panic!("Expected Integrity error, got {other:?}"),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn seal_open_round_trip(
        id in suite_strategy(),
        aad in prop::collection::vec(any::<u8>(), 0..64),
        plaintext in prop::collection::vec(any::<u8>(), 0..512),
    ) {
        let (mut initiator, mut responder) = established(id);
        let envelope = initiator.seal(&aad, &plaintext).unwrap();
        prop_assert_eq!(responder.open(&envelope).unwrap(), plaintext);
    }

    #[test]
    fn ciphertext_bit_flip_is_detected(
        plaintext in prop::collection::vec(any::<u8>(), 1..256),
        index in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let (mut initiator, mut responder) = established(SuiteId::MlKem768Primary);
        let mut envelope = initiator.seal(b"aad", &plaintext).unwrap();
        let i = index.index(envelope.ciphertext.len());
        envelope.ciphertext[i] ^= 1 << bit;
        assert_integrity_failure(&mut responder, &envelope);
    }

    #[test]
    fn tag_bit_flip_is_detected(
        index in 0usize..16,
        bit in 0u8..8,
    ) {
        let (mut initiator, mut responder) = established(SuiteId::MlKem768Primary);
        let mut envelope = initiator.seal(b"aad", b"payload").unwrap();
        envelope.tag[index] ^= 1 << bit;
        assert_integrity_failure(&mut responder, &envelope);
    }

    #[test]
    fn aad_bit_flip_is_detected(
        aad in prop::collection::vec(any::<u8>(), 1..64),
        index in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let (mut initiator, mut responder) = established(SuiteId::X25519Emergency);
        let mut envelope = initiator.seal(&aad, b"payload").unwrap();
        let i = index.index(envelope.associated_data.len());
        envelope.associated_data[i] ^= 1 << bit;
        assert_integrity_failure(&mut responder, &envelope);
    }

    #[test]
    fn kem_ciphertext_bit_flip_is_detected(
        index in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let (mut initiator, mut responder) = {
            let suite = SuiteDescriptor::standard(SuiteId::MlKem768Primary);
            let mut responder =
                TunnelSession::new(RustCryptoProvider::new(), suite.clone(), Role::Responder);
            let mut initiator = TunnelSession::new(RustCryptoProvider::new(), suite, Role::Initiator);
            let public_key = responder.generate_keypair().unwrap().to_vec();
            initiator.initiate(&public_key).unwrap();
            (initiator, responder)
        };
        let mut envelope = initiator.seal(b"aad", b"payload").unwrap();
        if let Some(ct) = envelope.kem_ciphertext.as_mut() {
            let i = index.index(ct.len());
            ct[i] ^= 1 << bit;
        }
        // ML-KEM rejects implicitly: decapsulation yields an unrelated key.
        assert_integrity_failure(&mut responder, &envelope);
    }

    #[test]
    fn wire_encoding_survives_transit(
        plaintext in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        let (mut initiator, mut responder) = established(SuiteId::MlKem1024Hardened);
        let envelope = initiator.seal(b"wire", &plaintext).unwrap();
        let bytes = envelope.encode(1 << 20).unwrap();
        let decoded = MessageEnvelope::decode(&bytes, 1 << 20).unwrap();
        prop_assert_eq!(responder.open(&decoded).unwrap(), plaintext);
    }
}

#[test]
fn nonces_never_repeat_under_one_key() {
    let (mut initiator, mut responder) = established(SuiteId::MlKem768Primary);
    let mut seen = HashSet::new();
    for i in 0..500u32 {
        let envelope = initiator.seal(b"n", &i.to_be_bytes()).unwrap();
        assert!(seen.insert(envelope.nonce), "nonce reused at message {i}");
        let reply = responder.seal(b"n", &i.to_be_bytes()).unwrap();
        assert!(seen.insert(reply.nonce), "nonce reused on reply {i}");
    }
    assert_eq!(seen.len(), 1000);
}

#[test]
fn suite_id_tamper_is_detected_as_mismatch() {
    let (mut initiator, mut responder) = established(SuiteId::MlKem768Primary);
    let mut envelope = initiator.seal(b"aad", b"payload").unwrap();
    envelope.suite_id = SuiteId::MlKem768MlDsa65.wire_code();
    assert!(matches!(
        responder.open(&envelope),
        Err(TunnelError::SuiteMismatch { .. })
    ));
}
