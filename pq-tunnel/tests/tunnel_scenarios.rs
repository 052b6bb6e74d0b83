//! End-to-end tunnel establishment and agility scenarios

use std::io::Write;
use std::sync::Arc;
use std::thread;

use crypto::RustCryptoProvider;
use pq_tunnel::{
    AgilityController, FallbackPolicy, HealthSignal, Role, SessionState, SuiteDescriptor,
    SuiteId, SuiteRegistry, TunnelConfig, TunnelConfigBuilder, TunnelError, TunnelSession,
};

const TELEMETRY: &[u8] = b"G_local=0.927*G0";
const CHANNEL: &[u8] = b"icarus-telemetry-channel";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn health(value: f64) -> HealthSignal {
    HealthSignal::new(value).unwrap()
}

#[test]
fn test_telemetry_channel_scenario() {
    init_tracing();
    let controller = AgilityController::from_config(&TunnelConfig::default()).unwrap();
    let suite = controller.select_suite(health(80.0)).unwrap();
    assert_eq!(suite.id, SuiteId::MlKem768Primary);
    assert!(suite.post_quantum);

    let mut responder =
        TunnelSession::new(RustCryptoProvider::new(), suite.clone(), Role::Responder);
    let mut initiator = TunnelSession::new(RustCryptoProvider::new(), suite, Role::Initiator);

    let public_key = responder.generate_keypair().unwrap().to_vec();
    initiator.initiate(&public_key).unwrap();

    let envelope = initiator.seal(CHANNEL, TELEMETRY).unwrap();
    assert_eq!(envelope.associated_data, CHANNEL);
    assert!(envelope.kem_ciphertext.is_some());

    let plaintext = responder.open(&envelope).unwrap();
    assert_eq!(plaintext, TELEMETRY);

    let initiator_key = initiator.session_key().unwrap();
    assert_eq!(Some(initiator_key), responder.session_key());
    assert_eq!(initiator_key.key_bits(), 256);

    let mut tampered = initiator.seal(CHANNEL, TELEMETRY).unwrap();
    tampered.ciphertext[3] ^= 0x01;
    assert!(matches!(
        responder.open(&tampered),
        Err(TunnelError::Integrity)
    ));
    assert_eq!(responder.state(), SessionState::Failed);
    assert!(responder.session_key().is_none());
}

#[test]
fn test_tampered_ciphertext_after_establishment() {
    let suite = SuiteDescriptor::standard(SuiteId::MlKem768Primary);
    let mut responder =
        TunnelSession::new(RustCryptoProvider::new(), suite.clone(), Role::Responder);
    let mut initiator = TunnelSession::new(RustCryptoProvider::new(), suite, Role::Initiator);
    let public_key = responder.generate_keypair().unwrap().to_vec();
    let ciphertext = initiator.initiate(&public_key).unwrap();
    responder.respond(&ciphertext).unwrap();

    let mut envelope = initiator.seal(CHANNEL, TELEMETRY).unwrap();
    let last = envelope.ciphertext.len() - 1;
    envelope.ciphertext[last] ^= 0x80;
    assert!(matches!(
        responder.open(&envelope),
        Err(TunnelError::Integrity)
    ));
}

#[test]
fn test_default_table_resolution() {
    let registry = SuiteRegistry::standard();
    assert_eq!(registry.resolve(health(75.0)).id, SuiteId::MlKem768Primary);
    assert_eq!(registry.resolve(health(50.0)).id, SuiteId::MlKem1024Hardened);
    assert_eq!(registry.resolve(health(25.0)).id, SuiteId::MlKem768MlDsa65);

    let fallback = registry.resolve(health(10.0));
    assert_eq!(fallback.id, SuiteId::X25519Emergency);
    assert!(!fallback.post_quantum);
}

#[test]
fn test_every_resolved_suite_establishes() {
    let registry = SuiteRegistry::standard();
    for value in [95.0, 55.0, 22.0, 3.0] {
        let suite = registry.resolve(health(value)).clone();
        let mut responder =
            TunnelSession::new(RustCryptoProvider::new(), suite.clone(), Role::Responder);
        let mut initiator = TunnelSession::new(RustCryptoProvider::new(), suite, Role::Initiator);
        let public_key = responder.generate_keypair().unwrap().to_vec();
        initiator.initiate(&public_key).unwrap();

        let envelope = initiator.seal(CHANNEL, TELEMETRY).unwrap();
        assert_eq!(responder.open(&envelope).unwrap(), TELEMETRY);
    }
}

#[test]
fn test_suite_change_leads_to_new_session() {
    let controller = AgilityController::from_config(&TunnelConfig::default()).unwrap();
    let mut events = controller.subscribe();

    let suite = controller.select_suite(health(80.0)).unwrap();
    let mut initiator = TunnelSession::new(RustCryptoProvider::new(), suite, Role::Initiator);
    let mut responder = TunnelSession::new(
        RustCryptoProvider::new(),
        initiator.suite().clone(),
        Role::Responder,
    );
    let public_key = responder.generate_keypair().unwrap().to_vec();
    initiator.initiate(&public_key).unwrap();

    controller.on_health_change(health(45.0)).unwrap();
    let change = events.try_recv().unwrap();
    assert_eq!(change.next, SuiteId::MlKem1024Hardened);

    // The live session keeps its suite until it is replaced.
    assert_eq!(initiator.suite().id, SuiteId::MlKem768Primary);
    let envelope = initiator.seal(CHANNEL, TELEMETRY).unwrap();
    assert_eq!(responder.open(&envelope).unwrap(), TELEMETRY);

    initiator.close().unwrap();
    responder.close().unwrap();

    let next = controller.registry().lookup(change.next).unwrap().clone();
    let mut responder = TunnelSession::new(RustCryptoProvider::new(), next.clone(), Role::Responder);
    let mut initiator = TunnelSession::new(RustCryptoProvider::new(), next, Role::Initiator);
    let public_key = responder.generate_keypair().unwrap().to_vec();
    assert_eq!(public_key.len(), 1568);
    initiator.initiate(&public_key).unwrap();
    controller.acknowledge(change.next);

    let envelope = initiator.seal(CHANNEL, TELEMETRY).unwrap();
    assert_eq!(responder.open(&envelope).unwrap(), TELEMETRY);
    assert_eq!(controller.active_suite(), Some(SuiteId::MlKem1024Hardened));
    assert_eq!(controller.pending_suite(), None);
}

#[test]
fn test_refuse_policy_blocks_classical_suite() {
    let config = TunnelConfigBuilder::new()
        .fallback_policy(FallbackPolicy::Refuse)
        .build()
        .unwrap();
    let controller = AgilityController::from_config(&config).unwrap();
    assert!(matches!(
        controller.select_suite(health(10.0)),
        Err(TunnelError::PolicyRefused(SuiteId::X25519Emergency))
    ));
}

#[test]
fn test_concurrent_sessions_share_registry() {
    let registry = Arc::new(SuiteRegistry::standard());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let suite = registry.resolve(health(f64::from(i) * 12.5)).clone();
                let mut responder =
                    TunnelSession::new(RustCryptoProvider::new(), suite.clone(), Role::Responder);
                let mut initiator =
                    TunnelSession::new(RustCryptoProvider::new(), suite, Role::Initiator);
                let public_key = responder.generate_keypair()?.to_vec();
                initiator.initiate(&public_key)?;

                let message = format!("session-{i}");
                let envelope = initiator.seal(CHANNEL, message.as_bytes())?;
                let opened = responder.open(&envelope)?;
                Ok::<_, TunnelError>(opened == message.as_bytes())
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap().unwrap());
    }
}

#[test]
fn test_sessions_derive_independent_keys() {
    let suite = SuiteDescriptor::standard(SuiteId::MlKem768Primary);
    let mut keys = Vec::new();
    for _ in 0..2 {
        let mut responder =
            TunnelSession::new(RustCryptoProvider::new(), suite.clone(), Role::Responder);
        let mut initiator =
            TunnelSession::new(RustCryptoProvider::new(), suite.clone(), Role::Initiator);
        let public_key = responder.generate_keypair().unwrap().to_vec();
        initiator.initiate(&public_key).unwrap();
        keys.push(initiator);
    }
    assert_ne!(keys[0].session_key(), keys[1].session_key());
}

#[test]
fn test_config_file_drives_registry() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "agility": {{
                "thresholds": [
                    {{ "suite": "ml-kem-1024+aes-256-gcm", "min_health": 90.0 }},
                    {{ "suite": "ml-kem-768+aes-256-gcm", "min_health": 30.0 }}
                ],
                "hysteresis": 2.5,
                "fallback_policy": "accept"
            }},
            "nonce_limit": 3
        }}"#
    )
    .unwrap();

    let config = TunnelConfig::from_json_file(file.path()).unwrap();
    let registry = SuiteRegistry::from_config(&config).unwrap();
    assert_eq!(registry.resolve(health(95.0)).id, SuiteId::MlKem1024Hardened);
    assert_eq!(registry.resolve(health(60.0)).id, SuiteId::MlKem768Primary);
    assert_eq!(registry.resolve(health(29.0)).id, SuiteId::X25519Emergency);

    let suite = registry.resolve(health(60.0)).clone();
    let mut responder = TunnelSession::from_config(
        RustCryptoProvider::new(),
        suite.clone(),
        Role::Responder,
        &config,
    );
    let mut initiator =
        TunnelSession::from_config(RustCryptoProvider::new(), suite, Role::Initiator, &config);
    let public_key = responder.generate_keypair().unwrap().to_vec();
    initiator.initiate(&public_key).unwrap();
    for _ in 0..3 {
        let envelope = initiator.seal(CHANNEL, TELEMETRY).unwrap();
        responder.open(&envelope).unwrap();
    }
    assert!(matches!(
        initiator.seal(CHANNEL, TELEMETRY),
        Err(TunnelError::NonceExhausted)
    ));
}

#[test]
fn test_invalid_health_rejected() {
    assert!(matches!(
        HealthSignal::new(f64::NAN),
        Err(TunnelError::InvalidHealth(_))
    ));
    assert!(HealthSignal::new(101.0).is_err());
}
