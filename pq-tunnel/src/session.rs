//! Tunnel session state machine
//!
//! ```text
//! Responder: Uninitialized ─keygen─▶ KeysGenerated ─decaps─▶ Encapsulated
//! Initiator: Uninitialized ─────────────encaps─────────────▶ Encapsulated
//!
//! Encapsulated ─kdf─▶ KeyDerived ─▶ Ready ⟲ seal/open ─close─▶ Closed
//!
//! any state ─primitive, length, tag, nonce or replay failure─▶ Failed
//! ```
//!
//! All secret material (ephemeral secret key, shared secret, session key) is
//! held in zeroizing buffers. It is erased on `close`, on `abort`, on any
//! terminal failure, and when the session is dropped.

use std::fmt;
use std::time::SystemTime;

use crypto::hashes::ct_eq;
use crypto::kem::KemAlgorithm;
use crypto::{CryptoError, PrimitiveProvider, SecretBytes};

use crate::config::TunnelConfig;
use crate::envelope::{authenticated_header, build_nonce, MessageEnvelope};
use crate::error::{Result, TunnelError};
use crate::suite::{SuiteDescriptor, SuiteId, PROTOCOL_VERSION};

/// Which side of the exchange this session plays
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// Encapsulates to the responder's public key
    Initiator,
    /// Generates the ephemeral keypair and decapsulates
    Responder,
}

impl Role {
    /// First four nonce bytes for messages sealed by this role
    pub const fn nonce_prefix(self) -> [u8; 4] {
        match self {
            Role::Initiator => [0, 0, 0, 1],
            Role::Responder => [0, 0, 0, 2],
        }
    }

    pub const fn peer(self) -> Role {
        match self {
            Role::Initiator => Role::Responder,
            Role::Responder => Role::Initiator,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    Uninitialized,
    KeysGenerated,
    Encapsulated,
    KeyDerived,
    Ready,
    Closed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "Uninitialized",
            SessionState::KeysGenerated => "KeysGenerated",
            SessionState::Encapsulated => "Encapsulated",
            SessionState::KeyDerived => "KeyDerived",
            SessionState::Ready => "Ready",
            SessionState::Closed => "Closed",
            SessionState::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// Ephemeral KEM keypair owned by the responder.
///
/// Never serialized. The secret half leaves only through
/// [`KemKeyPair::export_secret_key`].
pub struct KemKeyPair {
    algorithm: KemAlgorithm,
    public_key: Vec<u8>,
    secret_key: SecretBytes,
    generated_at: SystemTime,
}

impl KemKeyPair {
    pub fn algorithm(&self) -> KemAlgorithm {
        self.algorithm
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn generated_at(&self) -> SystemTime {
        self.generated_at
    }

    /// Explicit export of the secret key. The copy is erased when dropped.
    pub fn export_secret_key(&self) -> SecretBytes {
        self.secret_key.clone()
    }
}

impl fmt::Debug for KemKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KemKeyPair")
            .field("algorithm", &self.algorithm)
            .field("public_key", &hex::encode(&self.public_key))
            .field("secret_key", &"[redacted]")
            .field("generated_at", &self.generated_at)
            .finish()
    }
}

/// KDF output sized to the suite's AEAD key, tagged with its derivation context
pub struct SessionKey {
    key: SecretBytes,
    context: String,
}

impl SessionKey {
    /// Domain-separation string the key was derived under
    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn key_len(&self) -> usize {
        self.key.len()
    }

    pub fn key_bits(&self) -> usize {
        self.key.len() * 8
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.key
    }
}

impl PartialEq for SessionKey {
    fn eq(&self, other: &Self) -> bool {
        ct_eq(&self.key, &other.key) && self.context == other.context
    }
}

impl Eq for SessionKey {}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey")
            .field("context", &self.context)
            .field("key", &"[redacted]")
            .finish()
    }
}

/// One tunnel session: one suite, one KEM exchange, one session key
pub struct TunnelSession<P> {
    provider: P,
    suite: SuiteDescriptor,
    role: Role,
    state: SessionState,
    keypair: Option<KemKeyPair>,
    peer_public_key: Option<Vec<u8>>,
    /// Initiator: sent on the first envelope. Responder: the one accepted.
    kem_ciphertext: Option<Vec<u8>>,
    shared_secret: Option<SecretBytes>,
    session_key: Option<SessionKey>,
    ciphertext_sent: bool,
    send_counter: u64,
    last_received: Option<u64>,
    nonce_limit: u64,
    verbose_logging: bool,
}

impl<P: PrimitiveProvider> TunnelSession<P> {
    pub fn new(provider: P, suite: SuiteDescriptor, role: Role) -> Self {
        Self {
            provider,
            suite,
            role,
            state: SessionState::Uninitialized,
            keypair: None,
            peer_public_key: None,
            kem_ciphertext: None,
            shared_secret: None,
            session_key: None,
            ciphertext_sent: false,
            send_counter: 0,
            last_received: None,
            nonce_limit: u64::MAX,
            verbose_logging: false,
        }
    }

    /// Create a session with the limits and logging from `config`
    pub fn from_config(
        provider: P,
        suite: SuiteDescriptor,
        role: Role,
        config: &TunnelConfig,
    ) -> Self {
        let mut session = Self::new(provider, suite, role).with_nonce_limit(config.nonce_limit);
        session.verbose_logging = config.verbose_logging;
        session
    }

    /// Cap the number of messages this session may seal
    pub fn with_nonce_limit(mut self, limit: u64) -> Self {
        self.nonce_limit = limit;
        self
    }

    /// Enable verbose logging
    pub fn with_verbose_logging(mut self) -> Self {
        self.verbose_logging = true;
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn suite(&self) -> &SuiteDescriptor {
        &self.suite
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// The responder's ephemeral keypair, until it has been used
    pub fn keypair(&self) -> Option<&KemKeyPair> {
        self.keypair.as_ref()
    }

    pub fn peer_public_key(&self) -> Option<&[u8]> {
        self.peer_public_key.as_deref()
    }

    pub fn kem_ciphertext(&self) -> Option<&[u8]> {
        self.kem_ciphertext.as_deref()
    }

    pub fn session_key(&self) -> Option<&SessionKey> {
        self.session_key.as_ref()
    }

    /// Number of envelopes sealed so far
    pub fn messages_sealed(&self) -> u64 {
        self.send_counter
    }

    /// Responder: generate the ephemeral keypair and return its public key.
    pub fn generate_keypair(&mut self) -> Result<&[u8]> {
        self.require(Role::Responder, SessionState::Uninitialized, "generate keypair")?;

        let material = match self.provider.generate_keypair(self.suite.kem) {
            Ok(material) => material,
            Err(e) => return Err(self.fail(TunnelError::KeyGen(e))),
        };
        self.transition(SessionState::KeysGenerated);
        if self.verbose_logging {
            tracing::debug!(
                suite = %self.suite.id,
                public_key = %hex::encode(&material.public_key),
                "ephemeral keypair generated"
            );
        }

        let keypair = self.keypair.insert(KemKeyPair {
            algorithm: self.suite.kem,
            public_key: material.public_key,
            secret_key: material.secret_key,
            generated_at: SystemTime::now(),
        });
        Ok(&keypair.public_key)
    }

    /// Initiator: encapsulate to the responder's public key and return the
    /// KEM ciphertext.
    pub fn encapsulate(&mut self, peer_public_key: &[u8]) -> Result<&[u8]> {
        self.require(Role::Initiator, SessionState::Uninitialized, "encapsulate")?;

        let expected = self.suite.kem_params().public_key_len;
        if peer_public_key.len() != expected {
            return Err(self.fail(TunnelError::Encapsulation(CryptoError::InvalidLength {
                expected,
                actual: peer_public_key.len(),
            })));
        }

        let encapsulated = match self.provider.encapsulate(self.suite.kem, peer_public_key) {
            Ok(encapsulated) => encapsulated,
            Err(e) => return Err(self.fail(TunnelError::Encapsulation(e))),
        };
        self.peer_public_key = Some(peer_public_key.to_vec());
        self.shared_secret = Some(encapsulated.shared_secret);
        self.transition(SessionState::Encapsulated);

        Ok(self
            .kem_ciphertext
            .insert(encapsulated.ciphertext)
            .as_slice())
    }

    /// Responder: recover the shared secret from the initiator's ciphertext.
    ///
    /// A ciphertext of the wrong length is rejected before the KEM runs.
    /// The ephemeral keypair is erased once used.
    pub fn decapsulate(&mut self, ciphertext: &[u8]) -> Result<()> {
        self.require(Role::Responder, SessionState::KeysGenerated, "decapsulate")?;

        let expected = self.suite.kem_params().ciphertext_len;
        if ciphertext.len() != expected {
            return Err(self.fail(TunnelError::Decapsulation(CryptoError::InvalidLength {
                expected,
                actual: ciphertext.len(),
            })));
        }

        let Some(keypair) = self.keypair.take() else {
            return Err(self.invalid_state("decapsulate"));
        };
        let shared_secret =
            match self
                .provider
                .decapsulate(self.suite.kem, &keypair.secret_key, ciphertext)
            {
                Ok(secret) => secret,
                Err(e) => return Err(self.fail(TunnelError::Decapsulation(e))),
            };
        drop(keypair);

        self.kem_ciphertext = Some(ciphertext.to_vec());
        self.shared_secret = Some(shared_secret);
        self.transition(SessionState::Encapsulated);
        Ok(())
    }

    /// Stretch the shared secret into the session key, then erase the secret.
    pub fn derive_key(&mut self) -> Result<()> {
        if self.state != SessionState::Encapsulated {
            return Err(self.invalid_state("derive key"));
        }
        let Some(shared_secret) = self.shared_secret.take() else {
            return Err(self.invalid_state("derive key"));
        };

        let key_len = self.suite.key_len();
        let context = self.suite.domain_separation.clone();
        let derived =
            match self
                .provider
                .derive(self.suite.kdf, &shared_secret, context.as_bytes(), key_len)
            {
                Ok(key) => key,
                Err(e) => return Err(self.fail(TunnelError::Derivation(e))),
            };
        drop(shared_secret);

        if derived.len() != key_len {
            return Err(self.fail(TunnelError::Derivation(CryptoError::InvalidLength {
                expected: key_len,
                actual: derived.len(),
            })));
        }

        self.session_key = Some(SessionKey {
            key: derived,
            context,
        });
        self.transition(SessionState::KeyDerived);
        Ok(())
    }

    /// Permit seal and open.
    pub fn activate(&mut self) -> Result<()> {
        if self.state != SessionState::KeyDerived {
            return Err(self.invalid_state("activate"));
        }
        self.transition(SessionState::Ready);
        tracing::info!(
            suite = %self.suite.id,
            role = ?self.role,
            post_quantum = self.suite.post_quantum,
            "tunnel session ready"
        );
        Ok(())
    }

    /// Initiator: encapsulate, derive and activate in one step. Returns the
    /// KEM ciphertext, which also rides on the first sealed envelope.
    pub fn initiate(&mut self, peer_public_key: &[u8]) -> Result<Vec<u8>> {
        let ciphertext = self.encapsulate(peer_public_key)?.to_vec();
        self.derive_key()?;
        self.activate()?;
        Ok(ciphertext)
    }

    /// Responder: decapsulate, derive and activate in one step.
    pub fn respond(&mut self, ciphertext: &[u8]) -> Result<()> {
        self.decapsulate(ciphertext)?;
        self.derive_key()?;
        self.activate()
    }

    /// Seal `plaintext` with `associated_data` under a fresh nonce.
    pub fn seal(&mut self, associated_data: &[u8], plaintext: &[u8]) -> Result<MessageEnvelope> {
        if self.state != SessionState::Ready {
            return Err(self.invalid_state("seal"));
        }
        if self.send_counter >= self.nonce_limit {
            return Err(self.fail(TunnelError::NonceExhausted));
        }

        let counter = self.send_counter;
        let nonce = build_nonce(self.role.nonce_prefix(), counter);
        let kem_ciphertext = match self.role {
            Role::Initiator if !self.ciphertext_sent => self.kem_ciphertext.clone(),
            _ => None,
        };
        let suite_id = self.suite.id.wire_code();
        let header = authenticated_header(
            PROTOCOL_VERSION,
            suite_id,
            kem_ciphertext.as_deref(),
            associated_data,
        );

        let sealed = match self.session_key.as_ref() {
            Some(key) => {
                self.provider
                    .seal(self.suite.aead, key.as_bytes(), &nonce, plaintext, &header)
            }
            None => return Err(self.invalid_state("seal")),
        };
        let (ciphertext, tag) = match sealed {
            Ok(sealed) => sealed,
            Err(e) => return Err(self.fail(TunnelError::Encryption(e))),
        };

        // counter < nonce_limit <= u64::MAX
        self.send_counter = counter + 1;
        self.ciphertext_sent = true;

        if self.verbose_logging {
            tracing::debug!(
                suite = %self.suite.id,
                role = ?self.role,
                counter,
                bytes = plaintext.len(),
                carries_kem_ciphertext = kem_ciphertext.is_some(),
                "sealed message"
            );
        }

        Ok(MessageEnvelope {
            version: PROTOCOL_VERSION,
            suite_id,
            kem_ciphertext,
            nonce,
            ciphertext,
            tag,
            associated_data: associated_data.to_vec(),
        })
    }

    /// Verify and decrypt. A responder still in `KeysGenerated` completes
    /// establishment from the envelope's KEM ciphertext first.
    ///
    /// On any verification failure the session fails and no plaintext is
    /// returned.
    pub fn open(&mut self, envelope: &MessageEnvelope) -> Result<Vec<u8>> {
        if self.state.is_terminal() {
            return Err(self.invalid_state("open"));
        }
        if envelope.version != PROTOCOL_VERSION {
            return Err(self.fail(TunnelError::UnsupportedVersion(envelope.version)));
        }
        if envelope.suite_id != self.suite.id.wire_code() {
            let received = SuiteId::from_wire_code(envelope.suite_id)
                .map(|id| id.to_string())
                .unwrap_or_else(|| format!("unknown suite code {:#04x}", envelope.suite_id));
            return Err(self.fail(TunnelError::SuiteMismatch {
                expected: self.suite.id.to_string(),
                received,
            }));
        }

        if let Some(ciphertext) = envelope.kem_ciphertext.as_deref() {
            match (self.role, self.state) {
                (Role::Responder, SessionState::KeysGenerated) => self.respond(ciphertext)?,
                (Role::Responder, SessionState::Ready)
                    if self
                        .kem_ciphertext
                        .as_deref()
                        .is_some_and(|accepted| ct_eq(accepted, ciphertext)) => {}
                _ => return Err(self.invalid_state("accept a KEM ciphertext")),
            }
        }

        if self.state != SessionState::Ready {
            return Err(self.invalid_state("open"));
        }

        let (prefix, counter) = envelope.nonce_parts();
        if prefix != self.role.peer().nonce_prefix() {
            return Err(self.fail(TunnelError::Replay { counter }));
        }
        if self.last_received.is_some_and(|last| counter <= last) {
            return Err(self.fail(TunnelError::Replay { counter }));
        }

        let header = envelope.header();
        let opened = match self.session_key.as_ref() {
            Some(key) => self.provider.open(
                self.suite.aead,
                key.as_bytes(),
                &envelope.nonce,
                &envelope.ciphertext,
                &envelope.tag,
                &header,
            ),
            None => return Err(self.invalid_state("open")),
        };
        let plaintext = match opened {
            Ok(plaintext) => plaintext,
            Err(_) => return Err(self.fail(TunnelError::Integrity)),
        };
        self.last_received = Some(counter);

        if self.verbose_logging {
            tracing::debug!(
                suite = %self.suite.id,
                role = ?self.role,
                counter,
                bytes = plaintext.len(),
                "opened message"
            );
        }
        Ok(plaintext)
    }

    /// Tear down a live session, erasing all key material.
    pub fn close(&mut self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(self.invalid_state("close"));
        }
        self.erase();
        self.transition(SessionState::Closed);
        Ok(())
    }

    /// Abandon the session from any state. Key material is erased.
    pub fn abort(&mut self) {
        self.erase();
        if self.state != SessionState::Failed {
            self.transition(SessionState::Failed);
        }
    }

    fn require(&self, role: Role, state: SessionState, operation: &'static str) -> Result<()> {
        if self.role == role && self.state == state {
            Ok(())
        } else {
            Err(self.invalid_state(operation))
        }
    }

    fn invalid_state(&self, operation: &'static str) -> TunnelError {
        TunnelError::InvalidState {
            state: self.state,
            operation,
        }
    }

    fn fail(&mut self, error: TunnelError) -> TunnelError {
        tracing::warn!(
            suite = %self.suite.id,
            role = ?self.role,
            state = %self.state,
            %error,
            "tunnel session failed"
        );
        self.erase();
        self.state = SessionState::Failed;
        error
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(
            suite = %self.suite.id,
            role = ?self.role,
            from = %self.state,
            to = %next,
            "session transition"
        );
        self.state = next;
    }

    fn erase(&mut self) {
        self.keypair = None;
        self.shared_secret = None;
        self.session_key = None;
    }
}
