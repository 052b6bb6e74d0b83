//! Framed adapter carrying key offers and envelopes over a byte stream
//!
//! ```text
//! Responder                                  Initiator
//!     │ ──── KeyOffer { suite_id, public_key } ──▶ │  check suite, encapsulate
//!     │ ◀──── Envelope { kem_ciphertext, .. } ──── │  first data message
//!     │ ◀───────────── Envelope { .. } ─────────── │
//!     │ ────────────── Envelope { .. } ──────────▶ │
//! ```

use std::sync::Arc;

use bincode::Options;
use bytes::Bytes;
use crypto::PrimitiveProvider;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::config::TunnelConfig;
use crate::envelope::{decode_bounded, MessageEnvelope};
use crate::error::{Result, TunnelError};
use crate::registry::SuiteRegistry;
use crate::session::{Role, SessionState, TunnelSession};
use crate::suite::SuiteId;

/// First frame from the responder
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyOffer {
    pub suite_id: u8,
    pub public_key: Vec<u8>,
}

/// A tunnel session bound to a framed stream
pub struct TunnelStream<S, P> {
    framed: Framed<S, LengthDelimitedCodec>,
    session: TunnelSession<P>,
    max_envelope_size: u64,
    verbose_logging: bool,
}

fn framed_stream<S: AsyncRead + AsyncWrite>(
    socket: S,
    config: &TunnelConfig,
) -> Framed<S, LengthDelimitedCodec> {
    let mut codec = LengthDelimitedCodec::new();
    codec.set_max_frame_length(usize::try_from(config.max_envelope_size).unwrap_or(usize::MAX));
    Framed::new(socket, codec)
}

fn frame_bincode(limit: u64) -> impl Options {
    bincode::DefaultOptions::new().with_limit(limit)
}

impl<S, P> TunnelStream<S, P>
where
    S: AsyncRead + AsyncWrite + Unpin,
    P: PrimitiveProvider,
{
    /// Responder side: generate the ephemeral keypair and offer it.
    ///
    /// The session becomes `Ready` when the first envelope arrives.
    pub async fn accept(
        config: &TunnelConfig,
        registry: &Arc<SuiteRegistry>,
        suite: SuiteId,
        provider: P,
        socket: S,
    ) -> Result<Self> {
        let descriptor = registry.lookup(suite)?.clone();
        let mut session = TunnelSession::from_config(provider, descriptor, Role::Responder, config);
        let mut framed = framed_stream(socket, config);

        let offer = KeyOffer {
            suite_id: suite.wire_code(),
            public_key: session.generate_keypair()?.to_vec(),
        };
        let bytes = frame_bincode(config.max_envelope_size).serialize(&offer)?;

        timeout(config.handshake_timeout(), framed.send(Bytes::from(bytes)))
            .await
            .map_err(|_| TunnelError::Timeout)??;

        if config.verbose_logging {
            tracing::debug!(suite = %suite, "sent key offer");
        }

        Ok(Self {
            framed,
            session,
            max_envelope_size: config.max_envelope_size,
            verbose_logging: config.verbose_logging,
        })
    }

    /// Initiator side: read the offer, check its suite, encapsulate.
    pub async fn connect(
        config: &TunnelConfig,
        registry: &Arc<SuiteRegistry>,
        expected: SuiteId,
        provider: P,
        socket: S,
    ) -> Result<Self> {
        let mut framed = framed_stream(socket, config);

        let frame = timeout(config.handshake_timeout(), framed.next())
            .await
            .map_err(|_| TunnelError::Timeout)?
            .ok_or(TunnelError::ConnectionClosed)??;
        let offer: KeyOffer = decode_bounded(&frame, config.max_envelope_size)?;

        let descriptor = registry.lookup_wire(offer.suite_id)?;
        if descriptor.id != expected {
            return Err(TunnelError::SuiteMismatch {
                expected: expected.to_string(),
                received: descriptor.id.to_string(),
            });
        }

        let mut session =
            TunnelSession::from_config(provider, descriptor.clone(), Role::Initiator, config);
        session.initiate(&offer.public_key)?;

        if config.verbose_logging {
            tracing::debug!(
                suite = %expected,
                peer_public_key = %hex::encode(&offer.public_key),
                "accepted key offer"
            );
        }

        Ok(Self {
            framed,
            session,
            max_envelope_size: config.max_envelope_size,
            verbose_logging: config.verbose_logging,
        })
    }

    pub fn session(&self) -> &TunnelSession<P> {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Seal and send one message
    pub async fn send(&mut self, associated_data: &[u8], plaintext: &[u8]) -> Result<()> {
        let envelope = self.session.seal(associated_data, plaintext)?;
        let bytes = envelope.encode(self.max_envelope_size)?;
        self.framed.send(Bytes::from(bytes)).await?;
        Ok(())
    }

    /// Receive the next envelope without opening it
    pub async fn recv_envelope(&mut self) -> Result<Option<MessageEnvelope>> {
        match self.framed.next().await {
            Some(Ok(frame)) => Ok(Some(MessageEnvelope::decode(
                &frame,
                self.max_envelope_size,
            )?)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// Receive and open the next message. `None` when the peer has closed.
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>> {
        let Some(envelope) = self.recv_envelope().await? else {
            return Ok(None);
        };
        let plaintext = self.session.open(&envelope)?;
        if self.verbose_logging {
            tracing::debug!(
                suite = %self.session.suite().id,
                aad = %hex::encode(&envelope.associated_data),
                "received message"
            );
        }
        Ok(Some(plaintext))
    }

    /// Close the session and the stream
    pub async fn close(mut self) -> Result<()> {
        self.session.close()?;
        SinkExt::<Bytes>::close(&mut self.framed).await?;
        Ok(())
    }
}
