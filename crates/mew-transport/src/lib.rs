// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pluggable transport adapters between the gateway's envelope routing core
//! and the outside world.
//!
//! All three adapters speak the same [`Transport`] trait; the gateway core
//! never branches on transport kind once a connection is established.

#![deny(unsafe_code)]

mod child_process;
mod http_inject;
pub mod ws;
mod ws_client;

pub use child_process::{ChildProcessConfig, ChildProcessTransport};
pub use http_inject::HttpInjectTransport;
pub use ws::WsTransport;
pub use ws_client::WsClientTransport;

use async_trait::async_trait;
use mew_envelope::Envelope;
use mew_error::{ErrorCode, MewError};
use thiserror::Error;

/// Errors a transport adapter can surface.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The underlying connection was closed, locally or by the peer.
    #[error("transport closed")]
    Closed,
    /// A frame could not be decoded as an envelope.
    #[error("envelope decode error: {0}")]
    Decode(#[from] mew_envelope::EnvelopeError),
    /// An I/O error occurred on the underlying connection.
    #[error("transport io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TransportError> for MewError {
    fn from(err: TransportError) -> Self {
        let code = match &err {
            TransportError::Closed | TransportError::Io(_) => ErrorCode::TransportClosed,
            TransportError::Decode(_) => ErrorCode::ProtocolInvalidEnvelope,
        };
        MewError::new(code, err.to_string())
    }
}

/// A bidirectional envelope stream. Implementors own exactly one
/// connection; `send`/`recv` are not required to be called concurrently
/// from multiple tasks (the gateway core owns one reader task and one
/// writer task per participant, each holding a different half where the
/// implementation supports splitting).
#[async_trait]
pub trait Transport: Send {
    /// Send one envelope. Returns [`TransportError::Closed`] if the
    /// connection is already gone.
    async fn send(&mut self, envelope: Envelope) -> Result<(), TransportError>;

    /// Receive the next inbound envelope, or `None` on graceful close.
    async fn recv(&mut self) -> Result<Option<Envelope>, TransportError>;

    /// Close the connection. Idempotent.
    async fn close(&mut self) -> Result<(), TransportError>;
}
