// SPDX-License-Identifier: MIT OR Apache-2.0
//! WebSocket transport: one JSON text frame per envelope.

use crate::{Transport, TransportError};
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use mew_envelope::{Envelope, EnvelopeCodec};

/// A [`Transport`] backed by an upgraded axum [`WebSocket`].
pub struct WsTransport {
    socket: Option<WebSocket>,
    max_bytes: usize,
}

impl WsTransport {
    /// Wrap an upgraded WebSocket connection, rejecting inbound frames
    /// larger than [`split::DEFAULT_MAX_BYTES`].
    #[must_use]
    pub fn new(socket: WebSocket) -> Self {
        Self {
            socket: Some(socket),
            max_bytes: split::DEFAULT_MAX_BYTES,
        }
    }

    /// As [`Self::new`], with an explicit maximum frame size.
    #[must_use]
    pub fn with_max_bytes(socket: WebSocket, max_bytes: usize) -> Self {
        Self { socket: Some(socket), max_bytes }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, envelope: Envelope) -> Result<(), TransportError> {
        let Some(socket) = self.socket.as_mut() else {
            return Err(TransportError::Closed);
        };
        let frame = EnvelopeCodec::encode_frame(&envelope)?;
        socket
            .send(Message::Text(frame.into()))
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> Result<Option<Envelope>, TransportError> {
        let Some(socket) = self.socket.as_mut() else {
            return Ok(None);
        };
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => {
                    let envelope = EnvelopeCodec::decode_checked(text.as_str(), self.max_bytes)?;
                    return Ok(Some(envelope));
                }
                Some(Ok(Message::Close(_))) | None => {
                    self.socket = None;
                    return Ok(None);
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_))) => continue,
                Some(Err(_)) => {
                    self.socket = None;
                    return Err(TransportError::Closed);
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if let Some(mut socket) = self.socket.take() {
            let _ = socket.close().await;
        }
        Ok(())
    }
}

// Split-sink/stream convenience wrappers, used when the WebSocket's two
// halves must live on separate tasks (one read-loop, one write-loop).
pub use split::{WsReadHalf, WsWriteHalf};

mod split {
    use super::*;
    use futures::stream::{SplitSink, SplitStream};

    /// The default maximum accepted envelope size, mirroring
    /// `mew_config::GatewayConfig`'s default (kept here too so
    /// [`split`]-less callers still get a bound).
    pub const DEFAULT_MAX_BYTES: usize = 1024 * 1024;

    /// The receive half of a split [`WebSocket`].
    pub struct WsReadHalf {
        stream: SplitStream<WebSocket>,
        max_bytes: usize,
    }

    /// The send half of a split [`WebSocket`].
    pub struct WsWriteHalf {
        sink: SplitSink<WebSocket, Message>,
    }

    /// Split a [`WebSocket`] into independent read/write halves. Frames
    /// larger than `max_bytes` are rejected with [`TransportError::Decode`]
    /// rather than handed to the JSON parser (§4.1, §8 boundary behavior).
    #[must_use]
    pub fn split(socket: WebSocket, max_bytes: usize) -> (WsReadHalf, WsWriteHalf) {
        let (sink, stream) = socket.split();
        (WsReadHalf { stream, max_bytes }, WsWriteHalf { sink })
    }

    impl WsReadHalf {
        /// Receive the next envelope, skipping control frames. A
        /// `TransportError::Decode` (including an oversized frame) is
        /// recoverable — the caller should emit `system/error` and keep the
        /// connection open; other errors mean the connection is gone.
        pub async fn recv(&mut self) -> Result<Option<Envelope>, TransportError> {
            loop {
                match self.stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        return Ok(Some(EnvelopeCodec::decode_checked(text.as_str(), self.max_bytes)?));
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(None),
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_))) => continue,
                    Some(Err(_)) => return Err(TransportError::Closed),
                }
            }
        }
    }

    impl WsWriteHalf {
        /// Send one envelope as a JSON text frame.
        pub async fn send(&mut self, envelope: &Envelope) -> Result<(), TransportError> {
            let frame = EnvelopeCodec::encode_frame(envelope)?;
            self.sink
                .send(Message::Text(frame.into()))
                .await
                .map_err(|_| TransportError::Closed)
        }

        /// Close the underlying sink.
        pub async fn close(&mut self) -> Result<(), TransportError> {
            let _ = self.sink.close().await;
            Ok(())
        }
    }
}
