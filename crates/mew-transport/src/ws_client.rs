// SPDX-License-Identifier: MIT OR Apache-2.0
//! Outbound WebSocket transport: dials a gateway's `/ws` URL from outside
//! the process (§6 — "bidirectional WebSocket-like channel at a gateway
//! URL"). The server side of the same connection is [`crate::WsTransport`],
//! wrapping axum's upgraded socket; this is its client-side counterpart,
//! used by the participant runtime and by test drivers.

use crate::{Transport, TransportError};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use mew_envelope::{Envelope, EnvelopeCodec};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] that dials a gateway URL over WebSocket.
pub struct WsClientTransport {
    socket: Option<Socket>,
}

impl WsClientTransport {
    /// Connect to `url` (e.g. `ws://127.0.0.1:8080/ws`), optionally carrying
    /// a bearer token in the `Authorization` header (§6 — it MUST match the
    /// token in the subsequent join envelope).
    pub async fn connect(url: &str, bearer_token: Option<&str>) -> Result<Self, TransportError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| TransportError::Io(std::io::Error::other(e.to_string())))?;
        if let Some(token) = bearer_token {
            request.headers_mut().insert(
                "Authorization",
                format!("Bearer {token}")
                    .parse()
                    .map_err(|_| TransportError::Io(std::io::Error::other("invalid bearer token header")))?,
            );
        }
        let (socket, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| TransportError::Io(std::io::Error::other(e.to_string())))?;
        Ok(Self { socket: Some(socket) })
    }
}

#[async_trait]
impl Transport for WsClientTransport {
    async fn send(&mut self, envelope: Envelope) -> Result<(), TransportError> {
        let Some(socket) = self.socket.as_mut() else {
            return Err(TransportError::Closed);
        };
        let frame = EnvelopeCodec::encode_frame(&envelope)?;
        socket.send(Message::Text(frame.into())).await.map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> Result<Option<Envelope>, TransportError> {
        let Some(socket) = self.socket.as_mut() else {
            return Ok(None);
        };
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(EnvelopeCodec::decode(text.as_str())?)),
                Some(Ok(Message::Close(_))) | None => {
                    self.socket = None;
                    return Ok(None);
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_))) => continue,
                Some(Err(_)) => {
                    self.socket = None;
                    return Err(TransportError::Closed);
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if let Some(mut socket) = self.socket.take() {
            let _ = socket.close(None).await;
        }
        Ok(())
    }
}
