// SPDX-License-Identifier: MIT OR Apache-2.0
//! One-shot HTTP injection transport: `POST /participants/{id}/messages`
//! constructs an ephemeral inbound envelope and the gateway's routing
//! response is returned synchronously as the HTTP body.

use crate::{Transport, TransportError};
use async_trait::async_trait;
use mew_envelope::Envelope;
use std::collections::VecDeque;

/// A [`Transport`] that yields exactly one inbound envelope (the injected
/// request) and collects every envelope routed back to the caller during
/// that request's synchronous lifetime.
pub struct HttpInjectTransport {
    inbound: Option<Envelope>,
    outbound: VecDeque<Envelope>,
    closed: bool,
}

impl HttpInjectTransport {
    /// Create a transport that will yield `envelope` once from [`recv`](Transport::recv),
    /// then behave as closed.
    #[must_use]
    pub fn new(envelope: Envelope) -> Self {
        Self {
            inbound: Some(envelope),
            outbound: VecDeque::new(),
            closed: false,
        }
    }

    /// Drain every envelope sent back through this transport, in order.
    pub fn take_responses(&mut self) -> Vec<Envelope> {
        self.outbound.drain(..).collect()
    }
}

#[async_trait]
impl Transport for HttpInjectTransport {
    async fn send(&mut self, envelope: Envelope) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.outbound.push_back(envelope);
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Envelope>, TransportError> {
        Ok(self.inbound.take())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        Ok(())
    }
}
