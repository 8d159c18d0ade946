//! Stateless JSON(L) encode/decode for [`Envelope`](crate::Envelope) values.

use crate::{Envelope, EnvelopeError};
use std::io::{BufRead, Write};

/// Stateless codec for encoding/decoding [`Envelope`] messages.
///
/// Mirrors the shape of a JSONL sidecar protocol codec: one envelope per
/// line for framed transports (child-process stdio), or a single `encode`/
/// `decode` call for transports that already frame messages (WebSocket text
/// frames, HTTP bodies).
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeCodec;

impl EnvelopeCodec {
    /// Serialize an [`Envelope`] to a newline-terminated JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Decode`] if the envelope cannot be serialized.
    pub fn encode(envelope: &Envelope) -> Result<String, EnvelopeError> {
        let mut s = serde_json::to_string(envelope)?;
        s.push('\n');
        Ok(s)
    }

    /// Serialize an [`Envelope`] to a bare JSON string (no trailing newline),
    /// for transports that frame messages themselves (WebSocket text frames).
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Decode`] if the envelope cannot be serialized.
    pub fn encode_frame(envelope: &Envelope) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(envelope)?)
    }

    /// Deserialize a single JSON line/frame into an [`Envelope`].
    ///
    /// Rejects envelopes missing `id` or `kind`, and envelopes whose
    /// `correlation_id` is present but not a list. `protocol` is optional on
    /// ingress (the gateway stamps it before egress if absent).
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Decode`] if the line is not valid JSON or
    /// does not satisfy the envelope shape contract.
    pub fn decode(line: &str) -> Result<Envelope, EnvelopeError> {
        Ok(serde_json::from_str::<Envelope>(line)?)
    }

    /// As [`Self::decode`], but first rejects frames larger than `max_bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::TooLarge`] if `line` exceeds `max_bytes`, or
    /// [`EnvelopeError::Decode`] per [`Self::decode`].
    pub fn decode_checked(line: &str, max_bytes: usize) -> Result<Envelope, EnvelopeError> {
        if line.len() > max_bytes {
            return Err(EnvelopeError::TooLarge {
                size: line.len(),
                max: max_bytes,
            });
        }
        Self::decode(line)
    }

    /// Return a lazy iterator that reads JSONL lines from `reader`, skipping
    /// blank lines, and deserializing each into an [`Envelope`].
    pub fn decode_stream(
        reader: impl BufRead,
    ) -> impl Iterator<Item = Result<Envelope, EnvelopeError>> {
        reader.lines().filter_map(|line_result| match line_result {
            Err(e) => Some(Err(EnvelopeError::Io(e))),
            Ok(line) => {
                if line.trim().is_empty() {
                    None
                } else {
                    Some(Self::decode(line.trim()))
                }
            }
        })
    }

    /// Write a single [`Envelope`] as a newline-terminated JSON line.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError`] on serialization or I/O failure.
    pub fn encode_to_writer(
        writer: &mut impl Write,
        envelope: &Envelope,
    ) -> Result<(), EnvelopeError> {
        let line = Self::encode(envelope)?;
        writer.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Write multiple [`Envelope`]s as consecutive JSONL lines.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError`] on serialization or I/O failure.
    pub fn encode_many_to_writer(
        writer: &mut impl Write,
        envelopes: &[Envelope],
    ) -> Result<(), EnvelopeError> {
        for env in envelopes {
            Self::encode_to_writer(writer, env)?;
        }
        Ok(())
    }
}
