// SPDX-License-Identifier: MIT OR Apache-2.0
//! Append-only structured audit logging for envelope routing and capability
//! decisions.
//!
//! Two JSONL streams live side by side in the configured audit directory:
//! `envelopes.jsonl` (one line per routing event) and `decisions.jsonl` (one
//! line per capability check). Both are rotated by size. The gateway only
//! ever appends; external tailers read the files directly.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;

/// Errors surfaced while writing audit records.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The audit directory could not be created or written to.
    #[error("audit io error: {0}")]
    Io(#[from] std::io::Error),
    /// A record could not be serialized to JSON.
    #[error("audit serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A single routing event for one envelope/recipient pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeRecord {
    /// When the event was recorded.
    pub ts: DateTime<Utc>,
    /// The envelope id this event concerns.
    pub envelope_id: String,
    /// Sender participant id.
    pub from: String,
    /// Recipient this record applies to, absent for the initial `received`
    /// event (which is recorded once per envelope, not per recipient).
    pub recipient: Option<String>,
    /// The routing outcome.
    pub event: EnvelopeEvent,
}

/// The kind of routing event being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeEvent {
    /// The envelope was accepted into the routing pipeline.
    Received,
    /// The envelope was handed to a recipient's outbound queue.
    Delivered,
    /// The envelope was not delivered (capability denial, unknown
    /// recipient, or backpressure drop).
    Rejected,
}

/// Where a matched capability pattern came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedSource {
    /// From the participant's space-config capabilities.
    Configured,
    /// From a dynamic `capability/grant`.
    Granted,
}

/// The outcome of a single capability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionResult {
    /// The sender held a matching capability.
    Allowed,
    /// No capability in the sender's effective set matched.
    Denied,
}

/// A single capability-check record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// When the check was performed.
    pub ts: DateTime<Utc>,
    /// The envelope id being checked.
    pub envelope_id: String,
    /// The participant whose capabilities were checked.
    pub participant: String,
    /// A human-readable description of the capability that was required
    /// (typically the envelope's kind).
    pub required_capability: String,
    /// The pattern id that matched, if any.
    pub matched_capability: Option<u64>,
    /// Where the matching pattern came from, if any.
    pub matched_source: Option<MatchedSource>,
    /// Allow or deny.
    pub result: DecisionResult,
}

struct RotatingWriter {
    dir: PathBuf,
    stem: &'static str,
    max_bytes: u64,
    file: File,
    written: u64,
}

impl RotatingWriter {
    async fn open(dir: &Path, stem: &'static str, max_bytes: u64) -> Result<Self, AuditError> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{stem}.jsonl"));
        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        let written = file.metadata().await?.len();
        Ok(Self {
            dir: dir.to_path_buf(),
            stem,
            max_bytes,
            file,
            written,
        })
    }

    async fn append_line(&mut self, line: &str) -> Result<(), AuditError> {
        if self.written >= self.max_bytes {
            self.rotate().await?;
        }
        self.file.write_all(line.as_bytes()).await?;
        self.file.write_all(b"\n").await?;
        self.file.flush().await?;
        self.written += line.len() as u64 + 1;
        Ok(())
    }

    async fn rotate(&mut self) -> Result<(), AuditError> {
        let active = self.dir.join(format!("{}.jsonl", self.stem));
        let ts = chrono::Utc::now().format("%Y%m%dT%H%M%S%.f");
        let rotated = self.dir.join(format!("{}.{}.jsonl", self.stem, ts));
        tokio::fs::rename(&active, &rotated).await?;
        self.file = OpenOptions::new().create(true).append(true).open(&active).await?;
        self.written = 0;
        Ok(())
    }
}

/// An append-only audit sink writing `envelopes.jsonl` and
/// `decisions.jsonl` into a configured directory.
pub struct AuditLogger {
    envelopes: Arc<Mutex<RotatingWriter>>,
    decisions: Arc<Mutex<RotatingWriter>>,
}

impl AuditLogger {
    /// Open (or create) the two audit streams under `dir`, using the
    /// default rotation threshold.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, AuditError> {
        Self::open_with_max_bytes(dir, DEFAULT_MAX_BYTES).await
    }

    /// Open the two audit streams under `dir`, rotating each at
    /// `max_bytes`.
    pub async fn open_with_max_bytes(dir: impl AsRef<Path>, max_bytes: u64) -> Result<Self, AuditError> {
        let dir = dir.as_ref();
        let envelopes = RotatingWriter::open(dir, "envelopes", max_bytes).await?;
        let decisions = RotatingWriter::open(dir, "decisions", max_bytes).await?;
        Ok(Self {
            envelopes: Arc::new(Mutex::new(envelopes)),
            decisions: Arc::new(Mutex::new(decisions)),
        })
    }

    /// Append one routing-event record.
    pub async fn record_envelope(&self, record: EnvelopeRecord) -> Result<(), AuditError> {
        let line = serde_json::to_string(&record)?;
        self.envelopes.lock().await.append_line(&line).await
    }

    /// Append one capability-decision record.
    pub async fn record_decision(&self, record: DecisionRecord) -> Result<(), AuditError> {
        let line = serde_json::to_string(&record)?;
        self.decisions.lock().await.append_line(&line).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn envelope_record(event: EnvelopeEvent) -> EnvelopeRecord {
        EnvelopeRecord {
            ts: Utc::now(),
            envelope_id: "env-1".into(),
            from: "agent-a".into(),
            recipient: Some("agent-b".into()),
            event,
        }
    }

    fn decision_record(result: DecisionResult) -> DecisionRecord {
        DecisionRecord {
            ts: Utc::now(),
            envelope_id: "env-1".into(),
            participant: "agent-a".into(),
            required_capability: "chat".into(),
            matched_capability: Some(1),
            matched_source: Some(MatchedSource::Configured),
            result,
        }
    }

    #[tokio::test]
    async fn records_append_as_jsonl_lines() {
        let dir = tempdir().unwrap();
        let logger = AuditLogger::open(dir.path()).await.unwrap();
        logger.record_envelope(envelope_record(EnvelopeEvent::Received)).await.unwrap();
        logger.record_envelope(envelope_record(EnvelopeEvent::Delivered)).await.unwrap();
        logger.record_decision(decision_record(DecisionResult::Allowed)).await.unwrap();

        let envelopes = tokio::fs::read_to_string(dir.path().join("envelopes.jsonl")).await.unwrap();
        assert_eq!(envelopes.lines().count(), 2);
        for line in envelopes.lines() {
            serde_json::from_str::<EnvelopeRecord>(line).unwrap();
        }

        let decisions = tokio::fs::read_to_string(dir.path().join("decisions.jsonl")).await.unwrap();
        assert_eq!(decisions.lines().count(), 1);
    }

    #[tokio::test]
    async fn rotates_when_max_bytes_exceeded() {
        let dir = tempdir().unwrap();
        let logger = AuditLogger::open_with_max_bytes(dir.path(), 64).await.unwrap();
        for _ in 0..10 {
            logger.record_envelope(envelope_record(EnvelopeEvent::Received)).await.unwrap();
        }
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert!(names.iter().any(|n| n.starts_with("envelopes.") && n != "envelopes.jsonl"));
        assert!(names.contains(&"envelopes.jsonl".to_string()));
    }

    #[tokio::test]
    async fn reopen_picks_up_existing_file_length() {
        let dir = tempdir().unwrap();
        {
            let logger = AuditLogger::open(dir.path()).await.unwrap();
            logger.record_envelope(envelope_record(EnvelopeEvent::Received)).await.unwrap();
        }
        {
            let logger = AuditLogger::open(dir.path()).await.unwrap();
            logger.record_envelope(envelope_record(EnvelopeEvent::Delivered)).await.unwrap();
        }
        let envelopes = tokio::fs::read_to_string(dir.path().join("envelopes.jsonl")).await.unwrap();
        assert_eq!(envelopes.lines().count(), 2);
    }
}
