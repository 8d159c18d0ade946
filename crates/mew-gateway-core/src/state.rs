// SPDX-License-Identifier: MIT OR Apache-2.0
//! Process-wide shared state: the registry, the audit log, the compiled
//! space configuration, the stream-id table, and the per-sender dedup
//! window (§4.4.2 ¶1, §4.4.4).

use mew_capability::{Pattern, PatternError, PatternSpec};
use mew_config::{CapabilityEntry, GatewayConfig, KindPattern};
use mew_registry::Registry;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

const DEDUP_WINDOW: usize = 256;

/// One open stream sub-channel (§4.4.4).
#[derive(Debug, Clone)]
pub struct StreamState {
    /// Participant that issued the `stream/request`.
    pub owner: String,
    /// Participants authorized to write frames into this stream.
    pub writers: Vec<String>,
    /// Participants the `stream/open` (and subsequent frames) are delivered to.
    pub recipients: Vec<String>,
}

/// Shared gateway state: one instance per running `mewd` process.
pub struct GatewayState {
    /// The space this gateway instance serves.
    pub config: GatewayConfig,
    /// The authoritative participant table.
    pub registry: Registry,
    /// The append-only audit sink.
    pub audit: mew_audit::AuditLogger,
    streams: Mutex<HashMap<String, StreamState>>,
    next_stream_id: AtomicU64,
    dedup: Mutex<HashMap<String, VecDeque<String>>>,
}

impl GatewayState {
    /// Construct gateway state over an already-loaded config, registry, and
    /// audit logger.
    #[must_use]
    pub fn new(config: GatewayConfig, registry: Registry, audit: mew_audit::AuditLogger) -> Self {
        Self {
            config,
            registry,
            audit,
            streams: Mutex::new(HashMap::new()),
            next_stream_id: AtomicU64::new(1),
            dedup: Mutex::new(HashMap::new()),
        }
    }

    /// Compile the space-config capabilities for `participant_id`, if any
    /// are configured.
    pub fn configured_patterns(&self, participant_id: &str) -> Result<Vec<Pattern>, PatternError> {
        let Some(participant) = self.config.participants.get(participant_id) else {
            return Ok(Vec::new());
        };
        compile_capability_entries(&participant.capabilities)
    }

    /// `true` if `envelope_id` has not been seen from `participant_id`
    /// within the dedup window; records it either way.
    pub fn observe_envelope_id(&self, participant_id: &str, envelope_id: &str) -> bool {
        let mut dedup = self.dedup.lock().expect("dedup lock poisoned");
        let seen = dedup.entry(participant_id.to_string()).or_default();
        if seen.iter().any(|id| id == envelope_id) {
            return false;
        }
        seen.push_back(envelope_id.to_string());
        if seen.len() > DEDUP_WINDOW {
            seen.pop_front();
        }
        true
    }

    /// Allocate a fresh, gateway-unique stream id.
    pub fn allocate_stream_id(&self) -> String {
        let n = self.next_stream_id.fetch_add(1, Ordering::Relaxed);
        format!("s-{n}")
    }

    /// Open a stream and record its writers/recipients.
    pub fn open_stream(&self, stream_id: String, state: StreamState) {
        self.streams.lock().expect("streams lock poisoned").insert(stream_id, state);
    }

    /// `true` if `participant_id` is an authorized writer for `stream_id`.
    #[must_use]
    pub fn is_authorized_writer(&self, stream_id: &str, participant_id: &str) -> bool {
        self.streams
            .lock()
            .expect("streams lock poisoned")
            .get(stream_id)
            .is_some_and(|s| s.writers.iter().any(|w| w == participant_id))
    }

    /// The recipients a stream's frames fan out to, if the stream is open.
    #[must_use]
    pub fn stream_recipients(&self, stream_id: &str) -> Option<Vec<String>> {
        self.streams
            .lock()
            .expect("streams lock poisoned")
            .get(stream_id)
            .map(|s| s.recipients.clone())
    }

    /// Close (reclaim) a stream id.
    pub fn close_stream(&self, stream_id: &str) {
        self.streams.lock().expect("streams lock poisoned").remove(stream_id);
    }

    /// Close every stream owned by, or authorized-writer-naming, a
    /// disconnecting participant (§4.4.4 "participant disconnect" reclaim).
    pub fn reclaim_streams_for(&self, participant_id: &str) {
        let mut streams = self.streams.lock().expect("streams lock poisoned");
        streams.retain(|_, s| s.owner != participant_id);
    }
}

/// Compile a list of space-config [`CapabilityEntry`] rules into matcher
/// [`Pattern`]s. Lives here (not in `mew-config`) so the config crate stays
/// free of a `mew-capability` dependency.
pub fn compile_capability_entries(entries: &[CapabilityEntry]) -> Result<Vec<Pattern>, PatternError> {
    entries
        .iter()
        .map(|entry| {
            Pattern::compile(&PatternSpec {
                kind: kind_pattern_to_vec(&entry.kind),
                to: entry.to.as_ref().map(kind_pattern_to_vec),
                payload: entry.payload.clone(),
            })
        })
        .collect()
}

fn kind_pattern_to_vec(pattern: &KindPattern) -> Vec<String> {
    match pattern {
        KindPattern::One(s) => vec![s.clone()],
        KindPattern::Many(items) => items.clone(),
    }
}
