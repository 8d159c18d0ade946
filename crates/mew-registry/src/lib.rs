// SPDX-License-Identifier: MIT OR Apache-2.0
//! The participant registry: the authoritative in-memory map from
//! participant id to runtime state.
//!
//! Mutating operations serialize per participant id (each entry owns its own
//! interior mutability); reads — in particular [`Registry::iter_connected`] —
//! take a copy-on-publish snapshot so broadcast fan-out never blocks on a
//! writer.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use dashmap::DashMap;
use mew_capability::Pattern;
use mew_envelope::Envelope;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// ParticipantStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a connected (or recently connected) participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantStatus {
    /// Normal operation.
    Active,
    /// Paused via `participant/pause`; not consuming new work.
    Paused,
    /// Performing a best-effort context reduction (`participant/compact`).
    Compacting,
    /// Tearing down after `participant/shutdown`.
    ShuttingDown,
    /// No channel attached.
    Disconnected,
}

/// Advisory, gateway-opaque usage counters reported by the participant.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextCounters {
    /// Messages processed since the last `participant/clear`.
    pub messages: u64,
    /// Tokens consumed since the last `participant/clear`.
    pub tokens: u64,
}

// ---------------------------------------------------------------------------
// GrantRecord
// ---------------------------------------------------------------------------

/// A dynamic capability grant applied to a participant.
#[derive(Clone)]
pub struct GrantRecord {
    /// Unique identifier for this grant. Revocation and deduplication key
    /// off this id, not pattern equivalence.
    pub grant_id: String,
    /// Participant this grant applies to.
    pub recipient: String,
    /// Capability patterns this grant adds.
    pub capabilities: Vec<Pattern>,
    /// Participant id of the granter.
    pub granted_by: String,
    /// When the grant was recorded.
    pub granted_at: chrono::DateTime<chrono::Utc>,
    /// Optional human-readable justification.
    pub reason: Option<String>,
}

// ---------------------------------------------------------------------------
// ParticipantState
// ---------------------------------------------------------------------------

/// Runtime state for a single connected (or disconnected-but-remembered)
/// participant.
pub struct ParticipantState {
    /// Stable participant identifier.
    pub id: String,
    /// Optional human-readable display name from space config.
    pub display_name: Option<String>,
    /// Capabilities configured for this participant in the space config.
    /// Immutable for the lifetime of the gateway process.
    configured_capabilities: Vec<Pattern>,
    /// Capabilities granted dynamically, keyed by grant id.
    granted: StdMutex<HashMap<String, GrantRecord>>,
    /// Outbound delivery queue. `None` when no transport is attached.
    outbound: StdMutex<Option<mpsc::Sender<Envelope>>>,
    status: StdMutex<ParticipantStatus>,
    counters: StdMutex<ContextCounters>,
}

impl ParticipantState {
    fn new(id: String, display_name: Option<String>, configured_capabilities: Vec<Pattern>) -> Self {
        Self {
            id,
            display_name,
            configured_capabilities,
            granted: StdMutex::new(HashMap::new()),
            outbound: StdMutex::new(None),
            status: StdMutex::new(ParticipantStatus::Disconnected),
            counters: StdMutex::new(ContextCounters::default()),
        }
    }

    /// The current lifecycle status.
    #[must_use]
    pub fn status(&self) -> ParticipantStatus {
        *self.status.lock().expect("status lock poisoned")
    }

    /// Overwrite the lifecycle status.
    pub fn set_status(&self, status: ParticipantStatus) {
        *self.status.lock().expect("status lock poisoned") = status;
    }

    /// `true` if a transport channel is currently attached.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.outbound.lock().expect("outbound lock poisoned").is_some()
    }

    /// Clone of the outbound sender, if a channel is attached.
    #[must_use]
    pub fn outbound_sender(&self) -> Option<mpsc::Sender<Envelope>> {
        self.outbound.lock().expect("outbound lock poisoned").clone()
    }

    /// Current advisory usage counters.
    #[must_use]
    pub fn counters(&self) -> ContextCounters {
        *self.counters.lock().expect("counters lock poisoned")
    }

    /// Reset usage counters to zero (`participant/clear`).
    pub fn clear_counters(&self) {
        *self.counters.lock().expect("counters lock poisoned") = ContextCounters::default();
    }

    /// Advance the counters by the given deltas.
    pub fn add_counters(&self, messages: u64, tokens: u64) {
        let mut c = self.counters.lock().expect("counters lock poisoned");
        c.messages += messages;
        c.tokens += tokens;
    }

    /// The patterns configured for this participant at space-config time.
    #[must_use]
    pub fn configured_capabilities(&self) -> &[Pattern] {
        &self.configured_capabilities
    }

    /// The union of configured and currently-granted capability patterns —
    /// the set a capability check is evaluated against.
    #[must_use]
    pub fn effective_capabilities(&self) -> Vec<&Pattern> {
        let granted = self.granted.lock().expect("granted lock poisoned");
        self.configured_capabilities
            .iter()
            .chain(granted.values().flat_map(|g| g.capabilities.iter()))
            .collect()
    }

    /// Existing grant ids on this participant.
    #[must_use]
    pub fn grant_ids(&self) -> Vec<String> {
        self.granted
            .lock()
            .expect("granted lock poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// TokenTable
// ---------------------------------------------------------------------------

/// Constant-time token lookup, grouped by length so a probe only ever
/// compares candidates that could possibly match.
#[derive(Default)]
pub struct TokenTable {
    by_length: HashMap<usize, Vec<(String, String)>>,
}

impl TokenTable {
    /// Build a token table from a `token -> participant id` map.
    #[must_use]
    pub fn new(tokens: &std::collections::BTreeMap<String, String>) -> Self {
        let mut by_length: HashMap<usize, Vec<(String, String)>> = HashMap::new();
        for (token, participant_id) in tokens {
            by_length
                .entry(token.len())
                .or_default()
                .push((token.clone(), participant_id.clone()));
        }
        Self { by_length }
    }

    /// Resolve a bearer token to a participant id, comparing candidates of
    /// matching length in constant time.
    #[must_use]
    pub fn resolve(&self, token: &str) -> Option<String> {
        let candidates = self.by_length.get(&token.len())?;
        candidates
            .iter()
            .find(|(candidate, _)| ct_eq(candidate.as_bytes(), token.as_bytes()))
            .map(|(_, participant_id)| participant_id.clone())
    }
}

fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// The authoritative participant table for one gateway instance.
pub struct Registry {
    participants: DashMap<String, Arc<ParticipantState>>,
    tokens: TokenTable,
    ephemeral_grants: bool,
}

impl Registry {
    /// Construct a registry over the given static token table.
    #[must_use]
    pub fn new(tokens: &std::collections::BTreeMap<String, String>, ephemeral_grants: bool) -> Self {
        Self {
            participants: DashMap::new(),
            tokens: TokenTable::new(tokens),
            ephemeral_grants,
        }
    }

    /// Resolve a bearer token to a participant id.
    #[must_use]
    pub fn resolve_by_token(&self, token: &str) -> Option<String> {
        self.tokens.resolve(token)
    }

    /// Register (or re-register, on reconnect) a participant. Only the
    /// gateway core calls this, after a successful join.
    pub fn register(
        &self,
        id: impl Into<String>,
        display_name: Option<String>,
        configured_capabilities: Vec<Pattern>,
    ) -> Arc<ParticipantState> {
        let id = id.into();
        let state = Arc::new(ParticipantState::new(id.clone(), display_name, configured_capabilities));
        state.set_status(ParticipantStatus::Active);
        self.participants.insert(id, state.clone());
        state
    }

    /// Look up a participant by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<ParticipantState>> {
        self.participants.get(id).map(|e| e.value().clone())
    }

    /// Attach an outbound transport sender to a registered participant.
    pub fn attach_channel(&self, id: &str, sender: mpsc::Sender<Envelope>) {
        if let Some(state) = self.get(id) {
            *state.outbound.lock().expect("outbound lock poisoned") = Some(sender);
            state.set_status(ParticipantStatus::Active);
        }
    }

    /// Detach the outbound channel (on disconnect), mark the participant
    /// disconnected, and — if this registry was configured with ephemeral
    /// grants — drop all of its dynamic grants.
    pub fn detach_channel(&self, id: &str) {
        if let Some(state) = self.get(id) {
            *state.outbound.lock().expect("outbound lock poisoned") = None;
            state.set_status(ParticipantStatus::Disconnected);
            if self.ephemeral_grants {
                state.granted.lock().expect("granted lock poisoned").clear();
            }
        }
    }

    /// Append a grant record to the named recipient, keyed by grant id.
    /// A later grant with the same id replaces the earlier one.
    pub fn grant(&self, recipient: &str, record: GrantRecord) {
        if let Some(state) = self.get(recipient) {
            state
                .granted
                .lock()
                .expect("granted lock poisoned")
                .insert(record.grant_id.clone(), record);
        }
    }

    /// Remove a grant by id from the named recipient.
    pub fn revoke(&self, recipient: &str, grant_id: &str) -> bool {
        self.get(recipient)
            .map(|state| {
                state
                    .granted
                    .lock()
                    .expect("granted lock poisoned")
                    .remove(grant_id)
                    .is_some()
            })
            .unwrap_or(false)
    }

    /// A stable snapshot of every currently-connected participant.
    #[must_use]
    pub fn iter_connected(&self) -> Vec<Arc<ParticipantState>> {
        self.participants
            .iter()
            .map(|e| e.value().clone())
            .filter(|p| p.is_connected())
            .collect()
    }

    /// The full participant roster (connected or not), for `system/welcome`.
    #[must_use]
    pub fn roster(&self) -> Vec<Arc<ParticipantState>> {
        self.participants.iter().map(|e| e.value().clone()).collect()
    }
}
