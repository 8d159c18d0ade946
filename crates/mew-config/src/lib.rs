// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading, validation, and merging for the gateway.
//!
//! This crate provides [`GatewayConfig`] — the top-level runtime settings —
//! together with helpers for loading from TOML files, merging overlays, and
//! producing advisory [`ConfigWarning`]s.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory-level issues that do not prevent operation but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A deprecated field was used in the configuration.
    DeprecatedField {
        /// Name of the deprecated field.
        field: String,
        /// Suggested replacement, if any.
        suggestion: Option<String>,
    },
    /// A recommended optional field is missing.
    MissingOptionalField {
        /// Name of the missing field.
        field: String,
        /// Why it matters.
        hint: String,
    },
    /// A per-recipient queue capacity is unusually large.
    LargeQueueCapacity {
        /// Configured capacity.
        capacity: usize,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::DeprecatedField { field, suggestion } => {
                write!(f, "deprecated field '{field}'")?;
                if let Some(s) = suggestion {
                    write!(f, " — use '{s}' instead")?;
                }
                Ok(())
            }
            ConfigWarning::MissingOptionalField { field, hint } => {
                write!(f, "missing optional field '{field}': {hint}")
            }
            ConfigWarning::LargeQueueCapacity { capacity } => {
                write!(f, "outbound queue capacity {capacity} is unusually large")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level runtime configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Logical space id this gateway instance serves.
    pub space: String,

    /// Bind address for the axum HTTP/WS server.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Static token table: bearer token → participant id.
    #[serde(default)]
    pub tokens: BTreeMap<String, String>,

    /// Directory the audit logger writes JSONL streams into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_dir: Option<String>,

    /// Log level override (e.g. `"debug"`, `"info"`, `"warn"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Per-recipient bounded outbound queue capacity.
    #[serde(default = "default_queue_capacity")]
    pub outbound_queue_capacity: usize,

    /// Default request/response correlation timeout, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Join handshake timeout, in seconds.
    #[serde(default = "default_join_timeout_secs")]
    pub join_timeout_secs: u64,

    /// Stream idle timeout, in seconds.
    #[serde(default = "default_stream_idle_secs")]
    pub stream_idle_secs: u64,

    /// Maximum accepted envelope size, in bytes.
    #[serde(default = "default_max_envelope_bytes")]
    pub max_envelope_bytes: usize,

    /// Whether capability grants are dropped when the recipient disconnects.
    #[serde(default)]
    pub ephemeral_grants: bool,

    /// Configured capabilities per participant id.
    #[serde(default)]
    pub participants: BTreeMap<String, ParticipantConfig>,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_queue_capacity() -> usize {
    256
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_join_timeout_secs() -> u64 {
    15
}

fn default_stream_idle_secs() -> u64 {
    60
}

fn default_max_envelope_bytes() -> usize {
    1024 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            space: "default".to_string(),
            bind: default_bind(),
            tokens: BTreeMap::new(),
            logs_dir: None,
            log_level: Some("info".into()),
            outbound_queue_capacity: default_queue_capacity(),
            request_timeout_secs: default_request_timeout_secs(),
            join_timeout_secs: default_join_timeout_secs(),
            stream_idle_secs: default_stream_idle_secs(),
            max_envelope_bytes: default_max_envelope_bytes(),
            ephemeral_grants: false,
            participants: BTreeMap::new(),
        }
    }
}

/// Per-participant capability configuration loaded from the space config.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Default)]
pub struct ParticipantConfig {
    /// Display name shown in the roster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Capability pattern strings, parsed by `mew-capability`.
    #[serde(default)]
    pub capabilities: Vec<CapabilityEntry>,
}

/// A single capability rule as authored in config, prior to compilation.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct CapabilityEntry {
    /// Kind pattern: literal, glob, or alternation list.
    pub kind: KindPattern,
    /// Optional recipient constraint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<KindPattern>,
    /// Optional payload pattern, as raw JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// A kind/recipient pattern: one literal, or an alternation list.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(untagged)]
pub enum KindPattern {
    /// A single pattern string.
    One(String),
    /// Alternation over several pattern strings.
    Many(Vec<String>),
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const LARGE_QUEUE_THRESHOLD: usize = 100_000;
const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load a [`GatewayConfig`] from an optional TOML file path.
///
/// * If `path` is `Some`, reads and parses the file.
/// * If `path` is `None`, returns [`GatewayConfig::default()`].
///
/// Environment variable overrides are applied on top in both cases.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_toml(&content)?
        }
        None => GatewayConfig::default(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Parse a TOML string into a [`GatewayConfig`].
pub fn parse_toml(content: &str) -> Result<GatewayConfig, ConfigError> {
    toml::from_str::<GatewayConfig>(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Env overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides.
///
/// Recognised variables:
/// - `MEW_SPACE`
/// - `MEW_BIND`
/// - `MEW_LOG_LEVEL`
/// - `MEW_LOGS_DIR`
pub fn apply_env_overrides(config: &mut GatewayConfig) {
    if let Ok(val) = std::env::var("MEW_SPACE") {
        config.space = val;
    }
    if let Ok(val) = std::env::var("MEW_BIND") {
        config.bind = val;
    }
    if let Ok(val) = std::env::var("MEW_LOG_LEVEL") {
        config.log_level = Some(val);
    }
    if let Ok(val) = std::env::var("MEW_LOGS_DIR") {
        config.logs_dir = Some(val);
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a parsed configuration, returning advisory warnings.
///
/// Hard errors (empty space id, out-of-range timeouts) are returned as a
/// [`ConfigError::ValidationError`]; soft issues come back as warnings.
pub fn validate_config(config: &GatewayConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<ConfigWarning> = Vec::new();

    if config.space.trim().is_empty() {
        errors.push("space must not be empty".into());
    }

    if let Some(ref level) = config.log_level
        && !VALID_LOG_LEVELS.contains(&level.as_str())
    {
        errors.push(format!("invalid log_level '{level}'"));
    }

    if config.outbound_queue_capacity == 0 {
        errors.push("outbound_queue_capacity must be greater than zero".into());
    } else if config.outbound_queue_capacity > LARGE_QUEUE_THRESHOLD {
        warnings.push(ConfigWarning::LargeQueueCapacity {
            capacity: config.outbound_queue_capacity,
        });
    }

    if config.request_timeout_secs == 0 {
        errors.push("request_timeout_secs must be greater than zero".into());
    }
    if config.join_timeout_secs == 0 {
        errors.push("join_timeout_secs must be greater than zero".into());
    }

    if config.logs_dir.is_none() {
        warnings.push(ConfigWarning::MissingOptionalField {
            field: "logs_dir".into(),
            hint: "audit records will not be persisted to disk".into(),
        });
    }

    for (id, participant) in &config.participants {
        if id.trim().is_empty() {
            errors.push("participant id must not be empty".into());
        }
        let _ = participant;
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

/// Merge two configurations. Values in `overlay` take precedence over `base`.
///
/// Token tables and participant maps are combined; on id collisions the
/// overlay entry wins.
pub fn merge_configs(base: GatewayConfig, overlay: GatewayConfig) -> GatewayConfig {
    let mut tokens = base.tokens;
    tokens.extend(overlay.tokens);
    let mut participants = base.participants;
    participants.extend(overlay.participants);
    GatewayConfig {
        space: overlay.space,
        bind: overlay.bind,
        tokens,
        logs_dir: overlay.logs_dir.or(base.logs_dir),
        log_level: overlay.log_level.or(base.log_level),
        outbound_queue_capacity: overlay.outbound_queue_capacity,
        request_timeout_secs: overlay.request_timeout_secs,
        join_timeout_secs: overlay.join_timeout_secs,
        stream_idle_secs: overlay.stream_idle_secs,
        max_envelope_bytes: overlay.max_envelope_bytes,
        ephemeral_grants: overlay.ephemeral_grants || base.ephemeral_grants,
        participants,
    }
}
