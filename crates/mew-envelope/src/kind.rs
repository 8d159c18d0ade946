//! The `kind` wire tag: a slash-namespaced, open string space.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A `kind` value, e.g. `"chat"` or `"mcp/request"`.
///
/// `Kind` wraps the raw string rather than enumerating every kind, because
/// the wire format is forward-compatible: unrecognised kinds must still
/// forward byte-for-byte. Namespace-aware helpers are provided for the
/// matcher and the gateway's reserved-kind check.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kind(String);

impl Kind {
    /// Construct a `Kind` from any string-like value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw string form, e.g. `"mcp/request"`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Slash-separated segments, e.g. `"mcp/request"` → `["mcp", "request"]`.
    #[must_use]
    pub fn segments(&self) -> Vec<&str> {
        self.0.split('/').collect()
    }

    /// The leading namespace segment, e.g. `"mcp/request"` → `"mcp"`.
    ///
    /// Kinds with no `/` (like `"chat"`) are their own namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.0.split('/').next().unwrap_or(&self.0)
    }

    /// `true` if this kind starts with `system/` — gateway-reserved namespace.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.namespace() == "system"
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Kind {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Kind {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_split_on_slash() {
        let k = Kind::new("mcp/request");
        assert_eq!(k.segments(), vec!["mcp", "request"]);
    }

    #[test]
    fn namespace_of_flat_kind_is_itself() {
        let k = Kind::new("chat");
        assert_eq!(k.namespace(), "chat");
    }

    #[test]
    fn system_namespace_detected() {
        assert!(Kind::new("system/join").is_system());
        assert!(!Kind::new("chat").is_system());
    }

    #[test]
    fn serde_roundtrip_is_transparent() {
        let k = Kind::new("participant/pause");
        let json = serde_json::to_string(&k).unwrap();
        assert_eq!(json, "\"participant/pause\"");
        let back: Kind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, k);
    }
}
