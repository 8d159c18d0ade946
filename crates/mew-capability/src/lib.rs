// SPDX-License-Identifier: MIT OR Apache-2.0
//! The capability matcher: a pure, stateless `(pattern, envelope) -> bool`
//! predicate deciding whether a participant may send a given envelope.
//!
//! Patterns are compiled once (at config-load time) into [`Pattern`] values;
//! the per-envelope [`matches`] call is then O(pattern complexity), with an
//! optional [`MatcherCache`] layered on top to memoize `(pattern, envelope)`
//! outcomes across repeated policy checks.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use globset::{Glob, GlobBuilder, GlobMatcher};
use mew_envelope::Envelope;
use regex::Regex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A pattern failed to compile. Raised at load time, never at enforcement
/// time — by the time a [`Pattern`] exists it is assumed well-formed.
#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    /// A kind/recipient glob string was not a valid glob.
    #[error("invalid glob pattern '{pattern}': {source}")]
    InvalidGlob {
        /// The offending pattern string.
        pattern: String,
        /// Underlying compile error.
        #[source]
        source: globset::Error,
    },
    /// A `/…/` payload string was not a valid regex.
    #[error("invalid regex pattern '{pattern}': {source}")]
    InvalidRegex {
        /// The offending pattern string (without the surrounding slashes).
        pattern: String,
        /// Underlying compile error.
        #[source]
        source: regex::Error,
    },
    /// `kind` patterns must specify at least one alternative.
    #[error("a capability pattern must name at least one kind")]
    EmptyKind,
}

// ---------------------------------------------------------------------------
// Kind / recipient matching
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct KindEntry {
    raw: String,
    matcher: GlobMatcher,
}

/// A compiled kind or recipient pattern: one literal/glob string, or
/// alternation over several. `*` matches a single `/`-delimited segment;
/// `**` matches zero or more segments.
#[derive(Debug, Clone)]
pub struct KindSpec {
    entries: Vec<KindEntry>,
}

impl KindSpec {
    /// Compile a set of kind/recipient pattern strings. A list of more than
    /// one entry is alternation: any element matching is sufficient.
    pub fn compile(patterns: &[String]) -> Result<Self, PatternError> {
        if patterns.is_empty() {
            return Err(PatternError::EmptyKind);
        }
        let mut entries = Vec::with_capacity(patterns.len());
        for raw in patterns {
            let glob = GlobBuilder::new(raw)
                .literal_separator(true)
                .build()
                .map_err(|source| PatternError::InvalidGlob {
                    pattern: raw.clone(),
                    source,
                })?;
            entries.push(KindEntry {
                raw: raw.clone(),
                matcher: glob.compile_matcher(),
            });
        }
        Ok(Self { entries })
    }

    fn is_match(&self, value: &str) -> bool {
        self.entries.iter().any(|e| e.matcher.is_match(value))
    }

    /// `true` if any alternative is a bare wildcard (`*` or `**`) — the only
    /// shape of `to` pattern a broadcast envelope can satisfy.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.entries.iter().any(|e| e.raw == "*" || e.raw == "**")
    }
}

// ---------------------------------------------------------------------------
// Payload matching
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum StringMatch {
    Literal(String),
    Regex(Box<Regex>),
    NegatedGlob(Box<GlobMatcher>),
    Glob(Box<GlobMatcher>),
}

fn compile_glob(raw: &str) -> Result<GlobMatcher, PatternError> {
    Glob::new(raw)
        .map(|g| g.compile_matcher())
        .map_err(|source| PatternError::InvalidGlob {
            pattern: raw.to_string(),
            source,
        })
}

fn compile_string(raw: &str) -> Result<StringMatch, PatternError> {
    if raw.len() >= 2 && raw.starts_with('/') && raw.ends_with('/') {
        let inner = &raw[1..raw.len() - 1];
        let re = Regex::new(inner).map_err(|source| PatternError::InvalidRegex {
            pattern: inner.to_string(),
            source,
        })?;
        return Ok(StringMatch::Regex(Box::new(re)));
    }
    if let Some(rest) = raw.strip_prefix('!') {
        return Ok(StringMatch::NegatedGlob(Box::new(compile_glob(rest)?)));
    }
    if raw.contains('*') || raw.contains('?') {
        return Ok(StringMatch::Glob(Box::new(compile_glob(raw)?)));
    }
    Ok(StringMatch::Literal(raw.to_string()))
}

fn string_matches(pattern: &StringMatch, value: &str) -> bool {
    match pattern {
        StringMatch::Literal(s) => s == value,
        StringMatch::Regex(re) => re.is_match(value),
        StringMatch::NegatedGlob(g) => !g.is_match(value),
        StringMatch::Glob(g) => g.is_match(value),
    }
}

/// A key in a payload pattern object: a plain field name, the special `**`
/// anywhere-in-subtree marker, or a `$`-prefixed path expression.
#[derive(Debug, Clone)]
enum PayloadKey {
    Field(String),
    Anywhere,
    Path(String),
}

fn classify_key(key: &str) -> PayloadKey {
    if key == "**" {
        PayloadKey::Anywhere
    } else if let Some(expr) = key.strip_prefix('$') {
        PayloadKey::Path(expr.to_string())
    } else {
        PayloadKey::Field(key.to_string())
    }
}

/// A compiled payload pattern: a partial structural template matched
/// recursively against a JSON payload. See the crate docs for the full
/// matching-rule table.
#[derive(Debug, Clone)]
pub enum PayloadPattern {
    /// Matches only `null`.
    Null,
    /// Matches a literal boolean.
    Bool(bool),
    /// Matches a literal number (deep equality).
    Number(serde_json::Number),
    /// Matches a string value per one of the four string-pattern forms.
    Str(StringMatch),
    /// Alternation: matches if any element matches the candidate value.
    Alternation(Vec<PayloadPattern>),
    /// Matches a JSON object: every listed key must match; extra payload
    /// keys are ignored.
    Object(Vec<(PayloadKey, PayloadPattern)>),
}

impl PayloadPattern {
    /// Compile a payload pattern from its JSON source representation.
    pub fn compile(source: &Value) -> Result<Self, PatternError> {
        Ok(match source {
            Value::Null => PayloadPattern::Null,
            Value::Bool(b) => PayloadPattern::Bool(*b),
            Value::Number(n) => PayloadPattern::Number(n.clone()),
            Value::String(s) => PayloadPattern::Str(compile_string(s)?),
            Value::Array(items) => {
                let mut compiled = Vec::with_capacity(items.len());
                for item in items {
                    compiled.push(PayloadPattern::compile(item)?);
                }
                PayloadPattern::Alternation(compiled)
            }
            Value::Object(map) => {
                let mut compiled = Vec::with_capacity(map.len());
                for (k, v) in map {
                    compiled.push((classify_key(k), PayloadPattern::compile(v)?));
                }
                PayloadPattern::Object(compiled)
            }
        })
    }
}

fn walk_depth_first<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    out.push(value);
    match value {
        Value::Array(items) => {
            for item in items {
                walk_depth_first(item, out);
            }
        }
        Value::Object(map) => {
            for v in map.values() {
                walk_depth_first(v, out);
            }
        }
        _ => {}
    }
}

#[derive(Debug, Clone, Copy)]
enum PathSegment<'a> {
    Field(&'a str),
    Index(usize),
    RecursiveDescent,
}

fn parse_path_segments(expr: &str) -> Vec<PathSegment<'_>> {
    let mut segments = Vec::new();
    for part in expr.split('.') {
        if part.is_empty() {
            continue;
        }
        if part == "**" {
            segments.push(PathSegment::RecursiveDescent);
            continue;
        }
        match part.find('[') {
            None => segments.push(PathSegment::Field(part)),
            Some(bracket_pos) => {
                let field = &part[..bracket_pos];
                if !field.is_empty() {
                    segments.push(PathSegment::Field(field));
                }
                let mut rest = &part[bracket_pos..];
                while let Some(stripped) = rest.strip_prefix('[') {
                    let Some(end) = stripped.find(']') else {
                        break;
                    };
                    if let Ok(idx) = stripped[..end].parse::<usize>() {
                        segments.push(PathSegment::Index(idx));
                    }
                    rest = &stripped[end + 1..];
                }
            }
        }
    }
    segments
}

/// Resolve a `$`-path expression (without the leading `$`) against `root`,
/// returning every value the path resolves to. A `**` segment performs a
/// depth-first recursive descent, collecting every node under it.
fn resolve_path<'a>(expr: &str, root: &'a Value) -> Vec<&'a Value> {
    let segments = parse_path_segments(expr);
    let mut current: Vec<&Value> = vec![root];
    for seg in segments {
        let mut next = Vec::new();
        for v in current {
            match seg {
                PathSegment::Field(name) => {
                    if let Some(found) = v.get(name) {
                        next.push(found);
                    }
                }
                PathSegment::Index(idx) => {
                    if let Some(found) = v.get(idx) {
                        next.push(found);
                    }
                }
                PathSegment::RecursiveDescent => walk_depth_first(v, &mut next),
            }
        }
        current = next;
    }
    current
}

fn match_payload(pattern: &PayloadPattern, value: &Value, root: &Value) -> bool {
    match pattern {
        PayloadPattern::Null => value.is_null(),
        PayloadPattern::Bool(b) => value.as_bool() == Some(*b),
        PayloadPattern::Number(n) => value.as_number() == Some(n),
        PayloadPattern::Str(sp) => value.as_str().is_some_and(|s| string_matches(sp, s)),
        PayloadPattern::Alternation(alts) => alts.iter().any(|p| match_payload(p, value, root)),
        PayloadPattern::Object(entries) => {
            let Some(obj) = value.as_object() else {
                return false;
            };
            entries.iter().all(|(key, pat)| match key {
                PayloadKey::Field(name) => obj
                    .get(name)
                    .is_some_and(|child| match_payload(pat, child, root)),
                PayloadKey::Anywhere => {
                    let mut nodes = Vec::new();
                    walk_depth_first(value, &mut nodes);
                    nodes.iter().any(|n| match_payload(pat, n, root))
                }
                PayloadKey::Path(expr) => resolve_path(expr, root)
                    .iter()
                    .any(|n| match_payload(pat, n, root)),
            })
        }
    }
}

// `as_number` isn't a method on `Value`; provide a tiny local shim so the
// matcher above reads naturally.
trait ValueExt {
    fn as_number(&self) -> Option<&serde_json::Number>;
}
impl ValueExt for Value {
    fn as_number(&self) -> Option<&serde_json::Number> {
        match self {
            Value::Number(n) => Some(n),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Pattern
// ---------------------------------------------------------------------------

static NEXT_PATTERN_ID: AtomicU64 = AtomicU64::new(1);

/// Uncompiled source form of a capability pattern, as authored in
/// configuration or a `capability/grant` payload.
#[derive(Debug, Clone, Default)]
pub struct PatternSpec {
    /// One or more kind patterns (alternation if more than one).
    pub kind: Vec<String>,
    /// Optional recipient constraint, same alternation rule.
    pub to: Option<Vec<String>>,
    /// Optional payload pattern, as raw JSON.
    pub payload: Option<Value>,
}

/// A compiled capability pattern: `(pattern, envelope) -> bool` via
/// [`matches`]. Compilation happens once; matching an envelope against an
/// already-compiled pattern never re-parses a glob or regex.
#[derive(Debug, Clone)]
pub struct Pattern {
    id: u64,
    kind: KindSpec,
    to: Option<KindSpec>,
    payload: Option<PayloadPattern>,
}

impl Pattern {
    /// Compile a [`PatternSpec`] into a [`Pattern`]. Returns
    /// [`PatternError`] if any glob/regex sub-pattern is malformed.
    pub fn compile(spec: &PatternSpec) -> Result<Self, PatternError> {
        let kind = KindSpec::compile(&spec.kind)?;
        let to = spec.to.as_deref().map(KindSpec::compile).transpose()?;
        let payload = spec.payload.as_ref().map(PayloadPattern::compile).transpose()?;
        Ok(Self {
            id: NEXT_PATTERN_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            to,
            payload,
        })
    }

    /// A stable identifier for this compiled pattern, used as the cache key
    /// alongside an envelope id in [`MatcherCache`].
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

fn to_matches(to_spec: Option<&KindSpec>, envelope: &Envelope) -> bool {
    match to_spec {
        None => true,
        Some(spec) => {
            if envelope.is_broadcast() {
                spec.is_wildcard()
            } else {
                envelope.to.iter().any(|r| spec.is_match(r))
            }
        }
    }
}

/// Evaluate whether `envelope` satisfies `pattern`.
///
/// Pure and stateless: the same inputs always produce the same answer.
/// A non-match is a policy denial, never an error — malformed patterns are
/// rejected earlier, at [`Pattern::compile`] time.
#[must_use]
pub fn matches(pattern: &Pattern, envelope: &Envelope) -> bool {
    if !pattern.kind.is_match(envelope.kind.as_str()) {
        return false;
    }
    if !to_matches(pattern.to.as_ref(), envelope) {
        return false;
    }
    if let Some(payload_pattern) = &pattern.payload
        && !match_payload(payload_pattern, &envelope.payload, &envelope.payload)
    {
        return false;
    }
    true
}

/// `true` if `envelope` satisfies at least one pattern in `patterns` — the
/// "union of configured and granted capabilities" check from the capability
/// model.
#[must_use]
pub fn matches_any<'a>(patterns: impl IntoIterator<Item = &'a Pattern>, envelope: &Envelope) -> bool {
    patterns.into_iter().any(|p| matches(p, envelope))
}

// ---------------------------------------------------------------------------
// MatcherCache
// ---------------------------------------------------------------------------

struct CacheInner {
    map: HashMap<(u64, String), bool>,
    order: VecDeque<(u64, String)>,
}

/// A bounded memoization cache over `(pattern, envelope)` decisions, so that
/// repeated capability checks against the same pattern set (e.g. fan-out to
/// many recipients) amortize to O(1) per envelope per rule.
pub struct MatcherCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl MatcherCache {
    /// Create a cache holding at most `capacity` entries, evicting the
    /// oldest entry (FIFO) once full.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// As [`matches`], but memoized by `(pattern.id(), envelope.id)`.
    pub fn matches(&self, pattern: &Pattern, envelope: &Envelope) -> bool {
        let key = (pattern.id(), envelope.id.clone());
        {
            let inner = self.inner.lock().expect("matcher cache lock poisoned");
            if let Some(&hit) = inner.map.get(&key) {
                return hit;
            }
        }
        let result = matches(pattern, envelope);
        let mut inner = self.inner.lock().expect("matcher cache lock poisoned");
        if !inner.map.contains_key(&key) && inner.map.len() >= self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.map.remove(&oldest);
            }
        }
        inner.map.insert(key.clone(), result);
        inner.order.push_back(key);
        result
    }

    /// Number of entries currently cached.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("matcher cache lock poisoned").map.len()
    }

    /// `true` if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pattern(kind: &[&str], to: Option<&[&str]>, payload: Option<Value>) -> Pattern {
        Pattern::compile(&PatternSpec {
            kind: kind.iter().map(|s| s.to_string()).collect(),
            to: to.map(|ts| ts.iter().map(|s| s.to_string()).collect()),
            payload,
        })
        .unwrap()
    }

    fn envelope(kind: &str, to: &[&str], payload: Value) -> Envelope {
        Envelope::new(kind, payload).to(to.iter().copied())
    }

    #[test]
    fn exact_kind_matches() {
        let p = pattern(&["chat"], None, None);
        assert!(matches(&p, &envelope("chat", &[], json!({}))));
        assert!(!matches(&p, &envelope("chat/acknowledge", &[], json!({}))));
    }

    #[test]
    fn single_star_matches_one_segment() {
        let p = pattern(&["mcp/*"], None, None);
        assert!(matches(&p, &envelope("mcp/request", &[], json!({}))));
        assert!(!matches(&p, &envelope("mcp/request/extra", &[], json!({}))));
    }

    #[test]
    fn deep_wildcard_matches_any_depth() {
        let p = pattern(&["participant/**"], None, None);
        assert!(matches(&p, &envelope("participant/pause", &[], json!({}))));
        assert!(matches(&p, &envelope("participant/a/b/c", &[], json!({}))));
    }

    #[test]
    fn kind_alternation_matches_any_element() {
        let p = pattern(&["chat", "mcp/request"], None, None);
        assert!(matches(&p, &envelope("chat", &[], json!({}))));
        assert!(matches(&p, &envelope("mcp/request", &[], json!({}))));
        assert!(!matches(&p, &envelope("reasoning/start", &[], json!({}))));
    }

    #[test]
    fn recipient_constraint_requires_listed_recipient() {
        let p = pattern(&["chat"], Some(&["file-server"]), None);
        assert!(matches(&p, &envelope("chat", &["file-server"], json!({}))));
        assert!(!matches(&p, &envelope("chat", &["other-agent"], json!({}))));
    }

    #[test]
    fn broadcast_only_satisfies_wildcard_to_pattern() {
        let wildcard = pattern(&["chat"], Some(&["*"]), None);
        let narrow = pattern(&["chat"], Some(&["file-server"]), None);
        let broadcast = envelope("chat", &[], json!({}));
        assert!(matches(&wildcard, &broadcast));
        assert!(!matches(&narrow, &broadcast));
    }

    #[test]
    fn payload_object_match_ignores_extra_keys() {
        let p = pattern(&["mcp/request"], None, Some(json!({"method": "tools/call"})));
        let e = envelope(
            "mcp/request",
            &[],
            json!({"method": "tools/call", "params": {"name": "add"}}),
        );
        assert!(matches(&p, &e));
    }

    #[test]
    fn payload_glob_string_pattern() {
        let p = pattern(
            &["mcp/request"],
            None,
            Some(json!({"params": {"name": "write_*"}})),
        );
        let ok = envelope(
            "mcp/request",
            &[],
            json!({"params": {"name": "write_file"}}),
        );
        let bad = envelope(
            "mcp/request",
            &[],
            json!({"params": {"name": "delete_file"}}),
        );
        assert!(matches(&p, &ok));
        assert!(!matches(&p, &bad));
    }

    #[test]
    fn payload_negated_glob_excludes_match() {
        let p = pattern(
            &["mcp/request"],
            None,
            Some(json!({"params": {"name": "!delete_*"}})),
        );
        let allowed = envelope("mcp/request", &[], json!({"params": {"name": "write_file"}}));
        let denied = envelope("mcp/request", &[], json!({"params": {"name": "delete_file"}}));
        assert!(matches(&p, &allowed));
        assert!(!matches(&p, &denied));
    }

    #[test]
    fn payload_regex_string_pattern() {
        let p = pattern(
            &["mcp/request"],
            None,
            Some(json!({"params": {"name": "/^tool_[a-z]+$/"}})),
        );
        let ok = envelope("mcp/request", &[], json!({"params": {"name": "tool_add"}}));
        let bad = envelope("mcp/request", &[], json!({"params": {"name": "Tool_Add"}}));
        assert!(matches(&p, &ok));
        assert!(!matches(&p, &bad));
    }

    #[test]
    fn payload_alternation_list_pattern() {
        let p = pattern(
            &["mcp/request"],
            None,
            Some(json!({"params": {"name": ["add", "subtract"]}})),
        );
        assert!(matches(&p, &envelope("mcp/request", &[], json!({"params": {"name": "add"}}))));
        assert!(matches(&p, &envelope("mcp/request", &[], json!({"params": {"name": "subtract"}}))));
        assert!(!matches(&p, &envelope("mcp/request", &[], json!({"params": {"name": "multiply"}}))));
    }

    #[test]
    fn payload_anywhere_key_searches_subtree() {
        let p = pattern(&["chat"], None, Some(json!({"**": "secret"})));
        let found = envelope("chat", &[], json!({"nested": {"deep": ["secret"]}}));
        let missing = envelope("chat", &[], json!({"nested": {"deep": ["public"]}}));
        assert!(matches(&p, &found));
        assert!(!matches(&p, &missing));
    }

    #[test]
    fn payload_path_expression_indexes_into_array() {
        let p = pattern(&["chat"], None, Some(json!({"$.items[0].name": "first"})));
        let e = envelope("chat", &[], json!({"items": [{"name": "first"}, {"name": "second"}]}));
        assert!(matches(&p, &e));
    }

    #[test]
    fn payload_path_expression_recursive_descent() {
        let p = pattern(&["chat"], None, Some(json!({"$.**": "needle"})));
        let e = envelope("chat", &[], json!({"a": {"b": {"c": "needle"}}}));
        assert!(matches(&p, &e));
    }

    #[test]
    fn payload_missing_field_denies() {
        let p = pattern(&["mcp/request"], None, Some(json!({"method": "tools/call"})));
        let e = envelope("mcp/request", &[], json!({"other": "value"}));
        assert!(!matches(&p, &e));
    }

    #[test]
    fn matches_any_checks_the_union_of_patterns() {
        let configured = pattern(&["chat"], None, None);
        let granted = pattern(&["mcp/request"], None, Some(json!({"params": {"name": "write_file"}})));
        let patterns = vec![configured, granted];
        let allowed = envelope("mcp/request", &[], json!({"params": {"name": "write_file"}}));
        let denied = envelope("mcp/request", &[], json!({"params": {"name": "delete_file"}}));
        assert!(matches_any(&patterns, &allowed));
        assert!(!matches_any(&patterns, &denied));
    }

    #[test]
    fn compile_rejects_empty_kind_list() {
        let err = Pattern::compile(&PatternSpec::default()).unwrap_err();
        assert!(matches!(err, PatternError::EmptyKind));
    }

    #[test]
    fn compile_rejects_invalid_regex() {
        let err = Pattern::compile(&PatternSpec {
            kind: vec!["chat".into()],
            to: None,
            payload: Some(json!({"text": "/(unterminated/"})),
        })
        .unwrap_err();
        assert!(matches!(err, PatternError::InvalidRegex { .. }));
    }

    #[test]
    fn matcher_cache_memoizes_and_evicts() {
        let cache = MatcherCache::new(2);
        let p1 = pattern(&["chat"], None, None);
        let p2 = pattern(&["mcp/request"], None, None);
        let e1 = envelope("chat", &[], json!({}));
        let e2 = envelope("mcp/request", &[], json!({}));
        let e3 = envelope("reasoning/start", &[], json!({}));

        assert!(cache.matches(&p1, &e1));
        assert!(cache.len() == 1);
        assert!(!cache.matches(&p2, &e1));
        assert_eq!(cache.len(), 2);
        // Evicts the oldest entry once a third distinct key is inserted.
        assert!(!cache.matches(&p1, &e3));
        assert_eq!(cache.len(), 2);
        let _ = e2;
    }

    #[test]
    fn number_literal_deep_equality() {
        let p = pattern(&["chat"], None, Some(json!({"count": 3})));
        assert!(matches(&p, &envelope("chat", &[], json!({"count": 3}))));
        assert!(!matches(&p, &envelope("chat", &[], json!({"count": 4}))));
    }

    #[test]
    fn null_and_bool_literals() {
        let p = pattern(&["chat"], None, Some(json!({"flag": true, "extra": null})));
        assert!(matches(
            &p,
            &envelope("chat", &[], json!({"flag": true, "extra": null}))
        ));
        assert!(!matches(
            &p,
            &envelope("chat", &[], json!({"flag": false, "extra": null}))
        ));
    }
}
