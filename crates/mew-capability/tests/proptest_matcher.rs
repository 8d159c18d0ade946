// SPDX-License-Identifier: MIT OR Apache-2.0
//! Property-based tests for the capability matcher.

use mew_capability::{MatcherCache, Pattern, PatternSpec, matches};
use mew_envelope::Envelope;
use proptest::prelude::*;

fn arb_segment() -> impl Strategy<Value = String> {
    "[a-z]{2,6}"
}

fn arb_kind() -> impl Strategy<Value = String> {
    (arb_segment(), arb_segment()).prop_map(|(a, b)| format!("{a}/{b}"))
}

proptest! {
    /// An exact-literal pattern matches only its own kind.
    #[test]
    fn literal_kind_pattern_is_exact(kind in arb_kind(), other in arb_kind()) {
        prop_assume!(kind != other);
        let pattern = Pattern::compile(&PatternSpec {
            kind: vec![kind.clone()],
            to: None,
            payload: None,
        }).unwrap();
        let matching = Envelope::new(kind.as_str(), serde_json::json!({}));
        let non_matching = Envelope::new(other.as_str(), serde_json::json!({}));
        prop_assert!(matches(&pattern, &matching));
        prop_assert!(!matches(&pattern, &non_matching));
    }

    /// A deep-wildcard pattern over a namespace matches every kind within it.
    #[test]
    fn deep_wildcard_matches_whole_namespace(ns in arb_segment(), rest in arb_kind()) {
        let pattern = Pattern::compile(&PatternSpec {
            kind: vec![format!("{ns}/**")],
            to: None,
            payload: None,
        }).unwrap();
        let kind = format!("{ns}/{rest}");
        let envelope = Envelope::new(kind.as_str(), serde_json::json!({}));
        prop_assert!(matches(&pattern, &envelope));
    }

    /// [`MatcherCache`] never disagrees with the uncached [`matches`] call.
    #[test]
    fn cache_agrees_with_uncached_matcher(kind in arb_kind(), envelope_kind in arb_kind()) {
        let pattern = Pattern::compile(&PatternSpec {
            kind: vec![kind],
            to: None,
            payload: None,
        }).unwrap();
        let envelope = Envelope::new(envelope_kind.as_str(), serde_json::json!({}));
        let cache = MatcherCache::new(16);
        let direct = matches(&pattern, &envelope);
        let cached_first = cache.matches(&pattern, &envelope);
        let cached_second = cache.matches(&pattern, &envelope);
        prop_assert_eq!(direct, cached_first);
        prop_assert_eq!(cached_first, cached_second);
    }

    /// Alternation matches iff at least one branch matches individually.
    #[test]
    fn alternation_matches_iff_any_branch_matches(a in arb_kind(), b in arb_kind(), probe in arb_kind()) {
        let pattern = Pattern::compile(&PatternSpec {
            kind: vec![a.clone(), b.clone()],
            to: None,
            payload: None,
        }).unwrap();
        let envelope = Envelope::new(probe.as_str(), serde_json::json!({}));
        let expected = probe == a || probe == b;
        prop_assert_eq!(matches(&pattern, &envelope), expected);
    }
}
