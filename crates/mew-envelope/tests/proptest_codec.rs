// SPDX-License-Identifier: MIT OR Apache-2.0
//! Property-based tests for `EnvelopeCodec` and version parsing.

use mew_envelope::codec::EnvelopeCodec;
use mew_envelope::{Envelope, is_compatible_version, parse_version};
use proptest::prelude::*;
use std::io::BufReader;

fn arb_kind() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("chat".to_string()),
        Just("mcp/request".to_string()),
        Just("mcp/response".to_string()),
        Just("participant/pause".to_string()),
        "[a-z]{2,8}/[a-z]{2,8}",
    ]
}

fn arb_payload() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        Just(serde_json::json!({})),
        "[a-zA-Z0-9 ]{0,12}".prop_map(|s| serde_json::json!({ "text": s })),
        (0i64..1000).prop_map(|n| serde_json::json!({ "count": n })),
    ]
}

fn arb_recipients() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z]{2,8}", 0..4)
}

fn arb_envelope() -> impl Strategy<Value = Envelope> {
    (arb_kind(), arb_payload(), arb_recipients()).prop_map(|(kind, payload, to)| {
        let mut e = Envelope::new(kind, payload);
        e.to = to;
        e
    })
}

proptest! {
    /// Any envelope survives encode → decode with all declared fields equal.
    #[test]
    fn codec_encode_decode_roundtrip(envelope in arb_envelope()) {
        let encoded = EnvelopeCodec::encode(&envelope).unwrap();
        let decoded = EnvelopeCodec::decode(encoded.trim_end()).unwrap();

        prop_assert_eq!(&decoded.id, &envelope.id);
        prop_assert_eq!(&decoded.kind, &envelope.kind);
        prop_assert_eq!(&decoded.to, &envelope.to);
        prop_assert_eq!(&decoded.payload, &envelope.payload);
    }

    /// Multiple envelopes survive `encode_many_to_writer` → `decode_stream`.
    #[test]
    fn codec_many_writer_stream_roundtrip(envelopes in prop::collection::vec(arb_envelope(), 1..8)) {
        let mut buf = Vec::new();
        EnvelopeCodec::encode_many_to_writer(&mut buf, &envelopes).unwrap();

        let reader = BufReader::new(buf.as_slice());
        let decoded: Vec<Envelope> = EnvelopeCodec::decode_stream(reader)
            .collect::<Result<_, _>>()
            .unwrap();

        prop_assert_eq!(envelopes.len(), decoded.len());
        for (orig, dec) in envelopes.iter().zip(decoded.iter()) {
            prop_assert_eq!(&orig.id, &dec.id);
            prop_assert_eq!(&orig.kind, &dec.kind);
        }
    }

    /// `parse_version` round-trips any `"mew/vMAJOR.MINOR"` string.
    #[test]
    fn version_parse_format_consistency(major in 0u32..1000, minor in 0u32..1000) {
        let version_str = format!("mew/v{major}.{minor}");
        let parsed = parse_version(&version_str);
        prop_assert_eq!(parsed, Some((major, minor)));
    }

    /// Compatibility is reflexive: any valid version is compatible with itself.
    #[test]
    fn version_compatibility_reflexive(major in 0u32..100, minor in 0u32..100) {
        let v = format!("mew/v{major}.{minor}");
        prop_assert!(is_compatible_version(&v, &v));
    }

    /// Compatibility is symmetric.
    #[test]
    fn version_compatibility_symmetric(
        major_a in 0u32..100,
        minor_a in 0u32..100,
        major_b in 0u32..100,
        minor_b in 0u32..100,
    ) {
        let a = format!("mew/v{major_a}.{minor_a}");
        let b = format!("mew/v{major_b}.{minor_b}");
        prop_assert_eq!(is_compatible_version(&a, &b), is_compatible_version(&b, &a));
    }
}
