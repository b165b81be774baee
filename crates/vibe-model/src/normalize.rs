// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Tool-call argument normalization.
//!
//! Some providers return tool-call arguments as a JSON-encoded *string*
//! rather than a JSON object, sometimes nested twice.  All three of these
//! carry the same logical `{"command":"ls"}`:
//!
//! ```text
//! {"command":"ls"}
//! "{\"command\":\"ls\"}"
//! "\"{\\\"command\\\":\\\"ls\\\"}\""
//! ```
//!
//! Without unwrapping, every downstream argument parse fails on such
//! providers, so this module is part of the adapter's public contract.

use serde_json::Value;

/// Normalize raw tool-call argument text into canonical JSON object text.
///
/// Steps:
/// 1. Parse.  Unparseable input is returned unchanged — the tool itself
///    reports the bad arguments.
/// 2. While the value is a string whose contents parse as JSON, unwrap one
///    encoding layer.
/// 3. Re-serialize the final value canonically (sorted keys, `&`/`<`/`>`
///    written as `\u00XX` escapes).  A final `null` becomes `{}`.
///
/// The function is idempotent: `normalize_arguments(normalize_arguments(x))`
/// equals `normalize_arguments(x)` for every input.
pub fn normalize_arguments(raw: &str) -> String {
    let Ok(mut value) = serde_json::from_str::<Value>(raw) else {
        return raw.to_string();
    };

    loop {
        let inner = match &value {
            Value::String(s) => match serde_json::from_str::<Value>(s) {
                Ok(v) => v,
                Err(_) => break,
            },
            _ => break,
        };
        value = inner;
    }

    match value {
        Value::Null => "{}".to_string(),
        other => to_canonical_json(&other),
    }
}

/// Serialize a JSON value with sorted object keys and HTML-significant
/// characters (`&`, `<`, `>`) escaped as `\u00XX`.
///
/// The escaping matters: provider payloads carry sequences like `\u0026` for
/// `&` inside command strings, and tests pin that those escapes survive
/// normalization byte-for-byte.  Plain serde_json serialization would decode
/// them to the bare character on the way through.
pub fn to_canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            // serde_json's default map is ordered by key, but sort explicitly
            // so the canonical form does not depend on crate features.
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, &map[key]);
            }
            out.push('}');
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '&' => out.push_str("\\u0026"),
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Encoding layers ───────────────────────────────────────────────────────

    #[test]
    fn plain_object_passes_through() {
        let out = normalize_arguments(r#"{"command":"ls"}"#);
        assert_eq!(out, r#"{"command":"ls"}"#);
    }

    #[test]
    fn single_encoded_string_is_unwrapped() {
        let out = normalize_arguments(r#""{\"command\":\"ls\"}""#);
        assert_eq!(out, r#"{"command":"ls"}"#);
    }

    #[test]
    fn double_encoded_string_is_unwrapped() {
        // "\"{\\\"command\\\":\\\"ls -la\\\"}\""
        let raw = r#""\"{\\\"command\\\":\\\"ls -la\\\"}\"""#;
        let out = normalize_arguments(raw);
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["command"], "ls -la");
    }

    #[test]
    fn unparseable_input_is_returned_unchanged() {
        let out = normalize_arguments("not json at all {");
        assert_eq!(out, "not json at all {");
    }

    #[test]
    fn empty_object_stays_empty_object() {
        assert_eq!(normalize_arguments("{}"), "{}");
    }

    #[test]
    fn null_becomes_empty_object() {
        assert_eq!(normalize_arguments("null"), "{}");
    }

    #[test]
    fn non_object_value_is_serialized_as_is() {
        assert_eq!(normalize_arguments("42"), "42");
        assert_eq!(normalize_arguments("[1,2]"), "[1,2]");
    }

    #[test]
    fn plain_string_without_json_contents_stays_a_string() {
        // "hello" is a valid JSON string whose contents are not JSON —
        // nothing to unwrap, so it serializes back as a string.
        assert_eq!(normalize_arguments(r#""hello""#), r#""hello""#);
    }

    // ── Canonical form ────────────────────────────────────────────────────────

    #[test]
    fn object_keys_are_sorted() {
        let out = normalize_arguments(r#"{"zebra":1,"apple":2}"#);
        assert_eq!(out, r#"{"apple":2,"zebra":1}"#);
    }

    #[test]
    fn nested_object_keys_are_sorted() {
        let out = normalize_arguments(r#"{"b":{"y":1,"x":2},"a":0}"#);
        assert_eq!(out, r#"{"a":0,"b":{"x":2,"y":1}}"#);
    }

    #[test]
    fn ampersand_round_trips_as_unicode_escape() {
        // Provider sends `&&` as `\u0026\u0026`; normalization must emit the
        // escapes verbatim rather than decoding them to bare ampersands.
        let raw = r#""{\"command\":\"mkdir t \u0026\u0026 cd t\"}""#;
        let out = normalize_arguments(raw);
        assert!(
            out.contains(r"\u0026\u0026"),
            "escapes must survive: {out}"
        );
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["command"], "mkdir t && cd t");
    }

    #[test]
    fn bare_ampersand_in_object_is_escaped_on_output() {
        let out = normalize_arguments(r#"{"command":"a && b"}"#);
        assert_eq!(out, r#"{"command":"a \u0026\u0026 b"}"#);
    }

    #[test]
    fn angle_brackets_are_escaped() {
        let out = normalize_arguments(r#"{"html":"<b>"}"#);
        assert_eq!(out, r#"{"html":"\u003cb\u003e"}"#);
    }

    #[test]
    fn control_characters_are_escaped() {
        let out = normalize_arguments("{\"s\":\"a\\nb\"}");
        assert_eq!(out, r#"{"s":"a\nb"}"#);
    }

    // ── Idempotence ───────────────────────────────────────────────────────────

    #[test]
    fn normalization_is_idempotent() {
        let cases = [
            r#"{"command":"ls"}"#,
            r#""{\"command\":\"ls\"}""#,
            r#""\"{\\\"command\\\":\\\"ls -la\\\"}\"""#,
            r#"{"command":"mkdir t && cd t"}"#,
            r#"{"zebra":1,"apple":{"nested":"<x>"}}"#,
            "not json at all {",
            "null",
            "[3,2,1]",
        ];
        for raw in cases {
            let once = normalize_arguments(raw);
            let twice = normalize_arguments(&once);
            assert_eq!(once, twice, "not idempotent for input: {raw}");
        }
    }
}
