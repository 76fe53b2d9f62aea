//! Canonical JSON serialization and SHA-256 digests.
//!
//! Canonical form: object keys sorted by byte order, arrays in their original
//! order, no insignificant whitespace, numbers in `serde_json`'s single
//! textual form, strings escaped with the JSON minimum (quotes, backslash,
//! control characters) and otherwise emitted as raw UTF-8.

use crate::error::{PackError, Result};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest as _, Sha256};

/// Nesting limit for canonicalization.
///
/// Owned JSON trees cannot alias, so the only way to feed an unbounded or
/// cyclic structure through here is unbounded nesting.
pub const MAX_DEPTH: usize = 128;

/// Length of a SHA-256 digest rendered as hex.
pub const SHA256_HEX_LEN: usize = 64;

/// Serialize a JSON value to its canonical byte form.
///
/// # Errors
///
/// Returns [`PackError::Canonical`] if the value nests deeper than
/// [`MAX_DEPTH`] or contains a non-finite number.
pub fn canonicalize(value: &Value) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_value(value, 0, &mut out)?;
    Ok(out)
}

/// Canonicalize any serializable value.
///
/// # Errors
///
/// Returns [`PackError::Canonical`] if serde cannot represent the value as
/// JSON (for example a map with non-string keys), or for the reasons listed
/// on [`canonicalize`].
pub fn canonicalize_serializable<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let value = serde_json::to_value(value)
        .map_err(|e| PackError::Canonical(format!("unsupported value: {e}")))?;
    canonicalize(&value)
}

/// SHA-256 of `bytes` as lowercase hex.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{digest:x}")
}

/// SHA-256 of the canonical form of `value`.
///
/// # Errors
///
/// See [`canonicalize`].
pub fn hash_value(value: &Value) -> Result<String> {
    canonicalize(value).map(|bytes| hash_bytes(&bytes))
}

/// True when `s` is exactly 64 lowercase hex characters.
pub fn is_sha256_hex(s: &str) -> bool {
    s.len() == SHA256_HEX_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn write_value(value: &Value, depth: usize, out: &mut Vec<u8>) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(PackError::Canonical(format!(
            "cannot canonicalize cyclic or unbounded structure (nesting exceeds {MAX_DEPTH})"
        )));
    }

    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => {
            if n.as_f64().is_some_and(|f| !f.is_finite()) {
                return Err(PackError::Canonical(format!("non-finite number: {n}")));
            }
            out.extend_from_slice(n.to_string().as_bytes());
        }
        Value::String(s) => write_string(s, out)?,
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(item, depth + 1, out)?;
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

            out.push(b'{');
            for (i, (key, child)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_string(key, out)?;
                out.push(b':');
                write_value(child, depth + 1, out)?;
            }
            out.push(b'}');
        }
    }

    Ok(())
}

fn write_string(s: &str, out: &mut Vec<u8>) -> Result<()> {
    serde_json::to_writer(&mut *out, s)
        .map_err(|e| PackError::Canonical(format!("string encoding failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_key_order_independent() {
        let a: Value = serde_json::from_str(r#"{"b":1,"a":{"y":[1,2],"x":null}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a":{"x":null,"y":[1,2]},"b":1}"#).unwrap();

        assert_eq!(canonicalize(&a).unwrap(), canonicalize(&b).unwrap());
        assert_eq!(
            String::from_utf8(canonicalize(&a).unwrap()).unwrap(),
            r#"{"a":{"x":null,"y":[1,2]},"b":1}"#
        );
    }

    #[test]
    fn test_array_order_is_significant() {
        let a = json!([1, 2, 3]);
        let b = json!([3, 2, 1]);
        assert_ne!(hash_value(&a).unwrap(), hash_value(&b).unwrap());
    }

    #[test]
    fn test_strings_stay_utf8() {
        let v = json!({"title": "Gerüst prüfen \"A\"\n"});
        let bytes = canonicalize(&v).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "{\"title\":\"Gerüst prüfen \\\"A\\\"\\n\"}"
        );
    }

    #[test]
    fn test_numbers_single_representation() {
        let v = json!({"int": 10, "neg": -3, "float": 1.5});
        assert_eq!(
            String::from_utf8(canonicalize(&v).unwrap()).unwrap(),
            r#"{"float":1.5,"int":10,"neg":-3}"#
        );
    }

    #[test]
    fn test_hash_known_value() {
        // SHA-256 of "hello world"
        assert_eq!(
            hash_bytes(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_hash_is_deterministic_and_well_formed() {
        let v = json!({"summary": {"total_controls": 3}});
        let h1 = hash_value(&v).unwrap();
        let h2 = hash_value(&v).unwrap();
        assert_eq!(h1, h2, "Hash should be deterministic");
        assert!(is_sha256_hex(&h1));
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let mut v = json!(0);
        for _ in 0..=MAX_DEPTH + 1 {
            v = json!([v]);
        }
        let err = canonicalize(&v).unwrap_err();
        assert!(err.to_string().contains("cyclic"));
    }

    #[test]
    fn test_non_string_keys_unsupported() {
        let mut map = HashMap::new();
        map.insert((1, 2), "pair key");
        let err = canonicalize_serializable(&map).unwrap_err();
        assert!(matches!(err, PackError::Canonical(_)));
    }

    #[test]
    fn test_is_sha256_hex() {
        assert!(is_sha256_hex(&"a".repeat(64)));
        assert!(!is_sha256_hex(&"A".repeat(64)));
        assert!(!is_sha256_hex(&"a".repeat(63)));
        assert!(!is_sha256_hex(&"g".repeat(64)));
    }
}
