//! Canonical JSON and BLAKE3 digests
//!
//! Object keys are sorted recursively and no whitespace is emitted, so the
//! same value always produces the same bytes and the same digest.

use serde::Serialize;
use serde_json::Value;

use crate::errors::Result;

/// Serialize with sorted keys and no whitespace
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String> {
    let canonical = canonicalize_value(serde_json::to_value(value)?);
    Ok(serde_json::to_string(&canonical)?)
}

fn canonicalize_value(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, canonicalize_value(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize_value).collect()),
        other => other,
    }
}

/// Hex BLAKE3 digest of raw bytes
pub fn digest_hex(bytes: &[u8]) -> String {
    hex::encode(blake3::hash(bytes).as_bytes())
}

/// Hex BLAKE3 digest of the canonical JSON form
pub fn hash_canonical_hex<T: Serialize>(value: &T) -> Result<String> {
    Ok(digest_hex(to_canonical_json(value)?.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Unordered {
        b_field: i64,
        a_field: f64,
        z_field: Vec<Inner>,
    }

    #[derive(Serialize)]
    struct Inner {
        zeta: i64,
        alpha: i64,
    }

    fn sample(b: i64) -> Unordered {
        Unordered {
            b_field: b,
            a_field: 0.1,
            z_field: vec![Inner { zeta: 2, alpha: 1 }],
        }
    }

    #[test]
    fn test_keys_sorted_recursively() {
        let json = to_canonical_json(&sample(2)).unwrap();
        assert_eq!(
            json,
            r#"{"a_field":0.1,"b_field":2,"z_field":[{"alpha":1,"zeta":2}]}"#
        );
    }

    #[test]
    fn test_hash_changes_with_data() {
        let a = hash_canonical_hex(&sample(2)).unwrap();
        assert_eq!(a, hash_canonical_hex(&sample(2)).unwrap());
        assert_ne!(a, hash_canonical_hex(&sample(3)).unwrap());
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_floats_survive_round_trip() {
        let values = vec![0.1f64, 1.0 / 3.0, 123_456.789_012_345_6, -2.5e-300];
        let json = to_canonical_json(&values).unwrap();
        let back: Vec<f64> = serde_json::from_str(&json).unwrap();
        assert_eq!(values, back);
    }
}
