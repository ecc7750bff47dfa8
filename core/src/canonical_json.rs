//! Canonical JSON compaction used for audit `detail_json` (spec §4.4 step 2,
//! §9). Rules: UTF-8, no BOM, object keys sorted lexicographically, no
//! insignificant whitespace, numeric text preserved exactly as parsed (no
//! re-rounding of floats) — this requires serde_json's `arbitrary_precision`
//! feature, since plain `f64` round-tripping can change the last digits of a
//! literal.

use crate::error::CoreResult;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Re-serializes `value` with sorted keys and no extraneous whitespace.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> CoreResult<Vec<u8>> {
    let v = serde_json::to_value(value)?;
    let normalized = sort_keys(v);
    Ok(serde_json::to_string(&normalized)?.into_bytes())
}

/// Compact form used by the audit log: `{}` for an absent/empty detail,
/// otherwise the canonical-sorted, whitespace-free rendering.
pub fn compact_detail(detail: Option<&Value>) -> CoreResult<String> {
    match detail {
        None => Ok("{}".to_string()),
        Some(Value::Null) => Ok("{}".to_string()),
        Some(Value::Object(m)) if m.is_empty() => Ok("{}".to_string()),
        Some(v) => Ok(String::from_utf8(to_canonical_bytes(v)?).expect("json is valid utf-8")),
    }
}

fn sort_keys(v: Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut ordered: BTreeMap<String, Value> = BTreeMap::new();
            for (k, vv) in map {
                ordered.insert(k, sort_keys(vv));
            }
            let mut out = serde_json::Map::new();
            for (k, vv) in ordered {
                out.insert(k, vv);
            }
            Value::Object(out)
        }
        Value::Array(arr) => Value::Array(arr.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_order_does_not_affect_canonical_bytes() {
        let a = serde_json::json!({"b": 1, "a": {"y": 2, "x": 3}});
        let b = serde_json::json!({"a": {"x": 3, "y": 2}, "b": 1});
        assert_eq!(to_canonical_bytes(&a).unwrap(), to_canonical_bytes(&b).unwrap());
    }

    #[test]
    fn compact_detail_empty_becomes_empty_object() {
        assert_eq!(compact_detail(None).unwrap(), "{}");
        assert_eq!(compact_detail(Some(&serde_json::json!({}))).unwrap(), "{}");
    }

    #[test]
    fn compact_detail_preserves_numeric_text() {
        let v: Value = serde_json::from_str(r#"{"amount": 1.500000}"#).unwrap();
        let out = compact_detail(Some(&v)).unwrap();
        assert_eq!(out, r#"{"amount":1.500000}"#);
    }
}
