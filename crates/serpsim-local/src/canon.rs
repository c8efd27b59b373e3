//! Deterministic stringification of structured snippets.
//!
//! Answer boxes arrive as arbitrary JSON. Similarity scores must not depend on the
//! key order a server happened to emit, so every structured value is rendered the
//! same way before tokenization:
//!
//! - strings verbatim (no surrounding quotes)
//! - everything else as compact JSON with object keys sorted recursively

use serde_json::Value;

pub fn canonical_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => {
            let mut out = String::new();
            write_canonical(other, &mut out);
            out
        }
    }
}

fn write_canonical(v: &Value, out: &mut String) {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, k) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                write_canonical(&map[k.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Whether a structured value carries anything worth comparing.
///
/// `null`, empty strings and empty containers count as "nothing here".
pub fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strings_are_verbatim() {
        assert_eq!(canonical_text(&json!("Bora Bora is an island")), "Bora Bora is an island");
    }

    #[test]
    fn object_keys_are_sorted_recursively() {
        let a = json!({"b": 1, "a": {"z": [1, {"y": 2, "x": 3}], "c": null}});
        assert_eq!(
            canonical_text(&a),
            r#"{"a":{"c":null,"z":[1,{"x":3,"y":2}]},"b":1}"#
        );
    }

    #[test]
    fn key_order_does_not_change_the_text() {
        let a: Value = serde_json::from_str(r#"{"title":"T","text":"hello"}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"text":"hello","title":"T"}"#).unwrap();
        assert_eq!(canonical_text(&a), canonical_text(&b));
    }

    #[test]
    fn blank_values() {
        assert!(is_blank(&json!(null)));
        assert!(is_blank(&json!(" ")));
        assert!(is_blank(&json!({})));
        assert!(is_blank(&json!([])));
        assert!(!is_blank(&json!(false)));
        assert!(!is_blank(&json!({"a": null})));
    }
}
