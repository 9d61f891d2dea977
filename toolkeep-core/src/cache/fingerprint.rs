use serde_json::Value;
use sha2::{Digest, Sha256};

/// Logical cache key for one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    tool_id: String,
    canonical_params: String,
}

impl CacheKey {
    pub fn new(tool_id: impl Into<String>, params: &Value) -> Self {
        Self {
            tool_id: tool_id.into(),
            canonical_params: canonical_json(params),
        }
    }

    pub fn tool_id(&self) -> &str {
        &self.tool_id
    }

    /// `tool_id|canonical_json(params)`, the string that gets hashed.
    pub fn logical(&self) -> String {
        format!("{}|{}", self.tool_id, self.canonical_params)
    }

    /// SHA-256 hex digest of [`CacheKey::logical`].
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.logical())
    }
}

/// SHA-256 hex digest of an arbitrary logical key.
pub fn fingerprint(logical_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(logical_key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Serialize `value` with object keys sorted at every depth, so that
/// parameter objects differing only in key order produce the same key.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (index, (key, value)) in entries.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_change_fingerprint() {
        let a = CacheKey::new("metrics", &json!({"file": "a.ts", "opts": {"x": 1, "y": [2, {"b": 1, "a": 0}]}}));
        let b = CacheKey::new("metrics", &json!({"opts": {"y": [2, {"a": 0, "b": 1}], "x": 1}, "file": "a.ts"}));
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn tool_and_params_both_matter() {
        let params = json!({"file": "a.ts"});
        assert_ne!(
            CacheKey::new("metrics", &params).fingerprint(),
            CacheKey::new("imports", &params).fingerprint()
        );
        assert_ne!(
            CacheKey::new("metrics", &params).fingerprint(),
            CacheKey::new("metrics", &json!({"file": "b.ts"})).fingerprint()
        );
    }

    #[test]
    fn canonical_form_is_compact_and_sorted() {
        assert_eq!(
            canonical_json(&json!({"b": [true, null], "a": "x\"y"})),
            r#"{"a":"x\"y","b":[true,null]}"#
        );
        assert_eq!(
            CacheKey::new("t", &json!({})).logical(),
            "t|{}"
        );
    }
}
