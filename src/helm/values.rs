//! # Helm Values
//!
//! Helm merges `-f` files left to right: maps merge key by key, anything else
//! is replaced by the later file. The same rule is reproduced here so merged
//! values can be digested and compared in memory.

use serde_json::Value;

/// Deep-merge `overlay` into `base`; values from `overlay` win
pub fn merge_into(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge_into(existing, value);
                    }
                    _ => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Merge value documents in order; later documents win
#[must_use]
pub fn merge_all(documents: impl IntoIterator<Item = Value>) -> Value {
    let mut merged = Value::Object(serde_json::Map::new());
    for document in documents {
        if document.is_null() {
            continue;
        }
        merge_into(&mut merged, document);
    }
    merged
}

/// Stable digest of a values tree
#[must_use]
pub fn digest(values: &Value) -> String {
    // serde_json maps are ordered, so serialisation is stable for equal trees
    format!("{:x}", md5::compute(values.to_string().as_bytes()))
}
