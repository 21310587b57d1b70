//! Recursive deep merge of JSON configuration.
//!
//! Nested objects merge key by key. Arrays and scalars replace the target
//! value wholesale. Keys that could corrupt prototype-based consumers of the
//! configuration (`__proto__`, `constructor`, `prototype`) are dropped from
//! the patch at every depth.

use serde_json::{Map, Value};
use tracing::debug;

/// Keys never copied from a patch.
pub const FORBIDDEN_KEYS: &[&str] = &["__proto__", "constructor", "prototype"];

/// Merge `patch` into `target` in place.
///
/// A non-object patch replaces `target`.
pub fn deep_merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => merge_objects(target, patch),
        (target, patch) => *target = patch.clone(),
    }
}

/// Merge `patch` into a copy of `base`.
#[must_use]
pub fn merged(base: &Value, patch: &Value) -> Value {
    let mut out = base.clone();
    deep_merge(&mut out, patch);
    out
}

fn merge_objects(target: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, value) in patch {
        if FORBIDDEN_KEYS.contains(&key.as_str()) {
            debug!(key = key.as_str(), "skipping forbidden merge key");
            continue;
        }
        match value {
            Value::Object(child) => {
                let slot = target
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !slot.is_object() {
                    *slot = Value::Object(Map::new());
                }
                if let Value::Object(slot) = slot {
                    merge_objects(slot, child);
                }
            }
            other => {
                target.insert(key.clone(), other.clone());
            }
        }
    }
}
