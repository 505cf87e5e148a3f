// emptiness.rs: recursive emptiness test and nested pruning
use serde_json::Value;

use crate::keys::sanitize_owned;

/// A value carries no information if it is an empty string or a record whose
/// fields are all empty (`{}` included). Arrays are opaque.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::String(s) => s.is_empty(),
        Value::Object(map) => map.values().all(is_empty),
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::Array(_) => false,
    }
}

/// Drop empty fields inside a nested record, depth-first.
///
/// `value` itself is never removed; that is the caller's call. When
/// `nested_replacement` is set, nested keys are sanitized on the way down.
/// Returns true if anything was dropped or renamed.
pub fn prune_nested(value: &mut Value, nested_replacement: Option<&str>) -> bool {
    let Value::Object(map) = value else {
        return false;
    };
    let mut changed = false;
    for (key, mut child) in std::mem::take(map) {
        changed |= prune_nested(&mut child, nested_replacement);
        if is_empty(&child) {
            changed = true;
            continue;
        }
        let (key, renamed) = sanitize_owned(key, nested_replacement);
        changed |= renamed;
        map.insert(key, child);
    }
    changed
}
