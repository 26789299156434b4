//! Deep merge of a user document onto the defaults.
//!
//! Objects present on both sides are merged key by key; any other value
//! (array, scalar, null, or an object on only one side) replaces the base
//! value wholesale. Arrays are never concatenated.

use serde_json::Value;

/// Merge `overlay` onto `base`, returning a new document. Pure.
pub fn merge(base: &Value, overlay: &Value) -> Value {
    let mut out = base.clone();
    merge_into(&mut out, overlay);
    out
}

/// Merge `overlay` into `target` in place (overlay wins on conflicting leaves).
pub fn merge_into(target: &mut Value, overlay: &Value) {
    match (target, overlay) {
        (Value::Object(target), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let recurse = value.is_object() && target.get(key).is_some_and(Value::is_object);
                if let Some(existing) = target.get_mut(key).filter(|_| recurse) {
                    merge_into(existing, value);
                } else {
                    target.insert(key.clone(), value.clone());
                }
            }
        }
        (target, overlay) => *target = overlay.clone(),
    }
}
