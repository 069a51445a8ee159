//! Field-level diffs for entity changes
//!
//! The `changes` payload for each mutation kind:
//!
//! - create: `{"after": {...}}`
//! - update: `{"before": {changed fields}, "after": {changed fields}}`
//! - delete: `{"before": {...}}`
//!
//! A field present on only one side is reported as `null` on the other.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::sanitize::Sanitizer;

/// Diff two snapshots, keeping only changed, non-denylisted fields
pub fn field_diff(
    before: &Map<String, Value>,
    after: &Map<String, Value>,
    sanitizer: &Sanitizer,
) -> Value {
    let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();

    let mut old = Map::new();
    let mut new = Map::new();
    for key in keys {
        if sanitizer.is_denied(key) {
            continue;
        }
        let prev = before.get(key).unwrap_or(&Value::Null);
        let next = after.get(key).unwrap_or(&Value::Null);
        if prev == next {
            continue;
        }
        old.insert(key.clone(), sanitizer.sanitize(prev));
        new.insert(key.clone(), sanitizer.sanitize(next));
    }

    let mut changes = Map::new();
    changes.insert("before".to_string(), Value::Object(old));
    changes.insert("after".to_string(), Value::Object(new));
    Value::Object(changes)
}

/// Changes payload for a newly created record
pub fn created(after: &Map<String, Value>, sanitizer: &Sanitizer) -> Value {
    single_side("after", after, sanitizer)
}

/// Changes payload for a deleted record
pub fn deleted(before: &Map<String, Value>, sanitizer: &Sanitizer) -> Value {
    single_side("before", before, sanitizer)
}

fn single_side(side: &str, fields: &Map<String, Value>, sanitizer: &Sanitizer) -> Value {
    let mut changes = Map::new();
    changes.insert(side.to_string(), Value::Object(sanitizer.sanitize_map(fields)));
    Value::Object(changes)
}

/// Check whether an update diff recorded any changed field
pub fn is_empty_diff(changes: &Value) -> bool {
    changes
        .get("after")
        .and_then(Value::as_object)
        .is_none_or(Map::is_empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_only_changed_fields_are_kept() {
        let before = obj(json!({"id": 42, "status": "scheduled", "notes": "x"}));
        let after = obj(json!({"id": 42, "status": "confirmed", "notes": "x"}));

        let diff = field_diff(&before, &after, &Sanitizer::default());
        assert_eq!(
            diff,
            json!({"before": {"status": "scheduled"}, "after": {"status": "confirmed"}})
        );
    }

    #[test]
    fn test_denylisted_fields_never_appear() {
        let before = obj(json!({"password": "old", "email": "a@x"}));
        let after = obj(json!({"password": "new", "email": "b@x"}));

        let diff = field_diff(&before, &after, &Sanitizer::default());
        assert!(diff["before"].get("password").is_none());
        assert!(diff["after"].get("password").is_none());
        assert_eq!(diff["after"]["email"], "b@x");
    }

    #[test]
    fn test_added_and_removed_fields_use_null() {
        let before = obj(json!({"a": 1}));
        let after = obj(json!({"b": 2}));

        let diff = field_diff(&before, &after, &Sanitizer::default());
        assert_eq!(diff["before"], json!({"a": 1, "b": null}));
        assert_eq!(diff["after"], json!({"a": null, "b": 2}));
    }

    #[test]
    fn test_noop_update_yields_empty_maps() {
        let snapshot = obj(json!({"a": 1}));
        let diff = field_diff(&snapshot, &snapshot, &Sanitizer::default());
        assert!(is_empty_diff(&diff));
        assert_eq!(diff, json!({"before": {}, "after": {}}));
    }

    #[test]
    fn test_created_and_deleted_are_sanitized() {
        let fields = obj(json!({"name": "Ann", "token": "t"}));
        let sanitizer = Sanitizer::default();
        assert_eq!(created(&fields, &sanitizer), json!({"after": {"name": "Ann"}}));
        assert_eq!(deleted(&fields, &sanitizer), json!({"before": {"name": "Ann"}}));
    }
}
