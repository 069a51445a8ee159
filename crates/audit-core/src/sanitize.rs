//! Secret redaction for audit `changes` payloads
//!
//! Keys are matched case-insensitively after stripping `_`, `-`, `.` and
//! spaces, so `api_key`, `Api-Key` and `APIKEY` all hit the `apikey` entry.
//! Denylisted keys are removed rather than masked: the audit trail records
//! *that* a credential changed through the event itself, never its value.

use serde_json::{Map, Value};

/// Key fragments that are never persisted in `changes`
pub const DEFAULT_DENYLIST: &[&str] = &[
    "password",
    "passwd",
    "passphrase",
    "secret",
    "token",
    "apikey",
    "credential",
    "privatekey",
    "authorization",
    "cookie",
    "sessionid",
];

/// Removes denylisted keys from JSON values at any nesting depth
#[derive(Debug, Clone, Default)]
pub struct Sanitizer {
    extra: Vec<String>,
}

impl Sanitizer {
    /// Default denylist plus additional key fragments
    pub fn with_extra_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extra: keys
                .into_iter()
                .map(|k| normalize(k.as_ref()))
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// Check whether a key must be stripped
    pub fn is_denied(&self, key: &str) -> bool {
        let key = normalize(key);
        DEFAULT_DENYLIST.iter().any(|frag| key.contains(frag))
            || self.extra.iter().any(|frag| key.contains(frag.as_str()))
    }

    /// Return a sanitized copy
    pub fn sanitize(&self, value: &Value) -> Value {
        let mut value = value.clone();
        self.sanitize_in_place(&mut value);
        value
    }

    /// Sanitize a JSON object map
    pub fn sanitize_map(&self, map: &Map<String, Value>) -> Map<String, Value> {
        let mut map = map.clone();
        self.strip_map(&mut map);
        map
    }

    pub fn sanitize_in_place(&self, value: &mut Value) {
        match value {
            Value::Object(map) => self.strip_map(map),
            Value::Array(items) => items.iter_mut().for_each(|item| self.sanitize_in_place(item)),
            _ => {}
        }
    }

    fn strip_map(&self, map: &mut Map<String, Value>) {
        map.retain(|key, _| !self.is_denied(key));
        for nested in map.values_mut() {
            self.sanitize_in_place(nested);
        }
    }
}

fn normalize(key: &str) -> String {
    key.chars()
        .filter(|c| !matches!(c, '_' | '-' | '.' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Returns true if no key at any depth is denylisted
pub fn is_clean(sanitizer: &Sanitizer, value: &Value) -> bool {
    match value {
        Value::Object(map) => map
            .iter()
            .all(|(k, v)| !sanitizer.is_denied(k) && is_clean(sanitizer, v)),
        Value::Array(items) => items.iter().all(|v| is_clean(sanitizer, v)),
        _ => true,
    }
}
