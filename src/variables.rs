use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// A scalar value held by the [`VariableStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Number(f64),
    Bool(bool),
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::String(s) => s.parse().ok(),
            Value::Bool(_) => None,
        }
    }

    pub fn as_str_form(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            Value::Bool(b) => b.to_string(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// `${name}` substitution pattern matcher. `${name || default}` falls back to
/// `default` when `name` is absent; a bare missing `${name}` is left as the
/// literal placeholder with a logged warning, per the substitution contract.
#[derive(Debug, Default)]
pub struct VariableStore {
    values: HashMap<String, Value>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    pub fn from_map(map: HashMap<String, Value>) -> Self {
        Self { values: map }
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// `INCREMENT_VARIABLE`: adds `delta` to an existing numeric variable,
    /// creating it with 0 if absent.
    pub fn increment(&mut self, name: &str, delta: f64) -> f64 {
        let current = self.get(name).and_then(Value::as_number).unwrap_or(0.0);
        let updated = current + delta;
        self.values
            .insert(name.to_string(), Value::Number(updated));
        updated
    }

    /// Replaces every `${name}` (and `${name || default}`) occurrence in `s`.
    pub fn substitute(&self, s: &str) -> String {
        let mut out = String::with_capacity(s.len());
        let bytes = s.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'$' && i + 1 < bytes.len() && bytes[i + 1] == b'{' {
                if let Some(end) = s[i + 2..].find('}') {
                    let inner = &s[i + 2..i + 2 + end];
                    out.push_str(&self.resolve_inner(inner));
                    i = i + 2 + end + 1;
                    continue;
                }
            }
            let ch = s[i..].chars().next().expect("i is a valid char boundary");
            out.push(ch);
            i += ch.len_utf8();
        }
        out
    }

    fn resolve_inner(&self, inner: &str) -> String {
        let (name, default) = match inner.split_once("||") {
            Some((n, d)) => (n.trim(), Some(d.trim())),
            None => (inner.trim(), None),
        };

        if let Some(v) = self.values.get(name) {
            return v.as_str_form();
        }

        if let Some(d) = default {
            return d.trim_matches('"').trim_matches('\'').to_string();
        }

        warn!("variable '{}' not found during substitution", name);
        format!("${{{}}}", inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_variables() {
        let mut store = VariableStore::new();
        store.set("user", Value::from("ada"));
        store.set("n", Value::from(7.0));
        assert_eq!(
            store.substitute("hello ${user}, number ${n}"),
            "hello ada, number 7"
        );
    }

    #[test]
    fn missing_variable_left_as_placeholder() {
        let store = VariableStore::new();
        assert_eq!(store.substitute("x=${nope}"), "x=${nope}");
    }

    #[test]
    fn default_fallback_used_when_missing() {
        let store = VariableStore::new();
        assert_eq!(store.substitute("v=${nope || 'fallback'}"), "v=fallback");
    }

    #[test]
    fn substitution_is_idempotent() {
        let mut store = VariableStore::new();
        store.set("x", Value::from(1.0));
        let once = store.substitute("value ${x}");
        let twice = store.substitute(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn substitution_preserves_multibyte_utf8_literal_text() {
        let mut store = VariableStore::new();
        store.set("x", Value::from("latte"));
        assert_eq!(store.substitute("café ${x} — crème"), "café latte — crème");
    }

    #[test]
    fn increment_creates_with_zero_base() {
        let mut store = VariableStore::new();
        assert_eq!(store.increment("i", 1.0), 1.0);
        assert_eq!(store.increment("i", 1.0), 2.0);
    }
}
