//! Statically extracted expression values
//!
//! Source analysis is inherently partial: an expression either reduces to a
//! literal structure or it does not. The [`Value`] variant models both
//! outcomes explicitly instead of guessing.

use serde::{Deserialize, Serialize};

/// A value recovered from a source expression without executing the code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// A scalar constant: string, number, boolean or null.
    Literal(serde_json::Value),
    /// A bare name referencing something defined elsewhere.
    Identifier(String),
    /// A list literal whose elements were extracted recursively.
    Sequence(Vec<Value>),
    /// A mapping literal; entries whose key could not be extracted are dropped.
    Mapping(Vec<(Value, Value)>),
    /// Anything that cannot be reduced statically, kept as source text.
    Unresolved(String),
}

impl Value {
    /// String content of a `Literal` string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Literal(serde_json::Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Name of an `Identifier` value.
    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            Value::Identifier(name) => Some(name),
            _ => None,
        }
    }

    /// The name this value denotes: a string literal's content or a bare
    /// identifier's name. Node ids and edge endpoints resolve through this.
    pub fn name(&self) -> Option<&str> {
        self.as_str().or_else(|| self.as_identifier())
    }

    /// Elements of a `Sequence` value.
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self, Value::Unresolved(_))
    }

    /// Best-effort JSON rendering for config payloads. Identifiers and
    /// unresolved expressions degrade to their source text.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Literal(v) => v.clone(),
            Value::Identifier(name) => serde_json::Value::String(name.clone()),
            Value::Sequence(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Mapping(entries) => {
                let mut map = serde_json::Map::new();
                for (key, value) in entries {
                    let key = match key {
                        Value::Literal(serde_json::Value::String(s)) => s.clone(),
                        Value::Identifier(name) => name.clone(),
                        other => other.to_json().to_string(),
                    };
                    map.insert(key, value.to_json());
                }
                serde_json::Value::Object(map)
            }
            Value::Unresolved(text) => serde_json::Value::String(text.clone()),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Literal(serde_json::Value::String(v.to_string()))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Literal(serde_json::Value::Bool(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Literal(serde_json::Value::Number(v.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_resolution() {
        assert_eq!(Value::from("search").name(), Some("search"));
        assert_eq!(Value::Identifier("search_fn".into()).name(), Some("search_fn"));
        assert_eq!(Value::Unresolved("f(x)".into()).name(), None);
    }

    #[test]
    fn test_mapping_to_json() {
        let mapping = Value::Mapping(vec![
            (Value::from("retries"), Value::from(3i64)),
            (Value::Identifier("model".into()), Value::from("gpt-4")),
        ]);
        let json = mapping.to_json();
        assert_eq!(json["retries"], 3);
        assert_eq!(json["model"], "gpt-4");
    }

    #[test]
    fn test_serde_round_trip() {
        let value = Value::Sequence(vec![Value::from("a"), Value::Unresolved("b()".into())]);
        let text = serde_json::to_string(&value).unwrap();
        let back: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(back, value);
    }
}
