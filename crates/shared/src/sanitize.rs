//! Normalization of document-store identifiers in fetched JSON.
//!
//! Backends exporting straight from a document store leak the store's internal
//! identifier (`_id`, often in extended-JSON form `{"$oid": "..."}`) into every
//! object. [`Sanitizer`] either drops that key or collapses it to its scalar
//! form, at any depth, without recursing on the call stack.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_RESERVED_KEY: &str = "_id";
pub const DEFAULT_EXTERNAL_ID_KEYS: &[&str] = &["$oid"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanitizePolicy {
    /// Remove the reserved key wherever it appears.
    DropIdentifier,
    /// Keep the reserved key but replace `{"$oid": "abc"}` with `"abc"`.
    /// Identifiers that cannot be reduced to a scalar are removed.
    ExtractScalar,
}

impl std::str::FromStr for SanitizePolicy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "drop" | "drop_identifier" => Ok(Self::DropIdentifier),
            "extract" | "extract_scalar" => Ok(Self::ExtractScalar),
            other => Err(format!("unknown sanitize policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitizer {
    policy: SanitizePolicy,
    reserved_key: String,
    external_id_keys: Vec<String>,
}

impl Sanitizer {
    pub fn new(policy: SanitizePolicy) -> Self {
        Self {
            policy,
            reserved_key: DEFAULT_RESERVED_KEY.to_string(),
            external_id_keys: DEFAULT_EXTERNAL_ID_KEYS
                .iter()
                .map(|key| (*key).to_string())
                .collect(),
        }
    }

    pub fn with_reserved_key(mut self, reserved_key: impl Into<String>) -> Self {
        self.reserved_key = reserved_key.into();
        self
    }

    pub fn with_external_id_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.external_id_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn policy(&self) -> SanitizePolicy {
        self.policy
    }

    pub fn sanitize(&self, mut value: Value) -> Value {
        self.sanitize_in_place(&mut value);
        value
    }

    pub fn sanitize_in_place(&self, value: &mut Value) {
        let mut pending: Vec<&mut Value> = vec![value];
        while let Some(current) = pending.pop() {
            match current {
                Value::Array(items) => pending.extend(items.iter_mut()),
                Value::Object(fields) => {
                    self.rewrite_identifier(fields);
                    pending.extend(fields.values_mut());
                }
                _ => {}
            }
        }
    }

    fn rewrite_identifier(&self, fields: &mut Map<String, Value>) {
        let Some(identifier) = fields.get(&self.reserved_key) else {
            return;
        };

        let replacement = match self.policy {
            SanitizePolicy::DropIdentifier => None,
            SanitizePolicy::ExtractScalar => self.scalar_identifier(identifier),
        };

        match replacement {
            Some(scalar) => {
                // Map::insert on an existing key keeps its position.
                fields.insert(self.reserved_key.clone(), scalar);
            }
            None => {
                let reserved_key = self.reserved_key.as_str();
                *fields = std::mem::take(fields)
                    .into_iter()
                    .filter(|(key, _)| key != reserved_key)
                    .collect();
            }
        }
    }

    fn scalar_identifier(&self, identifier: &Value) -> Option<Value> {
        match identifier {
            Value::String(_) | Value::Number(_) | Value::Bool(_) => Some(identifier.clone()),
            Value::Object(inner) => self
                .external_id_keys
                .iter()
                .find_map(|key| inner.get(key))
                .filter(|value| is_scalar(value))
                .cloned(),
            Value::Null | Value::Array(_) => None,
        }
    }
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

#[cfg(test)]
#[path = "tests/sanitize_tests.rs"]
mod tests;
