use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::{null_as_default, ReconciliationResult};

/// Keys tried, in order, when the reconciled backlog arrives wrapped in an object.
pub const RECORD_LIST_WRAPPER_KEYS: &[&str] = &[
    "data",
    "records",
    "items",
    "results",
    "failed_records",
    "idoc_data",
];

/// Body of the backlog endpoint. Counts are kept raw so the caller can coerce
/// them; the backend has been seen sending numbers, numeric strings and nulls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacklogResponse {
    #[serde(default)]
    pub failed_records: Value,
    #[serde(default)]
    pub success_count: Value,
    #[serde(default)]
    pub failure_count: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationResponse {
    /// Entries that are not objects are skipped so one bad row cannot hide
    /// an update the backend already applied.
    #[serde(default, deserialize_with = "deserialize_results")]
    pub results: Vec<ReconciliationResult>,
}

fn deserialize_results<'de, D>(deserializer: D) -> Result<Vec<ReconciliationResult>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<Value> = null_as_default(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect())
}

/// Shape in which a record list was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordListShape {
    Bare,
    Wrapped(&'static str),
    Null,
    Unrecognized(String),
}

impl RecordListShape {
    pub fn is_recognized(&self) -> bool {
        matches!(self, Self::Bare | Self::Wrapped(_) | Self::Null)
    }
}

/// Pulls a record list out of a response body. Unknown shapes yield an empty
/// list together with a description of what was seen.
pub fn unwrap_record_list(body: Value) -> (Vec<Value>, RecordListShape) {
    match body {
        Value::Array(items) => (items, RecordListShape::Bare),
        Value::Null => (Vec::new(), RecordListShape::Null),
        Value::Object(mut fields) => {
            for key in RECORD_LIST_WRAPPER_KEYS {
                if matches!(fields.get(*key), Some(Value::Array(_))) {
                    if let Some(Value::Array(items)) = fields.remove(*key) {
                        return (items, RecordListShape::Wrapped(key));
                    }
                }
            }
            let keys: Vec<&str> = fields.keys().map(String::as_str).collect();
            (
                Vec::new(),
                RecordListShape::Unrecognized(format!("object with keys [{}]", keys.join(", "))),
            )
        }
        other => (
            Vec::new(),
            RecordListShape::Unrecognized(json_kind(&other).to_string()),
        ),
    }
}

/// Coerces a count to a non-negative integer. Missing, negative or non-numeric
/// values become 0; fractional values are truncated.
pub fn parse_count(value: &Value) -> u64 {
    match value {
        Value::Number(number) => number.as_u64().unwrap_or_else(|| {
            number
                .as_f64()
                .filter(|count| count.is_finite() && *count >= 0.0)
                .map_or(0, |count| count.trunc() as u64)
        }),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<u64>().unwrap_or_else(|_| {
                text.parse::<f64>()
                    .ok()
                    .filter(|count| count.is_finite() && *count >= 0.0)
                    .map_or(0, |count| count.trunc() as u64)
            })
        }
        _ => 0,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
