use std::cmp::Ordering;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Normalized field names that identify the IDOC number column of a record.
const IDOC_NUMBER_FIELDS: &[&str] = &["idocnumber", "idocnum", "idocno", "idoc"];

/// A backlog row as returned by the backend. No schema is imposed; field order
/// is kept as received.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(pub Map<String, Value>);

impl Record {
    /// Converts a JSON value into a record. Only objects qualify.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Name of the field holding the IDOC number, matched case-insensitively
    /// and ignoring separators (`IDOC_Number`, `idocNumber`, `idoc no`).
    pub fn idoc_number_field(&self) -> Option<&str> {
        self.0
            .keys()
            .find(|key| IDOC_NUMBER_FIELDS.contains(&normalize_field_name(key).as_str()))
            .map(String::as_str)
    }

    pub fn idoc_number(&self) -> Option<&Value> {
        self.idoc_number_field().and_then(|field| self.0.get(field))
    }

    /// Column headers for display: underscores become spaces.
    pub fn headers(&self) -> Vec<String> {
        self.0.keys().map(|key| key.replace('_', " ")).collect()
    }
}

fn normalize_field_name(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Converts a JSON sequence into records, dropping entries that are not objects.
/// Returns the records and the number of dropped entries.
pub fn records_from_values(values: Vec<Value>) -> (Vec<Record>, usize) {
    let total = values.len();
    let records: Vec<Record> = values.into_iter().filter_map(Record::from_value).collect();
    let dropped = total - records.len();
    (records, dropped)
}

/// Stable sort by IDOC number. Numeric identifiers compare numerically, others
/// lexically; records without an IDOC number keep their relative order at the end.
pub fn sort_by_idoc_number(records: &mut [Record]) {
    records.sort_by(|left, right| compare_idoc_numbers(left.idoc_number(), right.idoc_number()));
}

fn compare_idoc_numbers(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    match (left, right) {
        (Some(left), Some(right)) => {
            match (numeric_key(left), numeric_key(right)) {
                (Some(l), Some(r)) => l.cmp(&r),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => scalar_text(left).cmp(&scalar_text(right)),
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn numeric_key(value: &Value) -> Option<u128> {
    match value {
        Value::Number(number) => number.as_u64().map(u128::from),
        Value::String(text) => text.trim().parse::<u128>().ok(),
        _ => None,
    }
}

/// Renders a scalar the way a table cell shows it; nested values become compact JSON.
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(text) => text.clone(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    Matched,
    Updated,
}

impl<'de> Deserialize<'de> for UpdateStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Anything other than the string "updated" counts as matched.
        Ok(match Value::deserialize(deserializer)? {
            Value::String(status) if status.trim().eq_ignore_ascii_case("updated") => {
                Self::Updated
            }
            _ => Self::Matched,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldUpdate {
    #[serde(default, deserialize_with = "deserialize_scalar_key")]
    pub field: String,
    #[serde(default, alias = "value", alias = "newValue")]
    pub new_value: Value,
    #[serde(
        default,
        alias = "oldValue",
        alias = "old_value",
        alias = "previousValue"
    )]
    pub previous_value: Option<Value>,
    #[serde(default = "default_update_status")]
    pub status: UpdateStatus,
}

fn default_update_status() -> UpdateStatus {
    UpdateStatus::Matched
}

/// Outcome of reconciling one backlog record against the second source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    /// Empty when the backend left the key out.
    #[serde(
        default,
        alias = "idocNumber",
        alias = "idoc_number",
        alias = "recordKey",
        deserialize_with = "deserialize_scalar_key"
    )]
    pub record_key: String,
    #[serde(
        default,
        alias = "updates",
        alias = "fieldUpdates",
        deserialize_with = "null_as_default"
    )]
    pub field_updates: Vec<FieldUpdate>,
}

impl ReconciliationResult {
    pub fn updated_fields(&self) -> impl Iterator<Item = &FieldUpdate> {
        self.field_updates
            .iter()
            .filter(|update| update.status == UpdateStatus::Updated)
    }
}

/// Keys arrive as strings or numbers; `null` becomes empty and nested values
/// fall back to their JSON text.
fn deserialize_scalar_key<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        value => scalar_text(&value),
    })
}

/// Treats an explicit `null` like a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
