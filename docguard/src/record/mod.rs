// Records - schema-validated documents handed to the checkers

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

static NULL: Value = Value::Null;

/// A schema-validated document: an ordered mapping of field name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Mapping);

impl Record {
    pub fn new() -> Self {
        Record(Mapping::new())
    }

    /// Look up a field. `None` when the record does not carry it.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Look up a field, reading an absent field as `null`.
    pub fn value_of(&self, field: &str) -> &Value {
        self.get(field).unwrap_or(&NULL)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(Value::String(field.into()), value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Field names in document order. Non-string keys are skipped.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().filter_map(|k| k.as_str())
    }
}

impl From<Mapping> for Record {
    fn from(mapping: Mapping) -> Self {
        Record(mapping)
    }
}

impl TryFrom<Value> for Record {
    type Error = Value;

    /// Only mappings become records; anything else is handed back.
    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        match value {
            Value::Mapping(m) => Ok(Record(m)),
            other => Err(other),
        }
    }
}

/// Render a field value for violation messages. Strings print bare,
/// composites print as compact JSON.
pub fn describe_value(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_else(|_| format!("{other:?}")),
    }
}
