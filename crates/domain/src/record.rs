use std::str::FromStr;

use ruleflow_core::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Logical operation performed on an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Entity creation.
    Create,
    /// Entity update.
    Update,
    /// Entity deletion.
    Delete,
}

impl Operation {
    /// Returns a stable storage value for the operation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl FromStr for Operation {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            _ => Err(EngineError::Validation(format!(
                "unknown operation '{value}'"
            ))),
        }
    }
}

/// Ordered, string-keyed entity payload.
///
/// Field iteration order is the record's insertion order and is stable across
/// runs, which keeps field-by-field validation output deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityRecord {
    fields: Map<String, Value>,
}

impl EntityRecord {
    /// Creates a record from a JSON object value.
    pub fn new(data: Value) -> EngineResult<Self> {
        match data {
            Value::Object(fields) => Ok(Self { fields }),
            _ => Err(EngineError::Validation(
                "entity record data must be a JSON object".to_owned(),
            )),
        }
    }

    /// Creates an empty record.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a record from an existing field map.
    #[must_use]
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Returns one field value when present.
    #[must_use]
    pub fn get(&self, field_name: &str) -> Option<&Value> {
        self.fields.get(field_name)
    }

    /// Sets one field value, replacing any prior value.
    pub fn set(&mut self, field_name: impl Into<String>, value: Value) {
        self.fields.insert(field_name.into(), value);
    }

    /// Iterates field name/value pairs in record order.
    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns whether the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Consumes the record into a JSON object value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}
