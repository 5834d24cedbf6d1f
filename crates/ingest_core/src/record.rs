use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::{Map, Number, Value};

use crate::CandidateReference;

/// Store column holding the item identity unless configured otherwise.
pub const DEFAULT_IDENTITY_FIELD: &str = "url";

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Date(NaiveDate),
    Categories(Vec<String>),
}

impl FieldValue {
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Text(text) => Value::String(text.clone()),
            FieldValue::Integer(value) => Value::from(*value),
            // Non-finite floats have no JSON form.
            FieldValue::Float(value) => Number::from_f64(*value)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::Date(date) => Value::String(date.format("%Y-%m-%d").to_string()),
            FieldValue::Categories(items) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
        }
    }
}

pub type FieldMap = BTreeMap<String, FieldValue>;

/// One extracted item: free-form fields plus the identity it was loaded from.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRecord {
    identity: CandidateReference,
    fields: FieldMap,
}

impl ItemRecord {
    pub fn new(identity: CandidateReference, fields: FieldMap) -> Self {
        Self { identity, fields }
    }

    pub fn identity(&self) -> &CandidateReference {
        &self.identity
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Flatten into the column map sent to the store.
    ///
    /// The identity always wins over an extracted field of the same name.
    pub fn to_store_fields(&self, identity_field: &str) -> Map<String, Value> {
        let mut map: Map<String, Value> = self
            .fields
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();
        map.insert(
            identity_field.to_string(),
            Value::String(self.identity.as_str().to_string()),
        );
        map
    }
}
