//! Field-selecting record serializer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{QuerySet, Record};

/// One output field, optionally shaped by a nested serializer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SerializerField {
    /// Copy the value as is.
    Plain(String),
    /// Project an object (or each object in a list) through nested fields.
    Nested {
        name: String,
        fields: Vec<SerializerField>,
    },
}

impl SerializerField {
    fn name(&self) -> &str {
        match self {
            Self::Plain(name) | Self::Nested { name, .. } => name,
        }
    }
}

/// Projects records onto a fixed list of fields.
///
/// Output keys follow field declaration order; missing fields become null.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct FieldSerializer {
    fields: Vec<SerializerField>,
}

impl FieldSerializer {
    /// Serializer over plain fields.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|f| SerializerField::Plain(f.into()))
                .collect(),
        }
    }

    /// Add a nested field.
    pub fn with_nested(mut self, name: impl Into<String>, nested: FieldSerializer) -> Self {
        self.fields.push(SerializerField::Nested {
            name: name.into(),
            fields: nested.fields,
        });
        self
    }

    /// Declared field names, in output order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(SerializerField::name)
    }

    /// Serialize one record.
    pub fn serialize(&self, record: &Record) -> Record {
        project(&self.fields, record)
    }

    /// Serialize every row of a set.
    pub fn serialize_many(&self, rows: &QuerySet) -> Vec<Record> {
        rows.iter().map(|row| self.serialize(row)).collect()
    }
}

fn project(fields: &[SerializerField], record: &Record) -> Record {
    let mut out = Record::new();
    for field in fields {
        let value = record.get(field.name()).cloned().unwrap_or(Value::Null);
        let value = match field {
            SerializerField::Plain(_) => value,
            SerializerField::Nested { fields, .. } => project_value(fields, value),
        };
        out.insert(field.name().to_string(), value);
    }
    out
}

fn project_value(fields: &[SerializerField], value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(project(fields, &map)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| project_value(fields, item))
                .collect(),
        ),
        other => other,
    }
}
