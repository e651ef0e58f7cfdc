//! Field-schema definitions and the rules a proposed schema must pass
//! before it is attached to a log.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of fields a log schema may declare
pub const MAX_FIELDS: usize = 20;

/// Maximum field name length, in characters, after trimming
pub const MAX_FIELD_NAME_LEN: usize = 100;

/// Declared type of a schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Number,
    Boolean,
}

impl FieldType {
    /// Parse a wire type name. Only the exact lowercase names are accepted.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(FieldType::Text),
            "number" => Some(FieldType::Number),
            "boolean" => Some(FieldType::Boolean),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A field definition as submitted by a caller, before validation.
///
/// The type is kept as a raw string so an unknown type surfaces as
/// [`SchemaError::InvalidFieldType`] rather than a decode failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
}

impl ProposedField {
    pub fn new(name: impl Into<String>, field_type: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            required,
        }
    }
}

/// A validated field definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub required: bool,
}

/// Ordered field definitions attached to a log.
///
/// Order matters for display only. Names are unique case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    fields: Vec<FieldDefinition>,
}

impl Schema {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    /// Exact-name lookup, as used when matching entry values
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn has_required_fields(&self) -> bool {
        self.fields.iter().any(|f| f.required)
    }

    /// Encode for storage in the `logs.fields_json` column
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a stored schema. Stored schemas were validated on write.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl IntoIterator for Schema {
    type Item = FieldDefinition;
    type IntoIter = std::vec::IntoIter<FieldDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

/// Schema definition rule violations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("too many fields (max 20)")]
    TooManyFields,

    #[error("field name must not be empty")]
    EmptyFieldName,

    #[error("field name must be 1-100 characters")]
    FieldNameTooLong,

    #[error("duplicate field name: {0}")]
    DuplicateFieldName(String),

    #[error("field type must be 'text', 'number', or 'boolean'")]
    InvalidFieldType,
}

/// Validate a proposed schema.
///
/// Names are trimmed in place first, then the rules run in order over the
/// whole list and the first rule with any violation wins:
/// field count, empty name, name length, case-insensitive duplicates, type.
pub fn validate_schema(fields: &mut [ProposedField]) -> Result<Schema, SchemaError> {
    if fields.len() > MAX_FIELDS {
        return Err(SchemaError::TooManyFields);
    }

    for field in fields.iter_mut() {
        let trimmed = field.name.trim();
        if trimmed.len() != field.name.len() {
            field.name = trimmed.to_string();
        }
    }

    if fields.iter().any(|f| f.name.is_empty()) {
        return Err(SchemaError::EmptyFieldName);
    }

    if fields
        .iter()
        .any(|f| f.name.chars().count() > MAX_FIELD_NAME_LEN)
    {
        return Err(SchemaError::FieldNameTooLong);
    }

    let mut seen = HashSet::with_capacity(fields.len());
    for field in fields.iter() {
        if !seen.insert(field.name.to_lowercase()) {
            return Err(SchemaError::DuplicateFieldName(field.name.clone()));
        }
    }

    let mut definitions = Vec::with_capacity(fields.len());
    for field in fields.iter() {
        let field_type = FieldType::parse(&field.field_type).ok_or(SchemaError::InvalidFieldType)?;
        definitions.push(FieldDefinition {
            name: field.name.clone(),
            field_type,
            required: field.required,
        });
    }

    Ok(Schema {
        fields: definitions,
    })
}
