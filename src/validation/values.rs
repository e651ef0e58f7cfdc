//! Entry value validation against a log's current schema

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use thiserror::Error;

use super::schema::{FieldType, Schema};

/// A present, type-checked entry value.
///
/// Numbers stay as their decimal text so formatting survives storage
/// and no floating-point round trip is involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Number(String),
    Boolean(bool),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Text(_) => FieldType::Text,
            FieldValue::Number(_) => FieldType::Number,
            FieldValue::Boolean(_) => FieldType::Boolean,
        }
    }
}

/// Typed view of an accepted value map. Absent and null optional fields
/// are left out; no defaults are substituted.
pub type TypedValues = BTreeMap<String, FieldValue>;

/// Entry value rule violations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("field \"{0}\" is required")]
    MissingRequiredField(String),

    #[error("field \"{0}\" must be a valid number")]
    InvalidNumber(String),

    #[error("field \"{0}\" must be a string")]
    InvalidText(String),

    #[error("field \"{0}\" must be true or false")]
    InvalidBoolean(String),
}

/// Validate an entry's value map against `schema`.
///
/// Pure: depends only on its two inputs. A missing map is treated as empty.
/// Unknown keys are reported before any per-field rule; per-field rules
/// then run in schema order.
pub fn validate_values(
    schema: &Schema,
    values: Option<&Map<String, Value>>,
) -> Result<TypedValues, ValueError> {
    let empty = Map::new();
    let values = values.unwrap_or(&empty);

    if let Some(unknown) = values.keys().find(|name| schema.field(name).is_none()) {
        return Err(ValueError::UnknownField(unknown.clone()));
    }

    let mut typed = TypedValues::new();
    for def in schema.fields() {
        let value = match values.get(&def.name) {
            None | Some(Value::Null) => {
                if def.required {
                    return Err(ValueError::MissingRequiredField(def.name.clone()));
                }
                continue;
            }
            Some(v) => v,
        };

        let checked = match def.field_type {
            FieldType::Number => {
                let s = value
                    .as_str()
                    .ok_or_else(|| ValueError::InvalidNumber(def.name.clone()))?;
                if s.trim().is_empty() {
                    if def.required {
                        return Err(ValueError::MissingRequiredField(def.name.clone()));
                    }
                } else if !is_finite_decimal(s) {
                    return Err(ValueError::InvalidNumber(def.name.clone()));
                }
                FieldValue::Number(s.to_string())
            }
            FieldType::Text => {
                let s = value
                    .as_str()
                    .ok_or_else(|| ValueError::InvalidText(def.name.clone()))?;
                if def.required && s.trim().is_empty() {
                    return Err(ValueError::MissingRequiredField(def.name.clone()));
                }
                FieldValue::Text(s.to_string())
            }
            FieldType::Boolean => {
                let b = value
                    .as_bool()
                    .ok_or_else(|| ValueError::InvalidBoolean(def.name.clone()))?;
                FieldValue::Boolean(b)
            }
        };

        typed.insert(def.name.clone(), checked);
    }

    Ok(typed)
}

/// Decimal text that parses to a finite number. Surrounding whitespace is
/// not part of a number; `inf` and `NaN` are rejected.
fn is_finite_decimal(s: &str) -> bool {
    s.parse::<f64>().map(f64::is_finite).unwrap_or(false)
}
