//! Dynamic schema validation
//!
//! Two pure validators with no storage dependency:
//!
//! - [`validate_schema`] checks a proposed field list before it is attached
//!   to a log (and trims names in place).
//! - [`validate_values`] checks an entry's value map against the schema the
//!   log has at write time, producing a typed view of the values.
//!
//! Stored entries are never re-validated when a schema changes later.

pub mod schema;
pub mod values;

pub use schema::{
    validate_schema, FieldDefinition, FieldType, ProposedField, Schema, SchemaError,
    MAX_FIELDS, MAX_FIELD_NAME_LEN,
};
pub use values::{validate_values, FieldValue, TypedValues, ValueError};
