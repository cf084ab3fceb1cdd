//! Error model: schema-load errors, per-field validation errors and the field-indexed
//! error tree, and system errors (§7).

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// Raised while parsing or compiling a schema. Construction-time only: once a
/// [`crate::schema::Schema`] exists it is immutable and cannot fail to run.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("malformed schema document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("malformed schema document: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("field `{field}`: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("field `{field}` rule `{rule}`: {reason}")]
    InvalidRule {
        field: String,
        rule: String,
        reason: String,
    },

    #[error("schema declares no primary key field")]
    MissingPrimaryKey,
}

/// A single rule failure attached to one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub rule: String,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.rule, self.message)
    }
}

/// Errors for one record, indexed by field name in schema order, mirroring the schema's
/// own shape rather than a flat instance-path list (§3 "Error tree").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorTree(BTreeMap<String, Vec<FieldError>>);

impl ErrorTree {
    pub fn new() -> Self {
        ErrorTree(BTreeMap::new())
    }

    pub fn push(&mut self, field: impl Into<String>, error: FieldError) {
        self.0.entry(field.into()).or_default().push(error);
    }

    pub fn extend_field(&mut self, field: impl Into<String>, errors: Vec<FieldError>) {
        if errors.is_empty() {
            return;
        }
        self.0.entry(field.into()).or_default().extend(errors);
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|v| v.is_empty())
    }

    pub fn field_errors(&self, field: &str) -> &[FieldError] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn fields(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<FieldError>)> {
        self.0.iter()
    }

    /// Merges another field's errors under `field`, used when a subschema validator
    /// (compatibility if/then, temporalrules, anyof) folds its inner errors into one
    /// outer-field entry, per the Recursion discipline in §4.2.9.
    pub fn merge_as_field(&mut self, field: &str, other: &ErrorTree) {
        for (_, errors) in other.iter() {
            self.extend_field(field.to_string(), errors.clone());
        }
    }
}

/// A fault that aborts validation of the current record without panicking across the
/// public API (§7): a malformed datastore response, a downstream I/O failure inside a
/// custom rule, a previous-record lookup that itself errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SystemError {
    #[error("datastore lookup failed for field `{field}`: {reason}")]
    DatastoreFailure { field: String, reason: String },

    #[error("rule `{rule}` on field `{field}` failed: {reason}")]
    RuleFailure {
        field: String,
        rule: String,
        reason: String,
    },
}
