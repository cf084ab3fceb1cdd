//! `QualityCheck`, the top-level driver (§4.4).

use std::collections::BTreeMap;

use tracing::{instrument, warn};

use crate::datastore::Datastore;
use crate::error::{ErrorTree, SchemaError};
use crate::evaluator::Evaluator;
use crate::record::Record;
use crate::rules::GdsRounding;
use crate::schema::Schema;

/// The outcome of validating one record (§6 "`validate_record` return shape").
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub passed: bool,
    pub system_failure: bool,
    pub errors: BTreeMap<String, Vec<String>>,
    pub error_tree: ErrorTree,
}

impl ValidationOutcome {
    fn system_failure(reason: impl Into<String>) -> Self {
        let mut errors = BTreeMap::new();
        errors.insert("__system__".to_string(), vec![reason.into()]);
        ValidationOutcome {
            passed: false,
            system_failure: true,
            errors,
            error_tree: ErrorTree::new(),
        }
    }
}

/// Compiles a schema once and validates records against it (§4.4). Not `Sync`-required
/// beyond its datastore: one `QualityCheck` per thread, per §5.
pub struct QualityCheck {
    primary_key_field: String,
    order_by_field: String,
    schema: Schema,
    strict: bool,
    datastore: Option<Box<dyn Datastore>>,
    gds_rounding: GdsRounding,
}

impl QualityCheck {
    /// `strict` follows the teacher's `additionalProperties: false` discipline
    /// (`keywords/additional_properties.rs`) applied at the record rather than the
    /// object-property level: when `true`, a record carrying a field the schema never
    /// declares is a system failure instead of being silently dropped by [`Record::cast`].
    /// `order_by_field` defaults to `primary_key_field` via [`Self::with_order_by_field`]
    /// — the natural visit-ordering field for datasets with no separate longitudinal key
    /// (§9 Open Questions).
    pub fn new(
        primary_key_field: impl Into<String>,
        schema: Schema,
        strict: bool,
        datastore: Option<Box<dyn Datastore>>,
    ) -> Result<Self, SchemaError> {
        let primary_key_field = primary_key_field.into();
        schema.validate_has_primary_key(&primary_key_field)?;
        let order_by_field = primary_key_field.clone();
        Ok(QualityCheck {
            primary_key_field,
            order_by_field,
            schema,
            strict,
            datastore,
            gds_rounding: GdsRounding::default(),
        })
    }

    /// Overrides the field used to order a subject's visits for `temporalrules`/
    /// `compare_with(previous_record: true)` lookups. Defaults to `primary_key_field`.
    pub fn with_order_by_field(mut self, order_by_field: impl Into<String>) -> Self {
        self.order_by_field = order_by_field.into();
        self
    }

    pub fn with_gds_rounding(mut self, rounding: GdsRounding) -> Self {
        self.gds_rounding = rounding;
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn primary_key_field(&self) -> &str {
        &self.primary_key_field
    }

    #[instrument(level = "debug", skip_all, fields(pk_field = %self.primary_key_field))]
    pub fn validate_record(&self, record: &Record) -> ValidationOutcome {
        if self.strict {
            if let Some(field) = record
                .iter()
                .map(|(field, _)| field)
                .find(|field| !self.schema.contains(field))
            {
                return ValidationOutcome::system_failure(format!(
                    "record declares field `{field}` which the schema does not recognize"
                ));
            }
        }

        let cast = record.cast(&self.schema);
        let pk = cast.get(&self.primary_key_field);
        if !record.contains_key(&self.primary_key_field) || pk.is_null() {
            return ValidationOutcome::system_failure(format!(
                "primary key field `{}` is missing or null",
                self.primary_key_field
            ));
        }

        let evaluator = Evaluator::new(
            &self.schema,
            self.datastore.as_deref(),
            &self.primary_key_field,
            &self.order_by_field,
            self.gds_rounding,
        );
        match evaluator.evaluate(record, &cast) {
            Ok(outcome) => ValidationOutcome {
                passed: outcome.error_tree.is_empty(),
                system_failure: false,
                errors: outcome.errors,
                error_tree: outcome.error_tree,
            },
            Err(err) => {
                warn!(error = %err, "record validation aborted with a system error");
                ValidationOutcome::system_failure(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn schema(doc: serde_json::Value) -> Schema {
        Schema::compile_json(doc).unwrap()
    }

    #[test]
    fn missing_primary_key_is_a_system_failure() {
        let qc = QualityCheck::new(
            "pk",
            schema(serde_json::json!({"pk": {"type": "integer", "required": true}})),
            false,
            None,
        )
        .unwrap();
        let record = Record::new();
        let outcome = qc.validate_record(&record);
        assert!(outcome.system_failure);
        assert!(!outcome.passed);
    }

    #[test]
    fn hello_world_passes_with_valid_record() {
        let qc = QualityCheck::new(
            "pk",
            schema(serde_json::json!({
                "pk": {"type": "integer", "required": true},
                "age": {"type": "integer", "min": 0, "max": 120}
            })),
            false,
            None,
        )
        .unwrap();
        let mut record = Record::new();
        record.insert("pk", Value::Int(1));
        record.insert("age", Value::Int(42));
        let outcome = qc.validate_record(&record);
        assert!(outcome.passed);
        assert!(!outcome.system_failure);
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn out_of_range_value_fails_with_field_error() {
        let qc = QualityCheck::new(
            "pk",
            schema(serde_json::json!({
                "pk": {"type": "integer", "required": true},
                "age": {"type": "integer", "min": 0, "max": 120}
            })),
            false,
            None,
        )
        .unwrap();
        let mut record = Record::new();
        record.insert("pk", Value::Int(1));
        record.insert("age", Value::Int(200));
        let outcome = qc.validate_record(&record);
        assert!(!outcome.passed);
        assert!(outcome.errors.contains_key("age"));
    }

    #[test]
    fn strict_mode_rejects_undeclared_record_field() {
        let qc = QualityCheck::new(
            "pk",
            schema(serde_json::json!({"pk": {"type": "integer", "required": true}})),
            true,
            None,
        )
        .unwrap();
        let mut record = Record::new();
        record.insert("pk", Value::Int(1));
        record.insert("not_in_schema", Value::Int(0));
        let outcome = qc.validate_record(&record);
        assert!(outcome.system_failure);
        assert!(!outcome.passed);
    }

    #[test]
    fn non_strict_mode_ignores_undeclared_record_field() {
        let qc = QualityCheck::new(
            "pk",
            schema(serde_json::json!({"pk": {"type": "integer", "required": true}})),
            false,
            None,
        )
        .unwrap();
        let mut record = Record::new();
        record.insert("pk", Value::Int(1));
        record.insert("not_in_schema", Value::Int(0));
        let outcome = qc.validate_record(&record);
        assert!(outcome.passed);
        assert!(!outcome.system_failure);
    }
}
