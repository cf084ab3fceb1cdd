//! Walks a cast record field-by-field, dispatching each field's compiled rules in order
//! and folding the results into a flat error map and an [`ErrorTree`] (§4.2, §5).

use std::collections::BTreeMap;

use tracing::instrument;

use crate::datastore::Datastore;
use crate::error::{ErrorTree, FieldError, SystemError};
use crate::record::Record;
use crate::rules::{GdsRounding, RuleContext, RuleFailure};
use crate::schema::Schema;

pub struct Evaluator<'a> {
    schema: &'a Schema,
    datastore: Option<&'a dyn Datastore>,
    primary_key_field: &'a str,
    order_by_field: &'a str,
    gds_rounding: GdsRounding,
}

pub struct EvalOutcome {
    pub errors: BTreeMap<String, Vec<String>>,
    pub error_tree: ErrorTree,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        schema: &'a Schema,
        datastore: Option<&'a dyn Datastore>,
        primary_key_field: &'a str,
        order_by_field: &'a str,
        gds_rounding: GdsRounding,
    ) -> Self {
        Evaluator {
            schema,
            datastore,
            primary_key_field,
            order_by_field,
            gds_rounding,
        }
    }

    /// `original` is the as-submitted record (used to distinguish "missing" from
    /// "explicitly null"); `cast` is `original` with every schema field defaulted to
    /// `Value::Null` (§3 "Record").
    #[instrument(level = "debug", skip_all)]
    pub fn evaluate(&self, original: &Record, cast: &Record) -> Result<EvalOutcome, SystemError> {
        let mut errors = BTreeMap::new();
        let mut error_tree = ErrorTree::new();

        for (field, field_schema) in self.schema.iter() {
            let value = cast.get(field);
            let mut field_errors: Vec<FieldError> = Vec::new();

            let present = original.contains_key(field);
            if !present && field_schema.required {
                field_errors.push(FieldError {
                    rule: "required".to_string(),
                    message: "required field".to_string(),
                });
            }
            if present && value.is_null() && !field_schema.nullable {
                field_errors.push(FieldError {
                    rule: "nullable".to_string(),
                    message: "null value not allowed".to_string(),
                });
            }

            let skip_non_tolerant = value.is_null();
            let ctx = RuleContext {
                field,
                value: &value,
                record: cast,
                schema: self.schema,
                datastore: self.datastore,
                primary_key_field: self.primary_key_field,
                order_by_field: self.order_by_field,
                gds_rounding: self.gds_rounding,
            };
            for rule in &field_schema.rules {
                if skip_non_tolerant && !rule.is_null_tolerant() {
                    continue;
                }
                match rule.validate(&ctx) {
                    Ok(()) => {}
                    Err(RuleFailure::Validation(errs)) => field_errors.extend(errs),
                    Err(RuleFailure::System(err)) => return Err(err),
                }
            }

            if !field_errors.is_empty() {
                let messages: Vec<String> = field_errors.iter().map(|e| e.to_string()).collect();
                errors.insert(field.clone(), messages);
                error_tree.extend_field(field.clone(), field_errors);
            }
        }

        Ok(EvalOutcome { errors, error_tree })
    }
}
