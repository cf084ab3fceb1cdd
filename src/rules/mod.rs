//! One module per rule keyword (§4.2), mirroring the teacher's `keywords/*.rs` layout:
//! each file owns both compiling its argument shape out of raw JSON and validating it
//! against a record.

mod compare_age;
mod compare_with;
mod compatibility;
mod function;
mod gds;
mod logic_rule;
mod rxnorm;
mod standard;
mod temporal;

pub use compare_age::CompareAge;
pub use compare_with::CompareWith;
pub use compatibility::Compatibility;
pub use function::{FunctionRule, ScoreVariables};
pub use gds::{ComputeGds, GdsRounding};
pub use logic_rule::LogicRule;
pub use rxnorm::Rxnorm;
pub use standard::{AllowedForbidden, AnyOf, Filled, MinMax, Regex as RegexRule, TypeTag as TypeRule};
pub use temporal::TemporalRules;

use crate::datastore::Datastore;
use crate::error::FieldError;
use crate::record::Record;
use crate::schema::{FieldSchema, Schema};
use crate::value::Value;

/// What a rule handler failed with: either ordinary validation errors (the field stays
/// reportable, other fields keep going) or a system fault (§7, aborts the record).
pub enum RuleFailure {
    Validation(Vec<FieldError>),
    System(crate::error::SystemError),
}

impl From<crate::error::SystemError> for RuleFailure {
    fn from(err: crate::error::SystemError) -> Self {
        RuleFailure::System(err)
    }
}

/// Everything a rule needs to evaluate itself against one field of one record.
pub struct RuleContext<'a> {
    pub field: &'a str,
    pub value: &'a Value,
    pub record: &'a Record,
    pub schema: &'a Schema,
    pub datastore: Option<&'a dyn Datastore>,
    pub primary_key_field: &'a str,
    pub order_by_field: &'a str,
    pub gds_rounding: GdsRounding,
}

/// One compiled, ready-to-run rule. Implementations hold their own (already-parsed)
/// arguments; `validate` never touches raw JSON.
pub trait Rule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this rule still runs when the field value is null and the field schema
    /// declares `nullable: true` (§4.2 "required / nullable").
    fn is_null_tolerant(&self) -> bool {
        false
    }

    fn validate(&self, ctx: &RuleContext) -> Result<(), RuleFailure>;
}

pub(crate) fn fail(rule: &str, message: impl Into<String>) -> Result<(), RuleFailure> {
    Err(RuleFailure::Validation(vec![FieldError {
        rule: rule.to_string(),
        message: message.into(),
    }]))
}

/// `and`/`or` combination of a clause's per-field pass/fail results (§4.2.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Combinator {
    And,
    Or,
}

impl Combinator {
    pub(crate) fn parse(raw: Option<&serde_json::Value>) -> Self {
        match raw.and_then(|v| v.as_str()) {
            Some("or") => Combinator::Or,
            _ => Combinator::And,
        }
    }

    pub(crate) fn combine(self, results: impl Iterator<Item = bool>) -> bool {
        match self {
            Combinator::And => results.into_iter().all(|b| b),
            Combinator::Or => {
                let mut any = false;
                let mut saw_one = false;
                for b in results {
                    saw_one = true;
                    any |= b;
                }
                any || !saw_one
            }
        }
    }
}

/// Runs a compiled sub-schema (field → field schema) against `record`, returning whether
/// every field passed together with the per-field validation errors, combined per
/// `combinator`. Used by `compatibility` and `temporalrules` to apply an `if`/`then`/
/// `else`/`previous`/`current` clause without re-entering the top-level evaluator (§4.2.9:
/// a fresh, independent pass sharing only schema/datastore/primary key). Applies the same
/// required/nullable/null-tolerance rules as the top-level evaluator (§4.2) so a clause
/// like `{"nullable": false}` enforces non-null rather than being silently vacuous.
pub(crate) fn run_subschema(
    sub: &indexmap::IndexMap<String, FieldSchema>,
    combinator: Combinator,
    record: &Record,
    schema: &Schema,
    datastore: Option<&dyn Datastore>,
    primary_key_field: &str,
    order_by_field: &str,
    gds_rounding: GdsRounding,
) -> Result<(bool, Vec<(String, FieldError)>), crate::error::SystemError> {
    let mut field_results = Vec::with_capacity(sub.len());
    let mut errors = Vec::new();
    for (field, field_schema) in sub {
        let value = record.get(field);
        let present = record.contains_key(field);
        let mut field_ok = true;

        if !present && field_schema.required {
            field_ok = false;
            errors.push((
                field.clone(),
                FieldError {
                    rule: "required".to_string(),
                    message: "required field".to_string(),
                },
            ));
        }
        if present && value.is_null() && !field_schema.nullable {
            field_ok = false;
            errors.push((
                field.clone(),
                FieldError {
                    rule: "nullable".to_string(),
                    message: "null value not allowed".to_string(),
                },
            ));
        }

        let skip_non_tolerant = value.is_null();
        let ctx = RuleContext {
            field,
            value: &value,
            record,
            schema,
            datastore,
            primary_key_field,
            order_by_field,
            gds_rounding,
        };
        for rule in &field_schema.rules {
            if skip_non_tolerant && !rule.is_null_tolerant() {
                continue;
            }
            if let Err(failure) = rule.validate(&ctx) {
                match failure {
                    RuleFailure::Validation(errs) => {
                        field_ok = false;
                        for e in errs {
                            errors.push((field.clone(), e));
                        }
                    }
                    RuleFailure::System(err) => return Err(err),
                }
            }
        }
        field_results.push(field_ok);
    }
    let passed = combinator.combine(field_results.into_iter());
    Ok((passed, errors))
}
