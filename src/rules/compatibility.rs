use indexmap::IndexMap;

use crate::error::{FieldError, SchemaError};
use crate::schema::{compile_subschema, FieldSchema};

use super::{run_subschema, Combinator, Rule, RuleContext, RuleFailure};

struct Constraint {
    if_schema: IndexMap<String, FieldSchema>,
    if_op: Combinator,
    then_schema: IndexMap<String, FieldSchema>,
    then_op: Combinator,
    else_schema: Option<IndexMap<String, FieldSchema>>,
    else_op: Combinator,
}

/// `compatibility`: a list of if/then/else clauses evaluated against the current record
/// through fresh sub-schema passes (§4.2.3).
pub struct Compatibility {
    constraints: Vec<Constraint>,
}

impl Compatibility {
    pub fn compile(field: &str, raw: &serde_json::Value) -> Result<Self, SchemaError> {
        let items = raw.as_array().ok_or_else(|| SchemaError::InvalidRule {
            field: field.to_string(),
            rule: "compatibility".to_string(),
            reason: "expected a list of constraints".to_string(),
        })?;
        let mut constraints = Vec::with_capacity(items.len());
        for item in items {
            let obj = item.as_object().ok_or_else(|| SchemaError::InvalidRule {
                field: field.to_string(),
                rule: "compatibility".to_string(),
                reason: "each constraint must be an object".to_string(),
            })?;
            let if_raw = obj.get("if").ok_or_else(|| SchemaError::InvalidRule {
                field: field.to_string(),
                rule: "compatibility".to_string(),
                reason: "constraint missing `if`".to_string(),
            })?;
            let then_raw = obj.get("then").ok_or_else(|| SchemaError::InvalidRule {
                field: field.to_string(),
                rule: "compatibility".to_string(),
                reason: "constraint missing `then`".to_string(),
            })?;
            let if_schema = compile_subschema(if_raw)?;
            let then_schema = compile_subschema(then_raw)?;
            let else_schema = obj.get("else").map(compile_subschema).transpose()?;
            constraints.push(Constraint {
                if_schema,
                if_op: Combinator::parse(obj.get("if_op")),
                then_schema,
                then_op: Combinator::parse(obj.get("then_op")),
                else_schema,
                else_op: Combinator::parse(obj.get("else_op")),
            });
        }
        Ok(Compatibility { constraints })
    }
}

impl Rule for Compatibility {
    fn name(&self) -> &'static str {
        "compatibility"
    }

    fn is_null_tolerant(&self) -> bool {
        true
    }

    fn validate(&self, ctx: &RuleContext) -> Result<(), RuleFailure> {
        let mut errors = Vec::new();
        for (index, constraint) in self.constraints.iter().enumerate() {
            let (if_passed, _if_errors) = run_subschema(
                &constraint.if_schema,
                constraint.if_op,
                ctx.record,
                ctx.schema,
                ctx.datastore,
                ctx.primary_key_field,
                ctx.order_by_field,
                ctx.gds_rounding,
            )?;
            if if_passed {
                let (then_passed, then_errors) = run_subschema(
                    &constraint.then_schema,
                    constraint.then_op,
                    ctx.record,
                    ctx.schema,
                    ctx.datastore,
                    ctx.primary_key_field,
                    ctx.order_by_field,
                    ctx.gds_rounding,
                )?;
                if !then_passed {
                    errors.push(summarize(index, "then", &then_errors));
                }
            } else if let Some(else_schema) = &constraint.else_schema {
                let (else_passed, else_errors) = run_subschema(
                    else_schema,
                    constraint.else_op,
                    ctx.record,
                    ctx.schema,
                    ctx.datastore,
                    ctx.primary_key_field,
                    ctx.order_by_field,
                    ctx.gds_rounding,
                )?;
                if !else_passed {
                    errors.push(summarize(index, "else", &else_errors));
                }
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(RuleFailure::Validation(errors))
        }
    }
}

fn summarize(index: usize, clause: &str, errors: &[(String, FieldError)]) -> FieldError {
    let detail = errors
        .iter()
        .map(|(field, err)| format!("{field}: {err}"))
        .collect::<Vec<_>>()
        .join("; ");
    FieldError {
        rule: "compatibility".to_string(),
        message: format!("constraint {index} `{clause}` failed ({detail})"),
    }
}
