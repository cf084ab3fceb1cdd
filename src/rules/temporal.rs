use indexmap::IndexMap;

use crate::error::{FieldError, SchemaError, SystemError};
use crate::schema::{compile_subschema, FieldSchema};

use super::{run_subschema, Combinator, Rule, RuleContext, RuleFailure};

struct Constraint {
    previous: IndexMap<String, FieldSchema>,
    current: IndexMap<String, FieldSchema>,
    prev_op: Combinator,
    curr_op: Combinator,
    ignore_empty: Option<Vec<String>>,
    swap_order: bool,
    order_by: Option<String>,
}

/// `temporalrules`: a list of previous/current constraints applied across visits via the
/// bound datastore (§4.2.5).
pub struct TemporalRules {
    constraints: Vec<Constraint>,
}

impl TemporalRules {
    pub fn compile(field: &str, raw: &serde_json::Value) -> Result<Self, SchemaError> {
        let obj_err = |reason: String| SchemaError::InvalidRule {
            field: field.to_string(),
            rule: "temporalrules".to_string(),
            reason,
        };
        let (items, top_level_orderby) = match raw {
            serde_json::Value::Array(items) => (items.clone(), None),
            serde_json::Value::Object(obj) => {
                let items = obj
                    .get("constraints")
                    .and_then(|v| v.as_array())
                    .ok_or_else(|| obj_err("expected a `constraints` list".to_string()))?
                    .clone();
                let orderby = obj.get("orderby").and_then(|v| v.as_str()).map(str::to_string);
                (items, orderby)
            }
            _ => return Err(obj_err("expected a list of constraints".to_string())),
        };

        let mut constraints = Vec::with_capacity(items.len());
        for item in &items {
            let cobj = item
                .as_object()
                .ok_or_else(|| obj_err("each constraint must be an object".to_string()))?;
            let previous_raw = cobj
                .get("previous")
                .ok_or_else(|| obj_err("constraint missing `previous`".to_string()))?;
            let current_raw = cobj
                .get("current")
                .ok_or_else(|| obj_err("constraint missing `current`".to_string()))?;
            let previous = compile_subschema(previous_raw)?;
            let current = compile_subschema(current_raw)?;
            let ignore_empty = match cobj.get("ignore_empty") {
                None => None,
                Some(serde_json::Value::Bool(false)) => None,
                Some(serde_json::Value::Bool(true)) => Some(Vec::new()),
                Some(serde_json::Value::Array(items)) => Some(
                    items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
                ),
                Some(_) => return Err(obj_err("`ignore_empty` must be a bool or list".to_string())),
            };
            let swap_order = cobj.get("swap_order").and_then(|v| v.as_bool()).unwrap_or(false);
            let order_by = cobj
                .get("orderby")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .or_else(|| top_level_orderby.clone());
            constraints.push(Constraint {
                previous,
                current,
                prev_op: Combinator::parse(cobj.get("prev_op")),
                curr_op: Combinator::parse(cobj.get("curr_op")),
                ignore_empty,
                swap_order,
                order_by,
            });
        }
        Ok(TemporalRules { constraints })
    }
}

impl Rule for TemporalRules {
    fn name(&self) -> &'static str {
        "temporalrules"
    }

    fn is_null_tolerant(&self) -> bool {
        false
    }

    fn validate(&self, ctx: &RuleContext) -> Result<(), RuleFailure> {
        let datastore = match ctx.datastore {
            Some(d) => d,
            None => {
                return Err(RuleFailure::System(SystemError::RuleFailure {
                    field: ctx.field.to_string(),
                    rule: "temporalrules".to_string(),
                    reason: "no datastore bound".to_string(),
                }))
            }
        };
        let mut errors = Vec::new();
        for (index, constraint) in self.constraints.iter().enumerate() {
            let order_by = constraint
                .order_by
                .as_deref()
                .unwrap_or(ctx.order_by_field);
            let prev_record = datastore
                .get_previous_record(order_by, ctx.record, constraint.ignore_empty.as_deref())
                .map_err(|reason| SystemError::DatastoreFailure {
                    field: ctx.field.to_string(),
                    reason,
                })?;
            let Some(prev_record) = prev_record else {
                continue;
            };

            let outcome = if !constraint.swap_order {
                let (prev_passed, _) = run_subschema(
                    &constraint.previous,
                    constraint.prev_op,
                    &prev_record,
                    ctx.schema,
                    Some(datastore),
                    ctx.primary_key_field,
                    order_by,
                    ctx.gds_rounding,
                )?;
                if !prev_passed {
                    None
                } else {
                    let (curr_passed, curr_errors) = run_subschema(
                        &constraint.current,
                        constraint.curr_op,
                        ctx.record,
                        ctx.schema,
                        Some(datastore),
                        ctx.primary_key_field,
                        order_by,
                        ctx.gds_rounding,
                    )?;
                    Some(("current", curr_passed, curr_errors))
                }
            } else {
                let (curr_passed, _) = run_subschema(
                    &constraint.current,
                    constraint.curr_op,
                    ctx.record,
                    ctx.schema,
                    Some(datastore),
                    ctx.primary_key_field,
                    order_by,
                    ctx.gds_rounding,
                )?;
                if !curr_passed {
                    None
                } else {
                    let (prev_passed, prev_errors) = run_subschema(
                        &constraint.previous,
                        constraint.prev_op,
                        &prev_record,
                        ctx.schema,
                        Some(datastore),
                        ctx.primary_key_field,
                        order_by,
                        ctx.gds_rounding,
                    )?;
                    Some(("previous", prev_passed, prev_errors))
                }
            };

            if let Some((visit, passed, inner_errors)) = outcome {
                if !passed {
                    errors.push(summarize(index, visit, &inner_errors));
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

fn summarize(index: usize, visit: &str, errors: &[(String, FieldError)]) -> FieldError {
    let detail = errors
        .iter()
        .map(|(field, err)| format!("{field}: {err}"))
        .collect::<Vec<_>>()
        .join("; ");
    FieldError {
        rule: "temporalrules".to_string(),
        message: format!("temporal rule no: {} failed in {visit} visit ({detail})", index + 1),
    }
}
