use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::error::{SchemaError, SystemError};
use crate::record::Record;
use crate::value::Value;

use super::{fail, Rule, RuleContext, RuleFailure};

type ScoringFn = fn(&Record, &[serde_json::Value]) -> Result<Value, SystemError>;

/// Registry of named scoring/plausibility computations addressable from `function`
/// (§4.2.8). Small and closed by design — every entry corresponds to a named
/// computation the schema author can reference, not an open plugin surface.
/// `check_adcid` is handled separately in [`FunctionRule::validate`] since it needs the
/// bound datastore rather than a pure record computation.
static REGISTRY: Lazy<HashMap<&'static str, ScoringFn>> = Lazy::new(|| {
    let mut m: HashMap<&'static str, ScoringFn> = HashMap::new();
    m.insert("check_adcid", sum_fields);
    m.insert("sum_fields", sum_fields);
    m
});

fn sum_fields(record: &Record, args: &[serde_json::Value]) -> Result<Value, SystemError> {
    let mut total = 0.0;
    for arg in args {
        if let Some(name) = arg.as_str() {
            if let Some(n) = record.get(name).as_f64() {
                total += n;
            }
        }
    }
    Ok(Value::Float(total))
}

/// `function`: invokes a named registry computation and compares the field's value
/// against the computed result.
pub struct FunctionRule {
    function_name: String,
    arguments: Vec<serde_json::Value>,
}

impl FunctionRule {
    pub fn compile(raw: &serde_json::Value) -> Result<Self, SchemaError> {
        let obj = raw.as_object().ok_or_else(|| SchemaError::InvalidRule {
            field: String::new(),
            rule: "function".to_string(),
            reason: "expected an object".to_string(),
        })?;
        let function_name = obj
            .get("function_name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SchemaError::InvalidRule {
                field: String::new(),
                rule: "function".to_string(),
                reason: "missing `function_name`".to_string(),
            })?
            .to_string();
        if !REGISTRY.contains_key(function_name.as_str()) {
            return Err(SchemaError::InvalidRule {
                field: String::new(),
                rule: "function".to_string(),
                reason: format!("unknown function `{function_name}`"),
            });
        }
        let arguments = obj
            .get("arguments")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(FunctionRule {
            function_name,
            arguments,
        })
    }
}

impl Rule for FunctionRule {
    fn name(&self) -> &'static str {
        "function"
    }

    fn validate(&self, ctx: &RuleContext) -> Result<(), RuleFailure> {
        if self.function_name == "check_adcid" {
            let code = ctx.value.as_str().ok_or_else(|| SystemError::RuleFailure {
                field: ctx.field.to_string(),
                rule: "function".to_string(),
                reason: "check_adcid requires a string ADCID value".to_string(),
            })?;
            let datastore = ctx.datastore.ok_or_else(|| SystemError::RuleFailure {
                field: ctx.field.to_string(),
                rule: "function".to_string(),
                reason: "no datastore bound".to_string(),
            })?;
            let valid = datastore
                .is_valid_adcid(code)
                .map_err(|reason| SystemError::DatastoreFailure {
                    field: ctx.field.to_string(),
                    reason,
                })?;
            return if valid {
                Ok(())
            } else {
                fail("function", "not a valid ADCID")
            };
        }

        let f = REGISTRY
            .get(self.function_name.as_str())
            .expect("validated at compile time");
        let computed = f(ctx.record, &self.arguments)?;
        if ctx.value.soft_eq(&computed) {
            Ok(())
        } else {
            fail(
                "function",
                format!(
                    "`{}` does not match the result of `{}` ({computed})",
                    ctx.value, self.function_name
                ),
            )
        }
    }
}

/// `score_variables`: sums a list of fields (nulls skipped) and checks the declared
/// field against the expected total (§4.2.8).
pub struct ScoreVariables {
    fields: Vec<String>,
    expected: Option<serde_json::Value>,
}

impl ScoreVariables {
    pub fn compile(raw: &serde_json::Value) -> Result<Self, SchemaError> {
        let obj = raw.as_object().ok_or_else(|| SchemaError::InvalidRule {
            field: String::new(),
            rule: "score_variables".to_string(),
            reason: "expected an object".to_string(),
        })?;
        let fields = obj
            .get("fields")
            .and_then(|v| v.as_array())
            .ok_or_else(|| SchemaError::InvalidRule {
                field: String::new(),
                rule: "score_variables".to_string(),
                reason: "missing `fields`".to_string(),
            })?
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        let expected = obj.get("expected").cloned();
        Ok(ScoreVariables { fields, expected })
    }
}

impl Rule for ScoreVariables {
    fn name(&self) -> &'static str {
        "score_variables"
    }

    fn validate(&self, ctx: &RuleContext) -> Result<(), RuleFailure> {
        let mut total = 0.0;
        for field in &self.fields {
            if let Some(n) = ctx.record.get(field).as_f64() {
                total += n;
            }
        }
        let expected = match &self.expected {
            Some(raw) => Value::from(raw.clone()),
            None => ctx.value.clone(),
        };
        if expected.soft_eq(&Value::Float(total)) {
            Ok(())
        } else {
            fail(
                "score_variables",
                format!("computed total {total} does not match expected `{expected}`"),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::InMemoryDatastore;
    use crate::rules::GdsRounding;
    use crate::schema::Schema;
    use serde_json::json;

    fn ctx<'a>(value: &'a Value, record: &'a Record, schema: &'a Schema, datastore: Option<&'a dyn crate::datastore::Datastore>) -> RuleContext<'a> {
        RuleContext {
            field: "total",
            value,
            record,
            schema,
            datastore,
            primary_key_field: "pk",
            order_by_field: "pk",
            gds_rounding: GdsRounding::default(),
        }
    }

    #[test]
    fn compile_rejects_unknown_function_name() {
        assert!(FunctionRule::compile(&json!({"function_name": "not_registered"})).is_err());
        assert!(FunctionRule::compile(&json!({"function_name": "sum_fields", "arguments": ["a", "b"]})).is_ok());
    }

    #[test]
    fn sum_fields_passes_when_value_matches_the_sum() {
        let rule = FunctionRule::compile(&json!({"function_name": "sum_fields", "arguments": ["a", "b"]})).unwrap();
        let mut record = Record::new();
        record.insert("a", Value::Int(2));
        record.insert("b", Value::Int(3));
        let schema = Schema::compile_json(json!({})).unwrap();
        let value = Value::Float(5.0);
        assert!(rule.validate(&ctx(&value, &record, &schema, None)).is_ok());
    }

    #[test]
    fn sum_fields_fails_when_value_does_not_match_the_sum() {
        let rule = FunctionRule::compile(&json!({"function_name": "sum_fields", "arguments": ["a", "b"]})).unwrap();
        let mut record = Record::new();
        record.insert("a", Value::Int(2));
        record.insert("b", Value::Int(3));
        let schema = Schema::compile_json(json!({})).unwrap();
        let value = Value::Float(100.0);
        assert!(rule.validate(&ctx(&value, &record, &schema, None)).is_err());
    }

    #[test]
    fn check_adcid_dispatches_to_the_datastore() {
        let rule = FunctionRule::compile(&json!({"function_name": "check_adcid"})).unwrap();
        let store = InMemoryDatastore::new("pk", "pk", vec![]).with_adcid_allowlist(["33".to_string()]);
        let schema = Schema::compile_json(json!({})).unwrap();
        let record = Record::new();
        let valid = Value::String("33".to_string());
        assert!(rule.validate(&ctx(&valid, &record, &schema, Some(&store))).is_ok());
        let invalid = Value::String("44".to_string());
        assert!(rule.validate(&ctx(&invalid, &record, &schema, Some(&store))).is_err());
    }

    #[test]
    fn score_variables_sums_fields_skipping_nulls() {
        let rule = ScoreVariables::compile(&json!({"fields": ["a", "b", "c"]})).unwrap();
        let mut record = Record::new();
        record.insert("a", Value::Int(2));
        record.insert("b", Value::Null);
        record.insert("c", Value::Int(3));
        let schema = Schema::compile_json(json!({})).unwrap();
        let value = Value::Float(5.0);
        assert!(rule.validate(&ctx(&value, &record, &schema, None)).is_ok());
    }

    #[test]
    fn score_variables_mismatch_reports_the_computed_total() {
        let rule = ScoreVariables::compile(&json!({"fields": ["a", "b"]})).unwrap();
        let mut record = Record::new();
        record.insert("a", Value::Int(2));
        record.insert("b", Value::Int(3));
        let schema = Schema::compile_json(json!({})).unwrap();
        let value = Value::Float(100.0);
        let failure = rule.validate(&ctx(&value, &record, &schema, None)).unwrap_err();
        match failure {
            RuleFailure::Validation(errs) => assert!(errs[0].message.contains('5')),
            RuleFailure::System(_) => panic!("expected a validation failure"),
        }
    }
}
