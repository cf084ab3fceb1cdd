use crate::error::{SchemaError, SystemError};

use super::{fail, Rule, RuleContext, RuleFailure};

/// `rxnorm` (via `check_with`): looks up the field value as an RxNorm concept unique
/// identifier through the bound datastore (§4.2.7).
pub struct Rxnorm;

impl Rxnorm {
    pub fn compile(raw: &serde_json::Value) -> Result<Self, SchemaError> {
        match raw {
            serde_json::Value::Bool(true) => Ok(Rxnorm),
            serde_json::Value::Bool(false) => Err(SchemaError::InvalidRule {
                field: String::new(),
                rule: "rxnorm".to_string(),
                reason: "`rxnorm: false` has no effect; omit the key instead".to_string(),
            }),
            _ => Err(SchemaError::InvalidRule {
                field: String::new(),
                rule: "rxnorm".to_string(),
                reason: "expected `true`".to_string(),
            }),
        }
    }
}

impl Rule for Rxnorm {
    fn name(&self) -> &'static str {
        "rxnorm"
    }

    fn validate(&self, ctx: &RuleContext) -> Result<(), RuleFailure> {
        let code = match ctx.value.as_str() {
            Some(s) => s,
            None => return fail("rxnorm", "value is not a string RXCUI code"),
        };
        let datastore = ctx.datastore.ok_or_else(|| SystemError::RuleFailure {
            field: ctx.field.to_string(),
            rule: "rxnorm".to_string(),
            reason: "no datastore bound".to_string(),
        })?;
        let valid = datastore
            .is_valid_rxcui(code)
            .map_err(|reason| SystemError::DatastoreFailure {
                field: ctx.field.to_string(),
                reason,
            })?;
        if valid {
            Ok(())
        } else {
            fail("rxnorm", "not a valid RXCUI code")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::InMemoryDatastore;
    use crate::record::Record;
    use crate::rules::GdsRounding;
    use crate::schema::Schema;
    use crate::value::Value;
    use serde_json::json;

    fn ctx<'a>(value: &'a Value, record: &'a Record, schema: &'a Schema, datastore: Option<&'a dyn crate::datastore::Datastore>) -> RuleContext<'a> {
        RuleContext {
            field: "med_code",
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
    fn compile_rejects_false_and_non_bool() {
        assert!(Rxnorm::compile(&json!(false)).is_err());
        assert!(Rxnorm::compile(&json!("true")).is_err());
        assert!(Rxnorm::compile(&json!(true)).is_ok());
    }

    #[test]
    fn valid_rxcui_passes() {
        let rule = Rxnorm::compile(&json!(true)).unwrap();
        let store = InMemoryDatastore::new("pk", "pk", vec![]).with_rxcui_allowlist(["12345".to_string()]);
        let schema = Schema::compile_json(json!({})).unwrap();
        let record = Record::new();
        let value = Value::String("12345".to_string());
        assert!(rule.validate(&ctx(&value, &record, &schema, Some(&store))).is_ok());
    }

    #[test]
    fn invalid_rxcui_fails() {
        let rule = Rxnorm::compile(&json!(true)).unwrap();
        let store = InMemoryDatastore::new("pk", "pk", vec![]).with_rxcui_allowlist(["12345".to_string()]);
        let schema = Schema::compile_json(json!({})).unwrap();
        let record = Record::new();
        let value = Value::String("99999".to_string());
        let failure = rule.validate(&ctx(&value, &record, &schema, Some(&store))).unwrap_err();
        assert!(matches!(failure, RuleFailure::Validation(_)));
    }

    #[test]
    fn non_string_value_fails() {
        let rule = Rxnorm::compile(&json!(true)).unwrap();
        let store = InMemoryDatastore::new("pk", "pk", vec![]);
        let schema = Schema::compile_json(json!({})).unwrap();
        let record = Record::new();
        let value = Value::Int(12345);
        assert!(rule.validate(&ctx(&value, &record, &schema, Some(&store))).is_err());
    }

    #[test]
    fn no_datastore_bound_is_a_system_error() {
        let rule = Rxnorm::compile(&json!(true)).unwrap();
        let schema = Schema::compile_json(json!({})).unwrap();
        let record = Record::new();
        let value = Value::String("12345".to_string());
        let failure = rule.validate(&ctx(&value, &record, &schema, None)).unwrap_err();
        assert!(matches!(failure, RuleFailure::System(_)));
    }
}
