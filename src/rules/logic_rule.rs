use crate::error::SchemaError;
use crate::logic;

use super::{fail, Rule, RuleContext, RuleFailure};

/// `logic`: a JSON-logic formula evaluated against the record; truthy passes (§4.2.4).
pub struct LogicRule {
    formula: serde_json::Value,
    errormsg: Option<String>,
}

impl LogicRule {
    pub fn compile(raw: &serde_json::Value) -> Result<Self, SchemaError> {
        let obj = raw.as_object().ok_or_else(|| SchemaError::InvalidRule {
            field: String::new(),
            rule: "logic".to_string(),
            reason: "expected an object".to_string(),
        })?;
        let formula = obj.get("formula").cloned().ok_or_else(|| SchemaError::InvalidRule {
            field: String::new(),
            rule: "logic".to_string(),
            reason: "missing `formula`".to_string(),
        })?;
        let errormsg = obj.get("errormsg").and_then(|v| v.as_str()).map(str::to_string);
        Ok(LogicRule { formula, errormsg })
    }
}

impl Rule for LogicRule {
    fn name(&self) -> &'static str {
        "logic"
    }

    fn is_null_tolerant(&self) -> bool {
        true
    }

    fn validate(&self, ctx: &RuleContext) -> Result<(), RuleFailure> {
        let result = logic::evaluate(&self.formula, ctx.record)?;
        if result.is_truthy() {
            Ok(())
        } else {
            fail(
                "logic",
                self.errormsg
                    .clone()
                    .unwrap_or_else(|| "formula evaluated to a falsy value".to_string()),
            )
        }
    }
}
