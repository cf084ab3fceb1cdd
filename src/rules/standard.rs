use crate::error::SchemaError;
use crate::logic;
use crate::value::{self, TypeTag as ValueTypeTag};

use super::{fail, Rule, RuleContext, RuleFailure};

/// `type`: the value's tag must match one of the declared tags (§4.2 "Standard rules").
pub struct TypeTag {
    allowed: Vec<ValueTypeTag>,
}

impl TypeTag {
    pub fn compile(raw: &serde_json::Value) -> Result<Self, SchemaError> {
        let tags = match raw {
            serde_json::Value::String(s) => vec![s.clone()],
            serde_json::Value::Array(items) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => {
                return Err(SchemaError::InvalidRule {
                    field: String::new(),
                    rule: "type".to_string(),
                    reason: "expected a string or list of strings".to_string(),
                })
            }
        };
        let mut allowed = Vec::with_capacity(tags.len());
        for tag in &tags {
            let parsed = ValueTypeTag::try_from(tag.as_str()).map_err(|_| SchemaError::InvalidRule {
                field: String::new(),
                rule: "type".to_string(),
                reason: format!("unrecognized type tag `{tag}`"),
            })?;
            allowed.push(parsed);
        }
        Ok(TypeTag { allowed })
    }
}

impl Rule for TypeTag {
    fn name(&self) -> &'static str {
        "type"
    }

    fn validate(&self, ctx: &RuleContext) -> Result<(), RuleFailure> {
        if self.allowed.iter().any(|tag| ctx.value.matches_type(*tag)) {
            Ok(())
        } else {
            let names: Vec<String> = self.allowed.iter().map(|t| t.to_string()).collect();
            fail(
                "type",
                format!("expected type {} but found `{}`", names.join(" or "), ctx.value),
            )
        }
    }
}

/// `allowed` / `forbidden`: soft-equality membership in a literal list.
pub struct AllowedForbidden {
    values: Vec<value::Value>,
    forbid: bool,
}

impl AllowedForbidden {
    pub fn compile(raw: &serde_json::Value, forbid: bool) -> Result<Self, SchemaError> {
        let items = raw.as_array().ok_or_else(|| SchemaError::InvalidRule {
            field: String::new(),
            rule: if forbid { "forbidden" } else { "allowed" }.to_string(),
            reason: "expected a list of values".to_string(),
        })?;
        Ok(AllowedForbidden {
            values: items.iter().map(|v| value::Value::from(v.clone())).collect(),
            forbid,
        })
    }
}

impl Rule for AllowedForbidden {
    fn name(&self) -> &'static str {
        if self.forbid {
            "forbidden"
        } else {
            "allowed"
        }
    }

    fn validate(&self, ctx: &RuleContext) -> Result<(), RuleFailure> {
        let member = self.values.iter().any(|v| v.soft_eq(ctx.value));
        let ok = if self.forbid { !member } else { member };
        if ok {
            Ok(())
        } else if self.forbid {
            fail("forbidden", format!("`{}` is not permitted", ctx.value))
        } else {
            fail("allowed", format!("`{}` is not one of the allowed values", ctx.value))
        }
    }
}

/// `min` / `max`: numeric bound, possibly resolved against the system clock
/// (`current_year`/`current_month`/`current_day`) at evaluation time.
pub struct MinMax {
    min: Option<serde_json::Value>,
    max: Option<serde_json::Value>,
}

impl MinMax {
    pub fn compile(min: Option<&serde_json::Value>, max: Option<&serde_json::Value>) -> Self {
        MinMax {
            min: min.cloned(),
            max: max.cloned(),
        }
    }

    fn resolve(bound: &serde_json::Value) -> value::Value {
        if let Some(s) = bound.as_str() {
            if let Some(v) = logic::clock_literal(s) {
                return v;
            }
        }
        value::Value::from(bound.clone())
    }
}

impl Rule for MinMax {
    fn name(&self) -> &'static str {
        "min/max"
    }

    fn validate(&self, ctx: &RuleContext) -> Result<(), RuleFailure> {
        if let Some(min) = &self.min {
            let bound = Self::resolve(min);
            if !ctx.value.ge(&bound) {
                return fail("min", format!("`{}` is below the minimum `{}`", ctx.value, bound));
            }
        }
        if let Some(max) = &self.max {
            let bound = Self::resolve(max);
            if !ctx.value.le(&bound) {
                return fail("max", format!("`{}` is above the maximum `{}`", ctx.value, bound));
            }
        }
        Ok(())
    }
}

/// `regex`: anchored full-string match, string values only.
pub struct Regex {
    pattern: regex::Regex,
    source: String,
}

impl Regex {
    pub fn compile(raw: &serde_json::Value) -> Result<Self, SchemaError> {
        let source = raw.as_str().ok_or_else(|| SchemaError::InvalidRule {
            field: String::new(),
            rule: "regex".to_string(),
            reason: "expected a string pattern".to_string(),
        })?;
        let anchored = format!("^(?:{source})$");
        let pattern = regex::Regex::new(&anchored).map_err(|e| SchemaError::InvalidRule {
            field: String::new(),
            rule: "regex".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Regex {
            pattern,
            source: source.to_string(),
        })
    }
}

impl Rule for Regex {
    fn name(&self) -> &'static str {
        "regex"
    }

    fn validate(&self, ctx: &RuleContext) -> Result<(), RuleFailure> {
        match ctx.value.as_str() {
            Some(s) if self.pattern.is_match(s) => Ok(()),
            Some(s) => fail("regex", format!("`{s}` does not match pattern `{}`", self.source)),
            None => fail("regex", "value is not a string"),
        }
    }
}

/// `anyof`: a list of sub-schemas applied to the same field; passes if any succeeds.
pub struct AnyOf {
    alternatives: Vec<Vec<Box<dyn Rule>>>,
}

impl AnyOf {
    pub fn new(alternatives: Vec<Vec<Box<dyn Rule>>>) -> Self {
        AnyOf { alternatives }
    }
}

impl Rule for AnyOf {
    fn name(&self) -> &'static str {
        "anyof"
    }

    fn validate(&self, ctx: &RuleContext) -> Result<(), RuleFailure> {
        for alt in &self.alternatives {
            if alt.iter().all(|rule| rule.validate(ctx).is_ok()) {
                return Ok(());
            }
        }
        fail("anyof", format!("`{}` satisfies none of the alternatives", ctx.value))
    }
}

/// `filled`: `true` requires non-null, `false` requires null.
pub struct Filled {
    required_filled: bool,
}

impl Filled {
    pub fn compile(raw: &serde_json::Value) -> Result<Self, SchemaError> {
        let required_filled = raw.as_bool().ok_or_else(|| SchemaError::InvalidRule {
            field: String::new(),
            rule: "filled".to_string(),
            reason: "expected a boolean".to_string(),
        })?;
        Ok(Filled { required_filled })
    }
}

impl Rule for Filled {
    fn name(&self) -> &'static str {
        "filled"
    }

    fn is_null_tolerant(&self) -> bool {
        true
    }

    fn validate(&self, ctx: &RuleContext) -> Result<(), RuleFailure> {
        let is_null = ctx.value.is_null();
        if self.required_filled && is_null {
            fail("filled", "value must be filled")
        } else if !self.required_filled && !is_null {
            fail("filled", "value must be empty")
        } else {
            Ok(())
        }
    }
}
