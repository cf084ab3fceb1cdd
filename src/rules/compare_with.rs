use crate::error::{SchemaError, SystemError};
use crate::logic;
use crate::record::Record;
use crate::value::Value;

use super::{fail, Rule, RuleContext, RuleFailure};

#[derive(Debug, Clone, Copy)]
enum Comparator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparator {
    fn parse(s: &str) -> Result<Self, SchemaError> {
        match s {
            "==" => Ok(Comparator::Eq),
            "!=" => Ok(Comparator::Ne),
            "<" => Ok(Comparator::Lt),
            "<=" => Ok(Comparator::Le),
            ">" => Ok(Comparator::Gt),
            ">=" => Ok(Comparator::Ge),
            other => Err(SchemaError::InvalidRule {
                field: String::new(),
                rule: "compare_with".to_string(),
                reason: format!("unrecognized comparator `{other}`"),
            }),
        }
    }

    fn apply(self, lhs: &Value, rhs: &Value) -> bool {
        match self {
            Comparator::Eq => lhs.soft_eq(rhs),
            Comparator::Ne => !lhs.soft_eq(rhs),
            Comparator::Lt => lhs.lt(rhs),
            Comparator::Le => lhs.le(rhs),
            Comparator::Gt => lhs.gt(rhs),
            Comparator::Ge => lhs.ge(rhs),
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Comparator::Eq => "==",
            Comparator::Ne => "!=",
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Abs,
}

impl ArithOp {
    fn parse(s: &str) -> Result<Self, SchemaError> {
        match s {
            "+" => Ok(ArithOp::Add),
            "-" => Ok(ArithOp::Sub),
            "*" => Ok(ArithOp::Mul),
            "/" => Ok(ArithOp::Div),
            "abs" => Ok(ArithOp::Abs),
            other => Err(SchemaError::InvalidRule {
                field: String::new(),
                rule: "compare_with".to_string(),
                reason: format!("unrecognized op `{other}`"),
            }),
        }
    }
}

#[derive(Debug, Clone)]
enum IgnoreEmpty {
    Bool(bool),
    Fields(Vec<String>),
}

/// `compare_with`: `field {comparator} (base {op} adjustment)`, or the `abs` form
/// `abs(field - base) {comparator} adjustment` (§4.2.1).
pub struct CompareWith {
    comparator: Comparator,
    base: serde_json::Value,
    op: Option<ArithOp>,
    adjustment: Option<serde_json::Value>,
    previous_record: bool,
    ignore_empty: Option<IgnoreEmpty>,
}

impl CompareWith {
    pub fn compile(raw: &serde_json::Value) -> Result<Self, SchemaError> {
        let obj = raw.as_object().ok_or_else(|| SchemaError::InvalidRule {
            field: String::new(),
            rule: "compare_with".to_string(),
            reason: "expected an object".to_string(),
        })?;
        let comparator = obj
            .get("comparator")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SchemaError::InvalidRule {
                field: String::new(),
                rule: "compare_with".to_string(),
                reason: "missing `comparator`".to_string(),
            })
            .and_then(Comparator::parse)?;
        let base = obj
            .get("base")
            .cloned()
            .ok_or_else(|| SchemaError::InvalidRule {
                field: String::new(),
                rule: "compare_with".to_string(),
                reason: "missing `base`".to_string(),
            })?;
        let op = obj
            .get("op")
            .and_then(|v| v.as_str())
            .map(ArithOp::parse)
            .transpose()?;
        let adjustment = obj.get("adjustment").cloned();
        let previous_record = obj
            .get("previous_record")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let ignore_empty = match obj.get("ignore_empty") {
            None => None,
            Some(serde_json::Value::Bool(b)) => Some(IgnoreEmpty::Bool(*b)),
            Some(serde_json::Value::Array(items)) => Some(IgnoreEmpty::Fields(
                items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
            )),
            Some(_) => {
                return Err(SchemaError::InvalidRule {
                    field: String::new(),
                    rule: "compare_with".to_string(),
                    reason: "`ignore_empty` must be a bool or list of field names".to_string(),
                })
            }
        };
        Ok(CompareWith {
            comparator,
            base,
            op,
            adjustment,
            previous_record,
            ignore_empty,
        })
    }

    fn resolve(raw: &serde_json::Value, record: &Record) -> Value {
        if let Some(s) = raw.as_str() {
            if let Some(v) = logic::clock_literal(s) {
                return v;
            }
            if record.contains_key(s) {
                return record.get(s);
            }
            return Value::String(s.to_string());
        }
        Value::from(raw.clone())
    }

    fn ignore_fields(&self, base_field_hint: Option<&str>) -> Option<Vec<String>> {
        match &self.ignore_empty {
            None => None,
            Some(IgnoreEmpty::Fields(fields)) => Some(fields.clone()),
            Some(IgnoreEmpty::Bool(false)) => None,
            Some(IgnoreEmpty::Bool(true)) => base_field_hint.map(|f| vec![f.to_string()]),
        }
    }

    fn combine(op: ArithOp, base: &Value, adjustment: &Value) -> Result<Value, SystemError> {
        let a = base.as_f64().ok_or_else(|| SystemError::RuleFailure {
            field: String::new(),
            rule: "compare_with".to_string(),
            reason: "base is not numeric".to_string(),
        })?;
        let b = adjustment.as_f64().ok_or_else(|| SystemError::RuleFailure {
            field: String::new(),
            rule: "compare_with".to_string(),
            reason: "adjustment is not numeric".to_string(),
        })?;
        let result = match op {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Div => {
                if b == 0.0 {
                    return Err(SystemError::RuleFailure {
                        field: String::new(),
                        rule: "compare_with".to_string(),
                        reason: "division by zero".to_string(),
                    });
                }
                a / b
            }
            ArithOp::Abs => (a - b).abs(),
        };
        Ok(Value::Float(result))
    }
}

impl Rule for CompareWith {
    fn name(&self) -> &'static str {
        "compare_with"
    }

    fn is_null_tolerant(&self) -> bool {
        true
    }

    fn validate(&self, ctx: &RuleContext) -> Result<(), RuleFailure> {
        if ctx.value.is_null() {
            return Ok(());
        }
        let base_field_hint = self.base.as_str();
        let base_record: std::borrow::Cow<Record> = if self.previous_record {
            let datastore = ctx.datastore.ok_or_else(|| SystemError::RuleFailure {
                field: ctx.field.to_string(),
                rule: "compare_with".to_string(),
                reason: "no datastore bound for previous_record lookup".to_string(),
            })?;
            let ignore = self.ignore_fields(base_field_hint);
            let prev = datastore
                .get_previous_record(ctx.order_by_field, ctx.record, ignore.as_deref())
                .map_err(|reason| SystemError::DatastoreFailure {
                    field: ctx.field.to_string(),
                    reason,
                })?;
            match prev {
                Some(record) => std::borrow::Cow::Owned(record),
                None => return Ok(()),
            }
        } else {
            std::borrow::Cow::Borrowed(ctx.record)
        };

        let base_value = Self::resolve(&self.base, &base_record);

        let (lhs, rhs) = match self.op {
            Some(ArithOp::Abs) => {
                let adjustment = self
                    .adjustment
                    .as_ref()
                    .map(|raw| Self::resolve(raw, ctx.record))
                    .unwrap_or(Value::Null);
                let field_val = ctx.value.as_f64().ok_or_else(|| SystemError::RuleFailure {
                    field: ctx.field.to_string(),
                    rule: "compare_with".to_string(),
                    reason: "field value is not numeric".to_string(),
                })?;
                let base_val = base_value.as_f64().ok_or_else(|| SystemError::RuleFailure {
                    field: ctx.field.to_string(),
                    rule: "compare_with".to_string(),
                    reason: "base is not numeric".to_string(),
                })?;
                (Value::Float((field_val - base_val).abs()), adjustment)
            }
            Some(op) => {
                let adjustment = self
                    .adjustment
                    .as_ref()
                    .map(|raw| Self::resolve(raw, ctx.record))
                    .unwrap_or(Value::Null);
                let combined = Self::combine(op, &base_value, &adjustment).map_err(|e| match e {
                    SystemError::RuleFailure { rule, reason, .. } => SystemError::RuleFailure {
                        field: ctx.field.to_string(),
                        rule,
                        reason,
                    },
                    other => other,
                })?;
                (ctx.value.clone(), combined)
            }
            None => (ctx.value.clone(), base_value),
        };

        if self.comparator.apply(&lhs, &rhs) {
            Ok(())
        } else {
            fail(
                "compare_with",
                format!("`{lhs}` does not satisfy `{} {rhs}`", self.comparator.symbol()),
            )
        }
    }
}
