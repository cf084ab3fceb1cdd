use chrono::NaiveDate;
use tracing::warn;

use crate::error::SchemaError;

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
                rule: "compare_age".to_string(),
                reason: format!("unrecognized comparator `{other}`"),
            }),
        }
    }

    fn apply(self, age_years: f64, bound: f64) -> bool {
        match self {
            Comparator::Eq => (age_years - bound).abs() <= crate::value::FLOAT_TOLERANCE,
            Comparator::Ne => (age_years - bound).abs() > crate::value::FLOAT_TOLERANCE,
            Comparator::Lt => age_years < bound,
            Comparator::Le => age_years <= bound,
            Comparator::Gt => age_years > bound,
            Comparator::Ge => age_years >= bound,
        }
    }
}

enum CompareTo {
    Literal(f64),
    Field(String),
    List(Vec<CompareTarget>),
}

enum CompareTarget {
    Literal(f64),
    Field(String),
}

/// `compare_age`: `age_years = (field_date - birth_date).days / 365.25`, compared against
/// a literal, a field, or the minimum of a list of either (§4.2.2).
pub struct CompareAge {
    comparator: Comparator,
    birth_year: String,
    birth_month: Option<String>,
    birth_day: Option<String>,
    compare_to: CompareTo,
}

impl CompareAge {
    pub fn compile(raw: &serde_json::Value) -> Result<Self, SchemaError> {
        let obj = raw.as_object().ok_or_else(|| SchemaError::InvalidRule {
            field: String::new(),
            rule: "compare_age".to_string(),
            reason: "expected an object".to_string(),
        })?;
        let comparator = obj
            .get("comparator")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SchemaError::InvalidRule {
                field: String::new(),
                rule: "compare_age".to_string(),
                reason: "missing `comparator`".to_string(),
            })
            .and_then(Comparator::parse)?;
        let birth_year = obj
            .get("birth_year")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SchemaError::InvalidRule {
                field: String::new(),
                rule: "compare_age".to_string(),
                reason: "missing `birth_year`".to_string(),
            })?
            .to_string();
        let birth_month = obj.get("birth_month").and_then(|v| v.as_str()).map(str::to_string);
        let birth_day = obj.get("birth_day").and_then(|v| v.as_str()).map(str::to_string);
        let compare_to_raw = obj.get("compare_to").ok_or_else(|| SchemaError::InvalidRule {
            field: String::new(),
            rule: "compare_age".to_string(),
            reason: "missing `compare_to`".to_string(),
        })?;
        let compare_to = Self::parse_compare_to(compare_to_raw)?;
        Ok(CompareAge {
            comparator,
            birth_year,
            birth_month,
            birth_day,
            compare_to,
        })
    }

    fn parse_compare_to(raw: &serde_json::Value) -> Result<CompareTo, SchemaError> {
        match raw {
            serde_json::Value::Array(items) => {
                let targets = items
                    .iter()
                    .map(Self::parse_target)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(CompareTo::List(targets))
            }
            serde_json::Value::String(s) => Ok(CompareTo::Field(s.clone())),
            serde_json::Value::Number(n) => Ok(CompareTo::Literal(n.as_f64().unwrap_or(0.0))),
            _ => Err(SchemaError::InvalidRule {
                field: String::new(),
                rule: "compare_age".to_string(),
                reason: "`compare_to` must be a number, field name, or list".to_string(),
            }),
        }
    }

    fn parse_target(raw: &serde_json::Value) -> Result<CompareTarget, SchemaError> {
        match raw {
            serde_json::Value::String(s) => Ok(CompareTarget::Field(s.clone())),
            serde_json::Value::Number(n) => Ok(CompareTarget::Literal(n.as_f64().unwrap_or(0.0))),
            _ => Err(SchemaError::InvalidRule {
                field: String::new(),
                rule: "compare_age".to_string(),
                reason: "`compare_to` entries must be a number or field name".to_string(),
            }),
        }
    }
}

fn field_numeric(name: &str, record: &crate::record::Record) -> Option<f64> {
    record.get(name).as_f64()
}

impl Rule for CompareAge {
    fn name(&self) -> &'static str {
        "compare_age"
    }

    fn is_null_tolerant(&self) -> bool {
        true
    }

    fn validate(&self, ctx: &RuleContext) -> Result<(), RuleFailure> {
        let Some(field_date) = ctx.value.as_date() else {
            return Ok(());
        };
        let year = field_numeric(&self.birth_year, ctx.record);
        let month = self
            .birth_month
            .as_ref()
            .and_then(|f| field_numeric(f, ctx.record))
            .unwrap_or(1.0);
        let day = self
            .birth_day
            .as_ref()
            .and_then(|f| field_numeric(f, ctx.record))
            .unwrap_or(1.0);
        let birth_date = year.and_then(|y| NaiveDate::from_ymd_opt(y as i32, month as u32, day as u32));
        let Some(birth_date) = birth_date else {
            warn!(field = ctx.field, "compare_age: birth date components do not form a valid date");
            return Ok(());
        };
        let age_years = (field_date - birth_date).num_days() as f64 / 365.25;

        let bound = match &self.compare_to {
            CompareTo::Literal(v) => Some(*v),
            CompareTo::Field(f) => field_numeric(f, ctx.record),
            CompareTo::List(targets) => targets
                .iter()
                .filter_map(|t| match t {
                    CompareTarget::Literal(v) => Some(*v),
                    CompareTarget::Field(f) => field_numeric(f, ctx.record),
                })
                .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v)))),
        };
        let Some(bound) = bound else {
            return Ok(());
        };

        if self.comparator.apply(age_years, bound) {
            Ok(())
        } else {
            fail(
                "compare_age",
                format!("computed age {age_years:.2} does not satisfy the comparison against {bound}"),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use crate::rules::GdsRounding;
    use crate::schema::Schema;
    use crate::value::Value;
    use chrono::NaiveDate;
    use serde_json::json;

    fn ctx<'a>(value: &'a Value, record: &'a Record, schema: &'a Schema) -> RuleContext<'a> {
        RuleContext {
            field: "visit_date",
            value,
            record,
            schema,
            datastore: None,
            primary_key_field: "pk",
            order_by_field: "pk",
            gds_rounding: GdsRounding::default(),
        }
    }

    #[test]
    fn passes_when_computed_age_satisfies_the_comparator() {
        let rule = CompareAge::compile(&json!({
            "comparator": ">=",
            "birth_year": "byear",
            "compare_to": 18
        }))
        .unwrap();
        let mut record = Record::new();
        record.insert("byear", Value::Int(1990));
        let schema = Schema::compile_json(json!({})).unwrap();
        let value = Value::Date(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        assert!(rule.validate(&ctx(&value, &record, &schema)).is_ok());
    }

    #[test]
    fn fails_when_computed_age_does_not_satisfy_the_comparator() {
        let rule = CompareAge::compile(&json!({
            "comparator": ">=",
            "birth_year": "byear",
            "compare_to": 18
        }))
        .unwrap();
        let mut record = Record::new();
        record.insert("byear", Value::Int(2015));
        let schema = Schema::compile_json(json!({})).unwrap();
        let value = Value::Date(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        assert!(rule.validate(&ctx(&value, &record, &schema)).is_err());
    }

    #[test]
    fn invalid_birth_date_components_pass_without_failing() {
        let rule = CompareAge::compile(&json!({
            "comparator": ">=",
            "birth_year": "byear",
            "birth_month": "bmonth",
            "compare_to": 18
        }))
        .unwrap();
        let mut record = Record::new();
        record.insert("byear", Value::Int(1990));
        record.insert("bmonth", Value::Int(13));
        let schema = Schema::compile_json(json!({})).unwrap();
        let value = Value::Date(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        assert!(rule.validate(&ctx(&value, &record, &schema)).is_ok());
    }

    #[test]
    fn compare_to_list_uses_the_minimum_bound() {
        let rule = CompareAge::compile(&json!({
            "comparator": ">=",
            "birth_year": "byear",
            "compare_to": [18, "min_age_field"]
        }))
        .unwrap();
        let mut record = Record::new();
        record.insert("byear", Value::Int(1995));
        record.insert("min_age_field", Value::Int(30));
        let schema = Schema::compile_json(json!({})).unwrap();
        let value = Value::Date(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        // computed age is ~25, the list's minimum bound is 18, so 25 >= 18 passes.
        assert!(rule.validate(&ctx(&value, &record, &schema)).is_ok());
    }
}
