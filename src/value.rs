//! The tagged value model shared by records, schemas and the expression interpreter.
//!
//! See spec §3: `Null | Bool(b) | Int(i) | Float(f) | String(s) | Date(d)`, with soft
//! equality (absolute tolerance 0.01) and null-safe ordering.

use std::convert::TryFrom;
use std::fmt;

use chrono::NaiveDate;
use num_cmp::NumCmp;

/// Absolute tolerance used by soft (float-aware) equality, per spec §3.
pub const FLOAT_TOLERANCE: f64 = 0.01;

/// A single scalar value flowing through records, schemas and the logic interpreter.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Date(NaiveDate),
    List(Vec<Value>),
}

/// The type tags accepted by the `type` rule (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    Integer,
    Float,
    String,
    Bool,
    Date,
    List,
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeTag::Integer => "integer",
            TypeTag::Float => "float",
            TypeTag::String => "string",
            TypeTag::Bool => "bool",
            TypeTag::Date => "date",
            TypeTag::List => "list",
        };
        write!(f, "{name}")
    }
}

impl TryFrom<&str> for TypeTag {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "integer" => Ok(TypeTag::Integer),
            "float" => Ok(TypeTag::Float),
            "string" => Ok(TypeTag::String),
            "bool" => Ok(TypeTag::Bool),
            "date" => Ok(TypeTag::Date),
            "list" => Ok(TypeTag::List),
            _ => Err(()),
        }
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness used by `and`/`or`/`!` in the logic interpreter (§4.1): non-null,
    /// non-zero, non-empty.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Date(_) => true,
            Value::List(items) => !items.is_empty(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::String(s) => parse_date(s),
            _ => None,
        }
    }

    pub fn type_tag(&self) -> Option<TypeTag> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(TypeTag::Bool),
            Value::Int(_) => Some(TypeTag::Integer),
            Value::Float(_) => Some(TypeTag::Float),
            Value::Date(_) => Some(TypeTag::Date),
            Value::String(_) => Some(TypeTag::String),
            Value::List(_) => Some(TypeTag::List),
        }
    }

    /// Whether `self` matches `tag`, per spec §4.2: float accepts integers too, and a
    /// date-shaped string satisfies `date`.
    pub fn matches_type(&self, tag: TypeTag) -> bool {
        match (self, tag) {
            (Value::Bool(_), TypeTag::Bool) => true,
            (Value::Int(_), TypeTag::Integer) => true,
            (Value::Int(_), TypeTag::Float) => true,
            (Value::Float(_), TypeTag::Float) => true,
            (Value::Date(_), TypeTag::Date) => true,
            (Value::String(_), TypeTag::String) => true,
            (Value::String(s), TypeTag::Date) => parse_date(s).is_some(),
            (Value::List(_), TypeTag::List) => true,
            _ => false,
        }
    }

    /// Soft equality: absolute float tolerance, null-equals-null, §3/§9.
    pub fn soft_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.soft_eq(y))
            }
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => (a - b).abs() <= FLOAT_TOLERANCE,
                _ => match (self.as_date(), other.as_date()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                },
            },
        }
    }

    /// Strict numeric ordering. Null never compares (`<`, `<=`, `>`, `>=` all false)
    /// against anything, per §3/§9. Integer/integer and integer/float comparisons go
    /// through [`num_cmp::NumCmp`] rather than casting both sides to `f64`, the same
    /// precision concern the teacher's `minimum`/`maximum` validators guard against for
    /// values outside `f64`'s exact integer range.
    pub fn num_cmp(&self, other: &Value) -> Option<std::cmp::Ordering> {
        if self.is_null() || other.is_null() {
            return None;
        }
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => NumCmp::num_cmp(*a, *b),
            (Value::Int(a), Value::Float(b)) => NumCmp::num_cmp(*a, *b),
            (Value::Float(a), Value::Int(b)) => NumCmp::num_cmp(*a, *b),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => match (self.as_date(), other.as_date()) {
                    (Some(a), Some(b)) => Some(a.cmp(&b)),
                    _ => None,
                },
            },
        }
    }

    pub fn lt(&self, other: &Value) -> bool {
        matches!(self.num_cmp(other), Some(std::cmp::Ordering::Less))
    }
    pub fn le(&self, other: &Value) -> bool {
        matches!(
            self.num_cmp(other),
            Some(std::cmp::Ordering::Less) | Some(std::cmp::Ordering::Equal)
        )
    }
    pub fn gt(&self, other: &Value) -> bool {
        matches!(self.num_cmp(other), Some(std::cmp::Ordering::Greater))
    }
    pub fn ge(&self, other: &Value) -> bool {
        matches!(
            self.num_cmp(other),
            Some(std::cmp::Ordering::Greater) | Some(std::cmp::Ordering::Equal)
        )
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Date(d) => write!(f, "{d}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            // Objects have no scalar representation in this model; not a shape any
            // rule keyword (§4.2) expects a field value to take.
            other @ serde_json::Value::Object(_) => Value::String(other.to_string()),
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Date(d) => serde_json::Value::String(d.to_string()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(serde_json::Value::from).collect()),
        }
    }
}

/// Parses `YYYY/MM/DD` or `YYYY-MM-DD`, the two date shapes spec §3 recognizes.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y/%m/%d"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(1.0, 1.005; "within tolerance")]
    #[test_case(1.0, 1.01; "at tolerance boundary")]
    fn soft_eq_within_tolerance(a: f64, b: f64) {
        assert!(Value::Float(a).soft_eq(&Value::Float(b)));
    }

    #[test]
    fn soft_eq_outside_tolerance() {
        assert!(!Value::Float(1.0).soft_eq(&Value::Float(1.02)));
    }

    #[test]
    fn soft_eq_null_only_equals_null() {
        assert!(Value::Null.soft_eq(&Value::Null));
        assert!(!Value::Null.soft_eq(&Value::Int(0)));
        assert!(!Value::Int(0).soft_eq(&Value::Null));
    }

    #[test]
    fn soft_eq_is_commutative() {
        let pairs = [
            (Value::Int(3), Value::Float(3.0)),
            (Value::Null, Value::Int(1)),
            (Value::String("a".into()), Value::String("b".into())),
        ];
        for (a, b) in pairs {
            assert_eq!(a.soft_eq(&b), b.soft_eq(&a));
        }
    }

    #[test]
    fn null_ordering_never_holds() {
        let null = Value::Null;
        let one = Value::Int(1);
        assert!(!null.lt(&one));
        assert!(!null.gt(&one));
        assert!(!one.lt(&null));
        assert!(!one.gt(&null));
    }

    #[test]
    fn date_strings_parse_both_separators() {
        assert_eq!(parse_date("2024-01-02"), parse_date("2024/01/02"));
        assert!(parse_date("not-a-date").is_none());
    }

    #[test]
    fn integer_matches_float_type() {
        assert!(Value::Int(4).matches_type(TypeTag::Float));
        assert!(!Value::Float(4.5).matches_type(TypeTag::Integer));
    }

    #[test]
    fn json_array_becomes_list_value_and_matches_list_type() {
        let v = Value::from(serde_json::json!([1, "a", true]));
        assert!(matches!(v, Value::List(_)));
        assert!(v.matches_type(TypeTag::List));
        assert!(!Value::Int(1).matches_type(TypeTag::List));
    }

    #[test]
    fn list_soft_eq_compares_elementwise() {
        let a = Value::List(vec![Value::Int(1), Value::Float(2.0)]);
        let b = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert!(a.soft_eq(&b));
        assert!(!a.soft_eq(&Value::List(vec![Value::Int(1)])));
    }
}
