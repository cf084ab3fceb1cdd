//! Record model: a flat, order-preserving mapping from field name to [`Value`] (§3).

use indexmap::IndexMap;

use crate::schema::Schema;
use crate::value::Value;

/// A single form submission. Order-preserving so that serialized reports (the CLI's
/// CSV/JSON output) keep a stable column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record(IndexMap<String, Value>);

impl Record {
    pub fn new() -> Self {
        Record(IndexMap::new())
    }

    pub fn get(&self, field: &str) -> Value {
        self.0.get(field).cloned().unwrap_or(Value::Null)
    }

    pub fn contains_key(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fills in `Value::Null` for every schema field absent from `self`, per spec §3/§4.4
    /// step 1. Idempotent: casting an already-cast record is a no-op (every schema field
    /// is already present).
    pub fn cast(&self, schema: &Schema) -> Record {
        let mut cast = self.clone();
        for field in schema.field_names() {
            cast.0.entry(field.clone()).or_insert(Value::Null);
        }
        cast
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Record(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;

    #[test]
    fn cast_fills_missing_fields_with_null() {
        let schema = Schema::compile_json(serde_json::json!({
            "pk": {"type": "integer", "required": true},
            "age": {"type": "integer"}
        }))
        .unwrap();
        let mut record = Record::new();
        record.insert("pk", Value::Int(1));
        let cast = record.cast(&schema);
        assert_eq!(cast.get("age"), Value::Null);
    }

    #[test]
    fn cast_is_idempotent() {
        let schema = Schema::compile_json(serde_json::json!({
            "pk": {"type": "integer", "required": true}
        }))
        .unwrap();
        let mut record = Record::new();
        record.insert("pk", Value::Int(1));
        let once = record.cast(&schema);
        let twice = once.cast(&schema);
        assert_eq!(once, twice);
    }
}
