//! The host-supplied collaborator for cross-visit rules (§4.3/§6).
//!
//! The teacher resolves `$ref` against an in-process [`Resolver`]; this schema format has
//! no references, so the analogous seam here is a caller-supplied store of prior records
//! and external code lookups (`rxnorm`, ADCID).

use crate::record::Record;

/// Implementations must be `Send + Sync`: §5 requires a datastore to be shareable across
/// validator instances even though the engine itself never parallelizes validation.
pub trait Datastore: Send + Sync {
    /// Returns the most recent record whose `order_by_field` value is strictly less than
    /// `current`'s, optionally restricted to rows where every field in
    /// `ignore_empty_fields` is non-null. `None` if no such record exists.
    fn get_previous_record(
        &self,
        order_by_field: &str,
        current: &Record,
        ignore_empty_fields: Option<&[String]>,
    ) -> Result<Option<Record>, String>;

    fn is_valid_rxcui(&self, code: &str) -> Result<bool, String>;

    fn is_valid_adcid(&self, id: &str) -> Result<bool, String> {
        let _ = id;
        Ok(true)
    }
}

/// A reference datastore backed by an in-memory grouping of records by primary key,
/// ordered by an `order_by` field — what the CLI builds from the input CSV so that
/// `temporalrules`/`compare_with(previous_record: true)` work without a live host store.
pub struct InMemoryDatastore {
    primary_key_field: String,
    records_by_pk: std::collections::HashMap<String, Vec<Record>>,
    rxcui_allowlist: Option<std::collections::HashSet<String>>,
    adcid_allowlist: Option<std::collections::HashSet<String>>,
}

impl InMemoryDatastore {
    /// `records` need not be pre-sorted; each group is sorted by `order_by_field` at
    /// construction.
    pub fn new(primary_key_field: impl Into<String>, order_by_field: &str, records: Vec<Record>) -> Self {
        let primary_key_field = primary_key_field.into();
        let mut groups: std::collections::HashMap<String, Vec<Record>> = std::collections::HashMap::new();
        for record in records {
            let pk = record.get(&primary_key_field).to_string();
            groups.entry(pk).or_default().push(record);
        }
        for group in groups.values_mut() {
            group.sort_by(|a, b| {
                let av = a.get(order_by_field);
                let bv = b.get(order_by_field);
                av.num_cmp(&bv).unwrap_or(std::cmp::Ordering::Equal)
            });
        }
        InMemoryDatastore {
            primary_key_field,
            records_by_pk: groups,
            rxcui_allowlist: None,
            adcid_allowlist: None,
        }
    }

    pub fn with_rxcui_allowlist(mut self, codes: impl IntoIterator<Item = String>) -> Self {
        self.rxcui_allowlist = Some(codes.into_iter().collect());
        self
    }

    pub fn with_adcid_allowlist(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.adcid_allowlist = Some(ids.into_iter().collect());
        self
    }
}

impl Datastore for InMemoryDatastore {
    fn get_previous_record(
        &self,
        order_by_field: &str,
        current: &Record,
        ignore_empty_fields: Option<&[String]>,
    ) -> Result<Option<Record>, String> {
        let pk = current.get(&self.primary_key_field).to_string();
        let current_order = current.get(order_by_field);
        let Some(group) = self.records_by_pk.get(&pk) else {
            return Ok(None);
        };
        let qualifies = |record: &Record| -> bool {
            match ignore_empty_fields {
                Some(fields) => fields.iter().all(|f| !record.get(f).is_null()),
                None => true,
            }
        };
        let mut best: Option<&Record> = None;
        for record in group {
            let order = record.get(order_by_field);
            if !order.lt(&current_order) {
                continue;
            }
            if !qualifies(record) {
                continue;
            }
            best = match best {
                None => Some(record),
                Some(b) if order.gt(&b.get(order_by_field)) => Some(record),
                Some(b) => Some(b),
            };
        }
        Ok(best.cloned())
    }

    fn is_valid_rxcui(&self, code: &str) -> Result<bool, String> {
        match &self.rxcui_allowlist {
            Some(set) => Ok(set.contains(code)),
            None => Ok(!code.trim().is_empty()),
        }
    }

    fn is_valid_adcid(&self, id: &str) -> Result<bool, String> {
        match &self.adcid_allowlist {
            Some(set) => Ok(set.contains(id)),
            None => Ok(!id.trim().is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn rec(pk: i64, visit: i64) -> Record {
        let mut r = Record::new();
        r.insert("pk", Value::Int(pk));
        r.insert("visit", Value::Int(visit));
        r
    }

    #[test]
    fn finds_most_recent_prior_visit() {
        let store = InMemoryDatastore::new("pk", "visit", vec![rec(1, 1), rec(1, 2), rec(1, 3)]);
        let current = rec(1, 3);
        let prev = store
            .get_previous_record("visit", &current, None)
            .unwrap()
            .unwrap();
        assert_eq!(prev.get("visit"), Value::Int(2));
    }

    #[test]
    fn no_prior_visit_returns_none() {
        let store = InMemoryDatastore::new("pk", "visit", vec![rec(1, 1)]);
        let current = rec(1, 1);
        assert!(store.get_previous_record("visit", &current, None).unwrap().is_none());
    }

    #[test]
    fn ignore_empty_fields_filters_candidates() {
        let mut r1 = rec(1, 1);
        r1.insert("score", Value::Null);
        let mut r2 = rec(1, 2);
        r2.insert("score", Value::Int(5));
        let store = InMemoryDatastore::new("pk", "visit", vec![r1, r2]);
        let current = rec(1, 3);
        let fields = vec!["score".to_string()];
        let prev = store
            .get_previous_record("visit", &current, Some(&fields))
            .unwrap()
            .unwrap();
        assert_eq!(prev.get("visit"), Value::Int(2));
    }
}
