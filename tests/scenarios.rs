//! End-to-end scenarios exercising the full compile-then-validate path through the public
//! API, one per representative rule keyword.

use chrono::Datelike;
use qualitycheck::{InMemoryDatastore, QualityCheck, Record, Schema, Value};

fn qc(doc: serde_json::Value, primary_key: &str) -> QualityCheck {
    let schema = Schema::compile_json(doc).unwrap();
    QualityCheck::new(primary_key, schema, false, None).unwrap()
}

fn rec(fields: &[(&str, Value)]) -> Record {
    let mut r = Record::new();
    for (k, v) in fields {
        r.insert(*k, v.clone());
    }
    r
}

#[test]
fn hello_world() {
    let qc = qc(
        serde_json::json!({
            "pk": {"type": "integer", "required": true},
            "hello": {"type": "string", "required": true, "allowed": ["world"]}
        }),
        "pk",
    );

    let ok = qc.validate_record(&rec(&[("pk", Value::Int(1)), ("hello", Value::String("world".into()))]));
    assert!(ok.passed);
    assert!(ok.errors.is_empty());

    let bad = qc.validate_record(&rec(&[("pk", Value::Int(2)), ("hello", Value::String("pluto".into()))]));
    assert!(!bad.passed);
    assert!(bad.errors.get("hello").unwrap()[0].contains("pluto"));
}

#[test]
fn compare_with_current_year() {
    let qc = qc(
        serde_json::json!({
            "pk": {"type": "string", "required": true},
            "birthyr": {
                "type": "integer",
                "compare_with": {"comparator": "<=", "base": "current_year", "adjustment": 15, "op": "-"}
            }
        }),
        "pk",
    );

    let current_year = chrono::Local::now().year();
    let pass = qc.validate_record(&rec(&[
        ("pk", Value::String("a".into())),
        ("birthyr", Value::Int((current_year - 29) as i64)),
    ]));
    assert!(pass.passed, "{:?}", pass.errors);

    let fail = qc.validate_record(&rec(&[
        ("pk", Value::String("a".into())),
        ("birthyr", Value::Int((current_year - 4) as i64)),
    ]));
    assert!(!fail.passed);
}

#[test]
fn compatibility_if_then() {
    let qc = qc(
        serde_json::json!({
            "pk": {"type": "string", "required": true},
            "incntmod": {"type": "integer", "required": true},
            "incntmdx": {
                "type": "integer",
                "nullable": true,
                "compatibility": [{"if": {"incntmod": {"allowed": [6]}}, "then": {"incntmdx": {"nullable": false}}}]
            }
        }),
        "pk",
    );

    let pass1 = qc.validate_record(&rec(&[
        ("pk", Value::String("a".into())),
        ("incntmod", Value::Int(1)),
        ("incntmdx", Value::Null),
    ]));
    assert!(pass1.passed, "{:?}", pass1.errors);

    let pass2 = qc.validate_record(&rec(&[
        ("pk", Value::String("a".into())),
        ("incntmod", Value::Int(6)),
        ("incntmdx", Value::Int(1)),
    ]));
    assert!(pass2.passed, "{:?}", pass2.errors);

    let fail = qc.validate_record(&rec(&[
        ("pk", Value::String("a".into())),
        ("incntmod", Value::Int(6)),
        ("incntmdx", Value::Null),
    ]));
    assert!(!fail.passed);
}

#[test]
fn temporalrules_across_visits() {
    let schema = Schema::compile_json(serde_json::json!({
        "pk": {"type": "string", "required": true},
        "visit": {"type": "integer", "required": true},
        "taxes": {
            "type": "integer",
            "temporalrules": [{"previous": {"taxes": {"allowed": [0]}}, "current": {"taxes": {"forbidden": [8]}}}]
        }
    }))
    .unwrap();

    let mut first_visit = Record::new();
    first_visit.insert("pk", Value::String("P".into()));
    first_visit.insert("visit", Value::Int(1));
    first_visit.insert("taxes", Value::Int(0));

    let datastore = InMemoryDatastore::new("pk", "visit", vec![first_visit]);
    let qc = QualityCheck::new("pk", schema, false, Some(Box::new(datastore)))
        .unwrap()
        .with_order_by_field("visit");

    let pass = qc.validate_record(&rec(&[
        ("pk", Value::String("P".into())),
        ("visit", Value::Int(2)),
        ("taxes", Value::Int(1)),
    ]));
    assert!(pass.passed, "{:?}", pass.errors);

    let fail = qc.validate_record(&rec(&[
        ("pk", Value::String("P".into())),
        ("visit", Value::Int(2)),
        ("taxes", Value::Int(8)),
    ]));
    assert!(!fail.passed);
    let message = &fail.errors.get("taxes").unwrap()[0];
    assert!(message.contains("temporal rule no: 1"), "{message}");
}

#[test]
fn logic_count() {
    let qc = qc(
        serde_json::json!({
            "pk": {"type": "string", "required": true},
            "a": {"type": "integer", "nullable": true},
            "b": {"type": "integer", "nullable": true},
            "c": {"type": "integer", "nullable": true},
            "total": {
                "type": "integer",
                "logic": {"formula": {"==": [{"var": "total"}, {"count": [{"var": "a"}, {"var": "b"}, {"var": "c"}]}]}}
            }
        }),
        "pk",
    );

    let pass = qc.validate_record(&rec(&[
        ("pk", Value::String("a".into())),
        ("total", Value::Int(2)),
        ("a", Value::Int(1)),
        ("b", Value::Int(0)),
        ("c", Value::Int(5)),
    ]));
    assert!(pass.passed, "{:?}", pass.errors);

    let fail = qc.validate_record(&rec(&[
        ("pk", Value::String("a".into())),
        ("total", Value::Int(1)),
        ("a", Value::Int(1)),
        ("b", Value::Int(1)),
        ("c", Value::Int(1)),
    ]));
    assert!(!fail.passed);
}

#[test]
fn compute_gds_with_proration() {
    let items: Vec<String> = (1..=15).map(|i| format!("g{i}")).collect();
    let qc = qc(
        serde_json::json!({
            "pk": {"type": "string", "required": true},
            "gds": {"type": "integer", "compute_gds": items}
        }),
        "pk",
    );

    let mut fields: Vec<(&str, Value)> = vec![("pk", Value::String("a".into()))];
    let names: Vec<String> = (1..=15).map(|i| format!("g{i}")).collect();
    // 14 answered, summing to 8 (eight 1s, six 0s), one null.
    let answers = [1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0];
    for (name, value) in names.iter().take(14).zip(answers.iter()) {
        fields.push((name.as_str(), Value::Int(*value)));
    }
    fields.push((names[14].as_str(), Value::Null));

    let mut pass_fields = fields.clone();
    pass_fields.push(("gds", Value::Int(9)));
    let pass = qc.validate_record(&rec(&pass_fields));
    assert!(pass.passed, "{:?}", pass.errors);

    let mut fail_fields = fields;
    fail_fields.push(("gds", Value::Int(8)));
    let fail = qc.validate_record(&rec(&fail_fields));
    assert!(!fail.passed);
}
