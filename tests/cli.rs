use std::fs;

use assert_cmd::Command;
use tempfile::tempdir;

fn cli() -> Command {
    Command::cargo_bin("qualitycheck-cli").unwrap()
}

#[test]
fn all_valid_records_exit_zero() {
    let dir = tempdir().unwrap();
    let schema = dir.path().join("schema.json");
    fs::write(
        &schema,
        r#"{"ptid": {"type": "integer", "required": true}, "age": {"type": "integer", "min": 0, "max": 120}}"#,
    )
    .unwrap();
    let records = dir.path().join("records.csv");
    fs::write(&records, "ptid,age\n1,42\n2,57\n").unwrap();

    let mut cmd = cli();
    cmd.arg("--schema")
        .arg(&schema)
        .arg("--records")
        .arg(&records)
        .arg("--primary-key")
        .arg("ptid");
    cmd.assert().success();
}

#[test]
fn out_of_range_record_exits_one() {
    let dir = tempdir().unwrap();
    let schema = dir.path().join("schema.json");
    fs::write(
        &schema,
        r#"{"ptid": {"type": "integer", "required": true}, "age": {"type": "integer", "min": 0, "max": 120}}"#,
    )
    .unwrap();
    let records = dir.path().join("records.csv");
    fs::write(&records, "ptid,age\n1,200\n").unwrap();

    let mut cmd = cli();
    cmd.arg("--schema")
        .arg(&schema)
        .arg("--records")
        .arg(&records)
        .arg("--primary-key")
        .arg("ptid");
    cmd.assert().code(1);
}

#[test]
fn missing_schema_file_exits_two() {
    let dir = tempdir().unwrap();
    let records = dir.path().join("records.csv");
    fs::write(&records, "ptid\n1\n").unwrap();

    let mut cmd = cli();
    cmd.arg("--schema")
        .arg(dir.path().join("does-not-exist.json"))
        .arg("--records")
        .arg(&records)
        .arg("--primary-key")
        .arg("ptid");
    cmd.assert().code(2);
}

#[test]
fn json_report_is_written_to_the_requested_file() {
    let dir = tempdir().unwrap();
    let schema = dir.path().join("schema.json");
    fs::write(&schema, r#"{"ptid": {"type": "integer", "required": true}}"#).unwrap();
    let records = dir.path().join("records.csv");
    fs::write(&records, "ptid\n1\n2\n").unwrap();
    let report = dir.path().join("report.json");

    let mut cmd = cli();
    cmd.arg("--schema")
        .arg(&schema)
        .arg("--records")
        .arg(&records)
        .arg("--primary-key")
        .arg("ptid")
        .arg("--format")
        .arg("json")
        .arg("--output")
        .arg(&report);
    cmd.assert().success();

    let written = fs::read_to_string(&report).unwrap();
    assert!(written.contains("\"passed\": true"));
}

#[test]
fn strict_flag_fails_records_with_undeclared_fields() {
    let dir = tempdir().unwrap();
    let schema = dir.path().join("schema.json");
    fs::write(&schema, r#"{"ptid": {"type": "integer", "required": true}}"#).unwrap();
    let records = dir.path().join("records.csv");
    fs::write(&records, "ptid,extra\n1,9\n").unwrap();

    let mut cmd = cli();
    cmd.arg("--schema")
        .arg(&schema)
        .arg("--records")
        .arg(&records)
        .arg("--primary-key")
        .arg("ptid")
        .arg("--strict");
    cmd.assert().code(1);
}
