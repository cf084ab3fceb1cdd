//! Reference CLI driver (§6 "CLI (reference driver, ADDED...)"). Reads a JSON/YAML rule
//! schema and a CSV of records, builds an in-memory datastore from the same CSV so
//! `temporalrules`/`compare_with(previous_record: true)` work without a live host, and
//! emits a CSV or JSON validation report plus a console summary table.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use prettytable::{Cell, Row, Table};
use qualitycheck::{InMemoryDatastore, QualityCheck, Record, Schema, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, ValueEnum)]
enum ReportFormat {
    Csv,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "qualitycheck-cli",
    version,
    about = "Validates CSV records against a declarative rule schema",
    long_about = "Reads a JSON or YAML rule schema and a CSV of records, builds an \
                  in-memory reference datastore from the same CSV so temporal rules work \
                  standalone, and writes a per-record validation report.\n\n\
                  Example usage:\n  \
                  qualitycheck-cli --schema rules.yaml --records visits.csv --primary-key ptid"
)]
struct Args {
    /// Path to the JSON or YAML rule schema.
    #[arg(long, value_name = "FILE")]
    schema: PathBuf,

    /// Path to the CSV of records to validate (header row = field names).
    #[arg(long, value_name = "FILE")]
    records: PathBuf,

    /// Field that uniquely identifies a participant across visits.
    #[arg(long)]
    primary_key: String,

    /// Field used to order a participant's visits for temporal rules; defaults to
    /// `--primary-key` when the dataset has no separate visit-ordering column.
    #[arg(long)]
    order_by: Option<String>,

    /// Reject any record carrying a field the schema does not declare, instead of
    /// ignoring it.
    #[arg(long)]
    strict: bool,

    /// Report output format.
    #[arg(long, value_enum, default_value = "csv")]
    format: ReportFormat,

    /// Path to write the report to; defaults to stdout.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Enable verbose structured logging (equivalent to RUST_LOG=debug).
    #[arg(short, long)]
    verbose: bool,
}

struct RecordResult {
    primary_key: String,
    passed: bool,
    sys_failure: bool,
    errors: String,
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(&args) {
        Ok(all_passed) => {
            if !all_passed {
                std::process::exit(1);
            }
        }
        Err(err) => {
            eprintln!("Error: {err:#}");
            std::process::exit(2);
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(args: &Args) -> Result<bool> {
    let schema = load_schema(&args.schema)?;
    let (records, headers) = load_records(&args.records)?;

    let datastore = InMemoryDatastore::new(
        args.primary_key.clone(),
        args.order_by.as_deref().unwrap_or(&args.primary_key),
        records.clone(),
    );
    let qc = QualityCheck::new(
        args.primary_key.clone(),
        schema,
        args.strict,
        Some(Box::new(datastore)),
    )
    .with_context(|| "schema failed validation against the declared primary key".to_string())?
    .with_order_by_field(args.order_by.clone().unwrap_or_else(|| args.primary_key.clone()));

    info!(count = records.len(), "validating records");

    let mut results = Vec::with_capacity(records.len());
    let mut pass_count = 0usize;
    let mut fail_count = 0usize;
    let mut sys_failure_count = 0usize;

    for record in &records {
        let outcome = qc.validate_record(record);
        if outcome.system_failure {
            sys_failure_count += 1;
        } else if outcome.passed {
            pass_count += 1;
        } else {
            fail_count += 1;
        }
        let errors = outcome
            .errors
            .iter()
            .flat_map(|(field, msgs)| msgs.iter().map(move |m| format!("{field}: {m}")))
            .collect::<Vec<_>>()
            .join(" | ");
        results.push(RecordResult {
            primary_key: record.get(&args.primary_key).to_string(),
            passed: outcome.passed,
            sys_failure: outcome.system_failure,
            errors,
        });
    }

    print_summary(&headers, pass_count, fail_count, sys_failure_count);
    write_report(args, &results)?;

    Ok(fail_count == 0 && sys_failure_count == 0)
}

fn load_schema(path: &PathBuf) -> Result<Schema> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read schema file `{}`", path.display()))?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    let schema = if is_yaml {
        Schema::from_yaml_str(&text)
    } else {
        Schema::from_json_str(&text)
    };
    schema.with_context(|| format!("failed to compile schema `{}`", path.display()))
}

fn load_records(path: &PathBuf) -> Result<(Vec<Record>, Vec<String>)> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open records file `{}`", path.display()))?;
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.with_context(|| format!("failed to parse row in `{}`", path.display()))?;
        let mut record = Record::new();
        for (header, field) in headers.iter().zip(row.iter()) {
            record.insert(header.clone(), csv_value(field));
        }
        records.push(record);
    }
    Ok((records, headers))
}

/// Coerces a raw CSV cell into a typed [`Value`]: integer, then float, then bool, then
/// date-shaped string, falling back to a plain string; an empty cell is null.
fn csv_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Int(i);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        return Value::Float(f);
    }
    if let Ok(b) = trimmed.parse::<bool>() {
        return Value::Bool(b);
    }
    Value::String(trimmed.to_string())
}

fn print_summary(headers: &[String], pass: usize, fail: usize, sys_failure: usize) {
    let mut table = Table::new();
    table.add_row(Row::new(vec![
        Cell::new("Fields"),
        Cell::new("Passed"),
        Cell::new("Failed"),
        Cell::new("System failures"),
    ]));
    table.add_row(Row::new(vec![
        Cell::new(&headers.len().to_string()),
        Cell::new(&pass.to_string()),
        Cell::new(&fail.to_string()),
        Cell::new(&sys_failure.to_string()),
    ]));
    println!("{}", table);
}

fn write_report(args: &Args, results: &[RecordResult]) -> Result<()> {
    match &args.format {
        ReportFormat::Csv => write_csv_report(args, results),
        ReportFormat::Json => write_json_report(args, results),
    }
}

fn write_csv_report(args: &Args, results: &[RecordResult]) -> Result<()> {
    let mut writer: csv::Writer<Box<dyn std::io::Write>> = match &args.output {
        Some(path) => csv::Writer::from_writer(Box::new(
            fs::File::create(path).with_context(|| format!("failed to create `{}`", path.display()))?,
        )),
        None => csv::Writer::from_writer(Box::new(std::io::stdout())),
    };
    writer.write_record(["primary_key", "passed", "sys_failure", "errors"])?;
    for result in results {
        writer.write_record(&[
            result.primary_key.clone(),
            result.passed.to_string(),
            result.sys_failure.to_string(),
            result.errors.clone(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_json_report(args: &Args, results: &[RecordResult]) -> Result<()> {
    let rows: Vec<BTreeMap<&str, serde_json::Value>> = results
        .iter()
        .map(|r| {
            let mut row = BTreeMap::new();
            row.insert("primary_key", serde_json::Value::String(r.primary_key.clone()));
            row.insert("passed", serde_json::Value::Bool(r.passed));
            row.insert("sys_failure", serde_json::Value::Bool(r.sys_failure));
            row.insert("errors", serde_json::Value::String(r.errors.clone()));
            row
        })
        .collect();
    let text = serde_json::to_string_pretty(&rows)?;
    match &args.output {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("failed to write `{}`", path.display()))?
        }
        None => println!("{text}"),
    }
    Ok(())
}
