//! A small JSON-logic-style expression interpreter (§4.1).
//!
//! An expression is either a JSON scalar (returned as-is) or a single-key object
//! `{op: args}`. This mirrors the teacher's keyword dispatch (one match arm per
//! operator) rather than building a trait-object tree: expressions are cheap, transient,
//! and re-evaluated per record, so there is no compilation phase to amortize.

use chrono::{Datelike, Local};
use once_cell::sync::Lazy;
use std::collections::HashSet;

use crate::error::SystemError;
use crate::record::Record;
use crate::value::Value;

/// Operator names recognized by [`evaluate`]. Built once so `unknown operator` checks
/// don't need to re-list every arm.
static KNOWN_OPS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "var", "==", "!=", "<", "<=", ">", ">=", "+", "-", "*", "/", "and", "or", "!", "in",
        "if", "count", "count_exact",
    ]
    .into_iter()
    .collect()
});

pub fn is_known_operator(op: &str) -> bool {
    KNOWN_OPS.contains(op)
}

/// Evaluates `expr` against `record`. See §4.1 for the operator table.
pub fn evaluate(expr: &serde_json::Value, record: &Record) -> Result<Value, SystemError> {
    match expr {
        serde_json::Value::Object(map) if map.len() == 1 => {
            let (op, args) = map.iter().next().expect("len == 1");
            eval_op(op, args, record)
        }
        other => Ok(Value::from(other.clone())),
    }
}

fn args_list(args: &serde_json::Value) -> Vec<serde_json::Value> {
    match args {
        serde_json::Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

fn eval_op(op: &str, args: &serde_json::Value, record: &Record) -> Result<Value, SystemError> {
    match op {
        "var" => eval_var(args, record),
        "==" => {
            let (a, b) = eval_pair(args, record)?;
            Ok(Value::Bool(a.soft_eq(&b)))
        }
        "!=" => {
            let (a, b) = eval_pair(args, record)?;
            Ok(Value::Bool(!a.soft_eq(&b)))
        }
        "<" => {
            let (a, b) = eval_pair(args, record)?;
            Ok(Value::Bool(a.lt(&b)))
        }
        "<=" => {
            let (a, b) = eval_pair(args, record)?;
            Ok(Value::Bool(a.le(&b)))
        }
        ">" => {
            let (a, b) = eval_pair(args, record)?;
            Ok(Value::Bool(a.gt(&b)))
        }
        ">=" => {
            let (a, b) = eval_pair(args, record)?;
            Ok(Value::Bool(a.ge(&b)))
        }
        "+" | "-" | "*" | "/" => eval_arithmetic(op, args, record),
        "and" => {
            for item in args_list(args) {
                if !evaluate(&item, record)?.is_truthy() {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        "or" => {
            for item in args_list(args) {
                if evaluate(&item, record)?.is_truthy() {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        "!" => {
            let inner = args_list(args);
            let v = inner
                .first()
                .map(|item| evaluate(item, record))
                .transpose()?
                .unwrap_or(Value::Null);
            Ok(Value::Bool(!v.is_truthy()))
        }
        "in" => eval_in(args, record),
        "if" => eval_if(args, record),
        "count" => eval_count(args, record),
        "count_exact" => eval_count_exact(args, record),
        other => Err(SystemError::RuleFailure {
            field: String::new(),
            rule: "logic".to_string(),
            reason: format!("unknown operator `{other}`"),
        }),
    }
}

fn eval_var(args: &serde_json::Value, record: &Record) -> Result<Value, SystemError> {
    let items = args_list(args);
    let name = items
        .first()
        .and_then(|v| v.as_str())
        .ok_or_else(|| SystemError::RuleFailure {
            field: String::new(),
            rule: "logic".to_string(),
            reason: "`var` requires a field name".to_string(),
        })?;
    let default = items.get(1).map(|d| Value::from(d.clone()));
    let value = record.get(name);
    if value.is_null() {
        Ok(default.unwrap_or(Value::Null))
    } else {
        Ok(value)
    }
}

fn eval_pair(args: &serde_json::Value, record: &Record) -> Result<(Value, Value), SystemError> {
    let items = args_list(args);
    if items.len() != 2 {
        return Err(SystemError::RuleFailure {
            field: String::new(),
            rule: "logic".to_string(),
            reason: "comparison operator requires exactly two arguments".to_string(),
        });
    }
    let a = evaluate(&items[0], record)?;
    let b = evaluate(&items[1], record)?;
    Ok((a, b))
}

fn eval_arithmetic(op: &str, args: &serde_json::Value, record: &Record) -> Result<Value, SystemError> {
    let items = args_list(args);
    let mut values = Vec::with_capacity(items.len());
    for item in &items {
        let v = evaluate(item, record)?;
        let n = v.as_f64().ok_or_else(|| SystemError::RuleFailure {
            field: String::new(),
            rule: "logic".to_string(),
            reason: format!("`{op}` requires numeric operands"),
        })?;
        values.push(n);
    }
    if values.is_empty() {
        return Ok(Value::Float(0.0));
    }
    let result = match op {
        "+" => values.iter().sum::<f64>(),
        "*" => values.iter().product::<f64>(),
        "-" => {
            let mut it = values.iter();
            let first = *it.next().unwrap();
            it.fold(first, |acc, v| acc - v)
        }
        "/" => {
            let mut it = values.iter();
            let first = *it.next().unwrap();
            let mut acc = first;
            for v in it {
                if *v == 0.0 {
                    return Err(SystemError::RuleFailure {
                        field: String::new(),
                        rule: "logic".to_string(),
                        reason: "division by zero".to_string(),
                    });
                }
                acc /= v;
            }
            acc
        }
        _ => unreachable!(),
    };
    Ok(Value::Float(result))
}

fn eval_in(args: &serde_json::Value, record: &Record) -> Result<Value, SystemError> {
    let items = args_list(args);
    if items.len() != 2 {
        return Err(SystemError::RuleFailure {
            field: String::new(),
            rule: "logic".to_string(),
            reason: "`in` requires [needle, haystack]".to_string(),
        });
    }
    let needle = evaluate(&items[0], record)?;
    let haystack = evaluate(&items[1], record);
    let haystack_list = match &items[1] {
        serde_json::Value::Array(list) => list.iter().map(|v| Value::from(v.clone())).collect(),
        _ => match haystack? {
            Value::String(s) => s.chars().map(|c| Value::String(c.to_string())).collect(),
            Value::List(items) => items,
            other => vec![other],
        },
    };
    Ok(Value::Bool(
        haystack_list.iter().any(|v| v.soft_eq(&needle)),
    ))
}

fn eval_if(args: &serde_json::Value, record: &Record) -> Result<Value, SystemError> {
    let items = args_list(args);
    if items.is_empty() {
        return Ok(Value::Null);
    }
    let mut idx = 0;
    while idx + 1 < items.len() {
        let cond = evaluate(&items[idx], record)?;
        if cond.is_truthy() {
            return evaluate(&items[idx + 1], record);
        }
        idx += 2;
    }
    if idx < items.len() {
        evaluate(&items[idx], record)
    } else {
        Ok(Value::Null)
    }
}

fn eval_count(args: &serde_json::Value, record: &Record) -> Result<Value, SystemError> {
    let mut n = 0i64;
    for item in args_list(args) {
        let v = evaluate(&item, record)?;
        if !v.is_null() && v.is_truthy() {
            n += 1;
        }
    }
    Ok(Value::Int(n))
}

fn eval_count_exact(args: &serde_json::Value, record: &Record) -> Result<Value, SystemError> {
    let items = args_list(args);
    let (base, rest) = items.split_first().ok_or_else(|| SystemError::RuleFailure {
        field: String::new(),
        rule: "logic".to_string(),
        reason: "`count_exact` requires a base value".to_string(),
    })?;
    let base = evaluate(base, record)?;
    let mut n = 0i64;
    for item in rest {
        let v = evaluate(item, record)?;
        if v.soft_eq(&base) {
            n += 1;
        }
    }
    Ok(Value::Int(n))
}

/// Resolves the clock-derived literals used by `min`/`max`/`compare_with` (§4.2.1/§4.2/§9).
pub fn clock_literal(name: &str) -> Option<Value> {
    let today = Local::now().date_naive();
    match name {
        "current_date" => Some(Value::Date(today)),
        "current_year" => Some(Value::Int(today.year() as i64)),
        "current_month" => Some(Value::Int(today.month() as i64)),
        "current_day" => Some(Value::Int(today.day() as i64)),
        _ => None,
    }
}
