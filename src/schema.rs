//! Schema model and compilation (§3 "Schema", §9 "Dynamic schema dispatch").
//!
//! A schema is parsed once, at construction, into a closed, ordered list of compiled
//! rule objects per field — never re-interpreted per record. This mirrors the teacher's
//! `compile_validators`, which likewise walks a raw JSON document exactly once and
//! produces a tree of boxed [`crate::rules::Rule`] objects.

use indexmap::IndexMap;

use crate::error::SchemaError;
use crate::rules::{
    AllowedForbidden, AnyOf, Compatibility, CompareAge, CompareWith, ComputeGds, Filled,
    FunctionRule, LogicRule, MinMax, RegexRule, Rule, Rxnorm, ScoreVariables, TemporalRules,
    TypeRule,
};

/// Recognized top-level keys in a field-schema. Anything else is a schema-load error
/// (§6 "Schema format": "Unknown top-level keys ... cause schema-load to fail").
const KNOWN_KEYS: &[&str] = &[
    "type",
    "required",
    "nullable",
    "allowed",
    "forbidden",
    "min",
    "max",
    "regex",
    "anyof",
    "filled",
    "compare_with",
    "compare_age",
    "compatibility",
    "logic",
    "temporalrules",
    "compute_gds",
    "rxnorm",
    "function",
    "score_variables",
];

/// One field's compiled rule set.
pub struct FieldSchema {
    pub required: bool,
    pub nullable: bool,
    pub rules: Vec<Box<dyn Rule>>,
}

/// The full, immutable, compiled schema for a validator lifetime.
pub struct Schema {
    fields: IndexMap<String, FieldSchema>,
}

impl Schema {
    pub fn from_json_str(text: &str) -> Result<Self, SchemaError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        Self::compile_json(value)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, SchemaError> {
        let value: serde_yaml::Value = serde_yaml::from_str(text)?;
        let json = serde_json::to_value(value).map_err(SchemaError::from)?;
        Self::compile_json(json)
    }

    /// Compiles a raw schema document (already parsed from either JSON or YAML) into a
    /// [`Schema`].
    pub fn compile_json(doc: serde_json::Value) -> Result<Self, SchemaError> {
        let top = doc.as_object().ok_or_else(|| SchemaError::InvalidField {
            field: String::new(),
            reason: "schema document must be an object".to_string(),
        })?;
        let mut fields = IndexMap::new();
        for (name, raw) in top {
            let field_schema = compile_field_schema(name, raw)?;
            fields.insert(name.clone(), field_schema);
        }
        Ok(Schema { fields })
    }

    pub fn field_names(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn get(&self, field: &str) -> Option<&FieldSchema> {
        self.fields.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldSchema)> {
        self.fields.iter()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn validate_has_primary_key(&self, primary_key_field: &str) -> Result<(), SchemaError> {
        match self.fields.get(primary_key_field) {
            Some(field) if field.required => Ok(()),
            Some(_) => Err(SchemaError::InvalidField {
                field: primary_key_field.to_string(),
                reason: "primary key field must be declared `required: true`".to_string(),
            }),
            None => Err(SchemaError::MissingPrimaryKey),
        }
    }
}

pub(crate) fn compile_field_schema(name: &str, raw: &serde_json::Value) -> Result<FieldSchema, SchemaError> {
    let obj = raw.as_object().ok_or_else(|| SchemaError::InvalidField {
        field: name.to_string(),
        reason: "field schema must be an object".to_string(),
    })?;
    for key in obj.keys() {
        if !KNOWN_KEYS.contains(&key.as_str()) {
            return Err(SchemaError::InvalidField {
                field: name.to_string(),
                reason: format!("unknown rule key `{key}`"),
            });
        }
    }
    let required = obj.get("required").and_then(|v| v.as_bool()).unwrap_or(false);
    let nullable = obj.get("nullable").and_then(|v| v.as_bool()).unwrap_or(false);
    let rules = compile_rules(name, obj)?;
    Ok(FieldSchema {
        required,
        nullable,
        rules,
    })
}

/// Compiles the rule-bearing keys of a field-schema object into an ordered rule list:
/// standard rules first, then custom rules, in the order fixed by §4.2. Shared by
/// top-level field compilation and by `anyof`/`compatibility`/`temporalrules`
/// sub-schema compilation.
pub(crate) fn compile_rules(
    name: &str,
    obj: &serde_json::Map<String, serde_json::Value>,
) -> Result<Vec<Box<dyn Rule>>, SchemaError> {
    let mut rules: Vec<Box<dyn Rule>> = Vec::new();
    let ctx_field = |e: SchemaError| with_field(e, name);

    if let Some(raw) = obj.get("type") {
        rules.push(Box::new(TypeRule::compile(raw).map_err(ctx_field)?));
    }
    if let Some(raw) = obj.get("allowed") {
        rules.push(Box::new(
            AllowedForbidden::compile(raw, false).map_err(ctx_field)?,
        ));
    }
    if let Some(raw) = obj.get("forbidden") {
        rules.push(Box::new(
            AllowedForbidden::compile(raw, true).map_err(ctx_field)?,
        ));
    }
    if obj.contains_key("min") || obj.contains_key("max") {
        rules.push(Box::new(MinMax::compile(obj.get("min"), obj.get("max"))));
    }
    if let Some(raw) = obj.get("regex") {
        rules.push(Box::new(RegexRule::compile(raw).map_err(ctx_field)?));
    }
    if let Some(raw) = obj.get("anyof") {
        rules.push(Box::new(compile_anyof(name, raw)?));
    }
    if let Some(raw) = obj.get("filled") {
        rules.push(Box::new(Filled::compile(raw).map_err(ctx_field)?));
    }
    if let Some(raw) = obj.get("compare_with") {
        rules.push(Box::new(CompareWith::compile(raw).map_err(ctx_field)?));
    }
    if let Some(raw) = obj.get("compare_age") {
        rules.push(Box::new(CompareAge::compile(raw).map_err(ctx_field)?));
    }
    if let Some(raw) = obj.get("compatibility") {
        rules.push(Box::new(Compatibility::compile(name, raw)?));
    }
    if let Some(raw) = obj.get("logic") {
        rules.push(Box::new(LogicRule::compile(raw).map_err(ctx_field)?));
    }
    if let Some(raw) = obj.get("temporalrules") {
        rules.push(Box::new(TemporalRules::compile(name, raw)?));
    }
    if let Some(raw) = obj.get("compute_gds") {
        rules.push(Box::new(ComputeGds::compile(raw).map_err(ctx_field)?));
    }
    if let Some(raw) = obj.get("rxnorm") {
        rules.push(Box::new(Rxnorm::compile(raw).map_err(ctx_field)?));
    }
    if let Some(raw) = obj.get("function") {
        rules.push(Box::new(FunctionRule::compile(raw).map_err(ctx_field)?));
    }
    if let Some(raw) = obj.get("score_variables") {
        rules.push(Box::new(ScoreVariables::compile(raw).map_err(ctx_field)?));
    }
    Ok(rules)
}

fn with_field(err: SchemaError, field: &str) -> SchemaError {
    match err {
        SchemaError::InvalidRule { rule, reason, .. } => SchemaError::InvalidRule {
            field: field.to_string(),
            rule,
            reason,
        },
        SchemaError::InvalidField { reason, .. } => SchemaError::InvalidField {
            field: field.to_string(),
            reason,
        },
        other => other,
    }
}

fn compile_anyof(name: &str, raw: &serde_json::Value) -> Result<AnyOf, SchemaError> {
    let items = raw.as_array().ok_or_else(|| SchemaError::InvalidRule {
        field: name.to_string(),
        rule: "anyof".to_string(),
        reason: "expected a list of sub-schemas".to_string(),
    })?;
    let mut alternatives = Vec::with_capacity(items.len());
    for item in items {
        let obj = item.as_object().ok_or_else(|| SchemaError::InvalidRule {
            field: name.to_string(),
            rule: "anyof".to_string(),
            reason: "each alternative must be an object".to_string(),
        })?;
        alternatives.push(compile_rules(name, obj)?);
    }
    Ok(AnyOf::new(alternatives))
}

/// Compiles a sub-schema mapping (field name → field-schema) used by `compatibility` and
/// `temporalrules` clauses, in document order. Reuses [`compile_field_schema`] so a nested
/// clause like `{"nullable": false}` enforces non-null the same way a top-level field does,
/// rather than being silently ignored as an unrecognized rule key.
pub(crate) fn compile_subschema(
    raw: &serde_json::Value,
) -> Result<IndexMap<String, FieldSchema>, SchemaError> {
    let obj = raw.as_object().ok_or_else(|| SchemaError::InvalidField {
        field: String::new(),
        reason: "sub-schema must be an object".to_string(),
    })?;
    let mut out = IndexMap::new();
    for (field, field_raw) in obj {
        out.insert(field.clone(), compile_field_schema(field, field_raw)?);
    }
    Ok(out)
}
