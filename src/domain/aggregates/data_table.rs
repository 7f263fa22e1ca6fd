//! Data table schema
//!
//! A data table is a per-shop list of typed fields. Rows are free-form JSON
//! objects checked loosely against that list: required fields must be present,
//! known fields must hold a value compatible with their type, and unknown keys
//! pass through untouched.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

use crate::domain::value_objects::FieldType;

pub type JsonMap = Map<String, Value>;

pub const MAX_FIELD_NAME_LEN: usize = 100;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldConfig {
    pub fn new(name: impl Into<String>, field_type: FieldType, required: bool) -> Self {
        Self { name: name.into(), field_type, required, description: None }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("at least one field is required")]
    NoFields,
    #[error("field #{0} has an empty name")]
    EmptyFieldName(usize),
    #[error("field name {0:?} is longer than 100 characters")]
    FieldNameTooLong(String),
    #[error("duplicate field name {0:?}")]
    DuplicateField(String),
}

/// Checks a field list before it is stored on a data table.
pub fn validate_fields(fields: &[FieldConfig]) -> Result<(), SchemaError> {
    if fields.is_empty() { return Err(SchemaError::NoFields); }
    let mut seen = HashSet::new();
    for (index, field) in fields.iter().enumerate() {
        let name = field.name.trim();
        if name.is_empty() { return Err(SchemaError::EmptyFieldName(index + 1)); }
        if name.chars().count() > MAX_FIELD_NAME_LEN { return Err(SchemaError::FieldNameTooLong(name.to_string())); }
        if !seen.insert(name) { return Err(SchemaError::DuplicateField(name.to_string())); }
    }
    Ok(())
}

/// Trims field names in place. Stored schemas never carry surrounding whitespace.
pub fn normalize_fields(fields: &mut [FieldConfig]) {
    for field in fields.iter_mut() {
        let trimmed = field.name.trim();
        if trimmed.len() != field.name.len() { field.name = trimmed.to_string(); }
    }
}

pub fn find_field<'a>(fields: &'a [FieldConfig], name: &str) -> Option<&'a FieldConfig> {
    fields.iter().find(|f| f.name == name)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation { pub field: String, pub message: String }

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}: {}", self.field, self.message) }
}

/// Validates a row against the schema, collecting every violation.
pub fn validate_row(fields: &[FieldConfig], data: &JsonMap) -> Result<(), Vec<FieldViolation>> {
    let mut violations = Vec::new();
    for field in fields {
        match data.get(&field.name) {
            None | Some(Value::Null) => {
                if field.required { violations.push(FieldViolation::new(&field.name, "required field is missing")); }
            }
            Some(Value::String(s)) if s.trim().is_empty() => {
                if field.required { violations.push(FieldViolation::new(&field.name, "required field is empty")); }
            }
            Some(value) => {
                if !value_matches(field.field_type, value) {
                    violations.push(FieldViolation::new(&field.name, format!("expected a {} value, got {}", field.field_type, value)));
                }
            }
        }
    }
    for (key, value) in data {
        if key.contains('\0') || contains_nul(value) {
            violations.push(FieldViolation::new(key, "contains a NUL character"));
        }
    }
    if violations.is_empty() { Ok(()) } else { Err(violations) }
}

/// JSONB cannot store `\u0000`.
fn contains_nul(value: &Value) -> bool {
    match value {
        Value::String(s) => s.contains('\0'),
        Value::Array(items) => items.iter().any(contains_nul),
        Value::Object(map) => map.iter().any(|(k, v)| k.contains('\0') || contains_nul(v)),
        _ => false,
    }
}

/// Rewrites numeric strings in number fields as JSON numbers so stored rows
/// compare numerically. Run after `validate_row`.
pub fn normalize_row(fields: &[FieldConfig], data: &mut JsonMap) {
    for field in fields.iter().filter(|f| f.field_type == FieldType::Number) {
        let parsed = match data.get(&field.name) {
            Some(Value::String(s)) => parse_number(s),
            _ => None,
        };
        if let Some(n) = parsed {
            data.insert(field.name.clone(), Value::Number(n));
        }
    }
}

/// Loose type compatibility used at write time.
pub fn value_matches(field_type: FieldType, value: &Value) -> bool {
    match (field_type, value) {
        (_, Value::Null) => true,
        (FieldType::Text, v) => !v.is_array() && !v.is_object(),
        (FieldType::Number, Value::Number(_)) => true,
        (FieldType::Number, Value::String(s)) => parse_number(s).is_some(),
        (FieldType::Boolean, Value::Bool(_)) => true,
        (FieldType::Boolean, Value::Number(n)) => matches!(n.as_f64(), Some(x) if x == 0.0 || x == 1.0),
        (FieldType::Boolean, Value::String(s)) => parse_bool(s).is_some(),
        (FieldType::Date, Value::String(s)) => parse_date(s).is_some(),
        _ => false,
    }
}

/// Parses a numeric string, accepting surrounding whitespace and `,` thousands separators.
pub fn parse_number(s: &str) -> Option<Number> {
    let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() { return None; }
    if let Ok(i) = cleaned.parse::<i64>() { return Some(Number::from(i)); }
    cleaned.parse::<f64>().ok().filter(|f| f.is_finite()).and_then(Number::from_f64)
}

pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "yes" | "y" | "1" | "是" => Some(true),
        "false" | "no" | "n" | "0" | "否" => Some(false),
        _ => None,
    }
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%Y%m%d"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y/%m/%d %H:%M"];

/// Parses the date spellings spreadsheets and clients commonly produce.
pub fn parse_date(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() { return None; }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) { return Some(dt.naive_utc()); }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) { return Some(dt); }
    }
    DATE_FORMATS.iter().find_map(|format| NaiveDate::parse_from_str(s, format).ok()).and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Canonical storage form: `YYYY-MM-DD`, or `YYYY-MM-DDTHH:MM:SS` when a time is present.
pub fn format_date(dt: NaiveDateTime) -> String {
    if dt.time() == chrono::NaiveTime::MIN { dt.format("%Y-%m-%d").to_string() }
    else { dt.format("%Y-%m-%dT%H:%M:%S").to_string() }
}
