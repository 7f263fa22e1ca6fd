//! Cell → JSON value conversion per field type.

use serde_json::{Number, Value};

use super::sheet::{excel_serial_to_datetime, float_json, Cell};
use crate::domain::aggregates::data_table::{format_date, parse_bool, parse_date, parse_number};
use crate::domain::value_objects::FieldType;

/// Converts a cell to the JSON stored for `field_type`. Empty cells become `null`.
pub fn coerce(cell: &Cell, field_type: FieldType) -> Result<Value, String> {
    if cell.is_empty() {
        return Ok(Value::Null);
    }
    match field_type {
        FieldType::Text => Ok(cell.to_text().map(Value::String).unwrap_or(Value::Null)),
        FieldType::Number => to_number(cell).map(Value::Number).ok_or_else(|| mismatch(cell, field_type)),
        FieldType::Boolean => to_bool(cell).map(Value::Bool).ok_or_else(|| mismatch(cell, field_type)),
        FieldType::Date => to_date(cell).map(Value::String).ok_or_else(|| mismatch(cell, field_type)),
    }
}

fn mismatch(cell: &Cell, field_type: FieldType) -> String {
    format!("cannot read {:?} as {}", cell.to_text().unwrap_or_default(), field_type)
}

fn to_number(cell: &Cell) -> Option<Number> {
    match cell {
        Cell::Int(i) => Some(Number::from(*i)),
        Cell::Float(f) => match float_json(*f) { Value::Number(n) => Some(n), _ => None },
        Cell::Text(s) => parse_number(s),
        _ => None,
    }
}

fn to_bool(cell: &Cell) -> Option<bool> {
    match cell {
        Cell::Bool(b) => Some(*b),
        Cell::Int(0) => Some(false),
        Cell::Int(1) => Some(true),
        Cell::Float(f) if *f == 0.0 => Some(false),
        Cell::Float(f) if *f == 1.0 => Some(true),
        Cell::Text(s) => parse_bool(s),
        _ => None,
    }
}

fn to_date(cell: &Cell) -> Option<String> {
    let dt = match cell {
        Cell::DateTime(dt) => Some(*dt),
        Cell::Int(i) => excel_serial_to_datetime(*i as f64),
        Cell::Float(f) => excel_serial_to_datetime(*f),
        Cell::Text(s) => parse_date(s),
        _ => None,
    }?;
    Some(format_date(dt))
}
