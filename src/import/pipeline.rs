//! Row preparation: header mapping, coercion and validation.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::str::FromStr;

use super::coerce::coerce;
use super::sheet::{Sheet, SheetRow};
use super::ImportError;
use crate::db::sales::NewSale;
use crate::domain::aggregates::data_table::validate_row;
use crate::domain::aggregates::{FieldConfig, JsonMap};
use crate::domain::value_objects::FieldType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    pub row: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl RowError {
    pub fn new(row: usize, field: Option<&str>, message: impl Into<String>) -> Self {
        Self { row, field: field.map(String::from), message: message.into() }
    }
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.field {
            Some(field) => write!(f, "row {} {}: {}", self.row, field, self.message),
            None => write!(f, "row {}: {}", self.row, self.message),
        }
    }
}

/// Column index of each field. Required fields absent from the header fail the whole import.
pub fn map_columns(sheet: &Sheet, fields: &[FieldConfig]) -> Result<Vec<Option<usize>>, ImportError> {
    let columns: Vec<Option<usize>> = fields.iter().map(|f| sheet.column(&f.name)).collect();
    let missing: Vec<String> = fields
        .iter()
        .zip(&columns)
        .filter(|(field, column)| field.required && column.is_none())
        .map(|(field, _)| field.name.clone())
        .collect();
    if missing.is_empty() { Ok(columns) } else { Err(ImportError::MissingColumns(missing)) }
}

/// Builds the JSON object for one row, or every problem found in it.
pub fn prepare_row(row: &SheetRow, fields: &[FieldConfig], columns: &[Option<usize>]) -> Result<JsonMap, Vec<RowError>> {
    let mut data = JsonMap::new();
    let mut errors = Vec::new();
    for (field, column) in fields.iter().zip(columns) {
        let value = match column {
            Some(index) => match coerce(row.cell(*index), field.field_type) {
                Ok(value) => value,
                Err(message) => {
                    errors.push(RowError::new(row.number, Some(&field.name), message));
                    continue;
                }
            },
            None => Value::Null,
        };
        data.insert(field.name.clone(), value);
    }
    if !errors.is_empty() {
        return Err(errors);
    }
    validate_row(fields, &data).map_err(|violations| {
        violations.into_iter().map(|v| RowError::new(row.number, Some(&v.field), v.message)).collect::<Vec<_>>()
    })?;
    Ok(data)
}

/// Column layout of the built-in sales target.
pub fn sales_fields() -> Vec<FieldConfig> {
    vec![
        FieldConfig::new("sku", FieldType::Text, false),
        FieldConfig::new("product_title", FieldType::Text, true),
        FieldConfig::new("order_id", FieldType::Text, false),
        FieldConfig::new("quantity", FieldType::Number, true),
        FieldConfig::new("amount", FieldType::Number, true),
        FieldConfig::new("profit", FieldType::Number, false),
        FieldConfig::new("sale_date", FieldType::Date, true),
    ]
}

const MAX_MONEY: i64 = 10_000_000_000;

/// Column widths of the `sales` table, in characters.
const MAX_TITLE_LEN: usize = 255;
const MAX_CODE_LEN: usize = 100;

fn text(data: &JsonMap, key: &str) -> Option<String> {
    data.get(key).and_then(Value::as_str).map(str::to_string)
}

fn bounded_text(data: &JsonMap, key: &str, max: usize) -> Result<Option<String>, String> {
    match text(data, key) {
        Some(s) if s.chars().count() > max => Err(format!("longer than {max} characters")),
        other => Ok(other),
    }
}

fn money(data: &JsonMap, key: &str) -> Result<Option<Decimal>, String> {
    let Some(Value::Number(n)) = data.get(key) else { return Ok(None) };
    let value = Decimal::from_str(&n.to_string())
        .or_else(|_| Decimal::from_scientific(&n.to_string()))
        .map_err(|_| format!("{n} is not a valid amount"))?
        .round_dp(2);
    if value.abs() >= Decimal::from(MAX_MONEY) {
        return Err(format!("{n} is out of range"));
    }
    Ok(Some(value))
}

/// Converts a prepared sales row into an insertable record.
pub fn to_new_sale(row: usize, data: &JsonMap) -> Result<NewSale, RowError> {
    let err = |field: &str, message: String| RowError::new(row, Some(field), message);

    let quantity = match data.get("quantity") {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .and_then(|q| i32::try_from(q).ok())
            .ok_or_else(|| err("quantity", format!("{n} is not a whole number")))?,
        _ => return Err(err("quantity", "required field is missing".into())),
    };
    let amount = money(data, "amount")
        .map_err(|m| err("amount", m))?
        .ok_or_else(|| err("amount", "required field is missing".into()))?;
    let profit = money(data, "profit").map_err(|m| err("profit", m))?;
    let sale_date = text(data, "sale_date")
        .and_then(|s| s.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()))
        .ok_or_else(|| err("sale_date", "required field is missing".into()))?;
    let product_title = bounded_text(data, "product_title", MAX_TITLE_LEN)
        .map_err(|m| err("product_title", m))?
        .ok_or_else(|| err("product_title", "required field is missing".into()))?;
    let sku = bounded_text(data, "sku", MAX_CODE_LEN).map_err(|m| err("sku", m))?;
    let order_id = bounded_text(data, "order_id", MAX_CODE_LEN).map_err(|m| err("order_id", m))?;

    Ok(NewSale { sku, product_title, order_id, quantity, amount, profit, sale_date })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::sheet::Cell;
    use serde_json::json;

    fn sheet(csv: &str) -> Sheet {
        Sheet::parse("upload.csv", csv.as_bytes().to_vec()).unwrap()
    }

    #[test]
    fn test_missing_required_column() {
        let sheet = sheet("product_title,quantity\nMug,2\n");
        let err = map_columns(&sheet, &sales_fields()).unwrap_err();
        assert!(matches!(err, ImportError::MissingColumns(ref cols) if cols == &vec!["amount".to_string(), "sale_date".to_string()]));
    }

    #[test]
    fn test_prepare_row_reports_row_numbers() {
        let sheet = sheet("product_title,quantity,amount,sale_date\nMug,2,19.90,2024-03-01\n,x,5,2024-03-02\n");
        let fields = sales_fields();
        let columns = map_columns(&sheet, &fields).unwrap();

        let good = prepare_row(&sheet.rows[0], &fields, &columns).unwrap();
        assert_eq!(good["quantity"], json!(2));
        assert!(good["sku"].is_null());

        let errors = prepare_row(&sheet.rows[1], &fields, &columns).unwrap_err();
        assert_eq!(errors, vec![RowError::new(3, Some("quantity"), "cannot read \"x\" as number")]);
    }

    #[test]
    fn test_validation_after_coercion() {
        let fields = sales_fields();
        let row = SheetRow { number: 5, cells: vec![Cell::Empty, Cell::Int(1), Cell::Float(2.5), Cell::Text("2024-01-01".into())] };
        let columns = vec![None, Some(0), None, Some(1), Some(2), None, Some(3)];
        let errors = prepare_row(&row, &fields, &columns).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field.as_deref(), Some("product_title"));
        assert_eq!(errors[0].to_string(), "row 5 product_title: required field is missing");
    }

    #[test]
    fn test_to_new_sale() {
        let data = json!({"product_title": "Mug", "quantity": 2, "amount": 19.9, "profit": null, "sale_date": "2024-03-01", "sku": null})
            .as_object().cloned().unwrap();
        let sale = to_new_sale(2, &data).unwrap();
        assert_eq!(sale.amount, Decimal::from_str("19.90").unwrap());
        assert_eq!(sale.quantity, 2);
        assert!(sale.profit.is_none());
        assert_eq!(sale.sale_date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());

        let data = json!({"product_title": "Mug", "quantity": 1.5, "amount": 1, "sale_date": "2024-03-01"}).as_object().cloned().unwrap();
        assert_eq!(to_new_sale(4, &data).unwrap_err().field.as_deref(), Some("quantity"));
    }

    #[test]
    fn test_sale_text_fits_columns() {
        let sale = |title: String, sku: String| {
            json!({"product_title": title, "sku": sku, "quantity": 1, "amount": 1, "sale_date": "2024-03-01"}).as_object().cloned().unwrap()
        };
        let err = to_new_sale(3, &sale("x".repeat(300), "A".into())).unwrap_err();
        assert_eq!(err.to_string(), "row 3 product_title: longer than 255 characters");
        assert_eq!(to_new_sale(3, &sale("x".repeat(101), "A".repeat(101))).unwrap_err().field.as_deref(), Some("sku"));
        assert!(to_new_sale(3, &sale("杯".repeat(255), "A".repeat(100))).is_ok());
    }

    #[test]
    fn test_nul_cell_is_a_row_error() {
        let fields = vec![FieldConfig::new("name", FieldType::Text, true)];
        let sheet = sheet("name\nA\nB\u{0000} 2\n");
        let columns = map_columns(&sheet, &fields).unwrap();
        assert!(prepare_row(&sheet.rows[0], &fields, &columns).is_ok());
        let errors = prepare_row(&sheet.rows[1], &fields, &columns).unwrap_err();
        assert_eq!(errors, vec![RowError::new(3, Some("name"), "contains a NUL character")]);
    }
}
