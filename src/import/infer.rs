//! Field inference for uploaded spreadsheets

use serde::Serialize;

use super::sheet::{Cell, Sheet};
use crate::domain::aggregates::data_table::{parse_bool, parse_date, parse_number};
use crate::domain::aggregates::{FieldConfig, JsonMap};
use crate::domain::value_objects::FieldType;

pub const SAMPLE_ROWS: usize = 100;
pub const PREVIEW_ROWS: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct ParsedSheet {
    pub fields: Vec<FieldConfig>,
    pub total_rows: usize,
    pub preview_rows: Vec<JsonMap>,
}

pub fn describe(sheet: &Sheet) -> ParsedSheet {
    let sample = &sheet.rows[..sheet.rows.len().min(SAMPLE_ROWS)];
    let fields = sheet
        .headers
        .iter()
        .enumerate()
        .filter(|(_, name)| !name.is_empty())
        .map(|(index, name)| {
            let cells: Vec<&Cell> = sample.iter().map(|row| row.cell(index)).filter(|c| !c.is_empty()).collect();
            let mut field = FieldConfig::new(name.clone(), infer_type(&cells), false);
            field.description = Some(name.clone());
            field
        })
        .collect();

    let preview_rows = sheet
        .rows
        .iter()
        .take(PREVIEW_ROWS)
        .map(|row| {
            sheet
                .headers
                .iter()
                .enumerate()
                .filter(|(_, name)| !name.is_empty())
                .map(|(index, name)| (name.clone(), row.cell(index).to_json()))
                .collect()
        })
        .collect();

    ParsedSheet { fields, total_rows: sheet.rows.len(), preview_rows }
}

/// Number, then boolean, then date, when every non-empty cell qualifies. Otherwise text.
pub fn infer_type(cells: &[&Cell]) -> FieldType {
    if cells.is_empty() {
        return FieldType::Text;
    }
    if cells.iter().all(|c| is_number(c)) {
        FieldType::Number
    } else if cells.iter().all(|c| is_bool(c)) {
        FieldType::Boolean
    } else if cells.iter().all(|c| is_date(c)) {
        FieldType::Date
    } else {
        FieldType::Text
    }
}

fn is_number(cell: &Cell) -> bool {
    match cell {
        Cell::Int(_) | Cell::Float(_) => true,
        Cell::Text(s) => parse_number(s).is_some(),
        _ => false,
    }
}

fn is_bool(cell: &Cell) -> bool {
    match cell {
        Cell::Bool(_) => true,
        Cell::Text(s) => parse_bool(s).is_some(),
        _ => false,
    }
}

fn is_date(cell: &Cell) -> bool {
    match cell {
        Cell::DateTime(_) => true,
        Cell::Text(s) => parse_date(s).is_some(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_csv() {
        let csv = "sku,price,listed,active,notes,blank\nA-1,9.90,2024-01-02,yes,first,\nA-2,12,2024-01-03,no,,\n";
        let sheet = Sheet::parse("items.csv", csv.as_bytes().to_vec()).unwrap();
        let parsed = describe(&sheet);
        let types: Vec<_> = parsed.fields.iter().map(|f| (f.name.as_str(), f.field_type)).collect();
        assert_eq!(types, vec![
            ("sku", FieldType::Text),
            ("price", FieldType::Number),
            ("listed", FieldType::Date),
            ("active", FieldType::Boolean),
            ("notes", FieldType::Text),
            ("blank", FieldType::Text),
        ]);
        assert_eq!(parsed.total_rows, 2);
        assert_eq!(parsed.preview_rows[0]["price"], "9.90");
        assert!(parsed.preview_rows[1]["notes"].is_null());
        assert_eq!(parsed.fields[0].description.as_deref(), Some("sku"));
    }

    #[test]
    fn test_numbers_win_over_booleans() {
        let cells = [Cell::Text("1".into()), Cell::Text("0".into())];
        let refs: Vec<&Cell> = cells.iter().collect();
        assert_eq!(infer_type(&refs), FieldType::Number);
    }

    #[test]
    fn test_one_stray_cell_makes_a_column_text() {
        let cells = [Cell::Int(1), Cell::Float(2.5), Cell::Text("3".into()), Cell::Text("n/a".into())];
        let refs: Vec<&Cell> = cells.iter().collect();
        assert_eq!(infer_type(&refs), FieldType::Text);
        assert_eq!(infer_type(&refs[..3]), FieldType::Number);
    }
}
