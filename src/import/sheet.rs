//! Spreadsheet decoding into a header row plus typed cells.

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::io::Cursor;

use super::ImportError;
use crate::domain::aggregates::data_table::format_date;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Display form, with integral floats printed without a fraction.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
            Cell::Int(i) => Some(i.to_string()),
            Cell::Float(f) => Some(float_text(*f)),
            Cell::Bool(b) => Some(b.to_string()),
            Cell::DateTime(dt) => Some(format_date(*dt)),
        }
    }

    /// JSON form used in previews.
    pub fn to_json(&self) -> Value {
        match self {
            Cell::Empty => Value::Null,
            Cell::Int(i) => Value::from(*i),
            Cell::Float(f) => float_json(*f),
            Cell::Bool(b) => Value::Bool(*b),
            other => other.to_text().map(Value::String).unwrap_or(Value::Null),
        }
    }
}

pub(crate) fn float_text(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 { format!("{}", f as i64) } else { f.to_string() }
}

pub(crate) fn float_json(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        Value::from(f as i64)
    } else {
        serde_json::Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
    }
}

/// Converts an Excel serial day number (1900 date system) to a timestamp.
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 || serial > 2_958_465.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let seconds = (serial * 86_400.0).round() as i64;
    epoch.checked_add_signed(Duration::seconds(seconds))
}

#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    /// 1-based spreadsheet row number; the header is row 1.
    pub number: usize,
    pub cells: Vec<Cell>,
}

impl SheetRow {
    pub fn cell(&self, index: usize) -> &Cell {
        self.cells.get(index).unwrap_or(&Cell::Empty)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    pub headers: Vec<String>,
    /// Data rows with at least one non-empty cell.
    pub rows: Vec<SheetRow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat { Csv, Workbook }

impl SheetFormat {
    pub fn from_file_name(name: &str) -> Option<Self> {
        let lower = name.trim().to_ascii_lowercase();
        let ext = lower.rsplit_once('.').map(|(_, ext)| ext)?;
        match ext {
            "csv" => Some(Self::Csv),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Some(Self::Workbook),
            _ => None,
        }
    }
}

impl Sheet {
    /// Decodes `bytes` according to the extension of `file_name`.
    pub fn parse(file_name: &str, bytes: Vec<u8>) -> Result<Self, ImportError> {
        let format = SheetFormat::from_file_name(file_name).ok_or_else(|| ImportError::UnsupportedFormat(file_name.to_string()))?;
        let grid = match format {
            SheetFormat::Csv => read_csv(&bytes)?,
            SheetFormat::Workbook => read_workbook(bytes)?,
        };
        Self::from_grid(grid)
    }

    pub fn from_grid(grid: Vec<Vec<Cell>>) -> Result<Self, ImportError> {
        let mut rows = grid.into_iter();
        let header_row = rows.next().ok_or(ImportError::Empty)?;
        let headers: Vec<String> = header_row.iter().map(|c| c.to_text().unwrap_or_default()).collect();
        if headers.iter().all(String::is_empty) {
            return Err(ImportError::Empty);
        }
        let rows = rows
            .enumerate()
            .map(|(i, cells)| SheetRow { number: i + 2, cells })
            .filter(|row| row.cells.iter().any(|c| !c.is_empty()))
            .collect();
        Ok(Self { headers, rows })
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

fn read_csv(bytes: &[u8]) -> Result<Vec<Vec<Cell>>, ImportError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new().has_headers(false).flexible(true).from_reader(bytes);
    let mut grid = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ImportError::Parse(e.to_string()))?;
        grid.push(record.iter().map(|field| if field.trim().is_empty() { Cell::Empty } else { Cell::Text(field.to_string()) }).collect());
    }
    Ok(grid)
}

fn read_workbook(bytes: Vec<u8>) -> Result<Vec<Vec<Cell>>, ImportError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(|e| ImportError::Parse(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(ImportError::Empty)?
        .map_err(|e| ImportError::Parse(e.to_string()))?;
    Ok(range.rows().map(|row| row.iter().map(cell_from_data).collect()).collect())
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::String(s) => if s.trim().is_empty() { Cell::Empty } else { Cell::Text(s.clone()) },
        Data::Int(i) => Cell::Int(*i),
        Data::Float(f) => Cell::Float(*f),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => excel_serial_to_datetime(dt.as_f64()).map(Cell::DateTime).unwrap_or(Cell::Float(dt.as_f64())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
    }
}
