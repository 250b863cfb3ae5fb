//! Typed spreadsheet cells and rows
//!
//! The dynamic calamine cell values are converted into [`Cell`] and
//! [`Row`] immediately at the parse boundary; all downstream logic
//! operates on typed data only.

use calamine::Data;
use chrono::NaiveDate;

/// A single typed spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Bool(bool),
}

impl Cell {
    pub fn from_data(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            Data::Float(f) => Cell::Number(*f),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Bool(b) => Cell::Bool(*b),
            Data::DateTime(dt) => match excel_serial_to_date(dt.as_f64()) {
                Some(date) => Cell::Date(date),
                None => Cell::Number(dt.as_f64()),
            },
            Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
            Data::Error(e) => Cell::Text(format!("{e:?}")),
        }
    }

    /// Display form used in the error report. Whole floats render as
    /// integers, matching how operators see them in the sheet.
    pub fn display(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(f) => {
                if f.fract() == 0.0 {
                    (*f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
            Cell::Date(d) => d.format("%Y-%m-%d").to_string(),
            Cell::Bool(b) => b.to_string(),
        }
    }
}

/// One parsed spreadsheet line. Immutable once parsed.
#[derive(Debug, Clone)]
pub struct Row {
    pub document_no: String,
    pub document_date: NaiveDate,
    pub customer_code: String,
    pub product_code: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub discount: f64,
    pub salesperson_code: Option<String>,
    /// 1-based row number in the source sheet, for error attribution.
    pub source_row: usize,
    /// The full original cell vector, used for hashing and reporting.
    pub cells: Vec<Cell>,
}

/// Convert an Excel serial day number to a date. Serial 1 is
/// 1899-12-31 in the 1900 date system (epoch 1899-12-30).
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    let days = serial.trunc() as i64;
    if days <= 0 || days > 2_958_465 {
        // 2958465 is 9999-12-31
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(chrono::Duration::days(days))
}

/// Normalize a raw date cell to a canonical date. Supports the
/// spreadsheet-serial numeric encoding and a set of free-text formats.
/// Returns None when the cell cannot be read as a date.
pub fn normalize_date(data: &Data) -> Option<NaiveDate> {
    match data {
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64()),
        Data::Float(f) => excel_serial_to_date(*f),
        Data::Int(i) => excel_serial_to_date(*i as f64),
        Data::String(s) | Data::DateTimeIso(s) => parse_date_text(s),
        _ => None,
    }
}

pub(crate) fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    const FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y", "%Y/%m/%d"];
    for format in FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }
    // ISO timestamps from re-exported sheets
    if let Some((date_part, _)) = text.split_once('T') {
        return NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok();
    }
    None
}

/// Read a cell as a number, accepting numeric text.
pub fn cell_number(data: &Data) -> Option<f64> {
    match data {
        Data::Float(f) => Some(*f),
        Data::Int(i) => Some(*i as f64),
        Data::String(s) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}

/// Read a cell as a trimmed string. Whole floats render as integers so
/// numeric document identifiers keep their spreadsheet form.
pub fn cell_string(data: &Data) -> String {
    match data {
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 {
                (*f as i64).to_string()
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}
