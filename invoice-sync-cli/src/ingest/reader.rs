//! Workbook reading and typed row extraction
//!
//! Locates the header row by the document-number label (falling back to
//! the first row), validates the required column set and converts data
//! rows into typed [`Row`]s. Rows whose date cell fails to normalize are
//! excluded and counted, not errored.

use std::path::Path;

use anyhow::{Context, Result};
use calamine::{Data, Range, Reader, Xlsx, open_workbook};
use log::warn;

use crate::error::SyncError;

use super::row::{self, Cell, Row};

/// Required column labels, matched case-insensitively against the
/// header row. Duplicate or reordered columns are tolerated; the first
/// occurrence of each label wins.
pub mod labels {
    pub const DOCUMENT_NO: &str = "Document No";
    pub const DOCUMENT_DATE: &str = "Document Date";
    pub const CUSTOMER: &str = "Customer";
    pub const PRODUCT: &str = "Product";
    pub const QUANTITY: &str = "Quantity";
    pub const UNIT_PRICE: &str = "Unit Price";
    pub const DISCOUNT: &str = "Discount";
    /// Optional assignee column.
    pub const SALESPERSON: &str = "Salesperson";
}

/// Resolved column positions within the header row.
#[derive(Debug, Clone)]
pub struct SheetColumns {
    pub document_no: usize,
    pub document_date: usize,
    pub customer: usize,
    pub product: usize,
    pub quantity: usize,
    pub unit_price: usize,
    pub discount: usize,
    pub salesperson: Option<usize>,
}

impl SheetColumns {
    /// Whether a column index holds a quantity/money value that is
    /// normalized to two decimal places for hashing.
    pub fn is_money(&self, index: usize) -> bool {
        index == self.quantity || index == self.unit_price || index == self.discount
    }

    pub fn is_date(&self, index: usize) -> bool {
        index == self.document_date
    }
}

/// Result of parsing one sheet.
#[derive(Debug, Clone)]
pub struct ParsedSheet {
    pub headers: Vec<String>,
    pub columns: SheetColumns,
    pub rows: Vec<Row>,
    /// Rows excluded because their date cell failed to normalize.
    pub skipped_dates: usize,
}

/// Read and parse the invoice sheet from an xlsx file. When `sheet` is
/// None the first sheet in the workbook is used.
pub fn read_invoice_sheet(path: &Path, sheet: Option<&str>) -> Result<ParsedSheet> {
    let mut workbook: Xlsx<_> = open_workbook(path)
        .with_context(|| format!("failed to open workbook: {}", path.display()))?;

    let sheet_name = match sheet {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .context("workbook has no sheets")?
            .clone(),
    };

    let range = workbook
        .worksheet_range(&sheet_name)
        .with_context(|| format!("failed to read sheet '{}'", sheet_name))?;

    let parsed = parse_range(&range)?;
    if parsed.skipped_dates > 0 {
        warn!(
            "{}: excluded {} row(s) with unreadable dates",
            sheet_name, parsed.skipped_dates
        );
    }
    Ok(parsed)
}

/// Parse an in-memory cell range. Split out from file handling so the
/// grouping pipeline is testable without touching disk.
pub fn parse_range(range: &Range<Data>) -> Result<ParsedSheet, SyncError> {
    let (header_idx, headers) = locate_header(range);
    let columns = resolve_columns(&headers)?;

    let mut rows = Vec::new();
    let mut skipped_dates = 0usize;

    for (idx, raw) in range.rows().enumerate().skip(header_idx + 1) {
        let source_row = idx + 1; // 1-based

        let document_no = cell_at(raw, columns.document_no)
            .map(row::cell_string)
            .unwrap_or_default();
        if document_no.is_empty() {
            continue; // blank separator rows
        }

        let date_cell = cell_at(raw, columns.document_date).unwrap_or(&Data::Empty);
        let Some(document_date) = row::normalize_date(date_cell) else {
            // Acknowledged edge case: rows with unreadable dates are
            // excluded without an error row, only counted.
            skipped_dates += 1;
            continue;
        };

        let salesperson_code = columns
            .salesperson
            .and_then(|i| cell_at(raw, i))
            .map(row::cell_string)
            .filter(|s| !s.is_empty());

        rows.push(Row {
            document_no,
            document_date,
            customer_code: cell_at(raw, columns.customer)
                .map(row::cell_string)
                .unwrap_or_default(),
            product_code: cell_at(raw, columns.product)
                .map(row::cell_string)
                .unwrap_or_default(),
            quantity: cell_at(raw, columns.quantity)
                .and_then(row::cell_number)
                .unwrap_or(0.0),
            unit_price: cell_at(raw, columns.unit_price)
                .and_then(row::cell_number)
                .unwrap_or(0.0),
            discount: cell_at(raw, columns.discount)
                .and_then(row::cell_number)
                .unwrap_or(0.0),
            salesperson_code,
            source_row,
            cells: raw.iter().map(Cell::from_data).collect(),
        });
    }

    Ok(ParsedSheet {
        headers,
        columns,
        rows,
        skipped_dates,
    })
}

fn cell_at(row: &[Data], index: usize) -> Option<&Data> {
    row.get(index)
}

/// The header row is the first row containing the document-number
/// label; the first row of the range when no row does.
fn locate_header(range: &Range<Data>) -> (usize, Vec<String>) {
    for (idx, raw) in range.rows().enumerate() {
        if raw
            .iter()
            .any(|c| labels_match(&row::cell_string(c), labels::DOCUMENT_NO))
        {
            return (idx, raw.iter().map(row::cell_string).collect());
        }
    }
    let headers = range
        .rows()
        .next()
        .map(|r| r.iter().map(row::cell_string).collect())
        .unwrap_or_default();
    (0, headers)
}

fn labels_match(cell: &str, label: &str) -> bool {
    cell.trim().eq_ignore_ascii_case(label)
}

fn find_column(headers: &[String], label: &str) -> Option<usize> {
    headers.iter().position(|h| labels_match(h, label))
}

fn resolve_columns(headers: &[String]) -> Result<SheetColumns, SyncError> {
    let required = |label: &str| {
        find_column(headers, label).ok_or_else(|| SyncError::schema(label))
    };

    Ok(SheetColumns {
        document_no: required(labels::DOCUMENT_NO)?,
        document_date: required(labels::DOCUMENT_DATE)?,
        customer: required(labels::CUSTOMER)?,
        product: required(labels::PRODUCT)?,
        quantity: required(labels::QUANTITY)?,
        unit_price: required(labels::UNIT_PRICE)?,
        discount: required(labels::DISCOUNT)?,
        salesperson: find_column(headers, labels::SALESPERSON),
    })
}
