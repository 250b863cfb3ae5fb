//! Error report workbook
//!
//! Maps per-item failures back to the spreadsheet rows that caused them
//! and writes an xlsx report next to the configured report directory.
//! Attribution prefers the remote line index, falls back to matching an
//! unresolved business code against the group's rows, and lands on the
//! group's first row when neither applies. Removal failures have no
//! source rows and appear only in the job's result payload.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use rust_xlsxwriter::{Format, Workbook};
use uuid::Uuid;

use crate::ingest::{Cell, InvoiceGroup};

use super::types::SyncResultItem;

static UNKNOWN_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)unknown (customer|product|salesperson) code '([^']+)'")
        .expect("static pattern")
});

/// One reported spreadsheet row with every message attributed to it.
#[derive(Debug, Clone)]
pub struct RowError {
    pub source_row: usize,
    pub cells: Vec<Cell>,
    pub messages: Vec<String>,
}

/// Attribute failed items to source rows, aggregated per row so a row
/// hit by several failures appears once with all its messages.
pub fn attribute_errors(
    groups: &[InvoiceGroup],
    items: &[SyncResultItem],
) -> BTreeMap<usize, RowError> {
    let by_key: HashMap<&str, &InvoiceGroup> = groups
        .iter()
        .map(|g| (g.external_key.as_str(), g))
        .collect();

    let mut errors: BTreeMap<usize, RowError> = BTreeMap::new();
    for item in items {
        if !item.status.is_failure() {
            continue;
        }
        let Some(group) = by_key.get(item.external_key.as_str()) else {
            continue;
        };
        let Some(message) = item.error.as_deref() else {
            continue;
        };

        for row in attributed_rows(group, item, message) {
            errors
                .entry(row.source_row)
                .or_insert_with(|| RowError {
                    source_row: row.source_row,
                    cells: row.cells.clone(),
                    messages: Vec::new(),
                })
                .messages
                .push(message.to_string());
        }
    }
    errors
}

fn attributed_rows<'a>(
    group: &'a InvoiceGroup,
    item: &SyncResultItem,
    message: &str,
) -> Vec<&'a crate::ingest::Row> {
    // Remote line index points at exactly one submitted line.
    if let Some(index) = item.detail.as_ref().and_then(|d| d.line_index) {
        if let Some(row) = group.rows.get(index) {
            return vec![row];
        }
    }

    // An unresolved code marks every row carrying that code.
    if let Some(captures) = UNKNOWN_CODE.captures(message) {
        let kind = captures[1].to_ascii_lowercase();
        let code = &captures[2];
        let rows: Vec<_> = group
            .rows
            .iter()
            .filter(|row| match kind.as_str() {
                "customer" => row.customer_code == code,
                "product" => row.product_code == code,
                "salesperson" => row.salesperson_code.as_deref() == Some(code),
                _ => false,
            })
            .collect();
        if !rows.is_empty() {
            return rows;
        }
    }

    group.rows.first().into_iter().collect()
}

/// Report file location for one job.
pub fn error_report_path(dir: &Path, job_id: Uuid) -> PathBuf {
    dir.join(format!("sync-errors-{job_id}.xlsx"))
}

/// Write the attributed errors as a workbook: the original data columns
/// followed by the failure messages and the 1-based source row number.
pub fn write_error_report(
    path: &Path,
    headers: &[String],
    errors: &BTreeMap<usize, RowError>,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("Errors")?;

    let bold = Format::new().set_bold();
    for (col, header) in headers.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, header.as_str(), &bold)?;
    }
    let message_col = headers.len() as u16;
    worksheet.write_string_with_format(0, message_col, "Message", &bold)?;
    worksheet.write_string_with_format(0, message_col + 1, "Source Row", &bold)?;

    for (row_idx, error) in errors.values().enumerate() {
        let row = (row_idx + 1) as u32;
        for (col, cell) in error.cells.iter().take(headers.len()).enumerate() {
            worksheet.write_string(row, col as u16, cell.display())?;
        }
        worksheet.write_string(row, message_col, error.messages.join("; "))?;
        worksheet.write_number(row, message_col + 1, error.source_row as f64)?;
    }

    workbook
        .save(path)
        .with_context(|| format!("failed to write error report {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    use crate::api::models::RemoteErrorDetail;
    use crate::error::{RefKind, SyncError};
    use crate::ingest::{Period, Row};
    use crate::sync::types::ItemStatus;

    fn row(source_row: usize, product: &str) -> Row {
        Row {
            document_no: "7".into(),
            document_date: NaiveDate::from_ymd_opt(2025, 8, 10).unwrap(),
            customer_code: "A100".into(),
            product_code: product.into(),
            quantity: 1.0,
            unit_price: 10.0,
            discount: 0.0,
            salesperson_code: None,
            source_row,
            cells: vec![
                Cell::Text("7".into()),
                Cell::Date(NaiveDate::from_ymd_opt(2025, 8, 10).unwrap()),
                Cell::Text("A100".into()),
                Cell::Text(product.into()),
            ],
        }
    }

    fn group(key: &str, rows: Vec<Row>) -> InvoiceGroup {
        InvoiceGroup {
            external_key: key.to_string(),
            period: Period::new(2025, 8).unwrap(),
            document_no: "7".into(),
            document_date: NaiveDate::from_ymd_opt(2025, 8, 10).unwrap(),
            customer_code: "A100".into(),
            rows,
            content_hash: "h".into(),
        }
    }

    #[test]
    fn test_line_index_pins_exact_row() {
        let groups = vec![group("K", vec![row(2, "P-1"), row(3, "P-2"), row(4, "P-3")])];
        let detail = RemoteErrorDetail {
            line_index: Some(1),
            ..Default::default()
        };
        let err = SyncError::from_status(422, "invalid quantity".into(), Some(detail), None);
        let items = vec![SyncResultItem::failed(
            "K".into(),
            None,
            ItemStatus::Error,
            &err,
        )];

        let errors = attribute_errors(&groups, &items);
        assert_eq!(errors.len(), 1);
        assert!(errors.contains_key(&3));
    }

    #[test]
    fn test_unknown_code_marks_matching_rows() {
        let groups = vec![group("K", vec![row(2, "P-1"), row(3, "P-404"), row(4, "P-404")])];
        let err = SyncError::ReferenceNotFound {
            kind: RefKind::Product,
            code: "P-404".into(),
            external_key: "K".into(),
        };
        let items = vec![SyncResultItem::failed(
            "K".into(),
            None,
            ItemStatus::Skipped,
            &err,
        )];

        let errors = attribute_errors(&groups, &items);
        let rows: Vec<_> = errors.keys().copied().collect();
        assert_eq!(rows, vec![3, 4]);
        assert!(errors[&3].messages[0].contains("unknown product code 'P-404'"));
    }

    #[test]
    fn test_unattributable_failure_lands_on_first_row() {
        let groups = vec![group("K", vec![row(5, "P-1"), row(6, "P-2")])];
        let err = SyncError::from_status(500, "internal error".into(), None, None);
        let items = vec![SyncResultItem::failed(
            "K".into(),
            None,
            ItemStatus::Error,
            &err,
        )];

        let errors = attribute_errors(&groups, &items);
        let rows: Vec<_> = errors.keys().copied().collect();
        assert_eq!(rows, vec![5]);
    }

    #[test]
    fn test_messages_aggregate_per_row() {
        let groups = vec![
            group("K1", vec![row(2, "P-1")]),
            group("K2", vec![row(2, "P-1")]),
        ];
        let err = SyncError::from_status(400, "bad".into(), None, None);
        let items = vec![
            SyncResultItem::failed("K1".into(), None, ItemStatus::Error, &err),
            SyncResultItem::failed("K2".into(), None, ItemStatus::Error, &err),
        ];

        let errors = attribute_errors(&groups, &items);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[&2].messages.len(), 2);
    }

    #[test]
    fn test_successes_and_removals_excluded() {
        let groups = vec![group("K", vec![row(2, "P-1")])];
        let err = SyncError::from_status(400, "bad".into(), None, None);
        let items = vec![
            SyncResultItem::ok("K".into(), Uuid::new_v4(), ItemStatus::Created),
            // A removal failure has no group and therefore no rows.
            SyncResultItem::failed("GONE".into(), None, ItemStatus::Error, &err),
        ];

        assert!(attribute_errors(&groups, &items).is_empty());
    }

    #[test]
    fn test_report_written_to_disk() {
        let groups = vec![group("K", vec![row(2, "P-1")])];
        let err = SyncError::from_status(422, "invalid discount".into(), None, None);
        let items = vec![SyncResultItem::failed(
            "K".into(),
            None,
            ItemStatus::Error,
            &err,
        )];
        let errors = attribute_errors(&groups, &items);

        let headers: Vec<String> = ["Document No", "Document Date", "Customer", "Product"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let path = error_report_path(&std::env::temp_dir(), Uuid::new_v4());

        write_error_report(&path, &headers, &errors).unwrap();
        assert!(path.exists());
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
        std::fs::remove_file(&path).unwrap();
    }
}
