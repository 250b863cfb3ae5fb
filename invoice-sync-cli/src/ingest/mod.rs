//! Spreadsheet ingestion
//!
//! Parses the uploaded workbook into typed rows at the parse boundary,
//! groups consecutive rows into logical invoice groups and derives the
//! stable external key and content hash per group. Pure over the input
//! bytes: no side effects.

pub mod grouper;
pub mod reader;
pub mod row;

pub use grouper::{DEFAULT_HASH_COLUMNS, InvoiceGroup, Period, group_rows};
pub use reader::{ParsedSheet, SheetColumns, read_invoice_sheet};
pub use row::{Cell, Row};
