//! `reconcheck-tabular`: tabular file parsing for reconciliation uploads.
//!
//! Turns a raw CSV or Excel file plus a chosen header row into an ordered
//! header list and typed data rows. No column mapping or comparison logic
//! lives here; callers get a `ParsedTable` and take it from there.

pub mod csv;
pub mod error;
pub mod sheet;
pub mod table;

pub use error::ParseError;
pub use table::{Cell, FileFormat, ParsedTable, TableRow};

use std::path::Path;

/// Parse a file into a table, dispatching on the extension.
///
/// `header_row` is the 1-based row that holds the column headers; every row
/// after it becomes data.
pub fn parse_file(path: &Path, header_row: usize) -> Result<ParsedTable, ParseError> {
    match FileFormat::from_path(path)? {
        FileFormat::Csv => csv::parse_path(path, header_row),
        FileFormat::Xlsx | FileFormat::Xls => sheet::parse_path(path, header_row),
    }
}

/// Read the first `rows` raw rows as display strings, without committing to a
/// header row. Used to let an operator pick the header row by eye.
pub fn preview_file(path: &Path, rows: usize) -> Result<Vec<Vec<String>>, ParseError> {
    match FileFormat::from_path(path)? {
        FileFormat::Csv => csv::preview_path(path, rows),
        FileFormat::Xlsx | FileFormat::Xls => sheet::preview_path(path, rows),
    }
}
