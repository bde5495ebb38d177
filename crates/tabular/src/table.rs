use std::path::Path;

use crate::error::ParseError;

/// Supported upload formats, inferred from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Xlsx,
    Xls,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Result<Self, ParseError> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "csv" => Ok(Self::Csv),
            "xlsx" => Ok(Self::Xlsx),
            "xls" => Ok(Self::Xls),
            other => Err(ParseError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// A typed cell value. CSV produces only `Empty` and `Text`; spreadsheets
/// also produce `Number` and `Bool`.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Display form: integers without a trailing `.0`, booleans uppercased
    /// the way spreadsheet apps show them.
    pub fn display(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(s) => s.clone(),
            Self::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
            Self::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        }
    }
}

/// One data row, keeping its original position in the file.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    /// 1-based row number in the source file (header offset included).
    pub file_row: usize,
    /// Cells padded/truncated to the header width.
    pub cells: Vec<Cell>,
}

/// A parsed upload: finished headers plus the data rows below them.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTable {
    pub headers: Vec<String>,
    pub rows: Vec<TableRow>,
    /// Number of data rows kept (blank rows already dropped).
    pub data_count: usize,
}

impl ParsedTable {
    /// Resolve a finished header name to its column index.
    pub fn column(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }

    /// Cell under `header` for the given row, if the header exists.
    pub fn cell<'a>(&self, row: &'a TableRow, header: &str) -> Option<&'a Cell> {
        self.column(header).and_then(|i| row.cells.get(i))
    }
}

/// Finish raw header cells: trim, name blanks positionally, and disambiguate
/// duplicates in first-seen order (`Name`, `Name_1`, `Name_2`, ...). A suffix
/// that would collide with a later literal header keeps counting up.
pub(crate) fn finish_headers(raw: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for (i, h) in raw.iter().enumerate() {
        let trimmed = h.trim();
        let base = if trimmed.is_empty() {
            format!("Column_{}", i + 1)
        } else {
            trimmed.to_string()
        };
        let mut name = base.clone();
        let mut n = 0usize;
        while out.contains(&name) || (n > 0 && raw[i + 1..].iter().any(|r| r.trim() == name)) {
            n += 1;
            name = format!("{base}_{n}");
        }
        out.push(name);
    }
    out
}

/// Assemble a table from finished headers and raw `(file_row, cells)` pairs:
/// pad/truncate each row to the header width and drop all-blank rows.
pub(crate) fn build_table(headers: Vec<String>, raw_rows: Vec<(usize, Vec<Cell>)>) -> ParsedTable {
    let width = headers.len();
    let mut rows = Vec::with_capacity(raw_rows.len());
    for (file_row, mut cells) in raw_rows {
        if cells.iter().all(Cell::is_empty) {
            continue;
        }
        cells.resize(width, Cell::Empty);
        rows.push(TableRow { file_row, cells });
    }
    let data_count = rows.len();
    ParsedTable { headers, rows, data_count }
}
