use std::fmt;

#[derive(Debug)]
pub enum ParseError {
    /// Extension is not one of csv/xlsx/xls.
    UnsupportedFormat(String),
    /// Requested header row is past the last row of the file.
    HeaderRowNotFound { requested: usize, available: usize },
    /// Workbook has no sheets.
    EmptyWorkbook,
    /// File read error.
    Io(String),
    /// Malformed CSV or spreadsheet content.
    Malformed(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedFormat(ext) => {
                write!(f, "unsupported file format '{ext}' (expected csv, xlsx, or xls)")
            }
            Self::HeaderRowNotFound { requested, available } => {
                write!(f, "header row {requested} not found: file has {available} row(s)")
            }
            Self::EmptyWorkbook => write!(f, "workbook contains no sheets"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
            Self::Malformed(msg) => write!(f, "malformed file: {msg}"),
        }
    }
}

impl std::error::Error for ParseError {}
