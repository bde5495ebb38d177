// CSV upload parsing: byte decoding + header/data split.

use std::io::Read;
use std::path::Path;

use crate::error::ParseError;
use crate::table::{build_table, finish_headers, Cell, ParsedTable};

pub fn parse_path(path: &Path, header_row: usize) -> Result<ParsedTable, ParseError> {
    let bytes = read_bytes(path)?;
    parse_bytes(&bytes, header_row)
}

/// Row numbers (`header_row` in, `file_row` out) are 1-based indexes into the
/// CSV records, not physical file lines: the reader drops fully blank lines
/// (no commas), so a blank line above the header does not shift the count.
/// Preview uses the same reader, so the numbers an operator picks from match.
pub fn parse_bytes(bytes: &[u8], header_row: usize) -> Result<ParsedTable, ParseError> {
    let content = decode(bytes);
    let records = read_records(&content)?;
    if header_row == 0 || header_row > records.len() {
        return Err(ParseError::HeaderRowNotFound {
            requested: header_row,
            available: records.len(),
        });
    }
    let headers = finish_headers(&records[header_row - 1]);
    let raw_rows = records
        .into_iter()
        .enumerate()
        .skip(header_row)
        .map(|(idx, fields)| {
            let cells = fields
                .into_iter()
                .map(|f| if f.trim().is_empty() { Cell::Empty } else { Cell::Text(f) })
                .collect();
            (idx + 1, cells)
        })
        .collect();
    Ok(build_table(headers, raw_rows))
}

pub fn preview_path(path: &Path, rows: usize) -> Result<Vec<Vec<String>>, ParseError> {
    let bytes = read_bytes(path)?;
    let content = decode(&bytes);
    let mut records = read_records(&content)?;
    records.truncate(rows);
    Ok(records)
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, ParseError> {
    let mut file = std::fs::File::open(path).map_err(|e| ParseError::Io(e.to_string()))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| ParseError::Io(e.to_string()))?;
    Ok(bytes)
}

/// Decode upload bytes to UTF-8 text. Fixed candidate chain: explicit BOMs
/// first, then strict UTF-8, then Windows-1252 (common for Excel-exported
/// CSVs).
fn decode(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(rest).into_owned();
    }
    if bytes.starts_with(&[0xFF, 0xFE]) {
        let (decoded, _, _) = encoding_rs::UTF_16LE.decode(bytes);
        return decoded.into_owned();
    }
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let (decoded, _, _) = encoding_rs::UTF_16BE.decode(bytes);
        return decoded.into_owned();
    }
    // Try UTF-8 first; on failure, recover the buffer from the error
    match String::from_utf8(bytes.to_vec()) {
        Ok(s) => s,
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            decoded.into_owned()
        }
    }
}

fn read_records(content: &str) -> Result<Vec<Vec<String>>, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| ParseError::Malformed(e.to_string()))?;
        records.push(record.iter().map(|f| f.to_string()).collect());
    }
    Ok(records)
}
