// Excel upload parsing via calamine. First sheet only: uploads are single
// export tables, not workbooks.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};

use crate::error::ParseError;
use crate::table::{build_table, finish_headers, Cell, ParsedTable};

/// Maximum rows read from a sheet (prevents runaway imports from huge files).
const MAX_ROWS: usize = 200_000;

pub fn parse_path(path: &Path, header_row: usize) -> Result<ParsedTable, ParseError> {
    let grid = read_grid(path)?;
    if header_row == 0 || header_row > grid.len() {
        return Err(ParseError::HeaderRowNotFound {
            requested: header_row,
            available: grid.len(),
        });
    }
    let header_cells: Vec<String> = grid[header_row - 1].iter().map(Cell::display).collect();
    let headers = finish_headers(&header_cells);
    let raw_rows = grid
        .into_iter()
        .enumerate()
        .skip(header_row)
        .map(|(idx, cells)| (idx + 1, cells))
        .collect();
    Ok(build_table(headers, raw_rows))
}

pub fn preview_path(path: &Path, rows: usize) -> Result<Vec<Vec<String>>, ParseError> {
    let mut grid = read_grid(path)?;
    grid.truncate(rows);
    Ok(grid
        .into_iter()
        .map(|cells| cells.iter().map(Cell::display).collect())
        .collect())
}

/// Read the first sheet as a rectangular grid: calamine's range covers the
/// used area up to the last non-empty row/column.
fn read_grid(path: &Path) -> Result<Vec<Vec<Cell>>, ParseError> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| ParseError::Malformed(format!("failed to open workbook: {e}")))?;

    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    let first = sheet_names.first().ok_or(ParseError::EmptyWorkbook)?;

    let range = workbook
        .worksheet_range(first)
        .map_err(|e| ParseError::Malformed(format!("failed to read sheet '{first}': {e}")))?;

    let mut grid = Vec::new();
    for row in range.rows() {
        if grid.len() >= MAX_ROWS {
            break;
        }
        grid.push(row.iter().map(convert_cell).collect());
    }
    Ok(grid)
}

fn convert_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => {
            if s.is_empty() {
                Cell::Empty
            } else {
                Cell::Text(s.clone())
            }
        }
        Data::Float(n) => Cell::Number(*n),
        Data::Int(n) => Cell::Number(*n as f64),
        Data::Bool(b) => Cell::Bool(*b),
        Data::Error(e) => Cell::Text(format!("#{e:?}")),
        // Date cells surface as their serial number; mapped date fields are
        // expected to arrive as text in practice.
        Data::DateTime(dt) => Cell::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
    }
}
