//! Column mapping: parsed table rows → `MappedRecord`s.
//!
//! Row problems are collected, never thrown: an empty connector skips the
//! row, a missing mapped header fails the row, an unresolvable date leaves
//! the field empty and records a warning. Only a missing connector or sum
//! column is structural and fails the whole file.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::Serialize;

use reconcheck_tabular::{ParsedTable, TableRow};

use crate::amount::clean_number;
use crate::config::DocumentConfig;
use crate::error::ReconError;
use crate::model::MappedRecord;

/// Context for one mapping pass. The reference date anchors month-only
/// values; callers pass today, tests pass a fixed date.
#[derive(Debug, Clone, Copy)]
pub struct MapRequest<'a> {
    pub filename: &'a str,
    pub doc_type: &'a str,
    pub doc_category: &'a str,
    pub header_row: usize,
    pub reference_date: NaiveDate,
}

/// A row-level problem with its 1-based file row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowIssue {
    pub row_index: usize,
    pub reason: String,
}

#[derive(Debug, Default, Serialize)]
pub struct MapOutcome {
    pub records: Vec<MappedRecord>,
    /// Rows without a connector value; excluded by design, not an error.
    pub skipped: Vec<RowIssue>,
    /// Rows that could not be mapped.
    pub failed: Vec<RowIssue>,
    /// Non-fatal problems (unresolvable dates).
    pub warnings: Vec<RowIssue>,
}

pub fn map_rows(
    table: &ParsedTable,
    doc: &DocumentConfig,
    req: &MapRequest<'_>,
) -> Result<MapOutcome, ReconError> {
    let connector_idx = table
        .column(&doc.upload_connector_column)
        .ok_or_else(|| ReconError::MissingColumn {
            column: doc.upload_connector_column.clone(),
        })?;
    let sum_idx = table
        .column(&doc.upload_sum_column)
        .ok_or_else(|| ReconError::MissingColumn {
            column: doc.upload_sum_column.clone(),
        })?;

    // Resolve mapped headers once; a miss fails each row below, not the file.
    let mapping: Vec<(&str, &str, Option<usize>)> = doc
        .column_mapping
        .iter()
        .map(|(field, header)| (field.as_str(), header.as_str(), table.column(header)))
        .collect();

    let mut outcome = MapOutcome::default();
    for row in &table.rows {
        let connector = row.cells[connector_idx].display().trim().to_string();
        if connector.is_empty() {
            outcome.skipped.push(RowIssue {
                row_index: row.file_row,
                reason: "empty connector value".into(),
            });
            continue;
        }
        match map_row(table, doc, req, row, connector, sum_idx, &mapping, &mut outcome.warnings) {
            Ok(record) => outcome.records.push(record),
            Err(reason) => outcome.failed.push(RowIssue {
                row_index: row.file_row,
                reason,
            }),
        }
    }
    Ok(outcome)
}

#[allow(clippy::too_many_arguments)]
fn map_row(
    table: &ParsedTable,
    doc: &DocumentConfig,
    req: &MapRequest<'_>,
    row: &TableRow,
    connector: String,
    sum_idx: usize,
    mapping: &[(&str, &str, Option<usize>)],
    warnings: &mut Vec<RowIssue>,
) -> Result<MappedRecord, String> {
    let mut canonical: BTreeMap<String, Option<String>> = BTreeMap::new();
    for &(field, header, idx) in mapping {
        let idx = idx.ok_or_else(|| format!("mapped column '{header}' not found"))?;
        let raw = row.cells[idx].display();
        let value = if doc.date_fields.iter().any(|f| f == field) {
            match resolve_date(&raw, req.reference_date.year()) {
                Some(date) => Some(date.to_string()),
                None => {
                    if !raw.trim().is_empty() {
                        warnings.push(RowIssue {
                            row_index: row.file_row,
                            reason: format!("field '{field}': cannot resolve date '{raw}'"),
                        });
                    }
                    None
                }
            }
        } else {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        };
        canonical.insert(field.to_string(), value);
    }

    let raw_row = table
        .headers
        .iter()
        .zip(&row.cells)
        .map(|(h, c)| (h.clone(), c.display()))
        .collect();

    Ok(MappedRecord {
        filename: req.filename.to_string(),
        doc_type: req.doc_type.to_string(),
        doc_category: req.doc_category.to_string(),
        header_row: req.header_row,
        row_index: row.file_row,
        raw_row,
        canonical,
        connector,
        sum_value: clean_number(&row.cells[sum_idx]),
    })
}

// ---------------------------------------------------------------------------
// Flexible date resolution
// ---------------------------------------------------------------------------

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d-%m-%Y",
    "%Y/%m/%d",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d, %Y",
    "%d.%m.%Y",
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Resolve a flexible date value. Month numbers (1-12) and month names
/// (Indonesian or English, full or abbreviated) become the first day of that
/// month in the reference year; anything else goes through the fixed format
/// list. Returns None when nothing applies.
pub fn resolve_date(raw: &str, reference_year: i32) -> Option<NaiveDate> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    if value.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(m) = value.parse::<u32>() {
            if (1..=12).contains(&m) {
                return NaiveDate::from_ymd_opt(reference_year, m, 1);
            }
        }
    }

    if let Some(m) = month_number(value) {
        return NaiveDate::from_ymd_opt(reference_year, m, 1);
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, fmt) {
            return Some(date);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt.date());
        }
    }
    None
}

/// Month-name lookup, Indonesian and English, full and abbreviated.
fn month_number(value: &str) -> Option<u32> {
    match value.to_lowercase().as_str() {
        "januari" | "january" | "jan" => Some(1),
        "februari" | "february" | "feb" => Some(2),
        "maret" | "march" | "mar" => Some(3),
        "april" | "apr" => Some(4),
        "mei" | "may" => Some(5),
        "juni" | "june" | "jun" => Some(6),
        "juli" | "july" | "jul" => Some(7),
        "agustus" | "august" | "agu" | "aug" => Some(8),
        "september" | "sep" => Some(9),
        "oktober" | "october" | "okt" | "oct" => Some(10),
        "november" | "nov" => Some(11),
        "desember" | "december" | "des" | "dec" => Some(12),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
