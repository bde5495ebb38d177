//! Ingest and validate: the two persistence-coupled operations that tie the
//! parser, mapper, engine, and store together.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};

use reconcheck_recon::config::ConfigSet;
use reconcheck_recon::mapper::{map_rows, MapRequest, RowIssue};
use reconcheck_recon::{reconcile, ReconError};
use reconcheck_tabular::{parse_file, ParseError};

use crate::db::{RunSummary, Store};
use crate::error::StoreError;

#[derive(Debug)]
pub enum PipelineError {
    Parse(ParseError),
    Recon(ReconError),
    Store(StoreError),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "{e}"),
            Self::Recon(e) => write!(f, "{e}"),
            Self::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<ParseError> for PipelineError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

impl From<ReconError> for PipelineError {
    fn from(e: ReconError) -> Self {
        Self::Recon(e)
    }
}

impl From<StoreError> for PipelineError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

// ---------------------------------------------------------------------------
// Ingest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct IngestRequest<'a> {
    pub path: &'a Path,
    pub doc_type: &'a str,
    pub doc_category: &'a str,
    /// 1-based header row in the upload.
    pub header_row: usize,
    /// Keep the upload on disk instead of deleting it after a successful
    /// ingest.
    pub keep_file: bool,
    /// Anchors month-only date values.
    pub reference_date: NaiveDate,
}

#[derive(Debug, serde::Serialize)]
pub struct IngestOutcome {
    pub filename: String,
    pub parsed_rows: usize,
    pub inserted: usize,
    pub skipped: Vec<RowIssue>,
    pub failed: Vec<RowIssue>,
    /// Date-resolution warnings plus any file-cleanup problem.
    pub warnings: Vec<String>,
}

/// Parse an upload, map its rows, and replace this document's stored records.
///
/// The delete-then-insert pair keyed by `(filename, doc_type, doc_category)`
/// makes re-ingesting the same file idempotent. On success the upload is
/// removed from disk unless `keep_file` is set; a failed removal is a
/// warning, not an error.
pub fn ingest(
    store: &mut Store,
    config: &ConfigSet,
    req: &IngestRequest<'_>,
) -> Result<IngestOutcome, PipelineError> {
    let doc = config.document(req.doc_type, req.doc_category)?;
    let table = parse_file(req.path, req.header_row)?;
    let filename = req
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| req.path.display().to_string());

    let map_req = MapRequest {
        filename: &filename,
        doc_type: req.doc_type,
        doc_category: req.doc_category,
        header_row: req.header_row,
        reference_date: req.reference_date,
    };
    let outcome = map_rows(&table, doc, &map_req)?;

    store.delete_mapped(&filename, req.doc_type, req.doc_category)?;
    let inserted = store.insert_mapped(&outcome.records)?;

    let mut warnings: Vec<String> = outcome
        .warnings
        .iter()
        .map(|w| format!("row {}: {}", w.row_index, w.reason))
        .collect();
    if !req.keep_file {
        if let Err(e) = std::fs::remove_file(req.path) {
            warnings.push(format!("could not remove '{}': {e}", req.path.display()));
        }
    }

    Ok(IngestOutcome {
        filename,
        parsed_rows: table.data_count,
        inserted,
        skipped: outcome.skipped,
        failed: outcome.failed,
        warnings,
    })
}

// ---------------------------------------------------------------------------
// Validate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct ValidateRequest<'a> {
    pub filename: &'a str,
    pub doc_type: &'a str,
    pub doc_category: &'a str,
    pub now: DateTime<Utc>,
}

/// Reconcile a previously ingested document against its source table.
///
/// Re-validation reuses the run keyed by `(filename, doc_type, doc_category)`
/// and replaces its results in place. A fatal error after the run exists
/// marks it `failed` before propagating.
pub fn validate(
    store: &mut Store,
    config: &ConfigSet,
    req: &ValidateRequest<'_>,
) -> Result<RunSummary, PipelineError> {
    // Unknown documents must fail before a run record exists.
    config.document(req.doc_type, req.doc_category)?;

    let run = match store.find_run(req.filename, req.doc_type, req.doc_category)? {
        Some(run) => run,
        None => store.create_run(req.filename, req.doc_type, req.doc_category, req.now)?,
    };

    let result = run_validation(store, config, req, run.id);
    if result.is_err() {
        // Propagate the original error even if the status update fails too.
        let _ = store.mark_failed(run.id);
    }
    result
}

fn run_validation(
    store: &mut Store,
    config: &ConfigSet,
    req: &ValidateRequest<'_>,
    run_id: i64,
) -> Result<RunSummary, PipelineError> {
    let doc = config.document(req.doc_type, req.doc_category)?;

    let mapped = store.load_mapped(req.filename, req.doc_type, req.doc_category)?;
    if mapped.is_empty() {
        return Err(StoreError::NoMappedRecords { filename: req.filename.to_string() }.into());
    }

    let source = store.load_source(
        &doc.source_table,
        &doc.source_connector_column,
        &doc.source_sum_column,
    )?;

    let outcome = reconcile(&mapped, &source, config.tolerance_for(doc));
    store.replace_results(run_id, &outcome)?;
    Ok(store.get_run(run_id)?)
}
