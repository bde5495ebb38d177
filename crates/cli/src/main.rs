// reconcheck CLI - ingest uploads, validate them against source-of-truth
// tables, and query the results.

mod exit_codes;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::Utc;
use clap::{Parser, Subcommand};

use reconcheck_recon::amount::clean_number;
use reconcheck_recon::config::ConfigSet;
use reconcheck_recon::model::GroupCategory;
use reconcheck_recon::ReconError;
use reconcheck_store::pipeline::{self, IngestRequest, ValidateRequest};
use reconcheck_store::{
    GroupFilter, Page, PipelineError, RunResults, SortDir, SortField, Store, StoreError,
};
use reconcheck_tabular::ParseError;

use exit_codes::{
    pipeline_exit_code, store_exit_code, EXIT_CONFIG, EXIT_ERROR, EXIT_MISMATCH, EXIT_PARSE,
    EXIT_SUCCESS, EXIT_USAGE,
};

#[derive(Parser)]
#[command(name = "rcheck")]
#[command(about = "Reconcile uploaded documents against source-of-truth tables")]
#[command(version)]
struct Cli {
    /// SQLite database holding mapped records, runs, and source tables
    #[arg(long, global = true, default_value = "reconcheck.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the first rows of an upload, to pick the header row by eye
    #[command(after_help = "\
Examples:
  rcheck preview upload.xlsx
  rcheck preview export.csv --rows 20")]
    Preview {
        file: PathBuf,

        /// Number of rows to show
        #[arg(long, default_value_t = 10)]
        rows: usize,
    },

    /// Parse an upload, map its columns, and store the mapped records
    #[command(after_help = "\
Examples:
  rcheck ingest upload.csv -c recon.toml --doc-type invoice --doc-category monthly
  rcheck ingest export.xlsx -c recon.toml --doc-type invoice --doc-category monthly --header-row 3 --keep")]
    Ingest {
        file: PathBuf,

        /// Reconciliation config (TOML)
        #[arg(long, short = 'c')]
        config: PathBuf,

        #[arg(long)]
        doc_type: String,

        #[arg(long)]
        doc_category: String,

        /// 1-based row holding the column headers
        #[arg(long, default_value_t = 1)]
        header_row: usize,

        /// Keep the upload on disk after a successful ingest
        #[arg(long)]
        keep: bool,

        /// Machine-readable output
        #[arg(long)]
        json: bool,
    },

    /// Reconcile stored records against the configured source table
    #[command(after_help = "\
Examples:
  rcheck validate -c recon.toml --doc-type invoice --doc-category monthly --filename upload.csv

Exits 3 when mismatches remain, so CI can gate on it.")]
    Validate {
        #[arg(long, short = 'c')]
        config: PathBuf,

        #[arg(long)]
        doc_type: String,

        #[arg(long)]
        doc_category: String,

        /// Filename the records were ingested under
        #[arg(long)]
        filename: String,

        #[arg(long)]
        json: bool,
    },

    /// List validation runs
    Runs {
        #[arg(long)]
        json: bool,
    },

    /// Paginated, filterable group results for a run
    #[command(after_help = "\
Examples:
  rcheck results 3 --category discrepancy --sort discrepancy --dir desc
  rcheck results 3 --search inv-20 --page 2 --per-page 50
  rcheck results 3 --rows --json")]
    Results {
        run_id: i64,

        /// Config supplying the per-page maximum (default maximum: 100)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Case-insensitive substring match on the group key
        #[arg(long)]
        search: Option<String>,

        /// im_invalid, missing, or discrepancy
        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        source_label: Option<String>,

        #[arg(long)]
        note: Option<String>,

        /// key, uploaded_total, source_total, difference, discrepancy,
        /// category, note, or source_label
        #[arg(long, default_value = "key")]
        sort: String,

        /// asc or desc
        #[arg(long, default_value = "asc")]
        dir: String,

        #[arg(long, default_value_t = 1)]
        page: usize,

        #[arg(long, default_value_t = 25)]
        per_page: usize,

        /// List per-row verdicts instead of groups
        #[arg(long)]
        rows: bool,

        #[arg(long)]
        json: bool,
    },

    /// Aggregate views over a run: category, label, and note counts, plus
    /// the largest discrepancies
    Charts {
        run_id: i64,

        /// How many top discrepancies to show
        #[arg(long, default_value_t = 10)]
        top: usize,

        #[arg(long)]
        json: bool,
    },

    /// Source-of-truth table management
    Source {
        #[command(subcommand)]
        command: SourceCommands,
    },
}

#[derive(Subcommand)]
enum SourceCommands {
    /// Load a tabular file into a source table, replacing its contents
    #[command(after_help = "\
Examples:
  rcheck source load invoices.csv --table source_invoices --connector-column invoice_no --sum-column amount")]
    Load {
        file: PathBuf,

        #[arg(long)]
        table: String,

        /// Header of the column holding the grouping key
        #[arg(long)]
        connector_column: String,

        /// Header of the column holding the amount
        #[arg(long)]
        sum_column: String,

        #[arg(long, default_value_t = 1)]
        header_row: usize,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Preview { file, rows } => cmd_preview(&file, rows),
        Commands::Ingest { file, config, doc_type, doc_category, header_row, keep, json } => {
            cmd_ingest(&cli.db, &file, &config, &doc_type, &doc_category, header_row, keep, json)
        }
        Commands::Validate { config, doc_type, doc_category, filename, json } => {
            cmd_validate(&cli.db, &config, &doc_type, &doc_category, &filename, json)
        }
        Commands::Runs { json } => cmd_runs(&cli.db, json),
        Commands::Results {
            run_id, config, search, category, source_label, note,
            sort, dir, page, per_page, rows, json,
        } => cmd_results(
            &cli.db, run_id, config.as_deref(), search, category, source_label, note,
            &sort, &dir, page, per_page, rows, json,
        ),
        Commands::Charts { run_id, top, json } => cmd_charts(&cli.db, run_id, top, json),
        Commands::Source { command } => match command {
            SourceCommands::Load { file, table, connector_column, sum_column, header_row } => {
                cmd_source_load(&cli.db, &file, &table, &connector_column, &sum_column, header_row)
            }
        },
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_preview(file: &Path, rows: usize) -> Result<(), CliError> {
    let preview = reconcheck_tabular::preview_file(file, rows)?;
    if preview.is_empty() {
        eprintln!("(empty file)");
        return Ok(());
    }
    let width = preview.iter().map(|r| r.len()).max().unwrap_or(0);
    let letters: Vec<String> = (0..width).map(column_letter).collect();
    println!("{:>4}  {}", "", letters.join(" | "));
    for (i, row) in preview.iter().enumerate() {
        println!("{:>4}  {}", i + 1, row.join(" | "));
    }
    eprintln!("pick the header row number and pass it as --header-row");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_ingest(
    db: &Path,
    file: &Path,
    config_path: &Path,
    doc_type: &str,
    doc_category: &str,
    header_row: usize,
    keep: bool,
    json: bool,
) -> Result<(), CliError> {
    let config = ConfigSet::load(config_path)?;
    let mut store = Store::open(db)?;

    let req = IngestRequest {
        path: file,
        doc_type,
        doc_category,
        header_row,
        keep_file: keep,
        reference_date: Utc::now().date_naive(),
    };
    let outcome = pipeline::ingest(&mut store, &config, &req)?;

    if json {
        println!("{}", to_json(&outcome)?);
        return Ok(());
    }

    eprintln!(
        "{}: parsed {} data rows, stored {} mapped records ({} skipped, {} failed)",
        outcome.filename,
        outcome.parsed_rows,
        outcome.inserted,
        outcome.skipped.len(),
        outcome.failed.len(),
    );
    for issue in outcome.failed.iter().take(5) {
        eprintln!("  failed row {}: {}", issue.row_index, issue.reason);
    }
    if outcome.failed.len() > 5 {
        eprintln!("  ... and {} more", outcome.failed.len() - 5);
    }
    for warning in &outcome.warnings {
        eprintln!("warning: {warning}");
    }
    Ok(())
}

fn cmd_validate(
    db: &Path,
    config_path: &Path,
    doc_type: &str,
    doc_category: &str,
    filename: &str,
    json: bool,
) -> Result<(), CliError> {
    let config = ConfigSet::load(config_path)?;
    let mut store = Store::open(db)?;

    let req = ValidateRequest { filename, doc_type, doc_category, now: Utc::now() };
    let run = pipeline::validate(&mut store, &config, &req)?;

    if json {
        println!("{}", to_json(&run)?);
    } else {
        eprintln!(
            "run #{}: score {:.2}, {}/{} matched, {} mismatched",
            run.id, run.score, run.matched_records, run.total_records, run.mismatched_records,
        );
    }

    if run.mismatched_records > 0 {
        // Summary already printed; the exit code carries the signal.
        return Err(CliError { code: EXIT_MISMATCH, message: String::new(), hint: None });
    }
    Ok(())
}

fn cmd_runs(db: &Path, json: bool) -> Result<(), CliError> {
    let store = Store::open(db)?;
    let runs = store.list_runs()?;

    if json {
        println!("{}", to_json(&runs)?);
        return Ok(());
    }
    if runs.is_empty() {
        eprintln!("no validation runs yet");
        return Ok(());
    }
    for run in runs {
        println!(
            "#{:<4} {:<30} {}.{} {:<10} score {:>6.2}  {}/{} matched  {}",
            run.id,
            run.filename,
            run.doc_type,
            run.doc_category,
            run.status.as_str(),
            run.score,
            run.matched_records,
            run.total_records,
            run.created_at.format("%Y-%m-%d %H:%M"),
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_results(
    db: &Path,
    run_id: i64,
    config_path: Option<&Path>,
    search: Option<String>,
    category: Option<String>,
    source_label: Option<String>,
    note: Option<String>,
    sort: &str,
    dir: &str,
    page: usize,
    per_page: usize,
    rows: bool,
    json: bool,
) -> Result<(), CliError> {
    // Usage errors first, before any store access.
    let category = match category {
        Some(value) => Some(GroupCategory::parse(&value).ok_or_else(|| {
            CliError::args(format!("unknown category '{value}'"))
                .with_hint("expected im_invalid, missing, or discrepancy")
        })?),
        None => None,
    };
    let sort = SortField::parse(sort).ok_or_else(|| {
        CliError::args(format!("unknown sort field '{sort}'")).with_hint(
            "expected key, uploaded_total, source_total, difference, discrepancy, category, note, or source_label",
        )
    })?;
    let dir = SortDir::parse(dir)
        .ok_or_else(|| CliError::args(format!("unknown direction '{dir}'")).with_hint("expected asc or desc"))?;

    let max_per_page = match config_path {
        Some(path) => ConfigSet::load(path)?.settings.max_per_page,
        None => 100,
    };
    let store = Store::open(db)?;
    let results = RunResults::load(&store, run_id)?;

    if rows {
        let page = results.page_rows(page, per_page, max_per_page);
        if json {
            println!("{}", to_json(&page)?);
        } else {
            for row in &page.items {
                println!(
                    "row {:>5}  {:<24} {:<8} {}",
                    row.row_index,
                    row.key,
                    row.verdict,
                    row.note.as_deref().unwrap_or("-"),
                );
            }
            eprintln!("page {}/{} ({} rows)", page.page, page.total_pages, page.total_items);
        }
        return Ok(());
    }

    let filter = GroupFilter { search, category, source_label, note };
    let page = results.page_groups(&filter, sort, dir, page, per_page, max_per_page);

    if json {
        println!("{}", to_json(&page)?);
        return Ok(());
    }
    print_group_page(&page);
    Ok(())
}

fn print_group_page(page: &Page<reconcheck_store::GroupView>) {
    for g in &page.items {
        println!(
            "{:<24} {:>14.2} {:>14} {:<8} {:<12} {:<22} {}",
            g.key,
            g.uploaded_total,
            fmt_opt(g.source_total),
            g.verdict,
            g.category.map(|c| c.as_str()).unwrap_or("-"),
            g.source_label,
            g.note.as_deref().unwrap_or("-"),
        );
    }
    eprintln!("page {}/{} ({} groups)", page.page, page.total_pages, page.total_items);
}

fn cmd_charts(db: &Path, run_id: i64, top: usize, json: bool) -> Result<(), CliError> {
    let store = Store::open(db)?;
    let results = RunResults::load(&store, run_id)?;

    let categories = results.category_counts();
    let labels = results.source_label_counts();
    let notes = results.note_counts();
    let top_groups = results.top_discrepancies(top);

    if json {
        let payload = serde_json::json!({
            "run_id": run_id,
            "categories": categories,
            "source_labels": labels,
            "notes": notes,
            "top_discrepancies": top_groups,
        });
        println!("{payload}");
        return Ok(());
    }

    println!("categories:");
    for (name, count) in &categories {
        println!("  {name:<22} {count}");
    }
    println!("source labels:");
    for (name, count) in &labels {
        println!("  {name:<22} {count}");
    }
    println!("notes:");
    for (name, count) in &notes {
        println!("  {name:<42} {count}");
    }
    println!("top discrepancies:");
    for g in &top_groups {
        println!(
            "  {:<24} {:>14.2} (uploaded {:.2}, source {})",
            g.key,
            g.discrepancy.unwrap_or(0.0),
            g.uploaded_total,
            fmt_opt(g.source_total),
        );
    }
    Ok(())
}

fn cmd_source_load(
    db: &Path,
    file: &Path,
    table: &str,
    connector_column: &str,
    sum_column: &str,
    header_row: usize,
) -> Result<(), CliError> {
    let parsed = reconcheck_tabular::parse_file(file, header_row)?;
    let connector_idx = parsed.column(connector_column).ok_or_else(|| {
        CliError::args(format!("column '{connector_column}' not found in {}", file.display()))
            .with_hint(format!("available columns: {}", parsed.headers.join(", ")))
    })?;
    let sum_idx = parsed.column(sum_column).ok_or_else(|| {
        CliError::args(format!("column '{sum_column}' not found in {}", file.display()))
            .with_hint(format!("available columns: {}", parsed.headers.join(", ")))
    })?;

    let mut rows: Vec<(String, f64)> = Vec::with_capacity(parsed.rows.len());
    for row in &parsed.rows {
        let connector = row.cells[connector_idx].display().trim().to_string();
        if connector.is_empty() {
            continue;
        }
        rows.push((connector, clean_number(&row.cells[sum_idx])));
    }

    let mut store = Store::open(db)?;
    let inserted = store.create_source_table(table, connector_column, sum_column, &rows)?;
    eprintln!("loaded {inserted} rows into '{table}'");
    Ok(())
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<ParseError> for CliError {
    fn from(err: ParseError) -> Self {
        let hint = match &err {
            ParseError::HeaderRowNotFound { .. } => {
                Some("use `rcheck preview` to find the header row".to_string())
            }
            ParseError::UnsupportedFormat(_) => {
                Some("supported formats: csv, xlsx, xls".to_string())
            }
            _ => None,
        };
        Self { code: EXIT_PARSE, message: err.to_string(), hint }
    }
}

impl From<ReconError> for CliError {
    fn from(err: ReconError) -> Self {
        let hint = match &err {
            ReconError::UnknownDocument { doc_type, doc_category } => Some(format!(
                "add a [documents.\"{doc_type}.{doc_category}\"] section to the config"
            )),
            _ => None,
        };
        Self { code: EXIT_CONFIG, message: err.to_string(), hint }
    }
}

impl From<StoreError> for CliError {
    fn from(err: StoreError) -> Self {
        let hint = match &err {
            StoreError::NoMappedRecords { .. } => {
                Some("ingest the file with `rcheck ingest` first".to_string())
            }
            StoreError::NoSourceData { table } => {
                Some(format!("load it with `rcheck source load --table {table} ...`"))
            }
            _ => None,
        };
        Self { code: store_exit_code(&err), message: err.to_string(), hint }
    }
}

impl From<PipelineError> for CliError {
    fn from(err: PipelineError) -> Self {
        let code = pipeline_exit_code(&err);
        let inner = match err {
            PipelineError::Parse(e) => CliError::from(e),
            PipelineError::Recon(e) => CliError::from(e),
            PipelineError::Store(e) => CliError::from(e),
        };
        CliError { code, ..inner }
    }
}

/// Spreadsheet-style column name for a 0-based index: A..Z, AA, AB, ...
fn column_letter(mut index: usize) -> String {
    let mut name = Vec::new();
    loop {
        name.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    name.reverse();
    String::from_utf8_lossy(&name).into_owned()
}

fn fmt_opt(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.2}"),
        None => "-".to_string(),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, CliError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| CliError { code: EXIT_ERROR, message: e.to_string(), hint: None })
}
