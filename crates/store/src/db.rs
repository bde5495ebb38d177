//! SQLite persistence. One database holds mapped upload records, validation
//! runs, and the relational results tables; older databases may carry runs
//! whose results live only in the `results_json` snapshot column.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use reconcheck_recon::amount::clean_str;
use reconcheck_recon::model::{GroupCategory, ReconGroup, ReconOutcome, ReconRow, Verdict};
use reconcheck_recon::{MappedRecord, SourceRecord};

use crate::error::StoreError;
use crate::snapshot;

/// Mapped-record inserts are partitioned into transactions of this size.
pub const BATCH_SIZE: usize = 500;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS mapped_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename TEXT NOT NULL,
    doc_type TEXT NOT NULL,
    doc_category TEXT NOT NULL,
    header_row INTEGER NOT NULL,
    row_index INTEGER NOT NULL,
    raw_row TEXT NOT NULL,
    canonical TEXT NOT NULL,
    connector TEXT NOT NULL,
    sum_value REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_mapped_doc
    ON mapped_records(filename, doc_type, doc_category);

CREATE TABLE IF NOT EXISTS validation_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename TEXT NOT NULL,
    doc_type TEXT NOT NULL,
    doc_category TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'processing',
    total_records INTEGER NOT NULL DEFAULT 0,
    matched_records INTEGER NOT NULL DEFAULT 0,
    mismatched_records INTEGER NOT NULL DEFAULT 0,
    score REAL NOT NULL DEFAULT 0,
    results_json TEXT,
    created_at TEXT NOT NULL,
    UNIQUE(filename, doc_type, doc_category)
);

CREATE TABLE IF NOT EXISTS recon_groups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES validation_runs(id),
    group_key TEXT NOT NULL,
    uploaded_total REAL NOT NULL,
    source_total REAL,
    verdict TEXT NOT NULL,
    category TEXT,
    note TEXT,
    difference REAL,
    discrepancy REAL
);
CREATE INDEX IF NOT EXISTS idx_groups_run ON recon_groups(run_id);

CREATE TABLE IF NOT EXISTS recon_rows (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES validation_runs(id),
    row_index INTEGER NOT NULL,
    group_key TEXT NOT NULL,
    verdict TEXT NOT NULL,
    note TEXT
);
CREATE INDEX IF NOT EXISTS idx_rows_run ON recon_rows(run_id);
"#;

// ---------------------------------------------------------------------------
// Run model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Processing,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(StoreError::Corrupt(format!("unknown run status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub id: i64,
    pub filename: String,
    pub doc_type: String,
    pub doc_category: String,
    pub status: RunStatus,
    pub total_records: usize,
    pub matched_records: usize,
    pub mismatched_records: usize,
    pub score: f64,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    // -- mapped records -----------------------------------------------------

    /// Remove any previously stored rows for this document. Together with
    /// `insert_mapped` this makes re-ingest an idempotent replace.
    pub fn delete_mapped(
        &self,
        filename: &str,
        doc_type: &str,
        doc_category: &str,
    ) -> Result<usize, StoreError> {
        let deleted = self.conn.execute(
            "DELETE FROM mapped_records WHERE filename = ?1 AND doc_type = ?2 AND doc_category = ?3",
            params![filename, doc_type, doc_category],
        )?;
        Ok(deleted)
    }

    /// Insert records in batches of [`BATCH_SIZE`], one transaction per
    /// batch. The first failing batch aborts the whole operation; batches
    /// already committed stay in place, so callers must re-ingest after a
    /// failure.
    pub fn insert_mapped(&mut self, records: &[MappedRecord]) -> Result<usize, StoreError> {
        for (idx, chunk) in records.chunks(BATCH_SIZE).enumerate() {
            let batch = idx + 1;
            let tx = self.conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO mapped_records
                     (filename, doc_type, doc_category, header_row, row_index,
                      raw_row, canonical, connector, sum_value)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                )?;
                for r in chunk {
                    let raw_row = serde_json::to_string(&r.raw_row)
                        .map_err(|e| StoreError::Corrupt(e.to_string()))?;
                    let canonical = serde_json::to_string(&r.canonical)
                        .map_err(|e| StoreError::Corrupt(e.to_string()))?;
                    stmt.execute(params![
                        r.filename,
                        r.doc_type,
                        r.doc_category,
                        r.header_row as i64,
                        r.row_index as i64,
                        raw_row,
                        canonical,
                        r.connector,
                        r.sum_value,
                    ])
                    .map_err(|e| StoreError::BatchInsert { batch, message: e.to_string() })?;
                }
            }
            tx.commit()
                .map_err(|e| StoreError::BatchInsert { batch, message: e.to_string() })?;
        }
        Ok(records.len())
    }

    pub fn load_mapped(
        &self,
        filename: &str,
        doc_type: &str,
        doc_category: &str,
    ) -> Result<Vec<MappedRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT filename, doc_type, doc_category, header_row, row_index,
                    raw_row, canonical, connector, sum_value
             FROM mapped_records
             WHERE filename = ?1 AND doc_type = ?2 AND doc_category = ?3
             ORDER BY row_index",
        )?;
        let rows = stmt.query_map(params![filename, doc_type, doc_category], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, f64>(8)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (filename, doc_type, doc_category, header_row, row_index, raw_row, canonical, connector, sum_value) = row?;
            records.push(MappedRecord {
                filename,
                doc_type,
                doc_category,
                header_row: header_row as usize,
                row_index: row_index as usize,
                raw_row: serde_json::from_str(&raw_row)
                    .map_err(|e| StoreError::Corrupt(format!("raw_row: {e}")))?,
                canonical: serde_json::from_str(&canonical)
                    .map_err(|e| StoreError::Corrupt(format!("canonical: {e}")))?,
                connector,
                sum_value,
            });
        }
        Ok(records)
    }

    // -- source tables ------------------------------------------------------

    /// Read `(connector, amount)` pairs from a source-of-truth table. Column
    /// types are whatever the loader left behind, so values are coerced:
    /// numbers pass through, text goes through the amount cleaner.
    pub fn load_source(
        &self,
        table: &str,
        connector_col: &str,
        sum_col: &str,
    ) -> Result<Vec<SourceRecord>, StoreError> {
        check_identifier(table)?;
        check_identifier(connector_col)?;
        check_identifier(sum_col)?;

        let sql = format!("SELECT \"{connector_col}\", \"{sum_col}\" FROM \"{table}\"");
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|_| StoreError::NoSourceData { table: table.to_string() })?;

        let rows = stmt.query_map([], |row| {
            let connector = match row.get_ref(0)? {
                ValueRef::Null | ValueRef::Blob(_) => String::new(),
                ValueRef::Integer(i) => i.to_string(),
                ValueRef::Real(f) => {
                    if f.fract() == 0.0 && f.abs() < 1e15 {
                        format!("{}", f as i64)
                    } else {
                        format!("{f}")
                    }
                }
                ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
            };
            let sum_value = match row.get_ref(1)? {
                ValueRef::Null | ValueRef::Blob(_) => 0.0,
                ValueRef::Integer(i) => i as f64,
                ValueRef::Real(f) => f,
                ValueRef::Text(t) => clean_str(&String::from_utf8_lossy(t)),
            };
            Ok(SourceRecord { connector, sum_value })
        })?;

        let records: Vec<SourceRecord> = rows.collect::<Result<_, _>>()?;
        if records.is_empty() {
            return Err(StoreError::NoSourceData { table: table.to_string() });
        }
        Ok(records)
    }

    /// Provision (or replace) a source-of-truth table from loaded rows.
    pub fn create_source_table(
        &mut self,
        table: &str,
        connector_col: &str,
        sum_col: &str,
        rows: &[(String, f64)],
    ) -> Result<usize, StoreError> {
        check_identifier(table)?;
        check_identifier(connector_col)?;
        check_identifier(sum_col)?;

        let tx = self.conn.transaction()?;
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS \"{table}\";
             CREATE TABLE \"{table}\" (\"{connector_col}\" TEXT NOT NULL, \"{sum_col}\" REAL NOT NULL);"
        ))?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO \"{table}\" (\"{connector_col}\", \"{sum_col}\") VALUES (?1, ?2)"
            ))?;
            for (connector, sum) in rows {
                stmt.execute(params![connector, sum])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    // -- validation runs ----------------------------------------------------

    pub fn find_run(
        &self,
        filename: &str,
        doc_type: &str,
        doc_category: &str,
    ) -> Result<Option<RunSummary>, StoreError> {
        self.conn
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM validation_runs
                          WHERE filename = ?1 AND doc_type = ?2 AND doc_category = ?3"),
                params![filename, doc_type, doc_category],
                row_to_raw_run,
            )
            .optional()?
            .map(raw_to_run)
            .transpose()
    }

    pub fn create_run(
        &self,
        filename: &str,
        doc_type: &str,
        doc_category: &str,
        now: DateTime<Utc>,
    ) -> Result<RunSummary, StoreError> {
        self.conn.execute(
            "INSERT INTO validation_runs (filename, doc_type, doc_category, status, created_at)
             VALUES (?1, ?2, ?3, 'processing', ?4)",
            params![filename, doc_type, doc_category, now.to_rfc3339()],
        )?;
        self.get_run(self.conn.last_insert_rowid())
    }

    pub fn get_run(&self, id: i64) -> Result<RunSummary, StoreError> {
        self.conn
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM validation_runs WHERE id = ?1"),
                params![id],
                row_to_raw_run,
            )
            .optional()?
            .map(raw_to_run)
            .transpose()?
            .ok_or(StoreError::RunNotFound(id))
    }

    pub fn list_runs(&self) -> Result<Vec<RunSummary>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {RUN_COLUMNS} FROM validation_runs ORDER BY id"))?;
        let rows = stmt.query_map([], row_to_raw_run)?;
        let mut runs = Vec::new();
        for row in rows {
            runs.push(raw_to_run(row?)?);
        }
        Ok(runs)
    }

    pub fn mark_failed(&self, id: i64) -> Result<(), StoreError> {
        self.conn
            .execute("UPDATE validation_runs SET status = 'failed' WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Replace a run's results with a fresh engine outcome: old groups and
    /// rows go, the new set comes in, totals and score are updated, and any
    /// legacy snapshot is cleared, all in one transaction, so a re-validation
    /// either fully lands or leaves the previous results intact.
    pub fn replace_results(&mut self, run_id: i64, outcome: &ReconOutcome) -> Result<(), StoreError> {
        self.get_run(run_id)?;

        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM recon_groups WHERE run_id = ?1", params![run_id])?;
        tx.execute("DELETE FROM recon_rows WHERE run_id = ?1", params![run_id])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO recon_groups
                 (run_id, group_key, uploaded_total, source_total, verdict, category, note,
                  difference, discrepancy)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for g in &outcome.groups {
                stmt.execute(params![
                    run_id,
                    g.key,
                    g.uploaded_total,
                    g.source_total,
                    g.verdict.as_str(),
                    g.category.map(|c| c.as_str()),
                    g.note,
                    g.difference,
                    g.discrepancy,
                ])?;
            }
        }
        {
            let mut stmt = tx.prepare(
                "INSERT INTO recon_rows (run_id, row_index, group_key, verdict, note)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for r in &outcome.rows {
                stmt.execute(params![
                    run_id,
                    r.row_index as i64,
                    r.key,
                    r.verdict.as_str(),
                    r.note,
                ])?;
            }
        }
        tx.execute(
            "UPDATE validation_runs
             SET status = 'completed', total_records = ?2, matched_records = ?3,
                 mismatched_records = ?4, score = ?5, results_json = NULL
             WHERE id = ?1",
            params![
                run_id,
                outcome.total_records as i64,
                outcome.matched_records as i64,
                outcome.mismatched_records as i64,
                outcome.score,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    // -- results access -----------------------------------------------------

    /// Probed once per run by the query layer: true when results live in the
    /// relational tables, false when only a legacy snapshot (or nothing) is
    /// present.
    pub fn has_relational_data(&self, run_id: i64) -> Result<bool, StoreError> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM recon_groups WHERE run_id = ?1)",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(exists != 0)
    }

    pub fn load_groups(&self, run_id: i64) -> Result<Vec<ReconGroup>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT group_key, uploaded_total, source_total, verdict, category, note,
                    difference, discrepancy
             FROM recon_groups WHERE run_id = ?1 ORDER BY group_key",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, Option<f64>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<f64>>(6)?,
                row.get::<_, Option<f64>>(7)?,
            ))
        })?;

        let mut groups = Vec::new();
        for row in rows {
            let (key, uploaded_total, source_total, verdict, category, note, difference, discrepancy) = row?;
            groups.push(ReconGroup {
                key,
                uploaded_total,
                source_total,
                verdict: parse_verdict(&verdict)?,
                category: category.as_deref().map(parse_category).transpose()?,
                note,
                difference,
                discrepancy,
            });
        }
        Ok(groups)
    }

    pub fn load_rows(&self, run_id: i64) -> Result<Vec<ReconRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT row_index, group_key, verdict, note
             FROM recon_rows WHERE run_id = ?1 ORDER BY row_index",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (row_index, key, verdict, note) = row?;
            out.push(ReconRow {
                row_index: row_index as usize,
                key,
                verdict: parse_verdict(&verdict)?,
                note,
            });
        }
        Ok(out)
    }

    pub fn load_snapshot(&self, run_id: i64) -> Result<Option<String>, StoreError> {
        let json: Option<String> = self.conn.query_row(
            "SELECT results_json FROM validation_runs WHERE id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(json)
    }

    /// Write results in the legacy embedded form, leaving the relational
    /// tables untouched. Used when importing runs produced by older versions.
    pub fn save_snapshot(&self, run_id: i64, outcome: &ReconOutcome) -> Result<(), StoreError> {
        self.get_run(run_id)?;
        let json = snapshot::render(&outcome.groups, &outcome.rows)?;
        self.conn.execute(
            "UPDATE validation_runs
             SET status = 'completed', total_records = ?2, matched_records = ?3,
                 mismatched_records = ?4, score = ?5, results_json = ?6
             WHERE id = ?1",
            params![
                run_id,
                outcome.total_records as i64,
                outcome.matched_records as i64,
                outcome.mismatched_records as i64,
                outcome.score,
                json,
            ],
        )?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row conversion
// ---------------------------------------------------------------------------

const RUN_COLUMNS: &str = "id, filename, doc_type, doc_category, status, total_records, \
                           matched_records, mismatched_records, score, created_at";

type RawRun = (i64, String, String, String, String, i64, i64, i64, f64, String);

fn row_to_raw_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRun> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
    ))
}

fn raw_to_run(raw: RawRun) -> Result<RunSummary, StoreError> {
    let (id, filename, doc_type, doc_category, status, total, matched, mismatched, score, created_at) = raw;
    Ok(RunSummary {
        id,
        filename,
        doc_type,
        doc_category,
        status: RunStatus::parse(&status)?,
        total_records: total as usize,
        matched_records: matched as usize,
        mismatched_records: mismatched as usize,
        score,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| StoreError::Corrupt(format!("created_at: {e}")))?
            .with_timezone(&Utc),
    })
}

pub(crate) fn parse_verdict(s: &str) -> Result<Verdict, StoreError> {
    Verdict::parse(s).ok_or_else(|| StoreError::Corrupt(format!("unknown verdict '{s}'")))
}

pub(crate) fn parse_category(s: &str) -> Result<GroupCategory, StoreError> {
    GroupCategory::parse(s).ok_or_else(|| StoreError::Corrupt(format!("unknown category '{s}'")))
}

fn check_identifier(name: &str) -> Result<(), StoreError> {
    if reconcheck_recon::config::is_identifier(name) {
        Ok(())
    } else {
        Err(StoreError::BadIdentifier(name.to_string()))
    }
}
