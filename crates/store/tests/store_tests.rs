// Database-backed coverage: ingest/validate pipeline, run lifecycle, and
// snapshot-vs-relational query equivalence.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use chrono::{NaiveDate, TimeZone, Utc};
use tempfile::tempdir;

use reconcheck_recon::config::ConfigSet;
use reconcheck_recon::model::{GroupCategory, Verdict};
use reconcheck_recon::{reconcile, MappedRecord, SourceRecord};
use reconcheck_store::db::BATCH_SIZE;
use reconcheck_store::pipeline::{ingest, validate, IngestRequest, ValidateRequest};
use reconcheck_store::{Backing, GroupFilter, PipelineError, RunResults, RunStatus, SortDir, SortField, Store, StoreError};

const CONFIG: &str = r#"
[settings]
tolerance = 0.05

[documents."invoice.monthly"]
upload_connector_column = "Invoice Number"
source_connector_column = "invoice_no"
upload_sum_column = "Amount"
source_sum_column = "amount"
source_table = "source_invoices"
date_fields = ["period"]

[documents."invoice.monthly".column_mapping]
invoice_no = "Invoice Number"
period = "Period"
"#;

const UPLOAD: &str = "\
Invoice Number,Amount,Period
INV-1,\"$600.00\",Januari
INV-1,400,Januari
INV-2,100.04,Feb
INV-5,50,5
";

fn config() -> ConfigSet {
    ConfigSet::from_toml(CONFIG).unwrap()
}

fn seed_source(store: &mut Store) {
    let rows = vec![
        ("INV-1".to_string(), 1000.0),
        ("INV-2".to_string(), 100.0),
        ("INV-5".to_string(), 80.0),
    ];
    store
        .create_source_table("source_invoices", "invoice_no", "amount", &rows)
        .unwrap();
}

fn write_upload(dir: &std::path::Path) -> PathBuf {
    let path = dir.join("upload.csv");
    fs::write(&path, UPLOAD).unwrap();
    path
}

fn ingest_req<'a>(path: &'a std::path::Path, keep: bool) -> IngestRequest<'a> {
    IngestRequest {
        path,
        doc_type: "invoice",
        doc_category: "monthly",
        header_row: 1,
        keep_file: keep,
        reference_date: NaiveDate::from_ymd_opt(2026, 8, 26).unwrap(),
    }
}

fn validate_req() -> ValidateRequest<'static> {
    ValidateRequest {
        filename: "upload.csv",
        doc_type: "invoice",
        doc_category: "monthly",
        now: Utc.with_ymd_and_hms(2026, 8, 26, 12, 0, 0).unwrap(),
    }
}

fn record(connector: &str, sum: f64, row_index: usize) -> MappedRecord {
    MappedRecord {
        filename: "upload.csv".into(),
        doc_type: "invoice".into(),
        doc_category: "monthly".into(),
        header_row: 1,
        row_index,
        raw_row: BTreeMap::from([("Invoice Number".to_string(), connector.to_string())]),
        canonical: BTreeMap::from([("invoice_no".to_string(), Some(connector.to_string()))]),
        connector: connector.into(),
        sum_value: sum,
    }
}

#[test]
fn mapped_records_round_trip() {
    let mut store = Store::open_in_memory().unwrap();
    let records = vec![record("INV-1", 10.0, 2), record("INV-2", 20.0, 3)];
    assert_eq!(store.insert_mapped(&records).unwrap(), 2);

    let loaded = store.load_mapped("upload.csv", "invoice", "monthly").unwrap();
    assert_eq!(loaded, records);
}

#[test]
fn reingest_replaces_rather_than_appends() {
    let mut store = Store::open_in_memory().unwrap();
    store.insert_mapped(&[record("INV-1", 10.0, 2)]).unwrap();

    store.delete_mapped("upload.csv", "invoice", "monthly").unwrap();
    store.insert_mapped(&[record("INV-9", 99.0, 2)]).unwrap();

    let loaded = store.load_mapped("upload.csv", "invoice", "monthly").unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].connector, "INV-9");
}

#[test]
fn insert_spanning_multiple_batches() {
    let mut store = Store::open_in_memory().unwrap();
    let records: Vec<MappedRecord> = (0..BATCH_SIZE * 2 + 50)
        .map(|i| record(&format!("INV-{i}"), 1.0, i + 2))
        .collect();
    assert_eq!(store.insert_mapped(&records).unwrap(), records.len());
    let loaded = store.load_mapped("upload.csv", "invoice", "monthly").unwrap();
    assert_eq!(loaded.len(), records.len());
}

#[test]
fn failing_batch_aborts_but_keeps_earlier_batches() {
    let mut store = Store::open_in_memory().unwrap();

    // SQLite stores a NaN REAL as NULL, so a NaN sum trips the NOT NULL
    // constraint on sum_value. One full batch of good records first, then
    // the poisoned one in batch 2.
    let mut records: Vec<MappedRecord> = (0..BATCH_SIZE)
        .map(|i| record(&format!("INV-{i}"), 1.0, i + 2))
        .collect();
    records.push(record("INV-BAD", f64::NAN, BATCH_SIZE + 2));

    let err = store.insert_mapped(&records).unwrap_err();
    assert!(
        matches!(err, StoreError::BatchInsert { batch: 2, .. }),
        "expected batch 2 failure, got {err:?}"
    );

    // Batch 1 was already committed; the caller must re-ingest.
    let loaded = store.load_mapped("upload.csv", "invoice", "monthly").unwrap();
    assert_eq!(loaded.len(), BATCH_SIZE);
}

#[test]
fn load_source_coerces_and_rejects_bad_identifiers() {
    let mut store = Store::open_in_memory().unwrap();
    seed_source(&mut store);

    let source = store.load_source("source_invoices", "invoice_no", "amount").unwrap();
    assert_eq!(source.len(), 3);
    assert!(source.iter().any(|s| s.connector == "INV-1" && s.sum_value == 1000.0));

    assert!(matches!(
        store.load_source("source_invoices; drop", "invoice_no", "amount"),
        Err(StoreError::BadIdentifier(_))
    ));
    assert!(matches!(
        store.load_source("missing_table", "invoice_no", "amount"),
        Err(StoreError::NoSourceData { .. })
    ));
}

#[test]
fn ingest_then_validate_end_to_end() {
    let dir = tempdir().unwrap();
    let mut store = Store::open_in_memory().unwrap();
    seed_source(&mut store);
    let path = write_upload(dir.path());

    let outcome = ingest(&mut store, &config(), &ingest_req(&path, false)).unwrap();
    assert_eq!(outcome.filename, "upload.csv");
    assert_eq!(outcome.parsed_rows, 4);
    assert_eq!(outcome.inserted, 4);
    assert!(outcome.failed.is_empty());
    assert!(!path.exists(), "upload removed after successful ingest");

    let run = validate(&mut store, &config(), &validate_req()).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.total_records, 4);
    assert_eq!(run.matched_records, 3);
    assert_eq!(run.mismatched_records, 1);
    assert_eq!(run.score, 75.0);

    let results = RunResults::load(&store, run.id).unwrap();
    assert_eq!(results.backing, Backing::Relational);
    assert_eq!(results.groups.len(), 3);
    let inv5 = results.groups.iter().find(|g| g.key == "INV-5").unwrap();
    assert_eq!(inv5.category, Some(GroupCategory::Discrepancy));
    assert_eq!(inv5.source_label, "from uploaded file");
}

#[test]
fn revalidation_updates_the_same_run() {
    let dir = tempdir().unwrap();
    let mut store = Store::open_in_memory().unwrap();
    seed_source(&mut store);
    let path = write_upload(dir.path());

    ingest(&mut store, &config(), &ingest_req(&path, true)).unwrap();
    let first = validate(&mut store, &config(), &validate_req()).unwrap();
    let second = validate(&mut store, &config(), &validate_req()).unwrap();

    assert_eq!(first.id, second.id, "same run reused");
    assert_eq!(store.list_runs().unwrap().len(), 1);
    assert_eq!(first.score, second.score);

    // Results replaced, not duplicated.
    let results = RunResults::load(&store, second.id).unwrap();
    assert_eq!(results.groups.len(), 3);
    assert_eq!(results.rows.len(), 4);
}

#[test]
fn validate_without_ingest_marks_run_failed() {
    let mut store = Store::open_in_memory().unwrap();
    seed_source(&mut store);

    let err = validate(&mut store, &config(), &validate_req()).unwrap_err();
    assert!(matches!(err, PipelineError::Store(StoreError::NoMappedRecords { .. })));

    let runs = store.list_runs().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
}

#[test]
fn validate_with_empty_source_fails() {
    let dir = tempdir().unwrap();
    let mut store = Store::open_in_memory().unwrap();
    store
        .create_source_table("source_invoices", "invoice_no", "amount", &[])
        .unwrap();
    let path = write_upload(dir.path());
    ingest(&mut store, &config(), &ingest_req(&path, true)).unwrap();

    let err = validate(&mut store, &config(), &validate_req()).unwrap_err();
    assert!(matches!(err, PipelineError::Store(StoreError::NoSourceData { .. })));
}

#[test]
fn unknown_document_is_fatal_before_any_run_exists() {
    let dir = tempdir().unwrap();
    let mut store = Store::open_in_memory().unwrap();
    let path = write_upload(dir.path());

    let mut req = ingest_req(&path, true);
    req.doc_category = "weekly";
    let err = ingest(&mut store, &config(), &req).unwrap_err();
    assert!(matches!(err, PipelineError::Recon(_)));
    assert!(store.list_runs().unwrap().is_empty());
}

#[test]
fn snapshot_and_relational_backings_answer_queries_identically() {
    let mut store = Store::open_in_memory().unwrap();

    let mapped = vec![
        record("INV-1", 1000.0, 2),
        record("INV-2", 100.04, 3),
        record("INV-5", 50.0, 4),
        record("GHOST", 5.0, 5),
    ];
    let source = vec![
        SourceRecord { connector: "INV-1".into(), sum_value: 1000.0 },
        SourceRecord { connector: "INV-2".into(), sum_value: 100.0 },
        SourceRecord { connector: "INV-5".into(), sum_value: 80.0 },
    ];
    let outcome = reconcile(&mapped, &source, 0.05);

    let now = Utc.with_ymd_and_hms(2026, 8, 26, 12, 0, 0).unwrap();
    let relational = store.create_run("a.csv", "invoice", "monthly", now).unwrap();
    store.replace_results(relational.id, &outcome).unwrap();
    let legacy = store.create_run("b.csv", "invoice", "monthly", now).unwrap();
    store.save_snapshot(legacy.id, &outcome).unwrap();

    let a = RunResults::load(&store, relational.id).unwrap();
    let b = RunResults::load(&store, legacy.id).unwrap();
    assert_eq!(a.backing, Backing::Relational);
    assert_eq!(b.backing, Backing::Snapshot);

    assert_eq!(a.groups, b.groups);
    assert_eq!(a.rows, b.rows);
    assert_eq!(a.category_counts(), b.category_counts());
    assert_eq!(a.source_label_counts(), b.source_label_counts());
    assert_eq!(a.note_counts(), b.note_counts());

    let filter = GroupFilter::default();
    let pa = a.page_groups(&filter, SortField::Discrepancy, SortDir::Desc, 1, 2, 100);
    let pb = b.page_groups(&filter, SortField::Discrepancy, SortDir::Desc, 1, 2, 100);
    assert_eq!(pa.items, pb.items);
    assert_eq!(pa.total_pages, pb.total_pages);
}

#[test]
fn revalidating_a_legacy_run_promotes_it_to_relational() {
    let mut store = Store::open_in_memory().unwrap();
    seed_source(&mut store);
    store.insert_mapped(&[record("INV-1", 1000.0, 2)]).unwrap();

    let now = Utc.with_ymd_and_hms(2026, 8, 26, 12, 0, 0).unwrap();
    let run = store.create_run("upload.csv", "invoice", "monthly", now).unwrap();
    let outcome = reconcile(
        &[record("INV-1", 900.0, 2)],
        &[SourceRecord { connector: "INV-1".into(), sum_value: 1000.0 }],
        0.0,
    );
    store.save_snapshot(run.id, &outcome).unwrap();
    assert!(!store.has_relational_data(run.id).unwrap());

    let updated = validate(&mut store, &config(), &validate_req()).unwrap();
    assert_eq!(updated.id, run.id);
    assert!(store.has_relational_data(run.id).unwrap());
    assert_eq!(store.load_snapshot(run.id).unwrap(), None, "snapshot cleared");
    assert_eq!(updated.score, 100.0);
}

#[test]
fn get_run_unknown_id() {
    let store = Store::open_in_memory().unwrap();
    assert!(matches!(store.get_run(42), Err(StoreError::RunNotFound(42))));
}

#[test]
fn row_verdicts_persist() {
    let mut store = Store::open_in_memory().unwrap();
    let outcome = reconcile(
        &[record("INV-1", 10.0, 2), record("GHOST", 5.0, 3)],
        &[SourceRecord { connector: "INV-1".into(), sum_value: 10.0 }],
        0.0,
    );
    let now = Utc.with_ymd_and_hms(2026, 8, 26, 12, 0, 0).unwrap();
    let run = store.create_run("upload.csv", "invoice", "monthly", now).unwrap();
    store.replace_results(run.id, &outcome).unwrap();

    let rows = store.load_rows(run.id).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].verdict, Verdict::Matched);
    assert_eq!(rows[1].verdict, Verdict::Invalid);
    assert_eq!(rows[1].note.as_deref(), Some("im_invalid"));
}
