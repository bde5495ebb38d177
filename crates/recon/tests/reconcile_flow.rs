// End-to-end: raw CSV bytes → parsed table → mapped records → reconciliation.

use chrono::NaiveDate;

use reconcheck_recon::config::ConfigSet;
use reconcheck_recon::mapper::{map_rows, MapRequest};
use reconcheck_recon::model::{note, GroupCategory, SourceRecord, Verdict};
use reconcheck_recon::reconcile;
use reconcheck_tabular::csv::parse_bytes;

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

const UPLOAD: &[u8] = b"\
Invoice Number,Amount,Period
INV-1,\"$600.00\",Januari
INV-1,400,Januari
INV-2,100.04,Feb
INV-3,75,3
INV-4,0,4
INV-5,50,5
,12,6
";

fn source() -> Vec<SourceRecord> {
    let rows = [("INV-1", 1000.0), ("INV-2", 100.0), ("INV-3", 0.0), ("INV-5", 80.0)];
    rows.iter()
        .map(|&(c, v)| SourceRecord { connector: c.into(), sum_value: v })
        .collect()
}

#[test]
fn full_pass_classifies_every_group() {
    let config = ConfigSet::from_toml(CONFIG).unwrap();
    let doc = config.document("invoice", "monthly").unwrap();

    let table = parse_bytes(UPLOAD, 1).unwrap();
    let req = MapRequest {
        filename: "upload.csv",
        doc_type: "invoice",
        doc_category: "monthly",
        header_row: 1,
        reference_date: NaiveDate::from_ymd_opt(2026, 8, 26).unwrap(),
    };
    let mapped = map_rows(&table, doc, &req).unwrap();
    assert_eq!(mapped.records.len(), 6);
    assert_eq!(mapped.skipped.len(), 1, "blank connector row skipped");

    let outcome = reconcile(&mapped.records, &source(), config.tolerance_for(doc));

    // INV-1: 600 + 400 == 1000, exact.
    let g1 = outcome.groups.iter().find(|g| g.key == "INV-1").unwrap();
    assert_eq!(g1.verdict, Verdict::Matched);
    assert_eq!(g1.note.as_deref(), Some(note::EXACT));

    // INV-2: off by 0.04, inside the 0.05 tolerance.
    let g2 = outcome.groups.iter().find(|g| g.key == "INV-2").unwrap();
    assert_eq!(g2.verdict, Verdict::Matched);
    assert_eq!(g2.note.as_deref(), Some(note::ROUNDING));

    // INV-3: source side zero.
    let g3 = outcome.groups.iter().find(|g| g.key == "INV-3").unwrap();
    assert_eq!(g3.category, Some(GroupCategory::Missing));

    // INV-4: absent from source, uploaded zero: ignorable.
    let g4 = outcome.groups.iter().find(|g| g.key == "INV-4").unwrap();
    assert_eq!(g4.verdict, Verdict::Matched);
    assert_eq!(g4.note.as_deref(), Some(note::ZERO_ABSENT));

    // INV-5: 50 vs 80, beyond tolerance.
    let g5 = outcome.groups.iter().find(|g| g.key == "INV-5").unwrap();
    assert_eq!(g5.category, Some(GroupCategory::Discrepancy));
    assert_eq!(g5.difference, Some(-30.0));

    // 6 rows counted: INV-1 x2, INV-2, INV-4 matched; INV-3, INV-5 invalid.
    assert_eq!(outcome.total_records, 6);
    assert_eq!(outcome.matched_records, 4);
    assert_eq!(outcome.mismatched_records, 2);
    assert_eq!(outcome.score, 66.67);
}

#[test]
fn rerun_on_same_input_is_identical() {
    let config = ConfigSet::from_toml(CONFIG).unwrap();
    let doc = config.document("invoice", "monthly").unwrap();
    let table = parse_bytes(UPLOAD, 1).unwrap();
    let req = MapRequest {
        filename: "upload.csv",
        doc_type: "invoice",
        doc_category: "monthly",
        header_row: 1,
        reference_date: NaiveDate::from_ymd_opt(2026, 8, 26).unwrap(),
    };
    let mapped = map_rows(&table, doc, &req).unwrap();
    let a = reconcile(&mapped.records, &source(), 0.05);
    let b = reconcile(&mapped.records, &source(), 0.05);
    assert_eq!(a, b);
}
