//! Legacy embedded results. Before the relational tables existed, a run's
//! groups and rows were serialized as one JSON blob on the run record, with
//! shorter field names (`uploaded`/`source`/`status`/`diff`/`row`). This
//! module converts between that shape and the current model; nothing outside
//! the store reads the legacy names.

use serde::{Deserialize, Serialize};

use reconcheck_recon::model::{GroupCategory, ReconGroup, ReconRow};

use crate::db::{parse_category, parse_verdict};
use crate::error::StoreError;

#[derive(Debug, Serialize, Deserialize)]
struct LegacySnapshot {
    #[serde(default)]
    groups: Vec<LegacyGroup>,
    #[serde(default)]
    rows: Vec<LegacyRow>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LegacyGroup {
    key: String,
    uploaded: f64,
    #[serde(default)]
    source: Option<f64>,
    status: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    note: Option<String>,
    #[serde(default)]
    diff: Option<f64>,
    #[serde(default)]
    discrepancy: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LegacyRow {
    row: usize,
    key: String,
    status: String,
    #[serde(default)]
    note: Option<String>,
}

/// Parse a legacy blob into current-model groups and rows.
pub fn parse(json: &str) -> Result<(Vec<ReconGroup>, Vec<ReconRow>), StoreError> {
    let snapshot: LegacySnapshot =
        serde_json::from_str(json).map_err(|e| StoreError::Snapshot(e.to_string()))?;

    let mut groups = Vec::with_capacity(snapshot.groups.len());
    for g in snapshot.groups {
        groups.push(ReconGroup {
            key: g.key,
            uploaded_total: g.uploaded,
            source_total: g.source,
            verdict: parse_verdict(&g.status).map_err(snapshot_err)?,
            category: g.category.as_deref().map(parse_category).transpose().map_err(snapshot_err)?,
            note: g.note,
            difference: g.diff,
            discrepancy: g.discrepancy,
        });
    }

    let mut rows = Vec::with_capacity(snapshot.rows.len());
    for r in snapshot.rows {
        rows.push(ReconRow {
            row_index: r.row,
            key: r.key,
            verdict: parse_verdict(&r.status).map_err(snapshot_err)?,
            note: r.note,
        });
    }

    Ok((groups, rows))
}

/// Render current-model results in the legacy shape.
pub fn render(groups: &[ReconGroup], rows: &[ReconRow]) -> Result<String, StoreError> {
    let snapshot = LegacySnapshot {
        groups: groups
            .iter()
            .map(|g| LegacyGroup {
                key: g.key.clone(),
                uploaded: g.uploaded_total,
                source: g.source_total,
                status: g.verdict.as_str().to_string(),
                category: g.category.map(|c: GroupCategory| c.as_str().to_string()),
                note: g.note.clone(),
                diff: g.difference,
                discrepancy: g.discrepancy,
            })
            .collect(),
        rows: rows
            .iter()
            .map(|r| LegacyRow {
                row: r.row_index,
                key: r.key.clone(),
                status: r.verdict.as_str().to_string(),
                note: r.note.clone(),
            })
            .collect(),
    };
    serde_json::to_string(&snapshot).map_err(|e| StoreError::Snapshot(e.to_string()))
}

fn snapshot_err(e: StoreError) -> StoreError {
    StoreError::Snapshot(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcheck_recon::model::Verdict;

    #[test]
    fn round_trips_current_model() {
        let groups = vec![ReconGroup {
            key: "A".into(),
            uploaded_total: 120.0,
            source_total: Some(100.0),
            verdict: Verdict::Invalid,
            category: Some(GroupCategory::Discrepancy),
            note: None,
            difference: Some(20.0),
            discrepancy: Some(20.0),
        }];
        let rows = vec![ReconRow {
            row_index: 2,
            key: "A".into(),
            verdict: Verdict::Invalid,
            note: Some("discrepancy".into()),
        }];
        let json = render(&groups, &rows).unwrap();
        let (parsed_groups, parsed_rows) = parse(&json).unwrap();
        assert_eq!(parsed_groups, groups);
        assert_eq!(parsed_rows, rows);
    }

    #[test]
    fn parses_minimal_legacy_blob() {
        let json = r#"{"groups":[{"key":"X","uploaded":5.0,"status":"matched","note":"exact match"}],
                       "rows":[{"row":2,"key":"X","status":"matched"}]}"#;
        let (groups, rows) = parse(json).unwrap();
        assert_eq!(groups[0].source_total, None);
        assert_eq!(groups[0].verdict, Verdict::Matched);
        assert_eq!(rows[0].note, None);
    }

    #[test]
    fn rejects_unknown_status() {
        let json = r#"{"groups":[{"key":"X","uploaded":5.0,"status":"pending"}],"rows":[]}"#;
        assert!(matches!(parse(json), Err(StoreError::Snapshot(_))));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(parse("not json"), Err(StoreError::Snapshot(_))));
    }
}
