//! Group aggregation and classification against the source of truth.

use std::collections::BTreeMap;

use crate::model::{
    note, GroupCategory, MappedRecord, ReconGroup, ReconOutcome, ReconRow, SourceRecord, Verdict,
};

/// Reconcile mapped upload records against source records.
///
/// Pure and deterministic: both sides are aggregated into BTreeMaps keyed by
/// trimmed connector (empty keys excluded), every uploaded key is classified
/// in order, and every contributing record inherits its group's verdict.
/// `|difference| <= tolerance` counts as matched (boundary inclusive).
pub fn reconcile(
    records: &[MappedRecord],
    source: &[SourceRecord],
    tolerance: f64,
) -> ReconOutcome {
    let mut uploaded: BTreeMap<String, f64> = BTreeMap::new();
    for r in records {
        let key = r.connector.trim();
        if key.is_empty() {
            continue;
        }
        *uploaded.entry(key.to_string()).or_insert(0.0) += r.sum_value;
    }

    let mut source_totals: BTreeMap<String, f64> = BTreeMap::new();
    for s in source {
        let key = s.connector.trim();
        if key.is_empty() {
            continue;
        }
        *source_totals.entry(key.to_string()).or_insert(0.0) += s.sum_value;
    }

    let mut groups = Vec::with_capacity(uploaded.len());
    for (key, &uploaded_total) in &uploaded {
        groups.push(classify(key, uploaded_total, source_totals.get(key).copied(), tolerance));
    }

    let by_key: BTreeMap<&str, &ReconGroup> =
        groups.iter().map(|g| (g.key.as_str(), g)).collect();

    let mut rows = Vec::new();
    let mut total_records = 0usize;
    let mut mismatched_records = 0usize;
    for r in records {
        let key = r.connector.trim();
        if key.is_empty() {
            continue;
        }
        // Every non-empty key was classified above.
        let Some(group) = by_key.get(key) else { continue };
        total_records += 1;
        let note = match group.verdict {
            Verdict::Matched => group.note.clone(),
            Verdict::Invalid => {
                mismatched_records += 1;
                group.category.map(|c| c.as_str().to_string())
            }
        };
        rows.push(ReconRow {
            row_index: r.row_index,
            key: key.to_string(),
            verdict: group.verdict,
            note,
        });
    }

    let matched_records = total_records - mismatched_records;
    let score = if total_records > 0 {
        round2(100.0 * matched_records as f64 / total_records as f64)
    } else {
        100.0
    };

    ReconOutcome {
        groups,
        rows,
        total_records,
        matched_records,
        mismatched_records,
        score,
    }
}

/// Classification order: absent-from-source first, then zero-sided, then the
/// tolerance comparison.
fn classify(key: &str, uploaded_total: f64, source_total: Option<f64>, tolerance: f64) -> ReconGroup {
    let base = ReconGroup {
        key: key.to_string(),
        uploaded_total,
        source_total,
        verdict: Verdict::Matched,
        category: None,
        note: None,
        difference: None,
        discrepancy: None,
    };

    let Some(source_total) = source_total else {
        if uploaded_total == 0.0 {
            // A key the source never saw, carrying no value: ignorable.
            return ReconGroup {
                note: Some(note::ZERO_ABSENT.to_string()),
                ..base
            };
        }
        return ReconGroup {
            verdict: Verdict::Invalid,
            category: Some(GroupCategory::ImInvalid),
            discrepancy: Some(uploaded_total),
            ..base
        };
    };

    if uploaded_total == 0.0 || source_total == 0.0 {
        return ReconGroup {
            verdict: Verdict::Invalid,
            category: Some(GroupCategory::Missing),
            ..base
        };
    }

    let difference = uploaded_total - source_total;
    if difference.abs() <= tolerance {
        let note = if difference == 0.0 { note::EXACT } else { note::ROUNDING };
        return ReconGroup {
            note: Some(note.to_string()),
            difference: Some(difference),
            ..base
        };
    }

    ReconGroup {
        verdict: Verdict::Invalid,
        category: Some(GroupCategory::Discrepancy),
        difference: Some(difference),
        discrepancy: Some(difference),
        ..base
    }
}

pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Which file a group's discrepancy points a reviewer at. Single shared
/// implementation; the query layer must use this, never re-derive.
pub fn source_label(
    category: Option<GroupCategory>,
    uploaded_total: f64,
    source_total: Option<f64>,
    discrepancy: Option<f64>,
) -> &'static str {
    if category == Some(GroupCategory::ImInvalid) {
        return "not found in source";
    }
    let source = source_total.unwrap_or(0.0);
    let disc = discrepancy.unwrap_or(0.0);
    if uploaded_total > source && disc > 0.0 {
        "from source file"
    } else if source > uploaded_total && disc < 0.0 {
        "from uploaded file"
    } else {
        "unknown"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
