use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// A single upload row after column mapping. Immutable once persisted; the
/// engine only reads `connector` and `sum_value`, the rest is kept for
/// display and audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedRecord {
    pub filename: String,
    pub doc_type: String,
    pub doc_category: String,
    /// 1-based header row chosen at ingest time.
    pub header_row: usize,
    /// 1-based row number in the original file.
    pub row_index: usize,
    /// Original header → display value snapshot.
    pub raw_row: BTreeMap<String, String>,
    /// Canonical field → resolved value (None when blank or unresolvable).
    pub canonical: BTreeMap<String, Option<String>>,
    pub connector: String,
    pub sum_value: f64,
}

/// One `(connector, amount)` row from the configured source-of-truth table.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub connector: String,
    pub sum_value: f64,
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Matched,
    Invalid,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Matched => "matched",
            Self::Invalid => "invalid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "matched" => Some(Self::Matched),
            "invalid" => Some(Self::Invalid),
            _ => None,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an invalid group is invalid. Checked in this order by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupCategory {
    /// Key absent from the source with a nonzero uploaded total.
    ImInvalid,
    /// Both sides present but one total is zero.
    Missing,
    /// Difference beyond tolerance.
    Discrepancy,
}

impl GroupCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ImInvalid => "im_invalid",
            Self::Missing => "missing",
            Self::Discrepancy => "discrepancy",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "im_invalid" => Some(Self::ImInvalid),
            "missing" => Some(Self::Missing),
            "discrepancy" => Some(Self::Discrepancy),
            _ => None,
        }
    }
}

impl std::fmt::Display for GroupCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed note strings shared by the engine, legacy snapshots, and tests.
pub mod note {
    pub const EXACT: &str = "exact match";
    pub const ROUNDING: &str = "rounding";
    pub const ZERO_ABSENT: &str = "group absent from source but zero value";
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// One connector group's verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconGroup {
    pub key: String,
    pub uploaded_total: f64,
    /// None when the key is absent from the source.
    pub source_total: Option<f64>,
    pub verdict: Verdict,
    pub category: Option<GroupCategory>,
    pub note: Option<String>,
    /// `uploaded - source`, only when both sides were compared.
    pub difference: Option<f64>,
    /// The amount a reviewer has to explain; sign follows `difference`.
    pub discrepancy: Option<f64>,
}

/// One upload row's verdict, inherited from its group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconRow {
    pub row_index: usize,
    pub key: String,
    pub verdict: Verdict,
    pub note: Option<String>,
}

/// Full result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconOutcome {
    pub groups: Vec<ReconGroup>,
    pub rows: Vec<ReconRow>,
    pub total_records: usize,
    pub matched_records: usize,
    pub mismatched_records: usize,
    /// Percentage of matched rows, rounded to 2 decimals; 100.0 when empty.
    pub score: f64,
}
