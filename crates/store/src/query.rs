//! Read side of the result store.
//!
//! Results for a run may live in the relational tables (current writes) or
//! in a legacy embedded snapshot. `RunResults::load` probes which one backs
//! the run exactly once, normalizes either representation into one in-memory
//! model, and every query below is a pure function over that model, so both
//! representations share a single implementation. Evaluating filters and
//! aggregates in memory costs more than SQL would for huge runs; accepted,
//! runs are bounded by upload size.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;

use reconcheck_recon::model::{GroupCategory, ReconGroup, ReconRow, Verdict};
use reconcheck_recon::source_label;

use crate::db::{RunSummary, Store};
use crate::error::StoreError;
use crate::snapshot;

/// Which representation backed this load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Backing {
    Relational,
    Snapshot,
}

/// A group enriched with its derived source label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupView {
    pub key: String,
    pub uploaded_total: f64,
    pub source_total: Option<f64>,
    pub verdict: Verdict,
    pub category: Option<GroupCategory>,
    pub note: Option<String>,
    pub difference: Option<f64>,
    pub discrepancy: Option<f64>,
    pub source_label: &'static str,
}

impl GroupView {
    fn from_group(g: ReconGroup) -> Self {
        let label = source_label(g.category, g.uploaded_total, g.source_total, g.discrepancy);
        Self {
            key: g.key,
            uploaded_total: g.uploaded_total,
            source_total: g.source_total,
            verdict: g.verdict,
            category: g.category,
            note: g.note,
            difference: g.difference,
            discrepancy: g.discrepancy,
            source_label: label,
        }
    }
}

/// Normalized read model for one run.
#[derive(Debug)]
pub struct RunResults {
    pub run: RunSummary,
    pub backing: Backing,
    pub groups: Vec<GroupView>,
    pub rows: Vec<ReconRow>,
}

impl RunResults {
    pub fn load(store: &Store, run_id: i64) -> Result<Self, StoreError> {
        let run = store.get_run(run_id)?;
        let (backing, groups, rows) = if store.has_relational_data(run_id)? {
            (Backing::Relational, store.load_groups(run_id)?, store.load_rows(run_id)?)
        } else if let Some(json) = store.load_snapshot(run_id)? {
            let (groups, rows) = snapshot::parse(&json)?;
            (Backing::Snapshot, groups, rows)
        } else {
            // Run created but not yet validated.
            (Backing::Relational, Vec::new(), Vec::new())
        };
        Ok(Self {
            run,
            backing,
            groups: groups.into_iter().map(GroupView::from_group).collect(),
            rows,
        })
    }

    pub fn page_groups(
        &self,
        filter: &GroupFilter,
        sort: SortField,
        dir: SortDir,
        page: usize,
        per_page: usize,
        max_per_page: usize,
    ) -> Page<GroupView> {
        let mut items: Vec<GroupView> = self
            .groups
            .iter()
            .filter(|g| filter.matches(g))
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            let ord = sort.compare(a, b);
            let ord = match dir {
                SortDir::Asc => ord,
                SortDir::Desc => ord.reverse(),
            };
            // Stable tie-break so pagination never reshuffles equal values.
            ord.then_with(|| a.key.cmp(&b.key))
        });
        paginate(items, page, per_page, max_per_page)
    }

    pub fn page_rows(&self, page: usize, per_page: usize, max_per_page: usize) -> Page<ReconRow> {
        paginate(self.rows.clone(), page, per_page, max_per_page)
    }

    /// Invalid-group counts per category.
    pub fn category_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for g in &self.groups {
            if let Some(c) = g.category {
                *counts.entry(c.as_str().to_string()).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Invalid-group counts per derived source label.
    pub fn source_label_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for g in &self.groups {
            if g.verdict == Verdict::Invalid {
                *counts.entry(g.source_label.to_string()).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Group counts per note text.
    pub fn note_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for g in &self.groups {
            if let Some(note) = &g.note {
                *counts.entry(note.clone()).or_insert(0) += 1;
            }
        }
        counts
    }

    /// The `n` groups with the largest absolute discrepancy.
    pub fn top_discrepancies(&self, n: usize) -> Vec<GroupView> {
        let mut items: Vec<GroupView> = self
            .groups
            .iter()
            .filter(|g| g.discrepancy.is_some())
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            let a_abs = a.discrepancy.unwrap_or(0.0).abs();
            let b_abs = b.discrepancy.unwrap_or(0.0).abs();
            b_abs.total_cmp(&a_abs).then_with(|| a.key.cmp(&b.key))
        });
        items.truncate(n);
        items
    }
}

// ---------------------------------------------------------------------------
// Filter / sort / pagination
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone)]
pub struct GroupFilter {
    /// Case-insensitive substring match on the group key.
    pub search: Option<String>,
    pub category: Option<GroupCategory>,
    pub source_label: Option<String>,
    pub note: Option<String>,
}

impl GroupFilter {
    fn matches(&self, g: &GroupView) -> bool {
        if let Some(search) = &self.search {
            if !g.key.to_lowercase().contains(&search.to_lowercase()) {
                return false;
            }
        }
        if let Some(category) = self.category {
            if g.category != Some(category) {
                return false;
            }
        }
        if let Some(label) = &self.source_label {
            if g.source_label != label {
                return false;
            }
        }
        if let Some(note) = &self.note {
            if g.note.as_deref() != Some(note.as_str()) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Key,
    UploadedTotal,
    SourceTotal,
    Difference,
    Discrepancy,
    Category,
    Note,
    SourceLabel,
}

impl SortField {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "key" => Some(Self::Key),
            "uploaded_total" => Some(Self::UploadedTotal),
            "source_total" => Some(Self::SourceTotal),
            "difference" => Some(Self::Difference),
            "discrepancy" => Some(Self::Discrepancy),
            "category" => Some(Self::Category),
            "note" => Some(Self::Note),
            "source_label" => Some(Self::SourceLabel),
            _ => None,
        }
    }

    fn compare(self, a: &GroupView, b: &GroupView) -> Ordering {
        match self {
            Self::Key => a.key.cmp(&b.key),
            Self::UploadedTotal => a.uploaded_total.total_cmp(&b.uploaded_total),
            Self::SourceTotal => cmp_opt_f64(a.source_total, b.source_total),
            Self::Difference => cmp_opt_f64(a.difference, b.difference),
            Self::Discrepancy => cmp_opt_f64(a.discrepancy, b.discrepancy),
            Self::Category => {
                let a = a.category.map(|c| c.as_str()).unwrap_or("");
                let b = b.category.map(|c| c.as_str()).unwrap_or("");
                a.cmp(b)
            }
            Self::Note => a.note.as_deref().unwrap_or("").cmp(b.note.as_deref().unwrap_or("")),
            Self::SourceLabel => a.source_label.cmp(b.source_label),
        }
    }
}

/// None sorts before any value.
fn cmp_opt_f64(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.total_cmp(&b),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

impl SortDir {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

/// One page of results; 1-based page numbers, out-of-range pages are empty.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

fn paginate<T>(items: Vec<T>, page: usize, per_page: usize, max_per_page: usize) -> Page<T> {
    let per_page = per_page.clamp(1, max_per_page.max(1));
    let total_items = items.len();
    let total_pages = (total_items + per_page - 1) / per_page;
    if page == 0 || page > total_pages {
        return Page { items: Vec::new(), page, per_page, total_items, total_pages };
    }
    let start = (page - 1) * per_page;
    let items: Vec<T> = items.into_iter().skip(start).take(per_page).collect();
    Page { items, page, per_page, total_items, total_pages }
}

// ---------------------------------------------------------------------------
// Tests (pure model; database-backed coverage lives in tests/)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::RunStatus;
    use chrono::Utc;

    fn view(key: &str, uploaded: f64, source: Option<f64>, category: Option<GroupCategory>, discrepancy: Option<f64>) -> GroupView {
        let verdict = if category.is_some() { Verdict::Invalid } else { Verdict::Matched };
        GroupView::from_group(ReconGroup {
            key: key.into(),
            uploaded_total: uploaded,
            source_total: source,
            verdict,
            category,
            note: if category.is_none() { Some("exact match".into()) } else { None },
            difference: discrepancy,
            discrepancy,
        })
    }

    fn results(groups: Vec<GroupView>) -> RunResults {
        RunResults {
            run: RunSummary {
                id: 1,
                filename: "upload.csv".into(),
                doc_type: "invoice".into(),
                doc_category: "monthly".into(),
                status: RunStatus::Completed,
                total_records: groups.len(),
                matched_records: 0,
                mismatched_records: 0,
                score: 0.0,
                created_at: Utc::now(),
            },
            backing: Backing::Relational,
            groups,
            rows: Vec::new(),
        }
    }

    fn sample() -> RunResults {
        results(vec![
            view("INV-1", 100.0, Some(100.0), None, None),
            view("INV-2", 120.0, Some(100.0), Some(GroupCategory::Discrepancy), Some(20.0)),
            view("INV-3", 80.0, Some(100.0), Some(GroupCategory::Discrepancy), Some(-20.0)),
            view("INV-4", 55.0, None, Some(GroupCategory::ImInvalid), Some(55.0)),
            view("INV-5", 0.0, Some(10.0), Some(GroupCategory::Missing), None),
        ])
    }

    #[test]
    fn filter_by_category_and_search() {
        let r = sample();
        let filter = GroupFilter { category: Some(GroupCategory::Discrepancy), ..Default::default() };
        let page = r.page_groups(&filter, SortField::Key, SortDir::Asc, 1, 10, 100);
        assert_eq!(page.total_items, 2);

        let filter = GroupFilter { search: Some("inv-4".into()), ..Default::default() };
        let page = r.page_groups(&filter, SortField::Key, SortDir::Asc, 1, 10, 100);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].key, "INV-4");
    }

    #[test]
    fn filter_by_source_label() {
        let r = sample();
        let filter = GroupFilter { source_label: Some("from source file".into()), ..Default::default() };
        let page = r.page_groups(&filter, SortField::Key, SortDir::Asc, 1, 10, 100);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].key, "INV-2");

        let filter = GroupFilter { source_label: Some("not found in source".into()), ..Default::default() };
        let page = r.page_groups(&filter, SortField::Key, SortDir::Asc, 1, 10, 100);
        assert_eq!(page.items[0].key, "INV-4");
    }

    #[test]
    fn sort_by_discrepancy_desc_with_key_tiebreak() {
        let r = sample();
        let page = r.page_groups(&GroupFilter::default(), SortField::Discrepancy, SortDir::Desc, 1, 10, 100);
        let keys: Vec<&str> = page.items.iter().map(|g| g.key.as_str()).collect();
        // 55 > 20 > -20 > None(INV-1, INV-5 tie on key).
        assert_eq!(keys, vec!["INV-4", "INV-2", "INV-3", "INV-1", "INV-5"]);
    }

    #[test]
    fn pagination_clamps_and_bounds() {
        let r = sample();
        let page = r.page_groups(&GroupFilter::default(), SortField::Key, SortDir::Asc, 1, 500, 3);
        assert_eq!(page.per_page, 3, "per_page clamped to maximum");
        assert_eq!(page.items.len(), 3);
        assert_eq!(page.total_pages, 2);

        let page2 = r.page_groups(&GroupFilter::default(), SortField::Key, SortDir::Asc, 2, 3, 100);
        assert_eq!(page2.items.len(), 2);
        assert_eq!(page2.items[0].key, "INV-4");

        let out = r.page_groups(&GroupFilter::default(), SortField::Key, SortDir::Asc, 9, 3, 100);
        assert!(out.items.is_empty());
        assert_eq!(out.total_items, 5);

        let zero = r.page_groups(&GroupFilter::default(), SortField::Key, SortDir::Asc, 0, 3, 100);
        assert!(zero.items.is_empty());
    }

    #[test]
    fn aggregates() {
        let r = sample();
        let categories = r.category_counts();
        assert_eq!(categories["discrepancy"], 2);
        assert_eq!(categories["im_invalid"], 1);
        assert_eq!(categories["missing"], 1);

        let labels = r.source_label_counts();
        assert_eq!(labels["from source file"], 1);
        assert_eq!(labels["from uploaded file"], 1);
        assert_eq!(labels["not found in source"], 1);
        assert_eq!(labels["unknown"], 1);

        let notes = r.note_counts();
        assert_eq!(notes["exact match"], 1);

        let top = r.top_discrepancies(2);
        assert_eq!(top[0].key, "INV-4");
        assert_eq!(top[1].key, "INV-2");
    }
}
