use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::ReconError;

/// Global fallback when neither the document nor `[settings]` sets one.
pub const DEFAULT_TOLERANCE: f64 = 0.0;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ConfigSet {
    #[serde(default)]
    pub settings: Settings,
    /// Keyed by `"<doc_type>.<doc_category>"`.
    pub documents: BTreeMap<String, DocumentConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Workspace-wide tolerance, overridable per document.
    #[serde(default)]
    pub tolerance: Option<f64>,
    /// Upper bound for `per_page` in result listings.
    #[serde(default = "default_max_per_page")]
    pub max_per_page: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tolerance: None,
            max_per_page: default_max_per_page(),
        }
    }
}

fn default_max_per_page() -> usize {
    100
}

// ---------------------------------------------------------------------------
// Per-document config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentConfig {
    /// Upload header holding the grouping key.
    pub upload_connector_column: String,
    /// Source-table column holding the grouping key.
    pub source_connector_column: String,
    /// Upload header holding the amount to sum.
    pub upload_sum_column: String,
    /// Source-table column holding the amount to sum.
    pub source_sum_column: String,
    /// Source-of-truth table name (plain identifier).
    pub source_table: String,
    /// Per-document tolerance override.
    #[serde(default)]
    pub tolerance: Option<f64>,
    /// Canonical field → upload header.
    #[serde(default)]
    pub column_mapping: BTreeMap<String, String>,
    /// Canonical fields that get flexible date resolution.
    #[serde(default)]
    pub date_fields: Vec<String>,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ConfigSet {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ConfigSet =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &std::path::Path) -> Result<Self, ReconError> {
        let input = std::fs::read_to_string(path)
            .map_err(|e| ReconError::ConfigParse(format!("{}: {e}", path.display())))?;
        Self::from_toml(&input)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        for (name, doc) in &self.documents {
            let columns = [
                ("upload_connector_column", &doc.upload_connector_column),
                ("source_connector_column", &doc.source_connector_column),
                ("upload_sum_column", &doc.upload_sum_column),
                ("source_sum_column", &doc.source_sum_column),
            ];
            for (field, value) in columns {
                if value.trim().is_empty() {
                    return Err(ReconError::ConfigValidation(format!(
                        "document '{name}': {field} must not be empty"
                    )));
                }
            }
            if !is_identifier(&doc.source_table) {
                return Err(ReconError::ConfigValidation(format!(
                    "document '{name}': source_table '{}' is not a plain identifier",
                    doc.source_table
                )));
            }
            if let Some(t) = doc.tolerance {
                if t < 0.0 {
                    return Err(ReconError::ConfigValidation(format!(
                        "document '{name}': tolerance must be >= 0, got {t}"
                    )));
                }
            }
            for field in &doc.date_fields {
                if !doc.column_mapping.contains_key(field) {
                    return Err(ReconError::ConfigValidation(format!(
                        "document '{name}': date field '{field}' has no column_mapping entry"
                    )));
                }
            }
        }
        if let Some(t) = self.settings.tolerance {
            if t < 0.0 {
                return Err(ReconError::ConfigValidation(format!(
                    "settings.tolerance must be >= 0, got {t}"
                )));
            }
        }
        if self.settings.max_per_page == 0 {
            return Err(ReconError::ConfigValidation(
                "settings.max_per_page must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Look up the config for a document pair.
    pub fn document(&self, doc_type: &str, doc_category: &str) -> Result<&DocumentConfig, ReconError> {
        self.documents
            .get(&format!("{doc_type}.{doc_category}"))
            .ok_or_else(|| ReconError::UnknownDocument {
                doc_type: doc_type.to_string(),
                doc_category: doc_category.to_string(),
            })
    }

    /// Tolerance precedence: document override, then `[settings]`, then 0.0.
    pub fn tolerance_for(&self, doc: &DocumentConfig) -> f64 {
        doc.tolerance
            .or(self.settings.tolerance)
            .unwrap_or(DEFAULT_TOLERANCE)
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`. Table names are spliced into SQL quoted, but
/// only plain identifiers are accepted in the first place.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
