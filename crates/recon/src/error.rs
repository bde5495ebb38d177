use std::fmt;

#[derive(Debug)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (empty column name, bad table identifier, etc.).
    ConfigValidation(String),
    /// No `[documents."<type>.<category>"]` entry for the requested pair.
    UnknownDocument { doc_type: String, doc_category: String },
    /// A structurally required column is absent from the upload.
    MissingColumn { column: String },
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::UnknownDocument { doc_type, doc_category } => {
                write!(f, "no document configuration for '{doc_type}.{doc_category}'")
            }
            Self::MissingColumn { column } => {
                write!(f, "required column '{column}' not found in upload")
            }
        }
    }
}

impl std::error::Error for ReconError {}
