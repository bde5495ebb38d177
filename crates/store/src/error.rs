use std::fmt;

#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQLite error.
    Sql(String),
    /// A batch insert failed; earlier batches stay committed.
    BatchInsert { batch: usize, message: String },
    /// No run with the given id.
    RunNotFound(i64),
    /// No mapped records stored for the requested document.
    NoMappedRecords { filename: String },
    /// The configured source table exists but returned no rows (or is absent).
    NoSourceData { table: String },
    /// Table or column name is not a plain identifier.
    BadIdentifier(String),
    /// Legacy snapshot blob could not be parsed.
    Snapshot(String),
    /// Stored value no current version understands.
    Corrupt(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sql(msg) => write!(f, "database error: {msg}"),
            Self::BatchInsert { batch, message } => {
                write!(f, "batch {batch} insert failed: {message}")
            }
            Self::RunNotFound(id) => write!(f, "validation run {id} not found"),
            Self::NoMappedRecords { filename } => {
                write!(f, "no mapped records stored for '{filename}' (ingest first)")
            }
            Self::NoSourceData { table } => {
                write!(f, "source table '{table}' has no data")
            }
            Self::BadIdentifier(name) => {
                write!(f, "'{name}' is not a valid table or column identifier")
            }
            Self::Snapshot(msg) => write!(f, "legacy results snapshot: {msg}"),
            Self::Corrupt(msg) => write!(f, "corrupt stored value: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Sql(e.to_string())
    }
}
