//! `reconcheck-store`: SQLite persistence for mapped records and validation
//! runs, the dual-mode result query layer, and the ingest/validate pipeline
//! that ties parsing, mapping, and the engine together.

pub mod db;
pub mod error;
pub mod pipeline;
pub mod query;
pub mod snapshot;

pub use db::{RunStatus, RunSummary, Store};
pub use error::StoreError;
pub use pipeline::{ingest, validate, IngestOutcome, IngestRequest, PipelineError, ValidateRequest};
pub use query::{Backing, GroupFilter, GroupView, Page, RunResults, SortDir, SortField};
