//! `reconcheck-recon`: column mapping and tolerance-based comparison.
//!
//! Pure crate: receives parsed tables and source records, returns mapped
//! records and classified results. No IO, persistence, or CLI dependencies.

pub mod amount;
pub mod config;
pub mod engine;
pub mod error;
pub mod mapper;
pub mod model;

pub use config::{ConfigSet, DocumentConfig};
pub use engine::{reconcile, source_label};
pub use error::ReconError;
pub use mapper::{map_rows, MapOutcome, MapRequest};
pub use model::{MappedRecord, ReconGroup, ReconOutcome, ReconRow, SourceRecord};
