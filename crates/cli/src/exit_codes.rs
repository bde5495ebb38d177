//! CLI Exit Code Registry
//!
//! Single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! | Code | Meaning                                         |
//! |------|-------------------------------------------------|
//! | 0    | Success                                         |
//! | 1    | General error (unspecified)                     |
//! | 2    | CLI usage error (bad args, unknown sort field)  |
//! | 3    | Validation completed with mismatches            |
//! | 4    | Invalid or missing configuration                |
//! | 5    | Upload parse error                              |
//! | 6    | Store/runtime error (database, missing data)    |

use reconcheck_store::{PipelineError, StoreError};

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, unknown filter/sort values.
pub const EXIT_USAGE: u8 = 2;

/// Validation ran to completion but mismatches remain.
/// Like `diff(1)`, a nonzero exit here means "the sides differ", so CI can
/// gate on it.
pub const EXIT_MISMATCH: u8 = 3;

/// Configuration problem (parse failure, validation failure, unknown
/// document pair).
pub const EXIT_CONFIG: u8 = 4;

/// Upload could not be parsed (bad format, header row out of range).
pub const EXIT_PARSE: u8 = 5;

/// Store error: database failure, nothing ingested, empty source table.
pub const EXIT_STORE: u8 = 6;

/// Map a pipeline error to its exit code.
pub fn pipeline_exit_code(err: &PipelineError) -> u8 {
    match err {
        PipelineError::Parse(_) => EXIT_PARSE,
        PipelineError::Recon(_) => EXIT_CONFIG,
        PipelineError::Store(e) => store_exit_code(e),
    }
}

pub fn store_exit_code(err: &StoreError) -> u8 {
    match err {
        StoreError::BadIdentifier(_) => EXIT_USAGE,
        _ => EXIT_STORE,
    }
}
