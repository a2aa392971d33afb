//! Classified failures of a sync run
//!
//! Everything else travels as `anyhow::Error`; these variants exist so the
//! pipeline can tell schema drift and empty batches apart from transport
//! failures via `downcast_ref`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    /// A named column is absent from the sheet's header row
    #[error("column '{column}' not found in header row {header_row} of '{sheet}'")]
    ColumnNotFound {
        sheet: String,
        column: String,
        header_row: u32,
    },

    /// A column span does not have the width the profile expects
    #[error("expected {expected} columns between '{start}' and '{end}' in '{sheet}', found {actual}")]
    ColumnCountMismatch {
        sheet: String,
        start: String,
        end: String,
        expected: usize,
        actual: usize,
    },

    /// A column declared formula-bearing holds no formula in the template row
    #[error("column '{column}' in '{sheet}' has no formula in the template row {row}")]
    FormulaProfileMismatch {
        sheet: String,
        column: String,
        row: u32,
    },

    /// The staging sheet has no rows flagged ready
    #[error("no staging rows with status '{status}' found in '{sheet}'")]
    NoReadyItems { sheet: String, status: String },

    /// Candidates already present while the profile forbids it
    #[error(
        "{count} candidate(s) already present in '{sheet}': {list}",
        count = .values.len(),
        list = .values.join(", ")
    )]
    DuplicateCandidates { sheet: String, values: Vec<String> },

    /// Retries against a rate-limited API ran out
    #[error("{operation} still rate limited after {attempts} attempts")]
    RateLimited { operation: String, attempts: u32 },
}

impl SyncError {
    /// Schema drift needs a human to fix the sheet; it never aborts other sheets
    pub fn is_schema_drift(&self) -> bool {
        matches!(
            self,
            SyncError::ColumnNotFound { .. }
                | SyncError::ColumnCountMismatch { .. }
                | SyncError::FormulaProfileMismatch { .. }
        )
    }

    /// Failures confined to one sheet: the other sheets still get synced
    pub fn is_sheet_local(&self) -> bool {
        self.is_schema_drift() || matches!(self, SyncError::DuplicateCandidates { .. })
    }
}

/// Whether an `anyhow` chain carries a schema drift error anywhere in it
pub fn is_schema_drift(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<SyncError>())
        .any(SyncError::is_schema_drift)
}

/// Whether an `anyhow` chain carries a failure that only concerns its sheet
pub fn is_sheet_local(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<SyncError>())
        .any(SyncError::is_sheet_local)
}
