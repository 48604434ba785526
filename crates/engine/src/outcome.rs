//! Uniform operation outcomes.
//!
//! Every fallible public operation returns [`GridResult`]; composite
//! operations (import, bulk delete, batch validation) additionally report
//! counts and capped error detail. Rust's `Result` combinators (`map`,
//! `and_then`, `?`) are the chaining layer; no bespoke monad is needed.
//!
//! Per-rule timeouts and predicate failures are *not* errors: they surface
//! as outcomes on the affected cells and never abort a pass.

use thiserror::Error;

use crate::row::RowId;

/// Expected failure conditions of grid operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("{0} not found")]
    RowNotFound(RowId),

    #[error("column '{0}' not found")]
    ColumnNotFound(String),

    #[error("a rule named '{0}' is already registered")]
    DuplicateRule(String),

    #[error("index {index} out of range (row count {row_count})")]
    IndexOutOfRange { index: usize, row_count: usize },

    #[error("column '{0}' is read-only")]
    ReadOnlyColumn(String),

    #[error("operation cancelled after {processed} of {total} rows")]
    OperationCancelled { processed: usize, total: usize },

    #[error("operation timed out after {processed} of {total} rows")]
    OperationTimeout { processed: usize, total: usize },
}

/// Result alias used by all fallible grid operations.
pub type GridResult<T> = Result<T, GridError>;

/// How a row removal was resolved by the smart-delete policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalOutcome {
    /// The row was physically removed from the dataset.
    PhysicallyRemoved,
    /// The minimum-row floor was reached; the row's content was cleared in
    /// place and the row retained.
    ContentCleared,
}

/// Report from a batch validation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    /// Data rows whose row-scoped rules completed.
    pub rows_processed: usize,
    /// Data rows in scope for the pass.
    pub rows_total: usize,
    /// Rules evaluated (row-scoped and dataset-scoped).
    pub rules_evaluated: usize,
    /// Rules that exceeded their per-rule budget at least once.
    pub rules_timed_out: usize,
}

impl BatchReport {
    /// True when every in-scope row was processed.
    pub fn is_complete(&self) -> bool {
        self.rows_processed == self.rows_total
    }
}

/// Report from a batch import.
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    /// Records applied as new rows.
    pub inserted: usize,
    /// Records applied onto existing rows (Overwrite mode).
    pub overwritten: usize,
    /// Records that could not be applied.
    pub failed: usize,
    /// First N failure descriptions, capped to bound memory.
    pub errors: Vec<String>,
    /// True when the error list was capped.
    pub errors_truncated: bool,
    /// The validation pass that followed the import.
    pub validation: BatchReport,
}

impl ImportReport {
    /// Record a failure description, respecting the error cap. The caller
    /// maintains the `failed` count (one record can produce several
    /// descriptions).
    pub(crate) fn push_error(&mut self, cap: usize, error: String) {
        if self.errors.len() < cap {
            self.errors.push(error);
        } else {
            self.errors_truncated = true;
        }
    }
}

/// Report from a bulk delete.
#[derive(Debug, Clone, Default)]
pub struct DeleteReport {
    pub removed: usize,
    pub cleared: usize,
    /// Row ids that were already stale when the delete ran.
    pub missing: usize,
    /// The validation pass that followed the delete.
    pub validation: BatchReport,
}
