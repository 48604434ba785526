use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Engine configuration, fixed at grid initialization for the session.
///
/// `minimum_rows` in particular cannot change mid-session; adjusting it
/// requires re-initializing the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    /// The dataset never shrinks below this row count. Deletes at the floor
    /// clear content in place instead of removing rows.
    pub minimum_rows: usize,
    /// Per-rule evaluation budget. An over-budget rule contributes a
    /// synthetic "Timeout" message at its declared severity.
    pub single_rule_timeout: Duration,
    /// Bound on an entire batch operation (import, bulk delete, batch
    /// validation). Exceeding it cancels outstanding chunks.
    pub operation_timeout: Duration,
    /// Rows processed between scheduler yields in batch operations.
    pub chunk_size: usize,
    /// Maximum per-row failure descriptions retained in an import report.
    pub error_report_cap: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            minimum_rows: 1,
            single_rule_timeout: Duration::from_secs(2),
            operation_timeout: Duration::from_secs(60),
            chunk_size: 1000,
            error_report_cap: 50,
        }
    }
}

impl GridConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_minimum_rows(mut self, minimum_rows: usize) -> Self {
        self.minimum_rows = minimum_rows;
        self
    }

    pub fn with_single_rule_timeout(mut self, timeout: Duration) -> Self {
        self.single_rule_timeout = timeout;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_error_report_cap(mut self, cap: usize) -> Self {
        self.error_report_cap = cap;
        self
    }
}
