//! Validation rules.
//!
//! Rules are a tagged enum over typed predicate closures. Each kind declares
//! the shape of data it reads:
//!
//! - `SingleCell` — one column's value.
//! - `CrossColumn` — several columns of one row.
//! - `CrossRow` — the whole dataset, reporting failures per row.
//! - `Conditional` — a single-cell check gated by a row condition.
//! - `Complex` — the whole dataset, pass/fail.
//!
//! Rule names, when provided, are unique within a rule set; registration
//! rejects duplicates. Priority orders evaluation (ascending first), with
//! ties broken by registration order.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::row::{CellValue, DatasetView, RowId, RowView};

/// Outcome severity, ordered `Info < Warning < Error`. Aggregation takes the
/// maximum; only `Error` affects dataset validity queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A failing rule outcome attached to a cell or row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleOutcome {
    /// Label of the rule that produced this outcome. Unnamed rules get a
    /// stable synthesized label so re-validation replaces prior outcomes.
    pub rule: String,
    pub severity: Severity,
    pub message: String,
}

impl RuleOutcome {
    pub fn new(rule: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            severity,
            message: message.into(),
        }
    }
}

/// Predicate over a single cell value. Returns true when the value is valid.
pub type CellPredicate = Arc<dyn Fn(&CellValue) -> bool + Send + Sync>;

/// Predicate over one row. Returns true when the row is valid (for
/// `CrossColumn`) or when the gate condition holds (for `Conditional`).
pub type RowPredicate = Arc<dyn Fn(&RowView<'_>) -> bool + Send + Sync>;

/// Check over the whole dataset returning the ids of failing rows.
pub type CrossRowCheck = Arc<dyn Fn(&DatasetView<'_>) -> Vec<RowId> + Send + Sync>;

/// Pass/fail check over the whole dataset.
pub type DatasetCheck = Arc<dyn Fn(&DatasetView<'_>) -> bool + Send + Sync>;

/// The kind-specific payload of a validation rule.
#[derive(Clone)]
pub enum RuleKind {
    SingleCell {
        column: String,
        predicate: CellPredicate,
        /// Extra columns whose changes re-trigger this rule.
        depends_on: Vec<String>,
    },
    CrossColumn {
        columns: Vec<String>,
        predicate: RowPredicate,
    },
    CrossRow {
        check: CrossRowCheck,
    },
    Conditional {
        column: String,
        condition: RowPredicate,
        predicate: CellPredicate,
        /// Columns the condition reads, so their changes re-trigger the rule.
        depends_on: Vec<String>,
    },
    Complex {
        check: DatasetCheck,
    },
}

impl std::fmt::Debug for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleKind::SingleCell { column, depends_on, .. } => f
                .debug_struct("SingleCell")
                .field("column", column)
                .field("depends_on", depends_on)
                .finish_non_exhaustive(),
            RuleKind::CrossColumn { columns, .. } => f
                .debug_struct("CrossColumn")
                .field("columns", columns)
                .finish_non_exhaustive(),
            RuleKind::CrossRow { .. } => f.debug_struct("CrossRow").finish_non_exhaustive(),
            RuleKind::Conditional { column, depends_on, .. } => f
                .debug_struct("Conditional")
                .field("column", column)
                .field("depends_on", depends_on)
                .finish_non_exhaustive(),
            RuleKind::Complex { .. } => f.debug_struct("Complex").finish_non_exhaustive(),
        }
    }
}

/// A validation rule: kind-specific predicate plus shared metadata.
#[derive(Debug, Clone)]
pub struct ValidationRule {
    /// Optional unique name. Duplicate names are rejected at registration.
    pub name: Option<String>,
    /// Message shown when the rule fails.
    pub message: String,
    pub severity: Severity,
    /// Ascending priority runs first. Ties break by registration order.
    pub priority: i32,
    pub kind: RuleKind,
}

impl ValidationRule {
    fn with_kind(kind: RuleKind, message: impl Into<String>) -> Self {
        Self {
            name: None,
            message: message.into(),
            severity: Severity::Error,
            priority: 100,
            kind,
        }
    }

    /// A rule over a single column's value.
    pub fn single_cell<F>(column: impl Into<String>, predicate: F, message: impl Into<String>) -> Self
    where
        F: Fn(&CellValue) -> bool + Send + Sync + 'static,
    {
        Self::with_kind(
            RuleKind::SingleCell {
                column: column.into(),
                predicate: Arc::new(predicate),
                depends_on: Vec::new(),
            },
            message,
        )
    }

    /// A rule over several columns of one row.
    pub fn cross_column<F>(
        columns: Vec<String>,
        predicate: F,
        message: impl Into<String>,
    ) -> Self
    where
        F: Fn(&RowView<'_>) -> bool + Send + Sync + 'static,
    {
        Self::with_kind(
            RuleKind::CrossColumn {
                columns,
                predicate: Arc::new(predicate),
            },
            message,
        )
    }

    /// A dataset-wide rule that reports failing rows individually.
    pub fn cross_row<F>(check: F, message: impl Into<String>) -> Self
    where
        F: Fn(&DatasetView<'_>) -> Vec<RowId> + Send + Sync + 'static,
    {
        Self::with_kind(RuleKind::CrossRow { check: Arc::new(check) }, message)
    }

    /// A single-cell rule evaluated only when `condition` holds for the row.
    /// A false condition produces no outcome at all.
    pub fn conditional<C, F>(
        column: impl Into<String>,
        condition: C,
        predicate: F,
        message: impl Into<String>,
    ) -> Self
    where
        C: Fn(&RowView<'_>) -> bool + Send + Sync + 'static,
        F: Fn(&CellValue) -> bool + Send + Sync + 'static,
    {
        Self::with_kind(
            RuleKind::Conditional {
                column: column.into(),
                condition: Arc::new(condition),
                predicate: Arc::new(predicate),
                depends_on: Vec::new(),
            },
            message,
        )
    }

    /// A dataset-wide pass/fail rule.
    pub fn complex<F>(check: F, message: impl Into<String>) -> Self
    where
        F: Fn(&DatasetView<'_>) -> bool + Send + Sync + 'static,
    {
        Self::with_kind(RuleKind::Complex { check: Arc::new(check) }, message)
    }

    /// Set the rule's unique name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the rule's severity.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Set the rule's priority (ascending runs first).
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Declare extra column dependencies. Honored by `SingleCell` rules and
    /// by `Conditional` rules (whose gate condition may read other columns).
    /// Ignored for the remaining kinds: `CrossColumn` declares its columns
    /// structurally and the dataset-scoped kinds depend on every column.
    pub fn with_depends_on(mut self, columns: Vec<String>) -> Self {
        match &mut self.kind {
            RuleKind::SingleCell { depends_on, .. }
            | RuleKind::Conditional { depends_on, .. } => *depends_on = columns,
            _ => {}
        }
        self
    }

    /// The columns this rule reads. Empty for dataset-scoped kinds, which
    /// conservatively depend on every column.
    pub fn read_columns(&self) -> Vec<&str> {
        match &self.kind {
            RuleKind::SingleCell { column, depends_on, .. } => {
                let mut cols: Vec<&str> = vec![column.as_str()];
                cols.extend(depends_on.iter().map(|c| c.as_str()));
                cols
            }
            RuleKind::CrossColumn { columns, .. } => {
                columns.iter().map(|c| c.as_str()).collect()
            }
            RuleKind::Conditional { column, depends_on, .. } => {
                let mut cols: Vec<&str> = vec![column.as_str()];
                cols.extend(depends_on.iter().map(|c| c.as_str()));
                cols
            }
            RuleKind::CrossRow { .. } | RuleKind::Complex { .. } => Vec::new(),
        }
    }

    /// True for rules that scan the whole dataset. These are evaluated in
    /// batch passes only, never on the real-time path.
    pub fn is_dataset_scoped(&self) -> bool {
        matches!(self.kind, RuleKind::CrossRow { .. } | RuleKind::Complex { .. })
    }
}
