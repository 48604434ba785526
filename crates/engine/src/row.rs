//! Rows, cells, and typed value access.
//!
//! A row's identity is a monotonically increasing [`RowId`] assigned by the
//! data store and never reused within a session, even after the row is
//! physically removed. Dependency-graph and validation caches key on row ids,
//! so reuse would resurrect stale state.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::column::{Column, ColumnType};
use crate::rule::{RuleOutcome, Severity};

/// Stable row identity. Monotonic per session, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowId(pub u64);

impl std::fmt::Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "row {}", self.0)
    }
}

/// A typed cell value. `Null` is the default for every cell in a fresh row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Null,
    Text(String),
    Number(f64),
    Integer(i64),
    Bool(bool),
    /// Days since the Unix epoch.
    Date(i64),
}

impl Default for CellValue {
    fn default() -> Self {
        CellValue::Null
    }
}

/// Result of coercing a value into a column's declared type.
#[derive(Debug, Clone, PartialEq)]
pub struct Coerced {
    pub value: CellValue,
    /// True if the value could not be represented and collapsed to `Null`.
    pub lossy: bool,
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Render the value as display text.
    pub fn display(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            CellValue::Integer(n) => format!("{}", n),
            CellValue::Bool(b) => format!("{}", b),
            CellValue::Date(d) => format!("{}", d),
        }
    }

    /// Numeric view of the value, if it has one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Integer(n) => Some(*n as f64),
            CellValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Text view of the value. `None` only for `Null`.
    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Null => None,
            other => Some(other.display()),
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            CellValue::Integer(n) => Some(*n),
            CellValue::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            CellValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CellValue::Bool(b) => Some(*b),
            CellValue::Integer(0) => Some(false),
            CellValue::Integer(1) => Some(true),
            CellValue::Text(s) => match s.trim() {
                "true" | "TRUE" | "True" => Some(true),
                "false" | "FALSE" | "False" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Coerce the value into the column's declared type.
    ///
    /// Never fails: a value that cannot be represented becomes `Null` and the
    /// result is marked lossy so the caller can record a coercion failure.
    pub fn coerce(self, column_type: ColumnType) -> Coerced {
        if self.is_null() {
            return Coerced { value: CellValue::Null, lossy: false };
        }
        let coerced = match column_type {
            ColumnType::Text => Some(CellValue::Text(self.display())),
            ColumnType::Number => self.as_number().map(CellValue::Number),
            ColumnType::Integer => self.as_integer().map(CellValue::Integer),
            ColumnType::Boolean => self.as_bool().map(CellValue::Bool),
            ColumnType::Date => match &self {
                CellValue::Date(d) => Some(CellValue::Date(*d)),
                other => other.as_integer().map(CellValue::Date),
            },
        };
        match coerced {
            Some(value) => Coerced { value, lossy: false },
            None => Coerced { value: CellValue::Null, lossy: true },
        }
    }
}

/// A single cell: current value plus the validation outcomes attached to it.
///
/// Validation outcomes are written only by the validation engine (and the
/// store's own coercion bookkeeping); callers read them for presentation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cell {
    pub value: CellValue,
    /// Failing rule outcomes for this cell. Passing rules contribute nothing.
    pub outcomes: Vec<RuleOutcome>,
    /// Set when the value changes, cleared when validation settles.
    pub dirty: bool,
}

impl Cell {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cell's aggregated severity: the maximum among its outcomes.
    pub fn aggregated_severity(&self) -> Option<Severity> {
        self.outcomes.iter().map(|o| o.severity).max()
    }

    /// Remove outcomes recorded under the given rule label.
    pub fn clear_outcomes_for(&mut self, rule: &str) {
        self.outcomes.retain(|o| o.rule != rule);
    }
}

/// A row of cells, ordered by column position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Row {
    pub id: RowId,
    pub cells: Vec<Cell>,
    /// True when this is the single trailing empty row kept for data entry.
    /// The trailing row is exempt from validation and non-empty checks.
    pub trailing: bool,
    /// Row-level outcomes from cross-row rules (not tied to one cell).
    pub outcomes: Vec<RuleOutcome>,
    /// Per-row boolean side channel supplied by import adapters. Stored,
    /// never interpreted by the engine.
    pub checked: Option<bool>,
}

impl Row {
    pub fn new(id: RowId, column_count: usize) -> Self {
        Self {
            id,
            cells: vec![Cell::new(); column_count],
            trailing: false,
            outcomes: Vec::new(),
            checked: None,
        }
    }

    /// A row is non-empty iff at least one cell holds a non-null value.
    pub fn is_non_empty(&self) -> bool {
        self.cells.iter().any(|c| !c.value.is_null())
    }

    /// Maximum severity across row-level and cell-level outcomes.
    pub fn aggregated_severity(&self) -> Option<Severity> {
        self.outcomes
            .iter()
            .map(|o| o.severity)
            .chain(self.cells.iter().filter_map(|c| c.aggregated_severity()))
            .max()
    }

    /// True if any outcome on this row carries Error severity.
    pub fn has_error(&self) -> bool {
        self.aggregated_severity() == Some(Severity::Error)
    }

    /// Render the row's failure messages as `"<Column>: <message>"`, joined
    /// with `"; "`. Row-level outcomes use the rule's message unprefixed.
    pub fn summary(&self, columns: &[Column]) -> String {
        let mut parts: Vec<String> = Vec::new();
        for (cell, column) in self.cells.iter().zip(columns.iter()) {
            for outcome in &cell.outcomes {
                parts.push(format!("{}: {}", column.id, outcome.message));
            }
        }
        for outcome in &self.outcomes {
            parts.push(outcome.message.clone());
        }
        parts.join("; ")
    }

    /// Remove all outcomes (row- and cell-level) for the given rule label.
    pub fn clear_outcomes_for(&mut self, rule: &str) {
        self.outcomes.retain(|o| o.rule != rule);
        for cell in &mut self.cells {
            cell.clear_outcomes_for(rule);
        }
    }
}

/// A keyed row record supplied by import adapters: column id → value, plus
/// the optional checked side channel.
#[derive(Debug, Clone, Default)]
pub struct RowRecord {
    pub values: Vec<(String, CellValue)>,
    pub checked: Option<bool>,
}

impl RowRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, column: impl Into<String>, value: CellValue) -> Self {
        self.values.push((column.into(), value));
        self
    }

    pub fn with_checked(mut self, checked: bool) -> Self {
        self.checked = Some(checked);
        self
    }
}

const NULL_VALUE: CellValue = CellValue::Null;

/// Read-only keyed accessor over one row. Predicates receive this instead of
/// a loosely-typed map, so "any column, any type" access stays safe: a
/// missing column reads as `Null` rather than faulting.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    pub(crate) columns: &'a [Column],
    pub(crate) col_index: &'a FxHashMap<String, usize>,
    pub(crate) row: &'a Row,
}

impl<'a> RowView<'a> {
    pub fn row_id(&self) -> RowId {
        self.row.id
    }

    /// The value in the named column. `Null` if the column does not exist.
    pub fn get(&self, column: &str) -> &'a CellValue {
        match self.col_index.get(column) {
            Some(&pos) => &self.row.cells[pos].value,
            None => &NULL_VALUE,
        }
    }

    pub fn number(&self, column: &str) -> Option<f64> {
        self.get(column).as_number()
    }

    pub fn text(&self, column: &str) -> Option<String> {
        self.get(column).as_text()
    }

    pub fn integer(&self, column: &str) -> Option<i64> {
        self.get(column).as_integer()
    }

    pub fn boolean(&self, column: &str) -> Option<bool> {
        self.get(column).as_bool()
    }

    pub fn is_non_empty(&self) -> bool {
        self.row.is_non_empty()
    }

    pub fn columns(&self) -> &'a [Column] {
        self.columns
    }
}

/// Read-only view over the dataset's data rows (the trailing empty row is
/// excluded). Cross-row and dataset-level rules receive this.
#[derive(Debug, Clone, Copy)]
pub struct DatasetView<'a> {
    pub(crate) columns: &'a [Column],
    pub(crate) col_index: &'a FxHashMap<String, usize>,
    pub(crate) rows: &'a [Row],
}

impl<'a> DatasetView<'a> {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, index: usize) -> Option<RowView<'a>> {
        self.rows.get(index).map(|row| RowView {
            columns: self.columns,
            col_index: self.col_index,
            row,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = RowView<'a>> + '_ {
        self.rows.iter().map(|row| RowView {
            columns: self.columns,
            col_index: self.col_index,
            row,
        })
    }

    pub fn columns(&self) -> &'a [Column] {
        self.columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_text_to_number() {
        let c = CellValue::Text("42".into()).coerce(ColumnType::Number);
        assert_eq!(c.value, CellValue::Number(42.0));
        assert!(!c.lossy);
    }

    #[test]
    fn test_coerce_mismatch_is_lossy_null() {
        let c = CellValue::Text("abc".into()).coerce(ColumnType::Number);
        assert_eq!(c.value, CellValue::Null);
        assert!(c.lossy);
    }

    #[test]
    fn test_coerce_null_passes_through() {
        let c = CellValue::Null.coerce(ColumnType::Integer);
        assert_eq!(c.value, CellValue::Null);
        assert!(!c.lossy);
    }

    #[test]
    fn test_coerce_integer_column_rejects_fractional() {
        let c = CellValue::Number(3.5).coerce(ColumnType::Integer);
        assert_eq!(c.value, CellValue::Null);
        assert!(c.lossy);

        let c = CellValue::Number(3.0).coerce(ColumnType::Integer);
        assert_eq!(c.value, CellValue::Integer(3));
    }

    #[test]
    fn test_row_non_empty() {
        let mut row = Row::new(RowId(1), 2);
        assert!(!row.is_non_empty());
        row.cells[1].value = CellValue::Bool(false);
        assert!(row.is_non_empty());
    }

    #[test]
    fn test_cell_aggregated_severity_is_max() {
        let mut cell = Cell::new();
        cell.outcomes.push(RuleOutcome::new("a", Severity::Warning, "w"));
        cell.outcomes.push(RuleOutcome::new("b", Severity::Error, "e"));
        cell.outcomes.push(RuleOutcome::new("c", Severity::Info, "i"));
        assert_eq!(cell.aggregated_severity(), Some(Severity::Error));
    }

    #[test]
    fn test_row_summary_prefixes_column_names() {
        let columns = vec![Column::text("Name"), Column::integer("Age")];
        let mut row = Row::new(RowId(1), 2);
        row.cells[1]
            .outcomes
            .push(RuleOutcome::new("adult", Severity::Error, "must be adult"));
        assert_eq!(row.summary(&columns), "Age: must be adult");
    }
}
