//! Canonical row/column storage.
//!
//! The store is mechanism-only: it holds rows, hands out windowed slices,
//! and applies cell mutations, but row-lifecycle *policy* (smart delete,
//! trailing-row upkeep) lives in [`crate::lifecycle`], and it never calls
//! into the validation engine. Every mutation returns a
//! [`ChangeDescriptor`] that the caller feeds to the dependency graph;
//! the inversion keeps storage and validation acyclic.
//!
//! The trailing empty row is a *designated* row: only
//! [`DataStore::append_trailing_row`] creates one. Rows inserted by callers
//! are data rows even while empty, so the entry row is always distinct from
//! user data.

use rustc_hash::FxHashMap;

use crate::column::Column;
use crate::outcome::{GridError, GridResult};
use crate::row::{Cell, CellValue, DatasetView, Row, RowId, RowRecord, RowView};
use crate::rule::{RuleOutcome, Severity};

/// Label under which type-coercion failures are recorded on a cell.
pub const COERCION_RULE: &str = "type-coercion";

/// What a single cell mutation changed. Consumed by the dependency graph to
/// find impacted rules.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeDescriptor {
    pub row_id: RowId,
    pub column: String,
    pub old_value: CellValue,
    /// True if the new value could not be represented in the column type and
    /// collapsed to `Null` (recorded as a coercion outcome on the cell).
    pub coerced_to_null: bool,
}

/// The canonical row collection for one grid session.
#[derive(Debug, Default)]
pub struct DataStore {
    columns: Vec<Column>,
    col_index: FxHashMap<String, usize>,
    rows: Vec<Row>,
    row_index: FxHashMap<RowId, usize>,
    /// Next row id. Monotonic, never reused after removal.
    next_row_id: u64,
    /// The designated trailing empty row, if one exists.
    trailing_row: Option<RowId>,
    /// Count of rows holding at least one non-null value. Kept incrementally
    /// so the lifecycle manager's checks stay O(1) at 10M rows.
    populated_rows: usize,
}

impl DataStore {
    /// Create a store with the given column set.
    ///
    /// # Panics
    ///
    /// Panics if `columns` is empty or contains duplicate ids — both are
    /// caller contract violations, not runtime data conditions.
    pub fn new(columns: Vec<Column>) -> Self {
        assert!(!columns.is_empty(), "grid requires at least one column");
        let mut col_index = FxHashMap::default();
        for (pos, column) in columns.iter().enumerate() {
            let prev = col_index.insert(column.id.clone(), pos);
            assert!(prev.is_none(), "duplicate column id '{}'", column.id);
        }
        Self {
            columns,
            col_index,
            rows: Vec::new(),
            row_index: FxHashMap::default(),
            next_row_id: 1,
            trailing_row: None,
            populated_rows: 0,
        }
    }

    // =========================================================================
    // Read access
    // =========================================================================

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, id: &str) -> Option<&Column> {
        self.col_index.get(id).map(|&pos| &self.columns[pos])
    }

    pub fn column_position(&self, id: &str) -> Option<usize> {
        self.col_index.get(id).copied()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Rows holding at least one non-null value.
    pub fn non_empty_row_count(&self) -> usize {
        self.populated_rows
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, id: RowId) -> Option<&Row> {
        self.row_index.get(&id).map(|&pos| &self.rows[pos])
    }

    pub fn row_position(&self, id: RowId) -> Option<usize> {
        self.row_index.get(&id).copied()
    }

    /// True when the designated trailing empty row exists and sits last.
    pub fn has_trailing_empty(&self) -> bool {
        self.rows.last().map(|r| r.trailing).unwrap_or(false)
    }

    /// A contiguous window of rows. Never fails: indices beyond the dataset
    /// return fewer (possibly zero) rows, and no partial row is returned.
    pub fn window(&self, start: usize, count: usize) -> &[Row] {
        if start >= self.rows.len() {
            return &[];
        }
        let end = start.saturating_add(count).min(self.rows.len());
        &self.rows[start..end]
    }

    /// The data rows: everything except the designated trailing empty row.
    pub fn data_rows(&self) -> &[Row] {
        if self.has_trailing_empty() {
            &self.rows[..self.rows.len() - 1]
        } else {
            &self.rows[..]
        }
    }

    /// Dataset view for cross-row and dataset-level rules. Excludes the
    /// trailing empty row.
    pub fn dataset_view(&self) -> DatasetView<'_> {
        DatasetView {
            columns: &self.columns,
            col_index: &self.col_index,
            rows: self.data_rows(),
        }
    }

    /// Keyed view of one row by position.
    pub fn row_view(&self, position: usize) -> Option<RowView<'_>> {
        self.rows.get(position).map(|row| RowView {
            columns: &self.columns,
            col_index: &self.col_index,
            row,
        })
    }

    /// Keyed view of one row by id.
    pub fn row_view_by_id(&self, id: RowId) -> Option<RowView<'_>> {
        self.row_position(id).and_then(|pos| self.row_view(pos))
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Set one cell's value, coercing into the column's declared type.
    ///
    /// Fails only on stale ids. A type mismatch never fails: the value
    /// collapses to `Null` and a coercion outcome is recorded on the cell in
    /// place of the rule engine's annotations.
    pub fn mutate_cell(
        &mut self,
        row_id: RowId,
        column: &str,
        value: CellValue,
    ) -> GridResult<ChangeDescriptor> {
        let &row_pos = self
            .row_index
            .get(&row_id)
            .ok_or(GridError::RowNotFound(row_id))?;
        let &col_pos = self
            .col_index
            .get(column)
            .ok_or_else(|| GridError::ColumnNotFound(column.to_string()))?;

        let column_type = self.columns[col_pos].column_type;
        let coerced = value.coerce(column_type);

        let row = &mut self.rows[row_pos];
        let was_populated = row.is_non_empty();

        let cell = &mut row.cells[col_pos];
        let old_value = std::mem::replace(&mut cell.value, coerced.value);
        cell.dirty = true;
        cell.clear_outcomes_for(COERCION_RULE);
        if coerced.lossy {
            cell.outcomes.push(RuleOutcome::new(
                COERCION_RULE,
                Severity::Error,
                format!("value is not a valid {:?}", column_type),
            ));
        }

        let now_populated = row.is_non_empty();
        self.note_population_change(was_populated, now_populated);
        self.refresh_trailing();
        Ok(ChangeDescriptor {
            row_id,
            column: column.to_string(),
            old_value,
            coerced_to_null: coerced.lossy,
        })
    }

    /// Insert `count` empty data rows at `at`. Valid positions are
    /// `0..=row_count`.
    pub fn insert_empty_rows(&mut self, at: usize, count: usize) -> GridResult<Vec<RowId>> {
        if at > self.rows.len() {
            return Err(GridError::IndexOutOfRange {
                index: at,
                row_count: self.rows.len(),
            });
        }
        let mut ids = Vec::with_capacity(count);
        for offset in 0..count {
            let row = self.fresh_row();
            ids.push(row.id);
            self.rows.insert(at + offset, row);
        }
        self.reindex_from(at);
        self.refresh_trailing();
        Ok(ids)
    }

    /// Insert keyed records as new data rows at `at`. All-or-nothing for the
    /// single call: an unknown column in any record fails the whole insert
    /// before the store is touched. Returns the number of rows inserted.
    pub fn insert_records(&mut self, at: usize, records: &[RowRecord]) -> GridResult<usize> {
        if at > self.rows.len() {
            return Err(GridError::IndexOutOfRange {
                index: at,
                row_count: self.rows.len(),
            });
        }
        for record in records {
            for (column, _) in &record.values {
                if !self.col_index.contains_key(column) {
                    return Err(GridError::ColumnNotFound(column.clone()));
                }
            }
        }

        for (offset, record) in records.iter().enumerate() {
            let mut row = self.fresh_row();
            row.checked = record.checked;
            for (column, value) in &record.values {
                let col_pos = self.col_index[column];
                let coerced = value.clone().coerce(self.columns[col_pos].column_type);
                let cell = &mut row.cells[col_pos];
                cell.value = coerced.value;
                cell.dirty = true;
                if coerced.lossy {
                    cell.outcomes.push(RuleOutcome::new(
                        COERCION_RULE,
                        Severity::Error,
                        format!("value is not a valid {:?}", self.columns[col_pos].column_type),
                    ));
                }
            }
            if row.is_non_empty() {
                self.populated_rows += 1;
            }
            self.rows.insert(at + offset, row);
        }
        self.reindex_from(at);
        self.refresh_trailing();
        Ok(records.len())
    }

    /// Physically remove a row. Mechanism only: callers wanting the smart
    /// delete policy go through the lifecycle manager.
    pub fn take_row(&mut self, row_id: RowId) -> GridResult<Row> {
        let pos = self
            .row_index
            .remove(&row_id)
            .ok_or(GridError::RowNotFound(row_id))?;
        let row = self.rows.remove(pos);
        if row.is_non_empty() {
            self.populated_rows -= 1;
        }
        self.reindex_from(pos);
        self.refresh_trailing();
        Ok(row)
    }

    /// Wipe a row's content in place. The row keeps its id and position;
    /// values, outcomes, and the checked flag are all reset.
    pub fn clear_row(&mut self, row_id: RowId) -> GridResult<()> {
        let &pos = self
            .row_index
            .get(&row_id)
            .ok_or(GridError::RowNotFound(row_id))?;
        if self.rows[pos].is_non_empty() {
            self.populated_rows -= 1;
        }
        let column_count = self.columns.len();
        let row = &mut self.rows[pos];
        row.cells = vec![Cell::new(); column_count];
        row.outcomes.clear();
        row.checked = None;
        for cell in &mut row.cells {
            cell.dirty = true;
        }
        self.refresh_trailing();
        Ok(())
    }

    /// Remove every row. Ids are not reused afterwards.
    pub fn remove_all_rows(&mut self) {
        self.rows.clear();
        self.row_index.clear();
        self.trailing_row = None;
        self.populated_rows = 0;
    }

    /// Append one empty data row at the end.
    pub fn append_empty_row(&mut self) -> RowId {
        let row = self.fresh_row();
        let id = row.id;
        self.row_index.insert(id, self.rows.len());
        self.rows.push(row);
        self.refresh_trailing();
        id
    }

    /// Append and designate the trailing empty row. The previous designation
    /// (if any) is dropped.
    pub fn append_trailing_row(&mut self) -> RowId {
        if let Some(old) = self.trailing_row.take() {
            if let Some(row) = self.row_mut(old) {
                row.trailing = false;
            }
        }
        let mut row = self.fresh_row();
        row.trailing = true;
        let id = row.id;
        self.trailing_row = Some(id);
        self.row_index.insert(id, self.rows.len());
        self.rows.push(row);
        id
    }

    /// Store the import side-channel flag for a row.
    pub fn set_checked(&mut self, row_id: RowId, checked: Option<bool>) -> GridResult<()> {
        let &pos = self
            .row_index
            .get(&row_id)
            .ok_or(GridError::RowNotFound(row_id))?;
        self.rows[pos].checked = checked;
        Ok(())
    }

    /// Mutable access for the validation engine and lifecycle manager.
    pub(crate) fn rows_mut(&mut self) -> &mut [Row] {
        &mut self.rows
    }

    pub(crate) fn row_mut(&mut self, id: RowId) -> Option<&mut Row> {
        let pos = *self.row_index.get(&id)?;
        self.rows.get_mut(pos)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn fresh_row(&mut self) -> Row {
        let id = RowId(self.next_row_id);
        self.next_row_id += 1;
        Row::new(id, self.columns.len())
    }

    fn reindex_from(&mut self, position: usize) {
        for pos in position..self.rows.len() {
            self.row_index.insert(self.rows[pos].id, pos);
        }
    }

    fn note_population_change(&mut self, was: bool, now: bool) {
        match (was, now) {
            (false, true) => self.populated_rows += 1,
            (true, false) => self.populated_rows -= 1,
            _ => {}
        }
    }

    /// Drop the trailing designation if the designated row was removed,
    /// displaced from the end, or populated. O(1).
    fn refresh_trailing(&mut self) {
        let Some(id) = self.trailing_row else { return };
        let still_trailing = match (self.row_index.get(&id), self.rows.last()) {
            (Some(_), Some(last)) => last.id == id && !last.is_non_empty(),
            _ => false,
        };
        if !still_trailing {
            self.trailing_row = None;
            if let Some(row) = self.row_mut(id) {
                row.trailing = false;
            }
        }
    }
}
