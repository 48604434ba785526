//! Test harness for grid operations with event tracking.
//!
//! This module provides `GridHarness`, a wrapper around `Grid` that:
//! - Installs an `EventCollector` and exposes the accumulated events
//! - Offers shorthand for edits, imports, and validity assertions
//!
//! Use this harness to test engine invariants without an adapter layer.

use tokio_util::sync::CancellationToken;

use crate::column::Column;
use crate::config::GridConfig;
use crate::events::{EventCollector, GridEvent};
use crate::grid::Grid;
use crate::import::ImportRequest;
use crate::outcome::{GridResult, ImportReport};
use crate::row::{CellValue, RowId, RowRecord};

/// Name (text, required), Age (integer), Email (text).
pub fn person_columns() -> Vec<Column> {
    vec![
        Column::text("Name").with_required(true),
        Column::integer("Age"),
        Column::text("Email"),
    ]
}

pub fn person_record(name: &str, age: i64) -> RowRecord {
    RowRecord::new()
        .with_value("Name", CellValue::Text(name.into()))
        .with_value("Age", CellValue::Integer(age))
}

/// A grid with an installed event collector and convenience accessors.
pub struct GridHarness {
    pub grid: Grid,
    pub collector: EventCollector,
}

impl GridHarness {
    pub fn new(columns: Vec<Column>, config: GridConfig) -> Self {
        let collector = EventCollector::new();
        let grid = Grid::new(columns, config).with_event_callback(collector.callback());
        Self { grid, collector }
    }

    pub fn person(config: GridConfig) -> Self {
        Self::new(person_columns(), config)
    }

    /// Id of the row at `position`.
    pub fn row_id(&self, position: usize) -> RowId {
        self.grid.rows()[position].id
    }

    pub fn edit(&mut self, position: usize, column: &str, value: CellValue) {
        let id = self.row_id(position);
        self.grid.edit_cell(id, column, value).unwrap();
    }

    pub async fn import_replace(&mut self, records: Vec<RowRecord>) -> GridResult<ImportReport> {
        self.grid
            .import(&ImportRequest::replace(records), &CancellationToken::new())
            .await
    }

    /// All collected events so far.
    pub fn events(&self) -> Vec<GridEvent> {
        self.collector.events()
    }
}
