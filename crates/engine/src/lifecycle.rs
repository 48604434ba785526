//! Row lifecycle policy: smart add/delete.
//!
//! The manager keeps two dataset invariants:
//!
//! 1. `row_count >= minimum_rows`, always.
//! 2. A designated trailing empty row (the data-entry row) sits last
//!    whenever the dataset holds any data. Rows inserted by callers are
//!    data rows even while empty, so the entry row is always appended
//!    fresh rather than recycled from user rows.
//!
//! The data store supplies the mechanisms (`take_row`, `clear_row`,
//! `append_trailing_row`); policy decisions live here.

use tracing::debug;

use crate::events::{EventSink, GridEvent, RowAdjustment};
use crate::outcome::{GridResult, RemovalOutcome};
use crate::row::RowId;
use crate::store::DataStore;

/// Applies the minimum-row and trailing-empty-row policy.
///
/// `minimum_rows` is fixed at grid initialization for the session; changing
/// it requires re-initializing the grid.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleManager {
    minimum_rows: usize,
}

impl LifecycleManager {
    pub fn new(minimum_rows: usize) -> Self {
        Self { minimum_rows }
    }

    pub fn minimum_rows(&self) -> usize {
        self.minimum_rows
    }

    /// Pad the dataset up to the minimum row count. Called at grid
    /// initialization and after structural operations that shrink the set.
    pub fn ensure_minimum(&self, store: &mut DataStore, events: &mut EventSink) {
        while store.row_count() < self.minimum_rows {
            let id = store.append_empty_row();
            debug!(row = id.0, "padded row to satisfy minimum");
            events.emit(GridEvent::RowInvariantAdjusted {
                adjustment: RowAdjustment::MinimumPadded,
                row: id,
            });
        }
    }

    /// Re-establish the trailing-empty invariant after a mutation. If the
    /// dataset holds data and no designated entry row sits last, a fresh one
    /// is appended. Returns the id of the appended row, if any.
    pub fn ensure_trailing_empty(
        &self,
        store: &mut DataStore,
        events: &mut EventSink,
    ) -> Option<RowId> {
        let needs = match store.rows().last() {
            Some(last) => !last.trailing && store.non_empty_row_count() > 0,
            None => store.non_empty_row_count() > 0,
        };
        if !needs {
            return None;
        }
        let id = store.append_trailing_row();
        debug!(row = id.0, "appended trailing empty row");
        events.emit(GridEvent::RowInvariantAdjusted {
            adjustment: RowAdjustment::TrailingAppended,
            row: id,
        });
        Some(id)
    }

    /// Remove a row under the smart-delete policy.
    ///
    /// Above the minimum-row floor the row is physically removed (and the
    /// trailing invariant re-established). At the floor, the row's content
    /// is cleared in place and the row count is unchanged.
    pub fn smart_remove(
        &self,
        store: &mut DataStore,
        row_id: RowId,
        events: &mut EventSink,
    ) -> GridResult<RemovalOutcome> {
        if store.row_count() > self.minimum_rows {
            store.take_row(row_id)?;
            debug!(row = row_id.0, "physically removed row");
            // Removing the entry row must not leave the dataset without one.
            self.ensure_trailing_empty(store, events);
            Ok(RemovalOutcome::PhysicallyRemoved)
        } else {
            store.clear_row(row_id)?;
            debug!(row = row_id.0, "cleared row content at minimum-row floor");
            events.emit(GridEvent::RowInvariantAdjusted {
                adjustment: RowAdjustment::ContentCleared,
                row: row_id,
            });
            Ok(RemovalOutcome::ContentCleared)
        }
    }
}
