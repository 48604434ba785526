//! Bulk import of keyed records.
//!
//! Import applies records to the store in chunks, yielding between chunks
//! and honoring cancellation and the operation timeout. Failures are
//! per-record: a record naming an unknown column is counted and reported,
//! and the remaining records still apply. Interruption leaves already
//! applied records in place; the error carries the progress counts.
//!
//! Validation is not run here. The grid facade follows a completed import
//! with a batch validation pass and folds that report in.

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::GridConfig;
use crate::events::EventSink;
use crate::lifecycle::LifecycleManager;
use crate::outcome::{GridError, GridResult, ImportReport};
use crate::row::RowRecord;
use crate::store::DataStore;

/// How imported records combine with existing rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportMode {
    /// Insert the records as new rows after the existing data rows.
    #[default]
    Append,
    /// Drop every existing row, then insert the records.
    Replace,
    /// Write records onto existing rows starting at `start_row`, appending
    /// new rows once the records run past the end of the dataset.
    Overwrite,
}

/// One bulk-import request.
#[derive(Debug, Default)]
pub struct ImportRequest {
    pub mode: ImportMode,
    /// First target row position. Only meaningful in `Overwrite` mode.
    pub start_row: usize,
    pub records: Vec<RowRecord>,
}

impl ImportRequest {
    pub fn append(records: Vec<RowRecord>) -> Self {
        Self { mode: ImportMode::Append, start_row: 0, records }
    }

    pub fn replace(records: Vec<RowRecord>) -> Self {
        Self { mode: ImportMode::Replace, start_row: 0, records }
    }

    pub fn overwrite(start_row: usize, records: Vec<RowRecord>) -> Self {
        Self { mode: ImportMode::Overwrite, start_row, records }
    }
}

/// Apply an import request to the store. Returns the structural report; the
/// `validation` field is left empty for the caller to fill.
pub(crate) async fn apply(
    store: &mut DataStore,
    lifecycle: &LifecycleManager,
    config: &GridConfig,
    request: &ImportRequest,
    cancel: &CancellationToken,
    events: &mut EventSink,
) -> GridResult<ImportReport> {
    let started = Instant::now();
    let total = request.records.len();
    let mut report = ImportReport::default();

    if request.mode == ImportMode::Replace {
        store.remove_all_rows();
    }
    if request.mode == ImportMode::Overwrite && request.start_row > store.row_count() {
        return Err(GridError::IndexOutOfRange {
            index: request.start_row,
            row_count: store.row_count(),
        });
    }

    // Insert position for Append/Replace: after the existing data rows,
    // before the designated entry row.
    let mut insert_at = store.data_rows().len();

    let mut processed = 0usize;
    for chunk in request.records.chunks(config.chunk_size) {
        if cancel.is_cancelled() {
            return Err(GridError::OperationCancelled { processed, total });
        }
        if started.elapsed() > config.operation_timeout {
            return Err(GridError::OperationTimeout { processed, total });
        }

        for record in chunk {
            let index = processed;
            match request.mode {
                ImportMode::Append | ImportMode::Replace => {
                    match store.insert_records(insert_at, std::slice::from_ref(record)) {
                        Ok(_) => {
                            insert_at += 1;
                            report.inserted += 1;
                        }
                        Err(err) => {
                            report.failed += 1;
                            report.push_error(
                                config.error_report_cap,
                                format!("record {index}: {err}"),
                            );
                        }
                    }
                }
                ImportMode::Overwrite => {
                    overwrite_one(store, config, request.start_row + index, record, index, &mut report);
                }
            }
            processed += 1;
        }
        tokio::task::yield_now().await;
    }

    // Minimum padding first: the designated entry row must stay last.
    lifecycle.ensure_minimum(store, events);
    lifecycle.ensure_trailing_empty(store, events);
    debug!(
        inserted = report.inserted,
        overwritten = report.overwritten,
        failed = report.failed,
        "import applied"
    );
    Ok(report)
}

fn overwrite_one(
    store: &mut DataStore,
    config: &GridConfig,
    position: usize,
    record: &RowRecord,
    index: usize,
    report: &mut ImportReport,
) {
    if position >= store.row_count() {
        // Ran past the end: extend with a fresh row.
        match store.insert_records(store.row_count(), std::slice::from_ref(record)) {
            Ok(_) => report.inserted += 1,
            Err(err) => {
                report.failed += 1;
                report.push_error(config.error_report_cap, format!("record {index}: {err}"));
            }
        }
        return;
    }

    let row_id = store.rows()[position].id;
    let mut failed = false;
    for (column, value) in &record.values {
        if let Err(err) = store.mutate_cell(row_id, column, value.clone()) {
            failed = true;
            report.push_error(config.error_report_cap, format!("record {index}: {err}"));
        }
    }
    if record.checked.is_some() {
        // The row id came from the live index; setting the flag cannot fail.
        let _ = store.set_checked(row_id, record.checked);
    }
    if failed {
        report.failed += 1;
    } else {
        report.overwritten += 1;
    }
}
