//! The grid facade: one session over a column set.
//!
//! `Grid` wires the store, rule graph, validator, and lifecycle manager
//! together and is the only type most callers touch. Synchronous methods
//! cover the real-time editing path; composite operations (import, batch
//! validation, bulk delete) are async, chunked, and cancellable.
//!
//! All methods take `&mut self`; batch passes observe a stable snapshot
//! because no edit can interleave with them.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::column::Column;
use crate::config::GridConfig;
use crate::dep_graph::{RuleGraph, RuleId};
use crate::engine::{ValidationScope, Validator};
use crate::events::{EventCallback, EventSink, GridEvent};
use crate::import::{self, ImportRequest};
use crate::lifecycle::LifecycleManager;
use crate::outcome::{
    BatchReport, DeleteReport, GridError, GridResult, ImportReport, RemovalOutcome,
};
use crate::row::{CellValue, Row, RowId};
use crate::rule::{RuleOutcome, ValidationRule};
use crate::store::{ChangeDescriptor, DataStore};

/// A validating data grid session.
pub struct Grid {
    store: DataStore,
    rules: RuleGraph,
    validator: Validator,
    lifecycle: LifecycleManager,
    config: GridConfig,
    events: EventSink,
    /// Outcomes from dataset-level (Complex) rules and failed dataset-rule
    /// evaluations; not attached to any row.
    dataset_outcomes: Vec<RuleOutcome>,
}

impl Grid {
    /// Create a grid over the given columns.
    ///
    /// The dataset is padded to `minimum_rows`, and a not-null rule named
    /// `required:<column>` is auto-registered for every required column.
    pub fn new(columns: Vec<Column>, config: GridConfig) -> Self {
        let required: Vec<String> = columns
            .iter()
            .filter(|c| c.required)
            .map(|c| c.id.clone())
            .collect();

        let mut grid = Self {
            store: DataStore::new(columns),
            rules: RuleGraph::new(),
            validator: Validator::new(&config),
            lifecycle: LifecycleManager::new(config.minimum_rows),
            config,
            events: EventSink::new(),
            dataset_outcomes: Vec::new(),
        };
        for column in required {
            let rule = ValidationRule::single_cell(
                column.clone(),
                |value| !value.is_null(),
                format!("{column} is required"),
            )
            .with_name(format!("required:{column}"))
            .with_priority(0);
            // Names are derived from unique column ids; registration cannot
            // collide at construction time.
            let _ = grid.rules.register(rule);
        }
        grid.lifecycle.ensure_minimum(&mut grid.store, &mut grid.events);
        grid
    }

    pub fn with_event_callback(mut self, callback: EventCallback) -> Self {
        self.events.set_callback(callback);
        self
    }

    pub fn set_event_callback(&mut self, callback: EventCallback) {
        self.events.set_callback(callback);
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    // =========================================================================
    // Rules
    // =========================================================================

    pub fn register_rule(&mut self, rule: ValidationRule) -> GridResult<RuleId> {
        self.rules.register(rule)
    }

    /// Unregister a rule by name and sweep its outcomes from every row, so
    /// failures cannot outlive the rule that produced them.
    pub fn unregister_rule(&mut self, name: &str) -> Option<ValidationRule> {
        let rule = self.rules.unregister_by_name(name)?;
        self.sweep_rule_outcomes(name);
        Some(rule)
    }

    /// Unregister every rule reading any of the given columns (dataset-wide
    /// rules included) and sweep their outcomes. Returns the number removed.
    pub fn unregister_rules_for_columns(&mut self, columns: &[&str]) -> usize {
        let labels = self.rules.unregister_by_columns(columns);
        for label in &labels {
            self.sweep_rule_outcomes(label);
        }
        labels.len()
    }

    fn sweep_rule_outcomes(&mut self, label: &str) {
        for row in self.store.rows_mut() {
            row.clear_outcomes_for(label);
        }
        self.dataset_outcomes.retain(|o| o.rule != label);
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn columns(&self) -> &[Column] {
        self.store.columns()
    }

    pub fn row_count(&self) -> usize {
        self.store.row_count()
    }

    pub fn non_empty_row_count(&self) -> usize {
        self.store.non_empty_row_count()
    }

    pub fn row(&self, id: RowId) -> Option<&Row> {
        self.store.row(id)
    }

    pub fn rows(&self) -> &[Row] {
        self.store.rows()
    }

    /// A contiguous window of rows for display. Indices beyond the dataset
    /// yield fewer rows, never an error or a partial row.
    pub fn window(&self, start: usize, count: usize) -> &[Row] {
        self.store.window(start, count)
    }

    /// Outcomes from dataset-level rules, unattached to any row.
    pub fn dataset_outcomes(&self) -> &[RuleOutcome] {
        &self.dataset_outcomes
    }

    /// Human-readable summary of a row's outcomes, in column order.
    pub fn row_summary(&self, id: RowId) -> Option<String> {
        self.store.row(id).map(|row| row.summary(self.store.columns()))
    }

    /// True iff no row in scope and no dataset-level outcome carries an
    /// Error-severity outcome. Warnings and info never affect validity.
    pub fn dataset_valid(&self, scope: &ValidationScope) -> bool {
        self.validator.dataset_valid(&self.store, scope, &self.dataset_outcomes)
    }

    pub fn all_non_empty_rows_valid(&self) -> bool {
        self.dataset_valid(&ValidationScope::NonEmptyOnly)
    }

    // =========================================================================
    // Real-time editing
    // =========================================================================

    /// Edit one cell. The value is coerced into the column type, the
    /// trailing-row invariant is re-established, and the rules impacted by
    /// the change re-run synchronously on the edited row.
    pub fn edit_cell(
        &mut self,
        row_id: RowId,
        column: &str,
        value: CellValue,
    ) -> GridResult<ChangeDescriptor> {
        let meta = self
            .store
            .column(column)
            .ok_or_else(|| GridError::ColumnNotFound(column.to_string()))?;
        if meta.read_only {
            return Err(GridError::ReadOnlyColumn(column.to_string()));
        }

        let change = self.store.mutate_cell(row_id, column, value)?;
        self.lifecycle.ensure_trailing_empty(&mut self.store, &mut self.events);
        self.validator.validate_row_realtime(
            &mut self.store,
            &self.rules,
            row_id,
            &[column],
            &mut self.events,
        )?;
        Ok(change)
    }

    /// Set the import side-channel flag on a row.
    pub fn set_checked(&mut self, row_id: RowId, checked: Option<bool>) -> GridResult<()> {
        self.store.set_checked(row_id, checked)
    }

    /// Insert empty data rows at `at` (`0..=row_count`).
    pub fn insert_empty_rows(&mut self, at: usize, count: usize) -> GridResult<Vec<RowId>> {
        let ids = self.store.insert_empty_rows(at, count)?;
        self.lifecycle.ensure_trailing_empty(&mut self.store, &mut self.events);
        Ok(ids)
    }

    /// Remove one row under the smart-delete policy: physical removal above
    /// the minimum-row floor, content clear at it.
    pub fn remove_row(&mut self, row_id: RowId) -> GridResult<RemovalOutcome> {
        self.lifecycle.smart_remove(&mut self.store, row_id, &mut self.events)
    }

    // =========================================================================
    // Composite operations
    // =========================================================================

    /// Bulk-import keyed records, then batch-validate the dataset.
    ///
    /// Interruption (cancellation or operation timeout) leaves already
    /// applied records in place; the error carries progress counts.
    pub async fn import(
        &mut self,
        request: &ImportRequest,
        cancel: &CancellationToken,
    ) -> GridResult<ImportReport> {
        self.events.emit(GridEvent::OperationStarted { operation: "import" });
        let outcome: GridResult<ImportReport> = async {
            let mut report = import::apply(
                &mut self.store,
                &self.lifecycle,
                &self.config,
                request,
                cancel,
                &mut self.events,
            )
            .await?;
            report.validation = self.run_batch(cancel).await?;
            Ok(report)
        }
        .await;

        match &outcome {
            Ok(report) => {
                info!(
                    inserted = report.inserted,
                    overwritten = report.overwritten,
                    failed = report.failed,
                    "import finished"
                );
                self.events.emit(GridEvent::OperationSucceeded {
                    operation: "import",
                    rows: report.inserted + report.overwritten,
                });
            }
            Err(err) => self.events.emit(GridEvent::OperationFailed {
                operation: "import",
                error: err.to_string(),
            }),
        }
        outcome
    }

    /// Batch-validate every registered rule over the full dataset.
    pub async fn validate_all(&mut self, cancel: &CancellationToken) -> GridResult<BatchReport> {
        self.events.emit(GridEvent::OperationStarted { operation: "validate" });
        let outcome = self.run_batch(cancel).await;
        match &outcome {
            Ok(report) => {
                debug!(
                    rows = report.rows_processed,
                    timeouts = report.rules_timed_out,
                    "batch validation finished"
                );
                self.events.emit(GridEvent::OperationSucceeded {
                    operation: "validate",
                    rows: report.rows_processed,
                });
            }
            Err(err) => self.events.emit(GridEvent::OperationFailed {
                operation: "validate",
                error: err.to_string(),
            }),
        }
        outcome
    }

    /// Bulk delete under the smart-delete policy, then batch-validate.
    /// Stale ids are counted, not fatal.
    pub async fn delete_rows(
        &mut self,
        row_ids: &[RowId],
        cancel: &CancellationToken,
    ) -> GridResult<DeleteReport> {
        self.events.emit(GridEvent::OperationStarted { operation: "delete" });
        let outcome = self.delete_rows_inner(row_ids, cancel).await;
        match &outcome {
            Ok(report) => {
                info!(
                    removed = report.removed,
                    cleared = report.cleared,
                    missing = report.missing,
                    "bulk delete finished"
                );
                self.events.emit(GridEvent::OperationSucceeded {
                    operation: "delete",
                    rows: report.removed + report.cleared,
                });
            }
            Err(err) => self.events.emit(GridEvent::OperationFailed {
                operation: "delete",
                error: err.to_string(),
            }),
        }
        outcome
    }

    async fn delete_rows_inner(
        &mut self,
        row_ids: &[RowId],
        cancel: &CancellationToken,
    ) -> GridResult<DeleteReport> {
        let started = std::time::Instant::now();
        let total = row_ids.len();
        let mut report = DeleteReport::default();
        let mut processed = 0usize;

        for chunk in row_ids.chunks(self.config.chunk_size) {
            if cancel.is_cancelled() {
                return Err(GridError::OperationCancelled { processed, total });
            }
            if started.elapsed() > self.config.operation_timeout {
                return Err(GridError::OperationTimeout { processed, total });
            }
            for &row_id in chunk {
                match self.lifecycle.smart_remove(&mut self.store, row_id, &mut self.events) {
                    Ok(RemovalOutcome::PhysicallyRemoved) => report.removed += 1,
                    Ok(RemovalOutcome::ContentCleared) => report.cleared += 1,
                    Err(GridError::RowNotFound(_)) => report.missing += 1,
                    Err(err) => return Err(err),
                }
                processed += 1;
            }
            tokio::task::yield_now().await;
        }

        report.validation = self.run_batch(cancel).await?;
        Ok(report)
    }

    async fn run_batch(&mut self, cancel: &CancellationToken) -> GridResult<BatchReport> {
        let all = self.rules.all_rules();
        self.validator
            .validate_batch(
                &mut self.store,
                &self.rules,
                &all,
                &mut self.dataset_outcomes,
                cancel,
                &mut self.events,
            )
            .await
    }
}

impl std::fmt::Debug for Grid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Grid")
            .field("columns", &self.store.columns().len())
            .field("rows", &self.store.row_count())
            .field("rules", &self.rules.len())
            .finish()
    }
}
