//! Rule execution: real-time and batch validation passes.
//!
//! Real-time runs row-scoped rules (single-cell, cross-column, conditional)
//! synchronously against the edited row. Batch runs every impacted rule over
//! the full dataset — never just the visible window — in chunks, yielding to
//! the caller's scheduler between chunks so cancellation and progress stay
//! responsive.
//!
//! Per-rule execution is guarded twice:
//!
//! - **Budget**: a rule whose evaluation exceeds `single_rule_timeout`
//!   contributes a synthetic "Timeout" message at its declared severity,
//!   replacing its own message. The budget is measured, not preemptive —
//!   the engine owns no threads to kill a runaway closure with.
//! - **Isolation**: a panicking predicate becomes a "Rule evaluation error"
//!   outcome at Error severity; the pass always continues.
//!
//! Validation never mutates data, only the outcome annotations on rows and
//! cells.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::GridConfig;
use crate::dep_graph::{RuleGraph, RuleId};
use crate::events::{EventSink, GridEvent};
use crate::outcome::{BatchReport, GridError, GridResult};
use crate::row::RowId;
use crate::rule::{RuleKind, RuleOutcome, Severity};
use crate::store::DataStore;

/// Which rows a dataset validity query covers. The trailing empty row is
/// always excluded.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationScope {
    /// Every data row.
    All,
    /// Rows holding at least one non-null value.
    NonEmptyOnly,
    /// An explicit row set (the engine owns no filter model; callers supply
    /// the filtered ids).
    Filtered(Vec<RowId>),
}

/// Executes rules against the store and merges outcomes into row/cell state.
#[derive(Debug, Clone)]
pub struct Validator {
    single_rule_timeout: Duration,
    operation_timeout: Duration,
    chunk_size: usize,
}

/// What one guarded rule invocation contributed.
enum Verdict {
    /// Predicate passed within budget: no outcome.
    Pass,
    /// An outcome to record.
    Outcome(RuleOutcome),
}

impl Validator {
    pub fn new(config: &GridConfig) -> Self {
        Self {
            single_rule_timeout: config.single_rule_timeout,
            operation_timeout: config.operation_timeout,
            chunk_size: config.chunk_size.max(1),
        }
    }

    // =========================================================================
    // Real-time pass
    // =========================================================================

    /// Validate one row after a cell edit. Runs the row-scoped rules
    /// impacted by `changed_columns`; dataset-scoped rules are deferred to
    /// the next batch pass. Returns the number of rules evaluated.
    pub fn validate_row_realtime(
        &self,
        store: &mut DataStore,
        graph: &RuleGraph,
        row_id: RowId,
        changed_columns: &[&str],
        events: &mut EventSink,
    ) -> GridResult<usize> {
        let pos = store
            .row_position(row_id)
            .ok_or(GridError::RowNotFound(row_id))?;
        let rules = graph.impacted_rules(changed_columns, false);
        let mut timeouts = 0usize;
        self.apply_row_rules(store, graph, &rules, pos, events, &mut timeouts);
        debug!(row = row_id.0, rules = rules.len(), "real-time validation settled");
        Ok(rules.len())
    }

    // =========================================================================
    // Batch pass
    // =========================================================================

    /// Validate the full dataset against the given rules, chunked and
    /// cancellable. Row-scoped rules run per row; dataset-scoped rules run
    /// once at the end over the whole (non-windowed) row set.
    ///
    /// On cancellation or operation timeout, already-written outcomes stay,
    /// unprocessed rows keep their stale state, and the error carries the
    /// processed/total counts.
    pub async fn validate_batch(
        &self,
        store: &mut DataStore,
        graph: &RuleGraph,
        rules: &[RuleId],
        dataset_outcomes: &mut Vec<RuleOutcome>,
        cancel: &CancellationToken,
        events: &mut EventSink,
    ) -> GridResult<BatchReport> {
        let row_scoped: Vec<RuleId> = rules
            .iter()
            .copied()
            .filter(|id| graph.get(*id).is_some_and(|r| !r.is_dataset_scoped()))
            .collect();
        let dataset_scoped: Vec<RuleId> = rules
            .iter()
            .copied()
            .filter(|id| graph.get(*id).is_some_and(|r| r.is_dataset_scoped()))
            .collect();

        let rows_total = store.data_rows().len();
        let started = Instant::now();
        let mut processed = 0usize;
        let mut timeouts = 0usize;

        let mut chunk_start = 0usize;
        while chunk_start < rows_total {
            if cancel.is_cancelled() {
                return Err(GridError::OperationCancelled { processed, total: rows_total });
            }
            if started.elapsed() > self.operation_timeout {
                return Err(GridError::OperationTimeout { processed, total: rows_total });
            }

            let chunk_end = (chunk_start + self.chunk_size).min(rows_total);
            for pos in chunk_start..chunk_end {
                self.apply_row_rules(store, graph, &row_scoped, pos, events, &mut timeouts);
                processed += 1;
            }
            chunk_start = chunk_end;

            // Yield between chunks so the scheduler can run cancellation
            // and progress observers.
            tokio::task::yield_now().await;
        }

        for id in &dataset_scoped {
            if cancel.is_cancelled() {
                return Err(GridError::OperationCancelled { processed, total: rows_total });
            }
            if started.elapsed() > self.operation_timeout {
                return Err(GridError::OperationTimeout { processed, total: rows_total });
            }
            self.apply_dataset_rule(store, graph, *id, dataset_outcomes, events, &mut timeouts);
        }

        Ok(BatchReport {
            rows_processed: processed,
            rows_total,
            rules_evaluated: rules.len(),
            rules_timed_out: timeouts,
        })
    }

    // =========================================================================
    // Validity queries
    // =========================================================================

    /// True iff no row in scope (and no dataset-level outcome) carries an
    /// Error-severity outcome. Warnings and info never affect the result.
    pub fn dataset_valid(
        &self,
        store: &DataStore,
        scope: &ValidationScope,
        dataset_outcomes: &[RuleOutcome],
    ) -> bool {
        if dataset_outcomes.iter().any(|o| o.severity == Severity::Error) {
            return false;
        }
        store
            .data_rows()
            .iter()
            .filter(|row| match scope {
                ValidationScope::All => true,
                ValidationScope::NonEmptyOnly => row.is_non_empty(),
                ValidationScope::Filtered(ids) => ids.contains(&row.id),
            })
            .all(|row| !row.has_error())
    }

    // =========================================================================
    // Rule execution
    // =========================================================================

    /// Evaluate the row-scoped `rules` against the row at `pos` and replace
    /// their outcomes on that row. The trailing empty row is exempt; fully
    /// empty rows get stale outcomes cleared but no evaluation.
    fn apply_row_rules(
        &self,
        store: &mut DataStore,
        graph: &RuleGraph,
        rules: &[RuleId],
        pos: usize,
        events: &mut EventSink,
        timeouts: &mut usize,
    ) {
        let (is_trailing, non_empty, row_id) = {
            let row = &store.rows()[pos];
            (row.trailing, row.is_non_empty(), row.id)
        };
        if is_trailing {
            return;
        }

        let labels: Vec<String> = rules.iter().map(|id| graph.label(*id)).collect();
        {
            let row = &mut store.rows_mut()[pos];
            for label in &labels {
                row.clear_outcomes_for(label);
            }
        }
        if !non_empty {
            // Empty rows don't participate in validation; settle them clean.
            for cell in &mut store.rows_mut()[pos].cells {
                cell.dirty = false;
            }
            return;
        }

        // Evaluate with an immutable view, then apply outcomes mutably.
        let mut pending: Vec<(Option<usize>, RuleOutcome)> = Vec::new();
        {
            let view = match store.row_view(pos) {
                Some(view) => view,
                None => return,
            };
            for (id, label) in rules.iter().zip(&labels) {
                let Some(rule) = graph.get(*id) else { continue };
                match &rule.kind {
                    RuleKind::SingleCell { column, predicate, .. } => {
                        let value = view.get(column);
                        let (result, elapsed) = self.guarded(|| predicate(value));
                        if let Verdict::Outcome(outcome) = self.verdict(
                            label,
                            rule.severity,
                            &rule.message,
                            Some(row_id),
                            result,
                            elapsed,
                            events,
                            timeouts,
                        ) {
                            pending.push((store.column_position(column), outcome));
                        }
                    }
                    RuleKind::CrossColumn { columns, predicate } => {
                        let (result, elapsed) = self.guarded(|| predicate(&view));
                        if let Verdict::Outcome(outcome) = self.verdict(
                            label,
                            rule.severity,
                            &rule.message,
                            Some(row_id),
                            result,
                            elapsed,
                            events,
                            timeouts,
                        ) {
                            // A cross-column failure marks every referenced
                            // column's cell.
                            let positions: Vec<usize> = columns
                                .iter()
                                .filter_map(|c| store.column_position(c))
                                .collect();
                            if positions.is_empty() {
                                pending.push((None, outcome));
                            } else {
                                for col_pos in positions {
                                    pending.push((Some(col_pos), outcome.clone()));
                                }
                            }
                        }
                    }
                    RuleKind::Conditional { column, condition, predicate, .. } => {
                        let (cond, cond_elapsed) = self.guarded(|| condition(&view));
                        match cond {
                            // A false condition produces no outcome at all.
                            Some(false) => {}
                            Some(true) => {
                                let value = view.get(column);
                                let (result, pred_elapsed) = self.guarded(|| predicate(value));
                                if let Verdict::Outcome(outcome) = self.verdict(
                                    label,
                                    rule.severity,
                                    &rule.message,
                                    Some(row_id),
                                    result,
                                    cond_elapsed + pred_elapsed,
                                    events,
                                    timeouts,
                                ) {
                                    pending.push((store.column_position(column), outcome));
                                }
                            }
                            None => {
                                pending.push((
                                    store.column_position(column),
                                    self.evaluation_error(label),
                                ));
                            }
                        }
                    }
                    // Dataset-scoped kinds never run on the row path.
                    RuleKind::CrossRow { .. } | RuleKind::Complex { .. } => {}
                }
            }
        }

        let row = &mut store.rows_mut()[pos];
        for (col_pos, outcome) in pending {
            match col_pos {
                Some(col_pos) => row.cells[col_pos].outcomes.push(outcome),
                None => row.outcomes.push(outcome),
            }
        }
        for cell in &mut row.cells {
            cell.dirty = false;
        }
    }

    /// Evaluate one dataset-scoped rule over the full data row set and
    /// replace its contributions everywhere.
    fn apply_dataset_rule(
        &self,
        store: &mut DataStore,
        graph: &RuleGraph,
        id: RuleId,
        dataset_outcomes: &mut Vec<RuleOutcome>,
        events: &mut EventSink,
        timeouts: &mut usize,
    ) {
        let Some(rule) = graph.get(id) else { return };
        let label = graph.label(id);

        dataset_outcomes.retain(|o| o.rule != label);
        for row in store.rows_mut() {
            row.clear_outcomes_for(&label);
        }

        match &rule.kind {
            RuleKind::CrossRow { check } => {
                let (result, elapsed) = {
                    let view = store.dataset_view();
                    self.guarded(|| check(&view))
                };
                match result {
                    None => dataset_outcomes.push(self.evaluation_error(&label)),
                    Some(failing) => {
                        let timed_out = elapsed > self.single_rule_timeout;
                        let message = if timed_out {
                            self.note_timeout(&label, None, elapsed, events, timeouts);
                            "Timeout".to_string()
                        } else {
                            rule.message.clone()
                        };
                        if failing.is_empty() {
                            if timed_out {
                                dataset_outcomes.push(RuleOutcome::new(
                                    label.clone(),
                                    rule.severity,
                                    message,
                                ));
                            }
                        } else {
                            let severity = rule.severity;
                            for row_id in failing {
                                if let Some(row) = store.row_mut(row_id) {
                                    if !row.trailing {
                                        row.outcomes.push(RuleOutcome::new(
                                            label.clone(),
                                            severity,
                                            message.clone(),
                                        ));
                                    }
                                }
                            }
                        }
                    }
                }
            }
            RuleKind::Complex { check } => {
                let (result, elapsed) = {
                    let view = store.dataset_view();
                    self.guarded(|| check(&view))
                };
                if let Verdict::Outcome(outcome) = self.verdict(
                    &label,
                    rule.severity,
                    &rule.message,
                    None,
                    result,
                    elapsed,
                    events,
                    timeouts,
                ) {
                    dataset_outcomes.push(outcome);
                }
            }
            _ => {}
        }
    }

    /// Run a predicate with panic isolation, measuring its duration.
    /// `None` means the predicate panicked.
    fn guarded<T>(&self, f: impl FnOnce() -> T) -> (Option<T>, Duration) {
        let start = Instant::now();
        let result = catch_unwind(AssertUnwindSafe(f)).ok();
        (result, start.elapsed())
    }

    /// Turn a guarded pass/fail result into the rule's contribution.
    #[allow(clippy::too_many_arguments)]
    fn verdict(
        &self,
        label: &str,
        severity: Severity,
        message: &str,
        row: Option<RowId>,
        result: Option<bool>,
        elapsed: Duration,
        events: &mut EventSink,
        timeouts: &mut usize,
    ) -> Verdict {
        match result {
            // Failure isolation: a panicking rule reads as a failed predicate
            // at Error severity, and the pass continues.
            None => Verdict::Outcome(self.evaluation_error(label)),
            Some(passed) => {
                if elapsed > self.single_rule_timeout {
                    self.note_timeout(label, row, elapsed, events, timeouts);
                    Verdict::Outcome(RuleOutcome::new(label, severity, "Timeout"))
                } else if passed {
                    Verdict::Pass
                } else {
                    Verdict::Outcome(RuleOutcome::new(label, severity, message))
                }
            }
        }
    }

    fn evaluation_error(&self, label: &str) -> RuleOutcome {
        RuleOutcome::new(
            label,
            Severity::Error,
            format!("Rule evaluation error: {}", label),
        )
    }

    fn note_timeout(
        &self,
        label: &str,
        row: Option<RowId>,
        elapsed: Duration,
        events: &mut EventSink,
        timeouts: &mut usize,
    ) {
        *timeouts += 1;
        warn!(rule = label, elapsed_ms = elapsed.as_millis() as u64, "rule exceeded budget");
        events.emit(GridEvent::RuleTimeout {
            rule: label.to_string(),
            row,
            elapsed_ms: elapsed.as_millis() as u64,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column;
    use crate::row::CellValue;
    use crate::rule::ValidationRule;

    fn setup() -> (DataStore, RuleGraph, Validator, EventSink) {
        let store = DataStore::new(vec![
            Column::text("Name"),
            Column::integer("Age"),
            Column::text("Email"),
        ]);
        (
            store,
            RuleGraph::new(),
            Validator::new(&GridConfig::default()),
            EventSink::new(),
        )
    }

    fn adult_rule() -> ValidationRule {
        ValidationRule::single_cell(
            "Age",
            |v| v.as_integer().map_or(true, |n| n >= 18),
            "must be adult",
        )
        .with_name("adult")
    }

    #[test]
    fn test_single_cell_failure_annotates_cell() {
        let (mut store, mut graph, validator, mut events) = setup();
        graph.register(adult_rule()).unwrap();
        let ids = store.insert_empty_rows(0, 1).unwrap();
        store.mutate_cell(ids[0], "Age", CellValue::Integer(15)).unwrap();

        validator
            .validate_row_realtime(&mut store, &graph, ids[0], &["Age"], &mut events)
            .unwrap();

        let row = store.row(ids[0]).unwrap();
        let cell = &row.cells[1];
        assert_eq!(cell.aggregated_severity(), Some(Severity::Error));
        assert_eq!(row.summary(store.columns()), "Age: must be adult");
        assert!(!cell.dirty);
    }

    #[test]
    fn test_passing_rule_contributes_nothing() {
        let (mut store, mut graph, validator, mut events) = setup();
        graph.register(adult_rule()).unwrap();
        let ids = store.insert_empty_rows(0, 1).unwrap();
        store.mutate_cell(ids[0], "Age", CellValue::Integer(30)).unwrap();

        validator
            .validate_row_realtime(&mut store, &graph, ids[0], &["Age"], &mut events)
            .unwrap();
        assert!(store.row(ids[0]).unwrap().cells[1].outcomes.is_empty());
    }

    #[test]
    fn test_revalidation_replaces_outcomes() {
        let (mut store, mut graph, validator, mut events) = setup();
        graph.register(adult_rule()).unwrap();
        let ids = store.insert_empty_rows(0, 1).unwrap();

        store.mutate_cell(ids[0], "Age", CellValue::Integer(15)).unwrap();
        validator
            .validate_row_realtime(&mut store, &graph, ids[0], &["Age"], &mut events)
            .unwrap();
        assert_eq!(store.row(ids[0]).unwrap().cells[1].outcomes.len(), 1);

        store.mutate_cell(ids[0], "Age", CellValue::Integer(21)).unwrap();
        validator
            .validate_row_realtime(&mut store, &graph, ids[0], &["Age"], &mut events)
            .unwrap();
        assert!(store.row(ids[0]).unwrap().cells[1].outcomes.is_empty());
    }

    #[test]
    fn test_aggregated_severity_error_beats_warning() {
        let (mut store, mut graph, validator, mut events) = setup();
        graph.register(adult_rule()).unwrap();
        graph
            .register(
                ValidationRule::single_cell(
                    "Age",
                    |v| v.as_integer().map_or(true, |n| n >= 21),
                    "under drinking age",
                )
                .with_name("drinking")
                .with_severity(Severity::Warning),
            )
            .unwrap();
        let ids = store.insert_empty_rows(0, 1).unwrap();
        store.mutate_cell(ids[0], "Age", CellValue::Integer(15)).unwrap();

        validator
            .validate_row_realtime(&mut store, &graph, ids[0], &["Age"], &mut events)
            .unwrap();
        let cell = &store.row(ids[0]).unwrap().cells[1];
        assert_eq!(cell.outcomes.len(), 2);
        assert_eq!(cell.aggregated_severity(), Some(Severity::Error));
    }

    #[test]
    fn test_panicking_rule_is_isolated() {
        let (mut store, mut graph, validator, mut events) = setup();
        graph
            .register(
                ValidationRule::single_cell("Age", |_| panic!("boom"), "unreachable")
                    .with_name("explosive"),
            )
            .unwrap();
        graph.register(adult_rule()).unwrap();
        let ids = store.insert_empty_rows(0, 1).unwrap();
        store.mutate_cell(ids[0], "Age", CellValue::Integer(15)).unwrap();

        // The pass must survive the panic and still run the second rule.
        validator
            .validate_row_realtime(&mut store, &graph, ids[0], &["Age"], &mut events)
            .unwrap();
        let cell = &store.row(ids[0]).unwrap().cells[1];
        assert_eq!(cell.outcomes.len(), 2);
        let boom = cell.outcomes.iter().find(|o| o.rule == "explosive").unwrap();
        assert_eq!(boom.severity, Severity::Error);
        assert_eq!(boom.message, "Rule evaluation error: explosive");
    }

    #[test]
    fn test_slow_rule_message_becomes_timeout() {
        let (mut store, mut graph, _, mut events) = setup();
        let validator = Validator::new(
            &GridConfig::default().with_single_rule_timeout(Duration::from_millis(50)),
        );
        graph
            .register(
                ValidationRule::single_cell(
                    "Age",
                    |_| {
                        std::thread::sleep(Duration::from_millis(200));
                        false
                    },
                    "original message",
                )
                .with_name("slow")
                .with_severity(Severity::Warning),
            )
            .unwrap();
        let ids = store.insert_empty_rows(0, 1).unwrap();
        store.mutate_cell(ids[0], "Age", CellValue::Integer(1)).unwrap();

        validator
            .validate_row_realtime(&mut store, &graph, ids[0], &["Age"], &mut events)
            .unwrap();
        let cell = &store.row(ids[0]).unwrap().cells[1];
        assert_eq!(cell.outcomes.len(), 1);
        // Synthetic message at the rule's declared severity.
        assert_eq!(cell.outcomes[0].message, "Timeout");
        assert_eq!(cell.outcomes[0].severity, Severity::Warning);
    }

    #[test]
    fn test_conditional_false_condition_no_outcome() {
        let (mut store, mut graph, validator, mut events) = setup();
        graph
            .register(
                ValidationRule::conditional(
                    "Email",
                    |row| row.integer("Age").map_or(false, |n| n >= 18),
                    |v| !v.is_null(),
                    "adults need an email",
                )
                .with_name("adult-email"),
            )
            .unwrap();
        let ids = store.insert_empty_rows(0, 1).unwrap();

        // Condition false: no outcome, not even a passed marker.
        store.mutate_cell(ids[0], "Age", CellValue::Integer(10)).unwrap();
        validator
            .validate_row_realtime(&mut store, &graph, ids[0], &["Email"], &mut events)
            .unwrap();
        assert!(store.row(ids[0]).unwrap().cells[2].outcomes.is_empty());

        // Condition true and inner predicate fails.
        store.mutate_cell(ids[0], "Age", CellValue::Integer(30)).unwrap();
        validator
            .validate_row_realtime(&mut store, &graph, ids[0], &["Email"], &mut events)
            .unwrap();
        let cell = &store.row(ids[0]).unwrap().cells[2];
        assert_eq!(cell.outcomes.len(), 1);
        assert_eq!(cell.outcomes[0].message, "adults need an email");
    }

    #[test]
    fn test_cross_column_marks_all_referenced_cells() {
        let (mut store, mut graph, validator, mut events) = setup();
        graph
            .register(
                ValidationRule::cross_column(
                    vec!["Name".into(), "Email".into()],
                    |row| row.text("Name").is_some() == row.text("Email").is_some(),
                    "name and email go together",
                )
                .with_name("pair"),
            )
            .unwrap();
        let ids = store.insert_empty_rows(0, 1).unwrap();
        store.mutate_cell(ids[0], "Name", CellValue::Text("ada".into())).unwrap();

        validator
            .validate_row_realtime(&mut store, &graph, ids[0], &["Name"], &mut events)
            .unwrap();
        let row = store.row(ids[0]).unwrap();
        assert_eq!(row.cells[0].outcomes.len(), 1);
        assert_eq!(row.cells[2].outcomes.len(), 1);
        assert_eq!(row.cells[1].outcomes.len(), 0);
    }

    #[test]
    fn test_empty_rows_are_not_evaluated() {
        let (mut store, mut graph, validator, mut events) = setup();
        graph
            .register(
                ValidationRule::single_cell("Name", |v| !v.is_null(), "required")
                    .with_name("name-required"),
            )
            .unwrap();
        let ids = store.insert_empty_rows(0, 1).unwrap();

        validator
            .validate_row_realtime(&mut store, &graph, ids[0], &["Name"], &mut events)
            .unwrap();
        // The row is empty, so the required rule does not fire.
        assert!(store.row(ids[0]).unwrap().cells[0].outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_batch_cross_row_uniqueness_recovers() {
        let (mut store, mut graph, validator, mut events) = setup();
        graph
            .register(
                ValidationRule::cross_row(
                    |data| {
                        let mut seen: std::collections::HashMap<String, Vec<RowId>> =
                            std::collections::HashMap::new();
                        for row in data.iter() {
                            if let Some(email) = row.text("Email") {
                                seen.entry(email).or_default().push(row.row_id());
                            }
                        }
                        seen.into_values().filter(|ids| ids.len() > 1).flatten().collect()
                    },
                    "duplicate email",
                )
                .with_name("unique-email"),
            )
            .unwrap();
        let ids = store.insert_empty_rows(0, 2).unwrap();
        store.mutate_cell(ids[0], "Email", CellValue::Text("a@x.com".into())).unwrap();
        store.mutate_cell(ids[1], "Email", CellValue::Text("a@x.com".into())).unwrap();

        let mut dataset_outcomes = Vec::new();
        let cancel = CancellationToken::new();
        let all = graph.all_rules();
        validator
            .validate_batch(&mut store, &graph, &all, &mut dataset_outcomes, &cancel, &mut events)
            .await
            .unwrap();

        assert!(store.row(ids[0]).unwrap().has_error());
        assert!(store.row(ids[1]).unwrap().has_error());

        // Fixing one email recovers both rows on the next pass.
        store.mutate_cell(ids[1], "Email", CellValue::Text("b@x.com".into())).unwrap();
        validator
            .validate_batch(&mut store, &graph, &all, &mut dataset_outcomes, &cancel, &mut events)
            .await
            .unwrap();
        assert!(!store.row(ids[0]).unwrap().has_error());
        assert!(!store.row(ids[1]).unwrap().has_error());
    }

    #[tokio::test]
    async fn test_batch_complex_rule_hits_dataset_outcomes() {
        let (mut store, mut graph, validator, mut events) = setup();
        graph
            .register(
                ValidationRule::complex(|data| data.len() <= 1, "too many rows")
                    .with_name("row-cap"),
            )
            .unwrap();
        let ids = store.insert_empty_rows(0, 2).unwrap();
        store.mutate_cell(ids[0], "Age", CellValue::Integer(1)).unwrap();
        store.mutate_cell(ids[1], "Age", CellValue::Integer(2)).unwrap();

        let mut dataset_outcomes = Vec::new();
        let cancel = CancellationToken::new();
        let all = graph.all_rules();
        validator
            .validate_batch(&mut store, &graph, &all, &mut dataset_outcomes, &cancel, &mut events)
            .await
            .unwrap();

        assert_eq!(dataset_outcomes.len(), 1);
        assert_eq!(dataset_outcomes[0].rule, "row-cap");
        assert!(!validator.dataset_valid(&store, &ValidationScope::All, &dataset_outcomes));
    }

    #[tokio::test]
    async fn test_batch_idempotent() {
        let (mut store, mut graph, validator, mut events) = setup();
        graph.register(adult_rule()).unwrap();
        let ids = store.insert_empty_rows(0, 3).unwrap();
        store.mutate_cell(ids[0], "Age", CellValue::Integer(15)).unwrap();
        store.mutate_cell(ids[1], "Age", CellValue::Integer(40)).unwrap();

        let mut dataset_outcomes = Vec::new();
        let cancel = CancellationToken::new();
        let all = graph.all_rules();
        validator
            .validate_batch(&mut store, &graph, &all, &mut dataset_outcomes, &cancel, &mut events)
            .await
            .unwrap();
        let snapshot: Vec<_> = store.rows().iter().map(|r| r.clone()).collect();

        validator
            .validate_batch(&mut store, &graph, &all, &mut dataset_outcomes, &cancel, &mut events)
            .await
            .unwrap();
        for (before, after) in snapshot.iter().zip(store.rows()) {
            assert_eq!(before.outcomes, after.outcomes);
            for (b, a) in before.cells.iter().zip(&after.cells) {
                assert_eq!(b.outcomes, a.outcomes);
            }
        }
    }

    #[test]
    fn test_conditional_depends_on_retriggers_from_gate_column() {
        let (mut store, mut graph, validator, mut events) = setup();
        graph
            .register(
                ValidationRule::conditional(
                    "Email",
                    |row| row.integer("Age").map_or(false, |n| n >= 18),
                    |v| !v.is_null(),
                    "adults need an email",
                )
                .with_name("adult-email")
                .with_depends_on(vec!["Age".into()]),
            )
            .unwrap();
        let ids = store.insert_empty_rows(0, 1).unwrap();

        // Editing the gate column alone re-runs the rule.
        store.mutate_cell(ids[0], "Age", CellValue::Integer(30)).unwrap();
        validator
            .validate_row_realtime(&mut store, &graph, ids[0], &["Age"], &mut events)
            .unwrap();
        let cell = &store.row(ids[0]).unwrap().cells[2];
        assert_eq!(cell.outcomes.len(), 1);
        assert_eq!(cell.outcomes[0].message, "adults need an email");

        store.mutate_cell(ids[0], "Age", CellValue::Integer(10)).unwrap();
        validator
            .validate_row_realtime(&mut store, &graph, ids[0], &["Age"], &mut events)
            .unwrap();
        assert!(store.row(ids[0]).unwrap().cells[2].outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_batch_timeout_reports_partial() {
        let (mut store, mut graph, _, mut events) = setup();
        let validator = Validator::new(
            &GridConfig::default()
                .with_chunk_size(1)
                .with_operation_timeout(Duration::from_millis(10)),
        );
        graph
            .register(
                ValidationRule::single_cell(
                    "Age",
                    |_| {
                        std::thread::sleep(Duration::from_millis(25));
                        false
                    },
                    "slow fail",
                )
                .with_name("slow"),
            )
            .unwrap();
        let ids = store.insert_empty_rows(0, 3).unwrap();
        for id in &ids {
            store.mutate_cell(*id, "Age", CellValue::Integer(1)).unwrap();
        }

        let mut dataset_outcomes = Vec::new();
        let cancel = CancellationToken::new();
        let all = graph.all_rules();
        let err = validator
            .validate_batch(&mut store, &graph, &all, &mut dataset_outcomes, &cancel, &mut events)
            .await
            .unwrap_err();
        // The first chunk finishes before the deadline check trips.
        assert_eq!(err, GridError::OperationTimeout { processed: 1, total: 3 });
        // Outcomes written before the deadline persist; the rest stay stale.
        assert_eq!(store.row(ids[0]).unwrap().cells[1].outcomes.len(), 1);
        assert!(store.row(ids[2]).unwrap().cells[1].outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_batch_cancellation_reports_partial() {
        let (mut store, mut graph, _, mut events) = setup();
        let validator = Validator::new(&GridConfig::default().with_chunk_size(1));
        graph.register(adult_rule()).unwrap();
        store.insert_empty_rows(0, 5).unwrap();

        let mut dataset_outcomes = Vec::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let all = graph.all_rules();
        let err = validator
            .validate_batch(&mut store, &graph, &all, &mut dataset_outcomes, &cancel, &mut events)
            .await
            .unwrap_err();
        assert_eq!(err, GridError::OperationCancelled { processed: 0, total: 5 });
    }

    #[test]
    fn test_dataset_valid_scopes() {
        let (mut store, mut graph, validator, mut events) = setup();
        graph.register(adult_rule()).unwrap();
        let ids = store.insert_empty_rows(0, 3).unwrap();
        store.mutate_cell(ids[0], "Age", CellValue::Integer(15)).unwrap();
        store.mutate_cell(ids[1], "Age", CellValue::Integer(30)).unwrap();
        validator
            .validate_row_realtime(&mut store, &graph, ids[0], &["Age"], &mut events)
            .unwrap();
        validator
            .validate_row_realtime(&mut store, &graph, ids[1], &["Age"], &mut events)
            .unwrap();

        assert!(!validator.dataset_valid(&store, &ValidationScope::All, &[]));
        assert!(!validator.dataset_valid(&store, &ValidationScope::NonEmptyOnly, &[]));
        // Scoped to the valid row only.
        assert!(validator.dataset_valid(&store, &ValidationScope::Filtered(vec![ids[1]]), &[]));
    }

    #[test]
    fn test_warnings_do_not_invalidate_dataset() {
        let (mut store, mut graph, validator, mut events) = setup();
        graph
            .register(
                ValidationRule::single_cell("Age", |_| false, "always warns")
                    .with_name("warn")
                    .with_severity(Severity::Warning),
            )
            .unwrap();
        let ids = store.insert_empty_rows(0, 1).unwrap();
        store.mutate_cell(ids[0], "Age", CellValue::Integer(5)).unwrap();
        validator
            .validate_row_realtime(&mut store, &graph, ids[0], &["Age"], &mut events)
            .unwrap();

        let row = store.row(ids[0]).unwrap();
        assert_eq!(row.aggregated_severity(), Some(Severity::Warning));
        assert!(validator.dataset_valid(&store, &ValidationScope::All, &[]));
    }
}
