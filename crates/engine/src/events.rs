//! Event types for grid change notifications.
//!
//! The engine emits structured events to an injected sink (the "logger
//! collaborator"). The sink is optional: with no callback installed every
//! emit is a no-op and engine behavior is otherwise unchanged. Internal
//! diagnostics additionally go through `tracing`.

use std::sync::{Arc, Mutex};

use crate::row::RowId;

/// How the lifecycle manager adjusted the row set to keep its invariants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowAdjustment {
    /// A fresh trailing empty row was appended.
    TrailingAppended,
    /// A delete at the minimum-row floor cleared content in place.
    ContentCleared,
    /// Rows were padded in to reach the minimum-row floor.
    MinimumPadded,
}

/// Events emitted by the grid during operations.
#[derive(Debug, Clone, PartialEq)]
pub enum GridEvent {
    /// A composite operation (import, batch validation, bulk delete) began.
    OperationStarted { operation: &'static str },

    /// A composite operation completed fully.
    OperationSucceeded { operation: &'static str, rows: usize },

    /// A composite operation failed, was cancelled, or timed out.
    OperationFailed { operation: &'static str, error: String },

    /// A rule exceeded its per-rule budget while validating a row.
    RuleTimeout {
        rule: String,
        row: Option<RowId>,
        elapsed_ms: u64,
    },

    /// The lifecycle manager adjusted the row set to restore an invariant.
    RowInvariantAdjusted { adjustment: RowAdjustment, row: RowId },
}

/// Callback type for receiving grid events.
pub type EventCallback = Box<dyn FnMut(GridEvent) + Send>;

/// Optional event sink. Absent callback = no-op emit.
#[derive(Default)]
pub struct EventSink {
    callback: Option<EventCallback>,
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: EventCallback) -> Self {
        Self { callback: Some(callback) }
    }

    pub fn set_callback(&mut self, callback: EventCallback) {
        self.callback = Some(callback);
    }

    pub fn emit(&mut self, event: GridEvent) {
        if let Some(cb) = &mut self.callback {
            cb(event);
        }
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("installed", &self.callback.is_some())
            .finish()
    }
}

/// Shareable event collector for tests: hand `callback()` to the grid, read
/// the accumulated events afterwards.
#[derive(Default, Clone)]
pub struct EventCollector {
    events: Arc<Mutex<Vec<GridEvent>>>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A callback that appends every event to this collector.
    pub fn callback(&self) -> EventCallback {
        let events = Arc::clone(&self.events);
        Box::new(move |event| {
            events.lock().unwrap().push(event);
        })
    }

    pub fn events(&self) -> Vec<GridEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().unwrap().is_empty()
    }

    /// Filter to rule-timeout events.
    pub fn rule_timeouts(&self) -> Vec<GridEvent> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, GridEvent::RuleTimeout { .. }))
            .collect()
    }

    /// Filter to invariant-adjustment events.
    pub fn adjustments(&self) -> Vec<GridEvent> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, GridEvent::RowInvariantAdjusted { .. }))
            .collect()
    }
}
