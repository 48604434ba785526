//! Dependency graph from columns to validation rules.
//!
//! Answers "which rules must re-run when this column changes?" without
//! scanning the rule set. Maintains bidirectional adjacency:
//!
//! ```text
//! column C → rule R   means   "R reads C"
//! ```
//!
//! A rule that declares no column dependency (cross-row and dataset-level
//! rules) conservatively depends on *every* column and is flagged batch-only
//! so the real-time path never pays its whole-dataset cost.
//!
//! # Invariants
//!
//! 1. **Bidirectional consistency:** if C ∈ columns[R] then R ∈ rules[C].
//! 2. **No dangling entries:** empty sets are removed, not stored.
//! 3. **Deterministic order:** impact queries sort by (priority,
//!    registration sequence), so equal-priority rules run in registration
//!    order.
//!
//! The graph is updated incrementally on register/unregister, never rebuilt
//! per query.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::outcome::{GridError, GridResult};
use crate::rule::ValidationRule;

/// Stable handle to a registered rule. Monotonic per rule set, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub u64);

#[derive(Debug)]
struct Registered {
    /// Registration sequence, the tie-breaker for equal priorities.
    seq: u64,
    rule: ValidationRule,
}

/// The registered rule set plus its column→rule dependency edges.
#[derive(Debug, Default)]
pub struct RuleGraph {
    rules: FxHashMap<RuleId, Registered>,
    by_name: FxHashMap<String, RuleId>,
    /// column id → rules reading it.
    by_column: FxHashMap<String, FxHashSet<RuleId>>,
    /// Rules depending on all columns; excluded from real-time impact.
    batch_only: FxHashSet<RuleId>,
    next_id: u64,
}

impl RuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule, building its column edges.
    ///
    /// Fails with `DuplicateRule` if the rule carries a name that is already
    /// registered. Unnamed rules always register.
    pub fn register(&mut self, rule: ValidationRule) -> GridResult<RuleId> {
        if let Some(name) = &rule.name {
            if self.by_name.contains_key(name) {
                return Err(GridError::DuplicateRule(name.clone()));
            }
        }

        let id = RuleId(self.next_id);
        let seq = self.next_id;
        self.next_id += 1;

        let read = rule.read_columns();
        if read.is_empty() {
            self.batch_only.insert(id);
        } else {
            for column in read {
                self.by_column.entry(column.to_string()).or_default().insert(id);
            }
        }
        if let Some(name) = &rule.name {
            self.by_name.insert(name.clone(), id);
        }
        self.rules.insert(id, Registered { seq, rule });
        Ok(id)
    }

    /// Unregister by rule name. Returns the rule if it existed.
    pub fn unregister_by_name(&mut self, name: &str) -> Option<ValidationRule> {
        let id = self.by_name.remove(name)?;
        self.remove_edges(id);
        self.rules.remove(&id).map(|r| r.rule)
    }

    /// Unregister every rule whose read set intersects the given columns.
    /// Batch-only rules depend on all columns and are therefore included.
    /// Returns the labels of the removed rules so callers can sweep any
    /// outcomes recorded under them.
    pub fn unregister_by_columns(&mut self, columns: &[&str]) -> Vec<String> {
        let mut doomed: FxHashSet<RuleId> = FxHashSet::default();
        for column in columns {
            if let Some(ids) = self.by_column.get(*column) {
                doomed.extend(ids.iter().copied());
            }
        }
        doomed.extend(self.batch_only.iter().copied());

        let mut labels = Vec::with_capacity(doomed.len());
        for id in &doomed {
            labels.push(self.label(*id));
            self.remove_edges(*id);
            if let Some(registered) = self.rules.remove(id) {
                if let Some(name) = &registered.rule.name {
                    self.by_name.remove(name);
                }
            }
        }
        labels
    }

    fn remove_edges(&mut self, id: RuleId) {
        self.batch_only.remove(&id);
        self.by_column.retain(|_, ids| {
            ids.remove(&id);
            // No dangling entries.
            !ids.is_empty()
        });
    }

    /// The rules that must re-evaluate when the given columns change,
    /// ordered by (priority, registration order).
    ///
    /// `include_batch_only` selects batch mode: real-time passes exclude
    /// whole-dataset rules, batch passes include them.
    pub fn impacted_rules(&self, changed_columns: &[&str], include_batch_only: bool) -> Vec<RuleId> {
        let mut impacted: FxHashSet<RuleId> = FxHashSet::default();
        for column in changed_columns {
            if let Some(ids) = self.by_column.get(*column) {
                impacted.extend(ids.iter().copied());
            }
        }
        if include_batch_only {
            impacted.extend(self.batch_only.iter().copied());
        }
        self.sorted(impacted)
    }

    /// Every registered rule in evaluation order.
    pub fn all_rules(&self) -> Vec<RuleId> {
        self.sorted(self.rules.keys().copied().collect())
    }

    fn sorted(&self, ids: FxHashSet<RuleId>) -> Vec<RuleId> {
        let mut ordered: Vec<RuleId> = ids.into_iter().collect();
        ordered.sort_by_key(|id| {
            let r = &self.rules[id];
            (r.rule.priority, r.seq)
        });
        ordered
    }

    pub fn get(&self, id: RuleId) -> Option<&ValidationRule> {
        self.rules.get(&id).map(|r| &r.rule)
    }

    /// Display label for a rule: its name, or a stable synthesized one.
    pub fn label(&self, id: RuleId) -> String {
        match self.rules.get(&id).and_then(|r| r.rule.name.clone()) {
            Some(name) => name,
            None => format!("rule#{}", id.0),
        }
    }

    pub fn is_batch_only(&self, id: RuleId) -> bool {
        self.batch_only.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
