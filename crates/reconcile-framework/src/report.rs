//! Results of reconciliation passes.

use crate::error::ReconcileError;
use crate::instance::InstanceKey;
use crate::reconciler::{Action, Outcome};
use std::collections::BTreeMap;

/// Per-instance results of one pass. An error of one instance never hides the
/// results of the others.
#[derive(Debug, Clone, Default)]
pub struct PassReport {
    pub pass: u64,
    pub results: BTreeMap<InstanceKey, Result<Outcome, ReconcileError>>,
}

impl PassReport {
    pub fn new(pass: u64) -> Self {
        Self {
            pass,
            results: BTreeMap::new(),
        }
    }

    pub fn result(&self, key: &str) -> Option<&Result<Outcome, ReconcileError>> {
        self.results.get(&InstanceKey::from(key))
    }

    pub fn errors(&self) -> impl Iterator<Item = (&InstanceKey, &ReconcileError)> {
        self.results
            .iter()
            .filter_map(|(key, result)| result.as_ref().err().map(|e| (key, e)))
    }

    pub fn is_clean(&self) -> bool {
        self.errors().next().is_none()
    }

    /// Some remote state changed during this pass.
    pub fn made_progress(&self) -> bool {
        self.results
            .values()
            .any(|result| matches!(result, Ok(outcome) if outcome.action != Action::NoOp))
    }

    /// Another pass may get further: a retryable failure that is not just waiting on
    /// a dependency, or a dependency wait after a pass that changed something.
    pub fn needs_another_pass(&self) -> bool {
        let mut waiting = false;
        for (_, error) in self.errors() {
            match error {
                ReconcileError::DependencyNotReady { .. } => waiting = true,
                e if e.is_retryable() => return true,
                _ => {}
            }
        }
        waiting && self.made_progress()
    }
}

/// Why a converge run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergeStop {
    /// Nothing left that another pass could fix.
    Settled,
    /// Only instances waiting on dependencies that will not become ready remain.
    Stalled,
    PassLimit,
    Cancelled,
}

/// Outcome of repeated passes.
#[derive(Debug, Clone)]
pub struct ConvergeReport {
    pub passes: Vec<PassReport>,
    pub stop: ConvergeStop,
}

impl ConvergeReport {
    /// The most recent result of every instance across all passes.
    pub fn final_results(&self) -> BTreeMap<InstanceKey, Result<Outcome, ReconcileError>> {
        let mut merged = BTreeMap::new();
        for report in &self.passes {
            for (key, result) in &report.results {
                merged.insert(key.clone(), result.clone());
            }
        }
        merged
    }

    /// Settled with every instance in a good state.
    pub fn is_converged(&self) -> bool {
        self.stop == ConvergeStop::Settled && self.passes.last().is_some_and(PassReport::is_clean)
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }
}
