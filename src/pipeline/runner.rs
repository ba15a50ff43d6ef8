//! Sequential pipeline execution.

use log::{info, warn};

use crate::{
    pipeline::{
        pass::{CancelToken, ExecutionContext},
        registry::PassRegistry,
    },
    universe::Universe,
    Error,
};

/// What happened to one selected pass.
#[derive(Debug, Clone)]
pub struct PassOutcome {
    /// The pass identifier from the selection.
    pub id: String,
    /// Whether the pass reported a change.
    pub changed: bool,
    /// The recorded failure, if the pass errored. Pass errors never abort
    /// the run.
    pub error: Option<String>,
}

/// Summary of a pipeline run. The pipeline always completes (or stops at a
/// cancellation boundary); this is where callers read what succeeded.
#[derive(Debug, Clone, Default)]
pub struct PipelineSummary {
    pub outcomes: Vec<PassOutcome>,
    /// `true` if the run stopped early due to cancellation.
    pub canceled: bool,
}

impl PipelineSummary {
    /// Whether any pass reported a change.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.outcomes.iter().any(|o| o.changed)
    }

    /// Number of passes that recorded an error.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.error.is_some()).count()
    }
}

/// Runs the selected passes sequentially over `universe`.
///
/// Each selected identifier is resolved against the registry and executed
/// in selection order; every pass observes the full effect of its
/// predecessors. Exceptions from a pass are caught here and recorded on
/// the summary - the pipeline never propagates them. Cancellation is
/// honored between passes (and inside passes at class boundaries, via the
/// shared token).
pub fn run_pipeline(
    registry: &mut PassRegistry,
    universe: &mut Universe,
    selection: &[&str],
    verbose: bool,
    cancel: &CancelToken,
) -> PipelineSummary {
    let ctx = ExecutionContext::new(verbose, cancel.clone());
    let mut summary = PipelineSummary::default();

    for &id in selection {
        if cancel.is_canceled() {
            info!("pipeline canceled before pass {id}");
            summary.canceled = true;
            break;
        }

        let Some(pass) = registry.find_mut(id) else {
            warn!("unknown pass identifier: {id}");
            summary.outcomes.push(PassOutcome {
                id: id.to_string(),
                changed: false,
                error: Some("unknown pass identifier".into()),
            });
            continue;
        };

        info!("running pass {} ({})", pass.info().name, id);
        let outcome = match pass.execute(universe, &ctx) {
            Ok(changed) => PassOutcome {
                id: id.to_string(),
                changed,
                error: None,
            },
            Err(Error::Canceled) => {
                info!("pass {id} stopped at cancellation boundary");
                summary.canceled = true;
                summary.outcomes.push(PassOutcome {
                    id: id.to_string(),
                    changed: false,
                    error: None,
                });
                break;
            }
            Err(e) => {
                warn!("pass {id} failed: {e}");
                PassOutcome {
                    id: id.to_string(),
                    changed: false,
                    error: Some(e.to_string()),
                }
            }
        };
        summary.outcomes.push(outcome);
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ClassNode;

    fn small_universe() -> Universe {
        [ClassNode::new("a/A", 52)].into_iter().collect()
    }

    #[test]
    fn unknown_passes_are_recorded_not_fatal() {
        let mut registry = PassRegistry::new();
        let mut universe = small_universe();
        let summary = run_pipeline(
            &mut registry,
            &mut universe,
            &["no-such-pass", "remove-fake-try-catch"],
            false,
            &CancelToken::new(),
        );
        assert_eq!(summary.outcomes.len(), 2);
        assert!(summary.outcomes[0].error.is_some());
        assert!(summary.outcomes[1].error.is_none());
        assert!(!summary.canceled);
    }

    #[test]
    fn cancellation_stops_before_next_pass() {
        let mut registry = PassRegistry::new();
        let mut universe = small_universe();
        let cancel = CancelToken::new();
        cancel.cancel();
        let summary = run_pipeline(
            &mut registry,
            &mut universe,
            &["remove-fake-try-catch"],
            false,
            &cancel,
        );
        assert!(summary.canceled);
        assert!(summary.outcomes.is_empty());
    }

    #[test]
    fn empty_selection_is_a_complete_run() {
        let mut registry = PassRegistry::new();
        let mut universe = small_universe();
        let summary = run_pipeline(&mut registry, &mut universe, &[], false, &CancelToken::new());
        assert!(!summary.changed());
        assert_eq!(summary.failures(), 0);
    }
}
