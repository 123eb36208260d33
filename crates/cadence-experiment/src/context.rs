//! Read-only experiment state handed to experiment handlers.

use std::fmt;

/// Where a scenario is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScenarioStatus {
    /// Not started.
    Ready,
    /// Handed to a worker.
    Running,
    /// Simulation finished without error.
    Succeeded,
    /// Setup or simulation failed.
    Failed,
    /// Recorded as completed by a previous run's progress log.
    PreviouslySucceeded,
}

impl fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::PreviouslySucceeded => "previously succeeded",
        };
        f.write_str(name)
    }
}

/// Experiment state visible to output and lifecycle handlers.
///
/// Handlers run on the thread that called
/// [`Experiment::execute`](crate::Experiment::execute), so the context
/// always reflects every worker message received so far.
#[derive(Clone, Debug)]
pub struct ExperimentContext {
    metadata: Vec<String>,
    scenarios: Vec<ScenarioEntry>,
}

#[derive(Clone, Debug)]
struct ScenarioEntry {
    status: ScenarioStatus,
    metadata: Option<Vec<String>>,
}

impl ExperimentContext {
    pub(crate) fn new(metadata: Vec<String>, scenario_count: usize) -> Self {
        Self {
            metadata,
            scenarios: vec![
                ScenarioEntry {
                    status: ScenarioStatus::Ready,
                    metadata: None,
                };
                scenario_count
            ],
        }
    }

    pub(crate) fn set_status(&mut self, scenario: usize, status: ScenarioStatus) {
        if let Some(entry) = self.scenarios.get_mut(scenario) {
            entry.status = status;
        }
    }

    pub(crate) fn set_metadata(&mut self, scenario: usize, metadata: Vec<String>) {
        if let Some(entry) = self.scenarios.get_mut(scenario) {
            entry.metadata = Some(metadata);
        }
    }

    /// Metadata headers of every dimension, in registration order.
    pub fn experiment_metadata(&self) -> &[String] {
        &self.metadata
    }

    /// Total number of scenarios, including previously completed ones.
    pub fn scenario_count(&self) -> usize {
        self.scenarios.len()
    }

    /// Metadata values of `scenario`, once its dimension points have run
    /// or a previous run recorded them.
    pub fn scenario_metadata(&self, scenario: usize) -> Option<&[String]> {
        self.scenarios.get(scenario)?.metadata.as_deref()
    }

    /// Status of `scenario`, or `None` if out of range.
    pub fn scenario_status(&self, scenario: usize) -> Option<ScenarioStatus> {
        self.scenarios.get(scenario).map(|e| e.status)
    }

    /// Scenarios currently in `status`, in ascending order.
    pub fn scenarios_with_status(&self, status: ScenarioStatus) -> Vec<usize> {
        self.scenarios
            .iter()
            .enumerate()
            .filter(|(_, e)| e.status == status)
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_context_is_all_ready() {
        let ctx = ExperimentContext::new(vec!["rate".into()], 3);
        assert_eq!(ctx.scenario_count(), 3);
        assert_eq!(ctx.scenarios_with_status(ScenarioStatus::Ready), vec![0, 1, 2]);
        assert!(ctx.scenario_metadata(0).is_none());
        assert!(ctx.scenario_status(3).is_none());
    }

    #[test]
    fn updates_are_visible() {
        let mut ctx = ExperimentContext::new(vec!["rate".into()], 2);
        ctx.set_metadata(1, vec!["0.5".into()]);
        ctx.set_status(1, ScenarioStatus::Succeeded);
        assert_eq!(ctx.scenario_metadata(1), Some(&["0.5".to_string()][..]));
        assert_eq!(ctx.scenario_status(1), Some(ScenarioStatus::Succeeded));
        assert_eq!(ScenarioStatus::PreviouslySucceeded.to_string(), "previously succeeded");
    }
}
