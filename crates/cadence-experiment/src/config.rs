//! Experiment configuration and validation.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::thread;

use cadence_engine::SimulationConfig;

use crate::error::ExperimentError;

/// Settings for one [`Experiment`](crate::Experiment) run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExperimentConfig {
    /// Worker threads. `Some(0)` runs every scenario on the calling
    /// thread; `None` uses the available parallelism. Default: `None`.
    pub thread_count: Option<usize>,
    /// File recording completed scenarios. Default: `None` (no log).
    pub progress_log: Option<PathBuf>,
    /// Skip scenarios the progress log already records as completed.
    /// Requires `progress_log`. Default: `false`.
    pub continue_from_progress_log: bool,
    /// Stop handing out scenarios after the first failure and return it
    /// from `execute`. Default: `false`.
    pub halt_on_exception: bool,
    /// Clock settings applied to every scenario's simulation.
    pub simulation: SimulationConfig,
}

impl ExperimentConfig {
    /// Check structural invariants.
    ///
    /// # Errors
    ///
    /// - [`ExperimentError::MissingProgressLog`] if resuming is requested
    ///   without a log path.
    /// - [`ExperimentError::Simulation`] if the simulation config is
    ///   invalid.
    pub fn validate(&self) -> Result<(), ExperimentError> {
        if self.continue_from_progress_log && self.progress_log.is_none() {
            return Err(ExperimentError::MissingProgressLog);
        }
        self.simulation.validate()?;
        Ok(())
    }

    /// Number of worker threads to spawn; zero means inline execution.
    pub fn resolved_thread_count(&self) -> usize {
        self.thread_count.unwrap_or_else(|| {
            thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        ExperimentConfig::default().validate().unwrap();
    }

    #[test]
    fn resume_without_log_rejected() {
        let cfg = ExperimentConfig {
            continue_from_progress_log: true,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ExperimentError::MissingProgressLog)
        ));
    }

    #[test]
    fn invalid_simulation_config_rejected() {
        let cfg = ExperimentConfig {
            simulation: SimulationConfig {
                start_time: 5.0,
                halt_time: Some(1.0),
            },
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ExperimentError::Simulation(_))));
    }

    #[test]
    fn explicit_thread_count_wins() {
        let cfg = ExperimentConfig {
            thread_count: Some(3),
            ..Default::default()
        };
        assert_eq!(cfg.resolved_thread_count(), 3);
        assert!(ExperimentConfig::default().resolved_thread_count() >= 1);
    }
}
