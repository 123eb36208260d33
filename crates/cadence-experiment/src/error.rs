//! Error types for experiment execution.
//!
//! [`ScenarioError`] describes why a single scenario failed and is
//! recorded against that scenario without stopping its siblings.
//! [`ExperimentError`] is what [`Experiment::execute`](crate::Experiment::execute)
//! returns when the experiment as a whole cannot complete.

use std::io;
use std::path::PathBuf;

use cadence_core::ContractError;
use thiserror::Error;

/// Why one scenario failed.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ScenarioError {
    /// Model code or a dimension point returned a contract violation.
    #[error("contract violation: {0}")]
    Contract(#[from] ContractError),
    /// The scenario panicked; carries the panic message.
    #[error("panicked: {0}")]
    Panic(String),
    /// A dimension point returned the wrong number of metadata values.
    #[error("dimension {dimension} point returned {actual} metadata values, expected {expected}")]
    Metadata {
        /// Index of the dimension in registration order.
        dimension: usize,
        /// Number of headers the dimension declares.
        expected: usize,
        /// Number of values the point returned.
        actual: usize,
    },
}

/// Errors that end an experiment run.
#[derive(Debug, Error)]
pub enum ExperimentError {
    /// Reading or writing the progress log failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A worker thread could not be started.
    #[error("failed to spawn worker {index}: {source}")]
    WorkerSpawn {
        /// Worker index.
        index: usize,
        /// Underlying spawn error.
        #[source]
        source: io::Error,
    },

    /// The progress log could not be parsed.
    #[error("malformed progress log {}, line {line}: {detail}", path.display())]
    ProgressLogFormat {
        /// Log file.
        path: PathBuf,
        /// One-based line number.
        line: usize,
        /// What was wrong with it.
        detail: String,
    },

    /// The progress log was written by an experiment with different
    /// dimensions.
    #[error("progress log headers {recorded:?} do not match experiment headers {current:?}")]
    ProgressLogMismatch {
        /// Headers found in the log.
        recorded: Vec<String>,
        /// Headers of the current experiment.
        current: Vec<String>,
    },

    /// `continue_from_progress_log` was set without a log path.
    #[error("continue_from_progress_log requires a progress_log path")]
    MissingProgressLog,

    /// The simulation configuration shared by all scenarios is invalid.
    #[error("invalid simulation config: {0}")]
    Simulation(#[from] ContractError),

    /// A dimension point returned the wrong number of metadata values.
    #[error("scenario {scenario}: dimension {dimension} point returned {actual} metadata values, expected {expected}")]
    DimensionMetadataMismatch {
        /// Scenario whose setup failed.
        scenario: usize,
        /// Index of the dimension in registration order.
        dimension: usize,
        /// Number of headers the dimension declares.
        expected: usize,
        /// Number of values the point returned.
        actual: usize,
    },

    /// A scenario failed while `halt_on_exception` was set.
    #[error("scenario {scenario} failed: {source}")]
    ScenarioFailed {
        /// Index of the first failed scenario.
        scenario: usize,
        /// Its failure.
        #[source]
        source: ScenarioError,
    },
}
