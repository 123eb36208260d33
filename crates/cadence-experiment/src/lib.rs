//! Experiment runner for Cadence simulations.
//!
//! An [`Experiment`] takes plugin templates and a set of
//! [`Dimension`]s, expands their cross-product into scenarios, and runs
//! one [`Simulation`](cadence_engine::Simulation) per scenario on a pool
//! of worker threads. Scenario failures, including panics, are recorded
//! against the scenario without aborting its siblings. Released output
//! and lifecycle notifications are delivered to handlers on the calling
//! thread, and completed scenarios are recorded in an optional
//! [progress log](progress) so an interrupted experiment can resume.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod context;
pub mod dimension;
pub mod error;
pub mod experiment;
pub mod progress;
pub mod scenario;

pub use config::ExperimentConfig;
pub use context::{ExperimentContext, ScenarioStatus};
pub use dimension::{Dimension, DimensionBuilder, DimensionContext, DimensionPoint};
pub use error::{ExperimentError, ScenarioError};
pub use experiment::{Experiment, ExperimentBuilder, ExperimentSummary};
pub use progress::{read_progress_log, ExperimentProgress, ProgressLogWriter};
