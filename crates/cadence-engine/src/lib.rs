//! Discrete-event simulation engine for Cadence models.
//!
//! Provides the [`Simulation`] that owns one run: a time-ordered plan
//! scheduler with active/passive halting, a typed event dispatcher with
//! label filtering and three-phase data manager resolution, and the
//! capability-scoped contexts through which actors, data managers and
//! reports touch the engine. Plugins register participants and are
//! initialized in dependency order.
//!
//! Everything inside one simulation runs on a single thread. Parallelism
//! across independent runs lives in `cadence-experiment`.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod capability;
pub mod config;
pub mod context;
pub mod dispatch;
mod engine;
pub mod metrics;
pub mod output;
pub mod plugin;
pub mod scheduler;
pub mod simulation;

pub use config::SimulationConfig;
pub use context::{
    ActorContext, ActorPlan, DataManager, DataManagerAliases, DataManagerContext, DataManagerPlan,
    DataManagerRef, LabelContext, ReportContext, ReportPlan, SimulationView,
};
pub use dispatch::{EventLabeler, EventPhase};
pub use engine::DispatchOrigin;
pub use metrics::RunMetrics;
pub use output::{OutputConsumer, OutputItem};
pub use plugin::{Plugin, PluginBuilder, PluginContext, PluginData, PluginInitializer};
pub use scheduler::PlanScheduler;
pub use simulation::{RunOutcome, Simulation, SimulationBuilder, SimulationState};
