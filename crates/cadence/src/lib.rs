//! Cadence: a discrete-event simulation kernel for plugin-based models.
//!
//! This is the top-level facade crate that re-exports the public API from all
//! Cadence sub-crates. For most users, adding `cadence` as a single dependency
//! is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use cadence::prelude::*;
//!
//! #[derive(Clone, Debug)]
//! struct Arrival(u32);
//! impl Event for Arrival {}
//!
//! let clinic = Plugin::builder(PluginId("clinic"))
//!     .set_initializer(|ctx| {
//!         ctx.add_actor(|actor| {
//!             actor.subscribe(|actor, arrival: &Arrival| {
//!                 actor.release_output(arrival.0);
//!                 Ok(())
//!             })?;
//!             actor.add_plan(1.0, |actor| actor.release_event(Arrival(1)))?;
//!             actor.add_plan(2.0, |actor| actor.release_event(Arrival(2)))
//!         })?;
//!         Ok(())
//!     })
//!     .build();
//!
//! let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
//! let sink = std::rc::Rc::clone(&seen);
//! let mut sim = Simulation::builder()
//!     .add_plugin(clinic)
//!     .set_output_consumer(move |item| {
//!         if let Some(n) = item.downcast_ref::<u32>() {
//!             sink.borrow_mut().push(*n);
//!         }
//!     })
//!     .build()
//!     .unwrap();
//! assert_eq!(sim.execute().unwrap(), RunOutcome::Exhausted);
//! assert_eq!(*seen.borrow(), vec![1, 2]);
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `cadence-core` | IDs, events and labels, plan descriptors, contract errors |
//! | [`engine`] | `cadence-engine` | Scheduler, dispatcher, contexts, plugins, `Simulation` |
//! | [`experiment`] | `cadence-experiment` | Dimensions, scenario runner, progress log |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types shared by every crate (`cadence-core`).
///
/// Contains participant IDs, the [`types::ContractError`] taxonomy,
/// [`types::Event`] and [`types::EventLabel`], and plan descriptors.
pub use cadence_core as types;

/// The single-run simulation engine (`cadence-engine`).
///
/// [`engine::Simulation`] owns one run; model code reaches it through
/// [`engine::ActorContext`], [`engine::DataManagerContext`] and
/// [`engine::ReportContext`].
pub use cadence_engine as engine;

/// Parallel experiments over scenario cross-products (`cadence-experiment`).
///
/// Describe variations with [`experiment::Dimension`]s and run them with
/// [`experiment::Experiment`].
pub use cadence_experiment as experiment;

/// Common imports for typical Cadence usage.
///
/// ```rust
/// use cadence::prelude::*;
/// ```
pub mod prelude {
    // Core
    pub use cadence_core::{
        ActorId, ContractError, ContractErrorKind, ContractResult, DataManagerId, Event,
        EventLabel, LabelKey, Lookup, PlanKey, PluginId, ReportId,
    };

    // Engine
    pub use cadence_engine::{
        ActorContext, DataManager, DataManagerContext, EventPhase, OutputItem, Plugin,
        PluginContext, ReportContext, RunOutcome, Simulation, SimulationConfig,
    };

    // Experiment
    pub use cadence_experiment::{
        Dimension, Experiment, ExperimentConfig, ExperimentContext, ExperimentSummary,
        ScenarioStatus,
    };
}
