//! One simulation run.
//!
//! [`Simulation`] is built from plugins and a [`SimulationConfig`] and
//! executed exactly once. [`execute()`](Simulation::execute) runs the
//! whole lifecycle:
//!
//! 1. plugin initializers, in dependency order;
//! 2. data manager `init`, in registration order;
//! 3. report initializers, then actor initializers;
//! 4. the scheduler loop, until halted, out of active plans, or past the
//!    configured halt time;
//! 5. close callbacks, in registration order.
//!
//! The first contract violation returned by model code aborts the run and
//! is returned from `execute`; close callbacks do not run in that case.

use std::fmt;
use std::mem;
use std::time::Instant;

use tracing::{debug, info};

use cadence_core::{ContractError, ContractErrorKind, ContractResult};

use crate::config::SimulationConfig;
use crate::engine::Engine;
use crate::metrics::RunMetrics;
use crate::output::{OutputConsumer, OutputItem};
use crate::plugin::{resolve_plugin_order, Plugin, PluginContext};

// ── State ──────────────────────────────────────────────────────────

/// Lifecycle state of a [`Simulation`].
///
/// [`Simulation::state`] reports `Built` or `Closed`; model code sees the
/// states in between through
/// [`SimulationView::simulation_state`](crate::context::SimulationView::simulation_state).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimulationState {
    /// Built, not yet executed.
    Built,
    /// Inside [`Simulation::execute`].
    Running,
    /// The loop stopped because of a halt request.
    Halted,
    /// The loop stopped because no active plan remained or the next one
    /// lay past the halt time.
    Exhausted,
    /// Close callbacks have run, or the run failed.
    Closed,
}

/// Why the scheduler loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Model code called `halt()`.
    Halted,
    /// No active plan remained.
    Exhausted,
    /// Active plans remained, all past the configured halt time.
    HaltTimeReached,
}

// ── Builder ────────────────────────────────────────────────────────

/// Builder returned by [`Simulation::builder`].
#[derive(Default)]
pub struct SimulationBuilder {
    plugins: Vec<Plugin>,
    config: SimulationConfig,
    output: Option<OutputConsumer>,
}

impl SimulationBuilder {
    /// Register a plugin.
    pub fn add_plugin(mut self, plugin: Plugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Register several plugins.
    pub fn add_plugins(mut self, plugins: impl IntoIterator<Item = Plugin>) -> Self {
        self.plugins.extend(plugins);
        self
    }

    /// Replace the clock configuration.
    pub fn set_config(mut self, config: SimulationConfig) -> Self {
        self.config = config;
        self
    }

    /// Receive every value released with `release_output`. Without one,
    /// output is dropped.
    pub fn set_output_consumer(mut self, consumer: impl FnMut(OutputItem) + 'static) -> Self {
        self.output = Some(Box::new(consumer));
        self
    }

    /// Validate the configuration and build.
    ///
    /// Plugin dependencies are resolved by
    /// [`execute`](Simulation::execute), so dependency errors surface
    /// there.
    ///
    /// # Errors
    ///
    /// See [`SimulationConfig::validate`].
    pub fn build(self) -> ContractResult<Simulation> {
        self.config.validate()?;
        Ok(Simulation {
            plugins: self.plugins,
            config: self.config,
            output: self.output,
            state: SimulationState::Built,
            metrics: RunMetrics::default(),
        })
    }
}

// ── Simulation ─────────────────────────────────────────────────────

/// A single-threaded simulation run.
pub struct Simulation {
    plugins: Vec<Plugin>,
    config: SimulationConfig,
    output: Option<OutputConsumer>,
    state: SimulationState,
    metrics: RunMetrics,
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("plugins", &self.plugins)
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Simulation {
    /// Start building a simulation.
    pub fn builder() -> SimulationBuilder {
        SimulationBuilder::default()
    }

    /// Current lifecycle state: `Built` before [`execute`](Self::execute),
    /// `Closed` after it.
    pub fn state(&self) -> SimulationState {
        self.state
    }

    /// Counters of the finished run; all zero before `execute`.
    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    /// Run the simulation to completion.
    ///
    /// # Errors
    ///
    /// [`ContractErrorKind::RepeatedExecution`] on any call after the
    /// first; otherwise the first contract violation raised during the
    /// run.
    pub fn execute(&mut self) -> ContractResult<RunOutcome> {
        if self.state != SimulationState::Built {
            return Err(ContractError::new(ContractErrorKind::RepeatedExecution));
        }
        self.state = SimulationState::Running;
        let started = Instant::now();
        let output = self.output.take().unwrap_or_else(|| Box::new(|_| {}));
        let mut engine = Engine::new(&self.config, output);
        debug!(
            plugins = self.plugins.len(),
            start_time = self.config.start_time,
            "simulation starting"
        );

        let result = self.run(&mut engine);

        self.metrics = mem::take(&mut engine.metrics);
        self.metrics.final_time = engine.time();
        self.metrics.wall_us = started.elapsed().as_micros() as u64;
        self.state = SimulationState::Closed;
        match &result {
            Ok(outcome) => info!(
                ?outcome,
                final_time = self.metrics.final_time,
                plans = self.metrics.plans_executed,
                events = self.metrics.events_released,
                wall_us = self.metrics.wall_us,
                "simulation finished"
            ),
            Err(e) => debug!(error = %e, time = engine.time(), "simulation aborted"),
        }
        result
    }

    fn run(&mut self, engine: &mut Engine) -> ContractResult<RunOutcome> {
        let order = resolve_plugin_order(&self.plugins)?;
        for i in order {
            let plugin = &self.plugins[i];
            debug!(plugin = %plugin.id(), "initializing plugin");
            if let Some(init) = plugin.initializer() {
                init(&mut PluginContext::new(engine, plugin))?;
            }
        }
        engine.finish_startup()?;

        while !engine.is_halted() {
            let Some(due) = engine.scheduler.next(self.config.halt_time) else {
                break;
            };
            engine.execute_plan(due)?;
        }

        let outcome = if engine.is_halted() {
            RunOutcome::Halted
        } else if engine.scheduler.active_count() > 0 {
            RunOutcome::HaltTimeReached
        } else {
            RunOutcome::Exhausted
        };
        engine.state = match outcome {
            RunOutcome::Halted => SimulationState::Halted,
            RunOutcome::Exhausted | RunOutcome::HaltTimeReached => SimulationState::Exhausted,
        };
        debug!(?outcome, time = engine.time(), "scheduler loop ended");

        engine.close()?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_simulation_exhausts() {
        let mut sim = Simulation::builder().build().unwrap();
        assert_eq!(sim.state(), SimulationState::Built);
        assert_eq!(sim.execute().unwrap(), RunOutcome::Exhausted);
        assert_eq!(sim.state(), SimulationState::Closed);
    }

    #[test]
    fn second_execute_is_rejected() {
        let mut sim = Simulation::builder().build().unwrap();
        sim.execute().unwrap();
        assert_eq!(
            sim.execute().unwrap_err().kind,
            ContractErrorKind::RepeatedExecution
        );
    }

    #[test]
    fn invalid_config_rejected_at_build() {
        let err = Simulation::builder()
            .set_config(SimulationConfig {
                start_time: f64::INFINITY,
                halt_time: None,
            })
            .build()
            .unwrap_err();
        assert_eq!(err.kind, ContractErrorKind::InvalidStartTime);
    }
}
