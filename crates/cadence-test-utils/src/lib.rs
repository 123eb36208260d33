//! Test utilities and fixtures for Cadence development.
//!
//! Provides a thread-safe [`Recorder`] for asserting on execution order,
//! helpers that wrap closures into single-purpose plugins, and
//! [`run_plugins`] which executes a simulation and collects its output.
//! Reusable data managers and events live in [`fixtures`].

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use cadence_core::{ContractResult, PluginId, ReportId};
use cadence_engine::{
    ActorContext, DataManager, OutputItem, Plugin, ReportContext, RunMetrics, RunOutcome, Simulation,
    SimulationConfig,
};

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Honors `RUST_LOG`; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ── Recorder ───────────────────────────────────────────────────────

/// Shared append-only log of strings.
///
/// Clones share the same log, so one handle can be moved into model
/// closures while the test keeps another for assertions.
#[derive(Clone, Debug, Default)]
pub struct Recorder {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Plugin helpers ─────────────────────────────────────────────────

/// A plugin that adds one actor initialized by `init`.
pub fn actor_plugin(
    id: &'static str,
    init: impl Fn(&mut ActorContext<'_>) -> ContractResult<()> + Send + Sync + 'static,
) -> Plugin {
    let init = Arc::new(init);
    Plugin::builder(PluginId(id))
        .set_initializer(move |ctx| {
            let init = Arc::clone(&init);
            ctx.add_actor(move |actor| init(actor))?;
            Ok(())
        })
        .build()
}

/// A plugin that registers the data manager built by `make`.
pub fn data_manager_plugin<D: DataManager>(
    id: &'static str,
    make: impl Fn() -> D + Send + Sync + 'static,
) -> Plugin {
    Plugin::builder(PluginId(id))
        .set_initializer(move |ctx| {
            ctx.add_data_manager(make())?;
            Ok(())
        })
        .build()
}

/// A plugin that adds one report initialized by `init`.
pub fn report_plugin(
    id: &'static str,
    init: impl Fn(&mut ReportContext<'_>) -> ContractResult<()> + Send + Sync + 'static,
) -> Plugin {
    let init = Arc::new(init);
    Plugin::builder(PluginId(id))
        .set_initializer(move |ctx| {
            let init = Arc::clone(&init);
            ctx.add_report(ReportId(id), move |report| init(report))
        })
        .build()
}

// ── Running ────────────────────────────────────────────────────────

/// Everything a finished simulation produced.
#[derive(Debug)]
pub struct RunResult {
    pub outcome: RunOutcome,
    pub outputs: Vec<OutputItem>,
    pub metrics: RunMetrics,
}

impl RunResult {
    /// Outputs of type `T`, in release order.
    pub fn outputs_of<T: Clone + 'static>(&self) -> Vec<T> {
        self.outputs
            .iter()
            .filter_map(|o| o.downcast_ref::<T>().cloned())
            .collect()
    }
}

/// Build and execute a simulation from `plugins` with default config.
pub fn run_plugins(plugins: Vec<Plugin>) -> ContractResult<RunResult> {
    run_plugins_with(plugins, SimulationConfig::default())
}

/// Build and execute a simulation from `plugins` with `config`.
pub fn run_plugins_with(plugins: Vec<Plugin>, config: SimulationConfig) -> ContractResult<RunResult> {
    init_tracing();
    let outputs = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&outputs);
    let mut sim = Simulation::builder()
        .add_plugins(plugins)
        .set_config(config)
        .set_output_consumer(move |item| sink.borrow_mut().push(item))
        .build()?;
    let outcome = sim.execute()?;
    let metrics = sim.metrics().clone();
    drop(sim);
    let outputs = Rc::try_unwrap(outputs)
        .map(RefCell::into_inner)
        .unwrap_or_else(|shared| shared.borrow_mut().drain(..).collect());
    Ok(RunResult {
        outcome,
        outputs,
        metrics,
    })
}
