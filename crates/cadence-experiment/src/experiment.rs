//! The experiment runner.
//!
//! [`Experiment::execute`] expands the dimensions into scenarios and runs
//! each scenario's simulation on a pool of worker threads:
//!
//! ```text
//!   calling thread                         worker threads
//!   --------------                         --------------
//!   tasks: unbounded(pending) ----------> recv scenario
//!                                          clone plugins, apply points
//!   collector <-- Started ---------------- send metadata
//!   collector <-- Output* ---------------- simulation.execute()
//!   collector <-- Finished --------------- send result (panics caught)
//!     |
//!     +-- output and lifecycle handlers
//!     +-- progress log
//! ```
//!
//! Workers share only immutable plugin templates and dimensions; every
//! scenario gets its own plugin copies. The collector on the calling
//! thread is the single writer of the progress log and the only caller of
//! handlers, so handlers need not be `Send`.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::BufWriter;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use cadence_core::TypeTag;
use cadence_engine::{OutputItem, Plugin, RunMetrics, RunOutcome, Simulation, SimulationConfig};

use crate::config::ExperimentConfig;
use crate::context::{ExperimentContext, ScenarioStatus};
use crate::dimension::{Dimension, DimensionContext};
use crate::error::{ExperimentError, ScenarioError};
use crate::progress::{read_progress_log, ProgressLogWriter};
use crate::scenario::{point_indices, scenario_count};

type OutputHandler = Box<dyn FnMut(&ExperimentContext, usize, &OutputItem)>;
type ExperimentHandler = Box<dyn FnMut(&ExperimentContext)>;
type ScenarioHandler = Box<dyn FnMut(&ExperimentContext, usize)>;

struct OutputSubscription {
    /// `None` matches every output.
    tag: Option<TypeTag>,
    handler: OutputHandler,
}

#[derive(Default)]
struct Handlers {
    output: Vec<OutputSubscription>,
    experiment_open: Vec<ExperimentHandler>,
    experiment_close: Vec<ExperimentHandler>,
    simulation_open: Vec<ScenarioHandler>,
    simulation_close: Vec<ScenarioHandler>,
}

// ── Summary ────────────────────────────────────────────────────────

/// Outcome counts of a finished experiment.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExperimentSummary {
    /// Total scenarios in the cross-product.
    pub scenario_count: usize,
    /// Scenarios that ran and succeeded in this run.
    pub succeeded: usize,
    /// Scenarios skipped because the progress log records them.
    pub previously_succeeded: usize,
    /// Scenarios that failed in this run, with their errors.
    pub failed: BTreeMap<usize, ScenarioError>,
    /// Scenarios never started because the run stopped early.
    pub not_run: usize,
    /// Wall-clock duration of `execute()`, in microseconds.
    pub wall_us: u64,
}

/// What a successful scenario reports back.
#[derive(Clone, Debug)]
struct ScenarioRun {
    outcome: RunOutcome,
    metrics: RunMetrics,
}

enum WorkerMessage {
    Started {
        scenario: usize,
        metadata: Vec<String>,
    },
    Output {
        scenario: usize,
        item: OutputItem,
    },
    Finished {
        scenario: usize,
        result: Result<ScenarioRun, ScenarioError>,
    },
}

// ── Builder ────────────────────────────────────────────────────────

/// Builder returned by [`Experiment::builder`].
#[derive(Default)]
pub struct ExperimentBuilder {
    plugins: Vec<Plugin>,
    dimensions: Vec<Dimension>,
    config: ExperimentConfig,
    handlers: Handlers,
}

impl ExperimentBuilder {
    /// Register a plugin template, copied into every scenario.
    pub fn add_plugin(mut self, plugin: Plugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Register several plugin templates.
    pub fn add_plugins(mut self, plugins: impl IntoIterator<Item = Plugin>) -> Self {
        self.plugins.extend(plugins);
        self
    }

    /// Add a dimension. Scenario metadata lists each dimension's values in
    /// the order dimensions were added.
    pub fn add_dimension(mut self, dimension: Dimension) -> Self {
        self.dimensions.push(dimension);
        self
    }

    /// Replace the configuration.
    pub fn set_config(mut self, config: ExperimentConfig) -> Self {
        self.config = config;
        self
    }

    /// Receive every output of type `T` with its scenario index.
    pub fn subscribe_to_output<T: Any>(
        mut self,
        mut handler: impl FnMut(&ExperimentContext, usize, &T) + 'static,
    ) -> Self {
        self.handlers.output.push(OutputSubscription {
            tag: Some(TypeTag::of::<T>()),
            handler: Box::new(move |ctx, scenario, item| {
                if let Some(value) = item.downcast_ref::<T>() {
                    handler(ctx, scenario, value);
                }
            }),
        });
        self
    }

    /// Receive every output regardless of type.
    pub fn subscribe_to_all_output(
        mut self,
        handler: impl FnMut(&ExperimentContext, usize, &OutputItem) + 'static,
    ) -> Self {
        self.handlers.output.push(OutputSubscription {
            tag: None,
            handler: Box::new(handler),
        });
        self
    }

    /// Run `handler` before the first scenario starts.
    pub fn subscribe_to_experiment_open(
        mut self,
        handler: impl FnMut(&ExperimentContext) + 'static,
    ) -> Self {
        self.handlers.experiment_open.push(Box::new(handler));
        self
    }

    /// Run `handler` after the last scenario finishes.
    pub fn subscribe_to_experiment_close(
        mut self,
        handler: impl FnMut(&ExperimentContext) + 'static,
    ) -> Self {
        self.handlers.experiment_close.push(Box::new(handler));
        self
    }

    /// Run `handler` when a scenario's dimension points have applied and
    /// its simulation is about to start.
    pub fn subscribe_to_simulation_open(
        mut self,
        handler: impl FnMut(&ExperimentContext, usize) + 'static,
    ) -> Self {
        self.handlers.simulation_open.push(Box::new(handler));
        self
    }

    /// Run `handler` when a scenario finishes, successfully or not.
    pub fn subscribe_to_simulation_close(
        mut self,
        handler: impl FnMut(&ExperimentContext, usize) + 'static,
    ) -> Self {
        self.handlers.simulation_close.push(Box::new(handler));
        self
    }

    /// Validate the configuration and build.
    ///
    /// # Errors
    ///
    /// See [`ExperimentConfig::validate`].
    pub fn build(self) -> Result<Experiment, ExperimentError> {
        self.config.validate()?;
        Ok(Experiment {
            plugins: self.plugins,
            dimensions: self.dimensions,
            config: self.config,
            handlers: self.handlers,
        })
    }
}

// ── Experiment ─────────────────────────────────────────────────────

/// Runs one simulation per point of the dimension cross-product.
pub struct Experiment {
    plugins: Vec<Plugin>,
    dimensions: Vec<Dimension>,
    config: ExperimentConfig,
    handlers: Handlers,
}

impl fmt::Debug for Experiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Experiment")
            .field("plugins", &self.plugins)
            .field("dimensions", &self.dimensions)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Experiment {
    /// Start building an experiment.
    pub fn builder() -> ExperimentBuilder {
        ExperimentBuilder::default()
    }

    /// Number of scenarios in the cross-product.
    pub fn scenario_count(&self) -> usize {
        scenario_count(&self.sizes())
    }

    /// Metadata headers of every dimension, in registration order.
    pub fn metadata(&self) -> Vec<String> {
        self.dimensions
            .iter()
            .flat_map(|d| d.headers().iter().cloned())
            .collect()
    }

    fn sizes(&self) -> Vec<usize> {
        self.dimensions.iter().map(Dimension::len).collect()
    }

    /// Run every pending scenario and report the outcome.
    ///
    /// Scenario failures are recorded in the summary and do not stop
    /// other scenarios unless `halt_on_exception` is set.
    ///
    /// # Errors
    ///
    /// - [`ExperimentError::ProgressLogMismatch`] or
    ///   [`ExperimentError::ProgressLogFormat`] when resuming from an
    ///   incompatible or corrupt log.
    /// - [`ExperimentError::DimensionMetadataMismatch`] when a point
    ///   returns the wrong number of values.
    /// - [`ExperimentError::ScenarioFailed`] for the first failure when
    ///   `halt_on_exception` is set.
    /// - [`ExperimentError::Io`] or [`ExperimentError::WorkerSpawn`].
    pub fn execute(mut self) -> Result<ExperimentSummary, ExperimentError> {
        let started = Instant::now();
        let metadata = self.metadata();
        let sizes = self.sizes();
        let count = scenario_count(&sizes);

        let previous = self.load_progress(&metadata, count)?;
        let mut ctx = ExperimentContext::new(metadata.clone(), count);
        for (&scenario, values) in &previous {
            ctx.set_metadata(scenario, values.clone());
            ctx.set_status(scenario, ScenarioStatus::PreviouslySucceeded);
        }
        let log = match &self.config.progress_log {
            Some(path) if previous.is_empty() => Some(ProgressLogWriter::create(path, &metadata)?),
            Some(path) => Some(ProgressLogWriter::rewrite(path, &metadata, &previous)?),
            None => None,
        };

        let pending: Vec<usize> = (0..count).filter(|s| !previous.contains_key(s)).collect();
        let threads = self.config.resolved_thread_count();
        info!(
            scenarios = count,
            pending = pending.len(),
            threads,
            "experiment starting"
        );

        let stop = AtomicBool::new(false);
        let shared = Shared {
            plugins: &self.plugins,
            dimensions: &self.dimensions,
            sizes: &sizes,
            config: &self.config.simulation,
            forward_output: !self.handlers.output.is_empty(),
        };
        let mut collector = Collector {
            ctx,
            handlers: &mut self.handlers,
            log,
            halt_on_exception: self.config.halt_on_exception,
            stop: &stop,
            succeeded: 0,
            failed: BTreeMap::new(),
            fatal: None,
        };

        collector.open();
        if threads == 0 {
            run_inline(&shared, &pending, &stop, &mut collector);
        } else if let Err(e) = run_pool(&shared, &pending, threads, &stop, &mut collector) {
            collector.fail(e);
        }
        collector.close();

        let summary = ExperimentSummary {
            scenario_count: count,
            succeeded: collector.succeeded,
            previously_succeeded: previous.len(),
            not_run: collector.ctx.scenarios_with_status(ScenarioStatus::Ready).len(),
            failed: collector.failed,
            wall_us: started.elapsed().as_micros() as u64,
        };
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed.len(),
            previously_succeeded = summary.previously_succeeded,
            not_run = summary.not_run,
            wall_us = summary.wall_us,
            "experiment finished"
        );
        match collector.fatal {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    /// Completed scenarios from the progress log, when resuming.
    fn load_progress(
        &self,
        metadata: &[String],
        count: usize,
    ) -> Result<BTreeMap<usize, Vec<String>>, ExperimentError> {
        let (Some(path), true) = (&self.config.progress_log, self.config.continue_from_progress_log)
        else {
            return Ok(BTreeMap::new());
        };
        if !path.exists() {
            debug!(path = %path.display(), "no progress log to resume from");
            return Ok(BTreeMap::new());
        }
        let progress = read_progress_log(path)?;
        if progress.metadata != metadata {
            return Err(ExperimentError::ProgressLogMismatch {
                recorded: progress.metadata,
                current: metadata.to_vec(),
            });
        }
        let mut completed = progress.completed;
        let before = completed.len();
        completed.retain(|&scenario, _| scenario < count);
        if completed.len() < before {
            warn!(
                dropped = before - completed.len(),
                "progress log records scenarios beyond the current cross-product"
            );
        }
        Ok(completed)
    }
}

// ── Workers ────────────────────────────────────────────────────────

/// Read-only inputs shared by every worker.
struct Shared<'a> {
    plugins: &'a [Plugin],
    dimensions: &'a [Dimension],
    sizes: &'a [usize],
    config: &'a SimulationConfig,
    forward_output: bool,
}

fn run_inline(shared: &Shared<'_>, pending: &[usize], stop: &AtomicBool, collector: &mut Collector<'_>) {
    for &scenario in pending {
        if stop.load(Ordering::Acquire) {
            break;
        }
        let (tx, rx) = crossbeam_channel::unbounded();
        run_task(shared, scenario, &tx);
        drop(tx);
        for message in rx.try_iter() {
            collector.handle(message);
        }
    }
}

fn run_pool(
    shared: &Shared<'_>,
    pending: &[usize],
    threads: usize,
    stop: &AtomicBool,
    collector: &mut Collector<'_>,
) -> Result<(), ExperimentError> {
    let workers = threads.min(pending.len());
    thread::scope(|scope| -> Result<(), ExperimentError> {
        let (task_tx, task_rx) = crossbeam_channel::unbounded::<usize>();
        for &scenario in pending {
            let _ = task_tx.send(scenario);
        }
        drop(task_tx);

        let (message_tx, message_rx) = crossbeam_channel::bounded(workers.max(1) * 64);
        for index in 0..workers {
            let tasks = task_rx.clone();
            let messages = message_tx.clone();
            thread::Builder::new()
                .name(format!("cadence-worker-{index}"))
                .spawn_scoped(scope, move || worker_loop(shared, &tasks, &messages, stop))
                .map_err(|source| {
                    stop.store(true, Ordering::Release);
                    ExperimentError::WorkerSpawn { index, source }
                })?;
        }
        drop(message_tx);

        for message in message_rx.iter() {
            collector.handle(message);
        }
        Ok(())
    })
}

/// Main loop for a worker thread.
///
/// Runs until the task channel is drained, the stop flag is raised, or
/// the collector hangs up.
fn worker_loop(
    shared: &Shared<'_>,
    tasks: &Receiver<usize>,
    messages: &Sender<WorkerMessage>,
    stop: &AtomicBool,
) {
    while let Ok(scenario) = tasks.recv() {
        if stop.load(Ordering::Acquire) {
            break;
        }
        if !run_task(shared, scenario, messages) {
            break;
        }
    }
}

/// Run one scenario, catching panics. Returns `false` if the collector
/// is gone.
fn run_task(shared: &Shared<'_>, scenario: usize, messages: &Sender<WorkerMessage>) -> bool {
    debug!(scenario, "scenario starting");
    let result = panic::catch_unwind(AssertUnwindSafe(|| run_scenario(shared, scenario, messages)))
        .unwrap_or_else(|payload| Err(ScenarioError::Panic(panic_message(payload.as_ref()))));
    messages
        .send(WorkerMessage::Finished { scenario, result })
        .is_ok()
}

fn run_scenario(
    shared: &Shared<'_>,
    scenario: usize,
    messages: &Sender<WorkerMessage>,
) -> Result<ScenarioRun, ScenarioError> {
    let mut plugins = shared.plugins.to_vec();
    let mut metadata = Vec::new();
    let points = point_indices(scenario, shared.sizes);
    for (dimension, (dim, index)) in shared.dimensions.iter().zip(points).enumerate() {
        let point = dim.point(index);
        let values = point(&mut DimensionContext::new(&mut plugins))?;
        if values.len() != dim.headers().len() {
            return Err(ScenarioError::Metadata {
                dimension,
                expected: dim.headers().len(),
                actual: values.len(),
            });
        }
        metadata.extend(values);
    }
    let _ = messages.send(WorkerMessage::Started { scenario, metadata });

    let mut builder = Simulation::builder()
        .add_plugins(plugins)
        .set_config(shared.config.clone());
    if shared.forward_output {
        let sender = messages.clone();
        builder = builder.set_output_consumer(move |item| {
            let _ = sender.send(WorkerMessage::Output { scenario, item });
        });
    }
    let mut simulation = builder.build()?;
    let outcome = simulation.execute()?;
    Ok(ScenarioRun {
        outcome,
        metrics: simulation.metrics().clone(),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

// ── Collector ──────────────────────────────────────────────────────

/// Single consumer of worker messages, on the calling thread.
struct Collector<'a> {
    ctx: ExperimentContext,
    handlers: &'a mut Handlers,
    log: Option<ProgressLogWriter<BufWriter<File>>>,
    halt_on_exception: bool,
    stop: &'a AtomicBool,
    succeeded: usize,
    failed: BTreeMap<usize, ScenarioError>,
    fatal: Option<ExperimentError>,
}

impl Collector<'_> {
    fn open(&mut self) {
        for handler in &mut self.handlers.experiment_open {
            handler(&self.ctx);
        }
    }

    fn close(&mut self) {
        for handler in &mut self.handlers.experiment_close {
            handler(&self.ctx);
        }
    }

    /// Record `error` as the run's result and stop handing out scenarios.
    /// The first fatal error wins.
    fn fail(&mut self, error: ExperimentError) {
        self.stop.store(true, Ordering::Release);
        if self.fatal.is_none() {
            self.fatal = Some(error);
        }
    }

    fn handle(&mut self, message: WorkerMessage) {
        match message {
            WorkerMessage::Started { scenario, metadata } => {
                self.ctx.set_metadata(scenario, metadata);
                self.ctx.set_status(scenario, ScenarioStatus::Running);
                for handler in &mut self.handlers.simulation_open {
                    handler(&self.ctx, scenario);
                }
            }
            WorkerMessage::Output { scenario, item } => {
                let tag = item.tag();
                for sub in &mut self.handlers.output {
                    if sub.tag.map_or(true, |t| t == tag) {
                        (sub.handler)(&self.ctx, scenario, &item);
                    }
                }
            }
            WorkerMessage::Finished { scenario, result } => {
                match result {
                    Ok(run) => self.succeed(scenario, &run),
                    Err(error) => self.record_failure(scenario, error),
                }
                for handler in &mut self.handlers.simulation_close {
                    handler(&self.ctx, scenario);
                }
            }
        }
    }

    fn succeed(&mut self, scenario: usize, run: &ScenarioRun) {
        debug!(
            scenario,
            outcome = ?run.outcome,
            plans = run.metrics.plans_executed,
            final_time = run.metrics.final_time,
            "scenario succeeded"
        );
        self.ctx.set_status(scenario, ScenarioStatus::Succeeded);
        self.succeeded += 1;
        let written = match self.log.as_mut() {
            Some(log) => log.record(scenario, self.ctx.scenario_metadata(scenario).unwrap_or(&[])),
            None => Ok(()),
        };
        if let Err(e) = written {
            self.fail(e);
        }
    }

    fn record_failure(&mut self, scenario: usize, error: ScenarioError) {
        warn!(scenario, %error, "scenario failed");
        self.ctx.set_status(scenario, ScenarioStatus::Failed);
        if let ScenarioError::Metadata {
            dimension,
            expected,
            actual,
        } = error
        {
            self.fail(ExperimentError::DimensionMetadataMismatch {
                scenario,
                dimension,
                expected,
                actual,
            });
        } else if self.halt_on_exception {
            self.fail(ExperimentError::ScenarioFailed {
                scenario,
                source: error.clone(),
            });
        }
        self.failed.insert(scenario, error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_messages_are_extracted() {
        let payload = panic::catch_unwind(|| panic!("static message")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static message");
        let payload = panic::catch_unwind(|| panic!("formatted {}", 7)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "formatted 7");
    }

    #[test]
    fn metadata_concatenates_headers() {
        let experiment = Experiment::builder()
            .add_dimension(Dimension::builder().add_metadata("a").build())
            .add_dimension(
                Dimension::builder()
                    .add_metadata("b")
                    .add_metadata("c")
                    .build(),
            )
            .build()
            .unwrap();
        assert_eq!(experiment.metadata(), vec!["a", "b", "c"]);
        assert_eq!(experiment.scenario_count(), 0);
    }
}
