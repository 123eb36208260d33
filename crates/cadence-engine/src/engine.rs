//! Per-run engine state shared by every context.
//!
//! [`Engine`] owns the scheduler, the dispatcher, the participant
//! registries and the work queue for one simulation run. Contexts borrow
//! it mutably for the duration of a single plan, handler or initializer.
//!
//! # Work queue
//!
//! Released events and initializations of actors and reports added
//! mid-run are appended to a FIFO work queue. The queue is drained by the
//! outermost call that produced work, before that call returns. Two
//! situations defer the drain:
//!
//! - a drain is already in progress further up the stack, which will pick
//!   the new work up in order;
//! - a data manager is on loan (see [`Engine::lend_data_manager`]), in
//!   which case the drain happens when the last loan ends, so that
//!   handlers never observe a manager that is mid-mutation.

use std::any::{type_name, Any};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::mem;
use std::rc::Rc;

use indexmap::IndexSet;
use tracing::{trace, warn};

use cadence_core::{
    Activity, ActorId, ContractError, ContractErrorKind, ContractResult, DataManagerId, Event,
    Lookup, PlanKey, PluginId, ReportId, TypeTag,
};

use crate::capability::{Capability, CapabilityRegistry};
use crate::config::SimulationConfig;
use crate::context::{
    ActorContext, ActorPlan, DataManager, DataManagerAliases, DataManagerContext, DataManagerPlan,
    DataManagerRef, LabelContext, ReportContext, ReportPlan,
};
use crate::dispatch::{Delivery, Dispatcher, EventPhase};
use crate::metrics::RunMetrics;
use crate::output::{OutputConsumer, OutputItem};
use crate::scheduler::{DuePlan, PlanScheduler};
use crate::simulation::SimulationState;

// ── Origins and owners ─────────────────────────────────────────────

/// The participant whose code released an event.
///
/// Recorded when the event is queued and handed to data manager handlers
/// through their context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DispatchOrigin {
    /// An actor's plan, handler or initializer, including data manager
    /// calls it made through `with_data_manager`.
    Actor(ActorId),
    /// A data manager's own plan, handler or initializer.
    DataManager(DataManagerId),
    /// A report's plan, handler or initializer.
    Report(ReportId),
    /// Engine code outside any participant, such as plugin initializers.
    Simulation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum PlanOwner {
    Actor(ActorId),
    DataManager(DataManagerId),
    Report(ReportId),
}

// ── Type-erased data manager closures ──────────────────────────────

type DataManagerRunner = fn(&mut Engine, DataManagerId, Box<dyn Any>) -> ContractResult<()>;
type DataManagerInit = fn(&mut Engine, DataManagerId) -> ContractResult<()>;
type EventDelivery = fn(&mut Engine, DispatchOrigin, &dyn Any) -> ContractResult<()>;

/// A [`DataManagerPlan`] with its manager type erased.
pub(crate) struct ErasedDataManagerPlan {
    run: DataManagerRunner,
    plan: Box<dyn Any>,
}

impl ErasedDataManagerPlan {
    pub(crate) fn new<D: DataManager>(plan: DataManagerPlan<D>) -> Self {
        Self {
            run: run_data_manager_plan::<D>,
            plan: Box::new(plan),
        }
    }

    pub(crate) fn into_typed<D: DataManager>(self) -> Option<DataManagerPlan<D>> {
        self.plan.downcast::<DataManagerPlan<D>>().ok().map(|p| *p)
    }

    fn run(self, engine: &mut Engine, id: DataManagerId) -> ContractResult<()> {
        (self.run)(engine, id, self.plan)
    }
}

fn run_data_manager_plan<D: DataManager>(
    engine: &mut Engine,
    id: DataManagerId,
    plan: Box<dyn Any>,
) -> ContractResult<()> {
    let plan = plan.downcast::<DataManagerPlan<D>>().map_err(|_| {
        ContractError::with_details(ContractErrorKind::UnknownDataManager, type_name::<D>())
    })?;
    engine.lend_data_manager::<D, ()>(id, true, None, move |dm, ctx| (*plan)(dm, ctx))
}

fn init_data_manager<D: DataManager>(engine: &mut Engine, id: DataManagerId) -> ContractResult<()> {
    engine.lend_data_manager::<D, ()>(id, true, None, |dm, ctx| dm.init(ctx))
}

// ── Queued work ────────────────────────────────────────────────────

pub(crate) enum PlanAction {
    Actor(ActorPlan),
    DataManager(ErasedDataManagerPlan),
    Report(ReportPlan),
}

enum Work {
    Event {
        origin: DispatchOrigin,
        event: Box<dyn Any>,
        deliver: EventDelivery,
    },
    InitActor(ActorId, ActorPlan),
    InitReport(ReportId, ReportPlan),
}

pub(crate) enum CloseCallback {
    Actor(ActorId, ActorPlan),
    DataManager(DataManagerId, ErasedDataManagerPlan),
    Report(ReportId, ReportPlan),
}

/// Participants registered by plugin initializers, initialized in bulk
/// once every plugin has run.
#[derive(Default)]
pub(crate) struct Startup {
    data_managers: Vec<(DataManagerId, DataManagerInit)>,
    reports: Vec<(ReportId, ReportPlan)>,
    actors: Vec<(ActorId, ActorPlan)>,
}

struct DataManagerSlot {
    cell: Rc<dyn Any>,
    plugin: PluginId,
}

// ── Engine ─────────────────────────────────────────────────────────

/// Mutable state of one simulation run.
pub struct Engine {
    pub(crate) scheduler: PlanScheduler<PlanOwner, PlanAction>,
    pub(crate) dispatcher: Dispatcher,
    next_actor: usize,
    actors: IndexSet<ActorId>,
    data_managers: Vec<DataManagerSlot>,
    data_manager_caps: CapabilityRegistry,
    data_view_caps: CapabilityRegistry,
    reports: IndexSet<ReportId>,
    work: VecDeque<Work>,
    draining: bool,
    loans: usize,
    focal: DispatchOrigin,
    startup: Option<Startup>,
    closing: bool,
    halted: bool,
    pub(crate) state: SimulationState,
    close_callbacks: Vec<CloseCallback>,
    output: OutputConsumer,
    pub(crate) metrics: RunMetrics,
}

impl Engine {
    pub(crate) fn new(config: &SimulationConfig, output: OutputConsumer) -> Self {
        Self {
            scheduler: PlanScheduler::new(config.start_time),
            dispatcher: Dispatcher::default(),
            next_actor: 0,
            actors: IndexSet::new(),
            data_managers: Vec::new(),
            data_manager_caps: CapabilityRegistry::default(),
            data_view_caps: CapabilityRegistry::default(),
            reports: IndexSet::new(),
            work: VecDeque::new(),
            draining: false,
            loans: 0,
            focal: DispatchOrigin::Simulation,
            startup: Some(Startup::default()),
            closing: false,
            halted: false,
            state: SimulationState::Running,
            close_callbacks: Vec::new(),
            output,
            metrics: RunMetrics::default(),
        }
    }

    pub(crate) fn time(&self) -> f64 {
        self.scheduler.time()
    }

    pub(crate) fn halt(&mut self) {
        if !self.halted {
            trace!(time = self.time(), "halt requested");
        }
        self.halted = true;
    }

    pub(crate) fn is_halted(&self) -> bool {
        self.halted
    }

    pub(crate) fn contract_violation(
        &self,
        kind: ContractErrorKind,
        details: Option<String>,
    ) -> ContractError {
        warn!(%kind, details = details.as_deref().unwrap_or(""), time = self.time(), "contract violation");
        ContractError { kind, details }
    }

    // ── Actors ─────────────────────────────────────────────────

    pub(crate) fn add_actor(&mut self, init: ActorPlan) -> ContractResult<ActorId> {
        let id = ActorId(self.next_actor);
        self.next_actor += 1;
        self.actors.insert(id);
        self.metrics.actors_added += 1;
        trace!(actor = %id, "actor added");
        match self.startup.as_mut() {
            Some(startup) => startup.actors.push((id, init)),
            None => self.enqueue(Work::InitActor(id, init))?,
        }
        Ok(id)
    }

    pub(crate) fn remove_actor(&mut self, id: ActorId) -> ContractResult<()> {
        if !self.actors.shift_remove(&id) {
            return Err(ContractError::with_details(
                ContractErrorKind::UnknownActorId,
                format!("actor {id}"),
            ));
        }
        let dropped = self.scheduler.remove_owner(PlanOwner::Actor(id));
        self.dispatcher.remove_actor(id);
        self.close_callbacks
            .retain(|cb| !matches!(cb, CloseCallback::Actor(owner, _) if *owner == id));
        self.metrics.actors_removed += 1;
        trace!(actor = %id, dropped_plans = dropped, "actor removed");
        Ok(())
    }

    pub(crate) fn actor_exists(&self, id: ActorId) -> bool {
        self.actors.contains(&id)
    }

    pub(crate) fn require_actor(&self, id: ActorId) -> ContractResult<()> {
        if self.actor_exists(id) {
            Ok(())
        } else {
            Err(ContractError::with_details(
                ContractErrorKind::UnknownActorId,
                format!("actor {id}"),
            ))
        }
    }

    pub(crate) fn run_as_actor<R>(
        &mut self,
        id: ActorId,
        f: impl FnOnce(&mut ActorContext<'_>) -> ContractResult<R>,
    ) -> ContractResult<R> {
        let previous = mem::replace(&mut self.focal, DispatchOrigin::Actor(id));
        let result = f(&mut ActorContext::new(self, id));
        self.focal = previous;
        result
    }

    // ── Reports ────────────────────────────────────────────────

    pub(crate) fn add_report(&mut self, id: ReportId, init: ReportPlan) -> ContractResult<()> {
        if !self.reports.insert(id) {
            return Err(ContractError::with_details(
                ContractErrorKind::DuplicateReportId,
                id.to_string(),
            ));
        }
        trace!(report = %id, "report added");
        match self.startup.as_mut() {
            Some(startup) => {
                startup.reports.push((id, init));
                Ok(())
            }
            None => self.enqueue(Work::InitReport(id, init)),
        }
    }

    pub(crate) fn run_as_report<R>(
        &mut self,
        id: ReportId,
        f: impl FnOnce(&mut ReportContext<'_>) -> ContractResult<R>,
    ) -> ContractResult<R> {
        let previous = mem::replace(&mut self.focal, DispatchOrigin::Report(id));
        let result = f(&mut ReportContext::new(self, id));
        self.focal = previous;
        result
    }

    // ── Data managers ──────────────────────────────────────────

    /// Register a data manager. Only valid while plugins initialize.
    pub(crate) fn add_data_manager<D: DataManager>(
        &mut self,
        manager: D,
        plugin: PluginId,
    ) -> ContractResult<DataManagerId> {
        let id = DataManagerId(self.data_managers.len());
        let Some(startup) = self.startup.as_mut() else {
            return Err(ContractError::with_details(
                ContractErrorKind::DataManagerAddedAfterInitialization,
                type_name::<D>(),
            ));
        };
        startup.data_managers.push((id, init_data_manager::<D>));

        let cell = Rc::new(RefCell::new(manager));
        let mut aliases = DataManagerAliases::new(Rc::clone(&cell));
        D::expose(&mut aliases);
        let mut capability = Capability::new(
            id.0,
            TypeTag::of::<D>(),
            DataManagerRef::from_cell(Rc::clone(&cell)),
        );
        capability.add_aliases(aliases.into_handles());
        self.data_manager_caps.register(capability);
        self.data_managers.push(DataManagerSlot { cell, plugin });
        trace!(data_manager = %id, kind = type_name::<D>(), plugin = %plugin, "data manager added");
        Ok(id)
    }

    pub(crate) fn lookup_data_manager<D: ?Sized + 'static>(&self) -> Lookup<DataManagerRef<D>> {
        self.data_manager_caps
            .lookup::<DataManagerRef<D>>(TypeTag::of::<D>())
            .map(|(_, r)| r)
    }

    /// ID of the unique data manager of exact type `D`.
    pub(crate) fn resolve_data_manager<D: DataManager>(&self) -> ContractResult<DataManagerId> {
        match self
            .data_manager_caps
            .lookup::<DataManagerRef<D>>(TypeTag::of::<D>())
        {
            Lookup::Found((owner, _)) => Ok(DataManagerId(owner)),
            Lookup::NotFound => Err(ContractError::with_details(
                ContractErrorKind::UnknownDataManager,
                type_name::<D>(),
            )),
            Lookup::Ambiguous => Err(ContractError::with_details(
                ContractErrorKind::AmbiguousDataManagerClass,
                type_name::<D>(),
            )),
        }
    }

    pub(crate) fn data_manager_plugin(&self, id: DataManagerId) -> Option<PluginId> {
        self.data_managers.get(id.0).map(|slot| slot.plugin)
    }

    fn data_manager_cell<D: DataManager>(&self, id: DataManagerId) -> ContractResult<Rc<RefCell<D>>> {
        self.data_managers
            .get(id.0)
            .and_then(|slot| Rc::clone(&slot.cell).downcast::<RefCell<D>>().ok())
            .ok_or_else(|| {
                ContractError::with_details(
                    ContractErrorKind::UnknownDataManager,
                    format!("{} with id {id}", type_name::<D>()),
                )
            })
    }

    /// Lend data manager `id` mutably to `f` together with its context.
    ///
    /// When `as_focal` is set the manager becomes the current participant,
    /// so events it releases originate from it; otherwise they keep the
    /// caller's origin. `origin` is the origin of the event being resolved
    /// when the loan serves an event handler.
    ///
    /// # Errors
    ///
    /// [`ContractErrorKind::DataManagerBusy`] if the manager is already on
    /// loan further up the stack, plus anything `f` or the subsequent
    /// work-queue drain returns.
    pub(crate) fn lend_data_manager<D: DataManager, R>(
        &mut self,
        id: DataManagerId,
        as_focal: bool,
        origin: Option<DispatchOrigin>,
        f: impl FnOnce(&mut D, &mut DataManagerContext<'_, D>) -> ContractResult<R>,
    ) -> ContractResult<R> {
        let cell = self.data_manager_cell::<D>(id)?;
        let mut manager = cell.try_borrow_mut().map_err(|_| {
            ContractError::with_details(ContractErrorKind::DataManagerBusy, type_name::<D>())
        })?;
        let previous = as_focal.then(|| mem::replace(&mut self.focal, DispatchOrigin::DataManager(id)));
        self.loans += 1;
        let result = f(&mut *manager, &mut DataManagerContext::new(self, id, origin));
        self.loans -= 1;
        if let Some(previous) = previous {
            self.focal = previous;
        }
        drop(manager);
        let value = result?;
        self.flush()?;
        Ok(value)
    }

    // ── Data views ─────────────────────────────────────────────

    pub(crate) fn publish_data_view(&mut self, capability: Capability) {
        self.data_view_caps.register(capability);
    }

    pub(crate) fn lookup_data_view<V: ?Sized + 'static>(&self) -> Lookup<Rc<V>> {
        self.data_view_caps
            .lookup::<Rc<V>>(TypeTag::of::<V>())
            .map(|(_, v)| v)
    }

    // ── Plans ──────────────────────────────────────────────────

    pub(crate) fn schedule(
        &mut self,
        owner: PlanOwner,
        time: f64,
        key: Option<PlanKey>,
        activity: Activity,
        action: PlanAction,
    ) -> ContractResult<()> {
        if self.closing {
            return Err(ContractError::with_details(
                ContractErrorKind::PlanningAfterClose,
                format!("{owner:?} at time {time}"),
            ));
        }
        self.scheduler.schedule(owner, time, key, activity, action)?;
        trace!(?owner, time, ?activity, "plan added");
        Ok(())
    }

    pub(crate) fn execute_plan(&mut self, due: DuePlan<PlanOwner, PlanAction>) -> ContractResult<()> {
        self.metrics.plans_executed += 1;
        trace!(owner = ?due.owner, time = due.time, key = ?due.key, "executing plan");
        match (due.owner, due.payload) {
            (PlanOwner::Actor(id), PlanAction::Actor(plan)) => self.run_as_actor(id, plan)?,
            (PlanOwner::DataManager(id), PlanAction::DataManager(plan)) => plan.run(self, id)?,
            (PlanOwner::Report(id), PlanAction::Report(plan)) => self.run_as_report(id, plan)?,
            (owner, _) => {
                return Err(ContractError::with_details(
                    ContractErrorKind::UnknownActorId,
                    format!("plan payload does not match owner {owner:?}"),
                ))
            }
        }
        self.flush()
    }

    // ── Events ─────────────────────────────────────────────────

    pub(crate) fn release_event<E: Event>(&mut self, event: E) -> ContractResult<()> {
        self.metrics.events_released += 1;
        trace!(event = type_name::<E>(), origin = ?self.focal, "event released");
        self.enqueue(Work::Event {
            origin: self.focal,
            event: Box::new(event),
            deliver: deliver_event::<E>,
        })
    }

    // ── Output ─────────────────────────────────────────────────

    pub(crate) fn release_output<T: Any + Send>(&mut self, value: T) {
        self.metrics.outputs_released += 1;
        trace!(output = type_name::<T>(), "output released");
        (self.output)(OutputItem::new(value));
    }

    // ── Close callbacks ────────────────────────────────────────

    pub(crate) fn subscribe_to_close(&mut self, callback: CloseCallback) {
        self.close_callbacks.push(callback);
    }

    /// Run close callbacks in registration order. Callbacks registered
    /// while closing run after the current batch.
    pub(crate) fn close(&mut self) -> ContractResult<()> {
        self.closing = true;
        while !self.close_callbacks.is_empty() {
            for callback in mem::take(&mut self.close_callbacks) {
                match callback {
                    CloseCallback::Actor(id, f) => {
                        if self.actor_exists(id) {
                            self.run_as_actor(id, f)?;
                        }
                    }
                    CloseCallback::DataManager(id, f) => f.run(self, id)?,
                    CloseCallback::Report(id, f) => self.run_as_report(id, f)?,
                }
                self.flush()?;
            }
        }
        Ok(())
    }

    // ── Startup ────────────────────────────────────────────────

    /// Initialize everything plugins registered: data managers first, in
    /// registration order, then reports, then actors.
    pub(crate) fn finish_startup(&mut self) -> ContractResult<()> {
        let Some(startup) = self.startup.take() else {
            return Ok(());
        };
        for (id, init) in startup.data_managers {
            init(self, id)?;
        }
        for (id, init) in startup.reports {
            self.run_as_report(id, init)?;
            self.flush()?;
        }
        for (id, init) in startup.actors {
            if self.actor_exists(id) {
                self.run_as_actor(id, init)?;
                self.flush()?;
            }
        }
        Ok(())
    }

    // ── Work queue ─────────────────────────────────────────────

    fn enqueue(&mut self, work: Work) -> ContractResult<()> {
        self.work.push_back(work);
        self.flush()
    }

    /// Drain the work queue unless a drain or a data manager loan is
    /// already in progress.
    pub(crate) fn flush(&mut self) -> ContractResult<()> {
        if self.draining || self.loans > 0 || self.work.is_empty() {
            return Ok(());
        }
        self.draining = true;
        let mut result = Ok(());
        while let Some(work) = self.work.pop_front() {
            result = self.perform(work);
            if result.is_err() {
                break;
            }
        }
        self.draining = false;
        result
    }

    fn perform(&mut self, work: Work) -> ContractResult<()> {
        match work {
            Work::Event {
                origin,
                event,
                deliver,
            } => deliver(self, origin, event.as_ref()),
            Work::InitActor(id, init) => {
                if self.actor_exists(id) {
                    self.run_as_actor(id, init)?;
                }
                Ok(())
            }
            Work::InitReport(id, init) => self.run_as_report(id, init),
        }
    }
}

/// Resolve one event: data manager phases in order, then actors and
/// reports in subscription order.
fn deliver_event<E: Event>(
    engine: &mut Engine,
    origin: DispatchOrigin,
    event: &dyn Any,
) -> ContractResult<()> {
    let Some(event) = event.downcast_ref::<E>() else {
        return Ok(());
    };
    for phase in EventPhase::ALL {
        for handler in engine.dispatcher.data_manager_handlers::<E>(phase) {
            engine.metrics.event_deliveries += 1;
            handler(engine, origin, event)?;
        }
    }
    let deliveries = {
        let ctx = LabelContext::new(&*engine);
        engine.dispatcher.matching::<E>(&ctx, event)
    };
    for delivery in deliveries {
        match delivery {
            Delivery::Actor(id, handler) => {
                if !engine.actor_exists(id) {
                    continue;
                }
                engine.metrics.event_deliveries += 1;
                engine.run_as_actor(id, |ctx| handler(ctx, event))?;
            }
            Delivery::Report(id, handler) => {
                engine.metrics.event_deliveries += 1;
                engine.run_as_report(id, |ctx| handler(ctx, event))?;
            }
        }
    }
    Ok(())
}
