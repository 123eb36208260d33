use std::any::{type_name, Any};
use std::cell::{BorrowError, Ref, RefCell};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use cadence_core::{
    Activity, ActorId, ContractError, ContractErrorKind, ContractResult, DataManagerId, Event,
    PlanInfo, PlanKey, PluginId, ReportId, TypeTag,
};

use crate::capability::Capability;
use crate::dispatch::{DataManagerHandler, EventLabeler, EventPhase};
use crate::engine::{CloseCallback, DispatchOrigin, Engine, ErasedDataManagerPlan, PlanAction, PlanOwner};

use super::actor::ActorContext;
use super::report::ReportContext;
use super::sealed::Sealed;

/// A deferred data manager action: a plan or a close callback.
pub type DataManagerPlan<D> =
    Box<dyn FnOnce(&mut D, &mut DataManagerContext<'_, D>) -> ContractResult<()>>;

// ── Trait ──────────────────────────────────────────────────────────

/// Owner of a slice of simulation state.
///
/// Data managers are registered by plugins and initialized after every
/// plugin initializer has run, in registration order. They are the only
/// participants that see events in the validation, execution and
/// post-processing phases.
pub trait DataManager: Sized + 'static {
    /// Called once at startup. Typically subscribes to events and
    /// publishes data views.
    fn init(&mut self, ctx: &mut DataManagerContext<'_, Self>) -> ContractResult<()> {
        let _ = ctx;
        Ok(())
    }

    /// Declare additional types, usually trait objects, under which this
    /// manager can be looked up.
    fn expose(aliases: &mut DataManagerAliases<Self>) {
        let _ = aliases;
    }
}

/// Alias declarations collected by [`DataManager::expose`].
pub struct DataManagerAliases<D> {
    cell: Rc<RefCell<D>>,
    handles: Vec<(TypeTag, Box<dyn Any>)>,
}

impl<D: DataManager> DataManagerAliases<D> {
    pub(crate) fn new(cell: Rc<RefCell<D>>) -> Self {
        Self {
            cell,
            handles: Vec::new(),
        }
    }

    /// Make the manager retrievable as `A`.
    ///
    /// ```ignore
    /// aliases.alias::<dyn Census>(|dm| dm);
    /// ```
    pub fn alias<A: ?Sized + 'static>(
        &mut self,
        upcast: fn(Rc<RefCell<D>>) -> Rc<RefCell<A>>,
    ) -> &mut Self {
        let handle = DataManagerRef::from_cell(upcast(Rc::clone(&self.cell)));
        self.handles.push((TypeTag::of::<A>(), Box::new(handle)));
        self
    }

    pub(crate) fn into_handles(self) -> Vec<(TypeTag, Box<dyn Any>)> {
        self.handles
    }
}

/// Shared read-only handle to a registered data manager.
///
/// Mutation goes through `with_data_manager` on a context.
pub struct DataManagerRef<D: ?Sized>(Rc<RefCell<D>>);

impl<D: ?Sized> Clone for DataManagerRef<D> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<D: ?Sized> fmt::Debug for DataManagerRef<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DataManagerRef")
            .field(&type_name::<D>())
            .finish()
    }
}

impl<D: ?Sized> DataManagerRef<D> {
    pub(crate) fn from_cell(cell: Rc<RefCell<D>>) -> Self {
        Self(cell)
    }

    /// Borrow the manager.
    ///
    /// # Panics
    ///
    /// If the manager is currently borrowed mutably, that is, when called
    /// from inside one of its own plans or handlers. Use
    /// [`try_borrow`](Self::try_borrow) there.
    pub fn borrow(&self) -> Ref<'_, D> {
        self.0.borrow()
    }

    /// Borrow the manager, failing if it is borrowed mutably.
    pub fn try_borrow(&self) -> Result<Ref<'_, D>, BorrowError> {
        self.0.try_borrow()
    }
}

// ── Context ────────────────────────────────────────────────────────

/// Context handed to data manager code, alongside `&mut D`.
pub struct DataManagerContext<'a, D> {
    engine: &'a mut Engine,
    id: DataManagerId,
    origin: Option<DispatchOrigin>,
    _manager: PhantomData<fn(&mut D)>,
}

impl<D> Sealed for DataManagerContext<'_, D> {
    fn engine(&self) -> &Engine {
        self.engine
    }
}

impl<'a, D: DataManager> DataManagerContext<'a, D> {
    pub(crate) fn new(
        engine: &'a mut Engine,
        id: DataManagerId,
        origin: Option<DispatchOrigin>,
    ) -> Self {
        Self {
            engine,
            id,
            origin,
            _manager: PhantomData,
        }
    }

    /// The data manager this context acts for.
    pub fn data_manager_id(&self) -> DataManagerId {
        self.id
    }

    /// The plugin that registered this data manager.
    pub fn plugin_id(&self) -> Option<PluginId> {
        self.engine.data_manager_plugin(self.id)
    }

    /// Origin of the event being resolved, inside a phase handler.
    pub fn event_origin(&self) -> Option<DispatchOrigin> {
        self.origin
    }

    /// Whether the event being resolved was released by actor code.
    pub fn current_agent_is_event_source(&self) -> bool {
        matches!(self.origin, Some(DispatchOrigin::Actor(_)))
    }

    fn owner(&self) -> PlanOwner {
        PlanOwner::DataManager(self.id)
    }

    // ── Plans ──────────────────────────────────────────────────

    /// Run `plan` at `time`. Errors as for actor plans.
    pub fn add_plan(
        &mut self,
        time: f64,
        plan: impl FnOnce(&mut D, &mut DataManagerContext<'_, D>) -> ContractResult<()> + 'static,
    ) -> ContractResult<()> {
        self.schedule(time, None, Activity::Active, Box::new(plan))
    }

    /// Run `plan` at `time` under `key`.
    pub fn add_keyed_plan(
        &mut self,
        time: f64,
        key: impl Into<PlanKey>,
        plan: impl FnOnce(&mut D, &mut DataManagerContext<'_, D>) -> ContractResult<()> + 'static,
    ) -> ContractResult<()> {
        self.schedule(time, Some(key.into()), Activity::Active, Box::new(plan))
    }

    /// Run `plan` at `time` if the simulation is still going by then.
    pub fn add_passive_plan(
        &mut self,
        time: f64,
        plan: impl FnOnce(&mut D, &mut DataManagerContext<'_, D>) -> ContractResult<()> + 'static,
    ) -> ContractResult<()> {
        self.schedule(time, None, Activity::Passive, Box::new(plan))
    }

    /// Keyed variant of [`add_passive_plan`](Self::add_passive_plan).
    pub fn add_passive_keyed_plan(
        &mut self,
        time: f64,
        key: impl Into<PlanKey>,
        plan: impl FnOnce(&mut D, &mut DataManagerContext<'_, D>) -> ContractResult<()> + 'static,
    ) -> ContractResult<()> {
        self.schedule(time, Some(key.into()), Activity::Passive, Box::new(plan))
    }

    fn schedule(
        &mut self,
        time: f64,
        key: Option<PlanKey>,
        activity: Activity,
        plan: DataManagerPlan<D>,
    ) -> ContractResult<()> {
        let action = PlanAction::DataManager(ErasedDataManagerPlan::new::<D>(plan));
        self.engine
            .schedule(self.owner(), time, key, activity, action)
    }

    /// The pending plan under `key`, if any.
    pub fn get_plan(&self, key: impl Into<PlanKey>) -> Option<PlanInfo> {
        self.engine.scheduler.get(self.owner(), &key.into())
    }

    /// Time of the pending plan under `key`, if any.
    pub fn get_plan_time(&self, key: impl Into<PlanKey>) -> Option<f64> {
        self.engine.scheduler.plan_time(self.owner(), &key.into())
    }

    /// Cancel the pending plan under `key` and hand back its action.
    pub fn remove_plan(&mut self, key: impl Into<PlanKey>) -> Option<DataManagerPlan<D>> {
        match self.engine.scheduler.remove(self.owner(), &key.into())? {
            PlanAction::DataManager(plan) => plan.into_typed::<D>(),
            _ => None,
        }
    }

    /// Keys of this manager's pending keyed plans, in scheduling order.
    pub fn get_plan_keys(&self) -> Vec<PlanKey> {
        self.engine.scheduler.keys(self.owner())
    }

    // ── Actors and reports ─────────────────────────────────────

    /// Add a new actor; see [`ActorContext::add_actor`].
    pub fn add_actor(
        &mut self,
        init: impl FnOnce(&mut ActorContext<'_>) -> ContractResult<()> + 'static,
    ) -> ContractResult<ActorId> {
        self.engine.add_actor(Box::new(init))
    }

    /// Remove actor `id`.
    pub fn remove_actor(&mut self, id: ActorId) -> ContractResult<()> {
        self.engine.remove_actor(id)
    }

    /// Add report `id`.
    ///
    /// # Errors
    ///
    /// [`ContractErrorKind::DuplicateReportId`] if `id` is taken.
    pub fn add_report(
        &mut self,
        id: ReportId,
        init: impl FnOnce(&mut ReportContext<'_>) -> ContractResult<()> + 'static,
    ) -> ContractResult<()> {
        self.engine.add_report(id, Box::new(init))
    }

    // ── Events ─────────────────────────────────────────────────

    /// Release `event`.
    pub fn release_event<E: Event>(&mut self, event: E) -> ContractResult<()> {
        self.engine.release_event(event)
    }

    /// Handle every event of type `E` in the execution phase.
    pub fn subscribe<E: Event>(
        &mut self,
        handler: impl Fn(&mut D, &mut DataManagerContext<'_, D>, &E) -> ContractResult<()> + 'static,
    ) {
        self.subscribe_in_phase(EventPhase::Execution, handler);
    }

    /// Handle every event of type `E` in the validation phase.
    pub fn subscribe_to_event_validation<E: Event>(
        &mut self,
        handler: impl Fn(&mut D, &mut DataManagerContext<'_, D>, &E) -> ContractResult<()> + 'static,
    ) {
        self.subscribe_in_phase(EventPhase::Validation, handler);
    }

    /// Handle every event of type `E` in the execution phase.
    pub fn subscribe_to_event_execution<E: Event>(
        &mut self,
        handler: impl Fn(&mut D, &mut DataManagerContext<'_, D>, &E) -> ContractResult<()> + 'static,
    ) {
        self.subscribe_in_phase(EventPhase::Execution, handler);
    }

    /// Handle every event of type `E` in the post-processing phase.
    pub fn subscribe_to_event_post_processing<E: Event>(
        &mut self,
        handler: impl Fn(&mut D, &mut DataManagerContext<'_, D>, &E) -> ContractResult<()> + 'static,
    ) {
        self.subscribe_in_phase(EventPhase::PostProcessing, handler);
    }

    /// Handle every event of type `E` in `phase`, replacing any handler
    /// this manager already has for `E` in that phase.
    pub fn subscribe_in_phase<E: Event>(
        &mut self,
        phase: EventPhase,
        handler: impl Fn(&mut D, &mut DataManagerContext<'_, D>, &E) -> ContractResult<()> + 'static,
    ) {
        let id = self.id;
        let erased: DataManagerHandler<E> =
            Rc::new(move |engine: &mut Engine, origin: DispatchOrigin, event: &E| {
                engine.lend_data_manager::<D, ()>(id, true, Some(origin), |dm, ctx| {
                    handler(dm, ctx, event)
                })
            });
        self.engine
            .dispatcher
            .subscribe_data_manager(phase, id, erased);
    }

    /// Drop this manager's handlers for `E` in every phase.
    pub fn unsubscribe<E: Event>(&mut self) {
        self.engine.dispatcher.unsubscribe_data_manager::<E>(self.id);
    }

    /// Register a labeler so actors and reports can subscribe to labels
    /// computed by it.
    ///
    /// # Errors
    ///
    /// [`ContractErrorKind::DuplicateEventLabeler`] if a labeler with the
    /// same ID is registered for `E`.
    pub fn add_event_labeler<E: Event>(&mut self, labeler: EventLabeler<E>) -> ContractResult<()> {
        self.engine.dispatcher.add_labeler(labeler)
    }

    // ── Data views ─────────────────────────────────────────────

    /// Publish `view` under its own type.
    pub fn publish_data_view<V: 'static>(&mut self, view: V) -> Rc<V> {
        let view = Rc::new(view);
        self.engine.publish_data_view(Capability::new(
            self.id.0,
            TypeTag::of::<V>(),
            Rc::clone(&view),
        ));
        view
    }

    /// Publish `view` under its own type and as `A`.
    ///
    /// ```ignore
    /// ctx.publish_data_view_as::<_, dyn PeopleView>(view, |v| v);
    /// ```
    pub fn publish_data_view_as<V: 'static, A: ?Sized + 'static>(
        &mut self,
        view: V,
        upcast: fn(Rc<V>) -> Rc<A>,
    ) -> Rc<V> {
        let view = Rc::new(view);
        let mut capability = Capability::new(self.id.0, TypeTag::of::<V>(), Rc::clone(&view));
        capability.alias(TypeTag::of::<A>(), upcast(Rc::clone(&view)));
        self.engine.publish_data_view(capability);
        view
    }

    // ── Other data managers ────────────────────────────────────

    /// Borrow another data manager of exact type `U` mutably.
    ///
    /// # Errors
    ///
    /// As [`ActorContext::with_data_manager`]; asking for `D` itself
    /// always fails with [`ContractErrorKind::DataManagerBusy`].
    pub fn with_data_manager<U: DataManager, R>(
        &mut self,
        f: impl FnOnce(&mut U, &mut DataManagerContext<'_, U>) -> ContractResult<R>,
    ) -> ContractResult<R> {
        let id = self.engine.resolve_data_manager::<U>()?;
        self.engine.lend_data_manager(id, false, None, f)
    }

    // ── Output and lifecycle ───────────────────────────────────

    /// Hand `value` to the simulation's output consumer.
    pub fn release_output<T: Any + Send>(&mut self, value: T) {
        self.engine.release_output(value);
    }

    /// Run `f` when the simulation closes.
    pub fn subscribe_to_simulation_close(
        &mut self,
        f: impl FnOnce(&mut D, &mut DataManagerContext<'_, D>) -> ContractResult<()> + 'static,
    ) {
        let plan: DataManagerPlan<D> = Box::new(f);
        self.engine.subscribe_to_close(CloseCallback::DataManager(
            self.id,
            ErasedDataManagerPlan::new::<D>(plan),
        ));
    }

    /// Stop the simulation after the current plan.
    pub fn halt(&mut self) {
        self.engine.halt();
    }

    /// Build a contract violation for model code to return.
    pub fn contract_violation(
        &self,
        kind: ContractErrorKind,
        details: Option<&str>,
    ) -> ContractError {
        let details = details.map(|d| format!("{}: {d}", type_name::<D>()));
        self.engine.contract_violation(kind, details)
    }
}
