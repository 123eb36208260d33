use std::any::Any;
use std::rc::Rc;

use cadence_core::{
    Activity, ActorId, ContractError, ContractErrorKind, ContractResult, Event, EventLabel,
    PlanInfo, PlanKey,
};

use crate::dispatch::{Delivery, Subscriber};
use crate::engine::{CloseCallback, Engine, PlanAction, PlanOwner};

use super::data_manager::{DataManager, DataManagerContext};
use super::sealed::Sealed;

/// A deferred actor action: a plan, an initializer or a close callback.
pub type ActorPlan = Box<dyn FnOnce(&mut ActorContext<'_>) -> ContractResult<()>>;

/// Context handed to actor code.
///
/// Plans and subscriptions made through it are owned by the actor and
/// disappear when the actor is removed.
pub struct ActorContext<'a> {
    engine: &'a mut Engine,
    id: ActorId,
}

impl Sealed for ActorContext<'_> {
    fn engine(&self) -> &Engine {
        self.engine
    }
}

impl<'a> ActorContext<'a> {
    pub(crate) fn new(engine: &'a mut Engine, id: ActorId) -> Self {
        Self { engine, id }
    }

    /// The actor this context acts for.
    pub fn actor_id(&self) -> ActorId {
        self.id
    }

    fn owner(&self) -> PlanOwner {
        PlanOwner::Actor(self.id)
    }

    // ── Plans ──────────────────────────────────────────────────

    /// Run `plan` at `time`.
    ///
    /// # Errors
    ///
    /// [`ContractErrorKind::PastPlanningTime`] if `time` is before the
    /// current time, [`ContractErrorKind::InvalidPlanTime`] if it is not
    /// finite, [`ContractErrorKind::UnknownActorId`] if the actor has been
    /// removed, [`ContractErrorKind::PlanningAfterClose`] once the
    /// simulation is closing.
    pub fn add_plan(
        &mut self,
        time: f64,
        plan: impl FnOnce(&mut ActorContext<'_>) -> ContractResult<()> + 'static,
    ) -> ContractResult<()> {
        self.schedule(time, None, Activity::Active, Box::new(plan))
    }

    /// Run `plan` at `time` under `key`, which can later retrieve or
    /// cancel it.
    ///
    /// # Errors
    ///
    /// As [`add_plan`](Self::add_plan), plus
    /// [`ContractErrorKind::DuplicatePlanKey`] if the actor already has a
    /// pending plan under `key`.
    pub fn add_keyed_plan(
        &mut self,
        time: f64,
        key: impl Into<PlanKey>,
        plan: impl FnOnce(&mut ActorContext<'_>) -> ContractResult<()> + 'static,
    ) -> ContractResult<()> {
        self.schedule(time, Some(key.into()), Activity::Active, Box::new(plan))
    }

    /// Run `plan` at `time` if the simulation is still going by then.
    /// Passive plans alone do not keep the simulation running.
    pub fn add_passive_plan(
        &mut self,
        time: f64,
        plan: impl FnOnce(&mut ActorContext<'_>) -> ContractResult<()> + 'static,
    ) -> ContractResult<()> {
        self.schedule(time, None, Activity::Passive, Box::new(plan))
    }

    /// Keyed variant of [`add_passive_plan`](Self::add_passive_plan).
    pub fn add_passive_keyed_plan(
        &mut self,
        time: f64,
        key: impl Into<PlanKey>,
        plan: impl FnOnce(&mut ActorContext<'_>) -> ContractResult<()> + 'static,
    ) -> ContractResult<()> {
        self.schedule(time, Some(key.into()), Activity::Passive, Box::new(plan))
    }

    fn schedule(
        &mut self,
        time: f64,
        key: Option<PlanKey>,
        activity: Activity,
        plan: ActorPlan,
    ) -> ContractResult<()> {
        self.engine.require_actor(self.id)?;
        self.engine
            .schedule(self.owner(), time, key, activity, PlanAction::Actor(plan))
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
    pub fn remove_plan(&mut self, key: impl Into<PlanKey>) -> Option<ActorPlan> {
        match self.engine.scheduler.remove(self.owner(), &key.into())? {
            PlanAction::Actor(plan) => Some(plan),
            _ => None,
        }
    }

    /// Keys of this actor's pending keyed plans, in scheduling order.
    pub fn get_plan_keys(&self) -> Vec<PlanKey> {
        self.engine.scheduler.keys(self.owner())
    }

    // ── Actors ─────────────────────────────────────────────────

    /// Add a new actor. `init` runs once the current plan or handler has
    /// finished, before any event released after this call is delivered.
    pub fn add_actor(
        &mut self,
        init: impl FnOnce(&mut ActorContext<'_>) -> ContractResult<()> + 'static,
    ) -> ContractResult<ActorId> {
        self.engine.add_actor(Box::new(init))
    }

    /// Remove actor `id`, cancelling its plans and subscriptions. An
    /// actor may remove itself.
    ///
    /// # Errors
    ///
    /// [`ContractErrorKind::UnknownActorId`] if `id` is not registered.
    pub fn remove_actor(&mut self, id: ActorId) -> ContractResult<()> {
        self.engine.remove_actor(id)
    }

    // ── Events ─────────────────────────────────────────────────

    /// Release `event` for resolution by data managers and delivery to
    /// subscribers.
    pub fn release_event<E: Event>(&mut self, event: E) -> ContractResult<()> {
        self.engine.release_event(event)
    }

    /// Receive every event of type `E`. Subscribing again replaces the
    /// handler but keeps the original notification position.
    pub fn subscribe<E: Event>(
        &mut self,
        handler: impl Fn(&mut ActorContext<'_>, &E) -> ContractResult<()> + 'static,
    ) -> ContractResult<()> {
        self.engine.require_actor(self.id)?;
        self.engine
            .dispatcher
            .subscribe(Delivery::Actor(self.id, Rc::new(handler)));
        Ok(())
    }

    /// Receive events of type `E` whose computed label equals `label`.
    ///
    /// # Errors
    ///
    /// [`ContractErrorKind::UnknownEventLabeler`] if no labeler with the
    /// label's labeler ID is registered for `E`.
    pub fn subscribe_to_label<E: Event>(
        &mut self,
        label: EventLabel<E>,
        handler: impl Fn(&mut ActorContext<'_>, &E) -> ContractResult<()> + 'static,
    ) -> ContractResult<()> {
        self.engine.require_actor(self.id)?;
        self.engine
            .dispatcher
            .subscribe_to_label(label, Delivery::Actor(self.id, Rc::new(handler)))
    }

    /// Drop the direct subscription to `E`. Label subscriptions stay.
    pub fn unsubscribe<E: Event>(&mut self) {
        self.engine
            .dispatcher
            .unsubscribe::<E>(Subscriber::Actor(self.id));
    }

    /// Drop the subscription to `label`.
    pub fn unsubscribe_from_label<E: Event>(&mut self, label: &EventLabel<E>) {
        self.engine
            .dispatcher
            .unsubscribe_from_label(Subscriber::Actor(self.id), label);
    }

    // ── Data managers ──────────────────────────────────────────

    /// Borrow the data manager of exact type `D` mutably.
    ///
    /// Events it releases during the call originate from this actor.
    ///
    /// # Errors
    ///
    /// [`ContractErrorKind::UnknownDataManager`] if none is registered,
    /// [`ContractErrorKind::AmbiguousDataManagerClass`] if several are,
    /// [`ContractErrorKind::DataManagerBusy`] if it is already borrowed
    /// further up the call stack.
    pub fn with_data_manager<D: DataManager, R>(
        &mut self,
        f: impl FnOnce(&mut D, &mut DataManagerContext<'_, D>) -> ContractResult<R>,
    ) -> ContractResult<R> {
        let id = self.engine.resolve_data_manager::<D>()?;
        self.engine.lend_data_manager(id, false, None, f)
    }

    // ── Output and lifecycle ───────────────────────────────────

    /// Hand `value` to the simulation's output consumer.
    pub fn release_output<T: Any + Send>(&mut self, value: T) {
        self.engine.release_output(value);
    }

    /// Run `f` when the simulation closes, if the actor still exists.
    pub fn subscribe_to_simulation_close(
        &mut self,
        f: impl FnOnce(&mut ActorContext<'_>) -> ContractResult<()> + 'static,
    ) {
        self.engine
            .subscribe_to_close(CloseCallback::Actor(self.id, Box::new(f)));
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
        self.engine
            .contract_violation(kind, details.map(str::to_owned))
    }
}
