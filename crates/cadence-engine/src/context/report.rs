use std::any::Any;
use std::rc::Rc;

use cadence_core::{
    Activity, ContractError, ContractErrorKind, ContractResult, Event, EventLabel, PlanInfo,
    PlanKey, ReportId,
};

use crate::dispatch::{Delivery, Subscriber};
use crate::engine::{CloseCallback, Engine, PlanAction, PlanOwner};

use super::sealed::Sealed;

/// A deferred report action: a plan, an initializer or a close callback.
pub type ReportPlan = Box<dyn FnOnce(&mut ReportContext<'_>) -> ContractResult<()>>;

/// Context handed to report code.
///
/// Reports observe the simulation and release output. They cannot
/// release events or change participants.
pub struct ReportContext<'a> {
    engine: &'a mut Engine,
    id: ReportId,
}

impl Sealed for ReportContext<'_> {
    fn engine(&self) -> &Engine {
        self.engine
    }
}

impl<'a> ReportContext<'a> {
    pub(crate) fn new(engine: &'a mut Engine, id: ReportId) -> Self {
        Self { engine, id }
    }

    /// The report this context acts for.
    pub fn report_id(&self) -> ReportId {
        self.id
    }

    fn owner(&self) -> PlanOwner {
        PlanOwner::Report(self.id)
    }

    // ── Plans ──────────────────────────────────────────────────

    /// Run `plan` at `time`.
    pub fn add_plan(
        &mut self,
        time: f64,
        plan: impl FnOnce(&mut ReportContext<'_>) -> ContractResult<()> + 'static,
    ) -> ContractResult<()> {
        self.schedule(time, None, Activity::Active, Box::new(plan))
    }

    /// Run `plan` at `time` under `key`.
    pub fn add_keyed_plan(
        &mut self,
        time: f64,
        key: impl Into<PlanKey>,
        plan: impl FnOnce(&mut ReportContext<'_>) -> ContractResult<()> + 'static,
    ) -> ContractResult<()> {
        self.schedule(time, Some(key.into()), Activity::Active, Box::new(plan))
    }

    /// Run `plan` at `time` if the simulation is still going by then.
    /// Periodic reports usually schedule passively so they never keep an
    /// otherwise finished run alive.
    pub fn add_passive_plan(
        &mut self,
        time: f64,
        plan: impl FnOnce(&mut ReportContext<'_>) -> ContractResult<()> + 'static,
    ) -> ContractResult<()> {
        self.schedule(time, None, Activity::Passive, Box::new(plan))
    }

    /// Keyed variant of [`add_passive_plan`](Self::add_passive_plan).
    pub fn add_passive_keyed_plan(
        &mut self,
        time: f64,
        key: impl Into<PlanKey>,
        plan: impl FnOnce(&mut ReportContext<'_>) -> ContractResult<()> + 'static,
    ) -> ContractResult<()> {
        self.schedule(time, Some(key.into()), Activity::Passive, Box::new(plan))
    }

    fn schedule(
        &mut self,
        time: f64,
        key: Option<PlanKey>,
        activity: Activity,
        plan: ReportPlan,
    ) -> ContractResult<()> {
        self.engine
            .schedule(self.owner(), time, key, activity, PlanAction::Report(plan))
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
    pub fn remove_plan(&mut self, key: impl Into<PlanKey>) -> Option<ReportPlan> {
        match self.engine.scheduler.remove(self.owner(), &key.into())? {
            PlanAction::Report(plan) => Some(plan),
            _ => None,
        }
    }

    /// Keys of this report's pending keyed plans, in scheduling order.
    pub fn get_plan_keys(&self) -> Vec<PlanKey> {
        self.engine.scheduler.keys(self.owner())
    }

    // ── Events ─────────────────────────────────────────────────

    /// Receive every event of type `E`.
    pub fn subscribe<E: Event>(
        &mut self,
        handler: impl Fn(&mut ReportContext<'_>, &E) -> ContractResult<()> + 'static,
    ) {
        self.engine
            .dispatcher
            .subscribe(Delivery::Report(self.id, Rc::new(handler)));
    }

    /// Receive events of type `E` whose computed label equals `label`.
    pub fn subscribe_to_label<E: Event>(
        &mut self,
        label: EventLabel<E>,
        handler: impl Fn(&mut ReportContext<'_>, &E) -> ContractResult<()> + 'static,
    ) -> ContractResult<()> {
        self.engine
            .dispatcher
            .subscribe_to_label(label, Delivery::Report(self.id, Rc::new(handler)))
    }

    /// Drop the direct subscription to `E`.
    pub fn unsubscribe<E: Event>(&mut self) {
        self.engine
            .dispatcher
            .unsubscribe::<E>(Subscriber::Report(self.id));
    }

    /// Drop the subscription to `label`.
    pub fn unsubscribe_from_label<E: Event>(&mut self, label: &EventLabel<E>) {
        self.engine
            .dispatcher
            .unsubscribe_from_label(Subscriber::Report(self.id), label);
    }

    // ── Output and lifecycle ───────────────────────────────────

    /// Hand `value` to the simulation's output consumer.
    pub fn release_output<T: Any + Send>(&mut self, value: T) {
        self.engine.release_output(value);
    }

    /// Run `f` when the simulation closes.
    pub fn subscribe_to_simulation_close(
        &mut self,
        f: impl FnOnce(&mut ReportContext<'_>) -> ContractResult<()> + 'static,
    ) {
        self.engine
            .subscribe_to_close(CloseCallback::Report(self.id, Box::new(f)));
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
