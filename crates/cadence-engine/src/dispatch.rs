//! Per-event-type subscription tables and label matching.
//!
//! Each event type gets its own [`EventTable`], created on first use:
//!
//! - registered [`EventLabeler`]s, one per labeler ID;
//! - direct subscriptions, which receive every instance;
//! - label subscriptions, indexed by primary key, then labeler ID, then
//!   label (hashed over its auxiliary keys only);
//! - data manager handlers, one list per [`EventPhase`].
//!
//! Actor and report subscriptions share a single sequence counter so that
//! direct and labelled subscribers are notified in the order they
//! subscribed, regardless of which index they sit in.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;

use cadence_core::{
    ActorId, ContractError, ContractErrorKind, ContractResult, DataManagerId, Event, EventLabel,
    LabelKey, LabelerId, ReportId,
};

use crate::context::{ActorContext, LabelContext, ReportContext};
use crate::engine::{DispatchOrigin, Engine};

pub(crate) type ActorHandler<E> = Rc<dyn Fn(&mut ActorContext<'_>, &E) -> ContractResult<()>>;
pub(crate) type ReportHandler<E> = Rc<dyn Fn(&mut ReportContext<'_>, &E) -> ContractResult<()>>;
pub(crate) type DataManagerHandler<E> =
    Rc<dyn Fn(&mut Engine, DispatchOrigin, &E) -> ContractResult<()>>;

// ── Phases ─────────────────────────────────────────────────────────

/// Resolution phase of a data manager subscription.
///
/// For each released event every validation handler runs, then every
/// execution handler, then every post-processing handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventPhase {
    /// Check preconditions before any state changes.
    Validation,
    /// Apply the event.
    Execution,
    /// React to the applied event.
    PostProcessing,
}

impl EventPhase {
    /// All phases in resolution order.
    pub const ALL: [EventPhase; 3] = [
        EventPhase::Validation,
        EventPhase::Execution,
        EventPhase::PostProcessing,
    ];

    fn index(self) -> usize {
        match self {
            EventPhase::Validation => 0,
            EventPhase::Execution => 1,
            EventPhase::PostProcessing => 2,
        }
    }
}

// ── Labelers ───────────────────────────────────────────────────────

/// Computes the label of an event of type `E` for one labeler ID.
///
/// A labeler must be a pure function of the event and the read-only
/// simulation state it is given.
pub struct EventLabeler<E: Event> {
    id: LabelerId,
    label: Box<dyn Fn(&LabelContext<'_>, &E) -> EventLabel<E>>,
}

impl<E: Event> EventLabeler<E> {
    /// Labeler `id` computing labels with `label`.
    pub fn new(
        id: LabelerId,
        label: impl Fn(&LabelContext<'_>, &E) -> EventLabel<E> + 'static,
    ) -> Self {
        Self {
            id,
            label: Box::new(label),
        }
    }

    /// The labeler's ID.
    pub fn id(&self) -> LabelerId {
        self.id
    }

    /// Label `event`.
    pub fn label(&self, ctx: &LabelContext<'_>, event: &E) -> EventLabel<E> {
        (self.label)(ctx, event)
    }
}

// ── Subscriptions ──────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Subscriber {
    Actor(ActorId),
    Report(ReportId),
}

pub(crate) enum Delivery<E> {
    Actor(ActorId, ActorHandler<E>),
    Report(ReportId, ReportHandler<E>),
}

impl<E> Clone for Delivery<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Actor(id, h) => Self::Actor(*id, Rc::clone(h)),
            Self::Report(id, h) => Self::Report(*id, Rc::clone(h)),
        }
    }
}

impl<E> Delivery<E> {
    fn subscriber(&self) -> Subscriber {
        match self {
            Self::Actor(id, _) => Subscriber::Actor(*id),
            Self::Report(id, _) => Subscriber::Report(*id),
        }
    }
}

struct Subscription<E> {
    seq: u64,
    delivery: Delivery<E>,
}

type Subscribers<E> = IndexMap<Subscriber, Subscription<E>>;
type LabelIndex<E> =
    IndexMap<LabelKey, IndexMap<LabelerId, HashMap<EventLabel<E>, Subscribers<E>>>>;

/// Insert or replace `delivery`, keeping the original position on replace.
fn upsert<E>(subs: &mut Subscribers<E>, seq: u64, delivery: Delivery<E>) {
    let subscriber = delivery.subscriber();
    match subs.get_mut(&subscriber) {
        Some(existing) => existing.delivery = delivery,
        None => {
            subs.insert(subscriber, Subscription { seq, delivery });
        }
    }
}

struct EventTable<E: Event> {
    labelers: IndexMap<LabelerId, EventLabeler<E>>,
    direct: Subscribers<E>,
    labelled: LabelIndex<E>,
    data_managers: [IndexMap<DataManagerId, DataManagerHandler<E>>; 3],
}

impl<E: Event> EventTable<E> {
    fn new() -> Self {
        Self {
            labelers: IndexMap::new(),
            direct: IndexMap::new(),
            labelled: IndexMap::new(),
            data_managers: Default::default(),
        }
    }
}

/// Type-erased operations the dispatcher needs across all tables.
trait AnyTable {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn remove_subscriber(&mut self, subscriber: Subscriber);
    fn has_subscribers(&self) -> bool;
}

impl<E: Event> AnyTable for EventTable<E> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn remove_subscriber(&mut self, subscriber: Subscriber) {
        self.direct.shift_remove(&subscriber);
        for by_labeler in self.labelled.values_mut() {
            for by_label in by_labeler.values_mut() {
                for subs in by_label.values_mut() {
                    subs.shift_remove(&subscriber);
                }
                by_label.retain(|_, subs| !subs.is_empty());
            }
        }
    }

    fn has_subscribers(&self) -> bool {
        !self.direct.is_empty()
            || self.data_managers.iter().any(|m| !m.is_empty())
            || self
                .labelled
                .values()
                .flat_map(|by_labeler| by_labeler.values())
                .any(|by_label| !by_label.is_empty())
    }
}

// ── Dispatcher ─────────────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct Dispatcher {
    tables: HashMap<TypeId, Box<dyn AnyTable>>,
    next_seq: u64,
}

impl Dispatcher {
    fn table<E: Event>(&self) -> Option<&EventTable<E>> {
        self.tables
            .get(&TypeId::of::<E>())?
            .as_any()
            .downcast_ref::<EventTable<E>>()
    }

    fn table_mut<E: Event>(&mut self) -> &mut EventTable<E> {
        self.tables
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(EventTable::<E>::new()))
            .as_any_mut()
            .downcast_mut::<EventTable<E>>()
            .expect("tables are keyed by their event type")
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    // ── Labelers ───────────────────────────────────────────────

    pub(crate) fn add_labeler<E: Event>(&mut self, labeler: EventLabeler<E>) -> ContractResult<()> {
        let table = self.table_mut::<E>();
        if table.labelers.contains_key(&labeler.id()) {
            return Err(ContractError::with_details(
                ContractErrorKind::DuplicateEventLabeler,
                format!("{} for {}", labeler.id(), type_name::<E>()),
            ));
        }
        table.labelers.insert(labeler.id(), labeler);
        Ok(())
    }

    // ── Actor and report subscriptions ─────────────────────────

    pub(crate) fn subscribe<E: Event>(&mut self, delivery: Delivery<E>) {
        let seq = self.next_seq();
        upsert(&mut self.table_mut::<E>().direct, seq, delivery);
    }

    pub(crate) fn subscribe_to_label<E: Event>(
        &mut self,
        label: EventLabel<E>,
        delivery: Delivery<E>,
    ) -> ContractResult<()> {
        let seq = self.next_seq();
        let table = self.table_mut::<E>();
        if !table.labelers.contains_key(&label.labeler_id()) {
            return Err(ContractError::with_details(
                ContractErrorKind::UnknownEventLabeler,
                format!("{} for {}", label.labeler_id(), type_name::<E>()),
            ));
        }
        let subs = table
            .labelled
            .entry(label.primary_key().clone())
            .or_default()
            .entry(label.labeler_id())
            .or_default()
            .entry(label)
            .or_default();
        upsert(subs, seq, delivery);
        Ok(())
    }

    pub(crate) fn unsubscribe<E: Event>(&mut self, subscriber: Subscriber) {
        if let Some(table) = self.tables.get_mut(&TypeId::of::<E>()) {
            if let Some(table) = table.as_any_mut().downcast_mut::<EventTable<E>>() {
                table.direct.shift_remove(&subscriber);
            }
        }
    }

    pub(crate) fn unsubscribe_from_label<E: Event>(
        &mut self,
        subscriber: Subscriber,
        label: &EventLabel<E>,
    ) {
        let Some(table) = self
            .tables
            .get_mut(&TypeId::of::<E>())
            .and_then(|t| t.as_any_mut().downcast_mut::<EventTable<E>>())
        else {
            return;
        };
        let Some(by_label) = table
            .labelled
            .get_mut(label.primary_key())
            .and_then(|by_labeler| by_labeler.get_mut(&label.labeler_id()))
        else {
            return;
        };
        if let Some(subs) = by_label.get_mut(label) {
            subs.shift_remove(&subscriber);
            if subs.is_empty() {
                by_label.remove(label);
            }
        }
    }

    pub(crate) fn remove_actor(&mut self, id: ActorId) {
        for table in self.tables.values_mut() {
            table.remove_subscriber(Subscriber::Actor(id));
        }
    }

    // ── Data manager subscriptions ─────────────────────────────

    pub(crate) fn subscribe_data_manager<E: Event>(
        &mut self,
        phase: EventPhase,
        id: DataManagerId,
        handler: DataManagerHandler<E>,
    ) {
        self.table_mut::<E>().data_managers[phase.index()].insert(id, handler);
    }

    pub(crate) fn unsubscribe_data_manager<E: Event>(&mut self, id: DataManagerId) {
        if let Some(table) = self.tables.get_mut(&TypeId::of::<E>()) {
            if let Some(table) = table.as_any_mut().downcast_mut::<EventTable<E>>() {
                for phase in &mut table.data_managers {
                    phase.shift_remove(&id);
                }
            }
        }
    }

    pub(crate) fn data_manager_handlers<E: Event>(
        &self,
        phase: EventPhase,
    ) -> Vec<DataManagerHandler<E>> {
        self.table::<E>()
            .map(|t| t.data_managers[phase.index()].values().cloned().collect())
            .unwrap_or_default()
    }

    // ── Resolution ─────────────────────────────────────────────

    /// Actor and report deliveries for `event`, in subscription order.
    pub(crate) fn matching<E: Event>(&self, ctx: &LabelContext<'_>, event: &E) -> Vec<Delivery<E>> {
        let Some(table) = self.table::<E>() else {
            return Vec::new();
        };
        let mut found: Vec<(u64, Delivery<E>)> = table
            .direct
            .values()
            .map(|s| (s.seq, s.delivery.clone()))
            .collect();
        if let Some(by_labeler) = table.labelled.get(&event.primary_key()) {
            for (labeler_id, by_label) in by_labeler {
                if by_label.is_empty() {
                    continue;
                }
                let Some(labeler) = table.labelers.get(labeler_id) else {
                    continue;
                };
                let label = labeler.label(ctx, event);
                if let Some(subs) = by_label.get(&label) {
                    found.extend(subs.values().map(|s| (s.seq, s.delivery.clone())));
                }
            }
        }
        found.sort_by_key(|(seq, _)| *seq);
        found.into_iter().map(|(_, d)| d).collect()
    }

    pub(crate) fn subscribers_exist_for<E: Event>(&self) -> bool {
        self.tables
            .get(&TypeId::of::<E>())
            .is_some_and(|t| t.has_subscribers())
    }
}
