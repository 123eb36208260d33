//! Capability-scoped facades through which model code reaches the engine.
//!
//! Every participant kind gets its own context type, borrowed for the
//! duration of one plan, handler or initializer:
//!
//! | Context | Handed to |
//! |---|---|
//! | [`ActorContext`] | actor plans, initializers and event handlers |
//! | [`DataManagerContext`] | data manager plans, `init` and phase handlers |
//! | [`ReportContext`] | report plans, initializers and event handlers |
//! | [`LabelContext`] | event labelers (read-only) |
//!
//! The read-only queries common to all of them live on
//! [`SimulationView`], which is sealed and implemented for each context.

mod actor;
mod data_manager;
mod label;
mod report;

use std::rc::Rc;

use cadence_core::{ActorId, ContractErrorKind, ContractResult, Event, Lookup, TypeTag};

use crate::simulation::SimulationState;

pub use actor::{ActorContext, ActorPlan};
pub use data_manager::{
    DataManager, DataManagerAliases, DataManagerContext, DataManagerPlan, DataManagerRef,
};
pub use label::LabelContext;
pub use report::{ReportContext, ReportPlan};

pub(crate) mod sealed {
    use crate::engine::Engine;

    pub trait Sealed {
        fn engine(&self) -> &Engine;
    }
}

/// Read-only simulation queries available from every context.
pub trait SimulationView: sealed::Sealed {
    /// Current simulation time.
    fn get_time(&self) -> f64 {
        self.engine().time()
    }

    /// Lifecycle state of the run: `Running` through startup and the
    /// scheduler loop, then `Halted` or `Exhausted` while close callbacks
    /// run.
    fn simulation_state(&self) -> SimulationState {
        self.engine().state
    }

    /// Whether actor `id` is currently registered.
    fn actor_exists(&self, id: ActorId) -> bool {
        self.engine().actor_exists(id)
    }

    /// Look up the data manager retrievable as `D`, either its exact type
    /// or an alias it exposed.
    fn lookup_data_manager<D: ?Sized + 'static>(&self) -> Lookup<DataManagerRef<D>> {
        self.engine().lookup_data_manager::<D>()
    }

    /// Like [`lookup_data_manager`](Self::lookup_data_manager), with an
    /// ambiguous match reported as [`ContractErrorKind::AmbiguousDataManagerClass`].
    fn get_data_manager<D: ?Sized + 'static>(&self) -> ContractResult<Option<DataManagerRef<D>>> {
        self.lookup_data_manager::<D>()
            .into_result(ContractErrorKind::AmbiguousDataManagerClass, TypeTag::of::<D>())
    }

    /// Look up a published data view by exact type or alias.
    fn lookup_data_view<V: ?Sized + 'static>(&self) -> Lookup<Rc<V>> {
        self.engine().lookup_data_view::<V>()
    }

    /// Like [`lookup_data_view`](Self::lookup_data_view), with an
    /// ambiguous match reported as [`ContractErrorKind::AmbiguousDataViewClass`].
    fn get_data_view<V: ?Sized + 'static>(&self) -> ContractResult<Option<Rc<V>>> {
        self.lookup_data_view::<V>()
            .into_result(ContractErrorKind::AmbiguousDataViewClass, TypeTag::of::<V>())
    }

    /// Whether anything subscribes to events of type `E`.
    ///
    /// Lets publishers skip building events nobody observes.
    fn subscribers_exist_for<E: Event>(&self) -> bool {
        self.engine().dispatcher.subscribers_exist_for::<E>()
    }
}

impl<T: sealed::Sealed> SimulationView for T {}
