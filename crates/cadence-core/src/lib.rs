//! Core types and traits for the Cadence simulation kernel.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the vocabulary shared by the engine and the experiment runner:
//! participant IDs, the contract-violation taxonomy, events and event
//! labels, plan descriptors, and capability lookup results.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod event;
pub mod id;
pub mod lookup;
pub mod plan;
pub mod tag;

pub use error::{ContractError, ContractErrorKind, ContractResult};
pub use event::{Event, EventLabel, EventLabelBuilder, LabelKey};
pub use id::{ActorId, DataManagerId, LabelerId, PluginId, ReportId};
pub use lookup::Lookup;
pub use plan::{Activity, PlanInfo, PlanKey};
pub use tag::TypeTag;
