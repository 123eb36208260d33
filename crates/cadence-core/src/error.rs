//! Contract-violation taxonomy for the Cadence kernel.
//!
//! Every misuse the engine detects (past-time plans, duplicate keys,
//! unknown labelers, ambiguous lookups, repeated execution) surfaces as a
//! [`ContractError`]: a stable [`ContractErrorKind`] plus optional free
//! text. These are programming errors in model code, not transient
//! conditions, so nothing in the engine retries them.

use std::borrow::Cow;

use thiserror::Error;

/// Named kinds of contract violation.
///
/// The display form of each kind is its stable `SCREAMING_SNAKE` name,
/// which is what experiment logs and progress reports record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Error)]
pub enum ContractErrorKind {
    // ── Scheduling ─────────────────────────────────────────────
    /// A plan was scheduled strictly before the current time.
    #[error("PAST_PLANNING_TIME")]
    PastPlanningTime,
    /// A plan time was NaN or infinite.
    #[error("INVALID_PLAN_TIME")]
    InvalidPlanTime,
    /// The owner already has a pending plan under this key.
    #[error("DUPLICATE_PLAN_KEY")]
    DuplicatePlanKey,
    /// Plans may not be scheduled once the simulation is closing.
    #[error("PLANNING_AFTER_CLOSE")]
    PlanningAfterClose,

    // ── Identity ───────────────────────────────────────────────
    /// No live actor has this ID.
    #[error("UNKNOWN_ACTOR_ID")]
    UnknownActorId,
    /// A report with this ID is already registered.
    #[error("DUPLICATE_REPORT_ID")]
    DuplicateReportId,

    // ── Events ─────────────────────────────────────────────────
    /// An event label was built without a primary key.
    #[error("NULL_PRIMARY_KEY")]
    NullPrimaryKey,
    /// An event label was built without a labeler ID.
    #[error("NULL_LABELER_ID")]
    NullLabelerId,
    /// A label refers to a labeler never registered for its event type.
    #[error("UNKNOWN_EVENT_LABELER")]
    UnknownEventLabeler,
    /// A labeler ID is already registered for this event type.
    #[error("DUPLICATE_EVENT_LABELER")]
    DuplicateEventLabeler,

    // ── Capabilities ───────────────────────────────────────────
    /// More than one data manager matches the requested type.
    #[error("AMBIGUOUS_DATA_MANAGER_CLASS")]
    AmbiguousDataManagerClass,
    /// No data manager matches the requested type.
    #[error("UNKNOWN_DATA_MANAGER")]
    UnknownDataManager,
    /// A data manager was added once plugin initialization had finished.
    #[error("DATA_MANAGER_ADDED_AFTER_INITIALIZATION")]
    DataManagerAddedAfterInitialization,
    /// The data manager is already mutably borrowed further up the stack.
    #[error("DATA_MANAGER_BUSY")]
    DataManagerBusy,
    /// More than one data view matches the requested type.
    #[error("AMBIGUOUS_DATA_VIEW_CLASS")]
    AmbiguousDataViewClass,
    /// More than one plugin data item matches the requested type.
    #[error("AMBIGUOUS_PLUGIN_DATA_CLASS")]
    AmbiguousPluginDataClass,
    /// No plugin carries a data item of the requested type.
    #[error("UNKNOWN_PLUGIN_DATA_CLASS")]
    UnknownPluginDataClass,

    // ── Plugins ────────────────────────────────────────────────
    /// Two plugins share an ID.
    #[error("DUPLICATE_PLUGIN")]
    DuplicatePlugin,
    /// A plugin depends on an ID no registered plugin carries.
    #[error("UNKNOWN_PLUGIN_DEPENDENCY")]
    UnknownPluginDependency,
    /// The plugin dependency graph contains a cycle.
    #[error("CIRCULAR_PLUGIN_DEPENDENCIES")]
    CircularPluginDependencies,

    // ── Lifecycle ──────────────────────────────────────────────
    /// `execute()` was called on a simulation that already ran.
    #[error("REPEATED_EXECUTION")]
    RepeatedExecution,
    /// The configured start time is NaN or infinite.
    #[error("INVALID_START_TIME")]
    InvalidStartTime,
    /// The configured halt time is not finite or precedes the start time.
    #[error("INVALID_HALT_TIME")]
    InvalidHaltTime,

    // ── Model-defined ──────────────────────────────────────────
    /// A kind defined by model code, identified by name.
    #[error("{0}")]
    Model(Cow<'static, str>),
}

impl ContractErrorKind {
    /// A model-defined kind with the given stable name.
    pub fn model(name: impl Into<Cow<'static, str>>) -> Self {
        Self::Model(name.into())
    }
}

/// A contract violation: a [`ContractErrorKind`] with optional details.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{kind}{}", detail_suffix(.details))]
pub struct ContractError {
    /// What was violated.
    pub kind: ContractErrorKind,
    /// Free-text context, such as the offending key or type name.
    pub details: Option<String>,
}

fn detail_suffix(details: &Option<String>) -> String {
    match details {
        Some(d) => format!(": {d}"),
        None => String::new(),
    }
}

impl ContractError {
    /// A violation with no details.
    pub fn new(kind: ContractErrorKind) -> Self {
        Self {
            kind,
            details: None,
        }
    }

    /// A violation with a free-text detail string.
    pub fn with_details(kind: ContractErrorKind, details: impl Into<String>) -> Self {
        Self {
            kind,
            details: Some(details.into()),
        }
    }
}

impl From<ContractErrorKind> for ContractError {
    fn from(kind: ContractErrorKind) -> Self {
        Self::new(kind)
    }
}

/// Result alias for operations that can violate an engine contract.
pub type ContractResult<T> = Result<T, ContractError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_display_stable_names() {
        assert_eq!(
            ContractErrorKind::PastPlanningTime.to_string(),
            "PAST_PLANNING_TIME"
        );
        assert_eq!(
            ContractErrorKind::RepeatedExecution.to_string(),
            "REPEATED_EXECUTION"
        );
        assert_eq!(
            ContractErrorKind::DataManagerAddedAfterInitialization.to_string(),
            "DATA_MANAGER_ADDED_AFTER_INITIALIZATION"
        );
        assert_eq!(
            ContractErrorKind::model("NEGATIVE_POPULATION").to_string(),
            "NEGATIVE_POPULATION"
        );
    }

    #[test]
    fn details_are_appended() {
        let bare = ContractError::new(ContractErrorKind::DuplicatePlanKey);
        assert_eq!(bare.to_string(), "DUPLICATE_PLAN_KEY");

        let detailed =
            ContractError::with_details(ContractErrorKind::DuplicatePlanKey, "key 'refresh'");
        assert_eq!(detailed.to_string(), "DUPLICATE_PLAN_KEY: key 'refresh'");
    }

    #[test]
    fn kind_converts_into_error() {
        let err: ContractError = ContractErrorKind::UnknownActorId.into();
        assert_eq!(err.kind, ContractErrorKind::UnknownActorId);
        assert!(err.details.is_none());
    }
}
