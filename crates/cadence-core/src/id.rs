//! Strongly-typed identifiers for simulation participants.
//!
//! Actor and data manager IDs are assigned by the engine. Report,
//! plugin and labeler IDs are chosen by the model author, which is what
//! makes duplicate registration detectable.

use std::fmt;

/// Identifies an actor within one simulation run.
///
/// Actors are assigned sequential IDs in the order they are added.
/// `ActorId(n)` is never handed out twice within a run, although the
/// numbering restarts for every new simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub usize);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for ActorId {
    fn from(v: usize) -> Self {
        Self(v)
    }
}

/// Identifies a data manager within one simulation run.
///
/// Assigned sequentially as plugins register data managers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataManagerId(pub usize);

impl fmt::Display for DataManagerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for DataManagerId {
    fn from(v: usize) -> Self {
        Self(v)
    }
}

/// Caller-chosen name of a report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReportId(pub &'static str);

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Caller-chosen name of a plugin.
///
/// Plugins refer to each other by this name when declaring
/// dependencies, so it must be stable across scenarios.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginId(pub &'static str);

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Caller-chosen name of an event labeler.
///
/// Unique per event type: two labelers for different event types may
/// share a name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelerId(pub &'static str);

impl fmt::Display for LabelerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}
