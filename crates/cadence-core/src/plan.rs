//! Plan descriptors shared by the scheduler and the contexts.

use std::fmt;

use crate::event::LabelKey;
use crate::id::{ActorId, DataManagerId};

/// Owner-scoped key of a plan, used for lookup and cancellation.
///
/// Built from the same primitives as a [`LabelKey`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PlanKey(pub LabelKey);

macro_rules! plan_key_from {
    ($($t:ty),* $(,)?) => {
        $(
            impl From<$t> for PlanKey {
                fn from(v: $t) -> Self {
                    Self(LabelKey::from(v))
                }
            }
        )*
    };
}

plan_key_from!(bool, i32, i64, u32, u64, usize, &str, String, ActorId, DataManagerId);

impl From<LabelKey> for PlanKey {
    fn from(v: LabelKey) -> Self {
        Self(v)
    }
}

impl fmt::Display for PlanKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a plan keeps the simulation alive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Activity {
    /// Keeps the scheduler running until the plan executes.
    Active,
    /// Runs only if some active plan is still pending after it.
    Passive,
}

/// Non-removing view of a pending plan.
#[derive(Clone, Debug, PartialEq)]
pub struct PlanInfo {
    /// Scheduled time.
    pub time: f64,
    /// Key, if the plan was added with one.
    pub key: Option<PlanKey>,
    /// Active or passive.
    pub activity: Activity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_from_different_sources_compare_by_value() {
        assert_eq!(PlanKey::from("refresh"), PlanKey::from(String::from("refresh")));
        assert_ne!(PlanKey::from(1u64), PlanKey::from(1i64));
    }
}
