//! Three-way result of a capability lookup by type.

use crate::error::{ContractError, ContractErrorKind, ContractResult};
use crate::tag::TypeTag;

/// Outcome of looking a capability up by type tag.
///
/// Lookups try exact type matches first and fall back to declared
/// aliases. More than one candidate at the deciding level is
/// [`Ambiguous`](Lookup::Ambiguous), which callers report as an error;
/// [`NotFound`](Lookup::NotFound) is an ordinary empty answer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lookup<T> {
    /// Exactly one match.
    Found(T),
    /// No registered capability matches.
    NotFound,
    /// Several capabilities match equally well.
    Ambiguous,
}

impl<T> Lookup<T> {
    /// Apply `f` to a found value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Self::Found(v) => Lookup::Found(f(v)),
            Self::NotFound => Lookup::NotFound,
            Self::Ambiguous => Lookup::Ambiguous,
        }
    }

    /// The found value, discarding the difference between the two misses.
    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(v) => Some(v),
            _ => None,
        }
    }

    /// Whether the lookup was ambiguous.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Ambiguous)
    }

    /// Convert to the context-level answer: `Ok(None)` when nothing
    /// matched, an `ambiguous` violation naming `requested` otherwise.
    pub fn into_result(
        self,
        ambiguous: ContractErrorKind,
        requested: TypeTag,
    ) -> ContractResult<Option<T>> {
        match self {
            Self::Found(v) => Ok(Some(v)),
            Self::NotFound => Ok(None),
            Self::Ambiguous => Err(ContractError::with_details(ambiguous, requested.name())),
        }
    }
}
