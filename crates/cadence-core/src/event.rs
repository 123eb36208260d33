//! Events and event labels.
//!
//! An [`Event`] is an immutable value released into the dispatcher. An
//! [`EventLabel`] names a subset of one event type's stream so that a
//! subscriber only hears about the instances it cares about.
//!
//! # Label equality
//!
//! Two labels are equal when their auxiliary keys are equal. The primary
//! key, the labeler ID, and even the event type are ignored. The
//! dispatcher depends on this: it computes a label from the live event
//! with the registered labeler and looks it up among the labels
//! subscribers registered, and those were built independently.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::{ContractError, ContractErrorKind, ContractResult};
use crate::id::{ActorId, DataManagerId, LabelerId};
use crate::tag::TypeTag;

/// A typed, immutable notification released into the dispatcher.
///
/// The primary key is the first index level used during dispatch. It
/// defaults to the event's own type; events that are naturally
/// partitioned (for example by property) override it so that labelers for
/// one partition never run for another.
pub trait Event: Any {
    /// First-level dispatch key for this instance.
    fn primary_key(&self) -> LabelKey
    where
        Self: Sized,
    {
        LabelKey::Type(TypeTag::of::<Self>())
    }
}

// ── LabelKey ───────────────────────────────────────────────────────

/// One component of an event label.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LabelKey {
    /// A type identity.
    Type(TypeTag),
    /// A boolean flag.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// An unsigned integer or index.
    UInt(u64),
    /// A string.
    Str(Arc<str>),
}

impl LabelKey {
    /// A key naming the type `T`.
    pub fn type_of<T: ?Sized + 'static>() -> Self {
        Self::Type(TypeTag::of::<T>())
    }
}

impl fmt::Display for LabelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(t) => write!(f, "{t}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::UInt(u) => write!(f, "{u}"),
            Self::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<bool> for LabelKey {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for LabelKey {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for LabelKey {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for LabelKey {
    fn from(v: u32) -> Self {
        Self::UInt(u64::from(v))
    }
}

impl From<u64> for LabelKey {
    fn from(v: u64) -> Self {
        Self::UInt(v)
    }
}

impl From<usize> for LabelKey {
    fn from(v: usize) -> Self {
        Self::UInt(v as u64)
    }
}

impl From<&str> for LabelKey {
    fn from(v: &str) -> Self {
        Self::Str(Arc::from(v))
    }
}

impl From<String> for LabelKey {
    fn from(v: String) -> Self {
        Self::Str(Arc::from(v))
    }
}

impl From<ActorId> for LabelKey {
    fn from(v: ActorId) -> Self {
        Self::UInt(v.0 as u64)
    }
}

impl From<DataManagerId> for LabelKey {
    fn from(v: DataManagerId) -> Self {
        Self::UInt(v.0 as u64)
    }
}

impl From<TypeTag> for LabelKey {
    fn from(v: TypeTag) -> Self {
        Self::Type(v)
    }
}

// ── EventLabel ─────────────────────────────────────────────────────

/// Inline capacity for auxiliary keys; labels rarely carry more.
type AuxKeys = SmallVec<[LabelKey; 4]>;

/// A label selecting a subset of the events of type `E`.
///
/// See the [module docs](self) for the equality rule.
pub struct EventLabel<E: Event> {
    primary_key: LabelKey,
    labeler_id: LabelerId,
    keys: AuxKeys,
    _event: PhantomData<fn() -> E>,
}

impl<E: Event> EventLabel<E> {
    /// Build a label from all of its parts.
    pub fn new(
        primary_key: impl Into<LabelKey>,
        labeler_id: LabelerId,
        keys: impl IntoIterator<Item = LabelKey>,
    ) -> Self {
        Self {
            primary_key: primary_key.into(),
            labeler_id,
            keys: keys.into_iter().collect(),
            _event: PhantomData,
        }
    }

    /// Build a label whose primary key is the event type itself, which
    /// matches events that keep the default [`Event::primary_key`].
    pub fn for_type(labeler_id: LabelerId, keys: impl IntoIterator<Item = LabelKey>) -> Self {
        Self::new(LabelKey::type_of::<E>(), labeler_id, keys)
    }

    /// Start building a label field by field.
    pub fn builder() -> EventLabelBuilder<E> {
        EventLabelBuilder::new()
    }

    /// First-level dispatch key this label applies to.
    pub fn primary_key(&self) -> &LabelKey {
        &self.primary_key
    }

    /// The labeler whose output this label is compared against.
    pub fn labeler_id(&self) -> LabelerId {
        self.labeler_id
    }

    /// The event type this label selects from.
    pub fn event_type(&self) -> TypeTag {
        TypeTag::of::<E>()
    }

    /// The auxiliary keys, which alone decide equality.
    pub fn keys(&self) -> &[LabelKey] {
        &self.keys
    }
}

impl<E: Event> Clone for EventLabel<E> {
    fn clone(&self) -> Self {
        Self {
            primary_key: self.primary_key.clone(),
            labeler_id: self.labeler_id,
            keys: self.keys.clone(),
            _event: PhantomData,
        }
    }
}

impl<E: Event> fmt::Debug for EventLabel<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLabel")
            .field("event_type", &self.event_type())
            .field("primary_key", &self.primary_key)
            .field("labeler_id", &self.labeler_id)
            .field("keys", &self.keys)
            .finish()
    }
}

impl<E: Event, F: Event> PartialEq<EventLabel<F>> for EventLabel<E> {
    fn eq(&self, other: &EventLabel<F>) -> bool {
        self.keys == other.keys
    }
}

impl<E: Event> Eq for EventLabel<E> {}

impl<E: Event> Hash for EventLabel<E> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.keys.hash(state);
    }
}

// ── EventLabelBuilder ──────────────────────────────────────────────

/// Incremental construction of an [`EventLabel`].
///
/// [`build`](Self::build) fails with [`ContractErrorKind::NullPrimaryKey`]
/// or [`ContractErrorKind::NullLabelerId`] when a required part was
/// never supplied.
pub struct EventLabelBuilder<E: Event> {
    primary_key: Option<LabelKey>,
    labeler_id: Option<LabelerId>,
    keys: AuxKeys,
    _event: PhantomData<fn() -> E>,
}

impl<E: Event> EventLabelBuilder<E> {
    fn new() -> Self {
        Self {
            primary_key: None,
            labeler_id: None,
            keys: AuxKeys::new(),
            _event: PhantomData,
        }
    }

    /// Set the primary key.
    pub fn primary_key(mut self, key: impl Into<LabelKey>) -> Self {
        self.primary_key = Some(key.into());
        self
    }

    /// Set the labeler ID.
    pub fn labeler_id(mut self, id: LabelerId) -> Self {
        self.labeler_id = Some(id);
        self
    }

    /// Append an auxiliary key.
    pub fn key(mut self, key: impl Into<LabelKey>) -> Self {
        self.keys.push(key.into());
        self
    }

    /// Finish the label.
    pub fn build(self) -> ContractResult<EventLabel<E>> {
        let primary_key = self.primary_key.ok_or_else(|| {
            ContractError::with_details(
                ContractErrorKind::NullPrimaryKey,
                TypeTag::of::<E>().name(),
            )
        })?;
        let labeler_id = self.labeler_id.ok_or_else(|| {
            ContractError::with_details(ContractErrorKind::NullLabelerId, TypeTag::of::<E>().name())
        })?;
        Ok(EventLabel {
            primary_key,
            labeler_id,
            keys: self.keys,
            _event: PhantomData,
        })
    }
}
