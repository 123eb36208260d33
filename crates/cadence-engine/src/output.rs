//! Values released by model code for consumption outside the simulation.

use std::any::Any;
use std::fmt;

use cadence_core::TypeTag;

/// A released output value together with its runtime type.
///
/// The value is `Send` so that experiment workers can forward it to the
/// collector thread.
pub struct OutputItem {
    tag: TypeTag,
    value: Box<dyn Any + Send>,
}

impl OutputItem {
    /// Wrap `value`.
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self {
            tag: TypeTag::of::<T>(),
            value: Box::new(value),
        }
    }

    /// Runtime type of the value.
    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    /// Whether the value is a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Borrow the value as a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Take the value out as a `T`, or get the item back unchanged.
    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        let tag = self.tag;
        match self.value.downcast::<T>() {
            Ok(v) => Ok(*v),
            Err(value) => Err(Self { tag, value }),
        }
    }
}

impl fmt::Debug for OutputItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputItem").field("type", &self.tag).finish()
    }
}

/// Receives every output a simulation releases, in release order.
pub type OutputConsumer = Box<dyn FnMut(OutputItem)>;
