use crate::engine::Engine;

use super::sealed::Sealed;

/// Read-only view handed to event labelers.
pub struct LabelContext<'a> {
    engine: &'a Engine,
}

impl<'a> LabelContext<'a> {
    pub(crate) fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }
}

impl Sealed for LabelContext<'_> {
    fn engine(&self) -> &Engine {
        self.engine
    }
}
