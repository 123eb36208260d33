//! Type-tagged registry behind data manager and data view lookup.
//!
//! Each [`Capability`] is registered under its exact type tag and any
//! number of alias tags, typically trait objects the value can be viewed
//! as. Lookup prefers exact matches and falls back to aliases; more than
//! one candidate at the deciding level is ambiguous.

use std::any::Any;

use cadence_core::{Lookup, TypeTag};

/// One registered value and the handles it can be retrieved through.
pub(crate) struct Capability {
    owner: usize,
    primary: TypeTag,
    handles: Vec<(TypeTag, Box<dyn Any>)>,
}

impl Capability {
    /// A capability owned by `owner`, retrievable as `H` under `primary`.
    pub(crate) fn new<H: 'static>(owner: usize, primary: TypeTag, handle: H) -> Self {
        Self {
            owner,
            primary,
            handles: vec![(primary, Box::new(handle))],
        }
    }

    /// Also make the capability retrievable as `H` under `tag`.
    pub(crate) fn alias<H: 'static>(&mut self, tag: TypeTag, handle: H) {
        self.handles.push((tag, Box::new(handle)));
    }

    pub(crate) fn add_aliases(&mut self, aliases: Vec<(TypeTag, Box<dyn Any>)>) {
        self.handles.extend(aliases);
    }

    fn has_alias(&self, tag: TypeTag) -> bool {
        self.handles.iter().skip(1).any(|(t, _)| *t == tag)
    }

    fn handle<H: Clone + 'static>(&self, tag: TypeTag) -> Option<H> {
        self.handles
            .iter()
            .find(|(t, _)| *t == tag)
            .and_then(|(_, h)| h.downcast_ref::<H>())
            .cloned()
    }
}

#[derive(Default)]
pub(crate) struct CapabilityRegistry {
    entries: Vec<Capability>,
}

impl CapabilityRegistry {
    pub(crate) fn register(&mut self, capability: Capability) {
        self.entries.push(capability);
    }

    /// Find the capability registered under `tag` and return its owner
    /// together with the handle stored for that tag.
    pub(crate) fn lookup<H: Clone + 'static>(&self, tag: TypeTag) -> Lookup<(usize, H)> {
        let exact: Vec<&Capability> = self.entries.iter().filter(|c| c.primary == tag).collect();
        let candidates = if exact.is_empty() {
            self.entries.iter().filter(|c| c.has_alias(tag)).collect()
        } else {
            exact
        };
        match candidates.as_slice() {
            [] => Lookup::NotFound,
            [only] => match only.handle::<H>(tag) {
                Some(h) => Lookup::Found((only.owner, h)),
                None => Lookup::NotFound,
            },
            _ => Lookup::Ambiguous,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    trait Named {
        fn name(&self) -> &str;
    }

    struct Alpha;
    impl Named for Alpha {
        fn name(&self) -> &str {
            "alpha"
        }
    }

    struct Beta;
    impl Named for Beta {
        fn name(&self) -> &str {
            "beta"
        }
    }

    fn alpha(owner: usize) -> Capability {
        let rc = Rc::new(Alpha);
        let mut cap = Capability::new(owner, TypeTag::of::<Alpha>(), Rc::clone(&rc));
        cap.alias(TypeTag::of::<dyn Named>(), rc as Rc<dyn Named>);
        cap
    }

    fn beta(owner: usize) -> Capability {
        let rc = Rc::new(Beta);
        let mut cap = Capability::new(owner, TypeTag::of::<Beta>(), Rc::clone(&rc));
        cap.alias(TypeTag::of::<dyn Named>(), rc as Rc<dyn Named>);
        cap
    }

    #[test]
    fn exact_match_found() {
        let mut reg = CapabilityRegistry::default();
        reg.register(alpha(0));
        reg.register(beta(1));
        let found = reg.lookup::<Rc<Beta>>(TypeTag::of::<Beta>());
        assert!(matches!(found, Lookup::Found((1, _))));
    }

    #[test]
    fn unique_alias_found() {
        let mut reg = CapabilityRegistry::default();
        reg.register(alpha(0));
        match reg.lookup::<Rc<dyn Named>>(TypeTag::of::<dyn Named>()) {
            Lookup::Found((owner, named)) => {
                assert_eq!(owner, 0);
                assert_eq!(named.name(), "alpha");
            }
            other => panic!("expected a match, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn shared_alias_is_ambiguous() {
        let mut reg = CapabilityRegistry::default();
        reg.register(alpha(0));
        reg.register(beta(1));
        assert!(reg
            .lookup::<Rc<dyn Named>>(TypeTag::of::<dyn Named>())
            .is_ambiguous());
    }

    #[test]
    fn repeated_exact_type_is_ambiguous() {
        let mut reg = CapabilityRegistry::default();
        reg.register(alpha(0));
        reg.register(alpha(1));
        assert!(reg.lookup::<Rc<Alpha>>(TypeTag::of::<Alpha>()).is_ambiguous());
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn unknown_tag_not_found() {
        let mut reg = CapabilityRegistry::default();
        reg.register(alpha(0));
        assert_eq!(
            reg.lookup::<Rc<u32>>(TypeTag::of::<u32>()).map(|_| ()),
            Lookup::NotFound
        );
    }
}
