//! Plugins and dependency-ordered initialization.
//!
//! A [`Plugin`] bundles an identity, the plugins it depends on, owned
//! [`PluginData`] items and an initializer. [`resolve_plugin_order`]
//! computes a topological order with Kahn's algorithm; among plugins that
//! are ready at the same time the one registered first goes first, so the
//! order is deterministic.
//!
//! Plugins are `Send + Sync` and cheap to clone: data items sit behind
//! `Arc` and are copied on first mutable access, which gives every
//! scenario of an experiment its own copy without cloning untouched data.

use std::any::{type_name, Any};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use cadence_core::{
    ActorId, ContractError, ContractErrorKind, ContractResult, DataManagerId, Lookup, PluginId,
    ReportId, TypeTag,
};

use crate::context::sealed::Sealed;
use crate::context::{ActorContext, DataManager, ReportContext};
use crate::engine::Engine;

// ── Plugin data ────────────────────────────────────────────────────

/// A value a plugin carries into every simulation built from it.
///
/// Implemented for every `Clone + Send + Sync + 'static` type.
pub trait PluginData: Any + Send + Sync {
    /// Deep copy behind a fresh box.
    fn clone_data(&self) -> Box<dyn PluginData>;
    /// Upcast for downcasting.
    fn as_any(&self) -> &dyn Any;
    /// Mutable upcast for downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any + Clone + Send + Sync> PluginData for T {
    fn clone_data(&self) -> Box<dyn PluginData> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn holds<T: Any>(data: &dyn PluginData) -> bool {
    data.as_any().is::<T>()
}

/// Initializer run once per simulation.
pub type PluginInitializer =
    Arc<dyn Fn(&mut PluginContext<'_>) -> ContractResult<()> + Send + Sync>;

// ── Plugin ─────────────────────────────────────────────────────────

/// A unit of model functionality registered with a simulation.
#[derive(Clone)]
pub struct Plugin {
    id: PluginId,
    dependencies: IndexSet<PluginId>,
    data: Vec<Arc<dyn PluginData>>,
    initializer: Option<PluginInitializer>,
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("id", &self.id)
            .field("dependencies", &self.dependencies)
            .field("data_items", &self.data.len())
            .finish_non_exhaustive()
    }
}

impl Plugin {
    /// Start building plugin `id`.
    pub fn builder(id: PluginId) -> PluginBuilder {
        PluginBuilder {
            plugin: Plugin {
                id,
                dependencies: IndexSet::new(),
                data: Vec::new(),
                initializer: None,
            },
        }
    }

    /// The plugin's ID.
    pub fn id(&self) -> PluginId {
        self.id
    }

    /// Declared dependencies, in declaration order.
    pub fn dependencies(&self) -> impl Iterator<Item = PluginId> + '_ {
        self.dependencies.iter().copied()
    }

    /// The data item of type `T`.
    pub fn plugin_data<T: Any>(&self) -> Lookup<&T> {
        let mut hits = self.data.iter().filter(|d| holds::<T>(&***d));
        match (hits.next(), hits.next()) {
            (None, _) => Lookup::NotFound,
            (Some(only), None) => match (**only).as_any().downcast_ref::<T>() {
                Some(v) => Lookup::Found(v),
                None => Lookup::NotFound,
            },
            (Some(_), Some(_)) => Lookup::Ambiguous,
        }
    }

    /// The data item of type `T`, mutably. Shared items are copied first,
    /// so other clones of this plugin keep the original value.
    pub fn plugin_data_mut<T: Any>(&mut self) -> Lookup<&mut T> {
        let hits: Vec<usize> = self
            .data
            .iter()
            .enumerate()
            .filter(|(_, d)| holds::<T>(&***d))
            .map(|(i, _)| i)
            .collect();
        let index = match hits.as_slice() {
            [] => return Lookup::NotFound,
            [only] => *only,
            _ => return Lookup::Ambiguous,
        };
        let slot = &mut self.data[index];
        if Arc::get_mut(slot).is_none() {
            *slot = Arc::from((**slot).clone_data());
        }
        match Arc::get_mut(slot).and_then(|d| d.as_any_mut().downcast_mut::<T>()) {
            Some(v) => Lookup::Found(v),
            None => Lookup::NotFound,
        }
    }

    /// Copy of this plugin whose data items share nothing with it.
    pub fn deep_clone(&self) -> Plugin {
        Plugin {
            data: self
                .data
                .iter()
                .map(|d| Arc::from((**d).clone_data()))
                .collect(),
            ..self.clone()
        }
    }

    pub(crate) fn initializer(&self) -> Option<&PluginInitializer> {
        self.initializer.as_ref()
    }
}

/// Builder returned by [`Plugin::builder`].
pub struct PluginBuilder {
    plugin: Plugin,
}

impl PluginBuilder {
    /// Require `id` to be initialized before this plugin.
    pub fn add_dependency(mut self, id: PluginId) -> Self {
        self.plugin.dependencies.insert(id);
        self
    }

    /// Attach a data item, retrievable by type from the initializer and
    /// from experiment dimensions.
    pub fn add_plugin_data<T: PluginData>(mut self, data: T) -> Self {
        self.plugin.data.push(Arc::new(data));
        self
    }

    /// Set the initializer, replacing any earlier one.
    pub fn set_initializer(
        mut self,
        init: impl Fn(&mut PluginContext<'_>) -> ContractResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.plugin.initializer = Some(Arc::new(init));
        self
    }

    /// Finish building.
    pub fn build(self) -> Plugin {
        self.plugin
    }
}

// ── Ordering ───────────────────────────────────────────────────────

/// Indices of `plugins` in initialization order.
///
/// # Errors
///
/// - [`ContractErrorKind::DuplicatePlugin`] if two plugins share an ID.
/// - [`ContractErrorKind::UnknownPluginDependency`] if a dependency is
///   not among `plugins`.
/// - [`ContractErrorKind::CircularPluginDependencies`] if the dependency
///   graph has a cycle; the details list every plugin left on it or
///   behind it.
pub fn resolve_plugin_order(plugins: &[Plugin]) -> ContractResult<Vec<usize>> {
    let mut index: IndexMap<PluginId, usize> = IndexMap::with_capacity(plugins.len());
    for (i, plugin) in plugins.iter().enumerate() {
        if index.insert(plugin.id, i).is_some() {
            return Err(ContractError::with_details(
                ContractErrorKind::DuplicatePlugin,
                plugin.id.to_string(),
            ));
        }
    }

    let mut in_degree = vec![0usize; plugins.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); plugins.len()];
    for (i, plugin) in plugins.iter().enumerate() {
        for dep in &plugin.dependencies {
            let Some(&j) = index.get(dep) else {
                return Err(ContractError::with_details(
                    ContractErrorKind::UnknownPluginDependency,
                    format!("{} depends on {dep}", plugin.id),
                ));
            };
            in_degree[i] += 1;
            dependents[j].push(i);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();
    let mut order = Vec::with_capacity(plugins.len());
    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for &k in &dependents[i] {
            in_degree[k] -= 1;
            if in_degree[k] == 0 {
                ready.push(Reverse(k));
            }
        }
    }

    if order.len() < plugins.len() {
        let stuck: Vec<String> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d > 0)
            .map(|(i, _)| plugins[i].id.to_string())
            .collect();
        return Err(ContractError::with_details(
            ContractErrorKind::CircularPluginDependencies,
            stuck.join(", "),
        ));
    }

    debug!(
        order = ?order.iter().map(|&i| plugins[i].id.0).collect::<Vec<_>>(),
        "plugin order resolved"
    );
    Ok(order)
}

// ── Context ────────────────────────────────────────────────────────

/// Context handed to a plugin initializer.
pub struct PluginContext<'a> {
    engine: &'a mut Engine,
    plugin: &'a Plugin,
}

impl Sealed for PluginContext<'_> {
    fn engine(&self) -> &Engine {
        self.engine
    }
}

impl<'a> PluginContext<'a> {
    pub(crate) fn new(engine: &'a mut Engine, plugin: &'a Plugin) -> Self {
        Self { engine, plugin }
    }

    /// The plugin being initialized.
    pub fn plugin_id(&self) -> PluginId {
        self.plugin.id
    }

    /// This plugin's data item of type `T`; `Ok(None)` when it has none.
    ///
    /// # Errors
    ///
    /// [`ContractErrorKind::AmbiguousPluginDataClass`] if the plugin holds
    /// several items of type `T`.
    pub fn get_plugin_data<T: Any>(&self) -> ContractResult<Option<&'a T>> {
        let plugin: &'a Plugin = self.plugin;
        plugin
            .plugin_data::<T>()
            .into_result(ContractErrorKind::AmbiguousPluginDataClass, TypeTag::of::<T>())
    }

    /// Add an actor, initialized after every plugin and data manager.
    pub fn add_actor(
        &mut self,
        init: impl FnOnce(&mut ActorContext<'_>) -> ContractResult<()> + 'static,
    ) -> ContractResult<ActorId> {
        self.engine.add_actor(Box::new(init))
    }

    /// Register a data manager owned by this plugin.
    pub fn add_data_manager<D: DataManager>(&mut self, manager: D) -> ContractResult<DataManagerId> {
        debug!(plugin = %self.plugin.id, data_manager = type_name::<D>(), "registering data manager");
        self.engine.add_data_manager(manager, self.plugin.id)
    }

    /// Add report `id`.
    ///
    /// # Errors
    ///
    /// [`ContractErrorKind::DuplicateReportId`] if `id` is taken.
    pub fn add_report(
        &mut self,
        id: ReportId,
        init: impl FnOnce(&mut ReportContext<'_>) -> ContractResult<()> + 'static,
    ) -> ContractResult<()> {
        self.engine.add_report(id, Box::new(init))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plugin(id: &'static str, deps: &[&'static str]) -> Plugin {
        deps.iter()
            .fold(Plugin::builder(PluginId(id)), |b, d| b.add_dependency(PluginId(d)))
            .build()
    }

    fn ids(plugins: &[Plugin], order: &[usize]) -> Vec<&'static str> {
        order.iter().map(|&i| plugins[i].id().0).collect()
    }

    // ── Ordering ───────────────────────────────────────────────

    #[test]
    fn independent_plugins_keep_registration_order() {
        let plugins = vec![plugin("a", &[]), plugin("b", &[]), plugin("c", &[])];
        let order = resolve_plugin_order(&plugins).unwrap();
        assert_eq!(ids(&plugins, &order), vec!["a", "b", "c"]);
    }

    #[test]
    fn dependencies_run_first() {
        let plugins = vec![
            plugin("people", &["regions"]),
            plugin("reports", &["people", "regions"]),
            plugin("regions", &[]),
        ];
        let order = resolve_plugin_order(&plugins).unwrap();
        assert_eq!(ids(&plugins, &order), vec!["regions", "people", "reports"]);
    }

    #[test]
    fn cycle_is_reported() {
        let plugins = vec![plugin("a", &["b"]), plugin("b", &["a"]), plugin("c", &[])];
        let err = resolve_plugin_order(&plugins).unwrap_err();
        assert_eq!(err.kind, ContractErrorKind::CircularPluginDependencies);
        assert_eq!(err.details.as_deref(), Some("a, b"));
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let plugins = vec![plugin("a", &["a"])];
        assert_eq!(
            resolve_plugin_order(&plugins).unwrap_err().kind,
            ContractErrorKind::CircularPluginDependencies
        );
    }

    #[test]
    fn unknown_dependency_rejected() {
        let plugins = vec![plugin("a", &["missing"])];
        let err = resolve_plugin_order(&plugins).unwrap_err();
        assert_eq!(err.kind, ContractErrorKind::UnknownPluginDependency);
        assert_eq!(err.details.as_deref(), Some("a depends on missing"));
    }

    #[test]
    fn duplicate_plugin_rejected() {
        let plugins = vec![plugin("a", &[]), plugin("a", &[])];
        assert_eq!(
            resolve_plugin_order(&plugins).unwrap_err().kind,
            ContractErrorKind::DuplicatePlugin
        );
    }

    // ── Data ───────────────────────────────────────────────────

    #[derive(Clone, Debug, PartialEq)]
    struct Rate(f64);

    #[test]
    fn data_lookup_by_type() {
        let p = Plugin::builder(PluginId("p"))
            .add_plugin_data(Rate(0.5))
            .add_plugin_data(7u32)
            .build();
        assert_eq!(p.plugin_data::<Rate>(), Lookup::Found(&Rate(0.5)));
        assert_eq!(p.plugin_data::<u32>(), Lookup::Found(&7));
        assert_eq!(p.plugin_data::<String>(), Lookup::NotFound);
    }

    #[test]
    fn two_items_of_one_type_are_ambiguous() {
        let p = Plugin::builder(PluginId("p"))
            .add_plugin_data(Rate(0.5))
            .add_plugin_data(Rate(0.7))
            .build();
        assert!(p.plugin_data::<Rate>().is_ambiguous());
    }

    #[test]
    fn mutation_copies_shared_data() {
        let original = Plugin::builder(PluginId("p"))
            .add_plugin_data(Rate(0.5))
            .build();
        let mut copy = original.clone();
        if let Lookup::Found(rate) = copy.plugin_data_mut::<Rate>() {
            rate.0 = 0.9;
        }
        assert_eq!(copy.plugin_data::<Rate>(), Lookup::Found(&Rate(0.9)));
        assert_eq!(original.plugin_data::<Rate>(), Lookup::Found(&Rate(0.5)));
    }

    #[test]
    fn deep_clone_shares_nothing() {
        let original = Plugin::builder(PluginId("p"))
            .add_plugin_data(Rate(0.5))
            .build();
        let copy = original.deep_clone();
        assert!(!Arc::ptr_eq(&original.data[0], &copy.data[0]));
    }
}
