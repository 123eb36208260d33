//! Experiment dimensions.
//!
//! A [`Dimension`] is an ordered list of points. Each point is a function
//! that adjusts one scenario's plugin data through a [`DimensionContext`]
//! and returns the metadata values describing that adjustment, one per
//! header the dimension declares.
//!
//! ```ignore
//! let rates = Dimension::builder()
//!     .add_metadata("infection_rate")
//!     .add_point(|ctx| {
//!         ctx.plugin_data_mut::<DiseaseParams>()?.rate = 0.1;
//!         Ok(vec!["0.1".into()])
//!     })
//!     .build();
//! ```

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

use cadence_core::{ContractError, ContractErrorKind, ContractResult, Lookup, PluginId};
use cadence_engine::Plugin;

/// One point of a dimension.
pub type DimensionPoint =
    Arc<dyn Fn(&mut DimensionContext<'_>) -> ContractResult<Vec<String>> + Send + Sync>;

/// Mutable access to one scenario's plugins while its points apply.
pub struct DimensionContext<'a> {
    plugins: &'a mut [Plugin],
}

impl<'a> DimensionContext<'a> {
    pub(crate) fn new(plugins: &'a mut [Plugin]) -> Self {
        Self { plugins }
    }

    /// The unique data item of type `T` across all plugins, mutably.
    ///
    /// Items shared with the experiment's template plugins are copied
    /// first, so changes stay within this scenario.
    ///
    /// # Errors
    ///
    /// - [`ContractErrorKind::UnknownPluginDataClass`] if no plugin
    ///   carries a `T`.
    /// - [`ContractErrorKind::AmbiguousPluginDataClass`] if more than one
    ///   item matches.
    pub fn plugin_data_mut<T: Any>(&mut self) -> ContractResult<&mut T> {
        let mut owner = None;
        for (i, plugin) in self.plugins.iter().enumerate() {
            match plugin.plugin_data::<T>() {
                Lookup::NotFound => {}
                Lookup::Found(_) if owner.is_none() => owner = Some(i),
                _ => {
                    return Err(ContractError::with_details(
                        ContractErrorKind::AmbiguousPluginDataClass,
                        type_name::<T>(),
                    ))
                }
            }
        }
        let missing =
            || ContractError::with_details(ContractErrorKind::UnknownPluginDataClass, type_name::<T>());
        let index = owner.ok_or_else(missing)?;
        self.plugins[index].plugin_data_mut::<T>().found().ok_or_else(missing)
    }

    /// IDs of the scenario's plugins, in registration order.
    pub fn plugin_ids(&self) -> impl Iterator<Item = PluginId> + '_ {
        self.plugins.iter().map(Plugin::id)
    }
}

/// A named axis of an experiment.
#[derive(Clone)]
pub struct Dimension {
    headers: Vec<String>,
    points: Vec<DimensionPoint>,
}

impl fmt::Debug for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dimension")
            .field("headers", &self.headers)
            .field("points", &self.points.len())
            .finish()
    }
}

impl Dimension {
    /// Start building a dimension.
    pub fn builder() -> DimensionBuilder {
        DimensionBuilder::default()
    }

    /// Metadata headers, in declaration order.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the dimension has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub(crate) fn point(&self, index: usize) -> &DimensionPoint {
        &self.points[index]
    }
}

/// Builder returned by [`Dimension::builder`].
#[derive(Default)]
pub struct DimensionBuilder {
    headers: Vec<String>,
    points: Vec<DimensionPoint>,
}

impl DimensionBuilder {
    /// Declare a metadata header.
    pub fn add_metadata(mut self, header: impl Into<String>) -> Self {
        self.headers.push(header.into());
        self
    }

    /// Append a point.
    pub fn add_point(
        mut self,
        point: impl Fn(&mut DimensionContext<'_>) -> ContractResult<Vec<String>> + Send + Sync + 'static,
    ) -> Self {
        self.points.push(Arc::new(point));
        self
    }

    /// Finish the dimension.
    pub fn build(self) -> Dimension {
        Dimension {
            headers: self.headers,
            points: self.points,
        }
    }
}
