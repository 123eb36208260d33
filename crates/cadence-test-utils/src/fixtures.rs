//! Reusable model fixtures.
//!
//! - [`Counter`]: a data manager holding one integer, releasing
//!   [`CounterChanged`] after every change.
//! - [`failing_plugin`]: an actor that fails deterministically at a
//!   given time.
//! - [`ticker_plugin`]: an actor that releases a numbered output at
//!   every integer time up to a limit.
//! - [`params_plugin`]: plugin data an experiment dimension can vary, and
//!   an actor that reports it, fails, or panics accordingly.

use cadence_core::{ContractErrorKind, ContractResult, Event, PluginId};
use cadence_engine::{ActorContext, DataManager, DataManagerContext, Plugin};

/// Released by [`Counter`] after every change.
#[derive(Clone, Debug, PartialEq)]
pub struct CounterChanged {
    pub previous: u64,
    pub current: u64,
}

impl Event for CounterChanged {}

/// Data manager holding a single counter.
#[derive(Clone, Debug, Default)]
pub struct Counter {
    value: u64,
}

impl Counter {
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Add `amount` and release [`CounterChanged`].
    pub fn add(&mut self, ctx: &mut DataManagerContext<'_, Self>, amount: u64) -> ContractResult<()> {
        let previous = self.value;
        self.value += amount;
        ctx.release_event(CounterChanged {
            previous,
            current: self.value,
        })
    }
}

impl DataManager for Counter {}

/// Plugin `"counter"` registering a [`Counter`] starting at zero.
pub fn counter_plugin() -> Plugin {
    Plugin::builder(PluginId("counter"))
        .set_initializer(|ctx| {
            ctx.add_data_manager(Counter::default())?;
            Ok(())
        })
        .build()
}

/// Name of the model-defined error kind raised by [`failing_plugin`].
pub const FIXTURE_FAILURE: &str = "FIXTURE_FAILURE";

/// Plugin whose single actor fails at `time`.
pub fn failing_plugin(id: &'static str, time: f64) -> Plugin {
    crate::actor_plugin(id, move |actor| {
        actor.add_plan(time, |actor| {
            Err(actor.contract_violation(ContractErrorKind::model(FIXTURE_FAILURE), Some("planned failure")))
        })
    })
}

/// Plugin whose single actor releases `(id, t)` as output at
/// `t = 1, 2, ..., last`.
pub fn ticker_plugin(id: &'static str, last: u32) -> Plugin {
    crate::actor_plugin(id, move |actor| schedule_tick(actor, id, 1, last))
}

fn schedule_tick(
    actor: &mut ActorContext<'_>,
    id: &'static str,
    t: u32,
    last: u32,
) -> ContractResult<()> {
    if t > last {
        return Ok(());
    }
    actor.add_plan(f64::from(t), move |actor| {
        actor.release_output((id, t));
        schedule_tick(actor, id, t + 1, last)
    })
}

// ── Experiment model ───────────────────────────────────────────────

/// What the [`params_plugin`] actor does at time 1.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Behavior {
    /// Release an [`Observation`] and the rate as a bare `u32`.
    #[default]
    Observe,
    /// Return a [`FIXTURE_FAILURE`] violation.
    Fail,
    /// Panic with "planned panic".
    Panic,
}

/// Plugin data carried by [`params_plugin`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Params {
    pub rate: u32,
    pub region: String,
    pub behavior: Behavior,
}

/// Output released by [`params_plugin`].
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    pub rate: u32,
    pub region: String,
}

/// Plugin `"params"` carrying `params`; its actor acts on whatever
/// [`Params`] the plugin holds when the simulation starts.
pub fn params_plugin(params: Params) -> Plugin {
    Plugin::builder(PluginId("params"))
        .add_plugin_data(params)
        .set_initializer(|ctx| {
            let params = ctx.get_plugin_data::<Params>()?.cloned().unwrap_or_default();
            ctx.add_actor(move |actor| {
                actor.add_plan(1.0, move |actor| match params.behavior {
                    Behavior::Observe => {
                        actor.release_output(Observation {
                            rate: params.rate,
                            region: params.region.clone(),
                        });
                        actor.release_output(params.rate);
                        Ok(())
                    }
                    Behavior::Fail => Err(actor.contract_violation(
                        ContractErrorKind::model(FIXTURE_FAILURE),
                        Some("planned failure"),
                    )),
                    Behavior::Panic => panic!("planned panic"),
                })
            })?;
            Ok(())
        })
        .build()
}
