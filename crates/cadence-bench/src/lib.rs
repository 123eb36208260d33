//! Benchmark profiles and utilities for the Cadence simulation kernel.
//!
//! Provides pre-built plugin sets for benchmarking:
//!
//! - [`ring_profile`]: many actors, each rescheduling itself (scheduler load)
//! - [`broadcast_profile`]: one emitter and many subscribers (dispatch load)
//! - [`sweep_experiment`]: a one-dimension experiment over [`ring_profile`]

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use cadence_core::{ContractResult, Event, PluginId};
use cadence_engine::{ActorContext, Plugin, RunMetrics, Simulation, SimulationConfig};
use cadence_experiment::{Dimension, Experiment, ExperimentConfig};

/// Event released by the [`broadcast_profile`] emitter.
#[derive(Clone, Copy, Debug)]
pub struct Pulse(pub u32);

impl Event for Pulse {}

/// Plugin data read by [`ring_profile`] plugins.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RingSize {
    /// Number of actors.
    pub actors: u32,
    /// Plans each actor executes.
    pub rounds: u32,
}

/// `actors` actors, each executing `rounds` plans one time unit apart.
///
/// Actor `i` starts at `i / actors`, so plans from different actors
/// interleave and the heap stays `actors` deep.
pub fn ring_profile(actors: u32, rounds: u32) -> Plugin {
    Plugin::builder(PluginId("ring"))
        .add_plugin_data(RingSize { actors, rounds })
        .set_initializer(|ctx| {
            let size = ctx
                .get_plugin_data::<RingSize>()?
                .copied()
                .unwrap_or(RingSize { actors: 0, rounds: 0 });
            for i in 0..size.actors {
                let offset = f64::from(i) / f64::from(size.actors);
                ctx.add_actor(move |actor| tick(actor, offset, 0, size.rounds))?;
            }
            Ok(())
        })
        .build()
}

fn tick(actor: &mut ActorContext<'_>, offset: f64, round: u32, rounds: u32) -> ContractResult<()> {
    if round == rounds {
        return Ok(());
    }
    actor.add_plan(offset + f64::from(round), move |actor| {
        tick(actor, offset, round + 1, rounds)
    })
}

/// One emitter releasing `events` [`Pulse`]s, one per time unit, to
/// `subscribers` subscribed actors.
pub fn broadcast_profile(subscribers: u32, events: u32) -> Plugin {
    Plugin::builder(PluginId("broadcast"))
        .set_initializer(move |ctx| {
            for _ in 0..subscribers {
                ctx.add_actor(|actor| actor.subscribe(|_, _: &Pulse| Ok(())))?;
            }
            ctx.add_actor(move |actor| {
                for n in 0..events {
                    actor.add_plan(f64::from(n), move |actor| actor.release_event(Pulse(n)))?;
                }
                Ok(())
            })?;
            Ok(())
        })
        .build()
}

/// Build and execute a simulation of `plugins`, returning its metrics.
pub fn run(plugins: Vec<Plugin>) -> ContractResult<RunMetrics> {
    let mut sim = Simulation::builder()
        .add_plugins(plugins)
        .set_config(SimulationConfig::default())
        .build()?;
    sim.execute()?;
    Ok(sim.metrics().clone())
}

/// An experiment running [`ring_profile`] with `actors` actors at each
/// of `points` round counts, on `threads` workers (`0` runs inline).
pub fn sweep_experiment(actors: u32, points: u32, threads: usize) -> Experiment {
    let dimension = (1..=points)
        .fold(Dimension::builder().add_metadata("rounds"), |b, p| {
            b.add_point(move |ctx| {
                ctx.plugin_data_mut::<RingSize>()?.rounds = p * 10;
                Ok(vec![(p * 10).to_string()])
            })
        })
        .build();
    Experiment::builder()
        .add_plugin(ring_profile(actors, 0))
        .add_dimension(dimension)
        .set_config(ExperimentConfig {
            thread_count: Some(threads),
            ..Default::default()
        })
        .build()
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_executes_every_plan() {
        let metrics = run(vec![ring_profile(10, 5)]).unwrap();
        assert_eq!(metrics.plans_executed, 50);
        assert_eq!(metrics.actors_added, 10);
    }

    #[test]
    fn broadcast_reaches_every_subscriber() {
        let metrics = run(vec![broadcast_profile(8, 4)]).unwrap();
        assert_eq!(metrics.events_released, 4);
        assert_eq!(metrics.event_deliveries, 32);
    }

    #[test]
    fn sweep_runs_every_point() {
        let summary = sweep_experiment(4, 3, 2).execute().unwrap();
        assert_eq!(summary.succeeded, 3);
    }
}
