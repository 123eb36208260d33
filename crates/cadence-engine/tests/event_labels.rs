//! Direct and label-filtered event subscriptions.

use cadence_core::{
    ActorId, ContractErrorKind, ContractResult, Event, EventLabel, LabelKey, LabelerId, PluginId,
    ReportId,
};
use cadence_engine::{
    DataManager, DataManagerContext, EventLabeler, Plugin, SimulationView,
};
use cadence_test_utils::{actor_plugin, data_manager_plugin, report_plugin, run_plugins, Recorder};

#[derive(Debug)]
struct Moved {
    mover: ActorId,
    region: u32,
}

impl Event for Moved {}

const BY_REGION: LabelerId = LabelerId("by_region");
const BY_PHASE: LabelerId = LabelerId("by_phase");

fn region_label(region: u32) -> EventLabel<Moved> {
    EventLabel::for_type(BY_REGION, [LabelKey::from(region)])
}

fn phase_label(early: bool) -> EventLabel<Moved> {
    EventLabel::for_type(BY_PHASE, [LabelKey::from(early)])
}

/// Registers the labelers for [`Moved`].
struct Regions;

impl DataManager for Regions {
    fn init(&mut self, ctx: &mut DataManagerContext<'_, Self>) -> ContractResult<()> {
        ctx.add_event_labeler(EventLabeler::new(BY_REGION, |_, e: &Moved| {
            region_label(e.region)
        }))?;
        ctx.add_event_labeler(EventLabeler::new(BY_PHASE, |ctx, _: &Moved| {
            phase_label(ctx.get_time() < 10.0)
        }))
    }
}

fn regions_plugin() -> Plugin {
    Plugin::builder(PluginId("regions"))
        .set_initializer(|ctx| {
            ctx.add_data_manager(Regions)?;
            Ok(())
        })
        .build()
}

/// Actor that releases a move into each of `regions` at times 1, 2, ...
fn mover_plugin(regions: &'static [u32]) -> Plugin {
    actor_plugin("mover", move |actor| {
        for (i, &region) in regions.iter().enumerate() {
            actor.add_plan((i + 1) as f64, move |actor| {
                let mover = actor.actor_id();
                actor.release_event(Moved { mover, region })
            })?;
        }
        Ok(())
    })
}

// ── Direct ─────────────────────────────────────────────────────────

#[test]
fn direct_subscriber_sees_every_event() {
    let rec = Recorder::new();
    let r = rec.clone();
    run_plugins(vec![
        regions_plugin(),
        actor_plugin("watcher", move |actor| {
            let r = r.clone();
            actor.subscribe(move |_, e: &Moved| {
                r.record(format!("region {}", e.region));
                Ok(())
            })
        }),
        mover_plugin(&[1, 2, 3]),
    ])
    .unwrap();
    assert_eq!(rec.entries(), vec!["region 1", "region 2", "region 3"]);
}

#[test]
fn event_without_subscribers_is_dropped() {
    let result = run_plugins(vec![mover_plugin(&[1, 2])]).unwrap();
    assert_eq!(result.metrics.events_released, 2);
    assert_eq!(result.metrics.event_deliveries, 0);
}

// ── Labels ─────────────────────────────────────────────────────────

#[test]
fn label_subscriber_sees_only_matching_events() {
    let rec = Recorder::new();
    let r = rec.clone();
    run_plugins(vec![
        regions_plugin(),
        actor_plugin("watcher", move |actor| {
            let r = r.clone();
            actor.subscribe_to_label(region_label(2), move |actor, e: &Moved| {
                r.record(format!("t{} region {}", actor.get_time(), e.region));
                Ok(())
            })
        }),
        mover_plugin(&[1, 2, 3, 2]),
    ])
    .unwrap();
    assert_eq!(rec.entries(), vec!["t2 region 2", "t4 region 2"]);
}

#[test]
fn builder_label_matches_labeler_output() {
    // Built independently of the labeler's own helper; only the
    // auxiliary keys decide the match.
    let rec = Recorder::new();
    let r = rec.clone();
    run_plugins(vec![
        regions_plugin(),
        actor_plugin("watcher", move |actor| {
            let label = EventLabel::<Moved>::builder()
                .primary_key(LabelKey::type_of::<Moved>())
                .labeler_id(BY_REGION)
                .key(3u32)
                .build()?;
            let r = r.clone();
            actor.subscribe_to_label(label, move |_, e: &Moved| {
                r.record(format!("region {}", e.region));
                Ok(())
            })
        }),
        mover_plugin(&[3, 1, 3]),
    ])
    .unwrap();
    assert_eq!(rec.entries(), vec!["region 3", "region 3"]);
}

#[test]
fn labeler_output_is_filed_under_its_registration() {
    // The computed label carries a foreign primary key and labeler id;
    // delivery is decided by the registered labeler and the keys alone.
    struct Renamed;

    impl DataManager for Renamed {
        fn init(&mut self, ctx: &mut DataManagerContext<'_, Self>) -> ContractResult<()> {
            ctx.add_event_labeler(EventLabeler::new(BY_REGION, |_, e: &Moved| {
                EventLabel::new(99u32, LabelerId("something_else"), [LabelKey::from(e.region)])
            }))
        }
    }

    let rec = Recorder::new();
    let r = rec.clone();
    run_plugins(vec![
        data_manager_plugin("renamed", || Renamed),
        actor_plugin("watcher", move |actor| {
            let r = r.clone();
            actor.subscribe_to_label(region_label(2), move |actor, e: &Moved| {
                r.record(format!("t{} region {}", actor.get_time(), e.region));
                Ok(())
            })
        }),
        mover_plugin(&[1, 2, 3]),
    ])
    .unwrap();
    assert_eq!(rec.entries(), vec!["t2 region 2"]);
}

#[test]
fn labeler_reads_simulation_state() {
    let rec = Recorder::new();
    let r = rec.clone();
    run_plugins(vec![
        regions_plugin(),
        actor_plugin("late-watcher", move |actor| {
            let r = r.clone();
            actor.subscribe_to_label(phase_label(false), move |actor, _: &Moved| {
                r.record(format!("late t{}", actor.get_time()));
                Ok(())
            })
        }),
        actor_plugin("mover", |actor| {
            for t in [5.0, 15.0] {
                actor.add_plan(t, |actor| {
                    let mover = actor.actor_id();
                    actor.release_event(Moved { mover, region: 0 })
                })?;
            }
            Ok(())
        }),
    ])
    .unwrap();
    assert_eq!(rec.entries(), vec!["late t15"]);
}

#[test]
fn subscribers_notified_in_subscription_order() {
    let rec = Recorder::new();
    let (r1, r2, r3) = (rec.clone(), rec.clone(), rec.clone());
    run_plugins(vec![
        regions_plugin(),
        actor_plugin("labelled", move |actor| {
            let r = r1.clone();
            actor.subscribe_to_label(region_label(1), move |_, _: &Moved| {
                r.record("labelled");
                Ok(())
            })
        }),
        actor_plugin("direct", move |actor| {
            let r = r2.clone();
            actor.subscribe(move |_, _: &Moved| {
                r.record("direct");
                Ok(())
            })
        }),
        report_plugin("report", move |report| {
            let r = r3.clone();
            report.subscribe(move |_, _: &Moved| {
                r.record("report");
                Ok(())
            });
            Ok(())
        }),
        mover_plugin(&[1]),
    ])
    .unwrap();
    // Reports initialize before actors, so the report subscribed first.
    assert_eq!(rec.entries(), vec!["report", "labelled", "direct"]);
}

#[test]
fn resubscribing_replaces_handler() {
    let rec = Recorder::new();
    let r = rec.clone();
    run_plugins(vec![
        regions_plugin(),
        actor_plugin("watcher", move |actor| {
            let (a, b) = (r.clone(), r.clone());
            actor.subscribe(move |_, _: &Moved| {
                a.record("old");
                Ok(())
            })?;
            actor.subscribe(move |_, _: &Moved| {
                b.record("new");
                Ok(())
            })
        }),
        mover_plugin(&[1]),
    ])
    .unwrap();
    assert_eq!(rec.entries(), vec!["new"]);
}

#[test]
fn unsubscribing_stops_delivery() {
    let rec = Recorder::new();
    let r = rec.clone();
    run_plugins(vec![
        regions_plugin(),
        actor_plugin("watcher", move |actor| {
            let r = r.clone();
            actor.subscribe_to_label(region_label(1), move |actor, _: &Moved| {
                r.record(format!("t{}", actor.get_time()));
                actor.unsubscribe_from_label(&region_label(1));
                Ok(())
            })
        }),
        mover_plugin(&[1, 1, 1]),
    ])
    .unwrap();
    assert_eq!(rec.entries(), vec!["t1"]);
}

#[test]
fn removed_actor_receives_nothing() {
    let rec = Recorder::new();
    let r = rec.clone();
    run_plugins(vec![
        regions_plugin(),
        actor_plugin("watcher", move |actor| {
            let r = r.clone();
            actor.subscribe(move |actor, e: &Moved| {
                r.record(format!("region {}", e.region));
                let me = actor.actor_id();
                actor.remove_actor(me)
            })
        }),
        mover_plugin(&[1, 2]),
    ])
    .unwrap();
    assert_eq!(rec.entries(), vec!["region 1"]);
}

#[test]
fn subscribers_exist_reflects_registrations() {
    let rec = Recorder::new();
    let r = rec.clone();
    run_plugins(vec![actor_plugin("a", move |actor| {
        r.record(format!("before {}", actor.subscribers_exist_for::<Moved>()));
        actor.subscribe(|_, _: &Moved| Ok(()))?;
        r.record(format!("after {}", actor.subscribers_exist_for::<Moved>()));
        actor.unsubscribe::<Moved>();
        r.record(format!("dropped {}", actor.subscribers_exist_for::<Moved>()));
        Ok(())
    })])
    .unwrap();
    assert_eq!(rec.entries(), vec!["before false", "after true", "dropped false"]);
}

// ── Errors ─────────────────────────────────────────────────────────

#[test]
fn label_for_unknown_labeler_rejected() {
    let rec = Recorder::new();
    let r = rec.clone();
    run_plugins(vec![
        regions_plugin(),
        actor_plugin("watcher", move |actor| {
            let label = EventLabel::<Moved>::for_type(LabelerId("nope"), [LabelKey::from(1u32)]);
            let err = actor
                .subscribe_to_label(label, |_, _: &Moved| Ok(()))
                .unwrap_err();
            r.record(err.kind.to_string());
            Ok(())
        }),
    ])
    .unwrap();
    assert_eq!(rec.entries(), vec!["UNKNOWN_EVENT_LABELER"]);
}

#[test]
fn duplicate_labeler_rejected() {
    struct Twice;
    impl DataManager for Twice {
        fn init(&mut self, ctx: &mut DataManagerContext<'_, Self>) -> ContractResult<()> {
            ctx.add_event_labeler(EventLabeler::new(BY_REGION, |_, e: &Moved| {
                region_label(e.region)
            }))?;
            ctx.add_event_labeler(EventLabeler::new(BY_REGION, |_, e: &Moved| {
                region_label(e.region)
            }))
        }
    }
    let plugin = Plugin::builder(PluginId("twice"))
        .set_initializer(|ctx| {
            ctx.add_data_manager(Twice)?;
            Ok(())
        })
        .build();
    let err = run_plugins(vec![plugin]).unwrap_err();
    assert_eq!(err.kind, ContractErrorKind::DuplicateEventLabeler);
}

#[test]
fn label_builder_requires_primary_key_and_labeler() {
    let err = EventLabel::<Moved>::builder()
        .labeler_id(BY_REGION)
        .build()
        .unwrap_err();
    assert_eq!(err.kind, ContractErrorKind::NullPrimaryKey);
    let err = EventLabel::<Moved>::builder()
        .primary_key(LabelKey::type_of::<Moved>())
        .build()
        .unwrap_err();
    assert_eq!(err.kind, ContractErrorKind::NullLabelerId);
}

#[test]
fn report_label_subscription() {
    let rec = Recorder::new();
    let r = rec.clone();
    run_plugins(vec![
        regions_plugin(),
        report_plugin("moves", move |report| {
            assert_eq!(report.report_id(), ReportId("moves"));
            let r = r.clone();
            report.subscribe_to_label(region_label(7), move |report, e: &Moved| {
                report.release_output(e.region);
                r.record(format!("mover {}", e.mover));
                Ok(())
            })
        }),
        mover_plugin(&[7, 8]),
    ])
    .unwrap();
    assert_eq!(rec.entries(), vec!["mover 0"]);
}
