//! Failing and panicking scenarios are recorded without sinking the run.

use std::cell::RefCell;
use std::rc::Rc;

use cadence_core::ContractErrorKind;
use cadence_experiment::{
    Dimension, Experiment, ExperimentConfig, ExperimentError, ScenarioError, ScenarioStatus,
};
use cadence_test_utils::fixtures::{params_plugin, Behavior, Params, FIXTURE_FAILURE};
use cadence_test_utils::init_tracing;

fn behavior_dimension(behaviors: &'static [Behavior]) -> Dimension {
    behaviors
        .iter()
        .fold(Dimension::builder().add_metadata("behavior"), |b, &behavior| {
            b.add_point(move |ctx| {
                ctx.plugin_data_mut::<Params>()?.behavior = behavior;
                Ok(vec![format!("{behavior:?}")])
            })
        })
        .build()
}

fn config(threads: usize, halt_on_exception: bool) -> ExperimentConfig {
    ExperimentConfig {
        thread_count: Some(threads),
        halt_on_exception,
        ..Default::default()
    }
}

#[test]
fn failures_and_panics_are_recorded_per_scenario() {
    init_tracing();
    let summary = Experiment::builder()
        .add_plugin(params_plugin(Params::default()))
        .add_dimension(behavior_dimension(&[
            Behavior::Observe,
            Behavior::Fail,
            Behavior::Observe,
            Behavior::Panic,
            Behavior::Observe,
        ]))
        .set_config(config(2, false))
        .build()
        .unwrap()
        .execute()
        .unwrap();

    assert_eq!(summary.scenario_count, 5);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.not_run, 0);
    assert_eq!(summary.failed.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
    match &summary.failed[&1] {
        ScenarioError::Contract(e) => {
            assert_eq!(e.kind, ContractErrorKind::model(FIXTURE_FAILURE));
        }
        other => panic!("expected contract violation, got {other:?}"),
    }
    assert_eq!(summary.failed[&3], ScenarioError::Panic("planned panic".into()));
}

#[test]
fn halt_on_exception_stops_handing_out_scenarios() {
    let statuses = Rc::new(RefCell::new(Vec::new()));
    let s = Rc::clone(&statuses);
    let err = Experiment::builder()
        .add_plugin(params_plugin(Params::default()))
        .add_dimension(behavior_dimension(&[
            Behavior::Observe,
            Behavior::Fail,
            Behavior::Observe,
            Behavior::Observe,
        ]))
        .set_config(config(0, true))
        .subscribe_to_experiment_close(move |ctx| {
            let all = (0..ctx.scenario_count())
                .map(|i| ctx.scenario_status(i).unwrap())
                .collect::<Vec<_>>();
            s.borrow_mut().extend(all);
        })
        .build()
        .unwrap()
        .execute()
        .unwrap_err();

    match err {
        ExperimentError::ScenarioFailed { scenario, source } => {
            assert_eq!(scenario, 1);
            assert!(matches!(source, ScenarioError::Contract(_)));
        }
        other => panic!("expected ScenarioFailed, got {other:?}"),
    }
    // Close handlers still ran and saw the partial run.
    assert_eq!(
        *statuses.borrow(),
        vec![
            ScenarioStatus::Succeeded,
            ScenarioStatus::Failed,
            ScenarioStatus::Ready,
            ScenarioStatus::Ready,
        ]
    );
}

#[test]
fn wrong_metadata_count_ends_the_experiment() {
    let err = Experiment::builder()
        .add_plugin(params_plugin(Params::default()))
        .add_dimension(
            Dimension::builder()
                .add_metadata("rate")
                .add_metadata("region")
                .add_point(|ctx| {
                    ctx.plugin_data_mut::<Params>()?.rate = 1;
                    Ok(vec!["1".into()])
                })
                .build(),
        )
        .set_config(config(1, false))
        .build()
        .unwrap()
        .execute()
        .unwrap_err();

    match err {
        ExperimentError::DimensionMetadataMismatch {
            scenario,
            dimension,
            expected,
            actual,
        } => assert_eq!((scenario, dimension, expected, actual), (0, 0, 2, 1)),
        other => panic!("expected DimensionMetadataMismatch, got {other:?}"),
    }
}

#[test]
fn point_errors_fail_only_their_scenario() {
    #[derive(Clone, Debug)]
    struct Unregistered;

    let summary = Experiment::builder()
        .add_plugin(params_plugin(Params::default()))
        .add_dimension(
            Dimension::builder()
                .add_metadata("variant")
                .add_point(|_| Ok(vec!["plain".into()]))
                .add_point(|ctx| {
                    ctx.plugin_data_mut::<Unregistered>()?;
                    Ok(vec!["broken".into()])
                })
                .build(),
        )
        .set_config(config(0, false))
        .build()
        .unwrap()
        .execute()
        .unwrap();

    assert_eq!(summary.succeeded, 1);
    match &summary.failed[&1] {
        ScenarioError::Contract(e) => {
            assert_eq!(e.kind, ContractErrorKind::UnknownPluginDataClass);
        }
        other => panic!("expected contract violation, got {other:?}"),
    }
}

#[test]
fn simulation_close_fires_for_failed_scenarios() {
    let closed = Rc::new(RefCell::new(Vec::new()));
    let c = Rc::clone(&closed);
    Experiment::builder()
        .add_plugin(params_plugin(Params::default()))
        .add_dimension(behavior_dimension(&[Behavior::Panic, Behavior::Observe]))
        .set_config(config(0, false))
        .subscribe_to_simulation_close(move |ctx, scenario| {
            c.borrow_mut()
                .push((scenario, ctx.scenario_status(scenario).unwrap()));
        })
        .build()
        .unwrap()
        .execute()
        .unwrap();
    assert_eq!(
        *closed.borrow(),
        vec![(0, ScenarioStatus::Failed), (1, ScenarioStatus::Succeeded)]
    );
}
