//! Data manager and data view lookup by exact type and alias.

use std::cell::RefCell;
use std::rc::Rc;

use cadence_core::{ContractErrorKind, ContractResult};
use cadence_engine::{DataManager, DataManagerAliases, DataManagerContext, SimulationView};
use cadence_test_utils::fixtures::Counter;
use cadence_test_utils::{actor_plugin, data_manager_plugin, run_plugins, Recorder};

// ── Fixtures ───────────────────────────────────────────────────────

trait Census {
    fn population(&self) -> usize;
}

struct PopulationView {
    size: usize,
}

impl Census for PopulationView {
    fn population(&self) -> usize {
        self.size
    }
}

/// Publishes a [`PopulationView`], also retrievable as `dyn Census`.
struct Population {
    size: usize,
}

impl DataManager for Population {
    fn init(&mut self, ctx: &mut DataManagerContext<'_, Self>) -> ContractResult<()> {
        ctx.publish_data_view_as::<_, dyn Census>(PopulationView { size: self.size }, |v| {
            v as Rc<dyn Census>
        });
        Ok(())
    }
}

trait Tally {
    fn total(&self) -> u64;
}

struct Ledger {
    total: u64,
}

impl Tally for Ledger {
    fn total(&self) -> u64 {
        self.total
    }
}

impl DataManager for Ledger {
    fn expose(aliases: &mut DataManagerAliases<Self>) {
        aliases.alias::<dyn Tally>(|dm| dm as Rc<RefCell<dyn Tally>>);
    }
}

struct Till {
    cash: u64,
}

impl Tally for Till {
    fn total(&self) -> u64 {
        self.cash
    }
}

impl DataManager for Till {
    fn expose(aliases: &mut DataManagerAliases<Self>) {
        aliases.alias::<dyn Tally>(|dm| dm as Rc<RefCell<dyn Tally>>);
    }
}

// ── Data views ─────────────────────────────────────────────────────

#[test]
fn view_found_by_exact_type_and_alias() {
    let rec = Recorder::new();
    let r = rec.clone();
    run_plugins(vec![
        data_manager_plugin("population", || Population { size: 42 }),
        actor_plugin("reader", move |actor| {
            let view = actor.get_data_view::<PopulationView>()?.expect("published");
            let census = actor.get_data_view::<dyn Census>()?.expect("aliased");
            r.record(format!("{} {}", view.size, census.population()));
            Ok(())
        }),
    ])
    .unwrap();
    assert_eq!(rec.entries(), vec!["42 42"]);
}

#[test]
fn missing_view_is_empty_not_an_error() {
    let rec = Recorder::new();
    let r = rec.clone();
    run_plugins(vec![actor_plugin("reader", move |actor| {
        r.record(format!("{}", actor.get_data_view::<PopulationView>()?.is_none()));
        Ok(())
    })])
    .unwrap();
    assert_eq!(rec.entries(), vec!["true"]);
}

#[test]
fn shared_view_alias_is_ambiguous() {
    let rec = Recorder::new();
    let r = rec.clone();
    run_plugins(vec![
        data_manager_plugin("north", || Population { size: 1 }),
        data_manager_plugin("south", || Population { size: 2 }),
        actor_plugin("reader", move |actor| {
            let err = actor.get_data_view::<dyn Census>().err().expect("ambiguous");
            r.record(err.kind.to_string());
            let err = actor.get_data_view::<PopulationView>().err().expect("ambiguous");
            r.record(err.kind.to_string());
            Ok(())
        }),
    ])
    .unwrap();
    assert_eq!(
        rec.entries(),
        vec!["AMBIGUOUS_DATA_VIEW_CLASS", "AMBIGUOUS_DATA_VIEW_CLASS"]
    );
}

// ── Data managers ──────────────────────────────────────────────────

#[test]
fn manager_found_by_alias() {
    let rec = Recorder::new();
    let r = rec.clone();
    run_plugins(vec![
        data_manager_plugin("ledger", || Ledger { total: 17 }),
        actor_plugin("reader", move |actor| {
            let tally = actor.get_data_manager::<dyn Tally>()?.expect("aliased");
            let ledger = actor.get_data_manager::<Ledger>()?.expect("registered");
            r.record(format!("{} {}", tally.borrow().total(), ledger.borrow().total));
            Ok(())
        }),
    ])
    .unwrap();
    assert_eq!(rec.entries(), vec!["17 17"]);
}

#[test]
fn exact_match_wins_over_alias_ambiguity() {
    let rec = Recorder::new();
    let r = rec.clone();
    run_plugins(vec![
        data_manager_plugin("ledger", || Ledger { total: 1 }),
        data_manager_plugin("till", || Till { cash: 2 }),
        actor_plugin("reader", move |actor| {
            let err = actor.get_data_manager::<dyn Tally>().err().expect("ambiguous");
            r.record(err.kind.to_string());
            let till = actor.get_data_manager::<Till>()?.expect("registered");
            r.record(format!("till {}", till.borrow().cash));
            Ok(())
        }),
    ])
    .unwrap();
    assert_eq!(
        rec.entries(),
        vec!["AMBIGUOUS_DATA_MANAGER_CLASS", "till 2"]
    );
}

#[test]
fn unknown_manager_is_empty_for_lookup_and_error_for_loan() {
    let rec = Recorder::new();
    let r = rec.clone();
    run_plugins(vec![actor_plugin("reader", move |actor| {
        r.record(format!("{}", actor.get_data_manager::<Counter>()?.is_none()));
        let err = actor
            .with_data_manager::<Counter, _>(|_, _| Ok(()))
            .unwrap_err();
        r.record(err.kind.to_string());
        Ok(())
    })])
    .unwrap();
    assert_eq!(rec.entries(), vec!["true", "UNKNOWN_DATA_MANAGER"]);
}

#[test]
fn two_managers_of_one_type_cannot_be_borrowed() {
    let rec = Recorder::new();
    let r = rec.clone();
    run_plugins(vec![
        data_manager_plugin("c1", Counter::default),
        data_manager_plugin("c2", Counter::default),
        actor_plugin("driver", move |actor| {
            let err = actor
                .with_data_manager::<Counter, _>(|_, _| Ok(()))
                .unwrap_err();
            r.record(err.kind.to_string());
            assert_eq!(
                actor.get_data_manager::<Counter>().unwrap_err().kind,
                ContractErrorKind::AmbiguousDataManagerClass
            );
            Ok(())
        }),
    ])
    .unwrap();
    assert_eq!(rec.entries(), vec!["AMBIGUOUS_DATA_MANAGER_CLASS"]);
}

#[test]
fn managers_can_borrow_each_other() {
    struct Bank;
    impl DataManager for Bank {
        fn init(&mut self, ctx: &mut DataManagerContext<'_, Self>) -> ContractResult<()> {
            ctx.add_plan(1.0, |_, ctx| {
                ctx.with_data_manager::<Counter, _>(|counter, cctx| counter.add(cctx, 4))
            })
        }
    }
    let rec = Recorder::new();
    let r = rec.clone();
    run_plugins(vec![
        data_manager_plugin("counter", Counter::default),
        data_manager_plugin("bank", || Bank),
        actor_plugin("reader", move |actor| {
            let r = r.clone();
            actor.add_plan(2.0, move |actor| {
                let counter = actor.get_data_manager::<Counter>()?.expect("registered");
                r.record(format!("{}", counter.borrow().value()));
                Ok(())
            })
        }),
    ])
    .unwrap();
    assert_eq!(rec.entries(), vec!["4"]);
}
