//! Time-ordered plan queue with active/passive halting semantics.
//!
//! [`PlanScheduler`] stores deferred actions keyed by `(time, insertion
//! sequence)`, so plans at equal times run in the order they were added.
//! It is generic over the owner type `O` and the payload `P`; the engine
//! instantiates it with its own owner enum and boxed closures.
//!
//! # Active and passive plans
//!
//! [`next`](PlanScheduler::next) only yields a plan while at least one
//! [`Activity::Active`] plan is pending. Passive plans scheduled after the
//! last active plan are therefore never executed, while passive plans
//! before it run normally. Adding a later active plan revives them.
//!
//! Cancelled plans are removed from the entry table immediately and left
//! in the heap as stale slots, which `next` skips. The heap is rebuilt
//! once stale slots outnumber live plans.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::hash::Hash;

use cadence_core::{Activity, ContractError, ContractErrorKind, ContractResult, PlanInfo, PlanKey};

/// Stale slots tolerated before [`PlanScheduler::compact`] rebuilds the heap.
const COMPACT_SLACK: usize = 32;

// ── Heap slot ──────────────────────────────────────────────────────

/// Heap ordering key. Reversed so that `BinaryHeap` pops the earliest.
#[derive(Clone, Copy, Debug)]
struct Slot {
    time: f64,
    seq: u64,
}

impl PartialEq for Slot {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Slot {}

impl PartialOrd for Slot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Slot {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Entry<O, P> {
    time: f64,
    owner: O,
    key: Option<PlanKey>,
    activity: Activity,
    payload: P,
}

/// A plan handed back by [`PlanScheduler::next`].
#[derive(Debug)]
pub struct DuePlan<O, P> {
    /// Scheduled time; the scheduler clock has already advanced to it.
    pub time: f64,
    /// Owner the plan belongs to.
    pub owner: O,
    /// Key the plan was added under, if any.
    pub key: Option<PlanKey>,
    /// Active or passive.
    pub activity: Activity,
    /// The deferred action.
    pub payload: P,
}

// ── PlanScheduler ──────────────────────────────────────────────────

/// Priority queue of owner-scoped, optionally keyed plans.
pub struct PlanScheduler<O, P> {
    time: f64,
    next_seq: u64,
    heap: BinaryHeap<Slot>,
    entries: HashMap<u64, Entry<O, P>>,
    keyed: HashMap<(O, PlanKey), u64>,
    active: usize,
}

impl<O, P> PlanScheduler<O, P>
where
    O: Copy + Eq + Hash,
{
    /// Empty scheduler whose clock starts at `start_time`.
    pub fn new(start_time: f64) -> Self {
        Self {
            time: start_time,
            next_seq: 0,
            heap: BinaryHeap::new(),
            entries: HashMap::new(),
            keyed: HashMap::new(),
            active: 0,
        }
    }

    /// Current logical time: the time of the most recently popped plan.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Number of pending plans, active and passive.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no plans are pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of pending active plans.
    pub fn active_count(&self) -> usize {
        self.active
    }

    /// Schedule `payload` for `owner` at `time`.
    ///
    /// # Errors
    ///
    /// - [`ContractErrorKind::InvalidPlanTime`] if `time` is NaN or infinite.
    /// - [`ContractErrorKind::PastPlanningTime`] if `time` is before the
    ///   current time.
    /// - [`ContractErrorKind::DuplicatePlanKey`] if `owner` already has a
    ///   pending plan under `key`.
    pub fn schedule(
        &mut self,
        owner: O,
        time: f64,
        key: Option<PlanKey>,
        activity: Activity,
        payload: P,
    ) -> ContractResult<()> {
        if !time.is_finite() {
            return Err(ContractError::with_details(
                ContractErrorKind::InvalidPlanTime,
                format!("{time}"),
            ));
        }
        if time < self.time {
            return Err(ContractError::with_details(
                ContractErrorKind::PastPlanningTime,
                format!("plan time {time} is before current time {}", self.time),
            ));
        }
        let seq = self.next_seq;
        if let Some(k) = &key {
            if self.keyed.contains_key(&(owner, k.clone())) {
                return Err(ContractError::with_details(
                    ContractErrorKind::DuplicatePlanKey,
                    format!("key {k}"),
                ));
            }
            self.keyed.insert((owner, k.clone()), seq);
        }
        self.next_seq += 1;
        if activity == Activity::Active {
            self.active += 1;
        }
        self.heap.push(Slot { time, seq });
        self.entries.insert(
            seq,
            Entry {
                time,
                owner,
                key,
                activity,
                payload,
            },
        );
        Ok(())
    }

    /// Descriptor of `owner`'s pending plan under `key`.
    pub fn get(&self, owner: O, key: &PlanKey) -> Option<PlanInfo> {
        let seq = self.keyed.get(&(owner, key.clone()))?;
        self.entries.get(seq).map(|e| PlanInfo {
            time: e.time,
            key: e.key.clone(),
            activity: e.activity,
        })
    }

    /// Scheduled time of `owner`'s pending plan under `key`.
    pub fn plan_time(&self, owner: O, key: &PlanKey) -> Option<f64> {
        self.get(owner, key).map(|info| info.time)
    }

    /// Cancel `owner`'s pending plan under `key`, returning its payload.
    pub fn remove(&mut self, owner: O, key: &PlanKey) -> Option<P> {
        let seq = self.keyed.remove(&(owner, key.clone()))?;
        let entry = self.entries.remove(&seq)?;
        if entry.activity == Activity::Active {
            self.active -= 1;
        }
        self.compact();
        Some(entry.payload)
    }

    /// Keys of `owner`'s pending keyed plans, in the order they were added.
    pub fn keys(&self, owner: O) -> Vec<PlanKey> {
        let mut keyed: Vec<(u64, &PlanKey)> = self
            .keyed
            .iter()
            .filter(|((o, _), _)| *o == owner)
            .map(|((_, k), &seq)| (seq, k))
            .collect();
        keyed.sort_unstable_by_key(|(seq, _)| *seq);
        keyed.into_iter().map(|(_, k)| k.clone()).collect()
    }

    /// Discard every pending plan of `owner`. Returns how many were dropped.
    pub fn remove_owner(&mut self, owner: O) -> usize {
        let before = self.entries.len();
        let mut dropped_active = 0;
        self.entries.retain(|_, e| {
            let keep = e.owner != owner;
            if !keep && e.activity == Activity::Active {
                dropped_active += 1;
            }
            keep
        });
        self.keyed.retain(|(o, _), _| *o != owner);
        self.active -= dropped_active;
        self.compact();
        before - self.entries.len()
    }

    /// Drop stale heap slots once they outnumber live plans.
    fn compact(&mut self) {
        if self.heap.len() > 2 * self.entries.len() + COMPACT_SLACK {
            let entries = &self.entries;
            self.heap.retain(|slot| entries.contains_key(&slot.seq));
        }
    }

    /// Pop the earliest plan, advancing the clock to its time.
    ///
    /// Returns `None` when no active plan remains, or when the earliest
    /// plan lies beyond `limit`. Plans past the limit stay queued.
    pub fn next(&mut self, limit: Option<f64>) -> Option<DuePlan<O, P>> {
        if self.active == 0 {
            return None;
        }
        loop {
            let slot = *self.heap.peek()?;
            if !self.entries.contains_key(&slot.seq) {
                self.heap.pop();
                continue;
            }
            if limit.is_some_and(|l| slot.time > l) {
                return None;
            }
            self.heap.pop();
            let entry = self.entries.remove(&slot.seq)?;
            if let Some(k) = &entry.key {
                self.keyed.remove(&(entry.owner, k.clone()));
            }
            if entry.activity == Activity::Active {
                self.active -= 1;
            }
            self.time = entry.time;
            return Some(DuePlan {
                time: entry.time,
                owner: entry.owner,
                key: entry.key,
                activity: entry.activity,
                payload: entry.payload,
            });
        }
    }
}
