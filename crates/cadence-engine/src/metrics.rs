//! Per-run counters for the simulation engine.
//!
//! [`RunMetrics`] is filled in as a simulation executes and is available
//! from [`Simulation::metrics`](crate::simulation::Simulation::metrics)
//! once the run ends.

/// Counters and timing collected over one simulation run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunMetrics {
    /// Plans popped from the scheduler and executed.
    pub plans_executed: u64,
    /// Events released through any context.
    pub events_released: u64,
    /// Individual handler invocations across all subscribers and phases.
    pub event_deliveries: u64,
    /// Actors added, including those added by plugins.
    pub actors_added: u64,
    /// Actors removed before the run ended.
    pub actors_removed: u64,
    /// Outputs forwarded to the output consumer.
    pub outputs_released: u64,
    /// Logical time when the scheduler loop stopped.
    pub final_time: f64,
    /// Wall-clock duration of `execute()`, in microseconds.
    pub wall_us: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metrics_are_zero() {
        let m = RunMetrics::default();
        assert_eq!(m.plans_executed, 0);
        assert_eq!(m.events_released, 0);
        assert_eq!(m.event_deliveries, 0);
        assert_eq!(m.final_time, 0.0);
    }
}
