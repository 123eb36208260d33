//! Simulation configuration and validation.
//!
//! [`SimulationConfig`] is the builder input for a
//! [`Simulation`](crate::simulation::Simulation). [`validate()`](SimulationConfig::validate)
//! checks it when the simulation is built, before any plugin runs.

use cadence_core::{ContractError, ContractErrorKind, ContractResult};

/// Clock settings for one simulation run.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationConfig {
    /// Logical time at which the run starts. Default: 0.0.
    pub start_time: f64,
    /// If set, the scheduler stops before executing any plan scheduled
    /// after this time. Default: `None` (run until halted or exhausted).
    pub halt_time: Option<f64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start_time: 0.0,
            halt_time: None,
        }
    }
}

impl SimulationConfig {
    /// Check structural invariants.
    ///
    /// # Errors
    ///
    /// - [`ContractErrorKind::InvalidStartTime`] if `start_time` is NaN or
    ///   infinite.
    /// - [`ContractErrorKind::InvalidHaltTime`] if `halt_time` is NaN,
    ///   infinite, or before `start_time`.
    pub fn validate(&self) -> ContractResult<()> {
        if !self.start_time.is_finite() {
            return Err(ContractError::with_details(
                ContractErrorKind::InvalidStartTime,
                format!("{}", self.start_time),
            ));
        }
        if let Some(halt) = self.halt_time {
            if !halt.is_finite() || halt < self.start_time {
                return Err(ContractError::with_details(
                    ContractErrorKind::InvalidHaltTime,
                    format!("halt time {halt} with start time {}", self.start_time),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        SimulationConfig::default().validate().unwrap();
    }

    #[test]
    fn non_finite_start_rejected() {
        let cfg = SimulationConfig {
            start_time: f64::NAN,
            ..Default::default()
        };
        assert_eq!(
            cfg.validate().unwrap_err().kind,
            ContractErrorKind::InvalidStartTime
        );
    }

    #[test]
    fn halt_before_start_rejected() {
        let cfg = SimulationConfig {
            start_time: 10.0,
            halt_time: Some(5.0),
        };
        assert_eq!(
            cfg.validate().unwrap_err().kind,
            ContractErrorKind::InvalidHaltTime
        );
    }

    #[test]
    fn halt_equal_to_start_accepted() {
        let cfg = SimulationConfig {
            start_time: 2.0,
            halt_time: Some(2.0),
        };
        cfg.validate().unwrap();
    }
}
