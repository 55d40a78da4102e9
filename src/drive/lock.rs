// Position lock: hold each side of the drivetrain at a distance setpoint
//
// One reference gain set is tuned; before every computation it is copied
// onto both side controllers. The two sides never share integral or
// derivative state.

use tracing::debug;

use super::pid::{sync_gains, PidController, PidGains};
use crate::config::{ConfigError, DrivetrainConfig, DEFAULT_LOCK_TOLERANCE};

/// Voltage pair produced by the lock loops, before the tank sign convention
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LockVoltages {
    pub left: f64,
    pub right: f64,
}

/// Two independent PID loops sharing a single reference gain set
#[derive(Debug, Clone)]
pub struct LockController {
    reference: PidGains,
    left: PidController,
    right: PidController,
    tolerance: f64,
}

impl LockController {
    pub fn new(reference: PidGains, period: f64) -> Self {
        Self {
            reference,
            left: PidController::new(reference, period),
            right: PidController::new(reference, period),
            tolerance: DEFAULT_LOCK_TOLERANCE,
        }
    }

    /// Build from a validated drivetrain config
    pub fn from_config(config: &DrivetrainConfig) -> Self {
        let (min, max) = config.integrator_range;
        let pid = PidController::new(config.gains, config.period()).with_integrator_range(min, max);
        Self {
            reference: config.gains,
            left: pid.clone(),
            right: pid,
            tolerance: config.lock_tolerance,
        }
    }

    /// Compute per-side voltages that drive the measured distances to the setpoints
    pub fn compute_lock_voltages(
        &mut self,
        left_setpoint: f64,
        right_setpoint: f64,
        left_measured: f64,
        right_measured: f64,
    ) -> LockVoltages {
        self.sync_gains();

        let voltages = LockVoltages {
            left: self.left.calculate(left_setpoint, left_measured),
            right: self.right.calculate(right_setpoint, right_measured),
        };
        debug!(
            "Lock: left {:.3}/{:.3} -> {:.2}V, right {:.3}/{:.3} -> {:.2}V",
            left_measured, left_setpoint, voltages.left, right_measured, right_setpoint, voltages.right
        );
        voltages
    }

    /// Copy the reference gains to both side controllers
    pub fn sync_gains(&mut self) {
        sync_gains(&self.reference, &mut self.left);
        sync_gains(&self.reference, &mut self.right);
    }

    /// Replace the reference gains; they reach the side loops on the next computation
    pub fn set_reference_gains(&mut self, gains: PidGains) -> Result<(), ConfigError> {
        gains.validate()?;
        self.reference = gains;
        Ok(())
    }

    pub fn reference_gains(&self) -> PidGains {
        self.reference
    }

    /// Both sides within tolerance of their last setpoints
    pub fn at_setpoint(&self) -> bool {
        self.left.at_setpoint(self.tolerance) && self.right.at_setpoint(self.tolerance)
    }

    /// Clear both sides' integral and derivative history
    pub fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }

    pub fn left(&self) -> &PidController {
        &self.left
    }

    pub fn right(&self) -> &PidController {
        &self.right
    }
}
