// PID controller with a fixed cycle period

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, DEFAULT_INTEGRATOR_RANGE};

/// Proportional, integral and derivative gains
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl PidGains {
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd }
    }

    /// Reject NaN, infinite and negative gains
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [("kp", self.kp), ("ki", self.ki), ("kd", self.kd)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidGain { name, value });
            }
        }
        Ok(())
    }
}

/// Copy the reference gains onto a controller.
///
/// Only the gains move; the target keeps its own integral and error history.
pub fn sync_gains(reference: &PidGains, target: &mut PidController) {
    target.set_gains(*reference);
}

/// A single PID loop.
///
/// `output = kp * error + ki * integral + kd * derivative`, with
/// `error = setpoint - measurement`. The integral accumulates
/// `error * period` and is bounded by `integrator_range / ki`; the
/// derivative is the error change over one period and is zero on the first
/// sample after construction or `reset`. The output is not saturated.
#[derive(Debug, Clone, PartialEq)]
pub struct PidController {
    gains: PidGains,
    period: f64,
    integrator_range: (f64, f64),
    integral: f64,
    prev_error: Option<f64>,
    setpoint: f64,
    measurement: f64,
}

impl PidController {
    pub fn new(gains: PidGains, period: f64) -> Self {
        Self {
            gains,
            period,
            integrator_range: DEFAULT_INTEGRATOR_RANGE,
            integral: 0.0,
            prev_error: None,
            setpoint: 0.0,
            measurement: 0.0,
        }
    }

    pub fn with_integrator_range(mut self, min: f64, max: f64) -> Self {
        self.integrator_range = (min, max);
        self
    }

    /// Compute the output for one cycle
    pub fn calculate(&mut self, setpoint: f64, measurement: f64) -> f64 {
        self.setpoint = setpoint;
        self.measurement = measurement;

        let error = setpoint - measurement;
        let PidGains { kp, ki, kd } = self.gains;

        if ki != 0.0 {
            let (min, max) = self.integrator_range;
            self.integral = (self.integral + error * self.period).clamp(min / ki, max / ki);
        } else {
            self.integral += error * self.period;
        }

        let derivative = match self.prev_error {
            Some(prev) => (error - prev) / self.period,
            None => 0.0,
        };
        self.prev_error = Some(error);

        kp * error + ki * self.integral + kd * derivative
    }

    /// Clear the integral and error history, keeping the gains
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = None;
    }

    /// True when the last measurement was within `tolerance` of the setpoint
    ///
    /// False until `calculate` has run since construction or `reset`.
    pub fn at_setpoint(&self, tolerance: f64) -> bool {
        self.prev_error.is_some() && (self.setpoint - self.measurement).abs() <= tolerance
    }

    pub fn set_gains(&mut self, gains: PidGains) {
        self.gains = gains;
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }
}
