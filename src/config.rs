// Loop timing, calibration constants and the drivetrain configuration
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::drive::kinematics::RIGHT_SIDE_INVERTED;
use crate::drive::pid::PidGains;
use crate::messages::Pose;

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Heading correction for the IMU mounting: effective = offset - raw
pub const DEFAULT_HEADING_OFFSET_DEG: f64 = 180.0;

// Wheel travel per encoder pulse (metres): 3.05 m measured over 3925 pulses
pub const ENCODER_DISTANCE_PER_PULSE: f64 = 3.05 / 3925.0;

// Starting pose (x, y, heading in degrees)
pub const INITIAL_POSE: (f64, f64, f64) = (0.0, 0.0, 0.0);

// Normalized command limit for arcade drive
pub const MAX_COMMAND: f64 = 1.0;

// Battery voltage the tank-drive path saturates at
pub const MAX_VOLTAGE: f64 = 12.0;

// Integral accumulator bounds, scaled by 1/ki
pub const DEFAULT_INTEGRATOR_RANGE: (f64, f64) = (-1.0, 1.0);

// Position tolerance for the lock controller (metres)
pub const DEFAULT_LOCK_TOLERANCE: f64 = 0.05;

/// Errors detected while loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("encoder distance per pulse must be finite and positive, got {0}")]
    InvalidDistancePerPulse(f64),

    #[error("gain {name} must be finite and non-negative, got {value}")]
    InvalidGain { name: &'static str, value: f64 },

    #[error("invalid {name}: {reason}")]
    InvalidRange { name: &'static str, reason: String },

    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// What the runtime does with the actuators when a sensor read fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorFaultPolicy {
    /// Command zero output for the cycle
    #[default]
    Stop,
    /// Skip the cycle and leave the last command on the actuators
    HoldPrevious,
}

/// Everything the drivetrain needs at construction.
///
/// Every field has a default, so a config file only lists what it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DrivetrainConfig {
    /// Baseline of the heading convention `offset - raw`
    pub heading_offset_deg: f64,
    pub initial_pose: Pose,
    pub encoder_distance_per_pulse: f64,
    /// Reference gains copied to both lock loops every cycle
    pub gains: PidGains,
    pub loop_hz: u64,
    pub max_command: f64,
    pub max_voltage: f64,
    /// Arcade inputs smaller than this are treated as zero
    pub deadband: f64,
    /// The right gearbox is mounted mirrored, so tank voltages are negated on that side
    pub invert_right_voltage: bool,
    pub integrator_range: (f64, f64),
    pub lock_tolerance: f64,
    /// Largest plausible mean wheel travel per cycle; `None` disables the check
    pub max_odometry_step: Option<f64>,
    pub cmd_timeout_ms: u64,
    pub sensor_fault_policy: SensorFaultPolicy,
}

impl Default for DrivetrainConfig {
    fn default() -> Self {
        let (x, y, heading_deg) = INITIAL_POSE;
        Self {
            heading_offset_deg: DEFAULT_HEADING_OFFSET_DEG,
            initial_pose: Pose::new(x, y, heading_deg),
            encoder_distance_per_pulse: ENCODER_DISTANCE_PER_PULSE,
            gains: PidGains::default(),
            loop_hz: LOOP_HZ,
            max_command: MAX_COMMAND,
            max_voltage: MAX_VOLTAGE,
            deadband: 0.0,
            invert_right_voltage: RIGHT_SIDE_INVERTED,
            integrator_range: DEFAULT_INTEGRATOR_RANGE,
            lock_tolerance: DEFAULT_LOCK_TOLERANCE,
            max_odometry_step: None,
            cmd_timeout_ms: CMD_TIMEOUT.as_millis() as u64,
            sensor_fault_policy: SensorFaultPolicy::default(),
        }
    }
}

impl DrivetrainConfig {
    /// Load a JSON config file and validate it
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Control cycle period in seconds
    pub fn period(&self) -> f64 {
        1.0 / self.loop_hz as f64
    }

    pub fn cmd_timeout(&self) -> Duration {
        Duration::from_millis(self.cmd_timeout_ms)
    }

    /// Fail fast on values that would make the control loop meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        let dpp = self.encoder_distance_per_pulse;
        if !dpp.is_finite() || dpp <= 0.0 {
            return Err(ConfigError::InvalidDistancePerPulse(dpp));
        }

        self.gains.validate()?;

        if !self.heading_offset_deg.is_finite() {
            return Err(invalid("heading_offset_deg", "must be finite"));
        }
        let pose = &self.initial_pose;
        if !(pose.x.is_finite() && pose.y.is_finite() && pose.heading_deg.is_finite()) {
            return Err(invalid("initial_pose", "must be finite"));
        }
        if self.loop_hz == 0 {
            return Err(invalid("loop_hz", "must be at least 1"));
        }
        if !(self.max_command.is_finite() && self.max_command > 0.0) {
            return Err(invalid("max_command", "must be finite and positive"));
        }
        if !(self.max_voltage.is_finite() && self.max_voltage > 0.0) {
            return Err(invalid("max_voltage", "must be finite and positive"));
        }
        if !(0.0..1.0).contains(&self.deadband) {
            return Err(invalid("deadband", "must be in [0, 1)"));
        }
        let (lo, hi) = self.integrator_range;
        if !(lo.is_finite() && hi.is_finite() && lo <= hi) {
            return Err(invalid(
                "integrator_range",
                &format!("expected finite min <= max, got ({}, {})", lo, hi),
            ));
        }
        if !(self.lock_tolerance.is_finite() && self.lock_tolerance >= 0.0) {
            return Err(invalid("lock_tolerance", "must be finite and non-negative"));
        }
        if let Some(step) = self.max_odometry_step {
            if !(step.is_finite() && step > 0.0) {
                return Err(invalid("max_odometry_step", "must be finite and positive"));
            }
        }
        Ok(())
    }
}

fn invalid(name: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidRange {
        name,
        reason: reason.to_string(),
    }
}
