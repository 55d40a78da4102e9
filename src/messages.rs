// Message types shared between the drivetrain, the runtime and command sources

use serde::{Deserialize, Serialize};

// Command from teleop/scripts -> runtime
// Tagged so a JSON line reads e.g. {"mode":"arcade","speed":0.4,"turn":0.0}
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DriveCommand {
    /// Normalized forward speed and turn rate, mixed per side
    Arcade { speed: f64, turn: f64 },
    /// Per-side voltages, applied with the tank-drive sign convention
    TankVoltage { left: f64, right: f64 },
    /// Hold each side at a wheel distance setpoint
    LockSetpoint { left: f64, right: f64 },
}

impl DriveCommand {
    pub fn stop() -> Self {
        DriveCommand::Arcade {
            speed: 0.0,
            turn: 0.0,
        }
    }

    pub fn is_lock(&self) -> bool {
        matches!(self, DriveCommand::LockSetpoint { .. })
    }
}

/// 2D pose in the world frame, heading in degrees within (-180, 180]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub heading_deg: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, heading_deg: f64) -> Self {
        Self { x, y, heading_deg }
    }

    pub fn heading_rad(&self) -> f64 {
        self.heading_deg.to_radians()
    }

    /// Straight-line distance to another pose
    pub fn distance_to(&self, other: &Pose) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

// Snapshot of the sensors taken once per control cycle
// heading_deg is the raw IMU angle, before the mounting correction
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WheelTelemetry {
    pub left_distance: f64,
    pub right_distance: f64,
    pub heading_deg: f64,
    pub pitch_deg: f64,
}

/// Health status reported by the runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    SensorFault,
    ActuatorFault,
}
