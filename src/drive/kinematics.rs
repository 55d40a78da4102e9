// Differential-drive kinematics for a two-sided (tank) base
// Converts arcade (speed, turn) and tank voltage commands into per-side actuator values.

use crate::config::MAX_COMMAND;

/// The right gearbox is mounted mirrored relative to the left, so a positive
/// voltage on the right side drives that wheel backwards. The tank-drive
/// voltage path negates the right side to compensate. Change it here (or via
/// `DrivetrainConfig::invert_right_voltage`) if the gearbox is remounted.
pub const RIGHT_SIDE_INVERTED: bool = true;

/// Per-side command pair
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SideCommands {
    pub left: f64,
    pub right: f64,
}

impl SideCommands {
    pub fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Returns the pair as a tuple (left, right)
    pub fn as_tuple(&self) -> (f64, f64) {
        (self.left, self.right)
    }
}

/// Zero out inputs smaller than the deadband
pub fn apply_deadband(value: f64, deadband: f64) -> f64 {
    if value.abs() < deadband { 0.0 } else { value }
}

/// Saturate to [-max, max]; NaN becomes zero output
fn saturate(value: f64, max: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(-max, max) }
}

/// Saturate a voltage to [-max, max]
pub fn clamp_voltage(volts: f64, max: f64) -> f64 {
    saturate(volts, max)
}

/// Mix arcade inputs into per-side commands
///
/// # Arguments
/// * `speed` - Forward command (positive = forward)
/// * `turn` - Turn command (positive = left side faster)
///
/// # Returns
/// `left = speed + turn`, `right = speed - turn`, each saturated to [-1, 1]
pub fn arcade_to_sides(speed: f64, turn: f64) -> SideCommands {
    arcade_to_sides_with_params(speed, turn, MAX_COMMAND)
}

/// Mix arcade inputs with a custom saturation limit
pub fn arcade_to_sides_with_params(speed: f64, turn: f64, max_command: f64) -> SideCommands {
    let left = speed + turn;
    let right = speed - turn;

    // Saturate each side independently, never wrap
    SideCommands {
        left: saturate(left, max_command),
        right: saturate(right, max_command),
    }
}

/// Apply the tank-drive sign convention to a voltage pair
pub fn tank_volts_to_actuator(left_volts: f64, right_volts: f64) -> SideCommands {
    tank_volts_to_actuator_with_params(left_volts, right_volts, RIGHT_SIDE_INVERTED)
}

/// Apply the tank-drive sign convention with an explicit right-side inversion flag
pub fn tank_volts_to_actuator_with_params(
    left_volts: f64,
    right_volts: f64,
    invert_right: bool,
) -> SideCommands {
    let right = if invert_right { -right_volts } else { right_volts };
    SideCommands::new(left_volts, right)
}
