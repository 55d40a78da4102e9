// Hardware seams for the drivetrain
//
// The drivetrain never talks to hardware directly. Sensor and actuator
// access goes through these traits so a real robot, the simulated base, or
// a test fake can be plugged in.

/// Errors reported by a sensor or actuator implementation
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("{device} is not responding")]
    Disconnected { device: &'static str },

    #[error("{device} rejected the request: {reason}")]
    Rejected { device: &'static str, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AdapterError>;

/// IMU and wheel encoder readings
pub trait SensorAdapter {
    /// Raw IMU yaw in degrees, before the mounting correction
    fn read_heading_degrees(&mut self) -> Result<f64>;

    fn read_pitch(&mut self) -> Result<f64>;

    fn read_left_pulses(&mut self) -> Result<i64>;

    fn read_right_pulses(&mut self) -> Result<i64>;

    /// Zero both encoder counters
    fn reset_encoders(&mut self) -> Result<()>;
}

/// Motor outputs for the two drive sides
pub trait ActuatorAdapter {
    /// Normalized command in [-1, 1]
    fn apply_left_command(&mut self, value: f64) -> Result<()>;

    fn apply_right_command(&mut self, value: f64) -> Result<()>;

    /// Voltage command, sign convention already applied
    fn apply_left_voltage(&mut self, volts: f64) -> Result<()>;

    fn apply_right_voltage(&mut self, volts: f64) -> Result<()>;

    /// Output voltage of each physical motor on the left side
    fn read_left_voltage_feedback(&mut self) -> Result<Vec<f64>>;

    fn read_right_voltage_feedback(&mut self) -> Result<Vec<f64>>;
}

// Lets the application keep ownership and lend adapters to the drivetrain
impl<T: SensorAdapter + ?Sized> SensorAdapter for &mut T {
    fn read_heading_degrees(&mut self) -> Result<f64> {
        (**self).read_heading_degrees()
    }

    fn read_pitch(&mut self) -> Result<f64> {
        (**self).read_pitch()
    }

    fn read_left_pulses(&mut self) -> Result<i64> {
        (**self).read_left_pulses()
    }

    fn read_right_pulses(&mut self) -> Result<i64> {
        (**self).read_right_pulses()
    }

    fn reset_encoders(&mut self) -> Result<()> {
        (**self).reset_encoders()
    }
}

impl<T: ActuatorAdapter + ?Sized> ActuatorAdapter for &mut T {
    fn apply_left_command(&mut self, value: f64) -> Result<()> {
        (**self).apply_left_command(value)
    }

    fn apply_right_command(&mut self, value: f64) -> Result<()> {
        (**self).apply_right_command(value)
    }

    fn apply_left_voltage(&mut self, volts: f64) -> Result<()> {
        (**self).apply_left_voltage(volts)
    }

    fn apply_right_voltage(&mut self, volts: f64) -> Result<()> {
        (**self).apply_right_voltage(volts)
    }

    fn read_left_voltage_feedback(&mut self) -> Result<Vec<f64>> {
        (**self).read_left_voltage_feedback()
    }

    fn read_right_voltage_feedback(&mut self) -> Result<Vec<f64>> {
        (**self).read_right_voltage_feedback()
    }
}
