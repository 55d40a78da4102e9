// Drivetrain control for a two-sided differential base
//
// Provides:
// - Sensor/actuator adapter traits (the hardware seam)
// - Encoder pulse counting with a distance calibration
// - Odometry from IMU heading + wheel distances
// - Arcade and tank-drive kinematics
// - Dual-PID position lock
// - The `Drivetrain` facade tying them together

pub mod adapter;
mod drivetrain;
pub mod encoder;
pub mod kinematics;
pub mod lock;
pub mod odometry;
pub mod pid;

pub use adapter::{ActuatorAdapter, AdapterError, SensorAdapter};
pub use drivetrain::{Drivetrain, DrivetrainError};
pub use kinematics::{arcade_to_sides, tank_volts_to_actuator, SideCommands, RIGHT_SIDE_INVERTED};
pub use lock::{LockController, LockVoltages};
pub use odometry::OdometryEstimator;
pub use pid::{sync_gains, PidController, PidGains};
