// Closed-loop differential drivetrain runtime
//
// - drive: odometry, kinematics, PID lock and the Drivetrain facade
// - sim: simulated base implementing the hardware traits
// - runtime: fixed-rate control loop with command watchdog

pub mod config;
pub mod drive;
pub mod messages;
pub mod runtime;
pub mod sim;
pub mod teleop;
