// Simulated differential base
//
// A first-order plant behind the sensor and actuator traits so the runtime
// and the tests can close the loop without hardware. Wheel speed is
// proportional to the drive fraction on each side; heading follows the
// speed difference over the track width.
//
// The plant models the mirrored right gearbox on the voltage path: a
// positive voltage applied to the right side drives that wheel backwards.
// Normalized commands arrive already corrected, as the motor group
// inversion does on the real robot.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use crate::config::{DrivetrainConfig, MAX_VOLTAGE};
use crate::drive::adapter::{ActuatorAdapter, AdapterError, Result, SensorAdapter};
use crate::drive::odometry::normalize_degrees;
use crate::messages::Pose;

/// Physical constants of the simulated base
#[derive(Debug, Clone, Copy)]
pub struct SimParams {
    /// Distance between left and right wheels (metres)
    pub track_width: f64,
    /// Wheel speed at full command (m/s)
    pub max_speed: f64,
    /// Voltage that maps to full command
    pub max_voltage: f64,
    /// Motors per side reporting feedback
    pub motors_per_side: usize,
    pub right_gearbox_mirrored: bool,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            track_width: 0.55,
            max_speed: 1.0,
            max_voltage: MAX_VOLTAGE,
            motors_per_side: 2,
            right_gearbox_mirrored: true,
        }
    }
}

#[derive(Debug, Default)]
struct Side {
    // Travel since power-on
    distance: f64,
    // Distance at the last encoder reset
    zero: f64,
    // Fraction of full speed, [-1, 1]
    drive: f64,
    // Voltage reported back per motor
    volts: f64,
}

#[derive(Debug)]
struct PlantState {
    params: SimParams,
    heading_offset_deg: f64,
    distance_per_pulse: f64,
    left: Side,
    right: Side,
    pose: Pose,
    pitch_deg: f64,
    sensor_fault: bool,
    actuator_fault: bool,
}

impl PlantState {
    fn pulses(&self, side: &Side) -> i64 {
        ((side.distance - side.zero) / self.distance_per_pulse).round() as i64
    }
}

/// Handle to the simulated plant, shared with its sensor and motor views
#[derive(Debug, Clone)]
pub struct SimulatedBase {
    state: Rc<RefCell<PlantState>>,
}

/// Sensor side of the simulated base
#[derive(Debug, Clone)]
pub struct SimSensors {
    state: Rc<RefCell<PlantState>>,
}

/// Actuator side of the simulated base
#[derive(Debug, Clone)]
pub struct SimMotors {
    state: Rc<RefCell<PlantState>>,
}

impl SimulatedBase {
    /// Plant matching the drivetrain's calibration and heading convention
    pub fn new(config: &DrivetrainConfig, params: SimParams) -> Self {
        let state = PlantState {
            params,
            heading_offset_deg: config.heading_offset_deg,
            distance_per_pulse: config.encoder_distance_per_pulse,
            left: Side::default(),
            right: Side::default(),
            pose: config.initial_pose,
            pitch_deg: 0.0,
            sensor_fault: false,
            actuator_fault: false,
        };
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    pub fn sensors(&self) -> SimSensors {
        SimSensors {
            state: Rc::clone(&self.state),
        }
    }

    pub fn motors(&self) -> SimMotors {
        SimMotors {
            state: Rc::clone(&self.state),
        }
    }

    /// Advance the plant by `dt` seconds
    pub fn step(&self, dt: f64) {
        let mut state = self.state.borrow_mut();
        let max_speed = state.params.max_speed;
        let v_left = state.left.drive * max_speed;
        let v_right = state.right.drive * max_speed;

        state.left.distance += v_left * dt;
        state.right.distance += v_right * dt;

        let forward = (v_left + v_right) / 2.0 * dt;
        let heading = state.pose.heading_rad();
        state.pose.x += forward * heading.cos();
        state.pose.y += forward * heading.sin();

        let omega = (v_right - v_left) / state.params.track_width;
        state.pose.heading_deg = normalize_degrees(state.pose.heading_deg + (omega * dt).to_degrees());
    }

    /// Ground-truth pose of the plant
    pub fn true_pose(&self) -> Pose {
        self.state.borrow().pose
    }

    pub fn set_pitch(&self, pitch_deg: f64) {
        self.state.borrow_mut().pitch_deg = pitch_deg;
    }

    /// Make every sensor read fail until cleared
    pub fn set_sensor_fault(&self, fault: bool) {
        self.state.borrow_mut().sensor_fault = fault;
    }

    pub fn set_actuator_fault(&self, fault: bool) {
        self.state.borrow_mut().actuator_fault = fault;
    }

    /// Current drive fractions (left, right) after the gearbox
    pub fn wheel_drive(&self) -> (f64, f64) {
        let state = self.state.borrow();
        (state.left.drive, state.right.drive)
    }
}

impl SimSensors {
    fn check(&self, device: &'static str) -> Result<()> {
        if self.state.borrow().sensor_fault {
            Err(AdapterError::Disconnected { device })
        } else {
            Ok(())
        }
    }
}

impl SensorAdapter for SimSensors {
    fn read_heading_degrees(&mut self) -> Result<f64> {
        self.check("imu")?;
        let state = self.state.borrow();
        // Invert the mounting correction so the drivetrain sees raw IMU angles
        Ok(normalize_degrees(state.heading_offset_deg - state.pose.heading_deg))
    }

    fn read_pitch(&mut self) -> Result<f64> {
        self.check("imu")?;
        Ok(self.state.borrow().pitch_deg)
    }

    fn read_left_pulses(&mut self) -> Result<i64> {
        self.check("left encoder")?;
        let state = self.state.borrow();
        Ok(state.pulses(&state.left))
    }

    fn read_right_pulses(&mut self) -> Result<i64> {
        self.check("right encoder")?;
        let state = self.state.borrow();
        Ok(state.pulses(&state.right))
    }

    fn reset_encoders(&mut self) -> Result<()> {
        self.check("encoders")?;
        let mut state = self.state.borrow_mut();
        state.left.zero = state.left.distance;
        state.right.zero = state.right.distance;
        Ok(())
    }
}

impl SimMotors {
    fn with_state<T>(&self, f: impl FnOnce(&mut PlantState) -> T) -> Result<T> {
        let mut state = self.state.borrow_mut();
        if state.actuator_fault {
            return Err(AdapterError::Rejected {
                device: "motor controller",
                reason: "fault injected".to_string(),
            });
        }
        Ok(f(&mut *state))
    }
}

impl ActuatorAdapter for SimMotors {
    fn apply_left_command(&mut self, value: f64) -> Result<()> {
        self.with_state(|s| {
            s.left.drive = value.clamp(-1.0, 1.0);
            s.left.volts = s.left.drive * s.params.max_voltage;
        })
    }

    fn apply_right_command(&mut self, value: f64) -> Result<()> {
        self.with_state(|s| {
            s.right.drive = value.clamp(-1.0, 1.0);
            s.right.volts = s.right.drive * s.params.max_voltage;
        })
    }

    fn apply_left_voltage(&mut self, volts: f64) -> Result<()> {
        self.with_state(|s| {
            s.left.volts = volts;
            s.left.drive = (volts / s.params.max_voltage).clamp(-1.0, 1.0);
        })
    }

    fn apply_right_voltage(&mut self, volts: f64) -> Result<()> {
        self.with_state(|s| {
            s.right.volts = volts;
            let physical = if s.params.right_gearbox_mirrored { -volts } else { volts };
            s.right.drive = (physical / s.params.max_voltage).clamp(-1.0, 1.0);
            debug!("Sim right side: {:.2}V -> drive {:.3}", volts, s.right.drive);
        })
    }

    fn read_left_voltage_feedback(&mut self) -> Result<Vec<f64>> {
        self.with_state(|s| vec![s.left.volts; s.params.motors_per_side])
    }

    fn read_right_voltage_feedback(&mut self) -> Result<Vec<f64>> {
        self.with_state(|s| vec![s.right.volts; s.params.motors_per_side])
    }
}
