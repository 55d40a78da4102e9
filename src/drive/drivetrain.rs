// High-level drivetrain for a two-sided differential base
//
// Combines odometry, kinematics and the lock controller behind the
// operations the control loop calls once per cycle.

use tracing::{debug, info, warn};

use super::adapter::{ActuatorAdapter, AdapterError, SensorAdapter};
use super::encoder::EncoderPair;
use super::kinematics::{
    apply_deadband, arcade_to_sides_with_params, clamp_voltage, tank_volts_to_actuator_with_params,
    SideCommands,
};
use super::lock::{LockController, LockVoltages};
use super::odometry::OdometryEstimator;
use super::pid::PidGains;
use crate::config::{ConfigError, DrivetrainConfig};
use crate::messages::{DriveCommand, Pose, WheelTelemetry};

/// Errors surfaced by drivetrain operations
#[derive(Debug, thiserror::Error)]
pub enum DrivetrainError {
    #[error("sensor read failed: {0}")]
    Sensor(#[source] AdapterError),

    #[error("actuator write failed: {0}")]
    Actuator(#[source] AdapterError),

    #[error("implausible {what} reading: {value}")]
    ImplausibleReading { what: &'static str, value: f64 },

    #[error("no voltage feedback from the {side} side")]
    NoFeedback { side: &'static str },

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, DrivetrainError>;

/// Closed-loop differential drivetrain.
///
/// Not safe for concurrent use: call `update_odometry` then one command
/// operation per control cycle from a single owner.
pub struct Drivetrain<S: SensorAdapter, A: ActuatorAdapter> {
    sensors: S,
    actuators: A,
    config: DrivetrainConfig,
    odometry: OdometryEstimator,
    lock: LockController,
    encoders: EncoderPair,
    heading_deg: f64,
    pitch_deg: f64,
}

impl<S: SensorAdapter, A: ActuatorAdapter> Drivetrain<S, A> {
    /// Create a drivetrain over the given adapters
    ///
    /// The config is validated and both encoders are zeroed here, so travel
    /// counted before construction never reaches the pose.
    pub fn new(config: DrivetrainConfig, mut sensors: S, actuators: A) -> Result<Self> {
        config.validate()?;
        sensors.reset_encoders().map_err(DrivetrainError::Sensor)?;

        info!(
            "Drivetrain: {} Hz, heading offset {} deg, {:.6} m/pulse, gains {:?}",
            config.loop_hz, config.heading_offset_deg, config.encoder_distance_per_pulse, config.gains
        );

        let odometry = OdometryEstimator::new(config.initial_pose, config.heading_offset_deg)
            .with_max_step(config.max_odometry_step);
        let lock = LockController::from_config(&config);
        let encoders = EncoderPair::new(config.encoder_distance_per_pulse);

        Ok(Self {
            sensors,
            actuators,
            config,
            odometry,
            lock,
            encoders,
            heading_deg: 0.0,
            pitch_deg: 0.0,
        })
    }

    /// Arcade drive: mix speed and turn into per-side commands
    pub fn move_arcade(&mut self, speed: f64, turn: f64) -> Result<()> {
        let speed = apply_deadband(speed, self.config.deadband);
        let turn = apply_deadband(turn, self.config.deadband);
        let sides = arcade_to_sides_with_params(speed, turn, self.config.max_command);

        debug!("Arcade: left={:.3}, right={:.3}", sides.left, sides.right);
        self.actuators
            .apply_left_command(sides.left)
            .map_err(DrivetrainError::Actuator)?;
        self.actuators
            .apply_right_command(sides.right)
            .map_err(DrivetrainError::Actuator)
    }

    pub fn move_straight(&mut self, speed: f64) -> Result<()> {
        self.move_arcade(speed, 0.0)
    }

    pub fn turn_in_place(&mut self, rate: f64) -> Result<()> {
        self.move_arcade(0.0, rate)
    }

    pub fn stop(&mut self) -> Result<()> {
        self.move_arcade(0.0, 0.0)
    }

    /// Apply per-side voltages, bypassing arcade mixing
    ///
    /// The right side is negated when `invert_right_voltage` is set, then both
    /// sides are saturated to `max_voltage`. Returns what was applied.
    pub fn set_tank_drive_volts(&mut self, left_volts: f64, right_volts: f64) -> Result<SideCommands> {
        let signed =
            tank_volts_to_actuator_with_params(left_volts, right_volts, self.config.invert_right_voltage);
        let applied = SideCommands::new(
            clamp_voltage(signed.left, self.config.max_voltage),
            clamp_voltage(signed.right, self.config.max_voltage),
        );

        debug!("Tank: left={:.2}V, right={:.2}V", applied.left, applied.right);
        self.actuators
            .apply_left_voltage(applied.left)
            .map_err(DrivetrainError::Actuator)?;
        self.actuators
            .apply_right_voltage(applied.right)
            .map_err(DrivetrainError::Actuator)?;
        Ok(applied)
    }

    /// Zero both encoders and restart the odometry baseline
    pub fn reset_encoders(&mut self) -> Result<()> {
        info!("Resetting encoders");
        self.sensors.reset_encoders().map_err(DrivetrainError::Sensor)?;
        self.encoders.reset();
        self.odometry.reset_baseline();
        Ok(())
    }

    /// Pull fresh telemetry and advance the pose estimate
    ///
    /// Every sensor is read and checked before any state changes, so a
    /// failed read leaves the pose and encoder snapshots as they were.
    pub fn update_odometry(&mut self) -> Result<Pose> {
        let heading = self
            .sensors
            .read_heading_degrees()
            .map_err(DrivetrainError::Sensor)?;
        if !heading.is_finite() {
            return Err(DrivetrainError::ImplausibleReading {
                what: "heading",
                value: heading,
            });
        }

        let pitch = self.sensors.read_pitch().map_err(DrivetrainError::Sensor)?;
        if !pitch.is_finite() {
            return Err(DrivetrainError::ImplausibleReading {
                what: "pitch",
                value: pitch,
            });
        }

        let left_pulses = self.sensors.read_left_pulses().map_err(DrivetrainError::Sensor)?;
        let right_pulses = self.sensors.read_right_pulses().map_err(DrivetrainError::Sensor)?;

        self.heading_deg = heading;
        self.pitch_deg = pitch;
        self.encoders.latch(left_pulses, right_pulses);

        Ok(self.odometry.update(
            heading,
            self.encoders.left.distance(),
            self.encoders.right.distance(),
        ))
    }

    /// Hold each side at a distance setpoint
    ///
    /// Measured distances are the ones latched by the last `update_odometry`.
    /// The loops' history only advances once both voltages were applied.
    pub fn lock(&mut self, left_setpoint: f64, right_setpoint: f64) -> Result<LockVoltages> {
        let mut next = self.lock.clone();
        let voltages = next.compute_lock_voltages(
            left_setpoint,
            right_setpoint,
            self.encoders.left.distance(),
            self.encoders.right.distance(),
        );
        self.set_tank_drive_volts(voltages.left, voltages.right)?;
        self.lock = next;
        Ok(voltages)
    }

    /// Dispatch one command for this cycle
    pub fn apply(&mut self, command: &DriveCommand) -> Result<()> {
        match *command {
            DriveCommand::Arcade { speed, turn } => self.move_arcade(speed, turn),
            DriveCommand::TankVoltage { left, right } => self.set_tank_drive_volts(left, right).map(|_| ()),
            DriveCommand::LockSetpoint { left, right } => self.lock(left, right).map(|_| ()),
        }
    }

    /// Average output voltage of the motors on each side (left, right)
    pub fn motors_voltage(&mut self) -> Result<(f64, f64)> {
        let left = self
            .actuators
            .read_left_voltage_feedback()
            .map_err(DrivetrainError::Actuator)?;
        let right = self
            .actuators
            .read_right_voltage_feedback()
            .map_err(DrivetrainError::Actuator)?;

        let left = mean(&left).ok_or(DrivetrainError::NoFeedback { side: "left" })?;
        let right = mean(&right).ok_or(DrivetrainError::NoFeedback { side: "right" })?;
        Ok((left, right))
    }

    pub fn pose(&self) -> Pose {
        self.odometry.pose()
    }

    /// Overwrite the pose estimate, e.g. when the robot is placed at a known spot
    pub fn reset_pose(&mut self, pose: Pose) {
        info!("Resetting pose to {:?}", pose);
        self.odometry.reset_pose(pose);
    }

    /// Mean of the left and right wheel distances
    pub fn distance(&self) -> f64 {
        self.encoders.distance()
    }

    pub fn left_distance(&self) -> f64 {
        self.encoders.left.distance()
    }

    pub fn right_distance(&self) -> f64 {
        self.encoders.right.distance()
    }

    pub fn left_pulses(&self) -> i64 {
        self.encoders.left.pulses()
    }

    pub fn right_pulses(&self) -> i64 {
        self.encoders.right.pulses()
    }

    pub fn pitch(&self) -> f64 {
        self.pitch_deg
    }

    /// Snapshot of the last telemetry read
    pub fn telemetry(&self) -> WheelTelemetry {
        WheelTelemetry {
            left_distance: self.left_distance(),
            right_distance: self.right_distance(),
            heading_deg: self.heading_deg,
            pitch_deg: self.pitch_deg,
        }
    }

    pub fn set_reference_gains(&mut self, gains: PidGains) -> std::result::Result<(), ConfigError> {
        info!("Lock gains set to {:?}", gains);
        self.lock.set_reference_gains(gains)
    }

    /// Clear the lock loops' integral and derivative history
    pub fn reset_lock(&mut self) {
        self.lock.reset();
    }

    pub fn at_lock_setpoint(&self) -> bool {
        self.lock.at_setpoint()
    }

    pub fn lock_controller(&self) -> &LockController {
        &self.lock
    }

    pub fn config(&self) -> &DrivetrainConfig {
        &self.config
    }

    pub fn sensors(&self) -> &S {
        &self.sensors
    }

    pub fn sensors_mut(&mut self) -> &mut S {
        &mut self.sensors
    }

    pub fn actuators(&self) -> &A {
        &self.actuators
    }

    pub fn actuators_mut(&mut self) -> &mut A {
        &mut self.actuators
    }
}

impl<S: SensorAdapter, A: ActuatorAdapter> Drop for Drivetrain<S, A> {
    fn drop(&mut self) {
        // Try to stop motors when the drivetrain goes away
        if let Err(e) = self.stop() {
            warn!("Failed to stop motors on drop: {}", e);
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::adapter::Result as AdapterResult;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[derive(Default)]
    struct FakeSensors {
        heading: f64,
        pitch: f64,
        left: i64,
        right: i64,
        fail: bool,
        resets: usize,
    }

    impl SensorAdapter for FakeSensors {
        fn read_heading_degrees(&mut self) -> AdapterResult<f64> {
            if self.fail {
                return Err(AdapterError::Disconnected { device: "imu" });
            }
            Ok(self.heading)
        }

        fn read_pitch(&mut self) -> AdapterResult<f64> {
            Ok(self.pitch)
        }

        fn read_left_pulses(&mut self) -> AdapterResult<i64> {
            Ok(self.left)
        }

        fn read_right_pulses(&mut self) -> AdapterResult<i64> {
            Ok(self.right)
        }

        fn reset_encoders(&mut self) -> AdapterResult<()> {
            self.left = 0;
            self.right = 0;
            self.resets += 1;
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeActuators {
        commands: (f64, f64),
        volts: (f64, f64),
        feedback: (Vec<f64>, Vec<f64>),
        reject_right_voltage: bool,
    }

    impl ActuatorAdapter for FakeActuators {
        fn apply_left_command(&mut self, value: f64) -> AdapterResult<()> {
            self.commands.0 = value;
            Ok(())
        }

        fn apply_right_command(&mut self, value: f64) -> AdapterResult<()> {
            self.commands.1 = value;
            Ok(())
        }

        fn apply_left_voltage(&mut self, volts: f64) -> AdapterResult<()> {
            self.volts.0 = volts;
            Ok(())
        }

        fn apply_right_voltage(&mut self, volts: f64) -> AdapterResult<()> {
            if self.reject_right_voltage {
                return Err(AdapterError::Rejected {
                    device: "right motors",
                    reason: "overcurrent".to_string(),
                });
            }
            self.volts.1 = volts;
            Ok(())
        }

        fn read_left_voltage_feedback(&mut self) -> AdapterResult<Vec<f64>> {
            Ok(self.feedback.0.clone())
        }

        fn read_right_voltage_feedback(&mut self) -> AdapterResult<Vec<f64>> {
            Ok(self.feedback.1.clone())
        }
    }

    // 1 pulse = 1 cm keeps the arithmetic readable
    fn drivetrain() -> Drivetrain<FakeSensors, FakeActuators> {
        let config = DrivetrainConfig {
            encoder_distance_per_pulse: 0.01,
            ..Default::default()
        };
        let sensors = FakeSensors {
            heading: 180.0,
            ..Default::default()
        };
        Drivetrain::new(config, sensors, FakeActuators::default()).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = DrivetrainConfig {
            encoder_distance_per_pulse: 0.0,
            ..Default::default()
        };
        let result = Drivetrain::new(config, FakeSensors::default(), FakeActuators::default());
        assert!(matches!(
            result,
            Err(DrivetrainError::Config(ConfigError::InvalidDistancePerPulse(_)))
        ));
    }

    #[test]
    fn test_new_zeroes_encoders() {
        // The base already drove 5 m before the drivetrain was built
        let sensors = FakeSensors {
            heading: 180.0,
            left: 500,
            right: 500,
            ..Default::default()
        };
        let config = DrivetrainConfig {
            encoder_distance_per_pulse: 0.01,
            ..Default::default()
        };
        let mut dt = Drivetrain::new(config, sensors, FakeActuators::default()).unwrap();
        assert_eq!(dt.sensors().resets, 1);

        let pose = dt.update_odometry().unwrap();
        assert_eq!(pose, Pose::default());
        assert_eq!(dt.left_pulses(), 0);
    }

    #[test]
    fn test_move_routes_through_mixing() {
        let mut dt = drivetrain();
        dt.move_arcade(0.9, 0.5).unwrap();
        let (left, right) = dt.actuators().commands;
        assert!(approx_eq(left, 1.0));
        assert!(approx_eq(right, 0.4));

        dt.move_straight(0.3).unwrap();
        assert_eq!(dt.actuators().commands, (0.3, 0.3));

        dt.turn_in_place(0.2).unwrap();
        assert_eq!(dt.actuators().commands, (0.2, -0.2));

        dt.stop().unwrap();
        assert_eq!(dt.actuators().commands, (0.0, 0.0));
    }

    #[test]
    fn test_deadband_applies_to_arcade() {
        let config = DrivetrainConfig {
            deadband: 0.05,
            ..Default::default()
        };
        let mut dt = Drivetrain::new(config, FakeSensors::default(), FakeActuators::default()).unwrap();
        dt.move_arcade(0.5, 0.02).unwrap();
        assert_eq!(dt.actuators().commands, (0.5, 0.5));
    }

    #[test]
    fn test_tank_volts_sign_and_saturation() {
        let mut dt = drivetrain();
        let applied = dt.set_tank_drive_volts(6.0, 6.0).unwrap();
        assert_eq!(applied.as_tuple(), (6.0, -6.0));
        assert_eq!(dt.actuators().volts, (6.0, -6.0));

        dt.set_tank_drive_volts(20.0, -30.0).unwrap();
        assert_eq!(dt.actuators().volts, (12.0, 12.0));
    }

    #[test]
    fn test_update_odometry_and_accessors() {
        let mut dt = drivetrain();
        dt.sensors_mut().left = 100;
        dt.sensors_mut().right = 300;
        dt.sensors_mut().pitch = 2.5;
        let pose = dt.update_odometry().unwrap();

        assert!(approx_eq(dt.left_distance(), 1.0));
        assert!(approx_eq(dt.right_distance(), 3.0));
        assert!(approx_eq(dt.distance(), (dt.left_distance() + dt.right_distance()) / 2.0));
        assert_eq!(dt.left_pulses(), 100);
        assert!(approx_eq(dt.pitch(), 2.5));
        assert!(approx_eq(pose.x, 2.0), "x was {}", pose.x);
        assert_eq!(dt.pose(), pose);
        assert!(approx_eq(dt.telemetry().heading_deg, 180.0));
    }

    #[test]
    fn test_distance_is_mean_after_any_sequence() {
        let mut dt = drivetrain();
        for (l, r) in [(10, 20), (-5, 40), (7, 7)] {
            dt.sensors_mut().left = l;
            dt.sensors_mut().right = r;
            dt.update_odometry().unwrap();
            assert!(approx_eq(dt.distance(), (dt.left_distance() + dt.right_distance()) / 2.0));
        }
        dt.reset_encoders().unwrap();
        assert!(approx_eq(dt.distance(), (dt.left_distance() + dt.right_distance()) / 2.0));
        assert_eq!(dt.distance(), 0.0);
    }

    #[test]
    fn test_reset_encoders_rebaselines_odometry() {
        let mut dt = drivetrain();
        dt.sensors_mut().left = 500;
        dt.sensors_mut().right = 500;
        dt.update_odometry().unwrap();
        assert!(approx_eq(dt.pose().x, 5.0));

        dt.reset_encoders().unwrap();
        assert_eq!(dt.sensors().resets, 2);
        assert_eq!(dt.left_pulses(), 0);

        dt.sensors_mut().left = 20;
        dt.sensors_mut().right = 20;
        let pose = dt.update_odometry().unwrap();
        assert!(approx_eq(pose.x, 5.2), "x was {}", pose.x);
    }

    #[test]
    fn test_sensor_failure_leaves_state_untouched() {
        let mut dt = drivetrain();
        dt.sensors_mut().left = 100;
        dt.sensors_mut().right = 100;
        dt.update_odometry().unwrap();
        let pose = dt.pose();

        dt.sensors_mut().left = 900;
        dt.sensors_mut().fail = true;
        assert!(matches!(dt.update_odometry(), Err(DrivetrainError::Sensor(_))));
        assert_eq!(dt.pose(), pose);
        assert_eq!(dt.left_pulses(), 100);
    }

    #[test]
    fn test_nan_heading_is_rejected() {
        let mut dt = drivetrain();
        dt.sensors_mut().heading = f64::NAN;
        dt.sensors_mut().left = 100;
        match dt.update_odometry() {
            Err(DrivetrainError::ImplausibleReading { what, .. }) => assert_eq!(what, "heading"),
            other => panic!("expected ImplausibleReading, got {:?}", other),
        }
        assert_eq!(dt.left_pulses(), 0);
        assert_eq!(dt.pose(), Pose::default());
    }

    #[test]
    fn test_lock_proportional() {
        let mut dt = drivetrain();
        dt.set_reference_gains(PidGains::new(1.0, 0.0, 0.0)).unwrap();
        dt.update_odometry().unwrap();

        let voltages = dt.lock(10.0, 10.0).unwrap();
        assert!(approx_eq(voltages.left, 10.0));
        assert!(approx_eq(voltages.right, 10.0));
        // Right side goes out negated
        assert_eq!(dt.actuators().volts, (10.0, -10.0));

        dt.sensors_mut().left = 1000;
        dt.sensors_mut().right = 1000;
        dt.update_odometry().unwrap();
        let voltages = dt.lock(10.0, 10.0).unwrap();
        assert!(approx_eq(voltages.left, 0.0));
        assert!(dt.at_lock_setpoint());
    }

    #[test]
    fn test_lock_synchronizes_gains() {
        let mut dt = drivetrain();
        dt.set_reference_gains(PidGains::new(0.0, 1.0, 0.0)).unwrap();
        dt.sensors_mut().right = 50;
        dt.update_odometry().unwrap();
        dt.lock(1.0, 1.0).unwrap();
        let lock = dt.lock_controller();
        assert!(!approx_eq(lock.left().integral(), lock.right().integral()));

        let gains = PidGains::new(2.0, 0.1, 0.05);
        dt.set_reference_gains(gains).unwrap();
        dt.lock(1.0, 1.0).unwrap();
        let lock = dt.lock_controller();
        assert_eq!(lock.left().gains(), gains);
        assert_eq!(lock.right().gains(), gains);
    }

    #[test]
    fn test_failed_lock_keeps_pid_history() {
        let mut dt = drivetrain();
        dt.set_reference_gains(PidGains::new(1.0, 1.0, 0.0)).unwrap();
        dt.update_odometry().unwrap();
        dt.lock(1.0, 1.0).unwrap();
        let before = dt.lock_controller().clone();

        dt.actuators_mut().reject_right_voltage = true;
        assert!(matches!(dt.lock(1.0, 1.0), Err(DrivetrainError::Actuator(_))));
        assert_eq!(dt.lock_controller().left(), before.left());
        assert_eq!(dt.lock_controller().right(), before.right());

        // Once the motors accept again the loops continue from where they were
        dt.actuators_mut().reject_right_voltage = false;
        dt.lock(1.0, 1.0).unwrap();
        assert!(approx_eq(dt.lock_controller().left().integral(), 0.04));
    }

    #[test]
    fn test_at_lock_setpoint_needs_a_lock() {
        let mut dt = drivetrain();
        dt.update_odometry().unwrap();
        assert!(!dt.at_lock_setpoint());
        dt.lock(0.0, 0.0).unwrap();
        assert!(dt.at_lock_setpoint());
    }

    #[test]
    fn test_apply_dispatches_each_variant() {
        let mut dt = drivetrain();
        dt.apply(&DriveCommand::Arcade { speed: 0.5, turn: 0.2 }).unwrap();
        assert!(approx_eq(dt.actuators().commands.0, 0.7));

        dt.apply(&DriveCommand::TankVoltage { left: 3.0, right: 4.0 }).unwrap();
        assert_eq!(dt.actuators().volts, (3.0, -4.0));

        dt.set_reference_gains(PidGains::new(2.0, 0.0, 0.0)).unwrap();
        dt.apply(&DriveCommand::LockSetpoint { left: 1.0, right: -1.0 }).unwrap();
        assert_eq!(dt.actuators().volts, (2.0, 2.0));
    }

    #[test]
    fn test_motors_voltage_averages() {
        let mut dt = drivetrain();
        dt.actuators_mut().feedback = (vec![5.0, 7.0], vec![-4.0, -6.0]);
        let (left, right) = dt.motors_voltage().unwrap();
        assert!(approx_eq(left, 6.0));
        assert!(approx_eq(right, -5.0));

        dt.actuators_mut().feedback = (vec![], vec![1.0]);
        assert!(matches!(
            dt.motors_voltage(),
            Err(DrivetrainError::NoFeedback { side: "left" })
        ));
    }

    #[test]
    fn test_borrowed_adapters() {
        let mut sensors = FakeSensors {
            heading: 180.0,
            left: 10,
            right: 10,
            ..Default::default()
        };
        let mut actuators = FakeActuators::default();
        {
            let mut dt = Drivetrain::new(DrivetrainConfig::default(), &mut sensors, &mut actuators).unwrap();
            dt.update_odometry().unwrap();
            dt.move_straight(0.4).unwrap();
            assert_eq!(dt.actuators().commands, (0.4, 0.4));
        }
        // Dropping the drivetrain stops the motors
        assert_eq!(actuators.commands, (0.0, 0.0));
    }
}
