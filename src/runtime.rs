// Fixed-rate control loop with a command watchdog
// Note: a watchdog is a safety mechanism that triggers a safe action if something goes wrong
// Eg. if the command source crashes and stops sending, the drivetrain is stopped instead of
// running the last command forever

use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{error, info, warn};

// local imports
use crate::config::{DrivetrainConfig, SensorFaultPolicy};
use crate::drive::{ActuatorAdapter, Drivetrain, SensorAdapter};
use crate::messages::{DriveCommand, RuntimeHealth};
use crate::sim::{SimParams, SimulatedBase};

/// Something a command source can ask of the runtime
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuntimeInput {
    Command(DriveCommand),
    /// Lock both sides at their current distances
    HoldPosition,
    ResetEncoders,
}

impl RuntimeInput {
    /// Parse one line of text input: a JSON `DriveCommand`, `hold` or `reset`
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        match line.trim() {
            "hold" => Ok(RuntimeInput::HoldPosition),
            "reset" => Ok(RuntimeInput::ResetEncoders),
            other => serde_json::from_str(other).map(RuntimeInput::Command),
        }
    }
}

/// Where commands come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum InputSource {
    /// JSON lines on standard input
    Stdin,
    /// Keyboard teleop in the terminal
    Keyboard,
}

/// Options for `run`
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config_path: Option<PathBuf>,
    pub input: InputSource,
    /// Stop after this many cycles
    pub max_cycles: Option<u64>,
}

pub struct Runtime<S: SensorAdapter, A: ActuatorAdapter> {
    drivetrain: Drivetrain<S, A>,
    latest_cmd: Option<DriveCommand>,
    cmd_received_at: Instant,
    cmd_timeout: Duration,
    fault_policy: SensorFaultPolicy,
    health: RuntimeHealth,
    locking: bool,
}

impl<S: SensorAdapter, A: ActuatorAdapter> Runtime<S, A> {
    pub fn new(drivetrain: Drivetrain<S, A>) -> Self {
        let cmd_timeout = drivetrain.config().cmd_timeout();
        let fault_policy = drivetrain.config().sensor_fault_policy;
        Self {
            drivetrain,
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            cmd_timeout,
            fault_policy,
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
            locking: false,
        }
    }

    /// Process incoming input
    pub fn on_input(&mut self, input: RuntimeInput, now: Instant) {
        match input {
            RuntimeInput::Command(cmd) => {
                info!("Received command: {:?}", &cmd);
                self.latest_cmd = Some(cmd);
                self.cmd_received_at = now;
            }
            RuntimeInput::HoldPosition => {
                let cmd = DriveCommand::LockSetpoint {
                    left: self.drivetrain.left_distance(),
                    right: self.drivetrain.right_distance(),
                };
                info!("Holding position: {:?}", &cmd);
                self.latest_cmd = Some(cmd);
                self.cmd_received_at = now;
            }
            RuntimeInput::ResetEncoders => {
                if let Err(e) = self.drivetrain.reset_encoders() {
                    warn!("Encoder reset failed: {}", e);
                    return;
                }
                // A held position refers to distances that no longer exist
                if self.latest_cmd.is_some_and(|cmd| cmd.is_lock()) {
                    self.latest_cmd = Some(DriveCommand::LockSetpoint {
                        left: 0.0,
                        right: 0.0,
                    });
                }
            }
        }
    }

    /// Pick this cycle's command based on watchdog state
    fn compute_command(&mut self, now: Instant) -> DriveCommand {
        let cmd_age = now.saturating_duration_since(self.cmd_received_at);

        match self.latest_cmd {
            // Holding position is already the safe action, so a lock never goes stale
            Some(cmd) if cmd.is_lock() || cmd_age <= self.cmd_timeout => {
                self.health = RuntimeHealth::Ok;
                cmd
            }
            Some(_) => {
                // Watchdog triggered - stop the robot
                if self.health != RuntimeHealth::CmdStale {
                    warn!("Command stale ({:?} old), stopping robot", cmd_age);
                }
                self.health = RuntimeHealth::CmdStale;
                DriveCommand::stop()
            }
            None => {
                // No command ever received
                self.health = RuntimeHealth::CmdStale;
                DriveCommand::stop()
            }
        }
    }

    /// One control cycle: odometry first, then exactly one command
    pub fn cycle(&mut self, now: Instant) -> RuntimeHealth {
        if let Err(e) = self.drivetrain.update_odometry() {
            if self.health != RuntimeHealth::SensorFault {
                warn!("Sensor fault, policy {:?}: {}", self.fault_policy, e);
            }
            self.health = RuntimeHealth::SensorFault;
            // A lock resumed after the fault starts from a clean history
            self.locking = false;
            if self.fault_policy == SensorFaultPolicy::Stop {
                if let Err(e) = self.drivetrain.stop() {
                    error!("Failed to stop after sensor fault: {}", e);
                }
            }
            return self.health;
        }

        let cmd = self.compute_command(now);

        // Entering lock mode starts the PID loops from a clean history
        if cmd.is_lock() && !self.locking {
            self.drivetrain.reset_lock();
        }
        self.locking = cmd.is_lock();

        if let Err(e) = self.drivetrain.apply(&cmd) {
            if self.health != RuntimeHealth::ActuatorFault {
                warn!("Failed to apply {:?}: {}", cmd, e);
            }
            self.health = RuntimeHealth::ActuatorFault;
        }
        self.health
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    pub fn drivetrain(&self) -> &Drivetrain<S, A> {
        &self.drivetrain
    }

    pub fn drivetrain_mut(&mut self) -> &mut Drivetrain<S, A> {
        &mut self.drivetrain
    }
}

/// Forward JSON-line commands from stdin until EOF
async fn read_stdin(tx: mpsc::Sender<RuntimeInput>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match RuntimeInput::parse(&line) {
                Ok(input) => {
                    if tx.send(input).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Failed to parse command: {}", e),
            },
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read stdin: {}", e);
                break;
            }
        }
    }
}

pub async fn run(options: RunOptions) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = match &options.config_path {
        Some(path) => {
            info!("Loading config from {}", path.display());
            DrivetrainConfig::from_json_file(path)?
        }
        None => DrivetrainConfig::default(),
    };

    info!("Starting simulated base...");
    let base = SimulatedBase::new(&config, SimParams::default());
    let drivetrain = Drivetrain::new(config.clone(), base.sensors(), base.motors())?;
    let mut runtime = Runtime::new(drivetrain);

    let (tx, mut rx) = mpsc::channel(64);
    match options.input {
        InputSource::Stdin => {
            tokio::spawn(read_stdin(tx));
        }
        InputSource::Keyboard => {
            tokio::task::spawn_blocking(move || {
                if let Err(e) = crate::teleop::run_teleop(tx) {
                    error!("Teleop failed: {}", e);
                }
            });
        }
    }

    let period = config.period();
    let mut tick = interval(Duration::from_secs_f64(period));

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout, input {:?}",
        config.loop_hz,
        config.cmd_timeout_ms,
        options.input
    );

    let mut cycles: u64 = 0;
    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping");
                break;
            }
        }

        // 1. Drain all pending inputs (non-blocking), keep latest
        let mut source_closed = false;
        loop {
            match rx.try_recv() {
                Ok(input) => runtime.on_input(input, Instant::now()),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    source_closed = true;
                    break;
                }
            }
        }
        if source_closed {
            info!("Command source closed, stopping");
            break;
        }

        // 2. Odometry + dispatch (includes watchdog logic)
        runtime.cycle(Instant::now());

        // 3. Advance the plant by one period
        base.step(period);

        cycles += 1;
        if cycles % config.loop_hz == 0 {
            let dt = runtime.drivetrain();
            info!(
                "Pose {:?} | distance {:.3} | health {:?}",
                dt.pose(),
                dt.distance(),
                runtime.health()
            );
        }
        if options.max_cycles.is_some_and(|max| cycles >= max) {
            info!("Reached {} cycles, stopping", cycles);
            break;
        }
    }

    runtime.drivetrain_mut().stop()?;
    Ok(())
}
