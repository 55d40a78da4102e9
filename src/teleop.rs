// Keyboard teleop: W/S drive, A/D turn, R/F speed, SPACE hold, E reset encoders, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::info;

use crate::messages::DriveCommand;
use crate::runtime::RuntimeInput;

const SPEEDS: [f64; 3] = [0.2, 0.5, 1.0]; // normalized
const TURN_SPEEDS: [f64; 3] = [0.15, 0.3, 0.6]; // normalized
const INPUT_TIMEOUT_MS: u64 = 100; // Reset to zero after this much time with no input

/// Read the keyboard and feed the runtime until Q/Esc or the runtime goes away
///
/// Blocking; run it on a blocking thread.
pub fn run_teleop(tx: mpsc::Sender<RuntimeInput>) -> std::io::Result<()> {
    info!("Controls: W/S=drive, A/D=turn, R/F=speed, SPACE=hold, E=reset encoders, Q=quit");
    print_speed(0);

    enable_raw_mode()?;
    let result = teleop_loop(&tx);
    disable_raw_mode()?;

    result
}

fn teleop_loop(tx: &mpsc::Sender<RuntimeInput>) -> std::io::Result<()> {
    let mut speed_idx: usize = 0;

    // Persistent command state
    let mut speed = 0.0;
    let mut turn = 0.0;
    let mut holding = false;
    let mut last_movement_input = Instant::now();

    loop {
        let mut event_input = None;

        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    KeyCode::Char('w') if pressed => {
                        speed = SPEEDS[speed_idx];
                        holding = false;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        speed = -SPEEDS[speed_idx];
                        holding = false;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        turn = -TURN_SPEEDS[speed_idx];
                        holding = false;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        turn = TURN_SPEEDS[speed_idx];
                        holding = false;
                        last_movement_input = Instant::now();
                    }

                    KeyCode::Char(' ') if pressed => {
                        holding = true;
                        event_input = Some(RuntimeInput::HoldPosition);
                    }
                    KeyCode::Char('e') if pressed => {
                        event_input = Some(RuntimeInput::ResetEncoders);
                    }

                    // Speed control
                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        // Reset to zero if no movement input for INPUT_TIMEOUT_MS
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            speed = 0.0;
            turn = 0.0;
        }

        if let Some(input) = event_input {
            if tx.blocking_send(input).is_err() {
                break;
            }
        }

        // While holding, the runtime keeps the lock; otherwise stream arcade at ~50Hz
        if !holding {
            let cmd = RuntimeInput::Command(DriveCommand::Arcade { speed, turn });
            if tx.blocking_send(cmd).is_err() {
                break;
            }
        }
    }

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
