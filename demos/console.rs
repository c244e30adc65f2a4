// Keyboard tuning console: nudge gains and speed, start/stop, calibrate.
// Turns keys into the single-character wire commands and writes them to the
// robot's operator serial port.
//
//   1/2 Kp -/+   3/4 Ki -/+   5/6 Kd -/+   Up/Down speed
//   Space start/stop   C calibrate   V report   Q quit

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use serialport::SerialPort;
use std::io::Write;
use std::time::Duration;
use tracing::info;

use linebot_runtime::config::Params;

const DEFAULT_PORT: &str = "/dev/ttyUSB0";
const BAUDRATE: u32 = 115_200;

const KP_STEP: f32 = 0.01;
const KI_STEP: f32 = 0.001;
const KD_STEP: f32 = 0.05;
const SPEED_STEP: i16 = 5;

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let port_name = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_PORT.to_string());
    info!("Opening operator port {}", port_name);
    let mut port = serialport::new(&port_name, BAUDRATE)
        .timeout(Duration::from_millis(100))
        .open()?;

    info!("Controls: 1/2=Kp 3/4=Ki 5/6=Kd Up/Down=speed Space=run C=cal V=report Q=quit");

    enable_raw_mode()?;
    let result = run_console(&mut port);
    disable_raw_mode()?;

    result
}

fn run_console(
    port: &mut Box<dyn SerialPort>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Local shadow of the robot's parameters; starts from the same defaults
    let mut params = Params::default();
    let mut running = false;

    loop {
        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        let Event::Key(KeyEvent { code, kind, .. }) = event::read()? else {
            continue;
        };
        if kind != KeyEventKind::Press && kind != KeyEventKind::Repeat {
            continue;
        }

        match code {
            // Gain nudges
            KeyCode::Char('1') => {
                params.gains.kp = (params.gains.kp - KP_STEP).max(0.0);
                send(port, &format!("P{:.3}\n", params.gains.kp))?;
            }
            KeyCode::Char('2') => {
                params.gains.kp += KP_STEP;
                send(port, &format!("P{:.3}\n", params.gains.kp))?;
            }
            KeyCode::Char('3') => {
                params.gains.ki = (params.gains.ki - KI_STEP).max(0.0);
                send(port, &format!("I{:.4}\n", params.gains.ki))?;
            }
            KeyCode::Char('4') => {
                params.gains.ki += KI_STEP;
                send(port, &format!("I{:.4}\n", params.gains.ki))?;
            }
            KeyCode::Char('5') => {
                params.gains.kd = (params.gains.kd - KD_STEP).max(0.0);
                send(port, &format!("D{:.3}\n", params.gains.kd))?;
            }
            KeyCode::Char('6') => {
                params.gains.kd += KD_STEP;
                send(port, &format!("D{:.3}\n", params.gains.kd))?;
            }

            // Base speed
            KeyCode::Up => {
                params.base_speed = (params.base_speed + SPEED_STEP).min(255);
                send(port, &format!("S{}\n", params.base_speed))?;
            }
            KeyCode::Down => {
                params.base_speed = (params.base_speed - SPEED_STEP).max(1);
                send(port, &format!("S{}\n", params.base_speed))?;
            }

            // Run state toggle
            KeyCode::Char(' ') => {
                running = !running;
                send(port, if running { "R1\n" } else { "R0\n" })?;
                info!("Drive {}", if running { "started" } else { "stopped" });
            }

            KeyCode::Char('c') => send(port, "C\n")?,
            KeyCode::Char('v') => send(port, "V\n")?,

            KeyCode::Char('q') | KeyCode::Esc => break,

            _ => {}
        }
    }

    // Leave the robot stopped on the way out
    send(port, "R0\n")?;
    Ok(())
}

fn send(
    port: &mut Box<dyn SerialPort>,
    cmd: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    port.write_all(cmd.as_bytes())?;
    port.flush()?;
    info!("-> {}", cmd.trim_end());
    Ok(())
}
