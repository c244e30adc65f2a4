// Operator tuning protocol
//
// One leading character selects the action, optionally followed by a numeric
// literal consumed greedily up to the next non-numeric byte:
//
//   P/I/D <float>  set gain        S <int>  set base speed (0, 255]
//   R <0|1>        stop/start      C        recalibrate (blocking)
//   V              report          ?        help
//
// An unknown leading character discards the rest of the buffered input so a
// stale partial token cannot corrupt the next command. Out-of-range values
// are rejected with the prior value retained.

use tracing::{info, warn};

use crate::config::{Params, RunState, MAX_DUTY};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    SetKp(f32),
    SetKi(f32),
    SetKd(f32),
    SetBaseSpeed(i16),
    SetRun(bool),
    Calibrate,
    Report,
    Help,
}

/// Side effect the runtime must carry out after a command is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    None,
    /// Stopped -> Running: reset the controller state before the next cycle.
    ResetController,
    /// Drive is now stopped: halt the wheels immediately.
    StopDrive,
    /// Run the blocking calibration sweep.
    Recalibrate,
}

/// Accumulates operator bytes and yields at most one parsed command at a
/// time. A command whose numeric argument runs to the end of the buffer is
/// left in place until a terminating byte (newline from a line-based channel)
/// arrives.
#[derive(Default)]
pub struct CommandReader {
    buf: String,
}

impl CommandReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, input: &str) {
        self.buf.push_str(input);
    }

    pub fn next_command(&mut self) -> Option<Command> {
        let start = self.buf.find(|c: char| !c.is_whitespace())?;
        self.buf.drain(..start);

        let action = self.buf.chars().next()?;
        match action {
            'P' | 'I' | 'D' => {
                let (value, end) = self.take_number(1)?;
                self.buf.drain(..end);
                Some(match action {
                    'P' => Command::SetKp(value),
                    'I' => Command::SetKi(value),
                    _ => Command::SetKd(value),
                })
            }
            'S' => {
                let (value, end) = self.take_number(1)?;
                self.buf.drain(..end);
                Some(Command::SetBaseSpeed(value as i16))
            }
            'R' => {
                let (value, end) = self.take_number(1)?;
                self.buf.drain(..end);
                match value as i64 {
                    0 => Some(Command::SetRun(false)),
                    1 => Some(Command::SetRun(true)),
                    other => {
                        warn!("Run command takes 0 or 1, got {}", other);
                        None
                    }
                }
            }
            'C' => {
                self.buf.drain(..1);
                Some(Command::Calibrate)
            }
            'V' => {
                self.buf.drain(..1);
                Some(Command::Report)
            }
            '?' => {
                self.buf.drain(..1);
                Some(Command::Help)
            }
            other => {
                // Unknown action: the rest of the buffer is untrustworthy
                warn!("Unknown command '{}', discarding pending input", other);
                self.buf.clear();
                None
            }
        }
    }

    /// Greedily parse a numeric literal starting at byte `from`. Returns the
    /// value and the byte offset just past it, or None (consuming the bad
    /// token) on a malformed number. A literal still growing at the end of
    /// the buffer is left untouched for the next push.
    fn take_number(&mut self, from: usize) -> Option<(f32, usize)> {
        let rest = &self.buf[from..];
        let end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
            .map(|i| from + i);

        let end = match end {
            Some(e) => e,
            // No terminator yet; wait for more bytes
            None => return None,
        };

        if end == from {
            warn!("Command '{}' missing its numeric argument", &self.buf[..1]);
            self.buf.clear();
            return None;
        }

        match self.buf[from..end].parse::<f32>() {
            Ok(value) => Some((value, end)),
            Err(_) => {
                warn!(
                    "Malformed number '{}', discarding pending input",
                    &self.buf[from..end]
                );
                self.buf.clear();
                None
            }
        }
    }
}

/// Apply a parsed command to the live parameters. Invalid values are logged
/// and the prior value kept; valid mutations report the new value.
pub fn apply(cmd: Command, params: &mut Params) -> Effect {
    match cmd {
        Command::SetKp(v) => {
            set_gain("Kp", &mut params.gains.kp, v);
            Effect::None
        }
        Command::SetKi(v) => {
            set_gain("Ki", &mut params.gains.ki, v);
            Effect::None
        }
        Command::SetKd(v) => {
            set_gain("Kd", &mut params.gains.kd, v);
            Effect::None
        }
        Command::SetBaseSpeed(v) => {
            if v > 0 && v <= MAX_DUTY {
                params.base_speed = v;
                info!("Base speed set to {}", v);
            } else {
                warn!("Rejected base speed {}: must be in (0, {}]", v, MAX_DUTY);
            }
            Effect::None
        }
        Command::SetRun(start) => {
            let was = params.run_state;
            params.run_state = if start {
                RunState::Running
            } else {
                RunState::Stopped
            };
            match (was, params.run_state) {
                (RunState::Stopped, RunState::Running) => {
                    info!("Drive started");
                    Effect::ResetController
                }
                (RunState::Running, RunState::Stopped) => {
                    info!("Drive stopped");
                    Effect::StopDrive
                }
                _ => Effect::None,
            }
        }
        Command::Calibrate => Effect::Recalibrate,
        Command::Report => {
            info!(
                "Kp={} Ki={} Kd={} base_speed={} state={:?}",
                params.gains.kp,
                params.gains.ki,
                params.gains.kd,
                params.base_speed,
                params.run_state
            );
            Effect::None
        }
        Command::Help => {
            info!("Commands: P/I/D <gain>, S <speed 1-255>, R <0|1>, C calibrate, V report");
            Effect::None
        }
    }
}

fn set_gain(name: &str, slot: &mut f32, value: f32) {
    if value.is_finite() && value >= 0.0 {
        *slot = value;
        info!("{} set to {}", name, value);
    } else {
        warn!("Rejected {} = {}: gains must be >= 0", name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(input: &str) -> Vec<Command> {
        let mut reader = CommandReader::new();
        reader.push(input);
        let mut out = Vec::new();
        while let Some(cmd) = reader.next_command() {
            out.push(cmd);
        }
        out
    }

    #[test]
    fn test_parse_gain_commands() {
        assert_eq!(read_all("P0.25\n"), vec![Command::SetKp(0.25)]);
        assert_eq!(read_all("I0.01\n"), vec![Command::SetKi(0.01)]);
        assert_eq!(read_all("D1.5\n"), vec![Command::SetKd(1.5)]);
        // Negative values parse; rejection happens at apply time
        assert_eq!(read_all("P-1\n"), vec![Command::SetKp(-1.0)]);
    }

    #[test]
    fn test_parse_speed_and_run() {
        assert_eq!(read_all("S170\n"), vec![Command::SetBaseSpeed(170)]);
        assert_eq!(read_all("R1\n"), vec![Command::SetRun(true)]);
        assert_eq!(read_all("R0\n"), vec![Command::SetRun(false)]);
        assert_eq!(read_all("C\nV\n?\n"), vec![
            Command::Calibrate,
            Command::Report,
            Command::Help
        ]);
    }

    #[test]
    fn test_greedy_numeric_stops_at_separator() {
        let mut reader = CommandReader::new();
        reader.push("P0.5 S200\n");
        assert_eq!(reader.next_command(), Some(Command::SetKp(0.5)));
        assert_eq!(reader.next_command(), Some(Command::SetBaseSpeed(200)));
        assert_eq!(reader.next_command(), None);
    }

    #[test]
    fn test_unterminated_number_waits_for_more_input() {
        let mut reader = CommandReader::new();
        reader.push("P0.2");
        assert_eq!(reader.next_command(), None);

        // The literal was split across pushes; the newline completes it
        reader.push("5\n");
        assert_eq!(reader.next_command(), Some(Command::SetKp(0.25)));
    }

    #[test]
    fn test_unknown_command_discards_pending_input() {
        let mut reader = CommandReader::new();
        reader.push("X P0.5\nS200\n");
        assert_eq!(reader.next_command(), None);
        // Everything after the unknown byte is gone
        assert_eq!(reader.next_command(), None);

        // A fresh push parses normally
        reader.push("S200\n");
        assert_eq!(reader.next_command(), Some(Command::SetBaseSpeed(200)));
    }

    #[test]
    fn test_malformed_number_discards_pending_input() {
        let mut reader = CommandReader::new();
        reader.push("P1.2.3 S100\n");
        assert_eq!(reader.next_command(), None);
        // The trailing S100 went with the bad token
        assert_eq!(reader.next_command(), None);

        reader.push("S100\n");
        assert_eq!(reader.next_command(), Some(Command::SetBaseSpeed(100)));
    }

    #[test]
    fn test_run_rejects_other_values() {
        assert_eq!(read_all("R2\n"), vec![]);
    }

    #[test]
    fn test_apply_rejects_negative_gain() {
        let mut params = Params::default();
        let before = params.gains.kp;

        assert_eq!(apply(Command::SetKp(-0.5), &mut params), Effect::None);
        assert_eq!(params.gains.kp, before);

        apply(Command::SetKp(0.4), &mut params);
        assert_eq!(params.gains.kp, 0.4);
    }

    #[test]
    fn test_apply_speed_bounds() {
        let mut params = Params::default();
        let before = params.base_speed;

        apply(Command::SetBaseSpeed(0), &mut params);
        assert_eq!(params.base_speed, before);
        apply(Command::SetBaseSpeed(256), &mut params);
        assert_eq!(params.base_speed, before);
        apply(Command::SetBaseSpeed(-10), &mut params);
        assert_eq!(params.base_speed, before);

        apply(Command::SetBaseSpeed(255), &mut params);
        assert_eq!(params.base_speed, 255);
    }

    #[test]
    fn test_apply_run_transitions() {
        let mut params = Params::default();
        assert_eq!(params.run_state, RunState::Stopped);

        // Stopped -> Running resets the controller
        assert_eq!(
            apply(Command::SetRun(true), &mut params),
            Effect::ResetController
        );
        assert_eq!(params.run_state, RunState::Running);

        // Running -> Running is a no-op
        assert_eq!(apply(Command::SetRun(true), &mut params), Effect::None);

        // Running -> Stopped halts the wheels
        assert_eq!(
            apply(Command::SetRun(false), &mut params),
            Effect::StopDrive
        );
        assert_eq!(params.run_state, RunState::Stopped);
    }
}
