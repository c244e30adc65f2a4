// Control loop: sensor frame -> estimator -> PID or recovery -> wheel duties,
// at a fixed tick rate. Operator input is drained each tick and at most one
// command is applied per pass, so parameter mutation is sequential with the
// control computation. Telemetry goes out on its own cadence.

use std::error::Error;
use std::time::{Duration, Instant};

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{info, warn};

use crate::config::{
    Params, RunState, BOARD_PORT, CALIBRATION_STEPS, CALIBRATION_SWEEP_DUTY, LINE_LOST_TIMEOUT,
    LOOP_HZ, SETPOINT, TELEMETRY_PERIOD,
};
use crate::control::{
    mix, LineStatus, PidController, PidOutput, PositionEstimator, RecoveryPolicy, WheelDuties,
};
use crate::hardware::{Board, DriveMotors, LineSensor, LinkError, SimChassis};
use crate::messages::{SensorFrame, Telemetry};
use crate::tuning::{self, Command, CommandReader, Effect};

#[derive(Parser, Debug)]
#[command(about = "Line-follower control runtime")]
pub struct Args {
    /// Serial port of the sensor/motor interface board
    #[arg(long, default_value = BOARD_PORT)]
    pub port: String,

    /// Control loop rate in Hz
    #[arg(long, default_value_t = LOOP_HZ)]
    pub hz: u64,

    /// Drive a simulated chassis instead of hardware
    #[arg(long)]
    pub sim: bool,

    /// Run a calibration sweep before entering the loop
    #[arg(long)]
    pub calibrate_on_start: bool,
}

/// The per-cycle control pipeline and the state it carries across cycles.
pub struct Controller {
    params: Params,
    estimator: PositionEstimator,
    pid: PidController,
    recovery: RecoveryPolicy,
    // Error from the last tracked cycle; steers the search turn after a loss
    last_error: f32,
}

/// What one cycle produced: duties for the wheels plus the telemetry view.
pub struct StepOutput {
    pub duties: WheelDuties,
    pub telemetry: Telemetry,
}

impl Controller {
    pub fn new(params: Params, now: Instant) -> Self {
        Self {
            params,
            estimator: PositionEstimator::new(),
            pid: PidController::new(),
            recovery: RecoveryPolicy::new(now),
            last_error: 0.0,
        }
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Apply one operator command; controller-state resets implied by the
    /// command happen here so the caller only deals with hardware effects.
    pub fn handle_command(&mut self, cmd: Command, now: Instant) -> Effect {
        let effect = tuning::apply(cmd, &mut self.params);
        if effect == Effect::ResetController {
            self.pid.reset();
            self.recovery.reset(now);
        }
        effect
    }

    /// Run one control cycle over a sensor frame.
    pub fn step(&mut self, frame: &SensorFrame, now: Instant) -> StepOutput {
        let estimate = self.estimator.estimate(frame);
        let status = self.recovery.observe(estimate.line_visible, now);
        let error = SETPOINT - estimate.position;

        let mut pid_out = PidOutput {
            p_term: 0.0,
            i_term: 0.0,
            d_term: 0.0,
            correction: 0.0,
        };

        let duties = match status {
            LineStatus::Tracking | LineStatus::Reacquired => {
                if status == LineStatus::Reacquired {
                    info!("Line reacquired, resetting controller");
                    self.pid.reset();
                }
                pid_out = self.pid.update(error, &self.params.gains);
                self.last_error = error;
                mix(
                    self.params.base_speed,
                    pid_out.correction,
                    self.params.run_state,
                )
            }
            LineStatus::Lost => {
                if self.params.run_state == RunState::Running {
                    self.recovery.search_duties(self.last_error, &self.params.recovery)
                } else {
                    WheelDuties::zero()
                }
            }
            LineStatus::TimedOut => {
                if self.params.run_state == RunState::Running {
                    warn!(
                        "Line lost for over {:?}, stopping drive; send R1 to resume",
                        LINE_LOST_TIMEOUT
                    );
                    self.params.run_state = RunState::Stopped;
                }
                WheelDuties::zero()
            }
        };

        let telemetry = Telemetry {
            position: estimate.position,
            error,
            p_term: pid_out.p_term,
            i_term: pid_out.i_term,
            d_term: pid_out.d_term,
            correction: pid_out.correction,
            readings: frame.channels,
            left_duty: duties.left,
            right_duty: duties.right,
            line_visible: estimate.line_visible,
            running: self.params.run_state == RunState::Running,
        };

        StepOutput { duties, telemetry }
    }
}

/// Blocking calibration sweep: rock the chassis across the line while the
/// board accumulates per-channel min/max. Occupies the loop for the whole
/// sweep; there is no cancel path.
pub fn calibrate<C>(chassis: &mut C) -> Result<(), LinkError>
where
    C: LineSensor + DriveMotors,
{
    info!("Calibrating reflectance array ({} steps)", CALIBRATION_STEPS);

    let quarter = CALIBRATION_STEPS / 4;
    for step in 0..CALIBRATION_STEPS {
        // Pivot one way for the outer quarters, the other way in between, so
        // the sweep ends roughly back over the line
        let duties = if step < quarter || step >= 3 * quarter {
            WheelDuties::new(CALIBRATION_SWEEP_DUTY, -CALIBRATION_SWEEP_DUTY)
        } else {
            WheelDuties::new(-CALIBRATION_SWEEP_DUTY, CALIBRATION_SWEEP_DUTY)
        };
        chassis.set_duties(duties)?;
        chassis.calibrate_step()?;
    }

    chassis.stop_all()?;
    info!("Calibration complete");
    Ok(())
}

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    if args.sim {
        info!("Driving simulated chassis");
        run_loop(SimChassis::new(), &args).await
    } else {
        let mut board = Board::open(&args.port)?;
        board.initialize()?;
        run_loop(board, &args).await
    }
}

async fn run_loop<C>(mut chassis: C, args: &Args) -> Result<(), Box<dyn Error + Send + Sync>>
where
    C: LineSensor + DriveMotors,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    spawn_stdin_reader(tx);

    if args.calibrate_on_start {
        calibrate(&mut chassis)?;
    }

    let mut reader = CommandReader::new();
    let mut controller = Controller::new(Params::default(), Instant::now());
    let mut tick = interval(Duration::from_secs_f64(1.0 / args.hz as f64));
    let mut last_telemetry = Instant::now();

    info!(
        "Runtime started: {}Hz loop, {:?} line-lost timeout (send ? for commands)",
        args.hz, LINE_LOST_TIMEOUT
    );

    loop {
        tick.tick().await;
        let now = Instant::now();

        // 1. Drain pending operator bytes, apply at most one command
        while let Ok(chunk) = rx.try_recv() {
            reader.push(&chunk);
        }
        if let Some(cmd) = reader.next_command() {
            match controller.handle_command(cmd, now) {
                Effect::StopDrive => chassis.stop_all()?,
                Effect::Recalibrate => calibrate(&mut chassis)?,
                Effect::ResetController | Effect::None => {}
            }
        }

        // 2. One frame through the pipeline
        let frame = chassis.read_frame()?;
        let out = controller.step(&frame, now);

        // 3. Actuate
        chassis.set_duties(out.duties)?;

        // 4. Telemetry on its own cadence
        if last_telemetry.elapsed() >= TELEMETRY_PERIOD {
            last_telemetry = Instant::now();
            info!(target: "telemetry", "{}", serde_json::to_string(&out.telemetry)?);
        }
    }
}

/// Feed operator lines into the loop without blocking it. Each line keeps
/// its newline so the command parser sees the numeric terminator.
fn spawn_stdin_reader(tx: mpsc::UnboundedSender<String>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(mut line)) = lines.next_line().await {
            line.push('\n');
            if tx.send(line).is_err() {
                break;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with_peak(channel: usize) -> SensorFrame {
        let mut channels = [0u16; 5];
        channels[channel] = 1000;
        SensorFrame::new(channels)
    }

    fn background() -> SensorFrame {
        SensorFrame::new([0u16; 5])
    }

    fn started_controller(now: Instant) -> Controller {
        let mut c = Controller::new(Params::default(), now);
        assert_eq!(
            c.handle_command(Command::SetRun(true), now),
            Effect::ResetController
        );
        c
    }

    #[test]
    fn test_stopped_controller_never_drives() {
        let now = Instant::now();
        let mut c = Controller::new(Params::default(), now);

        // Line well off center, drive stopped: duties stay zero
        let out = c.step(&frame_with_peak(0), now);
        assert_eq!(out.duties, WheelDuties::zero());
        assert!(!out.telemetry.running);
    }

    #[test]
    fn test_tracking_steers_toward_the_line() {
        let now = Instant::now();
        let mut c = started_controller(now);

        // Line at position 0 (far left): error positive, turn left
        let out = c.step(&frame_with_peak(0), now);
        assert!(out.telemetry.error > 0.0);
        assert!(out.telemetry.correction > 0.0);
        assert!(
            out.duties.right > out.duties.left,
            "should speed up the right wheel to turn left, got {:?}",
            out.duties
        );

        // Line far right: mirrored
        let out = c.step(&frame_with_peak(4), now);
        assert!(out.duties.left > out.duties.right);
    }

    #[test]
    fn test_centered_line_drives_straight() {
        let now = Instant::now();
        let mut c = started_controller(now);

        let out = c.step(&frame_with_peak(2), now);
        assert_eq!(out.telemetry.error, 0.0);
        assert_eq!(out.duties.left, out.duties.right);
        assert!(out.duties.left > 0);
    }

    #[test]
    fn test_loss_searches_toward_last_known_side() {
        let t0 = Instant::now();
        let mut c = started_controller(t0);

        // Track with the line on the left, then lose it
        c.step(&frame_with_peak(0), t0);
        let out = c.step(&background(), t0 + Duration::from_millis(10));

        assert!(!out.telemetry.line_visible);
        assert!(
            out.duties.right > out.duties.left,
            "search turn should continue toward the left, got {:?}",
            out.duties
        );
        // Search runs at the recovery speed, not the PID output
        assert_eq!(out.telemetry.correction, 0.0);
    }

    #[test]
    fn test_timeout_forces_stop_until_restarted() {
        let t0 = Instant::now();
        let mut c = started_controller(t0);
        c.step(&frame_with_peak(2), t0);

        // Lost, but within the timeout: still searching
        let out = c.step(&background(), t0 + LINE_LOST_TIMEOUT);
        assert_ne!(out.duties, WheelDuties::zero());
        assert!(out.telemetry.running);

        // Past it: drive forced stopped
        let out = c.step(&background(), t0 + LINE_LOST_TIMEOUT + Duration::from_millis(1));
        assert_eq!(out.duties, WheelDuties::zero());
        assert!(!out.telemetry.running);

        // The line coming back does not restart the run by itself
        let out = c.step(
            &frame_with_peak(2),
            t0 + LINE_LOST_TIMEOUT + Duration::from_millis(20),
        );
        assert_eq!(out.duties, WheelDuties::zero());

        // An explicit start does
        let now = t0 + LINE_LOST_TIMEOUT + Duration::from_millis(30);
        c.handle_command(Command::SetRun(true), now);
        let out = c.step(&frame_with_peak(2), now);
        assert!(out.duties.left > 0);
    }

    #[test]
    fn test_reacquisition_resets_derivative() {
        let t0 = Instant::now();
        let mut c = started_controller(t0);

        // Build up controller history on one side, lose the line, then
        // reacquire it far away: the derivative must not spike
        c.step(&frame_with_peak(0), t0);
        c.step(&background(), t0 + Duration::from_millis(10));
        let out = c.step(&frame_with_peak(4), t0 + Duration::from_millis(20));

        assert_eq!(out.telemetry.d_term, 0.0);
        assert_eq!(out.telemetry.i_term, 0.0);
    }

    #[test]
    fn test_start_resets_recovery_clock() {
        let t0 = Instant::now();
        let mut c = Controller::new(Params::default(), t0);

        // Start long after construction with the line not yet visible; the
        // timeout must run from the start, not from construction
        let late = t0 + Duration::from_secs(60);
        c.handle_command(Command::SetRun(true), late);
        let out = c.step(&background(), late + Duration::from_millis(10));
        assert!(out.telemetry.running, "must not time out on the first cycle");
    }

    #[test]
    fn test_calibration_sweep_ends_stopped() {
        let mut sim = SimChassis::new();
        calibrate(&mut sim).unwrap();
        assert_eq!(sim.last_duties(), WheelDuties::zero());
    }
}
