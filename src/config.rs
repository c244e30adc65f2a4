// Loop rates, sensor geometry, duty limits, controller defaults
use std::time::Duration;

// Control loop frequency
pub const LOOP_HZ: u64 = 100;

// Telemetry cadence, independent of the loop rate
pub const TELEMETRY_PERIOD: Duration = Duration::from_millis(200);

// Reflectance array geometry
pub const SENSOR_COUNT: usize = 5;

// Calibrated reading range per channel (1000 = darkest)
pub const CALIBRATED_MAX: u16 = 1000;

// Position span is [0, (SENSOR_COUNT-1)*1000]; track center is the midpoint
pub const POSITION_MAX: f32 = ((SENSOR_COUNT - 1) * 1000) as f32;
pub const SETPOINT: f32 = POSITION_MAX / 2.0;

// A channel above this counts as seeing the line
pub const LINE_DETECT_THRESHOLD: u16 = 200;

// Channels at or below this are background noise and excluded from the average
pub const NOISE_FLOOR: u16 = 50;

// Below this summed signal the position estimate is held at its previous value
pub const MIN_SIGNAL: u32 = 120;

// Integral accumulator anti-windup bound
pub const INTEGRAL_LIMIT: f32 = 10_000.0;

// Wheel duty limits
pub const MAX_DUTY: i16 = 255;
// Motors stall below this magnitude; non-zero duties are floored to it
pub const MIN_EFFECTIVE_DUTY: i16 = 30;

// Drive is forced to Stopped once the line has been gone this long
pub const LINE_LOST_TIMEOUT: Duration = Duration::from_secs(5);

// Calibration sweep: total steps, reversing direction at the midpoint
pub const CALIBRATION_STEPS: u32 = 400;
pub const CALIBRATION_SWEEP_DUTY: i16 = 80;

// Serial port for the sensor/motor interface board
pub const BOARD_PORT: &str = "/dev/ttyACM0";

/// PID gains, each kept non-negative by the tuning interface.
#[derive(Debug, Clone, Copy)]
pub struct Gains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

/// Whether the drive is allowed to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Running,
}

/// Search-turn shape while the line is lost.
///
/// `inner_ratio` scales the inner wheel relative to the outer one: +0.5 is a
/// forward arc toward the last known side, -1.0 is a pure pivot in place.
#[derive(Debug, Clone, Copy)]
pub struct RecoveryConfig {
    pub speed: i16,
    pub inner_ratio: f32,
}

/// All live-tunable controller parameters, owned by the control loop and
/// mutated only through the tuning interface.
#[derive(Debug, Clone, Copy)]
pub struct Params {
    pub gains: Gains,
    pub base_speed: i16,
    pub run_state: RunState,
    pub recovery: RecoveryConfig,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            gains: Gains {
                kp: 0.25,
                ki: 0.0,
                kd: 0.6,
            },
            base_speed: 170,
            run_state: RunState::Stopped,
            recovery: RecoveryConfig {
                speed: 100,
                inner_ratio: 0.5,
            },
        }
    }
}
