// Data types crossing the runtime's boundaries

use serde::{Deserialize, Serialize};

use crate::config::SENSOR_COUNT;

/// One cycle's calibrated reflectance readings, 0..=1000 per channel
/// (1000 = darkest). Replaced every cycle, never mutated in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorFrame {
    pub channels: [u16; SENSOR_COUNT],
}

impl SensorFrame {
    pub fn new(channels: [u16; SENSOR_COUNT]) -> Self {
        Self { channels }
    }
}

/// Periodic telemetry record, serialized as one JSON line.
///
/// Not a wire contract; the fields are the debugging minimum: where the
/// controller thinks the line is, how each PID term contributed, and what
/// actually went to the wheels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Telemetry {
    pub position: f32,
    pub error: f32,
    pub p_term: f32,
    pub i_term: f32,
    pub d_term: f32,
    pub correction: f32,
    pub readings: [u16; SENSOR_COUNT],
    pub left_duty: i16,
    pub right_duty: i16,
    pub line_visible: bool,
    pub running: bool,
}
