// Weighted-average line position from a calibrated reflectance frame
//
// Channel i contributes weight i*1000 scaled by its reading, so the
// position lands in [0, (N-1)*1000] with the track center at the midpoint.

use crate::config::{
    CALIBRATED_MAX, LINE_DETECT_THRESHOLD, MIN_SIGNAL, NOISE_FLOOR, SETPOINT,
};
use crate::messages::SensorFrame;

/// Result of one estimation pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    /// Line position in [0, (N-1)*1000]. Held at the previous value when the
    /// frame carries too little signal to be meaningful.
    pub position: f32,
    /// True iff at least one channel reads above the detection threshold.
    pub line_visible: bool,
}

/// Maps sensor frames to line positions. Stateful only in that it remembers
/// the last valid position so an all-background frame does not produce a
/// discontinuous jump.
pub struct PositionEstimator {
    last_position: f32,
}

impl PositionEstimator {
    pub fn new() -> Self {
        // Start centered so the first frame's hold case is benign
        Self {
            last_position: SETPOINT,
        }
    }

    pub fn estimate(&mut self, frame: &SensorFrame) -> Estimate {
        let mut weighted: u64 = 0;
        let mut total: u32 = 0;
        let mut line_visible = false;

        for (i, &raw) in frame.channels.iter().enumerate() {
            let value = raw.min(CALIBRATED_MAX);

            if value > LINE_DETECT_THRESHOLD {
                line_visible = true;
            }

            // Channels at background level only add noise to the average
            if value > NOISE_FLOOR {
                weighted += u64::from(value) * (i as u64) * 1000;
                total += u32::from(value);
            }
        }

        if total >= MIN_SIGNAL {
            self.last_position = weighted as f32 / total as f32;
        }

        Estimate {
            position: self.last_position,
            line_visible,
        }
    }
}

impl Default for PositionEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(channels: [u16; 5]) -> SensorFrame {
        SensorFrame::new(channels)
    }

    #[test]
    fn test_single_channel_peak_lands_on_its_weight() {
        let mut est = PositionEstimator::new();

        for i in 0..5 {
            let mut channels = [0u16; 5];
            channels[i] = 1000;
            let e = est.estimate(&frame(channels));

            assert!(e.line_visible, "channel {} at max should be visible", i);
            assert!(
                (e.position - (i as f32) * 1000.0).abs() < 1.0,
                "channel {} at max: expected position {}, got {}",
                i,
                i * 1000,
                e.position
            );
        }
    }

    #[test]
    fn test_straddling_two_channels_averages_between_them() {
        let mut est = PositionEstimator::new();
        let e = est.estimate(&frame([0, 600, 600, 0, 0]));

        assert!(e.line_visible);
        assert!((e.position - 1500.0).abs() < 1.0, "got {}", e.position);
    }

    #[test]
    fn test_background_frame_holds_previous_position() {
        let mut est = PositionEstimator::new();

        let e = est.estimate(&frame([0, 0, 0, 1000, 0]));
        assert!((e.position - 3000.0).abs() < 1.0);

        // All channels at background: position must hold, not jump
        let e = est.estimate(&frame([0, 0, 0, 0, 0]));
        assert!(!e.line_visible);
        assert!((e.position - 3000.0).abs() < 1.0, "got {}", e.position);

        // Low-level noise under the signal floor also holds
        let e = est.estimate(&frame([20, 30, 10, 0, 25]));
        assert!(!e.line_visible);
        assert!((e.position - 3000.0).abs() < 1.0, "got {}", e.position);
    }

    #[test]
    fn test_initial_hold_is_centered() {
        let mut est = PositionEstimator::new();
        let e = est.estimate(&frame([0, 0, 0, 0, 0]));

        assert!(!e.line_visible);
        assert!((e.position - SETPOINT).abs() < 1.0);
    }

    #[test]
    fn test_detection_threshold_is_per_channel() {
        let mut est = PositionEstimator::new();

        // Just under the threshold on every channel: not visible
        let e = est.estimate(&frame([200, 200, 200, 200, 200]));
        assert!(!e.line_visible);

        // One channel just over: visible
        let e = est.estimate(&frame([0, 0, 201, 0, 0]));
        assert!(e.line_visible);
    }

    #[test]
    fn test_readings_above_calibrated_max_are_clamped() {
        let mut est = PositionEstimator::new();
        let e = est.estimate(&frame([0, 0, 0, 0, u16::MAX]));

        assert!(e.line_visible);
        assert!((e.position - 4000.0).abs() < 1.0, "got {}", e.position);
    }
}
