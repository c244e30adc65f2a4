// Line-loss recovery policy
//
// Tracks visibility across cycles. While the line is gone the drive runs a
// fixed search turn toward the side the line was last seen on; once it has
// been gone past the timeout the run is over and the drive must stop.

use std::time::Instant;

use crate::config::{RecoveryConfig, LINE_LOST_TIMEOUT, MAX_DUTY};

use super::mapper::WheelDuties;

/// Outcome of one visibility observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStatus {
    /// Line visible, normal PID cycle.
    Tracking,
    /// Line visible again after a loss; the caller must reset the PID state
    /// before computing this cycle's correction.
    Reacquired,
    /// Line not visible, still within the timeout; issue the search turn.
    Lost,
    /// Line gone past the timeout; the caller must force the drive stopped.
    /// Terminal for the run until an explicit start command.
    TimedOut,
}

pub struct RecoveryPolicy {
    lost: bool,
    line_last_seen: Instant,
}

impl RecoveryPolicy {
    pub fn new(now: Instant) -> Self {
        Self {
            lost: false,
            line_last_seen: now,
        }
    }

    /// Re-arm on a run start so a stale `line_last_seen` from before the stop
    /// cannot trip the timeout on the first cycle.
    pub fn reset(&mut self, now: Instant) {
        self.lost = false;
        self.line_last_seen = now;
    }

    pub fn observe(&mut self, line_visible: bool, now: Instant) -> LineStatus {
        if line_visible {
            self.line_last_seen = now;
            if self.lost {
                self.lost = false;
                return LineStatus::Reacquired;
            }
            return LineStatus::Tracking;
        }

        self.lost = true;
        if now.duration_since(self.line_last_seen) > LINE_LOST_TIMEOUT {
            LineStatus::TimedOut
        } else {
            LineStatus::Lost
        }
    }

    /// Search turn toward the side of the last tracked error. Positive error
    /// means the line was toward the left end of the array, so the left wheel
    /// becomes the slow inner wheel.
    pub fn search_duties(&self, last_error: f32, cfg: &RecoveryConfig) -> WheelDuties {
        let outer = cfg.speed.clamp(-MAX_DUTY, MAX_DUTY);
        let inner = ((outer as f32) * cfg.inner_ratio).round() as i16;

        if last_error > 0.0 {
            WheelDuties::new(inner, outer)
        } else {
            WheelDuties::new(outer, inner)
        }
    }
}
