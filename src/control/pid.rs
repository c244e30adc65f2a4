// PID steering controller
//
// Correction uses the integral accumulator from before the current error is
// folded in, and the derivative is suppressed on the first cycle after a
// reset, so a fresh controller outputs exactly Kp*error with no spike from
// stale state.

use crate::config::{Gains, INTEGRAL_LIMIT};

/// One cycle's correction, broken out per term for telemetry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidOutput {
    pub p_term: f32,
    pub i_term: f32,
    pub d_term: f32,
    pub correction: f32,
}

/// Controller state persisting across cycles. Gains live in `Params` and are
/// passed in each update so live tuning takes effect between cycles, never
/// mid-computation.
pub struct PidController {
    integral: f32,
    prev_error: f32,
    first_update: bool,
}

impl PidController {
    pub fn new() -> Self {
        Self {
            integral: 0.0,
            prev_error: 0.0,
            first_update: true,
        }
    }

    /// Zero all state. Called on every Stopped->Running transition and every
    /// line reacquisition so the integral and derivative do not carry stale
    /// error across the gap.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = 0.0;
        self.first_update = true;
    }

    pub fn update(&mut self, error: f32, gains: &Gains) -> PidOutput {
        let derivative = if self.first_update {
            0.0
        } else {
            error - self.prev_error
        };

        let p_term = gains.kp * error;
        let i_term = gains.ki * self.integral;
        let d_term = gains.kd * derivative;

        // Accumulate after computing so the first post-reset cycle is pure P
        self.integral = (self.integral + error).clamp(-INTEGRAL_LIMIT, INTEGRAL_LIMIT);
        self.prev_error = error;
        self.first_update = false;

        PidOutput {
            p_term,
            i_term,
            d_term,
            correction: p_term + i_term + d_term,
        }
    }
}

impl Default for PidController {
    fn default() -> Self {
        Self::new()
    }
}
