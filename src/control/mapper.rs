// Steering correction + base speed -> per-wheel signed duties
//
// Sign convention: positive correction means the line is toward the low-index
// (left) end of the array, so the right wheel speeds up and the robot turns
// left. Duty sign selects the wheel's direction pair; magnitude is the PWM
// duty cycle.

use crate::config::{RunState, MAX_DUTY, MIN_EFFECTIVE_DUTY};

/// Signed duty commands for the two wheels, each in [-MAX_DUTY, MAX_DUTY].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WheelDuties {
    pub left: i16,
    pub right: i16,
}

impl WheelDuties {
    pub fn new(left: i16, right: i16) -> Self {
        Self { left, right }
    }

    pub fn zero() -> Self {
        Self::default()
    }
}

/// Mix a steering correction into wheel duties.
///
/// Stopped is a hard override to (0, 0) regardless of the other inputs, not
/// just a consequence of a zero correction.
pub fn mix(base_speed: i16, correction: f32, run_state: RunState) -> WheelDuties {
    if run_state == RunState::Stopped {
        return WheelDuties::zero();
    }

    let base = i32::from(base_speed);
    let corr = correction.round() as i32;

    WheelDuties {
        left: shape(base - corr),
        right: shape(base + corr),
    }
}

/// Floor a non-zero duty to the minimum the motors can actually turn at,
/// preserving sign, then saturate.
fn shape(duty: i32) -> i16 {
    if duty == 0 {
        return 0;
    }
    let magnitude = duty.unsigned_abs().max(MIN_EFFECTIVE_DUTY as u32);
    let magnitude = magnitude.min(MAX_DUTY as u32) as i16;
    if duty < 0 {
        -magnitude
    } else {
        magnitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saturation_scenario() {
        // base 170, correction 125: left floors at 45, right saturates at 255
        let d = mix(170, 125.0, RunState::Running);
        assert_eq!(d.left, 45);
        assert_eq!(d.right, 255);
    }

    #[test]
    fn test_stopped_is_a_hard_override() {
        let d = mix(170, 125.0, RunState::Stopped);
        assert_eq!(d, WheelDuties::zero());

        let d = mix(255, -9999.0, RunState::Stopped);
        assert_eq!(d, WheelDuties::zero());
    }

    #[test]
    fn test_no_duty_in_the_stall_band() {
        // Sweep corrections; every emitted duty is 0 or at least the floor
        for corr in -400..=400 {
            let d = mix(60, corr as f32, RunState::Running);
            for duty in [d.left, d.right] {
                assert!(
                    duty == 0 || duty.abs() >= MIN_EFFECTIVE_DUTY,
                    "correction {}: duty {} is in the stall band",
                    corr,
                    duty
                );
                assert!(duty.abs() <= MAX_DUTY);
            }
        }
    }

    #[test]
    fn test_floor_preserves_sign() {
        // base 10, correction 25 -> left raw -15 floors to -30
        let d = mix(10, 25.0, RunState::Running);
        assert_eq!(d.left, -MIN_EFFECTIVE_DUTY);
        assert_eq!(d.right, 35);
    }

    #[test]
    fn test_zero_correction_drives_straight() {
        let d = mix(170, 0.0, RunState::Running);
        assert_eq!(d.left, 170);
        assert_eq!(d.right, 170);
    }

    #[test]
    fn test_negative_saturation() {
        let d = mix(100, -1000.0, RunState::Running);
        assert_eq!(d.left, MAX_DUTY);
        assert_eq!(d.right, -MAX_DUTY);
    }
}
