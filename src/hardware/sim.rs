// Simulated chassis for hardware-free runs and tests
//
// A toy lateral model: the line sits at some position on the sensor array,
// drifts slowly as if the track curved, and shifts with differential duty
// the way it would in the robot frame (turning left moves the line toward
// the high-index end). Good enough to exercise the full control path.

use std::f32::consts::TAU;

use super::{DriveMotors, LineSensor, LinkError, Wheel};
use crate::config::{CALIBRATED_MAX, POSITION_MAX, SENSOR_COUNT, SETPOINT};
use crate::control::WheelDuties;
use crate::messages::SensorFrame;

// Position units the line moves per unit of duty differential per tick
const STEER_GAIN: f32 = 0.4;
// Track curvature drift, position units per tick at full swing
const DRIFT_AMPLITUDE: f32 = 6.0;
const DRIFT_RATE: f32 = 0.002;
// Reflectance peak half-width in position units
const PEAK_WIDTH: f32 = 800.0;

pub struct SimChassis {
    line_position: f32,
    drift_phase: f32,
    duties: WheelDuties,
    line_present: bool,
}

impl SimChassis {
    pub fn new() -> Self {
        Self {
            line_position: SETPOINT,
            drift_phase: 0.0,
            duties: WheelDuties::zero(),
            line_present: true,
        }
    }

    /// Remove or restore the line entirely (for exercising recovery)
    pub fn set_line_present(&mut self, present: bool) {
        self.line_present = present;
    }

    /// Place the line at an exact position on the array
    pub fn set_line_position(&mut self, position: f32) {
        self.line_position = position;
    }

    pub fn last_duties(&self) -> WheelDuties {
        self.duties
    }

    // Advance the lateral model by one tick under the current duties
    fn step_model(&mut self) {
        let moving = self.duties.left != 0 || self.duties.right != 0;
        if moving {
            let differential = f32::from(self.duties.right) - f32::from(self.duties.left);
            self.line_position += differential * STEER_GAIN / 100.0;

            self.drift_phase = (self.drift_phase + DRIFT_RATE) % 1.0;
            self.line_position += DRIFT_AMPLITUDE * (self.drift_phase * TAU).sin();
        }
    }
}

impl Default for SimChassis {
    fn default() -> Self {
        Self::new()
    }
}

impl LineSensor for SimChassis {
    fn calibrate_step(&mut self) -> Result<(), LinkError> {
        Ok(())
    }

    fn read_frame(&mut self) -> Result<SensorFrame, LinkError> {
        let mut channels = [0u16; SENSOR_COUNT];

        if self.line_present && (-PEAK_WIDTH..=POSITION_MAX + PEAK_WIDTH).contains(&self.line_position)
        {
            for (i, channel) in channels.iter_mut().enumerate() {
                let center = (i * 1000) as f32;
                let distance = (center - self.line_position).abs();
                let value = f32::from(CALIBRATED_MAX) * (1.0 - distance / PEAK_WIDTH);
                *channel = value.max(0.0) as u16;
            }
        }

        Ok(SensorFrame::new(channels))
    }
}

impl DriveMotors for SimChassis {
    fn set_wheel_duty(&mut self, wheel: Wheel, duty: i16) -> Result<(), LinkError> {
        match wheel {
            Wheel::Left => self.duties.left = duty,
            Wheel::Right => self.duties.right = duty,
        }
        Ok(())
    }

    fn set_duties(&mut self, duties: WheelDuties) -> Result<(), LinkError> {
        self.duties = duties;
        self.step_model();
        Ok(())
    }

    fn stop_all(&mut self) -> Result<(), LinkError> {
        self.duties = WheelDuties::zero();
        Ok(())
    }
}
