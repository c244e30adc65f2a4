// Hardware collaborator layer
//
// The reflectance array and the drive motors sit behind a single interface
// board on a serial link. The control loop only sees the two traits below,
// so a simulated chassis can stand in for the board in tests and for
// hardware-free runs.

mod board;
pub mod link;
pub mod sim;

pub use board::{Board, SENSOR_ID, WHEEL_ID_LEFT, WHEEL_ID_RIGHT};
pub use link::{BoardBus, LinkError};
pub use sim::SimChassis;

use crate::control::WheelDuties;
use crate::messages::SensorFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wheel {
    Left,
    Right,
}

/// Calibrated reflectance array. Calibration is a bounded number of
/// `calibrate_step` passes while the caller sweeps the drive across the
/// line; each pass updates the per-channel min/max on the board.
pub trait LineSensor {
    fn calibrate_step(&mut self) -> Result<(), LinkError>;
    fn read_frame(&mut self) -> Result<SensorFrame, LinkError>;
}

/// Differential drive. Duty sign selects direction, magnitude is the PWM
/// duty cycle.
pub trait DriveMotors {
    fn set_wheel_duty(&mut self, wheel: Wheel, duty: i16) -> Result<(), LinkError>;
    fn set_duties(&mut self, duties: WheelDuties) -> Result<(), LinkError>;
    fn stop_all(&mut self) -> Result<(), LinkError>;
}
