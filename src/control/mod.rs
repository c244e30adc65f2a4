// Control pipeline for the line follower
//
// Per cycle: estimator maps a sensor frame to a line position, the PID
// controller (or the recovery policy when the line is gone) turns the
// position error into a steering correction, and the mapper mixes that
// correction with the base speed into per-wheel duties.

mod estimator;
mod mapper;
mod pid;
mod recovery;

pub use estimator::{Estimate, PositionEstimator};
pub use mapper::{mix, WheelDuties};
pub use pid::{PidController, PidOutput};
pub use recovery::{LineStatus, RecoveryPolicy};
