// Closed-loop line-follower controller for a differential-drive robot.
//
// A reflectance array and the wheel drivers sit behind a serial interface
// board; the runtime closes the loop between them with a PID steering
// controller, a line-loss recovery policy, and a live tuning interface.

pub mod config;
pub mod control;
pub mod hardware;
pub mod messages;
pub mod runtime;
pub mod tuning;
