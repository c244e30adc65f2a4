// High-level driver for the sensor/motor interface board
//
// Wraps the serial bus with the two collaborator traits the control loop
// consumes: calibrated frame reads and signed wheel duties.

use tracing::{debug, info, warn};

use super::link::{BoardBus, LinkError, Register};
use super::{DriveMotors, LineSensor, Wheel};
use crate::config::SENSOR_COUNT;
use crate::control::WheelDuties;
use crate::messages::SensorFrame;

/// Device IDs on the board (as configured in its firmware)
pub const SENSOR_ID: u8 = 1;
pub const WHEEL_ID_LEFT: u8 = 2;
pub const WHEEL_ID_RIGHT: u8 = 3;

pub struct Board {
    bus: BoardBus,
    sensor_id: u8,
    wheel_ids: [u8; 2], // [left, right]
}

impl Board {
    /// Open the board on the given serial port with the default device IDs
    pub fn open(port: &str) -> Result<Self, LinkError> {
        info!("Opening interface board on {}", port);
        let bus = BoardBus::open(port)?;
        Ok(Self {
            bus,
            sensor_id: SENSOR_ID,
            wheel_ids: [WHEEL_ID_LEFT, WHEEL_ID_RIGHT],
        })
    }

    /// Check that the sensor array and both wheel drivers respond before the
    /// control loop starts.
    pub fn initialize(&mut self) -> Result<(), LinkError> {
        let ids = [self.sensor_id, self.wheel_ids[0], self.wheel_ids[1]];
        info!("Checking board devices {:?}", ids);

        for id in ids {
            match self.bus.ping(id) {
                Ok(true) => debug!("Device {} responding", id),
                Ok(false) => {
                    warn!("Device {} not responding to ping", id);
                    return Err(LinkError::Timeout { id });
                }
                Err(e) => return Err(e),
            }
        }

        info!("Board ready");
        Ok(())
    }

    fn wheel_id(&self, wheel: Wheel) -> u8 {
        match wheel {
            Wheel::Left => self.wheel_ids[0],
            Wheel::Right => self.wheel_ids[1],
        }
    }
}

impl LineSensor for Board {
    fn calibrate_step(&mut self) -> Result<(), LinkError> {
        self.bus.write_u8(self.sensor_id, Register::CalibrateStep, 1)
    }

    fn read_frame(&mut self) -> Result<SensorFrame, LinkError> {
        let len = (SENSOR_COUNT * 2) as u8;
        let bytes = self.bus.read_bytes(self.sensor_id, Register::Frame, len)?;

        let mut channels = [0u16; SENSOR_COUNT];
        for (i, channel) in channels.iter_mut().enumerate() {
            *channel = u16::from_le_bytes([bytes[i * 2], bytes[i * 2 + 1]]);
        }
        Ok(SensorFrame::new(channels))
    }
}

impl DriveMotors for Board {
    fn set_wheel_duty(&mut self, wheel: Wheel, duty: i16) -> Result<(), LinkError> {
        debug!("Setting {:?} wheel duty to {}", wheel, duty);
        self.bus
            .write_i16(self.wheel_id(wheel), Register::WheelDuty, duty)
    }

    fn set_duties(&mut self, duties: WheelDuties) -> Result<(), LinkError> {
        debug!(
            "Setting wheel duties: left={}, right={}",
            duties.left, duties.right
        );

        // One bus transaction for both wheels
        let data = [
            (self.wheel_ids[0], duties.left),
            (self.wheel_ids[1], duties.right),
        ];
        self.bus.sync_write_i16(Register::WheelDuty, &data)
    }

    fn stop_all(&mut self) -> Result<(), LinkError> {
        info!("Stopping all motors");
        self.set_duties(WheelDuties::zero())
    }
}

impl Drop for Board {
    fn drop(&mut self) {
        // Try to stop motors when the driver goes away (safety measure)
        if let Err(e) = self.stop_all() {
            warn!("Failed to stop motors on drop: {}", e);
        }
    }
}
