use std::f32::consts::PI;

use glam::Vec3;

use crate::types::{EnfluxDevice, InputCommand, LimbAngles};
use crate::{EnfluxError, Result};

// -- Frame geometry --
pub const MODULES_PER_FRAME: usize = 5;
pub const BYTES_PER_MODULE: usize = 4;
pub const FRAME_SIZE: usize = MODULES_PER_FRAME * BYTES_PER_MODULE;

// -- Fixed-point scales (radians per LSB) --
pub const ROLL_SCALE: f32 = PI / 128.0;
pub const PITCH_SCALE: f32 = PI / 256.0;
pub const YAW_SCALE: f32 = PI / 32768.0;

// -- Driver command codes --
pub const CMD_DEVICE_CONNECTED: i32 = 0;
pub const CMD_DEVICE_DISCONNECTED: i32 = 1;
pub const CMD_CALIBRATION_STARTED: i32 = 2;
pub const CMD_CALIBRATION_FINISHED: i32 = 3;
pub const CMD_RESET_ORIENTATION: i32 = 4;
pub const CMD_ERROR_CALIBRATION_FAILED: i32 = 5;
pub const CMD_ERROR_NO_CALIBRATION: i32 = 6;
pub const CMD_ERROR_NO_SHIRT_PANTS: i32 = 7;

/// One decoded garment frame: absolute (roll, pitch, yaw) per module.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawFrame {
    pub angles: LimbAngles<Vec3>,
    initialized: bool,
}

impl RawFrame {
    /// The driver reports an all-zero buffer until the garment has produced data.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// Decode one 4-byte module record.
///
/// Layout: `[0]` roll as i8, `[1]` pitch as i8, `[2..3]` yaw as i16 LE.
pub fn decode_module(bytes: [u8; BYTES_PER_MODULE]) -> Vec3 {
    let roll = bytes[0] as i8 as f32 * ROLL_SCALE;
    let pitch = bytes[1] as i8 as f32 * PITCH_SCALE;
    let yaw = i16::from_le_bytes([bytes[2], bytes[3]]) as f32 * YAW_SCALE;
    Vec3::new(roll, pitch, yaw)
}

/// Encode one module record; angles outside the representable range saturate.
pub fn encode_module(rpy: Vec3) -> [u8; BYTES_PER_MODULE] {
    let roll = (rpy.x / ROLL_SCALE).round().clamp(i8::MIN as f32, i8::MAX as f32) as i8;
    let pitch = (rpy.y / PITCH_SCALE).round().clamp(i8::MIN as f32, i8::MAX as f32) as i8;
    let yaw = (rpy.z / YAW_SCALE).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16;
    let yaw = yaw.to_le_bytes();
    [roll as u8, pitch as u8, yaw[0], yaw[1]]
}

/// Parse a 20-byte RPY buffer from the driver.
///
/// Modules are ordered center, left upper, left lower, right upper, right lower.
pub fn parse_rpy_frame(data: &[u8]) -> Result<RawFrame> {
    if data.len() != FRAME_SIZE {
        return Err(EnfluxError::InvalidFrame {
            expected: FRAME_SIZE,
            actual: data.len(),
        });
    }
    let module = |index: usize| {
        let offset = index * BYTES_PER_MODULE;
        decode_module([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ])
    };
    let angles = LimbAngles {
        center: module(0),
        left_upper: module(1),
        left_lower: module(2),
        right_upper: module(3),
        right_lower: module(4),
    };
    Ok(RawFrame {
        angles,
        initialized: data.iter().any(|&b| b != 0),
    })
}

/// Build a 20-byte RPY buffer, e.g. for simulated drivers.
pub fn encode_rpy_frame(angles: &LimbAngles<Vec3>) -> [u8; FRAME_SIZE] {
    let mut buf = [0u8; FRAME_SIZE];
    for (index, (_, rpy)) in angles.iter().enumerate() {
        let offset = index * BYTES_PER_MODULE;
        buf[offset..offset + BYTES_PER_MODULE].copy_from_slice(&encode_module(rpy));
    }
    buf
}

impl InputCommand {
    pub fn from_code(code: i32) -> Result<InputCommand> {
        match code {
            CMD_DEVICE_CONNECTED => Ok(InputCommand::DeviceConnected),
            CMD_DEVICE_DISCONNECTED => Ok(InputCommand::DeviceDisconnected),
            CMD_CALIBRATION_STARTED => Ok(InputCommand::CalibrationStarted),
            CMD_CALIBRATION_FINISHED => Ok(InputCommand::CalibrationFinished),
            CMD_RESET_ORIENTATION => Ok(InputCommand::ResetOrientation),
            CMD_ERROR_CALIBRATION_FAILED => Ok(InputCommand::ErrorCalibrationFailed),
            CMD_ERROR_NO_CALIBRATION => Ok(InputCommand::ErrorNoCalibration),
            CMD_ERROR_NO_SHIRT_PANTS => Ok(InputCommand::ErrorNoShirtPants),
            other => Err(EnfluxError::UnknownCommand(other)),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            InputCommand::DeviceConnected => CMD_DEVICE_CONNECTED,
            InputCommand::DeviceDisconnected => CMD_DEVICE_DISCONNECTED,
            InputCommand::CalibrationStarted => CMD_CALIBRATION_STARTED,
            InputCommand::CalibrationFinished => CMD_CALIBRATION_FINISHED,
            InputCommand::ResetOrientation => CMD_RESET_ORIENTATION,
            InputCommand::ErrorCalibrationFailed => CMD_ERROR_CALIBRATION_FAILED,
            InputCommand::ErrorNoCalibration => CMD_ERROR_NO_CALIBRATION,
            InputCommand::ErrorNoShirtPants => CMD_ERROR_NO_SHIRT_PANTS,
        }
    }
}

impl EnfluxDevice {
    /// Driver device code: 0 none, 1 shirt, 2 pants, 3 both.
    pub fn from_code(code: i32) -> Result<EnfluxDevice> {
        u8::try_from(code)
            .ok()
            .and_then(EnfluxDevice::from_bits)
            .ok_or(EnfluxError::UnknownDevice(code))
    }

    pub fn code(self) -> i32 {
        self.bits() as i32
    }
}
