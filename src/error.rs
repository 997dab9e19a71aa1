use std::fmt;

use crate::types::EnfluxDevice;

/// Errors that can occur while streaming, aligning, or fusing suit data.
#[derive(Debug, thiserror::Error)]
pub enum EnfluxError {
    #[error("Invalid orientation sample: {0}")]
    InvalidSample(String),

    #[error("Invalid RPY frame: expected {expected} bytes, got {actual}")]
    InvalidFrame { expected: usize, actual: usize },

    #[error("Unknown driver command code: {0}")]
    UnknownCommand(i32),

    #[error("Unknown device code: {0}")]
    UnknownDevice(i32),

    #[error("Device is 'None'")]
    NoDevice,

    #[error("Device '{0}' is already connected")]
    AlreadyConnected(EnfluxDevice),

    #[error("No devices are connected")]
    NotConnected,

    #[error("Device '{0}' must be disconnected to calibrate")]
    MustDisconnect(EnfluxDevice),

    #[error("Null pointer passed for '{0}'")]
    NullPointer(&'static str),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Suit stream stopped")]
    StreamStopped,

    #[error("Timeout waiting for data")]
    Timeout,
}

/// Thread-safe last-error storage for the C FFI layer.
pub(crate) struct LastError {
    message: std::sync::Mutex<String>,
}

impl LastError {
    pub const fn new() -> Self {
        Self {
            message: std::sync::Mutex::new(String::new()),
        }
    }

    pub fn set(&self, err: &EnfluxError) {
        if let Ok(mut msg) = self.message.lock() {
            *msg = fmt::format(format_args!("{}\0", err));
        }
    }

    pub fn clear(&self) {
        if let Ok(mut msg) = self.message.lock() {
            msg.clear();
        }
    }

    pub fn as_ptr(&self) -> *const std::ffi::c_char {
        match self.message.lock() {
            Ok(msg) if !msg.is_empty() => msg.as_ptr() as *const std::ffi::c_char,
            _ => std::ptr::null(),
        }
    }
}
