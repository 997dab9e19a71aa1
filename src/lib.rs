//! # enflux - Rust SDK for the Enflux motion-capture suit
//!
//! Turns the absolute IMU angles of the shirt and pants into a rig-ready
//! humanoid pose. Provides:
//! - IMU angle conversion and quaternion averaging
//! - Stance-based sensor alignment with per-limb correction quaternions
//! - A suit manager driving garment state from the native driver
//! - C FFI for integration with C/C++/Unity
//!
//! ## Quick Start
//! ```no_run
//! use enflux::{AlignmentConfig, AlignmentState, Humanoid, LimbAngles, SuitAlignment};
//! use glam::Vec3;
//!
//! let mut body = SuitAlignment::new(AlignmentConfig::default(), Humanoid::new());
//! body.initiate_alignment();
//! let frame = LimbAngles::splat(Vec3::ZERO);
//! while body.state() == AlignmentState::InProgress {
//!     body.push_upper(&frame).unwrap();
//! }
//! body.sink_mut().update_upper(&frame).unwrap();
//! println!("{}", body.sink().local_angles());
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod orientation;
pub mod alignment;
pub mod humanoid;
pub mod protocol;
pub mod stream;
pub mod countdown;
pub mod suit;
pub mod ffi;

pub use error::EnfluxError;
pub use types::*;
pub use config::{AlignmentConfig, StreamConfig, SuitConfig};
pub use alignment::{CorrectionSink, Module, SuitAlignment};
pub use humanoid::Humanoid;
pub use protocol::RawFrame;
pub use stream::{HidDriver, SuitEvent, SuitSource, SuitStream};
pub use countdown::Countdown;
pub use suit::{EnfluxSuit, SuitUpdate};

/// Result type alias for enflux operations.
pub type Result<T> = std::result::Result<T, EnfluxError>;
