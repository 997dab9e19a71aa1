//! IMU angle conversion and quaternion averaging.
//!
//! Raw module readings are `(roll, pitch, yaw)` in radians, stored in a `Vec3`
//! as `x` = roll, `y` = pitch, `z` = yaw. Rig space is Y-up: yaw turns about
//! the up axis, pitch about the right axis (X), roll about the forward axis (Z).

use std::f32::consts::FRAC_PI_2;

use glam::{Quat, Vec3, Vec4};

use crate::types::LimbSlot;
use crate::{EnfluxError, Result};

/// Arm and leg modules are mounted a quarter turn about the forward axis,
/// mirrored between the left and right side.
const LEFT_MOUNT_ROLL: f32 = FRAC_PI_2;
const RIGHT_MOUNT_ROLL: f32 = -FRAC_PI_2;

/// Tolerance on |q| - 1 before a converted quaternion counts as degenerate.
const UNIT_TOLERANCE: f32 = 1e-3;

/// Orientation of a center (chest/waist) module.
pub fn base_orientation(rpy: Vec3) -> Quat {
    let (roll, pitch, yaw) = (rpy.x, rpy.y, rpy.z);
    (Quat::from_rotation_y(yaw) * Quat::from_rotation_x(pitch) * Quat::from_rotation_z(roll))
        .normalize()
}

/// Orientation of a module strapped to a left limb.
pub fn left_orientation(rpy: Vec3) -> Quat {
    (base_orientation(rpy) * Quat::from_rotation_z(LEFT_MOUNT_ROLL)).normalize()
}

/// Orientation of a module strapped to a right limb.
pub fn right_orientation(rpy: Vec3) -> Quat {
    (base_orientation(rpy) * Quat::from_rotation_z(RIGHT_MOUNT_ROLL)).normalize()
}

/// Pick the conversion for a module position. Upper and lower body share the
/// same mounting convention.
pub fn orientation_for(slot: LimbSlot, rpy: Vec3) -> Quat {
    match slot {
        LimbSlot::Center => base_orientation(rpy),
        LimbSlot::LeftUpper | LimbSlot::LeftLower => left_orientation(rpy),
        LimbSlot::RightUpper | LimbSlot::RightLower => right_orientation(rpy),
    }
}

/// Like [`orientation_for`], but rejects non-finite input and degenerate output.
pub fn try_orientation_for(slot: LimbSlot, rpy: Vec3) -> Result<Quat> {
    if !rpy.is_finite() {
        return Err(EnfluxError::InvalidSample(format!(
            "non-finite angles {:?} for {:?} module",
            rpy, slot
        )));
    }
    let q = orientation_for(slot, rpy);
    if !q.is_finite() || (q.length() - 1.0).abs() > UNIT_TOLERANCE {
        return Err(EnfluxError::InvalidSample(format!(
            "degenerate orientation {:?} for {:?} module",
            q, slot
        )));
    }
    Ok(q)
}

/// The yaw-only part of `q`: a rotation about the up axis with the same heading.
pub fn heading(q: Quat) -> Quat {
    let forward = q * Vec3::Z;
    let yaw = if forward.x.abs() + forward.z.abs() > 1e-4 {
        forward.x.atan2(forward.z)
    } else {
        // Looking straight up or down, take the heading from the right axis.
        let right = q * Vec3::X;
        (-right.z).atan2(right.x)
    };
    Quat::from_rotation_y(yaw)
}

/// Incremental quaternion mean.
///
/// `sample` is flipped into the hemisphere of `first` before being added to
/// `cumulative`, because `q` and `-q` are the same rotation but cancel when
/// summed. Returns the normalized mean of the `count` samples seen so far.
pub fn average_quaternion(cumulative: &mut Vec4, sample: Quat, first: Quat, count: u32) -> Quat {
    let sample = if sample.dot(first) < 0.0 { -sample } else { sample };
    *cumulative += Vec4::from(sample);

    let mean = *cumulative / count.max(1) as f32;
    let len = mean.length();
    if !len.is_finite() || len <= f32::EPSILON {
        return first.normalize();
    }
    Quat::from_vec4(mean / len)
}

/// Running average of a quaternion stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuaternionAverage {
    cumulative: Vec4,
    first: Option<Quat>,
    count: u32,
    mean: Quat,
}

impl QuaternionAverage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sample and return the updated mean.
    pub fn push(&mut self, sample: Quat) -> Quat {
        let first = *self.first.get_or_insert(sample);
        self.count += 1;
        self.mean = average_quaternion(&mut self.cumulative, sample, first, self.count);
        self.mean
    }

    /// The current mean, or `None` before the first sample.
    pub fn mean(&self) -> Option<Quat> {
        self.first.map(|_| self.mean)
    }

    /// Hemisphere reference: the first sample pushed.
    pub fn first(&self) -> Option<Quat> {
        self.first
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}
