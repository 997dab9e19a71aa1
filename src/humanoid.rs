use glam::{Quat, Vec3};

use crate::alignment::CorrectionSink;
use crate::orientation::try_orientation_for;
use crate::types::{AlignmentQuaternions, BodyHalf, HumanoidAngles, LimbAngles, LocalAngles};
use crate::Result;

/// Turns absolute sensor angles into local limb rotations, each relative to
/// its parent limb.
///
/// The suit's base yaw (captured on the last orientation reset) is removed
/// from every reading so the rig faces forward regardless of which way the
/// wearer faced when the suit started. Until an alignment is published the
/// corrections are identity, which gives uncalibrated but usable output.
#[derive(Debug, Clone, Default)]
pub struct Humanoid {
    shirt_base: Vec3,
    pants_base: Vec3,
    upper_alignment: AlignmentQuaternions,
    lower_alignment: AlignmentQuaternions,
    world: HumanoidAngles<Quat>,
    local: LocalAngles,
}

impl Humanoid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absolute orientation of the center module captured at the last reset.
    pub fn base_orientation(&self, half: BodyHalf) -> Vec3 {
        match half {
            BodyHalf::Upper => self.shirt_base,
            BodyHalf::Lower => self.pants_base,
        }
    }

    pub fn set_base_orientation(&mut self, half: BodyHalf, rpy: Vec3) {
        if !rpy.is_finite() {
            log::warn!("Ignoring non-finite {} base orientation {:?}", half, rpy);
            return;
        }
        match half {
            BodyHalf::Upper => self.shirt_base = rpy,
            BodyHalf::Lower => self.pants_base = rpy,
        }
    }

    pub fn alignment(&self, half: BodyHalf) -> &AlignmentQuaternions {
        match half {
            BodyHalf::Upper => &self.upper_alignment,
            BodyHalf::Lower => &self.lower_alignment,
        }
    }

    pub fn set_alignment(&mut self, half: BodyHalf, alignment: AlignmentQuaternions) {
        match half {
            BodyHalf::Upper => self.upper_alignment = alignment,
            BodyHalf::Lower => self.lower_alignment = alignment,
        }
    }

    pub fn update_upper(&mut self, angles: &LimbAngles<Vec3>) -> Result<bool> {
        self.update(BodyHalf::Upper, angles)
    }

    pub fn update_lower(&mut self, angles: &LimbAngles<Vec3>) -> Result<bool> {
        self.update(BodyHalf::Lower, angles)
    }

    /// Recompute one half from absolute angles. Returns whether the local
    /// angles changed. Non-finite input leaves the previous pose in place.
    pub fn update(&mut self, half: BodyHalf, angles: &LimbAngles<Vec3>) -> Result<bool> {
        let base_yaw = self.base_orientation(half).z;
        let corrections = self.alignment(half).corrections;

        // Only yaw is relative to the base; pitch and roll are gravity-referenced.
        let world = angles.try_map(|slot, rpy| -> Result<Quat> {
            let adjusted = Vec3::new(rpy.x, rpy.y, rpy.z - base_yaw);
            Ok((try_orientation_for(slot, adjusted)? * corrections.get(slot)).normalize())
        })?;
        let local = world.map(|slot, q| match slot.parent() {
            Some(parent) => (world.get(parent).inverse() * q).normalize(),
            None => q,
        });

        self.world.set_half(half, world);
        Ok(self.local.set_half(half, local))
    }

    /// Limb rotations relative to their parent limb, ready for a rig.
    pub fn local_angles(&self) -> &LocalAngles {
        &self.local
    }

    /// Corrected rotations of every limb in rig space.
    pub fn world_angles(&self) -> &HumanoidAngles<Quat> {
        &self.world
    }
}

impl CorrectionSink for Humanoid {
    fn alignment_completed(&mut self, half: BodyHalf, alignment: &AlignmentQuaternions) {
        log::debug!("Applying {} body alignment", half);
        self.set_alignment(half, *alignment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Limb, LimbSlot};
    use std::f32::consts::FRAC_PI_2;

    fn pose(yaw: f32) -> LimbAngles<Vec3> {
        LimbAngles {
            center: Vec3::new(0.0, 0.0, yaw),
            left_upper: Vec3::new(-FRAC_PI_2, 0.0, yaw),
            left_lower: Vec3::new(-FRAC_PI_2, 0.0, yaw),
            right_upper: Vec3::new(FRAC_PI_2, 0.0, yaw),
            right_lower: Vec3::new(FRAC_PI_2, 0.0, yaw),
        }
    }

    fn assert_quat_eq(a: Quat, b: Quat) {
        assert!(
            a.abs_diff_eq(b, 1e-4) || a.abs_diff_eq(-b, 1e-4),
            "expected {:?} ~ {:?}",
            a,
            b
        );
    }

    #[test]
    fn test_uncalibrated_output_uses_identity() {
        let mut humanoid = Humanoid::new();
        assert!(humanoid.update_upper(&pose(0.0)).is_ok());
        for limb in &Limb::ALL[..5] {
            assert_quat_eq(humanoid.local_angles().get(*limb), Quat::IDENTITY);
        }
    }

    #[test]
    fn test_base_yaw_removed() {
        let mut humanoid = Humanoid::new();
        // Pitch and roll of the base are not subtracted.
        humanoid.set_base_orientation(BodyHalf::Lower, Vec3::new(0.3, -0.2, 0.8));
        humanoid.update_lower(&pose(0.8)).unwrap();
        for (_, q) in humanoid.world_angles().lower().iter() {
            assert_quat_eq(q, Quat::IDENTITY);
        }
        // The shirt has its own base.
        humanoid.update_upper(&pose(0.8)).unwrap();
        assert_quat_eq(humanoid.world_angles().chest(), Quat::from_rotation_y(0.8));
    }

    #[test]
    fn test_children_relative_to_parent() {
        let mut humanoid = Humanoid::new();
        humanoid.update_upper(&pose(0.5)).unwrap();
        let local = humanoid.local_angles();
        assert_quat_eq(local.get(Limb::Chest), Quat::from_rotation_y(0.5));
        assert_quat_eq(local.get(Limb::LeftUpperArm), Quat::IDENTITY);
        assert_quat_eq(local.get(Limb::RightLowerArm), Quat::IDENTITY);

        let mut bent = pose(0.0);
        bent.left_lower = Vec3::new(-FRAC_PI_2, 0.6, 0.0);
        humanoid.update_upper(&bent).unwrap();
        let local = humanoid.local_angles();
        assert_quat_eq(local.get(Limb::LeftLowerArm), Quat::from_rotation_x(0.6));
        assert_quat_eq(local.get(Limb::LeftUpperArm), Quat::IDENTITY);
    }

    #[test]
    fn test_published_corrections_applied() {
        let mut humanoid = Humanoid::new();
        let mut alignment = AlignmentQuaternions::default();
        *alignment.corrections.get_mut(LimbSlot::Center) = Quat::from_rotation_y(-0.3);
        humanoid.alignment_completed(BodyHalf::Upper, &alignment);

        humanoid.update_upper(&pose(0.0)).unwrap();
        let mut tilted = pose(0.0);
        tilted.center = Vec3::new(0.0, 0.0, 0.3);
        humanoid.update_upper(&tilted).unwrap();
        assert_quat_eq(humanoid.world_angles().chest(), Quat::IDENTITY);
        // Lower half untouched by an upper alignment.
        assert_eq!(humanoid.alignment(BodyHalf::Lower), &AlignmentQuaternions::default());
    }

    #[test]
    fn test_unchanged_and_invalid_updates() {
        let mut humanoid = Humanoid::new();
        assert!(humanoid.update_lower(&pose(0.2)).unwrap());
        assert!(!humanoid.update_lower(&pose(0.2)).unwrap());

        let before = *humanoid.local_angles();
        let mut bad = pose(0.2);
        bad.left_upper.z = f32::NAN;
        assert!(humanoid.update_lower(&bad).is_err());
        assert_eq!(*humanoid.local_angles(), before);
    }
}
