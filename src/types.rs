use std::fmt;

use glam::{Quat, Vec3};

/// Which half of the suit a sensor module belongs to.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyHalf {
    /// Shirt: chest + arms.
    Upper = 0,
    /// Pants: waist + legs.
    Lower = 1,
}

impl BodyHalf {
    pub const BOTH: [BodyHalf; 2] = [BodyHalf::Upper, BodyHalf::Lower];

    /// The garment that carries this half's modules.
    pub fn device(self) -> EnfluxDevice {
        match self {
            BodyHalf::Upper => EnfluxDevice::SHIRT,
            BodyHalf::Lower => EnfluxDevice::PANTS,
        }
    }
}

impl fmt::Display for BodyHalf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodyHalf::Upper => f.write_str("upper"),
            BodyHalf::Lower => f.write_str("lower"),
        }
    }
}

/// Position of a module within one body half.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimbSlot {
    Center,
    LeftUpper,
    LeftLower,
    RightUpper,
    RightLower,
}

impl LimbSlot {
    pub const ALL: [LimbSlot; 5] = [
        LimbSlot::Center,
        LimbSlot::LeftUpper,
        LimbSlot::LeftLower,
        LimbSlot::RightUpper,
        LimbSlot::RightLower,
    ];

    /// Parent slot in the kinematic chain. The center module is the root.
    pub fn parent(self) -> Option<LimbSlot> {
        match self {
            LimbSlot::Center => None,
            LimbSlot::LeftUpper | LimbSlot::RightUpper => Some(LimbSlot::Center),
            LimbSlot::LeftLower => Some(LimbSlot::LeftUpper),
            LimbSlot::RightLower => Some(LimbSlot::RightUpper),
        }
    }
}

/// The ten tracked body segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Limb {
    Chest,
    LeftUpperArm,
    LeftLowerArm,
    RightUpperArm,
    RightLowerArm,
    Waist,
    LeftUpperLeg,
    LeftLowerLeg,
    RightUpperLeg,
    RightLowerLeg,
}

impl Limb {
    pub const ALL: [Limb; 10] = [
        Limb::Chest,
        Limb::LeftUpperArm,
        Limb::LeftLowerArm,
        Limb::RightUpperArm,
        Limb::RightLowerArm,
        Limb::Waist,
        Limb::LeftUpperLeg,
        Limb::LeftLowerLeg,
        Limb::RightUpperLeg,
        Limb::RightLowerLeg,
    ];

    pub fn new(half: BodyHalf, slot: LimbSlot) -> Limb {
        match (half, slot) {
            (BodyHalf::Upper, LimbSlot::Center) => Limb::Chest,
            (BodyHalf::Upper, LimbSlot::LeftUpper) => Limb::LeftUpperArm,
            (BodyHalf::Upper, LimbSlot::LeftLower) => Limb::LeftLowerArm,
            (BodyHalf::Upper, LimbSlot::RightUpper) => Limb::RightUpperArm,
            (BodyHalf::Upper, LimbSlot::RightLower) => Limb::RightLowerArm,
            (BodyHalf::Lower, LimbSlot::Center) => Limb::Waist,
            (BodyHalf::Lower, LimbSlot::LeftUpper) => Limb::LeftUpperLeg,
            (BodyHalf::Lower, LimbSlot::LeftLower) => Limb::LeftLowerLeg,
            (BodyHalf::Lower, LimbSlot::RightUpper) => Limb::RightUpperLeg,
            (BodyHalf::Lower, LimbSlot::RightLower) => Limb::RightLowerLeg,
        }
    }

    pub fn half(self) -> BodyHalf {
        match self {
            Limb::Chest
            | Limb::LeftUpperArm
            | Limb::LeftLowerArm
            | Limb::RightUpperArm
            | Limb::RightLowerArm => BodyHalf::Upper,
            _ => BodyHalf::Lower,
        }
    }

    pub fn slot(self) -> LimbSlot {
        match self {
            Limb::Chest | Limb::Waist => LimbSlot::Center,
            Limb::LeftUpperArm | Limb::LeftUpperLeg => LimbSlot::LeftUpper,
            Limb::LeftLowerArm | Limb::LeftLowerLeg => LimbSlot::LeftLower,
            Limb::RightUpperArm | Limb::RightUpperLeg => LimbSlot::RightUpper,
            Limb::RightLowerArm | Limb::RightLowerLeg => LimbSlot::RightLower,
        }
    }

    /// Parent segment: chest -> upper arm -> lower arm, waist -> upper leg -> lower leg.
    pub fn parent(self) -> Option<Limb> {
        self.slot().parent().map(|slot| Limb::new(self.half(), slot))
    }
}

/// The five module readings of one body half.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LimbAngles<T> {
    pub center: T,
    pub left_upper: T,
    pub left_lower: T,
    pub right_upper: T,
    pub right_lower: T,
}

impl<T: Copy> LimbAngles<T> {
    pub fn splat(value: T) -> Self {
        Self {
            center: value,
            left_upper: value,
            left_lower: value,
            right_upper: value,
            right_lower: value,
        }
    }

    pub fn get(&self, slot: LimbSlot) -> T {
        match slot {
            LimbSlot::Center => self.center,
            LimbSlot::LeftUpper => self.left_upper,
            LimbSlot::LeftLower => self.left_lower,
            LimbSlot::RightUpper => self.right_upper,
            LimbSlot::RightLower => self.right_lower,
        }
    }

    pub fn get_mut(&mut self, slot: LimbSlot) -> &mut T {
        match slot {
            LimbSlot::Center => &mut self.center,
            LimbSlot::LeftUpper => &mut self.left_upper,
            LimbSlot::LeftLower => &mut self.left_lower,
            LimbSlot::RightUpper => &mut self.right_upper,
            LimbSlot::RightLower => &mut self.right_lower,
        }
    }

    pub fn map<U>(&self, mut f: impl FnMut(LimbSlot, T) -> U) -> LimbAngles<U> {
        LimbAngles {
            center: f(LimbSlot::Center, self.center),
            left_upper: f(LimbSlot::LeftUpper, self.left_upper),
            left_lower: f(LimbSlot::LeftLower, self.left_lower),
            right_upper: f(LimbSlot::RightUpper, self.right_upper),
            right_lower: f(LimbSlot::RightLower, self.right_lower),
        }
    }

    pub fn try_map<U, E>(
        &self,
        mut f: impl FnMut(LimbSlot, T) -> Result<U, E>,
    ) -> Result<LimbAngles<U>, E> {
        Ok(LimbAngles {
            center: f(LimbSlot::Center, self.center)?,
            left_upper: f(LimbSlot::LeftUpper, self.left_upper)?,
            left_lower: f(LimbSlot::LeftLower, self.left_lower)?,
            right_upper: f(LimbSlot::RightUpper, self.right_upper)?,
            right_lower: f(LimbSlot::RightLower, self.right_lower)?,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (LimbSlot, T)> + '_ {
        LimbSlot::ALL.into_iter().map(move |slot| (slot, self.get(slot)))
    }
}

/// Per-limb values for the whole body, e.g. absolute angles (`Vec3`) or
/// local rotations (`Quat`). All ten slots are always populated.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HumanoidAngles<T> {
    upper: LimbAngles<T>,
    lower: LimbAngles<T>,
}

impl<T: Copy + PartialEq> HumanoidAngles<T> {
    pub fn new(upper: LimbAngles<T>, lower: LimbAngles<T>) -> Self {
        Self { upper, lower }
    }

    pub fn upper(&self) -> &LimbAngles<T> {
        &self.upper
    }

    pub fn lower(&self) -> &LimbAngles<T> {
        &self.lower
    }

    pub fn half(&self, half: BodyHalf) -> &LimbAngles<T> {
        match half {
            BodyHalf::Upper => &self.upper,
            BodyHalf::Lower => &self.lower,
        }
    }

    pub fn get(&self, limb: Limb) -> T {
        self.half(limb.half()).get(limb.slot())
    }

    /// Set one limb. Returns the half that changed, or `None` if the value was
    /// already current.
    pub fn set(&mut self, limb: Limb, value: T) -> Option<BodyHalf> {
        let half = limb.half();
        let slot = match half {
            BodyHalf::Upper => self.upper.get_mut(limb.slot()),
            BodyHalf::Lower => self.lower.get_mut(limb.slot()),
        };
        if *slot == value {
            return None;
        }
        *slot = value;
        Some(half)
    }

    /// Apply all five angles of one half at once. Returns `false` when nothing changed.
    pub fn set_half(&mut self, half: BodyHalf, angles: LimbAngles<T>) -> bool {
        let current = match half {
            BodyHalf::Upper => &mut self.upper,
            BodyHalf::Lower => &mut self.lower,
        };
        if *current == angles {
            return false;
        }
        *current = angles;
        true
    }

    pub fn set_upper(&mut self, angles: LimbAngles<T>) -> bool {
        self.set_half(BodyHalf::Upper, angles)
    }

    pub fn set_lower(&mut self, angles: LimbAngles<T>) -> bool {
        self.set_half(BodyHalf::Lower, angles)
    }

    pub fn chest(&self) -> T {
        self.upper.center
    }

    pub fn waist(&self) -> T {
        self.lower.center
    }
}

impl<T: fmt::Debug> fmt::Display for HumanoidAngles<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(Chest: {:?}, LeftUpperArm: {:?}, LeftLowerArm: {:?}, RightUpperArm: {:?}, RightLowerArm: {:?}, \
             Waist: {:?}, LeftUpperLeg: {:?}, LeftLowerLeg: {:?}, RightUpperLeg: {:?}, RightLowerLeg: {:?})",
            self.upper.center,
            self.upper.left_upper,
            self.upper.left_lower,
            self.upper.right_upper,
            self.upper.right_lower,
            self.lower.center,
            self.lower.left_upper,
            self.lower.left_lower,
            self.lower.right_upper,
            self.lower.right_lower,
        )
    }
}

/// Absolute (roll, pitch, yaw) angles in radians for every limb.
pub type AbsoluteAngles = HumanoidAngles<Vec3>;

/// Parent-relative limb rotations.
pub type LocalAngles = HumanoidAngles<Quat>;

/// Progress of a suit alignment session.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlignmentState {
    #[default]
    Unaligned = 0,
    InProgress = 1,
    Aligned = 2,
    ErrorAligning = 3,
    Cancelled = 4,
}

impl AlignmentState {
    /// A finished session; a new one must be initiated to align again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AlignmentState::Aligned | AlignmentState::ErrorAligning | AlignmentState::Cancelled
        )
    }
}

/// Correction quaternions for the five modules of one body half.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentQuaternions {
    pub corrections: LimbAngles<Quat>,
    /// Residual error in radians: how far the center module drifted from
    /// its converged stance while sampling.
    pub error: f32,
}

impl AlignmentQuaternions {
    pub fn correction(&self, slot: LimbSlot) -> Quat {
        self.corrections.get(slot)
    }
}

impl Default for AlignmentQuaternions {
    fn default() -> Self {
        Self {
            corrections: LimbAngles::splat(Quat::IDENTITY),
            error: 0.0,
        }
    }
}

bitflags::bitflags! {
    /// Suit garments addressed by driver calls. Empty means no device.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[repr(C)]
    pub struct EnfluxDevice: u8 {
        const SHIRT = 1 << 0;
        const PANTS = 1 << 1;
        const ALL   = Self::SHIRT.bits() | Self::PANTS.bits();
    }
}

impl fmt::Display for EnfluxDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == EnfluxDevice::ALL {
            f.write_str("All")
        } else if *self == EnfluxDevice::SHIRT {
            f.write_str("Shirt")
        } else if *self == EnfluxDevice::PANTS {
            f.write_str("Pants")
        } else {
            f.write_str("None")
        }
    }
}

/// Connection state of one garment.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceState {
    #[default]
    Disconnected,
    Initializing,
    Calibrating,
    Connected,
    Streaming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceNotification {
    ResetOrientation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    CalibrationFailed,
    NoCalibration,
    UnknownDevice,
}

/// Status commands popped from the native driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputCommand {
    DeviceConnected,
    DeviceDisconnected,
    CalibrationStarted,
    CalibrationFinished,
    ResetOrientation,
    ErrorCalibrationFailed,
    ErrorNoCalibration,
    ErrorNoShirtPants,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange<T> {
    pub previous: T,
    pub current: T,
}
