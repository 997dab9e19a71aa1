//! C FFI layer for enflux.
//!
//! Provides an opaque handle that aligns and fuses suit angles pushed by the
//! host application. The generated C header is written to `include/enflux.h`
//! by cbindgen.

use std::ffi::{c_char, c_int};

use glam::{Quat, Vec3};

use crate::alignment::SuitAlignment;
use crate::config::AlignmentConfig;
use crate::error::LastError;
use crate::humanoid::Humanoid;
use crate::types::{AlignmentState, BodyHalf, Limb, LimbAngles};
use crate::EnfluxError;

/// Last error message for C consumers.
static LAST_ERROR: LastError = LastError::new();

/// Opaque body handle for C consumers.
pub struct EnxBody(SuitAlignment<Humanoid>);

/// Rotation in C-compatible layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnxQuat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

/// Absolute module angles in radians.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnxVec3 {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

/// The five module readings of one body half.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnxLimbAngles {
    pub center: EnxVec3,
    pub left_upper: EnxVec3,
    pub left_lower: EnxVec3,
    pub right_upper: EnxVec3,
    pub right_lower: EnxVec3,
}

impl From<Quat> for EnxQuat {
    fn from(q: Quat) -> Self {
        Self {
            x: q.x,
            y: q.y,
            z: q.z,
            w: q.w,
        }
    }
}

impl From<EnxVec3> for Vec3 {
    fn from(v: EnxVec3) -> Self {
        Vec3::new(v.roll, v.pitch, v.yaw)
    }
}

impl From<&EnxLimbAngles> for LimbAngles<Vec3> {
    fn from(a: &EnxLimbAngles) -> Self {
        LimbAngles {
            center: a.center.into(),
            left_upper: a.left_upper.into(),
            left_lower: a.left_lower.into(),
            right_upper: a.right_upper.into(),
            right_lower: a.right_lower.into(),
        }
    }
}

/// `half`: 0 = upper (shirt), 1 = lower (pants).
fn body_half(half: c_int) -> Option<BodyHalf> {
    match half {
        0 => Some(BodyHalf::Upper),
        1 => Some(BodyHalf::Lower),
        _ => None,
    }
}

/// Records which argument was null and returns -1.
fn null_argument(name: &'static str) -> c_int {
    LAST_ERROR.set(&EnfluxError::NullPointer(name));
    -1
}

fn new_body(config: AlignmentConfig) -> *mut EnxBody {
    let alignment = SuitAlignment::new(config, Humanoid::new());
    Box::into_raw(Box::new(EnxBody(alignment)))
}

/// Create a body using alignment settings from the environment
/// (`ENFLUX_ALIGN_SAMPLES`, `ENFLUX_ALIGN_MAX_ERROR`).
#[no_mangle]
pub extern "C" fn enx_body_new() -> *mut EnxBody {
    new_body(AlignmentConfig::from_env())
}

/// Create a body with explicit alignment settings. A zero threshold is
/// raised to one; a negative or non-finite tolerance uses the default.
#[no_mangle]
pub extern "C" fn enx_body_new_with_config(sample_threshold: u32, max_error_rad: f32) -> *mut EnxBody {
    new_body(AlignmentConfig {
        sample_threshold,
        max_error_rad,
    })
}

/// Free a body.
///
/// # Safety
/// `body` must be a pointer returned by `enx_body_new*`, or null.
#[no_mangle]
pub unsafe extern "C" fn enx_body_free(body: *mut EnxBody) {
    if !body.is_null() {
        drop(Box::from_raw(body));
    }
}

/// Start an alignment session. Returns false if one is already running.
///
/// # Safety
/// `body` must be a valid body pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn enx_body_initiate_alignment(body: *mut EnxBody) -> bool {
    if body.is_null() {
        return false;
    }
    let body = &mut *body;
    body.0.initiate_alignment()
}

/// Cancel a running alignment session. Returns false if none was running.
///
/// # Safety
/// `body` must be a valid body pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn enx_body_cancel_alignment(body: *mut EnxBody) -> bool {
    if body.is_null() {
        return false;
    }
    let body = &mut *body;
    body.0.cancel_alignment()
}

/// # Safety
/// `body` must be a valid body pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn enx_body_alignment_state(body: *const EnxBody) -> AlignmentState {
    if body.is_null() {
        return AlignmentState::Unaligned;
    }
    let body = &*body;
    body.0.state()
}

/// Alignment progress in [0, 1].
///
/// # Safety
/// `body` must be a valid body pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn enx_body_alignment_progress(body: *const EnxBody) -> f32 {
    if body.is_null() {
        return 0.0;
    }
    let body = &*body;
    body.0.progress()
}

/// Residual error (radians) of the last finished session, or -1 if none.
///
/// # Safety
/// `body` must be a valid body pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn enx_body_alignment_error(body: *const EnxBody) -> f32 {
    if body.is_null() {
        return -1.0;
    }
    let body = &*body;
    body.0.last_error().unwrap_or(-1.0)
}

/// Push one frame of absolute angles for a body half. The frame feeds a
/// running alignment session and then updates the local limb rotations.
/// Returns 0 on success, -1 on error (check `enx_last_error()`).
///
/// # Safety
/// `body` and `angles` must be valid pointers, or null.
#[no_mangle]
pub unsafe extern "C" fn enx_body_push_angles(
    body: *mut EnxBody,
    half: c_int,
    angles: *const EnxLimbAngles,
) -> c_int {
    if body.is_null() {
        return null_argument("body");
    }
    if angles.is_null() {
        return null_argument("angles");
    }
    let Some(half) = body_half(half) else {
        LAST_ERROR.set(&EnfluxError::InvalidSample(format!("unknown body half {}", half)));
        return -1;
    };
    let body = &mut *body;
    let angles = LimbAngles::<Vec3>::from(&*angles);

    let result = body
        .0
        .push_frame(half, &angles)
        .and_then(|_| body.0.sink_mut().update(half, &angles));
    match result {
        Ok(_) => {
            LAST_ERROR.clear();
            0
        }
        Err(e) => {
            LAST_ERROR.set(&e);
            -1
        }
    }
}

/// Set the base orientation whose yaw is removed from a half's readings.
/// Returns 0 on success, -1 on error.
///
/// # Safety
/// `body` must be a valid body pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn enx_body_set_base_orientation(
    body: *mut EnxBody,
    half: c_int,
    rpy: EnxVec3,
) -> c_int {
    if body.is_null() {
        return null_argument("body");
    }
    let Some(half) = body_half(half) else {
        LAST_ERROR.set(&EnfluxError::InvalidSample(format!("unknown body half {}", half)));
        return -1;
    };
    let body = &mut *body;
    body.0.sink_mut().set_base_orientation(half, rpy.into());
    LAST_ERROR.clear();
    0
}

/// Copy the ten local limb rotations into `out`, ordered chest, left upper
/// arm, left lower arm, right upper arm, right lower arm, waist, left upper
/// leg, left lower leg, right upper leg, right lower leg.
/// Returns 0 on success, -1 on error.
///
/// # Safety
/// `body` must be a valid body pointer, or null. `out` must point to an array
/// of at least 10 `EnxQuat` elements, or be null.
#[no_mangle]
pub unsafe extern "C" fn enx_body_local_angles(body: *const EnxBody, out: *mut EnxQuat) -> c_int {
    if body.is_null() {
        return null_argument("body");
    }
    if out.is_null() {
        return null_argument("out");
    }
    let body = &*body;
    let local = body.0.sink().local_angles();
    for (i, limb) in Limb::ALL.iter().enumerate() {
        out.add(i).write(local.get(*limb).into());
    }
    LAST_ERROR.clear();
    0
}

/// Get the last error message. Returns NULL if no error.
/// The returned pointer is valid until the next enflux API call.
#[no_mangle]
pub extern "C" fn enx_last_error() -> *const c_char {
    LAST_ERROR.as_ptr()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;
    use std::f32::consts::FRAC_PI_2;
    use std::sync::{Mutex, MutexGuard};

    // LAST_ERROR is process-wide; tests that read it must not interleave.
    static SERIAL: Mutex<()> = Mutex::new(());

    fn serial() -> MutexGuard<'static, ()> {
        SERIAL.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn last_error() -> Option<String> {
        let ptr = enx_last_error();
        if ptr.is_null() {
            return None;
        }
        Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
    }

    fn stance(yaw: f32) -> EnxLimbAngles {
        let center = EnxVec3 {
            roll: 0.0,
            pitch: 0.0,
            yaw,
        };
        let left = EnxVec3 {
            roll: -FRAC_PI_2,
            ..center
        };
        let right = EnxVec3 {
            roll: FRAC_PI_2,
            ..center
        };
        EnxLimbAngles {
            center,
            left_upper: left,
            left_lower: left,
            right_upper: right,
            right_lower: right,
        }
    }

    #[test]
    fn test_body_alignment_roundtrip() {
        let _guard = serial();
        let body = enx_body_new_with_config(3, 0.26);
        unsafe {
            assert!(enx_body_initiate_alignment(body));
            assert_eq!(enx_body_alignment_state(body), AlignmentState::InProgress);
            for _ in 0..3 {
                assert_eq!(enx_body_push_angles(body, 0, &stance(0.4)), 0);
            }
            assert_eq!(enx_body_alignment_state(body), AlignmentState::Aligned);
            assert!((enx_body_alignment_progress(body) - 1.0).abs() < 1e-6);
            assert!(enx_body_alignment_error(body) < 1e-3);

            assert_eq!(
                enx_body_set_base_orientation(
                    body,
                    0,
                    EnxVec3 {
                        roll: 0.0,
                        pitch: 0.0,
                        yaw: 0.4,
                    }
                ),
                0
            );
            assert_eq!(enx_body_push_angles(body, 0, &stance(0.4)), 0);

            let mut out = [EnxQuat::from(Quat::IDENTITY); 10];
            assert_eq!(enx_body_local_angles(body, out.as_mut_ptr()), 0);
            // With the base yaw removed the stance faces forward.
            assert!(out[0].w.abs() > 0.999);
            assert!(out[1].w.abs() > 0.999);
            enx_body_free(body);
        }
    }

    #[test]
    fn test_invalid_arguments() {
        let _guard = serial();
        let body = enx_body_new_with_config(10, 0.26);
        unsafe {
            assert_eq!(enx_body_push_angles(body, 2, &stance(0.0)), -1);
            assert_eq!(enx_body_push_angles(body, 0, std::ptr::null()), -1);

            let mut bad = stance(0.0);
            bad.right_lower.pitch = f32::NAN;
            assert_eq!(enx_body_push_angles(body, 1, &bad), -1);
            assert!(!enx_body_cancel_alignment(body));
            assert_eq!(enx_body_alignment_error(body), -1.0);
            enx_body_free(body);

            assert!(!enx_body_initiate_alignment(std::ptr::null_mut()));
            assert_eq!(enx_body_local_angles(std::ptr::null(), std::ptr::null_mut()), -1);
        }
    }

    #[test]
    fn test_null_arguments_set_last_error() {
        let _guard = serial();
        let body = enx_body_new_with_config(10, 0.26);
        unsafe {
            assert_eq!(enx_body_push_angles(body, 2, &stance(0.0)), -1);
            assert!(last_error().unwrap().contains("unknown body half"));

            // A null argument replaces the stale message.
            assert_eq!(enx_body_push_angles(body, 0, std::ptr::null()), -1);
            assert_eq!(last_error().as_deref(), Some("Null pointer passed for 'angles'"));

            assert_eq!(enx_body_push_angles(body, 0, &stance(0.0)), 0);
            assert_eq!(last_error(), None);

            let rpy = EnxVec3 {
                roll: 0.0,
                pitch: 0.0,
                yaw: 0.0,
            };
            assert_eq!(enx_body_set_base_orientation(std::ptr::null_mut(), 0, rpy), -1);
            assert_eq!(last_error().as_deref(), Some("Null pointer passed for 'body'"));

            assert_eq!(enx_body_local_angles(body, std::ptr::null_mut()), -1);
            assert_eq!(last_error().as_deref(), Some("Null pointer passed for 'out'"));

            let mut out = [EnxQuat::from(Quat::IDENTITY); 10];
            assert_eq!(enx_body_local_angles(body, out.as_mut_ptr()), 0);
            assert_eq!(last_error(), None);
            enx_body_free(body);
        }
    }

    #[test]
    fn test_header_declares_api() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/include/enflux.h");
        let header = std::fs::read_to_string(path).unwrap();
        for name in [
            "EnxBody",
            "EnxLimbAngles",
            "enx_body_new_with_config",
            "enx_body_push_angles",
            "enx_body_local_angles",
            "enx_last_error",
        ] {
            assert!(header.contains(name), "{} missing from header", name);
        }
    }
}
