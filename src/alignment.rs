//! Sensor alignment: per-limb correction quaternions and the sampling
//! session that produces them.
//!
//! While the wearer holds the reference stance, every frame of a body half is
//! pushed into that half's [`Module`]. The center module's orientation is
//! averaged until `sample_threshold` samples have been seen; then each limb
//! gets a correction `c` such that `limb * c` equals the stance heading.

use glam::{Quat, Vec3};

use crate::config::AlignmentConfig;
use crate::orientation::{heading, try_orientation_for, QuaternionAverage};
use crate::types::{AlignmentQuaternions, AlignmentState, BodyHalf, LimbAngles, LimbSlot};
use crate::Result;

/// Receives correction quaternions when an alignment session succeeds.
pub trait CorrectionSink {
    fn alignment_completed(&mut self, half: BodyHalf, alignment: &AlignmentQuaternions);
}

impl CorrectionSink for () {
    fn alignment_completed(&mut self, _half: BodyHalf, _alignment: &AlignmentQuaternions) {}
}

/// Corrections for the shirt modules.
pub fn upper_body_alignment(
    initial_center: Quat,
    current_center: Quat,
    left_upper: Quat,
    left_lower: Quat,
    right_upper: Quat,
    right_lower: Quat,
) -> AlignmentQuaternions {
    body_alignment(
        initial_center,
        &LimbAngles {
            center: current_center,
            left_upper,
            left_lower,
            right_upper,
            right_lower,
        },
    )
}

/// Corrections for the pants modules. Same contract as [`upper_body_alignment`].
pub fn lower_body_alignment(
    initial_center: Quat,
    current_center: Quat,
    left_upper: Quat,
    left_lower: Quat,
    right_upper: Quat,
    right_lower: Quat,
) -> AlignmentQuaternions {
    body_alignment(
        initial_center,
        &LimbAngles {
            center: current_center,
            left_upper,
            left_lower,
            right_upper,
            right_lower,
        },
    )
}

fn body_alignment(initial_center: Quat, current: &LimbAngles<Quat>) -> AlignmentQuaternions {
    let reference = heading(initial_center);
    let corrections = current.map(|slot, q| match slot {
        LimbSlot::Center => (initial_center.inverse() * reference).normalize(),
        _ => (q.inverse() * reference).normalize(),
    });
    AlignmentQuaternions {
        corrections,
        error: initial_center.angle_between(current.center),
    }
}

/// Alignment for a half that may never have streamed. A missing module is
/// skipped.
pub fn align_module(module: Option<&Module>) -> Option<AlignmentQuaternions> {
    let module = module?;
    Some(body_alignment(module.initial_center(), module.current()))
}

/// Per-half sample accumulator of one alignment session.
#[derive(Debug, Clone, Default)]
pub struct Module {
    average: QuaternionAverage,
    current: LimbAngles<Quat>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one frame of converted module orientations.
    pub fn push(&mut self, orientations: LimbAngles<Quat>) {
        self.current = orientations;
        self.average.push(orientations.center);
    }

    pub fn count(&self) -> u32 {
        self.average.count()
    }

    /// Converged center orientation (running mean of the center module).
    pub fn initial_center(&self) -> Quat {
        self.average.mean().unwrap_or(self.current.center)
    }

    /// Latest instantaneous orientation of every module.
    pub fn current(&self) -> &LimbAngles<Quat> {
        &self.current
    }

    pub fn progress(&self, threshold: u32) -> f32 {
        (self.count() as f32 / threshold.max(1) as f32).min(1.0)
    }
}

#[derive(Debug, Default)]
struct Session {
    upper: Option<Module>,
    lower: Option<Module>,
}

impl Session {
    fn module(&self, half: BodyHalf) -> Option<&Module> {
        match half {
            BodyHalf::Upper => self.upper.as_ref(),
            BodyHalf::Lower => self.lower.as_ref(),
        }
    }

    fn module_mut(&mut self, half: BodyHalf) -> &mut Option<Module> {
        match half {
            BodyHalf::Upper => &mut self.upper,
            BodyHalf::Lower => &mut self.lower,
        }
    }
}

/// Alignment session state machine.
///
/// Frames are pushed explicitly; nothing is accumulated unless a session is
/// in progress, so starting twice cannot double-count samples.
pub struct SuitAlignment<S: CorrectionSink> {
    config: AlignmentConfig,
    sink: S,
    state: AlignmentState,
    session: Option<Session>,
    upper: Option<AlignmentQuaternions>,
    lower: Option<AlignmentQuaternions>,
    last_error: Option<f32>,
}

impl SuitAlignment<()> {
    /// An aligner that only keeps the corrections, read back through
    /// [`SuitAlignment::alignment`].
    pub fn without_sink(config: AlignmentConfig) -> Self {
        Self::new(config, ())
    }
}

impl<S: CorrectionSink> SuitAlignment<S> {
    pub fn new(config: AlignmentConfig, sink: S) -> Self {
        Self {
            config: config.validated(),
            sink,
            state: AlignmentState::Unaligned,
            session: None,
            upper: None,
            lower: None,
            last_error: None,
        }
    }

    /// Start sampling. Returns `false` if a session is already in progress.
    pub fn initiate_alignment(&mut self) -> bool {
        if self.state == AlignmentState::InProgress {
            log::debug!("Alignment already in progress");
            return false;
        }
        self.session = Some(Session::default());
        self.state = AlignmentState::InProgress;
        log::info!(
            "Alignment started ({} samples per body half)",
            self.config.sample_threshold
        );
        true
    }

    /// Stop sampling and discard the accumulators. No-op unless in progress.
    pub fn cancel_alignment(&mut self) -> bool {
        if self.state != AlignmentState::InProgress {
            return false;
        }
        self.session = None;
        self.state = AlignmentState::Cancelled;
        log::info!("Alignment cancelled");
        true
    }

    pub fn push_upper(&mut self, angles: &LimbAngles<Vec3>) -> Result<AlignmentState> {
        self.push_frame(BodyHalf::Upper, angles)
    }

    pub fn push_lower(&mut self, angles: &LimbAngles<Vec3>) -> Result<AlignmentState> {
        self.push_frame(BodyHalf::Lower, angles)
    }

    /// Feed one frame of absolute angles. Ignored unless a session is in
    /// progress. A frame with any non-finite reading is rejected whole.
    ///
    /// A half that has not sent a frame yet does not hold the session back,
    /// so a single garment can align on its own. When both garments are worn,
    /// interleave their frames: once one half reaches the sample threshold
    /// before the other's first frame, the session completes without the
    /// other half.
    pub fn push_frame(&mut self, half: BodyHalf, angles: &LimbAngles<Vec3>) -> Result<AlignmentState> {
        let Some(session) = self.session.as_mut() else {
            return Ok(self.state);
        };
        let orientations = angles.try_map(try_orientation_for).map_err(|e| {
            log::warn!("Rejected {} alignment sample: {}", half, e);
            e
        })?;
        session
            .module_mut(half)
            .get_or_insert_with(Module::new)
            .push(orientations);

        self.check_progress();
        Ok(self.state)
    }

    /// Overall progress in `[0, 1]`: the product of both halves' progress,
    /// where a half that has not streamed counts as done.
    pub fn progress(&self) -> f32 {
        match &self.session {
            Some(session) => {
                if session.upper.is_none() && session.lower.is_none() {
                    return 0.0;
                }
                self.half_progress(session, BodyHalf::Upper)
                    * self.half_progress(session, BodyHalf::Lower)
            }
            None => match self.state {
                AlignmentState::Aligned | AlignmentState::ErrorAligning => 1.0,
                _ => 0.0,
            },
        }
    }

    fn half_progress(&self, session: &Session, half: BodyHalf) -> f32 {
        session
            .module(half)
            .map_or(1.0, |m| m.progress(self.config.sample_threshold))
    }

    /// Samples accumulated for a half in the current session.
    pub fn samples(&self, half: BodyHalf) -> u32 {
        self.session
            .as_ref()
            .and_then(|s| s.module(half))
            .map_or(0, Module::count)
    }

    fn check_progress(&mut self) {
        let threshold = self.config.sample_threshold;
        let converged = match &self.session {
            Some(session) => BodyHalf::BOTH.iter().all(|&half| {
                session.module(half).map_or(true, |m| m.count() >= threshold)
            }),
            None => false,
        };
        if !converged {
            return;
        }
        if let Some(session) = self.session.take() {
            self.complete(session);
        }
    }

    fn complete(&mut self, session: Session) {
        let upper = align_module(session.upper.as_ref());
        let lower = align_module(session.lower.as_ref());
        let error = upper
            .iter()
            .chain(lower.iter())
            .map(|a| a.error)
            .fold(0.0f32, f32::max);
        self.last_error = Some(error);

        if error > self.config.max_error_rad {
            self.state = AlignmentState::ErrorAligning;
            log::warn!(
                "Alignment failed: residual error {:.3} rad exceeds {:.3} rad",
                error,
                self.config.max_error_rad
            );
            return;
        }

        self.state = AlignmentState::Aligned;
        log::info!("Alignment complete (residual error {:.3} rad)", error);
        if let Some(alignment) = upper {
            self.upper = Some(alignment);
            self.sink.alignment_completed(BodyHalf::Upper, &alignment);
        }
        if let Some(alignment) = lower {
            self.lower = Some(alignment);
            self.sink.alignment_completed(BodyHalf::Lower, &alignment);
        }
    }

    pub fn state(&self) -> AlignmentState {
        self.state
    }

    pub fn is_aligning(&self) -> bool {
        self.state == AlignmentState::InProgress
    }

    pub fn config(&self) -> &AlignmentConfig {
        &self.config
    }

    /// Last published corrections for a half, if any session succeeded.
    pub fn alignment(&self, half: BodyHalf) -> Option<&AlignmentQuaternions> {
        match half {
            BodyHalf::Upper => self.upper.as_ref(),
            BodyHalf::Lower => self.lower.as_ref(),
        }
    }

    pub fn upper_alignment(&self) -> Option<&AlignmentQuaternions> {
        self.upper.as_ref()
    }

    pub fn lower_alignment(&self) -> Option<&AlignmentQuaternions> {
        self.lower.as_ref()
    }

    /// Residual error of the last finished session.
    pub fn last_error(&self) -> Option<f32> {
        self.last_error
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}
