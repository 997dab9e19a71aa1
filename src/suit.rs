//! Suit manager: garment connection state, absolute angles, and the
//! alignment flow on top of an event source.
//!
//! ```no_run
//! use std::collections::VecDeque;
//! use std::time::Instant;
//! use enflux::{EnfluxDevice, EnfluxSuit, SuitConfig, SuitEvent};
//!
//! let mut suit = EnfluxSuit::new(VecDeque::<SuitEvent>::new(), SuitConfig::default());
//! suit.connect(EnfluxDevice::ALL).unwrap();
//! loop {
//!     suit.update(Instant::now());
//!     for update in suit.take_updates() {
//!         println!("{:?}", update);
//!     }
//! }
//! ```

use std::time::{Duration, Instant};

use glam::Vec3;

use crate::alignment::SuitAlignment;
use crate::config::SuitConfig;
use crate::countdown::Countdown;
use crate::humanoid::Humanoid;
use crate::protocol::RawFrame;
use crate::stream::{SuitEvent, SuitSource};
use crate::types::{
    AbsoluteAngles, AlignmentState, BodyHalf, DeviceError, DeviceNotification, DeviceState,
    EnfluxDevice, InputCommand, LimbAngles, LocalAngles, StateChange,
};
use crate::{EnfluxError, Result};

/// Something observable that happened during [`EnfluxSuit::update`] or a
/// control call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SuitUpdate {
    DeviceState(BodyHalf, StateChange<DeviceState>),
    Notification(BodyHalf, DeviceNotification),
    Error(BodyHalf, DeviceError),
    /// New absolute angles were applied to this half.
    AnglesChanged(BodyHalf),
    Alignment(StateChange<AlignmentState>),
}

/// A shirt and pants pair fed by a [`SuitSource`].
pub struct EnfluxSuit<S: SuitSource> {
    source: S,
    config: SuitConfig,
    shirt_state: DeviceState,
    pants_state: DeviceState,
    absolute: AbsoluteAngles,
    alignment: SuitAlignment<Humanoid>,
    countdown: Countdown,
    updates: Vec<SuitUpdate>,
}

impl<S: SuitSource> EnfluxSuit<S> {
    pub fn new(source: S, config: SuitConfig) -> Self {
        Self {
            source,
            config,
            shirt_state: DeviceState::Disconnected,
            pants_state: DeviceState::Disconnected,
            absolute: AbsoluteAngles::default(),
            alignment: SuitAlignment::new(config.alignment, Humanoid::new()),
            countdown: Countdown::new(),
            updates: Vec::new(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn config(&self) -> &SuitConfig {
        &self.config
    }

    pub fn shirt_state(&self) -> DeviceState {
        self.shirt_state
    }

    pub fn pants_state(&self) -> DeviceState {
        self.pants_state
    }

    pub fn device_state(&self, half: BodyHalf) -> DeviceState {
        match half {
            BodyHalf::Upper => self.shirt_state,
            BodyHalf::Lower => self.pants_state,
        }
    }

    pub fn is_shirt_active(&self) -> bool {
        self.shirt_state != DeviceState::Disconnected
    }

    pub fn are_pants_active(&self) -> bool {
        self.pants_state != DeviceState::Disconnected
    }

    pub fn is_any_device_active(&self) -> bool {
        self.is_shirt_active() || self.are_pants_active()
    }

    /// Whether every garment in `device` is active. `None` is never active.
    pub fn is_active(&self, device: EnfluxDevice) -> bool {
        if device == EnfluxDevice::ALL {
            self.is_shirt_active() && self.are_pants_active()
        } else if device == EnfluxDevice::SHIRT {
            self.is_shirt_active()
        } else if device == EnfluxDevice::PANTS {
            self.are_pants_active()
        } else {
            false
        }
    }

    /// Absolute angles of every module, as last reported by the garments.
    pub fn absolute_angles(&self) -> &AbsoluteAngles {
        &self.absolute
    }

    pub fn local_angles(&self) -> &LocalAngles {
        self.alignment.sink().local_angles()
    }

    pub fn humanoid(&self) -> &Humanoid {
        self.alignment.sink()
    }

    pub fn alignment(&self) -> &SuitAlignment<Humanoid> {
        &self.alignment
    }

    pub fn base_orientation(&self, half: BodyHalf) -> Vec3 {
        self.humanoid().base_orientation(half)
    }

    /// Drain everything that happened since the last call.
    pub fn take_updates(&mut self) -> Vec<SuitUpdate> {
        std::mem::take(&mut self.updates)
    }

    /// Start streaming `device`. Returns the garments actually requested from
    /// the driver, which can differ from `device`:
    /// asking for both while one streams connects only the other, and asking
    /// for one while the other streams reconnects both.
    pub fn connect(&mut self, device: EnfluxDevice) -> Result<EnfluxDevice> {
        if device.is_empty() {
            log::error!("Device is 'None'");
            return Err(EnfluxError::NoDevice);
        }
        if self.is_active(device) {
            log::error!("Device '{}' is already connected", device);
            return Err(EnfluxError::AlreadyConnected(device));
        }

        let target = if device == EnfluxDevice::ALL && self.is_shirt_active() {
            log::warn!("Device 'Shirt' is already connected");
            EnfluxDevice::PANTS
        } else if device == EnfluxDevice::ALL && self.are_pants_active() {
            log::warn!("Device 'Pants' is already connected");
            EnfluxDevice::SHIRT
        } else if (device == EnfluxDevice::SHIRT && self.are_pants_active())
            || (device == EnfluxDevice::PANTS && self.is_shirt_active())
        {
            self.disconnect()?;
            EnfluxDevice::ALL
        } else {
            device
        };

        log::info!("Connecting '{}'...", target);
        self.source.start_streaming(target)?;
        Ok(target)
    }

    /// Stop streaming every garment.
    pub fn disconnect(&mut self) -> Result<()> {
        if !self.is_any_device_active() {
            log::error!("No devices are connected");
            return Err(EnfluxError::NotConnected);
        }
        log::info!("Disconnecting all devices...");
        self.source.end_streaming()?;
        self.set_state(BodyHalf::Upper, DeviceState::Disconnected);
        self.set_state(BodyHalf::Lower, DeviceState::Disconnected);
        Ok(())
    }

    /// Unconditional teardown, e.g. when the application exits.
    pub fn shutdown(&mut self) {
        if let Err(e) = self.source.end_streaming() {
            log::warn!("Failed to end streaming: {}", e);
        }
        self.countdown.cancel();
        self.set_state(BodyHalf::Upper, DeviceState::Disconnected);
        self.set_state(BodyHalf::Lower, DeviceState::Disconnected);
    }

    /// Run the driver's sensor calibration. The garment must be disconnected.
    pub fn calibrate(&mut self, device: EnfluxDevice) -> Result<()> {
        if device.is_empty() {
            log::error!("Device is 'None'");
            return Err(EnfluxError::NoDevice);
        }
        if self.is_active(device) {
            log::error!("Device '{}' must be disconnected to calibrate", device);
            return Err(EnfluxError::MustDisconnect(device));
        }
        log::info!("Calibrating '{}'...", device);
        self.source.start_calibration(device)
    }

    /// Capture the chest's current absolute orientation as the shirt base.
    pub fn reset_shirt_base_orientation(&mut self) {
        self.reset_base_orientation(BodyHalf::Upper);
    }

    /// Capture the waist's current absolute orientation as the pants base.
    pub fn reset_pants_base_orientation(&mut self) {
        self.reset_base_orientation(BodyHalf::Lower);
    }

    pub fn reset_full_body_base_orientation(&mut self) {
        self.reset_shirt_base_orientation();
        self.reset_pants_base_orientation();
    }

    fn reset_base_orientation(&mut self, half: BodyHalf) {
        let angles = *self.absolute.half(half);
        let humanoid = self.alignment.sink_mut();
        humanoid.set_base_orientation(half, angles.center);
        if let Err(e) = humanoid.update(half, &angles) {
            log::warn!("Could not refresh {} body after reset: {}", half, e);
        }
        self.updates
            .push(SuitUpdate::Notification(half, DeviceNotification::ResetOrientation));
    }

    /// Start sampling after the configured countdown, giving the wearer time
    /// to take the stance. Returns `false` while a session is running.
    pub fn begin_alignment_countdown(&mut self, now: Instant) -> bool {
        if self.alignment.is_aligning() {
            log::debug!("Alignment already in progress");
            return false;
        }
        log::info!("Alignment starts in {:?}", self.config.countdown);
        self.countdown.start(now, self.config.countdown);
        true
    }

    pub fn alignment_countdown_remaining(&self, now: Instant) -> Option<Duration> {
        self.countdown.remaining(now)
    }

    /// Abort a pending countdown or a running session.
    pub fn cancel_alignment(&mut self) -> bool {
        let pending = self.countdown.cancel();
        let before = self.alignment.state();
        let cancelled = self.alignment.cancel_alignment();
        self.note_alignment(before);
        pending || cancelled
    }

    /// Tick the alignment countdown and apply every queued source event.
    pub fn update(&mut self, now: Instant) {
        if self.countdown.poll(now) {
            let before = self.alignment.state();
            self.alignment.initiate_alignment();
            self.note_alignment(before);
        }

        while let Some(event) = self.source.poll_event() {
            match event {
                SuitEvent::Status(half, command) => self.handle_status(half, command),
                SuitEvent::Frame(half, frame) => self.handle_frame(half, frame),
            }
        }
    }

    fn handle_status(&mut self, half: BodyHalf, command: InputCommand) {
        log::debug!("{} status: {:?}", half.device(), command);
        match command {
            InputCommand::DeviceConnected => self.set_state(half, DeviceState::Initializing),
            InputCommand::DeviceDisconnected => self.set_state(half, DeviceState::Disconnected),
            InputCommand::CalibrationStarted => self.set_state(half, DeviceState::Calibrating),
            InputCommand::CalibrationFinished => {
                // Disconnect logs the failure itself.
                let _ = self.disconnect();
            }
            InputCommand::ResetOrientation => self.reset_full_body_base_orientation(),
            InputCommand::ErrorCalibrationFailed => {
                self.raise_error(half, DeviceError::CalibrationFailed)
            }
            InputCommand::ErrorNoCalibration => self.raise_error(half, DeviceError::NoCalibration),
            InputCommand::ErrorNoShirtPants => {
                log::error!(
                    "Attempted to connect unknown device; update the {} firmware",
                    half.device()
                );
                self.raise_error(half, DeviceError::UnknownDevice);
            }
        }
    }

    fn handle_frame(&mut self, half: BodyHalf, frame: RawFrame) {
        match self.device_state(half) {
            DeviceState::Initializing if frame.is_initialized() => {
                self.set_state(half, DeviceState::Streaming);
                self.apply_angles(half, frame.angles);
                self.reset_full_body_base_orientation();
            }
            DeviceState::Streaming => self.apply_angles(half, frame.angles),
            state => log::trace!("Ignoring {} frame while {:?}", half, state),
        }
    }

    fn apply_angles(&mut self, half: BodyHalf, angles: LimbAngles<Vec3>) {
        if !self.absolute.set_half(half, angles) {
            return;
        }
        self.updates.push(SuitUpdate::AnglesChanged(half));

        let before = self.alignment.state();
        if let Err(e) = self.alignment.push_frame(half, &angles) {
            log::warn!("Skipping {} frame: {}", half, e);
            return;
        }
        self.note_alignment(before);

        if let Err(e) = self.alignment.sink_mut().update(half, &angles) {
            log::warn!("Could not update {} body: {}", half, e);
        }
    }

    fn raise_error(&mut self, half: BodyHalf, error: DeviceError) {
        self.set_state(half, DeviceState::Connected);
        log::error!("{} reported {:?}", half.device(), error);
        self.updates.push(SuitUpdate::Error(half, error));
    }

    fn set_state(&mut self, half: BodyHalf, state: DeviceState) {
        let slot = match half {
            BodyHalf::Upper => &mut self.shirt_state,
            BodyHalf::Lower => &mut self.pants_state,
        };
        if *slot == state {
            return;
        }
        let previous = std::mem::replace(slot, state);
        log::info!("{} {:?} -> {:?}", half.device(), previous, state);
        self.updates.push(SuitUpdate::DeviceState(
            half,
            StateChange {
                previous,
                current: state,
            },
        ));
    }

    fn note_alignment(&mut self, previous: AlignmentState) {
        let current = self.alignment.state();
        if current != previous {
            self.updates
                .push(SuitUpdate::Alignment(StateChange { previous, current }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AlignmentConfig;
    use crate::protocol::{encode_rpy_frame, parse_rpy_frame, FRAME_SIZE};
    use crate::types::Limb;
    use glam::Quat;
    use std::collections::VecDeque;
    use std::f32::consts::FRAC_PI_2;

    /// Event queue that also records control calls.
    #[derive(Default)]
    struct ScriptedSource {
        events: VecDeque<SuitEvent>,
        calls: Vec<String>,
    }

    impl SuitSource for ScriptedSource {
        fn poll_event(&mut self) -> Option<SuitEvent> {
            self.events.pop_front()
        }

        fn start_streaming(&mut self, device: EnfluxDevice) -> Result<()> {
            self.calls.push(format!("start {}", device));
            Ok(())
        }

        fn end_streaming(&mut self) -> Result<()> {
            self.calls.push("end".into());
            Ok(())
        }

        fn start_calibration(&mut self, device: EnfluxDevice) -> Result<()> {
            self.calls.push(format!("calibrate {}", device));
            Ok(())
        }
    }

    fn stance(yaw: f32) -> LimbAngles<Vec3> {
        LimbAngles {
            center: Vec3::new(0.0, 0.0, yaw),
            left_upper: Vec3::new(-FRAC_PI_2, 0.0, yaw),
            left_lower: Vec3::new(-FRAC_PI_2, 0.0, yaw),
            right_upper: Vec3::new(FRAC_PI_2, 0.0, yaw),
            right_lower: Vec3::new(FRAC_PI_2, 0.0, yaw),
        }
    }

    fn frame(yaw: f32) -> RawFrame {
        parse_rpy_frame(&encode_rpy_frame(&stance(yaw))).unwrap()
    }

    fn suit() -> EnfluxSuit<ScriptedSource> {
        EnfluxSuit::new(ScriptedSource::default(), SuitConfig::default())
    }

    fn push(suit: &mut EnfluxSuit<ScriptedSource>, event: SuitEvent) {
        suit.source_mut().events.push_back(event);
    }

    fn stream_half(suit: &mut EnfluxSuit<ScriptedSource>, half: BodyHalf, yaw: f32) {
        push(suit, SuitEvent::Status(half, InputCommand::DeviceConnected));
        push(suit, SuitEvent::Frame(half, frame(yaw)));
        suit.update(Instant::now());
    }

    #[test]
    fn test_connect_initialize_stream() {
        let mut suit = suit();
        push(&mut suit, SuitEvent::Status(BodyHalf::Upper, InputCommand::DeviceConnected));
        // An all-zero frame means the garment has not produced data yet.
        let empty = parse_rpy_frame(&[0u8; FRAME_SIZE]).unwrap();
        push(&mut suit, SuitEvent::Frame(BodyHalf::Upper, empty));
        suit.update(Instant::now());
        assert_eq!(suit.shirt_state(), DeviceState::Initializing);
        assert_eq!(
            suit.take_updates(),
            vec![SuitUpdate::DeviceState(
                BodyHalf::Upper,
                StateChange {
                    previous: DeviceState::Disconnected,
                    current: DeviceState::Initializing,
                },
            )]
        );

        push(&mut suit, SuitEvent::Frame(BodyHalf::Upper, frame(0.7)));
        suit.update(Instant::now());
        assert_eq!(suit.shirt_state(), DeviceState::Streaming);
        assert_eq!(suit.pants_state(), DeviceState::Disconnected);

        let updates = suit.take_updates();
        assert!(updates.contains(&SuitUpdate::AnglesChanged(BodyHalf::Upper)));
        assert!(updates.contains(&SuitUpdate::Notification(
            BodyHalf::Upper,
            DeviceNotification::ResetOrientation
        )));
        assert!(updates.contains(&SuitUpdate::Notification(
            BodyHalf::Lower,
            DeviceNotification::ResetOrientation
        )));

        // The first real frame becomes the base, so the chest faces forward.
        assert!((suit.base_orientation(BodyHalf::Upper).z - 0.7).abs() < 1e-3);
        let chest = suit.local_angles().get(Limb::Chest);
        assert!(chest.abs_diff_eq(Quat::IDENTITY, 1e-3) || chest.abs_diff_eq(-Quat::IDENTITY, 1e-3));
    }

    #[test]
    fn test_frames_ignored_unless_streaming() {
        let mut suit = suit();
        push(&mut suit, SuitEvent::Frame(BodyHalf::Lower, frame(0.2)));
        suit.update(Instant::now());
        assert!(suit.take_updates().is_empty());
        assert_eq!(suit.absolute_angles().waist(), Vec3::ZERO);
    }

    #[test]
    fn test_error_commands_raise_and_connect() {
        let mut suit = suit();
        stream_half(&mut suit, BodyHalf::Lower, 0.0);
        suit.take_updates();

        push(&mut suit, SuitEvent::Status(BodyHalf::Lower, InputCommand::ErrorNoCalibration));
        push(&mut suit, SuitEvent::Status(BodyHalf::Upper, InputCommand::ErrorNoShirtPants));
        suit.update(Instant::now());
        assert_eq!(suit.pants_state(), DeviceState::Connected);
        assert_eq!(suit.shirt_state(), DeviceState::Connected);

        let updates = suit.take_updates();
        assert!(updates.contains(&SuitUpdate::Error(BodyHalf::Lower, DeviceError::NoCalibration)));
        assert!(updates.contains(&SuitUpdate::Error(BodyHalf::Upper, DeviceError::UnknownDevice)));
    }

    #[test]
    fn test_calibration_finished_disconnects() {
        let mut suit = suit();
        stream_half(&mut suit, BodyHalf::Upper, 0.0);
        push(&mut suit, SuitEvent::Status(BodyHalf::Upper, InputCommand::CalibrationStarted));
        suit.update(Instant::now());
        assert_eq!(suit.shirt_state(), DeviceState::Calibrating);

        push(&mut suit, SuitEvent::Status(BodyHalf::Upper, InputCommand::CalibrationFinished));
        suit.update(Instant::now());
        assert_eq!(suit.shirt_state(), DeviceState::Disconnected);
        assert_eq!(suit.source().calls, vec!["end"]);
    }

    #[test]
    fn test_connect_policy() {
        let mut suit = suit();
        assert!(matches!(suit.connect(EnfluxDevice::empty()), Err(EnfluxError::NoDevice)));
        assert_eq!(suit.connect(EnfluxDevice::SHIRT).unwrap(), EnfluxDevice::SHIRT);

        stream_half(&mut suit, BodyHalf::Upper, 0.0);
        assert!(matches!(
            suit.connect(EnfluxDevice::SHIRT),
            Err(EnfluxError::AlreadyConnected(_))
        ));
        // Both requested while the shirt streams: only the pants are added.
        assert_eq!(suit.connect(EnfluxDevice::ALL).unwrap(), EnfluxDevice::PANTS);
        // Pants alone while the shirt streams: restart both together.
        assert_eq!(suit.connect(EnfluxDevice::PANTS).unwrap(), EnfluxDevice::ALL);
        assert_eq!(suit.shirt_state(), DeviceState::Disconnected);
        assert_eq!(
            suit.source().calls,
            vec!["start Shirt", "start Pants", "end", "start All"]
        );
    }

    #[test]
    fn test_disconnect_and_calibrate_guards() {
        let mut suit = suit();
        assert!(matches!(suit.disconnect(), Err(EnfluxError::NotConnected)));
        assert!(matches!(suit.calibrate(EnfluxDevice::empty()), Err(EnfluxError::NoDevice)));

        stream_half(&mut suit, BodyHalf::Lower, 0.0);
        assert!(matches!(
            suit.calibrate(EnfluxDevice::PANTS),
            Err(EnfluxError::MustDisconnect(_))
        ));
        assert!(suit.calibrate(EnfluxDevice::SHIRT).is_ok());

        suit.disconnect().unwrap();
        assert!(!suit.is_any_device_active());
        assert!(suit.calibrate(EnfluxDevice::ALL).is_ok());
        assert_eq!(
            suit.source().calls,
            vec!["calibrate Shirt", "end", "calibrate All"]
        );
    }

    #[test]
    fn test_countdown_then_alignment() {
        let config = SuitConfig::new(
            AlignmentConfig {
                sample_threshold: 5,
                max_error_rad: 0.26,
            },
            Duration::from_secs(1),
        );
        let mut suit = EnfluxSuit::new(ScriptedSource::default(), config);
        stream_half(&mut suit, BodyHalf::Upper, 0.3);
        stream_half(&mut suit, BodyHalf::Lower, 0.3);
        suit.take_updates();

        let t0 = Instant::now();
        assert!(suit.begin_alignment_countdown(t0));
        suit.update(t0);
        assert_eq!(suit.alignment().state(), AlignmentState::Unaligned);
        assert_eq!(
            suit.alignment_countdown_remaining(t0),
            Some(Duration::from_secs(1))
        );

        suit.update(t0 + Duration::from_secs(1));
        assert!(suit.alignment().is_aligning());
        assert!(!suit.begin_alignment_countdown(t0));

        // Identical frames do not change the angles, so vary the yaw slightly.
        for i in 1..=5 {
            let yaw = 0.3 + i as f32 * 0.001;
            push(&mut suit, SuitEvent::Frame(BodyHalf::Upper, frame(yaw)));
            push(&mut suit, SuitEvent::Frame(BodyHalf::Lower, frame(yaw)));
        }
        suit.update(t0 + Duration::from_secs(2));
        assert_eq!(suit.alignment().state(), AlignmentState::Aligned);

        let updates = suit.take_updates();
        assert!(updates.contains(&SuitUpdate::Alignment(StateChange {
            previous: AlignmentState::Unaligned,
            current: AlignmentState::InProgress,
        })));
        assert!(updates.contains(&SuitUpdate::Alignment(StateChange {
            previous: AlignmentState::InProgress,
            current: AlignmentState::Aligned,
        })));
        for half in BodyHalf::BOTH {
            assert!(suit.humanoid().alignment(half).error < 0.01);
        }
        // Corrected limbs line up with the chest heading.
        let arm = suit.local_angles().get(Limb::LeftUpperArm);
        assert!(arm.angle_between(Quat::IDENTITY) < 0.02);
    }

    #[test]
    fn test_cancel_pending_countdown() {
        let mut suit = suit();
        let t0 = Instant::now();
        assert!(!suit.cancel_alignment());
        suit.begin_alignment_countdown(t0);
        assert!(suit.cancel_alignment());
        suit.update(t0 + Duration::from_secs(10));
        assert_eq!(suit.alignment().state(), AlignmentState::Unaligned);
        assert!(suit.take_updates().is_empty());
    }
}
