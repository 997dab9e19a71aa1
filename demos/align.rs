//! Run a full suit alignment against a simulated driver and print the pose.
//!
//! Usage: cargo run --example align
//! Tune with ENFLUX_ALIGN_SAMPLES, ENFLUX_COUNTDOWN_MS, ENFLUX_POLL_INTERVAL_MS.

use std::collections::VecDeque;
use std::f32::consts::FRAC_PI_2;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use enflux::protocol::{encode_rpy_frame, CMD_DEVICE_CONNECTED, CMD_DEVICE_DISCONNECTED, FRAME_SIZE};
use enflux::{
    AlignmentState, BodyHalf, EnfluxDevice, EnfluxSuit, HidDriver, LimbAngles, StreamConfig,
    SuitConfig, SuitStream, SuitUpdate,
};
use glam::Vec3;

/// A wearer standing still in the alignment stance, facing `HEADING`, with a
/// little sensor noise.
struct SimulatedSuit {
    commands: Mutex<[VecDeque<i32>; 2]>,
    tick: AtomicU32,
}

const HEADING: f32 = 0.8;

impl SimulatedSuit {
    fn new() -> Self {
        Self {
            commands: Mutex::new(Default::default()),
            tick: AtomicU32::new(0),
        }
    }

    fn queue(&self, device: EnfluxDevice, code: i32) {
        if let Ok(mut commands) = self.commands.lock() {
            for half in BodyHalf::BOTH {
                if device.contains(half.device()) {
                    commands[half as usize].push_back(code);
                }
            }
        }
    }
}

impl HidDriver for SimulatedSuit {
    fn start_streaming(&self, device: EnfluxDevice) -> enflux::Result<()> {
        self.queue(device, CMD_DEVICE_CONNECTED);
        Ok(())
    }

    fn end_streaming(&self) -> enflux::Result<()> {
        self.queue(EnfluxDevice::ALL, CMD_DEVICE_DISCONNECTED);
        Ok(())
    }

    fn start_calibration(&self, _device: EnfluxDevice) -> enflux::Result<()> {
        Ok(())
    }

    fn pop_command(&self, half: BodyHalf) -> Option<i32> {
        self.commands.lock().ok()?[half as usize].pop_front()
    }

    fn load_rotations(&self, _half: BodyHalf, buf: &mut [u8; FRAME_SIZE]) -> bool {
        let tick = self.tick.fetch_add(1, Ordering::Relaxed);
        let noise = ((tick % 7) as f32 - 3.0) * 0.002;
        let yaw = HEADING + noise;
        let angles = LimbAngles {
            center: Vec3::new(0.0, noise, yaw),
            left_upper: Vec3::new(-FRAC_PI_2, 0.0, yaw),
            left_lower: Vec3::new(-FRAC_PI_2, noise, yaw),
            right_upper: Vec3::new(FRAC_PI_2, 0.0, yaw),
            right_lower: Vec3::new(FRAC_PI_2, -noise, yaw),
        };
        *buf = encode_rpy_frame(&angles);
        true
    }
}

fn main() {
    env_logger::init();

    let driver = Arc::new(SimulatedSuit::new());
    let stream = match SuitStream::start(driver, StreamConfig::from_env()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to start stream: {}", e);
            std::process::exit(1);
        }
    };

    let mut suit = EnfluxSuit::new(stream, SuitConfig::from_env());
    if let Err(e) = suit.connect(EnfluxDevice::ALL) {
        eprintln!("Failed to connect: {}", e);
        std::process::exit(1);
    }

    let start = Instant::now();
    let mut countdown_started = false;
    let mut last_report = Instant::now();

    loop {
        let now = Instant::now();
        suit.update(now);

        for update in suit.take_updates() {
            match update {
                SuitUpdate::AnglesChanged(_) => {}
                other => println!("{:?}", other),
            }
        }

        let streaming = BodyHalf::BOTH
            .iter()
            .all(|&half| suit.device_state(half) == enflux::DeviceState::Streaming);
        if streaming && !countdown_started {
            println!("Hold the stance...");
            suit.begin_alignment_countdown(now);
            countdown_started = true;
        }

        if now.duration_since(last_report) >= Duration::from_millis(500) {
            if let Some(left) = suit.alignment_countdown_remaining(now) {
                println!("Aligning in {:.1}s", left.as_secs_f32());
            } else if suit.alignment().is_aligning() {
                println!("Progress: {:.0}%", suit.alignment().progress() * 100.0);
            }
            last_report = now;
        }

        match suit.alignment().state() {
            AlignmentState::Aligned | AlignmentState::ErrorAligning => break,
            _ => {}
        }
        if start.elapsed() > Duration::from_secs(60) {
            eprintln!("Gave up waiting for alignment");
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    println!(
        "\nState: {:?}  residual error: {:.4} rad",
        suit.alignment().state(),
        suit.alignment().last_error().unwrap_or(0.0)
    );
    println!("Local angles: {}", suit.local_angles());

    suit.shutdown();
}
