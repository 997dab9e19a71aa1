use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use crate::config::StreamConfig;
use crate::protocol::{self, RawFrame, FRAME_SIZE};
use crate::types::{BodyHalf, EnfluxDevice, InputCommand};
use crate::{EnfluxError, Result};

/// The native suit driver, treated as a black box.
///
/// Implementations wrap the vendor's pull API. Every call must be safe to
/// make from the polling thread while the owner issues control calls.
pub trait HidDriver: Send + Sync {
    fn start_streaming(&self, device: EnfluxDevice) -> Result<()>;
    fn end_streaming(&self) -> Result<()>;
    fn start_calibration(&self, device: EnfluxDevice) -> Result<()>;
    /// Next pending status code for a garment, if any.
    fn pop_command(&self, half: BodyHalf) -> Option<i32>;
    /// Copy the latest RPY frame into `buf`. Returns false when no new data.
    fn load_rotations(&self, half: BodyHalf, buf: &mut [u8; FRAME_SIZE]) -> bool;
}

/// Something the driver reported for one garment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SuitEvent {
    Status(BodyHalf, InputCommand),
    Frame(BodyHalf, RawFrame),
}

/// Where a suit manager pulls events from and sends control requests to.
///
/// The control methods default to no-ops so recorded or synthetic sources
/// only need to provide events.
pub trait SuitSource {
    fn poll_event(&mut self) -> Option<SuitEvent>;

    fn start_streaming(&mut self, _device: EnfluxDevice) -> Result<()> {
        Ok(())
    }

    fn end_streaming(&mut self) -> Result<()> {
        Ok(())
    }

    fn start_calibration(&mut self, _device: EnfluxDevice) -> Result<()> {
        Ok(())
    }
}

impl SuitSource for VecDeque<SuitEvent> {
    fn poll_event(&mut self) -> Option<SuitEvent> {
        self.pop_front()
    }
}

/// Handle to a running driver poll loop.
///
/// A background thread drains status codes and RPY frames from the driver and
/// forwards them as [`SuitEvent`]s over a bounded channel. Frames are dropped
/// while the channel is full; status events wait for room.
pub struct SuitStream {
    driver: Arc<dyn HidDriver>,
    receiver: Receiver<SuitEvent>,
    stop_flag: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl SuitStream {
    /// Spawn the polling thread.
    pub fn start(driver: Arc<dyn HidDriver>, config: StreamConfig) -> Result<SuitStream> {
        let (sender, receiver) = crossbeam_channel::bounded(config.channel_capacity.max(1));
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_clone = stop_flag.clone();
        let driver_clone = driver.clone();
        let interval = config.poll_interval;

        let thread = std::thread::Builder::new()
            .name("enflux-poll".into())
            .spawn(move || {
                poll_loop(driver_clone, sender, stop_clone, interval);
            })
            .map_err(|e| EnfluxError::Driver(format!("Failed to spawn poll thread: {}", e)))?;

        Ok(SuitStream {
            driver,
            receiver,
            stop_flag,
            thread: Some(thread),
        })
    }

    /// Receive the next event (blocks until available).
    pub fn recv(&self) -> Result<SuitEvent> {
        self.receiver.recv().map_err(|_| EnfluxError::StreamStopped)
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&self) -> Option<SuitEvent> {
        self.receiver.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<SuitEvent> {
        self.receiver.recv_timeout(timeout).map_err(|e| match e {
            crossbeam_channel::RecvTimeoutError::Timeout => EnfluxError::Timeout,
            crossbeam_channel::RecvTimeoutError::Disconnected => EnfluxError::StreamStopped,
        })
    }

    pub fn is_active(&self) -> bool {
        !self.stop_flag.load(Ordering::Relaxed)
    }

    /// Stop polling and wait for the thread to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for SuitStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl SuitSource for SuitStream {
    fn poll_event(&mut self) -> Option<SuitEvent> {
        self.try_recv()
    }

    fn start_streaming(&mut self, device: EnfluxDevice) -> Result<()> {
        self.driver.start_streaming(device)
    }

    fn end_streaming(&mut self) -> Result<()> {
        self.driver.end_streaming()
    }

    fn start_calibration(&mut self, device: EnfluxDevice) -> Result<()> {
        self.driver.start_calibration(device)
    }
}

/// Runs on the poll thread. Frames are only read for garments whose last
/// status was DeviceConnected.
fn poll_loop(
    driver: Arc<dyn HidDriver>,
    sender: Sender<SuitEvent>,
    stop_flag: Arc<AtomicBool>,
    interval: Duration,
) {
    let mut connected = [false; 2];
    let mut buf = [0u8; FRAME_SIZE];

    log::info!("Suit poll loop started");

    loop {
        if stop_flag.load(Ordering::Relaxed) {
            log::info!("Suit poll loop stopping (stop flag set)");
            break;
        }

        for half in BodyHalf::BOTH {
            let index = half as usize;

            while let Some(code) = driver.pop_command(half) {
                let command = match InputCommand::from_code(code) {
                    Ok(command) => command,
                    Err(e) => {
                        log::warn!("Ignoring {} garment status: {}", half, e);
                        continue;
                    }
                };
                match command {
                    InputCommand::DeviceConnected => connected[index] = true,
                    InputCommand::DeviceDisconnected => connected[index] = false,
                    _ => {}
                }
                if !deliver(&sender, SuitEvent::Status(half, command), &stop_flag, interval) {
                    return;
                }
            }

            if connected[index] && driver.load_rotations(half, &mut buf) {
                match protocol::parse_rpy_frame(&buf) {
                    Ok(frame) => {
                        if !forward(&sender, SuitEvent::Frame(half, frame)) {
                            return;
                        }
                    }
                    Err(e) => log::warn!("Dropping {} frame: {}", half, e),
                }
            }
        }

        std::thread::sleep(interval);
    }
}

/// Blocks until a status event is queued, so a full channel of frames cannot
/// swallow a connect or disconnect. Returns false once the consumer is gone or
/// the stream is stopping.
fn deliver(
    sender: &Sender<SuitEvent>,
    mut event: SuitEvent,
    stop_flag: &AtomicBool,
    interval: Duration,
) -> bool {
    let wait = interval.max(Duration::from_millis(1));
    loop {
        match sender.send_timeout(event, wait) {
            Ok(()) => return true,
            Err(crossbeam_channel::SendTimeoutError::Timeout(pending)) => {
                if stop_flag.load(Ordering::Relaxed) {
                    log::info!("Suit poll loop stopping with status undelivered");
                    return false;
                }
                log::trace!("Suit channel full, waiting to deliver status");
                event = pending;
            }
            Err(crossbeam_channel::SendTimeoutError::Disconnected(_)) => {
                log::info!("Suit channel disconnected, stopping poll loop");
                return false;
            }
        }
    }
}

/// Frames are lossy: when the consumer lags the newest ones are dropped.
/// Returns false once the consumer is gone.
fn forward(sender: &Sender<SuitEvent>, event: SuitEvent) -> bool {
    match sender.try_send(event) {
        Ok(()) => true,
        Err(crossbeam_channel::TrySendError::Full(_)) => {
            log::trace!("Suit channel full, dropping event");
            true
        }
        Err(crossbeam_channel::TrySendError::Disconnected(_)) => {
            log::info!("Suit channel disconnected, stopping poll loop");
            false
        }
    }
}
