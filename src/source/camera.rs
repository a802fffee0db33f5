//! Camera source: live frames from a capture device on a dedicated thread.
//!
//! The capture thread grabs frames at the configured rate and publishes them
//! into a [`LatestSlot`]; the session tick takes the newest one. The thread
//! runs until `close()` raises the stop flag, then releases the device.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use image::GrayImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::geometry::CameraIntrinsics;

use super::{LatestSlot, Sample, SamplePoll, Source, SourceKind};

/// Consecutive grab failures after which the capture thread gives up.
const MAX_GRAB_FAILURES: u32 = 30;

/// Capture resolution presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Sm,
    Md,
    Lg,
    Xl,
}

impl Resolution {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Resolution::Sm => (320, 240),
            Resolution::Md => (640, 480),
            Resolution::Lg => (1280, 720),
            Resolution::Xl => (1920, 1080),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    Environment,
    User,
}

#[derive(Debug, Clone)]
pub struct CameraConfig {
    pub resolution: Resolution,
    pub fps: f64,
    pub facing: Facing,
    /// Vertical field of view (radians) assumed when no calibration is given.
    pub fov_y: f64,
    /// Calibrated intrinsics at the capture resolution, if known.
    pub intrinsics: Option<CameraIntrinsics>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::Md,
            fps: 30.0,
            facing: Facing::Environment,
            fov_y: 60f64.to_radians(),
            intrinsics: None,
        }
    }
}

/// Platform capture backend.
pub trait CaptureDevice: Send {
    /// Acquire the device. Returns the actual capture size, which may differ
    /// from the requested one.
    fn open(&mut self, width: u32, height: u32, fps: f64) -> Result<(u32, u32)>;

    /// Grab the next frame, blocking for at most one frame interval.
    fn grab(&mut self) -> Result<GrayImage>;

    fn close(&mut self);
}

/// Synthetic device: a drifting diagonal gradient with seeded sensor noise.
pub struct TestPatternDevice {
    width: u32,
    height: u32,
    frame: u64,
    noise: u8,
    rng: StdRng,
}

impl TestPatternDevice {
    pub fn new(seed: u64) -> Self {
        Self {
            width: 0,
            height: 0,
            frame: 0,
            noise: 6,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn with_noise(mut self, amplitude: u8) -> Self {
        self.noise = amplitude;
        self
    }
}

impl CaptureDevice for TestPatternDevice {
    fn open(&mut self, width: u32, height: u32, _fps: f64) -> Result<(u32, u32)> {
        if width == 0 || height == 0 {
            bail!("requested capture size {}x{} is empty", width, height);
        }
        self.width = width;
        self.height = height;
        Ok((width, height))
    }

    fn grab(&mut self) -> Result<GrayImage> {
        let shift = (self.frame * 2) as u32;
        self.frame += 1;
        let noise = self.noise as i16;
        let rng = &mut self.rng;
        Ok(GrayImage::from_fn(self.width, self.height, |x, y| {
            let base = ((x + y + shift) % 256) as i16;
            let jitter = if noise > 0 { rng.gen_range(-noise..=noise) } else { 0 };
            image::Luma([(base + jitter).clamp(0, 255) as u8])
        }))
    }

    fn close(&mut self) {}
}

/// Live camera source.
pub struct Camera {
    config: CameraConfig,
    device: Option<Box<dyn CaptureDevice>>,
    slot: Arc<LatestSlot>,
    stop: Arc<AtomicBool>,
    capture_handle: Option<JoinHandle<()>>,
    intrinsics: Option<CameraIntrinsics>,
    opened: bool,
}

impl Camera {
    pub fn new(config: CameraConfig, device: Box<dyn CaptureDevice>) -> Self {
        Self {
            config,
            device: Some(device),
            slot: Arc::new(LatestSlot::new()),
            stop: Arc::new(AtomicBool::new(false)),
            capture_handle: None,
            intrinsics: None,
            opened: false,
        }
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    fn spawn_capture(
        mut device: Box<dyn CaptureDevice>,
        slot: Arc<LatestSlot>,
        stop: Arc<AtomicBool>,
        intrinsics: CameraIntrinsics,
        fps: f64,
    ) -> Result<JoinHandle<()>> {
        let interval = Duration::from_secs_f64(1.0 / fps.max(1.0));
        thread::Builder::new()
            .name("ar-camera-capture".into())
            .spawn(move || {
                let started = Instant::now();
                let mut seq = 0u64;
                let mut failures = 0u32;
                while !stop.load(Ordering::SeqCst) {
                    let tick_start = Instant::now();
                    match device.grab() {
                        Ok(image) => {
                            failures = 0;
                            let ts = started.elapsed().as_nanos() as u64;
                            if slot.publish(Sample::new(seq, ts, image, intrinsics)) {
                                debug!("camera: sample {} replaced an unconsumed one", seq);
                            }
                            seq += 1;
                        }
                        Err(e) => {
                            failures += 1;
                            warn!("camera: grab failed ({}/{}): {:#}", failures, MAX_GRAB_FAILURES, e);
                            if failures >= MAX_GRAB_FAILURES {
                                break;
                            }
                        }
                    }
                    if let Some(rest) = interval.checked_sub(tick_start.elapsed()) {
                        thread::sleep(rest);
                    }
                }
                device.close();
                slot.close();
            })
            .context("failed to spawn camera capture thread")
    }
}

impl Source for Camera {
    fn kind(&self) -> SourceKind {
        SourceKind::Camera
    }

    fn open(&mut self) -> Result<()> {
        if self.opened {
            bail!("camera stream cannot be restarted");
        }
        let mut device = self
            .device
            .take()
            .context("camera device already consumed")?;
        let (w, h) = self.config.resolution.dimensions();
        let (width, height) = device
            .open(w, h, self.config.fps)
            .context("camera device could not be opened")?;

        let intrinsics = match self.config.intrinsics {
            Some(k) if k.width == width && k.height == height => k,
            Some(k) => k.scaled_to(width, height),
            None => CameraIntrinsics::from_fov(width, height, self.config.fov_y),
        };
        self.intrinsics = Some(intrinsics);

        let handle = Self::spawn_capture(
            device,
            self.slot.clone(),
            self.stop.clone(),
            intrinsics,
            self.config.fps,
        )?;
        self.capture_handle = Some(handle);
        self.opened = true;
        info!(
            "camera: opened {}x{} @ {:.0} fps ({:?})",
            width, height, self.config.fps, self.config.facing
        );
        Ok(())
    }

    fn poll(&mut self) -> SamplePoll {
        if !self.opened {
            return SamplePoll::Pending;
        }
        match self.slot.take() {
            Some(sample) => SamplePoll::Ready(sample),
            None if self.slot.is_closed() => SamplePoll::Ended,
            None => SamplePoll::Pending,
        }
    }

    fn close(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.capture_handle.take() {
            if handle.join().is_err() {
                warn!("camera: capture thread panicked");
            }
            info!("camera: closed ({} samples dropped)", self.slot.dropped());
        }
    }

    fn intrinsics(&self) -> Option<CameraIntrinsics> {
        self.intrinsics
    }

    fn dropped_samples(&self) -> u64 {
        self.slot.dropped()
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        self.close();
    }
}
