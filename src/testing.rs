//! Test doubles shared by unit tests.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{Result, bail};
use image::GrayImage;
use nalgebra::Vector3;
use parking_lot::Mutex;

use crate::geometry::{CameraIntrinsics, Pose};
use crate::source::{Sample, Video};
use crate::tracker::{Detection, DetectionBackend, ReferenceTarget};

/// Controls what a [`SceneBackend`] "sees".
#[derive(Clone, Default)]
pub struct Scene {
    visible: Arc<Mutex<HashSet<usize>>>,
    failing: Arc<AtomicBool>,
    panicking: Arc<AtomicBool>,
    detect_calls: Arc<AtomicUsize>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&self, target: usize) {
        self.visible.lock().insert(target);
    }

    pub fn hide(&self, target: usize) {
        self.visible.lock().remove(&target);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_panicking(&self, panicking: bool) {
        self.panicking.store(panicking, Ordering::SeqCst);
    }

    pub fn detect_calls(&self) -> usize {
        self.detect_calls.load(Ordering::SeqCst)
    }

    pub fn backend(&self) -> SceneBackend {
        SceneBackend {
            scene: self.clone(),
            trained: 0,
        }
    }
}

/// Backend whose detections are scripted through a [`Scene`].
pub struct SceneBackend {
    scene: Scene,
    trained: usize,
}

impl DetectionBackend for SceneBackend {
    fn train(&mut self, targets: &[ReferenceTarget]) -> Result<()> {
        self.trained = targets.len();
        Ok(())
    }

    fn detect(&mut self, _sample: &Sample) -> Result<Vec<Detection>> {
        self.scene.detect_calls.fetch_add(1, Ordering::SeqCst);
        if self.scene.panicking.load(Ordering::SeqCst) {
            panic!("scripted detector panic");
        }
        if self.scene.failing.load(Ordering::SeqCst) {
            bail!("scripted detector failure");
        }
        let mut visible: Vec<usize> = self.scene.visible.lock().iter().copied().collect();
        visible.sort_unstable();
        Ok(visible
            .into_iter()
            .filter(|&t| t < self.trained)
            .map(|target| Detection {
                target,
                pose: Pose::from_translation(Vector3::new(0.0, 0.0, -1.0 - target as f64)),
                confidence: 0.95,
            })
            .collect())
    }
}

pub fn target(name: &str) -> ReferenceTarget {
    ReferenceTarget::new(name, GrayImage::new(32, 32))
}

pub fn sample(seq: u64) -> Sample {
    Sample::new(
        seq,
        seq * 33_000_000,
        GrayImage::new(64, 48),
        CameraIntrinsics::from_fov(64, 48, 1.0),
    )
}

/// Short in-memory recording with `n` blank frames.
pub fn video(n: u64) -> Video {
    Video::from_frames(
        (0..n)
            .map(|i| (i * 33_000_000, GrayImage::new(64, 48)))
            .collect(),
    )
}
