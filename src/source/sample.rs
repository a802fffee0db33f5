//! Raw samples produced by sources.

use std::sync::Arc;

use image::GrayImage;

use crate::geometry::CameraIntrinsics;

/// One frame from a source: image, capture time and sensor intrinsics.
///
/// The image is reference-counted so the session can hand the same sample
/// to several trackers (and keep it as the "last sample") without copies.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Monotonic sequence number within the producing source.
    pub seq: u64,
    /// Capture timestamp in nanoseconds, relative to the source's own clock.
    pub timestamp_ns: u64,
    pub image: Arc<GrayImage>,
    pub intrinsics: CameraIntrinsics,
}

impl Sample {
    pub fn new(seq: u64, timestamp_ns: u64, image: GrayImage, intrinsics: CameraIntrinsics) -> Self {
        Self {
            seq,
            timestamp_ns,
            image: Arc::new(image),
            intrinsics,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}
