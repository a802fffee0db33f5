//! Sources: providers of raw frames.
//!
//! A [`Source`] is opened once when the session starts, polled without
//! blocking once per tick, and closed when the session ends. Sources never
//! queue more than one outstanding sample (see [`slot::LatestSlot`]).

pub mod camera;
pub mod sample;
pub mod slot;
pub mod video;

pub use camera::{Camera, CameraConfig, CaptureDevice, Facing, Resolution, TestPatternDevice};
pub use sample::Sample;
pub use slot::LatestSlot;
pub use video::{Playback, Video};

use crate::geometry::CameraIntrinsics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Camera,
    Video,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Camera => write!(f, "camera"),
            SourceKind::Video => write!(f, "video"),
        }
    }
}

/// Outcome of a non-blocking poll.
#[derive(Debug)]
pub enum SamplePoll {
    /// A sample newer than the previously returned one.
    Ready(Sample),
    /// Nothing new yet.
    Pending,
    /// The stream is over (finite media, or the device went away).
    Ended,
}

/// Capability interface for frame providers.
pub trait Source: Send {
    fn kind(&self) -> SourceKind;

    /// Acquire the device or stream. A source can be opened only once.
    fn open(&mut self) -> anyhow::Result<()>;

    /// Return the newest unseen sample without blocking.
    fn poll(&mut self) -> SamplePoll;

    /// Release the device. Idempotent.
    fn close(&mut self);

    /// Intrinsics of the produced samples, known once opened.
    fn intrinsics(&self) -> Option<CameraIntrinsics>;

    /// Samples replaced before anyone consumed them.
    fn dropped_samples(&self) -> u64 {
        0
    }
}
