//! Video source: plays back a finite recorded sequence.
//!
//! Frames come either from memory or from a frame list on disk (decoded
//! lazily, one per poll). With [`Playback::Realtime`] frames are released
//! when their relative timestamp is reached; if the consumer falls behind,
//! intermediate frames are skipped so only the newest due frame is returned.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Result, bail};
use image::GrayImage;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::geometry::CameraIntrinsics;
use crate::io::frame_list::{FrameEntry, load_frame_list, load_gray_image};

use super::{Sample, SamplePoll, Source, SourceKind};

/// Field of view assumed for recordings without calibration.
const DEFAULT_VIDEO_FOV_DEG: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Playback {
    /// One new frame per poll.
    #[default]
    EveryTick,
    /// Frames follow their recorded timestamps on the wall clock.
    Realtime,
}

enum Media {
    Memory(Vec<(u64, Arc<GrayImage>)>),
    FrameList {
        list: PathBuf,
        image_dir: Option<PathBuf>,
        entries: Vec<FrameEntry>,
    },
}

impl Media {
    fn len(&self) -> usize {
        match self {
            Media::Memory(frames) => frames.len(),
            Media::FrameList { entries, .. } => entries.len(),
        }
    }

    fn timestamp(&self, idx: usize) -> u64 {
        match self {
            Media::Memory(frames) => frames[idx].0,
            Media::FrameList { entries, .. } => entries[idx].timestamp_ns,
        }
    }

    fn image(&self, idx: usize) -> Result<Arc<GrayImage>> {
        match self {
            Media::Memory(frames) => Ok(frames[idx].1.clone()),
            Media::FrameList { entries, .. } => Ok(Arc::new(load_gray_image(&entries[idx].path)?)),
        }
    }
}

pub struct Video {
    media: Media,
    playback: Playback,
    intrinsics: Option<CameraIntrinsics>,
    /// `[fx, fy, cx, cy]` in pixels of the recorded frames; sized at open.
    pinhole: Option<[f64; 4]>,
    cursor: usize,
    started: Option<Instant>,
    opened: bool,
    closed: bool,
    skipped: u64,
}

impl Video {
    /// In-memory recording of `(timestamp_ns, image)` pairs.
    pub fn from_frames(frames: Vec<(u64, GrayImage)>) -> Self {
        let mut frames: Vec<_> = frames.into_iter().map(|(t, img)| (t, Arc::new(img))).collect();
        frames.sort_by_key(|(t, _)| *t);
        Self::with_media(Media::Memory(frames))
    }

    /// Recording described by a `timestamp_ns,filename` list. Read on `open()`.
    pub fn from_frame_list(list: impl Into<PathBuf>, image_dir: Option<PathBuf>) -> Self {
        Self::with_media(Media::FrameList {
            list: list.into(),
            image_dir,
            entries: Vec::new(),
        })
    }

    fn with_media(media: Media) -> Self {
        Self {
            media,
            playback: Playback::EveryTick,
            intrinsics: None,
            pinhole: None,
            cursor: 0,
            started: None,
            opened: false,
            closed: false,
            skipped: 0,
        }
    }

    pub fn with_playback(mut self, playback: Playback) -> Self {
        self.playback = playback;
        self
    }

    pub fn with_intrinsics(mut self, intrinsics: CameraIntrinsics) -> Self {
        self.intrinsics = Some(intrinsics);
        self
    }

    /// Calibration without a known frame size. Ignored when full intrinsics are set.
    pub fn with_pinhole(mut self, fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        self.pinhole = Some([fx, fy, cx, cy]);
        self
    }

    pub fn len(&self) -> usize {
        self.media.len()
    }

    pub fn is_empty(&self) -> bool {
        self.media.len() == 0
    }

    /// Index of the next frame to release under the current playback mode.
    fn next_index(&self) -> Option<usize> {
        if self.cursor >= self.media.len() {
            return None;
        }
        match self.playback {
            Playback::EveryTick => Some(self.cursor),
            Playback::Realtime => {
                let elapsed = self.started.map(|s| s.elapsed().as_nanos() as u64).unwrap_or(0);
                let t0 = self.media.timestamp(0);
                (self.cursor..self.media.len())
                    .take_while(|&i| self.media.timestamp(i) - t0 <= elapsed)
                    .last()
            }
        }
    }
}

impl Source for Video {
    fn kind(&self) -> SourceKind {
        SourceKind::Video
    }

    fn open(&mut self) -> Result<()> {
        if self.opened {
            bail!("video stream cannot be restarted");
        }
        if let Media::FrameList {
            list,
            image_dir,
            entries,
        } = &mut self.media
        {
            *entries = load_frame_list(list.as_path(), image_dir.as_deref())?;
        }
        if self.is_empty() {
            bail!("video has no frames");
        }

        // Decode the first frame up front so a broken recording fails at start.
        let first = self.media.image(0)?;
        let (width, height) = first.dimensions();
        let intrinsics = match (self.intrinsics, self.pinhole) {
            (Some(k), _) if k.width == width && k.height == height => k,
            (Some(k), _) => {
                debug!("video: scaling {}x{} intrinsics to {}x{}", k.width, k.height, width, height);
                k.scaled_to(width, height)
            }
            (None, Some([fx, fy, cx, cy])) => CameraIntrinsics {
                fx,
                fy,
                cx,
                cy,
                width,
                height,
            },
            (None, None) => {
                CameraIntrinsics::from_fov(width, height, DEFAULT_VIDEO_FOV_DEG.to_radians())
            }
        };
        self.intrinsics = Some(intrinsics);

        self.opened = true;
        self.started = Some(Instant::now());
        info!("video: opened {} frames ({:?})", self.media.len(), self.playback);
        Ok(())
    }

    fn poll(&mut self) -> SamplePoll {
        if !self.opened {
            return SamplePoll::Pending;
        }
        if self.closed || self.cursor >= self.media.len() {
            return SamplePoll::Ended;
        }
        let Some(idx) = self.next_index() else {
            return SamplePoll::Pending;
        };
        if idx > self.cursor {
            self.skipped += (idx - self.cursor) as u64;
            debug!("video: skipped {} late frames", idx - self.cursor);
        }
        self.cursor = idx + 1;

        let Some(intrinsics) = self.intrinsics else {
            return SamplePoll::Pending;
        };
        match self.media.image(idx) {
            Ok(image) => SamplePoll::Ready(Sample {
                seq: idx as u64,
                timestamp_ns: self.media.timestamp(idx),
                image,
                intrinsics,
            }),
            Err(e) => {
                warn!("video: frame {} unreadable, skipping: {:#}", idx, e);
                SamplePoll::Pending
            }
        }
    }

    fn close(&mut self) {
        if self.opened && !self.closed {
            info!("video: closed at frame {}/{}", self.cursor, self.media.len());
        }
        self.closed = true;
    }

    fn intrinsics(&self) -> Option<CameraIntrinsics> {
        self.intrinsics
    }

    fn dropped_samples(&self) -> u64 {
        self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(n: u64) -> Vec<(u64, GrayImage)> {
        (0..n)
            .map(|i| (i * 33_000_000, GrayImage::from_pixel(32, 24, image::Luma([i as u8]))))
            .collect()
    }

    #[test]
    fn test_every_tick_plays_then_ends() {
        let mut video = Video::from_frames(frames(3));
        assert!(matches!(video.poll(), SamplePoll::Pending));
        video.open().unwrap();

        let seqs: Vec<u64> = (0..3)
            .map(|_| match video.poll() {
                SamplePoll::Ready(s) => s.seq,
                other => panic!("expected sample, got {:?}", other),
            })
            .collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert!(matches!(video.poll(), SamplePoll::Ended));
        assert!(matches!(video.poll(), SamplePoll::Ended));
    }

    #[test]
    fn test_default_intrinsics_from_first_frame() {
        let mut video = Video::from_frames(frames(1));
        video.open().unwrap();
        let k = video.intrinsics().unwrap();
        assert_eq!((k.width, k.height), (32, 24));
    }

    #[test]
    fn test_pinhole_sized_by_first_frame() {
        let mut video = Video::from_frames(frames(2)).with_pinhole(40.0, 41.0, 16.0, 12.0);
        video.open().unwrap();
        let k = video.intrinsics().unwrap();
        assert_eq!((k.fx, k.fy, k.cx, k.cy), (40.0, 41.0, 16.0, 12.0));
        assert_eq!((k.width, k.height), (32, 24));
    }

    #[test]
    fn test_intrinsics_scaled_to_frame_size() {
        let calibrated = CameraIntrinsics {
            fx: 80.0,
            fy: 80.0,
            cx: 32.0,
            cy: 24.0,
            width: 64,
            height: 48,
        };
        let mut video = Video::from_frames(frames(1))
            .with_intrinsics(calibrated)
            .with_pinhole(1.0, 1.0, 1.0, 1.0);
        video.open().unwrap();
        let k = video.intrinsics().unwrap();
        assert_eq!((k.fx, k.cx, k.width, k.height), (40.0, 16.0, 32, 24));
    }

    #[test]
    fn test_empty_video_is_unavailable() {
        let mut video = Video::from_frames(Vec::new());
        assert!(video.open().is_err());
    }

    #[test]
    fn test_realtime_releases_only_due_frames() {
        // Second frame is an hour in, so only the first one is due right away.
        let mut video = Video::from_frames(vec![
            (0, GrayImage::new(4, 4)),
            (3_600_000_000_000, GrayImage::new(4, 4)),
        ])
        .with_playback(Playback::Realtime);
        video.open().unwrap();

        assert!(matches!(video.poll(), SamplePoll::Ready(ref s) if s.seq == 0));
        assert!(matches!(video.poll(), SamplePoll::Pending));
    }

    #[test]
    fn test_frame_list_video() {
        let dir = tempfile::tempdir().unwrap();
        for (i, name) in ["f0.png", "f1.png"].iter().enumerate() {
            GrayImage::from_pixel(16, 16, image::Luma([i as u8 * 100]))
                .save(dir.path().join(name))
                .unwrap();
        }
        let list = dir.path().join("frames.csv");
        std::fs::write(&list, "0,f0.png\n1000,f1.png\n").unwrap();

        let mut video = Video::from_frame_list(&list, None);
        video.open().unwrap();
        assert_eq!(video.len(), 2);
        match video.poll() {
            SamplePoll::Ready(s) => assert_eq!(s.image.get_pixel(0, 0).0[0], 0),
            other => panic!("expected sample, got {:?}", other),
        }
        match video.poll() {
            SamplePoll::Ready(s) => assert_eq!(s.timestamp_ns, 1000),
            other => panic!("expected sample, got {:?}", other),
        }
    }

    #[test]
    fn test_closed_video_ends() {
        let mut video = Video::from_frames(frames(5));
        video.open().unwrap();
        video.close();
        assert!(matches!(video.poll(), SamplePoll::Ended));
        assert!(video.open().is_err());
    }
}
