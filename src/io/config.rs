//! YAML session configuration for the `ar-runtime` binary.
//!
//! ```yaml
//! mode: immersive
//! fps: 30
//! stats: true
//! surface: { label: canvas, width: 1280, height: 720 }
//! style: best-fit
//! tracking: { loss_threshold: 2, grace_window: 10 }
//! detection: { execution: background, min_score: 0.9 }
//! source:
//!   video: { frames: frames.csv, playback: realtime }
//! targets:
//!   - { name: poster, image: targets/poster.png, physical_width: 0.42 }
//! ```
//!
//! Relative paths are resolved against the directory of the config file.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::session::{SessionMode, options::DEFAULT_FPS};
use crate::source::{CameraConfig, Facing, Playback, Resolution};
use crate::tracker::signature::DEFAULT_MIN_SCORE;
use crate::tracker::{Execution, ReferenceTarget, TrackingPolicy};
use crate::viewport::{Dimensions, Surface, ViewportConfig, ViewportStyle};

use super::frame_list::load_gray_image;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    #[serde(default)]
    pub mode: SessionMode,
    #[serde(default = "default_fps")]
    pub fps: f64,
    #[serde(default)]
    pub stats: bool,
    #[serde(default)]
    pub gizmos: bool,
    pub surface: SurfaceConfig,
    #[serde(default)]
    pub style: ViewportStyle,
    #[serde(default)]
    pub tracking: TrackingPolicy,
    #[serde(default)]
    pub detection: DetectionConfig,
    pub source: SourceConfig,
    pub targets: Vec<TargetConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SurfaceConfig {
    #[serde(default = "default_surface_label")]
    pub label: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub execution: Execution,
    pub min_score: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            execution: Execution::default(),
            min_score: DEFAULT_MIN_SCORE,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceConfig {
    /// Recorded frames listed in a `timestamp_ns,filename` CSV.
    Video {
        frames: PathBuf,
        #[serde(default)]
        image_dir: Option<PathBuf>,
        #[serde(default)]
        playback: Playback,
        /// [fx, fy, cx, cy] at the recorded resolution.
        #[serde(default)]
        intrinsics: Option<Vec<f64>>,
    },
    /// Synthetic camera; there is no platform capture backend in this crate.
    TestPattern {
        #[serde(default = "default_resolution")]
        resolution: Resolution,
        #[serde(default = "default_fps")]
        fps: f64,
        #[serde(default = "default_facing")]
        facing: Facing,
        #[serde(default)]
        seed: u64,
        #[serde(default)]
        noise: u8,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    pub image: PathBuf,
    #[serde(default)]
    pub physical_width: Option<f64>,
}

fn default_fps() -> f64 {
    DEFAULT_FPS
}

fn default_surface_label() -> String {
    "canvas".to_string()
}

fn default_resolution() -> Resolution {
    Resolution::Md
}

fn default_facing() -> Facing {
    Facing::Environment
}

impl SessionConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config: SessionConfig = serde_yaml::from_reader(
            File::open(path).with_context(|| format!("Failed to open {:?}", path))?,
        )
        .with_context(|| format!("Failed to parse session config {:?}", path))?;

        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        config.resolve_paths(&base);
        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        if let SourceConfig::Video {
            frames, image_dir, ..
        } = &mut self.source
        {
            resolve(frames);
            if let Some(dir) = image_dir {
                resolve(dir);
            }
        }
        for target in &mut self.targets {
            resolve(&mut target.image);
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.fps.is_finite() || self.fps <= 0.0 {
            bail!("fps must be positive, got {}", self.fps);
        }
        if self.targets.is_empty() {
            bail!("no targets configured");
        }
        if let SourceConfig::Video {
            intrinsics: Some(k), ..
        } = &self.source
        {
            if k.len() != 4 {
                bail!("video intrinsics must be [fx, fy, cx, cy], got {} values", k.len());
            }
        }
        Ok(())
    }

    pub fn viewport_config(&self) -> ViewportConfig {
        ViewportConfig {
            surface: Some(Surface {
                label: self.surface.label.clone(),
                size: Dimensions::new(self.surface.width, self.surface.height),
            }),
            style: self.style,
            ..ViewportConfig::default()
        }
    }

    /// Camera settings for a test-pattern source.
    pub fn camera_config(&self) -> Option<CameraConfig> {
        match &self.source {
            SourceConfig::TestPattern {
                resolution,
                fps,
                facing,
                ..
            } => Some(CameraConfig {
                resolution: *resolution,
                fps: *fps,
                facing: *facing,
                ..CameraConfig::default()
            }),
            SourceConfig::Video { .. } => None,
        }
    }

    /// `[fx, fy, cx, cy]` configured for a video source.
    pub fn video_pinhole(&self) -> Option<[f64; 4]> {
        match &self.source {
            SourceConfig::Video {
                intrinsics: Some(k), ..
            } => <[f64; 4]>::try_from(k.as_slice()).ok(),
            _ => None,
        }
    }

    /// Decode every configured reference image.
    pub fn load_targets(&self) -> Result<Vec<ReferenceTarget>> {
        self.targets
            .iter()
            .map(|t| {
                let image = load_gray_image(&t.image)
                    .with_context(|| format!("target \"{}\"", t.name))?;
                let target = ReferenceTarget::new(t.name.clone(), image);
                Ok(match t.physical_width {
                    Some(w) => target.with_physical_width(w),
                    None => target,
                })
            })
            .collect()
    }
}
