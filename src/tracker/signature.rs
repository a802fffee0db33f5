//! Appearance-signature matcher.
//!
//! Reduces images to a coarse grid of block means, normalizes the grid to
//! zero mean and unit norm, and scores targets by normalized
//! cross-correlation against the whole frame. A target that scores above
//! the threshold is placed on the optical axis at the depth where its
//! physical width would span the frame. This backend stands in for a
//! feature-based detector; it has no notion of partial views.

use anyhow::{Result, bail};
use image::GrayImage;
use nalgebra::Vector3;

use crate::geometry::Pose;
use crate::source::Sample;

use super::{Detection, DetectionBackend, ReferenceTarget};

/// Signature grid side.
const GRID: usize = 16;

/// Correlation above which a target counts as present.
pub const DEFAULT_MIN_SCORE: f32 = 0.9;

type Signature = Vec<f32>;

struct TrainedTarget {
    signature: Signature,
    /// Physical width in metres; 1.0 (scene units) when unknown.
    width: f64,
}

pub struct SignatureMatcher {
    min_score: f32,
    trained: Vec<TrainedTarget>,
}

impl SignatureMatcher {
    pub fn new() -> Self {
        Self {
            min_score: DEFAULT_MIN_SCORE,
            trained: Vec::new(),
        }
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }
}

impl Default for SignatureMatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Block-mean signature, normalized. `None` for textureless images.
fn signature(img: &GrayImage) -> Option<Signature> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    if w < GRID || h < GRID {
        return None;
    }
    let mut sums = vec![0f64; GRID * GRID];
    let mut counts = vec![0u32; GRID * GRID];
    for (x, y, px) in img.enumerate_pixels() {
        let cell = (y as usize * GRID / h) * GRID + (x as usize * GRID / w);
        sums[cell] += px.0[0] as f64;
        counts[cell] += 1;
    }
    let means: Vec<f64> = sums
        .iter()
        .zip(&counts)
        .map(|(s, &c)| s / c.max(1) as f64)
        .collect();
    let mean = means.iter().sum::<f64>() / means.len() as f64;
    let centered: Vec<f64> = means.iter().map(|m| m - mean).collect();
    let norm = centered.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm < 1e-6 {
        return None;
    }
    Some(centered.iter().map(|v| (v / norm) as f32).collect())
}

fn correlation(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

impl DetectionBackend for SignatureMatcher {
    fn train(&mut self, targets: &[ReferenceTarget]) -> Result<()> {
        let mut trained = Vec::with_capacity(targets.len());
        for target in targets {
            let Some(signature) = signature(&target.image) else {
                bail!("target \"{}\" has no usable texture", target.name);
            };
            trained.push(TrainedTarget {
                signature,
                width: target.physical_width.unwrap_or(1.0),
            });
        }
        self.trained = trained;
        Ok(())
    }

    fn detect(&mut self, sample: &Sample) -> Result<Vec<Detection>> {
        let Some(frame) = signature(&sample.image) else {
            return Ok(Vec::new());
        };
        let k = &sample.intrinsics;
        let detections = self
            .trained
            .iter()
            .enumerate()
            .filter_map(|(idx, target)| {
                let score = correlation(&frame, &target.signature);
                if score < self.min_score {
                    return None;
                }
                let depth = k.fx * target.width / sample.width().max(1) as f64;
                Some(Detection {
                    target: idx,
                    pose: Pose::from_translation(Vector3::new(0.0, 0.0, -depth)),
                    confidence: score,
                })
            })
            .collect();
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::geometry::CameraIntrinsics;

    fn checker(size: u32, cell: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            if (x / cell + y / cell) % 2 == 0 {
                image::Luma([230])
            } else {
                image::Luma([20])
            }
        })
    }

    fn stripes(size: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, _| image::Luma([(x * 255 / size) as u8]))
    }

    fn sample_of(img: GrayImage) -> Sample {
        let k = CameraIntrinsics::from_fov(img.width(), img.height(), 60f64.to_radians());
        Sample::new(0, 0, img, k)
    }

    #[test]
    fn test_detects_matching_frame() {
        let mut matcher = SignatureMatcher::new();
        matcher
            .train(&[
                ReferenceTarget::new("checker", checker(64, 8)).with_physical_width(0.2),
                ReferenceTarget::new("stripes", stripes(64)),
            ])
            .unwrap();

        // Same pattern at a different resolution.
        let sample = sample_of(checker(128, 16));
        let detections = matcher.detect(&sample).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].target, 0);
        assert!(detections[0].confidence > 0.99);

        let expected_depth = sample.intrinsics.fx * 0.2 / 128.0;
        assert_relative_eq!(detections[0].pose.translation.z, -expected_depth, epsilon = 1e-9);
    }

    #[test]
    fn test_blank_frame_matches_nothing() {
        let mut matcher = SignatureMatcher::new();
        matcher
            .train(&[ReferenceTarget::new("checker", checker(64, 8))])
            .unwrap();
        let detections = matcher
            .detect(&sample_of(GrayImage::from_pixel(64, 64, image::Luma([128]))))
            .unwrap();
        assert!(detections.is_empty());
    }

    #[test]
    fn test_textureless_target_cannot_be_trained() {
        let mut matcher = SignatureMatcher::new();
        let flat = ReferenceTarget::new("flat", GrayImage::from_pixel(32, 32, image::Luma([9])));
        assert!(matcher.train(&[flat]).is_err());
    }
}
