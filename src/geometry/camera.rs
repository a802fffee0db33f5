//! Pinhole camera intrinsics and viewer projection matrices.

use nalgebra::{Matrix3, Matrix4, Perspective3};

/// Pinhole intrinsics of the sensor that produced a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub width: u32,
    pub height: u32,
}

impl CameraIntrinsics {
    /// Intrinsics of an ideal pinhole with the given vertical field of view (radians)
    /// and the principal point at the image center.
    pub fn from_fov(width: u32, height: u32, fov_y: f64) -> Self {
        let fy = height as f64 / (2.0 * (fov_y / 2.0).tan());
        Self {
            fx: fy,
            fy,
            cx: width as f64 / 2.0,
            cy: height as f64 / 2.0,
            width,
            height,
        }
    }

    /// Vertical field of view in radians.
    pub fn fov_y(&self) -> f64 {
        2.0 * (self.height as f64 / (2.0 * self.fy)).atan()
    }

    pub fn aspect(&self) -> f64 {
        self.width as f64 / self.height.max(1) as f64
    }

    /// K matrix: (u, v, 1) = K (x/z, y/z, 1).
    pub fn k_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0,
        )
    }

    /// Same optics, resampled to another resolution.
    pub fn scaled_to(&self, width: u32, height: u32) -> Self {
        let sx = width as f64 / self.width.max(1) as f64;
        let sy = height as f64 / self.height.max(1) as f64;
        Self {
            fx: self.fx * sx,
            fy: self.fy * sy,
            cx: self.cx * sx,
            cy: self.cy * sy,
            width,
            height,
        }
    }
}

/// OpenGL-style perspective projection (right-handed, clip z in [-1, 1]).
pub fn perspective(fov_y: f64, aspect: f64, near: f64, far: f64) -> Matrix4<f64> {
    Perspective3::new(aspect, fov_y, near, far).to_homogeneous()
}
