//! Viewport: the output surface and the viewer's projection.
//!
//! The viewport describes the surface a rendering layer draws into and
//! keeps the projection matrix that matches it. Poses of tracked targets do
//! not depend on the viewport: resizing only changes the projection handed
//! out with later frames.

use nalgebra::Matrix4;
use serde::Deserialize;
use tracing::debug;

use crate::error::{ArError, ArResult};
use crate::geometry::{CameraIntrinsics, Pose, perspective};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f64 {
        self.width as f64 / self.height.max(1) as f64
    }

    fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// How the source image is fitted into the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewportStyle {
    /// Largest rectangle with the source aspect ratio that fits the surface.
    #[default]
    BestFit,
    /// Fill the whole surface, ignoring the source aspect ratio.
    Stretch,
    /// Use the source size as is.
    Inline,
}

/// The render surface (canvas) the consumer draws into.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Surface {
    pub label: String,
    pub size: Dimensions,
}

#[derive(Debug, Clone)]
pub struct ViewportConfig {
    pub surface: Option<Surface>,
    pub style: ViewportStyle,
    /// Vertical field of view (radians) until a source provides intrinsics.
    pub fov_y: f64,
    pub near: f64,
    pub far: f64,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            surface: None,
            style: ViewportStyle::default(),
            fov_y: 60f64.to_radians(),
            near: 0.1,
            far: 100.0,
        }
    }
}

impl ViewportConfig {
    pub fn with_surface(label: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            surface: Some(Surface {
                label: label.into(),
                size: Dimensions::new(width, height),
            }),
            ..Self::default()
        }
    }
}

/// Overlay toggles. Presentational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Gizmos {
    pub visible: bool,
}

/// Viewer pose and projection valid for one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Viewer {
    pub pose: Pose,
    pub projection: Matrix4<f64>,
}

pub struct Viewport {
    surface: Surface,
    style: ViewportStyle,
    fov_y: f64,
    near: f64,
    far: f64,
    intrinsics: Option<CameraIntrinsics>,
    projection: Matrix4<f64>,
    pub gizmos: Gizmos,
}

impl Viewport {
    pub fn new(config: ViewportConfig) -> ArResult<Self> {
        let surface = config
            .surface
            .ok_or_else(|| ArError::Viewport("no render surface configured".into()))?;
        if surface.size.is_empty() {
            return Err(ArError::Viewport(format!(
                "render surface \"{}\" has zero size",
                surface.label
            )));
        }
        if !(config.near > 0.0 && config.far > config.near) {
            return Err(ArError::Viewport(format!(
                "invalid clip planes near={} far={}",
                config.near, config.far
            )));
        }
        if !(config.fov_y > 0.0 && config.fov_y < std::f64::consts::PI) {
            return Err(ArError::Viewport(format!(
                "invalid vertical field of view {}",
                config.fov_y
            )));
        }
        let mut viewport = Self {
            surface,
            style: config.style,
            fov_y: config.fov_y,
            near: config.near,
            far: config.far,
            intrinsics: None,
            projection: Matrix4::identity(),
            gizmos: Gizmos::default(),
        };
        viewport.update_projection();
        Ok(viewport)
    }

    /// Use the primary source's optics for the projection.
    pub fn bind_intrinsics(&mut self, intrinsics: CameraIntrinsics) {
        self.intrinsics = Some(intrinsics);
        self.update_projection();
    }

    pub fn resize(&mut self, size: Dimensions) -> ArResult<()> {
        if size.is_empty() {
            return Err(ArError::Viewport(format!(
                "cannot resize \"{}\" to {}x{}",
                self.surface.label, size.width, size.height
            )));
        }
        self.surface.size = size;
        self.update_projection();
        debug!("viewport: resized to {}x{}", size.width, size.height);
        Ok(())
    }

    pub fn size(&self) -> Dimensions {
        self.surface.size
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn style(&self) -> ViewportStyle {
        self.style
    }

    pub fn projection(&self) -> &Matrix4<f64> {
        &self.projection
    }

    /// Snapshot for the current tick. The viewer sits at the session origin.
    pub fn viewer(&self) -> Viewer {
        Viewer {
            pose: Pose::identity(),
            projection: self.projection,
        }
    }

    /// Size of the region the source image occupies on the surface.
    pub fn display_size(&self) -> Dimensions {
        let surface = self.surface.size;
        let Some(k) = self.intrinsics else {
            return surface;
        };
        match self.style {
            ViewportStyle::Stretch => surface,
            ViewportStyle::Inline => Dimensions::new(k.width, k.height),
            ViewportStyle::BestFit => {
                let source_aspect = k.aspect();
                if surface.aspect() > source_aspect {
                    let w = (surface.height as f64 * source_aspect).round() as u32;
                    Dimensions::new(w.max(1), surface.height)
                } else {
                    let h = (surface.width as f64 / source_aspect).round() as u32;
                    Dimensions::new(surface.width, h.max(1))
                }
            }
        }
    }

    fn update_projection(&mut self) {
        let fov_y = self.intrinsics.map(|k| k.fov_y()).unwrap_or(self.fov_y);
        self.projection = perspective(fov_y, self.surface.size.aspect(), self.near, self.far);
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_missing_surface_is_an_error() {
        let err = Viewport::new(ViewportConfig::default()).err().unwrap();
        assert!(matches!(err, ArError::Viewport(_)));

        let err = Viewport::new(ViewportConfig::with_surface("canvas", 0, 480))
            .err()
            .unwrap();
        assert!(matches!(err, ArError::Viewport(_)));
    }

    #[test]
    fn test_field_of_view_must_be_open_half_turn() {
        for fov_y in [0.0, -0.5, std::f64::consts::PI, 4.0, f64::NAN] {
            let config = ViewportConfig {
                fov_y,
                ..ViewportConfig::with_surface("canvas", 640, 480)
            };
            let err = Viewport::new(config).err().unwrap();
            assert!(matches!(err, ArError::Viewport(_)), "fov_y={}", fov_y);
        }

        let config = ViewportConfig {
            fov_y: 1.0,
            ..ViewportConfig::with_surface("canvas", 640, 480)
        };
        assert!(Viewport::new(config).is_ok());
    }

    #[test]
    fn test_resize_changes_projection() {
        let mut vp = Viewport::new(ViewportConfig::with_surface("canvas", 640, 480)).unwrap();
        let before = *vp.projection();
        vp.resize(Dimensions::new(1280, 480)).unwrap();
        let after = *vp.projection();

        assert_relative_eq!(before[(1, 1)], after[(1, 1)]);
        assert_relative_eq!(before[(0, 0)], 2.0 * after[(0, 0)], epsilon = 1e-12);
        assert!(vp.resize(Dimensions::new(0, 0)).is_err());
        assert_eq!(vp.size(), Dimensions::new(1280, 480));
    }

    #[test]
    fn test_projection_follows_bound_intrinsics() {
        let mut vp = Viewport::new(ViewportConfig::with_surface("canvas", 640, 480)).unwrap();
        let k = CameraIntrinsics::from_fov(640, 480, 40f64.to_radians());
        vp.bind_intrinsics(k);
        let expected = perspective(40f64.to_radians(), 640.0 / 480.0, 0.1, 100.0);
        assert_relative_eq!(*vp.projection(), expected, epsilon = 1e-12);
        assert_eq!(vp.viewer().projection, expected);
    }

    #[test]
    fn test_display_size_by_style() {
        let k = CameraIntrinsics::from_fov(640, 480, 1.0);
        let mut config = ViewportConfig::with_surface("canvas", 1000, 500);

        let mut vp = Viewport::new(config.clone()).unwrap();
        vp.bind_intrinsics(k);
        assert_eq!(vp.display_size(), Dimensions::new(667, 500));

        config.style = ViewportStyle::Stretch;
        let mut vp = Viewport::new(config.clone()).unwrap();
        vp.bind_intrinsics(k);
        assert_eq!(vp.display_size(), Dimensions::new(1000, 500));

        config.style = ViewportStyle::Inline;
        let mut vp = Viewport::new(config).unwrap();
        vp.bind_intrinsics(k);
        assert_eq!(vp.display_size(), Dimensions::new(640, 480));
    }

    #[test]
    fn test_gizmos_toggle_is_presentational() {
        let mut vp = Viewport::new(ViewportConfig::with_surface("canvas", 640, 480)).unwrap();
        let projection = *vp.projection();
        vp.gizmos.visible = true;
        assert_eq!(*vp.projection(), projection);
    }
}
