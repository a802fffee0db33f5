//! Pose: rigid transformation (rotation + translation).
//!
//! Poses are model transforms: they map points from the local frame of a
//! target (or the viewer) into the world frame of the session. Rendering
//! layers consume them as column-major 4x4 matrices via [`Pose::matrix`].

use nalgebra::{Matrix4, UnitQuaternion, Vector3};

/// Rigid transform: p' = R * p + t.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
}

impl Pose {
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation,
        }
    }

    /// Homogeneous 4x4 transform matrix.
    pub fn matrix(&self) -> Matrix4<f64> {
        let mut m = self.rotation.to_homogeneous();
        m[(0, 3)] = self.translation.x;
        m[(1, 3)] = self.translation.y;
        m[(2, 3)] = self.translation.z;
        m
    }

    /// `self * other`: apply `other` first, then `self`.
    pub fn compose(&self, other: &Pose) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_matrix_maps_points_like_rotation_then_translation() {
        let pose = Pose {
            rotation: UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2),
            translation: Vector3::new(0.0, 0.0, -1.0),
        };
        let p = pose.matrix() * Vector3::new(1.0, 0.0, 0.0).push(1.0);

        assert_relative_eq!(p.xyz(), Vector3::new(0.0, 1.0, -1.0), epsilon = 1e-12);
        assert_relative_eq!(p.w, 1.0);
    }

    #[test]
    fn test_compose_applies_right_operand_first() {
        let viewer = Pose {
            rotation: UnitQuaternion::from_euler_angles(0.3, 0.2, -0.1),
            translation: Vector3::new(1.0, 2.0, 3.0),
        };
        let local = Pose::from_translation(Vector3::new(0.0, 0.0, -2.0));
        let world = viewer.compose(&local);

        assert_relative_eq!(world.matrix(), viewer.matrix() * local.matrix(), epsilon = 1e-12);
        assert_relative_eq!(world.rotation.angle_to(&viewer.rotation), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_default_is_identity() {
        assert_eq!(Pose::default().matrix(), Matrix4::identity());
    }
}
