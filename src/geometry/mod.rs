//! Geometry utilities: rigid poses, camera intrinsics, projection matrices.

pub mod camera;
pub mod pose;

pub use camera::{CameraIntrinsics, perspective};
pub use pose::Pose;
