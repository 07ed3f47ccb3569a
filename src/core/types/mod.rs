//! Geometry and timestamp types.

mod pose;
mod timestamp;

pub use pose::{lerp_pose3d, lerp_transform3d, Pose3D, Transform3D};
pub use timestamp::{Stamped, Timestamp};
