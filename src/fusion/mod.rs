//! Pose fusion, AprilTag selection and reference-frame routing.

pub mod apriltag;
pub mod camera;
pub mod frames;
pub mod pose_fusion;

pub use apriltag::{AprilTagConfig, AprilTagStrategy, Tag2dBounds, TagPoseCandidate};
pub use camera::{CameraExtrinsics, CameraTracker};
pub use frames::{FrameKind, FrameProvider, ReferenceFrame, ReferenceFrameGraph};
pub use pose_fusion::{PoseFusion, PoseFusionConfig};
