//! Reference frames and the frame-conversion dispatch table.
//!
//! Unlike the time graph, frame conversion is a flat (source kind,
//! destination kind) lookup with no multi-hop routing: every provider
//! answers exactly the pairs it was registered for, and anything else is an
//! error the caller must handle.

use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::camera::CameraExtrinsics;
use super::pose_fusion::PoseFusion;
use crate::core::types::{Pose3D, Timestamp, Transform3D};
use crate::error::{FusionError, Result};
use crate::tracked::Tracked;

/// Coordinate-frame families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    /// Absolute field origin.
    Field,
    /// Drifting wheel-odometry origin.
    Odom,
    /// Robot body frame.
    Robot,
    /// One camera's optical frame.
    Camera,
    /// One detection's local frame.
    Detection,
}

/// A concrete frame: a kind plus an index distinguishing multiple cameras
/// or detections. Field/Odom/Robot ignore the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReferenceFrame {
    pub kind: FrameKind,
    pub index: usize,
}

impl ReferenceFrame {
    pub fn field() -> Self {
        ReferenceFrame {
            kind: FrameKind::Field,
            index: 0,
        }
    }
    pub fn odom() -> Self {
        ReferenceFrame {
            kind: FrameKind::Odom,
            index: 0,
        }
    }
    pub fn robot() -> Self {
        ReferenceFrame {
            kind: FrameKind::Robot,
            index: 0,
        }
    }
    pub fn camera(index: usize) -> Self {
        ReferenceFrame {
            kind: FrameKind::Camera,
            index,
        }
    }
    pub fn detection(index: usize) -> Self {
        ReferenceFrame {
            kind: FrameKind::Detection,
            index,
        }
    }
}

/// Answers frame-conversion queries for the pairs it was registered under.
pub trait FrameProvider {
    /// Memoized source→destination transform at `ts`.
    fn track_tf(
        &self,
        src: ReferenceFrame,
        dst: ReferenceFrame,
        ts: &Timestamp,
    ) -> Result<Tracked<Transform3D>>;
}

impl FrameProvider for Rc<PoseFusion> {
    fn track_tf(
        &self,
        src: ReferenceFrame,
        dst: ReferenceFrame,
        ts: &Timestamp,
    ) -> Result<Tracked<Transform3D>> {
        match (src.kind, dst.kind) {
            (FrameKind::Field, FrameKind::Robot) => Ok(self
                .track_field_to_robot(ts.clone())
                .map(|pose| pose.as_transform())),
            (FrameKind::Field, FrameKind::Odom) => Ok(self
                .track_field_to_odom(ts.clone())
                .map(|pose| pose.as_transform())),
            _ => Err(FusionError::UnsupportedFrames {
                src: src.kind,
                dst: dst.kind,
            }),
        }
    }
}

/// Dispatch table from (source kind, destination kind) to a provider.
#[derive(Default)]
pub struct ReferenceFrameGraph {
    providers: HashMap<(FrameKind, FrameKind), Rc<dyn FrameProvider>>,
}

impl ReferenceFrameGraph {
    pub fn new() -> Self {
        ReferenceFrameGraph::default()
    }

    /// Route `src kind → dst kind` queries to `provider` (replacing any
    /// previous registration for the pair).
    pub fn register(&mut self, src: FrameKind, dst: FrameKind, provider: Rc<dyn FrameProvider>) {
        self.providers.insert((src, dst), provider);
    }

    /// Register a pose-fusion instance for its field→robot and field→odom
    /// pairs.
    pub fn register_fusion(&mut self, fusion: Rc<PoseFusion>) {
        self.register(FrameKind::Field, FrameKind::Robot, Rc::new(Rc::clone(&fusion)));
        self.register(FrameKind::Field, FrameKind::Odom, Rc::new(fusion));
    }

    /// Register the per-camera extrinsics for the robot→camera pair.
    pub fn register_cameras(&mut self, cameras: Rc<CameraExtrinsics>) {
        self.register(FrameKind::Robot, FrameKind::Camera, Rc::new(cameras));
    }

    /// Memoized `src → dst` transform at `ts`.
    ///
    /// `src == dst` short-circuits to a constant identity. Distinct frames
    /// of the same kind and unregistered pairs are errors.
    pub fn track_tf(
        &self,
        src: ReferenceFrame,
        dst: ReferenceFrame,
        ts: &Timestamp,
    ) -> Result<Tracked<Transform3D>> {
        if src == dst {
            return Ok(Tracked::constant(Transform3D::identity()));
        }
        if src.kind == dst.kind {
            return Err(FusionError::UnsupportedFrames {
                src: src.kind,
                dst: dst.kind,
            });
        }
        let provider =
            self.providers
                .get(&(src.kind, dst.kind))
                .ok_or(FusionError::NoFrameProvider {
                    src: src.kind,
                    dst: dst.kind,
                })?;
        provider.track_tf(src, dst, ts)
    }

    /// Memoized pose of `dst` in field coordinates at `ts`.
    pub fn track_pose(&self, dst: ReferenceFrame, ts: &Timestamp) -> Result<Tracked<Pose3D>> {
        Ok(self
            .track_tf(ReferenceFrame::field(), dst, ts)?
            .map(|tf| tf.as_pose()))
    }
}
