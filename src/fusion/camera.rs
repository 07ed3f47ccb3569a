//! Robot→camera extrinsics, static or time-varying.
//!
//! Most cameras are bolted down and their extrinsics never change; those are
//! a constant. A camera on a turret or elevator reports its mount transform
//! over time, so its extrinsics live in an [`InterpolatingBuffer`] and are
//! sampled at the query instant like any other pose history.

use std::rc::Rc;

use log::warn;

use super::frames::{FrameKind, FrameProvider, ReferenceFrame};
use crate::buffer::InterpolatingBuffer;
use crate::core::types::{Timestamp, Transform3D};
use crate::error::{FusionError, Result};
use crate::tracked::Tracked;

/// One camera's robot→camera transform source.
pub enum CameraTracker {
    /// Rigidly mounted camera.
    Static(Transform3D),
    /// Moving mount: recorded transforms interpolated over time, with the
    /// nominal mount transform as the fallback before any recording.
    Dynamic {
        fallback: Transform3D,
        buffer: InterpolatingBuffer<Timestamp, Transform3D>,
    },
}

impl CameraTracker {
    /// Tracker for a rigidly mounted camera.
    pub fn fixed(robot_to_camera: Transform3D) -> Self {
        CameraTracker::Static(robot_to_camera)
    }

    /// Tracker for a moving mount, retaining `history_duration` seconds of
    /// recorded transforms.
    pub fn dynamic(history_duration: f64, robot_to_camera: Transform3D) -> Self {
        CameraTracker::Dynamic {
            fallback: robot_to_camera,
            buffer: InterpolatingBuffer::new(Some((history_duration * 1e9) as i64)),
        }
    }

    /// Record a mount transform reading. Ignored (with a warning) for a
    /// static camera.
    pub fn record(&self, ts: Timestamp, robot_to_camera: Transform3D) {
        match self {
            CameraTracker::Static(_) => {
                warn!("[CameraTracker] mount update for a static camera, ignoring");
            }
            CameraTracker::Dynamic { buffer, .. } => buffer.add(ts, robot_to_camera),
        }
    }

    /// Memoized robot→camera transform at `ts`.
    pub fn sample(&self, ts: &Timestamp) -> Tracked<Transform3D> {
        match self {
            CameraTracker::Static(tf) => Tracked::constant(*tf),
            CameraTracker::Dynamic { fallback, buffer } => buffer.track(ts.clone(), *fallback),
        }
    }
}

/// All cameras' extrinsics, indexed by camera id; answers the
/// (robot, camera) frame pair.
#[derive(Default)]
pub struct CameraExtrinsics {
    cameras: Vec<CameraTracker>,
}

impl CameraExtrinsics {
    pub fn new() -> Self {
        CameraExtrinsics::default()
    }

    /// Append a camera; its id is its registration order.
    pub fn push(&mut self, tracker: CameraTracker) {
        self.cameras.push(tracker);
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    /// Record a mount transform for camera `index`.
    pub fn record(&self, index: usize, ts: Timestamp, robot_to_camera: Transform3D) -> Result<()> {
        let camera = self
            .cameras
            .get(index)
            .ok_or_else(|| FusionError::Config(format!("no camera with index {index}")))?;
        camera.record(ts, robot_to_camera);
        Ok(())
    }

    /// Memoized robot→camera transform for camera `index` at `ts`.
    pub fn robot_to_camera(&self, index: usize, ts: &Timestamp) -> Result<Tracked<Transform3D>> {
        let camera = self
            .cameras
            .get(index)
            .ok_or_else(|| FusionError::Config(format!("no camera with index {index}")))?;
        Ok(camera.sample(ts))
    }
}

impl FrameProvider for Rc<CameraExtrinsics> {
    fn track_tf(
        &self,
        src: ReferenceFrame,
        dst: ReferenceFrame,
        ts: &Timestamp,
    ) -> Result<Tracked<Transform3D>> {
        match (src.kind, dst.kind) {
            (FrameKind::Robot, FrameKind::Camera) => self.robot_to_camera(dst.index, ts),
            _ => Err(FusionError::UnsupportedFrames {
                src: src.kind,
                dst: dst.kind,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::Clock;
    use crate::fusion::frames::ReferenceFrameGraph;
    use approx::assert_relative_eq;

    fn at(seconds: f64, clock: &Clock) -> Timestamp {
        Timestamp::from_seconds(seconds, clock.clone())
    }

    #[test]
    fn test_static_camera_is_constant() {
        let clock = Clock::monotonic();
        let tracker = CameraTracker::fixed(Transform3D::from_translation(0.5, 0.0, 0.0));
        let tf = tracker.sample(&at(1.0, &clock));
        assert!(tf.is_constant());
        assert_relative_eq!(tf.current().translation().x, 0.5, epsilon = 1e-9);
        // Mount updates for a static camera are ignored.
        tracker.record(at(2.0, &clock), Transform3D::from_translation(9.0, 0.0, 0.0));
        assert_relative_eq!(
            tracker.sample(&at(2.0, &clock)).current().translation().x,
            0.5,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_dynamic_camera_interpolates() {
        let clock = Clock::monotonic();
        let tracker = CameraTracker::dynamic(3.0, Transform3D::identity());
        // Fallback before any recording.
        assert_eq!(
            tracker.sample(&at(1.0, &clock)).current(),
            Transform3D::identity()
        );

        tracker.record(at(1.0, &clock), Transform3D::from_translation(0.0, 0.0, 0.2));
        tracker.record(at(3.0, &clock), Transform3D::from_translation(0.0, 0.0, 0.6));
        let tf = tracker.sample(&at(2.0, &clock));
        assert_relative_eq!(tf.current().translation().z, 0.4, epsilon = 1e-9);
    }

    #[test]
    fn test_dynamic_sample_invalidates_on_record() {
        let clock = Clock::monotonic();
        let tracker = CameraTracker::dynamic(3.0, Transform3D::identity());
        tracker.record(at(1.0, &clock), Transform3D::from_translation(0.0, 0.0, 0.2));
        let tf = tracker.sample(&at(1.0, &clock));
        let _ = tf.current();
        assert!(tf.is_fresh());

        tracker.record(at(1.0, &clock), Transform3D::from_translation(0.0, 0.0, 0.8));
        assert!(!tf.is_fresh());
        let tf = tf.refresh();
        assert_relative_eq!(tf.current().translation().z, 0.8, epsilon = 1e-9);
    }

    #[test]
    fn test_extrinsics_indexing() {
        let clock = Clock::monotonic();
        let mut extrinsics = CameraExtrinsics::new();
        extrinsics.push(CameraTracker::fixed(Transform3D::from_translation(
            0.1, 0.0, 0.0,
        )));
        extrinsics.push(CameraTracker::dynamic(3.0, Transform3D::identity()));
        assert_eq!(extrinsics.len(), 2);

        let ts = at(1.0, &clock);
        let tf = extrinsics.robot_to_camera(0, &ts).unwrap();
        assert_relative_eq!(tf.current().translation().x, 0.1, epsilon = 1e-9);
        assert!(matches!(
            extrinsics.robot_to_camera(5, &ts),
            Err(FusionError::Config(_))
        ));
        assert!(extrinsics
            .record(5, ts, Transform3D::identity())
            .is_err());
    }

    #[test]
    fn test_graph_routes_robot_to_camera() {
        let clock = Clock::monotonic();
        let mut extrinsics = CameraExtrinsics::new();
        extrinsics.push(CameraTracker::fixed(Transform3D::from_translation(
            0.3, 0.0, 0.0,
        )));
        let extrinsics = Rc::new(extrinsics);
        let mut graph = ReferenceFrameGraph::new();
        graph.register_cameras(Rc::clone(&extrinsics));

        let ts = at(1.0, &clock);
        let tf = graph
            .track_tf(ReferenceFrame::robot(), ReferenceFrame::camera(0), &ts)
            .unwrap();
        assert_relative_eq!(tf.current().translation().x, 0.3, epsilon = 1e-9);

        // Other pairs still require their own provider.
        assert!(graph
            .track_tf(ReferenceFrame::field(), ReferenceFrame::camera(0), &ts)
            .is_err());
    }
}
