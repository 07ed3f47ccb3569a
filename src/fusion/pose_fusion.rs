//! Pose fusion: SLAM/VIO and odometry histories reconciled into one
//! time-consistent robot pose.
//!
//! Two interpolating buffers hold the field→robot history (absolute, from
//! cameras) and the field→odom history (drifting, from wheel odometry). The
//! odom→robot correction is the transform between the two at the latest
//! instant where both have coverage; applying it to a fresh odometry pose
//! yields an absolute robot pose even between camera updates.

use std::cell::Cell;
use std::rc::Rc;

use log::debug;
use serde::{Deserialize, Serialize};

use super::apriltag::{select_candidate, AprilTagConfig, TagPoseCandidate};
use crate::buffer::InterpolatingBuffer;
use crate::core::types::{Pose3D, Timestamp, Transform3D};
use crate::replay::REWIND_EPSILON;
use crate::tracked::Tracked;

/// Pose fusion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseFusionConfig {
    /// Seconds of pose history retained in each buffer.
    pub history_duration: f64,
    pub apriltag: AprilTagConfig,
}

impl Default for PoseFusionConfig {
    fn default() -> Self {
        PoseFusionConfig {
            history_duration: 3.0,
            apriltag: AprilTagConfig::default(),
        }
    }
}

/// Field→robot and field→odom histories plus the odom→robot correction.
pub struct PoseFusion {
    config: PoseFusionConfig,
    field_to_robot: InterpolatingBuffer<Timestamp, Pose3D>,
    field_to_odom: InterpolatingBuffer<Timestamp, Pose3D>,
    /// Last computed correction, reused while the buffers have no overlap.
    last_correction: Rc<Cell<Transform3D>>,
}

impl PoseFusion {
    pub fn new(config: PoseFusionConfig) -> Self {
        let horizon = Some((config.history_duration * 1e9) as i64);
        PoseFusion {
            config,
            field_to_robot: InterpolatingBuffer::new(horizon),
            field_to_odom: InterpolatingBuffer::new(horizon),
            last_correction: Rc::new(Cell::new(Transform3D::identity())),
        }
    }

    /// Absorb an absolute camera pose: `field→robot = field→camera ∘
    /// (robot→camera)⁻¹`.
    pub fn observe_f2r(
        &self,
        ts: Timestamp,
        robot_to_camera: &Transform3D,
        field_to_camera: &Pose3D,
    ) {
        let pose = field_to_camera.transform_by(&robot_to_camera.inverse());
        self.field_to_robot.add(ts, pose);
    }

    /// Absorb a wheel-odometry pose (already field-frame).
    pub fn observe_f2o(&self, ts: Timestamp, field_to_odom: Pose3D) {
        self.field_to_odom.add(ts, field_to_odom);
    }

    /// Select one AprilTag candidate and absorb it as a camera observation.
    ///
    /// Returns the selected field→camera pose, or `None` when nothing
    /// plausible survived filtering (no observation this cycle).
    pub fn observe_apriltags(
        &self,
        ts: Timestamp,
        candidates: &[TagPoseCandidate],
        robot_to_camera: &Transform3D,
    ) -> Option<Pose3D> {
        let last_camera = if self.field_to_robot.is_empty() {
            None
        } else {
            // Camera pose just before this observation, for the
            // closest-to-last-pose strategy.
            let prior = self
                .field_to_robot
                .get(&ts.before(REWIND_EPSILON), Pose3D::identity());
            Some(prior.transform_by(robot_to_camera))
        };
        let selected = select_candidate(candidates, &self.config.apriltag, last_camera.as_ref())?;
        self.observe_f2r(ts, robot_to_camera, &selected);
        Some(selected)
    }

    /// Robot pose in field coordinates at `ts` (identity before any
    /// observation).
    pub fn field_to_robot(&self, ts: &Timestamp) -> Pose3D {
        self.field_to_robot.get(ts, Pose3D::identity())
    }

    /// Odometry pose in field coordinates at `ts` (identity before any
    /// observation).
    pub fn field_to_odom(&self, ts: &Timestamp) -> Pose3D {
        self.field_to_odom.get(ts, Pose3D::identity())
    }

    /// Memoized view of the field→robot history at `ts`.
    pub fn track_field_to_robot(&self, ts: Timestamp) -> Tracked<Pose3D> {
        self.field_to_robot.track(ts, Pose3D::identity())
    }

    /// Memoized view of the field→odom history at `ts`.
    pub fn track_field_to_odom(&self, ts: Timestamp) -> Tracked<Pose3D> {
        self.field_to_odom.track(ts, Pose3D::identity())
    }

    /// The odom→robot correction at the latest instant both histories
    /// cover, as a memoized value recomputed only when a relevant bracket
    /// changes.
    ///
    /// Without overlap the last computed correction is reused (identity
    /// before the first one); applying a stale correction drifts, but a pose
    /// must still be produced every cycle.
    pub fn latest_odom_to_robot(&self) -> Tracked<Transform3D> {
        let overlap = self.coverage_overlap();
        let Some(ts) = overlap else {
            debug!("[PoseFusion] no buffer overlap, reusing last odom->robot correction");
            return Tracked::constant(self.last_correction.get());
        };

        let cache = Rc::clone(&self.last_correction);
        self.track_field_to_odom(ts.clone())
            .zip_with(&self.track_field_to_robot(ts), move |f2o, f2r| {
                let correction = Transform3D::between(f2o, f2r);
                cache.set(correction);
                correction
            })
    }

    /// Latest timestamp covered by both buffers, if their spans intersect.
    fn coverage_overlap(&self) -> Option<Timestamp> {
        let (r_first, _) = self.field_to_robot.first()?;
        let (r_last, _) = self.field_to_robot.latest()?;
        let (o_first, _) = self.field_to_odom.first()?;
        let (o_last, _) = self.field_to_odom.latest()?;
        let start = std::cmp::max(r_first, o_first);
        let end = std::cmp::min(r_last, o_last);
        (start <= end).then_some(end)
    }

    /// Drop both histories and reset the correction to identity.
    pub fn clear(&self) {
        self.field_to_robot.clear();
        self.field_to_odom.clear();
        self.last_correction.set(Transform3D::identity());
    }
}

impl Default for PoseFusion {
    fn default() -> Self {
        PoseFusion::new(PoseFusionConfig::default())
    }
}
