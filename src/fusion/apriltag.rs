//! AprilTag camera-pose candidate filtering and selection.
//!
//! A detection pipeline hands over several candidate field→camera poses per
//! frame (tag ambiguity yields multiple solutions). Implausible candidates
//! are filtered out first when the robot is known to drive on a plane, then
//! one pose is selected by the configured strategy. Zero survivors means no
//! observation this cycle, not an error.

use log::debug;
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::core::types::Pose3D;

/// One candidate field→camera solution with its reprojection error.
#[derive(Debug, Clone, PartialEq)]
pub struct TagPoseCandidate {
    /// Reprojection error; lower is better. Also the ambiguity measure.
    pub error: f64,
    pub field_to_camera: Pose3D,
}

impl TagPoseCandidate {
    pub fn new(error: f64, field_to_camera: Pose3D) -> Self {
        TagPoseCandidate {
            error,
            field_to_camera,
        }
    }
}

/// How to pick one pose among surviving candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AprilTagStrategy {
    /// Lowest reprojection error wins.
    LowestAmbiguity,
    /// Candidate nearest the camera pose interpolated just before the
    /// observation; falls back to lowest ambiguity with no prior pose.
    ClosestToLastPose,
    /// Error-weighted average of all surviving candidates.
    AverageBestTargets,
}

/// Plausibility bounds applied to candidates when the robot drives on a
/// plane. Heights and angles that put the camera underground or tipped over
/// are tag-ambiguity artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tag2dBounds {
    /// Camera height window in meters, exclusive.
    pub min_z: f64,
    pub max_z: f64,
    /// Absolute roll/pitch limits in radians, exclusive.
    pub max_roll: f64,
    pub max_pitch: f64,
}

impl Default for Tag2dBounds {
    fn default() -> Self {
        Tag2dBounds {
            min_z: -0.5,
            max_z: 1.0,
            max_roll: 0.5,
            max_pitch: 0.5,
        }
    }
}

impl Tag2dBounds {
    /// Whether a candidate pose is physically plausible for a planar robot.
    pub fn accepts(&self, pose: &Pose3D) -> bool {
        let z = pose.z();
        if z <= self.min_z || z >= self.max_z {
            return false;
        }
        let (roll, pitch, _) = pose.euler_angles();
        roll.abs() < self.max_roll && pitch.abs() < self.max_pitch
    }
}

/// AprilTag ingestion settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AprilTagConfig {
    pub strategy: AprilTagStrategy,
    /// Apply [`Tag2dBounds`] filtering (planar robot assumption).
    pub force_2d: bool,
    pub bounds: Tag2dBounds,
}

impl Default for AprilTagConfig {
    fn default() -> Self {
        AprilTagConfig {
            strategy: AprilTagStrategy::LowestAmbiguity,
            force_2d: true,
            bounds: Tag2dBounds::default(),
        }
    }
}

/// Error weights are floored here so a perfect detection does not swallow
/// the average.
const MIN_ERROR: f64 = 1e-6;

/// Pick one field→camera pose from `candidates`.
///
/// `last_pose` is the camera pose just before this observation, when known;
/// only the `ClosestToLastPose` strategy reads it.
pub fn select_candidate(
    candidates: &[TagPoseCandidate],
    config: &AprilTagConfig,
    last_pose: Option<&Pose3D>,
) -> Option<Pose3D> {
    let surviving: Vec<&TagPoseCandidate> = if config.force_2d {
        candidates
            .iter()
            .filter(|c| config.bounds.accepts(&c.field_to_camera))
            .collect()
    } else {
        candidates.iter().collect()
    };

    if surviving.is_empty() {
        if !candidates.is_empty() {
            debug!(
                "[AprilTag] all {} candidates rejected by 2d bounds",
                candidates.len()
            );
        }
        return None;
    }

    match config.strategy {
        AprilTagStrategy::LowestAmbiguity => lowest_ambiguity(&surviving),
        AprilTagStrategy::ClosestToLastPose => match last_pose {
            Some(last) => surviving
                .iter()
                .min_by(|a, b| {
                    let da = (a.field_to_camera.translation() - last.translation()).norm();
                    let db = (b.field_to_camera.translation() - last.translation()).norm();
                    da.total_cmp(&db)
                })
                .map(|c| c.field_to_camera),
            None => lowest_ambiguity(&surviving),
        },
        AprilTagStrategy::AverageBestTargets => Some(weighted_average(&surviving)),
    }
}

fn lowest_ambiguity(candidates: &[&TagPoseCandidate]) -> Option<Pose3D> {
    candidates
        .iter()
        .min_by(|a, b| a.error.total_cmp(&b.error))
        .map(|c| c.field_to_camera)
}

/// Confidence-weighted mean: translations average linearly, rotations
/// through the scaled-axis (log) space.
fn weighted_average(candidates: &[&TagPoseCandidate]) -> Pose3D {
    let mut total = 0.0;
    let mut translation = Vector3::zeros();
    let mut axis = Vector3::zeros();
    for c in candidates {
        let weight = 1.0 / c.error.max(MIN_ERROR);
        total += weight;
        translation += c.field_to_camera.translation() * weight;
        axis += c.field_to_camera.rotation().scaled_axis() * weight;
    }
    Pose3D::new(
        translation / total,
        UnitQuaternion::from_scaled_axis(axis / total),
    )
}
