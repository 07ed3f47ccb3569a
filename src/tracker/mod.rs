//! Object tracker: per-frame detections clustered into stable field-space
//! tracks.
//!
//! Camera frames can arrive out of order, so the clustering filter is
//! wrapped in a [`ReplayEngine`]; matching and blending always happen in
//! timestamp order. Tracks are matched by camera-relative horizontal
//! distance scaled by depth, blended exponentially on match, and dropped by
//! a per-cycle cleanup pass.

use std::time::Duration;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::core::types::{Pose3D, Timestamp, Transform3D};
use crate::replay::{HasTimestamp, ReplayConfig, ReplayEngine, ReplayableFilter};

/// Object tracking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectTrackerConfig {
    /// Detections required before a track is reported.
    pub min_detections: u32,
    /// Seconds an under-threshold track survives without being seen.
    pub detected_duration: f64,
    /// Seconds any track survives without being seen; also the replay
    /// history horizon.
    pub history_duration: f64,
    /// Depth-scaled matching radius.
    pub clustering_distance: f64,
    /// Depth floor for the matching radius, in meters.
    pub min_depth: f64,
    /// Position blend factor for matched detections.
    pub alpha: f64,
}

impl Default for ObjectTrackerConfig {
    fn default() -> Self {
        ObjectTrackerConfig {
            min_detections: 8,
            detected_duration: 1.0,
            history_duration: 8.0,
            clustering_distance: 0.3,
            min_depth: 0.5,
            alpha: 0.2,
        }
    }
}

/// One raw detection in camera coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDetection {
    pub label: String,
    pub confidence: f64,
    /// Object position relative to the camera (z is depth).
    pub camera_to_object: Vector3<f64>,
}

impl ObjectDetection {
    pub fn new(label: impl Into<String>, confidence: f64, camera_to_object: Vector3<f64>) -> Self {
        ObjectDetection {
            label: label.into(),
            confidence,
            camera_to_object,
        }
    }
}

/// One camera frame's worth of detections with the camera's field pose.
#[derive(Debug, Clone)]
pub struct DetectionFrame {
    pub ts: Timestamp,
    pub detections: Vec<ObjectDetection>,
    pub field_to_camera: Pose3D,
}

impl HasTimestamp for DetectionFrame {
    fn ts(&self) -> &Timestamp {
        &self.ts
    }
}

/// A stable object estimate in field coordinates.
#[derive(Debug, Clone)]
pub struct TrackedObject {
    pub id: u64,
    pub label: String,
    pub position: Vector3<f64>,
    pub confidence: f64,
    pub last_seen: Timestamp,
    pub hits: u32,
}

impl TrackedObject {
    fn new(id: u64, ts: Timestamp, position: Vector3<f64>, label: String, confidence: f64) -> Self {
        TrackedObject {
            id,
            label,
            position,
            confidence,
            last_seen: ts,
            hits: 1,
        }
    }

    /// Position as a rotation-free pose.
    pub fn pose(&self) -> Pose3D {
        Pose3D::from_translation(self.position.x, self.position.y, self.position.z)
    }

    /// Position relative to `reference` (usually a camera pose).
    fn position_in(&self, reference: &Pose3D) -> Vector3<f64> {
        self.pose().relative_to(reference).translation()
    }

    fn absorb(&mut self, incoming: &TrackedObject, alpha: f64) {
        self.last_seen = incoming.last_seen.clone();
        self.position = incoming.position * alpha + self.position * (1.0 - alpha);
        self.hits += 1;
    }

    fn should_remove(&self, now: &Timestamp, config: &ObjectTrackerConfig) -> bool {
        let age = now.nanos_since(&self.last_seen);
        if self.hits < config.min_detections && age > (config.detected_duration * 1e9) as i64 {
            return true;
        }
        age > (config.history_duration * 1e9) as i64
    }
}

#[derive(Clone)]
pub struct TrackerSnapshot {
    ts: Timestamp,
    next_id: u64,
    tracks: Vec<TrackedObject>,
}

impl HasTimestamp for TrackerSnapshot {
    fn ts(&self) -> &Timestamp {
        &self.ts
    }
}

/// The clustering filter itself; always driven through a [`ReplayEngine`].
pub struct TrackerFilter {
    config: ObjectTrackerConfig,
    next_id: u64,
    tracks: Vec<TrackedObject>,
    last_ts: Timestamp,
}

impl TrackerFilter {
    fn new(config: ObjectTrackerConfig, clock: &crate::core::time::Clock) -> Self {
        TrackerFilter {
            config,
            next_id: 0,
            tracks: Vec::new(),
            last_ts: Timestamp::invalid(clock.clone()),
        }
    }

    /// Nearest same-label track within the clustering radius.
    ///
    /// Distance is horizontal (camera x/y) separation divided by depth, so
    /// the radius widens with range; depth is floored to keep close-in
    /// detections from matching everything.
    fn find_best_match(
        &self,
        label: &str,
        new_cs: &Vector3<f64>,
        field_to_camera: &Pose3D,
    ) -> Option<usize> {
        let mut best = None;
        let mut best_dist = self.config.clustering_distance;
        for (i, track) in self.tracks.iter().enumerate() {
            if track.label != label {
                continue;
            }
            let old_cs = track.position_in(field_to_camera);
            let depth = self.config.min_depth.max(old_cs.z).max(new_cs.z);
            let dist = (old_cs.x - new_cs.x).hypot(old_cs.y - new_cs.y) / depth;
            if dist < best_dist {
                best_dist = dist;
                best = Some(i);
            }
        }
        best
    }

    fn cleanup(&mut self, now: &Timestamp) {
        let config = &self.config;
        self.tracks.retain(|t| !t.should_remove(now, config));
    }

    fn reset(&mut self) {
        self.next_id = 0;
        self.tracks.clear();
        self.last_ts = Timestamp::invalid(self.last_ts.clock().clone());
    }
}

impl ReplayableFilter for TrackerFilter {
    type Measurement = DetectionFrame;
    type Snapshot = TrackerSnapshot;

    fn is_initialized(&self) -> bool {
        self.last_ts.is_valid()
    }

    fn last_measurement_ts(&self) -> Timestamp {
        self.last_ts.clone()
    }

    fn set_last_measurement_ts(&mut self, ts: Timestamp) {
        self.last_ts = ts;
    }

    fn sensor_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.config.history_duration)
    }

    fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            ts: self.last_ts.clone(),
            next_id: self.next_id,
            tracks: self.tracks.clone(),
        }
    }

    fn restore(&mut self, snapshot: &TrackerSnapshot) {
        self.next_id = snapshot.next_id;
        self.tracks = snapshot.tracks.clone();
        self.last_ts = snapshot.ts.clone();
    }

    fn predict(&mut self, now: &Timestamp, _delta: Duration) {
        self.cleanup(now);
    }

    fn observe(&mut self, frame: &DetectionFrame) {
        // Prune on every frame, not just when a predict step ran; the first
        // and equal-timestamp frames skip predict entirely.
        self.cleanup(&frame.ts);
        for detection in &frame.detections {
            let offset = detection.camera_to_object;
            let field_to_object = frame
                .field_to_camera
                .transform_by(&Transform3D::from_translation(offset.x, offset.y, offset.z))
                .translation();
            let incoming = TrackedObject::new(
                self.next_id,
                frame.ts.clone(),
                field_to_object,
                detection.label.clone(),
                detection.confidence,
            );
            let camera_space = incoming.position_in(&frame.field_to_camera);
            match self.find_best_match(&detection.label, &camera_space, &frame.field_to_camera) {
                Some(i) => self.tracks[i].absorb(&incoming, self.config.alpha),
                None => {
                    // Ids only advance for genuinely new objects.
                    self.next_id += 1;
                    self.tracks.push(incoming);
                }
            }
        }
    }
}

/// Public tracker facade: replayed clustering plus the reporting threshold.
pub struct ObjectTracker {
    config: ObjectTrackerConfig,
    engine: ReplayEngine<TrackerFilter>,
}

impl ObjectTracker {
    pub fn new(config: ObjectTrackerConfig, clock: &crate::core::time::Clock) -> Self {
        let replay = ReplayConfig {
            smooth_lagged_data: true,
            history_duration: config.history_duration,
        };
        let filter = TrackerFilter::new(config.clone(), clock);
        ObjectTracker {
            config,
            engine: ReplayEngine::new(filter, replay),
        }
    }

    /// Enqueue one camera frame, composing the camera's field pose from the
    /// robot pose and the camera extrinsics.
    pub fn observe(
        &mut self,
        ts: Timestamp,
        detections: Vec<ObjectDetection>,
        field_to_robot: &Pose3D,
        robot_to_camera: &Transform3D,
    ) {
        let field_to_camera = field_to_robot.transform_by(robot_to_camera);
        self.engine.observe(DetectionFrame {
            ts,
            detections,
            field_to_camera,
        });
    }

    /// Integrate everything due at `now`.
    pub fn poll(&mut self, now: &Timestamp) {
        self.engine.poll(now);
    }

    /// Observe one frame and integrate it immediately.
    pub fn track(
        &mut self,
        ts: Timestamp,
        detections: Vec<ObjectDetection>,
        field_to_robot: &Pose3D,
        robot_to_camera: &Transform3D,
    ) {
        self.observe(ts.clone(), detections, field_to_robot, robot_to_camera);
        self.poll(&ts);
    }

    /// Tracks seen often enough to report.
    pub fn items(&self) -> Vec<TrackedObject> {
        self.engine
            .filter()
            .tracks
            .iter()
            .filter(|t| t.hits >= self.config.min_detections)
            .cloned()
            .collect()
    }

    /// Drop all tracks and pending frames.
    pub fn clear(&mut self) {
        self.engine.clear();
        self.engine.filter_mut().reset();
    }
}
