//! End-to-end fusion pipeline: camera + odometry histories, the odom→robot
//! correction, frame routing and the object tracker working together.

use std::rc::Rc;

use approx::assert_relative_eq;
use nalgebra::Vector3;

use kala_fusion::{
    Clock, ObjectDetection, ObjectTracker, ObjectTrackerConfig, Pose3D, PoseFusion,
    PoseFusionConfig, ReferenceFrame, ReferenceFrameGraph, Timestamp, Transform3D,
};

fn at(seconds: f64, clock: &Clock) -> Timestamp {
    Timestamp::from_seconds(seconds, clock.clone())
}

/// Camera poses at t=0 and t=2s, one odometry pose at t=1s: the robot pose
/// interpolates between the camera samples and the correction maps odometry
/// onto it.
#[test]
fn overlap_produces_interpolated_pose_and_correction() {
    let clock = Clock::monotonic();
    let fusion = PoseFusion::new(PoseFusionConfig::default());
    let cam = Transform3D::identity();

    fusion.observe_f2r(at(0.0, &clock), &cam, &Pose3D::identity());
    fusion.observe_f2r(
        at(2.0, &clock),
        &cam,
        &Pose3D::from_translation(2.0, 0.0, 0.0),
    );
    fusion.observe_f2o(at(1.0, &clock), Pose3D::from_translation(1.0, 1.0, 0.0));

    let f2r = fusion.field_to_robot(&at(1.0, &clock));
    assert_relative_eq!(f2r.translation().x, 1.0, epsilon = 1e-9);
    assert_relative_eq!(f2r.translation().y, 0.0, epsilon = 1e-9);

    let correction = fusion.latest_odom_to_robot();
    assert_relative_eq!(
        correction.current().translation().y,
        -1.0,
        epsilon = 1e-9
    );
    assert_relative_eq!(correction.current().translation().x, 0.0, epsilon = 1e-9);

    // Fresh odometry plus the correction reproduces the fused robot pose.
    let fused = fusion
        .field_to_odom(&at(1.0, &clock))
        .transform_by(&correction.current());
    assert_relative_eq!(fused.translation().x, f2r.translation().x, epsilon = 1e-9);
    assert_relative_eq!(fused.translation().y, f2r.translation().y, epsilon = 1e-9);
}

/// The correction is memoized: unrelated buffer writes keep it fresh, a
/// write at the overlap instant invalidates and refreshes it.
#[test]
fn correction_recomputes_only_when_brackets_move() {
    let clock = Clock::monotonic();
    let fusion = PoseFusion::new(PoseFusionConfig::default());
    let cam = Transform3D::identity();

    fusion.observe_f2r(at(1.0, &clock), &cam, &Pose3D::identity());
    fusion.observe_f2o(at(1.0, &clock), Pose3D::from_translation(0.0, 1.0, 0.0));
    let correction = fusion.latest_odom_to_robot();
    assert_relative_eq!(
        correction.current().translation().y,
        -1.0,
        epsilon = 1e-9
    );

    fusion.observe_f2o(at(0.5, &clock), Pose3D::identity());
    assert!(correction.is_fresh());

    fusion.observe_f2o(at(1.0, &clock), Pose3D::from_translation(0.0, 3.0, 0.0));
    assert!(!correction.is_fresh());
    let correction = correction.refresh();
    assert_relative_eq!(
        correction.current().translation().y,
        -3.0,
        epsilon = 1e-9
    );
}

#[test]
fn frame_graph_routes_through_fusion() {
    let clock = Clock::monotonic();
    let fusion = Rc::new(PoseFusion::new(PoseFusionConfig::default()));
    let mut graph = ReferenceFrameGraph::new();
    graph.register_fusion(Rc::clone(&fusion));

    let ts = at(1.0, &clock);
    fusion.observe_f2r(
        ts.clone(),
        &Transform3D::identity(),
        &Pose3D::from_translation(4.0, 2.0, 0.0),
    );
    fusion.observe_f2o(ts.clone(), Pose3D::from_translation(4.0, 0.0, 0.0));

    let robot = graph.track_pose(ReferenceFrame::robot(), &ts).unwrap();
    assert_relative_eq!(robot.current().translation().y, 2.0, epsilon = 1e-9);
    let odom = graph
        .track_tf(ReferenceFrame::field(), ReferenceFrame::odom(), &ts)
        .unwrap();
    assert_relative_eq!(odom.current().translation().y, 0.0, epsilon = 1e-9);

    // No auto-routing between unregistered pairs.
    assert!(graph
        .track_tf(ReferenceFrame::odom(), ReferenceFrame::robot(), &ts)
        .is_err());
}

/// Detections observed through the fused robot pose land in field space and
/// cluster into one reported track.
#[test]
fn tracker_consumes_fused_poses() {
    let clock = Clock::monotonic();
    let fusion = PoseFusion::new(PoseFusionConfig::default());
    let robot_to_camera = Transform3D::from_translation(0.2, 0.0, 0.0);

    let mut tracker = ObjectTracker::new(
        ObjectTrackerConfig {
            min_detections: 3,
            ..ObjectTrackerConfig::default()
        },
        &clock,
    );

    for i in 0..3 {
        let ts = at(1.0 + i as f64 * 0.1, &clock);
        fusion.observe_f2r(
            ts.clone(),
            &Transform3D::identity(),
            &Pose3D::from_translation(1.0, 0.0, 0.0),
        );
        let field_to_robot = fusion.field_to_robot(&ts);
        tracker.track(
            ts,
            vec![ObjectDetection::new(
                "note",
                0.9,
                Vector3::new(0.0, 0.0, 2.0),
            )],
            &field_to_robot,
            &robot_to_camera,
        );
    }

    let items = tracker.items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].hits, 3);
    // robot x=1.0 + camera offset 0.2, object 2m ahead of the camera in z.
    assert_relative_eq!(items[0].position.x, 1.2, epsilon = 1e-9);
    assert_relative_eq!(items[0].position.z, 2.0, epsilon = 1e-9);
}
