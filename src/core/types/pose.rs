//! 3D pose and transform types.
//!
//! Thin wrappers over `nalgebra::Isometry3<f64>` with the compose / inverse /
//! interpolate vocabulary the fusion layer needs. A [`Pose3D`] is the pose of
//! a frame expressed in some reference frame ("field→robot" = pose of the
//! robot in field coordinates); a [`Transform3D`] is a relative transform
//! between two frames.

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Pose of a frame in a reference frame (translation in meters).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose3D {
    iso: Isometry3<f64>,
}

impl Pose3D {
    /// Identity pose at the origin.
    #[inline]
    pub fn identity() -> Self {
        Pose3D {
            iso: Isometry3::identity(),
        }
    }

    /// Create from a translation and rotation.
    pub fn new(translation: Vector3<f64>, rotation: UnitQuaternion<f64>) -> Self {
        Pose3D {
            iso: Isometry3::from_parts(Translation3::from(translation), rotation),
        }
    }

    /// Pure translation pose.
    pub fn from_translation(x: f64, y: f64, z: f64) -> Self {
        Pose3D::new(Vector3::new(x, y, z), UnitQuaternion::identity())
    }

    /// Translation component in meters.
    #[inline]
    pub fn translation(&self) -> Vector3<f64> {
        self.iso.translation.vector
    }

    /// Rotation component.
    #[inline]
    pub fn rotation(&self) -> UnitQuaternion<f64> {
        self.iso.rotation
    }

    /// Height above the reference frame's ground plane.
    #[inline]
    pub fn z(&self) -> f64 {
        self.iso.translation.vector.z
    }

    /// (roll, pitch, yaw) Euler angles in radians.
    pub fn euler_angles(&self) -> (f64, f64, f64) {
        self.iso.rotation.euler_angles()
    }

    /// Apply a relative transform: `self ∘ transform`.
    #[inline]
    pub fn transform_by(&self, transform: &Transform3D) -> Pose3D {
        Pose3D {
            iso: self.iso * transform.iso,
        }
    }

    /// This pose expressed relative to `reference`.
    pub fn relative_to(&self, reference: &Pose3D) -> Pose3D {
        Pose3D {
            iso: reference.iso.inverse() * self.iso,
        }
    }

    /// View this pose as the transform origin→pose.
    #[inline]
    pub fn as_transform(&self) -> Transform3D {
        Transform3D { iso: self.iso }
    }
}

impl Default for Pose3D {
    fn default() -> Self {
        Self::identity()
    }
}

/// Relative transform between two frames.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform3D {
    iso: Isometry3<f64>,
}

impl Transform3D {
    /// Identity transform.
    #[inline]
    pub fn identity() -> Self {
        Transform3D {
            iso: Isometry3::identity(),
        }
    }

    /// Create from a translation and rotation.
    pub fn new(translation: Vector3<f64>, rotation: UnitQuaternion<f64>) -> Self {
        Transform3D {
            iso: Isometry3::from_parts(Translation3::from(translation), rotation),
        }
    }

    /// Pure translation transform.
    pub fn from_translation(x: f64, y: f64, z: f64) -> Self {
        Transform3D::new(Vector3::new(x, y, z), UnitQuaternion::identity())
    }

    /// The transform that maps `initial` onto `last` (`initial ∘ T = last`).
    pub fn between(initial: &Pose3D, last: &Pose3D) -> Transform3D {
        Transform3D {
            iso: initial.iso.inverse() * last.iso,
        }
    }

    /// Translation component in meters.
    #[inline]
    pub fn translation(&self) -> Vector3<f64> {
        self.iso.translation.vector
    }

    /// Rotation component.
    #[inline]
    pub fn rotation(&self) -> UnitQuaternion<f64> {
        self.iso.rotation
    }

    /// Inverse transform.
    #[inline]
    pub fn inverse(&self) -> Transform3D {
        Transform3D {
            iso: self.iso.inverse(),
        }
    }

    /// Compose two transforms: `self ∘ other`.
    #[inline]
    pub fn compose(&self, other: &Transform3D) -> Transform3D {
        Transform3D {
            iso: self.iso * other.iso,
        }
    }

    /// View this transform as the pose it moves the origin to.
    #[inline]
    pub fn as_pose(&self) -> Pose3D {
        Pose3D { iso: self.iso }
    }
}

impl Default for Transform3D {
    fn default() -> Self {
        Self::identity()
    }
}

/// Interpolate between two poses.
///
/// Linear translation blend plus shortest-arc rotation slerp. `t` outside
/// `[0, 1]` clamps to the nearer endpoint (flat extrapolation, matching the
/// interpolating buffer's edge behavior).
pub fn lerp_pose3d(a: &Pose3D, b: &Pose3D, t: f64) -> Pose3D {
    if t <= 0.0 {
        return *a;
    }
    if t >= 1.0 {
        return *b;
    }
    let translation = a.translation().lerp(&b.translation(), t);
    let rotation = a.rotation().slerp(&b.rotation(), t);
    Pose3D::new(translation, rotation)
}

/// Interpolate between two transforms (same semantics as [`lerp_pose3d`]).
pub fn lerp_transform3d(a: &Transform3D, b: &Transform3D, t: f64) -> Transform3D {
    lerp_pose3d(&a.as_pose(), &b.as_pose(), t).as_transform()
}
