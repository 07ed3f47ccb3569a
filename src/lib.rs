//! KalaFusion - Temporal consistency and sensor fusion for robot perception
//!
//! Reconciles pose, odometry and detection measurements arriving from
//! independently clocked, independently timed producers (camera workers,
//! a robot controller) into one time-consistent robot pose and a stable
//! object-track list, tolerating out-of-order delivery and avoiding
//! redundant recomputation.
//!
//! # Architecture
//!
//! The crate is organized into 5 logical layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              fusion/  tracker/                      │  ← Estimators
//! │   (pose fusion, frame routing, object tracking)     │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                    replay/                          │  ← Measurement ordering
//! │        (filter contract, rewind + replay)           │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                    buffer/                          │  ← Sample histories
//! │        (interpolating buffer, tracked views)        │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                   tracked/                          │  ← Lazy recomputation
//! │          (constant / source / derived)              │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     core/                           │  ← Foundation
//! │        (poses, timestamps, clocks, time graph)      │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Threading model
//!
//! The estimator layers are single-threaded by design (`Rc` sharing, no
//! locks): producers enqueue, one task polls. Clock reads (`Clock::now`)
//! are the exception and may be called concurrently.

// ============================================================================
// Layer 1: Core foundation (no internal deps)
// ============================================================================
pub mod core;

pub mod error;

// ============================================================================
// Layer 2: Tracked-value cascade (depends on nothing internal)
// ============================================================================
pub mod tracked;

// ============================================================================
// Layer 3: Interpolating sample buffer (depends on core, tracked)
// ============================================================================
pub mod buffer;

// ============================================================================
// Layer 4: Replay engine (depends on core)
// ============================================================================
pub mod replay;

// ============================================================================
// Layer 5: Estimators (depends on all layers)
// ============================================================================
pub mod fusion;
pub mod tracker;

// ============================================================================
// Convenience re-exports (flat namespace for common use)
// ============================================================================

// Core types
pub use crate::core::time::{Clock, ManualClock, ScopedMapper, TimeGraph, TimeMapper};
pub use crate::core::types::{
    lerp_pose3d, lerp_transform3d, Pose3D, Stamped, Timestamp, Transform3D,
};

pub use error::{FusionError, Result};

// Tracked values
pub use tracked::{Source, Tracked};

// Buffers
pub use buffer::{BufferKey, Interpolate, InterpolatingBuffer};

// Replay
pub use replay::{HasTimestamp, ReplayConfig, ReplayEngine, ReplayableFilter, REWIND_EPSILON};

// Fusion
pub use fusion::{
    AprilTagConfig, AprilTagStrategy, CameraExtrinsics, CameraTracker, FrameKind, FrameProvider,
    PoseFusion, PoseFusionConfig, ReferenceFrame, ReferenceFrameGraph, Tag2dBounds,
    TagPoseCandidate,
};

// Tracking
pub use tracker::{ObjectDetection, ObjectTracker, ObjectTrackerConfig, TrackedObject};
