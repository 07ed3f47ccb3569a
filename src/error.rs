//! Error types for kala-fusion.
//!
//! Only recoverable conditions are represented here. Clock mismatches
//! (comparing or offsetting timestamps from unconverted clocks) are
//! programmer defects and panic instead of returning an error; degraded
//! replay history is reported through `log::warn!` because the fusion loop
//! must keep producing a pose every cycle.

use thiserror::Error;

use crate::fusion::frames::FrameKind;

/// kala-fusion error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FusionError {
    /// The time graph has no chain of mappers between two clocks. The caller
    /// should drop or skip the unconvertible timestamp.
    #[error("no conversion path between clocks: {0}")]
    NoConversionPath(String),

    /// No provider is registered for a (source, destination) frame-kind pair.
    /// Multi-hop frame composition is intentionally not auto-routed.
    #[error("no frame provider registered for {src:?} -> {dst:?}")]
    NoFrameProvider { src: FrameKind, dst: FrameKind },

    /// Conversion between two distinct frames of the same kind (e.g. two
    /// cameras) is not supported.
    #[error("unsupported frame conversion {src:?} -> {dst:?}")]
    UnsupportedFrames { src: FrameKind, dst: FrameKind },

    /// Invalid configuration detected at construction time.
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, FusionError>;
