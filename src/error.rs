//! Error types for frame resolution and the scene records built on top of it.
//!
//! None of these are transient: retrying the same call against the same graph yields the same
//! error. Singular orientations (gimbal lock, zero-norm quaternions) are deliberately _not_ errors
//! and degrade to documented fallbacks in [`rotation`](crate::rotation) instead.

use thiserror::Error;

/// Result type used by the frame-resolution core.
pub type Result<T, E = FrameError> = std::result::Result<T, E>;

/// Failures of rotation conversion, transform math, and frame-graph resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// A rotation matrix was neither 3×3 nor 4×4 (or had rows of differing length).
    #[error("rotation matrix must be 3x3 or 4x4, got {rows}x{cols}")]
    Shape { rows: usize, cols: usize },

    /// A frame was referenced (as a query endpoint or as a parent) but never registered.
    #[error("frame `{name}` is not registered")]
    FrameNotFound { name: String },

    /// Walking the parent chain of `frame` came back around to `revisited`.
    #[error("parent chain of `{frame}` loops back to `{revisited}`")]
    Cycle { frame: String, revisited: String },

    /// The parent chain of `frame` did not reach the world frame within `max_depth` hops.
    #[error("parent chain of `{frame}` does not reach the world frame within {max_depth} hops")]
    DepthExceeded { frame: String, max_depth: usize },

    /// The world frame is implicit and cannot be registered or overwritten.
    #[error("`{name}` is the world frame and cannot be registered")]
    ReservedFrame { name: String },

    /// A homogeneous matrix had no inverse.
    #[error("transform is singular and cannot be inverted")]
    Singular,

    /// A rotation matrix was not a proper rotation (its determinant is not close to +1), eg, it
    /// is degenerate or mirrors an axis.
    #[error("rotation matrix is not a proper rotation")]
    ImproperRotation,
}

/// Failures of the scene and recording layer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SceneError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// An action referred to a robot, object, or sub-frame the scene does not have.
    #[error("scene has no robot, object, or sub-frame named `{name}`")]
    UnknownRecord { name: String },

    /// A recorded frame belongs to a different scene than the one it is being added to.
    #[error("frame belongs to scene `{found}` but this data bag holds scene `{expected}`")]
    SceneMismatch { expected: String, found: String },
}
