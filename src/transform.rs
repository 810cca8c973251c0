//! Rigid transforms between a child frame and its parent.

use crate::error::{FrameError, Result};
use crate::rotation::{
    matrix_to_euler, matrix_to_quaternion, quaternion_from_matrix3, quaternion_to_euler,
    quaternion_to_matrix, EulerAngles, Quaternion, RotationMatrix, DETERMINANT_TOLERANCE,
};
use crate::{Matrix3, Matrix4, Vector3};
use std::fmt::{self, Display, Formatter};

#[cfg(any(test, feature = "approx"))]
use approx::{AbsDiffEq, RelativeEq};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The orientation part of a [`RigidTransform`].
///
/// Quaternions are the canonical form. Raw matrices are accepted so that records can carry
/// whatever their producer had at hand; [`FrameGraph::register`](crate::FrameGraph::register)
/// converts them (and so rejects badly-shaped ones) before they are stored.
///
/// When deserializing, a flat list of four numbers is a quaternion in `(x, y, z, w)` order and a
/// list of rows is a matrix.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Rotation {
    Quaternion(Quaternion),
    Matrix(RotationMatrix),
}

impl Rotation {
    /// Returns the rotation as a 3×3 matrix.
    ///
    /// Fails with [`FrameError::Shape`] if this is a matrix that is neither 3×3 nor 4×4.
    pub fn to_matrix3(&self) -> Result<Matrix3> {
        match self {
            Self::Quaternion(q) => Ok(quaternion_to_matrix(q)),
            Self::Matrix(m) => m.rotation_block(),
        }
    }

    /// Returns the rotation as a quaternion.
    ///
    /// Quaternions are returned exactly as stored (ie, not normalized).
    pub fn to_quaternion(&self) -> Result<Quaternion> {
        match self {
            Self::Quaternion(q) => Ok(*q),
            Self::Matrix(m) => matrix_to_quaternion(m),
        }
    }

    pub fn to_euler(&self) -> Result<EulerAngles> {
        match self {
            Self::Quaternion(q) => Ok(quaternion_to_euler(q)),
            Self::Matrix(m) => matrix_to_euler(m),
        }
    }

    /// Converts the rotation into its canonical (quaternion) representation.
    ///
    /// A matrix whose rotation block has a determinant further than [`DETERMINANT_TOLERANCE`]
    /// from +1 has no quaternion equivalent and fails with [`FrameError::ImproperRotation`].
    pub fn canonical(&self) -> Result<Self> {
        match self {
            Self::Quaternion(q) => Ok(Self::Quaternion(*q)),
            Self::Matrix(m) => {
                let block = m.rotation_block()?;
                if (block.determinant() - 1.).abs() > DETERMINANT_TOLERANCE {
                    return Err(FrameError::ImproperRotation);
                }
                Ok(Self::Quaternion(quaternion_from_matrix3(&block)))
            }
        }
    }
}

impl Default for Rotation {
    fn default() -> Self {
        Self::Quaternion(Quaternion::identity())
    }
}

impl Display for Rotation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quaternion(q) => write!(f, "{q}"),
            Self::Matrix(m) => write!(f, "{m}"),
        }
    }
}

impl From<Quaternion> for Rotation {
    fn from(q: Quaternion) -> Self {
        Self::Quaternion(q)
    }
}

impl From<RotationMatrix> for Rotation {
    fn from(m: RotationMatrix) -> Self {
        Self::Matrix(m)
    }
}

impl From<Matrix3> for Rotation {
    fn from(m: Matrix3) -> Self {
        Self::Matrix(m.into())
    }
}

impl From<EulerAngles> for Rotation {
    fn from(angles: EulerAngles) -> Self {
        Self::Quaternion(angles.to_quaternion())
    }
}

/// The pose of a child frame expressed in its parent frame.
///
/// Applying the transform to a point given in the child frame yields the same point in the parent
/// frame: `p_parent = R · p_child + t`. The default value is the identity.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RigidTransform {
    pub translation: Vector3,
    pub rotation: Rotation,
}

impl RigidTransform {
    #[must_use]
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn new(translation: Vector3, rotation: impl Into<Rotation>) -> Self {
        Self {
            translation,
            rotation: rotation.into(),
        }
    }

    /// A transform that only moves the origin.
    #[must_use]
    pub fn from_translation(translation: Vector3) -> Self {
        Self::new(translation, Rotation::default())
    }

    /// Reads a transform out of a homogeneous matrix.
    ///
    /// The rotation is taken from the upper-left 3×3 block and the translation from the last
    /// column. The bottom row is not inspected.
    #[must_use]
    pub fn from_matrix(matrix: &Matrix4) -> Self {
        let rotation = matrix.fixed_view::<3, 3>(0, 0).clone_owned();
        Self::new(
            matrix.fixed_view::<3, 1>(0, 3).clone_owned(),
            quaternion_from_matrix3(&rotation),
        )
    }

    /// Returns the 4×4 homogeneous matrix of this transform.
    ///
    /// If the rotation is itself a 4×4 matrix, only its upper-left 3×3 block is used: its
    /// translation column and bottom row are replaced by this transform's translation and
    /// `[0, 0, 0, 1]`.
    pub fn to_matrix(&self) -> Result<Matrix4> {
        let mut matrix = Matrix4::identity();
        matrix
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&self.rotation.to_matrix3()?);
        matrix
            .fixed_view_mut::<3, 1>(0, 3)
            .copy_from(&self.translation);
        Ok(matrix)
    }

    /// Returns `self · other`, ie, the transform that first applies `other` and then `self`.
    ///
    /// If `other` places frame C in frame B and `self` places frame B in frame A, the result places
    /// C in A. Composition is associative but not commutative.
    pub fn compose(&self, other: &Self) -> Result<Self> {
        Ok(Self::from_matrix(&(self.to_matrix()? * other.to_matrix()?)))
    }

    /// Returns the transform that undoes this one.
    ///
    /// Fails with [`FrameError::Singular`] if the homogeneous matrix has no inverse, which can only
    /// happen for a degenerate raw rotation matrix.
    pub fn inverse(&self) -> Result<Self> {
        invert(&self.to_matrix()?).map(|inverse| Self::from_matrix(&inverse))
    }

    pub fn to_quaternion(&self) -> Result<Quaternion> {
        self.rotation.to_quaternion()
    }

    pub fn to_euler(&self) -> Result<EulerAngles> {
        self.rotation.to_euler()
    }

    /// Returns an equivalent transform whose rotation is a quaternion.
    pub fn canonical(&self) -> Result<Self> {
        Ok(Self {
            translation: self.translation,
            rotation: self.rotation.canonical()?,
        })
    }

    /// Maps a point given in the child frame into the parent frame.
    pub fn transform_point(&self, point: &Vector3) -> Result<Vector3> {
        Ok(self.rotation.to_matrix3()? * point + self.translation)
    }
}

impl Display for RigidTransform {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Position: [{}, {}, {}], Orientation: {}",
            self.translation.x, self.translation.y, self.translation.z, self.rotation
        )
    }
}

/// General 4×4 inversion.
pub(crate) fn invert(matrix: &Matrix4) -> Result<Matrix4> {
    matrix.try_inverse().ok_or(FrameError::Singular)
}

#[cfg(any(test, feature = "approx"))]
impl AbsDiffEq<Self> for RigidTransform {
    type Epsilon = <f64 as AbsDiffEq>::Epsilon;

    fn default_epsilon() -> Self::Epsilon {
        f64::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        match (self.to_matrix(), other.to_matrix()) {
            (Ok(a), Ok(b)) => a.abs_diff_eq(&b, epsilon),
            _ => false,
        }
    }
}

#[cfg(any(test, feature = "approx"))]
impl RelativeEq for RigidTransform {
    fn default_max_relative() -> Self::Epsilon {
        f64::default_max_relative()
    }

    fn relative_eq(
        &self,
        other: &Self,
        epsilon: Self::Epsilon,
        max_relative: Self::Epsilon,
    ) -> bool {
        match (self.to_matrix(), other.to_matrix()) {
            (Ok(a), Ok(b)) => a.relative_eq(&b, epsilon, max_relative),
            _ => false,
        }
    }
}
