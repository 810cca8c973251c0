//! Conversions between the orientation representations found in workcell records.
//!
//! Three representations show up in practice:
//!
//! - [`Quaternion`]s in `(x, y, z, w)` component order, which is the canonical in-memory form;
//! - [`RotationMatrix`]es, which must be 3×3 or a 4×4 homogeneous embedding; and
//! - [`EulerAngles`] using the ZYX intrinsic convention (yaw about Z, then pitch about the new Y,
//!   then roll about the new X).
//!
//! All conversions are pure functions. Singular inputs never fail: a quaternion whose norm is at
//! most [`NORM_EPSILON`] is read as "no rotation", and an orientation in gimbal lock (pitch at
//! ±90°) reports `yaw = 0` and folds the remaining rotation into roll. Only a matrix of the wrong
//! shape is an error ([`FrameError::Shape`]).
//!
//! ```
//! use workcell_frames::rotation::{matrix_to_quaternion, quaternion_to_matrix, Quaternion};
//!
//! let quarter_turn_about_z = Quaternion::new(0., 0., std::f64::consts::FRAC_1_SQRT_2, std::f64::consts::FRAC_1_SQRT_2);
//! let matrix = quaternion_to_matrix(&quarter_turn_about_z);
//! let back = matrix_to_quaternion(&matrix.into()).expect("3x3 is a valid rotation shape");
//! assert!(back.same_rotation_as(&quarter_turn_about_z, 1e-9));
//! ```

use crate::error::{FrameError, Result};
use crate::util::BoundedAngle;
use crate::{Matrix3, Matrix4, UnitQuaternion};
use nalgebra::DMatrix;
use std::f64::consts::FRAC_PI_2;
use std::fmt::{self, Display, Formatter};
use std::ops::Neg;
use uom::si::angle::radian;
use uom::si::f64::Angle;

#[cfg(any(test, feature = "approx"))]
use approx::{AbsDiffEq, RelativeEq};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Quaternions with a norm at or below this are treated as the identity rotation.
pub const NORM_EPSILON: f64 = 1e-6;

/// How far from +1 the determinant of a rotation matrix may be before the matrix is rejected as
/// not being a rotation at all.
pub const DETERMINANT_TOLERANCE: f64 = 1e-3;

/// Below this value of `sqrt(R00² + R10²)` a rotation matrix is considered to be in gimbal lock.
pub const GIMBAL_EPSILON: f64 = 1e-6;

/// A rotation quaternion with components in `(x, y, z, w)` order.
///
/// Quaternions are unit-norm by convention, but every conversion normalizes defensively, so
/// slightly drifted values (eg, from a text file with six decimals) are fine. `q` and `-q`
/// describe the same rotation; use [`Quaternion::same_rotation_as`] to compare orientations.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(from = "[f64; 4]", into = "[f64; 4]"))]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quaternion {
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    /// The quaternion representing no rotation, `(0, 0, 0, 1)`.
    #[must_use]
    pub const fn identity() -> Self {
        Self::new(0., 0., 0., 1.)
    }

    #[must_use]
    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt()
    }

    /// Returns the unit quaternion pointing the same way as `self`.
    ///
    /// Returns `None` if the norm is at most [`NORM_EPSILON`], as such a quaternion has no
    /// meaningful rotation associated with it.
    #[must_use]
    pub fn normalized(&self) -> Option<Self> {
        let norm = self.norm();
        if norm <= NORM_EPSILON || !norm.is_finite() {
            return None;
        }
        Some(Self::new(
            self.x / norm,
            self.y / norm,
            self.z / norm,
            self.w / norm,
        ))
    }

    /// See [`quaternion_to_matrix`].
    #[must_use]
    pub fn to_matrix(&self) -> Matrix3 {
        quaternion_to_matrix(self)
    }

    /// See [`quaternion_to_euler`].
    #[must_use]
    pub fn to_euler(&self) -> EulerAngles {
        quaternion_to_euler(self)
    }

    /// See [`euler_to_quaternion`].
    #[must_use]
    pub fn from_euler(angles: &EulerAngles) -> Self {
        euler_to_quaternion(angles)
    }

    /// Returns true if `self` and `other` describe the same rotation, ie, if their normalized
    /// forms agree componentwise within `epsilon` up to an overall sign.
    ///
    /// Degenerate (near-zero) quaternions compare as the identity.
    #[must_use]
    pub fn same_rotation_as(&self, other: &Self, epsilon: f64) -> bool {
        let a = self.normalized().unwrap_or_else(Self::identity);
        let b = other.normalized().unwrap_or_else(Self::identity);
        let close = |a: &Self, b: &Self| {
            (a.x - b.x).abs() <= epsilon
                && (a.y - b.y).abs() <= epsilon
                && (a.z - b.z).abs() <= epsilon
                && (a.w - b.w).abs() <= epsilon
        };
        close(&a, &b) || close(&a, &-b)
    }

    /// Returns the equivalent nalgebra unit quaternion (the identity for degenerate input).
    #[must_use]
    pub fn to_unit(self) -> nalgebra::UnitQuaternion<f64> {
        match self.normalized() {
            Some(q) => UnitQuaternion::new_unchecked(nalgebra::Quaternion::new(q.w, q.x, q.y, q.z)),
            None => UnitQuaternion::identity(),
        }
    }

    #[must_use]
    pub fn from_unit(unit: &nalgebra::UnitQuaternion<f64>) -> Self {
        let q = unit.quaternion();
        Self::new(q.i, q.j, q.k, q.w)
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

impl Neg for Quaternion {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y, -self.z, -self.w)
    }
}

impl Display for Quaternion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}, {})", self.x, self.y, self.z, self.w)
    }
}

impl From<[f64; 4]> for Quaternion {
    fn from([x, y, z, w]: [f64; 4]) -> Self {
        Self::new(x, y, z, w)
    }
}

impl From<Quaternion> for [f64; 4] {
    fn from(q: Quaternion) -> Self {
        [q.x, q.y, q.z, q.w]
    }
}

#[cfg(any(test, feature = "approx"))]
impl AbsDiffEq<Self> for Quaternion {
    type Epsilon = <f64 as AbsDiffEq>::Epsilon;

    fn default_epsilon() -> Self::Epsilon {
        f64::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        let (a, b) = (<[f64; 4]>::from(*self), <[f64; 4]>::from(*other));
        a.iter().zip(&b).all(|(a, b)| a.abs_diff_eq(b, epsilon))
    }
}

#[cfg(any(test, feature = "approx"))]
impl RelativeEq for Quaternion {
    fn default_max_relative() -> Self::Epsilon {
        f64::default_max_relative()
    }

    fn relative_eq(
        &self,
        other: &Self,
        epsilon: Self::Epsilon,
        max_relative: Self::Epsilon,
    ) -> bool {
        let (a, b) = (<[f64; 4]>::from(*self), <[f64; 4]>::from(*other));
        a.iter()
            .zip(&b)
            .all(|(a, b)| a.relative_eq(b, epsilon, max_relative))
    }
}

/// A rotation matrix of not-yet-validated shape, as it arrives from a record.
///
/// Any shape can be held, but only 3×3 matrices and 4×4 homogeneous matrices (of which the
/// upper-left 3×3 block is used) can be converted; everything else fails with
/// [`FrameError::Shape`] at the point of use rather than being silently truncated.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(try_from = "Vec<Vec<f64>>", into = "Vec<Vec<f64>>")
)]
pub struct RotationMatrix(DMatrix<f64>);

impl RotationMatrix {
    /// Builds a matrix from row-major rows.
    ///
    /// Fails with [`FrameError::Shape`] if the rows are not all of the same length.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let ncols = rows.first().map_or(0, Vec::len);
        if let Some(ragged) = rows.iter().find(|row| row.len() != ncols) {
            return Err(FrameError::Shape {
                rows: rows.len(),
                cols: ragged.len(),
            });
        }
        Ok(Self(DMatrix::from_fn(rows.len(), ncols, |r, c| rows[r][c])))
    }

    /// Returns `(rows, columns)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        self.0.shape()
    }

    /// Returns the 3×3 rotation block, which is the whole matrix for 3×3 input and the upper-left
    /// block for 4×4 input.
    pub fn rotation_block(&self) -> Result<Matrix3> {
        match self.0.shape() {
            (3, 3) | (4, 4) => Ok(Matrix3::from_fn(|r, c| self.0[(r, c)])),
            (rows, cols) => Err(FrameError::Shape { rows, cols }),
        }
    }

    #[must_use]
    pub fn as_dmatrix(&self) -> &DMatrix<f64> {
        &self.0
    }
}

impl Display for RotationMatrix {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let (rows, cols) = self.shape();
        write!(f, "[")?;
        for r in 0..rows {
            if r > 0 {
                write!(f, ", ")?;
            }
            write!(f, "[")?;
            for c in 0..cols {
                if c > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", self.0[(r, c)])?;
            }
            write!(f, "]")?;
        }
        write!(f, "]")
    }
}

impl From<DMatrix<f64>> for RotationMatrix {
    fn from(matrix: DMatrix<f64>) -> Self {
        Self(matrix)
    }
}

impl From<Matrix3> for RotationMatrix {
    fn from(matrix: Matrix3) -> Self {
        Self(DMatrix::from_column_slice(3, 3, matrix.as_slice()))
    }
}

impl From<Matrix4> for RotationMatrix {
    fn from(matrix: Matrix4) -> Self {
        Self(DMatrix::from_column_slice(4, 4, matrix.as_slice()))
    }
}

impl TryFrom<Vec<Vec<f64>>> for RotationMatrix {
    type Error = FrameError;

    fn try_from(rows: Vec<Vec<f64>>) -> Result<Self> {
        Self::from_rows(&rows)
    }
}

impl From<RotationMatrix> for Vec<Vec<f64>> {
    fn from(matrix: RotationMatrix) -> Self {
        matrix
            .0
            .row_iter()
            .map(|row| row.iter().copied().collect())
            .collect()
    }
}

/// Orientation as ZYX intrinsic Euler angles (yaw about Z, pitch about Y', roll about X'').
///
/// Angles produced by this module lie in `roll, yaw ∈ (-π, π]` and `pitch ∈ [-π/2, π/2]`.
/// Hand-constructed values may lie outside those ranges; they are accepted as-is by
/// [`euler_to_quaternion`].
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EulerAngles {
    pub roll: Angle,
    pub pitch: Angle,
    pub yaw: Angle,
}

impl EulerAngles {
    #[must_use]
    pub fn zero() -> Self {
        Self::from_radians(0., 0., 0.)
    }

    #[must_use]
    pub fn from_radians(roll: f64, pitch: f64, yaw: f64) -> Self {
        Self {
            roll: Angle::new::<radian>(roll),
            pitch: Angle::new::<radian>(pitch),
            yaw: Angle::new::<radian>(yaw),
        }
    }

    /// Returns `(roll, pitch, yaw)` in radians.
    #[must_use]
    pub fn to_radians(&self) -> (f64, f64, f64) {
        (
            self.roll.get::<radian>(),
            self.pitch.get::<radian>(),
            self.yaw.get::<radian>(),
        )
    }

    /// Provides a builder that takes the angles in their intrinsic application order
    /// (yaw → pitch → roll) so that they cannot be passed in the wrong positions.
    ///
    /// ```
    /// use workcell_frames::rotation::EulerAngles;
    /// use uom::si::{f64::Angle, angle::degree};
    ///
    /// let angles = EulerAngles::builder()
    ///     .yaw(Angle::new::<degree>(90.))
    ///     .pitch(Angle::new::<degree>(0.))
    ///     .roll(Angle::new::<degree>(15.))
    ///     .build();
    /// assert_eq!(angles.yaw, Angle::new::<degree>(90.));
    /// ```
    ///
    /// ```compile_fail
    /// # use workcell_frames::rotation::EulerAngles;
    /// # use uom::si::{f64::Angle, angle::degree};
    /// // pitch() does not exist before yaw() has been given
    /// let angles = EulerAngles::builder()
    ///     .pitch(Angle::new::<degree>(45.))
    ///     .yaw(Angle::new::<degree>(90.))
    ///     .roll(Angle::new::<degree>(5.))
    ///     .build();
    /// ```
    pub fn builder() -> builder::EulerBuilder<builder::NeedsYaw> {
        builder::EulerBuilder::new()
    }

    /// See [`euler_to_quaternion`].
    #[must_use]
    pub fn to_quaternion(&self) -> Quaternion {
        euler_to_quaternion(self)
    }

    /// Wraps roll and yaw into (-π, π]; pitch is taken as-is.
    fn wrapped(roll: f64, pitch: f64, yaw: f64) -> Self {
        let wrap = |a: f64| BoundedAngle::new(Angle::new::<radian>(a)).to_signed_range();
        Self::from_radians(wrap(roll), pitch, wrap(yaw))
    }
}

impl Default for EulerAngles {
    fn default() -> Self {
        Self::zero()
    }
}

#[cfg(any(test, feature = "approx"))]
impl AbsDiffEq<Self> for EulerAngles {
    type Epsilon = <f64 as AbsDiffEq>::Epsilon;

    fn default_epsilon() -> Self::Epsilon {
        BoundedAngle::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        BoundedAngle::new(self.roll).abs_diff_eq(&BoundedAngle::new(other.roll), epsilon)
            && self
                .pitch
                .get::<radian>()
                .abs_diff_eq(&other.pitch.get::<radian>(), epsilon)
            && BoundedAngle::new(self.yaw).abs_diff_eq(&BoundedAngle::new(other.yaw), epsilon)
    }
}

#[cfg(any(test, feature = "approx"))]
impl RelativeEq for EulerAngles {
    fn default_max_relative() -> Self::Epsilon {
        BoundedAngle::default_max_relative()
    }

    fn relative_eq(
        &self,
        other: &Self,
        epsilon: Self::Epsilon,
        max_relative: Self::Epsilon,
    ) -> bool {
        BoundedAngle::new(self.roll).relative_eq(
            &BoundedAngle::new(other.roll),
            epsilon,
            max_relative,
        ) && self.pitch.get::<radian>().relative_eq(
            &other.pitch.get::<radian>(),
            epsilon,
            max_relative,
        ) && BoundedAngle::new(self.yaw).relative_eq(
            &BoundedAngle::new(other.yaw),
            epsilon,
            max_relative,
        )
    }
}

/// Converts a quaternion into the equivalent 3×3 rotation matrix.
///
/// The quaternion is normalized first; one with a norm at most [`NORM_EPSILON`] yields the
/// identity matrix.
#[must_use]
pub fn quaternion_to_matrix(q: &Quaternion) -> Matrix3 {
    let Some(Quaternion { x, y, z, w }) = q.normalized() else {
        return Matrix3::identity();
    };

    Matrix3::new(
        1. - 2. * (y * y + z * z),
        2. * (x * y - w * z),
        2. * (x * z + w * y),
        2. * (x * y + w * z),
        1. - 2. * (x * x + z * z),
        2. * (y * z - w * x),
        2. * (x * z - w * y),
        2. * (y * z + w * x),
        1. - 2. * (x * x + y * y),
    )
}

/// Converts a 3×3 or 4×4 rotation matrix into a unit quaternion.
///
/// Fails with [`FrameError::Shape`] for any other shape. The sign of the returned quaternion is
/// not related to the sign of any quaternion the matrix may have been built from.
pub fn matrix_to_quaternion(matrix: &RotationMatrix) -> Result<Quaternion> {
    Ok(quaternion_from_matrix3(&matrix.rotation_block()?))
}

/// Converts a 3×3 rotation matrix into a unit quaternion.
///
/// Uses the trace when it is positive, and otherwise derives the quaternion from the largest
/// diagonal element so that the divisor stays well away from zero.
#[must_use]
pub fn quaternion_from_matrix3(r: &Matrix3) -> Quaternion {
    let (r00, r01, r02) = (r[(0, 0)], r[(0, 1)], r[(0, 2)]);
    let (r10, r11, r12) = (r[(1, 0)], r[(1, 1)], r[(1, 2)]);
    let (r20, r21, r22) = (r[(2, 0)], r[(2, 1)], r[(2, 2)]);
    let trace = r00 + r11 + r22;

    let q = if trace > 0. {
        let s = 0.5 / (trace + 1.).sqrt();
        Quaternion::new((r21 - r12) * s, (r02 - r20) * s, (r10 - r01) * s, 0.25 / s)
    } else if r00 > r11 && r00 > r22 {
        let s = 2. * (1. + r00 - r11 - r22).sqrt();
        Quaternion::new(0.25 * s, (r01 + r10) / s, (r02 + r20) / s, (r21 - r12) / s)
    } else if r11 > r22 {
        let s = 2. * (1. + r11 - r00 - r22).sqrt();
        Quaternion::new((r01 + r10) / s, 0.25 * s, (r12 + r21) / s, (r02 - r20) / s)
    } else {
        let s = 2. * (1. + r22 - r00 - r11).sqrt();
        Quaternion::new((r02 + r20) / s, (r12 + r21) / s, 0.25 * s, (r10 - r01) / s)
    };

    // absorbs drift from matrices that are only approximately orthonormal
    q.normalized().unwrap_or_else(Quaternion::identity)
}

/// Converts a 3×3 or 4×4 rotation matrix into ZYX Euler angles.
///
/// Fails with [`FrameError::Shape`] for any other shape. See [`euler_from_matrix3`] for the
/// handling of gimbal lock.
pub fn matrix_to_euler(matrix: &RotationMatrix) -> Result<EulerAngles> {
    Ok(euler_from_matrix3(&matrix.rotation_block()?))
}

/// Converts a 3×3 rotation matrix into ZYX Euler angles.
///
/// When `sqrt(R00² + R10²)` drops below [`GIMBAL_EPSILON`], pitch is ±90° and yaw and roll are no
/// longer independent. In that case pitch is clamped to ±π/2, yaw is reported as 0, and roll
/// carries the remaining rotation about the (now shared) axis.
#[must_use]
pub fn euler_from_matrix3(r: &Matrix3) -> EulerAngles {
    let sy = (r[(0, 0)] * r[(0, 0)] + r[(1, 0)] * r[(1, 0)]).sqrt();

    if sy < GIMBAL_EPSILON {
        let pitch = FRAC_PI_2.copysign(-r[(2, 0)]);
        let roll = (-r[(1, 2)]).atan2(r[(1, 1)]);
        return EulerAngles::wrapped(roll, pitch, 0.);
    }

    EulerAngles::wrapped(
        r[(2, 1)].atan2(r[(2, 2)]),
        (-r[(2, 0)]).atan2(sy),
        r[(1, 0)].atan2(r[(0, 0)]),
    )
}

/// Converts a quaternion into ZYX Euler angles.
///
/// A quaternion with a norm at most [`NORM_EPSILON`] yields all-zero angles. When
/// `|sin(pitch)| ≥ 1` the orientation is in gimbal lock and the same fallback as
/// [`euler_from_matrix3`] applies: pitch is ±π/2, yaw is 0, and roll carries the rest.
#[must_use]
pub fn quaternion_to_euler(q: &Quaternion) -> EulerAngles {
    let Some(Quaternion { x, y, z, w }) = q.normalized() else {
        return EulerAngles::zero();
    };

    let sin_pitch = 2. * (w * y - z * x);
    if sin_pitch.abs() >= 1. {
        // the R12 and R11 entries of the equivalent rotation matrix
        let r12 = 2. * (y * z - w * x);
        let r11 = 1. - 2. * (x * x + z * z);
        return EulerAngles::wrapped((-r12).atan2(r11), FRAC_PI_2.copysign(sin_pitch), 0.);
    }

    let roll = (2. * (w * x + y * z)).atan2(1. - 2. * (x * x + y * y));
    let pitch = sin_pitch.asin();
    let yaw = (2. * (w * z + x * y)).atan2(1. - 2. * (y * y + z * z));
    EulerAngles::wrapped(roll, pitch, yaw)
}

/// Converts ZYX Euler angles into a unit quaternion.
#[must_use]
pub fn euler_to_quaternion(angles: &EulerAngles) -> Quaternion {
    let (roll, pitch, yaw) = angles.to_radians();
    // nalgebra composes these as Rz(yaw) * Ry(pitch) * Rx(roll), ie, the 3-2-1 sequence
    Quaternion::from_unit(&UnitQuaternion::from_euler_angles(roll, pitch, yaw))
}

/// Typestate builder for [`EulerAngles`], see [`EulerAngles::builder`].
pub mod builder {
    use super::EulerAngles;
    use std::marker::PhantomData;
    use uom::si::f64::Angle;
    use uom::ConstZero;

    /// State marker indicating yaw angle is needed next
    pub struct NeedsYaw;

    /// State marker indicating pitch angle is needed next
    pub struct NeedsPitch;

    /// State marker indicating roll angle is needed next
    pub struct NeedsRoll;

    /// State marker indicating all angles are set and ready to build
    pub struct Complete;

    #[derive(Debug)]
    pub struct EulerBuilder<State> {
        yaw: Angle,
        pitch: Angle,
        roll: Angle,
        _state: PhantomData<State>,
    }

    impl<State> EulerBuilder<State> {
        fn advance<Next>(self) -> EulerBuilder<Next> {
            EulerBuilder {
                yaw: self.yaw,
                pitch: self.pitch,
                roll: self.roll,
                _state: PhantomData,
            }
        }
    }

    impl EulerBuilder<NeedsYaw> {
        pub(crate) fn new() -> Self {
            Self {
                yaw: Angle::ZERO,
                pitch: Angle::ZERO,
                roll: Angle::ZERO,
                _state: PhantomData,
            }
        }

        /// Sets the yaw angle (rotation about Z).
        pub fn yaw(mut self, angle: impl Into<Angle>) -> EulerBuilder<NeedsPitch> {
            self.yaw = angle.into();
            self.advance()
        }
    }

    impl EulerBuilder<NeedsPitch> {
        /// Sets the pitch angle (rotation about Y' after yaw is applied).
        pub fn pitch(mut self, angle: impl Into<Angle>) -> EulerBuilder<NeedsRoll> {
            self.pitch = angle.into();
            self.advance()
        }
    }

    impl EulerBuilder<NeedsRoll> {
        /// Sets the roll angle (rotation about X'' after yaw and pitch are applied).
        pub fn roll(mut self, angle: impl Into<Angle>) -> EulerBuilder<Complete> {
            self.roll = angle.into();
            self.advance()
        }
    }

    impl EulerBuilder<Complete> {
        pub fn build(self) -> EulerAngles {
            EulerAngles {
                roll: self.roll,
                pitch: self.pitch,
                yaw: self.yaw,
            }
        }
    }
}
