use uom::si::angle::radian;
use uom::si::f64::Angle;

#[cfg(any(test, feature = "approx"))]
use approx::{AbsDiffEq, RelativeEq};

/// An angle kept on the circle, reported in the half-open range used for roll and yaw.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct BoundedAngle {
    angle: Angle,
}

impl BoundedAngle {
    pub(crate) fn new(angle: impl Into<Angle>) -> Self {
        Self {
            // NOTE: uom may store the value differently-normalized, so we normalize on output too.
            angle: Angle::new::<radian>(Self::into_bounds(angle.into())),
        }
    }

    /// Returns the angle in [0, 2π) in radians.
    pub(crate) fn get_bounded(self) -> f64 {
        Self::into_bounds(self.angle)
    }

    fn into_bounds(angle: Angle) -> f64 {
        let out_of_bounds: f64 = angle.get::<radian>();
        out_of_bounds.rem_euclid(Angle::FULL_TURN.get::<radian>())
    }

    /// Returns the angle in (-π, π] in radians.
    ///
    /// `atan2` may hand back exactly -π for a half turn; this folds it onto +π so that roll and
    /// yaw have a single representation for every orientation.
    pub(crate) fn to_signed_range(self) -> f64 {
        let angle = self.get_bounded();
        if angle <= Angle::HALF_TURN.get::<radian>() {
            angle
        } else {
            angle - Angle::FULL_TURN.get::<radian>()
        }
    }
}

#[cfg(any(test, feature = "approx"))]
impl AbsDiffEq<Self> for BoundedAngle {
    type Epsilon = <f64 as AbsDiffEq>::Epsilon;

    fn default_epsilon() -> Self::Epsilon {
        // this is very accurate in radians
        0.000_000_001
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        Self::new(self.angle - other.angle).to_signed_range().abs() <= epsilon
    }
}

#[cfg(any(test, feature = "approx"))]
impl RelativeEq for BoundedAngle {
    fn default_max_relative() -> Self::Epsilon {
        f64::default_max_relative()
    }

    fn relative_eq(
        &self,
        other: &Self,
        epsilon: Self::Epsilon,
        max_relative: Self::Epsilon,
    ) -> bool {
        let bounded = self.get_bounded();
        let other_bounded = other.get_bounded();

        let min = f64::min(bounded, other_bounded);
        let max = f64::max(bounded, other_bounded);

        f64::relative_eq(&min, &max, epsilon, max_relative)
            || f64::relative_eq(
                &(min + Angle::FULL_TURN.get::<radian>()),
                &max,
                epsilon,
                max_relative,
            )
    }
}

/// Serde adapters that store homogeneous matrices as row-major lists of rows.
///
/// nalgebra's own serde support writes the column-major storage as one flat list, which is not
/// what record consumers expect for a `tcp_pose` or a trajectory waypoint.
#[cfg(feature = "serde")]
pub(crate) mod row_major {
    use crate::Matrix4;

    type Rows = [[f64; 4]; 4];

    fn to_rows(matrix: &Matrix4) -> Rows {
        let mut rows = [[0.; 4]; 4];
        for (r, row) in rows.iter_mut().enumerate() {
            for (c, value) in row.iter_mut().enumerate() {
                *value = matrix[(r, c)];
            }
        }
        rows
    }

    fn from_rows(rows: Rows) -> Matrix4 {
        Matrix4::from_fn(|r, c| rows[r][c])
    }

    pub(crate) mod option {
        use super::{from_rows, to_rows, Rows};
        use crate::Matrix4;
        use serde::{Deserialize, Deserializer, Serialize, Serializer};

        pub(crate) fn serialize<S>(matrix: &Option<Matrix4>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            matrix.as_ref().map(to_rows).serialize(serializer)
        }

        pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Option<Matrix4>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Ok(Option::<Rows>::deserialize(deserializer)?.map(from_rows))
        }
    }

    pub(crate) mod vec {
        use super::{from_rows, to_rows, Rows};
        use crate::Matrix4;
        use serde::{Deserialize, Deserializer, Serialize, Serializer};

        pub(crate) fn serialize<S>(matrices: &[Matrix4], serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            matrices
                .iter()
                .map(to_rows)
                .collect::<Vec<_>>()
                .serialize(serializer)
        }

        pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Matrix4>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Ok(Vec::<Rows>::deserialize(deserializer)?
                .into_iter()
                .map(from_rows)
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::util::BoundedAngle;
    use approx::{assert_abs_diff_eq, assert_abs_diff_ne, assert_relative_eq};
    use rstest::rstest;
    use uom::si::angle::{degree, radian};
    use uom::si::f64::Angle;

    fn d(degrees: f64) -> Angle {
        Angle::new::<degree>(degrees)
    }

    #[test]
    fn bounded_angle_negative_degrees() {
        let sut = BoundedAngle::new(d(-390.));
        assert_relative_eq!(sut.get_bounded(), 330.0_f64.to_radians(), epsilon = 1e-12);
    }

    #[test]
    fn negative_half_turn_folds_onto_positive_half_turn() {
        let sut = BoundedAngle::new(-Angle::HALF_TURN);
        assert_eq!(sut.to_signed_range(), std::f64::consts::PI);
    }

    #[rstest]
    #[case(d(0.), 0.)]
    #[case(d(90.), 90.)]
    #[case(d(359.), -1.)]
    #[case(d(270.), -90.)]
    #[case(d(-90.), -90.)]
    #[case(d(360.), 0.)]
    #[case(d(360. + 120.), 120.)]
    #[case(d(360. + 340.), -20.)]
    fn to_signed_range_is_half_open_below(#[case] input: Angle, #[case] expected_degrees: f64) {
        assert_relative_eq!(
            BoundedAngle::new(input).to_signed_range(),
            expected_degrees.to_radians(),
            epsilon = f64::EPSILON * 1000.
        );
    }

    #[rstest]
    #[case(179.999_999, -179.999_999, 1e-5, true)]
    #[case(0., 360., 1e-9, true)]
    #[case(10., 12., 1e-3, false)]
    fn comparison_wraps_around_the_circle(
        #[case] a: f64,
        #[case] b: f64,
        #[case] epsilon_degrees: f64,
        #[case] expected: bool,
    ) {
        let a = BoundedAngle::new(d(a));
        let b = BoundedAngle::new(d(b));
        let epsilon = Angle::new::<degree>(epsilon_degrees).get::<radian>();
        if expected {
            assert_abs_diff_eq!(a, b, epsilon = epsilon);
        } else {
            assert_abs_diff_ne!(a, b, epsilon = epsilon);
        }
    }

    #[cfg(feature = "serde")]
    #[test]
    fn row_major_matrices_keep_translation_in_last_column() {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct Holder {
            #[serde(with = "super::row_major::option")]
            pose: Option<crate::Matrix4>,
        }

        let pose = crate::Matrix4::new_translation(&crate::Vector3::new(100., 200., 300.));
        let yaml = serde_yaml::to_string(&Holder { pose: Some(pose) }).unwrap();
        let rows: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(rows["pose"][0][3], serde_yaml::Value::from(100.));
        assert_eq!(rows["pose"][2][3], serde_yaml::Value::from(300.));
        assert_eq!(rows["pose"][3][3], serde_yaml::Value::from(1.));

        let back: Holder = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.pose, Some(pose));
    }
}
