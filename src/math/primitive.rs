use num_traits::{NumAssign, Signed};

/// Coordinate primitive for skeleton computations.
///
/// The algorithm is generic over the scalar type; the conformance set is
/// `f32`, `f64` and `i32`. Every tolerance used downstream is resolved
/// through this trait so that a comparison can never pick up the epsilon
/// of the wrong element type. The integer instantiation uses an epsilon
/// of 1, which makes all equivalence checks exact.
pub trait Primitive:
    nalgebra::Scalar + Copy + PartialOrd + NumAssign + Signed + std::fmt::Display
{
    /// Component-wise equivalence tolerance for this coordinate type.
    fn epsilon() -> Self;

    /// Looser tolerance used to accept that two evaluated trajectories
    /// actually meet (the residual on the non-pivot axis).
    fn meet_tolerance() -> Self;

    /// Signed-area threshold below which three points count as collinear
    /// when classifying winding.
    fn winding_threshold() -> Self;

    /// Returns `true` if the value is a usable finite number.
    fn is_finite_number(self) -> bool;

    /// Widens to `f64` for square roots and normalization.
    fn to_f64(self) -> f64;

    /// Narrows from `f64`, truncating for integer primitives.
    ///
    /// Returns `None` for non-finite or unrepresentable values; callers
    /// surface that as a degenerate-geometry error.
    fn from_f64(value: f64) -> Option<Self>;
}

impl Primitive for f32 {
    fn epsilon() -> Self {
        1e-4
    }

    fn meet_tolerance() -> Self {
        1e-3
    }

    fn winding_threshold() -> Self {
        1e-6
    }

    fn is_finite_number(self) -> bool {
        self.is_finite()
    }

    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn from_f64(value: f64) -> Option<Self> {
        value.is_finite().then_some(value as f32)
    }
}

impl Primitive for f64 {
    fn epsilon() -> Self {
        1e-8
    }

    fn meet_tolerance() -> Self {
        1e-3
    }

    fn winding_threshold() -> Self {
        1e-6
    }

    fn is_finite_number(self) -> bool {
        self.is_finite()
    }

    fn to_f64(self) -> f64 {
        self
    }

    fn from_f64(value: f64) -> Option<Self> {
        value.is_finite().then_some(value)
    }
}

impl Primitive for i32 {
    fn epsilon() -> Self {
        1
    }

    fn meet_tolerance() -> Self {
        1
    }

    fn winding_threshold() -> Self {
        0
    }

    fn is_finite_number(self) -> bool {
        true
    }

    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn from_f64(value: f64) -> Option<Self> {
        (value.is_finite() && value > f64::from(i32::MIN) - 1.0 && value < f64::from(i32::MAX) + 1.0)
            .then_some(value as i32)
    }
}
