use super::{Point2, Point3, Primitive, Vector2};

/// Turn direction of the path `a -> b -> c`.
///
/// Inputs are assumed to live in a counter-clockwise space (+Y up, +X
/// right); a convex corner of a CCW polygon winds `Left`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winding {
    Left,
    Right,
    Straight,
}

/// Classifies the winding of `a -> b -> c` by the sign of twice the signed
/// triangle area, with `threshold` absorbing near-collinear noise.
#[must_use]
pub fn winding_type<P: Primitive>(a: Point2<P>, b: Point2<P>, c: Point2<P>, threshold: P) -> Winding {
    let sign = (b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y);
    if sign > threshold {
        return Winding::Left;
    }
    if sign < -threshold {
        return Winding::Right;
    }
    Winding::Straight
}

/// Scalar equivalence within `eps`.
#[must_use]
pub fn equivalent<P: Primitive>(a: P, b: P, eps: P) -> bool {
    (a - b).abs() < eps
}

/// Component-wise 2D point equivalence within `eps`.
#[must_use]
pub fn equivalent_pt2<P: Primitive>(a: Point2<P>, b: Point2<P>, eps: P) -> bool {
    equivalent(a.x, b.x, eps) && equivalent(a.y, b.y, eps)
}

/// Component-wise 3D point equivalence within `eps`.
#[must_use]
pub fn equivalent_pt3<P: Primitive>(a: Point3<P>, b: Point3<P>, eps: P) -> bool {
    equivalent(a.x, b.x, eps) && equivalent(a.y, b.y, eps) && equivalent(a.z, b.z, eps)
}

/// Component-wise 2D vector equivalence within `eps`.
#[must_use]
pub fn equivalent_vec2<P: Primitive>(a: Vector2<P>, b: Vector2<P>, eps: P) -> bool {
    equivalent(a.x, b.x, eps) && equivalent(a.y, b.y, eps)
}

/// Returns `true` once a vertex velocity has been zeroed out exactly.
///
/// Deliberately an exact comparison: freezing writes literal zeros, and a
/// merely-slow vertex must not be mistaken for a frozen one.
#[must_use]
pub fn is_zero_vec2<P: Primitive>(v: Vector2<P>) -> bool {
    v.x == P::zero() && v.y == P::zero()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn winding_convex_ccw_is_left() {
        let w = winding_type(
            Point2::new(0.0f64, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            f64::winding_threshold(),
        );
        assert_eq!(w, Winding::Left);
    }

    #[test]
    fn winding_reflex_ccw_is_right() {
        let w = winding_type(
            Point2::new(2.0f64, 1.0),
            Point2::new(1.0, 1.0),
            Point2::new(1.0, 2.0),
            f64::winding_threshold(),
        );
        assert_eq!(w, Winding::Right);
    }

    #[test]
    fn winding_collinear_is_straight() {
        let w = winding_type(
            Point2::new(0.0f64, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(2.0, 2.0),
            f64::winding_threshold(),
        );
        assert_eq!(w, Winding::Straight);
    }

    #[test]
    fn winding_integer_coordinates() {
        let w = winding_type(
            Point2::new(0i32, 0),
            Point2::new(10, 0),
            Point2::new(10, 10),
            i32::winding_threshold(),
        );
        assert_eq!(w, Winding::Left);
    }

    #[test]
    fn equivalence_uses_type_epsilon() {
        assert!(equivalent(1.0f64, 1.0 + 1e-9, f64::epsilon()));
        assert!(!equivalent(1.0f64, 1.0 + 1e-7, f64::epsilon()));
        // Integer epsilon of 1 means only identical values are equivalent.
        assert!(equivalent(5i32, 5, i32::epsilon()));
        assert!(!equivalent(5i32, 6, i32::epsilon()));
    }

    #[test]
    fn zero_vector_is_exact() {
        assert!(is_zero_vec2(Vector2::new(0.0f64, 0.0)));
        assert!(!is_zero_vec2(Vector2::new(1e-12f64, 0.0)));
    }
}
