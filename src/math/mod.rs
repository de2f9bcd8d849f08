pub mod predicates;
pub mod primitive;

pub use predicates::Winding;
pub use primitive::Primitive;

/// 2D point type, generic over the coordinate primitive.
pub type Point2<P> = nalgebra::Point2<P>;

/// 3D point type; the skeleton embeds event time as the third coordinate.
pub type Point3<P> = nalgebra::Point3<P>;

/// 2D vector type, generic over the coordinate primitive.
pub type Vector2<P> = nalgebra::Vector2<P>;
