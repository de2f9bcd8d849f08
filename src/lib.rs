pub mod error;
pub mod math;
pub mod skeleton;

pub use error::{Result, SkeletonError};
pub use skeleton::{calculate_straight_skeleton, EdgeType, Face, SkeletonEdge, StraightSkeleton};
