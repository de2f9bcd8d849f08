use thiserror::Error;

/// Top-level error type for the Skelis straight-skeleton kernel.
#[derive(Debug, Error)]
pub enum SkeletonError {
    /// The input polygon cannot be simulated: too few vertices, coincident
    /// or collinear corners that produce a degenerate vertex velocity.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The simulation reached a state a valid simple polygon should never
    /// produce: non-finite coordinates, more than two wavefront edges
    /// meeting at a pivot vertex, or simultaneous motorcycle crashes.
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// The output skeleton's wavefront edges do not form closed loops.
    /// Indicates an upstream construction bug rather than bad input.
    #[error("incomplete skeleton: {0}")]
    IncompleteSkeleton(String),
}

/// Convenience type alias for results using [`SkeletonError`].
pub type Result<T> = std::result::Result<T, SkeletonError>;
