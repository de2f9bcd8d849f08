use slotmap::{new_key_type, SlotMap};
use tracing::debug;

use super::{EdgeType, StraightSkeleton};
use crate::error::{Result, SkeletonError};
use crate::math::predicates::{equivalent_pt2, equivalent_vec2, is_zero_vec2, winding_type, Winding};
use crate::math::{Point2, Point3, Primitive, Vector2};

new_key_type! {
    /// Key of a live wavefront edge.
    pub(crate) struct WavefrontKey;
    /// Key of a live motorcycle trace.
    pub(crate) struct MotorcycleKey;
}

/// Reference from a simulation vertex to its vertex in the output skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SkeletonVertexRef {
    /// Corner ordinal of the original input polygon.
    Boundary(usize),
    /// Index into the output skeleton's Steiner vertices.
    Steiner(usize),
}

/// A vertex of the shrinking wavefront.
///
/// Velocity is computed once from the two incident wavefront edges and
/// stays constant until the vertex is frozen. Vertices are owned by the
/// [`Graph`] in a grow-only vector and referenced by index, so indices
/// stay valid across insertions.
#[derive(Debug, Clone)]
pub(crate) struct Vertex<P: Primitive> {
    pub position: Point2<P>,
    pub anchor: Option<SkeletonVertexRef>,
    pub initial_time: P,
    pub velocity: Vector2<P>,
}

/// A currently-live boundary segment of the shrinking wavefront.
///
/// `right_face` / `left_face` carry the original polygon edge ordinals the
/// segment borders; `None` marks the unbounded side.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WavefrontEdge {
    pub head: usize,
    pub tail: usize,
    pub left_face: Option<usize>,
    pub right_face: Option<usize>,
}

/// The straight-line trace of a reflex vertex.
///
/// `head` is the moving vertex; `tail` is a fixed anchor frozen at the
/// reflex vertex's original position.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MotorcycleEdge {
    pub head: usize,
    pub tail: usize,
    pub left_face: Option<usize>,
    pub right_face: Option<usize>,
}

/// Event-simulation graph for one skeleton computation.
///
/// Built once from the input loop, mutated destructively through the
/// event loop, and discarded when the skeleton has been extracted. Edge
/// collections use slotmap arenas so removal never invalidates the keys
/// held elsewhere during an event.
#[derive(Debug)]
pub(crate) struct Graph<P: Primitive> {
    pub vertices: Vec<Vertex<P>>,
    pub wavefront_edges: SlotMap<WavefrontKey, WavefrontEdge>,
    pub motorcycles: SlotMap<MotorcycleKey, MotorcycleEdge>,
    pub boundary_points: Vec<Point2<P>>,
}

/// Pivot guard for the promoted velocity solve. The coefficients are
/// unit-normalized, so the tolerance lives in `f64` no matter what the
/// coordinate type's own epsilon is.
const SOLVER_TOLERANCE: f64 = 1e-8;

/// Velocity of vertex `vex1`, assuming the segments `vex0 -> vex1` and
/// `vex1 -> vex2` both move inward at unit speed.
///
/// The two offset lines at time 1 form a 2x2 linear system; the pivot is
/// chosen by magnitude to avoid dividing by a near-zero coefficient. The
/// solve runs in `f64` and narrows back to `P` at the end. Degenerate
/// corners (zero-length edge, coincident triple) yield a zero velocity.
///
/// # Errors
///
/// Returns `DegenerateGeometry` if the solution is not representable as a
/// finite `P`.
pub(crate) fn vertex_velocity<P: Primitive>(
    vex0: Point2<P>,
    vex1: Point2<P>,
    vex2: Point2<P>,
) -> Result<Vector2<P>> {
    let zero = Vector2::new(P::zero(), P::zero());
    let eps = P::epsilon();
    if equivalent_pt2(vex0, vex2, eps) {
        return Ok(zero);
    }

    let t0 = Vector2::new(vex1.x - vex0.x, vex1.y - vex0.y);
    let t1 = Vector2::new(vex2.x - vex1.x, vex2.y - vex1.y);
    if equivalent_vec2(t0, zero, eps) || equivalent_vec2(t1, zero, eps) {
        return Ok(zero);
    }

    // Normals pointing in the direction of movement (left of each segment
    // under the counter-clockwise convention).
    let (a, b) = normalized(-t0.y.to_f64(), t0.x.to_f64());
    let (c, d) = normalized(-t1.y.to_f64(), t1.x.to_f64());

    // line 1: x*a + y*b = 1, line 2: x*c + y*d = 1 (at unit time)
    let mut b0 = 0.0f64;
    let mut b1 = 0.0f64;
    if d < -SOLVER_TOLERANCE || d > SOLVER_TOLERANCE {
        b0 = a - b * c / d;
    }
    if c < -SOLVER_TOLERANCE || c > SOLVER_TOLERANCE {
        b1 = b - a * d / c;
    }

    let (x, y);
    if b0.abs() > b1.abs() {
        if b0 > -SOLVER_TOLERANCE && b0 < SOLVER_TOLERANCE {
            return Ok(zero);
        }
        x = (1.0 - b / d) / b0;
        y = (1.0 - x * c) / d;
    } else {
        if b1 > -SOLVER_TOLERANCE && b1 < SOLVER_TOLERANCE {
            return Ok(zero);
        }
        y = (1.0 - a / c) / b1;
        x = (1.0 - y * d) / c;
    }

    debug_assert!(x * (a + c) + y * (b + d) > 0.0);

    let vx = P::from_f64(x);
    let vy = P::from_f64(y);
    match (vx, vy) {
        (Some(vx), Some(vy)) => Ok(Vector2::new(vx, vy)),
        _ => Err(SkeletonError::DegenerateGeometry(format!(
            "non-finite vertex velocity at ({}, {})",
            vex1.x, vex1.y
        ))),
    }
}

fn normalized(x: f64, y: f64) -> (f64, f64) {
    let len = (x * x + y * y).sqrt();
    (x / len, y / len)
}

/// Position of a vertex's trajectory evaluated at `time`.
pub(crate) fn position_at_time<P: Primitive>(v: &Vertex<P>, time: P) -> Point2<P> {
    let dt = time - v.initial_time;
    let p = Point2::new(v.position.x + v.velocity.x * dt, v.position.y + v.velocity.y * dt);
    debug_assert!(p.x.is_finite_number() && p.y.is_finite_number());
    p
}

/// Trajectory evaluation that leaves frozen vertices at their freeze
/// position and time instead of extrapolating them.
pub(crate) fn clamped_position_at_time<P: Primitive>(v: &Vertex<P>, time: P) -> Point3<P> {
    if equivalent_vec2(v.velocity, Vector2::new(P::zero(), P::zero()), P::epsilon()) {
        return Point3::new(v.position.x, v.position.y, v.initial_time);
    }
    let p = position_at_time(v, time);
    Point3::new(p.x, p.y, time)
}

pub(crate) fn is_frozen<P: Primitive>(v: &Vertex<P>) -> bool {
    is_zero_vec2(v.velocity)
}

/// Pins a vertex at its position at `time`. Frozen vertices keep velocity
/// exactly zero and are never mutated again.
pub(crate) fn freeze_in_place<P: Primitive>(v: &mut Vertex<P>, time: P) {
    v.position = position_at_time(v, time);
    v.initial_time = time;
    v.anchor = None;
    v.velocity = Vector2::new(P::zero(), P::zero());
}

impl<P: Primitive> Graph<P> {
    /// Builds the initial event-simulation graph from a closed
    /// counter-clockwise vertex loop (first and last vertices implicitly
    /// joined, not duplicated).
    ///
    /// # Errors
    ///
    /// `MalformedInput` if fewer than 2 vertices are supplied or a corner
    /// is degenerate (coincident or collinear neighbours produce a zero
    /// vertex velocity).
    pub(crate) fn from_vertex_loop(vertices: &[Point2<P>]) -> Result<Self> {
        let n = vertices.len();
        if n < 2 {
            return Err(SkeletonError::MalformedInput(format!(
                "a polygon loop needs at least 2 vertices, got {n}"
            )));
        }

        let mut graph = Self {
            vertices: Vec::with_capacity(n),
            wavefront_edges: SlotMap::with_capacity_and_key(n),
            motorcycles: SlotMap::with_key(),
            boundary_points: vertices.to_vec(),
        };

        // Each polygon segment becomes a wavefront edge; each vertex gets
        // the velocity at which the two adjacent offset lines drag it.
        for v in 0..n {
            let v0 = (v + n - 1) % n;
            let v2 = (v + 1) % n;
            graph.wavefront_edges.insert(WavefrontEdge {
                head: v2,
                tail: v,
                left_face: None,
                right_face: Some(v),
            });

            let velocity = vertex_velocity(vertices[v0], vertices[v], vertices[v2])?;
            if equivalent_vec2(velocity, Vector2::new(P::zero(), P::zero()), P::epsilon()) {
                return Err(SkeletonError::MalformedInput(format!(
                    "degenerate corner at vertex {v} ({}, {})",
                    vertices[v].x, vertices[v].y
                )));
            }
            graph.vertices.push(Vertex {
                position: vertices[v],
                anchor: Some(SkeletonVertexRef::Boundary(v)),
                initial_time: P::zero(),
                velocity,
            });
        }

        // Reflex vertices (winding to the right in a CCW loop) launch a
        // motorcycle: a fixed anchor at the original position plus the
        // trace of the moving head.
        let threshold = P::winding_threshold();
        for v in 0..n {
            let v0 = (v + n - 1) % n;
            let v2 = (v + 1) % n;
            if winding_type(vertices[v0], vertices[v], vertices[v2], threshold) == Winding::Right {
                let anchor = graph.vertices.len();
                graph.vertices.push(Vertex {
                    position: vertices[v],
                    anchor: Some(SkeletonVertexRef::Boundary(v)),
                    initial_time: P::zero(),
                    velocity: Vector2::new(P::zero(), P::zero()),
                });
                graph.motorcycles.insert(MotorcycleEdge {
                    head: v,
                    tail: anchor,
                    left_face: Some(v0),
                    right_face: Some(v),
                });
            }
        }

        debug!(
            vertices = graph.vertices.len(),
            wavefront_edges = graph.wavefront_edges.len(),
            motorcycles = graph.motorcycles.len(),
            "built wavefront graph"
        );
        Ok(graph)
    }

    /// Finds the unique incoming (`head == pivot`) and outgoing
    /// (`tail == pivot`) wavefront edges at a vertex.
    ///
    /// # Errors
    ///
    /// `DegenerateGeometry` if more than two edges meet at the pivot.
    pub(crate) fn find_in_and_out(
        &self,
        pivot: usize,
    ) -> Result<(Option<WavefrontKey>, Option<WavefrontKey>)> {
        let mut incoming = None;
        let mut outgoing = None;
        for (key, edge) in &self.wavefront_edges {
            if edge.head == pivot {
                if incoming.is_some() {
                    return Err(SkeletonError::DegenerateGeometry(format!(
                        "more than one wavefront edge ends at vertex {pivot}"
                    )));
                }
                incoming = Some(key);
            } else if edge.tail == pivot {
                if outgoing.is_some() {
                    return Err(SkeletonError::DegenerateGeometry(format!(
                        "more than one wavefront edge starts at vertex {pivot}"
                    )));
                }
                outgoing = Some(key);
            }
        }
        Ok((incoming, outgoing))
    }

    /// Resolves a vertex's skeleton reference to a Steiner vertex index,
    /// materializing boundary corners at time zero on first use.
    ///
    /// # Errors
    ///
    /// `DegenerateGeometry` if the vertex has no skeleton reference.
    pub(crate) fn resolve_anchor(
        &self,
        dst: &mut StraightSkeleton<P>,
        v: usize,
    ) -> Result<usize> {
        match self.vertices[v].anchor {
            Some(SkeletonVertexRef::Boundary(q)) => {
                let corner = self.boundary_points[q];
                dst.add_steiner_vertex(Point3::new(corner.x, corner.y, P::zero()))
            }
            Some(SkeletonVertexRef::Steiner(s)) => Ok(s),
            None => Err(SkeletonError::DegenerateGeometry(format!(
                "vertex {v} has no skeleton vertex to connect to"
            ))),
        }
    }

    /// Emits the vertex-path skeleton edge tracing vertex `v`'s motion to
    /// `final_vert`, attributing it to the faces of the edges currently
    /// incident at `v`.
    pub(crate) fn add_edge_for_vertex_path(
        &self,
        dst: &mut StraightSkeleton<P>,
        v: usize,
        final_vert: usize,
    ) -> Result<()> {
        let (in_edge, out_edge) = self.find_in_and_out(v)?;
        let left_face = in_edge.and_then(|k| self.wavefront_edges[k].right_face);
        let right_face = out_edge.and_then(|k| self.wavefront_edges[k].right_face);

        let vert = &self.vertices[v];
        match vert.anchor {
            Some(SkeletonVertexRef::Boundary(q)) => {
                let n = self.boundary_points.len();
                let corner = self.boundary_points[q];
                let skel = dst.add_steiner_vertex(Point3::new(corner.x, corner.y, P::zero()))?;
                // A boundary corner borders its two original polygon faces
                // in addition to whatever the live wavefront says.
                dst.add_edge(final_vert, skel, Some((q + n - 1) % n), Some(q), EdgeType::VertexPath);
                dst.add_edge(final_vert, skel, left_face, right_face, EdgeType::VertexPath);
            }
            Some(SkeletonVertexRef::Steiner(s)) => {
                dst.add_edge(final_vert, s, left_face, right_face, EdgeType::VertexPath);
            }
            None => {
                let skel = dst.add_steiner_vertex(Point3::new(
                    vert.position.x,
                    vert.position.y,
                    vert.initial_time,
                ))?;
                dst.add_edge(final_vert, skel, left_face, right_face, EdgeType::VertexPath);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_square() -> Vec<Point2<f64>> {
        vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ]
    }

    fn l_shape() -> Vec<Point2<f64>> {
        vec![
            Point2::new(0.0, 0.0),
            Point2::new(2.0, 0.0),
            Point2::new(2.0, 1.0),
            Point2::new(1.0, 1.0),
            Point2::new(1.0, 2.0),
            Point2::new(0.0, 2.0),
        ]
    }

    #[test]
    fn square_builder_layout() {
        let graph = Graph::from_vertex_loop(&unit_square()).unwrap();
        assert_eq!(graph.vertices.len(), 4);
        assert_eq!(graph.wavefront_edges.len(), 4);
        assert!(graph.motorcycles.is_empty());
    }

    #[test]
    fn square_corner_velocities_point_inward() {
        let graph = Graph::from_vertex_loop(&unit_square()).unwrap();
        let v = graph.vertices[0].velocity;
        assert_relative_eq!(v.x, 1.0, epsilon = 1e-9);
        assert_relative_eq!(v.y, 1.0, epsilon = 1e-9);
        let v = graph.vertices[2].velocity;
        assert_relative_eq!(v.x, -1.0, epsilon = 1e-9);
        assert_relative_eq!(v.y, -1.0, epsilon = 1e-9);
    }

    #[test]
    fn reflex_vertex_gets_one_motorcycle() {
        let graph = Graph::from_vertex_loop(&l_shape()).unwrap();
        assert_eq!(graph.motorcycles.len(), 1);
        let motor = graph.motorcycles.values().next().unwrap();
        // The reflex corner of the L-shape is vertex 3 at (1, 1).
        assert_eq!(motor.head, 3);
        let anchor = &graph.vertices[motor.tail];
        assert!(is_frozen(anchor));
        assert_relative_eq!(anchor.position.x, 1.0);
        assert_relative_eq!(anchor.position.y, 1.0);
    }

    #[test]
    fn reflex_velocity_heads_into_the_notch() {
        let graph = Graph::from_vertex_loop(&l_shape()).unwrap();
        let v = graph.vertices[3].velocity;
        assert_relative_eq!(v.x, -1.0, epsilon = 1e-9);
        assert_relative_eq!(v.y, -1.0, epsilon = 1e-9);
    }

    #[test]
    fn too_few_vertices_is_malformed() {
        let r = Graph::<f64>::from_vertex_loop(&[Point2::new(0.0, 0.0)]);
        assert!(matches!(r, Err(SkeletonError::MalformedInput(_))));
    }

    #[test]
    fn degenerate_two_point_loop_is_malformed() {
        let r = Graph::from_vertex_loop(&[Point2::new(0.0f64, 0.0), Point2::new(1.0, 0.0)]);
        assert!(matches!(r, Err(SkeletonError::MalformedInput(_))));
    }

    #[test]
    fn find_in_and_out_on_fresh_square() {
        let graph = Graph::from_vertex_loop(&unit_square()).unwrap();
        let (incoming, outgoing) = graph.find_in_and_out(2).unwrap();
        let incoming = graph.wavefront_edges[incoming.unwrap()];
        let outgoing = graph.wavefront_edges[outgoing.unwrap()];
        assert_eq!(incoming.head, 2);
        assert_eq!(incoming.tail, 1);
        assert_eq!(outgoing.tail, 2);
        assert_eq!(outgoing.head, 3);
    }

    #[test]
    fn position_evaluation_moves_with_velocity() {
        let graph = Graph::from_vertex_loop(&unit_square()).unwrap();
        let p = position_at_time(&graph.vertices[0], 0.25);
        assert_relative_eq!(p.x, 0.25, epsilon = 1e-9);
        assert_relative_eq!(p.y, 0.25, epsilon = 1e-9);
    }

    #[test]
    fn freezing_pins_position_and_time() {
        let graph = Graph::from_vertex_loop(&unit_square()).unwrap();
        let mut v = graph.vertices[0].clone();
        freeze_in_place(&mut v, 0.5);
        assert!(is_frozen(&v));
        assert_relative_eq!(v.position.x, 0.5, epsilon = 1e-9);
        assert_relative_eq!(v.initial_time, 0.5);
        assert_eq!(v.anchor, None);
        let clamped = clamped_position_at_time(&v, 2.0);
        assert_relative_eq!(clamped.z, 0.5);
    }

    #[test]
    fn integer_square_velocities() {
        let square = vec![
            Point2::new(0i32, 0),
            Point2::new(10, 0),
            Point2::new(10, 10),
            Point2::new(0, 10),
        ];
        let graph = Graph::from_vertex_loop(&square).unwrap();
        assert_eq!(graph.vertices[0].velocity, Vector2::new(1, 1));
        assert_eq!(graph.vertices[1].velocity, Vector2::new(-1, 1));
    }

    #[test]
    fn integer_velocity_solver_is_exact_on_axis_aligned_corners() {
        // The solve promotes to f64; its pivot guard must not pick up the
        // integer epsilon, which would zero out every coefficient.
        let v = vertex_velocity(Point2::new(0i32, 10), Point2::new(0, 0), Point2::new(10, 0))
            .unwrap();
        assert_eq!(v, Vector2::new(1, 1));
        let v = vertex_velocity(Point2::new(2i32, 1), Point2::new(1, 1), Point2::new(1, 2))
            .unwrap();
        assert_eq!(v, Vector2::new(-1, -1));
    }
}
