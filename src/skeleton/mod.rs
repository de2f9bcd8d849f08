mod collapse;
mod crash;
mod events;
mod finalize;
mod graph;

use tracing::debug;

use crate::error::{Result, SkeletonError};
use crate::math::predicates::equivalent_pt3;
use crate::math::{Point2, Point3, Primitive};
use graph::Graph;

/// Classification of an output skeleton edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeType {
    /// A segment of the final (or collapsed) wavefront boundary.
    Wavefront,
    /// The traced motion of a wavefront vertex over time (a roof line).
    VertexPath,
}

/// A directed edge between two Steiner vertices of the output skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkeletonEdge {
    pub head: usize,
    pub tail: usize,
    pub kind: EdgeType,
}

/// The skeleton edges bordering one edge of the original input polygon.
#[derive(Debug, Clone, Default)]
pub struct Face {
    pub edges: Vec<SkeletonEdge>,
}

/// Output of a straight-skeleton computation.
///
/// Steiner vertices carry the event time as their third coordinate; edges
/// are bucketed per originating polygon face, with a fallback bucket for
/// edges bordering an unbounded region on one side.
#[derive(Debug, Clone)]
pub struct StraightSkeleton<P: Primitive> {
    pub steiner_vertices: Vec<Point3<P>>,
    pub faces: Vec<Face>,
    pub unplaced_edges: Vec<SkeletonEdge>,
}

impl<P: Primitive> StraightSkeleton<P> {
    pub(crate) fn with_faces(face_count: usize) -> Self {
        Self {
            steiner_vertices: Vec::new(),
            faces: vec![Face::default(); face_count],
            unplaced_edges: Vec::new(),
        }
    }

    /// Adds a Steiner vertex, deduplicating by position-and-time
    /// equivalence within the type's epsilon.
    ///
    /// # Errors
    ///
    /// `DegenerateGeometry` if any coordinate is non-finite.
    pub(crate) fn add_steiner_vertex(&mut self, vertex: Point3<P>) -> Result<usize> {
        if !(vertex.x.is_finite_number()
            && vertex.y.is_finite_number()
            && vertex.z.is_finite_number())
        {
            return Err(SkeletonError::DegenerateGeometry(format!(
                "non-finite Steiner vertex ({}, {}, {})",
                vertex.x, vertex.y, vertex.z
            )));
        }
        if let Some(existing) = self
            .steiner_vertices
            .iter()
            .position(|v| equivalent_pt3(*v, vertex, P::epsilon()))
        {
            return Ok(existing);
        }
        self.steiner_vertices.push(vertex);
        Ok(self.steiner_vertices.len() - 1)
    }

    /// Records a skeleton edge on its bordering faces: the right face gets
    /// `head -> tail`, the left face the reverse orientation. A side with
    /// no face lands in the unplaced bucket. Zero-length edges are
    /// silently dropped.
    pub(crate) fn add_edge(
        &mut self,
        head: usize,
        tail: usize,
        left_face: Option<usize>,
        right_face: Option<usize>,
        kind: EdgeType,
    ) {
        if head == tail {
            return;
        }
        let forward = SkeletonEdge { head, tail, kind };
        match right_face {
            Some(f) => add_unique(&mut self.faces[f].edges, forward),
            None => add_unique(&mut self.unplaced_edges, forward),
        }
        let reverse = SkeletonEdge { head: tail, tail: head, kind };
        match left_face {
            Some(f) => add_unique(&mut self.faces[f].edges, reverse),
            None => add_unique(&mut self.unplaced_edges, reverse),
        }
    }

    /// Reconstructs closed polygon loops from the skeleton's
    /// wavefront-typed edges by following head-to-tail chains.
    ///
    /// # Errors
    ///
    /// `IncompleteSkeleton` if the edge set contains an open chain or an
    /// ambiguous junction; both indicate an upstream construction bug.
    pub fn wavefront_as_vertex_loops(&self) -> Result<Vec<Vec<usize>>> {
        let mut soup = Vec::new();
        for face in &self.faces {
            for edge in &face.edges {
                if edge.kind == EdgeType::Wavefront {
                    soup.push((edge.head, edge.tail));
                }
            }
        }
        // Edges in the unplaced bucket are not needed as long as every
        // wavefront edge was assigned to its source face.
        as_vertex_loops_ordered(&soup)
    }
}

fn add_unique(dst: &mut Vec<SkeletonEdge>, edge: SkeletonEdge) {
    if let Some(existing) = dst
        .iter()
        .find(|e| e.head == edge.head && e.tail == edge.tail)
    {
        debug_assert!(existing.kind == edge.kind);
    } else {
        dst.push(edge);
    }
}

/// Chains a segment soup into vertex loops by matching ends head-to-tail.
///
/// # Errors
///
/// `IncompleteSkeleton` when a chain cannot be continued (open chain) or
/// continues ambiguously (3-or-more-way junction).
fn as_vertex_loops_ordered(segments: &[(usize, usize)]) -> Result<Vec<Vec<usize>>> {
    let mut pool: Vec<(usize, usize)> = segments.to_vec();
    let mut result = Vec::new();
    while let Some((first, second)) = pool.pop() {
        let mut working = vec![first, second];
        loop {
            let searching = working[working.len() - 1];
            let mut hit = None;
            for (i, seg) in pool.iter().enumerate() {
                if seg.0 == searching {
                    if hit.is_some() {
                        return Err(SkeletonError::IncompleteSkeleton(format!(
                            "ambiguous junction at skeleton vertex {searching}"
                        )));
                    }
                    hit = Some(i);
                }
            }
            let Some(i) = hit else {
                return Err(SkeletonError::IncompleteSkeleton(format!(
                    "open wavefront chain at skeleton vertex {searching}"
                )));
            };
            let next = pool.swap_remove(i).1;
            if working.contains(&next) {
                break;
            }
            working.push(next);
        }
        result.push(working);
    }
    Ok(result)
}

/// Computes the straight skeleton of a closed counter-clockwise polygon
/// loop by shrinking its boundary inward at unit speed.
///
/// The first and last input vertices are implicitly joined; do not repeat
/// them. `max_inset` bounds simulation time; `None` runs the wavefront to
/// topological exhaustion.
///
/// # Errors
///
/// - `MalformedInput` for loops with fewer than 2 vertices or degenerate
///   corners.
/// - `DegenerateGeometry` if the simulation reaches a state a simple,
///   non-self-intersecting input cannot produce.
pub fn calculate_straight_skeleton<P: Primitive>(
    vertices: &[Point2<P>],
    max_inset: Option<P>,
) -> Result<StraightSkeleton<P>> {
    let mut graph = Graph::from_vertex_loop(vertices)?;
    let skeleton = graph.calculate(max_inset)?;
    debug!(
        steiner_vertices = skeleton.steiner_vertices.len(),
        unplaced_edges = skeleton.unplaced_edges.len(),
        "skeleton computed"
    );
    Ok(skeleton)
}
