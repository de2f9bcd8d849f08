use super::graph::{
    freeze_in_place, is_frozen, position_at_time, vertex_velocity, Graph, SkeletonVertexRef,
    Vertex, WavefrontKey,
};
use super::StraightSkeleton;
use crate::error::{Result, SkeletonError};
use crate::math::{Point2, Point3, Primitive, Vector2};

/// A maximal chain of edges collapsing to the same point.
struct CollapseGroup {
    head: usize,
    tail: usize,
    new_vertex: usize,
}

/// Processes one batch of simultaneous edge collapses.
///
/// Edges collapsing at the same time are grouped into connected chains;
/// each chain contracts to a single Steiner vertex. The chain's outer
/// neighbours are re-linked to a fresh wavefront vertex placed there,
/// unless the chain was a complete loop, which simply vanishes.
pub(crate) fn process_collapses<P: Primitive>(
    graph: &mut Graph<P>,
    skeleton: &mut StraightSkeleton<P>,
    best_collapse: &[(P, WavefrontKey)],
    collapse_time: P,
) -> Result<()> {
    let two = P::one() + P::one();

    // Chain edges into groups by walking shared vertices in both
    // directions. Walks terminate when the chain closes on itself.
    let mut group_of: Vec<Option<usize>> = vec![None; best_collapse.len()];
    let mut groups: Vec<CollapseGroup> = Vec::new();
    for c in 0..best_collapse.len() {
        if group_of[c].is_some() {
            continue;
        }
        let group = groups.len();
        group_of[c] = Some(group);

        let mut searching_tail = graph.wavefront_edges[best_collapse[c].1].tail;
        loop {
            let hit = best_collapse
                .iter()
                .position(|&(_, key)| graph.wavefront_edges[key].head == searching_tail);
            let Some(i) = hit else { break };
            if group_of[i] == Some(group) {
                break;
            }
            debug_assert!(group_of[i].is_none());
            group_of[i] = Some(group);
            searching_tail = graph.wavefront_edges[best_collapse[i].1].tail;
        }

        let mut searching_head = graph.wavefront_edges[best_collapse[c].1].head;
        loop {
            let hit = best_collapse
                .iter()
                .position(|&(_, key)| graph.wavefront_edges[key].tail == searching_head);
            let Some(i) = hit else { break };
            if group_of[i] == Some(group) {
                break;
            }
            debug_assert!(group_of[i].is_none());
            group_of[i] = Some(group);
            searching_head = graph.wavefront_edges[best_collapse[i].1].head;
        }

        groups.push(CollapseGroup {
            head: searching_head,
            tail: searching_tail,
            new_vertex: usize::MAX,
        });
    }

    for (group, info) in groups.iter_mut().enumerate() {
        // All endpoints of a chain arrive at the same point; average them
        // to keep the collision symmetric under vertex ordering.
        let mut sum_x = P::zero();
        let mut sum_y = P::zero();
        let mut contributors = P::zero();
        for (c, &(_, key)) in best_collapse.iter().enumerate() {
            if group_of[c] != Some(group) {
                continue;
            }
            let seg = graph.wavefront_edges[key];
            debug_assert!(!is_frozen(&graph.vertices[seg.head]));
            debug_assert!(!is_frozen(&graph.vertices[seg.tail]));
            let head_pos = position_at_time(&graph.vertices[seg.head], collapse_time);
            let tail_pos = position_at_time(&graph.vertices[seg.tail], collapse_time);
            sum_x += head_pos.x + tail_pos.x;
            sum_y += head_pos.y + tail_pos.y;
            contributors += two;
        }
        let collision = Point2::new(sum_x / contributors, sum_y / contributors);
        let collision_vert =
            skeleton.add_steiner_vertex(Point3::new(collision.x, collision.y, collapse_time))?;

        for (c, &(_, key)) in best_collapse.iter().enumerate() {
            if group_of[c] != Some(group) {
                continue;
            }
            let seg = graph.wavefront_edges[key];
            graph.add_edge_for_vertex_path(skeleton, seg.head, collision_vert)?;
            graph.add_edge_for_vertex_path(skeleton, seg.tail, collision_vert)?;
            freeze_in_place(&mut graph.vertices[seg.tail], collapse_time);
            freeze_in_place(&mut graph.vertices[seg.head], collapse_time);
        }

        info.new_vertex = graph.vertices.len();
        graph.vertices.push(Vertex {
            position: collision,
            anchor: Some(SkeletonVertexRef::Steiner(collision_vert)),
            initial_time: collapse_time,
            velocity: Vector2::new(P::zero(), P::zero()),
        });
    }

    for &(_, key) in best_collapse {
        graph.wavefront_edges.remove(key);
    }

    // Splice each open chain's neighbours onto its replacement vertex and
    // give it the velocity of the newly-formed corner. A chain whose walk
    // closed on itself consumed an entire sub-loop and leaves nothing.
    for info in &groups {
        if info.head == info.tail {
            continue;
        }
        let (incoming, _) = graph.find_in_and_out(info.tail)?;
        let (_, outgoing) = graph.find_in_and_out(info.head)?;
        let (Some(incoming), Some(outgoing)) = (incoming, outgoing) else {
            return Err(SkeletonError::DegenerateGeometry(format!(
                "collapse chain between vertices {} and {} lost its neighbours",
                info.tail, info.head
            )));
        };
        graph.wavefront_edges[incoming].head = info.new_vertex;
        graph.wavefront_edges[outgoing].tail = info.new_vertex;

        let calc_time = graph.vertices[info.new_vertex].initial_time;
        let before = position_at_time(
            &graph.vertices[graph.wavefront_edges[incoming].tail],
            calc_time,
        );
        let here = graph.vertices[info.new_vertex].position;
        let after = position_at_time(
            &graph.vertices[graph.wavefront_edges[outgoing].head],
            calc_time,
        );
        graph.vertices[info.new_vertex].velocity = vertex_velocity(before, here, after)?;
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::events::collapse_time;
    use super::*;
    use approx::assert_relative_eq;
    use crate::math::predicates::equivalent_pt3;

    fn square_graph() -> Graph<f64> {
        Graph::from_vertex_loop(&[
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ])
        .unwrap()
    }

    #[test]
    fn full_square_collapse_consumes_the_loop() {
        let mut graph = square_graph();
        let mut skeleton = StraightSkeleton::with_faces(4);
        let batch: Vec<(f64, WavefrontKey)> = graph
            .wavefront_edges
            .iter()
            .map(|(key, edge)| {
                (
                    collapse_time(&graph.vertices[edge.head], &graph.vertices[edge.tail]).unwrap(),
                    key,
                )
            })
            .collect();
        process_collapses(&mut graph, &mut skeleton, &batch, 0.5).unwrap();

        assert!(graph.wavefront_edges.is_empty());
        assert!(skeleton
            .steiner_vertices
            .iter()
            .any(|v| equivalent_pt3(*v, Point3::new(0.5, 0.5, 0.5), 1e-9)));
        // All four original corners froze in place.
        for v in 0..4 {
            assert!(is_frozen(&graph.vertices[v]));
        }
    }

    #[test]
    fn single_edge_collapse_splices_neighbours() {
        // A trapezoid; contract its short top edge.
        let mut graph = Graph::from_vertex_loop(&[
            Point2::new(0.0f64, 0.0),
            Point2::new(4.0, 0.0),
            Point2::new(3.0, 1.0),
            Point2::new(1.0, 1.0),
        ])
        .unwrap();
        let mut skeleton = StraightSkeleton::with_faces(4);

        let (key, edge) = graph
            .wavefront_edges
            .iter()
            .find(|(_, e)| e.head == 3 && e.tail == 2)
            .unwrap();
        let t = collapse_time(&graph.vertices[edge.head], &graph.vertices[edge.tail]).unwrap();
        process_collapses(&mut graph, &mut skeleton, &[(t, key)], t).unwrap();

        assert_eq!(graph.wavefront_edges.len(), 3);
        let replacement = graph.vertices.len() - 1;
        let (incoming, outgoing) = graph.find_in_and_out(replacement).unwrap();
        assert!(incoming.is_some() && outgoing.is_some());
        // The new corner sits on the symmetry axis and keeps moving.
        let v = &graph.vertices[replacement];
        assert_relative_eq!(v.position.x, 2.0, epsilon = 1e-9);
        assert!(!is_frozen(v));
        assert!(v.velocity.y > 0.0);
    }
}
