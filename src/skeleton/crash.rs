use super::events::CrashEvent;
use super::graph::{
    clamped_position_at_time, freeze_in_place, position_at_time, vertex_velocity, Graph,
    MotorcycleKey, SkeletonVertexRef, Vertex, WavefrontEdge,
};
use super::{EdgeType, StraightSkeleton};
use crate::error::{Result, SkeletonError};
use crate::math::predicates::equivalent_pt3;
use crate::math::{Point2, Point3, Primitive};

/// Processes a motorcycle head striking the interior of a wavefront edge.
///
/// The struck edge is split at the crash point. On each side of the
/// crash, the motorcycle head's neighbouring wavefront edge either gets a
/// fresh moving vertex at the crash point, or, when the neighbour already
/// ends where the struck edge does, the two collapse together and the
/// stump is closed off. Finally the motorcycle's trace is emitted as a
/// vertex path and its head is frozen.
pub(crate) fn process_crash<P: Primitive>(
    graph: &mut Graph<P>,
    skeleton: &mut StraightSkeleton<P>,
    event: CrashEvent<P>,
    motor_key: MotorcycleKey,
) -> Result<()> {
    let two = P::one() + P::one();
    let motor = graph.motorcycles[motor_key];
    let crash_segment = graph.wavefront_edges[event.edge];
    let crash_time = event.time;
    let crash_pt = position_at_time(&graph.vertices[motor.head], crash_time);
    let crash_vert =
        skeleton.add_steiner_vertex(Point3::new(crash_pt.x, crash_pt.y, crash_time))?;

    // Between the crash point and the struck edge's tail.
    {
        let (_, outgoing) = graph.find_in_and_out(motor.head)?;
        let Some(outgoing_key) = outgoing else {
            return Err(SkeletonError::DegenerateGeometry(format!(
                "crashing vertex {} has no outgoing wavefront edge",
                motor.head
            )));
        };
        let outgoing = graph.wavefront_edges[outgoing_key];
        let v0 = clamped_position_at_time(&graph.vertices[crash_segment.tail], crash_time);
        let v2 = clamped_position_at_time(&graph.vertices[outgoing.head], crash_time);
        if outgoing.head == crash_segment.tail || equivalent_pt3(v0, v2, P::epsilon()) {
            // The outgoing edge ends where the struck edge starts: both
            // shrink to nothing at the crash. Close the stump with a
            // vertex path at its midpoint.
            debug_assert!(crash_segment.left_face.is_none() && outgoing.left_face.is_none());
            let midpoint = Point3::new(
                (v0.x + v2.x) / two,
                (v0.y + v2.y) / two,
                (v0.z + v2.z) / two,
            );
            let end_vert = skeleton.add_steiner_vertex(midpoint)?;
            skeleton.add_edge(
                end_vert,
                crash_vert,
                crash_segment.right_face,
                outgoing.right_face,
                EdgeType::VertexPath,
            );
            graph.add_edge_for_vertex_path(skeleton, outgoing.head, end_vert)?;
            graph.add_edge_for_vertex_path(skeleton, crash_segment.tail, end_vert)?;
            let outgoing_head = outgoing.head;
            graph.wavefront_edges.remove(outgoing_key);
            if outgoing_head != crash_segment.tail {
                // The endpoints only matched by position; re-stitch them
                // with an explicit edge, inheriting faces from the
                // reverse edge if one exists.
                let existing = graph
                    .wavefront_edges
                    .values()
                    .find(|s| s.head == crash_segment.tail && s.tail == outgoing_head)
                    .copied();
                let (left_face, right_face) =
                    existing.map_or((None, None), |e| (e.right_face, e.left_face));
                graph.wavefront_edges.insert(WavefrontEdge {
                    head: outgoing_head,
                    tail: crash_segment.tail,
                    left_face,
                    right_face,
                });
            }
        } else {
            let replacement = graph.vertices.len();
            let velocity =
                vertex_velocity(Point2::new(v0.x, v0.y), crash_pt, Point2::new(v2.x, v2.y))?;
            graph.vertices.push(Vertex {
                position: crash_pt,
                anchor: Some(SkeletonVertexRef::Steiner(crash_vert)),
                initial_time: crash_time,
                velocity,
            });
            graph.wavefront_edges[outgoing_key].tail = replacement;
            graph.wavefront_edges.insert(WavefrontEdge {
                head: replacement,
                tail: crash_segment.tail,
                left_face: crash_segment.left_face,
                right_face: crash_segment.right_face,
            });
        }
    }

    // Between the struck edge's head and the crash point; mirror image of
    // the block above.
    {
        let (incoming, _) = graph.find_in_and_out(motor.head)?;
        let Some(incoming_key) = incoming else {
            return Err(SkeletonError::DegenerateGeometry(format!(
                "crashing vertex {} has no incoming wavefront edge",
                motor.head
            )));
        };
        let incoming = graph.wavefront_edges[incoming_key];
        let v0 = clamped_position_at_time(&graph.vertices[incoming.tail], crash_time);
        let v2 = clamped_position_at_time(&graph.vertices[crash_segment.head], crash_time);
        if incoming.tail == crash_segment.head || equivalent_pt3(v0, v2, P::epsilon()) {
            debug_assert!(crash_segment.left_face.is_none() && incoming.left_face.is_none());
            let midpoint = Point3::new(
                (v0.x + v2.x) / two,
                (v0.y + v2.y) / two,
                (v0.z + v2.z) / two,
            );
            let end_vert = skeleton.add_steiner_vertex(midpoint)?;
            skeleton.add_edge(
                end_vert,
                crash_vert,
                incoming.right_face,
                crash_segment.right_face,
                EdgeType::VertexPath,
            );
            graph.add_edge_for_vertex_path(skeleton, incoming.tail, end_vert)?;
            graph.add_edge_for_vertex_path(skeleton, crash_segment.head, end_vert)?;
            let incoming_tail = incoming.tail;
            graph.wavefront_edges.remove(incoming_key);
            if incoming_tail != crash_segment.head {
                let existing = graph
                    .wavefront_edges
                    .values()
                    .find(|s| s.head == incoming_tail && s.tail == crash_segment.head)
                    .copied();
                let (left_face, right_face) =
                    existing.map_or((None, None), |e| (e.right_face, e.left_face));
                graph.wavefront_edges.insert(WavefrontEdge {
                    head: crash_segment.head,
                    tail: incoming_tail,
                    left_face,
                    right_face,
                });
            }
        } else {
            let replacement = graph.vertices.len();
            let velocity =
                vertex_velocity(Point2::new(v0.x, v0.y), crash_pt, Point2::new(v2.x, v2.y))?;
            graph.vertices.push(Vertex {
                position: crash_pt,
                anchor: Some(SkeletonVertexRef::Steiner(crash_vert)),
                initial_time: crash_time,
                velocity,
            });
            graph.wavefront_edges[incoming_key].head = replacement;
            graph.wavefront_edges.insert(WavefrontEdge {
                head: crash_segment.head,
                tail: replacement,
                left_face: crash_segment.left_face,
                right_face: crash_segment.right_face,
            });
        }
    }

    // The struck edge is fully superseded by the two halves created above.
    // Both sides may have removed-and-reinserted around it, so match by
    // endpoint values rather than by key.
    graph
        .wavefront_edges
        .retain(|_, s| !(s.head == crash_segment.head && s.tail == crash_segment.tail));

    let anchor_vert = graph.resolve_anchor(skeleton, motor.tail)?;
    skeleton.add_edge(
        crash_vert,
        anchor_vert,
        motor.left_face,
        motor.right_face,
        EdgeType::VertexPath,
    );
    freeze_in_place(&mut graph.vertices[motor.head], crash_time);
    graph.motorcycles.remove(motor_key);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::events::crash_time;
    use super::super::graph::is_frozen;
    use super::*;
    use approx::assert_relative_eq;

    fn l_shape_graph() -> Graph<f64> {
        Graph::from_vertex_loop(&[
            Point2::new(0.0, 0.0),
            Point2::new(2.0, 0.0),
            Point2::new(2.0, 1.0),
            Point2::new(1.0, 1.0),
            Point2::new(1.0, 2.0),
            Point2::new(0.0, 2.0),
        ])
        .unwrap()
    }

    #[test]
    fn l_shape_crash_splits_the_struck_edge() {
        let mut graph = l_shape_graph();
        let mut skeleton = StraightSkeleton::with_faces(6);
        let (motor_key, motor) = graph.motorcycles.iter().next().unwrap();
        let motor = *motor;
        let event = crash_time(&graph, &graph.vertices[motor.head]).unwrap();
        assert_relative_eq!(event.time, 0.5, epsilon = 1e-6);

        process_crash(&mut graph, &mut skeleton, event, motor_key).unwrap();

        assert!(graph.motorcycles.is_empty());
        assert!(is_frozen(&graph.vertices[motor.head]));

        // Crash point and motorcycle anchor both appear in the skeleton,
        // joined by a vertex path.
        let crash = skeleton
            .steiner_vertices
            .iter()
            .position(|v| equivalent_pt3(*v, Point3::new(0.5, 0.5, 0.5), 1e-6))
            .unwrap();
        let anchor = skeleton
            .steiner_vertices
            .iter()
            .position(|v| equivalent_pt3(*v, Point3::new(1.0, 1.0, 0.0), 1e-6))
            .unwrap();
        let trace_recorded = skeleton.faces.iter().any(|f| {
            f.edges
                .iter()
                .any(|e| e.kind == EdgeType::VertexPath && e.head == crash && e.tail == anchor)
        });
        assert!(trace_recorded);

        // The wavefront stays a closed chain: every live vertex has
        // exactly one incoming and one outgoing edge.
        let mut live = std::collections::BTreeSet::new();
        for edge in graph.wavefront_edges.values() {
            live.insert(edge.head);
            live.insert(edge.tail);
        }
        for v in live {
            let (incoming, outgoing) = graph.find_in_and_out(v).unwrap();
            assert!(incoming.is_some(), "vertex {v} lost its incoming edge");
            assert!(outgoing.is_some(), "vertex {v} lost its outgoing edge");
        }
    }
}
