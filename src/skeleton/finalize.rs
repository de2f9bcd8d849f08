use super::graph::{clamped_position_at_time, Graph};
use super::{EdgeType, StraightSkeleton};
use crate::error::Result;
use crate::math::predicates::equivalent;
use crate::math::{Point2, Primitive};

/// A snapshotted wavefront segment awaiting overlap resolution.
#[derive(Debug, Clone, Copy)]
struct FlushSegment {
    head: usize,
    tail: usize,
    left_face: Option<usize>,
    right_face: Option<usize>,
}

fn magnitude_squared<P: Primitive>(x: P, y: P) -> P {
    x * x + y * y
}

/// Parameter of the point on the infinite line through `a` and `b`
/// closest to `p` (0 at `a`, 1 at `b`).
fn closest_point_on_line<P: Primitive>(a: Point2<P>, b: Point2<P>, p: Point2<P>) -> P {
    let ox = p.x - a.x;
    let oy = p.y - a.y;
    let lx = b.x - a.x;
    let ly = b.y - a.y;
    let mag2 = magnitude_squared(lx, ly);
    if mag2 <= P::zero() {
        return P::zero();
    }
    (ox * lx + oy * ly) / mag2
}

fn lerp<P: Primitive>(a: Point2<P>, b: Point2<P>, t: P) -> Point2<P> {
    Point2::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t)
}

/// Whether the lines `a -> b` and `c -> d` have equivalent slopes.
/// Vertical lines compare equal to each other and to nothing else.
fn slopes_equivalent<P: Primitive>(a: Point2<P>, b: Point2<P>, c: Point2<P>, d: Point2<P>) -> bool {
    let dx0 = b.x - a.x;
    let dx1 = d.x - c.x;
    let vertical0 = dx0.abs() <= P::epsilon();
    let vertical1 = dx1.abs() <= P::epsilon();
    match (vertical0, vertical1) {
        (true, true) => true,
        (true, false) | (false, true) => false,
        (false, false) => equivalent((b.y - a.y) / dx0, (d.y - c.y) / dx1, P::epsilon()),
    }
}

/// Snapshots the surviving wavefront into the skeleton at `time`.
///
/// Adjacent faces can flush coincident or partially-overlapping colinear
/// segments (one per side); emitting both would duplicate or cross
/// geometry in the output. Segments therefore pass through a worklist that
/// merges exact duplicates, trims shared sections, and carves three-way
/// colinear overlaps into disjoint pieces before anything is recorded.
pub(crate) fn write_wavefront<P: Primitive>(
    graph: &Graph<P>,
    skeleton: &mut StraightSkeleton<P>,
    time: P,
) -> Result<()> {
    let mut to_test: Vec<FlushSegment> = Vec::new();
    for edge in graph.wavefront_edges.values() {
        let head_pt = clamped_position_at_time(&graph.vertices[edge.head], time);
        let tail_pt = clamped_position_at_time(&graph.vertices[edge.tail], time);
        let head = skeleton.add_steiner_vertex(head_pt)?;
        let tail = skeleton.add_steiner_vertex(tail_pt)?;
        if head != tail {
            to_test.push(FlushSegment {
                head,
                tail,
                left_face: edge.left_face,
                right_face: edge.right_face,
            });
        }
    }

    let at = |v: usize, skeleton: &StraightSkeleton<P>| {
        let p = skeleton.steiner_vertices[v];
        Point2::new(p.x, p.y)
    };

    let mut accepted: Vec<FlushSegment> = Vec::new();
    while let Some(mut seg) = to_test.pop() {
        let mut a = at(seg.head, skeleton);
        let mut b = at(seg.tail, skeleton);
        let mut filtered_out = false;

        let mut i = 0;
        while i < accepted.len() {
            // Exact duplicate (either orientation): merge face labels and
            // drop the newcomer.
            if accepted[i].head == seg.head && accepted[i].tail == seg.tail {
                if accepted[i].left_face.is_none() {
                    accepted[i].left_face = seg.left_face;
                }
                if accepted[i].right_face.is_none() {
                    accepted[i].right_face = seg.right_face;
                }
                filtered_out = true;
                break;
            }
            if accepted[i].head == seg.tail && accepted[i].tail == seg.head {
                if accepted[i].left_face.is_none() {
                    accepted[i].left_face = seg.right_face;
                }
                if accepted[i].right_face.is_none() {
                    accepted[i].right_face = seg.left_face;
                }
                filtered_out = true;
                break;
            }

            let c = at(accepted[i].head, skeleton);
            let d = at(accepted[i].tail, skeleton);
            let closest_c = closest_point_on_line(a, b, c);
            let closest_d = closest_point_on_line(a, b, d);
            let c_interior = closest_c > P::zero()
                && closest_c < P::one()
                && magnitude_squared(lerp(a, b, closest_c).x - c.x, lerp(a, b, closest_c).y - c.y)
                    < P::epsilon();
            let d_interior = closest_d > P::zero()
                && closest_d < P::one()
                && magnitude_squared(lerp(a, b, closest_d).x - d.x, lerp(a, b, closest_d).y - d.y)
                    < P::epsilon();
            if (!c_interior && !d_interior) || !slopes_equivalent(a, b, c, d) {
                i += 1;
                continue;
            }

            // Colinear overlap. When the two segments share an endpoint,
            // trim whichever one sticks out past the other.
            if accepted[i].head == seg.head {
                if closest_d < P::one() {
                    seg.head = accepted[i].tail;
                } else {
                    accepted[i].head = seg.tail;
                }
            } else if accepted[i].head == seg.tail {
                if closest_d > P::zero() {
                    seg.tail = accepted[i].tail;
                } else {
                    accepted[i].head = seg.head;
                }
            } else if accepted[i].tail == seg.head {
                if closest_c < P::one() {
                    seg.head = accepted[i].head;
                } else {
                    accepted[i].tail = seg.tail;
                }
            } else if accepted[i].tail == seg.tail {
                if closest_c > P::zero() {
                    seg.tail = accepted[i].head;
                } else {
                    accepted[i].tail = seg.head;
                }
            } else {
                // No shared endpoint: carve the union into three disjoint
                // pieces, re-queueing the far piece for another pass.
                let spawned;
                if closest_c < P::zero() {
                    if closest_d > P::one() {
                        spawned = (seg.tail, accepted[i].tail);
                    } else {
                        spawned = (accepted[i].tail, seg.tail);
                        seg.tail = accepted[i].tail;
                    }
                    accepted[i].tail = seg.head;
                } else if closest_d < P::zero() {
                    if closest_c > P::one() {
                        spawned = (seg.tail, accepted[i].head);
                    } else {
                        spawned = (accepted[i].head, seg.tail);
                        seg.tail = accepted[i].head;
                    }
                    accepted[i].head = seg.head;
                } else if closest_c < closest_d {
                    if closest_d > P::one() {
                        spawned = (seg.tail, accepted[i].tail);
                    } else {
                        spawned = (accepted[i].tail, seg.tail);
                    }
                    seg.tail = accepted[i].head;
                } else {
                    if closest_c > P::one() {
                        spawned = (seg.tail, accepted[i].head);
                    } else {
                        spawned = (accepted[i].head, seg.tail);
                    }
                    seg.tail = accepted[i].tail;
                }
                debug_assert!(spawned.0 != spawned.1);
                debug_assert!(accepted[i].head != accepted[i].tail);
                debug_assert!(seg.head != seg.tail);
                to_test.push(FlushSegment {
                    head: spawned.0,
                    tail: spawned.1,
                    left_face: seg.left_face,
                    right_face: seg.right_face,
                });
            }

            a = at(seg.head, skeleton);
            b = at(seg.tail, skeleton);
            i += 1;
        }

        if !filtered_out {
            accepted.push(seg);
        }
    }

    for seg in &accepted {
        debug_assert!(seg.head != seg.tail);
        skeleton.add_edge(
            seg.head,
            seg.tail,
            seg.left_face,
            seg.right_face,
            EdgeType::Wavefront,
        );
    }

    // Close out every surviving vertex's path from its skeleton anchor to
    // its final resting position.
    for edge in graph.wavefront_edges.values() {
        for v in [edge.head, edge.tail] {
            let resting = clamped_position_at_time(&graph.vertices[v], time);
            let final_vert = skeleton.add_steiner_vertex(resting)?;
            graph.add_edge_for_vertex_path(skeleton, v, final_vert)?;
        }
    }
    Ok(())
}
