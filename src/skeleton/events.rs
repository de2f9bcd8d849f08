use tracing::{debug, trace};

use super::graph::{position_at_time, Graph, Vertex, WavefrontKey};
use super::{collapse, crash, finalize, StraightSkeleton};
use crate::error::{Result, SkeletonError};
use crate::math::predicates::equivalent_vec2;
use crate::math::{Point2, Primitive, Vector2};

/// A predicted motorcycle crash: the time at which a motorcycle head runs
/// into the wavefront edge `edge`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CrashEvent<P: Primitive> {
    pub time: P,
    pub edge: WavefrontKey,
}

fn min2<P: Primitive>(a: P, b: P) -> P {
    if a < b {
        a
    } else {
        b
    }
}

fn max2<P: Primitive>(a: P, b: P) -> P {
    if a > b {
        a
    } else {
        b
    }
}

/// Time offset at which the trajectories `p0 + t*v0` and `p1 + t*v1` meet,
/// if they do.
///
/// Solved on the axis with the larger relative velocity; the residual on
/// the other axis must fall within the meet tolerance, otherwise the
/// trajectories pass each other without actually touching.
pub(crate) fn collapse_time_points<P: Primitive>(
    p0: Point2<P>,
    v0: Vector2<P>,
    p1: Point2<P>,
    v1: Vector2<P>,
) -> Option<P> {
    let dx = v0.x - v1.x;
    let dy = v0.y - v1.y;
    if dx.abs() > dy.abs() {
        if dx.abs() < P::epsilon() {
            return None;
        }
        let t = (p1.x - p0.x) / dx;
        let y_sep = p0.y + t * v0.y - p1.y - t * v1.y;
        (y_sep.abs() < P::meet_tolerance()).then_some(t)
    } else {
        if dy.abs() < P::epsilon() {
            return None;
        }
        let t = (p1.y - p0.y) / dy;
        let x_sep = p0.x + t * v0.x - p1.x - t * v1.x;
        (x_sep.abs() < P::meet_tolerance()).then_some(t)
    }
}

/// Absolute time at which two wavefront vertices meet, if ever. Frozen
/// vertices never collapse.
pub(crate) fn collapse_time<P: Primitive>(a: &Vertex<P>, b: &Vertex<P>) -> Option<P> {
    let zero = Vector2::new(P::zero(), P::zero());
    let eps = P::epsilon();
    if equivalent_vec2(a.velocity, zero, eps) || equivalent_vec2(b.velocity, zero, eps) {
        return None;
    }
    // Project both trajectories to a common start time before solving.
    let calc_time = min2(a.initial_time, b.initial_time);
    let p0 = position_at_time(a, calc_time);
    let p1 = position_at_time(b, calc_time);
    collapse_time_points(p0, a.velocity, p1, b.velocity).map(|t| calc_time + t)
}

fn promote2<P: Primitive>(p: Point2<P>) -> (f64, f64) {
    (p.x.to_f64(), p.y.to_f64())
}

/// Earliest time at which the moving vertex `v` strikes the interior of
/// any live wavefront edge.
///
/// For each candidate edge the signed area of the triangle (edge head,
/// edge tail, `v`) is expressed as a quadratic in time. The quadratic and
/// its discriminant are evaluated in `f64`; the products of squared
/// coordinate magnitudes overflow narrow integer coordinates otherwise. A
/// root where the strike point lies between the edge endpoints is a crash.
pub(crate) fn crash_time<P: Primitive>(graph: &Graph<P>, v: &Vertex<P>) -> Option<CrashEvent<P>> {
    let feps = P::epsilon().to_f64();
    let mut best: Option<CrashEvent<P>> = None;

    for (key, edge) in &graph.wavefront_edges {
        let head = &graph.vertices[edge.head];
        let tail = &graph.vertices[edge.tail];
        let calc_time = max2(max2(head.initial_time, tail.initial_time), v.initial_time);
        let (p0x, p0y) = promote2(position_at_time(head, calc_time));
        let (p1x, p1y) = promote2(position_at_time(tail, calc_time));
        let (p2x, p2y) = promote2(position_at_time(v, calc_time));
        let (v0x, v0y) = (head.velocity.x.to_f64(), head.velocity.y.to_f64());
        let (v1x, v1y) = (tail.velocity.x.to_f64(), tail.velocity.y.to_f64());
        let (v2x, v2y) = (v.velocity.x.to_f64(), v.velocity.y.to_f64());

        let a = (v1x - v0x) * (v2y - v0y) - (v2x - v0x) * (v1y - v0y);
        if a.abs() < feps {
            // Parallel motion; the triangle area changes linearly and the
            // vertex either never reaches the edge or rides along it.
            continue;
        }
        let b = (p1x - p0x) * (v2y - v0y) + (v1x - v0x) * (p2y - p0y)
            - (p2x - p0x) * (v1y - v0y)
            - (v2x - v0x) * (p1y - p0y);
        let c = (p1x - p0x) * (p2y - p0y) - (p2x - p0x) * (p1y - p0y);

        let k = b * b - 4.0 * a * c;
        if k < 0.0 {
            continue;
        }
        let q = k.sqrt();
        for root in [(-b + q) / (2.0 * a), (-b - q) / (2.0 * a)] {
            let Some(offset) = P::from_f64(root) else {
                continue;
            };
            let t = calc_time + offset;
            if let Some(current) = &best {
                if t > current.time {
                    continue;
                }
            }
            // A crash before both edge endpoints existed is a phantom
            // intersection with an extrapolated edge.
            if t <= max2(head.initial_time, tail.initial_time) {
                continue;
            }
            let (pax, pay) = promote2(position_at_time(head, t));
            let (pbx, pby) = promote2(position_at_time(tail, t));
            let (pcx, pcy) = promote2(position_at_time(v, t));
            let within_head = (pbx - pax) * (pcx - pax) + (pby - pay) * (pcy - pay);
            let within_tail = (pax - pbx) * (pcx - pbx) + (pay - pby) * (pcy - pby);
            if (within_head > 0.0 && within_tail > 0.0)
                || ((pax - pcx).abs() < feps && (pay - pcy).abs() < feps)
                || ((pbx - pcx).abs() < feps && (pby - pcy).abs() < feps)
            {
                best = Some(CrashEvent { time: t, edge: key });
            }
        }
    }
    best
}

impl<P: Primitive> Graph<P> {
    /// Runs the event simulation to completion (or to `max_inset`) and
    /// extracts the skeleton.
    ///
    /// Each iteration gathers the earliest edge collapses and the earliest
    /// motorcycle crash; crashes take precedence when they fall within an
    /// epsilon of the best collapse, since processing the collapse first
    /// would remove the very edge the motorcycle is about to strike.
    ///
    /// # Errors
    ///
    /// `DegenerateGeometry` for simultaneous motorcycle crashes or any
    /// state a simple input polygon cannot produce.
    pub(crate) fn calculate(&mut self, max_inset: Option<P>) -> Result<StraightSkeleton<P>> {
        let mut skeleton = StraightSkeleton::with_faces(self.boundary_points.len());
        let zero = Vector2::new(P::zero(), P::zero());
        let mut last_event_time = P::zero();

        loop {
            let mut best_collapse: Vec<(P, WavefrontKey)> = Vec::new();
            let mut best_collapse_time: Option<P> = None;
            for (key, edge) in &self.wavefront_edges {
                let Some(t) = collapse_time(&self.vertices[edge.head], &self.vertices[edge.tail])
                else {
                    continue;
                };
                if t < P::zero() {
                    continue;
                }
                debug_assert!(t >= last_event_time - P::meet_tolerance());
                match best_collapse_time {
                    None => {
                        best_collapse.push((t, key));
                        best_collapse_time = Some(t);
                    }
                    Some(current) => {
                        if t < current - P::epsilon() {
                            best_collapse.clear();
                            best_collapse.push((t, key));
                            best_collapse_time = Some(t);
                        } else if t < current + P::epsilon() {
                            best_collapse.push((t, key));
                            best_collapse_time = Some(min2(t, current));
                        }
                    }
                }
            }
            if let Some(current) = best_collapse_time {
                // Drop stragglers that were within epsilon of an earlier,
                // since-improved best.
                best_collapse.retain(|&(t, _)| t < current + P::epsilon());
            }

            let mut best_crash: Vec<(CrashEvent<P>, super::graph::MotorcycleKey)> = Vec::new();
            let mut best_crash_time: Option<P> = None;
            for (key, motor) in &self.motorcycles {
                let head = &self.vertices[motor.head];
                if equivalent_vec2(head.velocity, zero, P::epsilon()) {
                    continue;
                }
                debug_assert!(head.initial_time == P::zero());
                let Some(event) = crash_time(self, head) else {
                    continue;
                };
                if event.time < P::zero() {
                    continue;
                }
                debug_assert!(event.time >= last_event_time - P::meet_tolerance());
                let beats_collapse =
                    best_collapse_time.is_none_or(|ct| event.time < ct + P::epsilon());
                if !beats_collapse {
                    continue;
                }
                match best_crash_time {
                    None => {
                        best_crash.push((event, key));
                        best_crash_time = Some(event.time);
                    }
                    Some(current) => {
                        if event.time < current - P::epsilon() {
                            best_crash.clear();
                            best_crash.push((event, key));
                            best_crash_time = Some(event.time);
                        } else if event.time < current + P::epsilon() {
                            best_crash.push((event, key));
                            best_crash_time = Some(min2(event.time, current));
                        }
                    }
                }
            }

            trace!(
                collapses = best_collapse.len(),
                crashes = best_crash.len(),
                "event candidates"
            );

            if let Some(crash_at) = best_crash_time {
                if let Some(limit) = max_inset {
                    if crash_at > limit {
                        break;
                    }
                }
                best_crash.retain(|(event, _)| event.time < crash_at + P::epsilon());
                if best_crash.len() != 1 {
                    return Err(SkeletonError::DegenerateGeometry(format!(
                        "{} simultaneous motorcycle crashes at time {crash_at}",
                        best_crash.len()
                    )));
                }
                let (event, motor_key) = best_crash[0];
                debug!(time = %event.time, "processing motorcycle crash");
                crash::process_crash(self, &mut skeleton, event, motor_key)?;
                last_event_time = event.time;
            } else {
                let Some(collapse_at) = best_collapse_time else {
                    break;
                };
                if let Some(limit) = max_inset {
                    if collapse_at > limit {
                        break;
                    }
                }
                debug!(
                    time = %collapse_at,
                    edges = best_collapse.len(),
                    "processing collapse group"
                );
                collapse::process_collapses(self, &mut skeleton, &best_collapse, collapse_at)?;
                last_event_time = collapse_at;
            }
        }

        let final_time = max_inset.unwrap_or(last_event_time);
        finalize::write_wavefront(self, &mut skeleton, final_time)?;
        Ok(skeleton)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn head_on_trajectories_meet() {
        let t = collapse_time_points(
            Point2::new(0.0f64, 0.0),
            Vector2::new(1.0, 0.0),
            Point2::new(2.0, 0.0),
            Vector2::new(-1.0, 0.0),
        )
        .unwrap();
        assert_relative_eq!(t, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn parallel_trajectories_never_meet() {
        let t = collapse_time_points(
            Point2::new(0.0f64, 0.0),
            Vector2::new(1.0, 0.0),
            Point2::new(0.0, 1.0),
            Vector2::new(1.0, 0.0),
        );
        assert!(t.is_none());
    }

    #[test]
    fn passing_trajectories_never_meet() {
        // These cross the same x at different y.
        let t = collapse_time_points(
            Point2::new(0.0f64, 0.0),
            Vector2::new(1.0, 0.0),
            Point2::new(2.0, 5.0),
            Vector2::new(-1.0, 0.0),
        );
        assert!(t.is_none());
    }

    #[test]
    fn square_edges_collapse_at_half() {
        let graph = Graph::from_vertex_loop(&[
            Point2::new(0.0f64, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ])
        .unwrap();
        for edge in graph.wavefront_edges.values() {
            let t = collapse_time(&graph.vertices[edge.head], &graph.vertices[edge.tail]).unwrap();
            assert_relative_eq!(t, 0.5, epsilon = 1e-9);
        }
    }

    #[test]
    fn frozen_vertex_never_collapses() {
        let graph = Graph::from_vertex_loop(&[
            Point2::new(0.0f64, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ])
        .unwrap();
        let mut frozen = graph.vertices[0].clone();
        super::super::graph::freeze_in_place(&mut frozen, 0.1);
        assert!(collapse_time(&frozen, &graph.vertices[2]).is_none());
    }

    #[test]
    fn l_shape_motorcycle_crashes_at_half() {
        let graph = Graph::from_vertex_loop(&[
            Point2::new(0.0f64, 0.0),
            Point2::new(2.0, 0.0),
            Point2::new(2.0, 1.0),
            Point2::new(1.0, 1.0),
            Point2::new(1.0, 2.0),
            Point2::new(0.0, 2.0),
        ])
        .unwrap();
        let motor = graph.motorcycles.values().next().unwrap();
        let event = crash_time(&graph, &graph.vertices[motor.head]).unwrap();
        assert_relative_eq!(event.time, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn integer_crash_solver_handles_large_coordinates() {
        // The discriminant squares coordinate-scale values; at this size
        // it only fits when evaluated in f64.
        let graph = Graph::from_vertex_loop(&[
            Point2::new(0i32, 0),
            Point2::new(40_000, 0),
            Point2::new(40_000, 20_000),
            Point2::new(20_000, 20_000),
            Point2::new(20_000, 40_000),
            Point2::new(0, 40_000),
        ])
        .unwrap();
        let motor = graph.motorcycles.values().next().unwrap();
        let event = crash_time(&graph, &graph.vertices[motor.head]).unwrap();
        assert_eq!(event.time, 10_000);
    }

    #[test]
    fn convex_polygon_has_no_crash_targets() {
        let graph = Graph::from_vertex_loop(&[
            Point2::new(0.0f64, 0.0),
            Point2::new(3.0, 0.0),
            Point2::new(4.0, 2.0),
            Point2::new(2.0, 3.5),
            Point2::new(-0.5, 2.0),
        ])
        .unwrap();
        assert!(graph.motorcycles.is_empty());
    }
}
