// Copyright 2025 Lars Brubaker
// License: SGI Free Software License B (MIT-compatible)
//
// Polygon ingestion: clean the point list, fit a height plane (or split the
// polygon into a fan, or reject it) and insert each accepted piece into the
// graph as one closed loop.
//
// Loops are built the way a contour is added to a half-edge mesh: one
// self-loop edge, then repeated splits of the closing edge.

use tracing::trace;

use crate::config::DrapeConfig;
use crate::error::Result;
use crate::geom::{dist3, orient, xy, Point3, Real};
use crate::graph::{mask, mate, Graph, Mask, NodeId};
use crate::plane::{Plane, PlaneId, PlaneRegistry, NULL_PLANE};

/// One tagged input polygon.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InputPolygon {
    /// Ordered (x, y, z) points, closed or implicitly closed.
    pub points: Vec<Point3>,
    /// Opaque provenance tag.
    pub tag: i32,
    /// Tag the outside with OUTSIDE_ALT instead of OUTSIDE.
    pub alternate_outside: bool,
    /// Mark every edge of the polygon as a barrier to intraplane collapse.
    pub barrier: bool,
}

impl InputPolygon {
    pub fn new(points: Vec<Point3>, tag: i32) -> Self {
        InputPolygon {
            points,
            tag,
            alternate_outside: false,
            barrier: false,
        }
    }

    pub fn with_alternate_outside(mut self, alternate: bool) -> Self {
        self.alternate_outside = alternate;
        self
    }

    pub fn with_barrier(mut self, barrier: bool) -> Self {
        self.barrier = barrier;
        self
    }
}

/// Why a polygon or piece was dropped.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Rejection {
    NonFinite,
    TooFewPoints,
    /// The normal is horizontal: not a height function over xy.
    Vertical,
    /// The plane solve is numerically singular.
    Singular,
    /// Extreme aspect ratio.
    Sliver,
}

#[derive(Clone, Debug, PartialEq)]
pub enum IngestOutcome {
    /// Planes and loop seeds (one node on the inside of each loop) of every
    /// accepted piece.
    Accepted {
        pieces: Vec<(PlaneId, NodeId)>,
        rejected_pieces: usize,
    },
    Rejected(Rejection),
}

impl IngestOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, IngestOutcome::Accepted { .. })
    }
}

/// Area, perimeter and planarity of a point loop.
#[derive(Copy, Clone, Debug)]
struct Shape {
    area_xy: Real,
    perimeter: Real,
    perimeter_xy: Real,
    /// Newell normal, unit length when defined.
    normal: Option<Point3>,
    /// Largest distance of a point from the plane through the centroid.
    thickness: Real,
}

impl Shape {
    fn measure(points: &[Point3]) -> Shape {
        let count = points.len();
        let mut area2 = 0.0;
        let mut perimeter = 0.0;
        let mut perimeter_xy = 0.0;
        let mut newell = [0.0; 3];
        let mut centroid = [0.0; 3];
        for i in 0..count {
            let p = points[i];
            let q = points[(i + 1) % count];
            area2 += p[0] * q[1] - q[0] * p[1];
            perimeter += dist3(p, q);
            perimeter_xy += (q[0] - p[0]).hypot(q[1] - p[1]);
            newell[0] += (p[1] - q[1]) * (p[2] + q[2]);
            newell[1] += (p[2] - q[2]) * (p[0] + q[0]);
            newell[2] += (p[0] - q[0]) * (p[1] + q[1]);
            for k in 0..3 {
                centroid[k] += p[k] / count as Real;
            }
        }
        let normal = crate::geom::normalize3(newell);
        let thickness = match normal {
            Some(n) => points
                .iter()
                .map(|p| {
                    let d = crate::geom::sub3(*p, centroid);
                    crate::geom::dot3(d, n).abs()
                })
                .fold(0.0, Real::max),
            None => 0.0,
        };
        Shape {
            area_xy: 0.5 * area2,
            perimeter,
            perimeter_xy,
            normal,
            thickness,
        }
    }

    fn centroid_plane(&self, points: &[Point3], tag: i32) -> Option<Plane> {
        let n = self.normal?;
        let count = points.len() as Real;
        let cx = points.iter().map(|p| p[0]).sum::<Real>() / count;
        let cy = points.iter().map(|p| p[1]).sum::<Real>() / count;
        let cz = points.iter().map(|p| p[2]).sum::<Real>() / count;
        let ax = -n[0] / n[2];
        let ay = -n[1] / n[2];
        Some(with_z_range(
            Plane {
                ax,
                ay,
                c: cz - ax * cx - ay * cy,
                z_min: 0.0,
                z_max: 0.0,
                tag,
                status: 0,
            },
            points,
        ))
    }
}

fn with_z_range(mut plane: Plane, points: &[Point3]) -> Plane {
    plane.z_min = points.iter().map(|p| p[2]).fold(Real::INFINITY, Real::min);
    plane.z_max = points.iter().map(|p| p[2]).fold(Real::NEG_INFINITY, Real::max);
    plane
}

/// Drop consecutive near-duplicates and a closing point equal to the first.
fn dedupe_points(points: &[Point3], rel_tol: Real) -> Vec<Point3> {
    let count = points.len();
    let perimeter: Real = (0..count).map(|i| dist3(points[i], points[(i + 1) % count])).sum();
    let tol = rel_tol * perimeter;
    let mut out: Vec<Point3> = Vec::with_capacity(count);
    for &p in points {
        if out.last().map_or(true, |&q| dist3(p, q) > tol) {
            out.push(p);
        }
    }
    while out.len() > 1 && dist3(out[0], out[out.len() - 1]) <= tol {
        out.pop();
    }
    out
}

fn is_convex_xy(points: &[Point3]) -> bool {
    let count = points.len();
    let mut sign = 0.0;
    for i in 0..count {
        let turn = orient(
            xy(points[i]),
            xy(points[(i + 1) % count]),
            xy(points[(i + 2) % count]),
        );
        if turn == 0.0 {
            continue;
        }
        if sign == 0.0 {
            sign = turn.signum();
        } else if turn.signum() != sign {
            return false;
        }
    }
    true
}

/// Solve z = ax x + ay y + c from the first point and the two edge vectors
/// spanning the largest xy area.
fn solve_plane(points: &[Point3], tag: i32, singular_tol: Real) -> Option<Plane> {
    let p0 = points[0];
    let delta = |p: Point3| [p[0] - p0[0], p[1] - p0[1], p[2] - p0[2]];
    // d1 reaches the point farthest from p0, d2 the point farthest off d1.
    let d1 = points[1..]
        .iter()
        .map(|&p| delta(p))
        .max_by(|a, b| a[0].hypot(a[1]).total_cmp(&b[0].hypot(b[1])))?;
    let (det, d2) = points[1..]
        .iter()
        .map(|&p| {
            let d2 = delta(p);
            (d1[0] * d2[1] - d1[1] * d2[0], d2)
        })
        .max_by(|a, b| a.0.abs().total_cmp(&b.0.abs()))?;
    let scale = d1[0].hypot(d1[1]) * d2[0].hypot(d2[1]);
    if scale == 0.0 || det.abs() <= singular_tol * scale {
        return None;
    }
    let ax = (d1[2] * d2[1] - d2[2] * d1[1]) / det;
    let ay = (d1[0] * d2[2] - d2[0] * d1[2]) / det;
    Some(with_z_range(
        Plane {
            ax,
            ay,
            c: p0[2] - ax * p0[0] - ay * p0[1],
            z_min: 0.0,
            z_max: 0.0,
            tag,
            status: 0,
        },
        points,
    ))
}

/// Fit, validate and insert one piece.
fn ingest_piece(
    graph: &mut Graph,
    planes: &mut PlaneRegistry,
    points: &[Point3],
    planar: bool,
    polygon: &InputPolygon,
    config: &DrapeConfig,
) -> Result<std::result::Result<(PlaneId, NodeId), Rejection>> {
    let shape = Shape::measure(points);
    let normal = match shape.normal {
        Some(n) => n,
        None => return Ok(Err(Rejection::Sliver)),
    };
    if normal[2].abs() <= config.vertical_normal_tol {
        return Ok(Err(Rejection::Vertical));
    }
    if shape.perimeter_xy == 0.0 {
        return Ok(Err(Rejection::Sliver));
    }
    let ratio = shape.area_xy.abs() / (shape.perimeter_xy * shape.perimeter_xy);
    if ratio < config.sliver_ratio
        || (ratio < config.steep_sliver_ratio && normal[2].abs() < config.steep_normal_z)
    {
        return Ok(Err(Rejection::Sliver));
    }
    let plane = if planar {
        solve_plane(points, polygon.tag, config.singular_det_tol)
    } else {
        shape.centroid_plane(points, polygon.tag)
    };
    let plane = match plane {
        Some(p) if p.ax.is_finite() && p.ay.is_finite() && p.c.is_finite() => p,
        _ => return Ok(Err(Rejection::Singular)),
    };

    let id = planes.add(plane);
    let mut boundary: Mask = mask::BOUNDARY | mask::PRIMARY;
    if polygon.barrier {
        boundary |= mask::BARRIER;
    }
    let outside = if polygon.alternate_outside {
        mask::OUTSIDE_ALT
    } else {
        mask::OUTSIDE
    };
    let seed = if shape.area_xy >= 0.0 {
        insert_loop(graph, points.iter().copied(), id, boundary, outside)?
    } else {
        insert_loop(graph, points.iter().rev().copied(), id, boundary, outside)?
    };
    Ok(Ok((id, seed)))
}

/// Insert a counter-clockwise loop.  Returns a node on the inside.
fn insert_loop(
    graph: &mut Graph,
    mut points: impl Iterator<Item = Point3>,
    plane: PlaneId,
    boundary: Mask,
    outside: Mask,
) -> Result<NodeId> {
    let first = match points.next() {
        Some(p) => p,
        None => return graph.make_edge(),
    };
    let a = graph.make_edge()?;
    graph.twist(a, mate(a));
    graph.nodes[a as usize].position = first;
    graph.nodes[mate(a) as usize].position = first;

    let mut closing = a;
    for p in points {
        let c = graph.split_edge(closing, [p[0], p[1]])?;
        graph.set_z(c, p[2]);
        graph.set_z(mate(closing), p[2]);
        closing = c;
    }

    let inside: Vec<NodeId> = graph.face_loop(a).collect();
    for n in inside {
        graph.set_mask(n, boundary);
        graph.set_plane(n, plane);
        graph.set_mask(mate(n), boundary | outside);
        graph.set_plane(mate(n), NULL_PLANE);
    }
    Ok(a)
}

/// Ingest one polygon.  Rejections are reported in the outcome; only
/// resource exhaustion is an error.
pub fn ingest_polygon(
    graph: &mut Graph,
    planes: &mut PlaneRegistry,
    polygon: &InputPolygon,
    config: &DrapeConfig,
) -> Result<IngestOutcome> {
    let reject = |why: Rejection| -> Result<IngestOutcome> {
        trace!(tag = polygon.tag, reason = ?why, "polygon rejected");
        Ok(IngestOutcome::Rejected(why))
    };

    if polygon.points.iter().any(|p| p.iter().any(|c| !c.is_finite())) {
        return reject(Rejection::NonFinite);
    }
    let points = dedupe_points(&polygon.points, config.point_dedupe_rel_tol);
    if points.len() < 3 {
        return reject(Rejection::TooFewPoints);
    }

    let shape = Shape::measure(&points);
    let normal_z = shape.normal.map_or(0.0, |n| n[2].abs());
    let planar = points.len() == 3 || shape.thickness <= config.planar_rel_tol * shape.perimeter;
    let fan = !planar
        && shape.thickness <= config.mild_nonplanar_rel_tol * shape.perimeter
        && normal_z >= config.fan_min_normal_z
        && is_convex_xy(&points);

    if !fan {
        return match ingest_piece(graph, planes, &points, planar, polygon, config)? {
            Ok(piece) => Ok(IngestOutcome::Accepted {
                pieces: vec![piece],
                rejected_pieces: 0,
            }),
            Err(why) => reject(why),
        };
    }

    let mut pieces = Vec::new();
    let mut rejected_pieces = 0;
    let mut last_rejection = Rejection::Sliver;
    for i in 1..points.len() - 1 {
        let triangle = [points[0], points[i], points[i + 1]];
        match ingest_piece(graph, planes, &triangle, true, polygon, config)? {
            Ok(piece) => pieces.push(piece),
            Err(why) => {
                trace!(tag = polygon.tag, piece = i, reason = ?why, "fan piece rejected");
                rejected_pieces += 1;
                last_rejection = why;
            }
        }
    }
    if pieces.is_empty() {
        return reject(last_rejection);
    }
    Ok(IngestOutcome::Accepted {
        pieces,
        rejected_pieces,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingest(points: Vec<Point3>) -> (Graph, PlaneRegistry, IngestOutcome) {
        let config = DrapeConfig::default();
        let mut graph = Graph::new();
        let mut planes = PlaneRegistry::new(config.plane_dedupe_tol);
        let outcome =
            ingest_polygon(&mut graph, &mut planes, &InputPolygon::new(points, 1), &config).unwrap();
        (graph, planes, outcome)
    }

    #[test]
    fn rectangle_becomes_one_loop() {
        let (mut g, planes, outcome) = ingest(vec![
            [0.0, 0.0, 2.0],
            [10.0, 0.0, 2.0],
            [10.0, 5.0, 2.0],
            [0.0, 5.0, 2.0],
        ]);
        assert!(outcome.is_accepted());
        assert_eq!(planes.len(), 1);
        assert!(g.validate().is_ok());
        assert_eq!(g.face_seeds().unwrap().len(), 2);
        for n in g.live_nodes() {
            assert!(g.has_mask(n, mask::BOUNDARY));
        }
        let plane = planes.get(1).unwrap();
        assert!((plane.eval(3.0, 4.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn clockwise_input_is_reversed() {
        let (g, _, outcome) = ingest(vec![
            [0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [1.0, 1.0, 0.0],
            [1.0, 0.0, 0.0],
        ]);
        let seed = match outcome {
            IngestOutcome::Accepted { pieces, .. } => pieces[0].1,
            other => panic!("unexpected {:?}", other),
        };
        assert!(g.signed_area(seed) > 0.0);
        assert!(g.face_loop(seed).all(|n| g.plane(n) == 1));
        assert!(g.face_loop(mate(seed)).all(|n| g.has_mask(n, mask::OUTSIDE)));
    }

    #[test]
    fn sloped_plane_is_solved() {
        let (_, planes, outcome) = ingest(vec![[0.0, 0.0, 0.0], [2.0, 0.0, 2.0], [0.0, 2.0, 4.0]]);
        assert!(outcome.is_accepted());
        let p = planes.get(1).unwrap();
        assert!((p.ax - 1.0).abs() < 1e-12);
        assert!((p.ay - 2.0).abs() < 1e-12);
        assert!(p.c.abs() < 1e-12);
        assert_eq!((p.z_min, p.z_max), (0.0, 4.0));
    }

    #[test]
    fn sliver_is_rejected_without_a_plane() {
        let (g, planes, outcome) = ingest(vec![[0.0, 0.0, 0.0], [10.0, 0.0, 0.0], [5.0, 1e-9, 0.0]]);
        assert_eq!(outcome, IngestOutcome::Rejected(Rejection::Sliver));
        assert!(planes.is_empty());
        assert_eq!(g.live_count(), 0);
    }

    #[test]
    fn vertical_wall_is_rejected() {
        let (_, planes, outcome) = ingest(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 0.0, 1.0], [0.0, 0.0, 1.0]]);
        assert!(!outcome.is_accepted());
        assert!(planes.is_empty());
    }

    #[test]
    fn duplicates_and_closing_point_are_dropped() {
        let (g, _, outcome) = ingest(vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 0.0, 0.0],
        ]);
        assert!(outcome.is_accepted());
        assert_eq!(g.live_count(), 6);
    }

    #[test]
    fn non_finite_and_short_inputs_are_rejected() {
        let (_, _, outcome) = ingest(vec![[0.0, 0.0, 0.0], [f64::NAN, 0.0, 0.0], [1.0, 1.0, 0.0]]);
        assert_eq!(outcome, IngestOutcome::Rejected(Rejection::NonFinite));
        let (_, _, outcome) = ingest(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]);
        assert_eq!(outcome, IngestOutcome::Rejected(Rejection::TooFewPoints));
    }

    #[test]
    fn mildly_warped_convex_quad_is_fanned() {
        let (_, planes, outcome) = ingest(vec![
            [0.0, 0.0, 0.0],
            [10.0, 0.0, 0.0],
            [10.0, 10.0, 0.05],
            [0.0, 10.0, 0.0],
        ]);
        match outcome {
            IngestOutcome::Accepted { pieces, rejected_pieces } => {
                assert_eq!(pieces.len(), 2);
                assert_eq!(rejected_pieces, 0);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(planes.len(), 2);
    }

    #[test]
    fn alternate_outside_bit_is_applied() {
        let config = DrapeConfig::default();
        let mut g = Graph::new();
        let mut planes = PlaneRegistry::new(config.plane_dedupe_tol);
        let polygon = InputPolygon::new(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], 3)
            .with_alternate_outside(true)
            .with_barrier(true);
        let outcome = ingest_polygon(&mut g, &mut planes, &polygon, &config).unwrap();
        let seed = match outcome {
            IngestOutcome::Accepted { pieces, .. } => pieces[0].1,
            other => panic!("unexpected {:?}", other),
        };
        assert!(g.face_loop(mate(seed)).all(|n| g.has_mask(n, mask::OUTSIDE_ALT)));
        assert!(g.face_loop(mate(seed)).all(|n| !g.has_mask(n, mask::OUTSIDE)));
        assert!(g.live_nodes().all(|n| g.has_mask(n, mask::BARRIER)));
    }
}
