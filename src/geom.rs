// Copyright 2025 Lars Brubaker
// License: SGI Free Software License B (MIT-compatible)
//
// Pure geometric functions on xy points with an optional z.
//
// Topology decisions are made in xy only; z rides along as an attribute.

pub type Real = f64;
pub type Point2 = [Real; 2];
pub type Point3 = [Real; 3];

/// Returns true if u is lexicographically <= v (x first, then y).
#[inline]
pub fn vert_leq(u: Point2, v: Point2) -> bool {
    u[0] < v[0] || (u[0] == v[0] && u[1] <= v[1])
}

/// Returns true if u == v (exact equality).
#[inline]
pub fn vert_eq(u: Point2, v: Point2) -> bool {
    u[0] == v[0] && u[1] == v[1]
}

/// Twice the signed area of triangle (o, a, b).  Positive when the turn
/// o -> a -> b is counter-clockwise.
#[inline]
pub fn orient(o: Point2, a: Point2, b: Point2) -> Real {
    (a[0] - o[0]) * (b[1] - o[1]) - (a[1] - o[1]) * (b[0] - o[0])
}

/// Returns true if (u, v, w) is in counter-clockwise order (collinear counts).
#[inline]
pub fn vert_ccw(u: Point2, v: Point2, w: Point2) -> bool {
    orient(u, v, w) >= 0.0
}

#[inline]
pub fn xy(p: Point3) -> Point2 {
    [p[0], p[1]]
}

#[inline]
pub fn dist_xy(a: Point2, b: Point2) -> Real {
    (b[0] - a[0]).hypot(b[1] - a[1])
}

#[inline]
pub fn dist3(a: Point3, b: Point3) -> Real {
    let dx = b[0] - a[0];
    let dy = b[1] - a[1];
    let dz = b[2] - a[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

#[inline]
pub fn lerp(a: Real, b: Real, t: Real) -> Real {
    a + (b - a) * t
}

/// Direction angle of the vector from `from` to `to`, in (-pi, pi].
#[inline]
pub fn direction_angle(from: Point2, to: Point2) -> Real {
    (to[1] - from[1]).atan2(to[0] - from[0])
}

/// Parameter of the projection of p onto segment a-b, with the xy distance
/// from p to that projection.  The parameter is not clamped.
pub fn project_param(p: Point2, a: Point2, b: Point2) -> (Real, Real) {
    let dx = b[0] - a[0];
    let dy = b[1] - a[1];
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return (0.0, dist_xy(p, a));
    }
    let t = ((p[0] - a[0]) * dx + (p[1] - a[1]) * dy) / len2;
    let foot = [a[0] + t * dx, a[1] + t * dy];
    (t, dist_xy(p, foot))
}

/// Where one segment must be split because of another.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SplitPoint {
    /// 0 = the first segment, 1 = the second.
    pub segment: usize,
    pub t: Real,
    pub at: Point2,
}

/// Contacts between segments p0-p1 and q0-q1 that require splitting either
/// segment in its interior: proper crossings, endpoints touching the other
/// segment (T-junctions) and collinear overlaps.  Contacts within `tol` of an
/// existing endpoint are left to vertex clustering.
pub fn segment_contacts(p0: Point2, p1: Point2, q0: Point2, q1: Point2, tol: Real) -> Vec<SplitPoint> {
    let mut out = Vec::new();
    let len_p = dist_xy(p0, p1);
    let len_q = dist_xy(q0, q1);
    if len_p <= tol || len_q <= tol {
        return out;
    }

    // Endpoints of one segment lying on the interior of the other.
    let mut touch = |segment: usize, point: Point2, a: Point2, b: Point2, len: Real| {
        let (t, d) = project_param(point, a, b);
        if d <= tol && t * len > tol && (1.0 - t) * len > tol {
            out.push(SplitPoint { segment, t, at: point });
        }
    };
    touch(0, q0, p0, p1, len_p);
    touch(0, q1, p0, p1, len_p);
    touch(1, p0, q0, q1, len_q);
    touch(1, p1, q0, q1, len_q);
    if !out.is_empty() {
        return out;
    }

    // Proper crossing.
    let d1 = orient(p0, p1, q0);
    let d2 = orient(p0, p1, q1);
    let d3 = orient(q0, q1, p0);
    let d4 = orient(q0, q1, p1);
    let strict_p = tol * len_p;
    let strict_q = tol * len_q;
    let q_straddles = (d1 > strict_p && d2 < -strict_p) || (d1 < -strict_p && d2 > strict_p);
    let p_straddles = (d3 > strict_q && d4 < -strict_q) || (d3 < -strict_q && d4 > strict_q);
    if q_straddles && p_straddles {
        let t = d3 / (d3 - d4);
        let u = d1 / (d1 - d2);
        let at = [lerp(p0[0], p1[0], t), lerp(p0[1], p1[1], t)];
        if t * len_p > tol && (1.0 - t) * len_p > tol {
            out.push(SplitPoint { segment: 0, t, at });
        }
        if u * len_q > tol && (1.0 - u) * len_q > tol {
            out.push(SplitPoint { segment: 1, t: u, at });
        }
    }
    out
}

/// Compute the in-circle predicate for Delaunay refinement.
/// Positive when v lies inside the circle through the counter-clockwise
/// triangle (v0, v1, v2).
pub fn in_circle(v: Point2, v0: Point2, v1: Point2, v2: Point2) -> Real {
    let adx = v0[0] - v[0];
    let ady = v0[1] - v[1];
    let bdx = v1[0] - v[0];
    let bdy = v1[1] - v[1];
    let cdx = v2[0] - v[0];
    let cdy = v2[1] - v[1];

    let ab_det = adx * bdy - bdx * ady;
    let bc_det = bdx * cdy - cdx * bdy;
    let ca_det = cdx * ady - adx * cdy;

    let a_lift = adx * adx + ady * ady;
    let b_lift = bdx * bdx + bdy * bdy;
    let c_lift = cdx * cdx + cdy * cdy;

    a_lift * bc_det + b_lift * ca_det + c_lift * ab_det
}

/// Returns true if p is inside or on the boundary of the counter-clockwise
/// triangle (a, b, c).
pub fn point_in_triangle(p: Point2, a: Point2, b: Point2, c: Point2) -> bool {
    orient(a, b, p) >= 0.0 && orient(b, c, p) >= 0.0 && orient(c, a, p) >= 0.0
}

#[inline]
pub fn sub3(a: Point3, b: Point3) -> Point3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn cross3(a: Point3, b: Point3) -> Point3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[inline]
pub fn dot3(a: Point3, b: Point3) -> Real {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Unit vector along v, or None for a zero vector.
pub fn normalize3(v: Point3) -> Option<Point3> {
    let len = dot3(v, v).sqrt();
    if len == 0.0 || !len.is_finite() {
        return None;
    }
    Some([v[0] / len, v[1] / len, v[2] / len])
}

/// Unit normal of the corner (prev, at, next), or None when degenerate.
pub fn corner_normal(prev: Point3, at: Point3, next: Point3) -> Option<Point3> {
    normalize3(cross3(sub3(at, prev), sub3(next, at)))
}

/// Corner normal flipped to point up, so reflex and convex corners of one
/// planar face agree.
pub fn upward_normal(prev: Point3, at: Point3, next: Point3) -> Option<Point3> {
    corner_normal(prev, at, next).map(|n| if n[2] < 0.0 { [-n[0], -n[1], -n[2]] } else { n })
}
