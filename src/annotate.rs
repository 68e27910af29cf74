// Copyright 2025 Lars Brubaker
// License: SGI Free Software License B (MIT-compatible)
//
// Edge-bundle walking and intraplane edge removal.
//
// Coincident edges from different polygons survive the merge as parallel
// edges with two-node faces between them.  A bundle is the run of such
// edges between two real faces: starting from a node f0 on a real face,
// while the face across f_i is a two-node face, f_{i+1} = face_next(mate(f_i)).
// The face across the last edge is the far face.
//
// Annotation removes bundles whose two outer sides carry the same plane
// with parallel normals (the seam between coplanar patches of one surface),
// flags planes claimed on both sides of one edge, and heals the degree-2
// vertices that removal leaves behind.

use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::config::DrapeConfig;
use crate::error::Result;
use crate::geom::{dot3, orient, upward_normal, Point3};
use crate::graph::{mask, mate, Graph, NodeId};
use crate::plane::{PlaneId, PlaneRegistry, NULL_PLANE};

/// A run of coincident edges between two real faces, all oriented like the
/// first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bundle {
    pub edges: SmallVec<[NodeId; 4]>,
}

impl Bundle {
    /// Node on the near real face.
    #[inline]
    pub fn near(&self) -> NodeId {
        self.edges[0]
    }

    /// Node on the far real face, running opposite to `near`.
    #[inline]
    pub fn far(&self) -> NodeId {
        mate(self.edges[self.edges.len() - 1])
    }

    pub fn contains(&self, n: NodeId) -> bool {
        self.edges.iter().any(|&e| e == n || mate(e) == n)
    }

    /// Two-node faces crossed between the near and far faces, each named by
    /// one of its nodes.
    pub fn null_faces(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.edges[..self.edges.len() - 1].iter().map(|&e| mate(e))
    }
}

/// Walk the bundle starting at `start`, which should lie on a real face.
pub fn walk_bundle(graph: &Graph, start: NodeId) -> Bundle {
    let mut edges: SmallVec<[NodeId; 4]> = SmallVec::new();
    edges.push(start);
    let mut f = start;
    loop {
        let across = mate(f);
        if !graph.is_null_face(across) {
            break;
        }
        let g = graph.face_next(across);
        if g == start || edges.len() > graph.nodes.len() {
            break;
        }
        edges.push(g);
        f = g;
    }
    Bundle { edges }
}

/// Planes that one PRIMARY edge of the bundle claims on both of its sides.
/// A loop never covers both sides of its own edge, so such a plane's
/// crossings cannot balance.  Coincident loops of one plane only stack up
/// the net count and are not reported.
pub fn self_covering_planes(graph: &Graph, bundle: &Bundle) -> SmallVec<[PlaneId; 2]> {
    let mut found: SmallVec<[PlaneId; 2]> = SmallVec::new();
    for &f in &bundle.edges {
        let plane = graph.plane(f);
        if plane != NULL_PLANE
            && graph.has_mask(f, mask::PRIMARY)
            && graph.plane(mate(f)) == plane
            && !found.contains(&plane)
        {
            found.push(plane);
        }
    }
    found
}

/// Normal of the face at node n, from the corner at n or, if that corner is
/// degenerate, the corner at the far end of n's edge.
fn side_normal(graph: &Graph, n: NodeId) -> Option<Point3> {
    let corner = |k: NodeId| {
        upward_normal(
            graph.position(graph.face_prev(k)),
            graph.position(k),
            graph.position(graph.face_next(k)),
        )
    };
    corner(n).or_else(|| corner(graph.face_next(n)))
}

/// Counts reported by annotation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AnnotateReport {
    pub bundles_removed: usize,
    pub edges_removed: usize,
    pub vertices_healed: usize,
    pub dangling_planes: usize,
}

/// Remove intraplane bundles, flag impossible plane transitions and heal the
/// vertices left behind.
pub fn collapse_intraplane_edges(
    graph: &mut Graph,
    planes: &mut PlaneRegistry,
    config: &DrapeConfig,
) -> Result<AnnotateReport> {
    let mut report = AnnotateReport::default();

    let removable = graph.with_scratch_mask(|g, seen| {
        let mut removable: Vec<Bundle> = Vec::new();
        for n in 0..g.nodes.len() as NodeId {
            if !g.is_live(n) || g.has_mask(n, seen) || g.is_null_face(n) {
                continue;
            }
            let bundle = walk_bundle(g, n);
            for &e in &bundle.edges {
                g.set_edge_mask(e, seen);
            }

            for plane in self_covering_planes(g, &bundle) {
                if planes.mark_dangling(plane) {
                    report.dangling_planes += 1;
                }
            }

            if plane_match(g, planes, &bundle, config) {
                removable.push(bundle);
            }
        }
        Ok(removable)
    })?;

    for bundle in removable {
        if remove_bundle(graph, &bundle) {
            report.bundles_removed += 1;
            report.edges_removed += bundle.edges.len();
        }
    }

    // Vertex ids are copied onto every surviving node of a rotation so
    // later passes can key on them.
    for seed in graph.vertex_seeds()? {
        let id = graph.vertex_id(seed);
        let ring: Vec<NodeId> = graph.vertex_loop(seed).collect();
        for n in ring {
            graph.set_vertex_id(n, id);
        }
    }

    for n in 0..graph.nodes.len() as NodeId {
        if graph.is_live(n) && heal_vertex(graph, n, config) {
            report.vertices_healed += 1;
        }
    }

    debug!(
        bundles = report.bundles_removed,
        edges = report.edges_removed,
        healed = report.vertices_healed,
        dangling = report.dangling_planes,
        "intraplane edges collapsed"
    );
    Ok(report)
}

/// Both outer sides carry the same valid plane, the inner two-node faces
/// carry none, no barrier blocks removal and the local normals agree.
fn plane_match(graph: &Graph, planes: &PlaneRegistry, bundle: &Bundle, config: &DrapeConfig) -> bool {
    let near = bundle.near();
    let far = bundle.far();
    let plane = graph.plane(near);
    if plane == NULL_PLANE || graph.plane(far) != plane || !planes.is_valid(plane) {
        return false;
    }
    if bundle
        .null_faces()
        .any(|n| graph.plane(n) != NULL_PLANE || graph.plane(graph.face_next(n)) != NULL_PLANE)
    {
        return false;
    }
    if config.respect_barriers && bundle.edges.iter().any(|&e| graph.has_mask(e, mask::BARRIER)) {
        return false;
    }
    match (side_normal(graph, near), side_normal(graph, far)) {
        (Some(a), Some(b)) => 1.0 - dot3(a, b) <= config.normal_parallel_tol,
        _ => true,
    }
}

/// Delete every edge of the bundle, merging the near and far faces.
/// Returns false (and leaves the graph alone) when both sides are the same
/// face, which would split a component apart.
fn remove_bundle(graph: &mut Graph, bundle: &Bundle) -> bool {
    let near = bundle.near();
    let far = bundle.far();
    if !graph.is_live(near) || !graph.is_live(far) || graph.face_loop(near).any(|n| n == far) {
        return false;
    }
    let exterior = graph.has_mask(near, mask::EXTERIOR) || graph.has_mask(far, mask::EXTERIOR);
    let survivor = graph
        .face_loop(near)
        .find(|&n| !bundle.contains(n))
        .or_else(|| graph.face_loop(far).find(|&n| !bundle.contains(n)));
    for &e in &bundle.edges {
        graph.delete_edge(e);
    }
    trace!(edges = bundle.edges.len(), "intraplane bundle removed");
    if let (true, Some(s)) = (exterior, survivor) {
        graph.set_mask_around_face(s, mask::EXTERIOR);
    }
    true
}

/// Remove a degree-2 vertex at n whose two edges are collinear and carry
/// the same attributes on each side, joining them into one edge.
pub fn heal_vertex(graph: &mut Graph, n: NodeId, config: &DrapeConfig) -> bool {
    let m = graph.vertex_next(n);
    if m == n || graph.vertex_next(m) != n || mate(m) == n {
        return false;
    }
    let at = graph.xy(n);
    let to_n = graph.dest_xy(n);
    let to_m = graph.dest_xy(m);
    let len = crate::geom::dist_xy(at, to_n) * crate::geom::dist_xy(at, to_m);
    let dot = (to_n[0] - at[0]) * (to_m[0] - at[0]) + (to_n[1] - at[1]) * (to_m[1] - at[1]);
    if len == 0.0 || dot >= 0.0 || orient(at, to_n, to_m).abs() > config.merge_abs_tol * len.sqrt() {
        return false;
    }
    // mate(n) lies on m's face and mate(m) on n's face.
    let same = |a: NodeId, b: NodeId| {
        graph.plane(a) == graph.plane(b)
            && graph.nodes[a as usize].mask & mask::HEAL == graph.nodes[b as usize].mask & mask::HEAL
    };
    if !same(mate(n), m) || !same(n, mate(m)) {
        return false;
    }
    let start = mate(n);
    if graph.xy(start) == graph.dest_xy(m) {
        return false;
    }

    // m takes over the far end of n's edge.
    let far_xy = graph.xy(start);
    let far_z = graph.z(start);
    let far_id = graph.vertex_id(start);
    let others: Vec<NodeId> = graph.vertex_loop(start).filter(|&k| k != start).collect();
    graph.delete_edge(n);
    graph.nodes[m as usize].position = [far_xy[0], far_xy[1], far_z];
    graph.set_vertex_id(m, far_id);
    let mut ring = others;
    ring.push(m);
    graph.rebuild_rotation(&ring);
    true
}
