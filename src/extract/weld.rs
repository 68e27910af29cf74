// Copyright 2025 Lars Brubaker
// Base weld: the flat bottom that closes the draped volume.
//
// The graph is reduced to the outline of the visible region, flattened to
// the base elevation, triangulated by ear clipping, improved with Delaunay
// flips and emitted face-down.  This consumes the graph's face structure,
// so it runs after every other extraction pass.

use tracing::{debug, warn};

use super::{FacetClass, MeshBuilder};
use crate::annotate::walk_bundle;
use crate::arrangement::{regularize, DisjointSet};
use crate::config::DrapeConfig;
use crate::error::Result;
use crate::geom::{orient, point_in_triangle};
use crate::graph::{mask, mate, Graph, Mask, NodeId};
use crate::plane::NULL_PLANE;

/// Put WELD on one edge of every bundle between exterior and visible faces.
fn mark_weld_edges(graph: &mut Graph) -> Result<usize> {
    graph.clear_mask_everywhere(mask::WELD);
    graph.with_scratch_mask(|g, seen| {
        let mut marked = 0;
        for n in 0..g.nodes.len() as NodeId {
            if !g.is_live(n) || g.has_mask(n, seen) || g.is_null_face(n) {
                continue;
            }
            let bundle = walk_bundle(g, n);
            for &e in &bundle.edges {
                g.set_edge_mask(e, seen);
            }
            if g.has_mask(bundle.near(), mask::EXTERIOR) != g.has_mask(bundle.far(), mask::EXTERIOR) {
                g.set_edge_mask(bundle.near(), mask::WELD);
                marked += 1;
            }
        }
        Ok(marked)
    })
}

/// Delete every non-WELD edge that still separates two distinct faces.
/// Edges whose sides were already joined are kept so no face is cut apart.
fn merge_faces(graph: &mut Graph) -> Result<usize> {
    let seeds = graph.face_seeds()?;
    let mut label = vec![usize::MAX; graph.nodes.len()];
    for (i, &face) in seeds.iter().enumerate() {
        for n in graph.face_loop(face) {
            label[n as usize] = i;
        }
    }
    let mut sets = DisjointSet::new(seeds.len());
    let mut deleted = 0;
    for n in (0..graph.nodes.len() as NodeId).step_by(2) {
        if !graph.is_live(n) || graph.has_mask(n, mask::WELD) {
            continue;
        }
        let (a, b) = (label[n as usize], label[mate(n) as usize]);
        if sets.find(a) != sets.find(b) {
            sets.union(a, b);
            graph.delete_edge(n);
            deleted += 1;
        }
    }
    Ok(deleted)
}

/// Mark the faces an odd number of WELD edges away from the unbounded
/// faces with `region`.
fn mark_interior(graph: &mut Graph, region: Mask) -> Result<usize> {
    let mut starts: Vec<NodeId> = graph.face_seeds()?;
    // unbounded faces first so parity is counted from outside
    starts.sort_by_key(|&f| graph.signed_area(f) >= 0.0);
    graph.with_scratch_mask(|g, visited| {
        let mut interior = 0;
        let mut stack: Vec<(NodeId, bool)> = Vec::new();
        for &start in &starts {
            if g.has_mask(start, visited) {
                continue;
            }
            stack.push((start, false));
            while let Some((face, inside)) = stack.pop() {
                if g.has_mask(face, visited) {
                    continue;
                }
                g.set_mask_around_face(face, visited);
                if inside {
                    g.set_mask_around_face(face, region);
                    interior += 1;
                }
                let ring: Vec<NodeId> = g.face_loop(face).collect();
                for n in ring {
                    let across = mate(n);
                    if !g.has_mask(across, visited) {
                        stack.push((across, inside ^ g.has_mask(n, mask::WELD)));
                    }
                }
            }
        }
        Ok(interior)
    })
}

/// A corner of the face whose triangle holds no other corner, or failing
/// that the most convex corner.
fn find_ear(graph: &Graph, face: NodeId) -> NodeId {
    let ring: Vec<NodeId> = graph.face_loop(face).collect();
    let mut best = (f64::NEG_INFINITY, face);
    for &c in &ring {
        let p = graph.xy(graph.face_prev(c));
        let at = graph.xy(c);
        let n = graph.xy(graph.face_next(c));
        let turn = orient(p, at, n);
        if turn <= 0.0 {
            continue;
        }
        if turn > best.0 {
            best = (turn, c);
        }
        let blocked = ring.iter().any(|&k| {
            let q = graph.xy(k);
            q != p && q != at && q != n && point_in_triangle(q, p, at, n)
        });
        if !blocked {
            return c;
        }
    }
    best.1
}

/// Ear-clip every region face down to triangles.  Returns the number of
/// diagonals added.
fn triangulate_region(graph: &mut Graph, region: Mask, budget: usize) -> Result<usize> {
    let pending: Vec<NodeId> = graph
        .face_seeds()?
        .into_iter()
        .filter(|&f| graph.has_mask(f, region) && graph.face_len(f) > 3)
        .collect();
    let mut added = 0;
    for face in pending {
        let mut rest = face;
        while graph.face_len(rest) > 3 {
            if added >= budget {
                warn!(budget, "weld triangulation budget exhausted");
                return Ok(added);
            }
            let ear = find_ear(graph, rest);
            let diagonal = graph.connect(graph.face_next(ear), graph.face_prev(ear))?;
            graph.set_edge_mask(diagonal, region);
            added += 1;
            rest = mate(diagonal);
        }
    }
    Ok(added)
}

/// Flatten the graph to the base elevation, triangulate the visible region
/// and emit it face-down.  Returns the number of triangles emitted.
pub fn emit_base_weld(graph: &mut Graph, config: &DrapeConfig, builder: &mut MeshBuilder) -> Result<usize> {
    let welds = mark_weld_edges(graph)?;
    let merged = merge_faces(graph)?;
    let budget = config.budget(graph.live_count());
    regularize(graph, budget);
    for node in graph.nodes.iter_mut() {
        node.position[2] = config.base_elevation;
        node.height_source = NULL_PLANE;
    }

    let emitted = graph.with_scratch_mask(|g, region| {
        mark_interior(g, region)?;
        let diagonals = triangulate_region(g, region, budget)?;
        let flips = g.refine_delaunay(region, budget)?;
        debug!(diagonals, flips, "weld triangulated");
        let mut emitted = 0;
        for face in g.face_seeds()? {
            if !g.has_mask(face, region) || g.face_len(face) != 3 {
                continue;
            }
            let corners: Vec<(u32, _)> = g
                .face_loop(face)
                .map(|n| (g.vertex_id(n), g.position(n)))
                .collect();
            if builder.facet(corners.into_iter().rev(), FacetClass::Base) {
                emitted += 1;
            }
        }
        Ok(emitted)
    })?;
    debug!(welds, merged, emitted, "base weld emitted");
    Ok(emitted)
}
