// Copyright 2025 Lars Brubaker
// Visibility flood: assign every face its height and exterior status.
//
// The flood starts in the unbounded faces with no active planes and walks
// across bundles.  Crossing a PRIMARY edge leaves the plane on its near side
// and enters the plane on its far side, so each face is reached with the
// set of planes whose polygons cover it.  The face takes the highest valid
// plane at each corner, clamped to [base, ceiling].
//
// Work is a LIFO stack of (node, active planes, unmatched exits).  A plane
// exited while not active breaks the stack discipline: it is marked
// dangling and remembered as unmatched so that re-entering it later cancels
// instead of pushing it.

use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::annotate::walk_bundle;
use crate::config::DrapeConfig;
use crate::error::Result;
use crate::geom::Real;
use crate::graph::{mask, mate, Graph, Mask, NodeId};
use crate::plane::{PlaneId, PlaneRegistry, NULL_PLANE};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FloodReport {
    pub faces: usize,
    pub exterior_faces: usize,
    pub dangling_planes: usize,
    /// Faces turned exterior by the second pass.
    pub reclassified: usize,
}

#[derive(Clone, Debug)]
struct Entry {
    node: NodeId,
    active: SmallVec<[PlaneId; 8]>,
    unmatched: SmallVec<[PlaneId; 2]>,
}

impl Entry {
    fn seed(node: NodeId) -> Self {
        Entry {
            node,
            active: SmallVec::new(),
            unmatched: SmallVec::new(),
        }
    }

    /// Apply the plane transitions of crossing f from its left face.
    fn cross(&mut self, graph: &Graph, planes: &mut PlaneRegistry, f: NodeId, report: &mut FloodReport) {
        if !graph.has_mask(f, mask::PRIMARY) {
            return;
        }
        let exit = graph.plane(f);
        if exit != NULL_PLANE {
            match self.active.iter().rposition(|&p| p == exit) {
                Some(i) => {
                    self.active.remove(i);
                }
                None => {
                    if planes.mark_dangling(exit) {
                        report.dangling_planes += 1;
                    }
                    self.unmatched.push(exit);
                }
            }
        }
        let enter = graph.plane(mate(f));
        if enter != NULL_PLANE {
            match self.unmatched.iter().position(|&p| p == enter) {
                Some(i) => {
                    self.unmatched.swap_remove(i);
                }
                None => self.active.push(enter),
            }
        }
    }
}

/// Set the heights of one face from an active plane set.  Returns whether
/// any valid plane covers it.
fn assign_heights(
    graph: &mut Graph,
    planes: &PlaneRegistry,
    config: &DrapeConfig,
    face: NodeId,
    active: &[PlaneId],
) -> bool {
    let corners: Vec<NodeId> = graph.face_loop(face).collect();
    let mut covered = false;
    for k in corners {
        let [x, y] = graph.xy(k);
        let mut best = config.base_elevation;
        let mut source = NULL_PLANE;
        for &id in active {
            if let Some(plane) = planes.valid(id) {
                covered = true;
                let z = plane.eval(x, y);
                if source == NULL_PLANE || z > best {
                    best = z;
                    source = id;
                }
            }
        }
        let node = &mut graph.nodes[k as usize];
        node.position[2] = config.clamp_height(best);
        node.height_source = source;
    }
    covered
}

/// Quick pre-pass: every face with negative signed area is exterior.
pub fn classify_exterior_coarse(graph: &mut Graph) -> Result<usize> {
    graph.clear_mask_everywhere(mask::EXTERIOR);
    let mut count = 0;
    for face in graph.face_seeds()? {
        if graph.signed_area(face) < 0.0 {
            graph.set_mask_around_face(face, mask::EXTERIOR);
            count += 1;
        }
    }
    Ok(count)
}

/// Flood the plane sets over the whole graph, assigning heights and the
/// EXTERIOR bit, then sweep exterior status into faces that only a
/// non-primary edge or a sliver separates from the outside.
pub fn flood_planes(
    graph: &mut Graph,
    planes: &mut PlaneRegistry,
    config: &DrapeConfig,
) -> Result<FloodReport> {
    graph.clear_mask_everywhere(mask::EXTERIOR);
    let bbox_area = graph.bounds_area();
    let mut faces: Vec<(Real, NodeId)> = graph
        .face_seeds()?
        .into_iter()
        .map(|f| (graph.signed_area(f), f))
        .collect();
    let threshold = -config.exterior_seed_area_fraction * bbox_area;
    // Clearly negative faces first, then the remaining negative ones, each
    // group largest first, so every unbridged component starts from its own
    // unbounded face.  Positive faces only seed what nothing else reached.
    let tier = |area: Real| {
        if area < threshold {
            0
        } else if area < 0.0 {
            1
        } else {
            2
        }
    };
    faces.sort_by(|a, b| {
        let (ta, tb) = (tier(a.0), tier(b.0));
        ta.cmp(&tb).then(if ta < 2 { a.0.total_cmp(&b.0) } else { std::cmp::Ordering::Equal })
    });
    let budget = config.budget(graph.live_count());

    let mut report = graph.with_scratch_mask(|g, visited| {
        let mut report = FloodReport::default();
        let mut stack: Vec<Entry> = Vec::new();
        let mut steps = 0usize;
        for &(_, start) in &faces {
            if g.has_mask(start, visited) {
                continue;
            }
            stack.push(Entry::seed(start));
            while let Some(entry) = stack.pop() {
                steps += 1;
                if steps > budget {
                    warn!(budget, "flood iteration budget exhausted");
                    return Ok(report);
                }
                if g.has_mask(entry.node, visited) {
                    continue;
                }
                visit_face(g, planes, config, entry.node, &entry.active, visited, &mut report);
                if g.is_null_face(entry.node) {
                    continue;
                }
                let corners: Vec<NodeId> = g.face_loop(entry.node).collect();
                for k in corners {
                    let bundle = walk_bundle(g, k);
                    let mut next = entry.clone();
                    for (i, &f) in bundle.edges.iter().enumerate() {
                        next.cross(g, planes, f, &mut report);
                        let across = mate(f);
                        if i + 1 < bundle.edges.len() && !g.has_mask(across, visited) {
                            visit_face(g, planes, config, across, &next.active, visited, &mut report);
                        }
                    }
                    let far = bundle.far();
                    if !g.has_mask(far, visited) {
                        next.node = far;
                        stack.push(next);
                    }
                }
            }
        }
        Ok(report)
    })?;

    report.reclassified = reclassify_exterior(graph, config, bbox_area)?;
    report.exterior_faces += report.reclassified;
    debug!(
        faces = report.faces,
        exterior = report.exterior_faces,
        dangling = report.dangling_planes,
        reclassified = report.reclassified,
        "planes flooded"
    );
    Ok(report)
}

fn visit_face(
    graph: &mut Graph,
    planes: &PlaneRegistry,
    config: &DrapeConfig,
    face: NodeId,
    active: &[PlaneId],
    visited: Mask,
    report: &mut FloodReport,
) {
    graph.set_mask_around_face(face, visited);
    report.faces += 1;
    let covered = assign_heights(graph, planes, config, face, active);
    if !covered && !graph.is_null_face(face) {
        graph.set_mask_around_face(face, mask::EXTERIOR);
        report.exterior_faces += 1;
    }
}

/// Tiny in absolute terms and thin for its perimeter.
fn is_sliver_face(graph: &Graph, face: NodeId, max_area: Real, max_ratio: Real) -> bool {
    let area = graph.signed_area(face).abs();
    if area > max_area {
        return false;
    }
    let perimeter: Real = graph.face_loop(face).map(|n| graph.edge_length(n)).sum();
    area < max_ratio * perimeter * perimeter
}

/// Spread exterior status from the negative-area exterior faces across
/// bundles with no PRIMARY edge and into sliver faces.  Faces taken over
/// are reset to the base elevation.
pub fn reclassify_exterior(graph: &mut Graph, config: &DrapeConfig, bbox_area: Real) -> Result<usize> {
    let sliver = config.sliver_face_area_fraction * bbox_area;
    let mut stack: Vec<NodeId> = graph
        .face_seeds()?
        .into_iter()
        .filter(|&f| graph.has_mask(f, mask::EXTERIOR) && graph.signed_area(f) < 0.0)
        .collect();
    let mut count = 0;
    while let Some(face) = stack.pop() {
        let corners: Vec<NodeId> = graph.face_loop(face).collect();
        for k in corners {
            if graph.is_null_face(k) {
                continue;
            }
            let bundle = walk_bundle(graph, k);
            let far = bundle.far();
            if graph.has_mask(far, mask::EXTERIOR) || graph.is_null_face(far) {
                continue;
            }
            let open = bundle.edges.iter().all(|&e| !graph.has_mask(e, mask::PRIMARY | mask::WELD));
            if !open && !is_sliver_face(graph, far, sliver, config.sliver_ratio) {
                continue;
            }
            let ring: Vec<NodeId> = graph.face_loop(far).collect();
            for n in ring {
                graph.set_mask(n, mask::EXTERIOR);
                graph.nodes[n as usize].position[2] = config.base_elevation;
                graph.nodes[n as usize].height_source = NULL_PLANE;
            }
            count += 1;
            stack.push(far);
        }
    }
    Ok(count)
}
