// Copyright 2025 Lars Brubaker
// License: SGI Free Software License B (MIT-compatible)
//
// Arrangement construction: turn a bag of independent polygon loops into
// one planar subdivision.
//
// Order of work:
//   1. cluster vertices within the merge tolerance and snap them together
//   2. split edges at crossings, T-junctions and collinear overlaps
//   3. cluster again (split points may land on existing vertices)
//   4. rebuild each merged vertex rotation in angular order
//   5. bridge nested components to the component around them
//
// regularize() and collapse_short_edges() clean the result and are safe to
// re-run: a second run changes nothing.

mod bridge;

pub use bridge::bridge_components;

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::error::Result;
use crate::geom::{segment_contacts, vert_leq, Point2, Real};
use crate::graph::{mate, Graph, NodeId};

/// Counts reported by the construction passes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub vertices_snapped: usize,
    pub crossings_split: usize,
    pub bridges: usize,
}

/// Union-find over dense indices.
pub(crate) struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    pub(crate) fn new(count: usize) -> Self {
        DisjointSet {
            parent: (0..count).collect(),
        }
    }

    pub(crate) fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    /// Join two sets; the smaller root survives.
    pub(crate) fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (keep, drop) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[drop] = keep;
        }
    }
}

/// Merge all ingested loops into one subdivision.
pub fn merge_loops(graph: &mut Graph, tol: Real) -> Result<MergeReport> {
    let mut report = MergeReport::default();
    report.vertices_snapped += cluster_vertices(graph, tol)?.1;
    report.crossings_split = split_crossings(graph, tol)?;
    let (clusters, snapped) = cluster_vertices(graph, tol)?;
    report.vertices_snapped += snapped;
    for members in &clusters {
        if members.len() > 1 {
            let nodes: Vec<NodeId> = members
                .iter()
                .flat_map(|&seed| graph.vertex_loop(seed).collect::<Vec<_>>())
                .collect();
            graph.rebuild_rotation(&nodes);
        }
    }
    report.bridges = bridge_components(graph, tol)?;
    debug!(
        nodes = graph.live_count(),
        snapped = report.vertices_snapped,
        splits = report.crossings_split,
        bridges = report.bridges,
        "loops merged"
    );
    Ok(report)
}

/// Group vertex rotations lying within `tol` of each other, snap every
/// member to the lexically lowest one and give each group a fresh vertex id.
/// Returns the groups (one seed node per member rotation) and the number of
/// rotations that moved.
pub fn cluster_vertices(graph: &mut Graph, tol: Real) -> Result<(Vec<Vec<NodeId>>, usize)> {
    let seeds = graph.vertex_seeds()?;
    let mut order: Vec<usize> = (0..seeds.len()).collect();
    order.sort_by(|&a, &b| {
        let (pa, pb) = (graph.xy(seeds[a]), graph.xy(seeds[b]));
        pa[0].total_cmp(&pb[0]).then(pa[1].total_cmp(&pb[1]))
    });

    let mut sets = DisjointSet::new(order.len());
    for i in 0..order.len() {
        let pi = graph.xy(seeds[order[i]]);
        for j in (i + 1)..order.len() {
            let pj = graph.xy(seeds[order[j]]);
            if pj[0] - pi[0] > tol {
                break;
            }
            if (pj[1] - pi[1]).abs() <= tol {
                sets.union(i, j);
            }
        }
    }

    // Roots are the smallest sorted position, so the lexically lowest member.
    let mut groups: FxHashMap<usize, usize> = FxHashMap::default();
    let mut clusters: Vec<Vec<NodeId>> = Vec::new();
    for i in 0..order.len() {
        let root = sets.find(i);
        let slot = *groups.entry(root).or_insert_with(|| {
            clusters.push(Vec::new());
            clusters.len() - 1
        });
        clusters[slot].push(seeds[order[i]]);
    }

    let mut snapped = 0;
    for members in &clusters {
        let anchor = graph.xy(members[0]);
        let id = graph.allocate_vertex_id();
        for &seed in members {
            let moved = graph.xy(seed) != anchor;
            if moved {
                snapped += 1;
            }
            let ring: Vec<NodeId> = graph.vertex_loop(seed).collect();
            for n in ring {
                graph.set_xy(n, anchor);
                graph.set_vertex_id(n, id);
            }
        }
    }
    Ok((clusters, snapped))
}

/// Split every edge at its contacts with other edges.  Returns the number
/// of splits made.
pub fn split_crossings(graph: &mut Graph, tol: Real) -> Result<usize> {
    let edges: Vec<NodeId> = graph.live_nodes().filter(|n| n & 1 == 0).collect();
    let segment = |g: &Graph, e: NodeId| -> (Point2, Point2) { (g.xy(e), g.dest_xy(e)) };

    // Sort and prune along x.
    let mut order: Vec<(Real, Real, NodeId)> = edges
        .iter()
        .map(|&e| {
            let (p, q) = segment(graph, e);
            (p[0].min(q[0]), p[0].max(q[0]), e)
        })
        .collect();
    order.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut cuts: FxHashMap<NodeId, Vec<(Real, Point2)>> = FxHashMap::default();
    for i in 0..order.len() {
        let (_, max_x, e) = order[i];
        let (p0, p1) = segment(graph, e);
        let (lo_y, hi_y) = (p0[1].min(p1[1]), p0[1].max(p1[1]));
        for &(min_x_f, _, f) in &order[(i + 1)..] {
            if min_x_f > max_x + tol {
                break;
            }
            let (q0, q1) = segment(graph, f);
            if q0[1].max(q1[1]) < lo_y - tol || q0[1].min(q1[1]) > hi_y + tol {
                continue;
            }
            for contact in segment_contacts(p0, p1, q0, q1, tol) {
                let target = if contact.segment == 0 { e } else { f };
                cuts.entry(target).or_default().push((contact.t, contact.at));
            }
        }
    }

    let mut splits = 0;
    let mut targets: Vec<NodeId> = cuts.keys().copied().collect();
    targets.sort_unstable();
    for e in targets {
        let mut points = cuts.remove(&e).unwrap_or_default();
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        let length = graph.edge_length(e);
        let mut current = e;
        let mut last_t = Real::NEG_INFINITY;
        for (t, at) in points {
            if (t - last_t) * length <= tol {
                continue;
            }
            current = graph.split_edge(current, at)?;
            last_t = t;
            splits += 1;
        }
    }
    Ok(splits)
}

/// Contract n's edge: every node at its far end moves to n's vertex, the
/// edge is deleted and the combined rotation is rebuilt.
pub fn contract_edge(graph: &mut Graph, n: NodeId) {
    let m = mate(n);
    let at = graph.xy(n);
    let id = graph.vertex_id(n);
    let near_rest = graph.vertex_loop(n).find(|&k| k != n && k != m);
    let far_rest = graph.vertex_loop(m).find(|&k| k != n && k != m);
    graph.delete_edge(n);

    let mut members: Vec<NodeId> = Vec::new();
    if let Some(k) = near_rest {
        members.extend(graph.vertex_loop(k));
    }
    if let Some(k) = far_rest {
        if !members.contains(&k) {
            let ring: Vec<NodeId> = graph.vertex_loop(k).collect();
            for r in ring {
                graph.set_xy(r, at);
                graph.set_vertex_id(r, id);
                members.push(r);
            }
        }
    }
    graph.rebuild_rotation(&members);
}

/// Delete dangling edges (an end with no other edge) and contract
/// zero-length edges until neither remains.  Returns the number of edges
/// removed.
pub fn regularize(graph: &mut Graph, budget: usize) -> usize {
    let mut removed = 0;
    for _ in 0..budget.max(1) {
        let mut changed = 0;
        for n in 0..graph.nodes.len() as NodeId {
            if !graph.is_live(n) || n & 1 != 0 {
                continue;
            }
            let m = mate(n);
            if graph.vertex_id(n) == graph.vertex_id(m) && graph.xy(n) == graph.xy(m) {
                contract_edge(graph, n);
                changed += 1;
            } else if graph.vertex_next(n) == n || graph.vertex_next(m) == m {
                graph.delete_edge(n);
                changed += 1;
            }
        }
        removed += changed;
        if changed == 0 {
            return removed;
        }
    }
    warn!(budget, "regularize budget exhausted");
    removed
}

/// Contract edges shorter than `tol`, then regularize, until no short edge
/// remains.  Returns the number of edges contracted.
pub fn collapse_short_edges(graph: &mut Graph, tol: Real, budget: usize) -> usize {
    let mut collapsed = 0;
    for _ in 0..budget.max(1) {
        let mut changed = 0;
        for n in 0..graph.nodes.len() as NodeId {
            if !graph.is_live(n) || n & 1 != 0 {
                continue;
            }
            let length = graph.edge_length(n);
            if length > 0.0 && length < tol {
                // keep the lexically lower end
                let keep = if vert_leq(graph.xy(n), graph.dest_xy(n)) { n } else { mate(n) };
                contract_edge(graph, keep);
                changed += 1;
            }
        }
        collapsed += changed;
        regularize(graph, budget);
        if changed == 0 {
            return collapsed;
        }
    }
    warn!(budget, "short edge collapse budget exhausted");
    collapsed
}
