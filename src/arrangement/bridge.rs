// Copyright 2025 Lars Brubaker
// Bridging of nested components.
//
// A component lying inside a face of another component is not reachable
// by walking edges, so its faces would never share a loop with the face
// around them.  Each component's leftmost vertex casts a ray toward -x and
// is joined to the nearest edge it hits by a BRIDGE edge.  Bridges carry
// the null plane on both sides and never change the active plane set.

use tracing::trace;

use crate::error::Result;
use crate::geom::{dist_xy, vert_leq, Point2, Real};
use crate::graph::{mask, mate, Graph, NodeId};
use crate::plane::NULL_PLANE;

const UNLABELED: u32 = u32::MAX;

/// Where a leftward ray from `origin` meets segment p-q, if it does so more
/// than `tol` to the left of the origin.
fn ray_hit(p: Point2, q: Point2, origin: Point2, tol: Real) -> Option<Point2> {
    let y = origin[1];
    if (p[1] - y) * (q[1] - y) > 0.0 {
        return None;
    }
    let x = if p[1] == q[1] {
        // horizontal on the ray: its right end is the first thing hit
        if p[0].min(q[0]) < origin[0] && origin[0] < p[0].max(q[0]) {
            return None;
        }
        p[0].max(q[0])
    } else {
        let t = (y - p[1]) / (q[1] - p[1]);
        p[0] + t * (q[0] - p[0])
    };
    (x < origin[0] - tol).then_some([x, y])
}

/// Label connected components and return each one's lexically lowest node.
fn components(graph: &Graph) -> (Vec<u32>, Vec<NodeId>) {
    let mut label = vec![UNLABELED; graph.nodes.len()];
    let mut leftmost: Vec<NodeId> = Vec::new();
    let mut stack: Vec<NodeId> = Vec::new();
    for n in graph.live_nodes() {
        if label[n as usize] != UNLABELED {
            continue;
        }
        let comp = leftmost.len() as u32;
        let mut best = n;
        label[n as usize] = comp;
        stack.push(n);
        while let Some(k) = stack.pop() {
            if vert_leq(graph.xy(k), graph.xy(best)) {
                best = k;
            }
            for next in [mate(k), graph.vertex_next(k)] {
                if label[next as usize] == UNLABELED {
                    label[next as usize] = comp;
                    stack.push(next);
                }
            }
        }
        leftmost.push(best);
    }
    (label, leftmost)
}

/// Join every component whose leftmost vertex sees another component to its
/// left.  Returns the number of bridges added.
pub fn bridge_components(graph: &mut Graph, tol: Real) -> Result<usize> {
    let (mut label, leftmost) = components(graph);
    if leftmost.len() < 2 {
        return Ok(0);
    }

    // Rightmost first, so a bridge never crosses a component not yet placed.
    let mut order: Vec<usize> = (0..leftmost.len()).collect();
    order.sort_by(|&a, &b| {
        let (pa, pb) = (graph.xy(leftmost[a]), graph.xy(leftmost[b]));
        pb[0].total_cmp(&pa[0]).then(pb[1].total_cmp(&pa[1]))
    });

    let mut bridges = 0;
    for comp in order {
        let v = leftmost[comp];
        let origin = graph.xy(v);
        let mut best: Option<(Real, NodeId, Point2)> = None;
        for e in graph.live_nodes().filter(|e| e & 1 == 0) {
            if label[e as usize] == comp as u32 || graph.has_mask(e, mask::BRIDGE) {
                continue;
            }
            if let Some(hit) = ray_hit(graph.xy(e), graph.dest_xy(e), origin, tol) {
                let distance = origin[0] - hit[0];
                if best.map_or(true, |(d, _, _)| distance < d) {
                    best = Some((distance, e, hit));
                }
            }
        }
        let (_, e, hit) = match best {
            Some(found) => found,
            None => continue,
        };
        let container = label[e as usize];

        let anchor = if dist_xy(hit, graph.xy(e)) <= tol {
            e
        } else if dist_xy(hit, graph.dest_xy(e)) <= tol {
            mate(e)
        } else {
            let c = graph.split_edge(e, hit)?;
            label.resize(graph.nodes.len(), UNLABELED);
            label[c as usize] = container;
            label[mate(c) as usize] = container;
            c
        };

        let a = graph.make_edge()?;
        let b = mate(a);
        label.resize(graph.nodes.len(), UNLABELED);
        label[a as usize] = container;
        label[b as usize] = container;
        for (n, from) in [(a, v), (b, anchor)] {
            let source = graph.nodes[from as usize].clone();
            let node = &mut graph.nodes[n as usize];
            node.position = source.position;
            node.vertex_id = source.vertex_id;
            node.plane = NULL_PLANE;
            node.mask = mask::BRIDGE;
        }

        let mut at_v: Vec<NodeId> = graph.vertex_loop(v).collect();
        at_v.push(a);
        graph.rebuild_rotation(&at_v);
        let mut at_anchor: Vec<NodeId> = graph.vertex_loop(anchor).collect();
        at_anchor.push(b);
        graph.rebuild_rotation(&at_anchor);

        trace!(from = ?origin, to = ?graph.xy(anchor), "component bridged");
        bridges += 1;
    }
    Ok(bridges)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ray_hits_segment_to_the_left() {
        let hit = ray_hit([0.0, -1.0], [0.0, 1.0], [5.0, 0.0], 1e-9);
        assert_eq!(hit, Some([0.0, 0.0]));
        assert_eq!(ray_hit([9.0, -1.0], [9.0, 1.0], [5.0, 0.0], 1e-9), None);
        assert_eq!(ray_hit([0.0, 1.0], [0.0, 2.0], [5.0, 0.0], 1e-9), None);
    }

    #[test]
    fn horizontal_segment_on_the_ray_is_hit_at_its_right_end() {
        let hit = ray_hit([0.0, 0.0], [2.0, 0.0], [5.0, 0.0], 1e-9);
        assert_eq!(hit, Some([2.0, 0.0]));
    }

    #[test]
    fn single_component_needs_no_bridge() {
        let mut g = Graph::new();
        let a = g.make_edge().unwrap();
        g.nodes[mate(a) as usize].position = [1.0, 0.0, 0.0];
        assert_eq!(bridge_components(&mut g, 1e-9).unwrap(), 0);
    }
}
