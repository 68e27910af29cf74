// Copyright 2025 Lars Brubaker
// Delaunay refinement methods for Graph.

use tracing::warn;

use super::{mate, Graph, Mask, NodeId};
use crate::error::Result;
use crate::geom::{in_circle, orient};

impl Graph {
    /// True if n's edge separates two triangles that both carry `region`
    /// and is not a constrained (WELD) edge.
    pub fn edge_is_internal(&self, n: NodeId, region: Mask) -> bool {
        let m = mate(n);
        self.has_mask(n, region)
            && self.has_mask(m, region)
            && !self.has_mask(n, super::mask::WELD)
            && self.face_len(n) == 3
            && self.face_len(m) == 3
    }

    /// Check if an edge is locally Delaunay.
    pub fn edge_is_locally_delaunay(&self, e: NodeId) -> bool {
        let e_mate = mate(e);
        let v = self.xy(self.face_next(self.face_next(e_mate)));
        let v0 = self.xy(self.face_next(e));
        let v1 = self.xy(self.face_next(self.face_next(e)));
        let v2 = self.xy(e);

        let scale = [v0, v1, v2]
            .iter()
            .map(|p| (p[0] - v[0]).abs().max((p[1] - v[1]).abs()))
            .fold(0.0, f64::max);
        in_circle(v, v0, v1, v2) <= 1.0e-12 * scale.powi(4)
    }

    /// Replace the diagonal of the quadrilateral formed by e's two triangles
    /// with the other diagonal, which inherits e's mask bits.  Returns the
    /// new diagonal, or None when the quadrilateral is not strictly convex.
    pub fn flip_edge(&mut self, e: NodeId) -> Result<Option<NodeId>> {
        let e_mate = mate(e);
        let a = self.xy(e);
        let b = self.xy(e_mate);
        let left_apex = self.face_next(self.face_next(e));
        let right_apex = self.face_next(self.face_next(e_mate));
        let c = self.xy(left_apex);
        let d = self.xy(right_apex);
        let side_a = orient(c, d, a);
        let side_b = orient(c, d, b);
        if !((side_a > 0.0 && side_b < 0.0) || (side_a < 0.0 && side_b > 0.0)) {
            return Ok(None);
        }
        let carried = self.nodes[e as usize].mask;
        self.delete_edge(e);
        let flipped = self.connect(left_apex, right_apex)?;
        self.set_mask(flipped, carried);
        self.set_mask(mate(flipped), carried);
        Ok(Some(flipped))
    }

    /// Refine a triangulation of the faces carrying `region` towards a
    /// constrained Delaunay triangulation.  WELD edges are never flipped.
    /// Returns the number of flips.
    pub fn refine_delaunay(&mut self, region: Mask, budget: usize) -> Result<usize> {
        self.with_scratch_mask(|g, queued| {
            let mut stack: Vec<NodeId> = Vec::new();

            // Mark all internal edges and push them
            for e in 0..g.nodes.len() as NodeId {
                if g.is_live(e) && !g.has_mask(e, queued) && g.edge_is_internal(e, region) {
                    g.set_edge_mask(e, queued);
                    stack.push(e);
                }
            }

            let max_iter = (stack.len() * stack.len() + 1).min(budget.max(stack.len() + 1));
            let mut iter = 0;
            let mut flips = 0;

            while let Some(e) = stack.pop() {
                if iter >= max_iter {
                    warn!(max_iter, pending = stack.len() + 1, "delaunay refinement budget exhausted");
                    break;
                }
                iter += 1;
                if !g.is_live(e) {
                    continue;
                }
                g.clear_mask(e, queued);
                g.clear_mask(mate(e), queued);

                if !g.edge_is_internal(e, region) || g.edge_is_locally_delaunay(e) {
                    continue;
                }
                let neighbors = [
                    g.face_next(e),
                    g.face_prev(e),
                    g.face_next(mate(e)),
                    g.face_prev(mate(e)),
                ];
                if g.flip_edge(e)?.is_none() {
                    continue;
                }
                flips += 1;
                for &nb in &neighbors {
                    if !g.has_mask(nb, queued) && g.edge_is_internal(nb, region) {
                        g.set_edge_mask(nb, queued);
                        stack.push(nb);
                    }
                }
            }
            Ok(flips)
        })
    }
}
