// Copyright 2025 Lars Brubaker
// License: SGI Free Software License B (MIT-compatible)
//
// Arrangement graph: a half-edge structure stored in an index arena.
//
// Design:
//   - Nodes are allocated in pairs: nodes[i] and nodes[i ^ 1] are the two
//     directed uses of one undirected edge.  mate(n) = n ^ 1.
//   - face_next walks counter-clockwise around the face on the node's left.
//   - vertex_next walks counter-clockwise around the node's origin vertex.
//   - Every live node satisfies face_next(mate(vertex_next(n))) == n.
//     twist() is the only operation that rewires links and it preserves
//     this relation.
//   - There are no face or vertex records.  A face is named by any node of
//     its loop and a vertex by any node of its rotation, so per-face and
//     per-vertex data (height, plane, masks) live on the nodes themselves.
//   - Deleted pairs carry mask::DELETED and are reused from a free list.

mod delaunay;
mod masks;

pub use masks::{mask, Mask, MaskPool};

use crate::error::{DrapeError, Result};
use crate::geom::{direction_angle, dist_xy, vert_leq, Point2, Point3, Real};
use crate::plane::{PlaneId, NULL_PLANE};

/// Index into Graph::nodes
pub type NodeId = u32;

/// Compute the mate of a node (always the other half of the pair).
#[inline(always)]
pub fn mate(n: NodeId) -> NodeId {
    n ^ 1
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    /// Next node counter-clockwise around the left face.
    pub face_next: NodeId,
    /// Next node counter-clockwise around the origin vertex.
    pub vertex_next: NodeId,
    /// Origin xy and the height of the left face at this corner.
    pub position: Point3,
    pub mask: Mask,
    /// Shared by every node of one vertex rotation once clustered.
    pub vertex_id: u32,
    /// Plane whose interior lies on this node's left, or NULL_PLANE.
    pub plane: PlaneId,
    /// Plane that won the height evaluation at this corner.
    pub height_source: PlaneId,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            face_next: 0,
            vertex_next: 0,
            position: [0.0; 3],
            mask: 0,
            vertex_id: 0,
            plane: NULL_PLANE,
            height_source: NULL_PLANE,
        }
    }
}

/// The arrangement graph.
#[derive(Clone, Debug)]
pub struct Graph {
    pub nodes: Vec<Node>,
    free: Vec<NodeId>,
    masks: MaskPool,
    next_vertex_id: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum WalkKind {
    Face,
    Vertex,
}

/// Iterator over a face loop or a vertex rotation.
///
/// Panics if the loop does not close within the arena size, which only
/// happens on a corrupted graph.
#[derive(Clone)]
pub struct Walk<'a> {
    graph: &'a Graph,
    start: NodeId,
    next: Option<NodeId>,
    steps: usize,
    kind: WalkKind,
}

impl<'a> Iterator for Walk<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.steps += 1;
        assert!(
            self.steps <= self.graph.nodes.len(),
            "{:?} loop from node {} does not close",
            self.kind,
            self.start
        );
        let succ = match self.kind {
            WalkKind::Face => self.graph.face_next(current),
            WalkKind::Vertex => self.graph.vertex_next(current),
        };
        self.next = if succ == self.start { None } else { Some(succ) };
        Some(current)
    }
}

impl Graph {
    pub fn new() -> Self {
        Graph {
            nodes: Vec::new(),
            free: Vec::new(),
            masks: MaskPool::new(),
            next_vertex_id: 1,
        }
    }

    // ──────────────────────────── Navigation ────────────────────────────────

    #[inline]
    pub fn face_next(&self, n: NodeId) -> NodeId {
        self.nodes[n as usize].face_next
    }

    #[inline]
    pub fn vertex_next(&self, n: NodeId) -> NodeId {
        self.nodes[n as usize].vertex_next
    }

    /// Node before n in its vertex rotation: face_next(mate(n)).
    #[inline]
    pub fn vertex_prev(&self, n: NodeId) -> NodeId {
        self.nodes[mate(n) as usize].face_next
    }

    /// Node before n in its face loop: mate(vertex_next(n)).
    #[inline]
    pub fn face_prev(&self, n: NodeId) -> NodeId {
        mate(self.nodes[n as usize].vertex_next)
    }

    pub fn face_loop(&self, start: NodeId) -> Walk<'_> {
        Walk {
            graph: self,
            start,
            next: Some(start),
            steps: 0,
            kind: WalkKind::Face,
        }
    }

    pub fn vertex_loop(&self, start: NodeId) -> Walk<'_> {
        Walk {
            graph: self,
            start,
            next: Some(start),
            steps: 0,
            kind: WalkKind::Vertex,
        }
    }

    pub fn face_len(&self, start: NodeId) -> usize {
        self.face_loop(start).count()
    }

    pub fn vertex_degree(&self, start: NodeId) -> usize {
        self.vertex_loop(start).count()
    }

    /// A face of exactly two nodes: the zero-area face between two
    /// coincident edges.
    #[inline]
    pub fn is_null_face(&self, n: NodeId) -> bool {
        let next = self.face_next(n);
        next != n && self.face_next(next) == n
    }

    // ──────────────────────────── Attributes ────────────────────────────────

    #[inline]
    pub fn is_live(&self, n: NodeId) -> bool {
        (n as usize) < self.nodes.len() && self.nodes[n as usize].mask & mask::DELETED == 0
    }

    /// Ids of every live node, in arena order.
    pub fn live_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len() as NodeId).filter(move |&n| self.is_live(n))
    }

    pub fn live_count(&self) -> usize {
        self.nodes.len() - 2 * self.free.len()
    }

    #[inline]
    pub fn position(&self, n: NodeId) -> Point3 {
        self.nodes[n as usize].position
    }

    #[inline]
    pub fn xy(&self, n: NodeId) -> Point2 {
        let p = self.nodes[n as usize].position;
        [p[0], p[1]]
    }

    /// xy of the far end of n's edge.
    #[inline]
    pub fn dest_xy(&self, n: NodeId) -> Point2 {
        self.xy(mate(n))
    }

    #[inline]
    pub fn z(&self, n: NodeId) -> Real {
        self.nodes[n as usize].position[2]
    }

    #[inline]
    pub fn set_z(&mut self, n: NodeId, z: Real) {
        self.nodes[n as usize].position[2] = z;
    }

    #[inline]
    pub fn set_xy(&mut self, n: NodeId, at: Point2) {
        let p = &mut self.nodes[n as usize].position;
        p[0] = at[0];
        p[1] = at[1];
    }

    #[inline]
    pub fn plane(&self, n: NodeId) -> PlaneId {
        self.nodes[n as usize].plane
    }

    #[inline]
    pub fn set_plane(&mut self, n: NodeId, plane: PlaneId) {
        self.nodes[n as usize].plane = plane;
    }

    #[inline]
    pub fn vertex_id(&self, n: NodeId) -> u32 {
        self.nodes[n as usize].vertex_id
    }

    #[inline]
    pub fn set_vertex_id(&mut self, n: NodeId, id: u32) {
        self.nodes[n as usize].vertex_id = id;
    }

    /// Hand out a vertex id not used by any rotation yet.
    pub fn allocate_vertex_id(&mut self) -> u32 {
        let id = self.next_vertex_id;
        self.next_vertex_id += 1;
        id
    }

    #[inline]
    pub fn has_mask(&self, n: NodeId, bits: Mask) -> bool {
        self.nodes[n as usize].mask & bits != 0
    }

    #[inline]
    pub fn set_mask(&mut self, n: NodeId, bits: Mask) {
        self.nodes[n as usize].mask |= bits;
    }

    #[inline]
    pub fn clear_mask(&mut self, n: NodeId, bits: Mask) {
        self.nodes[n as usize].mask &= !bits;
    }

    /// Set bits on both nodes of n's edge.
    pub fn set_edge_mask(&mut self, n: NodeId, bits: Mask) {
        self.set_mask(n, bits);
        self.set_mask(mate(n), bits);
    }

    pub fn set_mask_around_face(&mut self, start: NodeId, bits: Mask) {
        let ring: Vec<NodeId> = self.face_loop(start).collect();
        for n in ring {
            self.set_mask(n, bits);
        }
    }

    pub fn clear_mask_around_face(&mut self, start: NodeId, bits: Mask) {
        let ring: Vec<NodeId> = self.face_loop(start).collect();
        for n in ring {
            self.clear_mask(n, bits);
        }
    }

    pub fn set_mask_around_vertex(&mut self, start: NodeId, bits: Mask) {
        let ring: Vec<NodeId> = self.vertex_loop(start).collect();
        for n in ring {
            self.set_mask(n, bits);
        }
    }

    /// Clear bits on every node, live or not.
    pub fn clear_mask_everywhere(&mut self, bits: Mask) {
        for node in &mut self.nodes {
            node.mask &= !bits;
        }
    }

    pub fn any_mask_in_face(&self, start: NodeId, bits: Mask) -> bool {
        self.face_loop(start).any(|n| self.has_mask(n, bits))
    }

    /// Run `f` with a scratch bit that is clear on every node, then clear it
    /// again and return it to the pool.
    pub fn with_scratch_mask<R>(&mut self, f: impl FnOnce(&mut Self, Mask) -> Result<R>) -> Result<R> {
        let bit = self.masks.acquire().ok_or(DrapeError::MaskPoolExhausted)?;
        let out = f(self, bit);
        self.clear_mask_everywhere(bit);
        self.masks.release(bit);
        out
    }

    // ──────────────────────────── Geometry ──────────────────────────────────

    /// Signed xy area of the face containing `start` (counter-clockwise
    /// positive).  Two-node faces report exactly zero.
    pub fn signed_area(&self, start: NodeId) -> Real {
        if self.is_null_face(start) {
            return 0.0;
        }
        let mut area = 0.0;
        for n in self.face_loop(start) {
            let p = self.xy(n);
            let q = self.dest_xy(n);
            area -= (q[0] - p[0]) * (p[1] + q[1]);
        }
        area * 0.5
    }

    /// Axis-aligned xy bounds of all live nodes, or None for an empty graph.
    pub fn bounds(&self) -> Option<(Point2, Point2)> {
        let mut nodes = self.live_nodes();
        let first = self.xy(nodes.next()?);
        let mut lo = first;
        let mut hi = first;
        for n in nodes {
            let p = self.xy(n);
            lo = [lo[0].min(p[0]), lo[1].min(p[1])];
            hi = [hi[0].max(p[0]), hi[1].max(p[1])];
        }
        Some((lo, hi))
    }

    pub fn bounds_area(&self) -> Real {
        match self.bounds() {
            Some((lo, hi)) => (hi[0] - lo[0]) * (hi[1] - lo[1]),
            None => 0.0,
        }
    }

    /// Largest absolute xy coordinate of any live node.
    pub fn max_abs_xy(&self) -> Real {
        self.live_nodes()
            .map(|n| {
                let p = self.xy(n);
                p[0].abs().max(p[1].abs())
            })
            .fold(0.0, Real::max)
    }

    #[inline]
    pub fn edge_length(&self, n: NodeId) -> Real {
        dist_xy(self.xy(n), self.dest_xy(n))
    }

    // ──────────────────────── Private allocation helpers ────────────────────

    /// Allocate a node pair, reusing the free list first.
    fn alloc_pair(&mut self) -> Result<NodeId> {
        if let Some(a) = self.free.pop() {
            self.nodes[a as usize] = Node::default();
            self.nodes[(a ^ 1) as usize] = Node::default();
            return Ok(a);
        }
        self.nodes
            .try_reserve(2)
            .map_err(|_| DrapeError::OutOfMemory { what: "graph nodes" })?;
        let a = self.nodes.len() as NodeId;
        self.nodes.push(Node::default());
        self.nodes.push(Node::default());
        Ok(a)
    }

    // ──────────────────────── Public graph operations ───────────────────────

    /// Create an isolated edge: two nodes, each alone in its rotation, forming
    /// one two-node face.  Returns the even node.
    pub fn make_edge(&mut self) -> Result<NodeId> {
        let a = self.alloc_pair()?;
        let b = a ^ 1;
        self.nodes[a as usize].face_next = b;
        self.nodes[a as usize].vertex_next = a;
        self.nodes[b as usize].face_next = a;
        self.nodes[b as usize].vertex_next = b;
        Ok(a)
    }

    /// The fundamental connectivity-changing operation: exchanges
    /// vertex_next(a) and vertex_next(b) and repairs face_next to match.
    ///
    /// If a and b are in different rotations the rotations are joined with b
    /// right after a; if they are in the same rotation it is split.
    pub fn twist(&mut self, a: NodeId, b: NodeId) {
        if a == b {
            return;
        }
        let a_next = self.nodes[a as usize].vertex_next;
        let b_next = self.nodes[b as usize].vertex_next;
        self.nodes[(a_next ^ 1) as usize].face_next = b;
        self.nodes[(b_next ^ 1) as usize].face_next = a;
        self.nodes[a as usize].vertex_next = b_next;
        self.nodes[b as usize].vertex_next = a_next;
    }

    /// Remove n from its vertex rotation, leaving it alone in its own.
    pub fn detach(&mut self, n: NodeId) {
        if self.vertex_next(n) != n {
            let prev = self.vertex_prev(n);
            self.twist(prev, n);
        }
    }

    /// Insert a new vertex into n's edge at `at`.
    ///
    /// Afterwards n runs from its old origin to the new vertex and the
    /// returned node runs from the new vertex to n's old destination on the
    /// same side.  Per-side attributes are copied to the new pieces and the
    /// heights at the new vertex are interpolated along each side.
    pub fn split_edge(&mut self, n: NodeId, at: Point2) -> Result<NodeId> {
        let b = mate(n);
        let a_xy = self.xy(n);
        let b_xy = self.xy(b);
        let len = dist_xy(a_xy, b_xy);
        let t = if len > 0.0 { dist_xy(a_xy, at) / len } else { 0.0 };
        let z_near = crate::geom::lerp(self.z(n), self.z(self.face_next(n)), t);
        let z_far = crate::geom::lerp(self.z(self.face_next(b)), self.z(b), t);

        let c = self.make_edge()?;
        let d = c ^ 1;

        // d takes b's place at the old destination; b and c meet at `at`.
        self.twist(b, d);
        let before_b = self.vertex_prev(b);
        self.twist(before_b, b);
        self.twist(b, c);

        let vid = if self.nodes[b as usize].vertex_id != 0 {
            self.allocate_vertex_id()
        } else {
            0
        };

        let near = self.nodes[n as usize].clone();
        let far = self.nodes[b as usize].clone();

        let d_node = &mut self.nodes[d as usize];
        d_node.position = far.position;
        d_node.mask = far.mask & mask::PERSISTENT;
        d_node.vertex_id = far.vertex_id;
        d_node.plane = far.plane;
        d_node.height_source = far.height_source;

        let c_node = &mut self.nodes[c as usize];
        c_node.position = [at[0], at[1], z_near];
        c_node.mask = near.mask & mask::PERSISTENT;
        c_node.vertex_id = vid;
        c_node.plane = near.plane;
        c_node.height_source = near.height_source;

        let b_node = &mut self.nodes[b as usize];
        b_node.position = [at[0], at[1], z_far];
        b_node.vertex_id = vid;

        Ok(c)
    }

    /// Remove n's edge from the graph and put the pair on the free list.
    pub fn delete_edge(&mut self, n: NodeId) {
        let m = mate(n);
        self.detach(n);
        self.detach(m);
        self.nodes[n as usize].mask = mask::DELETED;
        self.nodes[m as usize].mask = mask::DELETED;
        self.free.push(n & !1);
    }

    /// Add an edge splitting the face shared by `from` and `to`.
    ///
    /// The returned node starts at from's vertex and has `to` as its
    /// face_next; its mate starts at to's vertex and has `from` as its
    /// face_next.  So the returned node's face holds to .. face_prev(from)
    /// and the mate's face holds from .. face_prev(to).
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<NodeId> {
        debug_assert!(self.face_loop(from).any(|n| n == to), "connect across faces");
        let a = self.make_edge()?;
        let b = a ^ 1;
        self.twist(from, a);
        self.twist(to, b);

        let from_node = self.nodes[from as usize].clone();
        let to_node = self.nodes[to as usize].clone();
        let a_node = &mut self.nodes[a as usize];
        a_node.position = from_node.position;
        a_node.vertex_id = from_node.vertex_id;
        let b_node = &mut self.nodes[b as usize];
        b_node.position = to_node.position;
        b_node.vertex_id = to_node.vertex_id;
        Ok(a)
    }

    /// Rebuild one vertex rotation from `members` in counter-clockwise order
    /// of edge direction.
    ///
    /// Coincident edges are ordered by edge id, ascending when the edge runs
    /// lexically upward from this vertex and descending otherwise, so the two
    /// ends of a bundle agree and every pair of neighbours bounds a two-node
    /// face.
    pub fn rebuild_rotation(&mut self, members: &[NodeId]) {
        if members.len() < 2 {
            if let Some(&only) = members.first() {
                self.detach(only);
            }
            return;
        }
        for &n in members {
            self.detach(n);
        }
        let mut keyed: Vec<(Real, i64, NodeId)> = members
            .iter()
            .map(|&n| {
                let from = self.xy(n);
                let to = self.dest_xy(n);
                let edge = (n & !1) as i64;
                let tie = if vert_leq(from, to) { edge } else { -edge };
                (direction_angle(from, to), tie, n)
            })
            .collect();
        keyed.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        for pair in keyed.windows(2) {
            self.twist(pair[0].2, pair[1].2);
        }
    }

    /// One node per distinct face loop.
    pub fn face_seeds(&mut self) -> Result<Vec<NodeId>> {
        self.with_scratch_mask(|g, seen| {
            let mut seeds = Vec::new();
            for n in 0..g.nodes.len() as NodeId {
                if !g.is_live(n) || g.has_mask(n, seen) {
                    continue;
                }
                seeds.push(n);
                g.set_mask_around_face(n, seen);
            }
            Ok(seeds)
        })
    }

    /// One node per distinct vertex rotation.
    pub fn vertex_seeds(&mut self) -> Result<Vec<NodeId>> {
        self.with_scratch_mask(|g, seen| {
            let mut seeds = Vec::new();
            for n in 0..g.nodes.len() as NodeId {
                if !g.is_live(n) || g.has_mask(n, seen) {
                    continue;
                }
                seeds.push(n);
                g.set_mask_around_vertex(n, seen);
            }
            Ok(seeds)
        })
    }

    /// Check mate symmetry and loop closure for every live node.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let limit = self.nodes.len();
        for n in self.live_nodes() {
            let m = mate(n);
            if !self.is_live(m) {
                return Err(format!("node {} is live but its mate {} is not", n, m));
            }
            let next = self.vertex_next(n);
            if !self.is_live(next) || !self.is_live(self.face_next(n)) {
                return Err(format!("node {} links to a dead node", n));
            }
            if self.face_next(mate(next)) != n {
                return Err(format!("node {}: face_next(mate(vertex_next)) != node", n));
            }
            for (kind, step) in [("face", 0), ("vertex", 1)] {
                let mut cur = n;
                let mut steps = 0;
                loop {
                    cur = if step == 0 { self.face_next(cur) } else { self.vertex_next(cur) };
                    steps += 1;
                    if cur == n {
                        break;
                    }
                    if steps > limit {
                        return Err(format!("{} loop from node {} does not close", kind, n));
                    }
                }
            }
        }
        Ok(())
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}
