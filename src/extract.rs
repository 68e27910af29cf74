// Copyright 2025 Lars Brubaker
// License: SGI Free Software License B (MIT-compatible)
//
// Mesh extraction: read the flooded graph out as an indexed polygon mesh.
//
// Output layout:
//   - vertices: one entry per distinct (vertex id, height) pair
//   - indices: 1-based vertex indices, each facet terminated by a 0
//   - classes: optionally one FacetClass per index entry (separators
//     included), so classes[i] describes the facet that indices[i] belongs to
//
// Facets come out in this order: top facets, side panels, base weld.

mod weld;

pub use weld::emit_base_weld;

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::annotate::walk_bundle;
use crate::config::DrapeConfig;
use crate::error::Result;
use crate::geom::{dot3, upward_normal, Point3, Real};
use crate::graph::{mask, Graph, NodeId};

/// What a facet is, for rendering and debugging.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FacetClass {
    /// Top facet whose corners agree on one normal.
    Planar,
    /// Top facet spanning more than one plane.
    Warped,
    /// Bounded exterior face, emitted only on request.
    Exterior,
    /// Vertical wall at a height discontinuity.
    SidePanel,
    /// Downward-facing closure at the base elevation.
    Base,
}

/// Indexed output of one drape.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DrapeMesh {
    pub vertices: Vec<Point3>,
    pub indices: Vec<u32>,
    pub classes: Option<Vec<FacetClass>>,
    pub silhouettes: Option<Vec<Vec<Point3>>>,
}

impl DrapeMesh {
    /// Each facet's 1-based vertex indices, without the separator.
    pub fn facets(&self) -> impl Iterator<Item = &[u32]> {
        self.indices.split(|&i| i == 0).filter(|f| !f.is_empty())
    }

    pub fn facet_count(&self) -> usize {
        self.indices.iter().filter(|&&i| i == 0).count()
    }

    /// Vertex at a 1-based index.
    pub fn vertex(&self, index: u32) -> Option<Point3> {
        let i = (index as usize).checked_sub(1)?;
        self.vertices.get(i).copied()
    }

    /// Facets paired with their class, when classes were recorded.
    pub fn classified_facets(&self) -> Option<Vec<(FacetClass, &[u32])>> {
        let classes = self.classes.as_ref()?;
        let mut out = Vec::new();
        let mut start = 0;
        for (i, &index) in self.indices.iter().enumerate() {
            if index == 0 {
                out.push((classes[i], &self.indices[start..i]));
                start = i + 1;
            }
        }
        Some(out)
    }

    /// Facets of one class, as vertex positions.
    pub fn facets_of(&self, class: FacetClass) -> Vec<Vec<Point3>> {
        self.classified_facets()
            .unwrap_or_default()
            .into_iter()
            .filter(|(c, _)| *c == class)
            .map(|(_, facet)| facet.iter().filter_map(|&i| self.vertex(i)).collect())
            .collect()
    }
}

/// Facet counts by class.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtractReport {
    pub planar: usize,
    pub warped: usize,
    pub exterior: usize,
    pub side_panels: usize,
    pub base: usize,
    pub silhouettes: usize,
}

impl ExtractReport {
    fn record(&mut self, class: FacetClass) {
        let slot = match class {
            FacetClass::Planar => &mut self.planar,
            FacetClass::Warped => &mut self.warped,
            FacetClass::Exterior => &mut self.exterior,
            FacetClass::SidePanel => &mut self.side_panels,
            FacetClass::Base => &mut self.base,
        };
        *slot += 1;
    }

    pub fn facets(&self) -> usize {
        self.planar + self.warped + self.exterior + self.side_panels + self.base
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
enum VertexKey {
    Id(u32, u64),
    Free([u64; 3]),
}

impl VertexKey {
    fn new(vertex_id: u32, p: Point3) -> Self {
        // +0.0 folds -0.0 into 0.0
        let bits = |v: Real| (v + 0.0).to_bits();
        if vertex_id != 0 {
            VertexKey::Id(vertex_id, bits(p[2]))
        } else {
            VertexKey::Free([bits(p[0]), bits(p[1]), bits(p[2])])
        }
    }
}

/// Accumulates facets, sharing output vertices by (vertex id, height).
#[derive(Debug)]
pub struct MeshBuilder {
    lookup: FxHashMap<VertexKey, u32>,
    mesh: DrapeMesh,
    report: ExtractReport,
}

impl MeshBuilder {
    pub fn new(with_classes: bool) -> Self {
        MeshBuilder {
            lookup: FxHashMap::default(),
            mesh: DrapeMesh {
                classes: with_classes.then(Vec::new),
                ..DrapeMesh::default()
            },
            report: ExtractReport::default(),
        }
    }

    /// 1-based index of the output vertex for this corner.
    pub fn vertex(&mut self, vertex_id: u32, p: Point3) -> u32 {
        let vertices = &mut self.mesh.vertices;
        *self.lookup.entry(VertexKey::new(vertex_id, p)).or_insert_with(|| {
            vertices.push(p);
            vertices.len() as u32
        })
    }

    /// Append one facet.  Repeated consecutive corners are dropped; a facet
    /// left with fewer than three corners is not emitted.
    pub fn facet(&mut self, corners: impl IntoIterator<Item = (u32, Point3)>, class: FacetClass) -> bool {
        let mut ring: Vec<u32> = Vec::new();
        for (id, p) in corners {
            let index = self.vertex(id, p);
            if ring.last() != Some(&index) {
                ring.push(index);
            }
        }
        while ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }
        if ring.len() < 3 {
            return false;
        }
        let count = ring.len() + 1;
        self.mesh.indices.extend(ring);
        self.mesh.indices.push(0);
        if let Some(classes) = self.mesh.classes.as_mut() {
            classes.extend(std::iter::repeat(class).take(count));
        }
        self.report.record(class);
        true
    }

    pub fn finish(self) -> (DrapeMesh, ExtractReport) {
        (self.mesh, self.report)
    }
}

fn corner(graph: &Graph, n: NodeId) -> (u32, Point3) {
    (graph.vertex_id(n), graph.position(n))
}

/// Planar when every non-degenerate corner normal matches the first.
fn classify_top(graph: &Graph, face: NodeId, config: &DrapeConfig) -> FacetClass {
    let mut normals = graph.face_loop(face).filter_map(|n| {
        upward_normal(
            graph.position(graph.face_prev(n)),
            graph.position(n),
            graph.position(graph.face_next(n)),
        )
    });
    let first = match normals.next() {
        Some(n) => n,
        None => return FacetClass::Planar,
    };
    if normals.all(|n| 1.0 - dot3(first, n) <= config.normal_parallel_tol) {
        FacetClass::Planar
    } else {
        FacetClass::Warped
    }
}

/// Emit every visible face with positive area as a top facet.
pub fn emit_top_facets(graph: &mut Graph, config: &DrapeConfig, builder: &mut MeshBuilder) -> Result<()> {
    for face in graph.face_seeds()? {
        if graph.is_null_face(face) || graph.face_len(face) < 3 || graph.signed_area(face) <= 0.0 {
            continue;
        }
        if config.skip_mask != 0 && graph.any_mask_in_face(face, config.skip_mask) {
            continue;
        }
        let class = if graph.has_mask(face, mask::EXTERIOR) {
            if !config.exterior_facets {
                continue;
            }
            FacetClass::Exterior
        } else {
            classify_top(graph, face, config)
        };
        builder.facet(graph.face_loop(face).map(|n| corner(graph, n)), class);
    }
    Ok(())
}

/// Corners up one vertical line at `at`'s vertex, from `from` to `to`,
/// with every height strictly between them found on the vertex's other
/// real faces.
fn push_column(graph: &Graph, at: NodeId, from: Real, to: Real, out: &mut Vec<(u32, Point3)>) {
    let id = graph.vertex_id(at);
    let [x, y] = graph.xy(at);
    let (lo, hi) = if from < to { (from, to) } else { (to, from) };
    let mut between: Vec<Real> = graph
        .vertex_loop(at)
        .filter(|&k| !graph.is_null_face(k))
        .map(|k| graph.z(k))
        .filter(|&z| lo < z && z < hi)
        .collect();
    between.sort_by(|a, b| a.total_cmp(b));
    between.dedup();
    if from > to {
        between.reverse();
    }
    out.push((id, [x, y, from]));
    out.extend(between.into_iter().map(|z| (id, [x, y, z])));
    out.push((id, [x, y, to]));
}

/// Emit a vertical panel under every bundle whose two sides disagree in
/// height.  Panels face the lower side.
pub fn emit_side_panels(graph: &mut Graph, builder: &mut MeshBuilder) -> Result<()> {
    graph.with_scratch_mask(|g, seen| {
        for n in 0..g.nodes.len() as NodeId {
            if !g.is_live(n) || g.has_mask(n, seen) || g.is_null_face(n) {
                continue;
            }
            let bundle = walk_bundle(g, n);
            for &e in &bundle.edges {
                g.set_edge_mask(e, seen);
            }
            let near = bundle.near();
            let far = bundle.far();
            let u_near = g.z(near);
            let v_near = g.z(g.face_next(near));
            let v_far = g.z(far);
            let u_far = g.z(g.face_next(far));
            if u_near == u_far && v_near == v_far {
                continue;
            }
            let mut corners = Vec::new();
            push_column(g, near, u_near, u_far, &mut corners);
            push_column(g, far, v_far, v_near, &mut corners);
            builder.facet(corners, FacetClass::SidePanel);
        }
        Ok(())
    })
}

/// e borders an exterior face on its left and a visible face across.
fn is_silhouette(graph: &Graph, e: NodeId) -> bool {
    if graph.is_null_face(e) || !graph.has_mask(e, mask::EXTERIOR) {
        return false;
    }
    let far = walk_bundle(graph, e).far();
    !graph.is_null_face(far) && !graph.has_mask(far, mask::EXTERIOR)
}

/// The silhouette edge following e around the exterior region.
fn next_silhouette(graph: &Graph, e: NodeId, budget: usize) -> Option<NodeId> {
    let mut c = graph.face_next(e);
    for _ in 0..budget {
        if is_silhouette(graph, c) {
            return Some(c);
        }
        c = graph.face_next(walk_bundle(graph, c).far());
    }
    None
}

/// Closed polylines along the border between exterior and visible faces,
/// at the visible side's heights.
pub fn collect_silhouettes(graph: &mut Graph, budget: usize) -> Result<Vec<Vec<Point3>>> {
    graph.with_scratch_mask(|g, seen| {
        let mut loops = Vec::new();
        for start in 0..g.nodes.len() as NodeId {
            if !g.is_live(start) || g.has_mask(start, seen) || !is_silhouette(g, start) {
                continue;
            }
            let mut points: Vec<Point3> = Vec::new();
            let mut push = |p: Point3| {
                if points.last() != Some(&p) {
                    points.push(p);
                }
            };
            let mut e = start;
            let mut steps = 0;
            loop {
                g.set_mask(e, seen);
                let far = walk_bundle(g, e).far();
                let [ux, uy] = g.xy(e);
                let [vx, vy] = g.dest_xy(e);
                push([ux, uy, g.z(g.face_next(far))]);
                push([vx, vy, g.z(far)]);
                steps += 1;
                if steps > budget {
                    warn!(budget, "silhouette walk budget exhausted");
                    break;
                }
                match next_silhouette(g, e, budget) {
                    Some(next) if next != start && !g.has_mask(next, seen) => e = next,
                    _ => break,
                }
            }
            while points.len() > 1 && points.first() == points.last() {
                points.pop();
            }
            if points.len() >= 2 {
                loops.push(points);
            }
        }
        Ok(loops)
    })
}

/// Emit the whole mesh: top facets, side panels, silhouettes and, when
/// configured, the base weld.  The weld rewrites the graph, so it runs last.
pub fn extract_mesh(graph: &mut Graph, config: &DrapeConfig) -> Result<(DrapeMesh, ExtractReport)> {
    let mut builder = MeshBuilder::new(config.facet_classes);
    emit_top_facets(graph, config, &mut builder)?;
    emit_side_panels(graph, &mut builder)?;
    let silhouettes = if config.silhouettes {
        Some(collect_silhouettes(graph, config.budget(graph.live_count()))?)
    } else {
        None
    };
    if config.weld {
        emit_base_weld(graph, config, &mut builder)?;
    }
    let (mut mesh, mut report) = builder.finish();
    report.silhouettes = silhouettes.as_ref().map_or(0, Vec::len);
    mesh.silhouettes = silhouettes;
    debug!(
        vertices = mesh.vertices.len(),
        facets = report.facets(),
        side_panels = report.side_panels,
        base = report.base,
        "mesh extracted"
    );
    Ok((mesh, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_shares_vertices_by_id_and_height() {
        let mut b = MeshBuilder::new(true);
        let a = b.vertex(7, [1.0, 2.0, 3.0]);
        assert_eq!(a, 1);
        assert_eq!(b.vertex(7, [1.0, 2.0, 3.0]), 1);
        assert_eq!(b.vertex(7, [1.0, 2.0, 4.0]), 2);
        assert_eq!(b.vertex(0, [1.0, 2.0, 3.0]), 3);
        assert_eq!(b.vertex(0, [1.0, 2.0, 3.0]), 3);
        assert_eq!(b.vertex(8, [5.0, 5.0, -0.0]), b.vertex(8, [5.0, 5.0, 0.0]));
    }

    #[test]
    fn facets_are_terminated_and_classified() {
        let mut b = MeshBuilder::new(true);
        let tri = [(1, [0.0, 0.0, 0.0]), (2, [1.0, 0.0, 0.0]), (3, [0.0, 1.0, 0.0])];
        assert!(b.facet(tri, FacetClass::Planar));
        assert!(b.facet(tri.iter().rev().copied(), FacetClass::Base));
        let (mesh, report) = b.finish();
        assert_eq!(mesh.indices, vec![1, 2, 3, 0, 3, 2, 1, 0]);
        assert_eq!(mesh.facet_count(), 2);
        let classes = mesh.classes.as_ref().unwrap();
        assert_eq!(classes.len(), mesh.indices.len());
        assert_eq!(classes[3], FacetClass::Planar);
        assert_eq!(classes[4], FacetClass::Base);
        assert_eq!((report.planar, report.base), (1, 1));
        assert_eq!(mesh.facets_of(FacetClass::Base).len(), 1);
        assert_eq!(mesh.vertex(0), None);
        assert_eq!(mesh.vertex(2), Some([1.0, 0.0, 0.0]));
    }

    #[test]
    fn degenerate_facets_are_dropped() {
        let mut b = MeshBuilder::new(false);
        let p = [0.0, 0.0, 0.0];
        let q = [1.0, 0.0, 0.0];
        assert!(!b.facet([(1, p), (1, p), (2, q), (1, p)], FacetClass::SidePanel));
        let (mesh, report) = b.finish();
        assert!(mesh.indices.is_empty());
        assert!(mesh.classes.is_none());
        assert_eq!(report.facets(), 0);
    }

    #[test]
    fn facet_iterator_skips_separators() {
        let mesh = DrapeMesh {
            indices: vec![1, 2, 3, 0, 2, 3, 4, 5, 0],
            ..DrapeMesh::default()
        };
        let facets: Vec<&[u32]> = mesh.facets().collect();
        assert_eq!(facets, vec![&[1u32, 2, 3][..], &[2u32, 3, 4, 5][..]]);
        assert!(mesh.classified_facets().is_none());
    }
}
