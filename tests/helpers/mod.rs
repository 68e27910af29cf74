// Copyright 2025 Lars Brubaker
// Shared test utilities for drape-arrangement tests.

#![allow(dead_code)]

use std::collections::HashMap;

use drape_arrangement::graph::{mate, NodeId};
use drape_arrangement::{DrapeMesh, FacetClass, Graph, InputPolygon};

/// Axis-aligned horizontal rectangle, counter-clockwise.
pub fn rect(x0: f64, y0: f64, x1: f64, y1: f64, z: f64) -> Vec<[f64; 3]> {
    vec![[x0, y0, z], [x1, y0, z], [x1, y1, z], [x0, y1, z]]
}

pub fn polygon(points: Vec<[f64; 3]>, tag: i32) -> InputPolygon {
    InputPolygon::new(points, tag)
}

/// Parse the `.dat` polygon format: one point per line as `x y z` or
/// `x, y, z`, blank lines between polygons, `tag N` setting the tag of the
/// polygon being read and `#` starting a comment line.
pub fn parse_polygons(data: &str) -> Vec<InputPolygon> {
    let mut polygons = Vec::new();
    let mut current: Vec<[f64; 3]> = Vec::new();
    let mut tag = 0;
    let mut flush = |current: &mut Vec<[f64; 3]>, tag: i32| {
        if !current.is_empty() {
            polygons.push(InputPolygon::new(std::mem::take(current), tag));
        }
    };
    for line in data.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('#') {
            continue;
        }
        if trimmed.is_empty() {
            flush(&mut current, tag);
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("tag") {
            tag = rest.trim().parse().unwrap_or(0);
            continue;
        }
        let coords: Vec<f64> = trimmed
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse::<f64>().ok())
            .collect();
        if coords.len() == 3 {
            current.push([coords[0], coords[1], coords[2]]);
        }
    }
    flush(&mut current, tag);
    polygons
}

/// Signed xy area of a facet given as positions.
pub fn facet_area_xy(points: &[[f64; 3]]) -> f64 {
    let mut area = 0.0;
    for i in 0..points.len() {
        let p = points[i];
        let q = points[(i + 1) % points.len()];
        area += p[0] * q[1] - q[0] * p[1];
    }
    0.5 * area
}

/// Total absolute xy area of all facets of one class.
pub fn class_area_xy(mesh: &DrapeMesh, class: FacetClass) -> f64 {
    mesh.facets_of(class).iter().map(|f| facet_area_xy(f).abs()).sum()
}

/// Every directed facet edge must be matched by exactly one facet edge
/// running the other way: the mesh is closed and consistently oriented.
pub fn assert_closed(mesh: &DrapeMesh) {
    let mut directed: HashMap<(u32, u32), usize> = HashMap::new();
    for facet in mesh.facets() {
        for i in 0..facet.len() {
            let edge = (facet[i], facet[(i + 1) % facet.len()]);
            *directed.entry(edge).or_insert(0) += 1;
        }
    }
    for (&(a, b), &count) in &directed {
        // a slit contributes both directions inside one facet
        let back = directed.get(&(b, a)).copied().unwrap_or(0);
        assert_eq!(
            count,
            back,
            "edge {:?} -> {:?} used {} times but {} times reversed",
            mesh.vertex(a),
            mesh.vertex(b),
            count,
            back
        );
    }
}

/// Check the half-edge invariants on every live node.
pub fn assert_graph_invariants(g: &Graph) {
    assert!(g.validate().is_ok(), "{:?}", g.validate());
    for n in g.live_nodes() {
        assert_eq!(mate(mate(n)), n);
        assert!(g.is_live(mate(n)));
        assert_eq!(g.face_next(mate(g.vertex_next(n))), n, "rotation/face mismatch at {}", n);
        let face = g.face_len(n);
        assert!(face >= 2, "face of {} has {} nodes", n, face);
        assert!(g.vertex_degree(n) >= 1);
    }
}

/// The face loop containing a node at `at` whose signed area is `area`.
pub fn face_with_area(g: &mut Graph, area: f64) -> Option<NodeId> {
    g.face_seeds()
        .unwrap()
        .into_iter()
        .find(|&f| (g.signed_area(f) - area).abs() < 1e-9)
}

/// Heights of all corners of one face.
pub fn face_heights(g: &Graph, face: NodeId) -> Vec<f64> {
    g.face_loop(face).map(|n| g.z(n)).collect()
}

/// Vertices sorted for order-insensitive comparison.
pub fn sorted_vertices(mesh: &DrapeMesh) -> Vec<[f64; 3]> {
    let mut v = mesh.vertices.clone();
    v.sort_by(|a, b| {
        a[0].total_cmp(&b[0])
            .then(a[1].total_cmp(&b[1]))
            .then(a[2].total_cmp(&b[2]))
    });
    v
}
