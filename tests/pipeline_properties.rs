// Copyright 2025 Lars Brubaker
// End-to-end checks of the pipeline's guaranteed properties.

mod helpers;

use approx::assert_relative_eq;
use drape_arrangement::arrangement::{collapse_short_edges, regularize};
use drape_arrangement::graph::{mask, mate};
use drape_arrangement::{
    drape, DrapeConfig, Draper, FacetClass, IngestOutcome, InputPolygon, Rejection,
};
use helpers::{assert_closed, assert_graph_invariants, face_heights, face_with_area, rect};

fn ceiling_100() -> DrapeConfig {
    DrapeConfig {
        base_elevation: 0.0,
        ceiling: 100.0,
        ..DrapeConfig::default()
    }
}

// --- Single loop ---

#[test]
fn single_loop_round_trip() {
    let mut draper = Draper::default();
    let outcome = draper
        .add_polygon(&InputPolygon::new(rect(0.0, 0.0, 10.0, 10.0, 0.0), 1))
        .unwrap();
    assert!(outcome.is_accepted());
    draper.build_arrangement().unwrap();

    let planes = draper.planes().clone();
    let g = draper.graph_mut();
    assert_graph_invariants(g);
    assert_eq!(g.face_seeds().unwrap().len(), 2, "one interior and one exterior face");
    assert_eq!(g.live_count(), 8);
    for n in g.live_nodes() {
        assert!(g.has_mask(n, mask::BOUNDARY), "boundary bit missing on node {}", n);
        assert!(g.has_mask(mate(n), mask::BOUNDARY));
    }

    let inside = face_with_area(g, 100.0).expect("interior face");
    let plane = planes.get(g.plane(inside)).expect("interior plane");
    for &(x, y) in &[(0.0, 0.0), (5.0, 5.0), (10.0, 3.0), (-4.0, 12.0)] {
        assert_eq!(plane.eval(x, y), 0.0);
    }
    assert_eq!(plane.tag, 1);
    let outside = face_with_area(g, -100.0).expect("exterior face");
    assert_eq!(g.plane(outside), 0);
}

// --- Coplanar merge ---

#[test]
fn coplanar_squares_collapse_to_one_quad() {
    let mut draper = Draper::default();
    draper
        .add_polygon(&InputPolygon::new(rect(0.0, 0.0, 1.0, 1.0, 3.0), 4))
        .unwrap();
    draper
        .add_polygon(&InputPolygon::new(rect(1.0, 0.0, 2.0, 1.0, 3.0), 4))
        .unwrap();
    draper.build_arrangement().unwrap();
    assert_eq!(draper.planes().len(), 1, "same tag and coefficients share a plane");

    let report = draper.collapse_intraplane_edges().unwrap().clone();
    assert_eq!(report.bundles_removed, 1);

    let g = draper.graph_mut();
    assert_graph_invariants(g);
    // four edges remain: the outline of the 2x1 rectangle
    assert_eq!(g.live_count(), 8);
    let inside = face_with_area(g, 2.0).expect("merged face");
    assert_eq!(g.face_len(inside), 4);

    let (mesh, stats) = draper.drape().unwrap();
    assert_eq!(stats.facets.planar, 1);
    assert_eq!(mesh.facets_of(FacetClass::SidePanel).len(), 4);
    assert_closed(&mesh);
}

// --- Height discontinuity ---

#[test]
fn footprint_raises_a_walled_block() {
    let polygons = [InputPolygon::new(rect(0.0, 0.0, 10.0, 10.0, 5.0), 1)];
    let (mesh, stats) = drape(&polygons, ceiling_100()).unwrap();

    assert_eq!(mesh.vertices.len(), 8, "four corners at z=0 and four at z=5");
    let tops = mesh.facets_of(FacetClass::Planar);
    assert_eq!(tops.len(), 1);
    assert!(tops[0].iter().all(|p| p[2] == 5.0));

    let panels = mesh.facets_of(FacetClass::SidePanel);
    assert_eq!(panels.len(), 4, "exactly one ring of side panels");
    for panel in &panels {
        assert_eq!(panel.len(), 4);
        assert_eq!(panel.iter().filter(|p| p[2] == 0.0).count(), 2);
        assert_eq!(panel.iter().filter(|p| p[2] == 5.0).count(), 2);
    }

    let base = mesh.facets_of(FacetClass::Base);
    assert_eq!(base.len(), 2);
    assert!(base.iter().flatten().all(|p| p[2] == 0.0));
    assert_relative_eq!(helpers::class_area_xy(&mesh, FacetClass::Base), 100.0, epsilon = 1e-9);

    assert_eq!(stats.facets.side_panels, 4);
    assert_eq!(stats.flood.exterior_faces, 1);
    assert_closed(&mesh);
}

#[test]
fn interior_heights_follow_the_footprint_plane() {
    let mut draper = Draper::new(ceiling_100());
    draper
        .add_polygon(&InputPolygon::new(rect(0.0, 0.0, 10.0, 10.0, 5.0), 1))
        .unwrap();
    draper.build_arrangement().unwrap();
    draper.collapse_intraplane_edges().unwrap();
    draper.resolve_visibility().unwrap();

    let g = draper.graph_mut();
    let inside = face_with_area(g, 100.0).unwrap();
    assert!(face_heights(g, inside).iter().all(|&z| z == 5.0));
    assert!(!g.has_mask(inside, mask::EXTERIOR));
    let outside = face_with_area(g, -100.0).unwrap();
    assert!(face_heights(g, outside).iter().all(|&z| z == 0.0));
    assert!(g.has_mask(outside, mask::EXTERIOR));
}

#[test]
fn silhouette_traces_the_footprint_at_its_height() {
    let polygons = [InputPolygon::new(rect(0.0, 0.0, 10.0, 10.0, 5.0), 1)];
    let (mesh, stats) = drape(&polygons, ceiling_100()).unwrap();
    let loops = mesh.silhouettes.as_ref().expect("silhouettes requested by default");
    assert_eq!(loops.len(), 1);
    assert_eq!(stats.facets.silhouettes, 1);
    assert_eq!(loops[0].len(), 4);
    assert!(loops[0].iter().all(|p| p[2] == 5.0));
    assert_relative_eq!(helpers::facet_area_xy(&loops[0]).abs(), 100.0, epsilon = 1e-9);
}

// --- Plane-fit rejection ---

#[test]
fn sliver_triangle_is_dropped() {
    let mut draper = Draper::default();
    let outcome = draper
        .add_polygon(&InputPolygon::new(
            vec![[0.0, 0.0, 1.0], [50.0, 1e-7, 1.0], [100.0, 0.0, 1.0]],
            9,
        ))
        .unwrap();
    assert_eq!(outcome, IngestOutcome::Rejected(Rejection::Sliver));
    assert!(draper.planes().is_empty());
    assert_eq!(draper.graph().live_count(), 0);

    let (mesh, stats) = draper.drape().unwrap();
    assert_eq!(stats.polygons_rejected, 1);
    assert_eq!(mesh.facet_count(), 0);
}

#[test]
fn vertical_polygon_is_dropped() {
    let mut draper = Draper::default();
    let outcome = draper
        .add_polygon(&InputPolygon::new(
            vec![[0.0, 0.0, 0.0], [10.0, 0.0, 0.0], [10.0, 0.0, 5.0], [0.0, 0.0, 5.0]],
            2,
        ))
        .unwrap();
    assert!(!outcome.is_accepted());
    assert!(draper.planes().is_empty());
}

// --- Parity detection ---

#[test]
fn unmatched_plane_exit_marks_plane_dangling() {
    let mut draper = Draper::new(ceiling_100());
    draper
        .add_polygon(&InputPolygon::new(rect(0.0, 0.0, 4.0, 4.0, 5.0), 1))
        .unwrap();
    draper.build_arrangement().unwrap();
    draper.collapse_intraplane_edges().unwrap();

    // claim the plane on one outside node as well: crossing that edge exits
    // a plane that was never entered
    let plane = {
        let g = draper.graph();
        let inside = g.live_nodes().find(|&n| g.signed_area(n) > 0.0).unwrap();
        g.plane(inside)
    };
    let g = draper.graph_mut();
    let outside = g.live_nodes().find(|&n| g.signed_area(n) < 0.0).unwrap();
    g.set_plane(outside, plane);

    let flood = draper.resolve_visibility().unwrap().clone();
    assert_eq!(flood.dangling_planes, 1);
    assert!(!draper.planes().is_valid(plane));
    assert_eq!(draper.stats().dangling_planes, 1);

    let g = draper.graph_mut();
    assert_graph_invariants(g);
    let inside = face_with_area(g, 16.0).unwrap();
    assert!(
        face_heights(g, inside).iter().all(|&z| z == 0.0),
        "a dangling plane contributes no height"
    );

    // the computation still completes
    let mesh = draper.extract_mesh().unwrap();
    assert_eq!(mesh.facets_of(FacetClass::SidePanel).len(), 0);
}

// --- Fixed point ---

#[test]
fn cleanup_passes_reach_a_fixed_point() {
    let mut draper = Draper::default();
    draper
        .add_polygon(&InputPolygon::new(rect(0.0, 0.0, 4.0, 4.0, 1.0), 1))
        .unwrap();
    draper
        .add_polygon(&InputPolygon::new(rect(2.0, 1.0, 6.0, 3.0, 2.0), 2))
        .unwrap();
    // a point a hair off a corner of the first square
    draper
        .add_polygon(&InputPolygon::new(
            vec![[4.0 + 1e-12, 4.0, 3.0], [8.0, 4.0, 3.0], [8.0, 8.0, 3.0]],
            3,
        ))
        .unwrap();
    draper.build_arrangement().unwrap();

    let config = draper.config().clone();
    let g = draper.graph_mut();
    assert_graph_invariants(g);
    let before = g.live_count();
    let tol = config.collapse_tolerance(g.max_abs_xy());
    let budget = config.budget(g.live_count());
    assert_eq!(collapse_short_edges(g, tol, budget), 0);
    assert_eq!(regularize(g, budget), 0);
    assert_eq!(g.live_count(), before);
}
