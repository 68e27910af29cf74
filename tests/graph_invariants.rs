// Copyright 2025 Lars Brubaker
// Half-edge invariants checked after every pipeline stage.

mod helpers;

use drape_arrangement::graph::mask;
use drape_arrangement::{DrapeConfig, DrapeObserver, Draper, Graph, InputPolygon, PlaneRegistry, Stage};
use helpers::{assert_closed, assert_graph_invariants, parse_polygons, rect};

#[derive(Default)]
struct InvariantChecker {
    stages: Vec<Stage>,
}

impl DrapeObserver for InvariantChecker {
    fn checkpoint(&mut self, stage: Stage, graph: &Graph, planes: &PlaneRegistry) {
        assert_graph_invariants(graph);
        for n in graph.live_nodes() {
            assert!(
                planes.get(graph.plane(n)).is_some() || graph.plane(n) == 0,
                "node {} names an unknown plane after {:?}",
                n,
                stage
            );
            if stage >= Stage::Flooded && stage < Stage::Extracted {
                let z = graph.z(n);
                assert!((0.0..=1000.0).contains(&z), "height {} out of range", z);
            }
        }
        if stage >= Stage::Regularized && stage < Stage::Extracted {
            for n in graph.live_nodes() {
                assert!(
                    graph.xy(n) != graph.dest_xy(n),
                    "zero-length edge survives {:?}",
                    stage
                );
            }
        }
        self.stages.push(stage);
    }
}

fn run_checked(polygons: &[InputPolygon], config: DrapeConfig) -> InvariantChecker {
    let mut draper = Draper::new(config);
    draper.add_polygons(polygons).unwrap();
    let mut checker = InvariantChecker::default();
    let (mesh, _) = draper.drape_with_observer(&mut checker).unwrap();
    assert_closed(&mesh);
    checker
}

fn bounded() -> DrapeConfig {
    DrapeConfig {
        ceiling: 1000.0,
        ..DrapeConfig::default()
    }
}

#[test]
fn star_of_crossing_strips() {
    let polygons = [
        InputPolygon::new(rect(-5.0, -1.0, 5.0, 1.0, 1.0), 1),
        InputPolygon::new(rect(-1.0, -5.0, 1.0, 5.0, 2.0), 2),
        InputPolygon::new(
            vec![[-4.0, -3.0, 3.0], [-3.0, -4.0, 3.0], [4.0, 3.0, 3.0], [3.0, 4.0, 3.0]],
            3,
        ),
    ];
    let checker = run_checked(&polygons, bounded());
    assert_eq!(checker.stages.len(), 6);
}

#[test]
fn shared_edges_and_touching_corners() {
    let polygons = [
        InputPolygon::new(rect(0.0, 0.0, 2.0, 2.0, 1.0), 1),
        // shares the right edge of the first square
        InputPolygon::new(rect(2.0, 0.0, 4.0, 2.0, 3.0), 2),
        // touches the first square at one corner only
        InputPolygon::new(rect(-2.0, -2.0, 0.0, 0.0, 2.0), 3),
        // shares half an edge
        InputPolygon::new(rect(1.0, 2.0, 3.0, 3.0, 4.0), 4),
    ];
    run_checked(&polygons, bounded());
}

#[test]
fn nested_fixture_stays_valid() {
    let polygons = parse_polygons(include_str!("data/terraces.dat"));
    run_checked(&polygons, bounded());
}

#[test]
fn reflex_footprint_with_overlap() {
    let ell = vec![
        [0.0, 0.0, 2.0],
        [6.0, 0.0, 2.0],
        [6.0, 2.0, 2.0],
        [2.0, 2.0, 2.0],
        [2.0, 6.0, 2.0],
        [0.0, 6.0, 2.0],
    ];
    let polygons = [
        InputPolygon::new(ell, 1),
        InputPolygon::new(rect(1.0, 1.0, 4.0, 4.0, 1.0), 2),
    ];
    run_checked(&polygons, bounded());
}

#[test]
fn near_coincident_vertices_are_snapped() {
    let polygons = [
        InputPolygon::new(rect(0.0, 0.0, 1.0, 1.0, 1.0), 1),
        InputPolygon::new(rect(1.0 + 1e-13, 0.0, 2.0, 1.0 - 1e-13, 2.0), 2),
    ];
    let mut draper = Draper::new(bounded());
    draper.add_polygons(&polygons).unwrap();
    let report = draper.merge().unwrap().clone();
    assert!(report.vertices_snapped > 0);
    assert_graph_invariants(draper.graph());
    let (mesh, _) = draper.drape().unwrap();
    assert_closed(&mesh);
}

#[test]
fn scratch_bits_are_released_between_stages() {
    let polygons = [
        InputPolygon::new(rect(0.0, 0.0, 2.0, 2.0, 1.0), 1),
        InputPolygon::new(rect(1.0, 1.0, 3.0, 3.0, 2.0), 2),
    ];
    let mut draper = Draper::new(bounded());
    draper.add_polygons(&polygons).unwrap();
    draper.build_arrangement().unwrap();
    draper.collapse_intraplane_edges().unwrap();
    draper.resolve_visibility().unwrap();
    let g = draper.graph();
    for n in g.live_nodes() {
        assert!(!g.has_mask(n, mask::SCRATCH), "scratch bit left on node {}", n);
    }
}
