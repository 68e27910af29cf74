// Copyright 2025 Lars Brubaker
// License: SGI Free Software License B (MIT-compatible)
//
// Pipeline driver.
//
// A Draper owns one graph and one plane registry for a single computation:
//
//   add_polygon*  ->  build_arrangement  ->  collapse_intraplane_edges
//                 ->  resolve_visibility ->  extract_mesh
//
// The stages can be driven one at a time (to inspect the graph in between)
// or all at once with drape().  Only resource exhaustion stops the
// pipeline; rejected polygons and dangling planes are counted in
// DrapeStats and the output degrades instead.

use tracing::debug;

use crate::annotate::{self, AnnotateReport};
use crate::arrangement::{self, MergeReport};
use crate::config::DrapeConfig;
use crate::error::Result;
use crate::extract::{self, DrapeMesh, ExtractReport};
use crate::flood::{self, FloodReport};
use crate::graph::Graph;
use crate::ingest::{ingest_polygon, IngestOutcome, InputPolygon};
use crate::observer::{DrapeObserver, NoopObserver, Stage};
use crate::plane::PlaneRegistry;

/// Counts gathered over one computation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DrapeStats {
    pub polygons_accepted: usize,
    pub polygons_rejected: usize,
    /// Fan pieces dropped from otherwise accepted polygons.
    pub pieces_rejected: usize,
    pub planes: usize,
    pub dangling_planes: usize,
    pub merge: MergeReport,
    pub edges_collapsed: usize,
    pub edges_regularized: usize,
    pub intraplane: AnnotateReport,
    pub flood: FloodReport,
    pub facets: ExtractReport,
}

pub struct Draper {
    graph: Graph,
    planes: PlaneRegistry,
    config: DrapeConfig,
    stats: DrapeStats,
    stage: Option<Stage>,
}

impl Draper {
    pub fn new(config: DrapeConfig) -> Self {
        Draper {
            graph: Graph::new(),
            planes: PlaneRegistry::new(config.plane_dedupe_tol),
            config,
            stats: DrapeStats::default(),
            stage: None,
        }
    }

    /// Ingest one polygon.  Call before build_arrangement.
    pub fn add_polygon(&mut self, polygon: &InputPolygon) -> Result<IngestOutcome> {
        let outcome = ingest_polygon(&mut self.graph, &mut self.planes, polygon, &self.config)?;
        match &outcome {
            IngestOutcome::Accepted { rejected_pieces, .. } => {
                self.stats.polygons_accepted += 1;
                self.stats.pieces_rejected += rejected_pieces;
            }
            IngestOutcome::Rejected(_) => self.stats.polygons_rejected += 1,
        }
        self.stats.planes = self.planes.len();
        self.stage = Some(Stage::Ingested);
        Ok(outcome)
    }

    pub fn add_polygons<'a>(&mut self, polygons: impl IntoIterator<Item = &'a InputPolygon>) -> Result<()> {
        for polygon in polygons {
            self.add_polygon(polygon)?;
        }
        Ok(())
    }

    /// Snap, split and bridge the ingested loops into one subdivision.
    pub fn merge(&mut self) -> Result<&MergeReport> {
        let tol = self.config.merge_tolerance(self.graph.max_abs_xy());
        self.stats.merge = arrangement::merge_loops(&mut self.graph, tol)?;
        self.stage = Some(Stage::Merged);
        Ok(&self.stats.merge)
    }

    /// Collapse short edges and remove degenerate ones.
    pub fn regularize(&mut self) -> Result<()> {
        let tol = self.config.collapse_tolerance(self.graph.max_abs_xy());
        let budget = self.config.budget(self.graph.live_count());
        self.stats.edges_collapsed += arrangement::collapse_short_edges(&mut self.graph, tol, budget);
        self.stats.edges_regularized += arrangement::regularize(&mut self.graph, budget);
        self.stage = Some(Stage::Regularized);
        Ok(())
    }

    pub fn build_arrangement(&mut self) -> Result<()> {
        self.merge()?;
        self.regularize()
    }

    /// Remove seams between coplanar patches of one surface.
    pub fn collapse_intraplane_edges(&mut self) -> Result<&AnnotateReport> {
        flood::classify_exterior_coarse(&mut self.graph)?;
        self.stats.intraplane =
            annotate::collapse_intraplane_edges(&mut self.graph, &mut self.planes, &self.config)?;
        self.stats.dangling_planes = self.planes.dangling_count();
        self.stage = Some(Stage::Annotated);
        Ok(&self.stats.intraplane)
    }

    /// Assign every face its visible height.
    pub fn resolve_visibility(&mut self) -> Result<&FloodReport> {
        self.stats.flood = flood::flood_planes(&mut self.graph, &mut self.planes, &self.config)?;
        self.stats.dangling_planes = self.planes.dangling_count();
        self.stage = Some(Stage::Flooded);
        Ok(&self.stats.flood)
    }

    /// Read the mesh out.  With welding enabled this rewrites the graph, so
    /// it is the last stage.
    pub fn extract_mesh(&mut self) -> Result<DrapeMesh> {
        let (mesh, report) = extract::extract_mesh(&mut self.graph, &self.config)?;
        self.stats.facets = report;
        self.stage = Some(Stage::Extracted);
        Ok(mesh)
    }

    /// Run every remaining stage.
    pub fn drape(self) -> Result<(DrapeMesh, DrapeStats)> {
        self.drape_with_observer(&mut NoopObserver)
    }

    /// Run every remaining stage, calling the observer after each one.
    /// Stages already driven by hand are not repeated.  If the mesh was
    /// already taken with extract_mesh, the returned mesh is empty.
    pub fn drape_with_observer(mut self, observer: &mut dyn DrapeObserver) -> Result<(DrapeMesh, DrapeStats)> {
        let done = self.stage;
        let pending = |stage: Stage| done.map_or(true, |d| d < stage);
        if pending(Stage::Merged) {
            self.checkpoint(observer, Stage::Ingested);
            self.merge()?;
            self.checkpoint(observer, Stage::Merged);
        }
        if pending(Stage::Regularized) {
            self.regularize()?;
            self.checkpoint(observer, Stage::Regularized);
        }
        if pending(Stage::Annotated) {
            self.collapse_intraplane_edges()?;
            self.checkpoint(observer, Stage::Annotated);
        }
        if pending(Stage::Flooded) {
            self.resolve_visibility()?;
            self.checkpoint(observer, Stage::Flooded);
        }
        if !pending(Stage::Extracted) {
            return Ok((DrapeMesh::default(), self.stats));
        }
        let mesh = self.extract_mesh()?;
        self.checkpoint(observer, Stage::Extracted);
        Ok((mesh, self.stats))
    }

    fn checkpoint(&self, observer: &mut dyn DrapeObserver, stage: Stage) {
        debug!(
            stage = ?stage,
            nodes = self.graph.live_count(),
            planes = self.planes.len(),
            dangling = self.planes.dangling_count(),
            "checkpoint"
        );
        observer.checkpoint(stage, &self.graph, &self.planes);
    }

    // ─────── Accessors ────────────────────────────────────────────────────────

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn planes(&self) -> &PlaneRegistry {
        &self.planes
    }

    pub fn planes_mut(&mut self) -> &mut PlaneRegistry {
        &mut self.planes
    }

    pub fn config(&self) -> &DrapeConfig {
        &self.config
    }

    pub fn stats(&self) -> &DrapeStats {
        &self.stats
    }

    /// The last stage completed, if any.
    pub fn stage(&self) -> Option<Stage> {
        self.stage
    }
}

impl Default for Draper {
    fn default() -> Self {
        Self::new(DrapeConfig::default())
    }
}

/// Drape a batch of polygons with one configuration.
pub fn drape(polygons: &[InputPolygon], config: DrapeConfig) -> Result<(DrapeMesh, DrapeStats)> {
    let mut draper = Draper::new(config);
    draper.add_polygons(polygons)?;
    draper.drape()
}
