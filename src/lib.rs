// drape-arrangement: drape overlapping height polygons into one watertight mesh
// Copyright 2025 Lars Brubaker
// License: SGI Free Software License B (MIT-compatible)

pub mod annotate;
pub mod arrangement;
pub mod config;
pub mod drape;
pub mod error;
pub mod extract;
pub mod flood;
pub mod geom;
pub mod graph;
pub mod ingest;
pub mod observer;
pub mod plane;

pub use config::DrapeConfig;
pub use drape::{drape, DrapeStats, Draper};
pub use error::{DrapeError, Result};
pub use extract::{DrapeMesh, FacetClass};
pub use graph::Graph;
pub use ingest::{IngestOutcome, InputPolygon, Rejection};
pub use observer::{DrapeObserver, NoopObserver, Stage};
pub use plane::{Plane, PlaneId, PlaneRegistry};
