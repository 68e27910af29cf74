// Copyright 2025 Lars Brubaker
// License: SGI Free Software License B (MIT-compatible)
//
// Pipeline checkpoints for debugging and inspection.

use crate::graph::Graph;
use crate::plane::PlaneRegistry;

/// Points in the pipeline where an observer is called.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Ingested,
    Merged,
    Regularized,
    Annotated,
    Flooded,
    Extracted,
}

/// Receives read-only views of the graph between stages.  Every method has
/// a no-op default.
pub trait DrapeObserver {
    fn checkpoint(&mut self, _stage: Stage, _graph: &Graph, _planes: &PlaneRegistry) {}
}

/// Observer that ignores every checkpoint.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopObserver;

impl DrapeObserver for NoopObserver {}
