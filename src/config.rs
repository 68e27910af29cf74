// Copyright 2025 Lars Brubaker
// License: SGI Free Software License B (MIT-compatible)
//
// Tunables for the draping pipeline.
//
// Every default lives in `defaults` as a named constant so that tests and
// callers can refer to the same numbers the pipeline uses.

use crate::graph::Mask;

/// Default values for `DrapeConfig`.
pub mod defaults {
    // =========================================================================
    // Vertex merge
    // =========================================================================

    /// Absolute floor for the vertex merge tolerance (xy units).
    pub const MERGE_ABS_TOL: f64 = 1.0e-9;

    /// Merge tolerance relative to the largest absolute xy coordinate.
    pub const MERGE_REL_TOL: f64 = 1.0e-10;

    /// Edges shorter than this multiple of the merge tolerance are collapsed.
    pub const COLLAPSE_FACTOR: f64 = 10.0;

    // =========================================================================
    // Heights
    // =========================================================================

    /// Height assigned where no plane covers the ground.
    pub const BASE_ELEVATION: f64 = 0.0;

    /// Upper clamp applied to every evaluated height.
    pub const CEILING: f64 = 1.0e10;

    // =========================================================================
    // Polygon ingestion
    // =========================================================================

    /// Consecutive points closer than this fraction of the perimeter are dropped.
    pub const POINT_DEDUPE_REL_TOL: f64 = 1.0e-10;

    /// Polygons whose out-of-plane thickness is below this fraction of the
    /// perimeter are treated as planar.
    pub const PLANAR_REL_TOL: f64 = 1.0e-9;

    /// Upper bound (fraction of perimeter) for "mildly" non-planar polygons
    /// that may be fan triangulated.
    pub const MILD_NONPLANAR_REL_TOL: f64 = 1.0e-2;

    /// Fan triangulation requires the polygon normal to be at least this close
    /// to +z.
    pub const FAN_MIN_NORMAL_Z: f64 = 0.5;

    /// Polygons whose unit normal has |z| at or below this are vertical.
    pub const VERTICAL_NORMAL_TOL: f64 = 1.0e-8;

    /// Relative determinant below which the plane solve is singular.
    pub const SINGULAR_DET_TOL: f64 = 1.0e-12;

    /// Area / perimeter^2 below which a polygon is a sliver.
    pub const SLIVER_RATIO: f64 = 1.0e-8;

    /// Stricter area / perimeter^2 ratio applied to steep polygons.
    pub const STEEP_SLIVER_RATIO: f64 = 1.0e-4;

    /// Unit normal z below which a polygon counts as steep.
    pub const STEEP_NORMAL_Z: f64 = 0.05;

    /// Relative tolerance for reusing an existing plane with the same tag.
    pub const PLANE_DEDUPE_TOL: f64 = 1.0e-9;

    // =========================================================================
    // Annotation and flood
    // =========================================================================

    /// 1 - cos(angle) below which two face normals count as parallel.
    pub const NORMAL_PARALLEL_TOL: f64 = 1.0e-9;

    /// Faces with signed area below -(fraction * bbox area) seed the flood.
    pub const EXTERIOR_SEED_AREA_FRACTION: f64 = 1.0e-9;

    /// Faces with |area| below this fraction of the bbox area next to the
    /// exterior are absorbed into it when they are also thinner than
    /// SLIVER_RATIO.
    pub const SLIVER_FACE_AREA_FRACTION: f64 = 1.0e-10;

    // =========================================================================
    // Budgets
    // =========================================================================

    /// Multiplier on the live node count bounding every iterative pass.
    pub const ITERATION_BUDGET_FACTOR: usize = 16;
}

/// Options that control the draping pipeline.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DrapeConfig {
    pub merge_abs_tol: f64,
    pub merge_rel_tol: f64,
    pub collapse_factor: f64,
    pub base_elevation: f64,
    pub ceiling: f64,

    /// Keep edges carrying the BARRIER bit during intraplane collapse.
    pub respect_barriers: bool,
    /// Emit the flat base triangulation that closes the mesh.
    pub weld: bool,
    /// Collect exterior silhouette polylines.
    pub silhouettes: bool,
    /// Emit one FacetClass per index entry.
    pub facet_classes: bool,
    /// Emit bounded exterior faces (holes) at base elevation.
    pub exterior_facets: bool,
    /// Faces containing a node with any of these bits are not emitted.
    pub skip_mask: Mask,

    pub point_dedupe_rel_tol: f64,
    pub planar_rel_tol: f64,
    pub mild_nonplanar_rel_tol: f64,
    pub fan_min_normal_z: f64,
    pub vertical_normal_tol: f64,
    pub singular_det_tol: f64,
    pub sliver_ratio: f64,
    pub steep_sliver_ratio: f64,
    pub steep_normal_z: f64,
    pub plane_dedupe_tol: f64,

    pub normal_parallel_tol: f64,
    pub exterior_seed_area_fraction: f64,
    pub sliver_face_area_fraction: f64,

    pub iteration_budget_factor: usize,
}

impl Default for DrapeConfig {
    fn default() -> Self {
        Self {
            merge_abs_tol: defaults::MERGE_ABS_TOL,
            merge_rel_tol: defaults::MERGE_REL_TOL,
            collapse_factor: defaults::COLLAPSE_FACTOR,
            base_elevation: defaults::BASE_ELEVATION,
            ceiling: defaults::CEILING,
            respect_barriers: true,
            weld: true,
            silhouettes: true,
            facet_classes: true,
            exterior_facets: false,
            skip_mask: 0,
            point_dedupe_rel_tol: defaults::POINT_DEDUPE_REL_TOL,
            planar_rel_tol: defaults::PLANAR_REL_TOL,
            mild_nonplanar_rel_tol: defaults::MILD_NONPLANAR_REL_TOL,
            fan_min_normal_z: defaults::FAN_MIN_NORMAL_Z,
            vertical_normal_tol: defaults::VERTICAL_NORMAL_TOL,
            singular_det_tol: defaults::SINGULAR_DET_TOL,
            sliver_ratio: defaults::SLIVER_RATIO,
            steep_sliver_ratio: defaults::STEEP_SLIVER_RATIO,
            steep_normal_z: defaults::STEEP_NORMAL_Z,
            plane_dedupe_tol: defaults::PLANE_DEDUPE_TOL,
            normal_parallel_tol: defaults::NORMAL_PARALLEL_TOL,
            exterior_seed_area_fraction: defaults::EXTERIOR_SEED_AREA_FRACTION,
            sliver_face_area_fraction: defaults::SLIVER_FACE_AREA_FRACTION,
            iteration_budget_factor: defaults::ITERATION_BUDGET_FACTOR,
        }
    }
}

impl DrapeConfig {
    /// Merge tolerance for a graph whose largest absolute xy coordinate is
    /// `max_abs_xy`.
    pub fn merge_tolerance(&self, max_abs_xy: f64) -> f64 {
        self.merge_abs_tol.max(self.merge_rel_tol * max_abs_xy)
    }

    /// Collapse tolerance derived from the merge tolerance.
    pub fn collapse_tolerance(&self, max_abs_xy: f64) -> f64 {
        self.collapse_factor * self.merge_tolerance(max_abs_xy)
    }

    /// Iteration cap for a pass over a graph with `live_nodes` nodes.
    pub fn budget(&self, live_nodes: usize) -> usize {
        self.iteration_budget_factor.saturating_mul(live_nodes.max(16))
    }

    /// Height clamp shared by every evaluation: at least base, at most ceiling.
    pub fn clamp_height(&self, z: f64) -> f64 {
        z.max(self.base_elevation).min(self.ceiling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_uses_named_constants() {
        let config = DrapeConfig::default();
        assert_eq!(config.base_elevation, defaults::BASE_ELEVATION);
        assert_eq!(config.ceiling, defaults::CEILING);
        assert!(config.weld);
        assert!(config.respect_barriers);
        assert_eq!(config.skip_mask, 0);
    }

    #[test]
    fn merge_tolerance_scales_with_extent() {
        let config = DrapeConfig::default();
        assert_eq!(config.merge_tolerance(0.0), defaults::MERGE_ABS_TOL);
        let big = config.merge_tolerance(1.0e6);
        assert!((big - 1.0e-4).abs() < 1.0e-12);
        assert!(config.collapse_tolerance(1.0e6) > big);
    }

    #[test]
    fn clamp_height_respects_base_and_ceiling() {
        let config = DrapeConfig {
            base_elevation: 1.0,
            ceiling: 10.0,
            ..DrapeConfig::default()
        };
        assert_eq!(config.clamp_height(-5.0), 1.0);
        assert_eq!(config.clamp_height(5.0), 5.0);
        assert_eq!(config.clamp_height(50.0), 10.0);
    }
}
