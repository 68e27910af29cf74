// Copyright 2025 Lars Brubaker
// License: SGI Free Software License B (MIT-compatible)
//
// Height planes z = ax * x + ay * y + c and the registry that owns them.
//
// Index 0 is reserved so that NULL_PLANE can mean "no plane" on a node.

use tracing::warn;

use crate::geom::{normalize3, Point3, Real};

/// Index into PlaneRegistry
pub type PlaneId = u32;

/// Plane index carried by nodes that do not bound a polygon interior.
pub const NULL_PLANE: PlaneId = 0;

/// Plane status bits.
pub mod status {
    /// The plane's stack discipline broke; it no longer contributes heights.
    pub const DANGLING: u32 = 1 << 0;
}

#[derive(Clone, Debug, PartialEq)]
pub struct Plane {
    pub ax: Real,
    pub ay: Real,
    pub c: Real,
    /// Heights are clamped to the z range of the polygons the plane came from.
    pub z_min: Real,
    pub z_max: Real,
    pub tag: i32,
    pub status: u32,
}

impl Plane {
    /// Unclamped height at (x, y).
    #[inline]
    pub fn eval_raw(&self, x: Real, y: Real) -> Real {
        self.ax * x + self.ay * y + self.c
    }

    /// Height at (x, y) clamped to [z_min, z_max].
    #[inline]
    pub fn eval(&self, x: Real, y: Real) -> Real {
        self.eval_raw(x, y).max(self.z_min).min(self.z_max)
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.status & status::DANGLING == 0
    }

    /// Upward unit normal.
    pub fn normal(&self) -> Point3 {
        normalize3([-self.ax, -self.ay, 1.0]).unwrap_or([0.0, 0.0, 1.0])
    }

    /// Same tag and coefficients within `tol`, relative to the plane's
    /// height magnitude at the origin.
    fn matches(&self, other: &Plane, tol: Real) -> bool {
        let scale = 1.0 + self.c.abs().max(other.c.abs());
        self.tag == other.tag
            && (self.ax - other.ax).abs() <= tol
            && (self.ay - other.ay).abs() <= tol
            && (self.c - other.c).abs() <= tol * scale
    }
}

/// Growable array of planes shared by every polygon of one drape.
#[derive(Clone, Debug)]
pub struct PlaneRegistry {
    planes: Vec<Plane>,
    dedupe_tol: Real,
}

impl PlaneRegistry {
    pub fn new(dedupe_tol: Real) -> Self {
        let reserved = Plane {
            ax: 0.0,
            ay: 0.0,
            c: 0.0,
            z_min: 0.0,
            z_max: 0.0,
            tag: 0,
            status: status::DANGLING,
        };
        PlaneRegistry {
            planes: vec![reserved],
            dedupe_tol,
        }
    }

    /// Register a plane.  A plane with the same tag and coefficients reuses
    /// the existing index and widens its z range.
    pub fn add(&mut self, plane: Plane) -> PlaneId {
        if let Some(id) = self
            .planes
            .iter()
            .skip(1)
            .position(|p| p.is_valid() && p.matches(&plane, self.dedupe_tol))
        {
            let existing = &mut self.planes[id + 1];
            existing.z_min = existing.z_min.min(plane.z_min);
            existing.z_max = existing.z_max.max(plane.z_max);
            return (id + 1) as PlaneId;
        }
        self.planes.push(plane);
        (self.planes.len() - 1) as PlaneId
    }

    /// Clone an existing plane into a fresh index.
    pub fn duplicate(&mut self, id: PlaneId) -> Option<PlaneId> {
        if id == NULL_PLANE {
            return None;
        }
        let copy = self.planes.get(id as usize)?.clone();
        self.planes.push(copy);
        Some((self.planes.len() - 1) as PlaneId)
    }

    pub fn get(&self, id: PlaneId) -> Option<&Plane> {
        if id == NULL_PLANE {
            return None;
        }
        self.planes.get(id as usize)
    }

    /// Valid planes only: NULL_PLANE and dangling planes yield None.
    pub fn valid(&self, id: PlaneId) -> Option<&Plane> {
        self.get(id).filter(|p| p.is_valid())
    }

    pub fn is_valid(&self, id: PlaneId) -> bool {
        self.valid(id).is_some()
    }

    /// Mark a plane dangling.  Returns true the first time.
    pub fn mark_dangling(&mut self, id: PlaneId) -> bool {
        if id == NULL_PLANE {
            return false;
        }
        match self.planes.get_mut(id as usize) {
            Some(p) if p.is_valid() => {
                p.status |= status::DANGLING;
                warn!(plane = id, tag = p.tag, "plane marked dangling");
                true
            }
            _ => false,
        }
    }

    pub fn dangling_count(&self) -> usize {
        self.planes.iter().skip(1).filter(|p| !p.is_valid()).count()
    }

    /// Number of real planes (the reserved slot is not counted).
    pub fn len(&self) -> usize {
        self.planes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Real planes with their indices.
    pub fn iter(&self) -> impl Iterator<Item = (PlaneId, &Plane)> {
        self.planes
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, p)| (i as PlaneId, p))
    }
}
