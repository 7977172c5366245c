//! Axis-aligned bounding boxes.
//!
//! [`Aabb`] is the narrow-phase primitive: the broad-phase grid over-reports
//! candidates, and callers confirm actual overlap with
//! [`Aabb::intersects`] before treating a candidate as a collision.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// An axis-aligned bounding box in world space.
///
/// `min` must be component-wise less than or equal to `max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner.
    pub min: Vec3,
    /// Maximum corner.
    pub max: Vec3,
}

impl Aabb {
    /// Build from explicit corners.
    pub fn new(min: Vec3, max: Vec3) -> Self {
        debug_assert!(
            min.cmple(max).all(),
            "Aabb min must not exceed max: min={min:?} max={max:?}"
        );
        Self { min, max }
    }

    /// Build from a center point and half-extents.
    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self::new(center - half_extents, center + half_extents)
    }

    /// Center point.
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Half the size along each axis.
    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// The box shifted by `offset`.
    pub fn translated(&self, offset: Vec3) -> Self {
        Self {
            min: self.min + offset,
            max: self.max + offset,
        }
    }

    /// Whether `point` lies inside the box (boundary inclusive).
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Whether two boxes overlap (boundary touch counts as overlap).
    ///
    /// Axis-separated comparison, bailing out on the first separating axis.
    /// Symmetric: `a.intersects(&b) == b.intersects(&a)`.
    #[inline]
    pub fn intersects(&self, other: &Aabb) -> bool {
        if self.max.x < other.min.x || self.min.x > other.max.x {
            return false;
        }
        if self.max.y < other.min.y || self.min.y > other.max.y {
            return false;
        }
        if self.max.z < other.min.z || self.min.z > other.max.z {
            return false;
        }
        true
    }

    /// Slab-method ray intersection.
    ///
    /// Returns the entry distance along `direction` (0.0 when `origin` is
    /// already inside), or `None` when the ray misses or the box lies behind
    /// the origin. `direction` need not be normalised; the returned distance
    /// is in units of its length.
    pub fn intersect_ray(&self, origin: Vec3, direction: Vec3) -> Option<f32> {
        let mut t_near = 0.0f32;
        let mut t_far = f32::INFINITY;

        for axis in 0..3 {
            let o = origin[axis];
            let d = direction[axis];
            let (lo, hi) = (self.min[axis], self.max[axis]);
            if d.abs() < f32::EPSILON {
                // Parallel to the slab: either always inside it or never.
                if o < lo || o > hi {
                    return None;
                }
            } else {
                let inv = 1.0 / d;
                let mut t0 = (lo - o) * inv;
                let mut t1 = (hi - o) * inv;
                if t0 > t1 {
                    std::mem::swap(&mut t0, &mut t1);
                }
                t_near = t_near.max(t0);
                t_far = t_far.min(t1);
                if t_near > t_far {
                    return None;
                }
            }
        }
        Some(t_near)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
