//! Grid raycasting.
//!
//! The ray walks the grid cell-by-cell (3D DDA), slab-testing the bounds of
//! every entity registered in each visited cell. Cells are entered in
//! strictly increasing distance, so the walk stops as soon as the best hit so
//! far is closer than the next cell boundary -- entities further along the
//! ray can only hit at a greater distance. `max_distance` bounds the walk
//! deterministically.

use std::collections::HashSet;

use glam::Vec3;
use strata_ecs::entity::EntityId;

use crate::grid::SpatialGrid;

/// A raycast hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// The entity whose bounds were hit.
    pub entity: EntityId,
    /// Distance from the ray origin to the hit point (0.0 when the origin
    /// starts inside the bounds).
    pub distance: f32,
    /// World-space hit point.
    pub point: Vec3,
}

impl SpatialGrid {
    /// Cast a ray and return the nearest registered entity it hits within
    /// `max_distance`, or `None`.
    ///
    /// `direction` is normalised internally; a zero direction or
    /// non-positive `max_distance` yields `None`.
    pub fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<RayHit> {
        if max_distance <= 0.0 {
            return None;
        }
        let dir = direction.normalize_or_zero();
        if dir == Vec3::ZERO {
            return None;
        }

        let cell_size = self.cell_size();
        let mut cell = self.cell_of(origin);

        // Per-axis DDA state: distance to the next cell boundary (t_max) and
        // distance between successive boundaries (t_delta).
        let step = [sign(dir.x), sign(dir.y), sign(dir.z)];
        let mut t_max = [f32::INFINITY; 3];
        let mut t_delta = [f32::INFINITY; 3];
        for axis in 0..3 {
            let d = dir[axis];
            if d != 0.0 {
                let cell_index = [cell.x, cell.y, cell.z][axis] as f32;
                let boundary = if d > 0.0 {
                    (cell_index + 1.0) * cell_size
                } else {
                    cell_index * cell_size
                };
                t_max[axis] = (boundary - origin[axis]) / d;
                t_delta[axis] = cell_size / d.abs();
            }
        }

        let mut tested: HashSet<u64> = HashSet::new();
        let mut best: Option<RayHit> = None;

        loop {
            if let Some(bucket) = self.cell_entities(cell) {
                for &entity in bucket {
                    // An entity spanning several cells is slab-tested once.
                    if !tested.insert(entity.to_raw()) {
                        continue;
                    }
                    let bounds = self
                        .bounds(entity)
                        .expect("cell membership implies registration");
                    if let Some(distance) = bounds.intersect_ray(origin, dir) {
                        if distance <= max_distance
                            && best.is_none_or(|hit| distance < hit.distance)
                        {
                            best = Some(RayHit {
                                entity,
                                distance,
                                point: origin + dir * distance,
                            });
                        }
                    }
                }
            }

            let t_next = t_max[0].min(t_max[1]).min(t_max[2]);
            // Later cells are entered at >= t_next, so they cannot beat this.
            if best.is_some_and(|hit| hit.distance <= t_next) {
                break;
            }
            if t_next > max_distance {
                break;
            }

            // Advance into the neighbouring cell across the nearest boundary.
            if t_max[0] <= t_max[1] && t_max[0] <= t_max[2] {
                cell.x += step[0];
                t_max[0] += t_delta[0];
            } else if t_max[1] <= t_max[2] {
                cell.y += step[1];
                t_max[1] += t_delta[1];
            } else {
                cell.z += step[2];
                t_max[2] += t_delta[2];
            }
        }

        best
    }
}

#[inline]
fn sign(v: f32) -> i32 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
