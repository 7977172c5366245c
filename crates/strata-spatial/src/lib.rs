//! Strata spatial index -- uniform-grid broad phase for the voxel simulation.
//!
//! Entities carrying position and bounds register their world-space AABB in a
//! [`SpatialGrid`](grid::SpatialGrid). The grid buckets them into fixed-size
//! cells for cheap proximity queries: [`query_region`](grid::SpatialGrid::query_region)
//! over-reports candidates (broad phase), and callers confirm overlap with
//! [`Aabb::intersects`](aabb::Aabb::intersects) (narrow phase). A DDA
//! [`raycast`](grid::SpatialGrid::raycast) walks cells front-to-back for
//! nearest-hit picking.
//!
//! The grid never owns component data: it stores only [`EntityId`]s and the
//! bounds it was last given, making it a rebuildable cache over the ECS
//! store.
//!
//! # Quick Start
//!
//! ```
//! use glam::Vec3;
//! use strata_spatial::prelude::*;
//! use strata_ecs::entity::EntityId;
//!
//! let mut grid = SpatialGrid::new(16.0);
//! let player = EntityId::new(0, 0);
//! let bounds = Aabb::from_center_half_extents(Vec3::new(8.0, 8.0, 8.0), Vec3::splat(0.5));
//! grid.insert(player, bounds).unwrap();
//!
//! let region = Aabb::new(Vec3::ZERO, Vec3::splat(16.0));
//! let candidates = grid.query_region(&region);
//! assert_eq!(candidates, vec![player]);
//! // Narrow phase: confirm the candidate really overlaps.
//! assert!(grid.bounds(player).unwrap().intersects(&region));
//! ```

#![deny(unsafe_code)]

pub mod aabb;
pub mod grid;
pub mod ray;

use strata_ecs::entity::EntityId;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by spatial-index operations.
///
/// Both variants are recoverable; a failed spatial operation never poisons
/// the grid.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    /// `update` or `remove` targeted an entity that is not in the grid.
    #[error("entity {entity} is not registered in the spatial grid")]
    NotRegistered {
        /// The offending handle.
        entity: EntityId,
    },

    /// `insert` targeted an entity that is already in the grid.
    #[error("entity {entity} is already registered in the spatial grid")]
    AlreadyRegistered {
        /// The offending handle.
        entity: EntityId,
    },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::aabb::Aabb;
    pub use crate::grid::{CellCoord, SpatialGrid};
    pub use crate::ray::RayHit;
    pub use crate::SpatialError;
}

// ---------------------------------------------------------------------------
// Integration tests
// ---------------------------------------------------------------------------
