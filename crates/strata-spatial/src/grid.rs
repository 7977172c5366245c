//! Uniform spatial grid for broad-phase queries.
//!
//! The grid buckets entities into fixed-size cubic cells keyed by
//! `floor(coordinate / cell_size)` per axis; an entity whose bounds span a
//! cell boundary is registered in every cell it overlaps. Region queries
//! union the buckets of every cell the region touches, which can over-report
//! (false positives) but never misses an overlapping entity -- callers
//! confirm with [`Aabb::intersects`] before acting on a candidate.
//!
//! The grid is a derived cache over component data it does not own: it holds
//! only [`EntityId`]s and the bounds it was last told about. Rebuild it from
//! a position-column scan ([`SpatialGrid::rebuild`]) whenever it is suspected
//! stale.

use std::collections::HashMap;

use glam::Vec3;
use strata_ecs::entity::EntityId;
use tracing::debug;

use crate::aabb::Aabb;
use crate::SpatialError;

// ---------------------------------------------------------------------------
// CellCoord
// ---------------------------------------------------------------------------

/// Integer coordinate of one grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellCoord {
    /// Cell index along x.
    pub x: i32,
    /// Cell index along y.
    pub y: i32,
    /// Cell index along z.
    pub z: i32,
}

// ---------------------------------------------------------------------------
// SpatialGrid
// ---------------------------------------------------------------------------

/// Uniform grid mapping cells to the entities whose bounds overlap them.
///
/// Per entity the grid is a two-state machine: unregistered entities accept
/// only [`insert`](Self::insert); registered entities accept
/// [`update`](Self::update) and [`remove`](Self::remove). Anything else is
/// an error.
#[derive(Debug)]
pub struct SpatialGrid {
    cell_size: f32,
    /// Cell -> entities overlapping it. Buckets are kept small and dense.
    cells: HashMap<CellCoord, Vec<EntityId>>,
    /// Entity -> bounds it is currently registered under.
    registered: HashMap<EntityId, Aabb>,
}

impl SpatialGrid {
    /// Create an empty grid with the given cell edge length.
    ///
    /// The cell size is fixed for the life of the grid; use
    /// [`repartition`](Self::repartition) to re-bucket under a new size.
    ///
    /// # Panics
    ///
    /// Panics if `cell_size` is not strictly positive and finite.
    pub fn new(cell_size: f32) -> Self {
        assert!(
            cell_size > 0.0 && cell_size.is_finite(),
            "cell size must be positive and finite, got {cell_size}"
        );
        Self {
            cell_size,
            cells: HashMap::new(),
            registered: HashMap::new(),
        }
    }

    /// The grid's cell edge length.
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Number of registered entities.
    pub fn len(&self) -> usize {
        self.registered.len()
    }

    /// Whether no entities are registered.
    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }

    /// Whether `entity` is currently registered.
    pub fn contains(&self, entity: EntityId) -> bool {
        self.registered.contains_key(&entity)
    }

    /// The bounds `entity` is registered under, if any.
    pub fn bounds(&self, entity: EntityId) -> Option<Aabb> {
        self.registered.get(&entity).copied()
    }

    /// The cell containing a world-space point.
    pub fn cell_of(&self, point: Vec3) -> CellCoord {
        CellCoord {
            x: (point.x / self.cell_size).floor() as i32,
            y: (point.y / self.cell_size).floor() as i32,
            z: (point.z / self.cell_size).floor() as i32,
        }
    }

    /// Inclusive cell range covered by `bounds`.
    fn cell_range(&self, bounds: &Aabb) -> (CellCoord, CellCoord) {
        (self.cell_of(bounds.min), self.cell_of(bounds.max))
    }

    /// Entities registered in one cell, if the cell has any.
    pub(crate) fn cell_entities(&self, cell: CellCoord) -> Option<&[EntityId]> {
        self.cells.get(&cell).map(|bucket| bucket.as_slice())
    }

    fn for_each_cell(lo: CellCoord, hi: CellCoord, mut f: impl FnMut(CellCoord)) {
        for x in lo.x..=hi.x {
            for y in lo.y..=hi.y {
                for z in lo.z..=hi.z {
                    f(CellCoord { x, y, z });
                }
            }
        }
    }

    fn add_to_cells(&mut self, entity: EntityId, bounds: &Aabb) {
        let (lo, hi) = self.cell_range(bounds);
        Self::for_each_cell(lo, hi, |cell| {
            self.cells.entry(cell).or_default().push(entity);
        });
    }

    fn remove_from_cells(&mut self, entity: EntityId, bounds: &Aabb) {
        let (lo, hi) = self.cell_range(bounds);
        Self::for_each_cell(lo, hi, |cell| {
            if let Some(bucket) = self.cells.get_mut(&cell) {
                if let Some(pos) = bucket.iter().position(|e| *e == entity) {
                    bucket.swap_remove(pos);
                }
                if bucket.is_empty() {
                    self.cells.remove(&cell);
                }
            }
        });
    }

    /// Register an entity under `bounds`.
    ///
    /// Fails with [`SpatialError::AlreadyRegistered`] if the entity is
    /// already in the grid -- use [`update`](Self::update) to move it.
    pub fn insert(&mut self, entity: EntityId, bounds: Aabb) -> Result<(), SpatialError> {
        if self.registered.contains_key(&entity) {
            return Err(SpatialError::AlreadyRegistered { entity });
        }
        self.add_to_cells(entity, &bounds);
        self.registered.insert(entity, bounds);
        Ok(())
    }

    /// Unregister an entity, returning the bounds it was registered under.
    ///
    /// Fails with [`SpatialError::NotRegistered`] for unknown entities.
    pub fn remove(&mut self, entity: EntityId) -> Result<Aabb, SpatialError> {
        let bounds = self
            .registered
            .remove(&entity)
            .ok_or(SpatialError::NotRegistered { entity })?;
        self.remove_from_cells(entity, &bounds);
        Ok(bounds)
    }

    /// Move a registered entity to `new_bounds`.
    ///
    /// Equivalent to remove-then-insert, but when the covered cell range is
    /// unchanged (the common case of small per-tick movement) only the stored
    /// bounds are rewritten. Fails with [`SpatialError::NotRegistered`] for
    /// unknown entities.
    pub fn update(&mut self, entity: EntityId, new_bounds: Aabb) -> Result<(), SpatialError> {
        let old_bounds = *self
            .registered
            .get(&entity)
            .ok_or(SpatialError::NotRegistered { entity })?;

        if self.cell_range(&old_bounds) != self.cell_range(&new_bounds) {
            self.remove_from_cells(entity, &old_bounds);
            self.add_to_cells(entity, &new_bounds);
        }
        self.registered.insert(entity, new_bounds);
        Ok(())
    }

    /// All entities registered in any cell overlapping `region`.
    ///
    /// The result is deduplicated and sorted by raw entity id, so identical
    /// grid states produce identical candidate orderings. May contain false
    /// positives (cell overlap without bounds overlap); never misses an
    /// entity whose registered bounds overlap `region`. An empty grid or a
    /// region outside all cells yields an empty set, never an error.
    pub fn query_region(&self, region: &Aabb) -> Vec<EntityId> {
        let (lo, hi) = self.cell_range(region);
        let mut out = Vec::new();
        Self::for_each_cell(lo, hi, |cell| {
            if let Some(bucket) = self.cells.get(&cell) {
                out.extend_from_slice(bucket);
            }
        });
        out.sort_unstable_by_key(|e| e.to_raw());
        out.dedup_by_key(|e| e.to_raw());
        out
    }

    /// Re-bucket every registered entity under a new cell size.
    ///
    /// # Panics
    ///
    /// Panics if `new_cell_size` is not strictly positive and finite.
    pub fn repartition(&mut self, new_cell_size: f32) {
        assert!(
            new_cell_size > 0.0 && new_cell_size.is_finite(),
            "cell size must be positive and finite, got {new_cell_size}"
        );
        debug!(
            old = self.cell_size,
            new = new_cell_size,
            entities = self.registered.len(),
            "repartitioning spatial grid"
        );
        self.cell_size = new_cell_size;
        self.cells.clear();
        let entries: Vec<(EntityId, Aabb)> = self
            .registered
            .iter()
            .map(|(e, b)| (*e, *b))
            .collect();
        for (entity, bounds) in entries {
            self.add_to_cells(entity, &bounds);
        }
    }

    /// Discard all state and re-register from a fresh `(entity, bounds)`
    /// scan. Later entries win when an entity appears more than once.
    pub fn rebuild<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (EntityId, Aabb)>,
    {
        self.cells.clear();
        self.registered.clear();
        for (entity, bounds) in entries {
            if self.registered.contains_key(&entity) {
                self.remove(entity).expect("entity was just seen");
            }
            self.insert(entity, bounds)
                .expect("entity cannot be registered after the clear");
        }
        debug!(entities = self.registered.len(), "rebuilt spatial grid");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
