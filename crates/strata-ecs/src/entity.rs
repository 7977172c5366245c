//! Entity identifiers and slot allocation.
//!
//! An [`EntityId`] is an opaque 64-bit handle: the low 32 bits are an index
//! into the allocator's slot table, the high 32 bits are that slot's
//! *generation* at allocation time. Destroying an entity bumps the slot's
//! generation, so any handle still pointing at the old incarnation fails
//! lookups instead of aliasing whatever reuses the slot.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// A generational entity identifier.
///
/// Layout: `[generation: u32 | index: u32]`. Safe to store, compare, and pass
/// across module boundaries; equality means "same slot, same incarnation".
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Construct an `EntityId` from an index and generation.
    #[inline]
    pub fn new(index: u32, generation: u32) -> Self {
        Self((generation as u64) << 32 | index as u64)
    }

    /// The slot index (low 32 bits).
    #[inline]
    pub fn index(self) -> u32 {
        self.0 as u32
    }

    /// The generation (high 32 bits).
    #[inline]
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Raw `u64` representation, usable as a map key or sort key.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// Reconstruct from a raw `u64` previously obtained via [`to_raw`](Self::to_raw).
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({}v{})", self.index(), self.generation())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}

// ---------------------------------------------------------------------------
// EntityAllocator
// ---------------------------------------------------------------------------

/// One index slot in the allocator table.
#[derive(Debug, Clone, Copy)]
struct Slot {
    /// Generation the slot is currently on. Bumped on every deallocation.
    generation: u32,
    /// Whether the slot currently backs a live entity.
    alive: bool,
}

/// Allocates and recycles [`EntityId`]s with generational staleness tracking.
///
/// Freed indices go into a FIFO queue so reuse is spread across slots instead
/// of hammering the generation counter of a single hot index.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    slots: Vec<Slot>,
    free_indices: VecDeque<u32>,
}

impl EntityAllocator {
    /// Create a new, empty allocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh [`EntityId`]. Never fails.
    ///
    /// A recycled index is reused with its already-bumped generation when one
    /// is available; otherwise a brand-new slot is appended.
    pub fn allocate(&mut self) -> EntityId {
        if let Some(index) = self.free_indices.pop_front() {
            let slot = &mut self.slots[index as usize];
            slot.alive = true;
            EntityId::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                alive: true,
            });
            EntityId::new(index, 0)
        }
    }

    /// Deallocate an entity, bumping the slot generation so outstanding
    /// handles turn stale immediately.
    ///
    /// Returns `true` if the entity was alive with a matching generation,
    /// `false` for stale or already-dead handles.
    pub fn deallocate(&mut self, id: EntityId) -> bool {
        let Some(slot) = self.slots.get_mut(id.index() as usize) else {
            return false;
        };
        if !slot.alive || slot.generation != id.generation() {
            return false;
        }
        slot.alive = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_indices.push_back(id.index());
        true
    }

    /// Whether `id` refers to a currently live entity with a matching
    /// generation.
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.slots
            .get(id.index() as usize)
            .is_some_and(|slot| slot.alive && slot.generation == id.generation())
    }

    /// Number of currently live entities.
    pub fn alive_count(&self) -> usize {
        self.slots.iter().filter(|s| s.alive).count()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
