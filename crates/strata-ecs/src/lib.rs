//! Strata ECS -- archetype-based entity storage for a voxel-game simulation.
//!
//! Entities are grouped by their exact component-type set into *archetypes*,
//! each stored Structure-of-Arrays: one contiguous column per component type,
//! so per-frame systems iterate dense arrays instead of chasing pointers.
//! Generational entity ids catch stale handles immediately, and all
//! structural changes (spawn, despawn, component add/remove) flow through the
//! [`World`](world::World)'s migration engine, which keeps the entity
//! directory and every storage block consistent.
//!
//! # Quick Start
//!
//! ```
//! use strata_ecs::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Position { x: f32, y: f32, z: f32 }
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Velocity { dx: f32, dy: f32, dz: f32 }
//!
//! let mut world = World::new();
//! world.register_component::<Position>("position");
//! world.register_component::<Velocity>("velocity");
//!
//! let mut bundle = ComponentBundle::new();
//! bundle.add(world.registry(), Position { x: 0.0, y: 0.0, z: 0.0 });
//! bundle.add(world.registry(), Velocity { dx: 1.0, dy: 0.0, dz: 0.0 });
//! let entity = world.spawn_bundle(bundle);
//!
//! for (_entity, (pos, vel)) in world.query_mut::<(&mut Position, &Velocity)>() {
//!     pos.x += vel.dx;
//! }
//! assert_eq!(world.get_component::<Position>(entity).unwrap().x, 1.0);
//! ```

#![deny(unsafe_code)]

#[allow(unsafe_code)]
pub mod archetype;
#[allow(unsafe_code)]
pub mod command;
#[allow(unsafe_code)]
pub mod component;
pub mod entity;
#[allow(unsafe_code)]
pub mod query;
#[allow(unsafe_code)]
pub mod world;

use archetype::ArchetypeId;
use entity::EntityId;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by ECS operations.
///
/// Every variant is a recoverable, caller-decidable condition; resource
/// exhaustion inside the allocator itself is the only fatal path and aborts
/// through the global allocation error handler instead.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// The entity does not exist: never allocated, already destroyed, or a
    /// stale handle whose slot was recycled (generation mismatch).
    #[error("entity {entity} does not exist (destroyed or stale handle)")]
    EntityNotFound {
        /// The offending handle.
        entity: EntityId,
    },

    /// A component type was used without being registered first.
    #[error("component type '{name}' not registered; registered: [{registered}]")]
    UnknownComponent {
        /// Rust type name of the unregistered component.
        name: String,
        /// Names of the currently registered component types.
        registered: String,
    },

    /// A removal named a component the entity does not have.
    #[error("entity {entity} has no '{component}' component")]
    MissingComponent {
        /// The entity that was targeted.
        entity: EntityId,
        /// Registered name of the missing component type.
        component: String,
    },

    /// A row append supplied a component set that is not exactly the
    /// archetype's declared set.
    #[error("component set {supplied} does not match archetype {archetype:?} columns {expected}")]
    SchemaMismatch {
        /// The archetype whose schema was violated.
        archetype: ArchetypeId,
        /// The archetype's declared component set.
        expected: String,
        /// The component set the caller supplied.
        supplied: String,
    },

    /// A column access requested a type the archetype does not store.
    #[error("archetype {archetype:?} has no column matching type {requested}")]
    ColumnTypeMismatch {
        /// The archetype that was queried.
        archetype: ArchetypeId,
        /// Rust type name the caller requested.
        requested: String,
    },

    /// Column growth would overflow the addressable allocation size.
    #[error("column '{component}' cannot grow to {requested} rows")]
    CapacityExceeded {
        /// Registered name of the column's component type.
        component: String,
        /// The capacity that could not be allocated.
        requested: usize,
    },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::archetype::{Archetype, ArchetypeId};
    pub use crate::command::{ApplyReport, CommandBuffer};
    pub use crate::component::{ComponentInfo, ComponentRegistry, ComponentTypeId};
    pub use crate::entity::EntityId;
    pub use crate::query::{MatchedArchetypes, Query, QueryFilter, QueryItem, QueryIter};
    pub use crate::world::{ComponentBundle, World};
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Integration tests
// ---------------------------------------------------------------------------
