//! The [`World`]: entity directory, archetype store, and migration engine.
//!
//! The world owns the entity allocator, the component registry, and every
//! archetype storage block. The `entity -> (archetype, row)` directory it
//! maintains is the single source of truth for entity placement: every
//! structural operation (spawn, despawn, component add/remove) updates the
//! directory for both the affected entity and any entity displaced by a
//! swap-remove before returning, so callers never observe a half-migrated
//! state.
//!
//! There is exactly one world per simulation. It is a plain owned value --
//! create it at startup and pass `&`/`&mut` into every system; nothing here
//! is global.
// Note: unsafe_code is allowed on this module via #[allow(unsafe_code)] in lib.rs

use std::collections::HashMap;

use tracing::debug;

use crate::archetype::{Archetype, ArchetypeId, RawComponentBuf};
use crate::component::{ComponentRegistry, ComponentTypeId, ComponentVtable};
use crate::entity::{EntityAllocator, EntityId};
use crate::EcsError;

// ---------------------------------------------------------------------------
// EntityLocation
// ---------------------------------------------------------------------------

/// Where an entity lives: which archetype, and which row within it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EntityLocation {
    pub(crate) archetype_id: ArchetypeId,
    pub(crate) row: usize,
}

// ---------------------------------------------------------------------------
// ComponentBundle
// ---------------------------------------------------------------------------

/// A set of component values to attach in one operation, used by
/// [`World::spawn_bundle`] and [`World::insert_bundle`].
///
/// ```ignore
/// let mut bundle = ComponentBundle::new();
/// bundle.add(world.registry(), Position { x: 0.0, y: 0.0, z: 0.0 });
/// bundle.add(world.registry(), Velocity { dx: 1.0, dy: 0.0, dz: 0.0 });
/// let entity = world.spawn_bundle(bundle);
/// ```
pub struct ComponentBundle {
    entries: Vec<(ComponentTypeId, RawComponentBuf, ComponentVtable)>,
}

impl ComponentBundle {
    /// Create an empty bundle.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add a component value. The type must already be registered.
    ///
    /// # Panics
    ///
    /// Panics if the type is not registered, or if the bundle already holds a
    /// value of the same type -- both are programming errors at the call
    /// site.
    pub fn add<T>(&mut self, registry: &ComponentRegistry, value: T)
    where
        T: Send + Sync + 'static,
    {
        let type_id = registry
            .lookup::<T>()
            .expect("component type not registered -- call register_component::<T>() first");
        if self.entries.iter().any(|(id, _, _)| *id == type_id) {
            panic!("duplicate component type {type_id:?} in ComponentBundle");
        }
        let vtable = registry
            .get_vtable(type_id)
            .expect("registered component has a vtable")
            .clone();
        self.entries
            .push((type_id, RawComponentBuf::from_value(value), vtable));
    }

    /// Number of components in the bundle.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the bundle holds no components.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The sorted component-type set of this bundle.
    pub(crate) fn type_ids(&self) -> Vec<ComponentTypeId> {
        let mut ids: Vec<_> = self.entries.iter().map(|(id, _, _)| *id).collect();
        ids.sort();
        ids
    }

    /// Consume the bundle; the caller takes ownership of the buffered values.
    pub(crate) fn into_parts(mut self) -> Vec<(ComponentTypeId, RawComponentBuf, ComponentVtable)> {
        self.entries.drain(..).collect()
    }
}

impl Default for ComponentBundle {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ComponentBundle {
    fn drop(&mut self) {
        // Run destructors for values that never made it into a column.
        for (_id, mut buf, vtable) in self.entries.drain(..) {
            unsafe {
                buf.drop_value(&vtable);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// The top-level ECS container: allocator, registry, archetypes, directory.
pub struct World {
    pub(crate) allocator: EntityAllocator,
    pub(crate) registry: ComponentRegistry,
    /// All archetypes, indexed by `ArchetypeId.0`; append-only, so index
    /// order is creation order.
    pub(crate) archetypes: Vec<Archetype>,
    /// Sorted component-type set -> archetype.
    archetype_index: HashMap<Vec<ComponentTypeId>, ArchetypeId>,
    /// Entity -> (archetype, row). The single source of truth for placement.
    pub(crate) locations: HashMap<EntityId, EntityLocation>,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entity_count", &self.locations.len())
            .field("archetype_count", &self.archetypes.len())
            .finish()
    }
}

impl World {
    /// Create a new, empty world.
    pub fn new() -> Self {
        Self {
            allocator: EntityAllocator::new(),
            registry: ComponentRegistry::new(),
            archetypes: Vec::new(),
            archetype_index: HashMap::new(),
            locations: HashMap::new(),
        }
    }

    /// Read-only access to the component registry.
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Register a component type under `name`, returning its id.
    pub fn register_component<T>(&mut self, name: &str) -> ComponentTypeId
    where
        T: Send + Sync + 'static,
    {
        self.registry.register::<T>(name)
    }

    // -- archetype management -----------------------------------------------

    /// Find or create the archetype for a sorted component-type set.
    fn get_or_create_archetype(&mut self, type_ids: &[ComponentTypeId]) -> ArchetypeId {
        if let Some(&id) = self.archetype_index.get(type_ids) {
            return id;
        }
        let id = ArchetypeId(self.archetypes.len() as u32);
        let specs = type_ids
            .iter()
            .map(|tid| {
                (
                    self.registry
                        .get_info(*tid)
                        .expect("component type not registered")
                        .clone(),
                    self.registry
                        .get_vtable(*tid)
                        .expect("component type not registered")
                        .clone(),
                )
            })
            .collect();
        debug!(archetype = ?id, components = ?type_ids, "created archetype");
        self.archetypes.push(Archetype::new(id, specs));
        self.archetype_index.insert(type_ids.to_vec(), id);
        id
    }

    /// Borrow an archetype by id. Valid for handles produced by this world.
    pub fn archetype(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id.0 as usize)
    }

    /// Mutably borrow an archetype by id, for batch column writes.
    pub fn archetype_mut(&mut self, id: ArchetypeId) -> Option<&mut Archetype> {
        self.archetypes.get_mut(id.0 as usize)
    }

    /// Iterate all archetypes in creation order.
    pub fn archetypes(&self) -> impl Iterator<Item = &Archetype> {
        self.archetypes.iter()
    }

    /// Assign (or clear) the query-ordering priority of an archetype.
    /// Unknown ids are ignored.
    pub fn set_archetype_priority(&mut self, id: ArchetypeId, priority: Option<i32>) {
        if let Some(archetype) = self.archetypes.get_mut(id.0 as usize) {
            archetype.set_priority(priority);
        }
    }

    // -- entity lifecycle ---------------------------------------------------

    /// Spawn an entity with no components (it lives in the empty archetype).
    /// Never fails.
    pub fn spawn_empty(&mut self) -> EntityId {
        self.spawn_bundle(ComponentBundle::new())
    }

    /// Spawn a new entity from a [`ComponentBundle`].
    pub fn spawn_bundle(&mut self, bundle: ComponentBundle) -> EntityId {
        let entity = self.allocator.allocate();
        let type_ids = bundle.type_ids();
        let archetype_id = self.get_or_create_archetype(&type_ids);
        let row = self
            .place_row(entity, archetype_id, bundle.into_parts())
            .expect("bundle components match the archetype resolved from them");
        self.locations
            .insert(entity, EntityLocation { archetype_id, row });
        entity
    }

    /// Spawn a new entity with a single component.
    pub fn spawn_with<T>(&mut self, component: T) -> EntityId
    where
        T: Send + Sync + 'static,
    {
        let mut bundle = ComponentBundle::new();
        bundle.add(&self.registry, component);
        self.spawn_bundle(bundle)
    }

    /// Despawn an entity: swap-remove its row, fix the displaced entity's
    /// directory entry, and recycle the id.
    pub fn despawn(&mut self, entity: EntityId) -> Result<(), EcsError> {
        if !self.allocator.is_alive(entity) {
            return Err(EcsError::EntityNotFound { entity });
        }
        let loc = self
            .locations
            .remove(&entity)
            .ok_or(EcsError::EntityNotFound { entity })?;

        let moved = self.archetypes[loc.archetype_id.0 as usize].remove_row(loc.row);
        if let Some(moved_entity) = moved {
            if let Some(moved_loc) = self.locations.get_mut(&moved_entity) {
                moved_loc.row = loc.row;
            }
        }
        self.allocator.deallocate(entity);
        Ok(())
    }

    /// Whether `entity` is currently alive (generation matches).
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.allocator.is_alive(entity)
    }

    /// O(1) lookup of an entity's current archetype and row.
    pub fn locate(&self, entity: EntityId) -> Result<(ArchetypeId, usize), EcsError> {
        self.locations
            .get(&entity)
            .map(|loc| (loc.archetype_id, loc.row))
            .ok_or(EcsError::EntityNotFound { entity })
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.locations.len()
    }

    /// Number of archetypes created so far.
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    // -- component access ---------------------------------------------------

    /// Immutable reference to a component on an entity.
    pub fn get_component<T: 'static>(&self, entity: EntityId) -> Option<&T> {
        let loc = self.locations.get(&entity)?;
        let type_id = self.registry.lookup::<T>()?;
        self.archetypes[loc.archetype_id.0 as usize].get::<T>(loc.row, type_id)
    }

    /// Mutable reference to a component on an entity.
    pub fn get_component_mut<T: 'static>(&mut self, entity: EntityId) -> Option<&mut T> {
        let loc = *self.locations.get(&entity)?;
        let type_id = self.registry.lookup::<T>()?;
        self.archetypes[loc.archetype_id.0 as usize].get_mut::<T>(loc.row, type_id)
    }

    /// Whether an entity currently has a component of type `T`.
    pub fn has_component<T: 'static>(&self, entity: EntityId) -> bool {
        let Some(loc) = self.locations.get(&entity) else {
            return false;
        };
        let Some(type_id) = self.registry.lookup::<T>() else {
            return false;
        };
        self.archetypes[loc.archetype_id.0 as usize].has_component(type_id)
    }

    // -- migration ----------------------------------------------------------

    fn unknown_component<T>(&self) -> EcsError {
        EcsError::UnknownComponent {
            name: std::any::type_name::<T>().to_owned(),
            registered: self.registry.registered_names().join(", "),
        }
    }

    /// Append a row built from buffered values. On failure the values are
    /// dropped and the target archetype is left untouched.
    fn place_row(
        &mut self,
        entity: EntityId,
        archetype_id: ArchetypeId,
        parts: Vec<(ComponentTypeId, RawComponentBuf, ComponentVtable)>,
    ) -> Result<usize, EcsError> {
        let ptrs: Vec<(ComponentTypeId, *const u8)> = parts
            .iter()
            .map(|(id, buf, _)| (*id, buf.as_ptr()))
            .collect();
        let result =
            unsafe { self.archetypes[archetype_id.0 as usize].append_row(entity, &ptrs) };
        match result {
            Ok(row) => {
                // Values now live in the columns; dropping the parts only
                // frees the staging buffers.
                drop(parts);
                Ok(row)
            }
            Err(e) => {
                for (_id, mut buf, vtable) in parts {
                    unsafe {
                        buf.drop_value(&vtable);
                    }
                }
                Err(e)
            }
        }
    }

    /// Insert a component on an entity. If the type is already present the
    /// value is overwritten in place; otherwise the entity migrates to the
    /// archetype for its extended component set.
    ///
    /// The migration is all-or-nothing: the destination archetype is resolved
    /// and its capacity reserved before the source row is touched, so on
    /// failure the entity keeps its prior component set.
    pub fn insert_component<T>(&mut self, entity: EntityId, value: T) -> Result<(), EcsError>
    where
        T: Send + Sync + 'static,
    {
        let Some(type_id) = self.registry.lookup::<T>() else {
            return Err(self.unknown_component::<T>());
        };
        let vtable = self
            .registry
            .get_vtable(type_id)
            .expect("registered component has a vtable")
            .clone();
        self.insert_component_raw(entity, type_id, RawComponentBuf::from_value(value), vtable)
    }

    /// Type-erased insert used by [`insert_component`](Self::insert_component)
    /// and the command buffer. Takes ownership of `value` and disposes of it
    /// correctly on every path.
    pub(crate) fn insert_component_raw(
        &mut self,
        entity: EntityId,
        type_id: ComponentTypeId,
        mut value: RawComponentBuf,
        vtable: ComponentVtable,
    ) -> Result<(), EcsError> {
        let loc = match self.locations.get(&entity) {
            Some(loc) => *loc,
            None => {
                unsafe {
                    value.drop_value(&vtable);
                }
                return Err(EcsError::EntityNotFound { entity });
            }
        };

        let archetype = &mut self.archetypes[loc.archetype_id.0 as usize];
        if archetype.has_component(type_id) {
            // Same component set -- overwrite the slot in place.
            unsafe {
                let slot = archetype
                    .get_raw_mut(loc.row, type_id)
                    .expect("directory row is live");
                if vtable.size > 0 {
                    (vtable.drop_fn)(slot);
                    std::ptr::copy_nonoverlapping(value.as_ptr(), slot, vtable.size);
                }
            }
            // Bytes were moved into the column; `value` only frees staging.
            return Ok(());
        }

        let mut new_types = archetype.component_types().to_vec();
        new_types.push(type_id);
        new_types.sort();

        let dest = self.get_or_create_archetype(&new_types);
        if let Err(e) = self.archetypes[dest.0 as usize].reserve_row() {
            unsafe {
                value.drop_value(&vtable);
            }
            return Err(e);
        }

        let (mut parts, moved) = self.archetypes[loc.archetype_id.0 as usize].extract_row(loc.row);
        if let Some(moved_entity) = moved {
            if let Some(moved_loc) = self.locations.get_mut(&moved_entity) {
                moved_loc.row = loc.row;
            }
        }
        parts.push((type_id, value, vtable));

        let row = self
            .place_row(entity, dest, parts)
            .expect("destination schema and capacity were resolved up front");
        self.locations.insert(
            entity,
            EntityLocation {
                archetype_id: dest,
                row,
            },
        );
        Ok(())
    }

    /// Insert several components in a single migration. Types the entity
    /// already has are overwritten; new types extend the component set. The
    /// entity moves through no intermediate archetypes.
    pub fn insert_bundle(&mut self, entity: EntityId, bundle: ComponentBundle) -> Result<(), EcsError> {
        let loc = match self.locations.get(&entity) {
            Some(loc) => *loc,
            // Bundle drop runs the buffered values' destructors.
            None => return Err(EcsError::EntityNotFound { entity }),
        };
        if bundle.is_empty() {
            return Ok(());
        }

        let mut new_types = self.archetypes[loc.archetype_id.0 as usize]
            .component_types()
            .to_vec();
        for id in bundle.type_ids() {
            if !new_types.contains(&id) {
                new_types.push(id);
            }
        }
        new_types.sort();

        let dest = self.get_or_create_archetype(&new_types);
        self.archetypes[dest.0 as usize].reserve_row()?;

        let (mut parts, moved) = self.archetypes[loc.archetype_id.0 as usize].extract_row(loc.row);
        if let Some(moved_entity) = moved {
            if let Some(moved_loc) = self.locations.get_mut(&moved_entity) {
                moved_loc.row = loc.row;
            }
        }
        // Bundle values win over extracted ones for overlapping types.
        for (type_id, buf, vtable) in bundle.into_parts() {
            if let Some(existing) = parts.iter_mut().find(|(id, _, _)| *id == type_id) {
                unsafe {
                    existing.1.drop_value(&existing.2);
                }
                existing.1 = buf;
                existing.2 = vtable;
            } else {
                parts.push((type_id, buf, vtable));
            }
        }

        let row = self
            .place_row(entity, dest, parts)
            .expect("destination schema and capacity were resolved up front");
        self.locations.insert(
            entity,
            EntityLocation {
                archetype_id: dest,
                row,
            },
        );
        Ok(())
    }

    /// Remove a component type from an entity, migrating it to the archetype
    /// for the reduced set. Fails with [`EcsError::MissingComponent`] when
    /// the entity does not have the component.
    pub fn remove_component<T>(&mut self, entity: EntityId) -> Result<(), EcsError>
    where
        T: Send + Sync + 'static,
    {
        let Some(type_id) = self.registry.lookup::<T>() else {
            return Err(self.unknown_component::<T>());
        };
        self.remove_component_by_id(entity, type_id)
    }

    /// Type-erased removal used by [`remove_component`](Self::remove_component)
    /// and the command buffer.
    pub(crate) fn remove_component_by_id(
        &mut self,
        entity: EntityId,
        type_id: ComponentTypeId,
    ) -> Result<(), EcsError> {
        let loc = *self
            .locations
            .get(&entity)
            .ok_or(EcsError::EntityNotFound { entity })?;

        let archetype = &self.archetypes[loc.archetype_id.0 as usize];
        if !archetype.has_component(type_id) {
            let component = self
                .registry
                .get_info(type_id)
                .map(|info| info.name.clone())
                .unwrap_or_else(|| format!("{type_id:?}"));
            return Err(EcsError::MissingComponent { entity, component });
        }

        let new_types: Vec<_> = archetype
            .component_types()
            .iter()
            .copied()
            .filter(|id| *id != type_id)
            .collect();

        let dest = self.get_or_create_archetype(&new_types);
        self.archetypes[dest.0 as usize].reserve_row()?;

        let (parts, moved) = self.archetypes[loc.archetype_id.0 as usize].extract_row(loc.row);
        if let Some(moved_entity) = moved {
            if let Some(moved_loc) = self.locations.get_mut(&moved_entity) {
                moved_loc.row = loc.row;
            }
        }

        let mut kept = Vec::with_capacity(parts.len().saturating_sub(1));
        for (id, mut buf, vtable) in parts {
            if id == type_id {
                unsafe {
                    buf.drop_value(&vtable);
                }
            } else {
                kept.push((id, buf, vtable));
            }
        }

        let row = self
            .place_row(entity, dest, kept)
            .expect("destination schema and capacity were resolved up front");
        self.locations.insert(
            entity,
            EntityLocation {
                archetype_id: dest,
                row,
            },
        );
        Ok(())
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
