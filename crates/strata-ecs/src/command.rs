//! Deferred structural mutations via a command buffer.
//!
//! Systems iterating archetype columns cannot spawn, despawn, or migrate
//! entities mid-iteration -- structural mutation invalidates the very slices
//! they are reading. A [`CommandBuffer`] records those mutations during the
//! tick and applies them at a sync point, in FIFO order, once all column
//! borrows are released.
//!
//! Failed commands (stale entity, missing component) are skipped with a
//! warning rather than aborting the batch: by the time a deferred command
//! runs, the world may legitimately have moved on.
//!
//! ```ignore
//! let mut cmds = CommandBuffer::new();
//! for (entity, (health,)) in world.query::<(&Health,)>() {
//!     if health.current <= 0.0 {
//!         cmds.despawn(entity);
//!     }
//! }
//! let report = cmds.apply(&mut world);
//! ```

use tracing::warn;

use crate::archetype::RawComponentBuf;
use crate::component::{ComponentRegistry, ComponentTypeId, ComponentVtable};
use crate::entity::EntityId;
use crate::world::{ComponentBundle, World};
use crate::EcsError;

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// One recorded mutation.
enum Command {
    /// Spawn a new entity with the bundled components.
    Spawn { bundle: ComponentBundle },
    /// Despawn an entity.
    Despawn { entity: EntityId },
    /// Insert (or overwrite) one component on an entity.
    Insert {
        entity: EntityId,
        type_id: ComponentTypeId,
        value: RawComponentBuf,
        vtable: ComponentVtable,
    },
    /// Remove one component from an entity.
    Remove {
        entity: EntityId,
        type_id: ComponentTypeId,
    },
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Spawn { bundle } => f
                .debug_struct("Spawn")
                .field("components", &bundle.len())
                .finish(),
            Command::Despawn { entity } => {
                f.debug_struct("Despawn").field("entity", entity).finish()
            }
            Command::Insert {
                entity, type_id, ..
            } => f
                .debug_struct("Insert")
                .field("entity", entity)
                .field("type_id", type_id)
                .finish(),
            Command::Remove { entity, type_id } => f
                .debug_struct("Remove")
                .field("entity", entity)
                .field("type_id", type_id)
                .finish(),
        }
    }
}

// ---------------------------------------------------------------------------
// ApplyReport
// ---------------------------------------------------------------------------

/// Outcome of draining a command buffer into the world.
#[derive(Debug, Default)]
pub struct ApplyReport {
    /// Entities created by `Spawn` commands, in application order.
    pub spawned: Vec<EntityId>,
    /// Commands that applied successfully.
    pub applied: usize,
    /// Commands skipped because they failed (stale entity, missing
    /// component); each skip is logged.
    pub skipped: usize,
}

// ---------------------------------------------------------------------------
// CommandBuffer
// ---------------------------------------------------------------------------

/// Records deferred mutations for later application to a [`World`].
#[derive(Debug, Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
}

impl CommandBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record spawning a new entity with the bundled components.
    pub fn spawn(&mut self, bundle: ComponentBundle) {
        self.commands.push(Command::Spawn { bundle });
    }

    /// Record despawning an entity.
    pub fn despawn(&mut self, entity: EntityId) {
        self.commands.push(Command::Despawn { entity });
    }

    /// Record inserting (or overwriting) a component on an entity.
    ///
    /// The component type must be registered so the value can be staged
    /// type-erased until application.
    pub fn insert<T>(
        &mut self,
        registry: &ComponentRegistry,
        entity: EntityId,
        value: T,
    ) -> Result<(), EcsError>
    where
        T: Send + Sync + 'static,
    {
        let type_id = registry
            .lookup::<T>()
            .ok_or_else(|| EcsError::UnknownComponent {
                name: std::any::type_name::<T>().to_owned(),
                registered: registry.registered_names().join(", "),
            })?;
        let vtable = registry
            .get_vtable(type_id)
            .expect("registered component has a vtable")
            .clone();
        self.commands.push(Command::Insert {
            entity,
            type_id,
            value: RawComponentBuf::from_value(value),
            vtable,
        });
        Ok(())
    }

    /// Record removing a component from an entity.
    pub fn remove<T>(
        &mut self,
        registry: &ComponentRegistry,
        entity: EntityId,
    ) -> Result<(), EcsError>
    where
        T: Send + Sync + 'static,
    {
        let type_id = registry
            .lookup::<T>()
            .ok_or_else(|| EcsError::UnknownComponent {
                name: std::any::type_name::<T>().to_owned(),
                registered: registry.registered_names().join(", "),
            })?;
        self.commands.push(Command::Remove { entity, type_id });
        Ok(())
    }

    /// Number of recorded commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the buffer holds no commands.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Drain the buffer into the world, applying commands in FIFO order.
    ///
    /// Failed commands are skipped (and logged); the rest still apply.
    pub fn apply(&mut self, world: &mut World) -> ApplyReport {
        let mut report = ApplyReport::default();
        for command in self.commands.drain(..) {
            let result: Result<(), EcsError> = match command {
                Command::Spawn { bundle } => {
                    let entity = world.spawn_bundle(bundle);
                    report.spawned.push(entity);
                    Ok(())
                }
                Command::Despawn { entity } => world.despawn(entity),
                Command::Insert {
                    entity,
                    type_id,
                    value,
                    vtable,
                } => world.insert_component_raw(entity, type_id, value, vtable),
                Command::Remove { entity, type_id } => {
                    world.remove_component_by_id(entity, type_id)
                }
            };
            match result {
                Ok(()) => report.applied += 1,
                Err(error) => {
                    warn!(%error, "skipped deferred command");
                    report.skipped += 1;
                }
            }
        }
        report
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        // Run destructors for staged insert values that were never applied.
        // (Spawn bundles clean up through ComponentBundle's own Drop.)
        for command in self.commands.drain(..) {
            if let Command::Insert {
                mut value, vtable, ..
            } = command
            {
                #[allow(unsafe_code)]
                unsafe {
                    value.drop_value(&vtable);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Pos {
        x: f32,
        y: f32,
        z: f32,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Vel {
        dx: f32,
        dy: f32,
        dz: f32,
    }

    fn pos(x: f32) -> Pos {
        Pos { x, y: 0.0, z: 0.0 }
    }

    fn setup_world() -> World {
        let mut world = World::new();
        world.register_component::<Pos>("position");
        world.register_component::<Vel>("velocity");
        world
    }

    #[test]
    fn spawn_command_creates_entity() {
        let mut world = setup_world();
        let mut cmds = CommandBuffer::new();

        let mut bundle = ComponentBundle::new();
        bundle.add(world.registry(), pos(1.0));
        cmds.spawn(bundle);

        let report = cmds.apply(&mut world);
        assert_eq!(report.applied, 1);
        assert_eq!(report.spawned.len(), 1);
        assert_eq!(world.get_component::<Pos>(report.spawned[0]), Some(&pos(1.0)));
    }

    #[test]
    fn insert_and_remove_commands_migrate() {
        let mut world = setup_world();
        let e = world.spawn_with(pos(0.0));

        let mut cmds = CommandBuffer::new();
        cmds.insert(world.registry(), e, Vel { dx: 1.0, dy: 0.0, dz: 0.0 })
            .unwrap();
        let report = cmds.apply(&mut world);
        assert_eq!(report.applied, 1);
        assert!(world.has_component::<Vel>(e));

        let mut cmds = CommandBuffer::new();
        cmds.remove::<Vel>(world.registry(), e).unwrap();
        cmds.apply(&mut world);
        assert!(!world.has_component::<Vel>(e));
    }

    #[test]
    fn commands_apply_in_fifo_order() {
        let mut world = setup_world();
        let e = world.spawn_with(pos(0.0));

        let mut cmds = CommandBuffer::new();
        cmds.insert(world.registry(), e, pos(1.0)).unwrap();
        cmds.insert(world.registry(), e, pos(2.0)).unwrap();
        cmds.apply(&mut world);

        // Last write wins.
        assert_eq!(world.get_component::<Pos>(e), Some(&pos(2.0)));
    }

    #[test]
    fn failed_commands_are_skipped_not_fatal() {
        let mut world = setup_world();
        let alive = world.spawn_with(pos(0.0));
        let dead = world.spawn_with(pos(1.0));
        world.despawn(dead).unwrap();

        let mut cmds = CommandBuffer::new();
        cmds.insert(world.registry(), dead, Vel { dx: 1.0, dy: 0.0, dz: 0.0 })
            .unwrap();
        cmds.despawn(dead);
        cmds.insert(world.registry(), alive, Vel { dx: 2.0, dy: 0.0, dz: 0.0 })
            .unwrap();

        let report = cmds.apply(&mut world);
        assert_eq!(report.applied, 1);
        assert_eq!(report.skipped, 2);
        assert!(world.has_component::<Vel>(alive));
    }

    #[test]
    fn despawn_via_command() {
        let mut world = setup_world();
        let e = world.spawn_with(pos(0.0));

        let mut cmds = CommandBuffer::new();
        cmds.despawn(e);
        let report = cmds.apply(&mut world);
        assert_eq!(report.applied, 1);
        assert!(!world.is_alive(e));
    }

    #[test]
    fn buffer_drains_on_apply() {
        let mut world = setup_world();
        let mut cmds = CommandBuffer::new();
        cmds.spawn(ComponentBundle::new());
        assert_eq!(cmds.len(), 1);
        cmds.apply(&mut world);
        assert!(cmds.is_empty());
        // Re-applying an empty buffer is a no-op.
        let report = cmds.apply(&mut world);
        assert_eq!(report.applied, 0);
    }

    #[test]
    fn unapplied_insert_values_are_dropped() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static DROPS: AtomicUsize = AtomicUsize::new(0);

        #[derive(Clone)]
        struct Counted(#[allow(dead_code)] u8);
        impl Drop for Counted {
            fn drop(&mut self) {
                DROPS.fetch_add(1, Ordering::SeqCst);
            }
        }

        let mut world = World::new();
        world.register_component::<Counted>("counted");
        let e = world.spawn_empty();

        DROPS.store(0, Ordering::SeqCst);
        {
            let mut cmds = CommandBuffer::new();
            cmds.insert(world.registry(), e, Counted(0)).unwrap();
            // Dropped without apply.
        }
        assert_eq!(DROPS.load(Ordering::SeqCst), 1);
    }
}
