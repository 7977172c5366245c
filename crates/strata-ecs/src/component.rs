//! Component type registration and metadata.
//!
//! Every component type must be registered in a [`ComponentRegistry`] before
//! it can be stored. Registration assigns a [`ComponentTypeId`] -- the key
//! used for archetype column lookups and query matching -- and records the
//! type's shape (size, alignment, Rust `TypeId`) together with the
//! type-erased operations ([`ComponentVtable`]) that archetype columns need
//! to drop values without knowing the concrete type.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::ptr;

// ---------------------------------------------------------------------------
// ComponentTypeId
// ---------------------------------------------------------------------------

/// Opaque, lightweight identifier for a registered component type.
///
/// `Ord` so that component-type sets have a canonical sorted form, which is
/// what archetypes are keyed by.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentTypeId(pub(crate) u32);

impl fmt::Debug for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentTypeId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// ComponentVtable
// ---------------------------------------------------------------------------

/// Type-erased drop operation plus layout for one component type.
///
/// Columns store components as raw bytes; the vtable lets them drop values in
/// place when rows are removed or the column is torn down.
#[derive(Clone)]
pub struct ComponentVtable {
    /// Drop a single value in place.
    pub(crate) drop_fn: unsafe fn(*mut u8),
    /// `std::mem::size_of::<T>()`
    pub(crate) size: usize,
    /// `std::mem::align_of::<T>()`
    pub(crate) align: usize,
}

impl ComponentVtable {
    /// Create the vtable for a concrete component type `T`.
    pub(crate) fn of<T: 'static>() -> Self {
        // Safety contract: callers pass a pointer to a valid, initialised `T`.
        unsafe fn drop_in_place_erased<T>(ptr: *mut u8) {
            ptr::drop_in_place(ptr as *mut T);
        }
        Self {
            drop_fn: drop_in_place_erased::<T>,
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
        }
    }
}

impl fmt::Debug for ComponentVtable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentVtable")
            .field("size", &self.size)
            .field("align", &self.align)
            .finish()
    }
}

// The function pointer is a plain monomorphised `fn` item with no captured
// state, so the vtable can cross thread boundaries.
#[allow(unsafe_code)]
unsafe impl Send for ComponentVtable {}
#[allow(unsafe_code)]
unsafe impl Sync for ComponentVtable {}

// ---------------------------------------------------------------------------
// ComponentInfo
// ---------------------------------------------------------------------------

/// Shape metadata for a registered component type.
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    /// Unique ID assigned at registration time.
    pub id: ComponentTypeId,
    /// Human-readable name supplied by the caller; used in error messages.
    pub name: String,
    /// `std::mem::size_of::<T>()`
    pub size: usize,
    /// `std::mem::align_of::<T>()`
    pub align: usize,
    /// Rust `TypeId` for runtime column type checks.
    pub type_id: TypeId,
}

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

/// Registry mapping Rust types to [`ComponentTypeId`]s, their shape metadata,
/// and their storage vtables.
///
/// A type registers once; re-registering the same Rust `TypeId` returns the
/// existing [`ComponentTypeId`]. Component shapes are immutable after
/// registration.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    /// TypeId -> ComponentTypeId, for dedup and typed lookup.
    by_type: HashMap<TypeId, ComponentTypeId>,
    /// Name -> ComponentTypeId, for lookup by registered name.
    by_name: HashMap<String, ComponentTypeId>,
    /// Indexed by `ComponentTypeId.0`.
    infos: Vec<ComponentInfo>,
    /// Indexed by `ComponentTypeId.0`, parallel to `infos`.
    vtables: Vec<ComponentVtable>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component type under the given `name`.
    ///
    /// If the type is already registered its existing [`ComponentTypeId`] is
    /// returned and `name` is ignored.
    ///
    /// # Panics
    ///
    /// Panics if `name` is already taken by a *different* type -- that is a
    /// programming error in registration code, not a runtime condition.
    pub fn register<T>(&mut self, name: &str) -> ComponentTypeId
    where
        T: Send + Sync + 'static,
    {
        let rust_type_id = TypeId::of::<T>();
        if let Some(&existing) = self.by_type.get(&rust_type_id) {
            return existing;
        }
        if self.by_name.contains_key(name) {
            panic!("component name '{name}' is already registered for a different type");
        }

        let id = ComponentTypeId(self.infos.len() as u32);
        self.infos.push(ComponentInfo {
            id,
            name: name.to_owned(),
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
            type_id: rust_type_id,
        });
        self.vtables.push(ComponentVtable::of::<T>());
        self.by_type.insert(rust_type_id, id);
        self.by_name.insert(name.to_owned(), id);
        id
    }

    /// Look up a component type by its Rust type.
    pub fn lookup<T: 'static>(&self) -> Option<ComponentTypeId> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Look up a component type by its registered name.
    pub fn lookup_by_name(&self, name: &str) -> Option<ComponentTypeId> {
        self.by_name.get(name).copied()
    }

    /// Shape metadata for a registered component type.
    pub fn get_info(&self, id: ComponentTypeId) -> Option<&ComponentInfo> {
        self.infos.get(id.0 as usize)
    }

    /// Storage vtable for a registered component type.
    pub(crate) fn get_vtable(&self, id: ComponentTypeId) -> Option<&ComponentVtable> {
        self.vtables.get(id.0 as usize)
    }

    /// Number of registered component types.
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Whether any component types have been registered.
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Names of all registered component types, sorted.
    pub fn registered_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Pos {
        x: f32,
        y: f32,
        z: f32,
    }

    #[derive(Debug, Clone)]
    struct Vel {
        dx: f32,
    }

    #[test]
    fn register_and_lookup() {
        let mut reg = ComponentRegistry::new();
        let id = reg.register::<Pos>("position");
        assert_eq!(reg.lookup::<Pos>(), Some(id));
        assert_eq!(reg.lookup_by_name("position"), Some(id));
    }

    #[test]
    fn same_type_registers_once() {
        let mut reg = ComponentRegistry::new();
        let id1 = reg.register::<Pos>("position");
        let id2 = reg.register::<Pos>("position_again");
        assert_eq!(id1, id2);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn different_types_different_ids() {
        let mut reg = ComponentRegistry::new();
        let p = reg.register::<Pos>("position");
        let v = reg.register::<Vel>("velocity");
        assert_ne!(p, v);
    }

    #[test]
    #[should_panic(expected = "already registered for a different type")]
    fn duplicate_name_for_different_type_panics() {
        let mut reg = ComponentRegistry::new();
        reg.register::<Pos>("position");
        reg.register::<Vel>("position");
    }

    #[test]
    fn info_matches_layout() {
        let mut reg = ComponentRegistry::new();
        let id = reg.register::<Pos>("position");
        let info = reg.get_info(id).unwrap();
        assert_eq!(info.name, "position");
        assert_eq!(info.size, std::mem::size_of::<Pos>());
        assert_eq!(info.align, std::mem::align_of::<Pos>());
        assert_eq!(info.type_id, TypeId::of::<Pos>());

        let vtable = reg.get_vtable(id).unwrap();
        assert_eq!(vtable.size, info.size);
        assert_eq!(vtable.align, info.align);
    }

    #[test]
    fn registered_names_sorted() {
        let mut reg = ComponentRegistry::new();
        reg.register::<Vel>("velocity");
        reg.register::<Pos>("position");
        assert_eq!(reg.registered_names(), vec!["position", "velocity"]);
    }
}
