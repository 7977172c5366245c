//! Archetype storage: one SoA block per unique component-type set.
//!
//! An [`Archetype`] stores every entity that has exactly the same set of
//! component types. Components are laid out Structure-of-Arrays: one densely
//! packed [`Column`] per component type, plus a parallel `Vec<EntityId>`
//! mapping row index to entity. All columns in an archetype always have the
//! same length as the entity vector; removal keeps rows dense by swapping the
//! last row into the gap.
//!
//! # Safety
//!
//! Component data lives in type-erased byte buffers, so this module contains
//! `unsafe` code. The raw primitives are module-internal; every public access
//! path is checked against the column's recorded `TypeId` and length before
//! any pointer is produced.
// Note: unsafe_code is allowed on this module via #[allow(unsafe_code)] in lib.rs

use std::alloc::{self, Layout};
use std::any::TypeId;
use std::ptr;

use crate::component::{ComponentInfo, ComponentTypeId, ComponentVtable};
use crate::entity::EntityId;
use crate::EcsError;

// ---------------------------------------------------------------------------
// ArchetypeId
// ---------------------------------------------------------------------------

/// Identifies an archetype within the world.
///
/// Indices into the world's archetype vector, which is append-only, so ids
/// double as creation order. Treat the handle as valid for the current tick
/// only; archetype-registry mutation may add new ids behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArchetypeId(pub(crate) u32);

// ---------------------------------------------------------------------------
// CapacityError -- internal column-growth failure
// ---------------------------------------------------------------------------

/// Column growth failed because the requested allocation size overflows.
/// Mapped to [`EcsError::CapacityExceeded`] with the column's component name.
pub(crate) struct CapacityError {
    pub(crate) requested: usize,
}

// ---------------------------------------------------------------------------
// RawComponentBuf -- an aligned heap box for one component value
// ---------------------------------------------------------------------------

/// A properly aligned heap buffer holding a single component value while it
/// is in flight between archetypes (migration) or between a caller and
/// storage (bundles, deferred commands).
///
/// Dropping the buffer only frees the allocation; it does NOT run the
/// component's destructor. Whoever owns the buffer must either move the value
/// into a column or call [`drop_value`](Self::drop_value) first.
pub(crate) struct RawComponentBuf {
    /// Heap pointer (null for zero-sized components).
    ptr: *mut u8,
    layout: Layout,
}

impl RawComponentBuf {
    /// Move `value` into a fresh buffer. Ownership transfers to the buffer.
    pub(crate) fn from_value<T>(value: T) -> Self {
        let buf = Self::uninit(std::mem::size_of::<T>(), std::mem::align_of::<T>());
        if buf.layout.size() > 0 {
            unsafe {
                ptr::copy_nonoverlapping(&value as *const T as *const u8, buf.ptr, buf.layout.size());
            }
        }
        std::mem::forget(value);
        buf
    }

    /// Allocate an uninitialised buffer for a component of the given layout.
    /// The caller is responsible for writing a valid value before reading it.
    pub(crate) fn uninit(size: usize, align: usize) -> Self {
        let layout = Layout::from_size_align(size, align).expect("component layout must be valid");
        let ptr = if size > 0 {
            let ptr = unsafe { alloc::alloc(layout) };
            if ptr.is_null() {
                alloc::handle_alloc_error(layout);
            }
            ptr
        } else {
            ptr::null_mut()
        };
        Self { ptr, layout }
    }

    /// Pointer to the stored value (dangling but aligned for ZSTs).
    pub(crate) fn as_ptr(&self) -> *const u8 {
        if self.layout.size() > 0 {
            self.ptr
        } else {
            self.layout.align() as *const u8
        }
    }

    /// Mutable pointer to the buffer (dangling but aligned for ZSTs).
    pub(crate) fn as_mut_ptr(&mut self) -> *mut u8 {
        if self.layout.size() > 0 {
            self.ptr
        } else {
            self.layout.align() as *mut u8
        }
    }

    /// Run the component destructor on the buffered value.
    ///
    /// # Safety
    ///
    /// The buffer must hold a valid, initialised value of the type `vtable`
    /// describes, and the value must not be used afterwards.
    pub(crate) unsafe fn drop_value(&mut self, vtable: &ComponentVtable) {
        if vtable.size > 0 && !self.ptr.is_null() {
            (vtable.drop_fn)(self.ptr);
        }
    }
}

impl Drop for RawComponentBuf {
    fn drop(&mut self) {
        if self.layout.size() > 0 && !self.ptr.is_null() {
            unsafe {
                alloc::dealloc(self.ptr, self.layout);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Column -- type-erased dense component array
// ---------------------------------------------------------------------------

/// A densely packed, type-erased array of component values of a single type.
struct Column {
    /// Heap allocation (null while capacity == 0).
    data: *mut u8,
    /// Number of live elements.
    len: usize,
    /// Number of elements the current allocation holds.
    capacity: usize,
    item_size: usize,
    item_align: usize,
}

// The column is raw bytes; the registry only admits Send + Sync component
// types, so moving the buffer across threads is sound.
unsafe impl Send for Column {}
unsafe impl Sync for Column {}

impl Column {
    fn new(info: &ComponentInfo) -> Self {
        Self {
            data: ptr::null_mut(),
            len: 0,
            capacity: 0,
            item_size: info.size,
            item_align: info.align,
        }
    }

    #[inline]
    fn len(&self) -> usize {
        self.len
    }

    /// Make room for one more element, doubling capacity when full.
    ///
    /// This is the only point at which the column's base address may change,
    /// so slices obtained earlier must not be held across it (the borrow
    /// checker enforces this for safe callers).
    fn reserve_one(&mut self) -> Result<(), CapacityError> {
        if self.len < self.capacity {
            return Ok(());
        }
        let new_cap = usize::max(self.capacity * 2, 1);
        if self.item_size == 0 {
            self.capacity = new_cap;
            return Ok(());
        }
        let bytes = self
            .item_size
            .checked_mul(new_cap)
            .filter(|&b| b <= isize::MAX as usize)
            .ok_or(CapacityError { requested: new_cap })?;
        let new_layout = Layout::from_size_align(bytes, self.item_align)
            .map_err(|_| CapacityError { requested: new_cap })?;
        unsafe {
            let new_data = if self.capacity == 0 {
                alloc::alloc(new_layout)
            } else {
                let old_layout =
                    Layout::from_size_align(self.item_size * self.capacity, self.item_align)
                        .expect("existing layout was validated on allocation");
                alloc::realloc(self.data, old_layout, new_layout.size())
            };
            if new_data.is_null() {
                alloc::handle_alloc_error(new_layout);
            }
            self.data = new_data;
        }
        self.capacity = new_cap;
        Ok(())
    }

    #[inline]
    fn ptr_at(&self, index: usize) -> *mut u8 {
        debug_assert!(index < self.len);
        if self.item_size == 0 {
            return self.item_align as *mut u8;
        }
        unsafe { self.data.add(index * self.item_size) }
    }

    /// Append one value. Capacity must already be reserved.
    ///
    /// # Safety
    ///
    /// `value_ptr` must point to a valid, initialised value of the column's
    /// component type; ownership moves into the column.
    unsafe fn push_unchecked(&mut self, value_ptr: *const u8) {
        debug_assert!(self.len < self.capacity, "push without reserved capacity");
        if self.item_size > 0 {
            let dst = self.data.add(self.len * self.item_size);
            ptr::copy_nonoverlapping(value_ptr, dst, self.item_size);
        }
        self.len += 1;
    }

    /// Drop the element at `index` and move the last element into its place.
    ///
    /// # Safety
    ///
    /// `index < len`; `drop_fn` must match the stored component type.
    unsafe fn swap_remove(&mut self, index: usize, drop_fn: unsafe fn(*mut u8)) {
        debug_assert!(index < self.len);
        let last = self.len - 1;
        if self.item_size > 0 {
            drop_fn(self.ptr_at(index));
            if index != last {
                ptr::copy_nonoverlapping(self.ptr_at(last), self.ptr_at(index), self.item_size);
            }
        }
        self.len -= 1;
    }

    /// Move the element at `index` out into `out_ptr` (no destructor runs),
    /// then move the last element into the gap.
    ///
    /// # Safety
    ///
    /// `index < len`; `out_ptr` must be aligned and have room for one element.
    unsafe fn swap_remove_into(&mut self, index: usize, out_ptr: *mut u8) {
        debug_assert!(index < self.len);
        let last = self.len - 1;
        if self.item_size > 0 {
            ptr::copy_nonoverlapping(self.ptr_at(index), out_ptr, self.item_size);
            if index != last {
                ptr::copy_nonoverlapping(self.ptr_at(last), self.ptr_at(index), self.item_size);
            }
        }
        self.len -= 1;
    }

    /// View the column as a typed slice.
    ///
    /// # Safety
    ///
    /// `T` must be the column's actual component type.
    unsafe fn as_slice<T>(&self) -> &[T] {
        if self.len == 0 || self.item_size == 0 {
            std::slice::from_raw_parts(ptr::NonNull::<T>::dangling().as_ptr(), self.len)
        } else {
            std::slice::from_raw_parts(self.data as *const T, self.len)
        }
    }

    /// View the column as a mutable typed slice.
    ///
    /// # Safety
    ///
    /// `T` must be the column's actual component type.
    unsafe fn as_mut_slice<T>(&mut self) -> &mut [T] {
        if self.len == 0 || self.item_size == 0 {
            std::slice::from_raw_parts_mut(ptr::NonNull::<T>::dangling().as_ptr(), self.len)
        } else {
            std::slice::from_raw_parts_mut(self.data as *mut T, self.len)
        }
    }

    /// Drop all remaining elements and release the allocation.
    ///
    /// # Safety
    ///
    /// `drop_fn` must match the stored component type.
    unsafe fn drop_all(&mut self, drop_fn: unsafe fn(*mut u8)) {
        if self.item_size > 0 {
            for i in 0..self.len {
                drop_fn(self.ptr_at(i));
            }
            if self.capacity > 0 {
                let layout =
                    Layout::from_size_align(self.item_size * self.capacity, self.item_align)
                        .expect("existing layout was validated on allocation");
                alloc::dealloc(self.data, layout);
            }
        }
        self.data = ptr::null_mut();
        self.len = 0;
        self.capacity = 0;
    }
}

impl std::fmt::Debug for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Column")
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .field("item_size", &self.item_size)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Archetype
// ---------------------------------------------------------------------------

/// One column plus the metadata needed to check and tear it down.
#[derive(Debug)]
struct ColumnEntry {
    info: ComponentInfo,
    vtable: ComponentVtable,
    column: Column,
}

/// Storage block for all entities sharing one exact component-type set.
///
/// Columns are kept sorted by [`ComponentTypeId`] so the sorted type list is
/// both the archetype's identity key and the column lookup order.
#[derive(Debug)]
pub struct Archetype {
    id: ArchetypeId,
    /// Sorted; parallel to `columns`.
    component_types: Vec<ComponentTypeId>,
    columns: Vec<ColumnEntry>,
    /// Row index -> entity. Same length as every column.
    entities: Vec<EntityId>,
    /// Caller-supplied query-ordering priority. `None` until assigned.
    priority: Option<i32>,
}

impl Archetype {
    /// Create an empty archetype from component metadata.
    pub(crate) fn new(id: ArchetypeId, specs: Vec<(ComponentInfo, ComponentVtable)>) -> Self {
        let mut columns: Vec<ColumnEntry> = specs
            .into_iter()
            .map(|(info, vtable)| ColumnEntry {
                column: Column::new(&info),
                info,
                vtable,
            })
            .collect();
        columns.sort_by_key(|entry| entry.info.id);
        let component_types = columns.iter().map(|entry| entry.info.id).collect();
        Self {
            id,
            component_types,
            columns,
            entities: Vec::new(),
            priority: None,
        }
    }

    /// Binary search for the column holding `type_id`.
    #[inline]
    fn column_index(&self, type_id: ComponentTypeId) -> Option<usize> {
        self.columns
            .binary_search_by_key(&type_id, |entry| entry.info.id)
            .ok()
    }

    fn type_mismatch<T>(&self) -> EcsError {
        EcsError::ColumnTypeMismatch {
            archetype: self.id,
            requested: std::any::type_name::<T>().to_owned(),
        }
    }

    /// This archetype's id (also its creation order).
    #[inline]
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    /// The sorted component-type set that identifies this archetype.
    #[inline]
    pub fn component_types(&self) -> &[ComponentTypeId] {
        &self.component_types
    }

    /// Whether this archetype stores the given component type.
    #[inline]
    pub fn has_component(&self, type_id: ComponentTypeId) -> bool {
        self.column_index(type_id).is_some()
    }

    /// Number of rows (entities) stored.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the archetype has no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Row index -> entity mapping, parallel to every column.
    #[inline]
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    /// The entity at `row`, if the row exists.
    #[inline]
    pub fn entity_at(&self, row: usize) -> Option<EntityId> {
        self.entities.get(row).copied()
    }

    /// Caller-supplied query-ordering priority, if one was assigned.
    #[inline]
    pub fn priority(&self) -> Option<i32> {
        self.priority
    }

    pub(crate) fn set_priority(&mut self, priority: Option<i32>) {
        self.priority = priority;
    }

    /// Length of the column for `type_id`, if present. Always equals
    /// [`len`](Self::len) for present columns.
    pub fn column_len(&self, type_id: ComponentTypeId) -> Option<usize> {
        self.column_index(type_id)
            .map(|idx| self.columns[idx].column.len())
    }

    /// Reserve room for one more row in every column, so a following append
    /// cannot fail part-way through.
    pub(crate) fn reserve_row(&mut self) -> Result<(), EcsError> {
        for entry in &mut self.columns {
            entry
                .column
                .reserve_one()
                .map_err(|e| EcsError::CapacityExceeded {
                    component: entry.info.name.clone(),
                    requested: e.requested,
                })?;
        }
        Ok(())
    }

    /// Append one row: the entity plus exactly one value per declared column.
    ///
    /// Fails with [`EcsError::SchemaMismatch`] when the supplied component
    /// set is not exactly this archetype's set, and with
    /// [`EcsError::CapacityExceeded`] when growth overflows. Capacity for
    /// every column is reserved before any value is written, so a failed
    /// append leaves the archetype untouched.
    ///
    /// # Safety
    ///
    /// Each pointer must reference a valid, initialised value of its
    /// component type; ownership of all values moves into the archetype on
    /// success (and stays with the caller on failure).
    pub(crate) unsafe fn append_row(
        &mut self,
        entity: EntityId,
        components: &[(ComponentTypeId, *const u8)],
    ) -> Result<usize, EcsError> {
        let mut supplied: Vec<ComponentTypeId> = components.iter().map(|(id, _)| *id).collect();
        supplied.sort();
        if supplied != self.component_types {
            return Err(EcsError::SchemaMismatch {
                archetype: self.id,
                expected: format!("{:?}", self.component_types),
                supplied: format!("{supplied:?}"),
            });
        }
        self.reserve_row()?;

        let row = self.entities.len();
        self.entities.push(entity);
        for &(type_id, value_ptr) in components {
            let idx = self
                .column_index(type_id)
                .expect("schema check admitted only declared columns");
            self.columns[idx].column.push_unchecked(value_ptr);
        }
        Ok(row)
    }

    /// Swap-remove the row, dropping its component values.
    ///
    /// Returns the entity that was moved into `row` (previously the last
    /// row), or `None` if the removed row was the last one. The caller must
    /// update the moved entity's directory entry.
    pub(crate) fn remove_row(&mut self, row: usize) -> Option<EntityId> {
        debug_assert!(row < self.entities.len());
        let last = self.entities.len() - 1;
        self.entities.swap_remove(row);
        for entry in &mut self.columns {
            unsafe {
                entry.column.swap_remove(row, entry.vtable.drop_fn);
            }
        }
        if row < last {
            Some(self.entities[row])
        } else {
            None
        }
    }

    /// Swap-remove the row, moving its component values out into aligned
    /// buffers instead of dropping them. Used by archetype migration.
    ///
    /// Returns the extracted `(type, value, vtable)` triples and the entity
    /// moved into `row`, if any.
    pub(crate) fn extract_row(
        &mut self,
        row: usize,
    ) -> (
        Vec<(ComponentTypeId, RawComponentBuf, ComponentVtable)>,
        Option<EntityId>,
    ) {
        debug_assert!(row < self.entities.len());
        let last = self.entities.len() - 1;
        self.entities.swap_remove(row);

        let mut extracted = Vec::with_capacity(self.columns.len());
        for entry in &mut self.columns {
            let mut buf = RawComponentBuf::uninit(entry.vtable.size, entry.vtable.align);
            unsafe {
                entry.column.swap_remove_into(row, buf.as_mut_ptr());
            }
            extracted.push((entry.info.id, buf, entry.vtable.clone()));
        }

        let moved = if row < last {
            Some(self.entities[row])
        } else {
            None
        };
        (extracted, moved)
    }

    /// Borrow the column for `type_id` as a typed slice.
    ///
    /// Fails with [`EcsError::ColumnTypeMismatch`] when the archetype has no
    /// such column or when `T` is not the column's stored type. The slice is
    /// valid until the next structural mutation of this archetype.
    pub fn column<T: 'static>(&self, type_id: ComponentTypeId) -> Result<&[T], EcsError> {
        let Some(idx) = self.column_index(type_id) else {
            return Err(self.type_mismatch::<T>());
        };
        let entry = &self.columns[idx];
        if entry.info.type_id != TypeId::of::<T>() {
            return Err(self.type_mismatch::<T>());
        }
        Ok(unsafe { entry.column.as_slice::<T>() })
    }

    /// Borrow the column for `type_id` as a mutable typed slice.
    ///
    /// Same checks as [`column`](Self::column). Must not be held across any
    /// structural mutation of this archetype (the borrow checker enforces
    /// this).
    pub fn column_mut<T: 'static>(&mut self, type_id: ComponentTypeId) -> Result<&mut [T], EcsError> {
        let Some(idx) = self.column_index(type_id) else {
            return Err(self.type_mismatch::<T>());
        };
        if self.columns[idx].info.type_id != TypeId::of::<T>() {
            return Err(self.type_mismatch::<T>());
        }
        Ok(unsafe { self.columns[idx].column.as_mut_slice::<T>() })
    }

    /// Reference to one component value, checked like [`column`](Self::column).
    pub fn get<T: 'static>(&self, row: usize, type_id: ComponentTypeId) -> Option<&T> {
        self.column::<T>(type_id).ok()?.get(row)
    }

    /// Mutable reference to one component value.
    pub fn get_mut<T: 'static>(&mut self, row: usize, type_id: ComponentTypeId) -> Option<&mut T> {
        self.column_mut::<T>(type_id).ok()?.get_mut(row)
    }

    /// Raw pointer to one component value, for type-erased overwrites.
    ///
    /// # Safety
    ///
    /// The caller must use the pointer with the component type actually
    /// stored in the column and must not create aliasing references.
    pub(crate) unsafe fn get_raw_mut(
        &mut self,
        row: usize,
        type_id: ComponentTypeId,
    ) -> Option<*mut u8> {
        let idx = self.column_index(type_id)?;
        let entry = &mut self.columns[idx];
        if row >= entry.column.len() {
            return None;
        }
        Some(entry.column.ptr_at(row))
    }

    /// The vtable for a stored component type.
    pub(crate) fn vtable(&self, type_id: ComponentTypeId) -> Option<&ComponentVtable> {
        self.column_index(type_id)
            .map(|idx| &self.columns[idx].vtable)
    }
}

impl Drop for Archetype {
    fn drop(&mut self) {
        for entry in &mut self.columns {
            unsafe {
                entry.column.drop_all(entry.vtable.drop_fn);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
