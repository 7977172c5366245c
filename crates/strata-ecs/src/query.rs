//! Query engine: archetype predicate matching and typed row iteration.
//!
//! Matching happens at archetype granularity -- cost is proportional to the
//! number of archetypes, never the number of entities. A [`QueryFilter`]
//! describes the predicate (`all` / `any` / `none` component sets) and
//! [`World::match_archetypes`] evaluates it against the current archetype
//! registry, returning an eagerly computed, restartable snapshot of matching
//! archetype handles. Per-entity work is the caller's: grab the matched
//! archetypes' columns and process them in bulk.
//!
//! For row-at-a-time ergonomics, typed tuple queries (`(&Pos, &mut Vel)`)
//! are layered on top via [`World::query`] / [`World::query_mut`].
//!
//! ## Soundness
//!
//! Read-only queries (`&T` items) go through [`World::query`], which takes
//! `&self`. Mutable queries (`&mut T` items) go through [`World::query_mut`],
//! which takes `&mut self` and therefore guarantees exclusive world access
//! for the iterator's lifetime; aliasing within one query tuple is rejected
//! at construction.
// Note: unsafe_code is allowed on this module via #[allow(unsafe_code)] in lib.rs

use crate::archetype::{Archetype, ArchetypeId};
use crate::component::ComponentTypeId;
use crate::entity::EntityId;
use crate::world::World;

// ---------------------------------------------------------------------------
// QueryFilter
// ---------------------------------------------------------------------------

/// Component-set predicate for archetype matching.
///
/// An archetype matches when its component set is a superset of `all`,
/// intersects `any` non-emptily (when `any` is non-empty), and is disjoint
/// from `none`.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    all: Vec<ComponentTypeId>,
    any: Vec<ComponentTypeId>,
    none: Vec<ComponentTypeId>,
}

impl QueryFilter {
    /// An empty filter; matches every archetype.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require the component to be present.
    pub fn with(mut self, type_id: ComponentTypeId) -> Self {
        self.all.push(type_id);
        self
    }

    /// Require all of the given components to be present.
    pub fn with_all(mut self, type_ids: &[ComponentTypeId]) -> Self {
        self.all.extend_from_slice(type_ids);
        self
    }

    /// Require at least one of the given components to be present.
    pub fn any_of(mut self, type_ids: &[ComponentTypeId]) -> Self {
        self.any.extend_from_slice(type_ids);
        self
    }

    /// Require the component to be absent.
    pub fn without(mut self, type_id: ComponentTypeId) -> Self {
        self.none.push(type_id);
        self
    }

    /// Evaluate the predicate against one archetype.
    pub fn matches(&self, archetype: &Archetype) -> bool {
        self.all.iter().all(|id| archetype.has_component(*id))
            && (self.any.is_empty() || self.any.iter().any(|id| archetype.has_component(*id)))
            && self.none.iter().all(|id| !archetype.has_component(*id))
    }

    pub(crate) fn require(&mut self, type_ids: &[ComponentTypeId]) {
        self.all.extend_from_slice(type_ids);
    }
}

// ---------------------------------------------------------------------------
// MatchedArchetypes
// ---------------------------------------------------------------------------

/// Snapshot of archetype handles matching a filter at call time.
///
/// Finite and restartable: [`iter`](Self::iter) can be called any number of
/// times. The handles are only guaranteed valid until the archetype registry
/// changes -- re-run the match rather than caching this across structural
/// mutations.
#[derive(Debug, Clone, Default)]
pub struct MatchedArchetypes {
    ids: Vec<ArchetypeId>,
}

impl MatchedArchetypes {
    /// Iterate the matched archetype handles in match order.
    pub fn iter(&self) -> impl Iterator<Item = ArchetypeId> + '_ {
        self.ids.iter().copied()
    }

    /// The matched handles as a slice.
    pub fn as_slice(&self) -> &[ArchetypeId] {
        &self.ids
    }

    /// Number of matched archetypes.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether nothing matched.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl IntoIterator for MatchedArchetypes {
    type Item = ArchetypeId;
    type IntoIter = std::vec::IntoIter<ArchetypeId>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.into_iter()
    }
}

impl<'a> IntoIterator for &'a MatchedArchetypes {
    type Item = ArchetypeId;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, ArchetypeId>>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.iter().copied()
    }
}

impl World {
    /// Evaluate `filter` against the current archetype registry.
    ///
    /// Archetypes come back in ascending creation order. When any matched
    /// archetype carries a priority (see
    /// [`set_archetype_priority`](World::set_archetype_priority)), the whole
    /// result is instead ordered by descending priority with creation order
    /// as the tie-break; archetypes without a priority rank as priority 0.
    pub fn match_archetypes(&self, filter: &QueryFilter) -> MatchedArchetypes {
        // The archetype vector is append-only, so iteration order IS
        // creation order.
        let mut ids: Vec<ArchetypeId> = self
            .archetypes
            .iter()
            .filter(|archetype| filter.matches(archetype))
            .map(|archetype| archetype.id())
            .collect();

        let prioritized = ids
            .iter()
            .any(|id| self.archetypes[id.0 as usize].priority().is_some());
        if prioritized {
            ids.sort_by_key(|id| {
                let archetype = &self.archetypes[id.0 as usize];
                (
                    std::cmp::Reverse(archetype.priority().unwrap_or(0)),
                    id.0,
                )
            });
        }
        MatchedArchetypes { ids }
    }
}

// ---------------------------------------------------------------------------
// QueryItem -- one element of a typed query tuple
// ---------------------------------------------------------------------------

/// One element of a typed query fetch: `&T` (read) or `&mut T` (write).
pub trait QueryItem {
    /// The reference type yielded per row.
    type Item<'w>;
    /// Whether this item borrows mutably.
    const MUTABLE: bool;
    /// The registered component type this item accesses, if any.
    fn component_type_id(world: &World) -> Option<ComponentTypeId>;
    /// Fetch one item from an archetype row.
    fn fetch(world: &World, archetype: u32, row: usize) -> Self::Item<'_>;
}

impl<T: 'static> QueryItem for &T {
    type Item<'w> = &'w T;
    const MUTABLE: bool = false;

    fn component_type_id(world: &World) -> Option<ComponentTypeId> {
        world.registry.lookup::<T>()
    }

    fn fetch(world: &World, archetype: u32, row: usize) -> Self::Item<'_> {
        let type_id = world
            .registry
            .lookup::<T>()
            .expect("query matched only registered component types");
        world.archetypes[archetype as usize]
            .get::<T>(row, type_id)
            .expect("matched archetype rows hold every required column")
    }
}

impl<T: 'static> QueryItem for &mut T {
    type Item<'w> = &'w mut T;
    const MUTABLE: bool = true;

    fn component_type_id(world: &World) -> Option<ComponentTypeId> {
        world.registry.lookup::<T>()
    }

    fn fetch(world: &World, archetype: u32, row: usize) -> Self::Item<'_> {
        let type_id = world
            .registry
            .lookup::<T>()
            .expect("query matched only registered component types");
        // Safety: mutable items are only reachable through World::query_mut,
        // which takes `&mut self`, so this shared reference was derived from
        // an exclusive borrow and no other reference to the world exists.
        // Access conflicts within one tuple are rejected at construction.
        #[allow(unsafe_code)]
        #[allow(invalid_reference_casting)]
        unsafe {
            let world_mut = &mut *(world as *const World as *mut World);
            world_mut.archetypes[archetype as usize]
                .get_mut::<T>(row, type_id)
                .expect("matched archetype rows hold every required column")
        }
    }
}

// ---------------------------------------------------------------------------
// Query -- a tuple of QueryItems
// ---------------------------------------------------------------------------

/// A tuple of query items: `(&A,)`, `(&A, &mut B)`, up to four elements.
pub trait Query {
    /// The per-row output tuple.
    type Item<'w>;
    /// Whether any element borrows mutably.
    const HAS_MUTABLE: bool;
    /// Component type ids required by this tuple; `None` when any element's
    /// type is unregistered (such a query matches nothing).
    fn type_ids(world: &World) -> Option<Vec<ComponentTypeId>>;
    /// Panic if the tuple requests conflicting access to one component type.
    fn validate_access(world: &World);
    /// Fetch one row.
    fn fetch_row(world: &World, archetype: u32, row: usize) -> Self::Item<'_>;
}

/// Reject `&mut T + &mut T` and `&mut T + &T` over the same component type.
fn check_access_conflicts(accesses: &[(bool, Option<ComponentTypeId>)]) {
    for (i, &(mutable, type_id)) in accesses.iter().enumerate() {
        let Some(type_id) = type_id else { continue };
        for &(other_mutable, other_id) in &accesses[i + 1..] {
            if other_id == Some(type_id) && (mutable || other_mutable) {
                panic!(
                    "query requests conflicting access to the same component type \
                     ({type_id:?}): at most one &mut, never mixed with &"
                );
            }
        }
    }
}

macro_rules! impl_query_for_tuple {
    ($($item:ident),+) => {
        impl<$($item: QueryItem),+> Query for ($($item,)+) {
            type Item<'w> = ($($item::Item<'w>,)+);
            const HAS_MUTABLE: bool = $($item::MUTABLE)||+;

            fn type_ids(world: &World) -> Option<Vec<ComponentTypeId>> {
                Some(vec![$($item::component_type_id(world)?),+])
            }

            fn validate_access(world: &World) {
                let accesses = [$(($item::MUTABLE, $item::component_type_id(world))),+];
                check_access_conflicts(&accesses);
            }

            fn fetch_row(world: &World, archetype: u32, row: usize) -> Self::Item<'_> {
                ($($item::fetch(world, archetype, row),)+)
            }
        }
    };
}

impl_query_for_tuple!(A);
impl_query_for_tuple!(A, B);
impl_query_for_tuple!(A, B, C);
impl_query_for_tuple!(A, B, C, D);

// ---------------------------------------------------------------------------
// Row iterators
// ---------------------------------------------------------------------------

/// Iterator over `(EntityId, Q::Item)` rows of the matched archetypes.
///
/// Shared by the read-only and mutable entry points; the mutable path is made
/// sound by `World::query_mut` taking `&mut self` (see module docs).
pub struct QueryIter<'w, Q: Query> {
    world: &'w World,
    /// Matched archetype indices, in match order.
    archetypes: Vec<u32>,
    arch_cursor: usize,
    row_cursor: usize,
    _marker: std::marker::PhantomData<Q>,
}

impl<'w, Q: Query> QueryIter<'w, Q> {
    fn new(world: &'w World, matched: MatchedArchetypes) -> Self {
        Self {
            world,
            archetypes: matched.ids.iter().map(|id| id.0).collect(),
            arch_cursor: 0,
            row_cursor: 0,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<'w, Q: Query> Iterator for QueryIter<'w, Q> {
    type Item = (EntityId, Q::Item<'w>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let arch_idx = *self.archetypes.get(self.arch_cursor)?;
            let archetype = &self.world.archetypes[arch_idx as usize];
            if self.row_cursor < archetype.len() {
                let entity = archetype.entities()[self.row_cursor];
                let item = Q::fetch_row(self.world, arch_idx, self.row_cursor);
                self.row_cursor += 1;
                return Some((entity, item));
            }
            self.arch_cursor += 1;
            self.row_cursor = 0;
        }
    }
}

// ---------------------------------------------------------------------------
// World query entry points
// ---------------------------------------------------------------------------

impl World {
    fn matched_for_query<Q: Query>(&self, extra: &QueryFilter) -> MatchedArchetypes {
        let Some(type_ids) = Q::type_ids(self) else {
            // An unregistered component type can match no archetype.
            return MatchedArchetypes::default();
        };
        let mut filter = extra.clone();
        filter.require(&type_ids);
        self.match_archetypes(&filter)
    }

    /// Iterate all rows matching the query tuple, read-only.
    ///
    /// # Panics
    ///
    /// Panics if `Q` contains `&mut T` items -- use
    /// [`query_mut`](Self::query_mut), which takes `&mut self`.
    ///
    /// ```ignore
    /// for (entity, (pos, vel)) in world.query::<(&Pos, &Vel)>() {
    ///     // ...
    /// }
    /// ```
    pub fn query<Q: Query>(&self) -> QueryIter<'_, Q> {
        self.query_filtered::<Q>(&QueryFilter::new())
    }

    /// Like [`query`](Self::query), with an extra `any`/`none` filter applied
    /// on top of the tuple's required components.
    pub fn query_filtered<Q: Query>(&self, filter: &QueryFilter) -> QueryIter<'_, Q> {
        assert!(
            !Q::HAS_MUTABLE,
            "World::query() cannot carry mutable query items (&mut T); \
             use World::query_mut(), which requires &mut self"
        );
        QueryIter::new(self, self.matched_for_query::<Q>(filter))
    }

    /// Iterate all rows matching the query tuple, with mutable items.
    ///
    /// Taking `&mut self` guarantees exclusive world access, which is what
    /// makes yielding `&mut T` sound.
    ///
    /// # Panics
    ///
    /// Panics if the tuple requests conflicting access to one component type.
    ///
    /// ```ignore
    /// for (_entity, (pos, vel)) in world.query_mut::<(&mut Pos, &Vel)>() {
    ///     pos.x += vel.dx;
    /// }
    /// ```
    pub fn query_mut<Q: Query>(&mut self) -> QueryIter<'_, Q> {
        self.query_filtered_mut::<Q>(&QueryFilter::new())
    }

    /// Like [`query_mut`](Self::query_mut), with an extra `any`/`none`
    /// filter.
    pub fn query_filtered_mut<Q: Query>(&mut self, filter: &QueryFilter) -> QueryIter<'_, Q> {
        Q::validate_access(self);
        QueryIter::new(self, self.matched_for_query::<Q>(filter))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
