//! # Query Engine
//!
//! Boolean filters over component types, evaluated against the store's
//! reverse index and cached per descriptor.
//!
//! ## Candidate Resolution
//!
//! ```text
//!   any  = [X, Y]  ──>  by_type[X] ∪ by_type[Y]
//!   all  = [A, B]  ──>  ... ∩ by_type[A] ∩ by_type[B]
//!   neither given  ──>  every live entity (full scan)
//!   then           ──>  keep candidates passing matches()
//! ```
//!
//! ## Cache Coherence
//!
//! A [`Query`] keeps its last result and a dirty flag. The World marks
//! queries dirty when a component type they reference is added or removed,
//! and marks everything dirty when an entity is destroyed. A dirty query is
//! recomputed before its result is returned again.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use kindle_reactive::Signal;

use crate::component::{Component, ComponentTypeId};
use crate::entity::EntityId;
use crate::error::{WorldError, WorldResult};
use crate::storage::ComponentStore;
use crate::world::World;

// =============================================================================
// DESCRIPTOR
// =============================================================================

/// Declarative `all / any / none` filter.
///
/// Structurally equal descriptors (after sorting and deduplication) share
/// one cached [`Query`] inside a World.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct QueryDescriptor {
    all: Vec<ComponentTypeId>,
    any: Vec<ComponentTypeId>,
    none: Vec<ComponentTypeId>,
}

impl QueryDescriptor {
    /// An empty descriptor. Add at least one filter before using it.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `type_id` to be present.
    #[must_use]
    pub fn all(mut self, type_id: ComponentTypeId) -> Self {
        self.all.push(type_id);
        self
    }

    /// Requires at least one of the `any` types to be present.
    #[must_use]
    pub fn any(mut self, type_id: ComponentTypeId) -> Self {
        self.any.push(type_id);
        self
    }

    /// Requires `type_id` to be absent.
    #[must_use]
    pub fn none(mut self, type_id: ComponentTypeId) -> Self {
        self.none.push(type_id);
        self
    }

    /// Types that must all be present.
    #[must_use]
    pub fn all_types(&self) -> &[ComponentTypeId] {
        &self.all
    }

    /// Types of which at least one must be present.
    #[must_use]
    pub fn any_types(&self) -> &[ComponentTypeId] {
        &self.any
    }

    /// Types that must be absent.
    #[must_use]
    pub fn none_types(&self) -> &[ComponentTypeId] {
        &self.none
    }

    /// Returns `true` if no filter was given.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.all.is_empty() && self.any.is_empty() && self.none.is_empty()
    }

    /// Sorted, deduplicated copy. This is the cache key.
    #[must_use]
    pub fn normalized(&self) -> Self {
        fn norm(types: &[ComponentTypeId]) -> Vec<ComponentTypeId> {
            let mut types = types.to_vec();
            types.sort_unstable();
            types.dedup();
            types
        }
        Self {
            all: norm(&self.all),
            any: norm(&self.any),
            none: norm(&self.none),
        }
    }

    /// Returns `true` if any filter mentions `type_id`.
    #[must_use]
    pub fn references(&self, type_id: ComponentTypeId) -> bool {
        self.all.contains(&type_id) || self.any.contains(&type_id) || self.none.contains(&type_id)
    }

    /// Authoritative membership test for one entity.
    #[must_use]
    pub fn matches(&self, store: &ComponentStore, entity: EntityId) -> bool {
        self.all.iter().all(|&t| store.has(entity, t))
            && (self.any.is_empty() || self.any.iter().any(|&t| store.has(entity, t)))
            && !self.none.iter().any(|&t| store.has(entity, t))
    }

    fn candidates(&self, store: &ComponentStore, alive: &BTreeSet<EntityId>) -> BTreeSet<EntityId> {
        let mut candidates: Option<BTreeSet<EntityId>> = None;

        if !self.any.is_empty() {
            let mut union = BTreeSet::new();
            for &type_id in &self.any {
                union.extend(store.entities_with(type_id).iter().copied());
            }
            candidates = Some(union);
        }

        for &type_id in &self.all {
            let holders = store.entities_with(type_id);
            candidates = Some(match candidates {
                Some(current) => current.intersection(holders).copied().collect(),
                None => holders.clone(),
            });
        }

        candidates.unwrap_or_else(|| alive.clone())
    }
}

impl fmt::Display for QueryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = |types: &[ComponentTypeId]| {
            types
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",")
        };
        write!(
            f,
            "all:[{}]|any:[{}]|none:[{}]",
            list(&self.all),
            list(&self.any),
            list(&self.none)
        )
    }
}

// =============================================================================
// CACHED QUERY
// =============================================================================

/// Handle to a cached query inside one World.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryId(usize);

impl QueryId {
    /// Position in the cache.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// A descriptor with its cached result.
#[derive(Debug)]
pub struct Query {
    descriptor: QueryDescriptor,
    cached: BTreeSet<EntityId>,
    dirty: bool,
    recomputes: u64,
}

impl Query {
    fn new(descriptor: QueryDescriptor) -> Self {
        Self {
            descriptor,
            cached: BTreeSet::new(),
            dirty: true,
            recomputes: 0,
        }
    }

    /// The normalized descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &QueryDescriptor {
        &self.descriptor
    }

    /// Returns `true` if the next [`Query::execute`] recomputes.
    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Forces a recomputation on the next [`Query::execute`].
    #[inline]
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// How many times the result was recomputed.
    #[inline]
    #[must_use]
    pub fn recompute_count(&self) -> u64 {
        self.recomputes
    }

    /// Returns a copy of the matching entities, recomputing first if dirty.
    pub fn execute(&mut self, store: &ComponentStore, alive: &BTreeSet<EntityId>) -> BTreeSet<EntityId> {
        if self.dirty {
            self.cached = self
                .descriptor
                .candidates(store, alive)
                .into_iter()
                .filter(|&entity| self.descriptor.matches(store, entity))
                .collect();
            self.dirty = false;
            self.recomputes += 1;
        }
        self.cached.clone()
    }
}

// =============================================================================
// CACHE
// =============================================================================

/// Descriptor-keyed store of [`Query`] instances.
#[derive(Debug, Default)]
pub struct QueryCache {
    ids: HashMap<QueryDescriptor, QueryId>,
    queries: Vec<Query>,
}

impl QueryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached query for `descriptor`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::EmptyQuery`] for a descriptor without filters.
    pub fn get_or_insert(&mut self, descriptor: &QueryDescriptor) -> WorldResult<QueryId> {
        if descriptor.is_empty() {
            return Err(WorldError::EmptyQuery);
        }
        let key = descriptor.normalized();
        if let Some(&id) = self.ids.get(&key) {
            return Ok(id);
        }
        let id = QueryId(self.queries.len());
        tracing::trace!(query = %key, "caching new query");
        self.queries.push(Query::new(key.clone()));
        self.ids.insert(key, id);
        Ok(id)
    }

    /// Looks up a cached query.
    #[must_use]
    pub fn get(&self, id: QueryId) -> Option<&Query> {
        self.queries.get(id.0)
    }

    /// Looks up a cached query mutably.
    pub fn get_mut(&mut self, id: QueryId) -> Option<&mut Query> {
        self.queries.get_mut(id.0)
    }

    /// Marks every query referencing `type_id` dirty. Returns how many.
    pub fn mark_dirty_for_component(&mut self, type_id: ComponentTypeId) -> usize {
        let mut marked = 0;
        for query in &mut self.queries {
            if query.descriptor.references(type_id) {
                query.mark_dirty();
                marked += 1;
            }
        }
        marked
    }

    /// Marks `none`-only queries dirty. Their candidates are every live
    /// entity, so they go stale whenever an entity is created.
    pub fn mark_scans_dirty(&mut self) {
        for query in &mut self.queries {
            if query.descriptor.all.is_empty() && query.descriptor.any.is_empty() {
                query.mark_dirty();
            }
        }
    }

    /// Marks every query dirty.
    pub fn mark_all_dirty(&mut self) {
        for query in &mut self.queries {
            query.mark_dirty();
        }
    }

    /// Number of cached queries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    /// Returns `true` if nothing is cached.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Drops every cached query. Outstanding [`QueryId`]s become invalid.
    pub fn clear(&mut self) {
        self.ids.clear();
        self.queries.clear();
    }
}

// =============================================================================
// REACTIVE WRAPPER
// =============================================================================

/// A cached query whose result is mirrored into a signal.
///
/// The World refreshes the signal after every structural mutation, inside
/// the same batch, so effects see one consolidated membership change. The
/// signal only notifies when membership actually changed.
#[derive(Clone, Debug)]
pub struct ReactiveQuery {
    id: QueryId,
    entities: Signal<BTreeSet<EntityId>>,
}

impl ReactiveQuery {
    pub(crate) fn new(id: QueryId, entities: Signal<BTreeSet<EntityId>>) -> Self {
        Self { id, entities }
    }

    /// The underlying cached query.
    #[inline]
    #[must_use]
    pub fn id(&self) -> QueryId {
        self.id
    }

    /// The membership signal.
    #[inline]
    #[must_use]
    pub fn signal(&self) -> &Signal<BTreeSet<EntityId>> {
        &self.entities
    }

    /// Current membership, tracked.
    pub fn get(&self) -> BTreeSet<EntityId> {
        self.entities.get()
    }

    /// Current membership, untracked.
    pub fn peek(&self) -> BTreeSet<EntityId> {
        self.entities.peek()
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// Fluent descriptor construction by component type.
///
/// ```rust,ignore
/// let movers = world
///     .query_builder()
///     .with::<Position>()
///     .with::<Velocity>()
///     .without::<Frozen>()
///     .execute()?;
/// ```
pub struct QueryBuilder<'w> {
    world: &'w mut World,
    descriptor: QueryDescriptor,
}

impl<'w> QueryBuilder<'w> {
    pub(crate) fn new(world: &'w mut World) -> Self {
        Self {
            world,
            descriptor: QueryDescriptor::new(),
        }
    }

    /// Requires `T`.
    #[must_use]
    pub fn with<T: Component>(mut self) -> Self {
        let id = self.world.component_type::<T>();
        self.descriptor = self.descriptor.all(id);
        self
    }

    /// Requires at least one of the `any_of` types.
    #[must_use]
    pub fn any_of<T: Component>(mut self) -> Self {
        let id = self.world.component_type::<T>();
        self.descriptor = self.descriptor.any(id);
        self
    }

    /// Requires `T` to be absent.
    #[must_use]
    pub fn without<T: Component>(mut self) -> Self {
        let id = self.world.component_type::<T>();
        self.descriptor = self.descriptor.none(id);
        self
    }

    /// The descriptor built so far.
    #[must_use]
    pub fn descriptor(&self) -> &QueryDescriptor {
        &self.descriptor
    }

    /// Resolves the descriptor to a cached query.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::EmptyQuery`] if no filter was added.
    pub fn build(self) -> WorldResult<QueryId> {
        self.world.query(&self.descriptor)
    }

    /// Resolves and executes in one step.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::EmptyQuery`] if no filter was added.
    pub fn execute(self) -> WorldResult<BTreeSet<EntityId>> {
        self.world.query_entities(&self.descriptor)
    }

    /// Resolves to a [`ReactiveQuery`].
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::EmptyQuery`] if no filter was added.
    pub fn reactive(self) -> WorldResult<ReactiveQuery> {
        self.world.reactive_query(&self.descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindle_reactive::{AnyCell, Runtime};

    struct Marker;

    impl Component for Marker {
        fn fields(&self) -> Vec<(&'static str, &dyn AnyCell)> {
            Vec::new()
        }

        fn clone_component(&self) -> Box<dyn Component> {
            Box::new(Marker)
        }
    }

    const A: ComponentTypeId = ComponentTypeId::new(0);
    const B: ComponentTypeId = ComponentTypeId::new(1);
    const C: ComponentTypeId = ComponentTypeId::new(2);

    fn fixture() -> (ComponentStore, BTreeSet<EntityId>) {
        // e1: A      e2: A B      e3: C      e4: (nothing)
        let mut store = ComponentStore::new();
        let ids: Vec<EntityId> = (1..=4).map(EntityId::new).collect();
        store.add(ids[0], A, Box::new(Marker));
        store.add(ids[1], A, Box::new(Marker));
        store.add(ids[1], B, Box::new(Marker));
        store.add(ids[2], C, Box::new(Marker));
        (store, ids.into_iter().collect())
    }

    fn run(descriptor: QueryDescriptor) -> Vec<u64> {
        let (store, alive) = fixture();
        let mut query = Query::new(descriptor.normalized());
        query.execute(&store, &alive).into_iter().map(EntityId::raw).collect()
    }

    #[test]
    fn test_all_filter() {
        assert_eq!(run(QueryDescriptor::new().all(A)), vec![1, 2]);
        assert_eq!(run(QueryDescriptor::new().all(A).all(B)), vec![2]);
    }

    #[test]
    fn test_any_filter() {
        assert_eq!(run(QueryDescriptor::new().any(B).any(C)), vec![2, 3]);
        assert_eq!(run(QueryDescriptor::new().all(A).any(B).any(C)), vec![2]);
    }

    #[test]
    fn test_none_only_scans_live_entities() {
        assert_eq!(run(QueryDescriptor::new().none(A)), vec![3, 4]);
        assert_eq!(run(QueryDescriptor::new().all(A).none(B)), vec![1]);
    }

    #[test]
    fn test_normalized_key_is_order_insensitive() {
        let left = QueryDescriptor::new().all(B).all(A).all(A);
        let right = QueryDescriptor::new().all(A).all(B);
        assert_eq!(left.normalized(), right.normalized());
        assert_eq!(right.normalized().to_string(), "all:[#0,#1]|any:[]|none:[]");
    }

    #[test]
    fn test_cache_reuses_and_rejects_empty() {
        let mut cache = QueryCache::new();
        let first = cache.get_or_insert(&QueryDescriptor::new().all(A).all(B)).unwrap();
        let second = cache.get_or_insert(&QueryDescriptor::new().all(B).all(A)).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.get_or_insert(&QueryDescriptor::new()),
            Err(WorldError::EmptyQuery)
        );
    }

    #[test]
    fn test_targeted_invalidation() {
        let (store, alive) = fixture();
        let mut cache = QueryCache::new();
        let ab = cache.get_or_insert(&QueryDescriptor::new().all(A).all(B)).unwrap();
        let c = cache.get_or_insert(&QueryDescriptor::new().all(C)).unwrap();
        for id in [ab, c] {
            cache.get_mut(id).unwrap().execute(&store, &alive);
        }

        assert_eq!(cache.mark_dirty_for_component(B), 1);
        assert!(cache.get(ab).unwrap().is_dirty());
        assert!(!cache.get(c).unwrap().is_dirty());

        cache.mark_all_dirty();
        assert!(cache.get(c).unwrap().is_dirty());
    }

    #[test]
    fn test_scan_invalidation_only_hits_none_queries() {
        let (store, alive) = fixture();
        let mut cache = QueryCache::new();
        let scan = cache.get_or_insert(&QueryDescriptor::new().none(A)).unwrap();
        let indexed = cache.get_or_insert(&QueryDescriptor::new().all(A).none(B)).unwrap();
        for id in [scan, indexed] {
            cache.get_mut(id).unwrap().execute(&store, &alive);
        }

        cache.mark_scans_dirty();
        assert!(cache.get(scan).unwrap().is_dirty());
        assert!(!cache.get(indexed).unwrap().is_dirty());
    }

    #[test]
    fn test_clean_query_is_not_recomputed() {
        let (store, alive) = fixture();
        let mut query = Query::new(QueryDescriptor::new().all(A));
        query.execute(&store, &alive);
        query.execute(&store, &alive);
        assert_eq!(query.recompute_count(), 1);
        query.mark_dirty();
        query.execute(&store, &alive);
        assert_eq!(query.recompute_count(), 2);
    }

    #[test]
    fn test_execute_returns_defensive_copy() {
        let (store, alive) = fixture();
        let mut query = Query::new(QueryDescriptor::new().all(A));
        let mut first = query.execute(&store, &alive);
        first.clear();
        assert_eq!(query.execute(&store, &alive).len(), 2);
    }

    #[test]
    fn test_reactive_query_accessors() {
        let rt = Runtime::new();
        let signal = rt.signal(BTreeSet::from([EntityId::new(1)]));
        let reactive = ReactiveQuery::new(QueryId(0), signal);
        assert_eq!(reactive.id().index(), 0);
        assert_eq!(reactive.peek().len(), 1);
    }
}
