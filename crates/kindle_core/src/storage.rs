//! # Component Store
//!
//! Per-entity component storage with a reverse index by type.
//!
//! ```text
//!   by_entity: EntityId ─> { ComponentTypeId ─> [StoredComponent, ...] }
//!   by_type:   ComponentTypeId ─> { EntityId, ... }
//! ```
//!
//! The reverse index is what makes query candidate resolution cheap: a
//! query over `all = [A, B]` starts from `by_type[A] ∩ by_type[B]` instead
//! of scanning every entity.
//!
//! A bucket may hold several instances of the same type. [`ComponentStore::get`]
//! surfaces the first one, [`ComponentStore::bucket`] exposes all of them, and
//! [`ComponentStore::remove`] drops the whole bucket.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::component::{Component, ComponentTypeId};
use crate::entity::EntityId;

/// A component instance stamped with its owner.
pub struct StoredComponent {
    entity: EntityId,
    component: Box<dyn Component>,
}

impl StoredComponent {
    /// Entity this instance was attached to. Never changes.
    #[inline]
    #[must_use]
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    /// The component itself.
    #[inline]
    #[must_use]
    pub fn component(&self) -> &dyn Component {
        self.component.as_ref()
    }
}

impl std::fmt::Debug for StoredComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredComponent")
            .field("entity", &self.entity)
            .field("component", &self.component())
            .finish()
    }
}

static EMPTY: BTreeSet<EntityId> = BTreeSet::new();

/// Indexed component storage.
#[derive(Debug, Default)]
pub struct ComponentStore {
    by_entity: HashMap<EntityId, BTreeMap<ComponentTypeId, Vec<StoredComponent>>>,
    by_type: HashMap<ComponentTypeId, BTreeSet<EntityId>>,
    instances: usize,
}

impl ComponentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a component to the entity's bucket for `type_id`.
    pub fn add(&mut self, entity: EntityId, type_id: ComponentTypeId, component: Box<dyn Component>) {
        let bucket = self
            .by_entity
            .entry(entity)
            .or_default()
            .entry(type_id)
            .or_default();
        if !bucket.is_empty() {
            tracing::debug!(
                %entity,
                component = component.name(),
                stacked = bucket.len() + 1,
                "stacking component instance"
            );
        }
        bucket.push(StoredComponent { entity, component });
        self.instances += 1;
        self.by_type.entry(type_id).or_default().insert(entity);
    }

    /// Removes every instance of `type_id` from the entity.
    ///
    /// Returns `false` if the entity had none.
    pub fn remove(&mut self, entity: EntityId, type_id: ComponentTypeId) -> bool {
        let Some(components) = self.by_entity.get_mut(&entity) else {
            return false;
        };
        let Some(bucket) = components.remove(&type_id) else {
            return false;
        };
        self.instances -= bucket.len();
        if components.is_empty() {
            self.by_entity.remove(&entity);
        }
        self.unindex(entity, type_id);
        true
    }

    /// First instance of `type_id` on the entity.
    #[must_use]
    pub fn get(&self, entity: EntityId, type_id: ComponentTypeId) -> Option<&dyn Component> {
        self.bucket(entity, type_id)
            .first()
            .map(StoredComponent::component)
    }

    /// First instance of `T` on the entity, downcast.
    #[must_use]
    pub fn get_typed<T: Component>(&self, entity: EntityId, type_id: ComponentTypeId) -> Option<&T> {
        self.get(entity, type_id)?.downcast_ref::<T>()
    }

    /// Every instance of `type_id` on the entity, in insertion order.
    #[must_use]
    pub fn bucket(&self, entity: EntityId, type_id: ComponentTypeId) -> &[StoredComponent] {
        self.by_entity
            .get(&entity)
            .and_then(|components| components.get(&type_id))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns `true` if the entity has at least one instance of `type_id`.
    #[must_use]
    pub fn has(&self, entity: EntityId, type_id: ComponentTypeId) -> bool {
        self.by_type
            .get(&type_id)
            .is_some_and(|entities| entities.contains(&entity))
    }

    /// Every component on the entity, grouped by type id order.
    #[must_use]
    pub fn all(&self, entity: EntityId) -> Vec<&dyn Component> {
        self.by_entity
            .get(&entity)
            .into_iter()
            .flat_map(BTreeMap::values)
            .flatten()
            .map(StoredComponent::component)
            .collect()
    }

    /// Type ids present on the entity.
    #[must_use]
    pub fn types_of(&self, entity: EntityId) -> Vec<ComponentTypeId> {
        self.by_entity
            .get(&entity)
            .map(|components| components.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Entities holding `type_id`.
    #[must_use]
    pub fn entities_with(&self, type_id: ComponentTypeId) -> &BTreeSet<EntityId> {
        self.by_type.get(&type_id).unwrap_or(&EMPTY)
    }

    /// Removes everything attached to the entity.
    ///
    /// Returns the type ids that were present.
    pub fn remove_all(&mut self, entity: EntityId) -> Vec<ComponentTypeId> {
        let Some(components) = self.by_entity.remove(&entity) else {
            return Vec::new();
        };
        let mut removed = Vec::with_capacity(components.len());
        for (type_id, bucket) in components {
            self.instances -= bucket.len();
            self.unindex(entity, type_id);
            removed.push(type_id);
        }
        removed
    }

    /// Drops every component of every entity.
    pub fn clear(&mut self) {
        self.by_entity.clear();
        self.by_type.clear();
        self.instances = 0;
    }

    /// Entities holding at least one component.
    #[must_use]
    pub fn all_entities(&self) -> BTreeSet<EntityId> {
        self.by_entity.keys().copied().collect()
    }

    /// Total number of stored instances.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances
    }

    /// Returns `true` if nothing is stored.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances == 0
    }

    fn unindex(&mut self, entity: EntityId, type_id: ComponentTypeId) {
        if let Some(entities) = self.by_type.get_mut(&type_id) {
            entities.remove(&entity);
            if entities.is_empty() {
                self.by_type.remove(&type_id);
            }
        }
    }
}
