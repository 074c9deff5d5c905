//! # Entity Management
//!
//! Entities are plain `u64` identifiers. The allocator hands them out from
//! a monotonically increasing counter and keeps the set of live ids; it
//! never recycles a destroyed id on its own. The counter does not wrap:
//! once it has issued (or skipped past) `u64::MAX`, [`EntityAllocator::create`]
//! fails until the counter is reset.

use std::collections::BTreeSet;
use std::fmt;

use crate::error::{WorldError, WorldResult};

/// Unique identifier for an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Wraps a raw id.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Live entity table.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    alive: BTreeSet<EntityId>,
    next: u64,
    exhausted: bool,
}

impl EntityAllocator {
    /// Creates an empty table with the counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next free id from the counter.
    ///
    /// Ids claimed explicitly through [`EntityAllocator::create_with_id`]
    /// ahead of the counter are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::EntityIdsExhausted`] once the counter is spent.
    pub fn create(&mut self) -> WorldResult<EntityId> {
        loop {
            if self.exhausted {
                return Err(WorldError::EntityIdsExhausted);
            }
            let id = EntityId(self.next);
            self.advance_past(id);
            if self.alive.insert(id) {
                return Ok(id);
            }
        }
    }

    fn advance_past(&mut self, id: EntityId) {
        match id.0.checked_add(1) {
            Some(next) => self.next = next,
            None => self.exhausted = true,
        }
    }

    /// Claims a specific id.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::DuplicateEntity`] if the id is already alive.
    pub fn create_with_id(&mut self, id: EntityId) -> WorldResult<EntityId> {
        if !self.alive.insert(id) {
            return Err(WorldError::DuplicateEntity(id));
        }
        // Keep the counter ahead so it never hands out a claimed id later.
        if id.0 >= self.next && !self.exhausted {
            self.advance_past(id);
        }
        Ok(id)
    }

    /// Removes an id from the live set. Returns `false` if it was not alive.
    pub fn destroy(&mut self, id: EntityId) -> bool {
        self.alive.remove(&id)
    }

    /// Returns `true` if the id is alive.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.alive.contains(&id)
    }

    /// Number of live entities.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.alive.len()
    }

    /// Returns `true` if no entity is alive.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alive.is_empty()
    }

    /// Live ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.alive.iter().copied()
    }

    /// The live set itself.
    #[inline]
    #[must_use]
    pub fn alive(&self) -> &BTreeSet<EntityId> {
        &self.alive
    }

    /// Value the counter will try next.
    #[inline]
    #[must_use]
    pub fn next_id(&self) -> u64 {
        self.next
    }

    /// Returns `true` once the counter can no longer issue ids.
    #[inline]
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Rewinds the counter to zero. Live ids are still skipped.
    pub fn reset_counter(&mut self) {
        self.next = 0;
        self.exhausted = false;
    }

    /// Forgets every entity and rewinds the counter.
    pub fn clear(&mut self) {
        self.alive.clear();
        self.reset_counter();
    }
}
