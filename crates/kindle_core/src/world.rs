//! # World
//!
//! Owns everything and drives the phases.
//!
//! ```text
//! update(delta):
//! ┌──────────────────────────────────────────────────────────────┐
//! │ 1. accumulator += delta                                      │
//! │ 2. FixedUpdate × n   while accumulator >= fixed_timestep      │
//! │                      and n < max_fixed_updates               │
//! │    (cap hit: leftover accumulator is discarded)              │
//! │ 3. Update            once, with delta                        │
//! │ 4. LateUpdate        once, with delta                        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! `Init` runs once, on [`World::init`] or lazily before the first tick.
//! `Cleanup` runs on [`World::cleanup`] and on [`World::destroy`].
//!
//! Structural mutations (component add/remove, entity destruction,
//! [`World::clear`], [`World::destroy`]) run inside one reactive batch, so
//! effects watching several cells or a [`ReactiveQuery`] see a single
//! consolidated change.

use std::collections::BTreeSet;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use kindle_reactive::{Runtime, Signal};

use crate::component::{Component, ComponentRegistry, ComponentTypeId};
use crate::config::WorldConfig;
use crate::entity::{EntityAllocator, EntityId};
use crate::error::{ConfigError, SystemError, WorldError, WorldResult};
use crate::phase::Phase;
use crate::query::{Query, QueryBuilder, QueryCache, QueryDescriptor, QueryId, ReactiveQuery};
use crate::scheduler::{self, Scheduler};
use crate::storage::ComponentStore;
use crate::system::{ErrorStrategy, System, SystemFailure, SystemId};

/// Cloneable switch that ends [`World::start`] from anywhere.
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Asks the loop to stop after the current tick.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns `true` once a stop was requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn rearm(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// The engine's root object.
pub struct World {
    config: WorldConfig,
    runtime: Runtime,
    registry: ComponentRegistry,
    entities: EntityAllocator,
    store: ComponentStore,
    queries: QueryCache,
    reactive_queries: Vec<(QueryId, Signal<BTreeSet<EntityId>>)>,
    scheduler: Scheduler,
    /// Built on first synchronous dispatch of an async body.
    executor: Option<Rc<tokio::runtime::Runtime>>,
    time: f64,
    fixed_time: f64,
    accumulator: f64,
    tick_count: u64,
    initialized: bool,
    paused: bool,
    running: bool,
    destroyed: bool,
    stop: StopHandle,
}

impl World {
    /// Creates a world with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::build(WorldConfig::default())
    }

    /// Creates a world with a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `config` fails validation.
    pub fn with_config(config: WorldConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: WorldConfig) -> Self {
        let runtime = Runtime::new();
        let scheduler = Scheduler::new(runtime.clone(), config.scheduler.clone());
        Self {
            config,
            runtime,
            registry: ComponentRegistry::new(),
            entities: EntityAllocator::new(),
            store: ComponentStore::new(),
            queries: QueryCache::new(),
            reactive_queries: Vec::new(),
            scheduler,
            executor: None,
            time: 0.0,
            fixed_time: 0.0,
            accumulator: 0.0,
            tick_count: 0,
            initialized: false,
            paused: false,
            running: false,
            destroyed: false,
            stop: StopHandle::default(),
        }
    }

    /// The reactive runtime component fields should be created from.
    #[inline]
    #[must_use]
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    fn ensure_alive(&self) -> WorldResult<()> {
        if self.destroyed {
            Err(WorldError::Destroyed)
        } else {
            Ok(())
        }
    }

    // =========================================================================
    // Entities
    // =========================================================================

    /// Creates an entity with the next free id.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::Destroyed`] after [`World::destroy`] and
    /// [`WorldError::EntityIdsExhausted`] once the id counter is spent.
    pub fn create_entity(&mut self) -> WorldResult<EntityId> {
        self.ensure_alive()?;
        let entity = self.entities.create()?;
        self.after_entity_created(entity);
        Ok(entity)
    }

    /// Creates an entity with an explicit id.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::DuplicateEntity`] if the id is alive.
    pub fn create_entity_with_id(&mut self, id: impl Into<EntityId>) -> WorldResult<EntityId> {
        self.ensure_alive()?;
        let entity = self.entities.create_with_id(id.into())?;
        self.after_entity_created(entity);
        Ok(entity)
    }

    fn after_entity_created(&mut self, entity: EntityId) {
        tracing::debug!(%entity, "entity created");
        self.queries.mark_scans_dirty();
        let runtime = self.runtime.clone();
        runtime.batch(|| self.sync_reactive_membership(entity));
    }

    /// Destroys an entity and every component it owns.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::EntityNotFound`] if the entity is not alive.
    pub fn destroy_entity(&mut self, entity: EntityId) -> WorldResult<()> {
        self.ensure_alive()?;
        if !self.entities.contains(entity) {
            return Err(WorldError::EntityNotFound(entity));
        }
        let runtime = self.runtime.clone();
        runtime.batch(|| {
            let removed = self.store.remove_all(entity);
            self.entities.destroy(entity);
            self.queries.mark_all_dirty();
            self.sync_reactive_membership(entity);
            tracing::debug!(%entity, components = removed.len(), "entity destroyed");
        });
        Ok(())
    }

    /// Returns `true` if the entity is alive.
    #[must_use]
    pub fn has_entity(&self, entity: EntityId) -> bool {
        self.entities.contains(entity)
    }

    /// Live entities in ascending id order.
    pub fn all_entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.iter()
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Makes the auto-increment counter start over from 0. Live ids are
    /// still skipped.
    pub fn reset_entity_counter(&mut self) {
        self.entities.reset_counter();
    }

    // =========================================================================
    // Components
    // =========================================================================

    /// Id of component type `T` in this world, registering it on first use.
    pub fn component_type<T: Component>(&mut self) -> ComponentTypeId {
        self.registry.register::<T>()
    }

    /// Attaches a component.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::EntityNotFound`] if the entity is not alive.
    pub fn add_component<T: Component>(&mut self, entity: EntityId, component: T) -> WorldResult<()> {
        self.add_boxed(entity, Box::new(component))
    }

    /// Attaches an already boxed component.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::EntityNotFound`] if the entity is not alive.
    pub fn add_boxed(&mut self, entity: EntityId, component: Box<dyn Component>) -> WorldResult<()> {
        self.ensure_alive()?;
        if !self.entities.contains(entity) {
            return Err(WorldError::EntityNotFound(entity));
        }
        let type_id = self.registry.register_dyn(component.as_ref());
        let runtime = self.runtime.clone();
        runtime.batch(|| {
            self.store.add(entity, type_id, component);
            self.queries.mark_dirty_for_component(type_id);
            self.sync_reactive_membership(entity);
        });
        Ok(())
    }

    /// Detaches every instance of `T`. Returns `false` if there was none.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::EntityNotFound`] if the entity is not alive.
    pub fn remove_component<T: Component>(&mut self, entity: EntityId) -> WorldResult<bool> {
        self.ensure_alive()?;
        if !self.entities.contains(entity) {
            return Err(WorldError::EntityNotFound(entity));
        }
        let Some(type_id) = self.registry.get::<T>() else {
            return Ok(false);
        };
        let runtime = self.runtime.clone();
        Ok(runtime.batch(|| {
            let removed = self.store.remove(entity, type_id);
            if removed {
                self.queries.mark_dirty_for_component(type_id);
                self.sync_reactive_membership(entity);
            }
            removed
        }))
    }

    /// First `T` attached to the entity.
    #[must_use]
    pub fn get_component<T: Component>(&self, entity: EntityId) -> Option<&T> {
        let type_id = self.registry.get::<T>()?;
        self.store.get_typed::<T>(entity, type_id)
    }

    /// Every `T` attached to the entity, in insertion order.
    pub fn component_bucket<T: Component>(&self, entity: EntityId) -> Vec<&T> {
        let Some(type_id) = self.registry.get::<T>() else {
            return Vec::new();
        };
        self.store
            .bucket(entity, type_id)
            .iter()
            .filter_map(|stored| stored.component().downcast_ref::<T>())
            .collect()
    }

    /// Returns `true` if at least one `T` is attached.
    #[must_use]
    pub fn has_component<T: Component>(&self, entity: EntityId) -> bool {
        self.registry
            .get::<T>()
            .is_some_and(|type_id| self.store.has(entity, type_id))
    }

    /// Every component attached to the entity.
    #[must_use]
    pub fn all_components(&self, entity: EntityId) -> Vec<&dyn Component> {
        self.store.all(entity)
    }

    /// Read access to the underlying store.
    #[must_use]
    pub fn store(&self) -> &ComponentStore {
        &self.store
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Resolves a descriptor to its cached query.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::EmptyQuery`] for a descriptor without filters.
    pub fn query(&mut self, descriptor: &QueryDescriptor) -> WorldResult<QueryId> {
        self.ensure_alive()?;
        self.queries.get_or_insert(descriptor)
    }

    /// Runs a cached query. `None` for an id this world never issued.
    pub fn execute(&mut self, id: QueryId) -> Option<BTreeSet<EntityId>> {
        let query = self.queries.get_mut(id)?;
        Some(query.execute(&self.store, self.entities.alive()))
    }

    /// Resolves and runs a descriptor in one step.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::EmptyQuery`] for a descriptor without filters.
    pub fn query_entities(&mut self, descriptor: &QueryDescriptor) -> WorldResult<BTreeSet<EntityId>> {
        let id = self.query(descriptor)?;
        Ok(self.execute(id).unwrap_or_default())
    }

    /// Inspects a cached query without running it.
    #[must_use]
    pub fn cached_query(&self, id: QueryId) -> Option<&Query> {
        self.queries.get(id)
    }

    /// Number of distinct cached queries.
    #[must_use]
    pub fn query_count(&self) -> usize {
        self.queries.len()
    }

    /// Resolves a descriptor to a query whose membership is kept in a
    /// signal. Repeated calls share the signal.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::EmptyQuery`] for a descriptor without filters.
    pub fn reactive_query(&mut self, descriptor: &QueryDescriptor) -> WorldResult<ReactiveQuery> {
        let id = self.query(descriptor)?;
        if let Some((_, signal)) = self.reactive_queries.iter().find(|(qid, _)| *qid == id) {
            return Ok(ReactiveQuery::new(id, signal.clone()));
        }
        let entities = self.execute(id).unwrap_or_default();
        let signal = self.runtime.signal(entities);
        self.reactive_queries.push((id, signal.clone()));
        Ok(ReactiveQuery::new(id, signal))
    }

    /// Starts a fluent query.
    pub fn query_builder(&mut self) -> QueryBuilder<'_> {
        QueryBuilder::new(self)
    }

    /// Adds or drops one entity from every reactive query it entered or
    /// left. Membership signals change in place and only on a real change.
    fn sync_reactive_membership(&self, entity: EntityId) {
        let alive = self.entities.contains(entity);
        for (id, signal) in &self.reactive_queries {
            let Some(query) = self.queries.get(*id) else {
                continue;
            };
            let member = alive && query.descriptor().matches(&self.store, entity);
            signal.mutate(|entities| {
                if member {
                    entities.insert(entity)
                } else {
                    entities.remove(&entity)
                }
            });
        }
    }

    /// Recomputes every reactive query gone dirty from scratch.
    fn refresh_reactive_queries(&mut self) {
        for (id, signal) in &self.reactive_queries {
            let Some(query) = self.queries.get_mut(*id) else {
                continue;
            };
            if query.is_dirty() {
                signal.set(query.execute(&self.store, self.entities.alive()));
            }
        }
    }

    // =========================================================================
    // Systems
    // =========================================================================

    /// Registers a system.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::DuplicateSystem`] if the id is taken.
    pub fn add_system(&mut self, system: System) -> WorldResult<()> {
        self.ensure_alive()?;
        self.scheduler.add(system)
    }

    /// Unregisters a system. Returns `false` if it was not registered.
    pub fn remove_system(&mut self, id: &str) -> bool {
        self.scheduler.remove(id)
    }

    /// Looks up a system. A system is not visible to itself while running.
    #[must_use]
    pub fn system(&self, id: &str) -> Option<&System> {
        self.scheduler.get(id)
    }

    /// Returns `true` if the id is registered.
    #[must_use]
    pub fn has_system(&self, id: &str) -> bool {
        self.scheduler.contains(id)
    }

    /// Registered systems in registration order.
    pub fn all_systems(&self) -> impl Iterator<Item = &System> + '_ {
        self.scheduler.systems()
    }

    /// Re-enables a system and clears its failure counter.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::UnknownSystem`] if the id is not registered or
    /// names the system currently running.
    pub fn enable_system(&mut self, id: &str) -> WorldResult<()> {
        self.scheduler.enable(id)
    }

    /// Disables a system.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::UnknownSystem`] if the id is not registered or
    /// names the system currently running.
    pub fn disable_system(&mut self, id: &str) -> WorldResult<()> {
        self.scheduler.disable(id)
    }

    /// Installs the fallback failure handler for `phase`.
    pub fn set_phase_handler<H>(&mut self, phase: Phase, handler: H)
    where
        H: FnMut(&SystemFailure<'_>) -> ErrorStrategy + 'static,
    {
        self.scheduler.set_phase_handler(phase, handler);
    }

    /// Execution order of `phase`.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::CircularDependency`] if any phase has a cycle.
    pub fn execution_order(&mut self, phase: Phase) -> WorldResult<Vec<SystemId>> {
        self.scheduler.execution_order(phase)
    }

    pub(crate) fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    /// Executor for async bodies dispatched from synchronous code.
    pub(crate) fn executor(&mut self) -> Result<Rc<tokio::runtime::Runtime>, SystemError> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(SystemError::NestedRuntime);
        }
        if let Some(executor) = &self.executor {
            return Ok(Rc::clone(executor));
        }
        let executor = scheduler::build_executor().map_err(|err| SystemError::Executor(err.to_string()))?;
        self.executor = Some(Rc::clone(&executor));
        Ok(executor)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Runs the `Init` phase. Later calls do nothing.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::CircularDependency`] or [`WorldError::Destroyed`].
    pub fn init(&mut self) -> WorldResult<()> {
        self.ensure_alive()?;
        if self.initialized {
            return Ok(());
        }
        scheduler::dispatch(self, Phase::Init, 0.0)?;
        self.initialized = true;
        tracing::info!(systems = self.scheduler.len(), "world initialized");
        Ok(())
    }

    /// [`World::init`] for worlds with async `Init` systems.
    ///
    /// # Errors
    ///
    /// Same as [`World::init`].
    pub async fn init_async(&mut self) -> WorldResult<()> {
        self.ensure_alive()?;
        if self.initialized {
            return Ok(());
        }
        scheduler::dispatch_async(self, Phase::Init, 0.0).await?;
        self.initialized = true;
        tracing::info!(systems = self.scheduler.len(), "world initialized");
        Ok(())
    }

    /// Advances the world by `delta` milliseconds.
    ///
    /// Does nothing while paused. Async bodies are driven to completion on
    /// an internal executor; inside a tokio runtime use
    /// [`World::update_async`] instead.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::CircularDependency`] or [`WorldError::Destroyed`].
    /// System failures are contained and never surface here.
    pub fn update(&mut self, delta: f64) -> WorldResult<()> {
        self.ensure_alive()?;
        if self.paused {
            return Ok(());
        }
        self.init()?;
        let step = self.config.fixed_timestep;
        for _ in 0..self.advance_clock(delta) {
            scheduler::dispatch(self, Phase::FixedUpdate, step)?;
            self.fixed_time += step;
        }
        scheduler::dispatch(self, Phase::Update, delta)?;
        scheduler::dispatch(self, Phase::LateUpdate, delta)?;
        self.tick_count += 1;
        Ok(())
    }

    /// [`World::update`], awaiting async bodies in place.
    ///
    /// # Errors
    ///
    /// Same as [`World::update`].
    pub async fn update_async(&mut self, delta: f64) -> WorldResult<()> {
        self.ensure_alive()?;
        if self.paused {
            return Ok(());
        }
        self.init_async().await?;
        let step = self.config.fixed_timestep;
        for _ in 0..self.advance_clock(delta) {
            scheduler::dispatch_async(self, Phase::FixedUpdate, step).await?;
            self.fixed_time += step;
        }
        scheduler::dispatch_async(self, Phase::Update, delta).await?;
        scheduler::dispatch_async(self, Phase::LateUpdate, delta).await?;
        self.tick_count += 1;
        Ok(())
    }

    /// Adds `delta` to the clocks and returns how many fixed steps are due.
    fn advance_clock(&mut self, delta: f64) -> u32 {
        self.time += delta;
        self.accumulator += delta;
        let step = self.config.fixed_timestep;
        let cap = self.config.max_fixed_updates;
        let mut steps = 0;
        while self.accumulator >= step && steps < cap {
            self.accumulator -= step;
            steps += 1;
        }
        if steps == cap {
            if self.accumulator >= step {
                tracing::warn!(
                    discarded_ms = self.accumulator,
                    max_fixed_updates = cap,
                    "fixed update cap hit, dropping accumulated time"
                );
            }
            self.accumulator = 0.0;
        }
        steps
    }

    /// Runs the `Cleanup` phase.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::CircularDependency`] or [`WorldError::Destroyed`].
    pub fn cleanup(&mut self) -> WorldResult<()> {
        self.ensure_alive()?;
        scheduler::dispatch(self, Phase::Cleanup, 0.0)
    }

    /// Runs `Cleanup` if the world was initialized, then drops every entity,
    /// component, query and system. Afterwards every mutating call returns
    /// [`WorldError::Destroyed`]. Calling it again does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::CircularDependency`] from the cleanup phase;
    /// the world is torn down regardless.
    pub fn destroy(&mut self) -> WorldResult<()> {
        if self.destroyed {
            return Ok(());
        }
        let cleanup = if self.initialized {
            scheduler::dispatch(self, Phase::Cleanup, 0.0)
        } else {
            Ok(())
        };

        let runtime = self.runtime.clone();
        runtime.batch(|| {
            self.store.clear();
            self.entities.clear();
            self.queries.mark_all_dirty();
            self.refresh_reactive_queries();
            self.reactive_queries.clear();
            self.queries.clear();
            self.scheduler.clear();
        });
        self.destroyed = true;
        self.stop.stop();
        tracing::info!(ticks = self.tick_count, "world destroyed");
        cleanup
    }

    /// Drops every entity and component. Systems and cached queries stay;
    /// queries simply come back empty.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::Destroyed`] after [`World::destroy`].
    pub fn clear(&mut self) -> WorldResult<()> {
        self.ensure_alive()?;
        let runtime = self.runtime.clone();
        runtime.batch(|| {
            self.store.clear();
            self.entities.clear();
            self.queries.mark_all_dirty();
            self.refresh_reactive_queries();
        });
        tracing::debug!("world cleared");
        Ok(())
    }

    /// Makes [`World::update`] a no-op until [`World::resume`].
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Undoes [`World::pause`].
    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Returns `true` while paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Returns `true` after [`World::init`] ran.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Returns `true` after [`World::destroy`].
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    // =========================================================================
    // Self-driving loop
    // =========================================================================

    /// Ticks the world at `target_fps` until stopped.
    ///
    /// The measured wall time between ticks is the update delta. The loop
    /// ends after the tick in which [`World::stop`] or a [`StopHandle`] was
    /// used.
    ///
    /// # Errors
    ///
    /// Returns the first structural error raised by a tick.
    pub async fn start(&mut self) -> WorldResult<()> {
        self.ensure_alive()?;
        self.stop.rearm();
        self.running = true;
        tracing::info!(target_fps = self.config.target_fps, "world loop started");
        let result = self.run_loop().await;
        self.running = false;
        tracing::info!(ticks = self.tick_count, "world loop stopped");
        result
    }

    async fn run_loop(&mut self) -> WorldResult<()> {
        let mut interval = tokio::time::interval(self.config.frame_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last = tokio::time::Instant::now();
        while !self.stop.is_stopped() {
            interval.tick().await;
            let now = tokio::time::Instant::now();
            let delta = now.duration_since(last).as_secs_f64() * 1000.0;
            last = now;
            self.update_async(delta).await?;
        }
        Ok(())
    }

    /// Requests the self-driving loop to stop.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// A handle that can stop the loop while the world is borrowed by it.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Returns `true` while [`World::start`] is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    // =========================================================================
    // Clocks
    // =========================================================================

    /// Total simulated milliseconds.
    #[inline]
    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Milliseconds covered by completed fixed steps.
    #[inline]
    #[must_use]
    pub fn fixed_time(&self) -> f64 {
        self.fixed_time
    }

    /// Completed ticks.
    #[inline]
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entities", &self.entities.len())
            .field("components", &self.store.len())
            .field("queries", &self.queries.len())
            .field("systems", &self.scheduler.len())
            .field("time", &self.time)
            .field("tick_count", &self.tick_count)
            .field("paused", &self.paused)
            .field("destroyed", &self.destroyed)
            .finish_non_exhaustive()
    }
}

impl Drop for World {
    fn drop(&mut self) {
        // Dropping a tokio runtime from async context panics.
        if let Some(executor) = self.executor.take().and_then(|rc| Rc::try_unwrap(rc).ok()) {
            executor.shutdown_background();
        }
    }
}
