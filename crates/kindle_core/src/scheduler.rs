//! # System Scheduler
//!
//! Orders systems per phase and runs them with failure containment.
//!
//! ## Ordering
//!
//! For each phase:
//! 1. Take the systems registered for it, sorted by descending priority,
//!    then registration order. This is the baseline.
//! 2. Build "must run first" edges from `run_after` and from the inverse of
//!    `run_before`. Constraints naming systems outside the phase are ignored.
//! 3. Depth-first visit in baseline order, emitting a system once all of its
//!    predecessors are emitted. An explicit stack replaces recursion.
//!
//! Meeting a system that is still being visited means the constraints are
//! circular; the whole phase order is rejected with the cycle path.
//!
//! The order is cached until a system is added or removed.
//!
//! ## Dispatch
//!
//! Systems run strictly one after another. A system is checked out of the
//! scheduler for the duration of its run so its body can freely mutate the
//! World, including adding or removing systems.
//!
//! ## Failure Handling
//!
//! ```text
//!   body -> Err ─> consecutive_failures += 1
//!               ─> system handler? ─else─> phase handler? ─else─> Ignore
//!               ─> Disable: enabled = false
//!                  Ignore:  warn and move on
//!                  Retry:   run again, at most max_retries times this tick
//!   body -> Ok  ─> consecutive_failures = 0
//! ```

use std::cmp::Reverse;
use std::collections::HashMap;
use std::rc::Rc;

use kindle_reactive::Runtime;

use crate::config::SchedulerConfig;
use crate::error::{SystemResult, WorldError, WorldResult};
use crate::phase::Phase;
use crate::system::{ErrorHandler, ErrorStrategy, System, SystemFailure, SystemId};
use crate::world::World;

/// Per-phase execution orders, as slot indices.
type PhaseOrders = [Vec<usize>; Phase::ALL.len()];

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

/// Registered systems, their cached order and the phase-level handlers.
pub struct Scheduler {
    runtime: Runtime,
    config: SchedulerConfig,
    /// Registration order. `None` marks a removed or checked-out system.
    slots: Vec<Option<System>>,
    index: HashMap<SystemId, usize>,
    order: Option<PhaseOrders>,
    /// Slot of the system currently running, if any.
    running: Option<usize>,
    phase_handlers: [Option<ErrorHandler>; Phase::ALL.len()],
}

impl Scheduler {
    /// Creates an empty scheduler. Reactive systems get trackers from
    /// `runtime`.
    #[must_use]
    pub fn new(runtime: Runtime, config: SchedulerConfig) -> Self {
        Self {
            runtime,
            config,
            slots: Vec::new(),
            index: HashMap::new(),
            order: None,
            running: None,
            phase_handlers: [None, None, None, None, None],
        }
    }

    /// Scheduler settings.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    // =========================================================================
    // Registry
    // =========================================================================

    /// Registers a system.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::DuplicateSystem`] if the id is taken.
    pub fn add(&mut self, mut system: System) -> WorldResult<()> {
        if self.index.contains_key(system.id()) {
            return Err(WorldError::DuplicateSystem(system.id().clone()));
        }
        system.attach_tracker(self.runtime.tracker());
        tracing::debug!(system = %system.id(), "system registered");
        self.index.insert(system.id().clone(), self.slots.len());
        self.slots.push(Some(system));
        self.order = None;
        Ok(())
    }

    /// Unregisters a system. Returns `false` if it was not registered.
    ///
    /// A system removed while it is running finishes its current run.
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(slot) = self.index.remove(id) else {
            return false;
        };
        self.slots[slot] = None;
        self.order = None;
        tracing::debug!(system = id, "system removed");
        true
    }

    /// Looks up a system. A system is invisible while it runs.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&System> {
        let slot = *self.index.get(id)?;
        self.slots[slot].as_ref()
    }

    /// Returns `true` if a system with this id is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Registered systems in registration order.
    pub fn systems(&self) -> impl Iterator<Item = &System> + '_ {
        self.slots.iter().flatten()
    }

    /// Number of registered systems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns `true` if no system is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Turns a system back on and clears its failure counter.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::UnknownSystem`] if the id is not registered.
    pub fn enable(&mut self, id: &str) -> WorldResult<()> {
        self.system_mut(id)?.set_enabled(true);
        Ok(())
    }

    /// Turns a system off.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::UnknownSystem`] if the id is not registered.
    pub fn disable(&mut self, id: &str) -> WorldResult<()> {
        self.system_mut(id)?.set_enabled(false);
        Ok(())
    }

    /// Installs the handler consulted for failures in `phase` when the
    /// failing system has none of its own.
    pub fn set_phase_handler<H>(&mut self, phase: Phase, handler: H)
    where
        H: FnMut(&SystemFailure<'_>) -> ErrorStrategy + 'static,
    {
        self.phase_handlers[phase.index()] = Some(Box::new(handler));
    }

    /// Removes every system and phase handler.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
        self.order = None;
        self.phase_handlers = [None, None, None, None, None];
    }

    fn system_mut(&mut self, id: &str) -> WorldResult<&mut System> {
        self.index
            .get(id)
            .and_then(|&slot| self.slots[slot].as_mut())
            .ok_or_else(|| WorldError::UnknownSystem(SystemId::from(id)))
    }

    // =========================================================================
    // Ordering
    // =========================================================================

    /// Execution order of `phase`.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::CircularDependency`] if the constraints of any
    /// phase form a cycle.
    pub fn execution_order(&mut self, phase: Phase) -> WorldResult<Vec<SystemId>> {
        let slots = self.phase_order(phase)?;
        Ok(slots
            .into_iter()
            .filter_map(|slot| self.slots[slot].as_ref().map(|s| s.id().clone()))
            .collect())
    }

    fn phase_order(&mut self, phase: Phase) -> WorldResult<Vec<usize>> {
        if self.order.is_none() {
            // The running system's slot is empty; an order computed now lacks
            // it and must not be cached.
            if self.running.is_some() {
                return self.compute_order(phase);
            }
            let mut orders = PhaseOrders::default();
            for phase in Phase::ALL {
                orders[phase.index()] = self.compute_order(phase)?;
            }
            tracing::debug!(systems = self.len(), "execution order recomputed");
            self.order = Some(orders);
        }
        Ok(self
            .order
            .as_ref()
            .map(|orders| orders[phase.index()].clone())
            .unwrap_or_default())
    }

    fn compute_order(&self, phase: Phase) -> WorldResult<Vec<usize>> {
        let mut members: Vec<(usize, &System)> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(slot, system)| system.as_ref().map(|s| (slot, s)))
            .filter(|(_, system)| system.runs_in(phase))
            .collect();
        members.sort_by_key(|&(slot, system)| (Reverse(system.priority()), slot));

        let rank: HashMap<&SystemId, usize> = members
            .iter()
            .enumerate()
            .map(|(rank, (_, system))| (system.id(), rank))
            .collect();

        // predecessors[r] = ranks that must run before rank r, in rank order.
        let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); members.len()];
        for (r, (_, system)) in members.iter().enumerate() {
            for after in system.run_after() {
                if let Some(&p) = rank.get(after) {
                    predecessors[r].push(p);
                }
            }
            for before in system.run_before() {
                if let Some(&s) = rank.get(before) {
                    predecessors[s].push(r);
                }
            }
        }
        for list in &mut predecessors {
            list.sort_unstable();
            list.dedup();
        }

        let mut marks = vec![Mark::Unvisited; members.len()];
        let mut output = Vec::with_capacity(members.len());
        // (rank, next predecessor to look at)
        let mut stack: Vec<(usize, usize)> = Vec::new();

        for root in 0..members.len() {
            if marks[root] != Mark::Unvisited {
                continue;
            }
            marks[root] = Mark::Visiting;
            stack.push((root, 0));

            while let Some(top) = stack.last_mut() {
                let (node, next) = *top;
                if let Some(&pred) = predecessors[node].get(next) {
                    top.1 += 1;
                    match marks[pred] {
                        Mark::Done => {}
                        Mark::Visiting => {
                            let start = stack.iter().position(|&(n, _)| n == pred).unwrap_or(0);
                            let mut cycle: Vec<SystemId> = stack[start..]
                                .iter()
                                .map(|&(n, _)| members[n].1.id().clone())
                                .collect();
                            cycle.push(members[pred].1.id().clone());
                            return Err(WorldError::CircularDependency { phase, cycle });
                        }
                        Mark::Unvisited => {
                            marks[pred] = Mark::Visiting;
                            stack.push((pred, 0));
                        }
                    }
                } else {
                    marks[node] = Mark::Done;
                    output.push(members[node].0);
                    stack.pop();
                }
            }
        }

        Ok(output)
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    fn checkout(&mut self, slot: usize) -> Option<System> {
        let system = self.slots.get_mut(slot).and_then(Option::take)?;
        self.running = Some(slot);
        Some(system)
    }

    /// Puts a system back unless it was removed (or replaced) mid-run.
    fn checkin(&mut self, slot: usize, system: System) {
        self.running = None;
        if self.index.get(system.id()) == Some(&slot) {
            self.slots[slot] = Some(system);
        } else {
            tracing::debug!(system = %system.id(), "dropping system removed during its run");
        }
    }

    /// Applies the handler chain to a failure. Returns `true` to retry.
    fn settle(&mut self, system: &mut System, phase: Phase, result: SystemResult, retries: &mut u32) -> bool {
        let error = match result {
            Ok(()) => {
                system.record_success();
                return false;
            }
            Err(error) => error,
        };

        let consecutive_failures = system.record_failure(&error);
        let id = system.id().clone();
        let failure = SystemFailure {
            system: &id,
            phase,
            error: &error,
            consecutive_failures,
        };
        let strategy = system
            .handle_failure(&failure)
            .or_else(|| self.phase_handlers[phase.index()].as_mut().map(|h| h(&failure)))
            .unwrap_or_default();

        tracing::warn!(
            system = %id,
            %phase,
            failures = consecutive_failures,
            ?strategy,
            error = %error,
            "system failed"
        );

        match strategy {
            ErrorStrategy::Disable => {
                system.set_enabled(false);
                false
            }
            ErrorStrategy::Ignore => false,
            ErrorStrategy::Retry if *retries < self.config.max_retries => {
                *retries += 1;
                true
            }
            ErrorStrategy::Retry => false,
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("systems", &self.systems().collect::<Vec<_>>())
            .field("order_cached", &self.order.is_some())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Runs every system of `phase` once, from synchronous code.
///
/// # Errors
///
/// Only structural errors (a circular ordering) escape. System failures
/// are contained.
pub(crate) fn dispatch(world: &mut World, phase: Phase, delta: f64) -> WorldResult<()> {
    let order = world.scheduler_mut().phase_order(phase)?;
    for slot in order {
        let Some(mut system) = world.scheduler_mut().checkout(slot) else {
            continue;
        };
        if system.should_run() {
            let mut retries = 0;
            loop {
                let result = if system.is_async() {
                    match world.executor() {
                        Ok(executor) => system.invoke(world, Some(executor.as_ref()), phase, delta),
                        Err(error) => Err(error),
                    }
                } else {
                    system.invoke(world, None, phase, delta)
                };
                if !world.scheduler_mut().settle(&mut system, phase, result, &mut retries) {
                    break;
                }
            }
        }
        world.scheduler_mut().checkin(slot, system);
    }
    Ok(())
}

/// Runs every system of `phase` once, awaiting async bodies.
///
/// # Errors
///
/// Only structural errors (a circular ordering) escape.
pub(crate) async fn dispatch_async(world: &mut World, phase: Phase, delta: f64) -> WorldResult<()> {
    let order = world.scheduler_mut().phase_order(phase)?;
    for slot in order {
        let Some(mut system) = world.scheduler_mut().checkout(slot) else {
            continue;
        };
        if system.should_run() {
            let mut retries = 0;
            loop {
                let result = system.invoke_async(world, phase, delta).await;
                if !world.scheduler_mut().settle(&mut system, phase, result, &mut retries) {
                    break;
                }
            }
        }
        world.scheduler_mut().checkin(slot, system);
    }
    Ok(())
}

/// Builds the executor used for async bodies in synchronous dispatch.
pub(crate) fn build_executor() -> Result<Rc<tokio::runtime::Runtime>, std::io::Error> {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map(Rc::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::SystemContext;

    fn noop(_: &mut SystemContext<'_>) -> SystemResult {
        Ok(())
    }

    fn scheduler() -> Scheduler {
        Scheduler::new(Runtime::new(), SchedulerConfig::default())
    }

    fn ids(order: &[SystemId]) -> Vec<&str> {
        order.iter().map(SystemId::as_str).collect()
    }

    #[test]
    fn test_priority_then_registration_order() {
        let mut s = scheduler();
        s.add(System::new("low", noop).with_priority(-1)).unwrap();
        s.add(System::new("a", noop)).unwrap();
        s.add(System::new("high", noop).with_priority(5)).unwrap();
        s.add(System::new("b", noop)).unwrap();
        let order = s.execution_order(Phase::Update).unwrap();
        assert_eq!(ids(&order), ["high", "a", "b", "low"]);
    }

    #[test]
    fn test_run_after_beats_priority() {
        let mut s = scheduler();
        s.add(System::new("x", noop).after("y").with_priority(100)).unwrap();
        s.add(System::new("y", noop)).unwrap();
        let order = s.execution_order(Phase::Update).unwrap();
        assert_eq!(ids(&order), ["y", "x"]);
    }

    #[test]
    fn test_run_before_defers_target() {
        let mut s = scheduler();
        s.add(System::new("render", noop).with_priority(10)).unwrap();
        s.add(System::new("physics", noop).before("render")).unwrap();
        let order = s.execution_order(Phase::Update).unwrap();
        assert_eq!(ids(&order), ["physics", "render"]);
    }

    #[test]
    fn test_constraints_outside_phase_are_ignored() {
        let mut s = scheduler();
        s.add(System::new("a", noop).after("elsewhere")).unwrap();
        s.add(System::new("elsewhere", noop).in_phase(Phase::Init)).unwrap();
        assert_eq!(ids(&s.execution_order(Phase::Update).unwrap()), ["a"]);
        assert_eq!(ids(&s.execution_order(Phase::Init).unwrap()), ["elsewhere"]);
    }

    #[test]
    fn test_cycle_is_reported() {
        let mut s = scheduler();
        s.add(System::new("z", noop).after("y")).unwrap();
        s.add(System::new("y", noop).after("z")).unwrap();
        match s.execution_order(Phase::Update) {
            Err(WorldError::CircularDependency { phase, cycle }) => {
                assert_eq!(phase, Phase::Update);
                assert_eq!(cycle.first(), cycle.last());
                assert_eq!(cycle.len(), 3);
            }
            other => panic!("expected a cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_order_cache_invalidated_on_change() {
        let mut s = scheduler();
        s.add(System::new("a", noop)).unwrap();
        assert_eq!(s.execution_order(Phase::Update).unwrap().len(), 1);
        s.add(System::new("b", noop)).unwrap();
        assert_eq!(s.execution_order(Phase::Update).unwrap().len(), 2);
        assert!(s.remove("a"));
        assert!(!s.remove("a"));
        assert_eq!(ids(&s.execution_order(Phase::Update).unwrap()), ["b"]);
    }

    #[test]
    fn test_duplicate_and_unknown_ids() {
        let mut s = scheduler();
        s.add(System::new("a", noop)).unwrap();
        assert_eq!(
            s.add(System::new("a", noop)),
            Err(WorldError::DuplicateSystem(SystemId::from("a")))
        );
        assert_eq!(
            s.disable("missing"),
            Err(WorldError::UnknownSystem(SystemId::from("missing")))
        );
    }

    #[test]
    fn test_enable_disable() {
        let mut s = scheduler();
        s.add(System::new("a", noop)).unwrap();
        s.disable("a").unwrap();
        assert!(!s.get("a").unwrap().is_enabled());
        s.enable("a").unwrap();
        assert!(s.get("a").unwrap().is_enabled());
    }
}
