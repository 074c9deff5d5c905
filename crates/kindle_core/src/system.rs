//! # Systems
//!
//! A system is a named body of work registered for one or more phases.
//!
//! ```text
//!   System
//!   ├─ id / name
//!   ├─ phases        {Init, FixedUpdate, Update, LateUpdate, Cleanup}
//!   ├─ priority      higher runs earlier (tie-break only)
//!   ├─ run_before    ids that must run after this one
//!   ├─ run_after     ids that must run before this one
//!   ├─ reactive      skip ticks where nothing it read changed
//!   ├─ on_error      ErrorStrategy chooser
//!   └─ body          sync closure or async closure
//! ```
//!
//! # Example
//!
//! ```rust
//! use kindle_core::{disable_after, Phase, System, SystemError};
//!
//! let physics = System::new("physics", |ctx| {
//!     let _dt = ctx.delta;
//!     Ok(())
//! })
//! .in_phase(Phase::FixedUpdate)
//! .after("input");
//!
//! let flaky = System::new("flaky", |_| Err(SystemError::msg("boom")))
//!     .on_error(disable_after(3));
//! # let _ = (physics, flaky);
//! ```

use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use kindle_reactive::Tracker;

use crate::error::{SystemError, SystemResult};
use crate::phase::Phase;
use crate::world::World;

/// Boxed, non-`Send` future returned by async system bodies.
pub type LocalBoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

type SyncBody = Box<dyn FnMut(&mut SystemContext<'_>) -> SystemResult>;
type AsyncBody = Box<dyn for<'a> FnMut(&'a mut SystemContext<'a>) -> LocalBoxFuture<'a, SystemResult>>;

/// Chooses what happens after a failed run.
pub type ErrorHandler = Box<dyn FnMut(&SystemFailure<'_>) -> ErrorStrategy>;

// =============================================================================
// IDENTITY
// =============================================================================

/// Unique system identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SystemId(String);

impl SystemId {
    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SystemId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for SystemId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&SystemId> for SystemId {
    fn from(id: &SystemId) -> Self {
        id.clone()
    }
}

impl Borrow<str> for SystemId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// CONTEXT & FAILURE POLICY
// =============================================================================

/// What a system body gets to work with.
pub struct SystemContext<'w> {
    /// The world being ticked.
    pub world: &'w mut World,
    /// Phase currently dispatching.
    pub phase: Phase,
    /// Milliseconds: the fixed timestep in [`Phase::FixedUpdate`], the
    /// frame delta otherwise.
    pub delta: f64,
}

/// Resolution of a failed run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ErrorStrategy {
    /// Turn the system off until it is explicitly re-enabled.
    Disable,
    /// Log and carry on with the next system.
    #[default]
    Ignore,
    /// Run the body again right away, up to the scheduler's retry limit.
    Retry,
}

/// Everything an [`ErrorHandler`] may look at.
#[derive(Debug)]
pub struct SystemFailure<'a> {
    /// The failing system.
    pub system: &'a SystemId,
    /// Phase it failed in.
    pub phase: Phase,
    /// The error it returned.
    pub error: &'a SystemError,
    /// Failures in a row, this one included.
    pub consecutive_failures: u32,
}

/// Handler that ignores failures until `threshold` in a row, then disables.
pub fn disable_after(threshold: u32) -> impl FnMut(&SystemFailure<'_>) -> ErrorStrategy {
    move |failure: &SystemFailure<'_>| {
        if failure.consecutive_failures >= threshold {
            ErrorStrategy::Disable
        } else {
            ErrorStrategy::Ignore
        }
    }
}

/// Handler that always retries.
pub fn always_retry() -> impl FnMut(&SystemFailure<'_>) -> ErrorStrategy {
    |_: &SystemFailure<'_>| ErrorStrategy::Retry
}

// =============================================================================
// SYSTEM
// =============================================================================

enum Body {
    Sync(SyncBody),
    Async(AsyncBody),
}

/// A schedulable unit of work.
pub struct System {
    id: SystemId,
    name: String,
    phases: BTreeSet<Phase>,
    priority: i32,
    enabled: bool,
    run_before: BTreeSet<SystemId>,
    run_after: BTreeSet<SystemId>,
    reactive: bool,
    on_error: Option<ErrorHandler>,
    body: Body,
    consecutive_failures: u32,
    run_count: u64,
    last_error: Option<String>,
    tracker: Option<Tracker>,
}

impl System {
    /// Creates a system with a synchronous body.
    ///
    /// Defaults: phase [`Phase::Update`], priority 0, enabled, not reactive.
    pub fn new<F>(id: impl Into<SystemId>, body: F) -> Self
    where
        F: FnMut(&mut SystemContext<'_>) -> SystemResult + 'static,
    {
        Self::with_body(id.into(), Body::Sync(Box::new(body)))
    }

    /// Creates a system with an asynchronous body.
    ///
    /// ```rust
    /// use kindle_core::{System, SystemError};
    ///
    /// let loader = System::new_async("loader", |ctx| {
    ///     Box::pin(async move {
    ///         ctx.world.create_entity()?;
    ///         Ok::<(), SystemError>(())
    ///     })
    /// });
    /// # let _ = loader;
    /// ```
    pub fn new_async<F>(id: impl Into<SystemId>, body: F) -> Self
    where
        F: for<'a> FnMut(&'a mut SystemContext<'a>) -> LocalBoxFuture<'a, SystemResult> + 'static,
    {
        Self::with_body(id.into(), Body::Async(Box::new(body)))
    }

    fn with_body(id: SystemId, body: Body) -> Self {
        Self {
            name: id.0.clone(),
            id,
            phases: BTreeSet::new(),
            priority: 0,
            enabled: true,
            run_before: BTreeSet::new(),
            run_after: BTreeSet::new(),
            reactive: false,
            on_error: None,
            body,
            consecutive_failures: 0,
            run_count: 0,
            last_error: None,
            tracker: None,
        }
    }

    // -------------------------------------------------------------------------
    // Builder
    // -------------------------------------------------------------------------

    /// Sets a display name. Defaults to the id.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Registers the system for `phase`. May be called repeatedly.
    #[must_use]
    pub fn in_phase(mut self, phase: Phase) -> Self {
        self.phases.insert(phase);
        self
    }

    /// Registers the system for every phase in `phases`.
    #[must_use]
    pub fn in_phases(mut self, phases: impl IntoIterator<Item = Phase>) -> Self {
        self.phases.extend(phases);
        self
    }

    /// Sets the priority. Higher runs earlier when no constraint applies.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// This system must run before `other` in every shared phase.
    #[must_use]
    pub fn before(mut self, other: impl Into<SystemId>) -> Self {
        self.run_before.insert(other.into());
        self
    }

    /// This system must run after `other` in every shared phase.
    #[must_use]
    pub fn after(mut self, other: impl Into<SystemId>) -> Self {
        self.run_after.insert(other.into());
        self
    }

    /// Only run when a cell read during the last successful run changed.
    #[must_use]
    pub fn reactive(mut self) -> Self {
        self.reactive = true;
        self
    }

    /// Registers the system disabled.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Installs a per-system failure handler.
    #[must_use]
    pub fn on_error<H>(mut self, handler: H) -> Self
    where
        H: FnMut(&SystemFailure<'_>) -> ErrorStrategy + 'static,
    {
        self.on_error = Some(Box::new(handler));
        self
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Unique id.
    #[inline]
    pub fn id(&self) -> &SystemId {
        &self.id
    }

    /// Display name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Phases this system runs in. Empty means [`Phase::Update`].
    pub fn phases(&self) -> impl Iterator<Item = Phase> + '_ {
        let default = self.phases.is_empty().then_some(Phase::Update);
        self.phases.iter().copied().chain(default)
    }

    /// Returns `true` if the system runs in `phase`.
    pub fn runs_in(&self, phase: Phase) -> bool {
        if self.phases.is_empty() {
            phase == Phase::Update
        } else {
            self.phases.contains(&phase)
        }
    }

    /// Ordering priority.
    #[inline]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Returns `true` unless disabled.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Ids this system must precede.
    pub fn run_before(&self) -> &BTreeSet<SystemId> {
        &self.run_before
    }

    /// Ids this system must follow.
    pub fn run_after(&self) -> &BTreeSet<SystemId> {
        &self.run_after
    }

    /// Returns `true` for reactive systems.
    #[inline]
    pub fn is_reactive(&self) -> bool {
        self.reactive
    }

    /// Returns `true` if the body is asynchronous.
    #[inline]
    pub fn is_async(&self) -> bool {
        matches!(self.body, Body::Async(_))
    }

    /// Failed runs in a row. Reset by any successful run.
    #[inline]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Total body invocations, retries included.
    #[inline]
    pub fn run_count(&self) -> u64 {
        self.run_count
    }

    /// Message of the most recent failure, cleared on success.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    // -------------------------------------------------------------------------
    // Scheduler hooks
    // -------------------------------------------------------------------------

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if enabled {
            self.consecutive_failures = 0;
        }
    }

    pub(crate) fn attach_tracker(&mut self, tracker: Tracker) {
        if self.reactive {
            self.tracker = Some(tracker);
        }
    }

    /// `false` for a reactive system none of whose inputs moved.
    pub(crate) fn should_run(&self) -> bool {
        self.enabled && self.tracker.as_ref().map_or(true, Tracker::is_changed)
    }

    pub(crate) fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.last_error = None;
    }

    pub(crate) fn record_failure(&mut self, error: &SystemError) -> u32 {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(error.to_string());
        // A failed reactive run must be retried next tick.
        if let Some(tracker) = &self.tracker {
            tracker.invalidate();
        }
        self.consecutive_failures
    }

    pub(crate) fn handle_failure(&mut self, failure: &SystemFailure<'_>) -> Option<ErrorStrategy> {
        self.on_error.as_mut().map(|handler| handler(failure))
    }

    /// Runs the body to completion from synchronous code.
    ///
    /// Async bodies are driven on `executor`; without one they fail with
    /// [`SystemError::NestedRuntime`].
    pub(crate) fn invoke(
        &mut self,
        world: &mut World,
        executor: Option<&tokio::runtime::Runtime>,
        phase: Phase,
        delta: f64,
    ) -> SystemResult {
        self.run_count += 1;
        let mut ctx = SystemContext { world, phase, delta };
        let tracker = self.tracker.as_ref();
        match &mut self.body {
            Body::Sync(body) => match tracker {
                Some(tracker) => tracker.track(|| body(&mut ctx)),
                None => body(&mut ctx),
            },
            Body::Async(body) => {
                let Some(executor) = executor else {
                    return Err(SystemError::NestedRuntime);
                };
                match tracker {
                    Some(tracker) => {
                        tracker.reset();
                        executor.block_on(tracker.observed(body(&mut ctx)))
                    }
                    None => executor.block_on(body(&mut ctx)),
                }
            }
        }
    }

    /// Runs the body to completion, awaiting async bodies in place.
    pub(crate) async fn invoke_async(&mut self, world: &mut World, phase: Phase, delta: f64) -> SystemResult {
        self.run_count += 1;
        let mut ctx = SystemContext { world, phase, delta };
        let tracker = self.tracker.as_ref();
        match &mut self.body {
            Body::Sync(body) => match tracker {
                Some(tracker) => tracker.track(|| body(&mut ctx)),
                None => body(&mut ctx),
            },
            Body::Async(body) => match tracker {
                Some(tracker) => {
                    tracker.reset();
                    tracker.observed(body(&mut ctx)).await
                }
                None => body(&mut ctx).await,
            },
        }
    }
}

impl fmt::Debug for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("System")
            .field("id", &self.id)
            .field("phases", &self.phases().collect::<Vec<_>>())
            .field("priority", &self.priority)
            .field("enabled", &self.enabled)
            .field("run_before", &self.run_before)
            .field("run_after", &self.run_after)
            .field("reactive", &self.reactive)
            .field("async", &self.is_async())
            .field("consecutive_failures", &self.consecutive_failures)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut SystemContext<'_>) -> SystemResult {
        Ok(())
    }

    #[test]
    fn test_defaults() {
        let system = System::new("tick", noop);
        assert_eq!(system.name(), "tick");
        assert!(system.is_enabled());
        assert!(!system.is_reactive());
        assert!(!system.is_async());
        assert_eq!(system.phases().collect::<Vec<_>>(), vec![Phase::Update]);
        assert!(system.runs_in(Phase::Update));
        assert!(!system.runs_in(Phase::Init));
    }

    #[test]
    fn test_builder() {
        let system = System::new("physics", noop)
            .named("Physics")
            .in_phases([Phase::FixedUpdate, Phase::LateUpdate])
            .with_priority(10)
            .after("input")
            .before("render")
            .reactive();
        assert_eq!(system.name(), "Physics");
        assert!(!system.runs_in(Phase::Update));
        assert!(system.runs_in(Phase::FixedUpdate));
        assert_eq!(system.priority(), 10);
        assert!(system.run_after().contains("input"));
        assert!(system.run_before().contains("render"));
        assert!(system.is_reactive());
    }

    #[test]
    fn test_disable_after_threshold() {
        let mut handler = disable_after(3);
        let id = SystemId::from("s");
        let error = SystemError::msg("x");
        let at = |n| SystemFailure {
            system: &id,
            phase: Phase::Update,
            error: &error,
            consecutive_failures: n,
        };
        assert_eq!(handler(&at(1)), ErrorStrategy::Ignore);
        assert_eq!(handler(&at(2)), ErrorStrategy::Ignore);
        assert_eq!(handler(&at(3)), ErrorStrategy::Disable);
    }

    #[test]
    fn test_failure_bookkeeping() {
        let mut system = System::new("s", noop);
        assert_eq!(system.record_failure(&SystemError::msg("a")), 1);
        assert_eq!(system.record_failure(&SystemError::msg("b")), 2);
        assert_eq!(system.last_error(), Some("b"));
        system.record_success();
        assert_eq!(system.consecutive_failures(), 0);
        assert_eq!(system.last_error(), None);
    }

    #[test]
    fn test_default_strategy_is_ignore() {
        assert_eq!(ErrorStrategy::default(), ErrorStrategy::Ignore);
    }
}
