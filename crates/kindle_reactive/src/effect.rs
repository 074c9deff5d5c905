//! # Effects
//!
//! Eager subscribers. An effect body runs once when the effect is created
//! and again every time a cell it read during its previous run changes.
//!
//! A run may hand back a [`Cleanup`]. The cleanup of the previous run is
//! invoked right before the next run, and once more on [`Effect::dispose`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::runtime::{NodeId, NodeKind, Reaction, Runtime, WeakRuntime};

/// Teardown closure returned by an effect run.
pub type Cleanup = Box<dyn FnOnce()>;

/// Wraps a closure as an effect cleanup.
///
/// ```rust
/// use kindle_reactive::{cleanup, Runtime};
///
/// let rt = Runtime::new();
/// let effect = rt.effect(|| cleanup(|| println!("torn down")));
/// effect.dispose();
/// ```
pub fn cleanup(f: impl FnOnce() + 'static) -> Option<Cleanup> {
    Some(Box::new(f))
}

/// Return types accepted from an effect body.
pub trait IntoCleanup {
    /// Converts the run result into an optional cleanup.
    fn into_cleanup(self) -> Option<Cleanup>;
}

impl IntoCleanup for () {
    fn into_cleanup(self) -> Option<Cleanup> {
        None
    }
}

impl IntoCleanup for Option<Cleanup> {
    fn into_cleanup(self) -> Option<Cleanup> {
        self
    }
}

struct EffectInner {
    id: NodeId,
    runtime: WeakRuntime,
    body: RefCell<Box<dyn FnMut() -> Option<Cleanup>>>,
    cleanup: RefCell<Option<Cleanup>>,
    disposed: Cell<bool>,
    /// Set while the body executes.
    running: Cell<bool>,
    /// A dependency changed while the body was executing. The body runs
    /// again right after it returns instead of re-entering itself.
    rerun: Cell<bool>,
    runs: Cell<u64>,
}

struct RunningGuard<'a>(&'a Cell<bool>);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl EffectInner {
    fn run(&self) {
        if self.disposed.get() {
            return;
        }
        if self.running.get() {
            self.rerun.set(true);
            return;
        }
        let Some(runtime) = self.runtime.upgrade() else {
            return;
        };

        loop {
            self.rerun.set(false);
            self.run_once(&runtime);
            if self.disposed.get() || !self.rerun.get() {
                break;
            }
        }
    }

    fn run_once(&self, runtime: &Runtime) {
        let previous = self.cleanup.borrow_mut().take();
        if let Some(previous) = previous {
            previous();
        }
        if self.disposed.get() {
            return;
        }

        runtime.clear_dependencies(self.id);
        runtime.set_stale(self.id, false);

        self.running.set(true);
        let next = {
            let _running = RunningGuard(&self.running);
            let mut body = self.body.borrow_mut();
            let body: &mut dyn FnMut() -> Option<Cleanup> = &mut **body;
            runtime.with_observer(self.id, body)
        };
        self.runs.set(self.runs.get() + 1);

        // Disposed from inside its own body: the fresh cleanup is the last.
        if self.disposed.get() {
            if let Some(next) = next {
                next();
            }
        } else {
            *self.cleanup.borrow_mut() = next;
        }
    }
}

impl Reaction for EffectInner {
    fn react(&self) {
        self.run();
    }
}

/// Handle to a running effect.
///
/// The graph keeps the effect alive: dropping the handle does not stop it.
/// Call [`Effect::dispose`] to detach it for good.
///
/// A body that captures a [`Runtime`] clone forms a reference cycle with
/// the graph that owns it, so neither is freed until the effect is
/// disposed.
///
/// When the body writes to a cell it depends on, the write is not lost:
/// the body runs again once the current run returns, until a run makes no
/// such write. A body that unconditionally changes its own dependency
/// therefore never settles.
#[derive(Clone)]
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    pub(crate) fn new<F, R>(runtime: &Runtime, mut body: F) -> Self
    where
        F: FnMut() -> R + 'static,
        R: IntoCleanup,
    {
        let id = runtime.create_node(NodeKind::Effect);
        let inner = Rc::new(EffectInner {
            id,
            runtime: runtime.downgrade(),
            body: RefCell::new(Box::new(move || body().into_cleanup())),
            cleanup: RefCell::new(None),
            disposed: Cell::new(false),
            running: Cell::new(false),
            rerun: Cell::new(false),
            runs: Cell::new(0),
        });
        runtime.set_reaction(id, Rc::clone(&inner) as Rc<dyn Reaction>);
        inner.run();
        Self { inner }
    }

    /// Graph handle of this effect.
    #[inline]
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Number of completed body executions.
    #[inline]
    #[must_use]
    pub fn run_count(&self) -> u64 {
        self.inner.runs.get()
    }

    /// Returns `true` once [`Effect::dispose`] has been called.
    #[inline]
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Detaches the effect from the graph and runs its pending cleanup.
    ///
    /// Idempotent: the second and later calls do nothing.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        if let Some(runtime) = self.inner.runtime.upgrade() {
            runtime.remove_node(self.inner.id);
        }
        let pending = self.inner.cleanup.borrow_mut().take();
        if let Some(pending) = pending {
            pending();
        }
        tracing::trace!(effect = ?self.inner.id, "effect disposed");
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("runs", &self.inner.runs.get())
            .field("disposed", &self.inner.disposed.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> Rc<Cell<u32>> {
        Rc::new(Cell::new(0))
    }

    #[test]
    fn test_runs_eagerly_and_on_change() {
        let rt = Runtime::new();
        let s = rt.signal(1);
        let runs = counter();
        let effect = rt.effect({
            let (s, runs) = (s.clone(), Rc::clone(&runs));
            move || {
                s.get();
                runs.set(runs.get() + 1);
            }
        });
        assert_eq!(runs.get(), 1);
        s.set(2);
        assert_eq!(runs.get(), 2);
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn test_cleanup_before_each_rerun() {
        let rt = Runtime::new();
        let s = rt.signal(0);
        let cleanups = counter();
        let _effect = rt.effect({
            let (s, cleanups) = (s.clone(), Rc::clone(&cleanups));
            move || {
                s.get();
                let cleanups = Rc::clone(&cleanups);
                cleanup(move || cleanups.set(cleanups.get() + 1))
            }
        });
        assert_eq!(cleanups.get(), 0);
        s.set(1);
        assert_eq!(cleanups.get(), 1);
        s.set(2);
        assert_eq!(cleanups.get(), 2);
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let rt = Runtime::new();
        let s = rt.signal(0);
        let (runs, cleanups) = (counter(), counter());
        let effect = rt.effect({
            let (s, runs, cleanups) = (s.clone(), Rc::clone(&runs), Rc::clone(&cleanups));
            move || {
                s.get();
                runs.set(runs.get() + 1);
                let cleanups = Rc::clone(&cleanups);
                cleanup(move || cleanups.set(cleanups.get() + 1))
            }
        });

        effect.dispose();
        effect.dispose();
        assert!(effect.is_disposed());
        assert_eq!(cleanups.get(), 1);
        assert_eq!(rt.subscriber_count(s.id()), 0);

        s.set(5);
        assert_eq!(runs.get(), 1);
        assert_eq!(cleanups.get(), 1);
    }

    #[test]
    fn test_self_write_converges() {
        let rt = Runtime::new();
        let s = rt.signal(0);
        let seen = counter();
        let effect = rt.effect({
            let (s, seen) = (s.clone(), Rc::clone(&seen));
            move || {
                let v = s.get();
                seen.set(v);
                if v < 3 {
                    s.set(v + 1);
                }
            }
        });
        assert_eq!(s.peek(), 3);
        assert_eq!(seen.get(), 3);
        assert_eq!(effect.run_count(), 4);
        assert_eq!(rt.subscriber_count(s.id()), 1);

        s.set(0);
        assert_eq!(seen.get(), 3);
        assert_eq!(effect.run_count(), 8);
    }

    #[test]
    fn test_write_from_nested_effect_reaches_outer() {
        let rt = Runtime::new();
        let x = rt.signal(0);
        let seen = counter();
        let children = Rc::new(RefCell::new(Vec::new()));
        let outer = rt.effect({
            let (rt, x, seen) = (rt.clone(), x.clone(), Rc::clone(&seen));
            let children = Rc::clone(&children);
            move || {
                seen.set(x.get());
                if children.borrow().is_empty() {
                    let x = x.clone();
                    children.borrow_mut().push(rt.effect(move || x.set(5)));
                }
            }
        });
        assert_eq!(x.peek(), 5);
        assert_eq!(seen.get(), 5);
        assert_eq!(outer.run_count(), 2);
        outer.dispose();
    }

    #[test]
    fn test_captured_runtime_freed_after_dispose() {
        let rt = Runtime::new();
        let weak = rt.downgrade();
        let effect = rt.effect({
            let rt = rt.clone();
            move || {
                let _ = rt.node_count();
            }
        });
        drop(rt);
        assert!(weak.upgrade().is_some());

        effect.dispose();
        drop(effect);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_effect_created_inside_effect() {
        let rt = Runtime::new();
        let s = rt.signal(0);
        let inner_runs = counter();
        let children = Rc::new(RefCell::new(Vec::new()));
        let _outer = rt.effect({
            let (rt, s) = (rt.clone(), s.clone());
            let (inner_runs, children) = (Rc::clone(&inner_runs), Rc::clone(&children));
            move || {
                if s.get() == 1 {
                    let inner_runs = Rc::clone(&inner_runs);
                    children.borrow_mut().push(rt.effect(move || {
                        inner_runs.set(inner_runs.get() + 1);
                    }));
                }
            }
        });
        s.set(1);
        assert_eq!(inner_runs.get(), 1);
        assert_eq!(children.borrow().len(), 1);
    }
}
