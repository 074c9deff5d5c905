//! # Trackers
//!
//! Passive observers. A tracker records which cells a closure read and flips
//! to "changed" when any of them is written. It never runs anything on its
//! own; the owner polls [`Tracker::is_changed`] and decides what to do.
//!
//! The scheduler uses one per reactive system to skip ticks in which none of
//! the system's inputs moved.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use crate::runtime::{NodeId, NodeKind, Runtime, WeakRuntime};

struct TrackerInner {
    id: NodeId,
    runtime: WeakRuntime,
}

impl Drop for TrackerInner {
    fn drop(&mut self) {
        self.runtime.release(self.id);
    }
}

/// Dependency recorder with a changed flag.
///
/// A fresh tracker reports changed, so whatever it guards runs at least once.
#[derive(Clone)]
pub struct Tracker {
    inner: Rc<TrackerInner>,
}

impl Tracker {
    pub(crate) fn new(runtime: &Runtime) -> Self {
        let id = runtime.create_node(NodeKind::Tracker);
        Self {
            inner: Rc::new(TrackerInner {
                id,
                runtime: runtime.downgrade(),
            }),
        }
    }

    /// Graph handle of this tracker.
    #[inline]
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Returns `true` if a tracked cell changed since the last
    /// [`Tracker::track`] or [`Tracker::reset`].
    #[must_use]
    pub fn is_changed(&self) -> bool {
        self.inner
            .runtime
            .upgrade()
            .map_or(true, |runtime| runtime.is_stale(self.inner.id))
    }

    /// Forgets the previous dependencies, clears the changed flag and runs
    /// `f` with this tracker as the observer.
    pub fn track<R>(&self, f: impl FnOnce() -> R) -> R {
        match self.inner.runtime.upgrade() {
            Some(runtime) => {
                runtime.clear_dependencies(self.inner.id);
                runtime.set_stale(self.inner.id, false);
                runtime.with_observer(self.inner.id, f)
            }
            None => f(),
        }
    }

    /// Runs `f` as the observer without touching existing dependencies or
    /// the changed flag. Used to record reads across several slices of work.
    pub fn observe<R>(&self, f: impl FnOnce() -> R) -> R {
        match self.inner.runtime.upgrade() {
            Some(runtime) => runtime.with_observer(self.inner.id, f),
            None => f(),
        }
    }

    /// Drops all dependencies and clears the changed flag.
    pub fn reset(&self) {
        if let Some(runtime) = self.inner.runtime.upgrade() {
            runtime.clear_dependencies(self.inner.id);
            runtime.set_stale(self.inner.id, false);
        }
    }

    /// Forces the changed flag on.
    pub fn invalidate(&self) {
        if let Some(runtime) = self.inner.runtime.upgrade() {
            runtime.set_stale(self.inner.id, true);
        }
    }

    /// Wraps a future so every poll records reads on this tracker.
    ///
    /// The observer is only installed for the duration of each poll, so
    /// work interleaved between polls is never attributed to the tracker.
    pub fn observed<F>(&self, future: F) -> Observed<F>
    where
        F: Future + Unpin,
    {
        Observed {
            tracker: self.clone(),
            future,
        }
    }
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("id", &self.inner.id)
            .field("changed", &self.is_changed())
            .finish()
    }
}

/// Future returned by [`Tracker::observed`].
#[derive(Debug)]
pub struct Observed<F> {
    tracker: Tracker,
    future: F,
}

impl<F: Future + Unpin> Future for Observed<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let future = &mut this.future;
        this.tracker.observe(|| Pin::new(future).poll(cx))
    }
}
