//! # Computed Values
//!
//! Memoized cells derived from other reactive cells.
//!
//! ```text
//!   signal ──set──> mark stale ──> computed.stale = true
//!                                        │
//!   computed.get() ──stale?──> clear deps ──> derive() as observer ──> cache
//!                 └─fresh──> clone cached value
//! ```
//!
//! Evaluation is lazy: nothing is recomputed until someone reads the value.
//! Dependencies are rebuilt on every recomputation, so a derivation that
//! branches on a signal only subscribes to the cells it actually read.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::runtime::{NodeId, NodeKind, Runtime, WeakRuntime};

struct ComputedInner<T> {
    id: NodeId,
    runtime: WeakRuntime,
    /// `None` until the first evaluation. A derivation may itself produce
    /// `Option<_>`; that is a value like any other.
    value: RefCell<Option<T>>,
    derive: Box<dyn Fn() -> T>,
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        self.runtime.release(self.id);
    }
}

/// A lazily evaluated, memoized derived value.
///
/// Clones share the same cache.
pub struct Computed<T> {
    inner: Rc<ComputedInner<T>>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> Computed<T> {
    pub(crate) fn new(runtime: &Runtime, derive: impl Fn() -> T + 'static) -> Self {
        let id = runtime.create_node(NodeKind::Computed);
        Self {
            inner: Rc::new(ComputedInner {
                id,
                runtime: runtime.downgrade(),
                value: RefCell::new(None),
                derive: Box::new(derive),
            }),
        }
    }

    /// Graph handle of this computed value.
    #[inline]
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Returns the value, recomputing if needed, and subscribes the current
    /// observer.
    ///
    /// # Panics
    ///
    /// Re-raises any panic from the derivation.
    pub fn get(&self) -> T {
        if let Some(runtime) = self.inner.runtime.upgrade() {
            runtime.track_read(self.inner.id);
        }
        self.current()
    }

    /// Returns the value, recomputing if needed, without subscribing anyone.
    ///
    /// # Panics
    ///
    /// Re-raises any panic from the derivation.
    pub fn peek(&self) -> T {
        self.current()
    }

    /// Returns `true` if the next read will run the derivation.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        match self.inner.runtime.upgrade() {
            Some(runtime) => {
                runtime.is_stale(self.inner.id) || self.inner.value.borrow().is_none()
            }
            None => true,
        }
    }

    /// Severs every edge of this node.
    ///
    /// A disposed computed value keeps working but no longer memoizes: each
    /// read runs the derivation untracked.
    pub fn dispose(&self) {
        if let Some(runtime) = self.inner.runtime.upgrade() {
            runtime.remove_node(self.inner.id);
        }
        self.inner.value.borrow_mut().take();
    }

    fn current(&self) -> T {
        let Some(runtime) = self.inner.runtime.upgrade() else {
            return (self.inner.derive)();
        };

        if !runtime.is_stale(self.inner.id) {
            if let Some(value) = self.inner.value.borrow().as_ref() {
                return value.clone();
            }
        }

        runtime.clear_dependencies(self.inner.id);
        let next = runtime.with_observer(self.inner.id, || (self.inner.derive)());
        runtime.set_stale(self.inner.id, false);
        if runtime.contains(self.inner.id) {
            *self.inner.value.borrow_mut() = Some(next.clone());
        }
        next
    }
}

impl<T: fmt::Debug> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Computed");
        out.field("id", &self.inner.id);
        match self.inner.value.try_borrow() {
            Ok(value) => out.field("cached", &*value).finish(),
            Err(_) => out.finish_non_exhaustive(),
        }
    }
}
