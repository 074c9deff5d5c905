//! # Signals
//!
//! Mutable source cells of the reactive graph.
//!
//! Reading a signal with [`Signal::get`] while an observer (computed value,
//! effect or tracker) is evaluating links the two. Writing with
//! [`Signal::set`] notifies every transitive subscriber, unless the new value
//! is the same as the old one.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::{Serialize, Serializer};

use crate::equality::same_value;
use crate::runtime::{NodeId, NodeKind, Runtime, WeakRuntime};

struct SignalInner<T> {
    id: NodeId,
    runtime: WeakRuntime,
    value: RefCell<T>,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        self.runtime.release(self.id);
    }
}

/// A mutable reactive cell.
///
/// Clones share the same cell. The graph node is released when the last
/// clone is dropped.
pub struct Signal<T> {
    inner: Rc<SignalInner<T>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Signal<T> {
    pub(crate) fn new(runtime: &Runtime, value: T) -> Self {
        let id = runtime.create_node(NodeKind::Signal);
        Self {
            inner: Rc::new(SignalInner {
                id,
                runtime: runtime.downgrade(),
                value: RefCell::new(value),
            }),
        }
    }

    /// Graph handle of this signal.
    #[inline]
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// The runtime this signal belongs to, if it is still alive.
    #[must_use]
    pub fn runtime(&self) -> Option<Runtime> {
        self.inner.runtime.upgrade()
    }

    /// Borrows the value, registering a read on the current observer.
    ///
    /// # Panics
    ///
    /// The value stays borrowed while `f` runs: writing this same signal
    /// from inside `f` panics. Copy the value out with [`Signal::get`]
    /// first when the closure needs to write back.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        let value = self.inner.value.borrow();
        f(&*value)
    }

    /// Borrows the value without registering a read.
    ///
    /// # Panics
    ///
    /// Same as [`Signal::with`]: `f` must not write this signal.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let value = self.inner.value.borrow();
        f(&*value)
    }

    /// Edits the value in place. `f` reports whether it changed anything;
    /// subscribers are notified only if it did.
    ///
    /// Unlike [`Signal::update`] the value is not copied, which suits large
    /// collections edited one element at a time.
    ///
    /// # Panics
    ///
    /// `f` must not read or write this signal.
    pub fn mutate(&self, f: impl FnOnce(&mut T) -> bool) {
        let changed = {
            let mut value = self.inner.value.borrow_mut();
            f(&mut *value)
        };
        if changed {
            if let Some(runtime) = self.inner.runtime.upgrade() {
                runtime.notify(self.inner.id);
            }
        }
    }

    fn track(&self) {
        if let Some(runtime) = self.inner.runtime.upgrade() {
            runtime.track_read(self.inner.id);
        }
    }
}

impl<T: Clone + 'static> Signal<T> {
    /// Returns the current value and subscribes the current observer.
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    /// Returns the current value without subscribing anyone.
    pub fn peek(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Creates an independent signal in the same runtime holding a copy of
    /// the current value.
    #[must_use]
    pub fn fork(&self) -> Signal<T> {
        let value = self.peek();
        match self.inner.runtime.upgrade() {
            Some(runtime) => runtime.signal(value),
            None => Self {
                inner: Rc::new(SignalInner {
                    id: self.inner.id,
                    runtime: WeakRuntime::dangling(),
                    value: RefCell::new(value),
                }),
            },
        }
    }
}

impl<T: PartialEq + 'static> Signal<T> {
    /// Writes a new value.
    ///
    /// A write that does not change the value (NaN-aware) is dropped
    /// without notifying anyone. Inside a batch the notification is
    /// deferred to the end of the outermost batch.
    pub fn set(&self, value: T) {
        {
            let mut current = self.inner.value.borrow_mut();
            if same_value(&*current, &value) {
                return;
            }
            *current = value;
        }
        if let Some(runtime) = self.inner.runtime.upgrade() {
            runtime.notify(self.inner.id);
        }
    }
}

impl<T: Clone + PartialEq + 'static> Signal<T> {
    /// Applies `f` to a copy of the value and writes the result back.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let mut next = self.peek();
        f(&mut next);
        self.set(next);
    }
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.value.try_borrow() {
            Ok(value) => f
                .debug_struct("Signal")
                .field("id", &self.inner.id)
                .field("value", &*value)
                .finish(),
            Err(_) => f
                .debug_struct("Signal")
                .field("id", &self.inner.id)
                .finish_non_exhaustive(),
        }
    }
}

impl<T: Serialize> Serialize for Signal<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.inner.value.borrow().serialize(serializer)
    }
}

/// Type-erased view of a reactive cell.
///
/// Components list their fields as `(&'static str, &dyn AnyCell)` pairs so
/// generic collaborators (inspectors, serializers) can walk them without
/// knowing the concrete value types.
pub trait AnyCell {
    /// Graph handle of the cell.
    fn node_id(&self) -> NodeId;

    /// Name of the value type.
    fn value_type(&self) -> &'static str;

    /// `Debug` rendering of the current value, read without tracking.
    fn debug_value(&self) -> String;

    /// The concrete cell, for downcasting to `Signal<T>`.
    fn as_any(&self) -> &dyn Any;
}

impl<T: Clone + fmt::Debug + 'static> AnyCell for Signal<T> {
    fn node_id(&self) -> NodeId {
        self.id()
    }

    fn value_type(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn debug_value(&self) -> String {
        format!("{:?}", self.inner.value.borrow())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
