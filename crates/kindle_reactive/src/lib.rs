//! # KINDLE Reactive Graph
//!
//! Fine-grained dependency tracking for single-threaded engines:
//! - [`Signal`] - mutable source cells
//! - [`Computed`] - lazy, memoized derived cells
//! - [`Effect`] - eager subscribers with cleanup
//! - [`Tracker`] - passive "did anything I read change?" observers
//!
//! ## Propagation Rules
//!
//! 1. **Idempotent writes** - writing an equal value (NaN included) is silent
//! 2. **Lazy derivations** - computed values only re-run when read
//! 3. **Glitch-free batches** - inside [`Runtime::batch`] every affected
//!    effect runs exactly once, after the outermost batch closes
//!
//! ## Example
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use kindle_reactive::Runtime;
//!
//! let rt = Runtime::new();
//! let s = rt.signal(1);
//! let b = rt.computed({ let s = s.clone(); move || s.get() * 2 });
//! let c = rt.computed({ let s = s.clone(); move || s.get() + 1 });
//!
//! let runs = Rc::new(Cell::new(0));
//! let _effect = rt.effect({
//!     let runs = Rc::clone(&runs);
//!     move || {
//!         let _ = b.get() + c.get();
//!         runs.set(runs.get() + 1);
//!     }
//! });
//!
//! rt.batch(|| s.set(2));
//! assert_eq!(runs.get(), 2);
//! ```
//!
//! ## Failure Model
//!
//! Panics inside a derivation or an effect body are not caught. They unwind
//! to whoever triggered the evaluation (a `get`, a `peek`, a `set` or the end
//! of a batch). The runtime restores its observer and batch depth on the way
//! out, so the graph stays usable after the panic is caught.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

pub mod computed;
pub mod effect;
pub mod equality;
pub mod runtime;
pub mod signal;
pub mod tracker;

pub use computed::Computed;
pub use effect::{cleanup, Cleanup, Effect, IntoCleanup};
pub use equality::same_value;
pub use runtime::{NodeId, NodeKind, Runtime};
pub use signal::{AnyCell, Signal};
pub use tracker::{Observed, Tracker};
