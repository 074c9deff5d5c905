//! # KINDLE Core
//!
//! Entities, indexed components, cached queries and a phased scheduler,
//! composed by a [`World`].
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────── World ───────────────────────────┐
//! │                                                             │
//! │  EntityAllocator ──> ComponentStore ──> QueryCache          │
//! │                       (fields are        (dirty on          │
//! │                        reactive cells)    add/remove)       │
//! │                                                             │
//! │  Scheduler: Init │ FixedUpdate × n │ Update │ LateUpdate    │
//! │                                                             │
//! │  Runtime (kindle_reactive): batches structural mutations    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use kindle_core::{AnyCell, Component, Phase, Signal, System, World};
//!
//! struct Velocity(Signal<f64>);
//!
//! impl Component for Velocity {
//!     fn fields(&self) -> Vec<(&'static str, &dyn AnyCell)> {
//!         vec![("value", &self.0)]
//!     }
//!     fn clone_component(&self) -> Box<dyn Component> {
//!         Box::new(Velocity(self.0.fork()))
//!     }
//! }
//!
//! let mut world = World::new();
//! let ship = world.create_entity()?;
//! let speed = world.runtime().signal(2.0);
//! world.add_component(ship, Velocity(speed))?;
//!
//! world.add_system(
//!     System::new("accelerate", |ctx| {
//!         let movers = ctx.world.query_builder().with::<Velocity>().execute()?;
//!         for entity in movers {
//!             if let Some(v) = ctx.world.get_component::<Velocity>(entity) {
//!                 v.0.update(|value| *value *= 2.0);
//!             }
//!         }
//!         Ok(())
//!     })
//!     .in_phase(Phase::FixedUpdate),
//! )?;
//!
//! world.update(1000.0 / 60.0)?;
//! let v = world.get_component::<Velocity>(ship).map(|v| v.0.peek());
//! assert_eq!(v, Some(4.0));
//! # Ok::<(), kindle_core::WorldError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

pub mod component;
pub mod config;
pub mod entity;
pub mod error;
pub mod phase;
pub mod query;
pub mod scheduler;
pub mod storage;
pub mod system;
pub mod world;

pub use component::{AsAny, Component, ComponentRegistry, ComponentTypeId};
pub use config::{SchedulerConfig, WorldConfig};
pub use entity::{EntityAllocator, EntityId};
pub use error::{ConfigError, SystemError, SystemResult, WorldError, WorldResult};
pub use phase::Phase;
pub use query::{Query, QueryBuilder, QueryCache, QueryDescriptor, QueryId, ReactiveQuery};
pub use scheduler::Scheduler;
pub use storage::{ComponentStore, StoredComponent};
pub use system::{
    always_retry, disable_after, ErrorHandler, ErrorStrategy, LocalBoxFuture, System, SystemContext,
    SystemFailure, SystemId,
};
pub use world::{StopHandle, World};

pub use kindle_reactive::{cleanup, AnyCell, Computed, Effect, Runtime, Signal, Tracker};
