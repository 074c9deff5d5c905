//! # Component System
//!
//! Components are typed records attached to one entity. Their fields are
//! reactive cells, so mutating a field notifies every computed value,
//! effect or reactive system that read it.
//!
//! The store only ever sees `dyn Component`; type identity comes from
//! [`ComponentRegistry`], which each World owns.
//!
//! # Example
//!
//! ```rust
//! use kindle_core::{AnyCell, Component, Runtime, Signal};
//!
//! struct Health {
//!     current: Signal<i32>,
//!     max: Signal<i32>,
//! }
//!
//! impl Component for Health {
//!     fn fields(&self) -> Vec<(&'static str, &dyn AnyCell)> {
//!         vec![("current", &self.current), ("max", &self.max)]
//!     }
//!
//!     fn clone_component(&self) -> Box<dyn Component> {
//!         Box::new(Health {
//!             current: self.current.fork(),
//!             max: self.max.fork(),
//!         })
//!     }
//! }
//!
//! let rt = Runtime::new();
//! let hp = Health { current: rt.signal(80), max: rt.signal(100) };
//! let names: Vec<_> = hp.fields().into_iter().map(|(name, _)| name).collect();
//! assert_eq!(names, ["current", "max"]);
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use kindle_reactive::AnyCell;

/// Upcast to `Any` for downcasting trait objects.
///
/// Implemented for every `'static` type. Call it on `&dyn Component`, not on
/// a `Box<dyn Component>`, or the box itself is what gets upcast.
pub trait AsAny: Any {
    /// `&self` as `&dyn Any`.
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A data record attachable to an entity.
pub trait Component: AsAny {
    /// Type name used in diagnostics.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Field name to reactive cell pairs, in declaration order.
    fn fields(&self) -> Vec<(&'static str, &dyn AnyCell)>;

    /// An independent copy with the same field values.
    fn clone_component(&self) -> Box<dyn Component>;
}

impl dyn Component {
    /// Returns `true` if the concrete type is `T`.
    #[must_use]
    pub fn is<T: Component>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Downcasts to the concrete type.
    #[must_use]
    pub fn downcast_ref<T: Component>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Concrete `TypeId` behind the trait object.
    #[must_use]
    pub fn concrete_type_id(&self) -> TypeId {
        self.as_any().type_id()
    }
}

impl fmt::Debug for dyn Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct(self.name());
        for (name, cell) in self.fields() {
            out.field(name, &format_args!("{}", cell.debug_value()));
        }
        out.finish()
    }
}

/// Dense per-world id of a component type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ComponentTypeId(u32);

impl ComponentTypeId {
    /// Wraps a raw id.
    #[inline]
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Maps Rust types to [`ComponentTypeId`]s. Ids are assigned on first use.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    ids: HashMap<TypeId, ComponentTypeId>,
    names: Vec<&'static str>,
}

impl ComponentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of `T`, registering it if needed.
    pub fn register<T: Component>(&mut self) -> ComponentTypeId {
        self.intern(TypeId::of::<T>(), std::any::type_name::<T>())
    }

    /// Id of the concrete type behind `component`, registering it if needed.
    pub fn register_dyn(&mut self, component: &dyn Component) -> ComponentTypeId {
        self.intern(component.concrete_type_id(), component.name())
    }

    /// Id of `T` if it was ever registered.
    #[must_use]
    pub fn get<T: Component>(&self) -> Option<ComponentTypeId> {
        self.ids.get(&TypeId::of::<T>()).copied()
    }

    /// Registered name of a type id.
    #[must_use]
    pub fn name(&self, id: ComponentTypeId) -> Option<&'static str> {
        self.names.get(id.0 as usize).copied()
    }

    /// Number of registered types.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` if nothing was registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn intern(&mut self, type_id: TypeId, name: &'static str) -> ComponentTypeId {
        if let Some(&id) = self.ids.get(&type_id) {
            return id;
        }
        let id = ComponentTypeId(u32::try_from(self.names.len()).unwrap_or(u32::MAX));
        self.ids.insert(type_id, id);
        self.names.push(name);
        id
    }
}
