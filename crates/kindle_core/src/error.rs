//! # Core Error Types
//!
//! Two families, handled very differently:
//! - [`WorldError`] - structural misuse, returned to the caller and never
//!   recovered internally
//! - [`SystemError`] - a system body failed; the scheduler contains it
//!
//! Panics inside reactive derivations and effects are neither: they unwind
//! to whoever triggered the evaluation.

use thiserror::Error;

use crate::entity::EntityId;
use crate::phase::Phase;
use crate::system::SystemId;

/// Structural errors raised at the call site.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorldError {
    /// An explicit entity id is already alive.
    #[error("entity {0} already exists")]
    DuplicateEntity(EntityId),

    /// The entity is not alive.
    #[error("entity {0} not found")]
    EntityNotFound(EntityId),

    /// The auto-increment counter passed `u64::MAX`.
    #[error("entity id counter exhausted")]
    EntityIdsExhausted,

    /// A query descriptor with no filters at all.
    #[error("query must have at least one all/any/none filter")]
    EmptyQuery,

    /// A system with the same id is already registered.
    #[error("system '{0}' already registered")]
    DuplicateSystem(SystemId),

    /// No system with this id is registered.
    #[error("system '{0}' not found")]
    UnknownSystem(SystemId),

    /// The ordering constraints of a phase contain a cycle.
    #[error("circular dependency in {phase} phase: {}", format_cycle(.cycle))]
    CircularDependency {
        /// Phase whose order could not be computed.
        phase: Phase,
        /// Systems on the cycle, first one repeated at the end.
        cycle: Vec<SystemId>,
    },

    /// The world was destroyed and accepts no further work.
    #[error("world has been destroyed")]
    Destroyed,
}

fn format_cycle(cycle: &[SystemId]) -> String {
    cycle
        .iter()
        .map(SystemId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Failure of a single system run.
#[derive(Error, Debug)]
pub enum SystemError {
    /// Generic failure reported by the system body.
    #[error("{0}")]
    Failed(String),

    /// A component the system relies on is absent.
    #[error("entity {entity} has no {component} component")]
    MissingComponent {
        /// Entity that was inspected.
        entity: EntityId,
        /// Component type name.
        component: &'static str,
    },

    /// A structural world call inside the body failed.
    #[error(transparent)]
    World(#[from] WorldError),

    /// An async body was dispatched synchronously from inside a tokio
    /// runtime. Use `World::update_async` there instead.
    #[error("async system dispatched synchronously inside a running tokio runtime")]
    NestedRuntime,

    /// The executor for async bodies could not be built.
    #[error("async executor unavailable: {0}")]
    Executor(String),
}

impl SystemError {
    /// Shorthand for [`SystemError::Failed`].
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Errors loading a [`crate::config::WorldConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The TOML text is malformed or has wrongly typed keys.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The values parse but make no sense together.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for structural world operations.
pub type WorldResult<T> = Result<T, WorldError>;

/// Result type returned by system bodies.
pub type SystemResult = Result<(), SystemError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_path() {
        let err = WorldError::CircularDependency {
            phase: Phase::Update,
            cycle: vec![SystemId::from("a"), SystemId::from("b"), SystemId::from("a")],
        };
        assert_eq!(
            err.to_string(),
            "circular dependency in update phase: a -> b -> a"
        );
    }

    #[test]
    fn test_world_error_converts_into_system_error() {
        fn body() -> SystemResult {
            Err(WorldError::EntityNotFound(EntityId::new(7)))?;
            Ok(())
        }
        let err = body().unwrap_err();
        assert!(matches!(err, SystemError::World(WorldError::EntityNotFound(_))));
        assert_eq!(err.to_string(), "entity 7 not found");
    }
}
