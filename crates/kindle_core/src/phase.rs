//! Tick phases.

use std::fmt;

/// A stage of the per-tick execution cycle.
///
/// Phases always run in declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    /// Runs once from [`crate::World::init`].
    Init,
    /// Runs zero or more times per tick with the fixed timestep.
    FixedUpdate,
    /// Runs once per tick with the variable delta.
    Update,
    /// Runs once per tick after [`Phase::Update`].
    LateUpdate,
    /// Runs once from [`crate::World::cleanup`].
    Cleanup,
}

impl Phase {
    /// Every phase, in execution order.
    pub const ALL: [Phase; 5] = [
        Phase::Init,
        Phase::FixedUpdate,
        Phase::Update,
        Phase::LateUpdate,
        Phase::Cleanup,
    ];

    /// Position in [`Phase::ALL`].
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Lower-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::FixedUpdate => "fixed_update",
            Phase::Update => "update",
            Phase::LateUpdate => "late_update",
            Phase::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
