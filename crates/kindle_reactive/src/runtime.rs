//! # Reactive Runtime
//!
//! The dependency graph behind every signal, computed value, effect and
//! tracker.
//!
//! ## Architecture
//!
//! ```text
//!   Runtime (Rc<RefCell<Graph>>)
//!   ┌──────────────────────────────────────────────────────┐
//!   │  slots: [ Slot { generation, node: Option<Node> } ]  │
//!   │  free:  [ reusable slot indices ]                    │
//!   │  observer: Option<NodeId>   (current evaluation)     │
//!   │  batch_depth / pending      (transaction state)      │
//!   └──────────────────────────────────────────────────────┘
//!         ▲ Weak                         ▲ Weak
//!   ┌─────┴─────┐                  ┌─────┴─────┐
//!   │ Signal<T> │ ── subscribers ─>│ Effect    │
//!   └───────────┘ <─ dependencies ─└───────────┘
//! ```
//!
//! Nodes live in an arena addressed by generational [`NodeId`] handles, so the
//! reciprocal dependency / subscriber relation is stored as two sets of
//! integers instead of a web of owning pointers. Handles only hold a weak
//! reference to the graph: dropping the [`Runtime`] tears the whole graph
//! down without reference cycles.
//!
//! ## Thread Confinement
//!
//! The runtime is `!Send`. The "current observer" is a field of the runtime
//! rather than a process global, so two runtimes never observe each other's
//! reads and the evaluation contract is visible in the types.
//!
//! ## Borrow Discipline
//!
//! The graph `RefCell` is never borrowed while user code runs. Every
//! operation that calls a derivation or an effect body snapshots what it
//! needs, releases the borrow, then calls out.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::computed::Computed;
use crate::effect::{Effect, IntoCleanup};
use crate::signal::Signal;
use crate::tracker::Tracker;

/// Handle to a node in the reactive graph.
///
/// The ID is split into two parts:
/// - Lower 32 bits: Slot index in the arena
/// - Upper 32 bits: Generation counter for detecting stale handles
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NodeId(u64);

impl NodeId {
    /// Creates a node ID from slot index and generation.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Returns the slot index portion of the ID.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Returns the generation portion of the ID.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}v{})", self.index(), self.generation())
    }
}

/// What a node does when one of its dependencies changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// Mutable source cell. Never has dependencies.
    Signal,
    /// Lazily recomputed derived value. Propagates staleness.
    Computed,
    /// Eager subscriber. Re-runs on notification.
    Effect,
    /// Passive observer. Only records that something changed.
    Tracker,
}

/// Something the runtime calls back into when an effect must re-run.
pub(crate) trait Reaction {
    /// Re-executes the reaction.
    fn react(&self);
}

struct Node {
    kind: NodeKind,
    /// Nodes this node reads from.
    dependencies: BTreeSet<NodeId>,
    /// Nodes that read this node.
    subscribers: BTreeSet<NodeId>,
    /// Computed: must recompute. Effect: scheduled. Tracker: changed.
    stale: bool,
    reaction: Option<Rc<dyn Reaction>>,
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Arena and evaluation state. Only reachable through [`Runtime`].
pub(crate) struct Graph {
    slots: Vec<Slot>,
    free: Vec<u32>,
    observer: Option<NodeId>,
    batch_depth: u32,
    /// Signals written during the current batch.
    pending: BTreeSet<NodeId>,
}

impl Graph {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            observer: None,
            batch_depth: 0,
            pending: BTreeSet::new(),
        }
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        let slot = self.slots.get(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.node.as_ref()
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.node.as_mut()
    }

    fn insert(&mut self, kind: NodeKind, stale: bool) -> NodeId {
        let node = Node {
            kind,
            dependencies: BTreeSet::new(),
            subscribers: BTreeSet::new(),
            stale,
            reaction: None,
        };

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId::new(index, slot.generation);
        }

        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId::new(index, 0)
    }

    /// Detaches a node from every edge and frees its slot.
    ///
    /// The node is handed back so the caller can drop it (and whatever its
    /// reaction captured) after the graph borrow is released.
    fn remove(&mut self, id: NodeId) -> Option<Node> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index());

        for dependency in &node.dependencies {
            if let Some(source) = self.node_mut(*dependency) {
                source.subscribers.remove(&id);
            }
        }
        for subscriber in &node.subscribers {
            if let Some(reader) = self.node_mut(*subscriber) {
                reader.dependencies.remove(&id);
            }
        }
        self.pending.remove(&id);
        if self.observer == Some(id) {
            self.observer = None;
        }
        Some(node)
    }

    fn link(&mut self, source: NodeId, observer: NodeId) {
        if source == observer || self.node(source).is_none() {
            return;
        }
        let Some(reader) = self.node_mut(observer) else {
            return;
        };
        reader.dependencies.insert(source);
        if let Some(source) = self.node_mut(source) {
            source.subscribers.insert(observer);
        }
    }

    fn clear_dependencies(&mut self, id: NodeId) {
        let Some(node) = self.node_mut(id) else {
            return;
        };
        let dependencies = std::mem::take(&mut node.dependencies);
        for dependency in dependencies {
            if let Some(source) = self.node_mut(dependency) {
                source.subscribers.remove(&id);
            }
        }
    }

    /// Marks every transitive subscriber of `sources` stale.
    ///
    /// Walks the subscriber edges with an explicit stack. Computed nodes
    /// forward staleness, trackers absorb it, effects are collected in
    /// discovery order, each at most once.
    fn mark_stale(&mut self, sources: &[NodeId]) -> Vec<NodeId> {
        let mut effects = Vec::new();
        let mut visited = BTreeSet::new();
        let mut stack: Vec<NodeId> = sources.to_vec();

        while let Some(current) = stack.pop() {
            let Some(node) = self.node(current) else {
                continue;
            };
            let subscribers: Vec<NodeId> = node.subscribers.iter().copied().collect();
            let mut derived = Vec::new();

            for subscriber in subscribers {
                if !visited.insert(subscriber) {
                    continue;
                }
                let Some(reader) = self.node_mut(subscriber) else {
                    continue;
                };
                reader.stale = true;
                match reader.kind {
                    NodeKind::Computed => derived.push(subscriber),
                    NodeKind::Effect => effects.push(subscriber),
                    NodeKind::Signal | NodeKind::Tracker => {}
                }
            }
            stack.extend(derived.into_iter().rev());
        }

        effects
    }
}

/// Restores the previous observer when an evaluation ends, even by unwinding.
struct ObserverGuard<'a> {
    graph: &'a RefCell<Graph>,
    previous: Option<NodeId>,
}

impl Drop for ObserverGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut graph) = self.graph.try_borrow_mut() {
            graph.observer = self.previous;
        }
    }
}

/// Leaves a batch scope, even by unwinding.
struct BatchGuard<'a> {
    graph: &'a RefCell<Graph>,
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut graph) = self.graph.try_borrow_mut() {
            graph.batch_depth = graph.batch_depth.saturating_sub(1);
            // An aborted outermost batch drops its notifications.
            if std::thread::panicking() && graph.batch_depth == 0 {
                graph.pending.clear();
            }
        }
    }
}

/// Owner of a reactive graph.
///
/// Cheap to clone: every clone refers to the same graph. Signals, computed
/// values, effects and trackers are created through it and keep a weak link
/// back to it.
///
/// # Example
///
/// ```rust
/// use kindle_reactive::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.signal(1);
/// let doubled = rt.computed({
///     let count = count.clone();
///     move || count.get() * 2
/// });
///
/// count.set(21);
/// assert_eq!(doubled.get(), 42);
/// ```
#[derive(Clone)]
pub struct Runtime {
    graph: Rc<RefCell<Graph>>,
}

impl Runtime {
    /// Creates an empty runtime.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: Rc::new(RefCell::new(Graph::new())),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakRuntime {
        WeakRuntime {
            graph: Rc::downgrade(&self.graph),
        }
    }

    // =========================================================================
    // Factories
    // =========================================================================

    /// Creates a signal holding `value`.
    pub fn signal<T: 'static>(&self, value: T) -> Signal<T> {
        Signal::new(self, value)
    }

    /// Creates a lazily evaluated, memoized derived value.
    pub fn computed<T, F>(&self, derive: F) -> Computed<T>
    where
        T: Clone + 'static,
        F: Fn() -> T + 'static,
    {
        Computed::new(self, derive)
    }

    /// Creates an effect. The body runs once immediately and again after
    /// every change to what it read.
    ///
    /// The body may return `()` or an `Option<Cleanup>`; the cleanup runs
    /// before the next execution and on disposal.
    pub fn effect<F, R>(&self, body: F) -> Effect
    where
        F: FnMut() -> R + 'static,
        R: IntoCleanup,
    {
        Effect::new(self, body)
    }

    /// Creates a passive dependency tracker.
    #[must_use]
    pub fn tracker(&self) -> Tracker {
        Tracker::new(self)
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Runs `f` as a transaction.
    ///
    /// Signal writes inside `f` are recorded rather than propagated. When
    /// the outermost batch exits, the union of all affected subscribers is
    /// marked stale once and every affected effect runs exactly once.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.graph.borrow_mut().batch_depth += 1;
        let result = {
            let _scope = BatchGuard { graph: &self.graph };
            f()
        };

        let pending = {
            let mut graph = self.graph.borrow_mut();
            if graph.batch_depth == 0 {
                std::mem::take(&mut graph.pending)
            } else {
                BTreeSet::new()
            }
        };
        if !pending.is_empty() {
            let sources: Vec<NodeId> = pending.into_iter().collect();
            self.flush(&sources);
        }
        result
    }

    /// Returns `true` while a batch is open.
    #[must_use]
    pub fn is_batching(&self) -> bool {
        self.graph.borrow().batch_depth > 0
    }

    /// Runs `f` without registering any reads on the current observer.
    pub fn untrack<R>(&self, f: impl FnOnce() -> R) -> R {
        let previous = self.graph.borrow_mut().observer.take();
        let _guard = ObserverGuard {
            graph: &self.graph,
            previous,
        };
        f()
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Number of live nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph
            .borrow()
            .slots
            .iter()
            .filter(|slot| slot.node.is_some())
            .count()
    }

    /// Number of nodes currently reading `id`.
    #[must_use]
    pub fn subscriber_count(&self, id: NodeId) -> usize {
        self.graph
            .borrow()
            .node(id)
            .map_or(0, |node| node.subscribers.len())
    }

    /// Number of nodes `id` currently reads.
    #[must_use]
    pub fn dependency_count(&self, id: NodeId) -> usize {
        self.graph
            .borrow()
            .node(id)
            .map_or(0, |node| node.dependencies.len())
    }

    /// Returns `true` if `id` refers to a live node.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.graph.borrow().node(id).is_some()
    }

    /// Returns the kind of a live node.
    #[must_use]
    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.graph.borrow().node(id).map(|node| node.kind)
    }

    // =========================================================================
    // Crate-internal graph operations
    // =========================================================================

    pub(crate) fn create_node(&self, kind: NodeKind) -> NodeId {
        // Derived nodes start stale: they have never been evaluated.
        let stale = !matches!(kind, NodeKind::Signal);
        self.graph.borrow_mut().insert(kind, stale)
    }

    pub(crate) fn set_reaction(&self, id: NodeId, reaction: Rc<dyn Reaction>) {
        if let Some(node) = self.graph.borrow_mut().node_mut(id) {
            node.reaction = Some(reaction);
        }
    }

    pub(crate) fn remove_node(&self, id: NodeId) {
        let removed = self.graph.borrow_mut().remove(id);
        drop(removed);
    }

    /// Registers a read of `source` by the current observer, if any.
    pub(crate) fn track_read(&self, source: NodeId) {
        let mut graph = self.graph.borrow_mut();
        if let Some(observer) = graph.observer {
            graph.link(source, observer);
        }
    }

    pub(crate) fn clear_dependencies(&self, id: NodeId) {
        self.graph.borrow_mut().clear_dependencies(id);
    }

    pub(crate) fn is_stale(&self, id: NodeId) -> bool {
        self.graph.borrow().node(id).map_or(true, |node| node.stale)
    }

    pub(crate) fn set_stale(&self, id: NodeId, stale: bool) {
        if let Some(node) = self.graph.borrow_mut().node_mut(id) {
            node.stale = stale;
        }
    }

    /// Runs `f` with `id` as the current observer.
    pub(crate) fn with_observer<R>(&self, id: NodeId, f: impl FnOnce() -> R) -> R {
        let previous = self.graph.borrow_mut().observer.replace(id);
        let _guard = ObserverGuard {
            graph: &self.graph,
            previous,
        };
        f()
    }

    /// Announces that signal `source` changed value.
    pub(crate) fn notify(&self, source: NodeId) {
        {
            let mut graph = self.graph.borrow_mut();
            if graph.batch_depth > 0 {
                graph.pending.insert(source);
                return;
            }
        }
        self.flush(&[source]);
    }

    fn flush(&self, sources: &[NodeId]) {
        let effects = self.graph.borrow_mut().mark_stale(sources);
        tracing::trace!(sources = sources.len(), effects = effects.len(), "reactive flush");

        // The list is a snapshot: effects created or relinked while these
        // run are picked up by later writes, not by this loop.
        for id in effects {
            self.run_effect(id);
        }
    }

    fn run_effect(&self, id: NodeId) {
        let reaction = {
            let mut graph = self.graph.borrow_mut();
            let Some(node) = graph.node_mut(id) else {
                return;
            };
            if !node.stale {
                return;
            }
            node.stale = false;
            node.reaction.clone()
        };
        if let Some(reaction) = reaction {
            reaction.react();
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.graph.try_borrow() {
            Ok(graph) => f
                .debug_struct("Runtime")
                .field("slots", &graph.slots.len())
                .field("batch_depth", &graph.batch_depth)
                .field("observer", &graph.observer)
                .finish(),
            Err(_) => f.write_str("Runtime { <evaluating> }"),
        }
    }
}

/// Weak link from a handle back to its runtime.
#[derive(Clone)]
pub(crate) struct WeakRuntime {
    graph: Weak<RefCell<Graph>>,
}

impl WeakRuntime {
    /// A link that never upgrades.
    pub(crate) fn dangling() -> Self {
        Self { graph: Weak::new() }
    }

    pub(crate) fn upgrade(&self) -> Option<Runtime> {
        self.graph.upgrade().map(|graph| Runtime { graph })
    }

    /// Removes a node when its last handle goes away.
    ///
    /// Uses `try_borrow_mut`: a handle dropped while the graph is borrowed
    /// leaves an orphan slot rather than panicking inside `Drop`.
    pub(crate) fn release(&self, id: NodeId) {
        let Some(graph) = self.graph.upgrade() else {
            return;
        };
        let removed = match graph.try_borrow_mut() {
            Ok(mut graph) => graph.remove(id),
            Err(_) => None,
        };
        drop(removed);
    }
}
