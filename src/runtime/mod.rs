//! Runtime state the pass consults but does not own.
//!
//! The elision pass assumes certain runtime invariants (no exotic indexed
//! storage, a sane array prototype chain) and must register itself against
//! the corresponding [`Watchpoint`]s; it also needs the global object's
//! canonical structures to resolve structure checks against eliminated
//! allocations. [`RuntimeContext`] bundles both services.

mod structures;
mod watchpoints;

pub use structures::{StructureId, StructureKind, StructureRegistry, StructureSet};
pub use watchpoints::{Watchpoint, WatchpointState, Watchpoints};

/// The runtime services consumed by the pass: watchpoint registration and
/// canonical structure lookup.
#[derive(Debug, Default)]
pub struct RuntimeContext {
    watchpoints: Watchpoints,
    structures: StructureRegistry,
}

impl RuntimeContext {
    /// Creates a context with every invariant intact and an empty
    /// structure table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the watchpoint registry.
    #[must_use]
    pub const fn watchpoints(&self) -> &Watchpoints {
        &self.watchpoints
    }

    /// Returns the structure registry.
    #[must_use]
    pub const fn structures(&self) -> &StructureRegistry {
        &self.structures
    }

    /// Attempts to rely on "no exotic indexed-property behavior",
    /// registering a watcher. Returns `false` if the invariant is gone.
    pub fn watch_no_exotic_indexing(&self) -> bool {
        self.watchpoints.watch(Watchpoint::NoExoticIndexing)
    }

    /// Attempts to rely on "the array prototype chain has no indexed
    /// properties", registering a watcher. Returns `false` if the
    /// invariant is gone.
    pub fn watch_sane_prototype_chain(&self) -> bool {
        self.watchpoints.watch(Watchpoint::SaneArrayPrototypeChain)
    }

    /// Returns the canonical structure for a shape.
    pub fn canonical_structure(&self, kind: StructureKind) -> StructureId {
        self.structures.canonical(kind)
    }
}
