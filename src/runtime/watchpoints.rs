//! Runtime invariant watchpoints.
//!
//! A watchpoint names a runtime invariant ("no exotic indexed-property
//! behavior is observable anywhere") that compiled code may rely on. Code
//! that depends on a watchpoint registers itself as a watcher; if the
//! runtime later violates the invariant, everything watching is invalidated
//! and recompiled.
//!
//! The elision pass only ever *adds* watchers. An invariant that is already
//! invalidated cannot be relied on, and the affected allocation sites are
//! simply never collected as candidates.

use std::cell::Cell;

/// The runtime invariants the elision pass can depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum Watchpoint {
    /// No object anywhere has exotic indexed-property behavior (sparse
    /// storage, indexed accessors). Guards every array-like candidate kind.
    NoExoticIndexing,
    /// The array prototype chain has no indexed properties, so an
    /// out-of-bounds read yields `undefined` without running user code.
    SaneArrayPrototypeChain,
}

/// The lifecycle state of a watchpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchpointState {
    /// The invariant holds and nothing is watching it yet.
    Clear,
    /// The invariant holds and at least one compilation is watching it.
    Watched,
    /// The invariant has been violated; it can never be relied on again.
    Invalidated,
}

/// The watchpoint registry for one runtime instance.
///
/// States use interior mutability because registering a watcher is a benign
/// side effect of an otherwise read-only analysis query: asking "may I rely
/// on this?" with an affirmative answer is what creates the dependency.
#[derive(Debug, Default)]
pub struct Watchpoints {
    no_exotic_indexing: Cell<WatchpointState>,
    sane_prototype_chain: Cell<WatchpointState>,
}

impl Default for WatchpointState {
    fn default() -> Self {
        Self::Clear
    }
}

impl Watchpoints {
    /// Creates a registry with every invariant intact and unwatched.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, watchpoint: Watchpoint) -> &Cell<WatchpointState> {
        match watchpoint {
            Watchpoint::NoExoticIndexing => &self.no_exotic_indexing,
            Watchpoint::SaneArrayPrototypeChain => &self.sane_prototype_chain,
        }
    }

    /// Returns the current state of a watchpoint.
    #[must_use]
    pub fn state(&self, watchpoint: Watchpoint) -> WatchpointState {
        self.cell(watchpoint).get()
    }

    /// Returns `true` if the invariant is currently being observed.
    #[must_use]
    pub fn is_watching(&self, watchpoint: Watchpoint) -> bool {
        self.state(watchpoint) == WatchpointState::Watched
    }

    /// Attempts to rely on the invariant, registering this compilation as a
    /// watcher.
    ///
    /// Returns `true` if the invariant holds (now watched); `false` if it
    /// has already been violated and must not be relied on.
    pub fn watch(&self, watchpoint: Watchpoint) -> bool {
        let cell = self.cell(watchpoint);
        match cell.get() {
            WatchpointState::Invalidated => false,
            WatchpointState::Clear | WatchpointState::Watched => {
                cell.set(WatchpointState::Watched);
                true
            }
        }
    }

    /// Marks the invariant as violated. Runtime-side test hook.
    pub fn invalidate(&self, watchpoint: Watchpoint) {
        self.cell(watchpoint).set(WatchpointState::Invalidated);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_registers() {
        let wp = Watchpoints::new();
        assert_eq!(wp.state(Watchpoint::NoExoticIndexing), WatchpointState::Clear);
        assert!(!wp.is_watching(Watchpoint::NoExoticIndexing));

        assert!(wp.watch(Watchpoint::NoExoticIndexing));
        assert!(wp.is_watching(Watchpoint::NoExoticIndexing));
        assert_eq!(
            wp.state(Watchpoint::NoExoticIndexing),
            WatchpointState::Watched
        );
    }

    #[test]
    fn test_invalidated_cannot_be_watched() {
        let wp = Watchpoints::new();
        wp.invalidate(Watchpoint::SaneArrayPrototypeChain);

        assert!(!wp.watch(Watchpoint::SaneArrayPrototypeChain));
        assert_eq!(
            wp.state(Watchpoint::SaneArrayPrototypeChain),
            WatchpointState::Invalidated
        );
    }

    #[test]
    fn test_watchpoints_are_independent() {
        let wp = Watchpoints::new();
        wp.invalidate(Watchpoint::NoExoticIndexing);

        assert!(wp.watch(Watchpoint::SaneArrayPrototypeChain));
        assert!(!wp.watch(Watchpoint::NoExoticIndexing));
    }
}
