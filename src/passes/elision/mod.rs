//! Escape-analysis-driven elimination of argument-object and array
//! allocations.
//!
//! Dynamic-language functions allocate a surprising number of short-lived
//! array-like objects: `arguments` objects, rest-parameter arrays, spread
//! expansions, and array literals that exist only to feed a spread or
//! vararg call. When such an allocation can be proven unobservable as a
//! heap object, it does not need to happen at all - reads go straight to
//! the call-frame stack storage the allocation would have copied from, and
//! vararg calls become fixed-arity or frame-forwarding calls.
//!
//! # Pipeline
//!
//! The pass runs four stages over one mutable graph, each of which can
//! shrink the candidate set to empty and short-circuit the rest:
//!
//! 1. **Collect** (`collect`) - one pre-order scan building the set of
//!    structurally eligible allocation sites
//! 2. **Escape** (`escape`) - removes every candidate consumed in a way
//!    the pass cannot reason about, iterating composite validity to a
//!    fixpoint
//! 3. **Interference** (`interference`) - removes every candidate whose
//!    backing stack region is written between its definition and a point
//!    where its value is still demanded
//! 4. **Rewrite** (`rewrite`) - converts survivors to phantom markers,
//!    redirects their consumers, and cleans up the CFG if control flow
//!    was simplified
//!
//! The candidate set shrinks monotonically: after collection, stages only
//! ever remove members. When it empties, the function compiles exactly as
//! if the pass had not run.

mod collect;
mod escape;
mod interference;
mod rewrite;

use crate::{
    ir::{Graph, NodeId},
    passes::{EventLog, IrPass},
    runtime::RuntimeContext,
    utils::BitSet,
    Result,
};

/// The set of allocation sites currently believed eliminable.
///
/// Backed by a bit set keyed on stable node indices for O(1) membership,
/// plus the collection-order list for deterministic iteration. Removal
/// clears the membership bit; the order list is filtered on iteration.
#[derive(Debug, Default)]
pub(crate) struct Candidates {
    members: BitSet,
    order: Vec<NodeId>,
}

impl Candidates {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Adds a candidate. No-op if already present.
    pub(crate) fn insert(&mut self, node: NodeId) {
        if self.members.insert(node.index()) {
            self.order.push(node);
        }
    }

    /// Returns `true` if the node is still a candidate.
    pub(crate) fn contains(&self, node: NodeId) -> bool {
        self.members.contains(node.index())
    }

    /// Drops a candidate. Returns `true` if it was still a member.
    pub(crate) fn remove(&mut self, node: NodeId) -> bool {
        self.members.remove(node.index())
    }

    /// Returns `true` if no candidates remain.
    pub(crate) fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Returns the number of remaining candidates.
    pub(crate) fn len(&self) -> usize {
        self.members.len()
    }

    /// Iterates remaining candidates in collection order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.order
            .iter()
            .copied()
            .filter(|node| self.members.contains(node.index()))
    }

    /// Snapshots the remaining candidates in collection order.
    pub(crate) fn snapshot(&self) -> Vec<NodeId> {
        self.iter().collect()
    }
}

/// What a pass run did, with the change log for auditing.
#[derive(Debug)]
pub struct Outcome {
    /// Whether any allocation was elided (and the graph therefore changed).
    pub changed: bool,
    /// The change log recorded during the run.
    pub events: EventLog,
}

/// The allocation-elision pass.
///
/// # Example
///
/// ```rust,ignore
/// use argelide::{passes::ArgumentsElisionPass, runtime::RuntimeContext};
///
/// let ctx = RuntimeContext::new();
/// let outcome = ArgumentsElisionPass::new().run(&mut graph, &ctx)?;
/// if outcome.changed {
///     // re-run dependent analyses
/// }
/// ```
#[derive(Debug, Default)]
pub struct ArgumentsElisionPass;

impl ArgumentsElisionPass {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Runs the pass and returns the full outcome including the event log.
    ///
    /// # Panics
    ///
    /// Panics if the graph is not in SSA form; invoking the pass on a raw
    /// graph is a pipeline bug.
    pub fn run(&self, graph: &mut Graph, ctx: &RuntimeContext) -> Result<Outcome> {
        assert!(
            graph.is_ssa(),
            "allocation elision requires a graph in SSA form"
        );
        graph.ensure_traversal_orders();

        let mut events = EventLog::new();

        let mut candidates = collect::collect(graph, ctx, &mut events);
        if candidates.is_empty() {
            return Ok(Outcome {
                changed: false,
                events,
            });
        }

        escape::eliminate_escaping_candidates(graph, ctx, &mut candidates, &mut events);
        if candidates.is_empty() {
            return Ok(Outcome {
                changed: false,
                events,
            });
        }

        interference::eliminate_interfering_candidates(graph, &mut candidates, &mut events);
        if candidates.is_empty() {
            return Ok(Outcome {
                changed: false,
                events,
            });
        }

        let changed = rewrite::rewrite(graph, &candidates, &mut events);
        Ok(Outcome { changed, events })
    }
}

impl IrPass for ArgumentsElisionPass {
    fn name(&self) -> &'static str {
        "arguments-elision"
    }

    fn description(&self) -> &'static str {
        "Eliminates argument-object and array allocations that provably never escape"
    }

    fn run(&self, graph: &mut Graph, ctx: &RuntimeContext) -> Result<bool> {
        Ok(self.run(graph, ctx)?.changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_membership() {
        let mut candidates = Candidates::new();
        candidates.insert(NodeId::new(4));
        candidates.insert(NodeId::new(9));
        candidates.insert(NodeId::new(4));

        assert_eq!(candidates.len(), 2);
        assert!(candidates.contains(NodeId::new(4)));
        assert!(!candidates.contains(NodeId::new(5)));

        assert!(candidates.remove(NodeId::new(4)));
        assert!(!candidates.remove(NodeId::new(4)));
        assert_eq!(candidates.snapshot(), vec![NodeId::new(9)]);
    }

    #[test]
    fn test_candidates_iteration_order() {
        let mut candidates = Candidates::new();
        candidates.insert(NodeId::new(9));
        candidates.insert(NodeId::new(2));
        candidates.insert(NodeId::new(5));
        candidates.remove(NodeId::new(2));

        let order: Vec<_> = candidates.iter().collect();
        assert_eq!(order, vec![NodeId::new(9), NodeId::new(5)]);
    }
}
