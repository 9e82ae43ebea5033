//! Node liveness analysis.
//!
//! A node's value is *live* at a program point if some path from that point
//! reaches a use of the node. In SSA form each node is defined exactly once,
//! so the backward data-flow equations collapse to the classic form:
//!
//! - `USE[B]` = nodes used in B before being defined in B
//! - `DEF[B]` = nodes defined in B
//! - `OUT[B]` = ∪ `IN[S]` over successors S
//! - `IN[B]`  = `USE[B]` ∪ (`OUT[B]` - `DEF[B]`)
//!
//! The solver is a worklist over the natural order reversed; each block's
//! sets are bit vectors over node indices, so transfer is three word-wise
//! set operations.
//!
//! Deoptimization bookkeeping ([`MovHint`](crate::ir::Op::MovHint)) uses its
//! operand like any other consumer, so a value recorded for exit
//! reconstruction stays live through the hint with no special casing here.
//! What this analysis cannot see is a value whose *only* remaining demand is
//! a possible exit long after its last hint; [`CombinedLiveness`] layers the
//! availability analysis on top for that.

use crate::{
    analysis::OsrAvailability,
    ir::{BlockId, Graph},
    utils::BitSet,
};

/// Per-block liveness of node values.
pub struct Liveness {
    live_at_head: Vec<BitSet>,
    live_at_tail: Vec<BitSet>,
}

impl Liveness {
    /// Computes liveness for every alive block of the graph.
    #[must_use]
    pub fn compute(graph: &Graph) -> Self {
        let block_slots = graph.block_count();
        let node_count = graph.node_count();

        // Per-block USE/DEF sets.
        let mut use_sets = vec![BitSet::with_capacity(node_count); block_slots];
        let mut def_sets = vec![BitSet::with_capacity(node_count); block_slots];
        let order = graph.blocks_in_natural_order();
        for &block_id in &order {
            let uses = &mut use_sets[block_id.index()];
            let defs = &mut def_sets[block_id.index()];
            for &node_id in graph.block(block_id).nodes() {
                for edge in graph.node(node_id).children() {
                    if !defs.contains(edge.node.index()) {
                        uses.insert(edge.node.index());
                    }
                }
                defs.insert(node_id.index());
            }
        }

        let mut live_at_head = vec![BitSet::with_capacity(node_count); block_slots];
        let mut live_at_tail = vec![BitSet::with_capacity(node_count); block_slots];

        // Backward worklist; seed with every block in reverse natural order
        // so most blocks settle in one visit.
        let mut worklist: Vec<BlockId> = order.iter().rev().copied().collect();
        let mut queued = vec![true; block_slots];
        while let Some(block_id) = worklist.pop() {
            queued[block_id.index()] = false;

            let mut out = BitSet::with_capacity(node_count);
            for &succ in graph.block(block_id).successors() {
                out.union_with(&live_at_head[succ.index()]);
            }
            live_at_tail[block_id.index()] = out.clone();

            out.difference_with(&def_sets[block_id.index()]);
            out.union_with(&use_sets[block_id.index()]);

            if out != live_at_head[block_id.index()] {
                live_at_head[block_id.index()] = out;
                for &pred in graph.block(block_id).predecessors() {
                    if !queued[pred.index()] {
                        queued[pred.index()] = true;
                        worklist.push(pred);
                    }
                }
            }
        }

        Self {
            live_at_head,
            live_at_tail,
        }
    }

    /// Returns the nodes live at the head of a block.
    #[must_use]
    pub fn live_at_head(&self, block: BlockId) -> &BitSet {
        &self.live_at_head[block.index()]
    }

    /// Returns the nodes live at the tail of a block.
    #[must_use]
    pub fn live_at_tail(&self, block: BlockId) -> &BitSet {
        &self.live_at_tail[block.index()]
    }
}

/// Data-flow liveness widened with exit liveness.
///
/// A value the deoptimization machinery could still demand (it is recorded
/// in the availability map at a block's tail) is treated as live there even
/// if no IR consumer remains. Interference analysis scans backward from
/// these widened tail sets, so a stack write is conservatively treated as
/// observable by any value a possible exit might reconstruct.
pub struct CombinedLiveness {
    live_at_tail: Vec<BitSet>,
}

impl CombinedLiveness {
    /// Merges data-flow liveness with the availability map's exit demands.
    #[must_use]
    pub fn new(graph: &Graph, liveness: &Liveness, availability: &OsrAvailability) -> Self {
        let mut live_at_tail = Vec::with_capacity(graph.block_count());
        for index in 0..graph.block_count() {
            let block = BlockId::new(index);
            let mut live = liveness.live_at_tail(block).clone();
            live.union_with(&availability.nodes_at_tail(block));
            live_at_tail.push(live);
        }
        Self { live_at_tail }
    }

    /// Returns the nodes live-for-any-purpose at the tail of a block.
    #[must_use]
    pub fn live_at_tail(&self, block: BlockId) -> &BitSet {
        &self.live_at_tail[block.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{GraphBuilder, Op, VirtualRegister};

    #[test]
    fn test_straightline_liveness() {
        let mut b = GraphBuilder::new(1, 8);
        let entry = b.block();
        let value = b.int32(entry, 1).unwrap();
        let copy = b.add(entry, Op::Identity, vec![value]).unwrap();
        b.ret(entry, Some(copy)).unwrap();
        let graph = b.finish().unwrap();

        let liveness = Liveness::compute(&graph);
        let entry = graph.root();
        assert!(liveness.live_at_head(entry).is_empty());
        assert!(liveness.live_at_tail(entry).is_empty());
    }

    #[test]
    fn test_value_live_across_blocks() {
        let mut b = GraphBuilder::new(1, 8);
        let entry = b.block();
        let exit = b.block();
        let value = b.int32(entry, 1).unwrap();
        b.jump(entry, exit).unwrap();
        b.ret(exit, Some(value)).unwrap();
        let graph = b.finish().unwrap();

        let liveness = Liveness::compute(&graph);
        assert!(liveness.live_at_tail(graph.root()).contains(value.index()));
        assert!(liveness.live_at_head(exit).contains(value.index()));
        assert!(liveness.live_at_tail(exit).is_empty());
    }

    #[test]
    fn test_diamond_liveness_unions_paths() {
        let mut b = GraphBuilder::new(1, 8);
        let entry = b.block();
        let left = b.block();
        let right = b.block();
        let join = b.block();

        let value = b.int32(entry, 1).unwrap();
        let cond = b.int32(entry, 0).unwrap();
        b.branch(entry, cond, left, right).unwrap();
        b.jump(left, join).unwrap();
        // Only the right path uses the value before the join.
        let use_right = b.add(right, Op::Identity, vec![value]).unwrap();
        b.jump(right, join).unwrap();
        let _ = use_right;
        b.ret(join, Some(value)).unwrap();
        let graph = b.finish().unwrap();

        let liveness = Liveness::compute(&graph);
        // Live at tail of entry via both paths (join uses it too).
        assert!(liveness.live_at_tail(graph.root()).contains(value.index()));
        assert!(liveness.live_at_head(left).contains(value.index()));
        assert!(liveness.live_at_head(right).contains(value.index()));
        assert!(liveness.live_at_head(join).contains(value.index()));
    }

    #[test]
    fn test_combined_liveness_adds_exit_demand() {
        let mut b = GraphBuilder::new(1, 8);
        let entry = b.block();
        let exit = b.block();
        let value = b.int32(entry, 1).unwrap();
        b.add(
            entry,
            Op::MovHint {
                register: VirtualRegister::new(4),
            },
            vec![value],
        )
        .unwrap();
        b.jump(entry, exit).unwrap();
        b.ret(exit, None).unwrap();
        let graph = b.finish().unwrap();

        let liveness = Liveness::compute(&graph);
        // Plain liveness: dead after the hint.
        assert!(!liveness.live_at_tail(graph.root()).contains(value.index()));

        let availability = OsrAvailability::compute(&graph);
        let combined = CombinedLiveness::new(&graph, &liveness, &availability);
        // Exit liveness keeps it alive at the block boundary.
        assert!(combined.live_at_tail(graph.root()).contains(value.index()));
    }
}
