//! OSR availability analysis.
//!
//! When optimized code exits back to the unoptimized tier, every bytecode
//! local must be reconstructible. This forward analysis tracks, per stack
//! slot, *how*: from a still-computable node
//! ([`MovHint`](crate::ir::Op::MovHint) recorded it), from the stack itself
//! ([`PutStack`](crate::ir::Op::PutStack) flushed it), or not at all
//! ([`KillStack`](crate::ir::Op::KillStack) retired the slot, or control
//! flow disagrees).
//!
//! The merge at a join is a must-merge: a slot is only available if every
//! predecessor agrees on the same recovery. A slot whose predecessors
//! disagree cannot be demanded by an exit below the join, so `Dead` is the
//! correct result for the consumer of this map. Unvisited predecessors
//! (back edges on the first sweep) are treated as the identity of the
//! merge, giving the greatest fixpoint; over-claiming availability only
//! makes [`CombinedLiveness`](crate::analysis::CombinedLiveness) treat more
//! values as live, which errs on the side of not optimizing.

use crate::{
    ir::{BlockId, Graph, NodeId, Op},
    utils::BitSet,
};

/// How one stack slot's bytecode value can be recovered at an exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// The slot cannot be recovered (or holds nothing of interest).
    Dead,
    /// The slot's value is the given node, recomputable at exit.
    Node(NodeId),
    /// The slot's value has been flushed to the stack slot itself.
    Flushed,
}

impl Availability {
    fn merge(self, other: Self) -> Self {
        if self == other {
            self
        } else {
            Self::Dead
        }
    }
}

/// Per-block-tail recovery map for every stack slot.
pub struct OsrAvailability {
    at_tail: Vec<Option<Vec<Availability>>>,
}

impl OsrAvailability {
    /// Computes availability at the tail of every block.
    #[must_use]
    pub fn compute(graph: &Graph) -> Self {
        let slots = graph.stack_slot_count();
        let mut at_tail: Vec<Option<Vec<Availability>>> = vec![None; graph.block_count()];

        // Forward fixpoint over the natural order; acyclic graphs settle in
        // one sweep, loops in a few.
        let order = graph.blocks_in_natural_order();
        loop {
            let mut changed = false;
            for &block_id in &order {
                let block = graph.block(block_id);

                let mut merged: Option<Vec<Availability>> = None;
                for pred in block.predecessors() {
                    let Some(pred_tail) = &at_tail[pred.index()] else {
                        continue;
                    };
                    match &mut merged {
                        None => merged = Some(pred_tail.clone()),
                        Some(state) => {
                            for (slot, avail) in state.iter_mut().enumerate() {
                                *avail = avail.merge(pred_tail[slot]);
                            }
                        }
                    }
                }
                let mut state = merged.unwrap_or_else(|| vec![Availability::Dead; slots]);

                for &node_id in block.nodes() {
                    let node = graph.node(node_id);
                    match node.op() {
                        Op::MovHint { register } => {
                            state[register.index()] = Availability::Node(node.child(0).node);
                        }
                        Op::PutStack { access } => {
                            let register = graph.stack_access_data(*access).register;
                            state[register.index()] = Availability::Flushed;
                        }
                        Op::KillStack { register } => {
                            state[register.index()] = Availability::Dead;
                        }
                        _ => {}
                    }
                }

                if at_tail[block_id.index()].as_ref() != Some(&state) {
                    at_tail[block_id.index()] = Some(state);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        Self { at_tail }
    }

    /// Returns the recovery for one slot at a block's tail.
    #[must_use]
    pub fn at_tail(&self, block: BlockId, slot: usize) -> Availability {
        match &self.at_tail[block.index()] {
            Some(state) => state[slot],
            None => Availability::Dead,
        }
    }

    /// Returns the set of nodes some slot still recovers from at the
    /// block's tail - the values a deoptimization below this block could
    /// demand.
    #[must_use]
    pub fn nodes_at_tail(&self, block: BlockId) -> BitSet {
        let mut nodes = BitSet::new();
        if let Some(state) = &self.at_tail[block.index()] {
            for avail in state {
                if let Availability::Node(node) = avail {
                    nodes.insert(node.index());
                }
            }
        }
        nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Edge, GraphBuilder, ValueFormat, VirtualRegister};

    #[test]
    fn test_hint_then_kill() {
        let mut b = GraphBuilder::new(1, 8);
        let entry = b.block();
        let value = b.int32(entry, 1).unwrap();
        b.add(
            entry,
            Op::MovHint {
                register: VirtualRegister::new(5),
            },
            vec![value],
        )
        .unwrap();
        b.add(
            entry,
            Op::KillStack {
                register: VirtualRegister::new(5),
            },
            vec![],
        )
        .unwrap();
        b.ret(entry, None).unwrap();
        let graph = b.finish().unwrap();

        let availability = OsrAvailability::compute(&graph);
        assert_eq!(
            availability.at_tail(graph.root(), 5),
            Availability::Dead,
            "killed slot is not recoverable"
        );
        assert!(availability.nodes_at_tail(graph.root()).is_empty());
    }

    #[test]
    fn test_flush_overwrites_hint() {
        let mut b = GraphBuilder::new(1, 8);
        let entry = b.block();
        let value = b.int32(entry, 1).unwrap();
        b.add(
            entry,
            Op::MovHint {
                register: VirtualRegister::new(6),
            },
            vec![value],
        )
        .unwrap();
        b.ret(entry, None).unwrap();
        let mut graph = b.finish().unwrap();

        // Splice a PutStack to the same slot in front of the terminator.
        let root = graph.root();
        let access = graph.stack_access(VirtualRegister::new(6), ValueFormat::JsValue);
        let origin = graph.node(value).origin();
        let put = graph.new_node(Op::PutStack { access }, vec![Edge::untyped(value)], origin);
        let terminator_index = graph.block(root).len() - 1;
        graph.block_mut(root).nodes.insert(terminator_index, put);

        let availability = OsrAvailability::compute(&graph);
        assert_eq!(availability.at_tail(root, 6), Availability::Flushed);
    }

    #[test]
    fn test_join_requires_agreement() {
        let mut b = GraphBuilder::new(1, 8);
        let entry = b.block();
        let left = b.block();
        let right = b.block();
        let join = b.block();

        let cond = b.int32(entry, 0).unwrap();
        let value = b.int32(entry, 7).unwrap();
        b.branch(entry, cond, left, right).unwrap();

        // Both paths hint slot 4 with the same node; only the left path
        // hints slot 5.
        let reg4 = VirtualRegister::new(4);
        let reg5 = VirtualRegister::new(5);
        b.add(left, Op::MovHint { register: reg4 }, vec![value])
            .unwrap();
        b.add(left, Op::MovHint { register: reg5 }, vec![value])
            .unwrap();
        b.jump(left, join).unwrap();
        b.add(right, Op::MovHint { register: reg4 }, vec![value])
            .unwrap();
        b.jump(right, join).unwrap();
        b.ret(join, None).unwrap();
        let graph = b.finish().unwrap();

        let availability = OsrAvailability::compute(&graph);
        assert_eq!(availability.at_tail(join, 4), Availability::Node(value));
        assert_eq!(
            availability.at_tail(join, 5),
            Availability::Dead,
            "one-sided hint does not survive the join"
        );
    }
}
