//! Interference analysis: drop candidates whose backing stack region is
//! overwritten while their value is still demanded.
//!
//! An eliminated allocation must behave, at every point a debugger or a
//! deoptimization exit could observe its contents, as if it had copied the
//! argument values out of the call frame at allocation time. A write into
//! the frame's argument region between that conceptual copy point and a
//! point where the value is still live would make the reconstructed
//! contents disagree with the copied-at-allocation contents, so such a
//! candidate must stay a real allocation.
//!
//! The check is derived directly from that soundness requirement: walking
//! each clobbering block backward with the combined-liveness state in hand,
//! a relevant write at node `i` kills candidate `c` exactly when `c` is
//! live-out at `i` and `c`'s definition precedes `i` in program order. SSA
//! liveness cannot hold a value live above its definition, which gives the
//! "stop at the candidate's own definition" boundary for free - including
//! for blocks that precede the defining block entirely.

use std::collections::HashMap;

use crate::{
    analysis::{clobber, AbstractLocation, CombinedLiveness, Liveness, OsrAvailability},
    ir::{BlockId, FrameId, Graph, NodeId, Op},
    passes::{elision::Candidates, EventKind, EventLog},
    utils::BitSet,
};

/// Removes every candidate with a conflicting stack write.
pub(crate) fn eliminate_interfering_candidates(
    graph: &Graph,
    candidates: &mut Candidates,
    events: &mut EventLog,
) {
    let liveness = Liveness::compute(graph);
    let availability = OsrAvailability::compute(graph);
    let combined = CombinedLiveness::new(graph, &liveness, &availability);

    // Which slot ranges each candidate's contents depend on.
    let slots_by_candidate: HashMap<NodeId, BitSet> = candidates
        .iter()
        .map(|candidate| (candidate, relevant_slots(graph, candidate)))
        .collect();
    let mut all_relevant = BitSet::new();
    for slots in slots_by_candidate.values() {
        all_relevant.union_with(slots);
    }

    // Per-block clobber summary, used to skip blocks that cannot conflict.
    let order = graph.blocks_in_natural_order();
    let mut clobbered_by_block: Vec<(BitSet, bool)> =
        vec![(BitSet::new(), false); graph.block_count()];
    for &block_id in &order {
        let summary = &mut clobbered_by_block[block_id.index()];
        for &node_id in graph.block(block_id).nodes() {
            clobber::for_each_write(graph, node_id, |location| match location {
                AbstractLocation::Stack(register) => {
                    summary.0.insert(register.index());
                }
                AbstractLocation::EntireStack => summary.1 = true,
            });
        }
    }

    let owners = node_owners(graph);

    for &block_id in &order {
        let (clobbered, clobbers_everything) = &clobbered_by_block[block_id.index()];
        if !clobbers_everything && clobbered.is_disjoint(&all_relevant) {
            continue;
        }

        let block = graph.block(block_id);
        let mut live = combined.live_at_tail(block_id).clone();

        for index in (0..block.len()).rev() {
            let node_id = block.nodes()[index];

            let mut writes = Vec::new();
            let mut writes_everything = false;
            clobber::for_each_write(graph, node_id, |location| match location {
                AbstractLocation::Stack(register) => writes.push(register.index()),
                AbstractLocation::EntireStack => writes_everything = true,
            });

            if writes_everything || !writes.is_empty() {
                for candidate in candidates.snapshot() {
                    if !live.contains(candidate.index()) {
                        continue;
                    }
                    if !definition_precedes(&owners, candidate, block_id, index) {
                        continue;
                    }
                    let slots = &slots_by_candidate[&candidate];
                    let conflicts =
                        writes_everything || writes.iter().any(|&slot| slots.contains(slot));
                    if conflicts && candidates.remove(candidate) {
                        events
                            .record(EventKind::CandidateInterfered)
                            .node(candidate)
                            .message(format!(
                                "clobbered by {} in {block_id}",
                                graph.node(node_id).op()
                            ));
                    }
                }
            }

            // Step the liveness state backward across this node.
            live.remove(node_id.index());
            for edge in graph.node(node_id).children() {
                live.insert(edge.node.index());
            }
        }
    }
}

/// Maps every block-resident node to its (block, position).
fn node_owners(graph: &Graph) -> Vec<Option<(BlockId, usize)>> {
    let mut owners = vec![None; graph.node_count()];
    for block_id in graph.blocks_in_natural_order() {
        for (index, &node_id) in graph.block(block_id).nodes().iter().enumerate() {
            owners[node_id.index()] = Some((block_id, index));
        }
    }
    owners
}

/// Returns `true` if the candidate's definition precedes position
/// (`block`, `index`) in program order. A definition in another block
/// always precedes: the candidate can only be live here because its
/// definition dominates this point.
fn definition_precedes(
    owners: &[Option<(BlockId, usize)>],
    candidate: NodeId,
    block: BlockId,
    index: usize,
) -> bool {
    match owners[candidate.index()] {
        Some((def_block, def_index)) => def_block != block || def_index < index,
        // A candidate that owns no block position cannot conflict.
        None => false,
    }
}

/// Computes the set of stack slots the candidate's reconstructed contents
/// depend on: the argument regions of every frame it transitively unpacks,
/// plus the count and callee slots of frames whose argument count is only
/// known at execution time.
fn relevant_slots(graph: &Graph, candidate: NodeId) -> BitSet {
    let mut slots = BitSet::new();
    for frame in dependent_frames(graph, candidate) {
        let count = graph.argument_count_including_this(frame);
        for index in 0..count {
            slots.insert(graph.argument_register(frame, index).index());
        }
        if graph.is_varargs_frame(frame) {
            slots.insert(graph.argument_count_register(frame).index());
            slots.insert(graph.callee_register(frame).index());
        }
    }
    slots
}

/// Collects the distinct frames a candidate reads arguments from, walking
/// composite candidates with an explicit stack (the candidate DAG is
/// acyclic by construction: operands always precede their consumers).
fn dependent_frames(graph: &Graph, candidate: NodeId) -> Vec<Option<FrameId>> {
    let mut frames = Vec::new();
    let mut worklist = vec![candidate];
    while let Some(node_id) = worklist.pop() {
        let node = graph.node(node_id);
        match node.op() {
            Op::CreateDirectArguments | Op::CreateClonedArguments | Op::CreateRest { .. } => {
                let frame = node.origin().frame;
                if !frames.contains(&frame) {
                    frames.push(frame);
                }
            }
            Op::NewArrayLiteral { .. } => {}
            Op::Spread => worklist.push(node.child(0).node),
            Op::NewArrayWithSpread { spread_mask } => {
                for (i, edge) in node.children().iter().enumerate() {
                    if spread_mask.contains(i) {
                        worklist.push(edge.node);
                    }
                }
            }
            other => unreachable!("{other} is not a collectible allocation"),
        }
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{ArrayMode, Edge, GraphBuilder, ValueFormat, VirtualRegister},
        passes::elision::{collect, escape},
        runtime::RuntimeContext,
    };

    fn survivors(graph: &Graph, ctx: &RuntimeContext) -> Vec<NodeId> {
        let mut events = EventLog::new();
        let mut candidates = collect::collect(graph, ctx, &mut events);
        escape::eliminate_escaping_candidates(graph, ctx, &mut candidates, &mut events);
        eliminate_interfering_candidates(graph, &mut candidates, &mut events);
        candidates.snapshot()
    }

    /// arguments allocated in an inlined frame, argument slot written
    /// between the allocation and a later read: the candidate must fall.
    #[test]
    fn test_write_between_definition_and_use_interferes() {
        let mut b = GraphBuilder::new(1, 16);
        let frame = b
            .inline_frame(VirtualRegister::new(8), false, 3)
            .unwrap();
        let entry = b.block();
        b.set_frame(Some(frame));
        let args = b.add(entry, Op::CreateDirectArguments, vec![]).unwrap();
        b.set_frame(None);
        let value = b.int32(entry, 9).unwrap();
        b.ret(entry, Some(value)).unwrap();
        let mut graph = b.finish().unwrap();

        // Splice: PutStack to the frame's argument 1 slot, then a read of
        // args[0], in front of the terminator.
        let root = graph.root();
        let arg_slot = graph.argument_register(Some(frame), 1);
        let access = graph.stack_access(arg_slot, ValueFormat::JsValue);
        let origin = graph.node(args).origin();
        let put = graph.new_node(Op::PutStack { access }, vec![Edge::untyped(value)], origin);
        let index = graph.new_node(
            Op::JsConstant {
                value: crate::ir::ConstValue::Int32(0),
            },
            vec![],
            origin,
        );
        let get = graph.new_node(
            Op::GetIndex {
                mode: ArrayMode::contiguous_in_bounds(),
            },
            vec![Edge::untyped(args), Edge::untyped(index)],
            origin,
        );
        let terminator = graph.block(root).len() - 1;
        graph
            .block_mut(root)
            .nodes
            .splice(terminator..terminator, [put, index, get]);

        assert!(survivors(&graph, &RuntimeContext::new()).is_empty());
    }

    /// The same write placed after the candidate's last use is harmless.
    #[test]
    fn test_write_after_death_is_harmless() {
        let mut b = GraphBuilder::new(1, 16);
        let frame = b
            .inline_frame(VirtualRegister::new(8), false, 3)
            .unwrap();
        let entry = b.block();
        b.set_frame(Some(frame));
        let args = b.add(entry, Op::CreateDirectArguments, vec![]).unwrap();
        b.set_frame(None);
        let index = b.int32(entry, 0).unwrap();
        let get = b
            .add(
                entry,
                Op::GetIndex {
                    mode: ArrayMode::contiguous_in_bounds(),
                },
                vec![args, index],
            )
            .unwrap();
        b.ret(entry, Some(get)).unwrap();
        let mut graph = b.finish().unwrap();

        // Write the argument slot after the read.
        let root = graph.root();
        let arg_slot = graph.argument_register(Some(frame), 1);
        let access = graph.stack_access(arg_slot, ValueFormat::JsValue);
        let origin = graph.node(args).origin();
        let put = graph.new_node(Op::PutStack { access }, vec![Edge::untyped(index)], origin);
        let terminator = graph.block(root).len() - 1;
        graph.block_mut(root).nodes.insert(terminator, put);

        assert_eq!(survivors(&graph, &RuntimeContext::new()), vec![args]);
    }

    /// A write to an unrelated local never interferes.
    #[test]
    fn test_unrelated_write_is_harmless() {
        let mut b = GraphBuilder::new(1, 16);
        let frame = b
            .inline_frame(VirtualRegister::new(8), false, 3)
            .unwrap();
        let entry = b.block();
        b.set_frame(Some(frame));
        let args = b.add(entry, Op::CreateDirectArguments, vec![]).unwrap();
        b.set_frame(None);
        let index = b.int32(entry, 0).unwrap();
        let get = b
            .add(
                entry,
                Op::GetIndex {
                    mode: ArrayMode::contiguous_in_bounds(),
                },
                vec![args, index],
            )
            .unwrap();
        b.ret(entry, Some(get)).unwrap();
        let mut graph = b.finish().unwrap();

        // Write a local outside every frame's argument region, before the
        // read.
        let root = graph.root();
        let access = graph.stack_access(VirtualRegister::new(5), ValueFormat::JsValue);
        let origin = graph.node(args).origin();
        let put = graph.new_node(Op::PutStack { access }, vec![Edge::untyped(index)], origin);
        let read_position = graph
            .block(root)
            .nodes()
            .iter()
            .position(|&n| n == get)
            .unwrap();
        graph.block_mut(root).nodes.insert(read_position, put);

        assert_eq!(survivors(&graph, &RuntimeContext::new()), vec![args]);
    }

    /// Block-boundary case: definition in one block, clobber in the next,
    /// use in a third. The clobbering block neither defines nor uses the
    /// candidate; only liveness connects them.
    #[test]
    fn test_clobber_in_intermediate_block_interferes() {
        let mut b = GraphBuilder::new(1, 16);
        let frame = b
            .inline_frame(VirtualRegister::new(8), false, 2)
            .unwrap();
        let entry = b.block();
        let middle = b.block();
        let exit = b.block();

        b.set_frame(Some(frame));
        let args = b.add(entry, Op::CreateDirectArguments, vec![]).unwrap();
        b.set_frame(None);
        b.jump(entry, middle).unwrap();
        let value = b.int32(middle, 1).unwrap();
        b.jump(middle, exit).unwrap();
        let index = b.int32(exit, 0).unwrap();
        let get = b
            .add(
                exit,
                Op::GetIndex {
                    mode: ArrayMode::contiguous_in_bounds(),
                },
                vec![args, index],
            )
            .unwrap();
        b.ret(exit, Some(get)).unwrap();
        let mut graph = b.finish().unwrap();

        // Clobber an argument slot in the middle block.
        let arg_slot = graph.argument_register(Some(frame), 1);
        let access = graph.stack_access(arg_slot, ValueFormat::JsValue);
        let origin = graph.node(value).origin();
        let put = graph.new_node(Op::PutStack { access }, vec![Edge::untyped(value)], origin);
        let terminator = graph.block(middle).len() - 1;
        graph.block_mut(middle).nodes.insert(terminator, put);

        assert!(survivors(&graph, &RuntimeContext::new()).is_empty());
    }

    /// Variadic frames must also guard their count slot.
    #[test]
    fn test_varargs_frame_count_slot_is_relevant() {
        let mut b = GraphBuilder::new(1, 16);
        let frame = b.inline_frame(VirtualRegister::new(8), true, 4).unwrap();
        let entry = b.block();
        b.set_frame(Some(frame));
        let args = b.add(entry, Op::CreateDirectArguments, vec![]).unwrap();
        b.set_frame(None);
        let index = b.int32(entry, 0).unwrap();
        let get = b
            .add(
                entry,
                Op::GetIndex {
                    mode: ArrayMode::contiguous_in_bounds(),
                },
                vec![args, index],
            )
            .unwrap();
        b.ret(entry, Some(get)).unwrap();
        let mut graph = b.finish().unwrap();

        // Kill the frame's argument-count slot between definition and use.
        let count_slot = graph.argument_count_register(Some(frame));
        let origin = graph.node(args).origin();
        let kill = graph.new_node(
            Op::KillStack {
                register: count_slot,
            },
            vec![],
            origin,
        );
        let root = graph.root();
        let read_position = graph
            .block(root)
            .nodes()
            .iter()
            .position(|&n| n == get)
            .unwrap();
        graph.block_mut(root).nodes.insert(read_position, kill);

        assert!(survivors(&graph, &RuntimeContext::new()).is_empty());
    }

    #[test]
    fn test_dependent_frames_of_composites() {
        let mut b = GraphBuilder::new(1, 24);
        let f1 = b.inline_frame(VirtualRegister::new(8), false, 2).unwrap();
        let f2 = b.inline_frame(VirtualRegister::new(16), false, 3).unwrap();
        let entry = b.block();

        b.set_frame(Some(f1));
        let rest1 = b.add(entry, Op::CreateRest { skip: 0 }, vec![]).unwrap();
        b.set_frame(Some(f2));
        let rest2 = b.add(entry, Op::CreateRest { skip: 0 }, vec![]).unwrap();
        b.set_frame(None);
        let s1 = b.add(entry, Op::Spread, vec![rest1]).unwrap();
        let s2 = b.add(entry, Op::Spread, vec![rest2]).unwrap();
        let mut mask = crate::utils::BitSet::new();
        mask.insert(0);
        mask.insert(1);
        let arr = b
            .add(
                entry,
                Op::NewArrayWithSpread { spread_mask: mask },
                vec![s1, s2],
            )
            .unwrap();
        b.ret(entry, Some(arr)).unwrap();
        let graph = b.finish().unwrap();

        let frames = dependent_frames(&graph, arr);
        assert_eq!(frames.len(), 2);
        assert!(frames.contains(&Some(f1)));
        assert!(frames.contains(&Some(f2)));

        let slots = relevant_slots(&graph, arr);
        // f1 arguments: slots 10, 11; f2 arguments: slots 18, 19, 20.
        for slot in [10, 11, 18, 19, 20] {
            assert!(slots.contains(slot), "slot {slot} missing");
        }
        // Non-varargs frames do not guard their header slots.
        assert!(!slots.contains(8));
        assert!(!slots.contains(9));
    }
}
