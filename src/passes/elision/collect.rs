//! Candidate collection: one pre-order scan over the graph.
//!
//! An allocation site enters the candidate set only if it is *structurally*
//! eligible - the checks here are about the allocation itself and the
//! runtime invariants it would rely on, never about how the value is used
//! (that is the escape stage's job).
//!
//! Composite shapes are recursive: a spread is only eligible if the array
//! it spreads is itself an eligible candidate, and an array-with-spread is
//! only eligible if every spread operand is. Pre-order visits definitions
//! before uses, so by the time a composite is examined its operands have
//! already been classified.

use crate::{
    ir::{Graph, Op},
    passes::{elision::Candidates, EventKind, EventLog},
    runtime::RuntimeContext,
};

/// Scans the graph and builds the initial candidate set.
pub(crate) fn collect(graph: &Graph, ctx: &RuntimeContext, events: &mut EventLog) -> Candidates {
    let mut candidates = Candidates::new();

    for block_id in graph.blocks_in_preorder() {
        for &node_id in graph.block(block_id).nodes() {
            let node = graph.node(node_id);
            match node.op() {
                // Arguments objects are always structurally eligible; both
                // shapes are fully described by their frame.
                Op::CreateDirectArguments | Op::CreateClonedArguments => {
                    candidates.insert(node_id);
                }

                // A rest array is a plain array only while nothing in the
                // runtime has exotic indexed behavior; otherwise an
                // out-of-bounds read could run arbitrary user code.
                Op::CreateRest { .. } => {
                    if ctx.watch_no_exotic_indexing() {
                        candidates.insert(node_id);
                    }
                }

                // A spread is eligible if it statically operates over a
                // plain array that is itself an accepted candidate.
                Op::Spread => {
                    let source = node.child(0).node;
                    let source_accepted = candidates.contains(source)
                        && matches!(
                            graph.node(source).op(),
                            Op::CreateRest { .. } | Op::NewArrayLiteral { .. }
                        );
                    if source_accepted && ctx.watch_no_exotic_indexing() {
                        candidates.insert(node_id);
                    }
                }

                // An array-with-spread is eligible if every spread operand
                // is an eligible spread candidate.
                Op::NewArrayWithSpread { spread_mask } => {
                    let all_spreads_accepted =
                        node.children().iter().enumerate().all(|(i, edge)| {
                            if !spread_mask.contains(i) {
                                return true;
                            }
                            candidates.contains(edge.node)
                                && matches!(graph.node(edge.node).op(), Op::Spread)
                        });
                    if all_spreads_accepted && ctx.watch_no_exotic_indexing() {
                        candidates.insert(node_id);
                    }
                }

                Op::NewArrayLiteral { indexing, .. } => {
                    if !indexing.has_exotic_storage() && ctx.watch_no_exotic_indexing() {
                        candidates.insert(node_id);
                    }
                }

                // Everything after a pseudo-terminal marker is dead.
                Op::ForceExit => break,

                _ => {}
            }
        }
    }

    for node in candidates.iter() {
        events
            .record(EventKind::CandidateCollected)
            .node(node)
            .message(format!("{}", graph.node(node).op()));
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{ConstValue, GraphBuilder, IndexingType, NodeId},
        runtime::Watchpoint,
        utils::BitSet,
    };
    use std::sync::Arc;

    fn literal_op(elements: &[i32]) -> Op {
        Op::NewArrayLiteral {
            elements: elements
                .iter()
                .map(|&v| ConstValue::Int32(v))
                .collect::<Vec<_>>()
                .into(),
            indexing: IndexingType::array_int32(),
        }
    }

    fn run_collect(graph: &Graph, ctx: &RuntimeContext) -> Vec<NodeId> {
        let mut events = EventLog::new();
        collect(graph, ctx, &mut events).snapshot()
    }

    #[test]
    fn test_arguments_always_eligible() {
        let mut b = GraphBuilder::new(2, 8);
        let entry = b.block();
        let args = b.add(entry, Op::CreateDirectArguments, vec![]).unwrap();
        b.ret(entry, Some(args)).unwrap();
        let graph = b.finish().unwrap();

        let ctx = RuntimeContext::new();
        ctx.watchpoints().invalidate(Watchpoint::NoExoticIndexing);
        assert_eq!(run_collect(&graph, &ctx), vec![args]);
    }

    #[test]
    fn test_rest_gated_on_watchpoint() {
        let mut b = GraphBuilder::new(2, 8);
        let entry = b.block();
        let rest = b.add(entry, Op::CreateRest { skip: 0 }, vec![]).unwrap();
        b.ret(entry, Some(rest)).unwrap();
        let graph = b.finish().unwrap();

        let watched = RuntimeContext::new();
        assert_eq!(run_collect(&graph, &watched), vec![rest]);

        let invalidated = RuntimeContext::new();
        invalidated
            .watchpoints()
            .invalidate(Watchpoint::NoExoticIndexing);
        assert!(run_collect(&graph, &invalidated).is_empty());
    }

    #[test]
    fn test_exotic_literal_rejected() {
        let mut b = GraphBuilder::new(1, 8);
        let entry = b.block();
        let exotic = b
            .add(
                entry,
                Op::NewArrayLiteral {
                    elements: Arc::from([ConstValue::Int32(1)]),
                    indexing: IndexingType::IS_ARRAY | IndexingType::ARRAY_STORAGE,
                },
                vec![],
            )
            .unwrap();
        b.ret(entry, Some(exotic)).unwrap();
        let graph = b.finish().unwrap();

        assert!(run_collect(&graph, &RuntimeContext::new()).is_empty());
    }

    #[test]
    fn test_spread_requires_candidate_source() {
        let mut b = GraphBuilder::new(1, 8);
        let entry = b.block();
        // Spread of something that is not an accepted allocation.
        let opaque = b.int32(entry, 0).unwrap();
        let spread = b.add(entry, Op::Spread, vec![opaque]).unwrap();
        b.ret(entry, Some(spread)).unwrap();
        let graph = b.finish().unwrap();

        assert!(run_collect(&graph, &RuntimeContext::new()).is_empty());
    }

    #[test]
    fn test_array_with_spread_recursive_eligibility() {
        let mut b = GraphBuilder::new(1, 8);
        let entry = b.block();
        let lit = b.add(entry, literal_op(&[1, 2]), vec![]).unwrap();
        let spread = b.add(entry, Op::Spread, vec![lit]).unwrap();
        let mut mask = BitSet::new();
        mask.insert(0);
        let arr = b
            .add(
                entry,
                Op::NewArrayWithSpread { spread_mask: mask },
                vec![spread],
            )
            .unwrap();
        b.ret(entry, Some(arr)).unwrap();
        let graph = b.finish().unwrap();

        let collected = run_collect(&graph, &RuntimeContext::new());
        assert_eq!(collected, vec![lit, spread, arr]);
    }

    #[test]
    fn test_scan_stops_at_pseudo_terminal() {
        let mut b = GraphBuilder::new(2, 8);
        let entry = b.block();
        b.add(entry, Op::ForceExit, vec![]).unwrap();
        let args = b.add(entry, Op::CreateDirectArguments, vec![]).unwrap();
        b.ret(entry, Some(args)).unwrap();
        let graph = b.finish().unwrap();

        assert!(
            run_collect(&graph, &RuntimeContext::new()).is_empty(),
            "allocations in dead code are not collected"
        );
    }
}
