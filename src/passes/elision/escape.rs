//! Escape analysis: drop every candidate the pass cannot account for.
//!
//! One sweep over all instructions classifies, per opcode, which operand
//! edges are *safe* consumptions of a candidate (index and length reads,
//! vararg loads and calls, deoptimization hints, statically satisfied
//! checks) and which make the candidate observable as a heap object. The
//! classification is an exhaustive match: an opcode nobody thought about
//! fails to compile instead of silently escaping.
//!
//! Composite candidates add a second phase. A spread is only
//! reconstructible while the array it unpacks is, and an array-with-spread
//! while all of its spread operands are, so after the sweep the composite
//! validity rule is re-applied until no more removals happen. The set
//! shrinks monotonically, so the fixpoint terminates.

use crate::{
    ir::{Edge, Graph, Op},
    passes::{elision::Candidates, EventKind, EventLog},
    runtime::{RuntimeContext, StructureId, StructureKind},
};

/// Removes every candidate with at least one escaping consumer, then
/// enforces composite validity to a fixpoint.
pub(crate) fn eliminate_escaping_candidates(
    graph: &Graph,
    ctx: &RuntimeContext,
    candidates: &mut Candidates,
    events: &mut EventLog,
) {
    sweep(graph, ctx, candidates, events);
    enforce_composite_validity(graph, candidates, events);
}

/// Returns the canonical structure an eliminated allocation is statically
/// known to have, or `None` for element sequences (spreads), which have no
/// object identity of their own.
fn candidate_structure(ctx: &RuntimeContext, op: &Op) -> Option<StructureId> {
    let kind = match op {
        Op::CreateDirectArguments => StructureKind::DirectArguments,
        Op::CreateClonedArguments => StructureKind::ClonedArguments,
        Op::CreateRest { .. } => StructureKind::RestArray(crate::ir::IndexingType::array_contiguous()),
        Op::NewArrayLiteral { indexing, .. } => StructureKind::ArrayLiteral(*indexing),
        _ => return None,
    };
    Some(ctx.canonical_structure(kind))
}

/// Returns `true` if the edge's type requirement is already satisfied by
/// what the candidate allocation is statically known to be.
fn use_kind_satisfied(graph: &Graph, edge: Edge) -> bool {
    use crate::ir::UseKind;
    match edge.kind {
        UseKind::Untyped => true,
        // Every candidate allocation is a heap object.
        UseKind::Cell | UseKind::Object => true,
        UseKind::Array => graph.node(edge.node).op().produces_array(),
        UseKind::Int32 => false,
    }
}

fn remove(candidates: &mut Candidates, events: &mut EventLog, edge: Edge, consumer: &Op) {
    if candidates.remove(edge.node) {
        events
            .record(EventKind::CandidateEscaped)
            .node(edge.node)
            .message(format!("consumed by {consumer}"));
    }
}

fn sweep(graph: &Graph, ctx: &RuntimeContext, candidates: &mut Candidates, events: &mut EventLog) {
    // A safe consumption still escapes if its edge carries a type check the
    // candidate does not statically satisfy.
    let consume = |candidates: &mut Candidates, events: &mut EventLog, edge: Edge, op: &Op| {
        if candidates.contains(edge.node) && !use_kind_satisfied(graph, edge) {
            remove(candidates, events, edge, op);
        }
    };

    for block_id in graph.blocks_in_natural_order() {
        for &node_id in graph.block(block_id).nodes() {
            let node = graph.node(node_id);
            let op = node.op();
            match op {
                // -- Safe reads ------------------------------------------

                Op::GetFromArguments { .. } => {
                    let source = node.child(0);
                    if candidates.contains(source.node)
                        && !matches!(graph.node(source.node).op(), Op::CreateDirectArguments)
                    {
                        remove(candidates, events, source, op);
                    }
                }

                Op::GetArrayLength { mode } => {
                    let source = node.child(0);
                    if mode.is_exotic() || !use_kind_satisfied(graph, source) {
                        remove(candidates, events, source, op);
                    }
                }

                Op::GetIndex { mode } => {
                    // The index operand is a value use, never safe.
                    remove(candidates, events, node.child(1), op);

                    let source = node.child(0);
                    if candidates.contains(source.node) {
                        let safe = !mode.is_exotic()
                            && use_kind_satisfied(graph, source)
                            && index_read_is_reconstructible(graph, ctx, node_id, *mode);
                        if !safe {
                            remove(candidates, events, source, op);
                        }
                    }
                }

                // -- Checks ----------------------------------------------

                Op::TypeCheck => {
                    let checked = node.child(0);
                    if candidates.contains(checked.node) && !use_kind_satisfied(graph, checked) {
                        remove(candidates, events, checked, op);
                    }
                }

                Op::CheckStructure { set } => {
                    let checked = node.child(0);
                    if candidates.contains(checked.node) {
                        let known = candidate_structure(ctx, graph.node(checked.node).op());
                        let redundant = known.is_some_and(|structure| set.contains(structure));
                        if !redundant {
                            remove(candidates, events, checked, op);
                        }
                    }
                }

                // -- Varargs sinks ---------------------------------------

                Op::LoadVarargs { .. } | Op::ForwardVarargs { .. } => {
                    consume(candidates, events, node.child(0), op);
                }

                Op::CallVarargs
                | Op::ConstructVarargs
                | Op::CallForwardVarargs
                | Op::ConstructForwardVarargs => {
                    remove(candidates, events, node.child(0), op);
                    remove(candidates, events, node.child(1), op);
                    consume(candidates, events, node.child(2), op);
                }

                // -- Composite unpacking ---------------------------------

                Op::Spread => {
                    if candidates.contains(node_id) {
                        consume(candidates, events, node.child(0), op);
                    } else {
                        remove(candidates, events, node.child(0), op);
                    }
                }

                Op::NewArrayWithSpread { spread_mask } => {
                    let composite_is_candidate = candidates.contains(node_id);
                    for (i, &edge) in node.children().iter().enumerate() {
                        if composite_is_candidate && spread_mask.contains(i) {
                            consume(candidates, events, edge, op);
                        } else {
                            // A candidate stored as a plain element value
                            // becomes observable.
                            remove(candidates, events, edge, op);
                        }
                    }
                }

                // -- Housekeeping whitelist ------------------------------

                // Deoptimization hints and keep-alives reference a value's
                // reconstruction, not the object itself.
                Op::MovHint { .. } | Op::Phantom => {}

                // -- Everything else escapes -----------------------------

                Op::CreateDirectArguments
                | Op::CreateClonedArguments
                | Op::CreateRest { .. }
                | Op::NewArrayLiteral { .. }
                | Op::PhantomDirectArguments
                | Op::PhantomClonedArguments
                | Op::PhantomRest { .. }
                | Op::PhantomSpread
                | Op::PhantomNewArrayWithSpread { .. }
                | Op::PhantomNewArrayLiteral { .. }
                | Op::GetArgumentCount { .. }
                | Op::RestLength { .. }
                | Op::GetArgumentByVal { .. }
                | Op::GetStack { .. }
                | Op::PutStack { .. }
                | Op::KillStack { .. }
                | Op::Call
                | Op::Construct
                | Op::JsConstant { .. }
                | Op::Identity
                | Op::ArithAdd
                | Op::ArithSub
                | Op::Phi
                | Op::Jump
                | Op::Branch
                | Op::Return
                | Op::ForceExit
                | Op::Unreachable => {
                    for &edge in node.children() {
                        remove(candidates, events, edge, op);
                    }
                }
            }
        }
    }
}

/// Returns `true` if an indexed read of a candidate can be answered without
/// materializing it, for every index value the read can see at runtime.
fn index_read_is_reconstructible(
    graph: &Graph,
    ctx: &RuntimeContext,
    read: crate::ir::NodeId,
    mode: crate::ir::ArrayMode,
) -> bool {
    use crate::ir::ArrayBounds;

    let node = graph.node(read);
    let source = node.child(0).node;
    let static_index = constant_index(graph, node.child(1).node);

    match graph.node(source).op() {
        // Element sequences have no indexed reads; they are only unpacked
        // by an accepting composite.
        Op::Spread | Op::NewArrayWithSpread { .. } => false,

        // Literal elements are compile-time constants, so the read is only
        // reconstructible when the index is one.
        Op::NewArrayLiteral { elements, .. } => match static_index {
            None => false,
            Some(index) => {
                if (index as usize) < elements.len() {
                    true
                } else {
                    // A known out-of-bounds read of a literal folds to
                    // `undefined` only if the prototype chain stays sane.
                    mode.bounds == ArrayBounds::OutOfBounds && ctx.watch_sane_prototype_chain()
                }
            }
        },

        // Frame-backed candidates answer any index from the live frame.
        _ => match mode.bounds {
            ArrayBounds::InBounds => true,
            ArrayBounds::OutOfBounds => ctx.watch_sane_prototype_chain(),
        },
    }
}

/// Returns the non-negative constant index of a read, if statically known.
pub(crate) fn constant_index(graph: &Graph, index: crate::ir::NodeId) -> Option<u32> {
    match graph.node(index).op() {
        Op::JsConstant { value } => value
            .as_int32()
            .and_then(|v| u32::try_from(v).ok()),
        _ => None,
    }
}

fn enforce_composite_validity(graph: &Graph, candidates: &mut Candidates, events: &mut EventLog) {
    loop {
        let mut removed_any = false;
        for node_id in candidates.snapshot() {
            let node = graph.node(node_id);
            let valid = match node.op() {
                Op::Spread => candidates.contains(node.child(0).node),
                Op::NewArrayWithSpread { spread_mask } => node
                    .children()
                    .iter()
                    .enumerate()
                    .all(|(i, edge)| !spread_mask.contains(i) || candidates.contains(edge.node)),
                _ => true,
            };
            if !valid && candidates.remove(node_id) {
                events
                    .record(EventKind::CandidateInvalidated)
                    .node(node_id)
                    .message("lost a sub-candidate");
                removed_any = true;
            }
        }
        if !removed_any {
            break;
        }
    }
}
