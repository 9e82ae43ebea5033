//! Graph rewrite: convert surviving candidates to phantoms and redirect
//! every consumer.
//!
//! One forward pass over the blocks in pre-order. Definitions dominate
//! uses, so an allocation is always morphed into its phantom form before
//! any of its consumers is visited; consumers can therefore dispatch on the
//! phantom opcode directly.
//!
//! The rewrite is two-phase per block. During the scan, existing nodes are
//! only morphed in place; manufactured nodes (constants, stack reads,
//! length expressions) and deletions (statically satisfied checks) go into
//! a side buffer keyed by block position. After the scan the buffer is
//! applied in a single splice, so node positions observed during the scan
//! stay valid throughout it.
//!
//! A variadic load whose statically known argument count exceeds the slot
//! range reserved for it can never complete in optimized code. The rewriter
//! plants the pseudo-terminal marker there; after the splice the block is
//! truncated at the marker, an explicit unreachable terminator is appended
//! and the successor edges are dropped. If any block was truncated, the
//! cached traversal orders are invalidated and unreachable blocks are
//! killed.

use crate::{
    ir::{
        BlockId, ConstValue, Edge, FrameId, Graph, NodeId, NodeOrigin, Op, UseKind, ValueFormat,
        VarargsData,
    },
    passes::{
        elision::{escape::constant_index, Candidates},
        EventKind, EventLog,
    },
    utils::BitSet,
};

/// Deferred edits for one block: insertions keyed by the position they go
/// in front of, deletions by node identity, and whether a pseudo-terminal
/// marker was planted.
#[derive(Default)]
struct BlockEdit {
    insertions: Vec<(usize, NodeId)>,
    removals: BitSet,
    truncate: bool,
}

impl BlockEdit {
    fn insert(
        &mut self,
        graph: &mut Graph,
        index: usize,
        op: Op,
        children: Vec<Edge>,
        origin: NodeOrigin,
    ) -> NodeId {
        let id = graph.new_node(op, children, origin);
        self.insertions.push((index, id));
        id
    }

    fn is_empty(&self) -> bool {
        self.insertions.is_empty() && self.removals.is_empty() && !self.truncate
    }
}

/// Where one logical element of an eliminated array-like comes from.
enum ElementSource {
    /// An existing node value (a plain element of an array-with-spread).
    Node(NodeId),
    /// A compile-time constant (an array-literal element).
    Constant(ConstValue),
    /// Argument `index` of a statically sized frame, read off the stack.
    ForwardedArg {
        /// The frame read from.
        frame: Option<FrameId>,
        /// The argument index within the frame (0 is `this`).
        index: u32,
    },
}

/// Converts surviving candidates and their consumers. Returns `true` if
/// anything changed.
pub(crate) fn rewrite(
    graph: &mut Graph,
    candidates: &Candidates,
    events: &mut EventLog,
) -> bool {
    let mut changed = false;
    let mut cfg_changed = false;

    for block_id in graph.blocks_in_preorder() {
        let mut edit = BlockEdit::default();
        let block_len = graph.block(block_id).len();

        for index in 0..block_len {
            let node_id = graph.block(block_id).nodes()[index];
            let op = graph.node(node_id).op().clone();

            match op {
                // -- Allocations become phantoms -------------------------

                Op::CreateDirectArguments if candidates.contains(node_id) => {
                    graph
                        .node_mut(node_id)
                        .morph(Op::PhantomDirectArguments, vec![]);
                    events.record(EventKind::AllocationElided).node(node_id);
                    changed = true;
                }
                Op::CreateClonedArguments if candidates.contains(node_id) => {
                    graph
                        .node_mut(node_id)
                        .morph(Op::PhantomClonedArguments, vec![]);
                    events.record(EventKind::AllocationElided).node(node_id);
                    changed = true;
                }
                Op::CreateRest { skip } if candidates.contains(node_id) => {
                    graph.node_mut(node_id).morph(Op::PhantomRest { skip }, vec![]);
                    events.record(EventKind::AllocationElided).node(node_id);
                    changed = true;
                }
                Op::Spread if candidates.contains(node_id) => {
                    let children = graph.node(node_id).children().to_vec();
                    graph.node_mut(node_id).morph(Op::PhantomSpread, children);
                    events.record(EventKind::AllocationElided).node(node_id);
                    changed = true;
                }
                Op::NewArrayWithSpread { spread_mask } if candidates.contains(node_id) => {
                    let children = graph.node(node_id).children().to_vec();
                    graph
                        .node_mut(node_id)
                        .morph(Op::PhantomNewArrayWithSpread { spread_mask }, children);
                    events.record(EventKind::AllocationElided).node(node_id);
                    changed = true;
                }
                Op::NewArrayLiteral { elements, indexing } if candidates.contains(node_id) => {
                    graph
                        .node_mut(node_id)
                        .morph(Op::PhantomNewArrayLiteral { elements, indexing }, vec![]);
                    events.record(EventKind::AllocationElided).node(node_id);
                    changed = true;
                }

                // -- Length reads ----------------------------------------

                Op::GetArrayLength { .. } => {
                    let source = graph.node(node_id).child(0).node;
                    if candidates.contains(source) {
                        let origin = graph.node(node_id).origin();
                        let length = emit_length(graph, &mut edit, index, origin, source);
                        graph
                            .node_mut(node_id)
                            .morph(Op::Identity, vec![Edge::new(length, UseKind::Int32)]);
                        events.record(EventKind::UseRewritten).node(node_id);
                    }
                }

                // -- Indexed reads ---------------------------------------

                Op::GetIndex { mode } => {
                    let source = graph.node(node_id).child(0).node;
                    if candidates.contains(source) {
                        rewrite_get_index(graph, events, node_id, mode, source);
                    }
                }

                Op::GetFromArguments { index: arg_index } => {
                    let source = graph.node(node_id).child(0).node;
                    if candidates.contains(source) {
                        rewrite_get_from_arguments(
                            graph, &mut edit, index, events, node_id, arg_index, source,
                        );
                    }
                }

                // -- Statically satisfied checks -------------------------

                Op::TypeCheck | Op::CheckStructure { .. } => {
                    let checked = graph.node(node_id).child(0).node;
                    if candidates.contains(checked) {
                        edit.removals.insert(node_id.index());
                        events.record(EventKind::CheckDeleted).node(node_id);
                    }
                }

                // -- Varargs ---------------------------------------------

                Op::LoadVarargs { data } => {
                    let source = graph.node(node_id).child(0).node;
                    if candidates.contains(source) {
                        rewrite_load_varargs(
                            graph, &mut edit, index, events, node_id, &data, source,
                        );
                    }
                }

                Op::CallVarargs | Op::ConstructVarargs => {
                    let source = graph.node(node_id).child(2).node;
                    if candidates.contains(source) {
                        let construct = matches!(op, Op::ConstructVarargs);
                        rewrite_call_varargs(
                            graph, &mut edit, index, events, node_id, construct, source,
                        );
                    }
                }

                _ => {}
            }
        }

        if !edit.is_empty() {
            cfg_changed |= apply_edit(graph, block_id, edit, events);
        }
    }

    if cfg_changed {
        graph.invalidate_cfg();
        let killed = graph.kill_unreachable_blocks();
        if !killed.is_empty() {
            let rendered: Vec<String> = killed.iter().map(ToString::to_string).collect();
            events
                .record(EventKind::BlocksRemoved)
                .message(rendered.join(", "));
        }
    }

    changed
}

/// Splices the deferred edits into the block and performs the truncation,
/// if any. Returns `true` if the CFG shape changed.
fn apply_edit(graph: &mut Graph, block_id: BlockId, edit: BlockEdit, events: &mut EventLog) -> bool {
    if !edit.insertions.is_empty() || !edit.removals.is_empty() {
        let old = std::mem::take(&mut graph.block_mut(block_id).nodes);
        let mut new_nodes = Vec::with_capacity(old.len() + edit.insertions.len());
        let mut pending = edit.insertions.into_iter().peekable();
        for (index, node_id) in old.into_iter().enumerate() {
            while let Some((_, inserted)) = pending.next_if(|&(at, _)| at == index) {
                new_nodes.push(inserted);
            }
            if !edit.removals.contains(node_id.index()) {
                new_nodes.push(node_id);
            }
        }
        graph.block_mut(block_id).nodes = new_nodes;
    }

    if !edit.truncate {
        return false;
    }

    // Truncate at the first pseudo-terminal marker and seal the block.
    let position = graph
        .block(block_id)
        .nodes()
        .iter()
        .position(|&n| matches!(graph.node(n).op(), Op::ForceExit));
    let Some(position) = position else {
        return false;
    };
    let origin = graph
        .node(graph.block(block_id).nodes()[position])
        .origin();
    graph.block_mut(block_id).nodes.truncate(position + 1);
    let unreachable = graph.new_node(Op::Unreachable, vec![], origin);
    graph.block_mut(block_id).nodes.push(unreachable);

    let successors = std::mem::take(&mut graph.block_mut(block_id).successors);
    for successor in successors {
        graph
            .block_mut(successor)
            .predecessors
            .retain(|&pred| pred != block_id);
    }
    events.record(EventKind::BlockTruncated).message(format!("{block_id}"));
    true
}

/// Emits a node computing the length of an eliminated allocation, inserted
/// in front of `index`.
fn emit_length(
    graph: &mut Graph,
    edit: &mut BlockEdit,
    index: usize,
    origin: NodeOrigin,
    candidate: NodeId,
) -> NodeId {
    let op = graph.node(candidate).op().clone();
    match op {
        Op::PhantomDirectArguments | Op::PhantomClonedArguments => {
            let frame = graph.node(candidate).origin().frame;
            emit_frame_length(graph, edit, index, origin, frame, 0)
        }
        Op::PhantomRest { skip } => {
            let frame = graph.node(candidate).origin().frame;
            emit_frame_length(graph, edit, index, origin, frame, skip)
        }
        Op::PhantomNewArrayLiteral { elements, .. } => {
            let length = i32::try_from(elements.len()).expect("literal length fits i32");
            edit.insert(
                graph,
                index,
                Op::JsConstant {
                    value: ConstValue::Int32(length),
                },
                vec![],
                origin,
            )
        }
        Op::PhantomSpread => {
            let inner = graph.node(candidate).child(0).node;
            emit_length(graph, edit, index, origin, inner)
        }
        Op::PhantomNewArrayWithSpread { spread_mask } => {
            let children = graph.node(candidate).children().to_vec();
            let mut static_count: i32 = 0;
            let mut dynamic = Vec::new();
            for (i, edge) in children.iter().enumerate() {
                if !spread_mask.contains(i) {
                    static_count += 1;
                    continue;
                }
                match enumerate_elements(graph, edge.node) {
                    Some(elements) => {
                        static_count += i32::try_from(elements.len())
                            .expect("spread length fits i32");
                    }
                    None => dynamic.push(emit_length(graph, edit, index, origin, edge.node)),
                }
            }
            let mut total = edit.insert(
                graph,
                index,
                Op::JsConstant {
                    value: ConstValue::Int32(static_count),
                },
                vec![],
                origin,
            );
            for part in dynamic {
                total = edit.insert(
                    graph,
                    index,
                    Op::ArithAdd,
                    vec![
                        Edge::new(total, UseKind::Int32),
                        Edge::new(part, UseKind::Int32),
                    ],
                    origin,
                );
            }
            total
        }
        other => unreachable!("{other} is not an eliminated allocation"),
    }
}

/// Emits the length of a frame-backed arguments/rest view: a constant when
/// the frame's count is static, a count computation otherwise.
fn emit_frame_length(
    graph: &mut Graph,
    edit: &mut BlockEdit,
    index: usize,
    origin: NodeOrigin,
    frame: Option<FrameId>,
    skip: u32,
) -> NodeId {
    match graph.static_argument_count(frame) {
        Some(count) => {
            let length = count.saturating_sub(1 + skip);
            edit.insert(
                graph,
                index,
                Op::JsConstant {
                    value: ConstValue::Int32(length as i32),
                },
                vec![],
                origin,
            )
        }
        // count includes `this`, so with nothing skipped the length is an
        // exact count - 1; a skipping view needs the clamp at zero.
        None if skip == 0 => {
            let count = edit.insert(graph, index, Op::GetArgumentCount { frame }, vec![], origin);
            let one = edit.insert(
                graph,
                index,
                Op::JsConstant {
                    value: ConstValue::Int32(1),
                },
                vec![],
                origin,
            );
            edit.insert(
                graph,
                index,
                Op::ArithSub,
                vec![
                    Edge::new(count, UseKind::Int32),
                    Edge::new(one, UseKind::Int32),
                ],
                origin,
            )
        }
        None => edit.insert(graph, index, Op::RestLength { frame, skip }, vec![], origin),
    }
}

/// Enumerates the elements of an eliminated allocation, or `None` when its
/// shape depends on an execution-time argument count.
fn enumerate_elements(graph: &Graph, candidate: NodeId) -> Option<Vec<ElementSource>> {
    let node = graph.node(candidate);
    match node.op() {
        Op::PhantomDirectArguments | Op::PhantomClonedArguments => {
            let frame = node.origin().frame;
            let count = graph.static_argument_count(frame)?;
            Some(
                (1..count)
                    .map(|index| ElementSource::ForwardedArg { frame, index })
                    .collect(),
            )
        }
        Op::PhantomRest { skip } => {
            let frame = node.origin().frame;
            let count = graph.static_argument_count(frame)?;
            Some(
                (1 + skip..count)
                    .map(|index| ElementSource::ForwardedArg { frame, index })
                    .collect(),
            )
        }
        Op::PhantomNewArrayLiteral { elements, .. } => Some(
            elements
                .iter()
                .map(|&value| ElementSource::Constant(value))
                .collect(),
        ),
        Op::PhantomSpread => enumerate_elements(graph, node.child(0).node),
        Op::PhantomNewArrayWithSpread { spread_mask } => {
            let mut out = Vec::new();
            for (i, edge) in node.children().iter().enumerate() {
                if spread_mask.contains(i) {
                    out.extend(enumerate_elements(graph, edge.node)?);
                } else {
                    out.push(ElementSource::Node(edge.node));
                }
            }
            Some(out)
        }
        other => unreachable!("{other} is not an eliminated allocation"),
    }
}

/// Materializes one element in front of `index` and returns the node
/// producing its value.
fn materialize(
    graph: &mut Graph,
    edit: &mut BlockEdit,
    index: usize,
    origin: NodeOrigin,
    element: ElementSource,
) -> NodeId {
    match element {
        ElementSource::Node(node) => node,
        ElementSource::Constant(value) => {
            edit.insert(graph, index, Op::JsConstant { value }, vec![], origin)
        }
        ElementSource::ForwardedArg { frame, index: arg } => {
            let register = graph.argument_register(frame, arg);
            let access = graph.stack_access(register, ValueFormat::JsValue);
            edit.insert(graph, index, Op::GetStack { access }, vec![], origin)
        }
    }
}

fn rewrite_get_index(
    graph: &mut Graph,
    events: &mut EventLog,
    node_id: NodeId,
    mode: crate::ir::ArrayMode,
    source: NodeId,
) {
    use crate::ir::ArrayBounds;

    let index_edge = graph.node(node_id).child(1);
    let static_index = constant_index(graph, index_edge.node);
    let source_op = graph.node(source).op().clone();

    let (frame, skip) = match source_op {
        Op::PhantomDirectArguments | Op::PhantomClonedArguments => {
            (graph.node(source).origin().frame, 0)
        }
        Op::PhantomRest { skip } => (graph.node(source).origin().frame, skip),
        Op::PhantomNewArrayLiteral { elements, .. } => {
            // The escape stage only admits constant indices on literals.
            let index = static_index.expect("literal reads have constant indices");
            let value = elements
                .get(index as usize)
                .copied()
                .unwrap_or(ConstValue::Undefined);
            graph.node_mut(node_id).morph(Op::JsConstant { value }, vec![]);
            events.record(EventKind::UseRewritten).node(node_id);
            return;
        }
        other => unreachable!("indexed read of {other} survived escape analysis"),
    };

    if let (Some(index), Some(count)) = (static_index, graph.static_argument_count(frame)) {
        let logical = index + skip;
        if logical + 1 < count {
            // Provably within the frame's arguments: a direct slot read.
            let register = graph.argument_register(frame, logical + 1);
            let access = graph.stack_access(register, ValueFormat::JsValue);
            graph.node_mut(node_id).morph(Op::GetStack { access }, vec![]);
            events.record(EventKind::UseRewritten).node(node_id);
            return;
        }
        if mode.bounds == ArrayBounds::OutOfBounds {
            // Statically past the end, and the read tolerates that.
            graph.node_mut(node_id).morph(
                Op::JsConstant {
                    value: ConstValue::Undefined,
                },
                vec![],
            );
            events.record(EventKind::UseRewritten).node(node_id);
            return;
        }
    }

    // Anything else keeps a runtime-checked read of the live frame.
    let children = vec![Edge::untyped(source), Edge::new(index_edge.node, UseKind::Int32)];
    graph.node_mut(node_id).morph(
        Op::GetArgumentByVal {
            frame,
            skip,
            out_of_bounds: mode.bounds == ArrayBounds::OutOfBounds,
        },
        children,
    );
    events.record(EventKind::UseRewritten).node(node_id);
}

fn rewrite_get_from_arguments(
    graph: &mut Graph,
    edit: &mut BlockEdit,
    index: usize,
    events: &mut EventLog,
    node_id: NodeId,
    arg_index: u32,
    source: NodeId,
) {
    let frame = graph.node(source).origin().frame;
    match graph.static_argument_count(frame) {
        Some(count) => {
            let new_op = if arg_index + 1 < count {
                let register = graph.argument_register(frame, arg_index + 1);
                let access = graph.stack_access(register, ValueFormat::JsValue);
                Op::GetStack { access }
            } else {
                Op::JsConstant {
                    value: ConstValue::Undefined,
                }
            };
            graph.node_mut(node_id).morph(new_op, vec![]);
        }
        None => {
            let origin = graph.node(node_id).origin();
            let constant = edit.insert(
                graph,
                index,
                Op::JsConstant {
                    value: ConstValue::Int32(arg_index as i32),
                },
                vec![],
                origin,
            );
            graph.node_mut(node_id).morph(
                Op::GetArgumentByVal {
                    frame,
                    skip: 0,
                    out_of_bounds: true,
                },
                vec![Edge::untyped(source), Edge::new(constant, UseKind::Int32)],
            );
        }
    }
    events.record(EventKind::UseRewritten).node(node_id);
}

fn rewrite_load_varargs(
    graph: &mut Graph,
    edit: &mut BlockEdit,
    index: usize,
    events: &mut EventLog,
    node_id: NodeId,
    data: &VarargsData,
    source: NodeId,
) {
    let origin = graph.node(node_id).origin();
    match enumerate_elements(graph, source) {
        Some(mut elements) => {
            let offset = (data.first_vararg_offset as usize).min(elements.len());
            elements.drain(..offset);

            let count_including_this = elements.len() as u32 + 1;
            if count_including_this > data.limit {
                // The load can never complete in optimized code; plant the
                // pseudo-terminal marker in its place.
                edit.insert(graph, index, Op::ForceExit, vec![], origin);
                edit.truncate = true;
                events
                    .record(EventKind::LoadConverted)
                    .node(node_id)
                    .message(format!(
                        "{count_including_this} arguments always exceed limit {}",
                        data.limit
                    ));
                return;
            }

            // Materialize every element before emitting any store, so the
            // stores cannot clobber a slot a later element still reads.
            let values: Vec<NodeId> = elements
                .into_iter()
                .map(|element| materialize(graph, edit, index, origin, element))
                .collect();

            let count = edit.insert(
                graph,
                index,
                Op::JsConstant {
                    value: ConstValue::Int32(count_including_this as i32),
                },
                vec![],
                origin,
            );
            let count_access = graph.stack_access(data.count_register, ValueFormat::Int32);
            edit.insert(
                graph,
                index,
                Op::PutStack {
                    access: count_access,
                },
                vec![Edge::new(count, UseKind::Int32)],
                origin,
            );
            for (i, value) in values.into_iter().enumerate() {
                let register = data.start.offset_by(i as u32);
                let access = graph.stack_access(register, ValueFormat::JsValue);
                edit.insert(
                    graph,
                    index,
                    Op::PutStack { access },
                    vec![Edge::untyped(value)],
                    origin,
                );
            }
            graph
                .node_mut(node_id)
                .morph(Op::Phantom, vec![Edge::untyped(source)]);
            events
                .record(EventKind::LoadConverted)
                .node(node_id)
                .message("expanded to direct stores");
        }
        None => {
            let children = graph.node(node_id).children().to_vec();
            graph
                .node_mut(node_id)
                .morph(Op::ForwardVarargs { data: data.clone() }, children);
            events
                .record(EventKind::LoadConverted)
                .node(node_id)
                .message("forwarding");
        }
    }
}

fn rewrite_call_varargs(
    graph: &mut Graph,
    edit: &mut BlockEdit,
    index: usize,
    events: &mut EventLog,
    node_id: NodeId,
    construct: bool,
    source: NodeId,
) {
    let origin = graph.node(node_id).origin();
    let callee = graph.node(node_id).child(0);
    let this = graph.node(node_id).child(1);

    match enumerate_elements(graph, source) {
        Some(elements) => {
            let mut children = vec![callee, this];
            for element in elements {
                let value = materialize(graph, edit, index, origin, element);
                children.push(Edge::untyped(value));
            }
            let arity = children.len() - 2;
            let new_op = if construct { Op::Construct } else { Op::Call };
            graph.node_mut(node_id).morph(new_op, children);
            events
                .record(EventKind::CallConverted)
                .node(node_id)
                .message(format!("fixed arity {arity}"));
        }
        None => {
            let children = graph.node(node_id).children().to_vec();
            let new_op = if construct {
                Op::ConstructForwardVarargs
            } else {
                Op::CallForwardVarargs
            };
            graph.node_mut(node_id).morph(new_op, children);
            events
                .record(EventKind::CallConverted)
                .node(node_id)
                .message("forwarding");
        }
    }
}
