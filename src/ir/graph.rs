//! The IR graph: node arena, block list, frames and stack accesses.
//!
//! The graph owns everything the pass touches. Nodes live in an index-stable
//! arena (identifiers never shift, in-place opcode rewrites keep identity),
//! blocks form a CFG with cached pre-order and natural (reverse-postorder)
//! traversal orders, and frame/stack-access records are interned tables that
//! nodes reference by id.
//!
//! # Stack layout
//!
//! The machine frame occupies the low slots of the operand space using the
//! same header layout as inlined frames: slot 0 is the callee, slot 1 the
//! argument count, slots `2..2 + argument_count` the arguments (argument 0
//! is `this`). Locals and inlined frame regions follow, up to
//! [`Graph::stack_slot_count`].

use std::collections::HashMap;
use std::fmt;

use crate::ir::{
    frames::{ARGUMENT_COUNT_SLOT, CALLEE_SLOT, FIRST_ARGUMENT_SLOT},
    BasicBlock, BlockId, Edge, FrameId, InlineCallFrame, Node, NodeId, NodeOrigin, Op,
    StackAccessData, StackAccessId, ValueFormat, VirtualRegister,
};

/// The representation stage a graph is in.
///
/// The elision pass requires [`GraphForm::Ssa`] and asserts it on entry;
/// running the pass on a raw graph is a pipeline bug, not a recoverable
/// condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphForm {
    /// Under construction; SSA properties not yet validated.
    Raw,
    /// Validated SSA form: each node is the unique definition of its value
    /// and definitions dominate uses.
    Ssa,
}

/// The mutable IR graph of one compilation unit.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<Node>,
    blocks: Vec<BasicBlock>,
    frames: Vec<InlineCallFrame>,
    stack_accesses: Vec<StackAccessData>,
    access_cache: HashMap<(VirtualRegister, ValueFormat), StackAccessId>,
    argument_count: u32,
    stack_slots: usize,
    form: GraphForm,
    preorder: Option<Vec<BlockId>>,
    natural_order: Option<Vec<BlockId>>,
}

impl Graph {
    /// Creates an empty raw graph.
    ///
    /// # Arguments
    ///
    /// * `argument_count` - Machine-frame argument count including `this`
    /// * `stack_slots` - Total operand-space size; must cover the machine
    ///   frame header and arguments
    #[must_use]
    pub fn new(argument_count: u32, stack_slots: usize) -> Self {
        Self {
            nodes: Vec::new(),
            blocks: Vec::new(),
            frames: Vec::new(),
            stack_accesses: Vec::new(),
            access_cache: HashMap::new(),
            argument_count,
            stack_slots,
            form: GraphForm::Raw,
            preorder: None,
            natural_order: None,
        }
    }

    // -- Form --------------------------------------------------------------

    /// Returns the graph's representation stage.
    #[must_use]
    pub const fn form(&self) -> GraphForm {
        self.form
    }

    /// Returns `true` if the graph is in validated SSA form.
    #[must_use]
    pub fn is_ssa(&self) -> bool {
        self.form == GraphForm::Ssa
    }

    pub(crate) fn set_form(&mut self, form: GraphForm) {
        self.form = form;
    }

    // -- Nodes -------------------------------------------------------------

    /// Returns the node with the given identifier.
    ///
    /// # Panics
    ///
    /// Panics if the identifier does not belong to this graph.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Returns a mutable reference to the node with the given identifier.
    ///
    /// # Panics
    ///
    /// Panics if the identifier does not belong to this graph.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    /// Returns the number of nodes ever allocated in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Allocates a node in the arena without placing it into a block.
    ///
    /// The rewriter uses this to manufacture nodes that a deferred
    /// insertion buffer later splices into a block.
    pub fn new_node(&mut self, op: Op, children: Vec<Edge>, origin: NodeOrigin) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(Node::new(op, children, origin));
        id
    }

    // -- Blocks ------------------------------------------------------------

    /// Returns the block with the given identifier.
    ///
    /// # Panics
    ///
    /// Panics if the identifier does not belong to this graph.
    #[must_use]
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    /// Returns a mutable reference to the block with the given identifier.
    ///
    /// # Panics
    ///
    /// Panics if the identifier does not belong to this graph.
    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.index()]
    }

    /// Returns the number of block slots, including killed blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Appends a new empty block and returns its identifier.
    pub fn add_block(&mut self) -> BlockId {
        let id = BlockId::new(self.blocks.len());
        self.blocks.push(BasicBlock::new(id));
        self.invalidate_cfg();
        id
    }

    /// Returns the entry block.
    ///
    /// # Panics
    ///
    /// Panics if the graph has no blocks.
    #[must_use]
    pub fn root(&self) -> BlockId {
        assert!(!self.blocks.is_empty(), "graph has no blocks");
        BlockId::new(0)
    }

    /// Adds a control-flow edge between two blocks.
    pub fn link(&mut self, from: BlockId, to: BlockId) {
        self.blocks[from.index()].successors.push(to);
        self.blocks[to.index()].predecessors.push(from);
        self.invalidate_cfg();
    }

    // -- Frames ------------------------------------------------------------

    /// Registers an inline call frame and returns its identifier.
    pub fn add_frame(&mut self, frame: InlineCallFrame) -> FrameId {
        let id = FrameId::new(self.frames.len());
        self.frames.push(frame);
        id
    }

    /// Returns the frame record for the given identifier.
    ///
    /// # Panics
    ///
    /// Panics if the identifier does not belong to this graph.
    #[must_use]
    pub fn frame(&self, id: FrameId) -> &InlineCallFrame {
        &self.frames[id.index()]
    }

    /// Returns the machine-frame argument count including `this`.
    #[must_use]
    pub const fn argument_count(&self) -> u32 {
        self.argument_count
    }

    /// Returns the total operand-space size in slots.
    #[must_use]
    pub const fn stack_slot_count(&self) -> usize {
        self.stack_slots
    }

    /// Returns the slot holding the callee of the given frame
    /// (`None` is the machine frame).
    #[must_use]
    pub fn callee_register(&self, frame: Option<FrameId>) -> VirtualRegister {
        match frame {
            None => VirtualRegister::new(CALLEE_SLOT),
            Some(id) => self.frame(id).callee_register(),
        }
    }

    /// Returns the slot holding the argument count of the given frame.
    #[must_use]
    pub fn argument_count_register(&self, frame: Option<FrameId>) -> VirtualRegister {
        match frame {
            None => VirtualRegister::new(ARGUMENT_COUNT_SLOT),
            Some(id) => self.frame(id).argument_count_register(),
        }
    }

    /// Returns the slot holding logical argument `index` of the given frame
    /// (argument 0 is `this`).
    #[must_use]
    pub fn argument_register(&self, frame: Option<FrameId>, index: u32) -> VirtualRegister {
        match frame {
            None => VirtualRegister::new(FIRST_ARGUMENT_SLOT + index),
            Some(id) => self.frame(id).argument_register(index),
        }
    }

    /// Returns the argument count including `this` of the given frame: the
    /// declared count for the machine frame, the recorded count (or
    /// maximum) for an inlined one.
    #[must_use]
    pub fn argument_count_including_this(&self, frame: Option<FrameId>) -> u32 {
        match frame {
            None => self.argument_count,
            Some(id) => self.frame(id).argument_count_including_this(),
        }
    }

    /// Returns the exact argument count of the frame if it is statically
    /// known: `Some` only for inlined non-varargs frames. The machine
    /// frame's count is a runtime quantity (callers may pass any count),
    /// and varargs frames only record a maximum.
    #[must_use]
    pub fn static_argument_count(&self, frame: Option<FrameId>) -> Option<u32> {
        match frame {
            None => None,
            Some(id) => {
                let frame = self.frame(id);
                (!frame.is_varargs()).then(|| frame.argument_count_including_this())
            }
        }
    }

    /// Returns `true` if the frame's argument count is only known at
    /// execution time.
    #[must_use]
    pub fn is_varargs_frame(&self, frame: Option<FrameId>) -> bool {
        self.static_argument_count(frame).is_none()
    }

    // -- Stack accesses ----------------------------------------------------

    /// Interns a stack access for the given slot and representation.
    ///
    /// Repeated requests for the same pair return the same identifier.
    pub fn stack_access(
        &mut self,
        register: VirtualRegister,
        format: ValueFormat,
    ) -> StackAccessId {
        if let Some(&id) = self.access_cache.get(&(register, format)) {
            return id;
        }
        let id = StackAccessId::new(self.stack_accesses.len());
        self.stack_accesses.push(StackAccessData { register, format });
        self.access_cache.insert((register, format), id);
        id
    }

    /// Returns the record for an interned stack access.
    ///
    /// # Panics
    ///
    /// Panics if the identifier does not belong to this graph.
    #[must_use]
    pub fn stack_access_data(&self, id: StackAccessId) -> StackAccessData {
        self.stack_accesses[id.index()]
    }

    // -- Traversal orders --------------------------------------------------

    /// Returns the alive, reachable blocks in depth-first pre-order from
    /// the entry block.
    ///
    /// Definitions dominate uses in SSA form, so this order visits every
    /// node's definition before any of its uses.
    #[must_use]
    pub fn blocks_in_preorder(&self) -> Vec<BlockId> {
        if let Some(order) = &self.preorder {
            return order.clone();
        }
        self.compute_preorder()
    }

    /// Returns the alive, reachable blocks in natural (reverse-postorder)
    /// order from the entry block.
    #[must_use]
    pub fn blocks_in_natural_order(&self) -> Vec<BlockId> {
        if let Some(order) = &self.natural_order {
            return order.clone();
        }
        self.compute_natural_order()
    }

    /// Computes and caches both traversal orders.
    pub fn ensure_traversal_orders(&mut self) {
        if self.preorder.is_none() {
            self.preorder = Some(self.compute_preorder());
        }
        if self.natural_order.is_none() {
            self.natural_order = Some(self.compute_natural_order());
        }
    }

    /// Drops every cached CFG-derived order. Called after any edit that
    /// changes block shape or edges.
    pub fn invalidate_cfg(&mut self) {
        self.preorder = None;
        self.natural_order = None;
    }

    fn compute_preorder(&self) -> Vec<BlockId> {
        let mut order = Vec::with_capacity(self.blocks.len());
        let mut visited = vec![false; self.blocks.len()];
        let mut stack = vec![self.root()];
        while let Some(block) = stack.pop() {
            if std::mem::replace(&mut visited[block.index()], true) {
                continue;
            }
            if !self.blocks[block.index()].is_alive() {
                continue;
            }
            order.push(block);
            // Push successors in reverse so the first successor is visited
            // first.
            for &succ in self.blocks[block.index()].successors().iter().rev() {
                if !visited[succ.index()] {
                    stack.push(succ);
                }
            }
        }
        order
    }

    fn compute_natural_order(&self) -> Vec<BlockId> {
        let mut postorder = Vec::with_capacity(self.blocks.len());
        let mut visited = vec![false; self.blocks.len()];
        // Iterative DFS keeping an explicit child cursor per frame.
        let mut stack: Vec<(BlockId, usize)> = vec![(self.root(), 0)];
        visited[self.root().index()] = true;
        while let Some(frame) = stack.last_mut() {
            let (block, cursor) = *frame;
            let successors = self.blocks[block.index()].successors();
            if cursor < successors.len() {
                frame.1 += 1;
                let succ = successors[cursor];
                if !visited[succ.index()] && self.blocks[succ.index()].is_alive() {
                    visited[succ.index()] = true;
                    stack.push((succ, 0));
                }
            } else {
                stack.pop();
                if self.blocks[block.index()].is_alive() {
                    postorder.push(block);
                }
            }
        }
        postorder.reverse();
        postorder
    }

    // -- Reachability ------------------------------------------------------

    /// Recomputes which blocks are reachable from the entry block and
    /// kills the rest.
    ///
    /// A killed block is emptied, unlinked from its neighbors' edge lists
    /// and dropped from every traversal; its identifier is never reused.
    /// Returns the identifiers of the blocks killed.
    pub fn kill_unreachable_blocks(&mut self) -> Vec<BlockId> {
        let mut reachable = vec![false; self.blocks.len()];
        let mut stack = vec![self.root()];
        while let Some(block) = stack.pop() {
            if std::mem::replace(&mut reachable[block.index()], true) {
                continue;
            }
            for &succ in self.blocks[block.index()].successors() {
                if !reachable[succ.index()] {
                    stack.push(succ);
                }
            }
        }

        let mut killed = Vec::new();
        for index in 0..self.blocks.len() {
            if reachable[index] || !self.blocks[index].is_alive() {
                continue;
            }
            killed.push(BlockId::new(index));
            self.blocks[index].alive = false;
            self.blocks[index].nodes.clear();
            self.blocks[index].successors.clear();
            self.blocks[index].predecessors.clear();
        }

        if !killed.is_empty() {
            for block in &mut self.blocks {
                block
                    .successors
                    .retain(|succ| reachable[succ.index()]);
                block
                    .predecessors
                    .retain(|pred| reachable[pred.index()]);
            }
            self.invalidate_cfg();
        }
        killed
    }

    // -- Rendering ---------------------------------------------------------

    /// Renders one node in `v3 = GetIndex v1, v2` form.
    #[must_use]
    pub fn display_node(&self, id: NodeId) -> String {
        format!("{id} = {}", self.node(id))
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for block in &self.blocks {
            if !block.is_alive() {
                continue;
            }
            write!(f, "{}", block.id())?;
            if !block.successors().is_empty() {
                write!(f, " -> ")?;
                for (i, succ) in block.successors().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{succ}")?;
                }
            }
            writeln!(f, ":")?;
            for &node in block.nodes() {
                writeln!(f, "  {}", self.display_node(node))?;
            }
        }
        Ok(())
    }
}
