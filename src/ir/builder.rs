//! Fluent construction of IR graphs.
//!
//! The builder is the fallible surface of the crate: it validates child
//! references (defined before use), frame layouts and block termination, and
//! stamps the finished graph as SSA form. Hosts hand the result to the pass;
//! tests use the same API to assemble scenarios.
//!
//! # Example
//!
//! ```rust
//! use argelide::ir::{GraphBuilder, Op};
//!
//! let mut b = GraphBuilder::new(1, 8);
//! let entry = b.block();
//! let value = b.int32(entry, 42)?;
//! b.ret(entry, Some(value))?;
//! let graph = b.finish()?;
//! assert!(graph.is_ssa());
//! # Ok::<(), argelide::Error>(())
//! ```

use crate::{
    ir::{
        frames::FIRST_ARGUMENT_SLOT, BlockId, ConstValue, Edge, FrameId, Graph, GraphForm,
        InlineCallFrame, NodeId, NodeOrigin, Op, UseKind, VirtualRegister,
    },
    Result,
};

/// Incrementally builds a [`Graph`] and validates it into SSA form.
#[derive(Debug)]
pub struct GraphBuilder {
    graph: Graph,
    frame: Option<FrameId>,
    exit_ok: bool,
    next_bytecode_index: u32,
}

impl GraphBuilder {
    /// Creates a builder for a function with the given machine-frame
    /// argument count (including `this`) and total operand-space size.
    #[must_use]
    pub fn new(argument_count: u32, stack_slots: usize) -> Self {
        Self {
            graph: Graph::new(argument_count, stack_slots),
            frame: None,
            exit_ok: true,
            next_bytecode_index: 0,
        }
    }

    /// Appends a new empty block. The first block created is the entry.
    pub fn block(&mut self) -> BlockId {
        self.graph.add_block()
    }

    /// Registers an inline call frame, validating that its slot span fits
    /// the operand space.
    pub fn inline_frame(
        &mut self,
        base: VirtualRegister,
        varargs: bool,
        argument_count_including_this: u32,
    ) -> Result<FrameId> {
        if argument_count_including_this == 0 {
            return Err(graph_error!("inline frame at {} must count at least `this`", base));
        }
        let frame = InlineCallFrame::new(base, varargs, argument_count_including_this);
        if frame.end_slot() > self.graph.stack_slot_count() {
            return Err(graph_error!(
                "inline frame at {base} spans past slot {} (operand space has {})",
                frame.end_slot(),
                self.graph.stack_slot_count()
            ));
        }
        Ok(self.graph.add_frame(frame))
    }

    /// Sets the ambient origin frame for subsequently added nodes.
    /// `None` is the machine frame.
    pub fn set_frame(&mut self, frame: Option<FrameId>) {
        self.frame = frame;
    }

    /// Sets the ambient exit permission for subsequently added nodes.
    pub fn set_exit_ok(&mut self, exit_ok: bool) {
        self.exit_ok = exit_ok;
    }

    /// Appends a node with untyped operand edges.
    pub fn add(&mut self, block: BlockId, op: Op, children: Vec<NodeId>) -> Result<NodeId> {
        let edges = children.into_iter().map(Edge::untyped).collect();
        self.add_with_edges(block, op, edges)
    }

    /// Appends a node with explicit operand edges.
    pub fn add_with_edges(
        &mut self,
        block: BlockId,
        op: Op,
        children: Vec<Edge>,
    ) -> Result<NodeId> {
        if block.index() >= self.graph.block_count() {
            return Err(crate::Error::InvalidBlock(block));
        }
        for edge in &children {
            if edge.node.index() >= self.graph.node_count() {
                return Err(crate::Error::InvalidNode(edge.node));
            }
        }
        if let Some(&last) = self.graph.block(block).nodes().last() {
            if self.graph.node(last).is_terminator() {
                return Err(graph_error!("{} already has a terminator", block));
            }
        }
        let origin = NodeOrigin {
            frame: self.frame,
            bytecode_index: self.next_bytecode_index,
            exit_ok: self.exit_ok,
        };
        self.next_bytecode_index += 1;
        let id = self.graph.new_node(op, children, origin);
        self.graph.block_mut(block).nodes.push(id);
        Ok(id)
    }

    /// Appends a node with a single typed operand edge.
    pub fn add_checked(
        &mut self,
        block: BlockId,
        op: Op,
        child: NodeId,
        kind: UseKind,
    ) -> Result<NodeId> {
        self.add_with_edges(block, op, vec![Edge::new(child, kind)])
    }

    /// Appends a constant node.
    pub fn constant(&mut self, block: BlockId, value: ConstValue) -> Result<NodeId> {
        self.add(block, Op::JsConstant { value }, vec![])
    }

    /// Appends a 32-bit integer constant node.
    pub fn int32(&mut self, block: BlockId, value: i32) -> Result<NodeId> {
        self.constant(block, ConstValue::Int32(value))
    }

    /// Terminates `from` with an unconditional jump to `to`.
    pub fn jump(&mut self, from: BlockId, to: BlockId) -> Result<()> {
        if to.index() >= self.graph.block_count() {
            return Err(crate::Error::InvalidBlock(to));
        }
        self.add(from, Op::Jump, vec![])?;
        self.graph.link(from, to);
        Ok(())
    }

    /// Terminates `from` with a conditional branch.
    pub fn branch(
        &mut self,
        from: BlockId,
        condition: NodeId,
        taken: BlockId,
        not_taken: BlockId,
    ) -> Result<()> {
        if taken.index() >= self.graph.block_count() {
            return Err(crate::Error::InvalidBlock(taken));
        }
        if not_taken.index() >= self.graph.block_count() {
            return Err(crate::Error::InvalidBlock(not_taken));
        }
        self.add(from, Op::Branch, vec![condition])?;
        self.graph.link(from, taken);
        self.graph.link(from, not_taken);
        Ok(())
    }

    /// Terminates `block` with a return.
    pub fn ret(&mut self, block: BlockId, value: Option<NodeId>) -> Result<()> {
        let children = value.into_iter().collect();
        self.add(block, Op::Return, children)?;
        Ok(())
    }

    /// Validates the graph and stamps it as SSA form.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph has no blocks, or if any alive block
    /// lacks a terminator.
    pub fn finish(mut self) -> Result<Graph> {
        if self.graph.block_count() == 0 {
            return Err(graph_error!("graph has no blocks"));
        }
        for index in 0..self.graph.block_count() {
            let block = self.graph.block(BlockId::new(index));
            if !block.is_alive() {
                continue;
            }
            let terminated = block
                .nodes()
                .last()
                .is_some_and(|&last| self.graph.node(last).is_terminator());
            if !terminated {
                return Err(graph_error!("{} lacks a terminator", block.id()));
            }
        }
        let machine_span = (FIRST_ARGUMENT_SLOT + self.graph.argument_count()) as usize;
        if self.graph.stack_slot_count() < machine_span {
            return Err(graph_error!(
                "operand space of {} slots cannot hold the machine frame's {machine_span}",
                self.graph.stack_slot_count()
            ));
        }
        self.graph.set_form(GraphForm::Ssa);
        self.graph.ensure_traversal_orders();
        Ok(self.graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_graph() {
        let mut b = GraphBuilder::new(1, 8);
        let entry = b.block();
        let value = b.int32(entry, 7).unwrap();
        b.ret(entry, Some(value)).unwrap();

        let graph = b.finish().unwrap();
        assert!(graph.is_ssa());
        assert_eq!(graph.block(graph.root()).len(), 2);
    }

    #[test]
    fn test_unterminated_block_rejected() {
        let mut b = GraphBuilder::new(1, 8);
        let entry = b.block();
        b.int32(entry, 7).unwrap();

        let err = b.finish().unwrap_err();
        assert!(err.to_string().contains("terminator"));
    }

    #[test]
    fn test_child_must_be_defined_first() {
        let mut b = GraphBuilder::new(1, 8);
        let entry = b.block();
        let err = b
            .add(entry, Op::Identity, vec![NodeId::new(99)])
            .unwrap_err();
        assert!(matches!(err, crate::Error::InvalidNode(_)));
    }

    #[test]
    fn test_no_nodes_after_terminator() {
        let mut b = GraphBuilder::new(1, 8);
        let entry = b.block();
        b.ret(entry, None).unwrap();

        let err = b.int32(entry, 1).unwrap_err();
        assert!(err.to_string().contains("terminator"));
    }

    #[test]
    fn test_frame_span_validated() {
        let mut b = GraphBuilder::new(1, 8);
        let err = b
            .inline_frame(VirtualRegister::new(6), false, 4)
            .unwrap_err();
        assert!(err.to_string().contains("spans past"));
    }

    #[test]
    fn test_operand_space_must_hold_machine_frame() {
        let mut b = GraphBuilder::new(4, 3);
        let entry = b.block();
        b.ret(entry, None).unwrap();
        let err = b.finish().unwrap_err();
        assert!(err.to_string().contains("machine frame"));
    }
}
