//! Basic blocks of the control-flow graph.

use std::fmt;

use crate::ir::NodeId;

/// Unique identifier for a basic block, an index into the graph's block
/// list. Identifiers stay stable when unreachable blocks are killed; a
/// killed block keeps its slot but is emptied and dropped from every
/// traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(usize);

impl BlockId {
    /// Creates a block identifier from a raw index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the underlying index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// An ordered sequence of nodes with explicit control-flow edges.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    /// This block's identifier.
    id: BlockId,
    /// The nodes of the block, in execution order.
    pub(crate) nodes: Vec<NodeId>,
    /// Successor blocks, in edge order (a branch lists taken then not-taken).
    pub(crate) successors: Vec<BlockId>,
    /// Predecessor blocks, unordered.
    pub(crate) predecessors: Vec<BlockId>,
    /// Whether the block is still part of the function. Cleared when
    /// reachability analysis kills the block.
    pub(crate) alive: bool,
}

impl BasicBlock {
    /// Creates a new empty, alive block.
    #[must_use]
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            nodes: Vec::new(),
            successors: Vec::new(),
            predecessors: Vec::new(),
            alive: true,
        }
    }

    /// Returns this block's identifier.
    #[must_use]
    pub const fn id(&self) -> BlockId {
        self.id
    }

    /// Returns the block's nodes in execution order.
    #[must_use]
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Returns the block's successors in edge order.
    #[must_use]
    pub fn successors(&self) -> &[BlockId] {
        &self.successors
    }

    /// Returns the block's predecessors.
    #[must_use]
    pub fn predecessors(&self) -> &[BlockId] {
        &self.predecessors
    }

    /// Returns the number of nodes in the block.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the block has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns `true` if the block is still part of the function.
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        self.alive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_id_display() {
        assert_eq!(format!("{}", BlockId::new(2)), "bb2");
    }

    #[test]
    fn test_new_block_is_alive_and_empty() {
        let block = BasicBlock::new(BlockId::new(0));
        assert!(block.is_alive());
        assert!(block.is_empty());
        assert_eq!(block.len(), 0);
        assert!(block.successors().is_empty());
        assert!(block.predecessors().is_empty());
    }
}
