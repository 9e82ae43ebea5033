//! IR nodes, edges and origins.
//!
//! A [`Node`] is one instruction of the data-flow IR. Unlike a stack machine,
//! operands are explicit: each node carries a list of [`Edge`]s pointing at
//! the producing nodes, and each edge is annotated with the [`UseKind`] the
//! consumer requires. A non-`Untyped` use kind is an implicit type check - if
//! the producer cannot be proven to satisfy it, executing the edge performs
//! the check at runtime (and may bail out of optimized code).
//!
//! Every node also records a [`NodeOrigin`]: which (possibly inlined) call
//! frame it logically belongs to, the bytecode index it descends from, and
//! whether it is safe to exit to the unoptimized tier at this node. The
//! origin is what ties an allocation back to the call-frame stack region it
//! conceptually copies from.

use std::fmt;

use crate::ir::{FrameId, Op};

/// Unique identifier for a node, an index into the graph's node arena.
///
/// Node identity doubles as value identity: the IR is in SSA form, so "the
/// node" and "the value the node produces" are interchangeable. Identifiers
/// are unique within a single [`Graph`](crate::ir::Graph), never reused, and
/// remain stable across in-place opcode rewrites.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Creates a node identifier from a raw arena index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the underlying arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// The type a consumer requires of an operand edge.
///
/// `Untyped` consumptions accept anything. Every other kind is a speculation:
/// the consumer only works on values of that shape, and the edge carries an
/// implicit check when the producer's shape is not statically known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum UseKind {
    /// No requirement; the consumer accepts any value.
    Untyped,
    /// The operand must be a 32-bit integer.
    Int32,
    /// The operand must be a heap cell (any garbage-collected value).
    Cell,
    /// The operand must be an object.
    Object,
    /// The operand must be an array with well-behaved indexed storage.
    Array,
}

/// A directed reference from a consuming node to a producing node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    /// The producing node.
    pub node: NodeId,
    /// The type the consumer requires of the produced value.
    pub kind: UseKind,
}

impl Edge {
    /// Creates an edge with an explicit use kind.
    #[must_use]
    pub const fn new(node: NodeId, kind: UseKind) -> Self {
        Self { node, kind }
    }

    /// Creates an edge with no type requirement.
    #[must_use]
    pub const fn untyped(node: NodeId) -> Self {
        Self {
            node,
            kind: UseKind::Untyped,
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            UseKind::Untyped => write!(f, "{}", self.node),
            kind => write!(f, "{}:{kind}", self.node),
        }
    }
}

/// Where a node came from and whether deoptimization is permitted at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeOrigin {
    /// The call frame this node logically executes in. `None` is the
    /// outermost (machine) frame; `Some` is an inlined frame.
    pub frame: Option<FrameId>,
    /// The bytecode index this node descends from, within its frame.
    pub bytecode_index: u32,
    /// Whether it is safe to exit to the unoptimized tier at this node.
    pub exit_ok: bool,
}

impl NodeOrigin {
    /// Creates an origin in the outermost (machine) frame.
    #[must_use]
    pub const fn machine(bytecode_index: u32) -> Self {
        Self {
            frame: None,
            bytecode_index,
            exit_ok: true,
        }
    }

    /// Creates an origin in an inlined frame.
    #[must_use]
    pub const fn inlined(frame: FrameId, bytecode_index: u32) -> Self {
        Self {
            frame: Some(frame),
            bytecode_index,
            exit_ok: true,
        }
    }

    /// Returns the same origin with the given exit permission.
    #[must_use]
    pub const fn with_exit_ok(mut self, exit_ok: bool) -> Self {
        self.exit_ok = exit_ok;
        self
    }
}

/// A single IR instruction.
///
/// Nodes are mutated in place by the optimization pass: an eliminated
/// allocation keeps its [`NodeId`] but has its opcode and operand list
/// replaced ("morphed") with a phantom form. Consumers that were already
/// rewritten keep referring to the same identifier, which is what makes the
/// single forward rewrite pass sound.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// The operation this node performs.
    op: Op,
    /// Operand edges, in operand order.
    children: Vec<Edge>,
    /// Source attribution and exit permission.
    origin: NodeOrigin,
}

impl Node {
    /// Creates a new node.
    #[must_use]
    pub fn new(op: Op, children: Vec<Edge>, origin: NodeOrigin) -> Self {
        Self {
            op,
            children,
            origin,
        }
    }

    /// Returns the node's operation.
    #[must_use]
    pub const fn op(&self) -> &Op {
        &self.op
    }

    /// Returns the node's operand edges.
    #[must_use]
    pub fn children(&self) -> &[Edge] {
        &self.children
    }

    /// Returns the operand edge at `index`.
    ///
    /// # Panics
    ///
    /// Panics if the node has fewer than `index + 1` operands.
    #[must_use]
    pub fn child(&self, index: usize) -> Edge {
        self.children[index]
    }

    /// Returns the node's origin.
    #[must_use]
    pub const fn origin(&self) -> NodeOrigin {
        self.origin
    }

    /// Replaces the node's operation and operands in place.
    ///
    /// The node identity (and therefore every reference to its value) is
    /// preserved; only what the node *does* changes. This is the only
    /// mutation the rewriter performs on existing nodes.
    pub fn morph(&mut self, op: Op, children: Vec<Edge>) {
        self.op = op;
        self.children = children;
    }

    /// Returns `true` if this node ends a basic block.
    ///
    /// The pseudo-terminal [`Op::ForceExit`] marker is deliberately *not* a
    /// terminator: it renders the rest of its block dead without formally
    /// ending it, until the rewriter truncates the block.
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        matches!(
            self.op,
            Op::Jump | Op::Branch | Op::Return | Op::Unreachable
        )
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.op)?;
        if !self.children.is_empty() {
            write!(f, " ")?;
            for (i, edge) in self.children.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{edge}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display() {
        assert_eq!(format!("{}", NodeId::new(7)), "v7");
        assert_eq!(format!("{:?}", NodeId::new(7)), "v7");
    }

    #[test]
    fn test_edge_display() {
        let plain = Edge::untyped(NodeId::new(3));
        let typed = Edge::new(NodeId::new(3), UseKind::Object);
        assert_eq!(format!("{plain}"), "v3");
        assert_eq!(format!("{typed}"), "v3:Object");
    }

    #[test]
    fn test_morph_keeps_origin() {
        let origin = NodeOrigin::machine(4).with_exit_ok(false);
        let mut node = Node::new(Op::CreateDirectArguments, vec![], origin);

        node.morph(Op::PhantomDirectArguments, vec![]);

        assert_eq!(*node.op(), Op::PhantomDirectArguments);
        assert_eq!(node.origin(), origin);
        assert!(!node.origin().exit_ok);
    }

    #[test]
    fn test_terminators() {
        let origin = NodeOrigin::machine(0);
        assert!(Node::new(Op::Return, vec![], origin).is_terminator());
        assert!(Node::new(Op::Unreachable, vec![], origin).is_terminator());
        assert!(!Node::new(Op::ForceExit, vec![], origin).is_terminator());
        assert!(!Node::new(Op::Phantom, vec![], origin).is_terminator());
    }
}
