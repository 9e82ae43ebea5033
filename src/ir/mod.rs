//! The SSA-form intermediate representation the elision pass operates on.
//!
//! This module is the data model contract with the host compiler pipeline:
//! a [`Graph`] of [`Node`]s organized into [`BasicBlock`]s, with explicit
//! operand [`Edge`]s, inline-call-frame metadata ([`InlineCallFrame`]) and
//! interned stack-access records ([`StackAccessData`]).
//!
//! # Architecture
//!
//! The module is organized into focused sub-modules:
//!
//! - [`node`](self) - nodes, operand edges with use kinds, node origins
//! - `ops` - the closed operation sum type and its side data
//! - `block` - basic blocks and block identifiers
//! - `graph` - the arena-owning graph, traversal orders, reachability
//! - `frames` - inline call frame records and the frame slot layout
//! - `stack` - virtual registers and interned stack accesses
//! - `constant` - compile-time constant values
//! - `builder` - fluent, validating graph construction

mod block;
mod builder;
mod constant;
pub(crate) mod frames;
mod graph;
mod node;
mod ops;
mod stack;

pub use block::{BasicBlock, BlockId};
pub use builder::GraphBuilder;
pub use constant::ConstValue;
pub use frames::{FrameId, InlineCallFrame};
pub use graph::{Graph, GraphForm};
pub use node::{Edge, Node, NodeId, NodeOrigin, UseKind};
pub use ops::{ArrayBounds, ArrayMode, IndexingType, Op, VarargsData};
pub use stack::{StackAccessData, StackAccessId, ValueFormat, VirtualRegister};
