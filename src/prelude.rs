//! Convenient re-exports of the most commonly used types.
//!
//! # Example
//!
//! ```rust,no_run
//! use argelide::prelude::*;
//!
//! let mut builder = GraphBuilder::new(1, 8);
//! let entry = builder.block();
//! builder.ret(entry, None)?;
//! let mut graph = builder.finish()?;
//!
//! let ctx = RuntimeContext::new();
//! let outcome = ArgumentsElisionPass::new().run(&mut graph, &ctx)?;
//! # let _ = outcome;
//! # Ok::<(), argelide::Error>(())
//! ```

pub use crate::{
    ir::{
        ArrayBounds, ArrayMode, BasicBlock, BlockId, ConstValue, Edge, FrameId, Graph,
        GraphBuilder, GraphForm, IndexingType, InlineCallFrame, Node, NodeId, NodeOrigin, Op,
        StackAccessData, StackAccessId, UseKind, ValueFormat, VarargsData, VirtualRegister,
    },
    passes::{ArgumentsElisionPass, Event, EventKind, EventLog, IrPass, Outcome},
    runtime::{
        RuntimeContext, StructureId, StructureKind, StructureSet, Watchpoint, WatchpointState,
    },
    Error, Result,
};
