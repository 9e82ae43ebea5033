//! The closed operation vocabulary of the IR.
//!
//! [`Op`] is a tagged union: every opcode's side data lives in its variant,
//! so consumers pattern-match instead of downcasting, and a newly added
//! opcode that some classification forgets to handle is a compile error
//! rather than a silently conservative fallback.
//!
//! The vocabulary splits into five groups:
//!
//! - **Allocations** - the argument-object-like allocation sites the
//!   elision pass knows how to reason about
//! - **Phantoms** - non-materializing rewrite products of those
//!   allocations, carrying only deoptimization-reconstruction metadata
//! - **Reads and writes** - indexed/length/stack access, including the
//!   direct-stack rewrite products
//! - **Varargs** - variadic calls and loads plus their fixed-arity and
//!   forwarding rewrite products
//! - **Checks, housekeeping and control** - structure/type checks, OSR
//!   bookkeeping hints, and block terminators

use std::sync::Arc;

use bitflags::bitflags;

use crate::{
    ir::{ConstValue, FrameId, StackAccessId, VirtualRegister},
    runtime::StructureSet,
    utils::BitSet,
};

bitflags! {
    /// Storage representation bits of an array allocation.
    ///
    /// The shape bits mirror the runtime's indexed-storage taxonomy. Any
    /// array-storage bit means indexed accesses can observe holes, sparse
    /// maps or accessors ("exotic" behavior), which puts the allocation
    /// beyond what the elision pass can reason about.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct IndexingType: u8 {
        /// The allocation is a true array (has a `length` property).
        const IS_ARRAY = 0x01;
        /// Elements are stored as unboxed 32-bit integers.
        const INT32 = 0x02;
        /// Elements are stored as unboxed doubles.
        const DOUBLE = 0x04;
        /// Elements are stored as boxed values in a dense butterfly.
        const CONTIGUOUS = 0x08;
        /// Elements are stored in a sparse-capable array storage.
        const ARRAY_STORAGE = 0x10;
        /// Array storage behind a slow-put fence (indexed accessors).
        const SLOW_PUT_ARRAY_STORAGE = 0x20;
    }
}

impl IndexingType {
    /// Returns `true` if the representation admits sparse or accessor-laden
    /// indexed storage.
    #[must_use]
    pub const fn has_exotic_storage(self) -> bool {
        self.intersects(Self::ARRAY_STORAGE.union(Self::SLOW_PUT_ARRAY_STORAGE))
    }

    /// The representation of a dense array of boxed values.
    #[must_use]
    pub const fn array_contiguous() -> Self {
        Self::IS_ARRAY.union(Self::CONTIGUOUS)
    }

    /// The representation of a dense array of unboxed 32-bit integers.
    #[must_use]
    pub const fn array_int32() -> Self {
        Self::IS_ARRAY.union(Self::INT32)
    }
}

/// Bounds discipline of an array-mode-gated indexed read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayBounds {
    /// The access is speculated in-bounds; an out-of-bounds index exits.
    InBounds,
    /// The access may go out of bounds and then yields `undefined`,
    /// provided the prototype chain has no indexed properties.
    OutOfBounds,
}

/// How an indexed read expects its array operand to be stored and bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrayMode {
    /// The expected storage representation.
    pub indexing: IndexingType,
    /// The bounds discipline of the access.
    pub bounds: ArrayBounds,
}

impl ArrayMode {
    /// An in-bounds access to dense boxed storage.
    #[must_use]
    pub const fn contiguous_in_bounds() -> Self {
        Self {
            indexing: IndexingType::array_contiguous(),
            bounds: ArrayBounds::InBounds,
        }
    }

    /// An out-of-bounds-tolerant access to dense boxed storage.
    #[must_use]
    pub const fn contiguous_out_of_bounds() -> Self {
        Self {
            indexing: IndexingType::array_contiguous(),
            bounds: ArrayBounds::OutOfBounds,
        }
    }

    /// Returns `true` if the expected storage admits exotic behavior.
    #[must_use]
    pub const fn is_exotic(self) -> bool {
        self.indexing.has_exotic_storage()
    }
}

/// Stack destination of a variadic load, and the shape limits it was
/// code-generated against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VarargsData {
    /// First stack slot the loaded arguments are stored to.
    pub start: VirtualRegister,
    /// Stack slot receiving the loaded argument count (including `this`).
    pub count_register: VirtualRegister,
    /// Number of slots reserved starting at `start`; a load of more
    /// arguments than this cannot proceed in optimized code.
    pub limit: u32,
    /// Number of leading arguments the load skips over.
    pub first_vararg_offset: u32,
}

/// A single IR operation with its opcode-specific side data.
///
/// The `Display` implementation (derived) renders the bare opcode name and
/// is used by node rendering and event messages.
#[derive(Debug, Clone, PartialEq, strum::Display)]
pub enum Op {
    // -- Allocations ------------------------------------------------------

    /// Allocates an arguments object aliasing the frame's argument slots.
    CreateDirectArguments,
    /// Allocates an arguments object holding a copy of the frame's
    /// argument values.
    CreateClonedArguments,
    /// Allocates the rest-parameter array, skipping the first `skip`
    /// logical arguments.
    CreateRest {
        /// Number of leading logical arguments excluded from the array.
        skip: u32,
    },
    /// Expands an array into an element sequence for a spread position.
    /// Operand: the array being spread.
    Spread,
    /// Allocates an array literal some of whose operands are spread
    /// expansions rather than single elements.
    NewArrayWithSpread {
        /// Bit `i` set means operand `i` is a spread expansion.
        spread_mask: BitSet,
    },
    /// Allocates an array literal of compile-time constant elements.
    NewArrayLiteral {
        /// The constant elements, in index order.
        elements: Arc<[ConstValue]>,
        /// The storage representation the literal is allocated with.
        indexing: IndexingType,
    },

    // -- Phantom allocations (rewrite products) ---------------------------

    /// An eliminated [`Op::CreateDirectArguments`]; reads go to the frame.
    PhantomDirectArguments,
    /// An eliminated [`Op::CreateClonedArguments`].
    PhantomClonedArguments,
    /// An eliminated [`Op::CreateRest`].
    PhantomRest {
        /// Number of leading logical arguments excluded from the array.
        skip: u32,
    },
    /// An eliminated [`Op::Spread`]; keeps its operand for reconstruction.
    PhantomSpread,
    /// An eliminated [`Op::NewArrayWithSpread`].
    PhantomNewArrayWithSpread {
        /// Bit `i` set means operand `i` is a spread expansion.
        spread_mask: BitSet,
    },
    /// An eliminated [`Op::NewArrayLiteral`].
    PhantomNewArrayLiteral {
        /// The constant elements, in index order.
        elements: Arc<[ConstValue]>,
        /// The storage representation the literal would have had.
        indexing: IndexingType,
    },

    // -- Reads and writes -------------------------------------------------

    /// Reads the `length` property of an array-like operand.
    GetArrayLength {
        /// Expected storage and bounds discipline of the operand.
        mode: ArrayMode,
    },
    /// Reads an indexed element. Operands: array, index.
    GetIndex {
        /// Expected storage and bounds discipline of the access.
        mode: ArrayMode,
    },
    /// Reads argument `index` through a direct-arguments object.
    GetFromArguments {
        /// The logical argument index being read.
        index: u32,
    },
    /// Reads a frame's argument count (including `this`) from its
    /// count slot.
    GetArgumentCount {
        /// The frame whose count is read; `None` is the machine frame.
        frame: Option<FrameId>,
    },
    /// Computes a rest-array length from a frame's argument count:
    /// `max(count - 1 - skip, 0)`.
    RestLength {
        /// The frame whose count is read; `None` is the machine frame.
        frame: Option<FrameId>,
        /// Number of leading logical arguments excluded.
        skip: u32,
    },
    /// Reads the `index`-th logical argument of a frame directly from the
    /// stack, bounds-checked against the frame's live argument count.
    /// Operands: an eliminated allocation (kept for reconstruction), index.
    GetArgumentByVal {
        /// The frame read from; `None` is the machine frame.
        frame: Option<FrameId>,
        /// Number of leading logical arguments skipped before indexing.
        skip: u32,
        /// Whether an out-of-range index yields `undefined` instead of
        /// exiting.
        out_of_bounds: bool,
    },
    /// Reads a stack slot.
    GetStack {
        /// The slot and representation read.
        access: StackAccessId,
    },
    /// Writes a stack slot. Operand: the value stored.
    PutStack {
        /// The slot and representation written.
        access: StackAccessId,
    },
    /// Marks a stack slot dead for deoptimization purposes.
    KillStack {
        /// The slot killed.
        register: VirtualRegister,
    },

    // -- Varargs ----------------------------------------------------------

    /// Stores the elements of an array-like operand into a reserved stack
    /// range for a subsequent variadic call. Operand: the array-like.
    LoadVarargs {
        /// Target slots and limits.
        data: VarargsData,
    },
    /// Like [`Op::LoadVarargs`], but walks the real call frame at
    /// execution time instead of a materialized object. Operand: an
    /// eliminated allocation (kept for reconstruction).
    ForwardVarargs {
        /// Target slots and limits.
        data: VarargsData,
    },
    /// Calls with a dynamically sized argument list.
    /// Operands: callee, `this`, arguments array-like.
    CallVarargs,
    /// Constructs with a dynamically sized argument list.
    /// Operands: callee, `this`, arguments array-like.
    ConstructVarargs,
    /// A variadic call that reads its arguments from the real call frame
    /// at execution time. Operands: callee, `this`, eliminated allocation.
    CallForwardVarargs,
    /// A variadic construct that reads its arguments from the real call
    /// frame at execution time. Operands: callee, `this`, eliminated
    /// allocation.
    ConstructForwardVarargs,
    /// Calls with an explicit fixed-arity argument list.
    /// Operands: callee, `this`, then each argument.
    Call,
    /// Constructs with an explicit fixed-arity argument list.
    /// Operands: callee, `this`, then each argument.
    Construct,

    // -- Checks -----------------------------------------------------------

    /// Performs the type check carried by its operand edge's use kind and
    /// produces nothing.
    TypeCheck,
    /// Exits unless the operand's structure is one of the given set.
    CheckStructure {
        /// The admissible structures.
        set: StructureSet,
    },

    // -- Housekeeping -----------------------------------------------------

    /// Records that, at this bytecode point, the given local holds the
    /// operand value; consumed by deoptimization-metadata tracking.
    MovHint {
        /// The local the operand is recorded into.
        register: VirtualRegister,
    },
    /// Keeps its operands observably alive without computing anything.
    Phantom,
    /// Produces its operand unchanged.
    Identity,
    /// Produces a compile-time constant.
    JsConstant {
        /// The constant value produced.
        value: ConstValue,
    },
    /// 32-bit integer addition. Operands: left, right.
    ArithAdd,
    /// 32-bit integer subtraction. Operands: left, right.
    ArithSub,
    /// Merges values at a control-flow join. Operands: the incoming
    /// values, one per predecessor in predecessor order.
    Phi,

    // -- Control ----------------------------------------------------------

    /// Unconditional jump to the block's sole successor.
    Jump,
    /// Conditional branch to the block's two successors.
    /// Operand: the condition.
    Branch,
    /// Returns from the function. Operand: the returned value, if any.
    Return,
    /// Pseudo-terminal marker: executing past this point is impossible in
    /// optimized code; everything after it in the block is dead.
    ForceExit,
    /// Formally unreachable block terminator.
    Unreachable,
}

impl Op {
    /// Returns `true` if this is one of the six eliminable allocation
    /// opcodes.
    #[must_use]
    pub const fn is_allocation(&self) -> bool {
        matches!(
            self,
            Self::CreateDirectArguments
                | Self::CreateClonedArguments
                | Self::CreateRest { .. }
                | Self::Spread
                | Self::NewArrayWithSpread { .. }
                | Self::NewArrayLiteral { .. }
        )
    }

    /// Returns `true` if this is a phantom (eliminated) allocation.
    #[must_use]
    pub const fn is_phantom_allocation(&self) -> bool {
        matches!(
            self,
            Self::PhantomDirectArguments
                | Self::PhantomClonedArguments
                | Self::PhantomRest { .. }
                | Self::PhantomSpread
                | Self::PhantomNewArrayWithSpread { .. }
                | Self::PhantomNewArrayLiteral { .. }
        )
    }

    /// Returns `true` if the allocation (or phantom) produces a true array
    /// rather than an arguments object.
    #[must_use]
    pub const fn produces_array(&self) -> bool {
        matches!(
            self,
            Self::CreateRest { .. }
                | Self::Spread
                | Self::NewArrayWithSpread { .. }
                | Self::NewArrayLiteral { .. }
                | Self::PhantomRest { .. }
                | Self::PhantomSpread
                | Self::PhantomNewArrayWithSpread { .. }
                | Self::PhantomNewArrayLiteral { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexing_exotic() {
        assert!(!IndexingType::array_contiguous().has_exotic_storage());
        assert!(!IndexingType::array_int32().has_exotic_storage());
        assert!(
            (IndexingType::IS_ARRAY | IndexingType::ARRAY_STORAGE).has_exotic_storage()
        );
        assert!(
            (IndexingType::IS_ARRAY | IndexingType::SLOW_PUT_ARRAY_STORAGE)
                .has_exotic_storage()
        );
    }

    #[test]
    fn test_allocation_classification() {
        assert!(Op::CreateDirectArguments.is_allocation());
        assert!(Op::CreateRest { skip: 2 }.is_allocation());
        assert!(!Op::PhantomRest { skip: 2 }.is_allocation());
        assert!(Op::PhantomRest { skip: 2 }.is_phantom_allocation());
        assert!(!Op::Phantom.is_phantom_allocation());
    }

    #[test]
    fn test_array_producers() {
        assert!(Op::CreateRest { skip: 0 }.produces_array());
        assert!(Op::Spread.produces_array());
        assert!(!Op::CreateDirectArguments.produces_array());
    }

    #[test]
    fn test_op_display_is_bare_name() {
        assert_eq!(format!("{}", Op::CreateRest { skip: 3 }), "CreateRest");
        assert_eq!(format!("{}", Op::Call), "Call");
    }
}
