//! Inline call frame records.
//!
//! An [`InlineCallFrame`] describes one call activation that earlier pipeline
//! stages folded into the function being compiled. Its argument region lives
//! inside the caller's stack space at a fixed base, laid out exactly like the
//! machine frame's own header:
//!
//! ```text
//! base + 0            callee
//! base + 1            argument count (including `this`)
//! base + 2 + i        argument i        (argument 0 is `this`)
//! ```
//!
//! Frames are owned by the graph and shared by reference: many nodes point
//! at the same frame through [`FrameId`], and the outermost (machine) frame
//! is the `None` case of `Option<FrameId>` rather than a record of its own.

use std::fmt;

use crate::ir::VirtualRegister;

/// Slot offset of the callee within a frame's header.
pub const CALLEE_SLOT: u32 = 0;
/// Slot offset of the argument count within a frame's header.
pub const ARGUMENT_COUNT_SLOT: u32 = 1;
/// Slot offset of the first argument (`this`) within a frame.
pub const FIRST_ARGUMENT_SLOT: u32 = 2;

/// Unique identifier for an inline call frame, an index into the graph's
/// frame arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(usize);

impl FrameId {
    /// Creates a frame identifier from a raw arena index.
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

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame{}", self.0)
    }
}

/// One call activation inlined into the compiled function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InlineCallFrame {
    /// First stack slot of the frame's header.
    base: VirtualRegister,
    /// Whether the inlined call site was variadic.
    varargs: bool,
    /// Argument count including `this`: exact for non-varargs frames, a
    /// static maximum for varargs frames.
    argument_count_including_this: u32,
}

impl InlineCallFrame {
    /// Creates a frame record.
    ///
    /// # Arguments
    ///
    /// * `base` - First stack slot of the frame's header
    /// * `varargs` - Whether the inlined call site was variadic
    /// * `argument_count_including_this` - Exact count for non-varargs
    ///   frames, static maximum for varargs frames; at least 1 (`this`)
    #[must_use]
    pub const fn new(
        base: VirtualRegister,
        varargs: bool,
        argument_count_including_this: u32,
    ) -> Self {
        Self {
            base,
            varargs,
            argument_count_including_this,
        }
    }

    /// Returns the first stack slot of the frame's header.
    #[must_use]
    pub const fn base(&self) -> VirtualRegister {
        self.base
    }

    /// Returns `true` if the inlined call site was variadic, meaning the
    /// argument count is only known at execution time.
    #[must_use]
    pub const fn is_varargs(&self) -> bool {
        self.varargs
    }

    /// Returns the argument count including `this` (a maximum for varargs
    /// frames).
    #[must_use]
    pub const fn argument_count_including_this(&self) -> u32 {
        self.argument_count_including_this
    }

    /// Returns the slot holding the frame's callee.
    #[must_use]
    pub const fn callee_register(&self) -> VirtualRegister {
        self.base.offset_by(CALLEE_SLOT)
    }

    /// Returns the slot holding the frame's argument count.
    #[must_use]
    pub const fn argument_count_register(&self) -> VirtualRegister {
        self.base.offset_by(ARGUMENT_COUNT_SLOT)
    }

    /// Returns the slot holding logical argument `index` (0 is `this`).
    #[must_use]
    pub const fn argument_register(&self, index: u32) -> VirtualRegister {
        self.base.offset_by(FIRST_ARGUMENT_SLOT + index)
    }

    /// Returns the slot index one past the frame's last argument slot.
    #[must_use]
    pub const fn end_slot(&self) -> usize {
        self.base.index() + (FIRST_ARGUMENT_SLOT + self.argument_count_including_this) as usize
    }
}
