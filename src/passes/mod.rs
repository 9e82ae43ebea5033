//! Optimization passes over the IR graph.
//!
//! This module provides the pass interface and the allocation-elision
//! pipeline:
//!
//! - [`IrPass`] - the interface every graph pass implements
//! - [`EventLog`] - change tracking recorded during a run
//! - [`ArgumentsElisionPass`] - escape-analysis-driven elimination of
//!   argument-object and array allocations

mod elision;
mod events;

pub use elision::{ArgumentsElisionPass, Outcome};
pub use events::{Event, EventKind, EventLog, EventRecord};

use crate::{ir::Graph, runtime::RuntimeContext, Result};

/// Interface for passes that transform an IR graph in place.
pub trait IrPass {
    /// Returns the pass's short kebab-case name.
    fn name(&self) -> &'static str;

    /// Returns a one-line description of what the pass does.
    fn description(&self) -> &'static str;

    /// Runs the pass over the graph.
    ///
    /// Returns `true` if the graph was changed, so the host pipeline can
    /// decide whether dependent analyses need to be re-run.
    fn run(&self, graph: &mut Graph, ctx: &RuntimeContext) -> Result<bool>;
}
