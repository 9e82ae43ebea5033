use thiserror::Error;

use crate::ir::{BlockId, NodeId};

macro_rules! graph_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Graph {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Graph {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type covering all errors this library can return.
///
/// Recoverable errors only exist at the graph-construction boundary (the
/// [`GraphBuilder`](crate::ir::GraphBuilder) validates block termination,
/// child references and frame layouts). The optimization pass itself never
/// reports an error for a graph it merely cannot improve - an unprovable
/// candidate is dropped, not diagnosed. Internal invariant violations inside
/// the pass are programming errors and abort via assertion instead of
/// flowing through this type.
///
/// # Examples
///
/// ```rust
/// use argelide::ir::GraphBuilder;
///
/// // A graph whose entry block has no terminator fails validation.
/// let mut builder = GraphBuilder::new(1, 8);
/// let entry = builder.block();
/// let _ = entry;
/// match builder.finish() {
///     Err(argelide::Error::Graph { message, .. }) => {
///         assert!(message.contains("terminator"));
///     }
///     other => panic!("expected a graph error, got {other:?}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The graph under construction or mutation is structurally invalid.
    ///
    /// The error includes the source location where the malformation was
    /// detected for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Graph - {file}:{line}: {message}")]
    Graph {
        /// The message to be printed for the Graph error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A block identifier did not resolve to a block of the graph.
    #[error("Unknown basic block - {0}")]
    InvalidBlock(BlockId),

    /// A node identifier did not resolve to a node of the graph.
    #[error("Unknown node - {0}")]
    InvalidNode(NodeId),
}
