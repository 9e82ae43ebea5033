// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]

//! # argelide
//!
//! Escape-analysis-driven elimination of argument-object and array
//! allocations in an SSA-form JIT intermediate representation.
//!
//! Dynamic-language functions allocate a surprising number of short-lived
//! array-like objects: `arguments` objects, rest-parameter arrays, spread
//! expansions, and array literals that only exist to feed a spread or a
//! vararg call. When such an allocation provably never escapes - no
//! consumer can observe it as a heap object - it does not need to happen
//! at all. This crate provides the IR data model, the collaborator
//! analyses, and the optimization pass that performs the elimination:
//! reads are redirected to the underlying call-frame stack storage, and
//! vararg calls become fixed-arity or frame-forwarding calls.
//!
//! ## Features
//!
//! - **Conservative by construction** - any allocation the pass cannot
//!   fully account for is left exactly as-is; the worst case is a graph
//!   compiled as if the pass had not run
//! - **Four-stage pipeline** - candidate collection, escape analysis to a
//!   fixpoint, stack-interference analysis, and a def-before-use graph
//!   rewrite with CFG cleanup
//! - **Deoptimization-aware** - eliminated allocations leave phantom
//!   markers carrying exactly the metadata exit reconstruction needs, and
//!   interference analysis honors exit liveness
//! - **Auditable** - every decision is recorded in an event log the host
//!   can inspect after the run
//!
//! ## Quick Start
//!
//! ```rust
//! use argelide::prelude::*;
//!
//! // function f(...args) inlined at a call site with two arguments:
//! // return args.length
//! let mut b = GraphBuilder::new(1, 16);
//! let frame = b.inline_frame(VirtualRegister::new(8), false, 3)?;
//! let entry = b.block();
//! b.set_frame(Some(frame));
//! let rest = b.add(entry, Op::CreateRest { skip: 0 }, vec![])?;
//! let length = b.add(
//!     entry,
//!     Op::GetArrayLength { mode: ArrayMode::contiguous_in_bounds() },
//!     vec![rest],
//! )?;
//! b.ret(entry, Some(length))?;
//! let mut graph = b.finish()?;
//!
//! let ctx = RuntimeContext::new();
//! let outcome = ArgumentsElisionPass::new().run(&mut graph, &ctx)?;
//! assert!(outcome.changed);
//! assert!(matches!(graph.node(rest).op(), Op::PhantomRest { .. }));
//! # Ok::<(), argelide::Error>(())
//! ```
//!
//! ## Architecture
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`ir`] | Nodes, edges, blocks, the graph, frames, stack accesses |
//! | [`analysis`] | Liveness, OSR availability, the clobber query |
//! | [`runtime`] | Watchpoints and canonical structures |
//! | [`passes`] | The pass trait, event log, and the elision pipeline |
//! | [`utils`] | The bit set shared by every analysis |

#[macro_use]
pub(crate) mod error;

pub mod analysis;
pub mod ir;
pub mod passes;
pub mod prelude;
pub mod runtime;
pub mod utils;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

pub use error::Error;
pub use passes::{ArgumentsElisionPass, EventKind, EventLog, IrPass, Outcome};
