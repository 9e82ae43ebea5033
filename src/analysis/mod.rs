//! Whole-graph analyses consumed by the elision pass.
//!
//! These are the collaborator services of the pass, implemented at their
//! interface boundary:
//!
//! - [`Liveness`] / [`CombinedLiveness`] - backward node liveness, widened
//!   with the values a deoptimization could still demand
//! - [`OsrAvailability`] - per-slot recovery tracking for exits
//! - [`clobber`] - which stack locations an instruction may write

pub mod clobber;

mod availability;
mod liveness;

pub use availability::{Availability, OsrAvailability};
pub use clobber::AbstractLocation;
pub use liveness::{CombinedLiveness, Liveness};
