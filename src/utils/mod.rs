//! Shared utility types.
//!
//! - [`BitSet`] - a growable dense bit vector used for candidate sets,
//!   liveness sets and per-block clobber sets

mod bitset;

pub use bitset::BitSet;
