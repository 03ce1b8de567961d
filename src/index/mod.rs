//! Index structures.
//!
//! - [`art`] - The Adaptive Radix Tree secondary index

pub mod art;

pub use art::{Art, RangeScan};
