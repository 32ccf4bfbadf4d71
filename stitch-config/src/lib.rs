//! Configuration types for stitch readers, sources and the external sort.

mod shared;

pub use shared::*;
