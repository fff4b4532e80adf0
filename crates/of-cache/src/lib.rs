//! # of-cache
//!
//! Write-once local cache of completed run results, keyed by the encoded
//! parameter tuple of a run and scoped to one scenario.

pub mod cache;

pub use cache::*;
