//! Aggregation of benchmark runs.
//!
//! Runs of one subdirectory are folded per category by the aggregator
//! and finalized into one table per statistic.

pub mod aggregator;

pub use aggregator::*;
