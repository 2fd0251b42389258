//! Aggregation engine, profile cache and report formatting.

pub mod aggregate;
pub mod cache;
pub mod report;
pub mod section;
