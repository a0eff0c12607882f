#![warn(missing_docs)]
//! BufBench Stats - Sample Aggregation
//!
//! Turns the per-operation duration samples a task run produces into a
//! [`ResultSummary`]: arithmetic mean plus a Student-t confidence-interval
//! half-width as the error margin. Small sample counts (single-digit forks
//! and iterations) are the normal case here, so the margin uses the t
//! distribution rather than a normal approximation.

mod summary;

pub use summary::{ResultSummary, StatsError, summarize, t_critical};

/// Confidence level used when none is configured.
pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.95;
