#![warn(missing_docs)]
//! # BufBench
//!
//! Controlled micro-benchmark harness answering one question: how much does
//! each buffer abstraction layer cost when reading a single 32-bit integer?
//!
//! The suite compares the same read through five backing stores:
//! - **Heap array**: a plain `i32` array element
//! - **Heap buffer**: a heap byte buffer with a bounds-checked accessor
//! - **Direct buffer**: manually allocated off-heap memory
//! - **Mapped buffer**: a memory-mapped temporary file
//! - **Raw view**: an unchecked pointer read over a direct or heap buffer
//!
//! Each task runs through warmup and measurement phases, optionally across
//! several forks (independent replicates with fresh state) and concurrent
//! worker threads. Every read result passes through a black-hole sink so the
//! optimizer cannot delete the measured work. Scores are reported as a mean
//! with a Student-t error margin.
//!
//! ## Quick Start
//!
//! ```ignore
//! fn main() {
//!     bufbench::run().unwrap();
//! }
//! ```

// Re-export core types
pub use bufbench_core::{
    BUFFER_LEN, BackingKind, BufferHandle, CancelToken, HAS_CYCLE_COUNTER, HandleLease, Mode,
    ReadError, SEED_VALUE, Sample, ScopeKind, ScopedState, SetupError, TaskConfig, TaskDef,
    TaskError, TaskRun, Timer, builtin_tasks, run_task, sink,
};

// Re-export stats
pub use bufbench_stats::{DEFAULT_CONFIDENCE_LEVEL, ResultSummary, StatsError, summarize};

// Re-export the CLI surface
pub use bufbench_cli::{
    BufbenchConfig, Cli, Commands, RunArgs, TaskOutcome, compute_summaries, execute_tasks,
    format_table,
};

/// Run the BufBench CLI harness.
///
/// Call this from your binary's `main()`:
/// ```ignore
/// fn main() {
///     bufbench::run().unwrap();
/// }
/// ```
pub use bufbench_cli::run;
