#![warn(missing_docs)]
//! BufBench Core - Measurement Runtime
//!
//! This crate provides the execution environment for the buffer comparison
//! suite:
//! - Buffer backing providers (heap array, heap/direct buffers, memory
//!   mapping, raw-pointer views)
//! - Scoped state lifecycle with guaranteed teardown
//! - The fork/warmup/measurement iteration scheduler
//! - High-precision timing with a black-hole result sink

mod measure;
mod provider;
mod registry;
mod runner;
mod scope;

pub use measure::Timer;
/// Whether this platform provides hardware cycle counters (x86_64 RDTSCP or
/// AArch64 CNTVCT_EL0). When `false`, cycle counts are reported as 0.
pub use measure::HAS_CYCLE_COUNTER;
pub use measure::sink;
pub use provider::{
    BUFFER_LEN, BackingKind, BufferHandle, DirectRegion, MappedRegion, RawView, ReadError,
    SEED_VALUE, SetupError,
};
pub use registry::builtin_tasks;
pub use runner::{
    CancelToken, InvalidConfig, Sample, TaskConfig, TaskConfigBuilder, TaskError, TaskRun,
    run_task,
};
pub use scope::{HandleLease, ScopeKind, ScopedState};

/// A registered benchmark task: a named, parameterless read operation bound
/// to exactly one backing store.
#[derive(Debug, Clone)]
pub struct TaskDef {
    /// Unique identifier, matched by the CLI's regex filter.
    pub id: &'static str,
    /// Human-readable name.
    pub name: &'static str,
    /// Backing store this task reads through.
    pub backing: BackingKind,
    /// When the handle is created and destroyed.
    pub scope: ScopeKind,
    /// Measurement mode.
    pub mode: Mode,
    /// Unit the score is reported in.
    pub unit: &'static str,
    /// The read operation under measurement.
    pub read_fn: fn(&BufferHandle) -> Result<i32, ReadError>,
}

/// Measurement mode for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Average time per operation.
    AverageTime,
}

impl Mode {
    /// Short label used in result tables.
    pub fn label(self) -> &'static str {
        match self {
            Mode::AverageTime => "avgt",
        }
    }
}
