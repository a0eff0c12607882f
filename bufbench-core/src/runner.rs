//! Iteration Scheduler and Measurement Sampler
//!
//! Fork-then-iterate: each fork is an independent replicate with a fresh
//! scope hierarchy, run sequentially. Within a fork a configurable number of
//! worker threads each run the warmup phase (results sunk, never recorded)
//! followed by the measurement phase. One invocation is a batch of reads
//! timed as a unit; the per-operation duration is batch time divided by
//! batch size.

use crate::measure::{Timer, sink};
use crate::provider::{BufferHandle, ReadError, SetupError};
use crate::scope::{HandleLease, ScopedState};
use crate::TaskDef;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// A task run failed. Scoped to the task: other tasks are unaffected.
#[derive(Debug, Error)]
pub enum TaskError {
    /// A provider could not construct its handle.
    #[error("setup failed: {0}")]
    Setup(#[from] SetupError),
    /// A read raised an error mid-measurement.
    #[error("invocation failed: {0}")]
    Invocation(#[from] ReadError),
    /// A worker panicked; the payload message is preserved.
    #[error("worker panicked: {0}")]
    Panicked(String),
    /// The run was cancelled before all forks completed. The cancelled
    /// fork's partial samples are discarded; samples from forks that ran to
    /// completion are carried here.
    #[error("cancelled after {} completed fork(s)", .0.completed_forks)]
    Cancelled(TaskRun),
}

/// A [`TaskConfigBuilder`] was given values the scheduler cannot run with.
#[derive(Debug, Error)]
#[error("invalid task config: {0}")]
pub struct InvalidConfig(String);

/// Cooperative cancellation flag, polled between invocations. An in-flight
/// invocation always completes before teardown runs.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request an abort at the next invocation boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether an abort has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Scheduling knobs for one task run. Built via [`TaskConfig::builder`] and
/// validated before the scheduler sees it.
#[derive(Debug, Clone)]
pub struct TaskConfig {
    /// Invocations whose results are sunk, not recorded.
    pub warmup_iters: u32,
    /// Recorded invocations per worker per fork.
    pub measure_iters: u32,
    /// Independent replicates, each with a fresh scope hierarchy.
    pub forks: u32,
    /// Concurrent workers per fork.
    pub workers: u32,
    /// Reads per timed invocation.
    pub batch: u64,
    /// Where mapped backings place their temp files.
    pub temp_dir: Option<PathBuf>,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            warmup_iters: 3,
            measure_iters: 5,
            forks: 1,
            workers: 1,
            batch: 1024,
            temp_dir: None,
        }
    }
}

impl TaskConfig {
    /// Start building a config from the defaults.
    pub fn builder() -> TaskConfigBuilder {
        TaskConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`TaskConfig`]; `build` rejects configurations the scheduler
/// cannot honor.
#[derive(Debug, Clone)]
pub struct TaskConfigBuilder {
    config: TaskConfig,
}

impl TaskConfigBuilder {
    /// Warmup invocations per worker (0 is allowed).
    pub fn warmup_iters(mut self, n: u32) -> Self {
        self.config.warmup_iters = n;
        self
    }

    /// Measured invocations per worker (must be at least 1).
    pub fn measure_iters(mut self, n: u32) -> Self {
        self.config.measure_iters = n;
        self
    }

    /// Fork count (must be at least 1).
    pub fn forks(mut self, n: u32) -> Self {
        self.config.forks = n;
        self
    }

    /// Worker threads per fork (must be at least 1).
    pub fn workers(mut self, n: u32) -> Self {
        self.config.workers = n;
        self
    }

    /// Reads per timed invocation (must be at least 1).
    pub fn batch(mut self, n: u64) -> Self {
        self.config.batch = n;
        self
    }

    /// Directory for mapped backing files.
    pub fn temp_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.config.temp_dir = dir;
        self
    }

    /// Validate and produce the config.
    pub fn build(self) -> Result<TaskConfig, InvalidConfig> {
        let c = &self.config;
        if c.measure_iters == 0 {
            return Err(InvalidConfig("measure_iters must be >= 1".into()));
        }
        if c.forks == 0 {
            return Err(InvalidConfig("forks must be >= 1".into()));
        }
        if c.workers == 0 {
            return Err(InvalidConfig("workers must be >= 1".into()));
        }
        if c.batch == 0 {
            return Err(InvalidConfig("batch must be >= 1".into()));
        }
        Ok(self.config)
    }
}

/// One recorded invocation: the timed batch and the fork it ran in.
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    /// Wall time of the whole batch in nanoseconds.
    pub total_nanos: u64,
    /// Hardware cycles over the batch (0 where unsupported).
    pub cpu_cycles: u64,
    /// Reads in the batch.
    pub batch: u64,
    /// Fork index this sample belongs to.
    pub fork: u32,
}

impl Sample {
    /// Per-operation duration: batch time divided by batch size.
    #[inline]
    pub fn per_op_nanos(&self) -> f64 {
        self.total_nanos as f64 / self.batch as f64
    }

    /// Per-operation cycles.
    #[inline]
    pub fn per_op_cycles(&self) -> f64 {
        self.cpu_cycles as f64 / self.batch as f64
    }
}

/// Everything a completed task run produced. Samples are append-only during
/// the run and immutable afterwards.
#[derive(Debug)]
pub struct TaskRun {
    /// Id of the task that ran.
    pub task_id: &'static str,
    /// Measurement-phase samples only; warmup is never present.
    pub samples: Vec<Sample>,
    /// Forks that ran to completion.
    pub completed_forks: u32,
    /// Warmup plus measured invocations across all forks and workers.
    pub total_invocations: u64,
}

/// Drive `task` through `forks` independent replicates.
///
/// Sample count on success is `measure_iters * forks * workers`. Any failure
/// aborts the remaining phases of this task only.
pub fn run_task(
    task: &TaskDef,
    config: &TaskConfig,
    cancel: &CancelToken,
) -> Result<TaskRun, TaskError> {
    let expected =
        config.measure_iters as usize * config.forks as usize * config.workers as usize;
    let mut samples = Vec::with_capacity(expected);
    let mut total_invocations = 0u64;
    let mut completed_forks = 0u32;

    for fork in 0..config.forks {
        let cancelled = if cancel.is_cancelled() {
            true
        } else {
            match run_fork(task, config, cancel, fork)? {
                ForkOutcome::Completed {
                    samples: fork_samples,
                    invocations,
                } => {
                    samples.extend(fork_samples);
                    total_invocations += invocations;
                    completed_forks += 1;
                    tracing::debug!(task = task.id, fork, "fork completed");
                    false
                }
                ForkOutcome::Cancelled => true,
            }
        };
        if cancelled {
            return Err(TaskError::Cancelled(TaskRun {
                task_id: task.id,
                samples,
                completed_forks,
                total_invocations,
            }));
        }
    }

    Ok(TaskRun {
        task_id: task.id,
        samples,
        completed_forks,
        total_invocations,
    })
}

enum ForkOutcome {
    Completed {
        samples: Vec<Sample>,
        invocations: u64,
    },
    /// A worker observed the cancel flag; this fork's partial samples are
    /// dropped so an incomplete fork cannot bias the mean. Earlier completed
    /// forks keep theirs.
    Cancelled,
}

fn run_fork(
    task: &TaskDef,
    config: &TaskConfig,
    cancel: &CancelToken,
    fork: u32,
) -> Result<ForkOutcome, TaskError> {
    let state = ScopedState::new(task.backing, task.scope, config.temp_dir.as_deref());

    let outcomes: Vec<Result<WorkerOutcome, TaskError>> = if config.workers == 1 {
        vec![run_worker_caught(task, &state, config, cancel, fork)]
    } else {
        std::thread::scope(|threads| {
            let handles: Vec<_> = (0..config.workers)
                .map(|_| threads.spawn(|| run_worker_caught(task, &state, config, cancel, fork)))
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join().unwrap_or_else(|_| {
                        Err(TaskError::Panicked("worker thread aborted".to_string()))
                    })
                })
                .collect()
        })
    };
    // `state` drops here: run-scoped handles are released exactly once, after
    // every worker has finished its in-flight invocation.

    let mut samples = Vec::new();
    let mut invocations = 0u64;
    let mut cancelled = false;
    for outcome in outcomes {
        let outcome = outcome?;
        invocations += outcome.invocations;
        if outcome.cancelled {
            cancelled = true;
        } else {
            samples.extend(outcome.samples);
        }
    }

    if cancelled {
        Ok(ForkOutcome::Cancelled)
    } else {
        Ok(ForkOutcome::Completed {
            samples,
            invocations,
        })
    }
}

fn run_worker_caught(
    task: &TaskDef,
    state: &ScopedState,
    config: &TaskConfig,
    cancel: &CancelToken,
    fork: u32,
) -> Result<WorkerOutcome, TaskError> {
    let result = catch_unwind(AssertUnwindSafe(|| {
        run_worker(task, state, config, cancel, fork)
    }));
    match result {
        Ok(outcome) => outcome,
        Err(panic) => {
            let message = if let Some(s) = panic.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            Err(TaskError::Panicked(message))
        }
    }
}

struct WorkerOutcome {
    samples: Vec<Sample>,
    invocations: u64,
    cancelled: bool,
}

fn run_worker(
    task: &TaskDef,
    state: &ScopedState,
    config: &TaskConfig,
    cancel: &CancelToken,
    fork: u32,
) -> Result<WorkerOutcome, TaskError> {
    let lease = state.lease()?;
    let mut samples = Vec::with_capacity(config.measure_iters as usize);
    let mut invocations = 0u64;

    // Warmup: all warmup invocations strictly precede measurement.
    for _ in 0..config.warmup_iters {
        if cancel.is_cancelled() {
            return Ok(WorkerOutcome {
                samples: Vec::new(),
                invocations,
                cancelled: true,
            });
        }
        timed_invocation(task, &lease, state, config.batch)?;
        invocations += 1;
    }

    for _ in 0..config.measure_iters {
        if cancel.is_cancelled() {
            return Ok(WorkerOutcome {
                samples: Vec::new(),
                invocations,
                cancelled: true,
            });
        }
        let (total_nanos, cpu_cycles) = timed_invocation(task, &lease, state, config.batch)?;
        samples.push(Sample {
            total_nanos,
            cpu_cycles,
            batch: config.batch,
            fork,
        });
        invocations += 1;
    }

    Ok(WorkerOutcome {
        samples,
        invocations,
        cancelled: false,
    })
}

fn timed_invocation(
    task: &TaskDef,
    lease: &HandleLease,
    state: &ScopedState,
    batch: u64,
) -> Result<(u64, u64), TaskError> {
    match lease.handle() {
        Some(handle) => timed_batch(task, handle, batch).map_err(TaskError::from),
        None => {
            // Invocation scope: handle built outside the timed window, torn
            // down right after the batch.
            let handle = state.fresh()?;
            timed_batch(task, &handle, batch).map_err(TaskError::from)
        }
    }
}

#[inline]
fn timed_batch(task: &TaskDef, handle: &BufferHandle, batch: u64) -> Result<(u64, u64), ReadError> {
    let handle = sink(handle);
    let timer = Timer::start();
    for _ in 0..batch {
        sink((task.read_fn)(handle)?);
    }
    Ok(timer.stop())
}
