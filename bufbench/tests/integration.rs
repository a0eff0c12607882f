//! Integration tests for BufBench
//!
//! These tests drive whole task runs end to end: scheduler, scoped state,
//! providers, sampling, and aggregation together.

use bufbench::{
    BackingKind, BufferHandle, CancelToken, ReadError, SEED_VALUE, TaskConfig, TaskError,
    builtin_tasks, compute_summaries, execute_tasks, run_task, summarize,
};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU32, Ordering};

fn task(id: &str) -> bufbench::TaskDef {
    builtin_tasks()
        .into_iter()
        .find(|t| t.id == id)
        .unwrap_or_else(|| panic!("no task named {id}"))
}

// Delegates to the registered raw read and records that every invocation,
// warmup included, saw the seed value.
static RAW_READ: OnceLock<fn(&BufferHandle) -> Result<i32, ReadError>> = OnceLock::new();
static RAW_READS_SEEN: AtomicU32 = AtomicU32::new(0);

fn counting_raw_read(handle: &BufferHandle) -> Result<i32, ReadError> {
    let value = (RAW_READ.get().expect("delegate installed"))(handle)?;
    assert_eq!(value, SEED_VALUE);
    RAW_READS_SEEN.fetch_add(1, Ordering::Relaxed);
    Ok(value)
}

/// A full run of the raw-read task produces exactly the configured sample
/// count, every batch took measurable time, and every one of the 3 + 8
/// invocations read the seed value through the raw view.
#[test]
fn unsafe_direct_run_produces_configured_samples() {
    let mut task = task("unsafe_direct_get_int");
    RAW_READ.set(task.read_fn).expect("delegate installed once");
    task.read_fn = counting_raw_read;

    let config = TaskConfig::builder()
        .warmup_iters(3)
        .measure_iters(8)
        .batch(1)
        .build()
        .unwrap();

    let run = run_task(&task, &config, &CancelToken::new()).unwrap();

    assert_eq!(run.samples.len(), 8);
    assert_eq!(run.completed_forks, 1);
    // 3 warmup + 8 measured invocations on one worker, one read each
    assert_eq!(run.total_invocations, 11);
    assert_eq!(RAW_READS_SEEN.load(Ordering::Relaxed), 11);
    for sample in &run.samples {
        assert!(sample.total_nanos > 0);
        assert!(sample.per_op_nanos() > 0.0);
    }

    let samples: Vec<f64> = run.samples.iter().map(|s| s.per_op_nanos()).collect();
    let summary = summarize(run.task_id, "ns/op", &samples, 0.95).unwrap();
    assert_eq!(summary.sample_count, 8);
    assert!(summary.mean_ns > 0.0);
}

/// Sample count is measure_iters * forks, and every fork contributed its
/// own share under fresh state.
#[test]
fn forks_multiply_sample_count() {
    let config = TaskConfig::builder()
        .warmup_iters(1)
        .measure_iters(5)
        .forks(3)
        .batch(64)
        .build()
        .unwrap();

    let run = run_task(&task("heap_buffer_get_int"), &config, &CancelToken::new()).unwrap();

    assert_eq!(run.samples.len(), 15);
    assert_eq!(run.completed_forks, 3);
    for fork in 0..3 {
        assert_eq!(run.samples.iter().filter(|s| s.fork == fork).count(), 5);
    }
}

/// Every registered task reads the seed value through its own backing.
#[test]
fn all_backings_read_the_seed_value() {
    for task in builtin_tasks() {
        let handle = task.backing.create(None).expect("setup");
        assert_eq!((task.read_fn)(&handle).unwrap(), SEED_VALUE, "{}", task.id);
    }
}

/// A mapped-backing setup failure aborts that task alone; the rest of the
/// suite still produces scores.
#[test]
fn mapped_setup_failure_is_isolated() {
    let config = TaskConfig::builder()
        .warmup_iters(1)
        .measure_iters(3)
        .batch(32)
        .temp_dir(Some(PathBuf::from("/nonexistent/bufbench-it")))
        .build()
        .unwrap();

    let tasks = builtin_tasks();
    let outcomes = execute_tasks(&tasks, &config, &CancelToken::new(), false);
    assert_eq!(outcomes.len(), tasks.len());

    for outcome in &outcomes {
        if outcome.task.backing == BackingKind::MappedBuffer {
            assert!(matches!(outcome.result, Err(TaskError::Setup(_))));
        } else {
            let run = outcome.result.as_ref().unwrap();
            assert_eq!(run.samples.len(), 3);
        }
    }
}

/// Two concurrent workers each get their own handle and their own sample
/// stream; the merged run holds both.
#[test]
fn two_workers_double_the_samples() {
    let config = TaskConfig::builder()
        .warmup_iters(2)
        .measure_iters(6)
        .workers(2)
        .batch(64)
        .build()
        .unwrap();

    let run = run_task(&task("direct_buffer_get_int"), &config, &CancelToken::new()).unwrap();

    assert_eq!(run.samples.len(), 12);
    // 2 workers * (2 warmup + 6 measured)
    assert_eq!(run.total_invocations, 16);
}

/// The reported mean agrees with the mean recomputed from the raw samples.
#[test]
fn summary_mean_matches_raw_samples() {
    let config = TaskConfig::builder()
        .warmup_iters(2)
        .measure_iters(10)
        .batch(512)
        .build()
        .unwrap();

    let run = run_task(&task("heap_array_get"), &config, &CancelToken::new()).unwrap();
    let samples: Vec<f64> = run.samples.iter().map(|s| s.per_op_nanos()).collect();
    let summary = summarize(run.task_id, "ns/op", &samples, 0.95).unwrap();

    let recomputed = samples.iter().sum::<f64>() / samples.len() as f64;
    assert!(summary.mean_ns > 0.0);
    assert!((summary.mean_ns - recomputed).abs() <= f64::max(summary.error_ns, 1e-9));
}

/// Mapped backing files land in the configured directory and are removed
/// once the run's state is torn down.
#[test]
fn mapped_backing_cleans_up_its_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = TaskConfig::builder()
        .warmup_iters(1)
        .measure_iters(2)
        .batch(16)
        .temp_dir(Some(dir.path().to_path_buf()))
        .build()
        .unwrap();

    run_task(&task("mapped_buffer_get_int"), &config, &CancelToken::new()).unwrap();

    let leftover = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(leftover, 0, "backing file must not outlive the run");
}

/// A cancelled run surfaces as an error, never as a truncated sample set.
#[test]
fn cancellation_discards_partial_results() {
    let cancel = CancelToken::new();
    cancel.cancel();
    let config = TaskConfig::builder().measure_iters(5).build().unwrap();

    let result = run_task(&task("heap_array_get"), &config, &cancel);
    assert!(matches!(
        result,
        Err(TaskError::Cancelled(ref partial)) if partial.samples.is_empty()
    ));
}

/// End-to-end: execute, summarize, and render the score table.
#[test]
fn score_table_lists_every_successful_task() {
    let config = TaskConfig::builder()
        .warmup_iters(1)
        .measure_iters(2)
        .batch(16)
        .build()
        .unwrap();

    let tasks = builtin_tasks();
    let outcomes = execute_tasks(&tasks, &config, &CancelToken::new(), false);
    let summaries = compute_summaries(&outcomes, 0.95);
    let table = bufbench::format_table(&outcomes, &summaries);

    for task in &tasks {
        assert!(table.contains(task.id), "missing row for {}", task.id);
    }
    assert!(table.contains("ns/op"));
    assert!(!table.contains("Failed:"));
}
