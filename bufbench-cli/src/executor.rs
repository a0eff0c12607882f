//! Task Execution and Result Formatting
//!
//! Runs the filtered task list sequentially (concurrency lives inside a task
//! as worker threads, never across tasks), summarizes the surviving runs in
//! parallel, and renders an aligned score table. A failed task is reported
//! and skipped; it never aborts the rest of the suite.

use bufbench_core::{CancelToken, TaskConfig, TaskDef, TaskError, TaskRun, run_task};
use bufbench_stats::{ResultSummary, summarize};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

/// Result of driving one task through the scheduler.
#[derive(Debug)]
pub struct TaskOutcome {
    /// The task that ran.
    pub task: TaskDef,
    /// Samples on success, the first error otherwise.
    pub result: Result<TaskRun, TaskError>,
}

impl TaskOutcome {
    /// Whether the run produced usable samples.
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Execute all provided tasks in order, one scheduler run each.
pub fn execute_tasks(
    tasks: &[TaskDef],
    config: &TaskConfig,
    cancel: &CancelToken,
    show_progress: bool,
) -> Vec<TaskOutcome> {
    let pb = if show_progress {
        ProgressBar::new(tasks.len() as u64)
    } else {
        ProgressBar::hidden()
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let mut outcomes = Vec::with_capacity(tasks.len());
    for task in tasks {
        if cancel.is_cancelled() {
            break;
        }
        pb.set_message(task.id);
        let result = run_task(task, config, cancel);
        match &result {
            Ok(run) => tracing::debug!(
                task = task.id,
                samples = run.samples.len(),
                forks = run.completed_forks,
                "task complete"
            ),
            Err(e) => tracing::warn!(task = task.id, error = %e, "task failed"),
        }
        outcomes.push(TaskOutcome {
            task: task.clone(),
            result,
        });
        pb.inc(1);
    }
    pb.finish_and_clear();
    outcomes
}

/// Summarize every successful run; failed runs yield `None`.
///
/// Summaries are independent per task, so they are computed on the Rayon
/// pool.
pub fn compute_summaries(
    outcomes: &[TaskOutcome],
    confidence_level: f64,
) -> Vec<Option<ResultSummary>> {
    outcomes
        .par_iter()
        .map(|outcome| match &outcome.result {
            Ok(run) => {
                let samples: Vec<f64> = run.samples.iter().map(|s| s.per_op_nanos()).collect();
                summarize(outcome.task.id, outcome.task.unit, &samples, confidence_level).ok()
            }
            Err(_) => None,
        })
        .collect()
}

/// Render the aligned score table, one row per successful task, with failed
/// tasks listed below it.
pub fn format_table(outcomes: &[TaskOutcome], summaries: &[Option<ResultSummary>]) -> String {
    let mut output = String::new();

    let name_width = outcomes
        .iter()
        .map(|o| o.task.id.len())
        .max()
        .unwrap_or(0)
        .max("Benchmark".len());

    output.push_str(&format!(
        "{:<width$}  {:>4}  {:>4}  {:>10}    {:>8}  {:>6}\n",
        "Benchmark",
        "Mode",
        "Cnt",
        "Score",
        "Error",
        "Units",
        width = name_width
    ));

    for (outcome, summary) in outcomes.iter().zip(summaries) {
        let Some(summary) = summary else { continue };
        output.push_str(&format!(
            "{:<width$}  {:>4}  {:>4}  {:>10.3}  \u{b1} {:>8.3}  {:>6}\n",
            outcome.task.id,
            outcome.task.mode.label(),
            summary.sample_count,
            summary.mean_ns,
            summary.error_ns,
            summary.unit,
            width = name_width
        ));
    }

    let failed: Vec<_> = outcomes.iter().filter(|o| !o.succeeded()).collect();
    if !failed.is_empty() {
        output.push_str("\nFailed:\n");
        for outcome in failed {
            if let Err(e) = &outcome.result {
                output.push_str(&format!("  {}: {}\n", outcome.task.id, e));
            }
        }
    }

    output
}
