//! Configuration loading from bufbench.toml
//!
//! Scheduling defaults can be specified in a `bufbench.toml` file in the
//! project root. The file is discovered by walking up from the current
//! directory; CLI flags override whatever it sets.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// BufBench configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BufbenchConfig {
    /// Runner configuration
    #[serde(default)]
    pub runner: RunnerConfig,
}

/// Runner configuration for task execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Warmup invocations per worker before measurement starts
    #[serde(default = "default_warmup_iters")]
    pub warmup_iters: u32,
    /// Recorded invocations per worker per fork
    #[serde(default = "default_measure_iters")]
    pub measure_iters: u32,
    /// Independent replicates per task, each with fresh state
    #[serde(default = "default_forks")]
    pub forks: u32,
    /// Concurrent worker threads per fork
    #[serde(default = "default_workers")]
    pub workers: u32,
    /// Reads per timed invocation
    #[serde(default = "default_batch")]
    pub batch: u64,
    /// Confidence level for the error margin (e.g. 0.95 for 95%)
    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,
    /// Directory for memory-mapped backing files (system temp if unset)
    #[serde(default)]
    pub temp_dir: Option<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            warmup_iters: default_warmup_iters(),
            measure_iters: default_measure_iters(),
            forks: default_forks(),
            workers: default_workers(),
            batch: default_batch(),
            confidence_level: default_confidence_level(),
            temp_dir: None,
        }
    }
}

fn default_warmup_iters() -> u32 {
    10
}
fn default_measure_iters() -> u32 {
    10
}
fn default_forks() -> u32 {
    1
}
fn default_workers() -> u32 {
    1
}
fn default_batch() -> u64 {
    1024
}
fn default_confidence_level() -> f64 {
    bufbench_stats::DEFAULT_CONFIDENCE_LEVEL
}

impl BufbenchConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Try to discover and load configuration by walking up from current directory
    pub fn discover() -> Option<Self> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let config_path = dir.join("bufbench.toml");
            if config_path.exists() {
                return Self::load(&config_path).ok();
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# BufBench Configuration

[runner]
# Warmup invocations per worker before measurement
warmup_iters = 10
# Recorded invocations per worker per fork
measure_iters = 10
# Independent replicates per task
forks = 1
# Concurrent worker threads per fork
workers = 1
# Reads per timed invocation
batch = 1024
# Confidence level for the error margin (0.0 to 1.0)
confidence_level = 0.95
# Directory for memory-mapped backing files (uncomment to enable)
# temp_dir = "/tmp/bufbench"
"#
        .to_string()
    }
}
