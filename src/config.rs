//! Settings for a benchmark run.
//!
//! Every field has a default, so a configuration file only needs to name what it changes.
//! Command line flags are applied on top of whatever was loaded.
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{BenchError, Result};

/// the request timeout used when nothing else is configured
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Settings shared by every benchmark mode.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchConfig {
    /// per-request timeout in milliseconds, `0` disables the timeout
    pub timeout_ms: u64,
    /// directory that receives the logs, dumps and plots
    pub output_dir: PathBuf,
    /// how many nodes of the set take part in growth-and-measure mode
    pub cluster_size: usize,
    /// how many join/leave cycles growth-and-measure mode performs
    pub iterations: usize,
    /// how many keys the PUT/GET workload writes and reads back
    pub key_count: usize,
    /// how many full PUT (then GET) passes the workload makes
    pub passes: usize,
    /// whether the aggregator computes standard deviations
    pub with_stddev: bool,
    /// file name of the rendered chart, relative to `output_dir`
    pub plot_file: PathBuf,
    /// write growth dumps as a bare array of arrays instead of the versioned document
    pub legacy_growth_format: bool,
}

impl Default for BenchConfig {
    fn default() -> Self {
        BenchConfig {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            output_dir: PathBuf::from("."),
            cluster_size: 64,
            iterations: 20,
            key_count: 100,
            passes: 3,
            with_stddev: true,
            plot_file: PathBuf::from("time_plot.svg"),
            legacy_growth_format: false,
        }
    }
}

impl BenchConfig {
    /// loads a JSON configuration file, falling back to defaults for missing fields
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: BenchConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// the per-request timeout, `None` when disabled
    pub fn timeout(&self) -> Option<Duration> {
        match self.timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// checks value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.cluster_size == 0 {
            return Err(BenchError::Parsing("cluster_size must be at least 1".into()));
        }
        if self.passes == 0 {
            return Err(BenchError::Parsing("passes must be at least 1".into()));
        }
        Ok(())
    }
}
