use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Result;
use crate::sample_log::TimingSample;

/// Mean and spread of the samples that share one node count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AggregatedStat {
    /// the node count this group was taken at
    pub node_count: u32,
    /// mean elapsed milliseconds
    pub average: f64,
    /// population standard deviation, `0.0` when disabled
    pub stddev: f64,
    /// how many samples the group holds, always at least 1
    pub samples: usize,
}

/// node count -> statistics, ordered by node count
pub type Statistics = BTreeMap<u32, AggregatedStat>;

/// Groups logged samples by node count and summarizes each group.
///
/// Reading never mutates the log. An empty log yields an empty mapping, deciding whether that
/// is an error is left to the caller.
#[derive(Debug, Clone, Copy)]
pub struct Aggregator {
    with_stddev: bool,
}

impl Default for Aggregator {
    fn default() -> Self {
        Aggregator { with_stddev: true }
    }
}

impl Aggregator {
    /// `with_stddev` controls whether the standard deviation is computed or left at `0.0`
    pub fn new(with_stddev: bool) -> Self {
        Aggregator { with_stddev }
    }

    /// reads the sample log at `path` and aggregates its valid lines.
    /// Lines that are not two numbers are skipped with a warning.
    ///
    /// # Errors
    /// only if the file cannot be opened or read
    pub fn aggregate_file(&self, path: &Path) -> Result<Statistics> {
        let reader = BufReader::new(File::open(path)?);
        let mut samples = Vec::new();
        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<TimingSample>() {
                Ok(sample) => samples.push(sample),
                Err(e) => warn!("{:?}:{}: skipping line, {}", path, number + 1, e),
            }
        }
        debug!("read {} samples from {:?}", samples.len(), path);
        Ok(self.aggregate(&samples))
    }

    /// aggregates samples already in memory
    pub fn aggregate(&self, samples: &[TimingSample]) -> Statistics {
        let mut groups: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
        for sample in samples {
            groups
                .entry(sample.node_count())
                .or_default()
                .push(sample.elapsed_ms());
        }

        groups
            .into_iter()
            .map(|(node_count, times)| {
                let n = times.len() as f64;
                let average = times.iter().sum::<f64>() / n;
                let stddev = if self.with_stddev {
                    (times.iter().map(|t| (t - average).powi(2)).sum::<f64>() / n).sqrt()
                } else {
                    0.0
                };
                let stat = AggregatedStat {
                    node_count,
                    average,
                    stddev,
                    samples: times.len(),
                };
                (node_count, stat)
            })
            .collect()
    }
}
