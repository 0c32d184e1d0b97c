use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use crate::config::BenchConfig;
use crate::error::{BenchError, Result};
use crate::node::NodeSet;
use crate::operation::{OperationError, OperationResult};

/// A flag that asks a running benchmark to stop at the next node boundary.
///
/// Cloning a token shares the flag. A request already in flight always completes first.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// a fresh, un-cancelled token
    pub fn new() -> Self {
        CancellationToken::default()
    }

    /// requests cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// true once [`CancellationToken::cancel`] has been called on any clone
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// returns `Err(BenchError::Cancelled)` if cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(BenchError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// cancels this token from a background thread once `deadline` has elapsed
    pub fn cancel_after(&self, deadline: Duration) {
        let token = self.clone();
        thread::spawn(move || {
            thread::sleep(deadline);
            warn!("deadline of {:?} reached, cancelling the run", deadline);
            token.cancel();
        });
    }
}

/// Tallies of every node operation issued during a run.
#[derive(Debug, Default)]
pub struct RunCounters {
    operations: AtomicU64,
    successes: AtomicU64,
    transport_failures: AtomicU64,
    application_failures: AtomicU64,
    correctness_failures: AtomicU64,
}

/// A point-in-time copy of [`RunCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    /// node operations issued
    pub operations: u64,
    /// operations answered with a 2xx status
    pub successes: u64,
    /// operations that never got an answer
    pub transport_failures: u64,
    /// operations answered with a non-2xx status
    pub application_failures: u64,
    /// GETs whose body differed from the value that was PUT
    pub correctness_failures: u64,
}

impl RunCounters {
    /// counts one issued operation by its outcome
    pub fn record(&self, result: &OperationResult) {
        self.operations.fetch_add(1, Ordering::Relaxed);
        let counter = match result {
            Ok(_) => &self.successes,
            Err(OperationError::Transport(_)) | Err(OperationError::InvalidRequest(_)) => {
                &self.transport_failures
            }
            Err(OperationError::Application { .. }) => &self.application_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// counts one value mismatch
    pub fn record_mismatch(&self) {
        self.correctness_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// copies the current tallies
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            operations: self.operations.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            transport_failures: self.transport_failures.load(Ordering::Relaxed),
            application_failures: self.application_failures.load(Ordering::Relaxed),
            correctness_failures: self.correctness_failures.load(Ordering::Relaxed),
        }
    }
}

/// Where a run writes its artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    dir: PathBuf,
}

impl OutputPaths {
    /// all artifacts go directly into `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        OutputPaths { dir: dir.into() }
    }

    /// the output directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// per-operation PUT latencies
    pub fn put_log(&self) -> PathBuf {
        self.dir.join("PUT_log.txt")
    }

    /// per-operation GET latencies
    pub fn get_log(&self) -> PathBuf {
        self.dir.join("GET_log.txt")
    }

    /// whole-pass PUT durations
    pub fn put_all_log(&self) -> PathBuf {
        self.dir.join("PUT_ALL_log.txt")
    }

    /// whole-pass GET durations
    pub fn get_all_log(&self) -> PathBuf {
        self.dir.join("GET_ALL_log.txt")
    }

    /// the join/leave timing dump for a cluster of `amount` nodes
    pub fn growth_dump(&self, amount: usize) -> PathBuf {
        self.dir
            .join(format!("time_taken_to_join_and_leave_size_{}.txt", amount))
    }

    /// resolves a file name relative to the output directory
    pub fn file(&self, name: impl AsRef<Path>) -> PathBuf {
        self.dir.join(name)
    }
}

/// Everything one benchmark run shares between its components: the node set, the settings,
/// where output goes, the tallies, and the cancellation flag.
#[derive(Debug)]
pub struct BenchmarkContext {
    /// the cluster under test
    pub nodes: NodeSet,
    /// the run's settings
    pub config: BenchConfig,
    /// where logs and dumps are written
    pub output: OutputPaths,
    /// per-outcome tallies
    pub counters: RunCounters,
    /// checked before every node operation
    pub cancel: CancellationToken,
}

impl BenchmarkContext {
    /// builds a context whose output directory comes from `config`
    pub fn new(nodes: NodeSet, config: BenchConfig) -> Self {
        let output = OutputPaths::new(&config.output_dir);
        BenchmarkContext {
            nodes,
            config,
            output,
            counters: RunCounters::default(),
            cancel: CancellationToken::new(),
        }
    }
}
