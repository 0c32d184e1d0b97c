use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::context::OutputPaths;
use crate::error::{BenchError, Result};

/// One observed operation: how many nodes the cluster had and how long the call took.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimingSample {
    node_count: u32,
    elapsed_ms: f64,
}

impl TimingSample {
    /// builds a sample
    ///
    /// # Errors
    /// returns [`BenchError::InvalidSample`] if `node_count` is 0 or `elapsed_ms` is negative
    /// or not a finite number
    pub fn new(node_count: u32, elapsed_ms: f64) -> Result<Self> {
        if node_count < 1 {
            return Err(BenchError::InvalidSample("node count must be at least 1".into()));
        }
        if !elapsed_ms.is_finite() || elapsed_ms < 0.0 {
            return Err(BenchError::InvalidSample(format!(
                "elapsed time must be a non-negative number, got {}",
                elapsed_ms
            )));
        }
        Ok(TimingSample {
            node_count,
            elapsed_ms,
        })
    }

    /// builds a sample from a measured duration
    pub fn from_duration(node_count: u32, elapsed: Duration) -> Result<Self> {
        TimingSample::new(node_count, elapsed.as_secs_f64() * 1000.0)
    }

    /// cluster size the sample was taken at
    pub fn node_count(&self) -> u32 {
        self.node_count
    }

    /// measured time in milliseconds
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_ms
    }
}

/// the on-disk line format, without the trailing newline
impl fmt::Display for TimingSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.2}", self.node_count, self.elapsed_ms)
    }
}

/// parses a log line of two whitespace separated numbers; the node count is truncated to an
/// integer
impl FromStr for TimingSample {
    type Err = BenchError;

    fn from_str(line: &str) -> Result<Self> {
        let malformed = || BenchError::MalformedLogLine(line.trim().to_string());
        let mut fields = line.split_whitespace().map(str::parse::<f64>);
        let (node_count, elapsed_ms) = match (fields.next(), fields.next(), fields.next()) {
            (Some(Ok(n)), Some(Ok(ms)), None) => (n, ms),
            _ => return Err(malformed()),
        };
        if !node_count.is_finite() || node_count < 1.0 || node_count > u32::MAX as f64 {
            return Err(malformed());
        }
        TimingSample::new(node_count.trunc() as u32, elapsed_ms).map_err(|_| malformed())
    }
}

/// The four append-only logs a workload run writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogKind {
    /// one row per PUT
    Put,
    /// one row per GET
    Get,
    /// one row per full PUT pass
    PutAll,
    /// one row per full GET pass
    GetAll,
}

impl LogKind {
    /// path of this log inside `output`
    pub fn path(self, output: &OutputPaths) -> PathBuf {
        match self {
            LogKind::Put => output.put_log(),
            LogKind::Get => output.get_log(),
            LogKind::PutAll => output.put_all_log(),
            LogKind::GetAll => output.get_all_log(),
        }
    }
}

/// An append-only sample log file. Existing content is never rewritten.
#[derive(Debug)]
pub struct SampleLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl SampleLog {
    /// opens (creating if necessary) the log at `path` for appending
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        debug!("opened sample log {:?}", path);
        Ok(SampleLog {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    /// appends one sample as a full line and flushes it, so an aborted run never leaves a
    /// partial line behind
    pub fn append(&mut self, sample: &TimingSample) -> Result<()> {
        let line = format!("{}\n", sample);
        self.writer.write_all(line.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }

    /// the file this log appends to
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Owns the open sample logs of a run. Logs are opened on first use; `&mut self` keeps a single
/// writer per file.
#[derive(Debug)]
pub struct SampleLogger {
    output: OutputPaths,
    put: Option<SampleLog>,
    get: Option<SampleLog>,
    put_all: Option<SampleLog>,
    get_all: Option<SampleLog>,
}

impl SampleLogger {
    /// a logger writing into `output`
    pub fn new(output: OutputPaths) -> Self {
        SampleLogger {
            output,
            put: None,
            get: None,
            put_all: None,
            get_all: None,
        }
    }

    /// appends `sample` to the log of the given `kind`
    pub fn append(&mut self, kind: LogKind, sample: &TimingSample) -> Result<()> {
        let path = kind.path(&self.output);
        let slot = match kind {
            LogKind::Put => &mut self.put,
            LogKind::Get => &mut self.get,
            LogKind::PutAll => &mut self.put_all,
            LogKind::GetAll => &mut self.get_all,
        };
        if slot.is_none() {
            *slot = Some(SampleLog::open(&path)?);
        }
        if let Some(log) = slot {
            log.append(sample)?;
        }
        Ok(())
    }
}
