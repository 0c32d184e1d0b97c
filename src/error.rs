use thiserror::Error;

/// type alias for all harness operations that could fail with a [`BenchError`]
pub type Result<T> = std::result::Result<T, BenchError>;

/// The Error variants used by the harness.
///
/// Per-node failures that happen while a benchmark is running are *not* represented here, they
/// are captured as an [`OperationError`](crate::OperationError) so that a run can keep going.
/// A `BenchError` means the harness itself could not continue with what it was asked to do.
#[derive(Error, Debug)]
pub enum BenchError {
    /// variant for errors caused from file IO
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serde Error
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// a report or chart could not be formatted
    #[error("formatting error")]
    Format(#[from] std::fmt::Error),

    /// the HTTP client could not be constructed
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    /// a node address was not a valid `host:port`
    #[error("invalid node address '{0}', expected HOST:PORT")]
    InvalidAddress(String),

    /// a node set must contain at least the bootstrap node
    #[error("the node set is empty")]
    EmptyNodeSet,

    /// a timing sample violated its invariants
    #[error("invalid timing sample: {0}")]
    InvalidSample(String),

    /// a sample log line did not contain two numeric fields
    #[error("malformed log line: '{0}'")]
    MalformedLogLine(String),

    /// the node set is too small for the requested workload
    #[error("{what} needs at least {needed} nodes, got {given}")]
    NotEnoughNodes {
        /// the workload that was asked for
        what: String,
        /// the smallest node set it can run on
        needed: usize,
        /// the size of the node set it was given
        given: usize,
    },

    /// there is nothing to summarize or plot
    #[error("no data to plot: {0}")]
    EmptyDataset(String),

    /// a command line or configuration value could not be parsed
    #[error("{0}")]
    Parsing(String),

    /// the run was cancelled between two node operations
    #[error("the benchmark run was cancelled")]
    Cancelled,
}
