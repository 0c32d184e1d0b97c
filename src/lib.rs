#![deny(missing_docs)]
//! A benchmarking and correctness-probing harness for chord-like key-value clusters.
//!
//! The cluster itself is not part of this crate. Every node exposes a small HTTP surface, and
//! this crate drives that surface from the outside:
//!
//! | Method | Path                    | Purpose                                   |
//! |--------|-------------------------|-------------------------------------------|
//! | GET    | `/helloworld`           | liveness probe, answers its own host:port |
//! | GET    | `/node-info`            | node metadata                             |
//! | POST   | `/join?nprime={main}`   | join the ring through the bootstrap node  |
//! | POST   | `/leave`                | leave the ring                            |
//! | PUT    | `/storage/{key}`        | store the request body under `key`        |
//! | GET    | `/storage/{key}`        | read the value stored under `key`         |
//! | POST   | `/sim-crash`            | simulate a crash                          |
//! | POST   | `/sim-recover`          | recover from a simulated crash            |
//!
//! ## Components
//! - [`HttpNodeClient`] issues one request against one node and hands back an
//! [`OperationResult`]. A node that cannot be reached and a node that answers with an error
//! status are both ordinary `Err` values, never panics or early returns.
//! - [`MembershipController`] runs join-all / leave-all batches over a [`NodeSet`]. A failing
//! node is logged and skipped, the batch always continues.
//! - [`TimedRunner`] times every join and leave of repeated join-all/leave-all cycles
//! ("growth-and-measure" mode) and runs the key/value correctness probe.
//! - [`WorkloadBenchmark`] issues PUT/GET workloads round-robin across the nodes and appends
//! one [`TimingSample`] per request to the sample logs through a [`SampleLogger`].
//! - [`Aggregator`] reads a sample log back and computes mean and standard deviation per
//! cluster size, which a [`PlotRenderer`] turns into an error-bar chart.
//!
//! All of them share one [`BenchmarkContext`], which holds the node set, the settings, the
//! output paths, the run counters and a [`CancellationToken`].
//!
//! ## Sample logs
//! `PUT_log.txt`, `GET_log.txt`, `PUT_ALL_log.txt` and `GET_ALL_log.txt` are append-only. Each
//! line is `<nodeCount> <elapsedMillis>` with two decimals, e.g. `4 12.37`. Lines that do not
//! parse are skipped when the logs are read back.
//!
//! ## Stub nodes
//! The [`stub`] module serves the node surface from memory so the harness can be exercised
//! without a real cluster.

pub use client::{HttpNodeClient, NodeApi};
pub use config::BenchConfig;
pub use context::{BenchmarkContext, CancellationToken, CounterSnapshot, OutputPaths, RunCounters};
pub use error::{BenchError, Result};
pub use membership::{BatchReport, MembershipController};
pub use node::{DeployedNode, NodeAddress, NodeSet};
pub use operation::{NodeReply, Operation, OperationError, OperationResult};
pub use plot::{PlotRenderer, SvgPlotRenderer};
pub use runner::{GrowthIteration, GrowthReport, ProbeOutcome, ProbeReport, TimedRunner};
pub use sample_log::{LogKind, SampleLog, SampleLogger, TimingSample};
pub use stats::{AggregatedStat, Aggregator, Statistics};
pub use workload::{LivenessReport, PassKind, PassReport, WorkloadBenchmark, WorkloadReport};

mod client;
pub mod config;
mod context;
mod error;
mod membership;
pub mod node;
pub mod operation;
pub mod plot;
pub mod runner;
mod sample_log;
mod stats;
pub mod stub;
pub mod workload;
