//! PUT/GET workloads.
//!
//! Keys are spread round-robin across the node set and every request is timed into the sample
//! logs, whatever its outcome. The liveness check lives here too.
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tracing::{info, warn};

use crate::client::NodeApi;
use crate::context::BenchmarkContext;
use crate::error::Result;
use crate::node::NodeAddress;
use crate::runner::timed;
use crate::sample_log::{LogKind, SampleLogger, TimingSample};

/// a key made of `prefix`, a dash and 16 random hex digits
pub fn random_key(prefix: &str) -> String {
    let bytes: [u8; 8] = rand::thread_rng().gen();
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    if prefix.is_empty() {
        hex
    } else {
        format!("{}-{}", prefix, hex)
    }
}

/// `count` random 16 digit hex keys
pub fn random_keys(count: usize) -> Vec<String> {
    (0..count).map(|_| random_key("")).collect()
}

/// the value the workload stores under the key at `index`
pub fn value_for(index: usize) -> String {
    format!("Hello, World {}!", index)
}

/// Which half of the workload a pass belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PassKind {
    /// stores every key
    Put,
    /// reads every key back and compares it
    Get,
}

/// Counts for one pass over all keys.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    /// PUT or GET
    pub kind: PassKind,
    /// requests issued
    pub operations: usize,
    /// requests that failed at the transport or HTTP level
    pub http_failures: usize,
    /// GETs that returned a different value than was stored
    pub correctness_failures: usize,
    /// wall-clock time of the whole pass
    pub elapsed: Duration,
    /// true if the pass stopped early
    pub cancelled: bool,
}

impl PassReport {
    fn new(kind: PassKind) -> Self {
        PassReport {
            kind,
            operations: 0,
            http_failures: 0,
            correctness_failures: 0,
            elapsed: Duration::default(),
            cancelled: false,
        }
    }

    /// true if nothing failed and the pass ran to completion
    pub fn succeeded(&self) -> bool {
        self.http_failures == 0 && self.correctness_failures == 0 && !self.cancelled
    }
}

/// All passes of a PUT/GET workload run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkloadReport {
    /// PUT passes in the order they ran
    pub put_passes: Vec<PassReport>,
    /// GET passes in the order they ran
    pub get_passes: Vec<PassReport>,
}

impl WorkloadReport {
    /// true if any GET returned a wrong value
    pub fn correctness_failed(&self) -> bool {
        self.get_passes.iter().any(|p| p.correctness_failures > 0)
    }

    /// true if any pass had a failure of any kind or was cut short
    pub fn failed(&self) -> bool {
        !self
            .put_passes
            .iter()
            .chain(self.get_passes.iter())
            .all(PassReport::succeeded)
    }

    /// true if the run was cancelled part way
    pub fn cancelled(&self) -> bool {
        self.put_passes
            .iter()
            .chain(self.get_passes.iter())
            .any(|p| p.cancelled)
    }
}

/// Result of probing `/helloworld` on every node.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LivenessReport {
    /// nodes that answered with their own address
    pub alive: Vec<NodeAddress>,
    /// nodes that failed, with the reason
    pub failed: Vec<(NodeAddress, String)>,
}

impl LivenessReport {
    /// true if every node answered correctly
    pub fn all_alive(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Issues PUT/GET workloads round-robin across the node set and logs every request's latency.
pub struct WorkloadBenchmark<C: NodeApi> {
    client: C,
}

impl<C: NodeApi> WorkloadBenchmark<C> {
    /// a benchmark issuing its requests through `client`
    pub fn new(client: C) -> Self {
        WorkloadBenchmark { client }
    }

    /// GETs `/helloworld` on every node and checks that each one answers with its own address.
    /// Every node is visited even after a failure.
    pub fn check_liveness(&self, ctx: &BenchmarkContext) -> LivenessReport {
        let mut report = LivenessReport::default();
        for node in &ctx.nodes {
            if ctx.cancel.is_cancelled() {
                break;
            }
            info!("Requesting helloworld from {}", node);
            let result = self.client.hello_world(node);
            ctx.counters.record(&result);
            match result {
                Ok(reply) if reply.body.trim() == node.as_str() => report.alive.push(node.clone()),
                Ok(reply) => {
                    warn!("{} identified itself as {:?}", node, reply.body);
                    report
                        .failed
                        .push((node.clone(), format!("identified as {:?}", reply.body)));
                }
                Err(e) => {
                    warn!("Request to {} failed: {}", node, e);
                    report.failed.push((node.clone(), e.to_string()));
                }
            }
        }
        report
    }

    /// Stores every key once, round-robin across the nodes. The value of the key at index `i`
    /// is [`value_for(i)`](value_for). Each request's latency is appended to the PUT log,
    /// whatever its outcome.
    pub fn put_pass(
        &self,
        ctx: &BenchmarkContext,
        keys: &[String],
        logger: &mut SampleLogger,
    ) -> Result<PassReport> {
        let node_count = ctx.nodes.len() as u32;
        let mut report = PassReport::new(PassKind::Put);
        let (outcome, elapsed) = timed(|| -> Result<()> {
            for (index, key) in keys.iter().enumerate() {
                if ctx.cancel.is_cancelled() {
                    report.cancelled = true;
                    break;
                }
                let node = ctx.nodes.round_robin(index);
                let value = value_for(index);
                let (result, took) = timed(|| self.client.put(node, key, &value));
                logger.append(LogKind::Put, &TimingSample::from_duration(node_count, took)?)?;
                ctx.counters.record(&result);
                report.operations += 1;
                match result {
                    Ok(_) => info!("Sent key {} to {} - {:.2} ms", key, node, ms(took)),
                    Err(e) => {
                        report.http_failures += 1;
                        warn!("PUT {} to {} failed after {:.2} ms: {}", key, node, ms(took), e);
                    }
                }
            }
            Ok(())
        });
        outcome?;
        report.elapsed = elapsed;
        Ok(report)
    }

    /// Reads every key back from the same node it was written to and compares the body with
    /// the stored value. Each request's latency is appended to the GET log, whatever its
    /// outcome.
    pub fn get_pass(
        &self,
        ctx: &BenchmarkContext,
        keys: &[String],
        logger: &mut SampleLogger,
    ) -> Result<PassReport> {
        let node_count = ctx.nodes.len() as u32;
        let mut report = PassReport::new(PassKind::Get);
        let (outcome, elapsed) = timed(|| -> Result<()> {
            for (index, key) in keys.iter().enumerate() {
                if ctx.cancel.is_cancelled() {
                    report.cancelled = true;
                    break;
                }
                let node = ctx.nodes.round_robin(index);
                let (result, took) = timed(|| self.client.get(node, key));
                logger.append(LogKind::Get, &TimingSample::from_duration(node_count, took)?)?;
                ctx.counters.record(&result);
                report.operations += 1;
                match result {
                    Ok(reply) if reply.body == value_for(index) => {
                        info!("Got key {} from {} - {:.2} ms", key, node, ms(took))
                    }
                    Ok(reply) => {
                        report.correctness_failures += 1;
                        ctx.counters.record_mismatch();
                        warn!(
                            "GET {} from {} returned {:?}, expected {:?}",
                            key,
                            node,
                            reply.body,
                            value_for(index)
                        );
                    }
                    Err(e) => {
                        report.http_failures += 1;
                        warn!("GET {} from {} failed after {:.2} ms: {}", key, node, ms(took), e);
                    }
                }
            }
            Ok(())
        });
        outcome?;
        report.elapsed = elapsed;
        Ok(report)
    }

    /// Runs `passes` PUT passes followed by `passes` GET passes over `keys`.
    /// Each pass's total duration goes to the matching `*_ALL` log.
    pub fn run(
        &self,
        ctx: &BenchmarkContext,
        keys: &[String],
        passes: usize,
        logger: &mut SampleLogger,
    ) -> Result<WorkloadReport> {
        let node_count = ctx.nodes.len() as u32;
        let mut report = WorkloadReport::default();

        for _ in 0..passes {
            let pass = self.put_pass(ctx, keys, logger)?;
            info!("PUT time: {:.2} seconds", pass.elapsed.as_secs_f64());
            logger.append(
                LogKind::PutAll,
                &TimingSample::from_duration(node_count, pass.elapsed)?,
            )?;
            let cancelled = pass.cancelled;
            report.put_passes.push(pass);
            if cancelled {
                return Ok(report);
            }
        }

        for _ in 0..passes {
            let pass = self.get_pass(ctx, keys, logger)?;
            info!("GET time: {:.2} seconds", pass.elapsed.as_secs_f64());
            logger.append(
                LogKind::GetAll,
                &TimingSample::from_duration(node_count, pass.elapsed)?,
            )?;
            let cancelled = pass.cancelled;
            report.get_passes.push(pass);
            if cancelled {
                break;
            }
        }
        Ok(report)
    }
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
