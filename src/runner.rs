//! Timed membership workloads.
//!
//! Growth-and-measure mode times every single join and leave of a join-all/leave-all cycle,
//! repeated a configured number of times. The key/value probe checks that stored data survives
//! a membership churn (or a simulated crash).
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::client::NodeApi;
use crate::context::BenchmarkContext;
use crate::error::{BenchError, Result};
use crate::membership::MembershipController;
use crate::node::{NodeAddress, NodeSet};
use crate::operation::OperationResult;
use crate::workload::random_key;

/// current version of the growth dump document
pub const GROWTH_SCHEMA_VERSION: u32 = 1;

/// Runs `op` and measures the wall-clock time between the instant right before the call and
/// the instant right after it returned.
pub fn timed<T>(op: impl FnOnce() -> T) -> (T, Duration) {
    let start = Instant::now();
    let out = op();
    (out, start.elapsed())
}

/// Join and leave timings of one growth iteration, in fractional seconds, in node order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthIteration {
    /// zero based iteration number
    pub iteration: usize,
    /// one entry per non-bootstrap node
    pub join_secs: Vec<f64>,
    /// one entry per non-bootstrap node
    pub leave_secs: Vec<f64>,
}

/// The result of a growth-and-measure run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthReport {
    /// always [`GROWTH_SCHEMA_VERSION`] when written by this crate
    pub schema_version: u32,
    /// number of nodes that took part, bootstrap included
    pub cluster_size: usize,
    /// completed (or, when cancelled, partially completed) iterations
    pub iterations: Vec<GrowthIteration>,
    /// true if the run stopped early
    #[serde(default)]
    pub cancelled: bool,
}

impl GrowthReport {
    /// the positional layout: `[[join_1], [leave_1], [join_2], [leave_2], ...]`
    pub fn legacy_matrix(&self) -> Vec<Vec<f64>> {
        self.iterations
            .iter()
            .flat_map(|it| vec![it.join_secs.clone(), it.leave_secs.clone()])
            .collect()
    }

    /// writes this report as JSON to `path`, in the versioned or the legacy layout
    pub fn write(&self, path: &Path, legacy: bool) -> Result<()> {
        let json = if legacy {
            serde_json::to_string(&self.legacy_matrix())?
        } else {
            serde_json::to_string_pretty(self)?
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, json)?;
        Ok(())
    }
}

/// How one probe check ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ProbeOutcome {
    /// the node returned exactly the stored value
    Passed,
    /// the PUT or GET itself failed
    HttpFailure(String),
    /// the node answered with a different value
    Mismatch {
        /// what was stored
        expected: String,
        /// what came back
        actual: String,
    },
}

/// One GET-after-PUT check of the probe.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeCheck {
    /// when in the probe the check was made
    pub stage: String,
    /// the node that was read from
    pub node: NodeAddress,
    /// the key that was read
    pub key: String,
    /// the verdict
    pub outcome: ProbeOutcome,
}

/// All checks made by one key/value probe.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProbeReport {
    /// checks in the order they were made
    pub checks: Vec<ProbeCheck>,
    /// true if the probe stopped early
    pub cancelled: bool,
}

impl ProbeReport {
    /// true if every check passed and the probe ran to completion
    pub fn passed(&self) -> bool {
        !self.cancelled && self.checks.iter().all(|c| c.outcome == ProbeOutcome::Passed)
    }
}

/// Runs timed workloads against a cluster through a [`MembershipController`].
pub struct TimedRunner<C: NodeApi> {
    membership: MembershipController<C>,
}

impl<C: NodeApi> TimedRunner<C> {
    /// a runner issuing its calls through `client`
    pub fn new(client: C) -> Self {
        TimedRunner {
            membership: MembershipController::new(client),
        }
    }

    /// the controller used for membership changes
    pub fn membership(&self) -> &MembershipController<C> {
        &self.membership
    }

    /// Growth-and-measure mode.
    ///
    /// Leaves every node of the context once to start from an empty network, then runs
    /// `iterations` cycles over the first `amount` nodes. Each cycle joins every non-bootstrap
    /// node in order, then makes each of them leave, timing every call. Failed calls are timed
    /// like successful ones.
    pub fn growth_and_measure(
        &self,
        ctx: &BenchmarkContext,
        amount: usize,
        iterations: usize,
    ) -> GrowthReport {
        let nodes = ctx.nodes.prefix(amount);
        let mut report = GrowthReport {
            schema_version: GROWTH_SCHEMA_VERSION,
            cluster_size: nodes.len(),
            iterations: Vec::with_capacity(iterations),
            cancelled: false,
        };

        if self.membership.leave_all(&ctx.nodes, ctx).cancelled {
            report.cancelled = true;
            return report;
        }

        for iteration in 0..iterations {
            info!("growth iteration {}/{}", iteration + 1, iterations);
            let bootstrap = nodes.bootstrap();
            let join_secs = self.timed_phase(&nodes, ctx, |node| {
                self.membership.join_one(node, bootstrap, ctx)
            });
            let join_done = join_secs.len() == nodes.others().len();
            let leave_secs = if join_done {
                self.timed_phase(&nodes, ctx, |node| self.membership.leave_one(node, ctx))
            } else {
                Vec::new()
            };
            let complete = join_done && leave_secs.len() == nodes.others().len();

            report.iterations.push(GrowthIteration {
                iteration,
                join_secs,
                leave_secs,
            });
            if !complete {
                warn!("growth run cancelled during iteration {}", iteration + 1);
                report.cancelled = true;
                break;
            }
        }
        report
    }

    /// runs growth-and-measure mode with the context's settings and writes the dump file.
    /// Returns the report and where it was written.
    pub fn run_growth(&self, ctx: &BenchmarkContext) -> Result<(GrowthReport, PathBuf)> {
        let report = self.growth_and_measure(ctx, ctx.config.cluster_size, ctx.config.iterations);
        let path = ctx.output.growth_dump(report.cluster_size);
        report.write(&path, ctx.config.legacy_growth_format)?;
        info!("wrote join/leave timings to {:?}", path);
        Ok((report, path))
    }

    /// times `op` on every non-bootstrap node, stopping early when the run is cancelled
    fn timed_phase<F>(&self, nodes: &NodeSet, ctx: &BenchmarkContext, mut op: F) -> Vec<f64>
    where
        F: FnMut(&NodeAddress) -> OperationResult,
    {
        let mut secs = Vec::with_capacity(nodes.others().len());
        for node in nodes.others() {
            if ctx.cancel.is_cancelled() {
                break;
            }
            let (_result, elapsed) = timed(|| op(node));
            secs.push(elapsed.as_secs_f64());
        }
        secs
    }

    /// Key/value correctness probe.
    ///
    /// Joins the cluster, stores one value through the bootstrap and one through the second
    /// node, and reads both back. Then it either makes every node leave and rejoin, or (with
    /// `crash`) simulates a crash of the second node, and reads both values again. Every check
    /// is made even if an earlier one failed. The cluster is left empty afterwards, also when
    /// the run was cancelled half way.
    ///
    /// # Errors
    /// returns [`BenchError::NotEnoughNodes`] if `crash` is set and there is no second node to
    /// crash; no call is made in that case
    pub fn probe(&self, ctx: &BenchmarkContext, crash: bool) -> Result<ProbeReport> {
        let nodes = &ctx.nodes;
        if crash && nodes.len() < 2 {
            return Err(BenchError::NotEnoughNodes {
                what: "a simulated crash".to_string(),
                needed: 2,
                given: nodes.len(),
            });
        }
        let report = self.probe_joined(ctx, crash);
        self.membership.teardown(nodes, ctx);
        Ok(report)
    }

    /// the part of [`probe`](Self::probe) that runs while the cluster is joined
    fn probe_joined(&self, ctx: &BenchmarkContext, crash: bool) -> ProbeReport {
        let mut report = ProbeReport::default();
        let nodes = &ctx.nodes;
        let first = nodes.bootstrap().clone();
        let second = nodes.round_robin(1).clone();
        let entries = [
            (first.clone(), random_key("probe"), "test_value".to_string()),
            (second.clone(), random_key("probe"), "test_value2".to_string()),
        ];

        if self.membership.join_all(nodes, ctx).cancelled {
            report.cancelled = true;
            return report;
        }

        for (node, key, value) in &entries {
            if ctx.cancel.is_cancelled() {
                report.cancelled = true;
                return report;
            }
            let client = self.membership.client();
            let put = client.put(node, key, value);
            ctx.counters.record(&put);
            if let Err(e) = put {
                warn!("Failed to PUT key {} to node {}: {}", key, node, e);
            }
            self.check(&mut report, ctx, "after put", node, key, value);
        }

        if crash {
            let r = self.membership.client().sim_crash(&second);
            ctx.counters.record(&r);
            if let Err(e) = r {
                warn!("Failed to crash {}: {}", second, e);
            }
        } else {
            self.membership.leave_all(nodes, ctx);
            self.membership.join_all(nodes, ctx);
        }

        let stage = if crash { "after crash" } else { "after churn" };
        for (node, key, value) in &entries {
            if ctx.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            // a crashed node cannot answer, read its key through the bootstrap instead
            let reader = if crash { &first } else { node };
            self.check(&mut report, ctx, stage, reader, key, value);
        }

        if crash {
            let r = self.membership.client().sim_recover(&second);
            ctx.counters.record(&r);
            if let Err(e) = r {
                warn!("Failed to recover {}: {}", second, e);
            }
        }
        report
    }

    /// reads `key` from `node` and records whether it still holds `expected`
    fn check(
        &self,
        report: &mut ProbeReport,
        ctx: &BenchmarkContext,
        stage: &str,
        node: &NodeAddress,
        key: &str,
        expected: &str,
    ) {
        let result = self.membership.client().get(node, key);
        ctx.counters.record(&result);
        let outcome = match result {
            Ok(reply) if reply.body == expected => ProbeOutcome::Passed,
            Ok(reply) => {
                ctx.counters.record_mismatch();
                warn!(
                    "GET key {} from node {} returned incorrect value {:?}",
                    key, node, reply.body
                );
                ProbeOutcome::Mismatch {
                    expected: expected.to_string(),
                    actual: reply.body,
                }
            }
            Err(e) => {
                warn!("Failed to GET key {} from node {}: {}", key, node, e);
                ProbeOutcome::HttpFailure(e.to_string())
            }
        };
        report.checks.push(ProbeCheck {
            stage: stage.to_string(),
            node: node.clone(),
            key: key.to_string(),
            outcome,
        });
    }
}
