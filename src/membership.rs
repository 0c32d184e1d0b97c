use serde::Serialize;
use tracing::{info, warn};

use crate::client::NodeApi;
use crate::context::BenchmarkContext;
use crate::node::{NodeAddress, NodeSet};
use crate::operation::{OperationError, OperationResult};

/// What happened during one join-all or leave-all batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// calls issued
    pub attempted: usize,
    /// calls answered with a 2xx status
    pub succeeded: usize,
    /// nodes whose call failed, with the reason
    pub failed: Vec<(NodeAddress, String)>,
    /// true if the batch stopped early because the run was cancelled
    pub cancelled: bool,
}

impl BatchReport {
    fn record(&mut self, node: &NodeAddress, result: &OperationResult) {
        self.attempted += 1;
        match result {
            Ok(_) => self.succeeded += 1,
            Err(e) => self.failed.push((node.clone(), e.to_string())),
        }
    }

    /// true if every issued call succeeded and the batch ran to completion
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }
}

/// Sequences join/leave calls across a [`NodeSet`].
///
/// A batch is a series of independent best-effort calls, not a transaction: a node that fails
/// to join or leave is logged and skipped, and nothing already done is rolled back.
/// Nodes are contacted one at a time, in set order.
pub struct MembershipController<C: NodeApi> {
    client: C,
}

impl<C: NodeApi> MembershipController<C> {
    /// a controller issuing its calls through `client`
    pub fn new(client: C) -> Self {
        MembershipController { client }
    }

    /// the client this controller issues calls with
    pub fn client(&self) -> &C {
        &self.client
    }

    /// asks `node` to join the ring through `bootstrap`
    pub fn join_one(
        &self,
        node: &NodeAddress,
        bootstrap: &NodeAddress,
        ctx: &BenchmarkContext,
    ) -> OperationResult {
        info!("Joining {} to network...", node);
        let result = self.client.join(node, bootstrap);
        ctx.counters.record(&result);
        if let Err(e) = &result {
            warn_skip("join", node, e);
        }
        result
    }

    /// asks `node` to leave the ring
    pub fn leave_one(&self, node: &NodeAddress, ctx: &BenchmarkContext) -> OperationResult {
        info!("Leaving {} from network...", node);
        let result = self.client.leave(node);
        ctx.counters.record(&result);
        if let Err(e) = &result {
            warn_skip("leave", node, e);
        }
        result
    }

    /// joins every node except the bootstrap through the bootstrap.
    /// Issues exactly `nodes.len() - 1` calls unless the run is cancelled.
    pub fn join_all(&self, nodes: &NodeSet, ctx: &BenchmarkContext) -> BatchReport {
        let bootstrap = nodes.bootstrap();
        let mut report = BatchReport::default();
        for node in nodes.others() {
            if ctx.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let result = self.join_one(node, bootstrap, ctx);
            report.record(node, &result);
        }
        info!(
            "join-all finished: {}/{} nodes joined",
            report.succeeded, report.attempted
        );
        report
    }

    /// asks every node, the bootstrap included, to leave.
    /// Issues exactly `nodes.len()` calls unless the run is cancelled. Nodes that already left
    /// usually answer with an error status; that is logged like any other failure.
    pub fn leave_all(&self, nodes: &NodeSet, ctx: &BenchmarkContext) -> BatchReport {
        self.leave_batch(nodes, ctx, true)
    }

    /// like [`leave_all`](Self::leave_all), but runs even after the run was cancelled, so a
    /// stopped workload does not leave nodes behind in the ring
    pub fn teardown(&self, nodes: &NodeSet, ctx: &BenchmarkContext) -> BatchReport {
        self.leave_batch(nodes, ctx, false)
    }

    fn leave_batch(
        &self,
        nodes: &NodeSet,
        ctx: &BenchmarkContext,
        cancellable: bool,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        for node in nodes {
            if cancellable && ctx.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let result = self.leave_one(node, ctx);
            report.record(node, &result);
        }
        info!(
            "leave-all finished: {}/{} nodes left",
            report.succeeded, report.attempted
        );
        report
    }
}

fn warn_skip(what: &str, node: &NodeAddress, e: &OperationError) {
    warn!("Failed to {} {}: {}. Skipping...", what, node, e);
}
