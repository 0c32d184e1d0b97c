#![allow(dead_code)]

use std::sync::Mutex;

use dhtbench::{
    BenchConfig, BenchmarkContext, NodeAddress, NodeApi, NodeReply, NodeSet, Operation,
    OperationError, OperationResult,
};
use tempfile::TempDir;

type Responder = Box<dyn Fn(&NodeAddress, &Operation) -> OperationResult + Send + Sync>;

/// A `NodeApi` that records every call and answers through a closure.
pub struct FakeNodes {
    calls: Mutex<Vec<(NodeAddress, Operation)>>,
    respond: Responder,
}

impl FakeNodes {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&NodeAddress, &Operation) -> OperationResult + Send + Sync + 'static,
    {
        FakeNodes {
            calls: Mutex::new(Vec::new()),
            respond: Box::new(respond),
        }
    }

    /// every call succeeds with an empty body
    pub fn healthy() -> Self {
        FakeNodes::new(|_, _| ok(""))
    }

    /// every call is answered with the given status
    pub fn failing(status: u16) -> Self {
        FakeNodes::new(move |_, _| {
            Err(OperationError::Application {
                status,
                body: String::new(),
            })
        })
    }

    /// no node can be reached
    pub fn unreachable() -> Self {
        FakeNodes::new(|_, _| Err(OperationError::Transport("connection refused".into())))
    }

    pub fn calls(&self) -> Vec<(NodeAddress, Operation)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_named(&self, name: &str) -> Vec<(NodeAddress, Operation)> {
        self.calls()
            .into_iter()
            .filter(|(_, op)| op.name() == name)
            .collect()
    }
}

impl NodeApi for FakeNodes {
    fn execute(&self, node: &NodeAddress, op: &Operation) -> OperationResult {
        self.calls.lock().unwrap().push((node.clone(), op.clone()));
        (self.respond)(node, op)
    }
}

pub fn ok(body: &str) -> OperationResult {
    Ok(NodeReply {
        status: 200,
        body: body.to_string(),
    })
}

/// `count` addresses on localhost, ports 9000, 9001, ...
pub fn node_set(count: usize) -> NodeSet {
    NodeSet::parse((0..count).map(|i| format!("127.0.0.1:{}", 9000 + i))).unwrap()
}

/// a context over `nodes` writing into a fresh temporary directory
pub fn context(nodes: NodeSet) -> (BenchmarkContext, TempDir) {
    let dir = TempDir::new().expect("unable to create temporary working directory");
    let config = BenchConfig {
        output_dir: dir.path().to_path_buf(),
        ..BenchConfig::default()
    };
    (BenchmarkContext::new(nodes, config), dir)
}
