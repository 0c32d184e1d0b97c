//! An in-memory stand-in for a cluster node.
//!
//! Stub nodes answer the same HTTP surface as real nodes (`/helloworld`, `/node-info`, `/join`,
//! `/leave`, `/storage/{key}`, `/sim-crash`, `/sim-recover`) but do no routing at all: every
//! stub created from the same [`StubStore`] reads and writes one shared map, which is what a
//! correctly working ring looks like from the outside.
//! They exist for dry runs of the harness and for its integration tests.
use std::net::{TcpListener, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use dashmap::DashMap;
use serde_json::json;
use tracing::{error, info};

use crate::error::Result;
use crate::node::{NodeAddress, NodeSet};

mod server;

pub use self::server::StubServer;

/// One request as the routing logic of a [`StubNode`] sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// `GET`, `POST`, ...
    pub method: String,
    /// the path as sent, still percent-encoded
    pub path: String,
    /// the raw query string, empty if there was none
    pub query: String,
    /// the request body
    pub body: String,
}

impl HttpRequest {
    /// the decoded value of query parameter `name`
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == name)
            .and_then(|(_, v)| {
                let v = v.replace('+', " ");
                urlencoding::decode(&v).ok().map(|d| d.into_owned())
            })
    }
}

/// Key/value data shared by every stub node of one emulated ring.
#[derive(Debug, Clone, Default)]
pub struct StubStore(Arc<DashMap<String, String>>);

impl StubStore {
    /// an empty store
    pub fn new() -> Self {
        StubStore::default()
    }

    /// number of stored keys
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// true if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// the value stored under `key`
    pub fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).map(|v| v.value().clone())
    }

    /// stores `value` under `key`, replacing any previous value
    pub fn insert(&self, key: String, value: String) {
        self.0.insert(key, value);
    }
}

/// The state of one stub node.
#[derive(Debug)]
pub struct StubNode {
    address: NodeAddress,
    store: StubStore,
    joined: AtomicBool,
    crashed: AtomicBool,
}

impl StubNode {
    /// a node that identifies itself as `address` and keeps its data in `store`
    pub fn new(address: NodeAddress, store: StubStore) -> Self {
        StubNode {
            address,
            store,
            joined: AtomicBool::new(false),
            crashed: AtomicBool::new(false),
        }
    }

    /// the address this node reports from `/helloworld`
    pub fn address(&self) -> &NodeAddress {
        &self.address
    }

    /// true while the node is part of a ring
    pub fn is_joined(&self) -> bool {
        self.joined.load(Ordering::SeqCst)
    }

    /// true while a crash is being simulated
    pub fn is_crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    /// answers one request with `(status, body)`
    pub fn handle(&self, req: &HttpRequest) -> (u16, String) {
        let crashed = self.is_crashed();
        if crashed && req.path != "/sim-recover" {
            return (503, String::new());
        }

        let method = req.method.as_str();
        match req.path.as_str() {
            "/helloworld" => match method {
                "GET" => (200, self.address.to_string()),
                _ => (405, String::new()),
            },
            "/node-info" => match method {
                "GET" => {
                    let info = json!({
                        "address": self.address.as_str(),
                        "joined": self.is_joined(),
                        "keys": self.store.len(),
                    });
                    (200, info.to_string())
                }
                _ => (405, String::new()),
            },
            "/join" => match (method, req.query_param("nprime")) {
                ("POST", Some(bootstrap)) if bootstrap.parse::<NodeAddress>().is_ok() => {
                    self.joined.store(true, Ordering::SeqCst);
                    (200, String::new())
                }
                ("POST", _) => (400, "missing nprime".to_string()),
                _ => (405, String::new()),
            },
            "/leave" => match method {
                "POST" => {
                    self.joined.store(false, Ordering::SeqCst);
                    (200, String::new())
                }
                _ => (405, String::new()),
            },
            "/sim-crash" => match method {
                "POST" => {
                    self.crashed.store(true, Ordering::SeqCst);
                    (200, String::new())
                }
                _ => (405, String::new()),
            },
            "/sim-recover" => match method {
                "POST" => {
                    self.crashed.store(false, Ordering::SeqCst);
                    (200, String::new())
                }
                _ => (405, String::new()),
            },
            path => {
                let key = match path.strip_prefix("/storage/") {
                    Some(key) if !key.is_empty() => key,
                    _ => return (404, "404 Not Found".to_string()),
                };
                let key = match urlencoding::decode(key) {
                    Ok(key) => key.into_owned(),
                    Err(_) => return (400, "key is not valid UTF-8".to_string()),
                };
                match method {
                    "GET" => match self.store.get(&key) {
                        Some(value) => (200, value),
                        None => (404, String::new()),
                    },
                    "PUT" => {
                        self.store.insert(key, req.body.clone());
                        (200, String::new())
                    }
                    _ => (405, String::new()),
                }
            }
        }
    }
}

/// binds a stub node to `addr` and serves it on a background thread running a tokio runtime
/// with `threads` workers. Returns the address it actually listens on (useful with port 0).
pub fn spawn_stub<A: ToSocketAddrs>(addr: A, store: StubStore, threads: usize) -> Result<NodeAddress> {
    // bound here so the caller knows the port before the first request
    let listener = TcpListener::bind(addr)?;
    listener.set_nonblocking(true)?;
    let address: NodeAddress = listener.local_addr()?.to_string().parse()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(threads.max(1))
        .thread_name("stub-node")
        .enable_all()
        .build()?;
    let server = StubServer::new(StubNode::new(address.clone(), store));
    info!("stub node listening on {}", address);
    thread::spawn(move || {
        if let Err(e) = runtime.block_on(server.run(listener)) {
            error!("stub node stopped: {}", e);
        }
    });
    Ok(address)
}

/// starts `count` stub nodes on free loopback ports, all sharing `store`
pub fn spawn_cluster(count: usize, store: &StubStore) -> Result<NodeSet> {
    let nodes = (0..count)
        .map(|_| spawn_stub("127.0.0.1:0", store.clone(), 2))
        .collect::<Result<Vec<_>>>()?;
    NodeSet::new(nodes)
}
