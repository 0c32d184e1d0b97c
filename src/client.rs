use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::Url;
use tracing::debug;

use crate::error::Result;
use crate::node::NodeAddress;
use crate::operation::{Method, NodeReply, Operation, OperationError, OperationResult};

/// The calls the harness makes against a single node.
///
/// Only [`NodeApi::execute`] must be implemented, the named operations are thin wrappers over it.
/// Implementations hold no per-call state, so one instance may be used for every node of a run.
pub trait NodeApi {
    /// issues `op` against `node` and returns its outcome. Never panics and never returns early
    /// on a failure: unreachable nodes and non-2xx replies both come back as an `Err` value.
    fn execute(&self, node: &NodeAddress, op: &Operation) -> OperationResult;

    /// `GET /helloworld`
    fn hello_world(&self, node: &NodeAddress) -> OperationResult {
        self.execute(node, &Operation::HelloWorld)
    }

    /// `GET /node-info`
    fn node_info(&self, node: &NodeAddress) -> OperationResult {
        self.execute(node, &Operation::NodeInfo)
    }

    /// `POST /join?nprime={bootstrap}`
    fn join(&self, node: &NodeAddress, bootstrap: &NodeAddress) -> OperationResult {
        self.execute(
            node,
            &Operation::Join {
                bootstrap: bootstrap.clone(),
            },
        )
    }

    /// `POST /leave`
    fn leave(&self, node: &NodeAddress) -> OperationResult {
        self.execute(node, &Operation::Leave)
    }

    /// `PUT /storage/{key}` with `value` as the request body
    fn put(&self, node: &NodeAddress, key: &str, value: &str) -> OperationResult {
        self.execute(
            node,
            &Operation::Put {
                key: key.to_string(),
                value: value.to_string(),
            },
        )
    }

    /// `GET /storage/{key}`
    fn get(&self, node: &NodeAddress, key: &str) -> OperationResult {
        self.execute(
            node,
            &Operation::Get {
                key: key.to_string(),
            },
        )
    }

    /// `POST /sim-crash`
    fn sim_crash(&self, node: &NodeAddress) -> OperationResult {
        self.execute(node, &Operation::SimCrash)
    }

    /// `POST /sim-recover`
    fn sim_recover(&self, node: &NodeAddress) -> OperationResult {
        self.execute(node, &Operation::SimRecover)
    }
}

impl<T: NodeApi + ?Sized> NodeApi for &T {
    fn execute(&self, node: &NodeAddress, op: &Operation) -> OperationResult {
        (**self).execute(node, op)
    }
}

/// `HttpNodeClient` talks to real nodes over HTTP/1.1 using a blocking [`reqwest`] client.
pub struct HttpNodeClient {
    http: Client,
}

impl HttpNodeClient {
    /// creates a client whose requests give up after `timeout`.
    /// A `None` timeout leaves every request unbounded, so a hung node can stall a whole run.
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        // the blocking builder defaults to 30 seconds, `None` must be passed explicitly
        let mut builder = Client::builder().timeout(timeout);
        if let Some(timeout) = timeout {
            builder = builder.connect_timeout(timeout);
        }
        Ok(HttpNodeClient {
            http: builder.build()?,
        })
    }

    /// builds the full request URL of `op` on `node`
    fn url(node: &NodeAddress, op: &Operation) -> std::result::Result<Url, OperationError> {
        if let Operation::Put { key, .. } | Operation::Get { key } = op {
            // `Url` folds dot segments away (percent-encoded ones too), so such a key would
            // silently address another resource
            if key.is_empty() || key == "." || key == ".." {
                return Err(OperationError::InvalidRequest(format!(
                    "key {:?} cannot be sent as a path segment",
                    key
                )));
            }
        }
        let mut url = Url::parse(&format!("http://{}/", node))
            .map_err(|e| OperationError::InvalidRequest(format!("bad url for {}: {}", node, e)))?;
        url.path_segments_mut()
            .map_err(|_| OperationError::InvalidRequest(format!("{} cannot be a base url", node)))?
            .clear()
            .extend(op.path_segments());
        if let Operation::Join { bootstrap } = op {
            url.query_pairs_mut()
                .append_pair("nprime", bootstrap.as_str());
        }
        Ok(url)
    }
}

impl NodeApi for HttpNodeClient {
    fn execute(&self, node: &NodeAddress, op: &Operation) -> OperationResult {
        let url = HttpNodeClient::url(node, op)?;
        let request = match op.method() {
            Method::Get => self.http.get(url),
            Method::Post => self.http.post(url),
            Method::Put => {
                let value = match op {
                    Operation::Put { value, .. } => value.clone(),
                    _ => String::new(),
                };
                self.http.put(url).body(value)
            }
        };

        let response = request
            .send()
            .map_err(|e| OperationError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        // the body is read in full so the caller's timer covers the whole exchange
        let body = response
            .text()
            .map_err(|e| OperationError::Transport(e.to_string()))?;
        debug!(%node, %op, status, body_len = body.len(), "reply");

        if (200..300).contains(&status) {
            Ok(NodeReply { status, body })
        } else {
            Err(OperationError::Application { status, body })
        }
    }
}
