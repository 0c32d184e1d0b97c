//! The requests the harness sends to a node and the outcome of each one.
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::node::NodeAddress;

/// These are the requests the harness can make to a single node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// liveness + identity probe
    HelloWorld,
    /// fetch the node's metadata
    NodeInfo,
    /// join the ring through the given bootstrap node
    Join {
        /// the node to join through
        bootstrap: NodeAddress,
    },
    /// leave the ring
    Leave,
    /// store a value
    Put {
        /// the key to set
        key: String,
        /// the value to set
        value: String,
    },
    /// retrieve a value
    Get {
        /// the key to search for
        key: String,
    },
    /// make the node behave as if it crashed
    SimCrash,
    /// bring a simulated crashed node back
    SimRecover,
}

/// The HTTP method an [`Operation`] is sent with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
}

impl Operation {
    /// the HTTP method used to issue this operation
    pub fn method(&self) -> Method {
        match self {
            Operation::HelloWorld | Operation::NodeInfo | Operation::Get { .. } => Method::Get,
            Operation::Put { .. } => Method::Put,
            Operation::Join { .. }
            | Operation::Leave
            | Operation::SimCrash
            | Operation::SimRecover => Method::Post,
        }
    }

    /// the fixed path segments of this operation's endpoint
    pub fn path_segments(&self) -> Vec<&str> {
        match self {
            Operation::HelloWorld => vec!["helloworld"],
            Operation::NodeInfo => vec!["node-info"],
            Operation::Join { .. } => vec!["join"],
            Operation::Leave => vec!["leave"],
            Operation::Put { key, .. } | Operation::Get { key } => vec!["storage", key.as_str()],
            Operation::SimCrash => vec!["sim-crash"],
            Operation::SimRecover => vec!["sim-recover"],
        }
    }

    /// short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Operation::HelloWorld => "helloworld",
            Operation::NodeInfo => "node-info",
            Operation::Join { .. } => "join",
            Operation::Leave => "leave",
            Operation::Put { .. } => "PUT",
            Operation::Get { .. } => "GET",
            Operation::SimCrash => "sim-crash",
            Operation::SimRecover => "sim-recover",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Join { bootstrap } => write!(f, "join via {}", bootstrap),
            Operation::Put { key, .. } | Operation::Get { key } => {
                write!(f, "{} {}", self.name(), key)
            }
            _ => f.write_str(self.name()),
        }
    }
}

/// A reply from a node that answered with a 2xx status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeReply {
    /// the HTTP status code
    pub status: u16,
    /// the response body, fully read
    pub body: String,
}

/// The ways a single node operation can fail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    /// the node could not be reached, or the exchange was cut off
    #[error("transport failure: {0}")]
    Transport(String),

    /// the node answered, but not with a 2xx status
    #[error("node answered with status {status}")]
    Application {
        /// the HTTP status code
        status: u16,
        /// the response body
        body: String,
    },

    /// the operation cannot be expressed as an HTTP request, nothing was sent
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// The result of one node operation. Transport and application failures are both values here
/// so callers pick a continue/skip policy with a single `match`.
pub type OperationResult = std::result::Result<NodeReply, OperationError>;

/// the status code carried by `result`, if the node answered at all
pub fn status_code(result: &OperationResult) -> Option<u16> {
    match result {
        Ok(reply) => Some(reply.status),
        Err(OperationError::Application { status, .. }) => Some(*status),
        Err(OperationError::Transport(_)) | Err(OperationError::InvalidRequest(_)) => None,
    }
}

/// the body carried by `result`, if the node answered at all
pub fn body(result: &OperationResult) -> Option<&str> {
    match result {
        Ok(reply) => Some(&reply.body),
        Err(OperationError::Application { body, .. }) => Some(body),
        Err(OperationError::Transport(_)) | Err(OperationError::InvalidRequest(_)) => None,
    }
}
