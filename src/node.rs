//! Cluster membership as the harness sees it: validated node addresses, the ordered node set
//! of a run and the entries of a deployment `Nodes.json` file.
use std::convert::TryFrom;
use std::fmt;
use std::fs;
use std::net::Ipv6Addr;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};

/// A `host:port` string identifying one cluster member.
///
/// The host part is kept verbatim (a name, an IPv4 address or a bracketed IPv6 address), only
/// the shape is validated: a non-empty host, a `:` separator and a numeric port. A host with a
/// `:` in it must be a bracketed IPv6 address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeAddress(String);

impl NodeAddress {
    /// the `host:port` text of this address
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// the port part of this address
    pub fn port(&self) -> u16 {
        // validated in `from_str`
        self.0
            .rsplit_once(':')
            .and_then(|(_, port)| port.parse().ok())
            .unwrap_or_default()
    }
}

impl FromStr for NodeAddress {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || BenchError::InvalidAddress(s.to_string());
        let (host, port) = s.rsplit_once(':').ok_or_else(invalid)?;
        let valid_host = match host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
            Some(ipv6) => ipv6.parse::<Ipv6Addr>().is_ok(),
            None => {
                !host.is_empty()
                    && !host.contains(|c: char| {
                        c.is_whitespace() || matches!(c, ':' | '/' | '?' | '#' | '[' | ']' | '@')
                    })
            }
        };
        if !valid_host {
            return Err(invalid());
        }
        port.parse::<u16>().map_err(|_| invalid())?;
        Ok(NodeAddress(s.to_string()))
    }
}

impl TryFrom<String> for NodeAddress {
    type Error = BenchError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<NodeAddress> for String {
    fn from(addr: NodeAddress) -> Self {
        addr.0
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of a deployment `Nodes.json` file. Fields other than these two are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct DeployedNode {
    /// the node's identifier on the ring
    pub id: i64,
    /// where the node listens
    pub address: NodeAddress,
}

/// reads a deployment `Nodes.json` file
pub fn read_deployment(path: &Path) -> Result<Vec<DeployedNode>> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// An ordered, non-empty sequence of [`NodeAddress`]es.
///
/// Element 0 is the bootstrap ("main") node that every other node joins through.
/// A `NodeSet` is built once per run and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSet {
    nodes: Vec<NodeAddress>,
}

impl NodeSet {
    /// builds a node set from already validated addresses
    ///
    /// # Errors
    /// returns [`BenchError::EmptyNodeSet`] if `nodes` is empty
    pub fn new(nodes: Vec<NodeAddress>) -> Result<Self> {
        if nodes.is_empty() {
            return Err(BenchError::EmptyNodeSet);
        }
        Ok(NodeSet { nodes })
    }

    /// parses every string in `addrs` as a [`NodeAddress`]
    pub fn parse<I, S>(addrs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let nodes = addrs
            .into_iter()
            .map(|a| a.as_ref().trim().parse())
            .collect::<Result<Vec<NodeAddress>>>()?;
        NodeSet::new(nodes)
    }

    /// parses a JSON array of address strings, e.g. `["10.0.0.1:8080","10.0.0.2:8080"]`
    pub fn from_json(json: &str) -> Result<Self> {
        let nodes: Vec<NodeAddress> = serde_json::from_str(json)?;
        NodeSet::new(nodes)
    }

    /// builds a node set from the addresses of a deployment `Nodes.json` file, in file order
    pub fn from_deployment(path: &Path) -> Result<Self> {
        let nodes = read_deployment(path)?
            .into_iter()
            .map(|n| n.address)
            .collect();
        NodeSet::new(nodes)
    }

    /// the bootstrap node
    pub fn bootstrap(&self) -> &NodeAddress {
        &self.nodes[0]
    }

    /// every node except the bootstrap, in order
    pub fn others(&self) -> &[NodeAddress] {
        &self.nodes[1..]
    }

    /// number of nodes, bootstrap included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// always false, a node set holds at least its bootstrap node
    pub fn is_empty(&self) -> bool {
        false
    }

    /// the node at `index`, wrapping around the set (round-robin)
    pub fn round_robin(&self, index: usize) -> &NodeAddress {
        &self.nodes[index % self.nodes.len()]
    }

    /// the first `amount` nodes as a new set; `amount` is clamped to `1..=len`
    pub fn prefix(&self, amount: usize) -> NodeSet {
        let amount = amount.clamp(1, self.nodes.len());
        NodeSet {
            nodes: self.nodes[..amount].to_vec(),
        }
    }

    /// iterates over all nodes, bootstrap first
    pub fn iter(&self) -> std::slice::Iter<'_, NodeAddress> {
        self.nodes.iter()
    }
}

impl<'a> IntoIterator for &'a NodeSet {
    type Item = &'a NodeAddress;
    type IntoIter = std::slice::Iter<'a, NodeAddress>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}
