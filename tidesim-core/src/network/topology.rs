//! Identifiers and addressing for nodes, links and endpoints.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Simulated host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub(crate) usize);

/// Point-to-point link between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkId(pub(crate) usize);

/// Transport endpoint (socket) bound to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EndpointId(pub(crate) usize);

impl NodeId {
    /// Returns the node index.
    pub fn index(self) -> usize {
        self.0
    }
}

impl LinkId {
    /// Returns the link index.
    pub fn index(self) -> usize {
        self.0
    }
}

impl EndpointId {
    /// Returns the endpoint index.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node{}", self.0)
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link{}", self.0)
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ep{}", self.0)
    }
}

/// Transport address: node plus port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address {
    /// Node hosting the endpoint
    pub node: NodeId,
    /// Port the endpoint is bound to
    pub port: u16,
}

impl Address {
    /// Creates an address.
    pub fn new(node: NodeId, port: u16) -> Self {
        Self { node, port }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.port)
    }
}

/// Errors raised while building or addressing the topology.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("Unknown node: {node}")]
    UnknownNode { node: NodeId },

    #[error("Unknown link: {link}")]
    UnknownLink { link: LinkId },

    #[error("Unknown endpoint: {endpoint}")]
    UnknownEndpoint { endpoint: EndpointId },

    #[error("Nodes {a} and {b} are already connected")]
    DuplicateLink { a: NodeId, b: NodeId },

    #[error("Cannot link {node} to itself")]
    SelfLink { node: NodeId },

    #[error("Link data rate must be greater than zero")]
    ZeroDataRate,

    #[error("No direct link from {from} to {to}")]
    NoRoute { from: NodeId, to: NodeId },

    #[error("Address {address} is already in use")]
    AddressInUse { address: Address },

    #[error("{node} has no free ephemeral ports")]
    PortsExhausted { node: NodeId },
}
