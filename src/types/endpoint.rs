//! Oriented boundary primitives.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a node in the backing graph.
///
/// Wraps the integer id and implements `Ord` for deterministic ordering.
/// Node ids are strictly positive; 0 is reserved as an absent-node marker
/// inside [`Visit`](super::Visit) ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(u64);

impl NodeId {
    /// Create a new NodeId from a raw integer id.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner integer id.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// An oriented attachment point on a node: one of the node's two sides.
///
/// Comparisons are lexicographic on `(node, facing_reverse)`, so endpoint
/// sets and maps iterate deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// The node the endpoint sits on.
    pub node: NodeId,
    /// Which side of the node: `false` for the local-forward side,
    /// `true` for the reverse side.
    pub facing_reverse: bool,
}

impl Endpoint {
    /// Create a new endpoint.
    pub fn new(node: NodeId, facing_reverse: bool) -> Self {
        Self { node, facing_reverse }
    }

    /// The same node's opposite side.
    pub fn flipped(&self) -> Self {
        Self {
            node: self.node,
            facing_reverse: !self.facing_reverse,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.node, if self.facing_reverse { "R" } else { "L" })
    }
}

/// An oriented pass through a single node.
///
/// This is the form snarl boundaries are stored in: a snarl's start
/// traverses its boundary node facing into the snarl, and its end
/// traverses the other boundary node facing out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeTraversal {
    /// The node being traversed.
    pub node: NodeId,
    /// Whether the node is traversed against its intrinsic orientation.
    pub backward: bool,
}

impl NodeTraversal {
    /// Create a new node traversal.
    pub fn new(node: NodeId, backward: bool) -> Self {
        Self { node, backward }
    }

    /// The same node traversed the other way.
    pub fn reversed(&self) -> Self {
        Self {
            node: self.node,
            backward: !self.backward,
        }
    }
}

impl fmt::Display for NodeTraversal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.node, if self.backward { "-" } else { "+" })
    }
}
