//! Backing-graph contract.
//!
//! The kernel never owns the sequence graph it analyzes. It consumes a
//! read-only bidirected graph through the [`HandleGraph`] trait: node
//! existence, oriented handles, and neighbor enumeration. Sequence and
//! length access are optional; structural views refuse them.

pub mod memory;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::NodeId;

pub use memory::MemoryGraph;

/// Error type for graph operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GraphError {
    /// The operation is not supported by this graph view.
    #[error("{0} is not supported by this graph view")]
    Unsupported(&'static str),
    /// A requested node is not present in the graph.
    #[error("node not found: {0}")]
    UnknownNode(NodeId),
    /// The handle does not represent a child chain or unary snarl.
    #[error("handle {0} does not represent a child chain or unary snarl")]
    NotAChild(Handle),
    /// The handle does not read into a child chain or unary snarl.
    #[error("handle {0} does not read into a child chain or unary snarl")]
    NotAChildBoundary(Handle),
}

/// Orientation-carrying reference to one node of a bidirected graph.
///
/// Packed as `node_id << 1 | is_reverse`, so handle order is lexicographic
/// on `(node, orientation)` and flipping is a single bit toggle.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Handle(u64);

impl Handle {
    /// Build a handle for a node in the given orientation.
    pub fn new(node: NodeId, is_reverse: bool) -> Self {
        Self((node.as_u64() << 1) | is_reverse as u64)
    }

    /// The node this handle refers to.
    pub fn id(&self) -> NodeId {
        NodeId::new(self.0 >> 1)
    }

    /// Whether the handle reads the node against its intrinsic
    /// orientation.
    pub fn is_reverse(&self) -> bool {
        self.0 & 1 == 1
    }

    /// The same node read the other way.
    pub fn flip(&self) -> Self {
        Self(self.0 ^ 1)
    }

    /// The same node in its forward orientation.
    pub fn forward(&self) -> Self {
        Self(self.0 & !1)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({self})")
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.id(), if self.is_reverse() { "-" } else { "+" })
    }
}

/// An edge between two oriented handles.
///
/// Construction canonicalizes the pair so that `(u, v)` and
/// `(v̄, ū)` — the same bidirected edge read from either direction —
/// produce an identical value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Edge(Handle, Handle);

impl Edge {
    /// Canonicalize and build the edge from `left` into `right`.
    pub fn new(left: Handle, right: Handle) -> Self {
        let flipped = (right.flip(), left.flip());
        if flipped < (left, right) {
            Self(flipped.0, flipped.1)
        } else {
            Self(left, right)
        }
    }

    /// The canonical handle pair.
    pub fn handles(&self) -> (Handle, Handle) {
        (self.0, self.1)
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.0, self.1)
    }
}

/// A read-only bidirected graph.
///
/// Implementations must enumerate deterministically: the same graph state
/// must yield the same iteration order. All enumeration callbacks return
/// `bool` meaning "keep going"; enumerators return `true` when they ran
/// to completion and `false` when the callback stopped them.
pub trait HandleGraph {
    /// Whether a node with this id exists.
    fn has_node(&self, node: NodeId) -> bool;

    /// Number of nodes in the graph.
    fn node_count(&self) -> usize;

    /// Smallest node id present.
    fn min_node_id(&self) -> NodeId;

    /// Largest node id present.
    fn max_node_id(&self) -> NodeId;

    /// Enumerate the handles adjacent to `handle` on its right
    /// (`go_left == false`) or left (`go_left == true`) side.
    fn follow_edges(&self, handle: Handle, go_left: bool, visitor: impl FnMut(Handle) -> bool)
        -> bool;

    /// Enumerate every node once, in its forward orientation.
    fn for_each_handle(&self, visitor: impl FnMut(Handle) -> bool) -> bool;

    /// The sequence of the node, in the handle's orientation. Optional.
    fn sequence(&self, _handle: Handle) -> Result<Vec<u8>, GraphError> {
        Err(GraphError::Unsupported("sequence"))
    }

    /// The length of the node's sequence. Optional.
    fn length(&self, _handle: Handle) -> Result<usize, GraphError> {
        Err(GraphError::Unsupported("length"))
    }

    /// Canonical edge between two oriented handles; `(u, v)` and
    /// `(v̄, ū)` canonicalize identically.
    fn edge_handle(&self, left: Handle, right: Handle) -> Edge {
        Edge::new(left, right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_packing() {
        let h = Handle::new(NodeId::new(42), true);
        assert_eq!(h.id(), NodeId::new(42));
        assert!(h.is_reverse());
        assert_eq!(h.flip().flip(), h);
        assert!(!h.forward().is_reverse());
        assert_eq!(h.forward().id(), NodeId::new(42));
    }

    #[test]
    fn test_handle_ordering() {
        let a = Handle::new(NodeId::new(1), false);
        let b = Handle::new(NodeId::new(1), true);
        let c = Handle::new(NodeId::new(2), false);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_edge_canonicalization() {
        let u = Handle::new(NodeId::new(3), false);
        let v = Handle::new(NodeId::new(1), true);
        // The edge and its mirror collapse to one value.
        assert_eq!(Edge::new(u, v), Edge::new(v.flip(), u.flip()));
        // Self-inverse edges survive canonicalization.
        let w = Handle::new(NodeId::new(5), false);
        assert_eq!(Edge::new(w, w.flip()), Edge::new(w, w.flip()));
    }
}
