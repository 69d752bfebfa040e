//! Visits: oriented references to nodes or child snarls.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use super::endpoint::{Endpoint, NodeId, NodeTraversal};
use crate::graph::{Edge, Handle, HandleGraph};

/// The boundary pair of a snarl, as carried inside snarl-visits and
/// parent references.
///
/// `start` faces into the snarl and `end` faces out of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SnarlBounds {
    /// Inward-facing traversal of the start boundary node.
    pub start: NodeTraversal,
    /// Outward-facing traversal of the end boundary node.
    pub end: NodeTraversal,
}

impl SnarlBounds {
    /// Create a new boundary pair.
    pub fn new(start: NodeTraversal, end: NodeTraversal) -> Self {
        Self { start, end }
    }
}

impl fmt::Display for SnarlBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// What a visit refers to: a single node or a whole child snarl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VisitTarget {
    /// A node of the backing graph.
    Node(NodeId),
    /// A child snarl, identified by its boundary pair.
    Snarl(SnarlBounds),
}

/// A reference to either a node traversal or a snarl traversal.
///
/// The `backward` bit means "traverse the target in reverse". The left
/// side of a forward node visit is the node's forward side; the left side
/// of a forward snarl visit is the left side of the snarl's start, and so
/// on (see [`Visit::to_left_side`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Visit {
    /// The node or snarl being visited.
    pub target: VisitTarget,
    /// Whether the target is traversed in reverse.
    pub backward: bool,
}

impl Visit {
    /// Visit a node in the given orientation.
    pub fn node(node: NodeId, backward: bool) -> Self {
        Self {
            target: VisitTarget::Node(node),
            backward,
        }
    }

    /// Visit a snarl, identified by its bounds, in the given orientation.
    pub fn snarl(bounds: SnarlBounds, backward: bool) -> Self {
        Self {
            target: VisitTarget::Snarl(bounds),
            backward,
        }
    }

    /// The node id, if this is a node visit.
    pub fn node_id(&self) -> Option<NodeId> {
        match self.target {
            VisitTarget::Node(id) => Some(id),
            VisitTarget::Snarl(_) => None,
        }
    }

    /// The snarl bounds, if this is a snarl visit.
    pub fn bounds(&self) -> Option<SnarlBounds> {
        match self.target {
            VisitTarget::Node(_) => None,
            VisitTarget::Snarl(bounds) => Some(bounds),
        }
    }

    /// True if this visit refers to a snarl rather than a node.
    pub fn is_snarl(&self) -> bool {
        matches!(self.target, VisitTarget::Snarl(_))
    }

    /// The same visit traversed the other way.
    pub fn reverse(&self) -> Self {
        Self {
            target: self.target,
            backward: !self.backward,
        }
    }

    /// The endpoint this visit is entered through.
    ///
    /// For a node visit this is the side given by the `backward` bit. For
    /// a forward snarl visit it is the left side of the snarl's start; for
    /// a reverse snarl visit, the right side of the snarl's end.
    pub fn to_left_side(&self) -> Endpoint {
        match self.target {
            VisitTarget::Node(id) => Endpoint::new(id, self.backward),
            VisitTarget::Snarl(bounds) => {
                if self.backward {
                    // Right side of the end traversal.
                    Endpoint::new(bounds.end.node, !bounds.end.backward)
                } else {
                    // Left side of the start traversal.
                    Endpoint::new(bounds.start.node, bounds.start.backward)
                }
            }
        }
    }

    /// The endpoint this visit is left through. Symmetric to
    /// [`Visit::to_left_side`].
    pub fn to_right_side(&self) -> Endpoint {
        match self.target {
            VisitTarget::Node(id) => Endpoint::new(id, !self.backward),
            VisitTarget::Snarl(bounds) => {
                if self.backward {
                    Endpoint::new(bounds.start.node, bounds.start.backward)
                } else {
                    Endpoint::new(bounds.end.node, !bounds.end.backward)
                }
            }
        }
    }
}

/// Resolve the edge crossed when moving from `v1` to `v2`, using the
/// outgoing side of `v1` and the incoming side of `v2`, canonicalized
/// through the graph's [`HandleGraph::edge_handle`].
pub fn to_edge<G: HandleGraph>(graph: &G, v1: &Visit, v2: &Visit) -> Edge {
    let (prev_id, prev_back) = match v1.target {
        VisitTarget::Node(id) => (id, v1.backward),
        VisitTarget::Snarl(bounds) => {
            if v1.backward {
                (bounds.start.node, !bounds.start.backward)
            } else {
                (bounds.end.node, bounds.end.backward)
            }
        }
    };

    let (cur_id, cur_back) = match v2.target {
        VisitTarget::Node(id) => (id, v2.backward),
        VisitTarget::Snarl(bounds) => {
            if v2.backward {
                (bounds.end.node, !bounds.end.backward)
            } else {
                (bounds.start.node, bounds.start.backward)
            }
        }
    };

    graph.edge_handle(Handle::new(prev_id, prev_back), Handle::new(cur_id, cur_back))
}

// Lexicographic on (node id, inner snarl, backward), with snarl-visits
// carrying node id 0. Cross-language clients depend on this order.
impl Ord for Visit {
    fn cmp(&self, other: &Self) -> Ordering {
        let node_key = |v: &Visit| v.node_id().unwrap_or(NodeId::new(0));
        node_key(self)
            .cmp(&node_key(other))
            .then_with(|| self.bounds().cmp(&other.bounds()))
            .then_with(|| self.backward.cmp(&other.backward))
    }
}

impl PartialOrd for Visit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Visit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target {
            VisitTarget::Node(id) => {
                write!(f, "{}{}", id, if self.backward { "-" } else { "+" })
            }
            VisitTarget::Snarl(bounds) => {
                write!(f, "[{}]{}", bounds, if self.backward { "-" } else { "+" })
            }
        }
    }
}
