//! Snarl records and their classification.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use super::endpoint::NodeTraversal;
use super::visit::SnarlBounds;

/// Classification of a snarl's shape and connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SnarlType {
    /// Not (or not yet) known to be anything more specific.
    Unclassified,
    /// Connected through, acyclic, tip-free, with only ultrabubble
    /// children.
    Ultrabubble,
    /// Start and end are the same node in opposite orientations.
    Unary,
}

impl Default for SnarlType {
    fn default() -> Self {
        Self::Unclassified
    }
}

impl fmt::Display for SnarlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unclassified => write!(f, "unclassified"),
            Self::Ultrabubble => write!(f, "ultrabubble"),
            Self::Unary => write!(f, "unary"),
        }
    }
}

/// A snarl: a subgraph bounded by two oriented node traversals whose
/// removal disconnects the interior from the rest of the graph.
///
/// `start` faces into the snarl; `end` faces out. The optional `parent`
/// carries the boundary pair of the enclosing snarl for pre-classified
/// input; the manager resolves it into tree links during `finish`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Snarl {
    /// Inward-facing traversal of the start boundary node.
    pub start: NodeTraversal,
    /// Outward-facing traversal of the end boundary node.
    pub end: NodeTraversal,
    /// Boundary pair of the enclosing snarl, if any.
    pub parent: Option<SnarlBounds>,
    /// Shape classification.
    pub snarl_type: SnarlType,
    /// Whether a directed walk in from the start can come back out of the
    /// start.
    pub start_self_reachable: bool,
    /// Whether a directed walk in from the end can come back out of the
    /// end.
    pub end_self_reachable: bool,
    /// Whether a directed walk in from the start can leave through the
    /// end.
    pub start_end_reachable: bool,
    /// Whether the flat net graph over this snarl's interior is acyclic.
    pub directed_acyclic_net_graph: bool,
}

impl Snarl {
    /// Create a new snarl with the given bounds, unclassified and with
    /// all connectivity flags unset.
    pub fn new(start: NodeTraversal, end: NodeTraversal) -> Self {
        Self {
            start,
            end,
            parent: None,
            snarl_type: SnarlType::Unclassified,
            start_self_reachable: false,
            end_self_reachable: false,
            start_end_reachable: false,
            directed_acyclic_net_graph: false,
        }
    }

    /// The boundary pair of this snarl.
    pub fn bounds(&self) -> SnarlBounds {
        SnarlBounds::new(self.start, self.end)
    }

    /// True if the start and end share a node, the defining property of a
    /// unary snarl.
    pub fn is_unary(&self) -> bool {
        self.start.node == self.end.node
    }
}

// A snarl sorts by type, then start, then end, then parent; connectivity
// flags break remaining ties so the order stays consistent with equality.
impl Ord for Snarl {
    fn cmp(&self, other: &Self) -> Ordering {
        self.snarl_type
            .cmp(&other.snarl_type)
            .then_with(|| self.start.cmp(&other.start))
            .then_with(|| self.end.cmp(&other.end))
            .then_with(|| self.parent.cmp(&other.parent))
            .then_with(|| {
                let flags = |s: &Snarl| {
                    (
                        s.start_self_reachable,
                        s.end_self_reachable,
                        s.start_end_reachable,
                        s.directed_acyclic_net_graph,
                    )
                };
                flags(self).cmp(&flags(other))
            })
    }
}

impl PartialOrd for Snarl {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Snarl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.start, self.end)
    }
}
