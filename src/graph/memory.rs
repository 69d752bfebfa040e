//! In-memory bidirected graph for testing.

use std::collections::{BTreeMap, BTreeSet};

use super::{Edge, GraphError, Handle, HandleGraph};
use crate::types::NodeId;

/// In-memory bidirected graph.
///
/// Uses BTreeMap/BTreeSet so iteration order is deterministic. Adjacency
/// is stored once per orientation: the right-side neighbors of a handle;
/// left-side walks read the mirror entry.
#[derive(Debug, Clone, Default)]
pub struct MemoryGraph {
    /// Sequences by node id.
    sequences: BTreeMap<NodeId, Vec<u8>>,
    /// Right-side neighbors of each oriented handle.
    neighbors_right: BTreeMap<Handle, BTreeSet<Handle>>,
    /// All edges, canonicalized.
    edges: BTreeSet<Edge>,
}

impl MemoryGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node with the given sequence.
    pub fn add_node(&mut self, node: NodeId, sequence: impl Into<Vec<u8>>) {
        self.sequences.insert(node, sequence.into());
    }

    /// Add an edge from the right side of `from` to the left side of
    /// `to`, along with its mirror.
    pub fn add_edge(&mut self, from: Handle, to: Handle) {
        self.neighbors_right.entry(from).or_default().insert(to);
        self.neighbors_right
            .entry(to.flip())
            .or_default()
            .insert(from.flip());
        self.edges.insert(Edge::new(from, to));
    }

    /// Number of distinct edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// All edges in canonical form.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }
}

impl HandleGraph for MemoryGraph {
    fn has_node(&self, node: NodeId) -> bool {
        self.sequences.contains_key(&node)
    }

    fn node_count(&self) -> usize {
        self.sequences.len()
    }

    fn min_node_id(&self) -> NodeId {
        self.sequences
            .keys()
            .next()
            .copied()
            .unwrap_or(NodeId::new(0))
    }

    fn max_node_id(&self) -> NodeId {
        self.sequences
            .keys()
            .next_back()
            .copied()
            .unwrap_or(NodeId::new(0))
    }

    fn follow_edges(
        &self,
        handle: Handle,
        go_left: bool,
        mut visitor: impl FnMut(Handle) -> bool,
    ) -> bool {
        if go_left {
            // Left neighbors are the mirrored right neighbors of the flip.
            if let Some(set) = self.neighbors_right.get(&handle.flip()) {
                for next in set {
                    if !visitor(next.flip()) {
                        return false;
                    }
                }
            }
        } else if let Some(set) = self.neighbors_right.get(&handle) {
            for next in set {
                if !visitor(*next) {
                    return false;
                }
            }
        }
        true
    }

    fn for_each_handle(&self, mut visitor: impl FnMut(Handle) -> bool) -> bool {
        for node in self.sequences.keys() {
            if !visitor(Handle::new(*node, false)) {
                return false;
            }
        }
        true
    }

    fn sequence(&self, handle: Handle) -> Result<Vec<u8>, GraphError> {
        let seq = self
            .sequences
            .get(&handle.id())
            .ok_or(GraphError::UnknownNode(handle.id()))?;
        if handle.is_reverse() {
            Ok(reverse_complement(seq))
        } else {
            Ok(seq.clone())
        }
    }

    fn length(&self, handle: Handle) -> Result<usize, GraphError> {
        self.sequences
            .get(&handle.id())
            .map(Vec::len)
            .ok_or(GraphError::UnknownNode(handle.id()))
    }
}

fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter()
        .rev()
        .map(|base| match base {
            b'A' => b'T',
            b'T' => b'A',
            b'C' => b'G',
            b'G' => b'C',
            b'a' => b't',
            b't' => b'a',
            b'c' => b'g',
            b'g' => b'c',
            other => *other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(id: u64, reverse: bool) -> Handle {
        Handle::new(NodeId::new(id), reverse)
    }

    fn collect_neighbors(graph: &MemoryGraph, handle: Handle, go_left: bool) -> Vec<Handle> {
        let mut out = Vec::new();
        graph.follow_edges(handle, go_left, |next| {
            out.push(next);
            true
        });
        out
    }

    fn diamond() -> MemoryGraph {
        // 1 -> {2, 3} -> 4
        let mut graph = MemoryGraph::new();
        for id in 1..=4 {
            graph.add_node(NodeId::new(id), "A");
        }
        graph.add_edge(h(1, false), h(2, false));
        graph.add_edge(h(1, false), h(3, false));
        graph.add_edge(h(2, false), h(4, false));
        graph.add_edge(h(3, false), h(4, false));
        graph
    }

    #[test]
    fn test_follow_edges_right() {
        let graph = diamond();
        assert_eq!(
            collect_neighbors(&graph, h(1, false), false),
            vec![h(2, false), h(3, false)]
        );
        assert!(collect_neighbors(&graph, h(4, false), false).is_empty());
    }

    #[test]
    fn test_follow_edges_left_mirrors_right() {
        let graph = diamond();
        assert_eq!(
            collect_neighbors(&graph, h(4, false), true),
            vec![h(2, false), h(3, false)]
        );
        // Walking right from the reverse of 4 sees the same nodes flipped.
        assert_eq!(
            collect_neighbors(&graph, h(4, true), false),
            vec![h(2, true), h(3, true)]
        );
    }

    #[test]
    fn test_reverse_edge_attachment() {
        // An inversion edge: right of 1 to the end side of 2.
        let mut graph = MemoryGraph::new();
        graph.add_node(NodeId::new(1), "A");
        graph.add_node(NodeId::new(2), "C");
        graph.add_edge(h(1, false), h(2, true));

        assert_eq!(collect_neighbors(&graph, h(1, false), false), vec![h(2, true)]);
        // The mirror: from 2 forward you can reach 1 reverse.
        assert_eq!(collect_neighbors(&graph, h(2, false), false), vec![h(1, true)]);
    }

    #[test]
    fn test_early_stop() {
        let graph = diamond();
        let mut seen = 0;
        let finished = graph.follow_edges(h(1, false), false, |_| {
            seen += 1;
            false
        });
        assert!(!finished);
        assert_eq!(seen, 1);
    }

    #[test]
    fn test_sequence_orientation() {
        let mut graph = MemoryGraph::new();
        graph.add_node(NodeId::new(1), "GATT");
        assert_eq!(graph.sequence(h(1, false)).unwrap(), b"GATT");
        assert_eq!(graph.sequence(h(1, true)).unwrap(), b"AATC");
        assert_eq!(graph.length(h(1, true)).unwrap(), 4);
    }

    #[test]
    fn test_node_bounds() {
        let graph = diamond();
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.min_node_id(), NodeId::new(1));
        assert_eq!(graph.max_node_id(), NodeId::new(4));
    }
}
