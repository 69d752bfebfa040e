//! Finder interface and the event-stream driver.
//!
//! A finder knows how to walk a graph's snarl decomposition bottom-up and
//! report it as a well-nested stream of chain and snarl boundary events.
//! The driver provided here turns that stream into classified snarl
//! records: it keeps a frame per open snarl, buffers child chains, and on
//! each snarl's end event computes connectivity, tip presence, acyclicity,
//! and the final classification over net graphs of the already-classified
//! children.

use std::cell::RefCell;

use crate::algorithms::{find_tips, is_directed_acyclic};
use crate::graph::{Handle, HandleGraph};
use crate::manager::{SnarlManager, SnarlError};
use crate::net_graph::NetGraph;
use crate::types::{NodeTraversal, Snarl, SnarlType};

/// A strategy for finding the nested snarls of a graph.
///
/// Implementors provide [`SnarlFinder::traverse_decomposition`]; the
/// `find_snarls*` drivers are derived from it.
pub trait SnarlFinder {
    /// Visit all snarls and chains bottom-up, including trivial snarls
    /// and single-node empty chains.
    ///
    /// The decomposition is rooted at an implicit global snarl with no
    /// bounding nodes, for which `begin_snarl` is not called, so the
    /// first event is always `begin_chain`. Events are well-nested:
    /// between a snarl's begin and end, zero or more whole chains
    /// appear; between a chain's begin and end, zero or more whole
    /// snarls appear.
    ///
    /// Every start handle faces inward and every end handle faces
    /// outward. Empty chains and cyclic chains deliver the same handle
    /// to `begin_chain` and `end_chain`; they are distinguished by
    /// whether any snarl was reported in between. Snarls are reported
    /// forward relative to their chain.
    fn traverse_decomposition(
        &self,
        begin_chain: &mut dyn FnMut(Handle),
        end_chain: &mut dyn FnMut(Handle),
        begin_snarl: &mut dyn FnMut(Handle),
        end_snarl: &mut dyn FnMut(Handle),
    );

    /// Find all snarls and put them into a manager, without building its
    /// indexes. More snarls can be added before finishing.
    fn find_snarls_unindexed<G: HandleGraph>(&self, graph: &G) -> SnarlManager {
        let state = RefCell::new(DriverState {
            manager: SnarlManager::new(),
            stack: Vec::new(),
        });

        self.traverse_decomposition(
            &mut |handle| state.borrow_mut().begin_chain(handle),
            &mut |handle| state.borrow_mut().end_chain(handle),
            &mut |handle| state.borrow_mut().begin_snarl(handle),
            &mut |handle| state.borrow_mut().end_snarl(handle, graph),
        );

        let state = state.into_inner();
        debug_assert!(state.stack.is_empty(), "unbalanced snarl events");
        state.manager
    }

    /// Find all snarls and put them into a finished manager.
    fn find_snarls<G: HandleGraph>(&self, graph: &G) -> Result<SnarlManager, SnarlError> {
        let mut manager = self.find_snarls_unindexed(graph);
        manager.finish()?;
        Ok(manager)
    }

    /// Find the snarls of weakly connected components, optionally in
    /// parallel. Defaults to the single-threaded implementation.
    fn find_snarls_parallel<G: HandleGraph>(&self, graph: &G) -> Result<SnarlManager, SnarlError> {
        self.find_snarls(graph)
    }
}

/// One open snarl on the traversal stack.
struct Frame {
    /// Inward-facing start boundary.
    start: Handle,
    /// Finished child snarls, grouped by the chain they arrived in.
    child_chains: Vec<Vec<Snarl>>,
    /// Where the currently open chain claimed to start; used to detect
    /// and drop trivial single-node chains.
    current_chain_start: Option<Handle>,
}

/// Shared driver state behind the four event callbacks.
struct DriverState {
    manager: SnarlManager,
    stack: Vec<Frame>,
}

impl DriverState {
    fn begin_chain(&mut self, handle: Handle) {
        if let Some(frame) = self.stack.last_mut() {
            frame.current_chain_start = Some(handle);
            frame.child_chains.push(Vec::new());
        }
    }

    fn end_chain(&mut self, handle: Handle) {
        if let Some(frame) = self.stack.last_mut() {
            if frame.current_chain_start == Some(handle)
                && frame.child_chains.last().is_some_and(Vec::is_empty)
            {
                // A trivial single-node chain: it delivered no snarls,
                // so it contributes nothing. A cyclic chain shares its
                // handles the same way but keeps its snarls.
                frame.child_chains.pop();
            }
        }
    }

    fn begin_snarl(&mut self, handle: Handle) {
        self.stack.push(Frame {
            start: handle,
            child_chains: Vec::new(),
            current_chain_start: None,
        });
    }

    fn end_snarl<G: HandleGraph>(&mut self, handle: Handle, graph: &G) {
        let frame = self.stack.pop().expect("end_snarl without begin_snarl");

        let mut snarl = Snarl::new(
            NodeTraversal::new(frame.start.id(), frame.start.is_reverse()),
            NodeTraversal::new(handle.id(), handle.is_reverse()),
        );

        // Commit the buffered children: they are complete, and only now
        // is their parent known.
        let mut child_chains = frame.child_chains;
        let parent_bounds = snarl.bounds();
        for chain in &mut child_chains {
            for child in chain.iter_mut() {
                child.parent = Some(parent_bounds);
                self.manager.add_snarl(*child);
            }
        }

        // Children are reported forward relative to their chains;
        // regularization may change that later.
        let chains: Vec<Vec<(&Snarl, bool)>> = child_chains
            .iter()
            .map(|chain| chain.iter().map(|child| (child, false)).collect())
            .collect();

        let mut connectivity_net = NetGraph::new(snarl.start, snarl.end, graph, true);
        let mut flat_net = NetGraph::new(snarl.start, snarl.end, graph, false);
        for chain in &chains {
            connectivity_net.add_child(chain);
            flat_net.add_child(chain);
        }

        let (start_start, end_end, start_end) = connectivity(&connectivity_net);
        snarl.start_self_reachable = start_start;
        snarl.end_self_reachable = end_end;
        snarl.start_end_reachable = start_end;

        // Bounding nodes are always tips in the sealed view; more than
        // two means the interior has tips of its own. A unary snarl
        // shares its single bounding node between both ends.
        let tips = find_tips(&flat_net);
        debug_assert!(tips.len() >= 2 || snarl.is_unary());
        let has_internal_tips = tips.len() > 2;

        snarl.directed_acyclic_net_graph = is_directed_acyclic(&flat_net);

        snarl.snarl_type = if snarl.is_unary() {
            // Same start and end node: unary, no matter what the
            // connectivity says.
            SnarlType::Unary
        } else if !snarl.start_end_reachable
            || snarl.start_self_reachable
            || snarl.end_self_reachable
        {
            SnarlType::Unclassified
        } else {
            let all_ultrabubble_children = child_chains
                .iter()
                .flatten()
                .all(|child| child.snarl_type == SnarlType::Ultrabubble);
            if !all_ultrabubble_children
                || has_internal_tips
                || !snarl.directed_acyclic_net_graph
            {
                SnarlType::Unclassified
            } else {
                SnarlType::Ultrabubble
            }
        };

        tracing::debug!(
            snarl = %snarl,
            snarl_type = %snarl.snarl_type,
            start_self = snarl.start_self_reachable,
            end_self = snarl.end_self_reachable,
            through = snarl.start_end_reachable,
            acyclic = snarl.directed_acyclic_net_graph,
            internal_tips = has_internal_tips,
            "classified snarl"
        );

        if let Some(parent) = self.stack.last_mut() {
            parent
                .child_chains
                .last_mut()
                .expect("snarl reported outside of any chain")
                .push(snarl);
        } else {
            // A root snarl has no parent frame to buffer in.
            self.manager.add_snarl(snarl);
        }
    }
}

/// The three connectivity flags of a snarl, from two bounded directed
/// walks in its connectivity net graph: one from the inward start, one
/// from the inward-facing flip of the end.
fn connectivity<G: HandleGraph>(net: &NetGraph<'_, G>) -> (bool, bool, bool) {
    use std::collections::{HashSet, VecDeque};

    let start_handle = net.start();
    let end_handle = net.end();

    let mut start_start = false;
    let mut end_end = false;
    let mut start_end = false;

    let mut queue: VecDeque<Handle> = VecDeque::new();
    let mut queued: HashSet<Handle> = HashSet::new();
    queue.push_back(start_handle);
    queued.insert(start_handle);

    while let Some(here) = queue.pop_front() {
        if here == end_handle {
            start_end = true;
        }
        if here == start_handle.flip() {
            start_start = true;
        }
        if start_end && start_start {
            break;
        }
        net.follow_edges(here, false, |next| {
            if queued.insert(next) {
                queue.push_back(next);
            }
            true
        });
    }

    let end_inward = end_handle.flip();
    queue.clear();
    queued.clear();
    queue.push_back(end_inward);
    queued.insert(end_inward);

    while let Some(here) = queue.pop_front() {
        if here == end_handle {
            end_end = true;
            break;
        }
        net.follow_edges(here, false, |next| {
            if queued.insert(next) {
                queue.push_back(next);
            }
            true
        });
    }

    (start_start, end_end, start_end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemoryGraph;
    use crate::types::NodeId;

    /// One decomposition event.
    #[derive(Debug, Clone, Copy)]
    enum Event {
        BeginChain(Handle),
        EndChain(Handle),
        BeginSnarl(Handle),
        EndSnarl(Handle),
    }

    /// A finder that replays a fixed event stream; stands in for a real
    /// boundary-walking event source.
    struct ScriptedFinder {
        events: Vec<Event>,
    }

    impl SnarlFinder for ScriptedFinder {
        fn traverse_decomposition(
            &self,
            begin_chain: &mut dyn FnMut(Handle),
            end_chain: &mut dyn FnMut(Handle),
            begin_snarl: &mut dyn FnMut(Handle),
            end_snarl: &mut dyn FnMut(Handle),
        ) {
            for event in &self.events {
                match *event {
                    Event::BeginChain(handle) => begin_chain(handle),
                    Event::EndChain(handle) => end_chain(handle),
                    Event::BeginSnarl(handle) => begin_snarl(handle),
                    Event::EndSnarl(handle) => end_snarl(handle),
                }
            }
        }
    }

    fn h(id: u64, reverse: bool) -> Handle {
        Handle::new(NodeId::new(id), reverse)
    }

    fn bubble_graph() -> MemoryGraph {
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

    fn bubble_events() -> Vec<Event> {
        vec![
            Event::BeginChain(h(1, false)),
            Event::BeginSnarl(h(1, false)),
            // The interior nodes are trivial single-node chains.
            Event::BeginChain(h(2, false)),
            Event::EndChain(h(2, false)),
            Event::BeginChain(h(3, false)),
            Event::EndChain(h(3, false)),
            Event::EndSnarl(h(4, false)),
            Event::EndChain(h(4, false)),
        ]
    }

    #[test]
    fn test_single_bubble_is_ultrabubble() {
        let graph = bubble_graph();
        let finder = ScriptedFinder {
            events: bubble_events(),
        };
        let manager = finder.find_snarls(&graph).unwrap();

        assert_eq!(manager.num_snarls(), 1);
        let root = manager.children_of(None)[0];
        let snarl = manager.snarl(root);
        assert_eq!(snarl.snarl_type, SnarlType::Ultrabubble);
        assert!(snarl.start_end_reachable);
        assert!(!snarl.start_self_reachable);
        assert!(!snarl.end_self_reachable);
        assert!(snarl.directed_acyclic_net_graph);
    }

    #[test]
    fn test_empty_chains_contribute_nothing() {
        let graph = bubble_graph();
        let finder = ScriptedFinder {
            events: bubble_events(),
        };
        let manager = finder.find_snarls(&graph).unwrap();
        // Only the bubble itself was recorded; the trivial chains on
        // nodes 2 and 3 left nothing behind.
        assert_eq!(manager.num_snarls(), 1);
        assert!(manager.is_leaf(manager.children_of(None)[0]));
    }

    #[test]
    fn test_parallel_default_matches_serial() {
        let graph = bubble_graph();
        let finder = ScriptedFinder {
            events: bubble_events(),
        };
        let serial = finder.find_snarls(&graph).unwrap();
        let parallel = finder.find_snarls_parallel(&graph).unwrap();
        assert_eq!(serial.num_snarls(), parallel.num_snarls());
        assert_eq!(
            serial.snarl(serial.children_of(None)[0]),
            parallel.snarl(parallel.children_of(None)[0])
        );
    }

    #[test]
    fn test_start_self_loop_is_unclassified() {
        // Inside 1 -> 4, node 2 connects back to the reverse of 1.
        let mut graph = bubble_graph();
        graph.add_edge(h(2, false), h(1, true));
        let finder = ScriptedFinder {
            events: bubble_events(),
        };
        let manager = finder.find_snarls(&graph).unwrap();

        let root = manager.children_of(None)[0];
        let snarl = manager.snarl(root);
        assert!(snarl.start_self_reachable);
        assert_eq!(snarl.snarl_type, SnarlType::Unclassified);
    }

    #[test]
    fn test_unary_snarl_reported_unary_regardless_of_connectivity() {
        // A dead-end pocket off node 1: 1+ .. back to 1-.
        let mut graph = MemoryGraph::new();
        for id in 1..=3 {
            graph.add_node(NodeId::new(id), "A");
        }
        graph.add_edge(h(1, false), h(2, false));
        graph.add_edge(h(2, false), h(3, false));
        graph.add_edge(h(3, false), h(1, true));

        let finder = ScriptedFinder {
            events: vec![
                Event::BeginChain(h(1, false)),
                Event::BeginSnarl(h(1, false)),
                Event::BeginChain(h(2, false)),
                Event::EndChain(h(2, false)),
                Event::BeginChain(h(3, false)),
                Event::EndChain(h(3, false)),
                Event::EndSnarl(h(1, true)),
                Event::EndChain(h(1, true)),
            ],
        };
        let manager = finder.find_snarls(&graph).unwrap();
        let root = manager.children_of(None)[0];
        assert_eq!(manager.snarl(root).snarl_type, SnarlType::Unary);
        assert!(manager.snarl(root).is_unary());
    }
}
