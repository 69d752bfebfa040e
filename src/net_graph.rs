//! Net graphs: a flat view of one snarl's interior.
//!
//! A net graph presents the contents of a snarl as an ordinary
//! [`HandleGraph`] in which every child chain and every unary child snarl
//! collapses to a single meta-node, while edges at the snarl boundary and
//! between interior nodes stay honest. The view is sealed: walking out of
//! the bounding handles yields nothing.
//!
//! A chain is represented by the backing-graph handle reading into its
//! first snarl's start. Edges that arrive at the chain's far end are
//! renamed to the near-end representative so the whole chain looks like
//! one node. A unary child is represented by its single inward boundary
//! handle.
//!
//! With internal connectivity enabled, each meta-node carries a
//! [`Connectivity`] triple and the neighbor walk fakes the edges a
//! traverser could actually use: pass-through edges, left turnarounds,
//! and right turnarounds.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::graph::{GraphError, Handle, HandleGraph};
use crate::types::{NodeId, NodeTraversal, Snarl};

/// Whether a child can be used to turn around at its left, turn around
/// at its right, or be passed through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Connectivity {
    /// Enter on the left, come back out on the left.
    pub left_left: bool,
    /// Enter on the right, come back out on the right.
    pub right_right: bool,
    /// Enter on the left, leave on the right.
    pub left_right: bool,
}

/// A virtual graph over the interior of one snarl.
///
/// Borrows the backing graph; child chains and unary snarls are copied
/// into small index maps at registration time, so the view stays valid as
/// long as the backing graph does.
pub struct NetGraph<'g, G: HandleGraph> {
    graph: &'g G,
    /// Inward-facing bounding handle at the snarl's start.
    start: Handle,
    /// Outward-facing bounding handle at the snarl's end.
    end: Handle,
    use_internal_connectivity: bool,
    /// Inward boundary handles of unary children.
    unary_boundaries: HashSet<Handle>,
    /// Handle arriving at a chain's far end, mapped to the handle
    /// arriving at its near end. Used to rename emitted edges.
    chain_end_rewrites: HashMap<Handle, Handle>,
    /// Inward chain start handle to inward chain end handle.
    chain_ends_by_start: HashMap<Handle, Handle>,
    /// Per-meta-node connectivity, keyed by the representative's node id.
    connectivity: HashMap<NodeId, Connectivity>,
}

impl<'g, G: HandleGraph> NetGraph<'g, G> {
    /// Make a net graph for the snarl bounded by `start` (inward) and
    /// `end` (outward), with no children registered yet.
    pub fn new(
        start: NodeTraversal,
        end: NodeTraversal,
        graph: &'g G,
        use_internal_connectivity: bool,
    ) -> Self {
        Self {
            graph,
            start: Handle::new(start.node, start.backward),
            end: Handle::new(end.node, end.backward),
            use_internal_connectivity,
            unary_boundaries: HashSet::new(),
            chain_end_rewrites: HashMap::new(),
            chain_ends_by_start: HashMap::new(),
            connectivity: HashMap::new(),
        }
    }

    /// Register a child chain, dispatching single-snarl unary chains to
    /// the unary index.
    pub fn add_child(&mut self, chain: &[(&Snarl, bool)]) {
        if chain.len() == 1 && chain[0].0.is_unary() {
            self.add_unary_child(chain[0].0);
        } else {
            self.add_chain_child(chain);
        }
    }

    /// Register a unary child snarl.
    pub fn add_unary_child(&mut self, unary: &Snarl) {
        let boundary = Handle::new(unary.start.node, unary.start.backward);

        debug_assert_eq!(unary.end.node, unary.start.node);
        debug_assert_eq!(unary.end.backward, !unary.start.backward);

        self.unary_boundaries.insert(boundary);
        tracing::debug!(boundary = %boundary, "registered unary child");

        let connectivity = if self.use_internal_connectivity {
            Connectivity {
                left_left: unary.start_self_reachable,
                right_right: unary.end_self_reachable,
                left_right: unary.start_end_reachable,
            }
        } else {
            // An ordinary node with a distinct other side: no
            // pass-through either, because a real unary snarl's two
            // "sides" are the same node.
            Connectivity::default()
        };
        self.connectivity.insert(boundary.id(), connectivity);
    }

    /// Register a chain of one or more non-unary child snarls, in the
    /// orientations they take within the chain.
    pub fn add_chain_child(&mut self, chain: &[(&Snarl, bool)]) {
        let (first, first_backward) = chain.first().expect("chain child must not be empty");
        let (last, last_backward) = chain.last().expect("chain child must not be empty");

        let start_visit = if *first_backward {
            first.end.reversed()
        } else {
            first.start
        };
        let end_visit = if *last_backward {
            last.start.reversed()
        } else {
            last.end
        };

        let chain_start = Handle::new(start_visit.node, start_visit.backward);
        let chain_end = Handle::new(end_visit.node, end_visit.backward);

        self.chain_ends_by_start.insert(chain_start, chain_end);
        self.chain_end_rewrites
            .insert(chain_end.flip(), chain_start.flip());
        tracing::debug!(start = %chain_start, end = %chain_end, "registered child chain");

        let connectivity = if self.use_internal_connectivity {
            let mut left_left = false;
            let mut right_right = false;
            let mut left_right = true;

            for (child, backward) in chain {
                let (mut start_self, mut end_self) =
                    (child.start_self_reachable, child.end_self_reachable);
                if *backward {
                    std::mem::swap(&mut start_self, &mut end_self);
                }
                if start_self {
                    left_left = true;
                }
                if !child.start_end_reachable {
                    // This child blocks the way through; turnarounds
                    // past it are unreachable from the left.
                    left_right = false;
                    break;
                }
            }

            for (child, backward) in chain.iter().rev() {
                let (mut start_self, mut end_self) =
                    (child.start_self_reachable, child.end_self_reachable);
                if *backward {
                    std::mem::swap(&mut start_self, &mut end_self);
                }
                if end_self {
                    right_right = true;
                    break;
                }
                if !child.start_end_reachable {
                    break;
                }
            }

            Connectivity {
                left_left,
                right_right,
                left_right,
            }
        } else {
            // Act like a normal connected-through node.
            Connectivity {
                left_left: false,
                right_right: false,
                left_right: true,
            }
        };
        self.connectivity.insert(chain_start.id(), connectivity);
    }

    /// The inward-facing start handle bounding this net graph.
    pub fn start(&self) -> Handle {
        self.start
    }

    /// The outward-facing end handle bounding this net graph.
    pub fn end(&self) -> Handle {
        self.end
    }

    /// True if the handle represents a child chain or unary child snarl
    /// rather than an ordinary interior node.
    pub fn is_child(&self, handle: Handle) -> bool {
        self.chain_ends_by_start.contains_key(&handle)
            || self.chain_ends_by_start.contains_key(&handle.flip())
            || self.unary_boundaries.contains(&handle)
    }

    /// The backing-graph handle reading into the child represented by
    /// `child_handle`, in the orientation the handle represents.
    pub fn get_inward_backing_handle(&self, child_handle: Handle) -> Result<Handle, GraphError> {
        if self.chain_ends_by_start.contains_key(&child_handle) {
            Ok(child_handle)
        } else if let Some(&chain_end) = self.chain_ends_by_start.get(&child_handle.flip()) {
            // Reading the chain backward enters through its far end.
            Ok(chain_end.flip())
        } else if self.unary_boundaries.contains(&child_handle) {
            Ok(child_handle)
        } else {
            Err(GraphError::NotAChild(child_handle))
        }
    }

    /// The meta-node handle representing the child that
    /// `backing_handle` reads into.
    pub fn get_handle_from_inward_backing_handle(
        &self,
        backing_handle: Handle,
    ) -> Result<Handle, GraphError> {
        if self.chain_ends_by_start.contains_key(&backing_handle) {
            Ok(backing_handle)
        } else if let Some(&near) = self.chain_end_rewrites.get(&backing_handle) {
            Ok(near)
        } else if self.unary_boundaries.contains(&backing_handle) {
            Ok(backing_handle)
        } else {
            Err(GraphError::NotAChildBoundary(backing_handle))
        }
    }
}

impl<G: HandleGraph> HandleGraph for NetGraph<'_, G> {
    fn has_node(&self, node: NodeId) -> bool {
        self.graph.has_node(node)
    }

    fn node_count(&self) -> usize {
        let mut count = 0;
        self.for_each_handle(|_| {
            count += 1;
            true
        });
        count
    }

    fn min_node_id(&self) -> NodeId {
        let mut winner = NodeId::new(u64::MAX);
        self.for_each_handle(|handle| {
            winner = winner.min(handle.id());
            true
        });
        winner
    }

    fn max_node_id(&self) -> NodeId {
        let mut winner = NodeId::new(0);
        self.for_each_handle(|handle| {
            winner = winner.max(handle.id());
            true
        });
        winner
    }

    fn follow_edges(
        &self,
        handle: Handle,
        go_left: bool,
        mut visitor: impl FnMut(Handle) -> bool,
    ) -> bool {
        // The start and end of a chain may reach the same neighbor, so
        // emitted handles are deduplicated after the rewrite.
        let mut seen: HashSet<Handle> = HashSet::new();

        // Rename arrivals at a chain's far end to the near-end
        // representative, flip for turnaround edges, dedup, and emit.
        let mut emit = |other: Handle, flip_result: bool| -> bool {
            let mut real = other;
            if let Some(&near) = self.chain_end_rewrites.get(&other) {
                real = near;
            } else if let Some(&near) = self.chain_end_rewrites.get(&other.flip()) {
                real = near.flip();
            }
            if flip_result {
                real = real.flip();
            }
            if seen.insert(real) {
                visitor(real)
            } else {
                true
            }
        };

        if self.end != self.start
            && ((handle == self.end && !go_left)
                || (handle == self.end.flip() && go_left)
                || (handle == self.start.flip() && !go_left)
                || (handle == self.start && go_left))
        {
            // Looking out of the snarl: the view is sealed. When start
            // and end coincide every edge is interior.
            return true;
        }

        if self.chain_ends_by_start.contains_key(&handle)
            || self.chain_ends_by_start.contains_key(&handle.flip())
        {
            let conn = self.connectivity[&handle.id()];

            if let Some(&chain_end) = self.chain_ends_by_start.get(&handle) {
                // Visiting the chain forward.
                if go_left {
                    if conn.right_right
                        && !self.graph.follow_edges(chain_end, false, |h| emit(h, true))
                    {
                        return false;
                    }
                    if conn.left_right
                        && !self.graph.follow_edges(handle, true, |h| emit(h, false))
                    {
                        return false;
                    }
                } else {
                    if conn.left_left
                        && !self.graph.follow_edges(handle, true, |h| emit(h, true))
                    {
                        return false;
                    }
                    if conn.left_right
                        && !self.graph.follow_edges(chain_end, false, |h| emit(h, false))
                    {
                        return false;
                    }
                }
            } else {
                // Visiting the chain in reverse: mirror the cases and
                // flip every emitted orientation.
                let chain_end = self.chain_ends_by_start[&handle.flip()];
                if go_left {
                    if conn.left_left
                        && !self.graph.follow_edges(handle, false, |h| emit(h, true))
                    {
                        return false;
                    }
                    if conn.left_right
                        && !self.graph.follow_edges(chain_end, false, |h| emit(h, true))
                    {
                        return false;
                    }
                } else {
                    if conn.right_right
                        && !self.graph.follow_edges(chain_end, false, |h| emit(h, false))
                    {
                        return false;
                    }
                    if conn.left_right
                        && !self.graph.follow_edges(handle, false, |h| emit(h, false))
                    {
                        return false;
                    }
                }
            }
            return true;
        }

        if self.unary_boundaries.contains(&handle) || self.unary_boundaries.contains(&handle.flip())
        {
            let conn = self.connectivity[&handle.id()];
            let any_turnaround = conn.left_left || conn.right_right || conn.left_right;

            if self.unary_boundaries.contains(&handle) {
                // Pointing into the unary snarl.
                if go_left {
                    if !self.use_internal_connectivity
                        && !self.graph.follow_edges(handle, true, |h| emit(h, false))
                    {
                        return false;
                    }
                } else {
                    // No real successors inside; turnarounds read the
                    // predecessors backward.
                    if any_turnaround
                        && !self.graph.follow_edges(handle, true, |h| emit(h, true))
                    {
                        return false;
                    }
                }
            } else {
                // Pointing out of the unary snarl.
                if go_left {
                    if any_turnaround
                        && !self.graph.follow_edges(handle, false, |h| emit(h, true))
                    {
                        return false;
                    }
                } else if !self.use_internal_connectivity
                    && !self.graph.follow_edges(handle, false, |h| emit(h, false))
                {
                    return false;
                }
            }
            return true;
        }

        // An ordinary interior node: forward to the backing graph, still
        // rewriting and deduplicating.
        self.graph.follow_edges(handle, go_left, |h| emit(h, false))
    }

    fn for_each_handle(&self, mut visitor: impl FnMut(Handle) -> bool) -> bool {
        // Flood fill over the backing graph from both bounds. The walk
        // must not use the faked connectivity edges: parts of the snarl
        // can be present but unreachable through children.
        let mut queue: VecDeque<Handle> = VecDeque::new();
        let mut queued: HashSet<NodeId> = HashSet::new();

        queued.insert(self.start.id());
        queue.push_back(self.start);
        if queued.insert(self.end.id()) {
            queue.push_back(self.end);
        }

        while let Some(popped) = queue.pop_front() {
            let mut here = popped;
            if self.unary_boundaries.contains(&here.flip())
                || self.chain_ends_by_start.contains_key(&here.flip())
                || self.chain_end_rewrites.contains_key(&here.flip())
            {
                // A backward reading of a child head or tail: look at it
                // the other way around.
                here = here.flip();
            }

            if let Some(&near) = self.chain_end_rewrites.get(&here) {
                // Chain tails are not emitted, but the head they rename
                // to must eventually be visited; there may be no other
                // edge reaching it.
                if queued.insert(near.id()) {
                    queue.push_back(near);
                }
            } else {
                let forward = if here.is_reverse() { here.flip() } else { here };
                if !visitor(forward) {
                    return false;
                }
            }

            let interior_right = (self.start != self.end
                && here != self.end
                && here != self.start.flip())
                || self.start == self.end;
            if interior_right
                && !self.unary_boundaries.contains(&here)
                && !self.chain_ends_by_start.contains_key(&here)
                && !self.chain_end_rewrites.contains_key(&here)
            {
                self.graph.follow_edges(here, false, |next| {
                    if queued.insert(next.id()) {
                        queue.push_back(next);
                    }
                    true
                });
            }

            let interior_left = (self.start != self.end
                && here != self.start
                && here != self.end.flip())
                || self.start == self.end;
            if interior_left {
                self.graph.follow_edges(here, true, |next| {
                    if queued.insert(next.id()) {
                        queue.push_back(next);
                    }
                    true
                });
            }

            if let Some(&near) = self.chain_end_rewrites.get(&here) {
                // We are a chain tail; look right off the reversed head.
                self.graph.follow_edges(near, false, |next| {
                    if queued.insert(next.id()) {
                        queue.push_back(next);
                    }
                    true
                });
            }

            if let Some(&far) = self.chain_ends_by_start.get(&here) {
                // We are a chain head; look right off the tail.
                self.graph.follow_edges(far, false, |next| {
                    if queued.insert(next.id()) {
                        queue.push_back(next);
                    }
                    true
                });
            }
        }

        true
    }

    fn sequence(&self, _handle: Handle) -> Result<Vec<u8>, GraphError> {
        Err(GraphError::Unsupported("sequence on a structural view"))
    }

    fn length(&self, _handle: Handle) -> Result<usize, GraphError> {
        Err(GraphError::Unsupported("length on a structural view"))
    }
}
