//! The snarl manager: ownership of the snarl forest and its indexes.
//!
//! Records are created through [`SnarlManager::add_snarl`] only, in any
//! order. [`SnarlManager::finish`] then runs exactly once, building the
//! boundary index, resolving parents, computing chains, and
//! regularizing orientations. After `finish` the record set is immutable
//! except for explicit [`SnarlManager::flip`] /
//! [`SnarlManager::flip_chain`] calls, which callers must serialize with
//! any concurrent reader; the manager takes no internal locks.

use std::collections::{HashMap, HashSet, VecDeque};

use rand::Rng;
use rayon::prelude::*;

use crate::chain::{Chain, ChainLink};
use crate::graph::{Edge, Handle, HandleGraph};
use crate::net_graph::NetGraph;
use crate::types::{Endpoint, NodeId, NodeTraversal, Snarl, SnarlBounds, SnarlType, Visit};

/// Error type for manager operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SnarlError {
    /// A snarl value does not correspond to any owned record.
    #[error("snarl {start} -> {end} is not owned by this manager")]
    UnknownSnarl {
        /// Start traversal of the unresolvable snarl.
        start: NodeTraversal,
        /// End traversal of the unresolvable snarl.
        end: NodeTraversal,
    },
    /// A parent reference on an input snarl resolves to no owned record.
    #[error("parent snarl {start} -> {end} is not owned by this manager")]
    UnknownParent {
        /// Start traversal of the missing parent.
        start: NodeTraversal,
        /// End traversal of the missing parent.
        end: NodeTraversal,
    },
    /// `finish` was called more than once.
    #[error("finish() called more than once")]
    AlreadyFinished,
}

/// Stable identity of a snarl record: its index in the master list.
///
/// Valid for the lifetime of the manager that issued it; records are
/// never removed or renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnarlRef(pub(crate) usize);

impl SnarlRef {
    /// The index of the record in the master list.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Stable identity of a chain in the manager's chain arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChainRef(pub(crate) usize);

impl ChainRef {
    /// The index of the chain in the arena.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A snarl plus its tree and chain metadata.
#[derive(Debug, Clone)]
struct SnarlRecord {
    snarl: Snarl,
    children: Vec<SnarlRef>,
    child_chains: Vec<ChainRef>,
    parent: Option<SnarlRef>,
    chain: Option<ChainRef>,
    chain_index: usize,
}

/// Owner of the snarl forest, its chains, and the boundary index.
#[derive(Debug, Default)]
pub struct SnarlManager {
    /// Master list; a [`SnarlRef`] is an index into it.
    records: Vec<SnarlRecord>,
    /// Chain arena; a [`ChainRef`] is an index into it.
    chains: Vec<Chain>,
    /// Roots of the snarl trees.
    roots: Vec<SnarlRef>,
    /// Chains over the root snarls.
    root_chains: Vec<ChainRef>,
    /// Inward traversal `(node, backward)` to the snarl it reads into.
    snarl_into: HashMap<(NodeId, bool), SnarlRef>,
    finished: bool,
}

impl SnarlManager {
    /// Create an empty manager. Call [`SnarlManager::finish`] once all
    /// snarls have been added.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a manager from a stream of snarls: add them all, then
    /// finish.
    pub fn from_snarls(snarls: impl IntoIterator<Item = Snarl>) -> Result<Self, SnarlError> {
        let mut manager = Self::new();
        for snarl in snarls {
            manager.add_snarl(snarl);
        }
        manager.finish()?;
        Ok(manager)
    }

    fn record(&self, snarl: SnarlRef) -> &SnarlRecord {
        &self.records[snarl.0]
    }

    fn assert_finished(&self, what: &str) {
        assert!(
            self.finished,
            "SnarlManager::{what} called before finish(); indexes are not built yet"
        );
    }

    ///////////////////////////////////////////////////////////////////////
    // Write API
    ///////////////////////////////////////////////////////////////////////

    /// Add a snarl to the manager and return its stable reference. The
    /// only way records are created. Parent and chain indexes stay
    /// undefined until [`SnarlManager::finish`].
    pub fn add_snarl(&mut self, snarl: Snarl) -> SnarlRef {
        assert!(!self.finished, "SnarlManager::add_snarl called after finish()");
        let reference = SnarlRef(self.records.len());
        tracing::trace!(snarl = %snarl, index = reference.0, "adding snarl");
        self.records.push(SnarlRecord {
            snarl,
            children: Vec::new(),
            child_chains: Vec::new(),
            parent: None,
            chain: None,
            chain_index: 0,
        });
        reference
    }

    /// Build all indexes and regularize orientations. Must run exactly
    /// once; on error the manager is left in its pre-finish state.
    pub fn finish(&mut self) -> Result<(), SnarlError> {
        if self.finished {
            return Err(SnarlError::AlreadyFinished);
        }
        tracing::debug!(snarls = self.records.len(), "building snarl indexes");

        // Both map keys represent the inward reading direction: the end
        // entry is recorded flipped.
        let mut snarl_into: HashMap<(NodeId, bool), SnarlRef> =
            HashMap::with_capacity(self.records.len() * 2);
        for (index, record) in self.records.iter().enumerate() {
            let snarl = &record.snarl;
            snarl_into.insert((snarl.start.node, snarl.start.backward), SnarlRef(index));
            snarl_into.insert((snarl.end.node, !snarl.end.backward), SnarlRef(index));
        }

        // Resolve parent references before touching any state, so a bad
        // parent leaves the manager untouched.
        let mut parents: Vec<Option<SnarlRef>> = vec![None; self.records.len()];
        let mut children: Vec<Vec<SnarlRef>> = vec![Vec::new(); self.records.len()];
        let mut roots: Vec<SnarlRef> = Vec::new();
        for (index, record) in self.records.iter().enumerate() {
            match record.snarl.parent {
                Some(bounds) => {
                    let parent = snarl_into
                        .get(&(bounds.start.node, bounds.start.backward))
                        .copied()
                        .ok_or(SnarlError::UnknownParent {
                            start: bounds.start,
                            end: bounds.end,
                        })?;
                    parents[index] = Some(parent);
                    children[parent.0].push(SnarlRef(index));
                }
                None => roots.push(SnarlRef(index)),
            }
        }

        // Commit point: nothing below can fail.
        self.snarl_into = snarl_into;
        for (index, parent) in parents.into_iter().enumerate() {
            self.records[index].parent = parent;
        }
        for (index, kids) in children.into_iter().enumerate() {
            self.records[index].children = kids;
        }
        self.roots = roots;
        self.finished = true;

        // Chains for the roots, then for each snarl's children.
        let roots = self.roots.clone();
        let root_chains = self.compute_chains(&roots);
        self.root_chains = self.install_chains(root_chains);

        for index in 0..self.records.len() {
            if self.records[index].children.is_empty() {
                continue;
            }
            let kids = self.records[index].children.clone();
            let chains = self.compute_chains(&kids);
            let refs = self.install_chains(chains);
            self.records[index].child_chains = refs;
        }

        self.regularize();
        Ok(())
    }

    /// Reverse the orientation of a managed snarl: swap and invert its
    /// bounds, and toggle its orientation flag within its chain. The
    /// boundary index is invariant under this operation.
    pub fn flip(&mut self, snarl: SnarlRef) {
        let record = &mut self.records[snarl.0];
        let old_start = record.snarl.start;
        record.snarl.start = record.snarl.end.reversed();
        record.snarl.end = old_start.reversed();

        let location = record.chain.map(|chain| (chain, record.chain_index));
        if let Some((chain, index)) = location {
            let link = &mut self.chains[chain.0].links_mut()[index];
            link.backward = !link.backward;
        }
    }

    /// Reverse the order and orientation of a managed chain, leaving the
    /// component snarls' own bounds untouched.
    pub fn flip_chain(&mut self, chain: ChainRef) {
        let links = self.chains[chain.0].links_mut();
        if links.is_empty() {
            return;
        }
        links.reverse();
        for link in links.iter_mut() {
            link.backward = !link.backward;
        }
        let members: Vec<(SnarlRef, usize)> = links
            .iter()
            .enumerate()
            .map(|(index, link)| (link.snarl, index))
            .collect();
        for (snarl, index) in members {
            self.records[snarl.0].chain_index = index;
        }
    }

    /// Walk out of every chain, orienting snarls with their chains and
    /// flipping chains where fewer than half their snarls would be
    /// graph-ascending. Scoring runs per chain in parallel; flips apply
    /// serially because they mutate records.
    fn regularize(&mut self) {
        let decisions: Vec<(ChainRef, bool, Vec<SnarlRef>)> = (0..self.chains.len())
            .into_par_iter()
            .map(|index| {
                let chain = &self.chains[index];
                let mut ascending = 0usize;
                for link in chain.links() {
                    let snarl = &self.records[link.snarl.0].snarl;
                    let is_ascending = if link.backward {
                        snarl.end.node <= snarl.start.node
                    } else {
                        snarl.start.node <= snarl.end.node
                    };
                    if is_ascending {
                        ascending += 1;
                    }
                }
                // Strict: a one-snarl chain still needs its snarl
                // ascending to stay put.
                let flip_chain = ascending * 2 < chain.len();
                let to_flip = chain
                    .links()
                    .iter()
                    .filter(|link| link.backward != flip_chain)
                    .map(|link| link.snarl)
                    .collect();
                (ChainRef(index), flip_chain, to_flip)
            })
            .collect();

        let mut flipped_chains = 0usize;
        let mut flipped_snarls = 0usize;
        for (chain, flip_chain, to_flip) in decisions {
            if flip_chain {
                self.flip_chain(chain);
                flipped_chains += 1;
            }
            for snarl in to_flip {
                self.flip(snarl);
                flipped_snarls += 1;
            }
        }
        tracing::debug!(flipped_chains, flipped_snarls, "regularized orientations");
    }

    /// Discover the chains covering `input` snarls by walking the
    /// boundary index left and right from each unseen snarl. Circular
    /// chains terminate by running into an already seen snarl.
    fn compute_chains(&self, input: &[SnarlRef]) -> Vec<Chain> {
        let mut chains = Vec::new();
        let mut seen: HashSet<SnarlRef> = HashSet::new();

        for &snarl in input {
            if !seen.insert(snarl) {
                continue;
            }

            let mut links: VecDeque<ChainLink> = VecDeque::new();
            links.push_back(ChainLink {
                snarl,
                backward: false,
            });

            let mut walk = self.prev_snarl(snarl, false);
            while let Some((previous, backward)) = walk {
                if !seen.insert(previous) {
                    break;
                }
                links.push_front(ChainLink {
                    snarl: previous,
                    backward,
                });
                walk = self.prev_snarl(previous, backward);
            }

            let mut walk = self.next_snarl(snarl, false);
            while let Some((next, backward)) = walk {
                if !seen.insert(next) {
                    break;
                }
                links.push_back(ChainLink {
                    snarl: next,
                    backward,
                });
                walk = self.next_snarl(next, backward);
            }

            chains.push(Chain::from_links(links.into_iter().collect()));
        }

        chains
    }

    /// Move chains into the arena and point every member record back at
    /// its chain and position.
    fn install_chains(&mut self, chains: Vec<Chain>) -> Vec<ChainRef> {
        let mut refs = Vec::with_capacity(chains.len());
        for chain in chains {
            let reference = ChainRef(self.chains.len());
            for (index, link) in chain.links().iter().enumerate() {
                let record = &mut self.records[link.snarl.0];
                record.chain = Some(reference);
                record.chain_index = index;
            }
            self.chains.push(chain);
            refs.push(reference);
        }
        refs
    }

    /// The snarl following an oriented snarl along its chain, with the
    /// orientation it is found in.
    fn next_snarl(&self, here: SnarlRef, backward: bool) -> Option<(SnarlRef, bool)> {
        let here_snarl = &self.record(here).snarl;
        let next = if backward {
            self.snarl_sharing_start(here)
        } else {
            self.snarl_sharing_end(here)
        }?;
        let next_snarl = &self.record(next).snarl;

        let next_backward = if backward {
            // We came out our start, so the next thing is also backward
            // as long as its end matches our start.
            next_snarl.end.node == here_snarl.start.node
        } else {
            // We came out our end, so the next thing is backward if its
            // start doesn't match our end.
            next_snarl.start.node != here_snarl.end.node
        };
        Some((next, next_backward))
    }

    /// The snarl preceding an oriented snarl along its chain.
    fn prev_snarl(&self, here: SnarlRef, backward: bool) -> Option<(SnarlRef, bool)> {
        self.next_snarl(here, !backward)
            .map(|(previous, orientation)| (previous, !orientation))
    }

    ///////////////////////////////////////////////////////////////////////
    // Read API
    ///////////////////////////////////////////////////////////////////////

    /// The owned snarl value behind a reference.
    pub fn snarl(&self, snarl: SnarlRef) -> &Snarl {
        &self.record(snarl).snarl
    }

    /// Number of snarls in the master list.
    pub fn num_snarls(&self) -> usize {
        self.records.len()
    }

    /// Children of a snarl; `None` asks for the top-level root snarls.
    pub fn children_of(&self, snarl: Option<SnarlRef>) -> &[SnarlRef] {
        self.assert_finished("children_of");
        match snarl {
            None => &self.roots,
            Some(snarl) => &self.record(snarl).children,
        }
    }

    /// Parent of a snarl, or `None` for roots.
    pub fn parent_of(&self, snarl: SnarlRef) -> Option<SnarlRef> {
        self.assert_finished("parent_of");
        self.record(snarl).parent
    }

    /// The roots of the snarl trees.
    pub fn top_level_snarls(&self) -> &[SnarlRef] {
        self.assert_finished("top_level_snarls");
        &self.roots
    }

    /// The chain a snarl participates in. Always defined after finish,
    /// trivially for single-snarl chains.
    pub fn chain_of(&self, snarl: SnarlRef) -> ChainRef {
        self.assert_finished("chain_of");
        self.record(snarl)
            .chain
            .expect("every snarl belongs to a chain after finish()")
    }

    /// The chain value behind a reference.
    pub fn chain(&self, chain: ChainRef) -> &Chain {
        &self.chains[chain.0]
    }

    /// True if the snarl is backward within its chain.
    pub fn chain_orientation_of(&self, snarl: SnarlRef) -> bool {
        let chain = self.chain_of(snarl);
        self.chains[chain.0].links()[self.record(snarl).chain_index].backward
    }

    /// The rank of the snarl within its chain. Sorting snarls by rank
    /// visits them in chain order without walking the whole chain.
    pub fn chain_rank_of(&self, snarl: SnarlRef) -> usize {
        self.assert_finished("chain_rank_of");
        self.record(snarl).chain_index
    }

    /// True if the snarl sits in a chain of more than one snarl.
    pub fn in_nontrivial_chain(&self, snarl: SnarlRef) -> bool {
        self.chain(self.chain_of(snarl)).len() > 1
    }

    /// All chains under a parent snarl; `None` asks for the top-level
    /// chains. Unary snarls and snarls in trivial chains appear as
    /// single-snarl chains.
    pub fn chains_of(&self, snarl: Option<SnarlRef>) -> &[ChainRef] {
        self.assert_finished("chains_of");
        match snarl {
            None => &self.root_chains,
            Some(snarl) => &self.record(snarl).child_chains,
        }
    }

    /// Inward-facing bounding visit at the left end of a chain.
    ///
    /// # Panics
    ///
    /// Panics on an empty chain, which has no bounding snarl.
    pub fn start_of_chain(&self, chain: ChainRef) -> Visit {
        let first = self.chains[chain.0]
            .first()
            .expect("an empty chain has no bounding visit");
        let snarl = self.snarl(first.snarl);
        if first.backward {
            Visit::node(snarl.end.node, !snarl.end.backward)
        } else {
            Visit::node(snarl.start.node, snarl.start.backward)
        }
    }

    /// Outward-facing bounding visit at the right end of a chain.
    ///
    /// # Panics
    ///
    /// Panics on an empty chain, which has no bounding snarl.
    pub fn end_of_chain(&self, chain: ChainRef) -> Visit {
        let last = self.chains[chain.0]
            .last()
            .expect("an empty chain has no bounding visit");
        let snarl = self.snarl(last.snarl);
        if last.backward {
            Visit::node(snarl.start.node, !snarl.start.backward)
        } else {
            Visit::node(snarl.end.node, snarl.end.backward)
        }
    }

    /// The snarl a traversal of `(node, backward)` reads into, if any.
    /// End boundaries read in reversed, so both sides resolve.
    pub fn into_which_snarl(&self, node: NodeId, backward: bool) -> Option<SnarlRef> {
        self.assert_finished("into_which_snarl");
        self.snarl_into.get(&(node, backward)).copied()
    }

    /// The snarl a visit reads into. A snarl-visit resolves to the
    /// managed copy of that snarl, which must exist.
    pub fn into_which_snarl_visit(&self, visit: &Visit) -> Result<Option<SnarlRef>, SnarlError> {
        match visit.bounds() {
            Some(bounds) => self.manage_bounds(&bounds).map(Some),
            None => Ok(self.into_which_snarl(
                visit.node_id().expect("a visit is a node or a snarl"),
                visit.backward,
            )),
        }
    }

    /// Resolve a snarl value we don't own to the managed record with the
    /// same start boundary. Absence is a hard error.
    pub fn manage(&self, not_owned: &Snarl) -> Result<SnarlRef, SnarlError> {
        self.manage_bounds(&not_owned.bounds())
    }

    fn manage_bounds(&self, bounds: &SnarlBounds) -> Result<SnarlRef, SnarlError> {
        self.assert_finished("manage");
        self.snarl_into
            .get(&(bounds.start.node, bounds.start.backward))
            .copied()
            .ok_or(SnarlError::UnknownSnarl {
                start: bounds.start,
                end: bounds.end,
            })
    }

    /// The snarl sharing this snarl's start node as either its start or
    /// its end, not counting the snarl itself (a unary snarl shares a
    /// boundary with itself and must not self-loop).
    pub fn snarl_sharing_start(&self, here: SnarlRef) -> Option<SnarlRef> {
        self.assert_finished("snarl_sharing_start");
        let snarl = &self.record(here).snarl;
        let next = self
            .snarl_into
            .get(&(snarl.start.node, !snarl.start.backward))
            .copied()?;
        (next != here).then_some(next)
    }

    /// The snarl sharing this snarl's end node as either its start or
    /// its end, not counting the snarl itself.
    pub fn snarl_sharing_end(&self, here: SnarlRef) -> Option<SnarlRef> {
        self.assert_finished("snarl_sharing_end");
        let snarl = &self.record(here).snarl;
        let next = self
            .snarl_into
            .get(&(snarl.end.node, snarl.end.backward))
            .copied()?;
        (next != here).then_some(next)
    }

    /// Map from every boundary traversal to the snarl it reads into;
    /// end boundaries appear reversed.
    pub fn snarl_boundary_index(&self) -> HashMap<(NodeId, bool), SnarlRef> {
        let mut index = HashMap::with_capacity(self.records.len() * 2);
        for (position, record) in self.records.iter().enumerate() {
            let snarl = &record.snarl;
            index.insert((snarl.start.node, snarl.start.backward), SnarlRef(position));
            index.insert((snarl.end.node, !snarl.end.backward), SnarlRef(position));
        }
        index
    }

    /// Map from start boundaries to the snarl they read into.
    pub fn snarl_start_index(&self) -> HashMap<(NodeId, bool), SnarlRef> {
        self.records
            .iter()
            .enumerate()
            .map(|(position, record)| {
                let snarl = &record.snarl;
                ((snarl.start.node, snarl.start.backward), SnarlRef(position))
            })
            .collect()
    }

    /// Map from end boundaries, reversed to read inward, to the snarl
    /// they read into.
    pub fn snarl_end_index(&self) -> HashMap<(NodeId, bool), SnarlRef> {
        self.records
            .iter()
            .enumerate()
            .map(|(position, record)| {
                let snarl = &record.snarl;
                ((snarl.end.node, !snarl.end.backward), SnarlRef(position))
            })
            .collect()
    }

    /// True if the snarl has no children.
    pub fn is_leaf(&self, snarl: SnarlRef) -> bool {
        self.assert_finished("is_leaf");
        self.record(snarl).children.is_empty()
    }

    /// True if the snarl has no parent.
    pub fn is_root(&self, snarl: SnarlRef) -> bool {
        self.parent_of(snarl).is_none()
    }

    /// True if the snarl is an ultrabubble consisting of nothing but its
    /// two boundary nodes.
    pub fn is_trivial<G: HandleGraph>(&self, snarl: SnarlRef, graph: &G) -> bool {
        self.snarl(snarl).snarl_type == SnarlType::Ultrabubble
            && self.is_leaf(snarl)
            && self.shallow_contents(snarl, graph, false).0.is_empty()
    }

    /// True if every child of the snarl is trivial.
    pub fn all_children_trivial<G: HandleGraph>(&self, snarl: SnarlRef, graph: &G) -> bool {
        self.children_of(Some(snarl))
            .iter()
            .all(|&child| self.is_trivial(child, graph))
    }

    /// Pick a snarl uniformly at random from the master list, or `None`
    /// if the manager is empty.
    pub fn discrete_uniform_sample(&self, rng: &mut impl Rng) -> Option<SnarlRef> {
        if self.records.is_empty() {
            return None;
        }
        Some(SnarlRef(rng.gen_range(0..self.records.len())))
    }

    /// A net graph over the snarl's interior, bound to the given backing
    /// graph and the snarl's child chains.
    pub fn net_graph_of<'g, G: HandleGraph>(
        &self,
        snarl: SnarlRef,
        graph: &'g G,
        use_internal_connectivity: bool,
    ) -> NetGraph<'g, G> {
        let data = self.snarl(snarl);
        let mut net = NetGraph::new(data.start, data.end, graph, use_internal_connectivity);
        for &chain in self.chains_of(Some(snarl)) {
            let resolved: Vec<(&Snarl, bool)> = self.chains[chain.0]
                .links()
                .iter()
                .map(|link| (self.snarl(link.snarl), link.backward))
                .collect();
            net.add_child(&resolved);
        }
        net
    }

    /// Nodes and edges contained in the snarl but not in any child
    /// snarl. Child boundary nodes are included; the snarl's own
    /// boundary nodes only when requested.
    pub fn shallow_contents<G: HandleGraph>(
        &self,
        snarl: SnarlRef,
        graph: &G,
        include_boundary_nodes: bool,
    ) -> (HashSet<NodeId>, HashSet<Edge>) {
        self.assert_finished("shallow_contents");
        let data = *self.snarl(snarl);

        let mut nodes: HashSet<NodeId> = HashSet::new();
        let mut edges: HashSet<Edge> = HashSet::new();

        let start_node = Handle::new(data.start.node, false);
        let end_node = Handle::new(data.end.node, false);

        // The boundary nodes are pre-marked so walks terminate on them.
        let mut stacked: HashSet<NodeId> = HashSet::new();
        stacked.insert(start_node.id());
        stacked.insert(end_node.id());

        if include_boundary_nodes {
            nodes.insert(start_node.id());
            nodes.insert(end_node.id());
        }

        let mut stack: Vec<Handle> = Vec::new();

        // One edge inside from the start.
        graph.follow_edges(start_node, data.start.backward, |node| {
            if stacked.insert(node.id()) {
                stack.push(node);
            }
            if data.start.backward {
                edges.insert(graph.edge_handle(node, start_node));
            } else {
                edges.insert(graph.edge_handle(start_node, node));
            }
            true
        });

        // One edge inside from the end.
        graph.follow_edges(end_node, !data.end.backward, |node| {
            if stacked.insert(node.id()) {
                stack.push(node);
            }
            if data.end.backward {
                edges.insert(graph.edge_handle(end_node, node));
            } else {
                edges.insert(graph.edge_handle(node, end_node));
            }
            true
        });

        // DFS, jumping over child snarls and ignoring walk validity so
        // tips are discovered too.
        while let Some(node) = stack.pop() {
            nodes.insert(node.id());

            let forward_snarl = self.into_which_snarl(node.id(), false);
            let backward_snarl = self.into_which_snarl(node.id(), true);

            if let Some(child) = forward_snarl {
                // Stack up the node on the far side of the child rather
                // than traversing it.
                let child_data = self.snarl(child);
                let other = if child_data.start.node == node.id() {
                    child_data.end.node
                } else {
                    child_data.start.node
                };
                if stacked.insert(other) {
                    stack.push(Handle::new(other, false));
                }
            }

            if let Some(child) = backward_snarl {
                let child_data = self.snarl(child);
                let other = if child_data.end.node == node.id() {
                    child_data.start.node
                } else {
                    child_data.end.node
                };
                if stacked.insert(other) {
                    stack.push(Handle::new(other, false));
                }
            }

            graph.follow_edges(node, false, |next| {
                if (node.is_reverse() && backward_snarl.is_none())
                    || (!node.is_reverse() && forward_snarl.is_none())
                {
                    edges.insert(graph.edge_handle(node, next));
                    if stacked.insert(next.id()) {
                        stack.push(next);
                    }
                }
                true
            });

            graph.follow_edges(node, true, |previous| {
                if (node.is_reverse() && forward_snarl.is_none())
                    || (!node.is_reverse() && backward_snarl.is_none())
                {
                    edges.insert(graph.edge_handle(previous, node));
                    if stacked.insert(previous.id()) {
                        stack.push(previous);
                    }
                }
                true
            });
        }

        (nodes, edges)
    }

    /// Nodes and edges contained in the snarl, descending through child
    /// snarls. The snarl's own boundary nodes are included only when
    /// requested.
    pub fn deep_contents<G: HandleGraph>(
        &self,
        snarl: SnarlRef,
        graph: &G,
        include_boundary_nodes: bool,
    ) -> (HashSet<NodeId>, HashSet<Edge>) {
        self.assert_finished("deep_contents");
        let data = *self.snarl(snarl);

        let mut nodes: HashSet<NodeId> = HashSet::new();
        let mut edges: HashSet<Edge> = HashSet::new();

        let start_node = Handle::new(data.start.node, false);
        let end_node = Handle::new(data.end.node, false);

        let mut stacked: HashSet<NodeId> = HashSet::new();
        stacked.insert(start_node.id());
        stacked.insert(end_node.id());

        if include_boundary_nodes {
            nodes.insert(start_node.id());
            nodes.insert(end_node.id());
        }

        let mut stack: Vec<Handle> = Vec::new();

        graph.follow_edges(start_node, data.start.backward, |node| {
            if stacked.insert(node.id()) {
                stack.push(node);
            }
            if data.start.backward {
                edges.insert(graph.edge_handle(node, start_node));
            } else {
                edges.insert(graph.edge_handle(start_node, node));
            }
            true
        });

        graph.follow_edges(end_node, !data.end.backward, |node| {
            if stacked.insert(node.id()) {
                stack.push(node);
            }
            if data.end.backward {
                edges.insert(graph.edge_handle(end_node, node));
            } else {
                edges.insert(graph.edge_handle(node, end_node));
            }
            true
        });

        while let Some(node) = stack.pop() {
            nodes.insert(node.id());

            graph.follow_edges(node, false, |next| {
                edges.insert(graph.edge_handle(node, next));
                if stacked.insert(next.id()) {
                    stack.push(next);
                }
                true
            });

            graph.follow_edges(node, true, |previous| {
                edges.insert(graph.edge_handle(previous, node));
                if stacked.insert(previous.id()) {
                    stack.push(previous);
                }
                true
            });
        }

        (nodes, edges)
    }

    /// Everything attached to the right side of a visit within
    /// `in_snarl`: node visits for ordinary neighbors, snarl visits where
    /// a side reads into a child.
    pub fn visits_right<G: HandleGraph>(
        &self,
        visit: &Visit,
        graph: &G,
        in_snarl: SnarlRef,
    ) -> Vec<Visit> {
        self.assert_finished("visits_right");
        let mut out = Vec::new();
        let right_side = visit.to_right_side();

        if visit.is_snarl() {
            // Leaving a child snarl: another child may share this
            // boundary node in the direction we're going, in which case
            // we enter it immediately and must not look inside it.
            if let Some(child) = self.into_which_snarl(right_side.node, !right_side.facing_reverse)
            {
                if child != in_snarl
                    && self.into_which_snarl(right_side.node, right_side.facing_reverse)
                        != Some(in_snarl)
                {
                    let child_data = self.snarl(child);
                    // We came in its end if the boundary is its end node.
                    let backward = right_side.node == child_data.end.node;
                    out.push(Visit::snarl(child_data.bounds(), backward));
                    return out;
                }
            }
        }

        graph.follow_edges(
            Handle::new(right_side.node, false),
            !right_side.facing_reverse,
            |next| {
                let attached = Endpoint::new(
                    next.id(),
                    if right_side.facing_reverse {
                        next.is_reverse()
                    } else {
                        !next.is_reverse()
                    },
                );

                let child = self.into_which_snarl(attached.node, attached.facing_reverse);
                match child {
                    Some(child)
                        if child != in_snarl
                            && self.into_which_snarl(attached.node, !attached.facing_reverse)
                                != Some(in_snarl) =>
                    {
                        let child_data = self.snarl(child);
                        if attached.node == child_data.start.node {
                            // Reading into the start of the child.
                            out.push(Visit::snarl(child_data.bounds(), false));
                        } else {
                            debug_assert_eq!(attached.node, child_data.end.node);
                            out.push(Visit::snarl(child_data.bounds(), true));
                        }
                    }
                    _ => out.push(Visit::node(attached.node, attached.facing_reverse)),
                }
                true
            },
        );

        out
    }

    /// Everything attached to the left side of a visit: the reversed
    /// results of looking right from the reversed visit.
    pub fn visits_left<G: HandleGraph>(
        &self,
        visit: &Visit,
        graph: &G,
        in_snarl: SnarlRef,
    ) -> Vec<Visit> {
        let mut out = self.visits_right(&visit.reverse(), graph, in_snarl);
        for visit in &mut out {
            *visit = visit.reverse();
        }
        out
    }

    ///////////////////////////////////////////////////////////////////////
    // Iteration
    ///////////////////////////////////////////////////////////////////////

    /// Visit each top-level snarl; the callback returns `false` to stop.
    pub fn for_each_top_level_snarl(&self, mut visitor: impl FnMut(SnarlRef) -> bool) -> bool {
        self.assert_finished("for_each_top_level_snarl");
        for &root in &self.roots {
            if !visitor(root) {
                return false;
            }
        }
        true
    }

    /// Visit every snarl in preorder; the callback returns `false` to
    /// stop.
    pub fn for_each_snarl_preorder(&self, mut visitor: impl FnMut(SnarlRef) -> bool) -> bool {
        self.assert_finished("for_each_snarl_preorder");
        let mut stack: Vec<SnarlRef> = self.roots.iter().rev().copied().collect();
        while let Some(snarl) = stack.pop() {
            if !visitor(snarl) {
                return false;
            }
            stack.extend(self.record(snarl).children.iter().rev().copied());
        }
        true
    }

    /// Visit every snarl in master-list order, usable before finish.
    pub fn for_each_snarl_unindexed(&self, mut visitor: impl FnMut(SnarlRef) -> bool) -> bool {
        for index in 0..self.records.len() {
            if !visitor(SnarlRef(index)) {
                return false;
            }
        }
        true
    }

    /// Visit the top-level snarls concurrently. No ordering guarantee.
    pub fn for_each_top_level_snarl_parallel<F>(&self, visitor: F)
    where
        F: Fn(SnarlRef) + Sync,
    {
        self.assert_finished("for_each_top_level_snarl_parallel");
        self.roots.par_iter().for_each(|&root| visitor(root));
    }

    /// Visit every snarl, dispatching siblings concurrently. A parent is
    /// always visited before its children; no other ordering guarantee.
    pub fn for_each_snarl_parallel<F>(&self, visitor: F)
    where
        F: Fn(SnarlRef) + Sync,
    {
        self.assert_finished("for_each_snarl_parallel");
        self.roots
            .par_iter()
            .for_each(|&root| self.preorder_parallel_from(root, &visitor));
    }

    fn preorder_parallel_from<F>(&self, snarl: SnarlRef, visitor: &F)
    where
        F: Fn(SnarlRef) + Sync,
    {
        visitor(snarl);
        self.record(snarl)
            .children
            .par_iter()
            .for_each(|&child| self.preorder_parallel_from(child, visitor));
    }

    /// Visit each top-level chain; the callback returns `false` to stop.
    pub fn for_each_top_level_chain(&self, mut visitor: impl FnMut(ChainRef) -> bool) -> bool {
        self.assert_finished("for_each_top_level_chain");
        for &chain in &self.root_chains {
            if !visitor(chain) {
                return false;
            }
        }
        true
    }

    /// Visit the top-level chains concurrently.
    pub fn for_each_top_level_chain_parallel<F>(&self, visitor: F)
    where
        F: Fn(ChainRef) + Sync,
    {
        self.assert_finished("for_each_top_level_chain_parallel");
        self.root_chains.par_iter().for_each(|&chain| visitor(chain));
    }

    /// Visit every chain: the root chains first, then the child chains
    /// of each snarl in preorder. The callback returns `false` to stop.
    pub fn for_each_chain(&self, mut visitor: impl FnMut(ChainRef) -> bool) -> bool {
        self.assert_finished("for_each_chain");
        for &chain in &self.root_chains {
            if !visitor(chain) {
                return false;
            }
        }
        self.for_each_snarl_preorder(|snarl| {
            for &chain in &self.record(snarl).child_chains {
                if !visitor(chain) {
                    return false;
                }
            }
            true
        })
    }

    /// Visit every chain, dispatching sibling chains concurrently.
    pub fn for_each_chain_parallel<F>(&self, visitor: F)
    where
        F: Fn(ChainRef) + Sync,
    {
        self.assert_finished("for_each_chain_parallel");
        self.root_chains.par_iter().for_each(|&chain| visitor(chain));
        self.for_each_snarl_parallel(|snarl| {
            self.record(snarl)
                .child_chains
                .par_iter()
                .for_each(|&chain| visitor(chain));
        });
    }

    ///////////////////////////////////////////////////////////////////////
    // Serialization
    ///////////////////////////////////////////////////////////////////////

    /// Write every snarl exactly once as a preorder stream, each with
    /// its parent reference populated from the index. The framing of the
    /// stream is the caller's concern.
    pub fn serialize_snarls<E>(
        &self,
        mut write_snarl: impl FnMut(&Snarl) -> Result<(), E>,
    ) -> Result<(), E> {
        self.assert_finished("serialize_snarls");
        let mut stack: Vec<SnarlRef> = Vec::new();
        for &root in &self.roots {
            stack.push(root);
            while let Some(current) = stack.pop() {
                let record = self.record(current);
                let mut snarl = record.snarl;
                snarl.parent = record.parent.map(|parent| self.record(parent).snarl.bounds());
                write_snarl(&snarl)?;
                stack.extend(record.children.iter().rev().copied());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemoryGraph;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn trav(id: u64, backward: bool) -> NodeTraversal {
        NodeTraversal::new(NodeId::new(id), backward)
    }

    fn snarl(start: (u64, bool), end: (u64, bool)) -> Snarl {
        Snarl::new(trav(start.0, start.1), trav(end.0, end.1))
    }

    /// Outer snarl 1 -> 10 containing the chain [2 -> 5, 5 -> 9].
    fn nested_manager() -> (SnarlManager, SnarlRef, SnarlRef, SnarlRef) {
        let mut manager = SnarlManager::new();
        let outer = manager.add_snarl(snarl((1, false), (10, false)));

        let mut inner_a = snarl((2, false), (5, false));
        inner_a.parent = Some(SnarlBounds::new(trav(1, false), trav(10, false)));
        let mut inner_b = snarl((5, false), (9, false));
        inner_b.parent = Some(SnarlBounds::new(trav(1, false), trav(10, false)));

        let a = manager.add_snarl(inner_a);
        let b = manager.add_snarl(inner_b);
        manager.finish().unwrap();
        (manager, outer, a, b)
    }

    #[test]
    fn test_boundary_index_invariant() {
        let (manager, outer, a, b) = nested_manager();
        for reference in [outer, a, b] {
            let data = *manager.snarl(reference);
            assert_eq!(
                manager.into_which_snarl(data.start.node, data.start.backward),
                Some(reference)
            );
            assert_eq!(
                manager.into_which_snarl(data.end.node, !data.end.backward),
                Some(reference)
            );
        }
    }

    #[test]
    fn test_parent_and_children() {
        let (manager, outer, a, b) = nested_manager();
        assert_eq!(manager.children_of(None), &[outer]);
        assert_eq!(manager.children_of(Some(outer)), &[a, b]);
        assert_eq!(manager.parent_of(a), Some(outer));
        assert_eq!(manager.parent_of(outer), None);
        assert!(manager.is_root(outer));
        assert!(manager.is_leaf(a));
        assert!(!manager.is_leaf(outer));
    }

    #[test]
    fn test_chain_assembly_and_ranks() {
        let (manager, outer, a, b) = nested_manager();

        let chains = manager.chains_of(Some(outer));
        assert_eq!(chains.len(), 1);
        let chain = manager.chain(chains[0]);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.links()[0].snarl, a);
        assert_eq!(chain.links()[1].snarl, b);

        assert_eq!(manager.chain_rank_of(a), 0);
        assert_eq!(manager.chain_rank_of(b), 1);
        assert!(!manager.chain_orientation_of(a));
        assert!(manager.in_nontrivial_chain(a));
        assert!(!manager.in_nontrivial_chain(outer));

        assert_eq!(manager.snarl_sharing_end(a), Some(b));
        assert_eq!(manager.snarl_sharing_start(b), Some(a));
        assert_eq!(manager.snarl_sharing_start(a), None);
    }

    #[test]
    fn test_chain_bounding_visits() {
        let (manager, outer, _, _) = nested_manager();
        let chain = manager.chains_of(Some(outer))[0];
        assert_eq!(manager.start_of_chain(chain), Visit::node(NodeId::new(2), false));
        assert_eq!(manager.end_of_chain(chain), Visit::node(NodeId::new(9), false));
    }

    #[test]
    fn test_regularization_flips_descending_chain() {
        // The chain is discovered with both snarls graph-descending;
        // regularization flips the whole chain and then each snarl.
        let mut manager = SnarlManager::new();
        let a = manager.add_snarl(snarl((5, true), (2, true)));
        let b = manager.add_snarl(snarl((9, true), (5, true)));
        let before = manager.snarl_boundary_index();
        manager.finish().unwrap();

        assert_eq!(*manager.snarl(a), snarl((2, false), (5, false)));
        assert_eq!(*manager.snarl(b), snarl((5, false), (9, false)));

        let chain = manager.chain(manager.chain_of(a));
        assert_eq!(chain.links()[0].snarl, a);
        assert_eq!(chain.links()[1].snarl, b);
        assert!(!chain.links()[0].backward);
        assert!(!chain.links()[1].backward);
        assert_eq!(manager.chain_rank_of(a), 0);
        assert_eq!(manager.chain_rank_of(b), 1);

        // The boundary index is invariant under regularization.
        assert_eq!(manager.snarl_boundary_index(), before);

        // At least half of the chain is graph-ascending now.
        let ascending = chain
            .links()
            .iter()
            .filter(|link| {
                let data = manager.snarl(link.snarl);
                data.start.node <= data.end.node
            })
            .count();
        assert!(ascending * 2 >= chain.len());
    }

    #[test]
    fn test_flip_round_trip() {
        let (mut manager, _, a, _) = nested_manager();
        let before = *manager.snarl(a);
        let orientation = manager.chain_orientation_of(a);
        let index_before = manager.snarl_boundary_index();

        manager.flip(a);
        assert_eq!(manager.snarl(a).start, before.end.reversed());
        assert_ne!(manager.chain_orientation_of(a), orientation);
        assert_eq!(manager.snarl_boundary_index(), index_before);

        manager.flip(a);
        assert_eq!(*manager.snarl(a), before);
        assert_eq!(manager.chain_orientation_of(a), orientation);
    }

    #[test]
    fn test_flip_chain_round_trip() {
        let (mut manager, outer, a, b) = nested_manager();
        let chain = manager.chains_of(Some(outer))[0];

        manager.flip_chain(chain);
        assert_eq!(manager.chain(chain).links()[0].snarl, b);
        assert!(manager.chain(chain).links()[0].backward);
        assert_eq!(manager.chain_rank_of(a), 1);

        manager.flip_chain(chain);
        assert_eq!(manager.chain(chain).links()[0].snarl, a);
        assert!(!manager.chain(chain).links()[0].backward);
        assert_eq!(manager.chain_rank_of(a), 0);
    }

    #[test]
    fn test_circular_chain_terminates() {
        let mut manager = SnarlManager::new();
        let a = manager.add_snarl(snarl((1, false), (3, false)));
        let b = manager.add_snarl(snarl((3, false), (1, false)));
        manager.finish().unwrap();

        let chain = manager.chain(manager.chain_of(a));
        assert_eq!(chain.len(), 2);
        assert_eq!(manager.chain_of(a), manager.chain_of(b));
    }

    #[test]
    fn test_manage_resolves_and_rejects() {
        let (manager, _, a, _) = nested_manager();
        let owned = *manager.snarl(a);
        assert_eq!(manager.manage(&owned).unwrap(), a);

        let stranger = snarl((77, false), (78, false));
        assert!(matches!(
            manager.manage(&stranger),
            Err(SnarlError::UnknownSnarl { .. })
        ));
    }

    #[test]
    fn test_finish_twice_fails() {
        let mut manager = SnarlManager::new();
        manager.add_snarl(snarl((1, false), (4, false)));
        manager.finish().unwrap();
        assert!(matches!(manager.finish(), Err(SnarlError::AlreadyFinished)));
    }

    #[test]
    fn test_unknown_parent_leaves_manager_unfinished() {
        let mut manager = SnarlManager::new();
        let mut child = snarl((2, false), (5, false));
        child.parent = Some(SnarlBounds::new(trav(90, false), trav(99, false)));
        manager.add_snarl(child);

        assert!(matches!(
            manager.finish(),
            Err(SnarlError::UnknownParent { .. })
        ));
        // The failed finish left no indexes behind; a corrected retry
        // succeeds.
        manager.add_snarl(snarl((90, false), (99, false)));
        manager.finish().unwrap();
    }

    #[test]
    #[should_panic(expected = "before finish()")]
    fn test_query_before_finish_panics() {
        let mut manager = SnarlManager::new();
        let reference = manager.add_snarl(snarl((1, false), (4, false)));
        manager.parent_of(reference);
    }

    #[test]
    fn test_sampling() {
        let mut rng = StdRng::seed_from_u64(7);
        let empty = SnarlManager::new();
        assert_eq!(empty.discrete_uniform_sample(&mut rng), None);

        let (manager, ..) = nested_manager();
        for _ in 0..20 {
            let picked = manager.discrete_uniform_sample(&mut rng).unwrap();
            assert!(picked.index() < manager.num_snarls());
        }
    }

    #[test]
    fn test_preorder_iteration() {
        let (manager, outer, a, b) = nested_manager();
        let mut order = Vec::new();
        manager.for_each_snarl_preorder(|snarl| {
            order.push(snarl);
            true
        });
        assert_eq!(order, vec![outer, a, b]);

        // Early stop is honored.
        let mut seen = 0;
        let finished = manager.for_each_snarl_preorder(|_| {
            seen += 1;
            false
        });
        assert!(!finished);
        assert_eq!(seen, 1);
    }

    #[test]
    fn test_parallel_iteration_covers_everything() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let (manager, ..) = nested_manager();

        let snarls = AtomicUsize::new(0);
        manager.for_each_snarl_parallel(|_| {
            snarls.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(snarls.load(Ordering::Relaxed), 3);

        let chains = AtomicUsize::new(0);
        manager.for_each_chain_parallel(|_| {
            chains.fetch_add(1, Ordering::Relaxed);
        });
        let mut serial = 0;
        manager.for_each_chain(|_| {
            serial += 1;
            true
        });
        assert_eq!(chains.load(Ordering::Relaxed), serial);
    }

    #[test]
    fn test_serialization_every_snarl_once() {
        let (manager, ..) = nested_manager();
        let mut written: Vec<Snarl> = Vec::new();
        manager
            .serialize_snarls(|snarl| {
                written.push(*snarl);
                Ok::<(), std::convert::Infallible>(())
            })
            .unwrap();
        assert_eq!(written.len(), manager.num_snarls());

        // Every written snarl is distinct and resolvable.
        let mut starts: Vec<_> = written.iter().map(|s| (s.start.node, s.start.backward)).collect();
        starts.sort();
        starts.dedup();
        assert_eq!(starts.len(), written.len());

        // The stream reconstructs an equivalent manager.
        let rebuilt = SnarlManager::from_snarls(written).unwrap();
        assert_eq!(rebuilt.num_snarls(), manager.num_snarls());
        assert_eq!(rebuilt.children_of(None).len(), 1);
        let root = rebuilt.children_of(None)[0];
        assert_eq!(rebuilt.children_of(Some(root)).len(), 2);
    }

    #[test]
    fn test_shallow_contents_of_plain_bubble() {
        let mut graph = MemoryGraph::new();
        let h = |id: u64, rev: bool| Handle::new(NodeId::new(id), rev);
        for id in 1..=4 {
            graph.add_node(NodeId::new(id), "A");
        }
        graph.add_edge(h(1, false), h(2, false));
        graph.add_edge(h(1, false), h(3, false));
        graph.add_edge(h(2, false), h(4, false));
        graph.add_edge(h(3, false), h(4, false));

        let mut manager = SnarlManager::new();
        let bubble = manager.add_snarl(snarl((1, false), (4, false)));
        manager.finish().unwrap();

        let (inner_nodes, inner_edges) = manager.shallow_contents(bubble, &graph, false);
        let expected: HashSet<NodeId> = [NodeId::new(2), NodeId::new(3)].into_iter().collect();
        assert_eq!(inner_nodes, expected);
        assert_eq!(inner_edges.len(), 4);

        let (with_bounds, _) = manager.shallow_contents(bubble, &graph, true);
        assert!(with_bounds.is_superset(&inner_nodes));
        let difference: HashSet<NodeId> = with_bounds.difference(&inner_nodes).copied().collect();
        let bounds: HashSet<NodeId> = [NodeId::new(1), NodeId::new(4)].into_iter().collect();
        assert_eq!(difference, bounds);

        // With no children, deep and shallow agree.
        let (deep_nodes, deep_edges) = manager.deep_contents(bubble, &graph, false);
        assert_eq!(deep_nodes, inner_nodes);
        assert_eq!(deep_edges, inner_edges);

        assert!(!manager.is_trivial(bubble, &graph));
    }
}
