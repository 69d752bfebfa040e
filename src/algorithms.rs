//! Directed-walk analyses over any [`HandleGraph`].
//!
//! Both functions treat each oriented handle as a vertex of a directed
//! graph whose arcs are rightward edge followings. They are used by the
//! finder driver to classify snarls, but work on any graph implementing
//! the contract, including net graphs.

use std::collections::HashMap;

use crate::graph::{Handle, HandleGraph};

/// Find all tips: oriented handles with no neighbors on their left side.
///
/// Every node is checked in both orientations, so a node with no edges at
/// all yields two tips. In a net graph the two bounding handles are
/// always tips because the view is sealed at the boundary.
pub fn find_tips<G: HandleGraph>(graph: &G) -> Vec<Handle> {
    let mut tips = Vec::new();
    graph.for_each_handle(|handle| {
        for oriented in [handle, handle.flip()] {
            let mut has_left_neighbor = false;
            graph.follow_edges(oriented, true, |_| {
                has_left_neighbor = true;
                false
            });
            if !has_left_neighbor {
                tips.push(oriented);
            }
        }
        true
    });
    tips
}

/// True if no directed walk over oriented handles returns to a handle it
/// has already visited: depth-first search with an explicit stack and
/// white/gray/black coloring.
pub fn is_directed_acyclic<G: HandleGraph>(graph: &G) -> bool {
    const ON_STACK: u8 = 1;
    const DONE: u8 = 2;

    let mut seeds = Vec::new();
    graph.for_each_handle(|handle| {
        seeds.push(handle);
        seeds.push(handle.flip());
        true
    });

    let successors = |handle: Handle| {
        let mut next = Vec::new();
        graph.follow_edges(handle, false, |neighbor| {
            next.push(neighbor);
            true
        });
        next
    };

    let mut state: HashMap<Handle, u8> = HashMap::new();
    for seed in seeds {
        if state.contains_key(&seed) {
            continue;
        }
        state.insert(seed, ON_STACK);
        let mut stack = vec![(seed, successors(seed), 0usize)];
        while let Some((handle, neighbors, cursor)) = stack.last_mut() {
            if *cursor < neighbors.len() {
                let next = neighbors[*cursor];
                *cursor += 1;
                match state.get(&next) {
                    Some(&ON_STACK) => return false,
                    Some(_) => {}
                    None => {
                        state.insert(next, ON_STACK);
                        let grandchildren = successors(next);
                        stack.push((next, grandchildren, 0));
                    }
                }
            } else {
                state.insert(*handle, DONE);
                stack.pop();
            }
        }
    }
    true
}
