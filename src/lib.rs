//! # snarl-kernel
//!
//! Topological decomposition of bidirected sequence graphs.
//!
//! The snarl kernel answers one question:
//!
//! > Given a variation graph, what is its recursive hierarchy of
//! > **snarls** and **chains**, and how is each snarl shaped?
//!
//! ## Core Contract
//!
//! 1. Consume a bottom-up boundary traversal from a pluggable
//!    [`SnarlFinder`] and classify every snarl (unary / ultrabubble /
//!    unclassified) with its connectivity flags.
//! 2. Own the resulting snarl forest in a [`SnarlManager`]: stable
//!    references, parent/child and chain indexes, canonical
//!    orientations, random-access queries.
//! 3. Expose any snarl's interior as a flat [`NetGraph`] in which each
//!    child chain or unary child snarl is a single meta-node.
//!
//! ## Architecture
//!
//! ```text
//! SnarlFinder → driver frames → SnarlManager → finish() → queries
//!                    ↓                               ↓
//!               NetGraph (connectivity,         NetGraph (on demand,
//!               tips, acyclicity)               per snarl)
//! ```
//!
//! ## Determinism Guarantees
//!
//! - The same event stream over the same graph produces the same
//!   records, chains, and canonical orientations.
//! - Regularization orients every snarl with its chain and flips a
//!   chain when fewer than half its snarls would be graph-ascending.
//! - The boundary index is invariant under orientation flips.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algorithms;
pub mod chain;
pub mod finder;
pub mod graph;
pub mod manager;
pub mod net_graph;
pub mod types;

// Re-exports
pub use types::{Endpoint, NodeId, NodeTraversal, Snarl, SnarlBounds, SnarlType, Visit, VisitTarget};
pub use types::visit::to_edge;
pub use chain::{Chain, ChainCursor, ChainError, ChainLink};
pub use graph::{Edge, GraphError, Handle, HandleGraph, MemoryGraph};
pub use manager::{ChainRef, SnarlError, SnarlManager, SnarlRef};
pub use net_graph::{Connectivity, NetGraph};
pub use finder::SnarlFinder;
pub use algorithms::{find_tips, is_directed_acyclic};
