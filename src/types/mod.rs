//! Core value types for the snarl kernel.

pub mod endpoint;
pub mod snarl;
pub mod visit;

pub use endpoint::{Endpoint, NodeId, NodeTraversal};
pub use snarl::{Snarl, SnarlType};
pub use visit::{to_edge, SnarlBounds, Visit, VisitTarget};
