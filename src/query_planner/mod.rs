//! Rewriting step chains into fused SQL hops.
//!
//! [`StepChainRewriter`] scans a [`Traversal`](crate::traversal::Traversal)
//! and replaces every fusible run with a [`CompiledTraversal`]. Each
//! compiled run turns into query trees against a
//! [`Topology`](crate::graph_catalog::Topology) via
//! [`CompiledTraversal::build_trees`].

pub mod compiled;
pub mod errors;
pub mod feasibility;
pub mod has_classifier;
pub mod hop_descriptor;
pub mod rewriter;

pub use compiled::CompiledTraversal;
pub use errors::RewriteError;
pub use hop_descriptor::{HopDescriptor, HopKind};
pub use rewriter::{Fallback, RewriteOutcome, StepChainRewriter};
