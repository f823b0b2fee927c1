use thiserror::Error;

use crate::graph_catalog::GraphSchemaError;

/// Invariant violations while building or walking a query tree. None of
/// these are user errors; each one aborts compilation of the traversal.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueryTreeError {
    #[error("Path-stack must start at the tree root, got node {0}")]
    NotRoot(usize),
    #[error("The root node {0} cannot be removed")]
    RootRemoval(usize),
    #[error("Direction BOTH reached physical join construction at node {0}")]
    UnresolvedBothDirection(usize),
    #[error("Cannot attach {child} below {parent}: vertex and edge tables must alternate")]
    KindAlternation { parent: String, child: String },
    #[error("Unknown query tree node {0}")]
    UnknownNode(usize),
    #[error("Hop of kind {0} cannot expand an existing node")]
    NotExpandable(String),
    #[error(transparent)]
    Schema(#[from] GraphSchemaError),
}
