use thiserror::Error;

use crate::query_tree::QueryTreeError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SqlGenerationError {
    #[error("Predicate {0} has no SQL rendering")]
    UntranslatablePredicate(String),
    #[error("Full-text search is not supported by the {0} dialect")]
    FullTextUnsupported(&'static str),
    #[error("order().by(select('{0}')) names no labelled step of this query")]
    UnknownLabel(String),
    #[error("Cannot compile an empty path-stack")]
    EmptyStack,
    #[error("Invalid query plan: {0}")]
    InvalidPlan(String),
    #[error(transparent)]
    Tree(#[from] QueryTreeError),
}

impl SqlGenerationError {
    pub fn untranslatable_with_context(predicate: impl Into<String>, context: impl Into<String>) -> Self {
        SqlGenerationError::UntranslatablePredicate(format!(
            "{}\n  Context: {}",
            predicate.into(),
            context.into()
        ))
    }
}
