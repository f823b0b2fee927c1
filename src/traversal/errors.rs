use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TraversalParseError {
    #[error("Unable to parse traversal at offset {offset}: near `{near}`")]
    Syntax { offset: usize, near: String },
    #[error("Traversal must start with g.V(..) or g.E(..), found `{found}`")]
    MissingSource { found: String },
    #[error("Unexpected input after traversal: `{0}`")]
    TrailingInput(String),
    #[error("Invalid arguments for `{step}`: {reason}")]
    InvalidArgument { step: String, reason: String },
    #[error("Unknown predicate `{0}`")]
    UnknownPredicate(String),
    #[error("`{modulator}` does not follow or precede a {target} step")]
    DanglingModulator {
        modulator: String,
        target: &'static str,
    },
}

impl TraversalParseError {
    pub fn invalid_argument(step: impl Into<String>, reason: impl Into<String>) -> Self {
        TraversalParseError::InvalidArgument {
            step: step.into(),
            reason: reason.into(),
        }
    }
}
