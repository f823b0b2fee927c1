use thiserror::Error;

/// Why a run of steps was not fused.
///
/// `Unsupported` is the normal fallback outcome: the span stays in the step
/// chain and is interpreted. `IllegalState` signals a broken invariant inside
/// an opened run; the run is reverted as well, but the condition is logged as
/// a warning.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RewriteError {
    #[error("Unsupported for SQL compilation: {0}")]
    Unsupported(String),
    #[error("Illegal rewriter state: {0}")]
    IllegalState(String),
}

impl RewriteError {
    pub fn is_fallback(&self) -> bool {
        matches!(self, RewriteError::Unsupported(_))
    }

    pub fn unsupported_with_context(message: impl Into<String>, step: impl Into<String>) -> Self {
        RewriteError::Unsupported(format!("{}\n  Step: {}", message.into(), step.into()))
    }
}
