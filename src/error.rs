//! Error taxonomy for a selection run.
//!
//! Every failure of the engine is returned as a [`SelectionError`]; nothing
//! in the pipeline panics on user input.

use thiserror::Error;

/// Structured failure of a selection run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SelectionError {
    /// Malformed or inconsistent input tables or request. No solve attempted.
    #[error("validation error: {0}")]
    Validation(String),

    /// Quotas are unsatisfiable even after the single flex relaxation.
    #[error("quotas are infeasible: {}", .diagnostics.join("; "))]
    Feasibility {
        /// Offending category/value bounds, one line each.
        diagnostics: Vec<String>,
    },

    /// The legacy search used its whole attempt budget without a feasible panel.
    #[error("no feasible panel found after {attempts} attempts")]
    AttemptsExhausted {
        /// Number of attempts made.
        attempts: usize,
    },

    /// The oracle returned an unexpected status or failed internally.
    #[error("solver error: {0}")]
    Solver(String),

    /// The run was cancelled between stages.
    #[error("selection cancelled")]
    Cancelled,
}

impl SelectionError {
    /// Whether the caller may reasonably retry with another algorithm or relaxed quotas.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SelectionError::AttemptsExhausted { .. } | SelectionError::Feasibility { .. }
        )
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, SelectionError>;
