//! Result and state-machine types of a selection run.

use crate::model::CategoryCount;
use crate::pool::Candidate;
use crate::quota::BoundKind;
use crate::strategy::Algorithm;
use std::collections::HashSet;
use std::fmt;

/// Stage of the orchestrator state machine.
///
/// `Validating → Probing → [Relaxed] → Optimizing → Sampling → Done`, with
/// `Failed` reachable from every non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Stage {
    /// Checking the request, tables and configuration.
    Validating,
    /// Looking for a panel under the exact quotas.
    Probing,
    /// The exact quotas failed; the flex bounds are active.
    Relaxed,
    /// Running the selection algorithm.
    Optimizing,
    /// Decomposing and drawing the final panel.
    Sampling,
    /// Finished with a panel.
    Done,
    /// Finished with an error.
    Failed,
}

impl Stage {
    fn rank(self) -> u8 {
        match self {
            Stage::Validating => 0,
            Stage::Probing => 1,
            Stage::Relaxed => 2,
            Stage::Optimizing => 3,
            Stage::Sampling => 4,
            Stage::Done => 5,
            Stage::Failed => 6,
        }
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }

    /// Whether the state machine may move from `self` to `next`.
    ///
    /// Moves are forward-only (stages may be skipped), `Relaxed` can only be
    /// entered from `Probing`, and `Failed` from any non-terminal stage.
    pub fn can_transition_to(self, next: Stage) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Stage::Failed => true,
            Stage::Relaxed => self == Stage::Probing,
            _ => next.rank() > self.rank(),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validating => "validating",
            Stage::Probing => "probing",
            Stage::Relaxed => "relaxed",
            Stage::Optimizing => "optimizing",
            Stage::Sampling => "sampling",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Whether the algorithm reached its optimality criterion.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SelectionStatus {
    /// Converged within tolerance.
    Converged,
    /// An iteration cap stopped the algorithm; the panel is still feasible.
    NotConverged {
        /// What stopped early.
        warning: String,
    },
}

/// Outcome of a successful selection run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SelectionResult {
    /// The panel, in pool order.
    pub selected: Vec<Candidate>,

    /// Everyone not selected, in pool order.
    pub remaining: Vec<Candidate>,

    /// Achieved count of every `(category, value)` against the active bounds.
    pub category_counts: Vec<CategoryCount>,

    /// Convergence status.
    pub status: SelectionStatus,

    /// Narrative lines collected during the run.
    pub messages: Vec<String>,

    /// Algorithm that produced the panel.
    pub algorithm: Algorithm,

    /// Whether the quotas had to be relaxed to their flex bounds.
    pub relaxed: bool,

    /// Bounds the panel satisfies.
    pub bound_kind: BoundKind,

    /// `(id, probability)` for every candidate; `None` for legacy and test
    /// selection.
    pub marginals: Option<Vec<(String, f64)>>,

    /// Panels of the lottery as id lists, when more than one was requested.
    pub lottery: Vec<Vec<String>>,

    /// Largest gap between the target marginals and the sampled distribution.
    pub max_marginal_deviation: Option<f64>,

    /// Stages the run went through.
    pub stages: Vec<Stage>,

    /// Seed the run actually used.
    pub seed: u64,
}

impl SelectionResult {
    /// Ids of the selected candidates.
    pub fn selected_ids(&self) -> Vec<&str> {
        self.selected.iter().map(|c| c.id.as_str()).collect()
    }

    /// Ids of the remaining candidates.
    pub fn remaining_ids(&self) -> Vec<&str> {
        self.remaining.iter().map(|c| c.id.as_str()).collect()
    }

    /// Whether the algorithm converged.
    pub fn is_converged(&self) -> bool {
        self.status == SelectionStatus::Converged
    }

    /// Remaining candidates minus anyone sharing an address with a selected
    /// candidate, and how many were dropped for that reason.
    pub fn remaining_excluding_households(&self) -> (Vec<&Candidate>, usize) {
        let taken: HashSet<&str> = self
            .selected
            .iter()
            .filter_map(|c| c.address.as_deref())
            .collect();
        let (kept, dropped): (Vec<&Candidate>, Vec<&Candidate>) = self
            .remaining
            .iter()
            .partition(|c| c.address.as_deref().map_or(true, |a| !taken.contains(a)));
        (kept, dropped.len())
    }
}
