//! Selection algorithms.
//!
//! Four strategies turn a feasible [`ConstraintSet`] into either one panel or
//! a marginal selection-probability vector over the pool:
//!
//! - **Legacy**: randomized greedy search for a single feasible panel.
//! - **Maximin**: maximizes the smallest selection probability.
//! - **Leximin**: maximizes the smallest, then the second smallest, and so on.
//! - **Nash**: maximizes the product of selection probabilities.
//!
//! The three fractional strategies work by column generation: they keep a
//! portfolio of integral panels and ask the oracle for the panel maximizing
//! a weighted member count whenever the current portfolio may be
//! insufficient. The portfolio is returned with the probabilities so the
//! sampler can decompose over it.

mod legacy;
mod leximin;
mod maximin;
mod nash;
mod portfolio;

pub use portfolio::Portfolio;

use crate::error::{Result, SelectionError};
use crate::model::ConstraintSet;
use crate::oracle::Oracle;
use crate::pool::CandidatePool;
use crate::selection::SelectionConfig;
use rand::rngs::StdRng;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

/// Selection algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Algorithm {
    /// Randomized greedy search.
    Legacy,
    /// Maximize the minimum selection probability.
    Maximin,
    /// Lexicographically maximize the sorted probability vector.
    #[default]
    Leximin,
    /// Maximize the sum of log probabilities.
    Nash,
}

impl Algorithm {
    /// Lower-case name, as accepted by [`FromStr`].
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Legacy => "legacy",
            Algorithm::Maximin => "maximin",
            Algorithm::Leximin => "leximin",
            Algorithm::Nash => "nash",
        }
    }

    /// Whether the algorithm produces a probability vector.
    pub fn is_fractional(&self) -> bool {
        !matches!(self, Algorithm::Legacy)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = SelectionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" => Ok(Algorithm::Legacy),
            "maximin" => Ok(Algorithm::Maximin),
            "leximin" => Ok(Algorithm::Leximin),
            "nash" => Ok(Algorithm::Nash),
            other => Err(SelectionError::Validation(format!(
                "unknown selection algorithm '{other}', \
                 must be one of legacy, maximin, leximin, nash"
            ))),
        }
    }
}

/// Marginal selection probability of every pool position.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityVector {
    values: Vec<f64>,
}

impl ProbabilityVector {
    /// Wraps per-position probabilities, clamping each into `[0, 1]`.
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values: values.into_iter().map(|p| p.clamp(0.0, 1.0)).collect(),
        }
    }

    /// Marginals realized by a distribution over panels.
    pub fn from_panels(pool_size: usize, panels: &[Vec<usize>], weights: &[f64]) -> Self {
        let mut values = vec![0.0; pool_size];
        for (panel, &w) in panels.iter().zip(weights) {
            for &i in panel {
                values[i] += w;
            }
        }
        Self::new(values)
    }

    /// Probability of position `i`.
    pub fn get(&self, i: usize) -> f64 {
        self.values[i]
    }

    /// All probabilities.
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Number of positions.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the vector is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sum of all probabilities; the expected panel size.
    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Smallest probability among `positions`.
    pub fn min_over(&self, positions: &[usize]) -> f64 {
        positions
            .iter()
            .map(|&i| self.values[i])
            .fold(f64::INFINITY, f64::min)
    }

    /// Probabilities sorted ascending.
    pub fn sorted_ascending(&self) -> Vec<f64> {
        let mut sorted = self.values.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        sorted
    }
}

/// What a strategy hands to the sampler.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyOutput {
    /// A concrete panel (legacy).
    Panel(Vec<usize>),
    /// Marginal probabilities and the panels that support them.
    Distribution {
        /// Per-position marginals, summing to the panel size.
        marginals: ProbabilityVector,
        /// Feasible panels the strategy discovered.
        support: Vec<Vec<usize>>,
    },
}

/// Result of one strategy run.
#[derive(Debug, Clone)]
pub struct StrategyReport {
    /// Panel or distribution.
    pub output: StrategyOutput,
    /// Narrative lines.
    pub messages: Vec<String>,
    /// Set when an iteration cap stopped the algorithm early.
    pub warning: Option<String>,
    /// Outer rounds (leximin) or column-generation rounds used.
    pub rounds: usize,
}

/// Everything a strategy needs for one run.
pub struct StrategyContext<'a, O: Oracle + ?Sized> {
    /// Active constraints.
    pub constraints: &'a ConstraintSet,
    /// Pool, used only to name candidates in messages.
    pub pool: &'a CandidatePool,
    /// Solve service.
    pub oracle: &'a O,
    /// Numeric tunables.
    pub config: &'a SelectionConfig,
    /// Cooperative cancellation flag.
    pub cancel: Option<&'a AtomicBool>,
}

impl<'a, O: Oracle + ?Sized> StrategyContext<'a, O> {
    /// Creates a context without cancellation.
    pub fn new(
        constraints: &'a ConstraintSet,
        pool: &'a CandidatePool,
        oracle: &'a O,
        config: &'a SelectionConfig,
    ) -> Self {
        Self {
            constraints,
            pool,
            oracle,
            config,
            cancel: None,
        }
    }

    /// Attaches a cancellation flag.
    pub fn with_cancel(mut self, cancel: Option<&'a AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns [`SelectionError::Cancelled`] once the flag is set.
    pub fn check_cancel(&self) -> Result<()> {
        match self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(SelectionError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Id of pool position `i`, for messages.
    pub(crate) fn id_of(&self, i: usize) -> &str {
        self.pool.get(i).map(|c| c.id.as_str()).unwrap_or("?")
    }
}

/// Clips panel weights into `[0, 1]` and rescales them to sum to one.
pub(crate) fn normalize_weights(weights: &[f64]) -> Vec<f64> {
    let clipped: Vec<f64> = weights.iter().map(|w| w.clamp(0.0, 1.0)).collect();
    let total: f64 = clipped.iter().sum();
    if total <= 0.0 {
        return clipped;
    }
    clipped.into_iter().map(|w| w / total).collect()
}

/// Runs `algorithm` on the context.
///
/// `rng` and `max_attempts` are used only by the legacy algorithm; the
/// fractional algorithms are deterministic given the oracle.
pub fn run_strategy<O: Oracle + ?Sized>(
    algorithm: Algorithm,
    ctx: &StrategyContext<'_, O>,
    rng: &mut StdRng,
    max_attempts: usize,
) -> Result<StrategyReport> {
    match algorithm {
        Algorithm::Legacy => legacy::run(ctx, rng, max_attempts),
        Algorithm::Maximin => maximin::run(ctx),
        Algorithm::Leximin => leximin::run(ctx),
        Algorithm::Nash => nash::run(ctx),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::model::ConstraintSet;
    use crate::pool::{Candidate, CandidatePool};
    use crate::quota::{BoundKind, QuotaTable, QuotaTarget};

    /// Five candidates, panels of two: exactly one child, one adult, one
    /// simpsons and one ducktales member. Feasible panels are
    /// {lisa, scrooge}, {marge, louie} and {marge, dewey}.
    pub fn cartoon(check_same_address: bool) -> (CandidatePool, ConstraintSet) {
        let people = [
            ("lisa", "child", "simpsons", "1"),
            ("marge", "adult", "simpsons", "3"),
            ("louie", "child", "ducktales", "2"),
            ("dewey", "child", "ducktales", "2"),
            ("scrooge", "adult", "ducktales", "1"),
        ];
        let pool = CandidatePool::new(
            people
                .iter()
                .map(|&(id, age, franchise, home)| {
                    Candidate::new(id)
                        .with_feature("age", age)
                        .with_feature("franchise", franchise)
                        .with_address(home)
                })
                .collect(),
        )
        .unwrap();
        let quotas = QuotaTable::new(vec![
            QuotaTarget::new("age", "child", 1, 2),
            QuotaTarget::new("age", "adult", 1, 2),
            QuotaTarget::new("franchise", "simpsons", 1, 2),
            QuotaTarget::new("franchise", "ducktales", 1, 2),
        ])
        .unwrap();
        let set =
            ConstraintSet::build(&pool, &quotas, 2, BoundKind::Exact, check_same_address).unwrap();
        (pool, set)
    }

    /// Seven candidates, panels of five: four men, one woman, four liberals
    /// and one conservative.
    pub fn politics() -> (CandidatePool, ConstraintSet) {
        let people = [
            ("adam", "male", "liberal"),
            ("brian", "male", "liberal"),
            ("cameron", "male", "liberal"),
            ("dave", "male", "liberal"),
            ("elinor", "female", "liberal"),
            ("frank", "male", "conservative"),
            ("grace", "female", "conservative"),
        ];
        let pool = CandidatePool::new(
            people
                .iter()
                .map(|&(id, gender, political)| {
                    Candidate::new(id)
                        .with_feature("gender", gender)
                        .with_feature("political", political)
                })
                .collect(),
        )
        .unwrap();
        let quotas = QuotaTable::new(vec![
            QuotaTarget::new("gender", "female", 1, 1),
            QuotaTarget::new("gender", "male", 4, 4),
            QuotaTarget::new("political", "liberal", 4, 4),
            QuotaTarget::new("political", "conservative", 1, 1),
        ])
        .unwrap();
        let set = ConstraintSet::build(&pool, &quotas, 5, BoundKind::Exact, false).unwrap();
        (pool, set)
    }
}
