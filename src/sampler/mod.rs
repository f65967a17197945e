//! From probabilities to a concrete panel.
//!
//! # Key Components
//!
//! - [`decompose`]: writes a marginal vector as a convex combination of
//!   feasible panels, generating extra panels when the strategy's support
//!   falls short
//! - [`pipage_rounding`]: dependent rounding that keeps every marginal and
//!   the integral sum
//! - [`lottery_rounding`]: turns panel weights into `n` panel copies
//! - [`draw`]: picks the final panel from the lottery with a seeded RNG

use crate::constants::EPS2;
use crate::error::{Result, SelectionError};
use crate::oracle::{Comparison, Objective, Oracle, Program, VarId};
use crate::strategy::{Portfolio, ProbabilityVector, StrategyContext};
use rand::Rng;
use tracing::{debug, info, warn};

/// A distribution over feasible panels.
#[derive(Debug, Clone, PartialEq)]
pub struct Decomposition {
    /// Panels with positive weight, as sorted pool positions.
    pub panels: Vec<Vec<usize>>,
    /// Weight of each panel; sums to one.
    pub weights: Vec<f64>,
    /// Largest `|p_i - Σ_{P∋i} λ_P|` over all positions.
    pub max_deviation: f64,
}

impl Decomposition {
    /// Marginals realized by the decomposition.
    pub fn realized(&self, pool_size: usize) -> ProbabilityVector {
        ProbabilityVector::from_panels(pool_size, &self.panels, &self.weights)
    }
}

/// Result of drawing from a decomposition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// Panel indices forming the lottery, one entry per copy.
    pub lottery: Vec<usize>,
    /// Index of the selected panel.
    pub chosen: usize,
}

/// Decomposes `marginals` into a convex combination of feasible panels.
///
/// Starts from `support` and solves `min ε` subject to every position with
/// positive probability falling at most `ε` short. While `ε` exceeds the
/// configured tolerance, the panel maximizing the current deficits is added,
/// up to `decomposition_max_rounds` times. The remaining deviation is
/// measured, not hidden.
pub fn decompose<O: Oracle + ?Sized>(
    ctx: &StrategyContext<'_, O>,
    marginals: &ProbabilityVector,
    support: Vec<Vec<usize>>,
) -> Result<Decomposition> {
    let n = ctx.constraints.pool_size();
    let mut portfolio = Portfolio::new(n);
    for panel in support {
        portfolio.insert(panel);
    }
    if portfolio.is_empty() {
        let (panel, _) = ctx.best_panel(marginals.as_slice())?;
        portfolio.insert(panel);
    }

    let mut rounds = 0;
    let lambdas = loop {
        ctx.check_cancel()?;
        let (program, deficit) = deficit_program(&portfolio, marginals);
        let (_, assignment) = ctx.oracle.solve(&program).into_optimal("decomposition")?;
        let lambdas = assignment[..portfolio.len()].to_vec();
        let shortfall = assignment[deficit.0];
        debug!(shortfall, panels = portfolio.len(), "decomposition round");

        if shortfall <= ctx.config.decomposition_tolerance {
            break lambdas;
        }
        if rounds >= ctx.config.decomposition_max_rounds {
            warn!(shortfall, rounds, "decomposition stopped with a marginal deficit");
            break lambdas;
        }

        let realized = ProbabilityVector::from_panels(n, portfolio.panels(), &lambdas);
        let deficits: Vec<f64> = (0..n)
            .map(|i| (marginals.get(i) - realized.get(i)).max(0.0))
            .collect();
        let (panel, _) = ctx.best_panel(&deficits)?;
        if !portfolio.insert(panel) {
            warn!(shortfall, "decomposition priced a known panel");
            break lambdas;
        }
        rounds += 1;
    };

    let (panels, weights) = standardize(portfolio.panels(), &lambdas);
    if panels.is_empty() {
        return Err(SelectionError::Solver(
            "decomposition produced no panel with positive weight".into(),
        ));
    }
    let realized = ProbabilityVector::from_panels(n, &panels, &weights);
    let max_deviation = (0..n)
        .map(|i| (marginals.get(i) - realized.get(i)).abs())
        .fold(0.0, f64::max);
    info!(panels = panels.len(), max_deviation, "decomposition finished");

    Ok(Decomposition {
        panels,
        weights,
        max_deviation,
    })
}

fn deficit_program(portfolio: &Portfolio, marginals: &ProbabilityVector) -> (Program, VarId) {
    let mut program = Program::new("decomposition");
    let lambdas: Vec<VarId> = (0..portfolio.len())
        .map(|j| program.add_continuous(format!("lambda{j}"), 0.0, 1.0))
        .collect();
    let deficit = program.add_continuous("deficit", 0.0, f64::INFINITY);
    program.add_constraint(lambdas.iter().map(|&v| (v, 1.0)).collect(), Comparison::Eq, 1.0);

    for (i, &p) in marginals.as_slice().iter().enumerate() {
        if p <= EPS2 {
            continue;
        }
        let mut terms: Vec<(VarId, f64)> = portfolio
            .panels()
            .iter()
            .zip(&lambdas)
            .filter(|(panel, _)| panel.binary_search(&i).is_ok())
            .map(|(_, &v)| (v, 1.0))
            .collect();
        terms.push((deficit, 1.0));
        program.add_constraint(terms, Comparison::Ge, p);
    }
    program.set_objective(Objective::Minimize {
        terms: vec![(deficit, 1.0)],
    });
    (program, deficit)
}

/// Drops panels with weight below `1e-8` and renormalizes the rest.
pub fn standardize(panels: &[Vec<usize>], weights: &[f64]) -> (Vec<Vec<usize>>, Vec<f64>) {
    let (kept_panels, kept_weights): (Vec<Vec<usize>>, Vec<f64>) = panels
        .iter()
        .zip(weights)
        .filter(|(_, &w)| w >= EPS2)
        .map(|(panel, &w)| (panel.clone(), w.min(1.0)))
        .unzip();
    let total: f64 = kept_weights.iter().sum();
    let normalized = kept_weights.into_iter().map(|w| w / total).collect();
    (kept_panels, normalized)
}

/// Dependent rounding of `items`, each kept with its given probability.
///
/// Repeatedly shifts probability mass between the first two undecided items
/// until one of them reaches 0 or 1. Every marginal is preserved and, when
/// the probabilities sum to an integer, exactly that many items are returned.
pub fn pipage_rounding<T: Copy, R: Rng + ?Sized>(items: &[(T, f64)], rng: &mut R) -> Vec<T> {
    let mut pending: Vec<(T, f64)> = items.to_vec();
    let mut outcomes = Vec::new();
    loop {
        match pending.len() {
            0 => return outcomes,
            1 => {
                let (item, p) = pending[0];
                if rng.random::<f64>() < p {
                    outcomes.push(item);
                }
                return outcomes;
            }
            _ => {}
        }

        let (item0, mut p0) = pending[0];
        if p0 > 1.0 - EPS2 {
            outcomes.push(item0);
            pending.remove(0);
            continue;
        }
        if p0 < EPS2 {
            pending.remove(0);
            continue;
        }
        let (item1, mut p1) = pending[1];
        if p1 > 1.0 - EPS2 {
            outcomes.push(item1);
            pending.remove(1);
            continue;
        }
        if p1 < EPS2 {
            pending.remove(1);
            continue;
        }

        let raise_first = (1.0 - p0).min(p1);
        let lower_first = p0.min(1.0 - p1);
        if rng.random::<f64>() < lower_first / (raise_first + lower_first) {
            p0 += raise_first;
            p1 -= raise_first;
        } else {
            p0 -= lower_first;
            p1 += lower_first;
        }
        pending[0] = (item0, p0);
        pending[1] = (item1, p1);
    }
}

/// Rounds panel weights to a lottery of `n` panel indices.
///
/// Panel `j` receives `⌊n·λ_j⌋` copies; the fractional remainders are
/// rounded up or down by [`pipage_rounding`].
pub fn lottery_rounding<R: Rng + ?Sized>(weights: &[f64], n: usize, rng: &mut R) -> Vec<usize> {
    let mut copies = Vec::with_capacity(weights.len());
    let mut residuals = Vec::with_capacity(weights.len());
    for (j, &w) in weights.iter().enumerate() {
        let scaled = w * n as f64;
        let whole = scaled.floor();
        copies.push(whole as usize);
        residuals.push((j, (scaled - whole).clamp(0.0, 1.0)));
    }
    for j in pipage_rounding(&residuals, rng) {
        copies[j] += 1;
    }
    copies
        .into_iter()
        .enumerate()
        .flat_map(|(j, c)| std::iter::repeat(j).take(c))
        .collect()
}

/// Builds a lottery of `number_selections` panels from `weights` and draws
/// one of them uniformly.
///
/// # Errors
///
/// [`SelectionError::Solver`] if `weights` is empty.
pub fn draw<R: Rng + ?Sized>(
    weights: &[f64],
    number_selections: usize,
    rng: &mut R,
) -> Result<Sample> {
    if weights.is_empty() {
        return Err(SelectionError::Solver("cannot draw from an empty distribution".into()));
    }
    let lottery = lottery_rounding(weights, number_selections.max(1), rng);
    let chosen = if lottery.is_empty() {
        categorical(weights, rng)
    } else {
        lottery[rng.random_range(0..lottery.len())]
    };
    Ok(Sample { lottery, chosen })
}

fn categorical<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> usize {
    let total: f64 = weights.iter().sum();
    let mut target = rng.random::<f64>() * total;
    for (j, &w) in weights.iter().enumerate() {
        if target < w {
            return j;
        }
        target -= w;
    }
    weights.len() - 1
}
