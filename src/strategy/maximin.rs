//! Maximin: maximize the smallest selection probability.
//!
//! # Algorithm
//!
//! 1. Build a starting portfolio with one multiplicative-weights round per
//!    candidate.
//! 2. Column generation on the dual LP
//!    `min z  s.t.  Σ_{i∈P} y_i <= z  ∀P,  Σ y = 1,  y >= 0`,
//!    pricing with the panel that maximizes `Σ y_i`. A priced panel that
//!    violates its row by more than `leximin_epsilon` joins the portfolio,
//!    followed by up to ten cheap heuristic rounds that rescale `y` instead
//!    of re-solving.
//! 3. Bisection on the floor `p`: is there a distribution over the
//!    portfolio giving every coverable candidate at least `p`?

use super::portfolio::Portfolio;
use super::{normalize_weights, ProbabilityVector, StrategyContext, StrategyOutput, StrategyReport};
use crate::error::{Result, SelectionError};
use crate::oracle::{Comparison, Objective, Oracle, OracleOutcome, Program, VarId};
use tracing::{debug, info, warn};

pub(super) fn run<O: Oracle + ?Sized>(ctx: &StrategyContext<'_, O>) -> Result<StrategyReport> {
    let n = ctx.constraints.pool_size();
    let eps = ctx.config.leximin_epsilon;
    let mut messages = vec!["Using maximin algorithm.".to_string()];
    let mut warning = None;

    let mut portfolio = ctx.initial_portfolio(n)?;
    messages.extend(portfolio.take_messages());
    let covered = portfolio.covered_positions();

    let mut rounds = 0;
    let mut converged = false;
    while rounds < ctx.config.max_column_rounds {
        ctx.check_cancel()?;
        rounds += 1;

        let (program, z, y) = dual_program(&portfolio, &covered, n);
        let (_, assignment) = ctx.oracle.solve(&program).into_optimal("maximin dual")?;
        let mut upper = assignment[z.0];
        let mut weights = vec![0.0; n];
        for (&i, var) in covered.iter().zip(&y) {
            weights[i] = assignment[var.0];
        }

        let (panel, mut value) = ctx.best_panel(&weights)?;
        let line = format!(
            "Maximin is at most {:.2}%, can do {:.2}% with {} panels.",
            value * 100.0,
            upper * 100.0,
            portfolio.len()
        );
        debug!(%line, round = rounds, "maximin pricing");
        messages.push(line);

        if value <= upper + eps || !portfolio.insert(panel) {
            converged = true;
            break;
        }

        let mut added = 0;
        for _ in 0..10 {
            let last = &portfolio.panels()[portfolio.len() - 1];
            for &i in last {
                weights[i] *= upper / value;
            }
            let total: f64 = weights.iter().sum();
            if total < eps {
                break;
            }
            for w in &mut weights {
                *w /= total;
            }
            upper /= total;

            let (panel, priced) = ctx.best_panel(&weights)?;
            value = priced;
            if value <= upper + eps || !portfolio.insert(panel) {
                break;
            }
            added += 1;
        }
        if added > 0 {
            debug!(added, "heuristic generated additional panels");
        }
    }
    if !converged {
        let text = format!(
            "maximin column generation stopped after {rounds} rounds without proving optimality"
        );
        warn!(%text);
        warning = Some(text);
    }

    let (floor, lambdas, floor_warning) = bisect_floor(ctx, &portfolio, &covered)?;
    if let Some(text) = floor_warning {
        warn!(%text);
        warning.get_or_insert(text);
    }
    info!(floor, panels = portfolio.len(), "maximin distribution found");
    messages.push(format!(
        "Maximin guarantees every candidate {:.4}% selection probability.",
        floor * 100.0
    ));

    let marginals = ProbabilityVector::from_panels(n, portfolio.panels(), &lambdas);
    Ok(StrategyReport {
        output: StrategyOutput::Distribution {
            marginals,
            support: portfolio.into_panels(),
        },
        messages,
        warning,
        rounds,
    })
}

/// Dual LP restricted to the portfolio: returns the program, `z`, and one
/// `y` per covered position.
fn dual_program(
    portfolio: &Portfolio,
    covered: &[usize],
    n: usize,
) -> (Program, VarId, Vec<VarId>) {
    let mut program = Program::new("maximin dual");
    let z = program.add_continuous("z", 0.0, f64::INFINITY);
    let y: Vec<VarId> = covered
        .iter()
        .map(|&i| program.add_continuous(format!("y{i}"), 0.0, 1.0))
        .collect();

    let mut var_of = vec![None; n];
    for (&i, &v) in covered.iter().zip(&y) {
        var_of[i] = Some(v);
    }
    program.add_constraint(y.iter().map(|&v| (v, 1.0)).collect(), Comparison::Eq, 1.0);
    for panel in portfolio.panels() {
        let mut terms: Vec<(VarId, f64)> = panel
            .iter()
            .filter_map(|&i| var_of[i])
            .map(|v| (v, 1.0))
            .collect();
        terms.push((z, -1.0));
        program.add_constraint(terms, Comparison::Le, 0.0);
    }
    program.set_objective(Objective::Minimize {
        terms: vec![(z, 1.0)],
    });
    (program, z, y)
}

/// Distribution over the portfolio in which every covered position has
/// probability at least `floor`.
fn floor_program(portfolio: &Portfolio, covered: &[usize], floor: f64) -> Program {
    let mut program = Program::new("maximin floor");
    let lambdas: Vec<VarId> = (0..portfolio.len())
        .map(|j| program.add_continuous(format!("lambda{j}"), 0.0, 1.0))
        .collect();
    program.add_constraint(lambdas.iter().map(|&v| (v, 1.0)).collect(), Comparison::Eq, 1.0);
    for &i in covered {
        let terms = portfolio
            .panels()
            .iter()
            .zip(&lambdas)
            .filter(|(panel, _)| panel.binary_search(&i).is_ok())
            .map(|(_, &v)| (v, 1.0))
            .collect();
        program.add_constraint(terms, Comparison::Ge, floor);
    }
    program
}

/// Bisects the floor on `[0, 1]`; returns the best floor, its panel
/// weights, and a warning if the step cap was hit.
fn bisect_floor<O: Oracle + ?Sized>(
    ctx: &StrategyContext<'_, O>,
    portfolio: &Portfolio,
    covered: &[usize],
) -> Result<(f64, Vec<f64>, Option<String>)> {
    let (_, mut best) = ctx
        .oracle
        .solve(&floor_program(portfolio, covered, 0.0))
        .into_optimal("maximin floor")?;

    let (mut lo, mut hi) = (0.0_f64, 1.0_f64);
    let mut steps = 0;
    let mut warning = None;
    while hi - lo > ctx.config.maximin_tolerance {
        if steps == ctx.config.maximin_max_iterations {
            warning = Some(format!(
                "maximin bisection stopped after {steps} steps with floor in [{lo:.6}, {hi:.6}]"
            ));
            break;
        }
        ctx.check_cancel()?;
        steps += 1;

        let mid = 0.5 * (lo + hi);
        match ctx.oracle.solve(&floor_program(portfolio, covered, mid)) {
            OracleOutcome::Optimal { assignment, .. } => {
                lo = mid;
                best = assignment;
            }
            OracleOutcome::Infeasible => hi = mid,
            OracleOutcome::Unbounded => {
                return Err(SelectionError::Solver(
                    "maximin floor: solver reports the program unbounded".into(),
                ))
            }
            OracleOutcome::IterationLimit { .. } => {
                return Err(SelectionError::Solver(
                    "maximin floor: solver stopped at its iteration cap".into(),
                ))
            }
            OracleOutcome::Error(msg) => {
                return Err(SelectionError::Solver(format!("maximin floor: {msg}")))
            }
        }
    }
    Ok((lo, normalize_weights(&best), warning))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::MicroLpOracle;
    use crate::selection::SelectionConfig;
    use crate::strategy::test_support;

    fn marginals_of(report: &StrategyReport) -> &ProbabilityVector {
        match &report.output {
            StrategyOutput::Distribution { marginals, .. } => marginals,
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[test]
    fn test_maximin_cartoon() {
        let (pool, set) = test_support::cartoon(false);
        let config = SelectionConfig::default();
        let oracle = MicroLpOracle::new();
        let ctx = StrategyContext::new(&set, &pool, &oracle, &config);

        let report = run(&ctx).unwrap();
        let p = marginals_of(&report);
        let third = 1.0 / 3.0;
        for (i, expected) in [(0, third), (1, 2.0 * third), (2, third), (3, third), (4, third)] {
            assert!((p.get(i) - expected).abs() < 1e-4, "position {i}: {}", p.get(i));
        }
        assert!((p.sum() - 2.0).abs() < 1e-6);
        assert!(report.warning.is_none());
        assert_eq!(report.messages[0], "Using maximin algorithm.");
    }

    #[test]
    fn test_maximin_with_households() {
        let (pool, set) = test_support::cartoon(true);
        let config = SelectionConfig::default();
        let oracle = MicroLpOracle::new();
        let ctx = StrategyContext::new(&set, &pool, &oracle, &config);

        let report = run(&ctx).unwrap();
        let p = marginals_of(&report);
        assert!(p.get(0).abs() < 1e-9);
        assert!(p.get(4).abs() < 1e-9);
        assert!((p.get(1) - 1.0).abs() < 1e-4);
        assert!((p.get(2) - 0.5).abs() < 1e-4);
        assert!((p.get(3) - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_maximin_politics_floor() {
        let (pool, set) = test_support::politics();
        let config = SelectionConfig::default();
        let oracle = MicroLpOracle::new();
        let ctx = StrategyContext::new(&set, &pool, &oracle, &config);

        let report = run(&ctx).unwrap();
        let p = marginals_of(&report);
        assert!(p.min_over(&(0..7).collect::<Vec<_>>()) >= 0.5 - 1e-4);
        assert!((p.get(4) - 0.5).abs() < 1e-4);
        assert!((p.get(6) - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_bisection_cap_warns() {
        let (pool, set) = test_support::cartoon(false);
        let config = SelectionConfig::default().with_maximin_max_iterations(3);
        let oracle = MicroLpOracle::new();
        let ctx = StrategyContext::new(&set, &pool, &oracle, &config);

        let report = run(&ctx).unwrap();
        assert!(report.warning.as_deref().unwrap_or("").contains("bisection"));
        let p = marginals_of(&report);
        assert!((p.sum() - 2.0).abs() < 1e-6);
    }
}
