//! Leximin: maximize the smallest probability, then the next smallest, and
//! so on.
//!
//! Every outer round maximizes the minimum over the free candidates while
//! the fixed ones keep at least their fixed probability. The round is a
//! column generation on the dual
//!
//! ```text
//! min  ŷ - Σ_fixed f_i y_i
//! s.t. Σ_{i∈P} y_i <= ŷ   for every panel P in the portfolio
//!      Σ_free y_i = 1
//!      y, ŷ >= 0
//! ```
//!
//! Once no panel prices above `ŷ + ε`, every free candidate whose dual
//! weight exceeds `ε` is tight and gets fixed at the dual objective.

use super::portfolio::Portfolio;
use super::{ProbabilityVector, StrategyContext, StrategyOutput, StrategyReport};
use crate::constants::{LEXIMIN_MAX_REDUCTIONS, LEXIMIN_RELAX_STEP};
use crate::error::{Result, SelectionError};
use crate::oracle::{Comparison, Objective, Oracle, OracleOutcome, Program, VarId};
use tracing::{debug, info, warn};

pub(super) fn run<O: Oracle + ?Sized>(ctx: &StrategyContext<'_, O>) -> Result<StrategyReport> {
    let n = ctx.constraints.pool_size();
    let eps = ctx.config.leximin_epsilon;
    let mut messages = vec!["Using leximin algorithm.".to_string()];
    let mut warning = None;

    let mut portfolio = ctx.initial_portfolio(3 * n)?;
    messages.extend(portfolio.take_messages());

    let mut fixed: Vec<Option<f64>> = (0..n)
        .map(|i| if portfolio.is_covered(i) { None } else { Some(0.0) })
        .collect();
    let mut outer_rounds = 0;
    let mut reductions = 0;

    'outer: while fixed.iter().any(Option::is_none) {
        outer_rounds += 1;
        debug!(
            fixed = fixed.iter().filter(|f| f.is_some()).count(),
            total = n,
            "leximin round"
        );

        let mut column_rounds = 0;
        loop {
            ctx.check_cancel()?;
            let dual = DualStage::build(&portfolio, &fixed);
            let assignment = match ctx.oracle.solve(&dual.program) {
                OracleOutcome::Optimal { assignment, .. } => assignment,
                OracleOutcome::Infeasible | OracleOutcome::Unbounded => {
                    reductions += 1;
                    if reductions > LEXIMIN_MAX_REDUCTIONS {
                        return Err(SelectionError::Solver(format!(
                            "leximin dual stayed unsolvable after lowering fixed \
                             probabilities {LEXIMIN_MAX_REDUCTIONS} times"
                        )));
                    }
                    warn!(reductions, "leximin dual not optimal, lowering fixed probabilities");
                    for (i, value) in fixed.iter_mut().enumerate() {
                        if let Some(p) = value {
                            if portfolio.is_covered(i) {
                                *p = (*p - LEXIMIN_RELAX_STEP).max(0.0);
                            }
                        }
                    }
                    continue;
                }
                OracleOutcome::IterationLimit { .. } => {
                    return Err(SelectionError::Solver(
                        "leximin dual: solver stopped at its iteration cap".into(),
                    ))
                }
                OracleOutcome::Error(msg) => {
                    return Err(SelectionError::Solver(format!("leximin dual: {msg}")))
                }
            };

            let weights = dual.weights(&assignment, n);
            let upper = assignment[dual.cap.0];
            let dual_obj = upper
                - fixed
                    .iter()
                    .zip(&weights)
                    .filter_map(|(f, &y)| f.map(|p| p * y))
                    .sum::<f64>();

            let (panel, value) = ctx.best_panel(&weights)?;
            debug!(
                bound = dual_obj - upper + value,
                achieved = dual_obj,
                panels = portfolio.len(),
                "leximin pricing"
            );

            if value <= upper + eps || portfolio.contains(&panel) {
                fix_tight(&mut fixed, &weights, dual_obj.max(0.0), eps);
                continue 'outer;
            }

            portfolio.insert(panel);
            column_rounds += 1;
            if column_rounds >= ctx.config.max_column_rounds {
                let text = format!(
                    "leximin column generation hit {column_rounds} rounds; \
                     remaining probabilities fixed at {:.6}",
                    dual_obj.max(0.0)
                );
                warn!(%text);
                warning = Some(text);
                for value in fixed.iter_mut().filter(|f| f.is_none()) {
                    *value = Some(dual_obj.max(0.0));
                }
                break 'outer;
            }
        }
    }

    if warning.is_none() {
        info!(rounds = outer_rounds, panels = portfolio.len(), "leximin converged");
        messages.push(format!("Leximin converged in {outer_rounds} rounds."));
    }

    let marginals = ProbabilityVector::new(fixed.into_iter().map(|f| f.unwrap_or(0.0)).collect());
    Ok(StrategyReport {
        output: StrategyOutput::Distribution {
            marginals,
            support: portfolio.into_panels(),
        },
        messages,
        warning,
        rounds: outer_rounds,
    })
}

/// Fixes every free position whose dual weight exceeds `eps`; if none does,
/// fixes the one with the largest weight so the round makes progress.
fn fix_tight(fixed: &mut [Option<f64>], weights: &[f64], probability: f64, eps: f64) {
    let mut any = false;
    let mut heaviest: Option<usize> = None;
    for (i, &y) in weights.iter().enumerate() {
        if fixed[i].is_some() {
            continue;
        }
        if y > eps {
            fixed[i] = Some(probability);
            any = true;
        } else {
            match heaviest {
                Some(h) if weights[h] >= y => {}
                _ => heaviest = Some(i),
            }
        }
    }
    if !any {
        if let Some(i) = heaviest {
            fixed[i] = Some(probability);
        }
    }
}

/// Restricted dual of one leximin round.
struct DualStage {
    program: Program,
    cap: VarId,
    /// `(position, y)` for every covered position.
    vars: Vec<(usize, VarId)>,
}

impl DualStage {
    fn build(portfolio: &Portfolio, fixed: &[Option<f64>]) -> Self {
        let mut program = Program::new("leximin dual");
        let cap = program.add_continuous("cap", 0.0, f64::INFINITY);

        let mut var_of = vec![None; fixed.len()];
        let mut vars = Vec::new();
        for i in portfolio.covered_positions() {
            let v = program.add_continuous(format!("y{i}"), 0.0, f64::INFINITY);
            var_of[i] = Some(v);
            vars.push((i, v));
        }

        program.add_constraint(
            vars.iter()
                .filter(|(i, _)| fixed[*i].is_none())
                .map(|&(_, v)| (v, 1.0))
                .collect(),
            Comparison::Eq,
            1.0,
        );
        for panel in portfolio.panels() {
            let mut terms: Vec<(VarId, f64)> = panel
                .iter()
                .filter_map(|&i| var_of[i])
                .map(|v| (v, 1.0))
                .collect();
            terms.push((cap, -1.0));
            program.add_constraint(terms, Comparison::Le, 0.0);
        }

        let mut objective = vec![(cap, 1.0)];
        for &(i, v) in &vars {
            if let Some(p) = fixed[i] {
                if p != 0.0 {
                    objective.push((v, -p));
                }
            }
        }
        program.set_objective(Objective::Minimize { terms: objective });
        Self { program, cap, vars }
    }

    fn weights(&self, assignment: &[f64], n: usize) -> Vec<f64> {
        let mut weights = vec![0.0; n];
        for &(i, v) in &self.vars {
            weights[i] = assignment[v.0].max(0.0);
        }
        weights
    }
}
