//! Nash welfare: maximize `Σ log p_i` over the coverable candidates.
//!
//! The convex program over the current portfolio is solved by the oracle's
//! log-sum objective. A new panel is priced with weights `1 / p_i`; by the
//! KKT conditions the portfolio is sufficient once no panel's derivative
//! exceeds the best existing one by more than [`EPS_NASH`].

use super::portfolio::Portfolio;
use super::{normalize_weights, ProbabilityVector, StrategyContext, StrategyOutput, StrategyReport};
use crate::constants::{EPS2, EPS_NASH};
use crate::error::{Result, SelectionError};
use crate::oracle::{Comparison, Objective, Oracle, OracleOutcome, Program, VarId};
use tracing::{debug, info, warn};

pub(super) fn run<O: Oracle + ?Sized>(ctx: &StrategyContext<'_, O>) -> Result<StrategyReport> {
    let n = ctx.constraints.pool_size();
    let k = ctx.constraints.panel_size() as f64;
    let mut messages = vec!["Using Nash algorithm.".to_string()];
    let mut warning = None;

    let mut portfolio = ctx.initial_portfolio(2 * n)?;
    messages.extend(portfolio.take_messages());
    let covered = portfolio.covered_positions();
    let entitled = covered.len() as f64;

    let mut rounds = 0;
    let lambdas = loop {
        ctx.check_cancel()?;
        rounds += 1;

        let program = welfare_program(&portfolio, &covered);
        let (welfare, assignment) = match ctx.oracle.solve(&program) {
            OracleOutcome::IterationLimit { value, assignment } => {
                let text = "nash welfare solve stopped at its iteration cap \
                            without proving optimality"
                    .to_string();
                warn!(%text);
                warning.get_or_insert(text);
                (value, assignment)
            }
            other => other.into_optimal("nash welfare")?,
        };
        let lambdas = normalize_weights(&assignment);

        let utilities = ProbabilityVector::from_panels(n, portfolio.panels(), &lambdas);
        if let Some(&i) = covered.iter().find(|&&i| utilities.get(i) <= EPS2) {
            return Err(SelectionError::Solver(format!(
                "nash welfare: candidate {} ended with probability {:e}",
                ctx.id_of(i),
                utilities.get(i)
            )));
        }
        let scaled = welfare - entitled * (k / entitled).ln();
        messages.push(format!("Scaled Nash welfare is now: {scaled}."));

        let mut reciprocals = vec![0.0; n];
        for &i in &covered {
            reciprocals[i] = 1.0 / utilities.get(i);
        }
        let best_existing = portfolio
            .panels()
            .iter()
            .map(|panel| panel.iter().map(|&i| reciprocals[i]).sum::<f64>())
            .fold(f64::NEG_INFINITY, f64::max);

        let (panel, value) = ctx.best_panel(&reciprocals)?;
        debug!(value, best_existing, panels = portfolio.len(), "nash pricing");
        if value <= best_existing + EPS_NASH || !portfolio.insert(panel) {
            break lambdas;
        }
        if rounds >= ctx.config.max_column_rounds {
            let text = format!(
                "nash column generation stopped after {rounds} rounds without proving optimality"
            );
            warn!(%text);
            warning.get_or_insert(text);
            // The new panel has no weight yet; keep the distribution just solved.
            let mut padded = lambdas;
            padded.resize(portfolio.len(), 0.0);
            break padded;
        }
    };

    info!(rounds, panels = portfolio.len(), "nash distribution found");
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

/// `max Σ_i log(Σ_{P∋i} λ_P)` over the simplex of portfolio weights.
fn welfare_program(portfolio: &Portfolio, covered: &[usize]) -> Program {
    let mut program = Program::new("nash welfare");
    let lambdas: Vec<VarId> = (0..portfolio.len())
        .map(|j| program.add_continuous(format!("lambda{j}"), 0.0, 1.0))
        .collect();
    program.add_constraint(lambdas.iter().map(|&v| (v, 1.0)).collect(), Comparison::Eq, 1.0);

    let groups = covered
        .iter()
        .map(|&i| {
            portfolio
                .panels()
                .iter()
                .zip(&lambdas)
                .filter(|(panel, _)| panel.binary_search(&i).is_ok())
                .map(|(_, &v)| (v, 1.0))
                .collect()
        })
        .collect();
    program.set_objective(Objective::MaximizeLogSum { groups });
    program
}
