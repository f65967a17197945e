//! Panel generation shared by the fractional strategies.

use super::StrategyContext;
use crate::constants::PORTFOLIO_DECAY;
use crate::error::{Result, SelectionError};
use crate::oracle::Oracle;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Distinct feasible panels discovered so far, plus which candidates they
/// cover.
#[derive(Debug, Clone, Default)]
pub struct Portfolio {
    panels: Vec<Vec<usize>>,
    seen: HashSet<Vec<usize>>,
    covered: Vec<bool>,
    messages: Vec<String>,
}

impl Portfolio {
    /// Empty portfolio over a pool of `pool_size`.
    pub fn new(pool_size: usize) -> Self {
        Self {
            covered: vec![false; pool_size],
            ..Self::default()
        }
    }

    /// Adds `panel` (sorted positions). Returns `false` if it was known.
    pub fn insert(&mut self, panel: Vec<usize>) -> bool {
        if !self.seen.insert(panel.clone()) {
            return false;
        }
        for &i in &panel {
            self.covered[i] = true;
        }
        self.panels.push(panel);
        true
    }

    /// Whether `panel` is already in the portfolio.
    pub fn contains(&self, panel: &[usize]) -> bool {
        self.seen.contains(panel)
    }

    /// Panels in discovery order.
    pub fn panels(&self) -> &[Vec<usize>] {
        &self.panels
    }

    /// Consumes the portfolio, returning its panels.
    pub fn into_panels(self) -> Vec<Vec<usize>> {
        self.panels
    }

    /// Number of panels.
    pub fn len(&self) -> usize {
        self.panels.len()
    }

    /// Whether no panel is known.
    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }

    /// Whether position `i` appears in some panel.
    pub fn is_covered(&self, i: usize) -> bool {
        self.covered[i]
    }

    /// Positions appearing in some panel, ascending.
    pub fn covered_positions(&self) -> Vec<usize> {
        (0..self.covered.len()).filter(|&i| self.covered[i]).collect()
    }

    /// Positions appearing in no panel, ascending.
    pub fn uncovered(&self) -> Vec<usize> {
        (0..self.covered.len()).filter(|&i| !self.covered[i]).collect()
    }

    /// Coverage messages produced while building the portfolio.
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub(crate) fn take_messages(&mut self) -> Vec<String> {
        std::mem::take(&mut self.messages)
    }
}

impl<'a, O: Oracle + ?Sized> StrategyContext<'a, O> {
    /// Feasible panel maximizing `Σ weights[i]` over its members.
    ///
    /// Returns the panel and its weight, recomputed from `weights` so that
    /// solver round-off does not leak into pricing decisions.
    pub fn best_panel(&self, weights: &[f64]) -> Result<(Vec<usize>, f64)> {
        let program = self.constraints.weighted_program(weights);
        let (_, assignment) = self.oracle.solve(&program).into_optimal("panel generation")?;
        let panel = self.constraints.panel_from_assignment(&assignment);
        let violations = self.constraints.check_panel(&panel);
        if !violations.is_empty() {
            return Err(SelectionError::Solver(format!(
                "panel generation returned an infeasible panel: {}",
                violations.join("; ")
            )));
        }
        let value = panel.iter().map(|&i| weights[i]).sum();
        Ok((panel, value))
    }

    /// Builds a diverse starting portfolio.
    ///
    /// Runs `rounds` of multiplicative weights (members of each new panel are
    /// down-weighted by [`PORTFOLIO_DECAY`]), then asks for a panel containing
    /// each candidate still uncovered. Candidates that no feasible panel
    /// contains are reported in the portfolio messages.
    pub fn initial_portfolio(&self, rounds: usize) -> Result<Portfolio> {
        let n = self.constraints.pool_size();
        let mut portfolio = Portfolio::new(n);
        let mut weights = vec![1.0; n];

        for round in 0..rounds {
            self.check_cancel()?;
            let (panel, _) = self.best_panel(&weights)?;
            for &i in &panel {
                weights[i] *= PORTFOLIO_DECAY;
            }
            let total: f64 = weights.iter().sum();
            for w in &mut weights {
                *w *= n as f64 / total;
            }

            if !portfolio.insert(panel) {
                for w in &mut weights {
                    *w = 0.9 * *w + 0.1;
                }
            }
            debug!(round = round + 1, rounds, panels = portfolio.len(), "multiplicative weights");
        }

        for i in 0..n {
            if portfolio.is_covered(i) {
                continue;
            }
            self.check_cancel()?;
            let mut unit = vec![0.0; n];
            unit[i] = 1.0;
            let (panel, _) = self.best_panel(&unit)?;
            if panel.contains(&i) {
                portfolio.insert(panel);
            } else {
                warn!(candidate = self.id_of(i), "candidate is in no feasible panel");
                portfolio.messages.push(format!(
                    "Candidate {} is not contained in any feasible panel.",
                    self.id_of(i)
                ));
            }
        }

        if portfolio.is_empty() {
            return Err(SelectionError::Solver("panel generation found no feasible panel".into()));
        }
        if portfolio.uncovered().is_empty() {
            portfolio
                .messages
                .push("All candidates are contained in some feasible panel.".into());
        }
        Ok(portfolio)
    }
}
