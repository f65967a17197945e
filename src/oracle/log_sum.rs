//! Log-sum maximization over the probability simplex.
//!
//! Solves `max Σ_g log(Σ_j c_gj x_j)` s.t. `Σ_j x_j = 1`, `x ≥ 0` with the
//! multiplicative fixed-point iteration `x_j ← x_j · d_j / m`, where
//! `d_j = Σ_g c_gj / u_g` is the objective gradient and `m` the number of
//! groups. Every iterate stays on the simplex and the objective never
//! decreases. At the optimum `d_j ≤ m` for all `j`, so `max_j d_j - m` is
//! used as the optimality gap.

use super::program::{Comparison, Program, VarDomain, VarId};
use super::solver::OracleOutcome;
use tracing::warn;

/// Stopping rule of [`maximize_log_sum`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct LogSumSettings {
    pub max_iterations: usize,
    pub tolerance: f64,
}

pub(crate) fn maximize_log_sum(
    program: &Program,
    groups: &[Vec<(VarId, f64)>],
    settings: &LogSumSettings,
) -> OracleOutcome {
    if let Err(msg) = check_simplex(program, groups) {
        return OracleOutcome::Error(msg);
    }

    let n = program.variables.len();
    let m = groups.len() as f64;

    if groups
        .iter()
        .any(|g| !g.iter().any(|&(_, coef)| coef > 0.0))
    {
        return OracleOutcome::Infeasible;
    }

    let mut x = vec![1.0 / n as f64; n];
    let mut utilities = vec![0.0; groups.len()];
    let mut gradient = vec![0.0; n];
    let mut iterations = 0;

    let converged = loop {
        for (u, group) in utilities.iter_mut().zip(groups) {
            *u = group.iter().map(|&(v, c)| c * x[v.0]).sum();
        }
        gradient.iter_mut().for_each(|d| *d = 0.0);
        for (u, group) in utilities.iter().zip(groups) {
            for &(v, c) in group {
                gradient[v.0] += c / u;
            }
        }

        let gap = gradient.iter().cloned().fold(f64::NEG_INFINITY, f64::max) - m;
        if gap <= settings.tolerance * m {
            break true;
        }
        if iterations >= settings.max_iterations {
            warn!(gap, iterations, "log-sum iteration cap reached");
            break false;
        }

        for (xj, dj) in x.iter_mut().zip(&gradient) {
            *xj *= dj / m;
        }
        let total: f64 = x.iter().sum();
        x.iter_mut().for_each(|xj| *xj /= total);
        iterations += 1;
    };

    let value = utilities.iter().map(|u| u.ln()).sum();
    if converged {
        OracleOutcome::Optimal {
            value,
            assignment: x,
        }
    } else {
        OracleOutcome::IterationLimit {
            value,
            assignment: x,
        }
    }
}

/// Accepts only non-negative continuous variables, a single `Σ x = 1`
/// constraint over all of them, and non-negative group coefficients.
fn check_simplex(program: &Program, groups: &[Vec<(VarId, f64)>]) -> Result<(), String> {
    let n = program.variables.len();
    if n == 0 {
        return Err("log-sum program without variables".into());
    }
    for var in &program.variables {
        match var.domain {
            VarDomain::Continuous { lower, upper } if lower == 0.0 && upper >= 1.0 => {}
            _ => {
                return Err(format!(
                    "log-sum backend needs variables in [0, >=1], '{}' is not",
                    var.name
                ))
            }
        }
    }

    let [constraint] = program.constraints.as_slice() else {
        return Err("log-sum backend needs exactly one simplex constraint".into());
    };
    let mut covered = vec![false; n];
    for &(v, c) in &constraint.terms {
        if c != 1.0 || covered[v.0] {
            return Err("simplex constraint must have unit coefficients".into());
        }
        covered[v.0] = true;
    }
    if constraint.cmp != Comparison::Eq || constraint.rhs != 1.0 || covered.iter().any(|c| !c) {
        return Err("log-sum backend needs Σ x = 1 over all variables".into());
    }

    if groups.iter().flatten().any(|&(_, c)| c < 0.0) {
        return Err("log-sum groups must have non-negative coefficients".into());
    }
    Ok(())
}
