//! Feasibility probing and the relaxation ladder.
//!
//! The exact quotas are tried first. If no panel satisfies them, all
//! categories are relaxed to their flex bounds at once and the solve is
//! retried exactly once. Before the retry an advisory ILP computes the
//! smallest weighted relaxation within the flex bounds and reports it.

use crate::error::{Result, SelectionError};
use crate::model::ConstraintSet;
use crate::oracle::{Comparison, Objective, Oracle, OracleOutcome, VarDomain};
use crate::pool::CandidatePool;
use crate::quota::{BoundKind, QuotaTable};
use tracing::{debug, info, warn};

/// A feasible constraint set together with one panel that satisfies it.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    /// The active set: exact bounds, or flex bounds if `relaxed`.
    pub constraints: ConstraintSet,
    /// Whether the flex bounds had to be used.
    pub relaxed: bool,
    /// Some feasible panel, as pool positions.
    pub witness: Vec<usize>,
    /// Narrative lines for the result.
    pub messages: Vec<String>,
}

/// Finds the active constraint set for a run.
///
/// # Errors
///
/// - [`SelectionError::Validation`] from building the constraint sets
/// - [`SelectionError::Feasibility`] if neither the exact nor the flex
///   bounds admit a panel
/// - [`SelectionError::Solver`] if the oracle fails
pub fn probe<O: Oracle + ?Sized>(
    oracle: &O,
    pool: &CandidatePool,
    quotas: &QuotaTable,
    panel_size: usize,
    check_same_address: bool,
) -> Result<ProbeOutcome> {
    let exact =
        ConstraintSet::build(pool, quotas, panel_size, BoundKind::Exact, check_same_address)?;
    let mut messages = Vec::new();

    let precheck = exact.precheck();
    for line in &precheck {
        debug!(%line, "precheck");
    }

    if let Some(witness) = find_panel(oracle, &exact)? {
        info!(panel_size, "exact quotas are feasible");
        return Ok(ProbeOutcome {
            constraints: exact,
            relaxed: false,
            witness,
            messages,
        });
    }

    if !quotas.has_flex() {
        warn!("exact quotas are infeasible and no flex bounds are given");
        return Err(SelectionError::Feasibility {
            diagnostics: exact.diagnose(),
        });
    }

    warn!("exact quotas are infeasible, relaxing every category to its flex bounds");
    messages.push("The quotas are infeasible with the exact bounds.".to_string());
    messages.extend(suggest_relaxation(oracle, quotas, &exact)?);

    let flex = ConstraintSet::build(pool, quotas, panel_size, BoundKind::Flex, check_same_address)?;
    match find_panel(oracle, &flex)? {
        Some(witness) => {
            messages.push("Quotas required relaxation to flex bounds.".to_string());
            Ok(ProbeOutcome {
                constraints: flex,
                relaxed: true,
                witness,
                messages,
            })
        }
        None => {
            let mut diagnostics = exact.diagnose();
            diagnostics.extend(
                flex.diagnose()
                    .into_iter()
                    .map(|line| format!("with flex bounds: {line}")),
            );
            Err(SelectionError::Feasibility { diagnostics })
        }
    }
}

/// Computes the least relaxation of the exact quotas, within the flex
/// bounds, under which a panel exists.
///
/// Lowering a minimum weighs `1 + 2/min` per unit, raising a maximum weighs
/// 1. Returns one "Recommend ..." line per changed bound, or a single line
/// saying that even the flex bounds are not enough.
pub fn suggest_relaxation<O: Oracle + ?Sized>(
    oracle: &O,
    quotas: &QuotaTable,
    exact: &ConstraintSet,
) -> Result<Vec<String>> {
    let mut program = exact.structural_program();
    program.name = "quota relaxation".into();

    let mut objective = Vec::new();
    let mut relax_vars = Vec::with_capacity(exact.bounds().len());
    for (bound, target) in exact.bounds().iter().zip(quotas.targets()) {
        let lower_slack = to_i32(target.min - target.min_flex);
        let upper_slack =
            to_i32(target.max_flex.min(bound.members.len()).saturating_sub(target.max));
        let lower_var = program.add_var(
            format!("lower {}:{}", bound.category, bound.value),
            VarDomain::Integer { lower: 0, upper: lower_slack },
        );
        let upper_var = program.add_var(
            format!("upper {}:{}", bound.category, bound.value),
            VarDomain::Integer { lower: 0, upper: upper_slack },
        );

        let mut terms = bound.member_terms();
        let mut lower_terms = terms.clone();
        lower_terms.push((lower_var, 1.0));
        program.add_constraint(lower_terms, Comparison::Ge, target.min as f64);
        terms.push((upper_var, -1.0));
        program.add_constraint(terms, Comparison::Le, target.max as f64);

        let reduction_weight = if target.min == 0 { 0.0 } else { 1.0 + 2.0 / target.min as f64 };
        objective.push((lower_var, reduction_weight));
        objective.push((upper_var, 1.0));
        relax_vars.push((lower_var, upper_var));
    }
    program.set_objective(Objective::Minimize { terms: objective });

    let assignment = match oracle.solve(&program) {
        OracleOutcome::Optimal { assignment, .. } => assignment,
        OracleOutcome::Infeasible => {
            return Ok(vec![
                "No feasible panel even when relaxing quotas up to the \
                 min_flex and max_flex bounds."
                    .to_string(),
            ])
        }
        other => {
            return other
                .into_optimal("quota relaxation")
                .map(|_| Vec::new())
        }
    };

    let mut lines = Vec::new();
    for (target, (lower_var, upper_var)) in quotas.targets().iter().zip(relax_vars) {
        let lowered = assignment[lower_var.0].round() as usize;
        let raised = assignment[upper_var.0].round() as usize;
        if lowered > 0 {
            lines.push(format!(
                "Recommend lowering lower quota of {}:{} to {}.",
                target.category,
                target.value,
                target.min - lowered.min(target.min)
            ));
        }
        if raised > 0 {
            lines.push(format!(
                "Recommend raising upper quota of {}:{} to {}.",
                target.category,
                target.value,
                target.max + raised
            ));
        }
    }
    for line in &lines {
        info!(%line, "relaxation suggestion");
    }
    Ok(lines)
}

/// Asks the oracle for any panel of `constraints`.
fn find_panel<O: Oracle + ?Sized>(
    oracle: &O,
    constraints: &ConstraintSet,
) -> Result<Option<Vec<usize>>> {
    match oracle.solve(&constraints.selection_program()) {
        OracleOutcome::Optimal { assignment, .. } => {
            let panel = constraints.panel_from_assignment(&assignment);
            let violations = constraints.check_panel(&panel);
            if violations.is_empty() {
                Ok(Some(panel))
            } else {
                Err(SelectionError::Solver(format!(
                    "oracle returned an infeasible panel: {}",
                    violations.join("; ")
                )))
            }
        }
        OracleOutcome::Infeasible => Ok(None),
        other => other.into_optimal("feasibility probe").map(|_| None),
    }
}

fn to_i32(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::MicroLpOracle;
    use crate::pool::Candidate;
    use crate::quota::QuotaTarget;

    fn pool() -> CandidatePool {
        CandidatePool::new(
            (0..10)
                .map(|i| {
                    let gender = if i < 5 { "M" } else { "F" };
                    Candidate::new(format!("p{i}")).with_feature("gender", gender)
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_exact_feasible() {
        let quotas = QuotaTable::new(vec![
            QuotaTarget::new("gender", "M", 2, 3),
            QuotaTarget::new("gender", "F", 2, 3),
        ])
        .unwrap();
        let outcome = probe(&MicroLpOracle::new(), &pool(), &quotas, 5, false).unwrap();
        assert!(!outcome.relaxed);
        assert_eq!(outcome.constraints.kind(), BoundKind::Exact);
        assert!(outcome.constraints.check_panel(&outcome.witness).is_empty());
    }

    #[test]
    fn test_infeasible_without_flex() {
        let quotas = QuotaTable::new(vec![
            QuotaTarget::new("gender", "M", 6, 6),
            QuotaTarget::new("gender", "F", 0, 5),
        ])
        .unwrap();
        let err = probe(&MicroLpOracle::new(), &pool(), &quotas, 6, false).unwrap_err();
        match err {
            SelectionError::Feasibility { diagnostics } => {
                assert!(diagnostics.iter().any(|d| d.contains("gender:M")), "{diagnostics:?}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_relaxes_to_flex() {
        let quotas = QuotaTable::new(vec![
            QuotaTarget::new("gender", "M", 4, 4).with_flex(3, 4),
            QuotaTarget::new("gender", "F", 0, 0).with_flex(0, 2),
        ])
        .unwrap();
        let outcome = probe(&MicroLpOracle::new(), &pool(), &quotas, 5, false).unwrap();
        assert!(outcome.relaxed);
        assert_eq!(outcome.constraints.kind(), BoundKind::Flex);
        assert!(outcome.constraints.check_panel(&outcome.witness).is_empty());
        assert!(
            outcome
                .messages
                .iter()
                .any(|m| m == "Recommend raising upper quota of gender:F to 1."),
            "{:?}",
            outcome.messages
        );
        assert!(outcome.messages.iter().any(|m| m.contains("relaxation to flex bounds")));
    }

    #[test]
    fn test_lowering_suggestion() {
        let quotas = QuotaTable::new(vec![
            QuotaTarget::new("gender", "M", 6, 6).with_flex(4, 6),
            QuotaTarget::new("gender", "F", 0, 0).with_flex(0, 2),
        ])
        .unwrap();
        let outcome = probe(&MicroLpOracle::new(), &pool(), &quotas, 6, false).unwrap();
        assert!(outcome.relaxed);
        // Raising F costs 1 per unit, lowering M costs 1 + 2/6; with k = 6
        // and only 5 men, M must drop to 5 and F rise to 1.
        assert!(
            outcome
                .messages
                .iter()
                .any(|m| m == "Recommend lowering lower quota of gender:M to 5."),
            "{:?}",
            outcome.messages
        );
    }

    #[test]
    fn test_flex_still_infeasible() {
        let quotas = QuotaTable::new(vec![
            QuotaTarget::new("gender", "M", 5, 5).with_flex(5, 5),
            QuotaTarget::new("gender", "F", 2, 2).with_flex(1, 3),
        ])
        .unwrap();
        let err = probe(&MicroLpOracle::new(), &pool(), &quotas, 5, false).unwrap_err();
        assert!(matches!(err, SelectionError::Feasibility { .. }));
    }
}
