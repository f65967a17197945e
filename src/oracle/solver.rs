//! Oracle interface and the `microlp` backend.

use super::log_sum::{maximize_log_sum, LogSumSettings};
use super::program::{Comparison, Objective, Program, VarDomain, VarId};
use crate::constants::{LOG_SUM_MAX_ITERATIONS, LOG_SUM_TOLERANCE};
use crate::error::{Result, SelectionError};
use microlp::{ComparisonOp, LinearExpr, OptimizationDirection, Problem};
use tracing::trace;

/// Answer of an oracle to one program.
#[derive(Debug, Clone, PartialEq)]
pub enum OracleOutcome {
    /// Optimal (for feasibility programs: any feasible) point.
    Optimal {
        /// Objective value at `assignment`.
        value: f64,
        /// One value per program variable.
        assignment: Vec<f64>,
    },
    /// The iteration cap was reached before the optimality test passed;
    /// `assignment` is the last feasible iterate.
    IterationLimit {
        /// Objective value at `assignment`.
        value: f64,
        /// One value per program variable.
        assignment: Vec<f64>,
    },
    /// No point satisfies the constraints.
    Infeasible,
    /// The objective is unbounded over the feasible region.
    Unbounded,
    /// The solver failed or does not support the program.
    Error(String),
}

impl OracleOutcome {
    /// Whether an optimal point was found.
    pub fn is_optimal(&self) -> bool {
        matches!(self, OracleOutcome::Optimal { .. })
    }

    /// Converts anything but `Optimal` into a [`SelectionError::Solver`],
    /// including [`IterationLimit`](OracleOutcome::IterationLimit).
    ///
    /// `context` names the program in the error message.
    pub fn into_optimal(self, context: &str) -> Result<(f64, Vec<f64>)> {
        match self {
            OracleOutcome::Optimal { value, assignment } => Ok((value, assignment)),
            OracleOutcome::IterationLimit { .. } => Err(SelectionError::Solver(format!(
                "{context}: solver stopped at its iteration cap before reaching optimality"
            ))),
            OracleOutcome::Infeasible => Err(SelectionError::Solver(format!(
                "{context}: solver reports the program infeasible"
            ))),
            OracleOutcome::Unbounded => Err(SelectionError::Solver(format!(
                "{context}: solver reports the program unbounded"
            ))),
            OracleOutcome::Error(msg) => Err(SelectionError::Solver(format!("{context}: {msg}"))),
        }
    }
}

/// A stateless solve service.
///
/// Implementors may wrap any LP/ILP/convex solver. Every call receives a
/// complete [`Program`]; no state may be carried between calls.
pub trait Oracle: Send + Sync {
    /// Solves the program.
    fn solve(&self, program: &Program) -> OracleOutcome;
}

impl<O: Oracle + ?Sized> Oracle for &O {
    fn solve(&self, program: &Program) -> OracleOutcome {
        (**self).solve(program)
    }
}

/// Oracle backed by the pure-Rust `microlp` simplex/branch-and-bound solver.
///
/// Linear and integer programs are delegated to `microlp`. Log-sum
/// objectives are supported when the feasible region is the probability
/// simplex (non-negative variables summing to one), which is the only shape
/// the Nash-welfare algorithm produces.
#[derive(Debug, Clone)]
pub struct MicroLpOracle {
    /// Iteration cap of the log-sum solve.
    pub log_sum_max_iterations: usize,
    /// Duality-gap tolerance of the log-sum solve.
    pub log_sum_tolerance: f64,
}

impl MicroLpOracle {
    /// Creates an oracle with default log-sum settings.
    pub fn new() -> Self {
        Self {
            log_sum_max_iterations: LOG_SUM_MAX_ITERATIONS,
            log_sum_tolerance: LOG_SUM_TOLERANCE,
        }
    }

    fn solve_linear(&self, program: &Program) -> OracleOutcome {
        let mut coefficients = vec![0.0; program.variables.len()];
        let direction = match &program.objective {
            Objective::Feasibility => OptimizationDirection::Minimize,
            Objective::Maximize { terms } => {
                accumulate(&mut coefficients, terms);
                OptimizationDirection::Maximize
            }
            Objective::Minimize { terms } => {
                accumulate(&mut coefficients, terms);
                OptimizationDirection::Minimize
            }
            Objective::MaximizeLogSum { .. } => {
                return OracleOutcome::Error("log-sum objective is not linear".into())
            }
        };

        let mut problem = Problem::new(direction);
        let vars: Vec<microlp::Variable> = program
            .variables
            .iter()
            .zip(&coefficients)
            .map(|(var, &coef)| match var.domain {
                VarDomain::Continuous { lower, upper } => problem.add_var(coef, (lower, upper)),
                VarDomain::Integer { lower, upper } => {
                    problem.add_integer_var(coef, (lower, upper))
                }
                VarDomain::Binary => problem.add_integer_var(coef, (0, 1)),
            })
            .collect();

        for constraint in &program.constraints {
            let mut expr = LinearExpr::empty();
            for &(var, coef) in &constraint.terms {
                expr.add(vars[var.0], coef);
            }
            let op = match constraint.cmp {
                Comparison::Le => ComparisonOp::Le,
                Comparison::Ge => ComparisonOp::Ge,
                Comparison::Eq => ComparisonOp::Eq,
            };
            problem.add_constraint(expr, op, constraint.rhs);
        }

        match problem.solve() {
            Ok(solution) => {
                let assignment: Vec<f64> = vars.iter().map(|&v| solution[v]).collect();
                OracleOutcome::Optimal {
                    value: solution.objective(),
                    assignment,
                }
            }
            Err(microlp::Error::Infeasible) => OracleOutcome::Infeasible,
            Err(microlp::Error::Unbounded) => OracleOutcome::Unbounded,
            #[allow(unreachable_patterns)]
            Err(other) => OracleOutcome::Error(other.to_string()),
        }
    }
}

impl Default for MicroLpOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl Oracle for MicroLpOracle {
    fn solve(&self, program: &Program) -> OracleOutcome {
        if let Err(msg) = program.validate() {
            return OracleOutcome::Error(format!("invalid program '{}': {msg}", program.name));
        }
        trace!(
            program = %program.name,
            vars = program.var_count(),
            constraints = program.constraint_count(),
            "oracle solve"
        );

        match &program.objective {
            Objective::MaximizeLogSum { groups } => maximize_log_sum(
                program,
                groups,
                &LogSumSettings {
                    max_iterations: self.log_sum_max_iterations,
                    tolerance: self.log_sum_tolerance,
                },
            ),
            _ => self.solve_linear(program),
        }
    }
}

fn accumulate(coefficients: &mut [f64], terms: &[(VarId, f64)]) {
    for &(var, coef) in terms {
        coefficients[var.0] += coef;
    }
}
