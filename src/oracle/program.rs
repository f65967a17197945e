//! Program definition handed to an oracle.

/// Handle of a variable inside one [`Program`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub usize);

/// Domain of a decision variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VarDomain {
    /// Real value in `[lower, upper]`. `upper` may be `f64::INFINITY`.
    Continuous { lower: f64, upper: f64 },

    /// Integer value in `[lower, upper]`.
    Integer { lower: i32, upper: i32 },

    /// 0/1 decision.
    Binary,
}

impl VarDomain {
    /// Whether the domain is integral.
    pub fn is_integral(&self) -> bool {
        !matches!(self, VarDomain::Continuous { .. })
    }
}

/// A decision variable.
#[derive(Debug, Clone)]
pub struct Variable {
    /// Name, used only in diagnostics.
    pub name: String,
    /// Domain.
    pub domain: VarDomain,
}

/// Relation between a linear expression and its right-hand side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// `expr <= rhs`
    Le,
    /// `expr >= rhs`
    Ge,
    /// `expr == rhs`
    Eq,
}

/// `Σ coef · var  (cmp)  rhs`.
#[derive(Debug, Clone)]
pub struct LinearConstraint {
    /// `(variable, coefficient)` pairs.
    pub terms: Vec<(VarId, f64)>,
    /// Relation.
    pub cmp: Comparison,
    /// Right-hand side.
    pub rhs: f64,
}

impl LinearConstraint {
    /// Evaluates the left-hand side at `assignment`.
    pub fn lhs(&self, assignment: &[f64]) -> f64 {
        self.terms.iter().map(|&(v, c)| c * assignment[v.0]).sum()
    }

    /// Whether `assignment` satisfies the constraint within `tolerance`.
    pub fn is_satisfied(&self, assignment: &[f64], tolerance: f64) -> bool {
        let lhs = self.lhs(assignment);
        match self.cmp {
            Comparison::Le => lhs <= self.rhs + tolerance,
            Comparison::Ge => lhs >= self.rhs - tolerance,
            Comparison::Eq => (lhs - self.rhs).abs() <= tolerance,
        }
    }
}

/// Objective of a program.
#[derive(Debug, Clone, Default)]
pub enum Objective {
    /// Any feasible point will do (zero objective).
    #[default]
    Feasibility,

    /// Maximize a linear combination of variables.
    Maximize {
        /// `(variable, coefficient)` pairs.
        terms: Vec<(VarId, f64)>,
    },

    /// Minimize a linear combination of variables.
    Minimize {
        /// `(variable, coefficient)` pairs.
        terms: Vec<(VarId, f64)>,
    },

    /// Maximize `Σ_g log(Σ_{(v,c) in g} c · v)`.
    ///
    /// Concave; every group must be able to become strictly positive.
    MaximizeLogSum {
        /// One linear expression per logarithm.
        groups: Vec<Vec<(VarId, f64)>>,
    },
}

/// A linear, integer, or log-sum program.
///
/// # Examples
///
/// ```
/// use u_sortition::oracle::{Comparison, Objective, Program};
///
/// let mut program = Program::new("pick-two");
/// let a = program.add_binary("a");
/// let b = program.add_binary("b");
/// let c = program.add_binary("c");
/// program.add_constraint(vec![(a, 1.0), (b, 1.0), (c, 1.0)], Comparison::Eq, 2.0);
/// program.set_objective(Objective::Maximize { terms: vec![(a, 2.0), (b, 1.0)] });
/// assert!(program.validate().is_ok());
/// assert!(program.is_integral());
/// ```
#[derive(Debug, Clone)]
pub struct Program {
    /// Program name, used only in diagnostics.
    pub name: String,
    /// Variables, indexed by [`VarId`].
    pub variables: Vec<Variable>,
    /// Constraints.
    pub constraints: Vec<LinearConstraint>,
    /// Objective.
    pub objective: Objective,
}

impl Program {
    /// Creates an empty feasibility program.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variables: Vec::new(),
            constraints: Vec::new(),
            objective: Objective::Feasibility,
        }
    }

    /// Adds a variable.
    pub fn add_var(&mut self, name: impl Into<String>, domain: VarDomain) -> VarId {
        self.variables.push(Variable {
            name: name.into(),
            domain,
        });
        VarId(self.variables.len() - 1)
    }

    /// Convenience: add a 0/1 variable.
    pub fn add_binary(&mut self, name: impl Into<String>) -> VarId {
        self.add_var(name, VarDomain::Binary)
    }

    /// Convenience: add a continuous variable.
    pub fn add_continuous(&mut self, name: impl Into<String>, lower: f64, upper: f64) -> VarId {
        self.add_var(name, VarDomain::Continuous { lower, upper })
    }

    /// Adds a linear constraint.
    pub fn add_constraint(&mut self, terms: Vec<(VarId, f64)>, cmp: Comparison, rhs: f64) {
        self.constraints.push(LinearConstraint { terms, cmp, rhs });
    }

    /// Sets the objective.
    pub fn set_objective(&mut self, objective: Objective) {
        self.objective = objective;
    }

    /// Whether any variable is integral.
    pub fn is_integral(&self) -> bool {
        self.variables.iter().any(|v| v.domain.is_integral())
    }

    /// Returns the number of variables.
    pub fn var_count(&self) -> usize {
        self.variables.len()
    }

    /// Returns the number of constraints.
    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Validates the program for consistency.
    ///
    /// Checks that every referenced variable exists, that domains are
    /// non-empty, and that coefficients are finite.
    pub fn validate(&self) -> Result<(), String> {
        for (i, var) in self.variables.iter().enumerate() {
            match var.domain {
                VarDomain::Continuous { lower, upper } => {
                    if lower.is_nan() || upper.is_nan() || lower > upper {
                        return Err(format!("variable {i} ({}): empty domain", var.name));
                    }
                }
                VarDomain::Integer { lower, upper } => {
                    if lower > upper {
                        return Err(format!("variable {i} ({}): empty domain", var.name));
                    }
                }
                VarDomain::Binary => {}
            }
        }

        let check_terms = |terms: &[(VarId, f64)], what: &str| -> Result<(), String> {
            for &(var, coef) in terms {
                if var.0 >= self.variables.len() {
                    return Err(format!("{what}: undefined variable {}", var.0));
                }
                if !coef.is_finite() {
                    return Err(format!("{what}: non-finite coefficient on variable {}", var.0));
                }
            }
            Ok(())
        };

        for (i, constraint) in self.constraints.iter().enumerate() {
            check_terms(&constraint.terms, &format!("constraint {i}"))?;
            if !constraint.rhs.is_finite() {
                return Err(format!("constraint {i}: non-finite right-hand side"));
            }
        }

        match &self.objective {
            Objective::Feasibility => {}
            Objective::Maximize { terms } | Objective::Minimize { terms } => {
                check_terms(terms, "objective")?;
            }
            Objective::MaximizeLogSum { groups } => {
                if groups.is_empty() {
                    return Err("log-sum objective without groups".into());
                }
                for group in groups {
                    check_terms(group, "log-sum group")?;
                }
            }
        }
        Ok(())
    }

    /// Whether `assignment` satisfies every constraint and domain within `tolerance`.
    pub fn is_feasible(&self, assignment: &[f64], tolerance: f64) -> bool {
        if assignment.len() != self.variables.len() {
            return false;
        }
        let in_domain = self.variables.iter().zip(assignment).all(|(var, &x)| match var.domain {
            VarDomain::Continuous { lower, upper } => {
                x >= lower - tolerance && x <= upper + tolerance
            }
            VarDomain::Integer { lower, upper } => {
                (x - x.round()).abs() <= tolerance
                    && x >= lower as f64 - tolerance
                    && x <= upper as f64 + tolerance
            }
            VarDomain::Binary => x.abs() <= tolerance || (x - 1.0).abs() <= tolerance,
        });
        in_domain
            && self
                .constraints
                .iter()
                .all(|c| c.is_satisfied(assignment, tolerance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_creation() {
        let mut program = Program::new("test");
        let x = program.add_binary("x");
        let y = program.add_continuous("y", 0.0, f64::INFINITY);
        program.add_constraint(vec![(x, 1.0), (y, 1.0)], Comparison::Le, 4.0);
        program.set_objective(Objective::Minimize {
            terms: vec![(y, 1.0)],
        });

        assert_eq!(program.var_count(), 2);
        assert_eq!(program.constraint_count(), 1);
        assert!(program.is_integral());
        assert!(program.validate().is_ok());
    }

    #[test]
    fn test_undefined_variable() {
        let mut program = Program::new("test");
        program.add_constraint(vec![(VarId(3), 1.0)], Comparison::Ge, 1.0);
        assert!(program.validate().is_err());
    }

    #[test]
    fn test_empty_domain() {
        let mut program = Program::new("test");
        program.add_continuous("x", 2.0, 1.0);
        assert!(program.validate().is_err());
    }

    #[test]
    fn test_non_finite_coefficient() {
        let mut program = Program::new("test");
        let x = program.add_binary("x");
        program.set_objective(Objective::Maximize {
            terms: vec![(x, f64::NAN)],
        });
        assert!(program.validate().is_err());
    }

    #[test]
    fn test_empty_log_sum() {
        let mut program = Program::new("test");
        program.add_continuous("x", 0.0, 1.0);
        program.set_objective(Objective::MaximizeLogSum { groups: vec![] });
        assert!(program.validate().is_err());
    }

    #[test]
    fn test_is_feasible() {
        let mut program = Program::new("test");
        let x = program.add_binary("x");
        let y = program.add_binary("y");
        program.add_constraint(vec![(x, 1.0), (y, 1.0)], Comparison::Eq, 1.0);

        assert!(program.is_feasible(&[1.0, 0.0], 1e-9));
        assert!(!program.is_feasible(&[1.0, 1.0], 1e-9));
        assert!(!program.is_feasible(&[0.5, 0.5], 1e-9));
        assert!(!program.is_feasible(&[1.0], 1e-9));
    }
}
