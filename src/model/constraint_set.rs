//! The active constraint system of one solve attempt.

use super::report::CategoryCount;
use crate::constants::INTEGRALITY_THRESHOLD;
use crate::error::{Result, SelectionError};
use crate::oracle::{Comparison, Objective, Program, VarId};
use crate::pool::CandidatePool;
use crate::quota::{BoundKind, QuotaTable};
use std::collections::HashMap;

/// Active range of one `(category, value)` and the candidates that have it.
#[derive(Debug, Clone, PartialEq)]
pub struct QuotaBound {
    /// Category name.
    pub category: String,
    /// Category value.
    pub value: String,
    /// Minimum panel members with this value.
    pub lower: usize,
    /// Maximum panel members with this value.
    pub upper: usize,
    /// Pool positions of the candidates with this value, ascending.
    pub members: Vec<usize>,
}

impl QuotaBound {
    /// `(x_i, 1.0)` for every member.
    pub fn member_terms(&self) -> Vec<(VarId, f64)> {
        self.members.iter().map(|&i| (VarId(i), 1.0)).collect()
    }
}

/// Quota, panel-size and household constraints over a fixed pool.
///
/// Candidate `i` of the pool corresponds to variable `VarId(i)` of every
/// program built here. The set is immutable; relaxing quotas means building
/// a new one with [`BoundKind::Flex`].
///
/// # Examples
///
/// ```
/// use u_sortition::model::ConstraintSet;
/// use u_sortition::pool::{Candidate, CandidatePool};
/// use u_sortition::quota::{BoundKind, QuotaTable, QuotaTarget};
///
/// let pool = CandidatePool::new(
///     (0..4)
///         .map(|i| {
///             Candidate::new(format!("p{i}")).with_feature("g", if i < 2 { "M" } else { "F" })
///         })
///         .collect(),
/// )
/// .unwrap();
/// let quotas = QuotaTable::new(vec![
///     QuotaTarget::new("g", "M", 1, 1),
///     QuotaTarget::new("g", "F", 1, 1),
/// ])
/// .unwrap();
///
/// let set = ConstraintSet::build(&pool, &quotas, 2, BoundKind::Exact, false).unwrap();
/// assert!(set.check_panel(&[0, 2]).is_empty());
/// assert!(!set.check_panel(&[0, 1]).is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct ConstraintSet {
    panel_size: usize,
    kind: BoundKind,
    pool_size: usize,
    bounds: Vec<QuotaBound>,
    membership: Vec<Vec<usize>>,
    households: Vec<Vec<usize>>,
    household_of: Vec<Option<usize>>,
    base: Program,
}

impl ConstraintSet {
    /// Builds the constraint set for `pool`, using the bounds of `kind`.
    ///
    /// # Errors
    ///
    /// [`SelectionError::Validation`] if `panel_size` is not in
    /// `1..=pool.len()`, if a candidate lacks a quota category or has a value
    /// with no target row, or if a target value has no candidate.
    pub fn build(
        pool: &CandidatePool,
        quotas: &QuotaTable,
        panel_size: usize,
        kind: BoundKind,
        check_same_address: bool,
    ) -> Result<Self> {
        if pool.is_empty() {
            return Err(SelectionError::Validation("the candidate pool is empty".into()));
        }
        if panel_size == 0 || panel_size > pool.len() {
            return Err(SelectionError::Validation(format!(
                "panel size {panel_size} must be between 1 and the pool size {}",
                pool.len()
            )));
        }
        if quotas.is_empty() {
            return Err(SelectionError::Validation("the quota table is empty".into()));
        }

        let mut bound_index: HashMap<(&str, &str), usize> = HashMap::new();
        let mut bounds: Vec<QuotaBound> = Vec::with_capacity(quotas.len());
        for target in quotas.targets() {
            let (lower, upper) = target.bounds(kind);
            bound_index.insert((target.category.as_str(), target.value.as_str()), bounds.len());
            bounds.push(QuotaBound {
                category: target.category.clone(),
                value: target.value.clone(),
                lower,
                upper,
                members: Vec::new(),
            });
        }

        let categories = quotas.categories();
        let mut membership = Vec::with_capacity(pool.len());
        for (i, candidate) in pool.iter().enumerate() {
            let mut of_candidate = Vec::with_capacity(categories.len());
            for &category in &categories {
                let value = candidate.feature(category).ok_or_else(|| {
                    SelectionError::Validation(format!(
                        "candidate '{}' has no value for category '{category}'",
                        candidate.id
                    ))
                })?;
                let &b = bound_index.get(&(category, value)).ok_or_else(|| {
                    SelectionError::Validation(format!(
                        "candidate '{}' has value '{value}' not in category '{category}'",
                        candidate.id
                    ))
                })?;
                bounds[b].members.push(i);
                of_candidate.push(b);
            }
            membership.push(of_candidate);
        }

        if let Some(empty) = bounds.iter().find(|b| b.members.is_empty()) {
            return Err(SelectionError::Validation(format!(
                "no candidate has value '{}' of category '{}'",
                empty.value, empty.category
            )));
        }

        let households = if check_same_address { pool.households() } else { Vec::new() };
        let mut household_of = vec![None; pool.len()];
        for (h, members) in households.iter().enumerate() {
            for &i in members {
                household_of[i] = Some(h);
            }
        }

        let base = base_program(pool.len(), panel_size, &bounds, &households);
        Ok(Self {
            panel_size,
            kind,
            pool_size: pool.len(),
            bounds,
            membership,
            households,
            household_of,
            base,
        })
    }

    /// Panel size `k`.
    pub fn panel_size(&self) -> usize {
        self.panel_size
    }

    /// Which bounds are active.
    pub fn kind(&self) -> BoundKind {
        self.kind
    }

    /// Number of candidates.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Active bounds in quota-table order.
    pub fn bounds(&self) -> &[QuotaBound] {
        &self.bounds
    }

    /// Indices into [`bounds`](Self::bounds) that candidate `i` belongs to,
    /// one per category.
    pub fn membership(&self, i: usize) -> &[usize] {
        &self.membership[i]
    }

    /// Households of two or more candidates; empty unless address checking is on.
    pub fn households(&self) -> &[Vec<usize>] {
        &self.households
    }

    /// Household of candidate `i`, if address checking is on and `i` shares an address.
    pub fn household_of(&self, i: usize) -> Option<usize> {
        self.household_of[i]
    }

    /// Whether the same-address rule is active.
    pub fn checks_households(&self) -> bool {
        !self.households.is_empty()
    }

    /// Cheap necessary conditions: per category, `Σ lower <= k <= Σ upper`.
    ///
    /// Returns one line per violated category; empty does not imply feasibility.
    pub fn precheck(&self) -> Vec<String> {
        let mut order: Vec<&str> = Vec::new();
        let mut sums: HashMap<&str, (usize, usize)> = HashMap::new();
        for bound in &self.bounds {
            let entry = sums.entry(bound.category.as_str()).or_insert_with(|| {
                order.push(bound.category.as_str());
                (0, 0)
            });
            entry.0 += bound.lower;
            entry.1 += bound.upper;
        }

        let k = self.panel_size;
        let mut lines = Vec::new();
        for category in order {
            let (lower, upper) = sums[category];
            if lower > k {
                lines.push(format!(
                    "category '{category}': minimums sum to {lower}, more than the panel size {k}"
                ));
            }
            if upper < k {
                lines.push(format!(
                    "category '{category}': maximums sum to {upper}, less than the panel size {k}"
                ));
            }
        }
        lines
    }

    /// Diagnostic lines naming the bounds that make the set infeasible.
    ///
    /// Extends [`precheck`](Self::precheck) with values whose minimum exceeds
    /// the candidates (or households) available, and with the household count.
    /// Never empty: when no single bound is at fault a generic line is returned.
    pub fn diagnose(&self) -> Vec<String> {
        let mut lines = self.precheck();
        for bound in &self.bounds {
            let available = self.available_units(&bound.members);
            if bound.lower > available {
                lines.push(format!(
                    "{}:{} needs at least {} but only {} {} available",
                    bound.category,
                    bound.value,
                    bound.lower,
                    available,
                    if self.checks_households() { "households are" } else { "candidates are" }
                ));
            }
        }
        if self.checks_households() {
            let all: Vec<usize> = (0..self.pool_size).collect();
            let units = self.available_units(&all);
            if units < self.panel_size {
                lines.push(format!(
                    "only {units} distinct households for a panel of {}",
                    self.panel_size
                ));
            }
        }
        if lines.is_empty() {
            lines.push(
                "no panel satisfies all category bounds at once; \
                 the bounds conflict across categories"
                    .into(),
            );
        }
        lines
    }

    /// Violations of `panel` against this set; empty means the panel is feasible.
    pub fn check_panel(&self, panel: &[usize]) -> Vec<String> {
        let mut violations = Vec::new();
        if panel.len() != self.panel_size {
            violations.push(format!(
                "panel has {} members, expected {}",
                panel.len(),
                self.panel_size
            ));
        }

        let mut seen = vec![false; self.pool_size];
        let mut counts = vec![0usize; self.bounds.len()];
        let mut household_used = vec![false; self.households.len()];
        for &i in panel {
            if i >= self.pool_size {
                violations.push(format!("position {i} is outside the pool"));
                continue;
            }
            if std::mem::replace(&mut seen[i], true) {
                violations.push(format!("position {i} selected twice"));
                continue;
            }
            for &b in &self.membership[i] {
                counts[b] += 1;
            }
            if let Some(h) = self.household_of[i] {
                if std::mem::replace(&mut household_used[h], true) {
                    violations.push(format!("position {i} shares an address with another member"));
                }
            }
        }

        for (bound, &count) in self.bounds.iter().zip(&counts) {
            if count < bound.lower || count > bound.upper {
                violations.push(format!(
                    "{}:{} has {count}, outside [{}, {}]",
                    bound.category, bound.value, bound.lower, bound.upper
                ));
            }
        }
        violations
    }

    /// Panel-size and household rows only, without any quota bound.
    ///
    /// Callers that impose their own (for example relaxed) bounds start here.
    pub fn structural_program(&self) -> Program {
        structural_program(self.pool_size, self.panel_size, &self.households)
    }

    /// Zero-objective selection ILP.
    pub fn selection_program(&self) -> Program {
        self.base.clone()
    }

    /// Selection ILP maximizing `Σ weights[i] · x_i`.
    pub fn weighted_program(&self, weights: &[f64]) -> Program {
        let mut program = self.base.clone();
        program.name = "weighted panel".into();
        program.set_objective(Objective::Maximize {
            terms: weights
                .iter()
                .enumerate()
                .filter(|(_, &w)| w != 0.0)
                .map(|(i, &w)| (VarId(i), w))
                .collect(),
        });
        program
    }

    /// Reads the selected positions out of a selection-program assignment.
    pub fn panel_from_assignment(&self, assignment: &[f64]) -> Vec<usize> {
        assignment
            .iter()
            .take(self.pool_size)
            .enumerate()
            .filter(|(_, &x)| x > INTEGRALITY_THRESHOLD)
            .map(|(i, _)| i)
            .collect()
    }

    /// Achieved counts of `panel` against every bound.
    pub fn achieved_counts(&self, panel: &[usize]) -> Vec<CategoryCount> {
        let mut counts = vec![0usize; self.bounds.len()];
        for &i in panel {
            if let Some(of) = self.membership.get(i) {
                for &b in of {
                    counts[b] += 1;
                }
            }
        }
        self.bounds
            .iter()
            .zip(counts)
            .map(|(bound, selected)| CategoryCount {
                category: bound.category.clone(),
                value: bound.value.clone(),
                selected,
                lower: bound.lower,
                upper: bound.upper,
                pool_count: bound.members.len(),
            })
            .collect()
    }

    /// Candidates among `members` that can be selected together: every
    /// household counts once.
    fn available_units(&self, members: &[usize]) -> usize {
        let mut households_seen = vec![false; self.households.len()];
        members
            .iter()
            .filter(|&&i| match self.household_of[i] {
                Some(h) => !std::mem::replace(&mut households_seen[h], true),
                None => true,
            })
            .count()
    }
}

fn structural_program(pool_size: usize, panel_size: usize, households: &[Vec<usize>]) -> Program {
    let mut program = Program::new("panel");
    let vars: Vec<VarId> = (0..pool_size).map(|i| program.add_binary(format!("x{i}"))).collect();
    program.add_constraint(
        vars.iter().map(|&v| (v, 1.0)).collect(),
        Comparison::Eq,
        panel_size as f64,
    );
    for members in households {
        program.add_constraint(
            members.iter().map(|&i| (vars[i], 1.0)).collect(),
            Comparison::Le,
            1.0,
        );
    }
    program
}

fn base_program(
    pool_size: usize,
    panel_size: usize,
    bounds: &[QuotaBound],
    households: &[Vec<usize>],
) -> Program {
    let mut program = structural_program(pool_size, panel_size, households);
    for bound in bounds {
        let terms = bound.member_terms();
        if bound.lower > 0 {
            program.add_constraint(terms.clone(), Comparison::Ge, bound.lower as f64);
        }
        if bound.upper < bound.members.len() {
            program.add_constraint(terms, Comparison::Le, bound.upper as f64);
        }
    }
    program
}
