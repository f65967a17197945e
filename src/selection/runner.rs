//! Selection pipeline.

use super::config::{SelectionConfig, SelectionRequest};
use super::types::{SelectionResult, SelectionStatus, Stage};
use crate::error::{Result, SelectionError};
use crate::model::ConstraintSet;
use crate::oracle::{MicroLpOracle, Oracle};
use crate::pool::{CandidatePool, CandidateTable};
use crate::probe::probe;
use crate::quota::QuotaTable;
use crate::sampler::{decompose, draw};
use crate::strategy::{run_strategy, StrategyContext, StrategyOutput};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Runs selections against one oracle with one set of tunables.
///
/// # Examples
///
/// ```
/// use u_sortition::pool::{Candidate, CandidatePool};
/// use u_sortition::quota::{QuotaTable, QuotaTarget};
/// use u_sortition::selection::{SelectionRequest, Selector};
/// use u_sortition::strategy::Algorithm;
///
/// let pool = CandidatePool::new(
///     (0..10)
///         .map(|i| {
///             let gender = if i < 5 { "M" } else { "F" };
///             Candidate::new(format!("p{i}")).with_feature("gender", gender)
///         })
///         .collect(),
/// )
/// .unwrap();
/// let quotas = QuotaTable::new(vec![
///     QuotaTarget::new("gender", "M", 2, 3),
///     QuotaTarget::new("gender", "F", 2, 3),
/// ])
/// .unwrap();
///
/// let request = SelectionRequest::new(5).with_algorithm(Algorithm::Legacy).with_seed(42);
/// let result = Selector::new().run(&pool, &quotas, &request).unwrap();
/// assert_eq!(result.selected.len(), 5);
/// assert_eq!(result.remaining.len(), 5);
/// ```
#[derive(Debug, Clone)]
pub struct Selector<O: Oracle = MicroLpOracle> {
    oracle: O,
    config: SelectionConfig,
}

impl Selector<MicroLpOracle> {
    /// Selector backed by [`MicroLpOracle`] with default tunables.
    pub fn new() -> Self {
        Self {
            oracle: MicroLpOracle::new(),
            config: SelectionConfig::default(),
        }
    }
}

impl Default for Selector<MicroLpOracle> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: Oracle> Selector<O> {
    /// Replaces the oracle.
    pub fn with_oracle<P: Oracle>(self, oracle: P) -> Selector<P> {
        Selector {
            oracle,
            config: self.config,
        }
    }

    /// Replaces the tunables.
    pub fn with_config(mut self, config: SelectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Active tunables.
    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    /// Active oracle.
    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Selects a panel.
    pub fn run(
        &self,
        pool: &CandidatePool,
        quotas: &QuotaTable,
        request: &SelectionRequest,
    ) -> Result<SelectionResult> {
        self.run_with_cancel(pool, quotas, request, None)
    }

    /// Selects a panel with an optional cancellation flag.
    ///
    /// The flag is checked between stages and between solver calls; a solve
    /// in progress is never interrupted.
    pub fn run_with_cancel(
        &self,
        pool: &CandidatePool,
        quotas: &QuotaTable,
        request: &SelectionRequest,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<SelectionResult> {
        let mut trail = StageTrail::new();
        let outcome = self.execute(&mut trail, pool, quotas, request, cancel.as_deref());
        if let Err(err) = &outcome {
            warn!(stage = %trail.current(), to = %Stage::Failed, error = %err, "selection failed");
        }
        outcome
    }

    /// Parses both tables and selects a panel.
    ///
    /// The quota categories determine which candidate columns are read as
    /// features. Warnings about skipped rows are prepended to the result
    /// messages.
    pub fn select_from_tables(
        &self,
        people: &CandidateTable,
        id_column: &str,
        targets_header: &[String],
        targets_rows: &[Vec<String>],
        request: &SelectionRequest,
    ) -> Result<SelectionResult> {
        let quotas = QuotaTable::from_rows(targets_header, targets_rows)?;
        if request.check_same_address && request.check_same_address_columns.is_empty() {
            return Err(SelectionError::Validation(
                "check_same_address is set but no address columns are given".into(),
            ));
        }
        let categories: Vec<String> = quotas.categories().into_iter().map(str::to_string).collect();
        let address_columns: &[String] = if request.check_same_address {
            &request.check_same_address_columns
        } else {
            &[]
        };
        let (pool, warnings) = people.into_pool(id_column, &categories, address_columns)?;

        let mut result = self.run(&pool, &quotas, request)?;
        let mut messages = warnings;
        messages.append(&mut result.messages);
        result.messages = messages;
        Ok(result)
    }

    fn execute(
        &self,
        trail: &mut StageTrail,
        pool: &CandidatePool,
        quotas: &QuotaTable,
        request: &SelectionRequest,
        cancel: Option<&AtomicBool>,
    ) -> Result<SelectionResult> {
        request.validate().map_err(SelectionError::Validation)?;
        self.config.validate().map_err(SelectionError::Validation)?;
        check_cancel(cancel)?;

        let seed = match request.random_number_seed {
            0 => rand::random(),
            seed => seed,
        };
        let mut rng = StdRng::seed_from_u64(seed);
        info!(
            algorithm = %request.algorithm,
            panel_size = request.panel_size,
            pool = pool.len(),
            seed,
            "selection started"
        );

        trail.advance(Stage::Probing)?;
        let probed = probe(
            &self.oracle,
            pool,
            quotas,
            request.panel_size,
            request.check_same_address,
        )?;
        let mut messages = probed.messages;
        if probed.relaxed {
            trail.advance(Stage::Relaxed)?;
        }
        let constraints = probed.constraints;
        check_cancel(cancel)?;

        let draft = Draft {
            algorithm: request.algorithm,
            relaxed: probed.relaxed,
            seed,
        };

        if request.test_selection {
            messages.push(
                "WARNING: panel is not selected at random; only use for testing.".to_string(),
            );
            trail.advance(Stage::Done)?;
            return draft.finish(
                pool,
                &constraints,
                probed.witness,
                Sampled::default(),
                SelectionStatus::Converged,
                messages,
                trail,
            );
        }

        trail.advance(Stage::Optimizing)?;
        let ctx = StrategyContext::new(&constraints, pool, &self.oracle, &self.config)
            .with_cancel(cancel);
        let report = run_strategy(request.algorithm, &ctx, &mut rng, request.max_attempts)?;
        messages.extend(report.messages);
        let status = match report.warning {
            Some(warning) => {
                messages.push(format!("WARNING: {warning}"));
                SelectionStatus::NotConverged { warning }
            }
            None => SelectionStatus::Converged,
        };

        trail.advance(Stage::Sampling)?;
        let (panel, sampled) = match report.output {
            StrategyOutput::Panel(panel) => (panel, Sampled::default()),
            StrategyOutput::Distribution { marginals, support } => {
                let discovered = support.len();
                let decomposition = decompose(&ctx, &marginals, support)?;
                messages.push(format!(
                    "Algorithm produced distribution over {discovered} panels, \
                     out of which {} are chosen with positive probability.",
                    decomposition.panels.len()
                ));
                if decomposition.max_deviation > self.config.decomposition_tolerance {
                    warn!(
                        deviation = decomposition.max_deviation,
                        "sampled distribution deviates from the target marginals"
                    );
                }

                let sample = draw(&decomposition.weights, request.number_selections, &mut rng)?;
                let ids_of = |panel: &[usize]| -> Vec<String> {
                    panel.iter().filter_map(|&i| pool.get(i)).map(|c| c.id.clone()).collect()
                };
                let lottery = if request.number_selections > 1 {
                    sample.lottery.iter().map(|&j| ids_of(&decomposition.panels[j])).collect()
                } else {
                    Vec::new()
                };
                let marginals = pool
                    .iter()
                    .zip(marginals.as_slice())
                    .map(|(c, &p)| (c.id.clone(), p))
                    .collect();
                (
                    decomposition.panels[sample.chosen].clone(),
                    Sampled {
                        marginals: Some(marginals),
                        lottery,
                        max_deviation: Some(decomposition.max_deviation),
                    },
                )
            }
        };

        let violations = constraints.check_panel(&panel);
        if !violations.is_empty() {
            return Err(SelectionError::Solver(format!(
                "selected panel violates the active constraints: {}",
                violations.join("; ")
            )));
        }

        trail.advance(Stage::Done)?;
        draft.finish(pool, &constraints, panel, sampled, status, messages, trail)
    }
}

/// Sampling output carried into the result.
#[derive(Default)]
struct Sampled {
    marginals: Option<Vec<(String, f64)>>,
    lottery: Vec<Vec<String>>,
    max_deviation: Option<f64>,
}

/// Result fields fixed before the algorithm runs.
struct Draft {
    algorithm: crate::strategy::Algorithm,
    relaxed: bool,
    seed: u64,
}

impl Draft {
    #[allow(clippy::too_many_arguments)]
    fn finish(
        self,
        pool: &CandidatePool,
        constraints: &ConstraintSet,
        panel: Vec<usize>,
        sampled: Sampled,
        status: SelectionStatus,
        messages: Vec<String>,
        trail: &StageTrail,
    ) -> Result<SelectionResult> {
        let mut chosen = vec![false; pool.len()];
        for &i in &panel {
            chosen[i] = true;
        }
        let (selected, remaining) = pool
            .iter()
            .zip(&chosen)
            .fold((Vec::new(), Vec::new()), |(mut sel, mut rest), (c, &is_chosen)| {
                if is_chosen {
                    sel.push(c.clone());
                } else {
                    rest.push(c.clone());
                }
                (sel, rest)
            });

        info!(
            selected = selected.len(),
            relaxed = self.relaxed,
            converged = status == SelectionStatus::Converged,
            "selection finished"
        );
        Ok(SelectionResult {
            selected,
            remaining,
            category_counts: constraints.achieved_counts(&panel),
            status,
            messages,
            algorithm: self.algorithm,
            relaxed: self.relaxed,
            bound_kind: constraints.kind(),
            marginals: sampled.marginals,
            lottery: sampled.lottery,
            max_marginal_deviation: sampled.max_deviation,
            stages: trail.stages.clone(),
            seed: self.seed,
        })
    }
}

/// Stages visited so far; enforces the transition rules.
struct StageTrail {
    stages: Vec<Stage>,
}

impl StageTrail {
    fn new() -> Self {
        Self {
            stages: vec![Stage::Validating],
        }
    }

    fn current(&self) -> Stage {
        self.stages.last().copied().unwrap_or(Stage::Validating)
    }

    fn advance(&mut self, next: Stage) -> Result<()> {
        let current = self.current();
        if !current.can_transition_to(next) {
            return Err(SelectionError::Solver(format!(
                "invalid stage transition from {current} to {next}"
            )));
        }
        info!(from = %current, to = %next, "stage");
        self.stages.push(next);
        Ok(())
    }
}

fn check_cancel(cancel: Option<&AtomicBool>) -> Result<()> {
    match cancel {
        Some(flag) if flag.load(Ordering::Relaxed) => Err(SelectionError::Cancelled),
        _ => Ok(()),
    }
}
