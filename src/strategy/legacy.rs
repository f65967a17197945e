//! Randomized greedy panel search.
//!
//! Each attempt repeatedly takes the value furthest behind its minimum
//! (largest `(lower - selected) / remaining`), selects a uniformly random
//! remaining candidate with it, and removes the candidate, their household
//! and every value that reached its maximum. An attempt that runs out of
//! candidates for some minimum is abandoned.
//!
//! Attempt `i` draws from its own RNG, seeded by mixing `i` into one base
//! seed taken from the run RNG, so sequential and parallel execution return
//! the same panel.

use super::{StrategyContext, StrategyOutput, StrategyReport};
use crate::error::{Result, SelectionError};
use crate::model::ConstraintSet;
use crate::oracle::Oracle;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, trace};

#[cfg(feature = "parallel")]
use rayon::prelude::*;
#[cfg(feature = "parallel")]
use std::sync::atomic::Ordering;

pub(super) fn run<O: Oracle + ?Sized>(
    ctx: &StrategyContext<'_, O>,
    rng: &mut StdRng,
    max_attempts: usize,
) -> Result<StrategyReport> {
    let base: u64 = rng.random();

    let found = search(ctx, base, max_attempts)?;
    match found {
        Some((attempt, panel)) => {
            info!(attempt = attempt + 1, "legacy search found a panel");
            Ok(StrategyReport {
                output: StrategyOutput::Panel(panel),
                messages: vec![
                    "Using legacy algorithm.".to_string(),
                    format!("Found a feasible panel on attempt {}.", attempt + 1),
                ],
                warning: None,
                rounds: attempt + 1,
            })
        }
        None => Err(SelectionError::AttemptsExhausted {
            attempts: max_attempts,
        }),
    }
}

#[cfg(feature = "parallel")]
fn search<O: Oracle + ?Sized>(
    ctx: &StrategyContext<'_, O>,
    base: u64,
    max_attempts: usize,
) -> Result<Option<(usize, Vec<usize>)>> {
    if !ctx.config.parallel {
        return search_sequential(ctx, base, max_attempts);
    }
    ctx.check_cancel()?;
    let constraints = ctx.constraints;
    let cancel = ctx.cancel;
    (0..max_attempts)
        .into_par_iter()
        .map(|attempt| {
            if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                return Some(Err(SelectionError::Cancelled));
            }
            attempt_panel(constraints, attempt_seed(base, attempt))
                .map(|panel| Ok((attempt, panel)))
        })
        .find_first(Option::is_some)
        .flatten()
        .transpose()
}

#[cfg(not(feature = "parallel"))]
fn search<O: Oracle + ?Sized>(
    ctx: &StrategyContext<'_, O>,
    base: u64,
    max_attempts: usize,
) -> Result<Option<(usize, Vec<usize>)>> {
    search_sequential(ctx, base, max_attempts)
}

fn search_sequential<O: Oracle + ?Sized>(
    ctx: &StrategyContext<'_, O>,
    base: u64,
    max_attempts: usize,
) -> Result<Option<(usize, Vec<usize>)>> {
    for attempt in 0..max_attempts {
        ctx.check_cancel()?;
        if let Some(panel) = attempt_panel(ctx.constraints, attempt_seed(base, attempt)) {
            return Ok(Some((attempt, panel)));
        }
        debug!(attempt = attempt + 1, "legacy attempt failed");
    }
    Ok(None)
}

/// SplitMix64 finalizer over `base + attempt`.
fn attempt_seed(base: u64, attempt: usize) -> u64 {
    let mut z = base.wrapping_add((attempt as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Mutable bookkeeping of one attempt.
struct Attempt<'a> {
    constraints: &'a ConstraintSet,
    alive: Vec<bool>,
    selected: Vec<usize>,
    remaining: Vec<usize>,
}

impl<'a> Attempt<'a> {
    fn new(constraints: &'a ConstraintSet) -> Self {
        Self {
            constraints,
            alive: vec![true; constraints.pool_size()],
            selected: vec![0; constraints.bounds().len()],
            remaining: constraints.bounds().iter().map(|b| b.members.len()).collect(),
        }
    }

    fn remove(&mut self, i: usize) {
        if std::mem::replace(&mut self.alive[i], false) {
            for &b in self.constraints.membership(i) {
                self.remaining[b] -= 1;
            }
        }
    }

    fn remove_all_of(&mut self, b: usize) {
        for &i in &self.constraints.bounds()[b].members {
            self.remove(i);
        }
    }

    /// Bound with the largest outstanding share of its minimum.
    fn most_urgent(&self) -> Option<usize> {
        let mut best = None;
        let mut best_ratio = f64::NEG_INFINITY;
        for (b, bound) in self.constraints.bounds().iter().enumerate() {
            if self.remaining[b] == 0 || bound.upper == 0 {
                continue;
            }
            let ratio = (bound.lower as f64 - self.selected[b] as f64) / self.remaining[b] as f64;
            if ratio > best_ratio {
                best_ratio = ratio;
                best = Some(b);
            }
        }
        best
    }

    /// Whether every unmet minimum still has enough candidates left.
    fn can_still_succeed(&self) -> bool {
        self.constraints
            .bounds()
            .iter()
            .enumerate()
            .all(|(b, bound)| {
                self.selected[b] >= bound.lower
                    || self.remaining[b] >= bound.lower - self.selected[b]
            })
    }
}

/// One greedy attempt; `None` if it gets stuck or yields an infeasible panel.
fn attempt_panel(constraints: &ConstraintSet, seed: u64) -> Option<Vec<usize>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut state = Attempt::new(constraints);
    for (b, bound) in constraints.bounds().iter().enumerate() {
        if bound.upper == 0 {
            state.remove_all_of(b);
        }
    }

    let mut panel = Vec::with_capacity(constraints.panel_size());
    while panel.len() < constraints.panel_size() {
        if !state.can_still_succeed() {
            return None;
        }
        let b = state.most_urgent()?;
        let pick = rng.random_range(0..state.remaining[b]);
        let chosen = constraints.bounds()[b]
            .members
            .iter()
            .copied()
            .filter(|&i| state.alive[i])
            .nth(pick)?;
        trace!(chosen, bound = b, "legacy pick");

        panel.push(chosen);
        for &m in constraints.membership(chosen) {
            state.selected[m] += 1;
        }
        state.remove(chosen);
        if let Some(h) = constraints.household_of(chosen) {
            for &other in &constraints.households()[h] {
                state.remove(other);
            }
        }
        for &m in constraints.membership(chosen) {
            if state.selected[m] >= constraints.bounds()[m].upper {
                state.remove_all_of(m);
            }
        }
    }

    panel.sort_unstable();
    constraints.check_panel(&panel).is_empty().then_some(panel)
}
