//! Numeric tolerances and iteration caps.
//!
//! Values here are defaults; the tunable ones are copied into
//! [`SelectionConfig`](crate::selection::SelectionConfig) and can be changed
//! per run. Floating-point ties near these bounds are the usual source of
//! surprising leximin/maximin output, so change them together with tests.

/// Deviation accepted as equality when comparing solver values.
///
/// Used as the column-generation optimality gap and as the dual-weight
/// threshold above which a leximin candidate counts as tight.
pub const EPS: f64 = 0.0005;

/// Pricing tolerance for the Nash-welfare column generation.
pub const EPS_NASH: f64 = 0.1;

/// Probabilities and panel weights below this are treated as zero.
pub const EPS2: f64 = 1e-8;

/// Interval width at which the maximin bisection stops.
pub const MAXIMIN_TOLERANCE: f64 = 1e-6;

/// Bisection step cap for maximin.
pub const MAXIMIN_MAX_ITERATIONS: usize = 64;

/// Amount by which fixed leximin probabilities are lowered when the dual LP
/// turns unbounded through floating-point drift.
pub const LEXIMIN_RELAX_STEP: f64 = 1e-4;

/// Maximum number of fixed-probability reductions in one leximin run.
pub const LEXIMIN_MAX_REDUCTIONS: usize = 100;

/// Cap on pricing rounds in any single column generation.
pub const MAX_COLUMN_ROUNDS: usize = 500;

/// Largest marginal deficit the sampler accepts without generating more panels.
pub const DECOMPOSITION_TOLERANCE: f64 = 1e-6;

/// Cap on panels the sampler adds while decomposing a probability vector.
pub const DECOMPOSITION_MAX_ROUNDS: usize = 50;

/// Multiplicative weight factor applied to members of a freshly found panel.
pub const PORTFOLIO_DECAY: f64 = 0.8;

/// Integer solutions are read as selected above this value.
pub const INTEGRALITY_THRESHOLD: f64 = 0.5;

/// Iteration cap of the log-sum (Nash) convex solve.
pub const LOG_SUM_MAX_ITERATIONS: usize = 100_000;

/// Duality-gap tolerance of the log-sum convex solve.
pub const LOG_SUM_TOLERANCE: f64 = 1e-10;

/// Default number of legacy attempts.
pub const DEFAULT_MAX_ATTEMPTS: usize = 100;
