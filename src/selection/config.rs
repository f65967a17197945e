//! Selection request and numeric tunables.
//!
//! [`SelectionRequest`] describes one run (panel size, algorithm, seed);
//! [`SelectionConfig`] holds the numeric tolerances and caps the algorithms
//! use, which rarely need changing.

use crate::constants::{
    DECOMPOSITION_MAX_ROUNDS, DECOMPOSITION_TOLERANCE, DEFAULT_MAX_ATTEMPTS, EPS,
    MAXIMIN_MAX_ITERATIONS, MAXIMIN_TOLERANCE, MAX_COLUMN_ROUNDS,
};
use crate::strategy::Algorithm;

/// Parameters of one selection run.
///
/// # Builder Pattern
///
/// ```
/// use u_sortition::selection::SelectionRequest;
/// use u_sortition::strategy::Algorithm;
///
/// let request = SelectionRequest::new(30)
///     .with_algorithm(Algorithm::Maximin)
///     .with_seed(42)
///     .with_same_address(vec!["primary_address1".into(), "zip_royal_mail".into()]);
/// assert!(request.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SelectionRequest {
    /// Panel size `k`.
    pub panel_size: usize,

    /// Selection algorithm.
    pub algorithm: Algorithm,

    /// RNG seed. `0` draws a fresh seed for every run.
    pub random_number_seed: u64,

    /// Attempt budget of the legacy algorithm.
    pub max_attempts: usize,

    /// Whether at most one member per household may be selected.
    pub check_same_address: bool,

    /// Columns whose values together form the household key.
    pub check_same_address_columns: Vec<String>,

    /// Number of panels in the returned lottery.
    ///
    /// With `n > 1` the result carries `n` panels (repeats allowed) whose
    /// uniform mixture approximates the fair distribution; the selected panel
    /// is drawn from them.
    pub number_selections: usize,

    /// Return any feasible panel without randomization.
    ///
    /// Useful to check quotas quickly; never use for a real selection.
    pub test_selection: bool,
}

impl SelectionRequest {
    /// Creates a request for a panel of `panel_size` with default settings.
    pub fn new(panel_size: usize) -> Self {
        Self {
            panel_size,
            ..Self::default()
        }
    }

    /// Sets the algorithm.
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Sets the RNG seed (`0` = non-deterministic).
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_number_seed = seed;
        self
    }

    /// Sets the legacy attempt budget.
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Enables the same-household rule keyed on `columns`.
    pub fn with_same_address(mut self, columns: Vec<String>) -> Self {
        self.check_same_address = true;
        self.check_same_address_columns = columns;
        self
    }

    /// Sets the lottery size.
    pub fn with_number_selections(mut self, n: usize) -> Self {
        self.number_selections = n;
        self
    }

    /// Enables test-selection mode.
    pub fn with_test_selection(mut self, enabled: bool) -> Self {
        self.test_selection = enabled;
        self
    }

    /// Validates the request.
    pub fn validate(&self) -> Result<(), String> {
        if self.panel_size == 0 {
            return Err("panel_size must be at least 1".into());
        }
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".into());
        }
        if self.number_selections == 0 {
            return Err("number_selections must be at least 1".into());
        }
        if self.number_selections > 1 && self.test_selection {
            return Err(
                "test selection does not support a lottery; number_selections must be 1".into(),
            );
        }
        if self.number_selections > 1 && self.algorithm == Algorithm::Legacy {
            return Err(
                "the legacy algorithm does not support a lottery; number_selections must be 1"
                    .into(),
            );
        }
        Ok(())
    }
}

impl Default for SelectionRequest {
    fn default() -> Self {
        Self {
            panel_size: 1,
            algorithm: Algorithm::default(),
            random_number_seed: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            check_same_address: false,
            check_same_address_columns: Vec::new(),
            number_selections: 1,
            test_selection: false,
        }
    }
}

/// Numeric tunables of the algorithms.
///
/// # Defaults
///
/// ```
/// use u_sortition::selection::SelectionConfig;
///
/// let config = SelectionConfig::default();
/// assert_eq!(config.leximin_epsilon, 0.0005);
/// assert_eq!(config.maximin_tolerance, 1e-6);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SelectionConfig {
    /// Interval width at which the maximin bisection stops.
    pub maximin_tolerance: f64,

    /// Bisection step cap; reaching it yields a not-converged result.
    pub maximin_max_iterations: usize,

    /// Dual weight above which a leximin candidate counts as tight, and the
    /// column-generation optimality gap.
    ///
    /// Floating-point ties near this value decide which probabilities get
    /// fixed; change it together with tests.
    pub leximin_epsilon: f64,

    /// Cap on pricing rounds in any single column generation.
    pub max_column_rounds: usize,

    /// Largest marginal deficit the sampler accepts.
    pub decomposition_tolerance: f64,

    /// Cap on panels the sampler adds while decomposing.
    pub decomposition_max_rounds: usize,

    /// Run legacy attempts in parallel (requires the `parallel` feature).
    pub parallel: bool,
}

impl SelectionConfig {
    /// Sets the maximin bisection tolerance.
    pub fn with_maximin_tolerance(mut self, tolerance: f64) -> Self {
        self.maximin_tolerance = tolerance;
        self
    }

    /// Sets the maximin bisection step cap.
    pub fn with_maximin_max_iterations(mut self, n: usize) -> Self {
        self.maximin_max_iterations = n;
        self
    }

    /// Sets the leximin tightness epsilon.
    pub fn with_leximin_epsilon(mut self, eps: f64) -> Self {
        self.leximin_epsilon = eps;
        self
    }

    /// Sets the column-generation round cap.
    pub fn with_max_column_rounds(mut self, n: usize) -> Self {
        self.max_column_rounds = n;
        self
    }

    /// Sets the decomposition tolerance.
    pub fn with_decomposition_tolerance(mut self, tolerance: f64) -> Self {
        self.decomposition_tolerance = tolerance;
        self
    }

    /// Enables or disables parallel legacy attempts.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.maximin_tolerance > 0.0 && self.maximin_tolerance < 1.0) {
            return Err("maximin_tolerance must be in (0, 1)".into());
        }
        if self.maximin_max_iterations == 0 {
            return Err("maximin_max_iterations must be at least 1".into());
        }
        if !(self.leximin_epsilon > 0.0 && self.leximin_epsilon < 1.0) {
            return Err("leximin_epsilon must be in (0, 1)".into());
        }
        if self.max_column_rounds == 0 {
            return Err("max_column_rounds must be at least 1".into());
        }
        if !(self.decomposition_tolerance >= 0.0 && self.decomposition_tolerance < 1.0) {
            return Err("decomposition_tolerance must be in [0, 1)".into());
        }
        Ok(())
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            maximin_tolerance: MAXIMIN_TOLERANCE,
            maximin_max_iterations: MAXIMIN_MAX_ITERATIONS,
            leximin_epsilon: EPS,
            max_column_rounds: MAX_COLUMN_ROUNDS,
            decomposition_tolerance: DECOMPOSITION_TOLERANCE,
            decomposition_max_rounds: DECOMPOSITION_MAX_ROUNDS,
            parallel: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let request = SelectionRequest::new(10);
        assert_eq!(request.panel_size, 10);
        assert_eq!(request.max_attempts, 100);
        assert_eq!(request.number_selections, 1);
        assert_eq!(request.algorithm, Algorithm::Leximin);
        assert!(!request.check_same_address);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_request_validation() {
        assert!(SelectionRequest::new(0).validate().is_err());
        assert!(SelectionRequest::new(5).with_max_attempts(0).validate().is_err());
        assert!(SelectionRequest::new(5).with_number_selections(0).validate().is_err());
        assert!(SelectionRequest::new(5)
            .with_number_selections(3)
            .with_test_selection(true)
            .validate()
            .is_err());
        assert!(SelectionRequest::new(5)
            .with_algorithm(Algorithm::Legacy)
            .with_number_selections(3)
            .validate()
            .is_err());
        assert!(SelectionRequest::new(5)
            .with_algorithm(Algorithm::Nash)
            .with_number_selections(3)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(SelectionConfig::default().validate().is_ok());
        assert!(SelectionConfig::default().with_maximin_tolerance(0.0).validate().is_err());
        assert!(SelectionConfig::default().with_leximin_epsilon(1.5).validate().is_err());
        assert!(SelectionConfig::default().with_max_column_rounds(0).validate().is_err());
        assert!(SelectionConfig::default()
            .with_maximin_max_iterations(0)
            .validate()
            .is_err());
        assert!(SelectionConfig::default()
            .with_decomposition_tolerance(f64::NAN)
            .validate()
            .is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = SelectionConfig::default().with_parallel(true).with_max_column_rounds(10);
        assert!(config.parallel);
        assert_eq!(config.max_column_rounds, 10);
    }
}
