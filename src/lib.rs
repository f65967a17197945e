//! Quota-constrained fair panel selection (sortition).
//!
//! Selects a panel of `k` people from a respondent pool so that every
//! category value (gender, age band, region, ...) lands inside its quota,
//! and so that selection probabilities are as fair as the quotas allow.
//!
//! - **Legacy**: randomized greedy search for one feasible panel.
//! - **Maximin**: maximizes the smallest selection probability.
//! - **Leximin**: maximizes the smallest, then the next smallest, and so on.
//! - **Nash**: maximizes the product of selection probabilities.
//!
//! Infeasible quotas are relaxed once to their flex bounds, with advisory
//! messages naming the smallest relaxation that works.
//!
//! # Architecture
//!
//! [`pool`] and [`quota`] hold the inputs; [`model`] turns them into a
//! [`ConstraintSet`](model::ConstraintSet); [`probe`] finds the active set;
//! [`strategy`] computes a panel or a probability vector by asking an
//! [`Oracle`](oracle::Oracle) for linear, integer, and log-sum solves;
//! [`sampler`] turns probabilities into one panel; [`selection`] drives the
//! whole run.
//!
//! ```
//! use u_sortition::pool::{Candidate, CandidatePool};
//! use u_sortition::quota::{QuotaTable, QuotaTarget};
//! use u_sortition::selection::{SelectionRequest, Selector};
//! use u_sortition::strategy::Algorithm;
//!
//! let pool = CandidatePool::new(
//!     (0..6)
//!         .map(|i| {
//!             let age = if i < 3 { "young" } else { "old" };
//!             Candidate::new(format!("p{i}")).with_feature("age", age)
//!         })
//!         .collect(),
//! )
//! .unwrap();
//! let quotas = QuotaTable::new(vec![
//!     QuotaTarget::new("age", "young", 1, 2),
//!     QuotaTarget::new("age", "old", 1, 2),
//! ])
//! .unwrap();
//!
//! let request = SelectionRequest::new(3).with_algorithm(Algorithm::Maximin).with_seed(1);
//! let result = Selector::new().run(&pool, &quotas, &request).unwrap();
//! assert_eq!(result.selected.len(), 3);
//! ```

pub mod constants;
pub mod error;
pub mod model;
pub mod oracle;
pub mod pool;
pub mod probe;
pub mod quota;
pub mod sampler;
pub mod selection;
pub mod strategy;

pub use error::{Result, SelectionError};
pub use selection::{SelectionRequest, SelectionResult, Selector};
pub use strategy::Algorithm;
