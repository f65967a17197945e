//! Constraint model.
//!
//! Turns a pool, a quota table and a panel size into a [`ConstraintSet`]:
//! one binary selection variable per candidate, `Σ x_i = k`, a
//! `[lower, upper]` range per category value, and optionally at most one
//! member per household.
//!
//! # Key Components
//!
//! - [`ConstraintSet`]: active bounds of one solve attempt, immutable
//! - [`QuotaBound`]: one `(category, value)` range with its members
//! - [`CategoryCount`]: achieved count of a panel against a bound

mod constraint_set;
mod report;

pub use constraint_set::{ConstraintSet, QuotaBound};
pub use report::CategoryCount;
