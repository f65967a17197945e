//! Optimization oracle.
//!
//! The selection algorithms never solve a linear, integer, or convex program
//! themselves. They describe one as a [`Program`] and hand it to an
//! [`Oracle`], which answers with an [`OracleOutcome`].
//!
//! # Key Components
//!
//! - [`Program`]: variables, linear constraints, objective
//! - [`VarDomain`]: continuous, integer, or binary
//! - [`Oracle`] trait: stateless solve service
//! - [`MicroLpOracle`]: LP/ILP through `microlp`, log-sum
//!   objectives through a fixed-point iteration over the probability simplex
//!
//! # Design
//!
//! An oracle keeps no state between calls. Every call receives a complete
//! program and builds its own solver instance, so one oracle can be shared
//! across threads and runs.

mod log_sum;
mod program;
mod solver;

pub use program::{Comparison, LinearConstraint, Objective, Program, VarDomain, VarId, Variable};
pub use solver::{MicroLpOracle, Oracle, OracleOutcome};
