//! Selection orchestrator.
//!
//! Drives one run through `Validating → Probing → [Relaxed] → Optimizing →
//! Sampling → Done`, collecting narrative messages along the way, and
//! assembles the [`SelectionResult`].
//!
//! # Key Components
//!
//! - [`SelectionRequest`]: what to select (panel size, algorithm, seed)
//! - [`SelectionConfig`]: numeric tunables of the algorithms
//! - [`Selector`]: runs the pipeline against an [`Oracle`](crate::oracle::Oracle)
//! - [`spawn_selection`]: the same pipeline on a background thread, with
//!   cancellation through a [`SelectionHandle`]

mod background;
mod config;
mod runner;
mod types;

pub use background::{spawn_selection, SelectionHandle};
pub use config::{SelectionConfig, SelectionRequest};
pub use runner::Selector;
pub use types::{SelectionResult, SelectionStatus, Stage};
