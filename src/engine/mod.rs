//! # Dailies Engine
//!
//! Orchestrates the whole run: sequence discovery, per-sequence setup
//! (geometry resolution, slate layers, encoder session), the parallel
//! frame pipeline, and output/log placement.

pub mod output;
pub mod runner;

pub use output::{plan_movie_output, MoviePlan, RunLog};
pub use runner::{DailiesEngine, RunSummary};
