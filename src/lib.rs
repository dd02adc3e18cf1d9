//! # reelforge
//!
//! Turn rendered image sequences into slated, color-managed review movies.
//!
//! reelforge discovers numbered frame sequences on disk, pushes each frame
//! through a color transform, an aspect-aware geometry stage and a slate
//! overlay compositor, and streams the results in strict frame order into an
//! external ffmpeg process.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use reelforge::{config::Config, config::TokenData, engine::DailiesEngine};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = Config::from_file("dailies.toml")?;
//! let tokens = TokenData::from_file("shot_data.toml")?;
//!
//! let engine = DailiesEngine::new(config, tokens)?;
//! let summary = engine.generate(&[PathBuf::from("renders/sq010/")]).await?;
//! println!("wrote {} movie(s)", summary.movies.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`sequence`] - Frame sequence discovery and ordering
//! - [`pipeline`] - Per-frame color, geometry and overlay stages
//! - [`encode`] - Codec profiles and the encoder streaming protocol
//! - [`engine`] - Run orchestration, output naming, per-run logs
//! - [`config`] - Configuration management

pub mod config;
pub mod encode;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod sequence;

// Re-export commonly used types for convenience
pub use crate::{
    config::{Config, TokenData},
    engine::{DailiesEngine, RunSummary},
    error::{DailiesError, Result},
    sequence::SequenceResolver,
};
