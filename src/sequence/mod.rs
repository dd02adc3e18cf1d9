//! # Image Sequence Discovery
//!
//! Finds numbered still-frame sequences on disk and presents them in strict
//! frame order for the processing pipeline.

pub mod resolver;
pub mod types;

pub use resolver::{SequenceResolver, INPUT_IMAGE_FORMATS};
pub use types::{FrameRef, ImageSequence};
