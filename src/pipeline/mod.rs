//! # Frame Processing Pipeline
//!
//! Per-frame stages between a decoded source image and the bytes handed to
//! the encoder: color transform, geometry (crop/resize/fit), and overlay
//! compositing. Each stage consumes its input buffer and returns a new or
//! mutated-in-place buffer; buffers are never shared between stages.

pub mod buffer;
pub mod color;
pub mod geometry;
pub mod overlay;
pub mod text;

pub use buffer::{BitDepth, PixelBuffer};
pub use color::{ColorConfig, ColorTransformStage};
pub use geometry::{GeometryConfig, GeometryEngine};
pub use overlay::OverlayCompositor;
