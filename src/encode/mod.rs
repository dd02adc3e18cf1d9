//! # Encoder Protocol
//!
//! Codec profile resolution, ffmpeg command construction, and the ordered
//! frame-streaming protocol that feeds the encoder process over stdin.

pub mod codec;
pub mod streamer;
pub mod timecode;

pub use codec::{CodecKind, CodecProfile, CodecRegistry};
pub use streamer::{
    build_encoder_args, is_ffmpeg_available, serialize_frame, EncodeSession, FrameStreamer,
};
pub use timecode::Timecode;
