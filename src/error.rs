use thiserror::Error;

/// Main error type for the reelforge library
#[derive(Error, Debug)]
pub enum DailiesError {
    #[error("Sequence discovery error: {0}")]
    Sequence(#[from] SequenceError),

    #[error("Frame processing error: {0}")]
    Frame(#[from] FrameError),

    #[error("Overlay error: {0}")]
    Overlay(#[from] OverlayError),

    #[error("Encoding error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Sequence discovery errors
#[derive(Error, Debug)]
pub enum SequenceError {
    #[error("No image sequences found at: {path}")]
    NotFound { path: String },

    #[error("Input path does not exist: {path}")]
    MissingInput { path: String },

    #[error("Unsupported frame extension: {extension}")]
    UnsupportedExtension { extension: String },
}

/// Per-frame pipeline errors
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Failed to load frame: {path}")]
    LoadFailed { path: String },

    #[error("Frame {frame} has zero source height: {path}")]
    ZeroHeight { frame: u64, path: String },

    #[error("Color transform failed: {reason}")]
    ColorTransformFailed { reason: String },

    #[error("Geometry transform failed: {reason}")]
    GeometryFailed { reason: String },

    #[error("Frame {frame} is {got_width}x{got_height}, session is {want_width}x{want_height}")]
    ResolutionMismatch {
        frame: u64,
        got_width: u32,
        got_height: u32,
        want_width: u32,
        want_height: u32,
    },
}

/// Overlay compositing errors
#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("Failed to load overlay image: {path}")]
    ImageLoadFailed { path: String },

    #[error("No usable font for text element '{element}'")]
    FontUnavailable { element: String },

    #[error("Failed to parse font file {path}: {reason}")]
    FontParseFailed { path: String, reason: String },

    #[error("Unknown data token for text element '{element}'")]
    UnknownToken { element: String },
}

/// Encoder process errors
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("ffmpeg not found on PATH")]
    EncoderMissing,

    #[error("Failed to launch encoder: {reason}")]
    LaunchFailed { reason: String },

    #[error("Failed to write frame {frame} to encoder: {reason}")]
    WriteFailed { frame: u64, reason: String },

    #[error("Encoder exited with status {status}: {stderr}")]
    ExitFailure { status: String, stderr: String },

    #[error("Frame {frame} written out of order (expected {expected})")]
    OutOfOrder { frame: u64, expected: u64 },

    #[error("Still-image encoding failed: {reason}")]
    StillEncodeFailed { reason: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {key}")]
    MissingKey { key: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Unknown codec profile: {name}")]
    UnknownCodec { name: String },
}

/// Convenience type alias for Results using DailiesError
pub type Result<T> = std::result::Result<T, DailiesError>;

impl DailiesError {
    /// Create a generic error with a custom message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    /// Whether this failure should stop the whole batch rather than just the
    /// current sequence or frame
    pub fn is_run_fatal(&self) -> bool {
        match self {
            // A missing encoder binary cannot recover between sequences
            Self::Encode(EncodeError::EncoderMissing) => true,
            // Config problems were validated up front; hitting one mid-run means
            // nothing downstream can work either
            Self::Config(_) => true,
            _ => false,
        }
    }

    /// Whether this failure only invalidates a single frame
    pub fn is_frame_scoped(&self) -> bool {
        matches!(
            self,
            Self::Frame(_) | Self::Overlay(OverlayError::UnknownToken { .. })
        )
    }
}
