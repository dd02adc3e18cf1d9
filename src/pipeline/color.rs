use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    config::GlobalsConfig,
    error::{FrameError, Result},
    pipeline::buffer::PixelBuffer,
};

/// Environment variable consulted when the configuration names no color
/// config file
pub const COLOR_CONFIG_ENV: &str = "OCIO";

/// Bundled color config looked for as a last resort
pub const DEFAULT_COLOR_CONFIG: &str = "configs/colors.toml";

/// A named transfer curve in the color configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transfer", rename_all = "snake_case")]
pub enum TransferCurve {
    Linear,
    Srgb,
    Rec709,
    Gamma { value: f32 },
}

impl TransferCurve {
    /// Decode an encoded sample to scene-linear
    fn to_linear(&self, v: f32) -> f32 {
        match self {
            TransferCurve::Linear => v,
            TransferCurve::Srgb => {
                if v <= 0.04045 {
                    v / 12.92
                } else {
                    ((v + 0.055) / 1.055).powf(2.4)
                }
            }
            TransferCurve::Rec709 => {
                if v < 0.081 {
                    v / 4.5
                } else {
                    ((v + 0.099) / 1.099).powf(1.0 / 0.45)
                }
            }
            TransferCurve::Gamma { value } => v.max(0.0).powf(*value),
        }
    }

    /// Encode a scene-linear sample
    fn from_linear(&self, v: f32) -> f32 {
        match self {
            TransferCurve::Linear => v,
            TransferCurve::Srgb => {
                if v <= 0.003_130_8 {
                    v * 12.92
                } else {
                    1.055 * v.powf(1.0 / 2.4) - 0.055
                }
            }
            TransferCurve::Rec709 => {
                if v < 0.018 {
                    v * 4.5
                } else {
                    1.099 * v.powf(0.45) - 0.099
                }
            }
            TransferCurve::Gamma { value } => v.max(0.0).powf(1.0 / *value),
        }
    }
}

/// Parsed color configuration: a lookup from colorspace name to transfer
/// curve
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColorConfig {
    spaces: BTreeMap<String, TransferCurve>,
}

impl ColorConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::result::Result<Self, String> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
        toml::from_str(&content).map_err(|e| format!("{}: {e}", path.display()))
    }

    pub fn lookup(&self, name: &str) -> Option<TransferCurve> {
        self.spaces.get(name).copied()
    }

    #[cfg(test)]
    pub fn from_spaces(spaces: &[(&str, TransferCurve)]) -> Self {
        Self {
            spaces: spaces
                .iter()
                .map(|(name, curve)| (name.to_string(), *curve))
                .collect(),
        }
    }
}

/// Applies the configured source -> destination colorspace conversion.
///
/// Best-effort by design: a missing config file downgrades the stage to a
/// pass-through with a warning, and unknown colorspace names are reported
/// per frame while the untransformed buffer continues downstream.
#[derive(Debug)]
pub struct ColorTransformStage {
    config: Option<ColorConfig>,
    source: String,
    destination: String,
}

impl ColorTransformStage {
    pub fn new(config: Option<ColorConfig>, source: String, destination: String) -> Self {
        Self {
            config,
            source,
            destination,
        }
    }

    /// Build the stage from global settings, resolving the config path
    /// through the fallback chain: explicit setting, `$OCIO`, bundled
    /// default. A missing or unparseable file leaves the stage inactive.
    pub fn from_globals(globals: &GlobalsConfig) -> Self {
        let (source, destination) = globals.color_transform_pair();

        let path: Option<PathBuf> = globals
            .color_config
            .clone()
            .or_else(|| std::env::var_os(COLOR_CONFIG_ENV).map(PathBuf::from))
            .or_else(|| {
                let bundled = PathBuf::from(DEFAULT_COLOR_CONFIG);
                bundled.exists().then_some(bundled)
            });

        let config = match path {
            Some(path) if path.exists() => match ColorConfig::from_file(&path) {
                Ok(config) => {
                    debug!("Loaded color config: {:?}", path);
                    Some(config)
                }
                Err(reason) => {
                    warn!("Could not parse color config, skipping color transform: {reason}");
                    None
                }
            },
            Some(path) => {
                warn!(
                    "Color config does not exist: {:?}. No color transform will be applied",
                    path
                );
                None
            }
            None => {
                warn!("No color config specified. No color transform will be applied");
                None
            }
        };

        Self::new(config, source, destination)
    }

    /// Whether a config was loaded and conversions will be attempted
    pub fn is_active(&self) -> bool {
        self.config.is_some()
    }

    pub fn transform_names(&self) -> (&str, &str) {
        (&self.source, &self.destination)
    }

    /// Convert the buffer in place. Inactive stages are a no-op; unknown
    /// colorspace names leave the buffer untouched and return the error for
    /// the caller to report.
    pub fn apply(&self, buffer: &mut PixelBuffer) -> Result<()> {
        let Some(config) = &self.config else {
            return Ok(());
        };

        let source = config.lookup(&self.source).ok_or_else(|| {
            FrameError::ColorTransformFailed {
                reason: format!("source colorspace '{}' not in color config", self.source),
            }
        })?;
        let destination = config.lookup(&self.destination).ok_or_else(|| {
            FrameError::ColorTransformFailed {
                reason: format!(
                    "destination colorspace '{}' not in color config",
                    self.destination
                ),
            }
        })?;

        // Identical curves convert to themselves; keep the samples
        // bit-identical instead of round-tripping through float math
        if source == destination {
            return Ok(());
        }

        buffer.map_samples(|v| destination.from_linear(source.to_linear(v)));
        Ok(())
    }
}
