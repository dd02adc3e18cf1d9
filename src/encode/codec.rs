use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// How frames travel to the encoder: raw interleaved samples, or one
/// independently compressed image per frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecKind {
    RawVideo,
    StillImage,
}

/// Encoder parameters for a named output format.
///
/// Immutable once resolved; every optional field maps to one ffmpeg flag,
/// emitted in a fixed order by the streamer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodecProfile {
    pub name: String,
    pub kind: CodecKind,
    pub bitdepth: u8,
    pub movie_ext: String,

    pub codec: Option<String>,
    pub profile: Option<String>,
    pub qscale: Option<String>,
    pub preset: Option<String>,
    pub keyint: Option<u32>,
    pub bframes: Option<u32>,
    pub tune: Option<String>,
    pub crf: Option<u32>,
    pub pix_fmt: Option<String>,
    pub vf: Option<String>,
    pub vendor: Option<String>,
    pub metadata_s: Option<String>,
    pub bitrate: Option<String>,
}

impl CodecProfile {
    fn bare(name: &str, kind: CodecKind, bitdepth: u8, movie_ext: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            bitdepth,
            movie_ext: movie_ext.to_string(),
            codec: None,
            profile: None,
            qscale: None,
            preset: None,
            keyint: None,
            bframes: None,
            tune: None,
            crf: None,
            pix_fmt: None,
            vf: None,
            vendor: None,
            metadata_s: None,
            bitrate: None,
        }
    }

    /// Pixel format ffmpeg reads from the input pipe for raw-video codecs
    pub fn input_pixel_format(&self) -> &'static str {
        if self.bitdepth >= 10 {
            "rgb48le"
        } else {
            "rgb24"
        }
    }
}

/// Partial codec profile from the configuration's `[codecs]` table, merged
/// over a built-in profile of the same name or a bare raw-video default
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodecOverride {
    pub kind: Option<CodecKind>,
    pub bitdepth: Option<u8>,
    pub movie_ext: Option<String>,
    pub codec: Option<String>,
    pub profile: Option<String>,
    pub qscale: Option<String>,
    pub preset: Option<String>,
    pub keyint: Option<u32>,
    pub bframes: Option<u32>,
    pub tune: Option<String>,
    pub crf: Option<u32>,
    pub pix_fmt: Option<String>,
    pub vf: Option<String>,
    pub vendor: Option<String>,
    pub metadata_s: Option<String>,
    pub bitrate: Option<String>,
}

impl CodecOverride {
    fn apply(&self, mut base: CodecProfile) -> CodecProfile {
        if let Some(kind) = self.kind {
            base.kind = kind;
        }
        if let Some(bitdepth) = self.bitdepth {
            base.bitdepth = bitdepth;
        }
        if let Some(ext) = &self.movie_ext {
            base.movie_ext = ext.clone();
        }

        macro_rules! merge {
            ($($field:ident),*) => {
                $(if self.$field.is_some() {
                    base.$field = self.$field.clone();
                })*
            };
        }
        merge!(
            codec, profile, qscale, preset, keyint, bframes, tune, crf, pix_fmt, vf, vendor,
            metadata_s, bitrate
        );
        base
    }
}

/// Registry of named codec profiles
///
/// Built-in profiles cover the common review formats; the configuration can
/// override any field per name or add entirely new profiles.
pub struct CodecRegistry {
    profiles: BTreeMap<String, CodecProfile>,
}

impl CodecRegistry {
    /// Create a registry with all built-in profiles
    pub fn new() -> Self {
        let mut registry = Self {
            profiles: BTreeMap::new(),
        };
        registry.register_builtin_profiles();
        registry
    }

    /// Create a registry with configuration overrides merged in
    pub fn with_overrides(overrides: &BTreeMap<String, CodecOverride>) -> Result<Self> {
        let mut registry = Self::new();

        for (name, over) in overrides {
            let base = registry
                .profiles
                .remove(name)
                .unwrap_or_else(|| CodecProfile::bare(name, CodecKind::RawVideo, 8, "mov"));
            registry.register(over.apply(base));
        }

        for profile in registry.profiles.values() {
            Self::validate(profile)?;
        }
        Ok(registry)
    }

    fn register_builtin_profiles(&mut self) {
        // 10-bit HEVC, the default review format
        self.register(CodecProfile {
            codec: Some("libx265".to_string()),
            profile: Some("main10".to_string()),
            preset: Some("medium".to_string()),
            crf: Some(18),
            pix_fmt: Some("yuv420p10le".to_string()),
            ..CodecProfile::bare("hevc", CodecKind::RawVideo, 10, "mov")
        });

        // Every-frame-is-a-keyframe H.264 for scrubbing
        self.register(CodecProfile {
            codec: Some("libx264".to_string()),
            profile: Some("high".to_string()),
            preset: Some("slower".to_string()),
            keyint: Some(1),
            bframes: Some(0),
            tune: Some("film".to_string()),
            crf: Some(15),
            pix_fmt: Some("yuv420p".to_string()),
            ..CodecProfile::bare("h264", CodecKind::RawVideo, 8, "mov")
        });

        // Motion JPEG: frames arrive at the encoder already compressed
        self.register(CodecProfile {
            codec: Some("mjpeg".to_string()),
            qscale: Some("1".to_string()),
            pix_fmt: Some("yuvj444p".to_string()),
            ..CodecProfile::bare("mjpeg", CodecKind::StillImage, 8, "mov")
        });

        self.register(CodecProfile {
            codec: Some("prores_ks".to_string()),
            profile: Some("3".to_string()),
            qscale: Some("9".to_string()),
            vendor: Some("ap10".to_string()),
            pix_fmt: Some("yuv422p10le".to_string()),
            metadata_s: Some("encoder=Apple ProRes 422 HQ".to_string()),
            ..CodecProfile::bare("prores", CodecKind::RawVideo, 10, "mov")
        });

        self.register(CodecProfile {
            codec: Some("dnxhd".to_string()),
            pix_fmt: Some("yuv422p".to_string()),
            bitrate: Some("36M".to_string()),
            ..CodecProfile::bare("dnxhd", CodecKind::RawVideo, 8, "mov")
        });
    }

    fn register(&mut self, profile: CodecProfile) {
        self.profiles.insert(profile.name.clone(), profile);
    }

    fn validate(profile: &CodecProfile) -> Result<()> {
        if !matches!(profile.bitdepth, 8 | 10 | 12 | 16) {
            return Err(ConfigError::InvalidValue {
                key: format!("codecs.{}.bitdepth", profile.name),
                value: profile.bitdepth.to_string(),
            }
            .into());
        }
        if profile.kind == CodecKind::StillImage && profile.bitdepth != 8 {
            // The per-frame image compressor only produces 8-bit streams
            return Err(ConfigError::InvalidValue {
                key: format!("codecs.{}.bitdepth", profile.name),
                value: profile.bitdepth.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Look up a profile by name
    pub fn get(&self, name: &str) -> Option<&CodecProfile> {
        self.profiles.get(name)
    }

    /// Look up a profile, turning absence into a configuration error
    pub fn resolve(&self, name: &str) -> Result<CodecProfile> {
        self.get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownCodec { name: name.to_string() }.into())
    }

    /// Names of every registered profile
    pub fn available(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_profiles_available() {
        let registry = CodecRegistry::new();
        for name in ["hevc", "h264", "mjpeg", "prores", "dnxhd"] {
            assert!(registry.get(name).is_some(), "missing builtin {name}");
        }
    }

    #[test]
    fn test_unknown_codec_is_config_error() {
        let registry = CodecRegistry::new();
        assert!(registry.resolve("av9").is_err());
    }

    #[test]
    fn test_mjpeg_is_still_image_kind() {
        let registry = CodecRegistry::new();
        let mjpeg = registry.get("mjpeg").unwrap();
        assert_eq!(mjpeg.kind, CodecKind::StillImage);
        assert_eq!(mjpeg.bitdepth, 8);
    }

    #[test]
    fn test_input_pixel_format_follows_bitdepth() {
        let registry = CodecRegistry::new();
        assert_eq!(registry.get("hevc").unwrap().input_pixel_format(), "rgb48le");
        assert_eq!(registry.get("h264").unwrap().input_pixel_format(), "rgb24");
    }

    #[test]
    fn test_override_merges_over_builtin() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "hevc".to_string(),
            CodecOverride {
                crf: Some(23),
                preset: Some("fast".to_string()),
                ..CodecOverride::default()
            },
        );

        let registry = CodecRegistry::with_overrides(&overrides).unwrap();
        let hevc = registry.get("hevc").unwrap();
        assert_eq!(hevc.crf, Some(23));
        assert_eq!(hevc.preset.as_deref(), Some("fast"));
        // Untouched fields survive
        assert_eq!(hevc.codec.as_deref(), Some("libx265"));
        assert_eq!(hevc.bitdepth, 10);
    }

    #[test]
    fn test_override_can_add_new_profile() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "vp9".to_string(),
            CodecOverride {
                codec: Some("libvpx-vp9".to_string()),
                movie_ext: Some("webm".to_string()),
                crf: Some(31),
                ..CodecOverride::default()
            },
        );

        let registry = CodecRegistry::with_overrides(&overrides).unwrap();
        let vp9 = registry.get("vp9").unwrap();
        assert_eq!(vp9.kind, CodecKind::RawVideo);
        assert_eq!(vp9.movie_ext, "webm");
    }

    #[test]
    fn test_still_image_override_must_stay_eight_bit() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "mjpeg".to_string(),
            CodecOverride {
                bitdepth: Some(10),
                ..CodecOverride::default()
            },
        );
        assert!(CodecRegistry::with_overrides(&overrides).is_err());
    }
}
