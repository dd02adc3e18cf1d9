use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    encode::codec::CodecOverride,
    error::{ConfigError, Result},
    pipeline::geometry,
};

/// Codec used when the configuration names none
pub const DEFAULT_CODEC: &str = "hevc";

/// Color transform applied when the configuration names none
pub const DEFAULT_COLOR_TRANSFORM: [&str; 2] = ["linear", "sRGB"];

/// Main configuration for a dailies run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Global output settings
    pub globals: GlobalsConfig,

    /// Slate overlay definitions
    #[serde(default)]
    pub slate: SlateProfile,

    /// Per-name codec profile overrides, merged over the built-in registry
    #[serde(default)]
    pub codecs: BTreeMap<String, CodecOverride>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            globals: GlobalsConfig::default(),
            slate: SlateProfile::default(),
            codecs: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration before any frame is touched
    pub fn validate(&self) -> Result<()> {
        self.globals.validate()?;
        self.slate.validate()?;
        Ok(())
    }
}

/// Global output settings: target geometry, frame rate, movie naming and
/// color management
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalsConfig {
    /// Target width in pixels; unset means "use the source width"
    pub width: Option<u32>,

    /// Target height in pixels; unset means "derive from aspect ratio"
    pub height: Option<u32>,

    /// Output frame rate
    #[serde(default = "default_framerate")]
    pub framerate: f64,

    /// Named codec profile; falls back to [`DEFAULT_CODEC`]
    pub output_codec: Option<String>,

    /// Movie container extension; unset means "use the codec profile's"
    pub movie_ext: Option<String>,

    /// Output folder: absolute, `~`-relative, or sequence-relative (`.`/`..`)
    #[serde(default = "default_movie_location")]
    pub movie_location: String,

    /// Slate type suffix baked into the movie filename
    #[serde(default = "default_slate_type")]
    pub slate_type: String,

    /// Resampling filter name (nearest, triangle, catmullrom, gaussian, lanczos3)
    #[serde(default = "default_filter")]
    pub filter: String,

    /// Pad or crop the resized image to exactly width x height
    #[serde(default)]
    pub fit: bool,

    /// Symmetric pre-resize crop, absolute pixels or `"N%"` of the source width
    pub cropwidth: Option<CropValue>,

    /// Symmetric pre-resize crop, absolute pixels or `"N%"` of the source height
    pub cropheight: Option<CropValue>,

    /// Enable debug-level logging in the run log
    #[serde(default)]
    pub debug: bool,

    /// Color configuration file; `$OCIO` is consulted when unset
    pub color_config: Option<PathBuf>,

    /// Source and destination colorspace names
    pub color_transform: Option<[String; 2]>,

    /// Fallback font used when a text element's font is missing on disk
    pub default_font: Option<PathBuf>,
}

fn default_framerate() -> f64 {
    24.0
}

fn default_movie_location() -> String {
    ".".to_string()
}

fn default_slate_type() -> String {
    "INTERNAL".to_string()
}

fn default_filter() -> String {
    "lanczos3".to_string()
}

impl Default for GlobalsConfig {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            framerate: default_framerate(),
            output_codec: None,
            movie_ext: None,
            movie_location: default_movie_location(),
            slate_type: default_slate_type(),
            filter: default_filter(),
            fit: false,
            cropwidth: None,
            cropheight: None,
            debug: false,
            color_config: None,
            color_transform: None,
            default_font: None,
        }
    }
}

impl GlobalsConfig {
    fn validate(&self) -> Result<()> {
        if self.framerate <= 0.0 || !self.framerate.is_finite() {
            return Err(ConfigError::InvalidValue {
                key: "globals.framerate".to_string(),
                value: self.framerate.to_string(),
            }
            .into());
        }

        if self.width == Some(0) || self.height == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "globals.width/height".to_string(),
                value: "0".to_string(),
            }
            .into());
        }

        if geometry::parse_filter(&self.filter).is_none() {
            return Err(ConfigError::InvalidValue {
                key: "globals.filter".to_string(),
                value: self.filter.clone(),
            }
            .into());
        }

        for (key, crop) in [("globals.cropwidth", &self.cropwidth), ("globals.cropheight", &self.cropheight)] {
            if let Some(crop) = crop {
                crop.parsed().map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: crop.display_value(),
                })?;
            }
        }

        Ok(())
    }

    /// Source and destination colorspaces, falling back to the defaults
    pub fn color_transform_pair(&self) -> (String, String) {
        match &self.color_transform {
            Some([src, dst]) => (src.clone(), dst.clone()),
            None => (
                DEFAULT_COLOR_TRANSFORM[0].to_string(),
                DEFAULT_COLOR_TRANSFORM[1].to_string(),
            ),
        }
    }

    /// Named codec profile to use, falling back to the default
    pub fn codec_name(&self) -> &str {
        self.output_codec.as_deref().unwrap_or(DEFAULT_CODEC)
    }
}

/// A crop amount as written in the configuration: either absolute pixels or a
/// percentage string like `"10%"`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CropValue {
    Pixels(u32),
    Text(String),
}

/// A validated crop amount
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CropAmount {
    Pixels(u32),
    Percent(f32),
}

impl CropValue {
    /// Parse into a typed amount; percentages must sit in (0, 100]
    pub fn parsed(&self) -> std::result::Result<CropAmount, ()> {
        match self {
            CropValue::Pixels(px) => Ok(CropAmount::Pixels(*px)),
            CropValue::Text(text) => {
                let trimmed = text.trim();
                let Some(number) = trimmed.strip_suffix('%') else {
                    return Err(());
                };
                let pct: f32 = number.trim().parse().map_err(|_| ())?;
                if pct <= 0.0 || pct > 100.0 {
                    return Err(());
                }
                Ok(CropAmount::Percent(pct))
            }
        }
    }

    fn display_value(&self) -> String {
        match self {
            CropValue::Pixels(px) => px.to_string(),
            CropValue::Text(text) => text.clone(),
        }
    }
}

impl CropAmount {
    /// Resolve to pixels against the source dimension on this axis
    pub fn resolve(&self, source_dim: u32) -> u32 {
        match self {
            CropAmount::Pixels(px) => *px,
            CropAmount::Percent(pct) => (pct / 100.0 * source_dim as f32) as u32,
        }
    }
}

/// Slate overlay profile: one layer definition for the synthetic blank frame
/// and one for every real frame
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlateProfile {
    #[serde(default)]
    pub zero_frame: SlateLayerConfig,

    #[serde(default)]
    pub first_frame: SlateLayerConfig,
}

impl SlateProfile {
    fn validate(&self) -> Result<()> {
        self.zero_frame.validate("slate.zero_frame")?;
        self.first_frame.validate("slate.first_frame")?;
        Ok(())
    }
}

/// One slate layer: images composited first, then static text, plus text
/// elements re-rendered on every frame
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlateLayerConfig {
    #[serde(default)]
    pub images: Vec<ImageElement>,

    #[serde(default)]
    pub static_text: Vec<TextElement>,

    #[serde(default)]
    pub dynamic_text: Vec<TextElement>,
}

impl SlateLayerConfig {
    fn validate(&self, section: &str) -> Result<()> {
        for image in &self.images {
            image.validate(section)?;
        }
        for text in &self.static_text {
            text.validate(section)?;
            if matches!(text.source, TextSource::FrameCounter) {
                // A frame counter baked into a reusable layer could never update
                return Err(ConfigError::InvalidValue {
                    key: format!("{section}.static_text.{}", text.name),
                    value: "framecounter".to_string(),
                }
                .into());
            }
        }
        for text in &self.dynamic_text {
            text.validate(section)?;
        }
        Ok(())
    }
}

/// An image overlay element
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageElement {
    /// Source image path
    pub src: PathBuf,

    /// Uniform scale factor applied to the source image
    #[serde(default = "default_scale")]
    pub scale: f32,

    /// Normalized placement within the remaining canvas space
    #[serde(default = "default_offset")]
    pub offset: [f32; 2],

    /// Overall opacity multiplier
    #[serde(default = "default_opacity")]
    pub opacity: f32,
}

fn default_scale() -> f32 {
    1.0
}

fn default_offset() -> [f32; 2] {
    [0.5, 0.5]
}

fn default_opacity() -> f32 {
    1.0
}

impl ImageElement {
    fn validate(&self, section: &str) -> Result<()> {
        if self.scale <= 0.0 || !(0.0..=1.0).contains(&self.opacity) {
            return Err(ConfigError::InvalidValue {
                key: format!("{section}.images.{}", self.src.display()),
                value: format!("scale={} opacity={}", self.scale, self.opacity),
            }
            .into());
        }
        Ok(())
    }
}

/// A text overlay element
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextElement {
    /// Element name; doubles as the data-token key for token-sourced content
    pub name: String,

    /// Font file; the global fallback is used when this is missing on disk
    pub font: Option<PathBuf>,

    /// Font size as a fraction of the canvas width
    pub size: f32,

    /// RGBA color, each channel in [0, 1]
    #[serde(default = "default_color")]
    pub color: [f32; 4],

    /// Bounding box in normalized [0,1] coordinates, bottom-left origin:
    /// [x0, y0, x1, y1]
    #[serde(rename = "box")]
    pub bounds: [f32; 4],

    #[serde(default)]
    pub justify: Justify,

    /// Where the text content comes from
    pub source: TextSource,
}

fn default_color() -> [f32; 4] {
    [1.0, 1.0, 1.0, 1.0]
}

impl TextElement {
    fn validate(&self, section: &str) -> Result<()> {
        let key = || format!("{section}.{}", self.name);

        if self.size <= 0.0 || self.size > 1.0 {
            return Err(ConfigError::InvalidValue {
                key: key(),
                value: format!("size={}", self.size),
            }
            .into());
        }
        if self.color.iter().any(|c| !(0.0..=1.0).contains(c)) {
            return Err(ConfigError::InvalidValue {
                key: key(),
                value: format!("color={:?}", self.color),
            }
            .into());
        }
        if self.bounds.iter().any(|b| !(0.0..=1.0).contains(b)) {
            return Err(ConfigError::InvalidValue {
                key: key(),
                value: format!("box={:?}", self.bounds),
            }
            .into());
        }
        Ok(())
    }
}

/// Text justification within the element box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Justify {
    #[default]
    Left,
    Center,
}

/// Content source for a text element
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TextSource {
    /// Verbatim text from the configuration
    Literal { value: String },

    /// Looked up by element name in the run's token data
    Token,

    /// The zero-padded display frame number; blank on frame zero
    FrameCounter,
}

/// Flat token -> value mapping substituted into token-sourced text elements.
/// Stands in for the remote metadata service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenData(BTreeMap<String, String>);

impl TokenData {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;
        let data = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        Ok(Self(data))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    #[cfg(test)]
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [globals]
            width = 1920
            height = 1080
            framerate = 24.0
            output_codec = "mjpeg"
            movie_location = "~/review"
            fit = true
            cropwidth = "10%"
            cropheight = 40

            [[slate.first_frame.static_text]]
            name = "artist"
            size = 0.012
            box = [0.05, 0.95, 0.3, 0.99]
            source = { kind = "token" }

            [[slate.first_frame.dynamic_text]]
            name = "framecounter"
            size = 0.015
            box = [0.9, 0.05, 0.99, 0.1]
            justify = "center"
            source = { kind = "framecounter" }
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.globals.codec_name(), "mjpeg");
        assert!(config.globals.fit);
        assert_eq!(
            config.globals.cropwidth.as_ref().unwrap().parsed().unwrap(),
            CropAmount::Percent(10.0)
        );
        assert_eq!(
            config.globals.cropheight.as_ref().unwrap().parsed().unwrap(),
            CropAmount::Pixels(40)
        );
        assert_eq!(config.slate.first_frame.static_text.len(), 1);
        assert_eq!(config.slate.first_frame.dynamic_text.len(), 1);
        assert_eq!(
            config.slate.first_frame.dynamic_text[0].justify,
            Justify::Center
        );
    }

    #[test]
    fn test_crop_percentage_matches_absolute() {
        // "10%" of a 1000px-wide source is the same crop as 100 absolute pixels
        let percent = CropValue::Text("10%".to_string()).parsed().unwrap();
        let absolute = CropValue::Pixels(100).parsed().unwrap();
        assert_eq!(percent.resolve(1000), absolute.resolve(1000));
    }

    #[test]
    fn test_invalid_crop_value_rejected() {
        let mut config = Config::default();
        config.globals.cropwidth = Some(CropValue::Text("wide".to_string()));
        assert!(config.validate().is_err());

        config.globals.cropwidth = Some(CropValue::Text("120%".to_string()));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let mut config = Config::default();
        config.globals.filter = "sinc11".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_framecounter_rejected_in_static_layer() {
        let mut config = Config::default();
        config.slate.first_frame.static_text.push(TextElement {
            name: "framecounter".to_string(),
            font: None,
            size: 0.01,
            color: default_color(),
            bounds: [0.0, 0.0, 0.1, 0.1],
            justify: Justify::Left,
            source: TextSource::FrameCounter,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_color_transform() {
        let globals = GlobalsConfig::default();
        let (src, dst) = globals.color_transform_pair();
        assert_eq!(src, "linear");
        assert_eq!(dst, "sRGB");
    }

    #[test]
    fn test_token_data_lookup() {
        let data = TokenData::from_pairs(&[("artist", "R. Martinez"), ("shot", "sq010_sh020")]);
        assert_eq!(data.get("artist"), Some("R. Martinez"));
        assert_eq!(data.get("missing"), None);
    }
}
