use image::{imageops, imageops::FilterType, DynamicImage, ImageBuffer};
use tracing::{debug, info, warn};

use crate::{
    config::{CropAmount, GlobalsConfig},
    error::{FrameError, Result},
    pipeline::buffer::{PixelBuffer, Rgb16Buffer},
};

/// Map a configured filter name onto the image crate's resampling kernels
pub fn parse_filter(name: &str) -> Option<FilterType> {
    match name.to_ascii_lowercase().as_str() {
        "nearest" | "box" => Some(FilterType::Nearest),
        "triangle" | "bilinear" => Some(FilterType::Triangle),
        "catmullrom" | "cubic" => Some(FilterType::CatmullRom),
        "gaussian" => Some(FilterType::Gaussian),
        "lanczos3" | "lanczos" => Some(FilterType::Lanczos3),
        _ => None,
    }
}

/// Geometry settings for a run, lifted out of the validated global config
#[derive(Debug, Clone, Copy)]
pub struct GeometryConfig {
    /// Target width; unset disables resizing entirely
    pub target_width: Option<u32>,

    /// Target height; unset derives it from the source aspect ratio
    pub target_height: Option<u32>,

    /// Symmetric crop applied before anything else
    pub crop_width: Option<CropAmount>,
    pub crop_height: Option<CropAmount>,

    /// Pad or crop the resized image to exactly the target rectangle
    pub fit: bool,

    pub filter: FilterType,
}

impl GeometryConfig {
    pub fn from_globals(globals: &GlobalsConfig) -> Result<Self> {
        let crop_width = match &globals.cropwidth {
            Some(value) => Some(value.parsed().map_err(|_| FrameError::GeometryFailed {
                reason: format!("bad crop width: {value:?}"),
            })?),
            None => None,
        };
        let crop_height = match &globals.cropheight {
            Some(value) => Some(value.parsed().map_err(|_| FrameError::GeometryFailed {
                reason: format!("bad crop height: {value:?}"),
            })?),
            None => None,
        };

        // The filter name was validated at config load
        let filter = parse_filter(&globals.filter).unwrap_or(FilterType::Lanczos3);

        Ok(Self {
            target_width: globals.width,
            target_height: globals.height,
            crop_width,
            crop_height,
            fit: globals.fit,
            filter,
        })
    }
}

/// Crop/resize/fit transform with a session resolution fixed up front
///
/// The session resolution is resolved once from the first frame and never
/// changes afterwards; the encoder command line bakes it in.
#[derive(Debug, Clone, Copy)]
pub struct GeometryEngine {
    config: GeometryConfig,
    session_width: u32,
    session_height: u32,
    resize: bool,
}

impl GeometryEngine {
    /// Fix the session resolution from the first frame's dimensions
    pub fn resolve(config: GeometryConfig, source_width: u32, source_height: u32) -> Result<Self> {
        if source_height == 0 || source_width == 0 {
            return Err(FrameError::GeometryFailed {
                reason: format!("source is {source_width}x{source_height}"),
            }
            .into());
        }

        let (iw, ih) = cropped_dims(&config, source_width, source_height)?;

        let (session_width, session_height, resize) = match config.target_width {
            None => (iw, ih, false),
            Some(ow) => {
                let derived = derived_height(ow, iw, ih);
                let oh = match config.target_height {
                    Some(oh) if config.fit || oh == derived => oh,
                    Some(oh) => {
                        // Without fitting, the output height always follows the
                        // source aspect; honoring the configured height here
                        // would desync the raw video stream
                        warn!(
                            "height {oh} ignored: fit is disabled, using aspect-derived {derived}"
                        );
                        derived
                    }
                    None => derived,
                };
                (ow, oh, true)
            }
        };

        info!(
            "Resolved session resolution: {}x{}",
            session_width, session_height
        );

        Ok(Self {
            config,
            session_width,
            session_height,
            resize,
        })
    }

    /// The resolution every processed frame will have
    pub fn resolution(&self) -> (u32, u32) {
        (self.session_width, self.session_height)
    }

    /// Transform one frame. The result is only guaranteed to match the
    /// session resolution when the frame shares the first frame's aspect;
    /// callers verify before streaming.
    pub fn apply(&self, buffer: PixelBuffer) -> Result<PixelBuffer> {
        if buffer.height() == 0 || buffer.width() == 0 {
            return Err(FrameError::GeometryFailed {
                reason: format!("source is {}x{}", buffer.width(), buffer.height()),
            }
            .into());
        }

        let image = self.crop(buffer.into_dynamic())?;
        let (iw, ih) = (image.width(), image.height());

        if !self.resize {
            return Ok(PixelBuffer::from_dynamic(image));
        }

        let (ow, oh) = (self.session_width, self.session_height);
        if (ow, oh) == (iw, ih) {
            // Already at the session resolution; resampling would only soften
            return Ok(PixelBuffer::from_dynamic(image));
        }

        let derived = derived_height(ow, iw, ih);
        debug!(
            "Resizing {iw}x{ih} -> {ow}x{derived} (session {ow}x{oh}, fit {})",
            self.config.fit
        );

        let image = if (iw, ih) == (ow, derived) {
            image
        } else {
            image.resize_exact(ow, derived, self.config.filter)
        };

        let image = if self.config.fit && oh != derived {
            fit_to_height(image, ow, derived, oh)
        } else {
            image
        };

        Ok(PixelBuffer::from_dynamic(image))
    }

    fn crop(&self, image: DynamicImage) -> Result<DynamicImage> {
        let (crop_w, crop_h) = resolved_crop(&self.config, image.width(), image.height())?;
        if crop_w == 0 && crop_h == 0 {
            return Ok(image);
        }

        debug!(
            "Cropping {}x{} by {}x{}",
            image.width(),
            image.height(),
            crop_w,
            crop_h
        );
        Ok(image.crop_imm(
            crop_w / 2,
            crop_h / 2,
            image.width() - crop_w,
            image.height() - crop_h,
        ))
    }
}

/// Output height that preserves the source aspect ratio at the given width
fn derived_height(target_width: u32, source_width: u32, source_height: u32) -> u32 {
    let aspect = source_width as f64 / source_height as f64;
    (target_width as f64 / aspect).round().max(1.0) as u32
}

/// Resolve the configured crop against actual source dimensions, rejecting
/// crops that would consume the whole image
fn resolved_crop(config: &GeometryConfig, width: u32, height: u32) -> Result<(u32, u32)> {
    let crop_w = config.crop_width.map(|c| c.resolve(width)).unwrap_or(0);
    let crop_h = config.crop_height.map(|c| c.resolve(height)).unwrap_or(0);

    if crop_w >= width || crop_h >= height {
        return Err(FrameError::GeometryFailed {
            reason: format!("crop {crop_w}x{crop_h} consumes the whole {width}x{height} source"),
        }
        .into());
    }
    Ok((crop_w, crop_h))
}

fn cropped_dims(config: &GeometryConfig, width: u32, height: u32) -> Result<(u32, u32)> {
    let (crop_w, crop_h) = resolved_crop(config, width, height)?;
    Ok((width - crop_w, height - crop_h))
}

/// Pad or crop a resized image so its height matches the target exactly,
/// keeping the visible content vertically centered.
///
/// Cropping shifts the content by half the difference before taking the
/// target rectangle; padding places the content half the difference from the
/// top of a black target canvas. Doing these in the other order would leave
/// the content off-center.
fn fit_to_height(image: DynamicImage, width: u32, derived: u32, target: u32) -> DynamicImage {
    if target < derived {
        let top = (derived - target) / 2;
        image.crop_imm(0, top, width, target)
    } else {
        let top = ((target - derived) / 2) as i64;
        match image {
            DynamicImage::ImageRgb8(src) => {
                let mut canvas = ImageBuffer::new(width, target);
                imageops::replace(&mut canvas, &src, 0, top);
                DynamicImage::ImageRgb8(canvas)
            }
            DynamicImage::ImageRgb16(src) => {
                let mut canvas = Rgb16Buffer::new(width, target);
                imageops::replace(&mut canvas, &src, 0, top);
                DynamicImage::ImageRgb16(canvas)
            }
            other => {
                let src = other.to_rgb8();
                let mut canvas = ImageBuffer::new(width, target);
                imageops::replace(&mut canvas, &src, 0, top);
                DynamicImage::ImageRgb8(canvas)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::buffer::BitDepth;
    use image::{Rgb, RgbImage};

    fn config(width: Option<u32>, height: Option<u32>, fit: bool) -> GeometryConfig {
        GeometryConfig {
            target_width: width,
            target_height: height,
            crop_width: None,
            crop_height: None,
            fit,
            filter: FilterType::Nearest,
        }
    }

    /// Source where every pixel encodes its own row, for tracking vertical
    /// placement through crops and padding
    fn row_coded_buffer(width: u32, height: u32) -> PixelBuffer {
        let img = RgbImage::from_fn(width, height, |_, y| Rgb([(y % 256) as u8, 0, 0]));
        PixelBuffer::from_dynamic(DynamicImage::ImageRgb8(img))
    }

    fn row_of(buffer: &PixelBuffer, y: u32) -> u8 {
        match buffer.dynamic() {
            DynamicImage::ImageRgb8(img) => img.get_pixel(0, y).0[0],
            _ => panic!("expected rgb8"),
        }
    }

    #[test]
    fn test_derived_height_rounds() {
        // 2048x858 scope plate at 1920 wide: 1920 * 858 / 2048 = 804.375
        assert_eq!(derived_height(1920, 2048, 858), 804);
        // square stays square
        assert_eq!(derived_height(512, 1024, 1024), 512);
        // 1920x1080 at 960 wide: exactly 540
        assert_eq!(derived_height(960, 1920, 1080), 540);
    }

    #[test]
    fn test_height_derived_when_unset() {
        let engine = GeometryEngine::resolve(config(Some(1920), None, false), 2048, 858).unwrap();
        assert_eq!(engine.resolution(), (1920, 804));

        let out = engine.apply(row_coded_buffer(2048, 858)).unwrap();
        assert_eq!((out.width(), out.height()), (1920, 804));
    }

    #[test]
    fn test_no_target_width_is_passthrough() {
        let engine = GeometryEngine::resolve(config(None, None, false), 640, 480).unwrap();
        assert_eq!(engine.resolution(), (640, 480));

        let out = engine.apply(row_coded_buffer(640, 480)).unwrap();
        assert_eq!((out.width(), out.height()), (640, 480));
    }

    #[test]
    fn test_identical_resolution_skips_resize() {
        let engine = GeometryEngine::resolve(config(Some(100), Some(80), true), 100, 80).unwrap();
        let src = row_coded_buffer(100, 80);
        let src_bytes = src.rgb_bytes();
        let out = engine.apply(src).unwrap();
        assert_eq!(out.rgb_bytes(), src_bytes);
    }

    #[test]
    fn test_fit_down_crops_centered() {
        // 100x100 source fit into 100x80: derived height is 100, so 20 rows
        // go, 10 off the top and 10 off the bottom
        let engine = GeometryEngine::resolve(config(Some(100), Some(80), true), 100, 100).unwrap();
        let out = engine.apply(row_coded_buffer(100, 100)).unwrap();

        assert_eq!((out.width(), out.height()), (100, 80));
        assert_eq!(row_of(&out, 0), 10);
        assert_eq!(row_of(&out, 79), 89);
    }

    #[test]
    fn test_fit_up_pads_centered() {
        // 100x50 source fit into 100x80: 30 rows of padding, 15 top and 15
        // bottom within a pixel
        let engine = GeometryEngine::resolve(config(Some(100), Some(80), true), 100, 50).unwrap();
        let mut src = row_coded_buffer(100, 50);
        // Make row 0 distinguishable from padding
        src.map_samples(|v| v.max(0.05));
        let out = engine.apply(src).unwrap();

        assert_eq!((out.width(), out.height()), (100, 80));
        assert_eq!(row_of(&out, 14), 0, "padding above content");
        assert_ne!(row_of(&out, 15), 0, "content starts at the offset row");
        assert_ne!(row_of(&out, 64), 0, "content ends before bottom padding");
        assert_eq!(row_of(&out, 65), 0, "padding below content");
    }

    #[test]
    fn test_crop_percentage_before_resize() {
        // 10% of 1000 crops 100px total; without a target width the cropped
        // size passes straight through
        let mut cfg = config(None, None, false);
        cfg.crop_width = Some(CropAmount::Percent(10.0));
        cfg.crop_height = Some(CropAmount::Pixels(50));

        let engine = GeometryEngine::resolve(cfg, 1000, 500).unwrap();
        assert_eq!(engine.resolution(), (900, 450));

        let out = engine.apply(row_coded_buffer(1000, 500)).unwrap();
        assert_eq!((out.width(), out.height()), (900, 450));
        // 50px crop removes 25 rows from the top
        assert_eq!(row_of(&out, 0), 25);
    }

    #[test]
    fn test_crop_changes_effective_aspect() {
        // Cropping 200px off the width of a 1000x500 source makes the
        // effective aspect 800:500; at 400 wide the derived height is 250
        let mut cfg = config(Some(400), None, false);
        cfg.crop_width = Some(CropAmount::Pixels(200));

        let engine = GeometryEngine::resolve(cfg, 1000, 500).unwrap();
        assert_eq!(engine.resolution(), (400, 250));
    }

    #[test]
    fn test_zero_height_fails_fast() {
        assert!(GeometryEngine::resolve(config(Some(100), None, false), 100, 0).is_err());

        let engine = GeometryEngine::resolve(config(Some(100), None, false), 100, 100).unwrap();
        let empty = PixelBuffer::from_dynamic(DynamicImage::ImageRgb8(RgbImage::new(100, 0)));
        assert!(engine.apply(empty).is_err());
    }

    #[test]
    fn test_whole_image_crop_rejected() {
        let mut cfg = config(Some(100), None, false);
        cfg.crop_width = Some(CropAmount::Percent(100.0));
        assert!(GeometryEngine::resolve(cfg, 640, 480).is_err());
    }

    #[test]
    fn test_explicit_height_without_fit_falls_back_to_derived() {
        let engine = GeometryEngine::resolve(config(Some(100), Some(80), false), 100, 100).unwrap();
        // fit disabled: aspect wins over the configured 80
        assert_eq!(engine.resolution(), (100, 100));
    }

    #[test]
    fn test_sixteen_bit_buffers_keep_depth() {
        let engine = GeometryEngine::resolve(config(Some(64), Some(48), true), 128, 96).unwrap();
        let out = engine
            .apply(PixelBuffer::blank(128, 96, BitDepth::Sixteen))
            .unwrap();
        assert_eq!(out.bit_depth(), BitDepth::Sixteen);
        assert_eq!((out.width(), out.height()), (64, 48));
    }
}
