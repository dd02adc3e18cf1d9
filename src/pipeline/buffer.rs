use std::path::Path;

use image::{DynamicImage, ImageBuffer, Rgb, Rgba};

use crate::error::{FrameError, Result};

/// 16-bit RGB buffer
pub type Rgb16Buffer = ImageBuffer<Rgb<u16>, Vec<u16>>;

/// 16-bit RGBA buffer
pub type Rgba16Buffer = ImageBuffer<Rgba<u16>, Vec<u16>>;

/// Working sample depth of the pipeline, fixed once per run from the codec
/// profile's bit depth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitDepth {
    Eight,
    Sixteen,
}

impl BitDepth {
    /// Codec bit depths of 10 and above need 16-bit samples on the wire
    pub fn from_codec_bitdepth(bits: u8) -> Self {
        if bits >= 10 {
            BitDepth::Sixteen
        } else {
            BitDepth::Eight
        }
    }

    pub fn bits(&self) -> u8 {
        match self {
            BitDepth::Eight => 8,
            BitDepth::Sixteen => 16,
        }
    }
}

/// An owned frame buffer moving through the pipeline
///
/// Wraps an [`image::DynamicImage`] pinned to one of four variants: RGB or
/// RGBA at the run's working depth. Ownership transfers stage to stage.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    image: DynamicImage,
}

impl PixelBuffer {
    /// Decode a frame file, stripping any alpha channel and converting to
    /// the run's working depth
    pub fn from_file(path: &Path, depth: BitDepth) -> Result<Self> {
        let decoded = image::open(path).map_err(|_| FrameError::LoadFailed {
            path: path.display().to_string(),
        })?;
        Ok(Self::from_dynamic_at_depth(decoded, depth))
    }

    /// Convert an already-decoded image to an RGB buffer at the given depth
    pub fn from_dynamic_at_depth(image: DynamicImage, depth: BitDepth) -> Self {
        let image = match depth {
            BitDepth::Eight => DynamicImage::ImageRgb8(image.to_rgb8()),
            BitDepth::Sixteen => DynamicImage::ImageRgb16(image.to_rgb16()),
        };
        Self { image }
    }

    /// A zero-valued (black) RGB buffer
    pub fn blank(width: u32, height: u32, depth: BitDepth) -> Self {
        let image = match depth {
            BitDepth::Eight => DynamicImage::ImageRgb8(ImageBuffer::new(width, height)),
            BitDepth::Sixteen => DynamicImage::ImageRgb16(Rgb16Buffer::new(width, height)),
        };
        Self { image }
    }

    /// A fully transparent RGBA canvas, used for overlay layers
    pub fn transparent(width: u32, height: u32, depth: BitDepth) -> Self {
        let image = match depth {
            BitDepth::Eight => DynamicImage::ImageRgba8(ImageBuffer::new(width, height)),
            BitDepth::Sixteen => DynamicImage::ImageRgba16(Rgba16Buffer::new(width, height)),
        };
        Self { image }
    }

    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn channels(&self) -> u8 {
        self.image.color().channel_count()
    }

    pub fn bit_depth(&self) -> BitDepth {
        match &self.image {
            DynamicImage::ImageRgb16(_) | DynamicImage::ImageRgba16(_) => BitDepth::Sixteen,
            _ => BitDepth::Eight,
        }
    }

    pub fn dynamic(&self) -> &DynamicImage {
        &self.image
    }

    pub fn dynamic_mut(&mut self) -> &mut DynamicImage {
        &mut self.image
    }

    pub fn into_dynamic(self) -> DynamicImage {
        self.image
    }

    /// Add a fully opaque alpha channel, keeping the working depth
    pub fn add_opaque_alpha(self) -> Self {
        let image = match self.image {
            DynamicImage::ImageRgb8(img) => {
                DynamicImage::ImageRgba8(DynamicImage::ImageRgb8(img).to_rgba8())
            }
            DynamicImage::ImageRgb16(img) => {
                DynamicImage::ImageRgba16(DynamicImage::ImageRgb16(img).to_rgba16())
            }
            already_rgba => already_rgba,
        };
        Self { image }
    }

    /// Drop the alpha channel, keeping the working depth
    pub fn strip_alpha(self) -> Self {
        let image = match self.image {
            DynamicImage::ImageRgba8(img) => {
                DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(img).to_rgb8())
            }
            DynamicImage::ImageRgba16(img) => {
                DynamicImage::ImageRgb16(DynamicImage::ImageRgba16(img).to_rgb16())
            }
            rgb @ (DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgb16(_)) => rgb,
            other => DynamicImage::ImageRgb8(other.to_rgb8()),
        };
        Self { image }
    }

    /// Apply a per-sample transfer function to the color channels, leaving
    /// any alpha channel untouched. Samples are presented normalized to
    /// [0, 1] and written back rounded at the working depth.
    pub fn map_samples<F: Fn(f32) -> f32>(&mut self, f: F) {
        match &mut self.image {
            DynamicImage::ImageRgb8(img) => {
                for pixel in img.pixels_mut() {
                    for c in pixel.0.iter_mut() {
                        *c = denorm_u8(f(*c as f32 / 255.0));
                    }
                }
            }
            DynamicImage::ImageRgb16(img) => {
                for pixel in img.pixels_mut() {
                    for c in pixel.0.iter_mut() {
                        *c = denorm_u16(f(*c as f32 / 65535.0));
                    }
                }
            }
            DynamicImage::ImageRgba8(img) => {
                for pixel in img.pixels_mut() {
                    for c in pixel.0[..3].iter_mut() {
                        *c = denorm_u8(f(*c as f32 / 255.0));
                    }
                }
            }
            DynamicImage::ImageRgba16(img) => {
                for pixel in img.pixels_mut() {
                    for c in pixel.0[..3].iter_mut() {
                        *c = denorm_u16(f(*c as f32 / 65535.0));
                    }
                }
            }
            _ => {}
        }
    }

    /// Raw interleaved RGB samples in the byte layout the encoder expects:
    /// 8-bit triples, or 16-bit little-endian triples at the deeper setting
    pub fn rgb_bytes(&self) -> Vec<u8> {
        match &self.image {
            DynamicImage::ImageRgb8(img) => img.as_raw().clone(),
            DynamicImage::ImageRgb16(img) => {
                let mut bytes = Vec::with_capacity(img.as_raw().len() * 2);
                for sample in img.as_raw() {
                    bytes.extend_from_slice(&sample.to_le_bytes());
                }
                bytes
            }
            // RGBA never reaches the encoder; drop the alpha if it shows up
            other => {
                let rgb = Self {
                    image: other.clone(),
                };
                rgb.strip_alpha().rgb_bytes()
            }
        }
    }
}

fn denorm_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn denorm_u16(v: f32) -> u16 {
    (v.clamp(0.0, 1.0) * 65535.0).round() as u16
}
