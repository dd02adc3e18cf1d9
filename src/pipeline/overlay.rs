use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use fontdue::layout::HorizontalAlign;
use fontdue::Font;
use image::{imageops, DynamicImage};
use tracing::{debug, error, warn};

use crate::{
    config::{
        GlobalsConfig, ImageElement, Justify, SlateLayerConfig, SlateProfile, TextElement,
        TextSource, TokenData,
    },
    error::OverlayError,
    pipeline::{
        buffer::{BitDepth, PixelBuffer},
        text::{self, WRAP_WIDTH},
    },
};

/// Zero-pad width of the burned-in frame counter
const COUNTER_PADDING: usize = 4;

/// Burns slate text and images into frames.
///
/// Two reusable layers are built once per run: one for the synthetic blank
/// frame and one for every real frame. Each layer is a transparent canvas
/// composited with its static images, then its static text. Layers are
/// read-only after construction; per-frame work only touches the frame's own
/// buffer. Overlay problems degrade to warnings and never fail the run.
pub struct OverlayCompositor {
    width: u32,
    height: u32,
    tokens: TokenData,
    zero_layer: Option<PixelBuffer>,
    first_layer: Option<PixelBuffer>,
    zero_dynamic: Vec<PreparedText>,
    first_dynamic: Vec<PreparedText>,
}

/// A dynamic text element with its font resolved up front
struct PreparedText {
    element: TextElement,
    font: Option<Arc<Font>>,
}

impl OverlayCompositor {
    pub fn build(
        slate: &SlateProfile,
        globals: &GlobalsConfig,
        tokens: &TokenData,
        width: u32,
        height: u32,
        depth: BitDepth,
    ) -> Self {
        let mut fonts = FontCache::new(globals.default_font.clone());

        let zero_layer = build_layer(&slate.zero_frame, &mut fonts, tokens, width, height, depth);
        let first_layer = build_layer(&slate.first_frame, &mut fonts, tokens, width, height, depth);

        let zero_dynamic = prepare_dynamic(&slate.zero_frame, &mut fonts);
        let first_dynamic = prepare_dynamic(&slate.first_frame, &mut fonts);

        Self {
            width,
            height,
            tokens: tokens.clone(),
            zero_layer,
            first_layer,
            zero_dynamic,
            first_dynamic,
        }
    }

    /// Composite the zero-frame slate onto the synthetic blank frame
    pub fn composite_blank_frame(&self, frame: PixelBuffer) -> PixelBuffer {
        self.composite(frame, self.zero_layer.as_ref(), &self.zero_dynamic, 0)
    }

    /// Composite the first-frame slate and dynamic elements onto a real frame
    pub fn composite_real_frame(&self, frame: PixelBuffer, display_number: u64) -> PixelBuffer {
        self.composite(
            frame,
            self.first_layer.as_ref(),
            &self.first_dynamic,
            display_number,
        )
    }

    fn composite(
        &self,
        frame: PixelBuffer,
        layer: Option<&PixelBuffer>,
        dynamic: &[PreparedText],
        display_number: u64,
    ) -> PixelBuffer {
        let mut frame = frame.add_opaque_alpha();

        for prepared in dynamic {
            render_element(
                &mut frame,
                &prepared.element,
                prepared.font.as_deref(),
                &self.tokens,
                Some(display_number),
                self.width,
                self.height,
            );
        }

        if let Some(layer) = layer {
            // Slate pixels win wherever the layer carries alpha
            match (frame.dynamic_mut(), layer.dynamic()) {
                (DynamicImage::ImageRgba8(bottom), DynamicImage::ImageRgba8(top)) => {
                    imageops::overlay(bottom, top, 0, 0);
                }
                (DynamicImage::ImageRgba16(bottom), DynamicImage::ImageRgba16(top)) => {
                    imageops::overlay(bottom, top, 0, 0);
                }
                _ => error!("Overlay layer depth does not match the frame, skipping slate"),
            }
        }

        frame.strip_alpha()
    }
}

fn build_layer(
    config: &SlateLayerConfig,
    fonts: &mut FontCache,
    tokens: &TokenData,
    width: u32,
    height: u32,
    depth: BitDepth,
) -> Option<PixelBuffer> {
    if config.images.is_empty() && config.static_text.is_empty() {
        return None;
    }

    let mut layer = PixelBuffer::transparent(width, height, depth);

    for image in &config.images {
        if let Err(e) = place_image(&mut layer, image) {
            error!("Error placing image: {e}");
        }
    }

    for element in &config.static_text {
        let font = fonts.resolve(element);
        render_element(&mut layer, element, font.as_deref(), tokens, None, width, height);
    }

    Some(layer)
}

fn prepare_dynamic(config: &SlateLayerConfig, fonts: &mut FontCache) -> Vec<PreparedText> {
    config
        .dynamic_text
        .iter()
        .map(|element| PreparedText {
            element: element.clone(),
            font: fonts.resolve(element),
        })
        .collect()
}

/// Resolve what a text element should actually say.
///
/// `display_number` is absent while building static layers; the frame
/// counter only ever renders per frame and stays blank on display frame 0.
fn resolve_content(
    element: &TextElement,
    tokens: &TokenData,
    display_number: Option<u64>,
) -> Result<String, OverlayError> {
    match &element.source {
        TextSource::Literal { value } => Ok(value.clone()),
        TextSource::Token => tokens
            .get(&element.name)
            .map(str::to_string)
            .ok_or_else(|| OverlayError::UnknownToken {
                element: element.name.clone(),
            }),
        TextSource::FrameCounter => Ok(match display_number {
            Some(0) | None => String::new(),
            Some(n) => format!("{n:0width$}", width = COUNTER_PADDING),
        }),
    }
}

fn render_element(
    target: &mut PixelBuffer,
    element: &TextElement,
    font: Option<&Font>,
    tokens: &TokenData,
    display_number: Option<u64>,
    width: u32,
    height: u32,
) {
    let Some(font) = font else {
        let e = OverlayError::FontUnavailable {
            element: element.name.clone(),
        };
        error!("{e}");
        return;
    };

    let content = match resolve_content(element, tokens, display_number) {
        Ok(content) => content,
        Err(e) => {
            error!("{e}");
            return;
        }
    };

    let wrapped = text::wrap_text(&content, WRAP_WIDTH);
    if wrapped.is_empty() {
        warn!("No text specified for text element {}", element.name);
        return;
    }

    let canvas_w = width as f32;
    let canvas_h = height as f32;

    // Element boxes are authored bottom-left-origin; rendering is top-left
    let px = (element.size * canvas_w).floor().max(1.0);
    let x = (element.bounds[0] * canvas_w).floor();
    let y = canvas_h - (element.bounds[1] * canvas_h).floor();

    // The configured right edge is advisory; the measured extent wins so
    // wrapped lines never clip against a stale box
    let extent = text::measure_text(font, &wrapped, px);
    debug!(
        "Text element '{}' at ({x}, {y}) size {px}px, measured {}x{}",
        element.name, extent.width, extent.height
    );

    match element.justify {
        Justify::Left => text::draw_text(
            target,
            font,
            &wrapped,
            px,
            (x, y),
            None,
            HorizontalAlign::Left,
            element.color,
        ),
        Justify::Center => text::draw_text(
            target,
            font,
            &wrapped,
            px,
            (x - extent.width / 2.0, y),
            Some(extent.width),
            HorizontalAlign::Center,
            element.color,
        ),
    }
}

fn place_image(layer: &mut PixelBuffer, element: &ImageElement) -> Result<(), OverlayError> {
    let decoded = image::open(&element.src).map_err(|_| OverlayError::ImageLoadFailed {
        path: element.src.display().to_string(),
    })?;

    let rgba = decoded.to_rgba8();
    let (w, h) = rgba.dimensions();
    let new_w = ((w as f32 * element.scale) as u32).max(1);
    let new_h = ((h as f32 * element.scale) as u32).max(1);

    let mut scaled = imageops::resize(&rgba, new_w, new_h, imageops::FilterType::CatmullRom);
    if element.opacity < 1.0 {
        for pixel in scaled.pixels_mut() {
            pixel.0[3] = (pixel.0[3] as f32 * element.opacity).round() as u8;
        }
    }

    // Normalized offset positions the image within the remaining canvas space
    let x = (layer.width().saturating_sub(new_w) as f32 * element.offset[0]) as i64;
    let y = (layer.height().saturating_sub(new_h) as f32 * element.offset[1]) as i64;

    match layer.dynamic_mut() {
        DynamicImage::ImageRgba8(img) => imageops::overlay(img, &scaled, x, y),
        DynamicImage::ImageRgba16(img) => {
            let scaled = DynamicImage::ImageRgba8(scaled).to_rgba16();
            imageops::overlay(img, &scaled, x, y);
        }
        _ => {}
    }
    Ok(())
}

/// Loads fonts once per distinct path, substituting the fallback font for
/// paths missing on disk
struct FontCache {
    fallback: Option<PathBuf>,
    loaded: HashMap<PathBuf, Option<Arc<Font>>>,
}

impl FontCache {
    fn new(fallback: Option<PathBuf>) -> Self {
        Self {
            fallback,
            loaded: HashMap::new(),
        }
    }

    fn resolve(&mut self, element: &TextElement) -> Option<Arc<Font>> {
        let path = match &element.font {
            Some(path) if path.is_file() => path.clone(),
            Some(path) => {
                error!(
                    "Specified font does not exist: {:?}. Using default font.",
                    path
                );
                self.fallback.clone()?
            }
            None => self.fallback.clone()?,
        };

        self.loaded
            .entry(path.clone())
            .or_insert_with(|| match text::load_font(&path) {
                Ok(font) => Some(Arc::new(font)),
                Err(e) => {
                    error!("{e}");
                    None
                }
            })
            .clone()
    }
}
