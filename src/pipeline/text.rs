use std::path::Path;

use fontdue::layout::{
    CoordinateSystem, HorizontalAlign, Layout, LayoutSettings, TextStyle, VerticalAlign, WrapStyle,
};
use fontdue::{Font, FontSettings};
use image::{DynamicImage, ImageBuffer, Pixel, Rgba};

use crate::error::OverlayError;
use crate::pipeline::buffer::{PixelBuffer, Rgba16Buffer};

/// Hard-wrap threshold for slate text, in characters
pub const WRAP_WIDTH: usize = 40;

/// Read and parse a font file
pub fn load_font(path: &Path) -> Result<Font, OverlayError> {
    let bytes = std::fs::read(path).map_err(|e| OverlayError::FontParseFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Font::from_bytes(bytes, FontSettings::default()).map_err(|reason| {
        OverlayError::FontParseFailed {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    })
}

/// Greedy word wrap at a fixed character count; words longer than the
/// threshold are broken mid-word
pub fn wrap_text(text: &str, width: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut line = String::new();

    for word in text.split_whitespace() {
        let mut word = word;

        while word.chars().count() > width {
            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            let split = word
                .char_indices()
                .nth(width)
                .map(|(i, _)| i)
                .unwrap_or(word.len());
            lines.push(word[..split].to_string());
            word = &word[split..];
        }

        if line.is_empty() {
            line.push_str(word);
        } else if line.chars().count() + 1 + word.chars().count() <= width {
            line.push(' ');
            line.push_str(word);
        } else {
            lines.push(std::mem::take(&mut line));
            line.push_str(word);
        }
    }

    if !line.is_empty() {
        lines.push(line);
    }
    lines.join("\n")
}

/// Measured extent of laid-out text
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextExtent {
    pub width: f32,
    pub height: f32,
}

/// Measure text at the given pixel size without rendering it
pub fn measure_text(font: &Font, text: &str, px: f32) -> TextExtent {
    let mut layout = Layout::new(CoordinateSystem::PositiveYDown);
    layout.reset(&layout_settings(0.0, 0.0, None, HorizontalAlign::Left));
    layout.append(&[font], &TextStyle::new(text, px, 0));

    let width = layout
        .glyphs()
        .iter()
        .map(|g| g.x + g.width as f32)
        .fold(0.0f32, f32::max);
    TextExtent {
        width,
        height: layout.height(),
    }
}

/// Rasterize text into an RGBA pixel buffer at a top-left origin.
///
/// Glyphs falling outside the canvas are clipped. Buffers that are not RGBA
/// are left untouched; callers composite text before stripping alpha.
pub fn draw_text(
    buffer: &mut PixelBuffer,
    font: &Font,
    text: &str,
    px: f32,
    origin: (f32, f32),
    max_width: Option<f32>,
    align: HorizontalAlign,
    color: [f32; 4],
) {
    let mut layout = Layout::new(CoordinateSystem::PositiveYDown);
    layout.reset(&layout_settings(origin.0, origin.1, max_width, align));
    layout.append(&[font], &TextStyle::new(text, px, 0));

    for glyph in layout.glyphs() {
        if glyph.width == 0 || glyph.height == 0 {
            continue;
        }
        let (_, bitmap) = font.rasterize_config(glyph.key);
        let gx = glyph.x.round() as i64;
        let gy = glyph.y.round() as i64;

        match buffer.dynamic_mut() {
            DynamicImage::ImageRgba8(img) => {
                blend_glyph_u8(img, gx, gy, glyph.width, glyph.height, &bitmap, color);
            }
            DynamicImage::ImageRgba16(img) => {
                blend_glyph_u16(img, gx, gy, glyph.width, glyph.height, &bitmap, color);
            }
            _ => return,
        }
    }
}

fn layout_settings(
    x: f32,
    y: f32,
    max_width: Option<f32>,
    align: HorizontalAlign,
) -> LayoutSettings {
    LayoutSettings {
        x,
        y,
        max_width,
        max_height: None,
        horizontal_align: align,
        vertical_align: VerticalAlign::Top,
        line_height: 1.0,
        wrap_style: WrapStyle::Word,
        wrap_hard_breaks: true,
    }
}

fn blend_glyph_u8(
    img: &mut ImageBuffer<Rgba<u8>, Vec<u8>>,
    glyph_x: i64,
    glyph_y: i64,
    width: usize,
    height: usize,
    bitmap: &[u8],
    color: [f32; 4],
) {
    let (img_w, img_h) = (img.width() as i64, img.height() as i64);
    for row in 0..height {
        for col in 0..width {
            let coverage = bitmap[row * width + col] as f32 / 255.0;
            if coverage <= 0.0 {
                continue;
            }
            let x = glyph_x + col as i64;
            let y = glyph_y + row as i64;
            if x < 0 || y < 0 || x >= img_w || y >= img_h {
                continue;
            }

            let alpha = coverage * color[3];
            let src = Rgba([
                (color[0].clamp(0.0, 1.0) * 255.0).round() as u8,
                (color[1].clamp(0.0, 1.0) * 255.0).round() as u8,
                (color[2].clamp(0.0, 1.0) * 255.0).round() as u8,
                (alpha.clamp(0.0, 1.0) * 255.0).round() as u8,
            ]);
            img.get_pixel_mut(x as u32, y as u32).blend(&src);
        }
    }
}

fn blend_glyph_u16(
    img: &mut Rgba16Buffer,
    glyph_x: i64,
    glyph_y: i64,
    width: usize,
    height: usize,
    bitmap: &[u8],
    color: [f32; 4],
) {
    let (img_w, img_h) = (img.width() as i64, img.height() as i64);
    for row in 0..height {
        for col in 0..width {
            let coverage = bitmap[row * width + col] as f32 / 255.0;
            if coverage <= 0.0 {
                continue;
            }
            let x = glyph_x + col as i64;
            let y = glyph_y + row as i64;
            if x < 0 || y < 0 || x >= img_w || y >= img_h {
                continue;
            }

            let alpha = coverage * color[3];
            let src = Rgba([
                (color[0].clamp(0.0, 1.0) * 65535.0).round() as u16,
                (color[1].clamp(0.0, 1.0) * 65535.0).round() as u16,
                (color[2].clamp(0.0, 1.0) * 65535.0).round() as u16,
                (alpha.clamp(0.0, 1.0) * 65535.0).round() as u16,
            ]);
            img.get_pixel_mut(x as u32, y as u32).blend(&src);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_under_threshold_is_unchanged() {
        assert_eq!(wrap_text("short line", 40), "short line");
    }

    #[test]
    fn test_wrap_at_forty_characters() {
        let text = "the quick brown fox jumps over the lazy dog and keeps on running";
        let wrapped = wrap_text(text, WRAP_WIDTH);
        for line in wrapped.lines() {
            assert!(line.chars().count() <= WRAP_WIDTH, "line too long: {line}");
        }
        // No words lost
        let rejoined = wrapped.replace('\n', " ");
        assert_eq!(rejoined, text);
    }

    #[test]
    fn test_wrap_breaks_overlong_words() {
        let text = "a".repeat(95);
        let wrapped = wrap_text(&text, 40);
        let lines: Vec<&str> = wrapped.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].len(), 40);
        assert_eq!(lines[1].len(), 40);
        assert_eq!(lines[2].len(), 15);
    }

    #[test]
    fn test_wrap_empty_text() {
        assert_eq!(wrap_text("", 40), "");
        assert_eq!(wrap_text("   ", 40), "");
    }

    #[test]
    fn test_wrap_collapses_whitespace() {
        assert_eq!(wrap_text("a  b\tc", 40), "a b c");
    }

    #[test]
    fn test_glyph_blend_clips_at_canvas_edges() {
        let mut img: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::new(4, 4);
        // A 3x3 fully-covered glyph positioned to hang off the top-left
        let bitmap = vec![255u8; 9];
        blend_glyph_u8(&mut img, -1, -1, 3, 3, &bitmap, [1.0, 1.0, 1.0, 1.0]);

        assert_eq!(img.get_pixel(0, 0).0, [255, 255, 255, 255]);
        assert_eq!(img.get_pixel(2, 2).0, [0, 0, 0, 0]);
    }

    #[test]
    fn test_glyph_blend_respects_color_alpha() {
        let mut img: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::new(1, 1);
        let bitmap = vec![255u8];
        blend_glyph_u8(&mut img, 0, 0, 1, 1, &bitmap, [1.0, 0.0, 0.0, 0.0]);
        // Zero-alpha text leaves the canvas untouched
        assert_eq!(img.get_pixel(0, 0).0[3], 0);
    }
}
