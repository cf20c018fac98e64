//! Watermark compositing
//!
//! Rasterizes a text overlay onto a copy of an uploaded photo:
//! - anchor coordinates arrive in preview pixels and are scaled by
//!   `natural_width / preview_width` into image pixels
//! - bold sans-serif text with global alpha and a soft black drop shadow
//! - output is always re-encoded as JPEG (quality 90) under the same file name
//!
//! With the watermark disabled the source bytes are passed through untouched.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GrayImage, Rgba, RgbaImage};
use log::{info, warn};
use rusttype::{point, Font, PositionedGlyph, Rect, Scale};
use serde::{Deserialize, Serialize};

use crate::errors::{GalleryError, GalleryResult};
use crate::pending_store::PendingFile;

pub const JPEG_QUALITY: u8 = 90;
pub const MIN_FONT_SIZE_PX: f32 = 10.0;
pub const MAX_FONT_SIZE_PX: f32 = 100.0;
pub const MIN_OPACITY: f32 = 0.1;
pub const MAX_OPACITY: f32 = 1.0;

const SHADOW_ALPHA: f32 = 0.5;
const SHADOW_BLUR_PX: f32 = 10.0;
const MAX_DRAW_COORD: f32 = 16_777_216.0;

/// Overlay position in preview pixels (top-left corner of the text block).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub x: f32,
    pub y: f32,
}

/// Stylistic part of a watermark, shared by a whole batch and by presets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatermarkStyle {
    pub text: String,
    pub color_hex: String,
    pub font_size_px: f32,
    pub opacity: f32,
}

impl Default for WatermarkStyle {
    fn default() -> Self {
        Self {
            text: crate::models::DEFAULT_SUBTITLE.to_string(),
            color_hex: "#ffffff".to_string(),
            font_size_px: 40.0,
            opacity: 0.8,
        }
    }
}

impl WatermarkStyle {
    pub fn validate(&self) -> GalleryResult<()> {
        if self.text.trim().is_empty() {
            return Err(GalleryError::validation("Watermark text is required"));
        }
        if !(MIN_FONT_SIZE_PX..=MAX_FONT_SIZE_PX).contains(&self.font_size_px) {
            return Err(GalleryError::validation(format!(
                "Watermark size must be between {} and {} px",
                MIN_FONT_SIZE_PX, MAX_FONT_SIZE_PX
            )));
        }
        if !(MIN_OPACITY - f32::EPSILON..=MAX_OPACITY + f32::EPSILON).contains(&self.opacity) {
            return Err(GalleryError::validation(format!(
                "Watermark opacity must be between {} and {}",
                MIN_OPACITY, MAX_OPACITY
            )));
        }
        parse_color(&self.color_hex)?;
        Ok(())
    }

    pub fn with_anchor(&self, anchor: Anchor) -> WatermarkSpec {
        WatermarkSpec {
            style: self.clone(),
            anchor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkSpec {
    #[serde(flatten)]
    pub style: WatermarkStyle,
    pub anchor: Anchor,
}

/// Result of the compositing step, ready for upload.
#[derive(Debug, Clone)]
pub struct CompositedFile {
    pub bytes: Bytes,
    pub name: String,
    pub mime_type: String,
}

/// Parses `#rgb` or `#rrggbb`.
pub fn parse_color(hex: &str) -> GalleryResult<[u8; 3]> {
    let invalid = || GalleryError::validation(format!("Invalid color '{}'", hex));
    let digits = hex.trim().strip_prefix('#').ok_or_else(invalid)?;
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid());
    match digits.len() {
        3 => {
            let mut rgb = [0u8; 3];
            for (i, c) in digits.chars().enumerate() {
                let v = channel(&c.to_string())?;
                rgb[i] = v * 17;
            }
            Ok(rgb)
        }
        6 => Ok([
            channel(&digits[0..2])?,
            channel(&digits[2..4])?,
            channel(&digits[4..6])?,
        ]),
        _ => Err(invalid()),
    }
}

/// Ratio between natural image width and the width it was previewed at.
pub fn preview_scale(natural_width: u32, preview_width_px: f32) -> GalleryResult<f32> {
    if !preview_width_px.is_finite() || preview_width_px <= 0.0 {
        return Err(GalleryError::validation("Preview width must be positive"));
    }
    Ok(natural_width as f32 / preview_width_px)
}

/// Baseline origin of the text in image pixels. The anchor marks the visual
/// top-left of the text, so one font height is added to reach the baseline.
pub fn text_origin(spec: &WatermarkSpec, scale: f32) -> (f32, f32) {
    let font_px = spec.style.font_size_px * scale;
    (spec.anchor.x * scale, spec.anchor.y * scale + font_px)
}

#[derive(Clone, Default)]
pub struct WatermarkCompositor {
    font: Option<Arc<Font<'static>>>,
}

impl WatermarkCompositor {
    pub fn new(font: Font<'static>) -> Self {
        Self {
            font: Some(Arc::new(font)),
        }
    }

    pub fn without_font() -> Self {
        Self { font: None }
    }

    /// Loads the TrueType font used for watermark text. A missing or broken
    /// font only disables watermarking, uploads keep working.
    pub fn load(font_path: &Path) -> Self {
        let data = match std::fs::read(font_path) {
            Ok(data) => data,
            Err(e) => {
                warn!(
                    "Watermark font {} unavailable ({}), watermarking disabled",
                    font_path.display(),
                    e
                );
                return Self::without_font();
            }
        };

        match Font::try_from_vec(data) {
            Some(font) => {
                info!("Loaded watermark font {}", font_path.display());
                Self::new(font)
            }
            None => {
                warn!(
                    "Watermark font {} is not a valid TrueType font, watermarking disabled",
                    font_path.display()
                );
                Self::without_font()
            }
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Produces the bytes that get uploaded for one pending file.
    pub fn composite(
        &self,
        source: &PendingFile,
        spec: Option<&WatermarkSpec>,
        preview_width_px: f32,
    ) -> GalleryResult<CompositedFile> {
        let Some(spec) = spec else {
            return Ok(CompositedFile {
                bytes: source.raw_bytes.clone(),
                name: source.original_name.clone(),
                mime_type: source.mime_type.clone(),
            });
        };

        spec.style.validate()?;
        let font = self
            .font
            .as_ref()
            .ok_or_else(|| GalleryError::remote("watermark font unavailable"))?;

        let decoded = image::load_from_memory(&source.raw_bytes)
            .map_err(|e| GalleryError::Decode(format!("{}: {}", source.original_name, e)))?;
        let scale = preview_scale(decoded.width(), preview_width_px)?;

        let mut canvas = decoded.to_rgba8();
        draw_text(&mut canvas, font, spec, scale)?;

        let rgb = DynamicImage::ImageRgba8(canvas).to_rgb8();
        let mut out = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
        encoder
            .encode_image(&rgb)
            .map_err(|e| GalleryError::remote(format!("JPEG encoding failed: {}", e)))?;

        Ok(CompositedFile {
            bytes: Bytes::from(out),
            name: source.original_name.clone(),
            mime_type: "image/jpeg".to_string(),
        })
    }
}

fn draw_text(
    canvas: &mut RgbaImage,
    font: &Font<'static>,
    spec: &WatermarkSpec,
    scale: f32,
) -> GalleryResult<()> {
    let color = parse_color(&spec.style.color_hex)?;
    let opacity = spec.style.opacity.clamp(0.0, 1.0);
    let font_px = spec.style.font_size_px * scale;
    if !font_px.is_finite() || font_px > MAX_DRAW_COORD {
        return Err(GalleryError::validation(
            "Watermark text is too large for this image",
        ));
    }
    let (origin_x, origin_y) = text_origin(spec, scale);
    if !origin_x.is_finite() || !origin_y.is_finite() {
        return Ok(());
    }
    // Keeps rusttype's pixel math inside i32; anything past this is off canvas anyway.
    let origin_x = origin_x.clamp(-MAX_DRAW_COORD, MAX_DRAW_COORD);
    let origin_y = origin_y.clamp(-MAX_DRAW_COORD, MAX_DRAW_COORD);

    let glyphs: Vec<PositionedGlyph<'_>> = font
        .layout(
            &spec.style.text,
            Scale::uniform(font_px),
            point(origin_x, origin_y),
        )
        .collect();

    let Some(text_bounds) = glyph_bounds(&glyphs) else {
        return Ok(());
    };

    // Canvas shadowBlur maps to a gaussian with sigma = blur / 2.
    let sigma = SHADOW_BLUR_PX * scale / 2.0;
    let margin = (sigma * 3.0).ceil() as i32;
    let x0 = text_bounds.min.x.saturating_sub(margin).max(0);
    let y0 = text_bounds.min.y.saturating_sub(margin).max(0);
    let x1 = text_bounds.max.x.saturating_add(margin).min(canvas.width() as i32);
    let y1 = text_bounds.max.y.saturating_add(margin).min(canvas.height() as i32);
    if x0 >= x1 || y0 >= y1 {
        return Ok(());
    }
    let (width, height) = ((x1 - x0) as u32, (y1 - y0) as u32);

    let mut coverage = GrayImage::new(width, height);
    for glyph in &glyphs {
        let Some(bb) = glyph.pixel_bounding_box() else {
            continue;
        };
        glyph.draw(|gx, gy, v| {
            // glyphs far off canvas can sit near i32::MIN or i32::MAX
            let x = gx as i64 + bb.min.x as i64 - x0 as i64;
            let y = gy as i64 + bb.min.y as i64 - y0 as i64;
            if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
                return;
            }
            let pixel = coverage.get_pixel_mut(x as u32, y as u32);
            pixel.0[0] = pixel.0[0].max((v.clamp(0.0, 1.0) * 255.0).round() as u8);
        });
    }

    let shadow = if sigma > 0.0 {
        image::imageops::blur(&coverage, sigma)
    } else {
        coverage.clone()
    };

    for y in 0..height {
        for x in 0..width {
            let dst = canvas.get_pixel_mut(x0 as u32 + x, y0 as u32 + y);
            let shadow_alpha = SHADOW_ALPHA * opacity * shadow.get_pixel(x, y).0[0] as f32 / 255.0;
            blend(dst, [0, 0, 0], shadow_alpha);
            let text_alpha = opacity * coverage.get_pixel(x, y).0[0] as f32 / 255.0;
            blend(dst, color, text_alpha);
        }
    }

    Ok(())
}

fn glyph_bounds(glyphs: &[PositionedGlyph<'_>]) -> Option<Rect<i32>> {
    glyphs
        .iter()
        .filter_map(|g| g.pixel_bounding_box())
        .reduce(|acc, bb| Rect {
            min: point(acc.min.x.min(bb.min.x), acc.min.y.min(bb.min.y)),
            max: point(acc.max.x.max(bb.max.x), acc.max.y.max(bb.max.y)),
        })
}

/// Source-over blend of a solid color with the given alpha.
fn blend(dst: &mut Rgba<u8>, color: [u8; 3], alpha: f32) {
    if alpha <= 0.0 {
        return;
    }
    let alpha = alpha.min(1.0);
    for (channel, src) in dst.0.iter_mut().take(3).zip(color) {
        *channel = (src as f32 * alpha + *channel as f32 * (1.0 - alpha)).round() as u8;
    }
    let dst_alpha = dst.0[3] as f32 / 255.0;
    dst.0[3] = ((alpha + dst_alpha * (1.0 - alpha)) * 255.0).round() as u8;
}
