//! Overlay painter (C2): caption-band PNGs and centred title PNGs, font
//! resolution, and content-hash caching of rendered overlays.

use std::path::{Path, PathBuf};

use ab_glyph::{Font, FontArc, Glyph, PxScale, ScaleFont};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
use imageproc::rect::Rect;
use sha2::{Digest, Sha256};

use crate::config::TextConfig;
use crate::error::{RenderError, RenderResult};
use crate::geometry::BandGeometry;
use crate::model::Segment;

/// Conventional install locations probed after the configured path, in order:
/// a packaged Noto fallback, then system DejaVu-family fonts. No bytes are
/// embedded in the binary — see SPEC_FULL.md §4.2.1.
const BUNDLED_NOTO_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/noto/NotoSans-Bold.ttf",
    "/usr/share/fonts/noto/NotoSans-Bold.ttf",
];
const SYSTEM_DEJAVU_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
];
/// Preferred for the opening title only (§4.2: "preferring an ExtraBold
/// weight when available"); checked before the regular Bold candidates above.
const BUNDLED_NOTO_EXTRABOLD_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/noto/NotoSans-ExtraBold.ttf",
    "/usr/share/fonts/noto/NotoSans-ExtraBold.ttf",
];
const SYSTEM_DEJAVU_EXTRABOLD_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-ExtraBold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-ExtraBold.ttf",
];

/// Resolves a usable font, trying the configured path then the two fallback
/// tiers named in SPEC_FULL.md §4.2. Failure at all three is `FontUnavailable`.
pub fn resolve_font_path(configured: Option<&str>) -> RenderResult<PathBuf> {
    let mut candidates: Vec<&str> = Vec::new();
    if let Some(p) = configured {
        candidates.push(p);
    }
    candidates.extend_from_slice(BUNDLED_NOTO_CANDIDATES);
    candidates.extend_from_slice(SYSTEM_DEJAVU_CANDIDATES);

    for candidate in &candidates {
        if Path::new(candidate).is_file() {
            return Ok(PathBuf::from(candidate));
        }
    }
    Err(RenderError::FontUnavailable(format!(
        "tried: {}",
        candidates.join(", ")
    )))
}

/// Resolves the font used for the opening title: an ExtraBold sibling of the
/// configured/fallback font if one exists on disk, else the same font
/// [`resolve_font_path`] would pick (§4.2's "preferring ExtraBold when
/// available" — availability is never fatal, it only narrows the choice).
pub fn resolve_opening_font_path(configured: Option<&str>) -> RenderResult<PathBuf> {
    let mut extrabold_candidates: Vec<String> = Vec::new();
    if let Some(p) = configured {
        if let Some(sibling) = extrabold_sibling(Path::new(p)) {
            extrabold_candidates.push(sibling);
        }
    }
    extrabold_candidates.extend(BUNDLED_NOTO_EXTRABOLD_CANDIDATES.iter().map(|s| s.to_string()));
    extrabold_candidates.extend(SYSTEM_DEJAVU_EXTRABOLD_CANDIDATES.iter().map(|s| s.to_string()));

    for candidate in &extrabold_candidates {
        if Path::new(candidate).is_file() {
            return Ok(PathBuf::from(candidate));
        }
    }
    resolve_font_path(configured)
}

/// Guesses an ExtraBold sibling path for a configured font by swapping its
/// `Bold`/`Regular` weight token, e.g. `Foo-Bold.ttf` -> `Foo-ExtraBold.ttf`.
fn extrabold_sibling(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let ext = path.extension()?.to_str()?;
    let dir = path.parent()?;
    let candidate_stem = if stem.contains("Bold") {
        stem.replace("Bold", "ExtraBold")
    } else if stem.contains("Regular") {
        stem.replace("Regular", "ExtraBold")
    } else {
        format!("{stem}-ExtraBold")
    };
    Some(dir.join(format!("{candidate_stem}.{ext}")).to_string_lossy().into_owned())
}

pub struct OverlayPainter {
    font: FontArc,
    /// Opening-title font: an ExtraBold sibling of `font` when one is available.
    opening_font: FontArc,
    /// Stable identity of the resolved font, used in the cache key (§4.2).
    font_identity: String,
}

fn load_font(path: &Path) -> RenderResult<FontArc> {
    let bytes = std::fs::read(path)?;
    FontArc::try_from_vec(bytes).map_err(|_| RenderError::FontUnavailable(path.display().to_string()))
}

impl OverlayPainter {
    pub fn new(text_cfg: &TextConfig) -> RenderResult<Self> {
        let path = resolve_font_path(text_cfg.font_path.as_deref())?;
        let font = load_font(&path)?;
        let opening_path = resolve_opening_font_path(text_cfg.font_path.as_deref())?;
        let opening_font = if opening_path == path {
            font.clone()
        } else {
            load_font(&opening_path)?
        };
        Ok(Self {
            font,
            opening_font,
            font_identity: path.display().to_string(),
        })
    }

    /// Content-hash cache key for `(text, geometry, colours, font_identity)` (§4.2).
    pub fn cache_key(
        &self,
        text: &str,
        canvas_w: u32,
        canvas_h: u32,
        font_size: f64,
        text_color: [u8; 4],
        band_color: [u8; 4],
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update(canvas_w.to_le_bytes());
        hasher.update(canvas_h.to_le_bytes());
        hasher.update(font_size.to_bits().to_le_bytes());
        hasher.update(text_color);
        hasher.update(band_color);
        hasher.update(self.font_identity.as_bytes());
        let digest = hasher.finalize();
        let mut s = String::with_capacity(digest.len() * 2);
        for b in &digest {
            use std::fmt::Write;
            write!(s, "{b:02x}").unwrap();
        }
        s
    }

    fn measure_line_width(&self, line: &str, font_size: f64) -> f32 {
        self.measure_line_width_with(&self.font, line, font_size)
    }

    fn measure_line_width_with(&self, font: &FontArc, line: &str, font_size: f64) -> f32 {
        let scaled = font.as_scaled(PxScale::from(font_size as f32));
        line.chars()
            .map(|c| scaled.h_advance(scaled.glyph_id(c)))
            .sum()
    }

    fn draw_line(&self, canvas: &mut RgbaImage, line: &str, x: f32, y: f32, font_size: f64, color: [u8; 4]) {
        self.draw_line_with(&self.font, canvas, line, x, y, font_size, color)
    }

    fn draw_line_with(&self, font: &FontArc, canvas: &mut RgbaImage, line: &str, x: f32, y: f32, font_size: f64, color: [u8; 4]) {
        let scaled = font.as_scaled(PxScale::from(font_size as f32));
        let mut cursor_x = x;
        for ch in line.chars() {
            let glyph_id = scaled.glyph_id(ch);
            let glyph: Glyph = glyph_id.with_scale_and_position(font_size as f32, ab_glyph::point(cursor_x, y));
            if let Some(outlined) = scaled.outline_glyph(glyph) {
                let bounds = outlined.px_bounds();
                outlined.draw(|gx, gy, coverage| {
                    let px = bounds.min.x as i32 + gx as i32;
                    let py = bounds.min.y as i32 + gy as i32;
                    if px >= 0 && py >= 0 && (px as u32) < canvas.width() && (py as u32) < canvas.height() {
                        let alpha = (coverage * color[3] as f32) as u8;
                        if alpha > 0 {
                            canvas.put_pixel(px as u32, py as u32, Rgba([color[0], color[1], color[2], alpha]));
                        }
                    }
                });
            }
            cursor_x += scaled.h_advance(glyph_id);
        }
    }

    /// Draws the rounded-rectangle caption band for one segment, transparent
    /// elsewhere, with glyphs drawn unless `draw_glyphs` is false (typing overlay).
    pub fn paint_segment_band(
        &self,
        segment: &Segment,
        canvas_w: u32,
        canvas_h: u32,
        text_cfg: &TextConfig,
        draw_glyphs: bool,
        out_path: &Path,
    ) -> RenderResult<PathBuf> {
        let key = self.cache_key(
            &segment.text_for_typing,
            canvas_w,
            canvas_h,
            text_cfg.default_size,
            text_cfg.color_default,
            text_cfg.color_background_box,
        );
        if out_path.exists() {
            return Ok(out_path.to_path_buf());
        }
        let _ = key; // cache key is the file stem chosen by the caller (run-directory layout)

        let geometry = BandGeometry::compute(text_cfg.default_size, canvas_w as f64);
        let glyph_height = text_cfg.default_size;
        let band_top = geometry.band_top(canvas_h as f64, segment.lines.len(), glyph_height);
        let band_height = geometry.band_height(segment.lines.len(), glyph_height);
        let band_left = geometry.band_left(canvas_w as f64);
        let band_width = geometry.band_width(canvas_w as f64);

        let mut canvas = RgbaImage::from_pixel(canvas_w, canvas_h, Rgba([0, 0, 0, 0]));
        draw_rounded_rect(
            &mut canvas,
            band_left,
            band_top,
            band_width,
            band_height,
            geometry.corner_radius,
            text_cfg.color_background_box,
        );

        if draw_glyphs {
            let leading = geometry.line_leading(segment.lines.len());
            let mut y = band_top + geometry.inner_padding_top;
            for line in &segment.lines {
                let line_width = self.measure_line_width(line, text_cfg.default_size) as f64;
                let x = band_left + (band_width - line_width) / 2.0;
                self.draw_line(&mut canvas, line, x as f32, (y + glyph_height) as f32, text_cfg.default_size, text_cfg.color_default);
                y += glyph_height + leading;
            }
        }

        canvas
            .save(out_path)
            .map_err(|e| RenderError::Io(std::io::Error::other(format!("failed to write overlay PNG: {e}"))))?;
        Ok(out_path.to_path_buf())
    }

    /// Draws the centred opening title on a transparent canvas, line spacing `0.6*s`.
    pub fn paint_opening_title(
        &self,
        lines: &[String],
        canvas_w: u32,
        canvas_h: u32,
        text_cfg: &TextConfig,
        out_path: &Path,
    ) -> RenderResult<PathBuf> {
        if out_path.exists() {
            return Ok(out_path.to_path_buf());
        }
        let s = text_cfg.default_size;
        let leading = 0.6 * s;
        let total_height = (lines.len() as f64) * s + (lines.len().saturating_sub(1) as f64) * leading;
        let mut canvas = RgbaImage::from_pixel(canvas_w, canvas_h, Rgba([0, 0, 0, 0]));
        let mut y = (canvas_h as f64 - total_height) / 2.0;
        for line in lines {
            let line_width = self.measure_line_width_with(&self.opening_font, line, s) as f64;
            let x = (canvas_w as f64 - line_width) / 2.0;
            self.draw_line_with(&self.opening_font, &mut canvas, line, x as f32, (y + s) as f32, s, text_cfg.color_default);
            y += s + leading;
        }
        canvas
            .save(out_path)
            .map_err(|e| RenderError::Io(std::io::Error::other(format!("failed to write title PNG: {e}"))))?;
        Ok(out_path.to_path_buf())
    }
}

/// Rounded rectangle: a centre strip plus four corner disks, composited at the
/// configured RGBA colour. `imageproc` has no built-in rounded-rect primitive,
/// so this composes `draw_filled_rect_mut`/`draw_filled_circle_mut`.
fn draw_rounded_rect(canvas: &mut RgbaImage, x: f64, y: f64, w: f64, h: f64, radius: f64, color: [u8; 4]) {
    let (x, y, w, h, r) = (x as i32, y as i32, w as i32, h as i32, radius as i32);
    let rgba = Rgba(color);
    if w <= 0 || h <= 0 {
        return;
    }
    let r = r.min(w / 2).min(h / 2).max(0);

    // Centre vertical strip (full width, minus the corner-rounded top/bottom bands).
    if h > 2 * r {
        draw_filled_rect_mut(canvas, Rect::at(x, y + r).of_size(w as u32, (h - 2 * r) as u32), rgba);
    }
    // Top and bottom horizontal strips (minus the corner-rounded left/right ends).
    if w > 2 * r {
        if r > 0 {
            draw_filled_rect_mut(canvas, Rect::at(x + r, y).of_size((w - 2 * r) as u32, r as u32), rgba);
            draw_filled_rect_mut(canvas, Rect::at(x + r, y + h - r).of_size((w - 2 * r) as u32, r as u32), rgba);
        } else {
            draw_filled_rect_mut(canvas, Rect::at(x, y).of_size(w as u32, h as u32), rgba);
        }
    }
    if r > 0 {
        let corners = [
            (x + r, y + r),
            (x + w - r, y + r),
            (x + r, y + h - r),
            (x + w - r, y + h - r),
        ];
        for (cx, cy) in corners {
            draw_filled_circle_mut(canvas, (cx, cy), r, rgba);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_font_path_fails_without_any_candidate() {
        let err = resolve_font_path(Some("/nonexistent/path/font.ttf")).unwrap_err();
        assert!(matches!(err, RenderError::FontUnavailable(_)));
    }

    #[test]
    fn draw_rounded_rect_does_not_panic_on_degenerate_sizes() {
        let mut canvas = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 0]));
        draw_rounded_rect(&mut canvas, 0.0, 0.0, 0.0, 0.0, 4.0, [255, 255, 255, 255]);
        draw_rounded_rect(&mut canvas, 1.0, 1.0, 8.0, 8.0, 100.0, [0, 0, 0, 128]);
    }
}
