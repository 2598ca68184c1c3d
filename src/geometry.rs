//! Band geometry formulas, factored into one pure module depended on by both
//! the overlay painter (C2) and the subtitle positioner (C3) so the two can
//! never drift apart (see §3/§9 of SPEC_FULL.md).

/// Geometry of the caption band for a given font size `s` and canvas width `W`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandGeometry {
    pub line_leading_multi: f64,
    pub line_leading_single: f64,
    pub outer_margin_top: f64,
    pub outer_margin_bottom: f64,
    pub inner_padding_top: f64,
    pub inner_padding_bottom: f64,
    pub horizontal_margin: f64,
    pub corner_radius: f64,
}

impl BandGeometry {
    pub fn compute(font_size: f64, canvas_width: f64) -> Self {
        let s = font_size;
        let w = canvas_width;
        Self {
            line_leading_multi: 0.42 * s,
            line_leading_single: 0.25 * s,
            outer_margin_top: (0.12 * s).max(6.0),
            outer_margin_bottom: (0.35 * s).max(18.0),
            inner_padding_top: (0.45 * s).max(20.0),
            inner_padding_bottom: (0.7 * s).max(28.0),
            horizontal_margin: (0.018 * w).max(18.0),
            corner_radius: (0.42 * s).max(18.0),
        }
    }

    /// Leading for a segment given its line count (Invariant: same formula used
    /// by C2 and C3; never recomputed ad hoc elsewhere).
    pub fn line_leading(&self, line_count: usize) -> f64 {
        if line_count > 1 {
            self.line_leading_multi
        } else {
            self.line_leading_single
        }
    }

    /// Total band height for the given number of lines and per-line glyph height.
    pub fn band_height(&self, line_count: usize, glyph_height: f64) -> f64 {
        let lines = line_count.max(1) as f64;
        let leading = self.line_leading(line_count);
        self.inner_padding_top
            + lines * glyph_height
            + (lines - 1.0).max(0.0) * leading
            + self.inner_padding_bottom
    }

    /// Top-left y-ordinate of the band, anchored to the bottom of a `canvas_height`-tall frame.
    pub fn band_top(&self, canvas_height: f64, line_count: usize, glyph_height: f64) -> f64 {
        canvas_height - self.outer_margin_bottom - self.band_height(line_count, glyph_height)
    }

    /// Inner-top ordinate used by C3 as the karaoke `pos(cx, y)` anchor.
    pub fn inner_top(&self, canvas_height: f64, line_count: usize, glyph_height: f64) -> f64 {
        self.band_top(canvas_height, line_count, glyph_height) + self.inner_padding_top
    }

    pub fn band_left(&self, canvas_width: f64) -> f64 {
        self.horizontal_margin
    }

    pub fn band_width(&self, canvas_width: f64) -> f64 {
        canvas_width - 2.0 * self.horizontal_margin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formulas_match_spec_values() {
        let g = BandGeometry::compute(40.0, 1920.0);
        assert_eq!(g.line_leading_multi, 16.8);
        assert_eq!(g.line_leading_single, 10.0);
        assert_eq!(g.outer_margin_top, 6.0); // max(4.8, 6)
        assert_eq!(g.outer_margin_bottom, 18.0); // max(14.0, 18)
        assert_eq!(g.inner_padding_top, 20.0); // max(18, 20)
        assert_eq!(g.inner_padding_bottom, 28.0); // max(28, 28)
        assert_eq!(g.horizontal_margin, 34.56); // max(34.56, 18)
        assert_eq!(g.corner_radius, 18.0); // max(16.8, 18)
    }

    #[test]
    fn small_font_clamps_to_floor_values() {
        let g = BandGeometry::compute(4.0, 200.0);
        assert_eq!(g.outer_margin_top, 6.0);
        assert_eq!(g.outer_margin_bottom, 18.0);
        assert_eq!(g.inner_padding_top, 20.0);
        assert_eq!(g.inner_padding_bottom, 28.0);
        assert_eq!(g.horizontal_margin, 18.0);
        assert_eq!(g.corner_radius, 18.0);
    }

    #[test]
    fn band_height_includes_leading_between_lines_only() {
        let g = BandGeometry::compute(40.0, 1920.0);
        let one_line = g.band_height(1, 50.0);
        let two_line = g.band_height(2, 50.0);
        assert_eq!(one_line, g.inner_padding_top + 50.0 + g.inner_padding_bottom);
        assert_eq!(
            two_line,
            g.inner_padding_top + 100.0 + g.line_leading_multi + g.inner_padding_bottom
        );
    }
}
