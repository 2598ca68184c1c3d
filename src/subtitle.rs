//! Caption band subtitle builder (C3): turns a scene's [`Segment`]s into an
//! ASS/SSA document that libass burns in via the `subtitles` filter. Two
//! variants share one geometry and one escaping routine so the band drawn by
//! [`crate::overlay`] and the text drawn by libass never drift apart (§4.3).

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::config::TextConfig;
use crate::geometry::BandGeometry;
use crate::model::Segment;

/// How caption text is revealed within a segment's span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleVariant {
    /// Whole lines fade in per `\k` tick-group (word-paced reveal).
    Karaoke,
    /// Every character gets its own `\k` tick (typewriter effect).
    PerCharacter,
}

pub struct SubtitleBuilder {
    font_name: String,
    fonts_dir: PathBuf,
}

impl SubtitleBuilder {
    pub fn new(font_path: &Path) -> Self {
        let font_name = font_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("DejaVu Sans")
            .to_string();
        let fonts_dir = font_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self { font_name, fonts_dir }
    }

    pub fn fonts_dir(&self) -> &Path {
        &self.fonts_dir
    }

    /// Builds the full ASS document and writes it to `out_path`.
    pub fn build(
        &self,
        segments: &[Segment],
        canvas_w: u32,
        canvas_h: u32,
        text_cfg: &TextConfig,
        typing_speed_multiplier: f64,
        variant: SubtitleVariant,
        out_path: &Path,
    ) -> std::io::Result<PathBuf> {
        let doc = self.render_document(segments, canvas_w, canvas_h, text_cfg, typing_speed_multiplier, variant);
        std::fs::write(out_path, doc)?;
        Ok(out_path.to_path_buf())
    }

    fn render_document(
        &self,
        segments: &[Segment],
        canvas_w: u32,
        canvas_h: u32,
        text_cfg: &TextConfig,
        typing_speed_multiplier: f64,
        variant: SubtitleVariant,
    ) -> String {
        let geometry = BandGeometry::compute(text_cfg.default_size, canvas_w as f64);
        let glyph_height = text_cfg.default_size;
        let mut events = String::new();
        for segment in segments {
            let lines = segment.lines.len().max(1);
            let band_top = geometry.band_top(canvas_h as f64, lines, glyph_height);
            let inner_top = geometry.inner_top(canvas_h as f64, lines, glyph_height);
            let cx = canvas_w as f64 / 2.0;
            let leading = geometry.line_leading(lines);
            let _ = band_top;

            for (i, line) in segment.lines.iter().enumerate() {
                let y = inner_top + (glyph_height + leading) * i as f64;
                let event = match variant {
                    SubtitleVariant::Karaoke => self.karaoke_event(
                        line,
                        segment.start_offset,
                        segment.duration,
                        typing_speed_multiplier,
                        cx,
                        y,
                    ),
                    SubtitleVariant::PerCharacter => self.per_character_event(
                        line,
                        segment.start_offset,
                        segment.duration,
                        typing_speed_multiplier,
                        cx,
                        y,
                        glyph_height,
                    ),
                };
                events.push_str(&event);
                events.push('\n');
            }
        }

        format!(
            "[Script Info]\n\
ScriptType: v4.00+\n\
PlayResX: {w}\n\
PlayResY: {h}\n\
WrapStyle: 2\n\
ScaledBorderAndShadow: yes\n\
YCbCr Matrix: None\n\
\n\
[V4+ Styles]\n\
Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding\n\
Style: Caption,{font},{size},&H00FFFFFF,&H000000FF,&H00000000,&H00000000,0,0,0,0,100,100,0,0,1,0,0,8,0,0,0,1\n\
\n\
[Events]\n\
Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n\
{events}",
            w = canvas_w,
            h = canvas_h,
            font = self.font_name,
            size = text_cfg.default_size as u32,
        )
    }

    /// One event per line; every character in the line gets its own `\k` tick
    /// so libass reveals the line progressively as the ticks elapse
    /// (`N` = character count, per §4.3's `tick = 100·min(N/cps,D)/N` formula —
    /// scenario 3's "ABCD" over 2s resolves to four 50cs ticks).
    fn karaoke_event(
        &self,
        line: &str,
        start: f64,
        duration: f64,
        typing_speed_multiplier: f64,
        cx: f64,
        y: f64,
    ) -> String {
        let chars: Vec<char> = line.chars().collect();
        let n = chars.len().max(1);
        let ticks = karaoke_ticks(n, duration, typing_speed_multiplier);
        let mut text = format!("{{\\an8\\pos({:.1},{:.1})}}", cx, y);
        for (ch, tick) in chars.iter().zip(ticks.iter()) {
            text.push_str(&format!("{{\\k{}}}", tick));
            text.push_str(&escape_ass_text(&ch.to_string()));
        }
        dialogue_line(start, start + duration, &text)
    }

    /// One event *per character*, each with its own absolute `\pos` and its
    /// own start time (cumulative sum of preceding ticks), persisting to the
    /// segment's end once revealed. Used instead of [`Self::karaoke_event`]
    /// when the target `subtitles` backend can't be trusted to honour `\k`
    /// timing (§4.3).
    fn per_character_event(
        &self,
        line: &str,
        start: f64,
        duration: f64,
        typing_speed_multiplier: f64,
        cx: f64,
        y: f64,
        font_size: f64,
    ) -> String {
        let chars: Vec<char> = line.chars().collect();
        let n = chars.len().max(1);
        let ticks = karaoke_ticks(n, duration, typing_speed_multiplier);
        let char_width = font_size * 0.6;
        let total_width = n as f64 * char_width;
        let left = cx - total_width / 2.0;

        let mut elapsed_cs: i64 = 0;
        let mut lines = Vec::with_capacity(n);
        for (i, (ch, tick)) in chars.iter().zip(ticks.iter()).enumerate() {
            let reveal_at = start + (elapsed_cs as f64) / 100.0;
            elapsed_cs += *tick as i64;
            let x = left + (i as f64 + 0.5) * char_width;
            let text = format!("{{\\an8\\pos({:.1},{:.1})}}{}", x, y, escape_ass_text(&ch.to_string()));
            lines.push(dialogue_line(reveal_at, start + duration, &text));
        }
        lines.join("\n")
    }
}

/// Per-unit `\k` centisecond durations for `n` reveal units spread over
/// `duration` seconds at `cps = max((n/duration) * multiplier, 1.0)`
/// units-per-second. Rounding residue is folded into the first tick so the
/// sum always equals `duration` exactly.
pub fn karaoke_ticks(n: usize, duration: f64, typing_speed_multiplier: f64) -> Vec<u32> {
    if n == 0 {
        return Vec::new();
    }
    if duration <= 0.0 {
        return vec![0; n];
    }
    let cps = ((n as f64 / duration) * typing_speed_multiplier).max(1.0);
    let per_unit_secs = (n as f64 / cps).min(duration) / n as f64;
    let raw_tick = (per_unit_secs * 100.0).floor() as i64;
    let mut ticks = vec![raw_tick.max(0) as u32; n];
    let allotted: i64 = ticks.iter().map(|t| *t as i64).sum();
    let target = (duration * 100.0).round() as i64;
    let residue = target - allotted;
    if let Some(first) = ticks.first_mut() {
        *first = (*first as i64 + residue).max(0) as u32;
    }
    ticks
}

fn dialogue_line(start: f64, end: f64, text: &str) -> String {
    format!(
        "Dialogue: 0,{},{},Caption,,0,0,0,,{}",
        format_ass_time(start),
        format_ass_time(end),
        text
    )
}

/// ASS timestamps are `H:MM:SS.cc` (centiseconds, single-digit hours field).
pub fn format_ass_time(secs: f64) -> String {
    let secs = secs.max(0.0);
    let total_cs = (secs * 100.0).round() as u64;
    let cs = total_cs % 100;
    let total_secs = total_cs / 100;
    let s = total_secs % 60;
    let m = (total_secs / 60) % 60;
    let h = total_secs / 3600;
    format!("{}:{:02}:{:02}.{:02}", h, m, s, cs)
}

/// libass reserves `{`, `}` and `\` for override blocks; substitute full-width
/// lookalikes so caption text containing them still renders literally. `\n`
/// hard breaks become the ASS line-break escape `\N`.
pub fn escape_ass_text(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '{' => '\u{FF5B}',
            '}' => '\u{FF5D}',
            '\\' => '\u{FF3C}',
            other => other,
        })
        .collect::<String>()
        .replace('\n', "\\N")
}

/// Escapes a filesystem path for embedding inside an ffmpeg filter argument:
/// backslashes and colons are meaningful to the filter parser.
pub fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "\\\\")
        .replace(':', "\\:")
        .replace('\'', "\\'")
}

/// Builds the `subtitles=filename=...:fontsdir=...` filter argument
/// referencing an ASS file produced by [`SubtitleBuilder::build`].
pub fn subtitles_filter_arg(ass_path: &Path, fonts_dir: &Path) -> String {
    format!(
        "subtitles=filename='{}':fontsdir='{}'",
        escape_filter_path(ass_path),
        escape_filter_path(fonts_dir),
    )
}

/// Content-hash key for caching a rendered ASS file, mirroring
/// [`crate::overlay::OverlayPainter::cache_key`]'s approach for overlay PNGs.
pub fn cache_key(segments: &[Segment], variant: SubtitleVariant, typing_speed_multiplier: f64) -> String {
    let mut hasher = Sha256::new();
    for segment in segments {
        hasher.update(segment.text_for_typing.as_bytes());
        hasher.update(segment.start_offset.to_le_bytes());
        hasher.update(segment.duration.to_le_bytes());
    }
    hasher.update([variant as u8]);
    hasher.update(typing_speed_multiplier.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn karaoke_ticks_sum_matches_duration_centiseconds() {
        let ticks = karaoke_ticks(7, 3.3, 1.0);
        let total: u32 = ticks.iter().sum();
        assert_eq!(total, (3.3 * 100.0).round() as u32);
        assert_eq!(ticks.len(), 7);
    }

    #[test]
    fn karaoke_ticks_handles_zero_duration() {
        let ticks = karaoke_ticks(4, 0.0, 1.0);
        assert_eq!(ticks, vec![0, 0, 0, 0]);
    }

    #[test]
    fn escape_ass_text_substitutes_reserved_characters() {
        let escaped = escape_ass_text("a{b}c\\d\ne");
        assert!(!escaped.contains('{'));
        assert!(!escaped.contains('}'));
        assert!(escaped.contains("\\N"));
        assert!(escaped.ends_with('e'));
    }

    #[test]
    fn format_ass_time_pads_and_truncates_centiseconds() {
        assert_eq!(format_ass_time(0.0), "0:00:00.00");
        assert_eq!(format_ass_time(65.125), "0:01:05.13");
        assert_eq!(format_ass_time(3661.0), "1:01:01.00");
    }

    #[test]
    fn subtitles_filter_arg_escapes_colons() {
        let arg = subtitles_filter_arg(Path::new("/tmp/c:x.ass"), Path::new("/tmp/fonts"));
        assert!(arg.starts_with("subtitles=filename="));
        assert!(arg.contains("fontsdir="));
    }

    #[test]
    fn cache_key_is_deterministic_and_sensitive_to_variant() {
        let segments = vec![Segment {
            lines: vec!["hi".into()],
            start_offset: 0.0,
            duration: 1.0,
            text_for_typing: "hi".into(),
        }];
        let a = cache_key(&segments, SubtitleVariant::Karaoke, 1.0);
        let b = cache_key(&segments, SubtitleVariant::PerCharacter, 1.0);
        assert_eq!(a, cache_key(&segments, SubtitleVariant::Karaoke, 1.0));
        assert_ne!(a, b);
    }
}
