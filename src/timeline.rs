//! Timeline builder (C8): assigns scene durations from narration lengths and
//! chunk geometry, wraps chunk text into display rows, and seeds each scene's
//! deterministic motion vector.

use crate::config::SectionsConfig;
use crate::error::{RenderError, RenderResult};
use crate::model::{Direction, NarrationChunk, ScenePlan, Segment, ScriptBlock, SceneKind};

/// Greedy word-wrap: breaks `text` into rows no wider than `width` characters,
/// never splitting a word. A single word longer than `width` occupies its own row.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut rows = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate_len = if current.is_empty() {
            word.len()
        } else {
            current.len() + 1 + word.len()
        };
        if candidate_len > width && !current.is_empty() {
            rows.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        rows.push(current);
    }
    if rows.is_empty() {
        rows.push(String::new());
    }
    rows
}

/// Builds the opening scene: one centred segment spanning the full narration duration.
pub fn build_opening_scene(title: &str, narration: &NarrationChunk, wrap_width: usize) -> ScenePlan {
    let lines = wrap_text(title, wrap_width);
    let segment = Segment {
        lines,
        start_offset: 0.0,
        duration: narration.duration_seconds,
        text_for_typing: title.to_string(),
    };
    ScenePlan {
        id: "opening".to_string(),
        kind: SceneKind::Opening,
        base_image_path: None,
        narration_audio_path: narration.audio_path.clone(),
        chunk_audio_paths: vec![narration.audio_path.clone()],
        duration_seconds: narration.duration_seconds,
        segments: vec![segment],
        motion_vector: Direction::from_scene_id("opening"),
        intro_relief_seconds: 0.0,
    }
}

/// Bundles narration chunks into content scenes, up to `max_chunks_per_scene`,
/// never exceeding `max_duration_seconds`. Returns one `ScenePlan` per bundle,
/// each still missing its `base_image_path` (filled in by the asset pipeline).
pub fn build_content_scenes(
    blocks: &[ScriptBlock],
    chunks_per_block: &[Vec<NarrationChunk>],
    cfg: &SectionsConfig,
    intro_seconds: f64,
) -> RenderResult<Vec<ScenePlan>> {
    if blocks.is_empty() {
        return Err(RenderError::EmptyScript);
    }

    if chunks_per_block.iter().all(|b| b.is_empty()) {
        return Err(RenderError::EmptyScript);
    }
    for chunk in chunks_per_block.iter().flatten() {
        if chunk.duration_seconds <= 0.0 {
            return Err(RenderError::InvalidDuration(chunk.duration_seconds));
        }
    }

    let mut scenes = Vec::new();
    let mut bundle: Vec<&NarrationChunk> = Vec::new();
    let mut bundle_duration = 0.0_f64;

    let mut flush = |bundle: &mut Vec<&NarrationChunk>, bundle_duration: &mut f64, scenes: &mut Vec<ScenePlan>| {
        if bundle.is_empty() {
            return;
        }
        let scene_index = scenes.len();
        let scene = assemble_scene(scene_index, bundle, cfg, intro_seconds);
        scenes.push(scene);
        bundle.clear();
        *bundle_duration = 0.0;
    };

    // A bundle never spans a block boundary: every scene is backed by exactly
    // one base image, and images are assigned per block (§6 upstream interface).
    for block_chunks in chunks_per_block {
        for chunk in block_chunks {
            let would_add_padding = if bundle.is_empty() { 0.0 } else { cfg.padding_seconds };
            let tentative = bundle_duration + would_add_padding + chunk.duration_seconds;

            let exceeds_count = bundle.len() + 1 > cfg.max_chunks_per_scene;
            let exceeds_duration = !bundle.is_empty() && tentative > cfg.max_duration_seconds;

            if exceeds_count || exceeds_duration {
                flush(&mut bundle, &mut bundle_duration, &mut scenes);
            }

            let padding = if bundle.is_empty() { 0.0 } else { cfg.padding_seconds };
            bundle_duration += padding + chunk.duration_seconds;
            bundle.push(chunk);
        }
        flush(&mut bundle, &mut bundle_duration, &mut scenes);
    }

    Ok(scenes)
}

fn assemble_scene(
    scene_index: usize,
    bundle: &[&NarrationChunk],
    cfg: &SectionsConfig,
    intro_seconds: f64,
) -> ScenePlan {
    let mut segments = Vec::with_capacity(bundle.len());
    let mut offset = 0.0_f64;
    let n = bundle.len();

    for (i, chunk) in bundle.iter().enumerate() {
        let is_last = i + 1 == n;
        let duration = if is_last {
            chunk.duration_seconds
        } else {
            chunk.duration_seconds + cfg.padding_seconds
        };
        let lines = wrap_text(&chunk.text, cfg.wrap_chars);
        segments.push(Segment {
            lines,
            start_offset: offset,
            duration,
            text_for_typing: chunk.text.clone(),
        });
        offset += duration;
    }

    let mut scene_duration = offset;
    if scene_duration < cfg.min_duration_seconds {
        let shortfall = cfg.min_duration_seconds - scene_duration;
        if let Some(last) = segments.last_mut() {
            last.duration += shortfall;
        }
        scene_duration = cfg.min_duration_seconds;
    }
    let id = format!("scene-{scene_index:03}");
    let first_audio = bundle[0].audio_path.clone();
    let chunk_audio_paths = bundle.iter().map(|c| c.audio_path.clone()).collect();

    ScenePlan {
        id: id.clone(),
        kind: SceneKind::Content,
        base_image_path: None,
        narration_audio_path: first_audio,
        chunk_audio_paths,
        duration_seconds: scene_duration,
        segments,
        motion_vector: Direction::from_scene_id(&id),
        intro_relief_seconds: intro_seconds.min(scene_duration),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn chunk(text: &str, duration: f64) -> NarrationChunk {
        NarrationChunk {
            audio_path: PathBuf::from(format!("{text}.wav")),
            duration_seconds: duration,
            text: text.to_string(),
        }
    }

    #[test]
    fn wrap_text_never_splits_words() {
        let rows = wrap_text("the quick brown fox jumps over", 10);
        for row in &rows {
            assert!(row.len() <= 10 || !row.contains(' '));
        }
        assert_eq!(rows.join(" "), "the quick brown fox jumps over");
    }

    #[test]
    fn empty_script_is_an_error() {
        let cfg = SectionsConfig::default();
        let err = build_content_scenes(&[], &[], &cfg, 0.0).unwrap_err();
        assert!(matches!(err, RenderError::EmptyScript));
    }

    #[test]
    fn zero_duration_chunk_is_invalid() {
        let cfg = SectionsConfig::default();
        let blocks = vec![ScriptBlock { title: None, body: "x".into(), tags: vec![] }];
        let chunks = vec![vec![chunk("hello", 0.0)]];
        let err = build_content_scenes(&blocks, &chunks, &cfg, 0.0).unwrap_err();
        assert!(matches!(err, RenderError::InvalidDuration(_)));
    }

    #[test]
    fn segment_durations_sum_to_scene_duration() {
        let mut cfg = SectionsConfig::default();
        cfg.max_chunks_per_scene = 10;
        cfg.max_duration_seconds = 1000.0;
        cfg.padding_seconds = 0.35;
        let blocks = vec![ScriptBlock { title: None, body: "x".into(), tags: vec![] }];
        let chunks = vec![vec![chunk("a", 3.0), chunk("b", 4.0), chunk("c", 3.0)]];
        let scenes = build_content_scenes(&blocks, &chunks, &cfg, 0.0).unwrap();
        assert_eq!(scenes.len(), 1);
        let scene = &scenes[0];
        let summed: f64 = scene.segments.iter().map(|s| s.duration).sum();
        assert!((summed - scene.duration_seconds).abs() < 1e-9);
        assert!((scene.duration_seconds - (3.0 + 4.0 + 3.0 + 2.0 * 0.35)).abs() < 1e-9);
    }

    #[test]
    fn bundling_respects_max_chunks_per_scene() {
        let mut cfg = SectionsConfig::default();
        cfg.max_chunks_per_scene = 2;
        cfg.max_duration_seconds = 1000.0;
        let blocks = vec![ScriptBlock { title: None, body: "x".into(), tags: vec![] }];
        let chunks = vec![vec![chunk("a", 1.0), chunk("b", 1.0), chunk("c", 1.0)]];
        let scenes = build_content_scenes(&blocks, &chunks, &cfg, 0.0).unwrap();
        assert_eq!(scenes.len(), 2);
        assert_eq!(scenes[0].segments.len(), 2);
        assert_eq!(scenes[1].segments.len(), 1);
    }

    #[test]
    fn bundling_never_spans_a_block_boundary() {
        let mut cfg = SectionsConfig::default();
        cfg.max_chunks_per_scene = 10;
        cfg.max_duration_seconds = 1000.0;
        let blocks = vec![
            ScriptBlock { title: None, body: "x".into(), tags: vec![] },
            ScriptBlock { title: None, body: "y".into(), tags: vec![] },
        ];
        let chunks = vec![vec![chunk("a", 1.0)], vec![chunk("b", 1.0)]];
        let scenes = build_content_scenes(&blocks, &chunks, &cfg, 0.0).unwrap();
        assert_eq!(scenes.len(), 2);
        assert_eq!(scenes[0].segments.len(), 1);
        assert_eq!(scenes[1].segments.len(), 1);
    }

    #[test]
    fn bundling_respects_max_duration_seconds() {
        let mut cfg = SectionsConfig::default();
        cfg.max_chunks_per_scene = 10;
        cfg.max_duration_seconds = 5.0;
        cfg.padding_seconds = 0.0;
        let blocks = vec![ScriptBlock { title: None, body: "x".into(), tags: vec![] }];
        let chunks = vec![vec![chunk("a", 3.0), chunk("b", 3.0)]];
        let scenes = build_content_scenes(&blocks, &chunks, &cfg, 0.0).unwrap();
        assert_eq!(scenes.len(), 2);
    }

    #[test]
    fn short_bundle_is_clamped_up_to_min_duration_seconds() {
        let mut cfg = SectionsConfig::default();
        cfg.min_duration_seconds = 5.0;
        cfg.padding_seconds = 0.0;
        let blocks = vec![ScriptBlock { title: None, body: "x".into(), tags: vec![] }];
        let chunks = vec![vec![chunk("a", 2.0)]];
        let scenes = build_content_scenes(&blocks, &chunks, &cfg, 0.0).unwrap();
        assert_eq!(scenes.len(), 1);
        let scene = &scenes[0];
        assert_eq!(scene.duration_seconds, 5.0);
        let summed: f64 = scene.segments.iter().map(|s| s.duration).sum();
        assert!((summed - scene.duration_seconds).abs() < 1e-9);
    }

    #[test]
    fn motion_vector_is_deterministic_across_builds() {
        let cfg = SectionsConfig::default();
        let blocks = vec![ScriptBlock { title: None, body: "x".into(), tags: vec![] }];
        let chunks = vec![vec![chunk("a", 3.0)]];
        let first = build_content_scenes(&blocks, &chunks, &cfg, 0.0).unwrap();
        let second = build_content_scenes(&blocks, &chunks, &cfg, 0.0).unwrap();
        assert_eq!(first[0].motion_vector, second[0].motion_vector);
    }

    #[test]
    fn opening_scene_has_one_full_span_segment() {
        let narration = chunk("Hello", 5.0);
        let scene = build_opening_scene("Hello", &narration, 36);
        assert_eq!(scene.segments.len(), 1);
        assert_eq!(scene.segments[0].duration, 5.0);
        assert_eq!(scene.segments[0].start_offset, 0.0);
        assert_eq!(scene.kind, SceneKind::Opening);
    }
}
