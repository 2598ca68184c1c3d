//! Top-level orchestration: builds the timeline, fans scene rendering out
//! across a worker pool, concatenates in timeline order, and mixes in BGM
//! (§5 concurrency/resource model).

use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use crate::concat;
use crate::config::RenderConfig;
use crate::error::{RenderError, RenderResult};
use crate::manifest::ProjectManifest;
use crate::mixer;
use crate::model::{RunPaths, ScenePlan};
use crate::overlay::{self, OverlayPainter};
use crate::scene_render::SceneRenderer;
use crate::subprocess;
use crate::timeline;

pub struct PipelineOutcome {
    pub final_path: PathBuf,
    pub scene_count: usize,
    pub total_duration_secs: f64,
}

/// Worker count defaults to available parallelism; the caller may override
/// via `--workers` for constrained hosts (§5).
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

pub async fn run(
    config: &RenderConfig,
    manifest: &ProjectManifest,
    run_dir: PathBuf,
    worker_count: usize,
    cancel: watch::Receiver<bool>,
) -> RenderResult<PipelineOutcome> {
    subprocess::probe_tools()?;

    let paths = RunPaths::new(run_dir, manifest.run_id.clone());
    paths.ensure_dirs()?;

    let scenes = build_timeline(config, manifest, &paths)?;
    info!(scene_count = scenes.len(), "timeline built");

    let font_path = overlay::resolve_font_path(config.text.font_path.as_deref())?;
    let painter = OverlayPainter::new(&config.text)?;

    let total_duration_secs: f64 = scenes.iter().map(|s| s.duration_seconds).sum();
    let progress = Arc::new(Mutex::new(vec![0.0_f64; scenes.len()]));
    let worker_count = worker_count.max(1);

    let rendered: Vec<RenderResult<(usize, PathBuf)>> = stream::iter(scenes.iter().enumerate())
        .map(|(i, scene)| {
            let painter = &painter;
            let config = config;
            let paths = &paths;
            let font_path = &font_path;
            let progress = Arc::clone(&progress);
            let mut cancel = cancel.clone();
            let total = total_duration_secs;
            async move {
                let renderer = SceneRenderer::new(painter, config, paths, font_path);
                let result = renderer
                    .render(scene, &mut cancel, |secs| {
                        let progress = Arc::clone(&progress);
                        if let Ok(mut guard) = progress.try_lock() {
                            guard[i] = secs;
                            let done: f64 = guard.iter().sum();
                            if total > 0.0 {
                                render_progress_bar(done / total);
                            }
                        }
                    })
                    .await;
                result.map(|path| (i, path))
            }
        })
        .buffer_unordered(worker_count)
        .collect()
        .await;

    let mut scene_files: Vec<Option<PathBuf>> = vec![None; scenes.len()];
    for item in rendered {
        match item {
            Ok((i, path)) => scene_files[i] = Some(path),
            Err(e) => {
                on_stage_failure(&paths, &e);
                return Err(e);
            }
        }
    }
    let scene_files: Vec<PathBuf> = scene_files.into_iter().map(|p| p.expect("every scene rendered or pipeline returned early")).collect();

    let mut cancel_concat = cancel.clone();
    let concat_path = paths.temp_concat();
    concat::concatenate(&scene_files, &concat_path, &mut cancel_concat).await.map_err(|e| {
        on_stage_failure(&paths, &e);
        e
    })?;

    let final_tmp = paths.root().join(format!("{}.mp4.tmp", manifest.run_id));
    let mut bgm_cfg = config.bgm.clone();
    if let Some(path) = manifest.bgm_path.as_ref() {
        bgm_cfg.path = Some(path.clone());
    }
    let mut cancel_mix = cancel.clone();
    mixer::mix(
        &concat_path,
        total_duration_secs,
        &config.audio,
        &bgm_cfg,
        &final_tmp,
        &mut cancel_mix,
    )
    .await
    .map_err(|e| {
        on_stage_failure(&paths, &e);
        e
    })?;

    let final_path = paths.final_mp4();
    std::fs::rename(&final_tmp, &final_path)?;

    Ok(PipelineOutcome {
        final_path,
        scene_count: scenes.len(),
        total_duration_secs,
    })
}

fn build_timeline(config: &RenderConfig, manifest: &ProjectManifest, _paths: &RunPaths) -> RenderResult<Vec<ScenePlan>> {
    let opening_chunk = manifest.opening_chunk();
    let mut opening = timeline::build_opening_scene(&manifest.opening_title, &opening_chunk, config.sections.wrap_chars);
    opening.intro_relief_seconds = 0.0;

    let blocks = manifest.script_blocks();
    let chunks_per_block = manifest.chunks_per_block();
    let images = manifest.images();
    if images.len() != blocks.len() {
        return Err(RenderError::Config(format!(
            "manifest has {} blocks but {} images",
            blocks.len(),
            images.len()
        )));
    }

    let mut content = timeline::build_content_scenes(
        &blocks,
        &chunks_per_block,
        &config.sections,
        config.animation.ken_burns_intro_seconds,
    )?;

    assign_images(&mut content, &chunks_per_block, &images)?;

    for scene in &content {
        validate_scene_assets(scene)?;
    }

    let mut scenes = vec![opening];
    scenes.extend(content);
    Ok(scenes)
}

/// Each bundled scene inherits the image of the block its first chunk came
/// from; the asset pipeline never emits a chunk whose block has no image.
fn assign_images(
    scenes: &mut [ScenePlan],
    chunks_per_block: &[Vec<crate::model::NarrationChunk>],
    images: &[PathBuf],
) -> RenderResult<()> {
    let mut audio_to_image = std::collections::HashMap::new();
    for (block_chunks, image) in chunks_per_block.iter().zip(images.iter()) {
        for chunk in block_chunks {
            audio_to_image.insert(chunk.audio_path.clone(), image.clone());
        }
    }
    for scene in scenes.iter_mut() {
        if let Some(image) = audio_to_image.get(&scene.narration_audio_path) {
            scene.base_image_path = Some(image.clone());
        }
    }
    Ok(())
}

/// Disk-measured duration tolerance before a scene's declared duration and
/// its narration file's actual length are treated as suspiciously divergent.
const DURATION_DRIFT_TOLERANCE_SECS: f64 = 0.2;

fn validate_scene_assets(scene: &ScenePlan) -> RenderResult<()> {
    if let Some(image) = &scene.base_image_path {
        if !image.is_file() {
            return Err(RenderError::AssetMissing(image.clone()));
        }
    } else {
        return Err(RenderError::AssetMissing(PathBuf::from(format!("<{} has no base image>", scene.id))));
    }
    for audio in &scene.chunk_audio_paths {
        if !audio.is_file() {
            return Err(RenderError::AssetMissing(audio.clone()));
        }
    }
    if let Ok(measured) = subprocess::ffprobe_duration(&scene.narration_audio_path) {
        if (measured - scene.duration_seconds).abs() > DURATION_DRIFT_TOLERANCE_SECS {
            warn!(
                scene_id = %scene.id,
                declared = scene.duration_seconds,
                measured,
                "narration file duration diverges from the timeline's declared duration"
            );
        }
    }
    Ok(())
}

/// On cancellation, partial scene/concat temp files are removed so a retried
/// run doesn't mistake them for finished output; on any other failure the run
/// directory is left intact for inspection (§7).
fn on_stage_failure(paths: &RunPaths, err: &RenderError) {
    if matches!(err, RenderError::Cancelled) {
        for entry in [paths.temp_concat()] {
            let _ = std::fs::remove_file(entry);
        }
        if let Ok(read_dir) = std::fs::read_dir(paths.scenes_dir()) {
            for entry in read_dir.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("tmp") {
                    let _ = std::fs::remove_file(path);
                }
            }
        }
        warn!(run_dir = %paths.root().display(), "render cancelled, partial temp output removed");
    } else {
        warn!(run_dir = %paths.root().display(), error = %err, "render failed, run directory preserved for inspection");
    }
}

fn render_progress_bar(fraction: f64) {
    use colored::*;
    let pct = (fraction.clamp(0.0, 1.0) * 100.0).round();
    eprint!("\r{} {:>3}%   ", "pipeline:".green().bold(), pct);
    use std::io::Write;
    let _ = std::io::stderr().flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_worker_count_is_at_least_one() {
        assert!(default_worker_count() >= 1);
    }
}
