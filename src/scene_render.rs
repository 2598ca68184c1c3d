//! Single-scene renderer (C5): paints overlay/subtitle assets for one
//! [`ScenePlan`] and drives one ffmpeg invocation that composites the Ken-Burns
//! pan, caption overlays, and narration audio into `scenes/<id>.mp4` (§4.5).

use std::path::PathBuf;

use tokio::sync::watch;

use crate::config::{OverlayKind, RenderConfig};
use crate::error::{RenderError, RenderResult};
use crate::filtergraph::build_content_graph;
use crate::model::{RunPaths, ScenePlan};
use crate::overlay::OverlayPainter;
use crate::subprocess::{self, ToolInvocation};
use crate::subtitle::{SubtitleBuilder, SubtitleVariant};

/// Default wall-clock ceiling for one scene render: ten times its own output
/// duration, generous enough to absorb a cold encoder start (§5).
pub fn default_scene_timeout_secs(duration_seconds: f64) -> u64 {
    (duration_seconds * 10.0).ceil().max(30.0) as u64
}

pub struct SceneRenderer<'a> {
    pub painter: &'a OverlayPainter,
    pub config: &'a RenderConfig,
    pub paths: &'a RunPaths,
    pub font_path: &'a std::path::Path,
}

impl<'a> SceneRenderer<'a> {
    pub fn new(
        painter: &'a OverlayPainter,
        config: &'a RenderConfig,
        paths: &'a RunPaths,
        font_path: &'a std::path::Path,
    ) -> Self {
        Self {
            painter,
            config,
            paths,
            font_path,
        }
    }

    /// Renders one scene, mapping any internal failure to
    /// [`RenderError::SceneRenderFailed`] (cancellation passes through
    /// unwrapped so the pipeline can distinguish it from a real failure).
    pub async fn render(
        &self,
        scene: &ScenePlan,
        cancel: &mut watch::Receiver<bool>,
        mut on_progress: impl FnMut(f64) + Send,
    ) -> RenderResult<PathBuf> {
        match self.render_inner(scene, cancel, &mut on_progress).await {
            Ok(path) => Ok(path),
            Err(RenderError::Cancelled) => Err(RenderError::Cancelled),
            Err(e) => Err(RenderError::SceneRenderFailed {
                scene_id: scene.id.clone(),
                cause: e.to_string(),
            }),
        }
    }

    async fn render_inner(
        &self,
        scene: &ScenePlan,
        cancel: &mut watch::Receiver<bool>,
        on_progress: &mut impl FnMut(f64) + Send,
    ) -> RenderResult<PathBuf> {
        let out_path = self.paths.scene_mp4(&scene.id);
        if out_path.exists() {
            return Ok(out_path);
        }

        let video_cfg = &self.config.video;
        let overlay_paths = self.paint_overlays(scene)?;
        let ass_path = self.build_subtitles(scene)?;
        let subtitle_builder = ass_path.as_ref().map(|_| SubtitleBuilder::new(self.font_path));

        let invocation = match scene.base_image_path.as_ref() {
            None => self.build_opening_invocation(scene, &out_path, &overlay_paths)?,
            Some(image_path) => {
                let (iw, ih) = image::image_dimensions(image_path).map_err(|e| {
                    RenderError::AssetMissing(std::path::PathBuf::from(format!(
                        "{}: unreadable ({e})",
                        image_path.display()
                    )))
                })?;
                let total_frames = (scene.duration_seconds * video_cfg.fps as f64).round() as u32;
                // Inputs so far: 0 = base image, 1..=overlay_paths.len() = overlay PNGs;
                // narration chunks follow, one `-i` per bundled chunk (§4.4/§4.5).
                let audio_input_indices: Vec<usize> =
                    (0..scene.chunk_audio_paths.len()).map(|i| overlay_paths.len() + 1 + i).collect();
                let (graph, audio_label) = build_content_graph(
                    scene,
                    video_cfg,
                    &self.config.animation,
                    iw,
                    ih,
                    total_frames.max(1),
                    ass_path.as_ref().zip(subtitle_builder.as_ref()).map(|(p, b)| (p.as_path(), b)),
                    &audio_input_indices,
                );
                self.build_invocation(scene, &overlay_paths, &graph, &audio_label, &out_path)
            }
        };

        let timeout = default_scene_timeout_secs(scene.duration_seconds);
        let tmp_out = out_path.with_extension("mp4.tmp");
        let invocation = retarget_output(invocation, &tmp_out);
        subprocess::invoke_with_progress(&invocation, scene.duration_seconds, timeout, cancel, |secs| on_progress(secs), false).await?;
        std::fs::rename(&tmp_out, &out_path)?;
        Ok(out_path)
    }

    fn paint_overlays(&self, scene: &ScenePlan) -> RenderResult<Vec<PathBuf>> {
        let text_cfg = &self.config.text;
        let draw_glyphs = !matches!(self.config.overlay.kind, OverlayKind::Typing);
        let mut out = Vec::new();
        if scene.base_image_path.is_none() {
            let lines: Vec<String> = scene
                .segments
                .first()
                .map(|s| s.lines.clone())
                .unwrap_or_default();
            let key = self.painter.cache_key(
                &lines.join(" "),
                self.config.video.width,
                self.config.video.height,
                text_cfg.default_size,
                text_cfg.color_default,
                text_cfg.color_background_box,
            );
            let path = self.paths.overlay_png(&key);
            self.painter
                .paint_opening_title(&lines, self.config.video.width, self.config.video.height, text_cfg, &path)?;
            out.push(path);
            return Ok(out);
        }
        for segment in &scene.segments {
            let key = self.painter.cache_key(
                &segment.text_for_typing,
                self.config.video.width,
                self.config.video.height,
                text_cfg.default_size,
                text_cfg.color_default,
                text_cfg.color_background_box,
            );
            let path = self.paths.overlay_png(&key);
            self.painter.paint_segment_band(
                segment,
                self.config.video.width,
                self.config.video.height,
                text_cfg,
                draw_glyphs,
                &path,
            )?;
            out.push(path);
        }
        Ok(out)
    }

    fn build_subtitles(&self, scene: &ScenePlan) -> RenderResult<Option<PathBuf>> {
        let is_content_scene = scene.base_image_path.is_some();
        if !is_content_scene || !matches!(self.config.overlay.kind, OverlayKind::Typing) || scene.segments.is_empty() {
            return Ok(None);
        }
        let builder = SubtitleBuilder::new(self.font_path);
        let out_path = self.paths.ass_file(&scene.id);
        builder
            .build(
                &scene.segments,
                self.config.video.width,
                self.config.video.height,
                &self.config.text,
                self.config.overlay.typing_speed,
                SubtitleVariant::Karaoke,
                &out_path,
            )
            .map_err(RenderError::Io)?;
        Ok(Some(out_path))
    }

    fn build_opening_invocation(
        &self,
        scene: &ScenePlan,
        out_path: &std::path::Path,
        overlay_paths: &[PathBuf],
    ) -> RenderResult<ToolInvocation> {
        let video_cfg = &self.config.video;
        let audio_cfg = &self.config.audio;
        let title_png = overlay_paths.first().ok_or_else(|| {
            RenderError::SceneRenderFailed {
                scene_id: scene.id.clone(),
                cause: "opening scene has no title overlay".into(),
            }
        })?;
        let graph = crate::filtergraph::build_opening_graph(video_cfg.width, video_cfg.height, video_cfg.fps);
        let args = vec![
            "-y".into(),
            "-f".into(),
            "lavfi".into(),
            "-i".into(),
            format!("color=c=black:s={}x{}:d={:.3}", video_cfg.width, video_cfg.height, scene.duration_seconds),
            "-loop".into(),
            "1".into(),
            "-i".into(),
            title_png.display().to_string(),
            "-i".into(),
            scene.narration_audio_path.display().to_string(),
            "-filter_complex".into(),
            graph,
            "-map".into(),
            "[vout]".into(),
            "-map".into(),
            "2:a".into(),
            "-shortest".into(),
            "-c:v".into(),
            video_cfg.codec.clone(),
            "-crf".into(),
            video_cfg.crf.to_string(),
            "-preset".into(),
            video_cfg.preset.clone(),
            "-pix_fmt".into(),
            crate::config::VideoConfig::PIX_FMT.into(),
            "-profile:v".into(),
            crate::config::VideoConfig::PROFILE.into(),
            "-level".into(),
            crate::config::VideoConfig::LEVEL.into(),
            "-color_primaries".into(),
            crate::config::VideoConfig::COLOR_PRIMARIES.into(),
            "-color_trc".into(),
            crate::config::VideoConfig::COLOR_TRC.into(),
            "-colorspace".into(),
            crate::config::VideoConfig::COLORSPACE.into(),
            "-c:a".into(),
            audio_cfg.codec.clone(),
            "-b:a".into(),
            audio_cfg.bitrate.clone(),
            "-ar".into(),
            audio_cfg.sample_rate.to_string(),
            "-ac".into(),
            crate::config::AudioConfig::CHANNELS.to_string(),
            "-movflags".into(),
            "+faststart".into(),
            out_path.display().to_string(),
        ];
        Ok(ToolInvocation::new("ffmpeg", args))
    }

    fn build_invocation(
        &self,
        scene: &ScenePlan,
        overlay_paths: &[PathBuf],
        graph: &str,
        audio_label: &str,
        out_path: &std::path::Path,
    ) -> ToolInvocation {
        let video_cfg = &self.config.video;
        let audio_cfg = &self.config.audio;
        let image_path = scene.base_image_path.as_deref().expect("content scene has a base image");
        let mut args = vec!["-y".into(), "-loop".into(), "1".into(), "-i".into(), image_path.display().to_string()];
        for overlay in overlay_paths {
            args.push("-loop".into());
            args.push("1".into());
            args.push("-i".into());
            args.push(overlay.display().to_string());
        }
        for chunk_audio in &scene.chunk_audio_paths {
            args.push("-i".into());
            args.push(chunk_audio.display().to_string());
        }

        args.push("-filter_complex".into());
        args.push(graph.to_string());
        args.push("-map".into());
        args.push("[vout]".into());
        args.push("-map".into());
        args.push(map_audio_arg(audio_label));
        args.push("-shortest".into());
        args.push("-c:v".into());
        args.push(video_cfg.codec.clone());
        args.push("-crf".into());
        args.push(video_cfg.crf.to_string());
        args.push("-preset".into());
        args.push(video_cfg.preset.clone());
        args.push("-pix_fmt".into());
        args.push(crate::config::VideoConfig::PIX_FMT.into());
        args.push("-profile:v".into());
        args.push(crate::config::VideoConfig::PROFILE.into());
        args.push("-level".into());
        args.push(crate::config::VideoConfig::LEVEL.into());
        args.push("-color_primaries".into());
        args.push(crate::config::VideoConfig::COLOR_PRIMARIES.into());
        args.push("-color_trc".into());
        args.push(crate::config::VideoConfig::COLOR_TRC.into());
        args.push("-colorspace".into());
        args.push(crate::config::VideoConfig::COLORSPACE.into());
        args.push("-c:a".into());
        args.push(audio_cfg.codec.clone());
        args.push("-b:a".into());
        args.push(audio_cfg.bitrate.clone());
        args.push("-ar".into());
        args.push(audio_cfg.sample_rate.to_string());
        args.push("-ac".into());
        args.push(crate::config::AudioConfig::CHANNELS.to_string());
        args.push("-movflags".into());
        args.push("+faststart".into());
        args.push(out_path.display().to_string());
        ToolInvocation::new("ffmpeg", args)
    }
}

/// A single-chunk scene's audio label is a raw stream specifier (`"N:a"`,
/// mapped directly); a bundled multi-chunk scene's is a filter-graph output
/// label (`"aout"`, mapped with brackets) — see `build_narration_mix_graph`.
fn map_audio_arg(audio_label: &str) -> String {
    if audio_label.contains(':') {
        audio_label.to_string()
    } else {
        format!("[{audio_label}]")
    }
}

/// Rewrites the final positional output-path argument to a temp path so the
/// real destination only ever receives a complete file (§5 atomic output).
fn retarget_output(mut invocation: ToolInvocation, tmp_out: &std::path::Path) -> ToolInvocation {
    if let Some(last) = invocation.args.last_mut() {
        *last = tmp_out.display().to_string();
    }
    invocation
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scene_timeout_scales_with_duration() {
        assert_eq!(default_scene_timeout_secs(3.0), 30);
        assert_eq!(default_scene_timeout_secs(10.0), 100);
    }

    #[test]
    fn retarget_output_rewrites_last_arg_only() {
        let invocation = ToolInvocation::new("ffmpeg", vec!["-y".into(), "out.mp4".into()]);
        let retargeted = retarget_output(invocation, std::path::Path::new("/tmp/out.mp4.tmp"));
        assert_eq!(retargeted.args.last().unwrap(), "/tmp/out.mp4.tmp");
        assert_eq!(retargeted.args[0], "-y");
    }
}
