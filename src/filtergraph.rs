//! Filter-graph assembly (C4): pure Ken-Burns math plus the `-filter_complex`
//! string builders for the opening title and content scenes. Per-frame
//! position is expressed as ffmpeg expressions (`X(t)`/`Y(t)` via `crop`, or
//! `zoompan`'s own `x=`/`y=`/`z=` expressions) — ffmpeg evaluates these once
//! per output frame, so nothing here precomputes a frame table (§4.4).

use std::path::Path;

use crate::config::{AnimationConfig, KenBurnsMode, VideoConfig};
use crate::model::{Direction, ScenePlan};
use crate::subtitle::{subtitles_filter_arg, SubtitleBuilder};

/// Minimum zoom-per-frame factor for `zoompan`; zero or negative would freeze
/// the output on frame 1 since `zoompan` advances by accumulating `z`.
const MIN_ZOOM_STEP: f64 = 0.015;

/// One `[in]filter1,filter2[out]` segment of a filter graph.
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    pub inputs: Vec<String>,
    pub filters: Vec<String>,
    pub outputs: Vec<String>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, label: impl Into<String>) -> Self {
        self.inputs.push(label.into());
        self
    }

    pub fn filter(mut self, expr: impl Into<String>) -> Self {
        self.filters.push(expr.into());
        self
    }

    pub fn output(mut self, label: impl Into<String>) -> Self {
        self.outputs.push(label.into());
        self
    }

    pub fn render(&self) -> String {
        let ins: String = self.inputs.iter().map(|l| format!("[{l}]")).collect();
        let outs: String = self.outputs.iter().map(|l| format!("[{l}]")).collect();
        format!("{ins}{}{outs}", self.filters.join(","))
    }
}

/// An ordered sequence of chains joined by `;`.
#[derive(Debug, Clone, Default)]
pub struct FilterGraph {
    pub chains: Vec<FilterChain>,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chain: FilterChain) -> &mut Self {
        self.chains.push(chain);
        self
    }

    pub fn render(&self) -> String {
        self.chains.iter().map(FilterChain::render).collect::<Vec<_>>().join(";")
    }
}

/// Quadratic ease-out on `p in [0, 1]`, used to decay the intro margin relief
/// and to shape the pan's velocity curve.
pub fn ease_out(p: f64) -> f64 {
    let p = p.clamp(0.0, 1.0);
    1.0 - (1.0 - p).powi(2)
}

/// The effective safe-margin fraction at time `t`: the configured margin,
/// widened by `intro_relief` at `t=0` and decaying linearly to zero over
/// `intro_relief_seconds` (so captions never need to dodge a hard pan cut).
pub fn effective_margin(
    base_margin: f64,
    max_margin: f64,
    intro_relief: f64,
    intro_relief_seconds: f64,
    t: f64,
    _duration: f64,
) -> f64 {
    let decay = if intro_relief_seconds > 0.0 {
        (1.0 - t / intro_relief_seconds).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (base_margin * (1.0 + intro_relief * decay)).min(max_margin)
}

/// Zoom applied at time `t` for `pan_only` mode, clamped so a non-positive
/// configured zoom never collapses the crop window (Invariant: zoom > 0).
pub fn effective_zoom(zoom: f64) -> f64 {
    if zoom <= 0.0 {
        MIN_ZOOM_STEP
    } else {
        zoom
    }
}

/// How far (in source pixels, along one axis) the crop window may travel
/// before it would run off the scaled source: `slack = source_dim * zoom *
/// pan_extent`, eased and signed by the scene's motion vector component.
pub fn pan_travel(source_dim: f64, zoom: f64, pan_extent: f64, direction_component: i32) -> f64 {
    let slack = source_dim * effective_zoom(zoom) * pan_extent.clamp(0.0, 1.0);
    slack * direction_component.signum() as f64
}

/// Crop-window origin along one axis at progress `p in [0, 1]` through the
/// scene, eased and clamped to stay within `[0, slack_bound]` so the window
/// never exits the scaled image (Invariant 3).
pub fn pan_position(centered_origin: f64, travel: f64, p: f64, min: f64, max: f64) -> f64 {
    let eased = ease_out(p);
    (centered_origin + travel * eased).clamp(min, max)
}

/// `zoompan`'s `z` expression advances by a fixed per-frame increment from
/// 1.0 up to `target_zoom` over `total_frames` frames.
pub fn zoompan_step(target_zoom: f64, total_frames: u32) -> f64 {
    let frames = total_frames.max(1) as f64;
    (effective_zoom(target_zoom) - 0.0).max(MIN_ZOOM_STEP) / frames
}

/// Builds the opening-scene filter graph: the title PNG is centred over a
/// black canvas (§4.4.1). `0:v` is the black background generated by the
/// caller's `-f lavfi -i color=...`, `1:v` is the title overlay PNG.
pub fn build_opening_graph(canvas_w: u32, canvas_h: u32, fps: u32) -> String {
    let mut graph = FilterGraph::new();
    graph.push(
        FilterChain::new()
            .input("0:v")
            .input("1:v")
            .filter(format!("overlay=(W-w)/2:(H-h)/2:eval=init"))
            .filter(format!("fps={fps}"))
            .filter("format=yuv420p")
            .output("vout"),
    );
    graph.render()
}

/// Builds the content-scene filter graph: Ken-Burns scale+crop (or zoompan),
/// per-segment caption overlays, and an optional `subtitles` stage for typed
/// captions, finishing with pixel-format conversion for the encoder (§4.4).
#[allow(clippy::too_many_arguments)]
pub fn build_content_graph(
    scene: &ScenePlan,
    video_cfg: &VideoConfig,
    anim_cfg: &AnimationConfig,
    source_w: u32,
    source_h: u32,
    total_frames: u32,
    ass_path: Option<(&Path, &SubtitleBuilder)>,
    audio_input_indices: &[usize],
) -> (String, String) {
    let mut graph = FilterGraph::new();
    let canvas_w = video_cfg.width;
    let canvas_h = video_cfg.height;
    let duration = scene.duration_seconds.max(0.001);

    // Peak effective margin (t=0, full intro relief) sizes the scale-to-cover
    // headroom so the crop window has enough slack even during the relief
    // window; it then linearly relaxes to the base margin (§4.4).
    let peak_margin = effective_margin(
        anim_cfg.ken_burns_margin,
        anim_cfg.ken_burns_max_margin,
        anim_cfg.ken_burns_intro_relief,
        scene.intro_relief_seconds,
        0.0,
        duration,
    );
    let scaled = scale_to_cover(source_w, source_h, canvas_w, canvas_h, anim_cfg.ken_burns_motion_scale, peak_margin);

    let ken_burns_label = match anim_cfg.ken_burns_mode {
        KenBurnsMode::PanOnly => {
            let crop_expr = pan_only_crop_expr(scene.motion_vector, anim_cfg, scaled.0, scaled.1, canvas_w, canvas_h, duration);
            graph.push(
                FilterChain::new()
                    .input("0:v")
                    .filter(format!("scale={}:{}", scaled.0, scaled.1))
                    .filter(crop_expr)
                    .output("kb"),
            );
            "kb"
        }
        KenBurnsMode::Zoompan => {
            let zp = zoompan_expr(scene.motion_vector, anim_cfg, scaled.0, scaled.1, canvas_w, canvas_h, total_frames, video_cfg.fps, peak_margin);
            graph.push(
                FilterChain::new()
                    .input("0:v")
                    .filter(format!("scale={}:{}", scaled.0, scaled.1))
                    .filter(zp)
                    .output("kb"),
            );
            "kb"
        }
    };

    let mut current = ken_burns_label.to_string();
    for (i, segment) in scene.segments.iter().enumerate() {
        let overlay_input = format!("{}:v", i + 1);
        let next = format!("ov{i}");
        let start = segment.start_offset;
        let end = segment.start_offset + segment.duration;
        graph.push(
            FilterChain::new()
                .input(&current)
                .input(&overlay_input)
                .filter(format!("overlay=x=0:y=0:enable='between(t,{start:.3},{end:.3})'"))
                .output(&next),
        );
        current = next;
    }

    if let Some((ass, builder)) = ass_path {
        let next = "subbed".to_string();
        graph.push(
            FilterChain::new()
                .input(&current)
                .filter(subtitles_filter_arg(ass, builder.fonts_dir()))
                .output(&next),
        );
        current = next;
    }

    graph.push(
        FilterChain::new()
            .input(&current)
            .filter(format!("fps={}", video_cfg.fps))
            .filter("format=yuv420p")
            .output("vout"),
    );

    let start_offsets: Vec<f64> = scene.segments.iter().map(|s| s.start_offset).collect();
    let audio_label = build_narration_mix_graph(&mut graph, audio_input_indices, &start_offsets, duration);

    (graph.render(), audio_label)
}

/// Scale-to-cover dimensions: the smaller of the two source/canvas ratios
/// would letterbox, so the larger ratio is used, then widened by `(1 + m)`
/// per §4.4 (`m` the effective margin, already widened for intro relief by
/// the caller), and further by `motion_scale` (extra headroom beyond the
/// Ken-Burns zoom itself).
fn scale_to_cover(source_w: u32, source_h: u32, canvas_w: u32, canvas_h: u32, motion_scale: f64, effective_margin: f64) -> (u32, u32) {
    let ratio = (canvas_w as f64 / source_w as f64).max(canvas_h as f64 / source_h as f64);
    let headroom = motion_scale.max(1.0) * (1.0 + effective_margin.max(0.0));
    let w = ((source_w as f64 * ratio * headroom).round() as u32).max(canvas_w + 2);
    let h = ((source_h as f64 * ratio * headroom).round() as u32).max(canvas_h + 2);
    (w + (w % 2), h + (h % 2))
}

/// Builds the `crop=W:H:x=...:y=...` expression for `pan_only` mode. `x`/`y`
/// are ffmpeg `crop` filter expressions evaluated per output frame in terms
/// of `t` (seconds elapsed), `n` is not needed since `t` already advances
/// monotonically with the encoder's frame clock.
fn pan_only_crop_expr(
    direction: Direction,
    anim_cfg: &AnimationConfig,
    scaled_w: u32,
    scaled_h: u32,
    canvas_w: u32,
    canvas_h: u32,
    duration: f64,
) -> String {
    let zoom = effective_zoom(anim_cfg.ken_burns_zoom);
    let pan_extent = anim_cfg.effective_pan_extent();
    let centered_x = (scaled_w as f64 - canvas_w as f64) / 2.0;
    let centered_y = (scaled_h as f64 - canvas_h as f64) / 2.0;
    let travel_x = pan_travel(scaled_w as f64, zoom, pan_extent, direction.dx).min(centered_x);
    let travel_y = pan_travel(scaled_h as f64, zoom, pan_extent, direction.dy).min(centered_y);

    let progress = format!("(t/{duration:.6})");
    let ease = format!("(1-(1-min(max({progress},0),1))*(1-min(max({progress},0),1)))");
    let x_expr = format!(
        "{centered_x:.3}+{travel_x:.3}*{ease}",
    );
    let y_expr = format!(
        "{centered_y:.3}+{travel_y:.3}*{ease}",
    );
    format!(
        "crop={canvas_w}:{canvas_h}:x='clip({x_expr},0,{max_x:.3})':y='clip({y_expr},0,{max_y:.3})'",
        max_x = (scaled_w as f64 - canvas_w as f64).max(0.0),
        max_y = (scaled_h as f64 - canvas_h as f64).max(0.0),
    )
}

/// Builds the `zoompan=...` expression for `zoompan` mode: accumulates zoom
/// from 1.0 to `1+ken_burns_zoom` linearly over the scene, recentring `x`/`y`
/// on the motion vector's target corner/edge each frame.
#[allow(clippy::too_many_arguments)]
fn zoompan_expr(
    direction: Direction,
    anim_cfg: &AnimationConfig,
    scaled_w: u32,
    scaled_h: u32,
    canvas_w: u32,
    canvas_h: u32,
    total_frames: u32,
    fps: u32,
    effective_margin: f64,
) -> String {
    let target_zoom = 1.0 + effective_zoom(anim_cfg.ken_burns_zoom);
    let step = zoompan_step(target_zoom, total_frames);
    let offset_x = zoompan_center_offset(scaled_w, canvas_w, direction.dx, anim_cfg.ken_burns_offset, effective_margin);
    let offset_y = zoompan_center_offset(scaled_h, canvas_h, direction.dy, anim_cfg.ken_burns_offset, effective_margin);
    format!(
        "zoompan=z='min(zoom+{step:.6},{target_zoom:.6})':x='iw/2-(iw/zoom/2)+{offset_x:.3}':y='ih/2-(ih/zoom/2)+{offset_y:.3}':d={total_frames}:s={canvas_w}x{canvas_h}:fps={fps}",
    )
}

/// Pixel offset from dead-centre that `zoompan`'s recentring expression
/// biases toward, along one axis: `ken_burns_offset · effective_margin`
/// (the margin expressed in pixels of the canvas dimension), clamped to the
/// slack the scaled source actually has so the crop window never exits it
/// (Invariant 3).
pub fn zoompan_center_offset(scaled_dim: u32, canvas_dim: u32, direction_component: i32, offset: f64, effective_margin: f64) -> f64 {
    let max_slack = ((scaled_dim as f64 - canvas_dim as f64) / 2.0).max(0.0);
    let margin_px = effective_margin.max(0.0) * canvas_dim as f64;
    let magnitude = (offset * margin_px).abs().min(max_slack);
    magnitude * direction_component.signum() as f64
}

/// Origin of the crop window when centred (no pan applied yet), used as the
/// pan's starting point before the motion vector's travel is added.
pub fn pan_origin(scaled_dim: f64, canvas_dim: f64) -> f64 {
    (scaled_dim - canvas_dim) / 2.0
}

/// Builds the audio chain that assembles a multi-chunk scene's narration
/// track from its per-chunk WAVs: each chunk is delayed to its segment's
/// `start_offset` then summed, since segments never overlap (Invariant 1).
/// `input_indices[i]` is the `N:a` input index for `segments[i]`'s chunk.
/// Returns the output label to map as the scene's audio stream.
pub fn build_narration_mix_graph(
    graph: &mut FilterGraph,
    input_indices: &[usize],
    start_offsets: &[f64],
    scene_duration: f64,
) -> String {
    assert_eq!(input_indices.len(), start_offsets.len());
    if input_indices.len() == 1 {
        let label = format!("{}:a", input_indices[0]);
        return label;
    }
    let mut delayed_labels = Vec::with_capacity(input_indices.len());
    for (i, (&input_idx, &start)) in input_indices.iter().zip(start_offsets.iter()).enumerate() {
        let delay_ms = (start * 1000.0).round().max(0.0) as i64;
        let label = format!("narr{i}");
        graph.push(
            FilterChain::new()
                .input(format!("{input_idx}:a"))
                .filter(format!("adelay=delays={delay_ms}|{delay_ms}"))
                .output(&label),
        );
        delayed_labels.push(label);
    }
    let mut mix_chain = FilterChain::new();
    for label in &delayed_labels {
        mix_chain = mix_chain.input(label);
    }
    mix_chain = mix_chain
        .filter(format!("amix=inputs={}:duration=longest:dropout_transition=0:normalize=0", delayed_labels.len()))
        .filter(format!("apad=whole_dur={scene_duration:.3}"))
        .filter(format!("atrim=0:{scene_duration:.3}"))
        .output("aout");
    graph.push(mix_chain);
    "aout".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ease_out_is_monotonic_and_bounded() {
        assert_eq!(ease_out(0.0), 0.0);
        assert_eq!(ease_out(1.0), 1.0);
        assert!(ease_out(0.5) > 0.0 && ease_out(0.5) < 1.0);
        assert!(ease_out(-1.0) >= 0.0);
        assert!(ease_out(2.0) <= 1.0);
    }

    #[test]
    fn effective_zoom_clamps_nonpositive() {
        assert_eq!(effective_zoom(0.0), MIN_ZOOM_STEP);
        assert_eq!(effective_zoom(-0.5), MIN_ZOOM_STEP);
        assert_eq!(effective_zoom(0.08), 0.08);
    }

    #[test]
    fn pan_travel_is_signed_by_direction() {
        let positive = pan_travel(1000.0, 0.1, 0.2, 1);
        let negative = pan_travel(1000.0, 0.1, 0.2, -1);
        assert!(positive > 0.0);
        assert_eq!(negative, -positive);
    }

    #[test]
    fn pan_position_never_exits_bounds() {
        let p = pan_position(50.0, 500.0, 0.5, 0.0, 100.0);
        assert!(p >= 0.0 && p <= 100.0);
    }

    #[test]
    fn filter_chain_renders_bracketed_io() {
        let chain = FilterChain::new()
            .input("0:v")
            .filter("scale=100:100")
            .output("s");
        assert_eq!(chain.render(), "[0:v]scale=100:100[s]");
    }

    #[test]
    fn filter_graph_joins_chains_with_semicolons() {
        let mut graph = FilterGraph::new();
        graph.push(FilterChain::new().input("0:v").filter("fps=30").output("a"));
        graph.push(FilterChain::new().input("a").filter("format=yuv420p").output("vout"));
        assert_eq!(graph.render(), "[0:v]fps=30[a];[a]format=yuv420p[vout]");
    }

    #[test]
    fn build_opening_graph_contains_overlay_and_format() {
        let graph = build_opening_graph(1920, 1080, 30);
        assert!(graph.contains("overlay="));
        assert!(graph.contains("format=yuv420p"));
        assert!(graph.contains("[vout]"));
    }

    #[test]
    fn zoompan_step_is_positive_even_for_zero_zoom() {
        let step = zoompan_step(1.0, 150);
        assert!(step > 0.0);
    }

    #[test]
    fn effective_margin_is_widest_at_scene_start_and_relaxes_to_base() {
        let at_start = effective_margin(0.12, 0.25, 0.3, 1.5, 0.0, 10.0);
        let at_end_of_relief = effective_margin(0.12, 0.25, 0.3, 1.5, 1.5, 10.0);
        let past_relief = effective_margin(0.12, 0.25, 0.3, 1.5, 5.0, 10.0);
        assert!((at_start - 0.12 * 1.3).abs() < 1e-9);
        assert!((at_end_of_relief - 0.12).abs() < 1e-9);
        assert!((past_relief - 0.12).abs() < 1e-9);
        assert!(at_start > at_end_of_relief);
    }

    #[test]
    fn effective_margin_never_exceeds_max_margin() {
        let m = effective_margin(0.5, 0.6, 1.0, 1.0, 0.0, 10.0);
        assert!(m <= 0.6);
    }

    #[test]
    fn zoompan_center_offset_is_signed_by_direction_and_clamped_to_slack() {
        let positive = zoompan_center_offset(2000, 1000, 1, 0.5, 0.12);
        let negative = zoompan_center_offset(2000, 1000, -1, 0.5, 0.12);
        assert!(positive > 0.0);
        assert_eq!(negative, -positive);
        let clamped = zoompan_center_offset(1010, 1000, 1, 10.0, 0.9);
        assert!(clamped <= 5.0);
    }
}
