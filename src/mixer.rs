//! Two-stage loudness-normalized BGM mixer (C7): the narration/video stream
//! from concat is mixed with an optional looped BGM bed, each stage passed
//! through `loudnorm` so the final mix lands at broadcast-safe levels (§4.7).

use std::path::Path;

use tokio::sync::watch;

use crate::config::{AudioConfig, BgmConfig};
use crate::error::RenderResult;
use crate::subprocess::{self, ToolInvocation};

/// BGM bed target: quiet relative to narration, generous loudness range.
const BGM_STAGE_I: f64 = -30.0;
const BGM_STAGE_LRA: f64 = 7.0;
const BGM_STAGE_TP: f64 = -2.0;

/// Final mix target: standard streaming-loudness integrated level.
const MIX_STAGE_I: f64 = -14.0;
const MIX_STAGE_LRA: f64 = 7.0;
const MIX_STAGE_TP: f64 = -1.5;

pub fn default_mix_timeout_secs(total_duration_secs: f64) -> u64 {
    (total_duration_secs * 4.0).ceil().max(30.0) as u64
}

/// Mixes `concat_path` (video + narration audio) with `bgm_cfg.path`, if set,
/// writing the final MP4 to `output_path`. With no BGM configured, the
/// concat output is copied through unchanged (§9 Open Question (b)).
pub async fn mix(
    concat_path: &Path,
    total_duration_secs: f64,
    audio_cfg: &AudioConfig,
    bgm_cfg: &BgmConfig,
    output_path: &Path,
    cancel: &mut watch::Receiver<bool>,
) -> RenderResult<()> {
    match bgm_cfg.path.as_deref() {
        None => stream_copy_passthrough(concat_path, output_path, cancel).await,
        Some(bgm_path) => {
            mix_with_bgm(concat_path, bgm_path, total_duration_secs, audio_cfg, bgm_cfg, output_path, cancel).await
        }
    }
}

/// No BGM configured: re-mux without touching either stream (§9 Open Question (b)).
pub async fn stream_copy_passthrough(
    concat_path: &Path,
    output_path: &Path,
    cancel: &mut watch::Receiver<bool>,
) -> RenderResult<()> {
    let args = vec![
        "-y".into(),
        "-i".into(),
        concat_path.display().to_string(),
        "-c".into(),
        "copy".into(),
        "-movflags".into(),
        "+faststart".into(),
        output_path.display().to_string(),
    ];
    let invocation = ToolInvocation::new("ffmpeg", args);
    subprocess::invoke_silent(&invocation, 120, cancel).await
}

#[allow(clippy::too_many_arguments)]
async fn mix_with_bgm(
    concat_path: &Path,
    bgm_path: &str,
    total_duration_secs: f64,
    audio_cfg: &AudioConfig,
    bgm_cfg: &BgmConfig,
    output_path: &Path,
    cancel: &mut watch::Receiver<bool>,
) -> RenderResult<()> {
    let filter = build_mix_filter(total_duration_secs, audio_cfg, bgm_cfg);

    let args = vec![
        "-y".into(),
        "-i".into(),
        concat_path.display().to_string(),
        "-stream_loop".into(),
        "-1".into(),
        "-i".into(),
        bgm_path.to_string(),
        "-filter_complex".into(),
        filter,
        "-map".into(),
        "0:v".into(),
        "-map".into(),
        "[aout]".into(),
        "-c:v".into(),
        "copy".into(),
        "-c:a".into(),
        audio_cfg.codec.clone(),
        "-b:a".into(),
        audio_cfg.bitrate.clone(),
        "-ar".into(),
        audio_cfg.sample_rate.to_string(),
        "-ac".into(),
        AudioConfig::CHANNELS.to_string(),
        "-t".into(),
        format!("{total_duration_secs:.3}"),
        "-movflags".into(),
        "+faststart".into(),
        output_path.display().to_string(),
    ];
    let invocation = ToolInvocation::new("ffmpeg", args);
    let timeout = default_mix_timeout_secs(total_duration_secs);
    subprocess::invoke_silent(&invocation, timeout, cancel).await
}

/// Builds the two-stage `loudnorm` filter_complex per §4.7: BGM trimmed to
/// the programme length, normalised, boosted, faded at both ends, mixed with
/// the normalised narration branch, then normalised again as the final mix.
fn build_mix_filter(total_duration_secs: f64, audio_cfg: &AudioConfig, bgm_cfg: &BgmConfig) -> String {
    let sample_rate = audio_cfg.sample_rate;
    let fade_out_start = (total_duration_secs - 1.0).max(0.0);
    let fade_out_dur = 1.0_f64.min(total_duration_secs);
    format!(
        "[1:a]atrim=0:{dur:.3},\
asetpts=PTS-STARTPTS,\
loudnorm=I={bgm_i}:LRA={bgm_lra}:TP={bgm_tp},\
volume={bgm_boost:.4},\
afade=t=in:st=0:d=0.5,\
afade=t=out:st={fade_out_start:.3}:d={fade_out_dur:.3},\
aformat=sample_fmts=fltp:sample_rates={sample_rate}:channel_layouts=stereo[bgm];\
[0:a]volume={narration_boost:.4},\
aformat=sample_fmts=fltp:sample_rates={sample_rate}:channel_layouts=stereo[narr];\
[narr][bgm]amix=inputs=2:duration=first:dropout_transition=2[premix];\
[premix]loudnorm=I={mix_i}:LRA={mix_lra}:TP={mix_tp},\
aformat=sample_fmts=fltp:sample_rates={sample_rate}:channel_layouts=stereo[aout]",
        dur = total_duration_secs,
        bgm_boost = bgm_cfg.bgm_boost,
        bgm_i = BGM_STAGE_I,
        bgm_lra = BGM_STAGE_LRA,
        bgm_tp = BGM_STAGE_TP,
        narration_boost = bgm_cfg.narration_boost,
        mix_i = MIX_STAGE_I,
        mix_lra = MIX_STAGE_LRA,
        mix_tp = MIX_STAGE_TP,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mix_timeout_scales_with_duration() {
        assert_eq!(default_mix_timeout_secs(10.0), 40);
        assert!(default_mix_timeout_secs(1.0) >= 30);
    }

    #[test]
    fn mix_filter_contains_both_loudnorm_stages_and_fades() {
        let audio_cfg = AudioConfig::default();
        let bgm_cfg = BgmConfig::default();
        let filter = build_mix_filter(20.0, &audio_cfg, &bgm_cfg);
        assert!(filter.contains("loudnorm=I=-30"));
        assert!(filter.contains("loudnorm=I=-14"));
        assert!(filter.contains("afade=t=in:st=0:d=0.5"));
        assert!(filter.contains("afade=t=out:st=19.000:d=1.000"));
        assert!(filter.contains("dropout_transition=2"));
        assert!(filter.contains("[aout]"));
    }

    #[test]
    fn mix_filter_fade_out_clamps_for_short_clips() {
        let audio_cfg = AudioConfig::default();
        let bgm_cfg = BgmConfig::default();
        let filter = build_mix_filter(0.4, &audio_cfg, &bgm_cfg);
        assert!(filter.contains("afade=t=out:st=0.000:d=0.400"));
    }
}
