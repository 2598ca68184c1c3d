//! Render configuration: the full surface enumerated in SPEC_FULL.md §6, loaded
//! from TOML in the teacher's `ProjectConfig` style (plain structs, `#[serde(default)]`
//! helpers, no presets beyond what the spec actually names).

use serde::{Deserialize, Serialize};

use crate::error::{RenderError, RenderResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    pub video: VideoConfig,
    pub audio: AudioConfig,
    pub text: TextConfig,
    pub overlay: OverlayConfig,
    pub animation: AnimationConfig,
    pub sections: SectionsConfig,
    pub bgm: BgmConfig,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            video: VideoConfig::default(),
            audio: AudioConfig::default(),
            text: TextConfig::default(),
            overlay: OverlayConfig::default(),
            animation: AnimationConfig::default(),
            sections: SectionsConfig::default(),
            bgm: BgmConfig::default(),
        }
    }
}

impl RenderConfig {
    pub fn load(path: &std::path::Path) -> RenderResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| RenderError::Config(e.to_string()))
    }

    pub fn save(&self, path: &std::path::Path) -> RenderResult<()> {
        let raw = toml::to_string_pretty(self).map_err(|e| RenderError::Config(e.to_string()))?;
        std::fs::write(path, raw)?;
        Ok(())
    }
}

fn default_width() -> u32 {
    1920
}
fn default_height() -> u32 {
    1080
}
fn default_fps() -> u32 {
    30
}
fn default_codec() -> String {
    "libx264".into()
}
fn default_crf() -> u8 {
    20
}
fn default_preset() -> String {
    "medium".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VideoConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_codec")]
    pub codec: String,
    pub bitrate: Option<String>,
    #[serde(default = "default_crf")]
    pub crf: u8,
    #[serde(default = "default_preset")]
    pub preset: String,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            codec: default_codec(),
            bitrate: None,
            crf: default_crf(),
            preset: default_preset(),
        }
    }
}

impl VideoConfig {
    /// The bit-exact encoder profile fields named in SPEC_FULL.md §6, independent
    /// of the configurable codec/crf/preset above.
    pub const PIX_FMT: &'static str = "yuv420p";
    pub const PROFILE: &'static str = "high";
    pub const LEVEL: &'static str = "4.1";
    pub const COLOR_PRIMARIES: &'static str = "bt709";
    pub const COLOR_TRC: &'static str = "bt709";
    pub const COLORSPACE: &'static str = "bt709";
}

fn default_audio_codec() -> String {
    "aac".into()
}
fn default_sample_rate() -> u32 {
    48000
}
fn default_audio_bitrate() -> String {
    "192k".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    #[serde(default = "default_audio_codec")]
    pub codec: String,
    #[serde(default = "default_audio_bitrate")]
    pub bitrate: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            codec: default_audio_codec(),
            bitrate: default_audio_bitrate(),
            sample_rate: default_sample_rate(),
        }
    }
}

impl AudioConfig {
    pub const CHANNELS: u32 = 2;
}

fn default_font_size() -> f64 {
    40.0
}
fn default_text_color() -> [u8; 4] {
    [255, 255, 255, 255]
}
fn default_band_color() -> [u8; 4] {
    [0, 0, 0, 160]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TextConfig {
    pub font_path: Option<String>,
    #[serde(default = "default_font_size")]
    pub default_size: f64,
    #[serde(default = "default_text_color")]
    pub color_default: [u8; 4],
    #[serde(default = "default_band_color")]
    pub color_background_box: [u8; 4],
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            default_size: default_font_size(),
            color_default: default_text_color(),
            color_background_box: default_band_color(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverlayKind {
    Static,
    Typing,
}

fn default_typing_speed() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OverlayConfig {
    #[serde(rename = "type")]
    pub kind: OverlayKind,
    #[serde(default = "default_typing_speed")]
    pub typing_speed: f64,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            kind: OverlayKind::Static,
            typing_speed: default_typing_speed(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KenBurnsMode {
    PanOnly,
    Zoompan,
}

fn default_ken_burns_zoom() -> f64 {
    0.08
}
fn default_ken_burns_offset() -> f64 {
    0.5
}
fn default_ken_burns_margin() -> f64 {
    0.12
}
fn default_ken_burns_motion_scale() -> f64 {
    1.0
}
fn default_ken_burns_max_margin() -> f64 {
    0.25
}
fn default_ken_burns_pan_extent() -> f64 {
    0.1
}
fn default_ken_burns_intro_relief() -> f64 {
    0.3
}
fn default_ken_burns_intro_seconds() -> f64 {
    1.5
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnimationConfig {
    pub ken_burns_mode: KenBurnsMode,
    #[serde(default = "default_ken_burns_zoom")]
    pub ken_burns_zoom: f64,
    #[serde(default = "default_ken_burns_offset")]
    pub ken_burns_offset: f64,
    #[serde(default = "default_ken_burns_margin")]
    pub ken_burns_margin: f64,
    #[serde(default = "default_ken_burns_motion_scale")]
    pub ken_burns_motion_scale: f64,
    #[serde(default = "default_ken_burns_max_margin")]
    pub ken_burns_max_margin: f64,
    pub ken_burns_full_travel: bool,
    #[serde(default = "default_ken_burns_pan_extent")]
    pub ken_burns_pan_extent: f64,
    #[serde(default = "default_ken_burns_intro_relief")]
    pub ken_burns_intro_relief: f64,
    #[serde(default = "default_ken_burns_intro_seconds")]
    pub ken_burns_intro_seconds: f64,
}

impl Default for KenBurnsMode {
    fn default() -> Self {
        KenBurnsMode::PanOnly
    }
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            ken_burns_mode: KenBurnsMode::default(),
            ken_burns_zoom: default_ken_burns_zoom(),
            ken_burns_offset: default_ken_burns_offset(),
            ken_burns_margin: default_ken_burns_margin(),
            ken_burns_motion_scale: default_ken_burns_motion_scale(),
            ken_burns_max_margin: default_ken_burns_max_margin(),
            ken_burns_full_travel: false,
            ken_burns_pan_extent: default_ken_burns_pan_extent(),
            ken_burns_intro_relief: default_ken_burns_intro_relief(),
            ken_burns_intro_seconds: default_ken_burns_intro_seconds(),
        }
    }
}

impl AnimationConfig {
    /// Resolved pan extent honouring Open Question (c): `full_travel` overrides
    /// `pan_extent` to `1.0`.
    pub fn effective_pan_extent(&self) -> f64 {
        if self.ken_burns_full_travel {
            1.0
        } else {
            self.ken_burns_pan_extent
        }
    }
}

fn default_section_duration() -> f64 {
    8.0
}
fn default_min_duration() -> f64 {
    3.0
}
fn default_max_duration() -> f64 {
    20.0
}
fn default_max_chunks_per_scene() -> usize {
    4
}
fn default_padding_seconds() -> f64 {
    0.35
}
fn default_wrap_chars() -> usize {
    36
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SectionsConfig {
    #[serde(default = "default_section_duration")]
    pub default_duration_seconds: f64,
    #[serde(default = "default_min_duration")]
    pub min_duration_seconds: f64,
    #[serde(default = "default_max_duration")]
    pub max_duration_seconds: f64,
    #[serde(default = "default_max_chunks_per_scene")]
    pub max_chunks_per_scene: usize,
    /// Silence inserted between narration chunks bundled into one scene (§4.8).
    #[serde(default = "default_padding_seconds")]
    pub padding_seconds: f64,
    /// Character width display rows are wrapped to (§4.8).
    #[serde(default = "default_wrap_chars")]
    pub wrap_chars: usize,
}

impl Default for SectionsConfig {
    fn default() -> Self {
        Self {
            default_duration_seconds: default_section_duration(),
            min_duration_seconds: default_min_duration(),
            max_duration_seconds: default_max_duration(),
            max_chunks_per_scene: default_max_chunks_per_scene(),
            padding_seconds: default_padding_seconds(),
            wrap_chars: default_wrap_chars(),
        }
    }
}

fn default_narration_boost() -> f64 {
    1.0
}
fn default_bgm_boost() -> f64 {
    0.24
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BgmConfig {
    /// Explicit BGM input path. No filename is ever hard-coded — SPEC_FULL.md §9 Open Question (b).
    pub path: Option<String>,
    #[serde(default = "default_narration_boost")]
    pub narration_boost: f64,
    #[serde(default = "default_bgm_boost")]
    pub bgm_boost: f64,
}

impl Default for BgmConfig {
    fn default() -> Self {
        Self {
            path: None,
            narration_boost: default_narration_boost(),
            bgm_boost: default_bgm_boost(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let cfg = RenderConfig::default();
        assert_eq!(cfg.video.width, 1920);
        assert_eq!(cfg.video.height, 1080);
        assert_eq!(cfg.video.fps, 30);
        assert_eq!(cfg.audio.sample_rate, 48000);
        assert_eq!(AudioConfig::CHANNELS, 2);
        assert_eq!(cfg.bgm.bgm_boost, 0.24);
        assert!(cfg.bgm.path.is_none());
    }

    #[test]
    fn full_travel_overrides_pan_extent() {
        let mut anim = AnimationConfig::default();
        anim.ken_burns_pan_extent = 0.1;
        anim.ken_burns_full_travel = true;
        assert_eq!(anim.effective_pan_extent(), 1.0);

        anim.ken_burns_full_travel = false;
        assert_eq!(anim.effective_pan_extent(), 0.1);
    }

    #[test]
    fn round_trip_toml() {
        let cfg = RenderConfig::default();
        let s = toml::to_string_pretty(&cfg).unwrap();
        let parsed: RenderConfig = toml::from_str(&s).unwrap();
        assert_eq!(cfg, parsed);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let s = "[video]\nwidth = 640\nheight = 360\n";
        let cfg: RenderConfig = toml::from_str(s).unwrap();
        assert_eq!(cfg.video.width, 640);
        assert_eq!(cfg.video.fps, 30);
        assert_eq!(cfg.sections.max_chunks_per_scene, 4);
    }
}
