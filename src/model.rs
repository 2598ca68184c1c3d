//! Upstream data types and the scene-plan shape shared by every pipeline stage.
//!
//! Script parsing and asset acquisition are out of scope for this crate; the
//! types here are the typed boundary the rest of the pipeline consumes.

use std::path::{Path, PathBuf};

use crate::error::{RenderError, RenderResult};

/// A parsed script block, produced upstream by a tokeniser this crate does not own.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptBlock {
    pub title: Option<String>,
    pub body: String,
    pub tags: Vec<String>,
}

/// One synthesised narration utterance with a disk-measured duration.
#[derive(Debug, Clone, PartialEq)]
pub struct NarrationChunk {
    pub audio_path: PathBuf,
    pub duration_seconds: f64,
    pub text: String,
}

/// Kind of scene: opening title card, or a content scene over a still image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneKind {
    Opening,
    Content,
}

/// One of eight deterministic pan/zoom directions, selected by a pure hash of `scene.id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Direction {
    pub dx: i32,
    pub dy: i32,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction { dx: 1, dy: 0 },
        Direction { dx: -1, dy: 0 },
        Direction { dx: 0, dy: 1 },
        Direction { dx: 0, dy: -1 },
        Direction { dx: 1, dy: 1 },
        Direction { dx: 1, dy: -1 },
        Direction { dx: -1, dy: 1 },
        Direction { dx: -1, dy: -1 },
    ];

    /// Deterministic pure function of `id`: a SHA-256 digest of its UTF-8 bytes,
    /// taken modulo 8. Never touches wall-clock time or an RNG — see DESIGN.md.
    pub fn from_scene_id(id: &str) -> Direction {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(id.as_bytes());
        let index = (digest[0] as usize) % Direction::ALL.len();
        Direction::ALL[index]
    }
}

/// A single visible caption interval within a scene.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Ordered display rows, already wrapped to the configured character width.
    pub lines: Vec<String>,
    pub start_offset: f64,
    pub duration: f64,
    /// Full text for this segment, used by the typing overlay's karaoke timing.
    pub text_for_typing: String,
}

/// A fully-resolved, pre-render description of one scene.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenePlan {
    pub id: String,
    pub kind: SceneKind,
    pub base_image_path: Option<PathBuf>,
    /// First bundled chunk's audio file; stable identity used to look up the
    /// block image (§6) and to key caches. The full narration track for a
    /// multi-chunk scene is assembled from [`Self::chunk_audio_paths`].
    pub narration_audio_path: PathBuf,
    /// One audio file per bundled chunk, aligned 1:1 with `segments` and its
    /// `start_offset`s; rendered as a single track via per-chunk `adelay`.
    pub chunk_audio_paths: Vec<PathBuf>,
    pub duration_seconds: f64,
    pub segments: Vec<Segment>,
    pub motion_vector: Direction,
    pub intro_relief_seconds: f64,
}

impl ScenePlan {
    pub fn base_image(&self) -> RenderResult<&Path> {
        self.base_image_path
            .as_deref()
            .ok_or_else(|| RenderError::AssetMissing(PathBuf::from(format!("<{} has no base image>", self.id))))
    }
}

/// Per-run directory layout: `scenes/`, `overlays/`, `ass/`, `temp_concat.mp4`, `<run_id>.mp4`.
#[derive(Debug, Clone)]
pub struct RunPaths {
    root: PathBuf,
    run_id: String,
}

impl RunPaths {
    pub fn new(root: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            run_id: run_id.into(),
        }
    }

    pub fn ensure_dirs(&self) -> RenderResult<()> {
        std::fs::create_dir_all(self.scenes_dir())?;
        std::fs::create_dir_all(self.overlays_dir())?;
        std::fs::create_dir_all(self.ass_dir())?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scenes_dir(&self) -> PathBuf {
        self.root.join("scenes")
    }

    pub fn overlays_dir(&self) -> PathBuf {
        self.root.join("overlays")
    }

    pub fn ass_dir(&self) -> PathBuf {
        self.root.join("ass")
    }

    pub fn scene_mp4(&self, scene_id: &str) -> PathBuf {
        self.scenes_dir().join(format!("{scene_id}.mp4"))
    }

    pub fn overlay_png(&self, cache_key: &str) -> PathBuf {
        self.overlays_dir().join(format!("{cache_key}.png"))
    }

    pub fn ass_file(&self, scene_id: &str) -> PathBuf {
        self.ass_dir().join(format!("{scene_id}.ass"))
    }

    pub fn temp_concat(&self) -> PathBuf {
        self.root.join("temp_concat.mp4")
    }

    pub fn final_mp4(&self) -> PathBuf {
        self.root.join(format!("{}.mp4", self.run_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_is_pure_function_of_id() {
        let a = Direction::from_scene_id("scene-007");
        let b = Direction::from_scene_id("scene-007");
        assert_eq!(a, b);
    }

    #[test]
    fn direction_matches_sha256_first_byte_mod_8() {
        // sha256("scene-007")[0] == 122, 122 % 8 == 2 -> ALL[2] == (0, 1)
        assert_eq!(Direction::from_scene_id("scene-007"), Direction { dx: 0, dy: 1 });
        // sha256("scene-alpha")[0] == 158, 158 % 8 == 6 -> ALL[6] == (-1, 1)
        assert_eq!(Direction::from_scene_id("scene-alpha"), Direction { dx: -1, dy: 1 });
    }

    #[test]
    fn run_paths_layout() {
        let paths = RunPaths::new("/tmp/run1", "final");
        assert_eq!(paths.scene_mp4("s1"), PathBuf::from("/tmp/run1/scenes/s1.mp4"));
        assert_eq!(paths.final_mp4(), PathBuf::from("/tmp/run1/final.mp4"));
        assert_eq!(paths.temp_concat(), PathBuf::from("/tmp/run1/temp_concat.mp4"));
    }
}
