//! Upstream project manifest (§6): the typed JSON/YAML boundary between the
//! asset pipeline (script parsing, TTS synthesis, still-image acquisition —
//! all out of scope here) and this crate's renderer.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{RenderError, RenderResult};
use crate::model::{NarrationChunk, ScriptBlock};

#[derive(Debug, Clone, Deserialize)]
pub struct NarrationChunkInput {
    pub audio_path: PathBuf,
    pub duration_seconds: f64,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptBlockInput {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub chunks: Vec<NarrationChunkInput>,
    /// Still image backing every scene built from this block's chunks.
    pub image: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectManifest {
    #[serde(default = "default_run_id")]
    pub run_id: String,
    pub opening_title: String,
    pub opening_narration: NarrationChunkInput,
    pub blocks: Vec<ScriptBlockInput>,
    /// Overrides `[bgm].path` from the render config when set (§9 Open Question (b)).
    #[serde(default)]
    pub bgm_path: Option<String>,
}

fn default_run_id() -> String {
    "render".to_string()
}

impl ProjectManifest {
    /// Loads a manifest from `.json`, `.yml`, or `.yaml`; any other extension
    /// is a config error naming the unsupported suffix.
    pub fn load(path: &Path) -> RenderResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&raw).map_err(|e| RenderError::Config(e.to_string())),
            Some("yml") | Some("yaml") => serde_yml::from_str(&raw).map_err(|e| RenderError::Config(e.to_string())),
            other => Err(RenderError::Config(format!(
                "unsupported manifest extension: {:?} (expected .json, .yml, or .yaml)",
                other
            ))),
        }
    }

    pub fn script_blocks(&self) -> Vec<ScriptBlock> {
        self.blocks
            .iter()
            .map(|b| ScriptBlock {
                title: b.title.clone(),
                body: b.body.clone(),
                tags: b.tags.clone(),
            })
            .collect()
    }

    pub fn chunks_per_block(&self) -> Vec<Vec<NarrationChunk>> {
        self.blocks
            .iter()
            .map(|b| {
                b.chunks
                    .iter()
                    .map(|c| NarrationChunk {
                        audio_path: c.audio_path.clone(),
                        duration_seconds: c.duration_seconds,
                        text: c.text.clone(),
                    })
                    .collect()
            })
            .collect()
    }

    pub fn opening_chunk(&self) -> NarrationChunk {
        NarrationChunk {
            audio_path: self.opening_narration.audio_path.clone(),
            duration_seconds: self.opening_narration.duration_seconds,
            text: self.opening_narration.text.clone(),
        }
    }

    /// One image path per content block, aligned 1:1 with [`Self::chunks_per_block`].
    pub fn images(&self) -> Vec<PathBuf> {
        self.blocks.iter().map(|b| b.image.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_json() -> &'static str {
        r#"{
            "run_id": "demo",
            "opening_title": "Welcome",
            "opening_narration": { "audio_path": "open.wav", "duration_seconds": 2.0, "text": "Welcome" },
            "blocks": [
                {
                    "image": "scene0.png",
                    "chunks": [
                        { "audio_path": "c0.wav", "duration_seconds": 3.0, "text": "First chunk" }
                    ]
                }
            ]
        }"#
    }

    #[test]
    fn loads_json_manifest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, sample_json()).unwrap();
        let manifest = ProjectManifest::load(&path).unwrap();
        assert_eq!(manifest.run_id, "demo");
        assert_eq!(manifest.blocks.len(), 1);
        assert_eq!(manifest.images(), vec![PathBuf::from("scene0.png")]);
        assert_eq!(manifest.chunks_per_block()[0][0].duration_seconds, 3.0);
    }

    #[test]
    fn rejects_unsupported_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manifest.toml");
        std::fs::write(&path, "x = 1").unwrap();
        let err = ProjectManifest::load(&path).unwrap_err();
        assert!(matches!(err, RenderError::Config(_)));
    }
}
