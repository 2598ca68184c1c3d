use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("script has no blocks to render")]
    EmptyScript,

    #[error("invalid chunk duration: {0}")]
    InvalidDuration(f64),

    #[error("no usable font: {0}")]
    FontUnavailable(String),

    #[error("asset missing: {0}")]
    AssetMissing(PathBuf),

    #[error("{command} exited with code {exit:?}")]
    ExternalToolFailure {
        command: String,
        exit: Option<i32>,
        tail: String,
    },

    #[error("{command} timed out after {elapsed_secs}s")]
    ExternalToolTimeout { command: String, elapsed_secs: u64 },

    #[error("scene {scene_id} failed to render: {cause}")]
    SceneRenderFailed { scene_id: String, cause: String },

    #[error("concat input invalid: {0}")]
    ConcatInputInvalid(String),

    #[error("mixer failure: {0}")]
    MixerFailure(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    /// Return an actionable hint for the user, if applicable.
    pub fn hint(&self) -> Option<String> {
        match self {
            RenderError::FontUnavailable(_) => Some(
                "Set renderer.text.font_path to a valid TTF/OTF file, or install a DejaVu-family font."
                    .into(),
            ),
            RenderError::ExternalToolFailure { command, .. } if command.contains("ffmpeg") => {
                Some("Ensure ffmpeg is installed and on your PATH.".into())
            }
            RenderError::ExternalToolFailure { command, .. } if command.contains("ffprobe") => {
                Some("Ensure ffprobe is installed and on your PATH.".into())
            }
            RenderError::AssetMissing(path) => {
                Some(format!("Expected an asset at {}; the asset pipeline must produce it before rendering.", path.display()))
            }
            RenderError::EmptyScript => {
                Some("Provide at least one script block before building a timeline.".into())
            }
            RenderError::InvalidDuration(_) => {
                Some("Every narration chunk must have a duration greater than zero.".into())
            }
            _ => None,
        }
    }
}

pub type RenderResult<T> = Result<T, RenderError>;
