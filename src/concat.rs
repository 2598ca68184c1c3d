//! Stream-copy concatenation (C6): joins rendered scene files in timeline
//! order with ffmpeg's concat demuxer, no re-encode (§4.6).

use std::path::{Path, PathBuf};

use tokio::sync::watch;

use crate::error::{RenderError, RenderResult};
use crate::subprocess::{self, ToolInvocation};

pub fn default_concat_timeout_secs(scene_count: usize) -> u64 {
    (scene_count as u64 * 5).max(30)
}

fn validate_inputs(scene_files: &[PathBuf]) -> RenderResult<()> {
    if scene_files.is_empty() {
        return Err(RenderError::ConcatInputInvalid("no scene files to concatenate".into()));
    }
    for path in scene_files {
        if !path.is_file() {
            return Err(RenderError::ConcatInputInvalid(format!("missing scene output: {}", path.display())));
        }
    }
    Ok(())
}

/// `ffconcat` list entries require single-quote-escaped paths (a literal `'`
/// inside the path becomes `'\''`).
fn escape_concat_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', "'\\''")
}

fn write_concat_list(scene_files: &[PathBuf], list_path: &Path) -> RenderResult<()> {
    let mut body = String::from("ffconcat version 1.0\n");
    for path in scene_files {
        body.push_str(&format!("file '{}'\n", escape_concat_path(path)));
    }
    std::fs::write(list_path, body)?;
    Ok(())
}

/// Concatenates `scene_files` (already in timeline order) into `output_path`.
/// A single scene is stream-copy remuxed through ffmpeg so `+faststart` still
/// applies; two or more go through ffmpeg's concat demuxer with `-c copy` so
/// no scene is re-encoded (§4.6).
pub async fn concatenate(
    scene_files: &[PathBuf],
    output_path: &Path,
    cancel: &mut watch::Receiver<bool>,
) -> RenderResult<()> {
    validate_inputs(scene_files)?;

    if scene_files.len() == 1 {
        let args = vec![
            "-y".into(),
            "-i".into(),
            scene_files[0].display().to_string(),
            "-c".into(),
            "copy".into(),
            "-movflags".into(),
            "+faststart".into(),
            output_path.display().to_string(),
        ];
        let invocation = ToolInvocation::new("ffmpeg", args);
        let timeout = default_concat_timeout_secs(1);
        return subprocess::invoke_silent(&invocation, timeout, cancel).await;
    }

    let list_dir = output_path.parent().unwrap_or_else(|| Path::new("."));
    let list_path = list_dir.join("concat_list.txt");
    write_concat_list(scene_files, &list_path)?;

    let args = vec![
        "-y".into(),
        "-safe".into(),
        "0".into(),
        "-f".into(),
        "concat".into(),
        "-i".into(),
        list_path.display().to_string(),
        "-c".into(),
        "copy".into(),
        "-movflags".into(),
        "+faststart".into(),
        output_path.display().to_string(),
    ];
    let invocation = ToolInvocation::new("ffmpeg", args);
    let timeout = default_concat_timeout_secs(scene_files.len());

    let result = subprocess::invoke_silent(&invocation, timeout, cancel).await;
    if let Err(RenderError::ExternalToolFailure { command, exit, tail }) = &result {
        let (head, tail_lines) = read_list_head_tail(&list_path);
        return Err(RenderError::ExternalToolFailure {
            command: command.clone(),
            exit: *exit,
            tail: format!("{tail}\n--- concat list head ---\n{head}\n--- concat list tail ---\n{tail_lines}"),
        });
    }
    result
}

fn read_list_head_tail(list_path: &Path) -> (String, String) {
    let contents = std::fs::read_to_string(list_path).unwrap_or_default();
    let lines: Vec<&str> = contents.lines().collect();
    let head = lines.iter().take(5).cloned().collect::<Vec<_>>().join("\n");
    let tail = lines.iter().rev().take(5).rev().cloned().collect::<Vec<_>>().join("\n");
    (head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn validate_inputs_rejects_empty() {
        let err = validate_inputs(&[]).unwrap_err();
        assert!(matches!(err, RenderError::ConcatInputInvalid(_)));
    }

    #[test]
    fn validate_inputs_rejects_missing_file() {
        let err = validate_inputs(&[PathBuf::from("/nonexistent/scene.mp4")]).unwrap_err();
        assert!(matches!(err, RenderError::ConcatInputInvalid(_)));
    }

    #[test]
    fn write_concat_list_escapes_and_headers() {
        let dir = tempdir().unwrap();
        let scene = dir.path().join("it's a scene.mp4");
        std::fs::write(&scene, b"x").unwrap();
        let list_path = dir.path().join("list.txt");
        write_concat_list(&[scene.clone()], &list_path).unwrap();
        let contents = std::fs::read_to_string(&list_path).unwrap();
        assert!(contents.starts_with("ffconcat version 1.0\n"));
        assert!(contents.contains("it'\\''s a scene.mp4"));
    }

    #[test]
    fn read_list_head_tail_handles_short_files() {
        let dir = tempdir().unwrap();
        let list_path = dir.path().join("list.txt");
        std::fs::write(&list_path, "a\nb\n").unwrap();
        let (head, tail) = read_list_head_tail(&list_path);
        assert_eq!(head, "a\nb");
        assert_eq!(tail, "a\nb");
    }
}
